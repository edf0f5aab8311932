//! API error handling module
//!
//! Provides a unified error type for all API endpoints with structured error variants.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use passkey_core::{CeremonyError, ErrorKind, OptionsError, StorageError};
use thiserror::Error;

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request - client provided invalid input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Registration ceremony failure
    #[error("Ceremony error: {0}")]
    Ceremony(#[from] CeremonyError),

    /// Creation options could not be built
    #[error("Options error: {0}")]
    Options(#[from] OptionsError),

    /// User or credential lookup failed outside a ceremony
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Options(OptionsError::InvalidUserId(_)) => StatusCode::BAD_REQUEST,
            Self::Options(OptionsError::Randomness(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Ceremony(ref e) => match e.kind() {
                // Undecodable client input → 400
                ErrorKind::MalformedInput
                | ErrorKind::TruncatedAuthenticatorData
                | ErrorKind::MalformedPublicKey => StatusCode::BAD_REQUEST,

                // Well-formed but failed a check → 422 Unprocessable Entity
                ErrorKind::InvalidPublicKeyParameters
                | ErrorKind::InvalidClientData
                | ErrorKind::InvalidAuthenticatorData
                | ErrorKind::InvalidExtensionOutputs
                | ErrorKind::UnsupportedAttestationFormat
                | ErrorKind::AttestationStatementInvalid => StatusCode::UNPROCESSABLE_ENTITY,

                ErrorKind::CredentialAlreadyRegistered => StatusCode::CONFLICT,

                // Backend failures → 503
                ErrorKind::Storage => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    /// Get the error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_INPUT",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Options(OptionsError::InvalidUserId(_)) => "INVALID_USER_ID",
            Self::Options(OptionsError::Randomness(_)) => "CHALLENGE_GENERATION_FAILED",
            Self::Ceremony(ref e) => e.kind().code(),
        }
    }

    /// Get sanitized error message for client response
    pub fn client_message(&self) -> String {
        match self {
            Self::Ceremony(CeremonyError::Storage(_)) | Self::Storage(_) => {
                "Credential storage unavailable".to_string()
            }
            Self::Ceremony(ref e) => e.to_string(),
            Self::Options(OptionsError::Randomness(_)) => "Internal server error".to_string(),
            // For other errors, use the Display message
            _ => self.to_string(),
        }
    }

    /// Get the error category for logging
    fn error_category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Ceremony(_) => "ceremony",
            Self::Options(_) => "options",
            Self::Storage(_) => "storage",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();
        let step = match &self {
            Self::Ceremony(e) => Some(e.step().as_str()),
            _ => None,
        };

        // Log based on severity, always including internal details
        if status.is_server_error() {
            tracing::error!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Server error"
            );
        } else {
            tracing::warn!(
                status = %status,
                category = category,
                code = code,
                step = step.unwrap_or("-"),
                error = %internal_message,
                "Client error"
            );
        }

        // All error responses include a `code` field for programmatic error handling
        let mut body = serde_json::json!({
            "error": client_message,
            "code": code,
        });
        if let Some(step) = step {
            body["step"] = serde_json::Value::from(step);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use passkey_core::ClientDataCheck;

    #[test]
    fn test_ceremony_status_mapping() {
        let malformed = ApiError::from(CeremonyError::MalformedClientData("eof".into()));
        assert_eq!(malformed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(malformed.error_code(), "MALFORMED_INPUT");

        let duplicate = ApiError::from(CeremonyError::CredentialAlreadyRegistered);
        assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);
        assert_eq!(duplicate.error_code(), "CREDENTIAL_ALREADY_REGISTERED");

        let invalid = ApiError::from(CeremonyError::InvalidClientData {
            check: ClientDataCheck::Origin,
            detail: "mismatch".into(),
        });
        assert_eq!(invalid.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(invalid.error_code(), "INVALID_CLIENT_DATA");
    }

    #[test]
    fn test_storage_details_hidden() {
        let err = ApiError::from(CeremonyError::Storage(StorageError::Query(
            "relation \"credentials\" does not exist".into(),
        )));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.client_message(), "Credential storage unavailable");

        let err = ApiError::from(StorageError::Connection("password authentication failed".into()));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.error_code(), "STORAGE_ERROR");
        assert_eq!(err.client_message(), "Credential storage unavailable");
    }

    #[test]
    fn test_options_errors() {
        let err = ApiError::from(OptionsError::InvalidUserId(0));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let err = ApiError::from(OptionsError::Randomness("no entropy".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.client_message(), "Internal server error");
    }
}
