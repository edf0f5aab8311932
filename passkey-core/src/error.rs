use std::fmt;

use thiserror::Error;

use crate::store::StorageError;

/// The ordered steps of a registration ceremony.
///
/// Every [`CeremonyError`] reports the step it was raised in, so callers can
/// tell a decoding failure from a policy failure without matching variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CeremonyStep {
    ParseClientData,
    ValidateClientData,
    ComputeClientDataHash,
    DecodeAttestationObject,
    ValidateAuthenticatorData,
    ValidateClientExtensionOutputs,
    VerifyAttestationStatement,
    RegisterCredential,
}

impl CeremonyStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CeremonyStep::ParseClientData => "parse_client_data",
            CeremonyStep::ValidateClientData => "validate_client_data",
            CeremonyStep::ComputeClientDataHash => "compute_client_data_hash",
            CeremonyStep::DecodeAttestationObject => "decode_attestation_object",
            CeremonyStep::ValidateAuthenticatorData => "validate_authenticator_data",
            CeremonyStep::ValidateClientExtensionOutputs => "validate_client_extension_outputs",
            CeremonyStep::VerifyAttestationStatement => "verify_attestation_statement",
            CeremonyStep::RegisterCredential => "register_credential",
        }
    }
}

impl fmt::Display for CeremonyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which client data check rejected the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientDataCheck {
    Type,
    Challenge,
    Origin,
}

impl fmt::Display for ClientDataCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClientDataCheck::Type => "type",
            ClientDataCheck::Challenge => "challenge",
            ClientDataCheck::Origin => "origin",
        })
    }
}

/// Which authenticator data check rejected the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticatorDataCheck {
    RpIdHash,
    UserPresent,
    UserVerified,
    AttestedCredentialData,
}

impl fmt::Display for AuthenticatorDataCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthenticatorDataCheck::RpIdHash => "rp_id_hash",
            AuthenticatorDataCheck::UserPresent => "user_present",
            AuthenticatorDataCheck::UserVerified => "user_verified",
            AuthenticatorDataCheck::AttestedCredentialData => "attested_credential_data",
        })
    }
}

/// Coarse failure classes, stable enough to expose to API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedInput,
    TruncatedAuthenticatorData,
    MalformedPublicKey,
    InvalidPublicKeyParameters,
    InvalidClientData,
    InvalidAuthenticatorData,
    InvalidExtensionOutputs,
    UnsupportedAttestationFormat,
    AttestationStatementInvalid,
    CredentialAlreadyRegistered,
    Storage,
}

impl ErrorKind {
    /// Machine-readable code (SCREAMING_SNAKE_CASE).
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::MalformedInput => "MALFORMED_INPUT",
            ErrorKind::TruncatedAuthenticatorData => "TRUNCATED_AUTHENTICATOR_DATA",
            ErrorKind::MalformedPublicKey => "MALFORMED_PUBLIC_KEY",
            ErrorKind::InvalidPublicKeyParameters => "INVALID_PUBLIC_KEY_PARAMETERS",
            ErrorKind::InvalidClientData => "INVALID_CLIENT_DATA",
            ErrorKind::InvalidAuthenticatorData => "INVALID_AUTHENTICATOR_DATA",
            ErrorKind::InvalidExtensionOutputs => "INVALID_EXTENSION_OUTPUTS",
            ErrorKind::UnsupportedAttestationFormat => "UNSUPPORTED_ATTESTATION_FORMAT",
            ErrorKind::AttestationStatementInvalid => "ATTESTATION_STATEMENT_INVALID",
            ErrorKind::CredentialAlreadyRegistered => "CREDENTIAL_ALREADY_REGISTERED",
            ErrorKind::Storage => "STORAGE_ERROR",
        }
    }
}

#[derive(Error, Debug)]
pub enum CeremonyError {
    #[error("Malformed client data: {0}")]
    MalformedClientData(String),

    #[error("Malformed attestation object: {0}")]
    MalformedAttestationObject(String),

    #[error("Truncated authenticator data: {field} needs {needed} bytes, got {actual}")]
    TruncatedAuthenticatorData {
        field: &'static str,
        needed: usize,
        actual: usize,
    },

    #[error("Malformed credential public key: {0}")]
    MalformedPublicKey(String),

    #[error("Invalid credential public key parameters: {0}")]
    InvalidPublicKeyParameters(String),

    #[error("Invalid client data ({check}): {detail}")]
    InvalidClientData {
        check: ClientDataCheck,
        detail: String,
    },

    #[error("Invalid authenticator data ({check}): {detail}")]
    InvalidAuthenticatorData {
        check: AuthenticatorDataCheck,
        detail: String,
    },

    #[error("Invalid client extension outputs: {0}")]
    InvalidExtensionOutputs(String),

    #[error("Unsupported attestation statement format: {0}")]
    UnsupportedAttestationFormat(String),

    #[error("Attestation statement invalid for format {format}: {reason}")]
    AttestationStatementInvalid { format: String, reason: String },

    #[error("Credential is already registered")]
    CredentialAlreadyRegistered,

    #[error("Credential storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CeremonyError {
    pub(crate) fn client_data(check: ClientDataCheck, detail: impl Into<String>) -> Self {
        CeremonyError::InvalidClientData {
            check,
            detail: detail.into(),
        }
    }

    pub(crate) fn authenticator_data(check: AuthenticatorDataCheck, detail: impl Into<String>) -> Self {
        CeremonyError::InvalidAuthenticatorData {
            check,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CeremonyError::MalformedClientData(_) | CeremonyError::MalformedAttestationObject(_) => {
                ErrorKind::MalformedInput
            }
            CeremonyError::TruncatedAuthenticatorData { .. } => ErrorKind::TruncatedAuthenticatorData,
            CeremonyError::MalformedPublicKey(_) => ErrorKind::MalformedPublicKey,
            CeremonyError::InvalidPublicKeyParameters(_) => ErrorKind::InvalidPublicKeyParameters,
            CeremonyError::InvalidClientData { .. } => ErrorKind::InvalidClientData,
            CeremonyError::InvalidAuthenticatorData { .. } => ErrorKind::InvalidAuthenticatorData,
            CeremonyError::InvalidExtensionOutputs(_) => ErrorKind::InvalidExtensionOutputs,
            CeremonyError::UnsupportedAttestationFormat(_) => ErrorKind::UnsupportedAttestationFormat,
            CeremonyError::AttestationStatementInvalid { .. } => ErrorKind::AttestationStatementInvalid,
            CeremonyError::CredentialAlreadyRegistered => ErrorKind::CredentialAlreadyRegistered,
            CeremonyError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// The ceremony step that raised this error.
    pub fn step(&self) -> CeremonyStep {
        match self {
            CeremonyError::MalformedClientData(_) => CeremonyStep::ParseClientData,
            CeremonyError::InvalidClientData { .. } => CeremonyStep::ValidateClientData,
            CeremonyError::MalformedAttestationObject(_)
            | CeremonyError::TruncatedAuthenticatorData { .. }
            | CeremonyError::MalformedPublicKey(_)
            | CeremonyError::InvalidPublicKeyParameters(_) => CeremonyStep::DecodeAttestationObject,
            CeremonyError::InvalidAuthenticatorData { .. } => CeremonyStep::ValidateAuthenticatorData,
            CeremonyError::InvalidExtensionOutputs(_) => CeremonyStep::ValidateClientExtensionOutputs,
            CeremonyError::UnsupportedAttestationFormat(_)
            | CeremonyError::AttestationStatementInvalid { .. } => {
                CeremonyStep::VerifyAttestationStatement
            }
            CeremonyError::CredentialAlreadyRegistered | CeremonyError::Storage(_) => {
                CeremonyStep::RegisterCredential
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, CeremonyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_are_ordered() {
        assert!(CeremonyStep::ParseClientData < CeremonyStep::ValidateClientData);
        assert!(CeremonyStep::VerifyAttestationStatement < CeremonyStep::RegisterCredential);
    }

    #[test]
    fn test_kind_and_step_mapping() {
        let err = CeremonyError::TruncatedAuthenticatorData {
            field: "sign count",
            needed: 37,
            actual: 10,
        };
        assert_eq!(err.kind(), ErrorKind::TruncatedAuthenticatorData);
        assert_eq!(err.step(), CeremonyStep::DecodeAttestationObject);

        let err = CeremonyError::client_data(ClientDataCheck::Origin, "mismatch");
        assert_eq!(err.kind().code(), "INVALID_CLIENT_DATA");
        assert_eq!(err.step(), CeremonyStep::ValidateClientData);
        assert!(err.to_string().contains("(origin)"));

        let err = CeremonyError::Storage(StorageError::Query("timeout".into()));
        assert_eq!(err.step(), CeremonyStep::RegisterCredential);
    }
}
