//! Registration ceremony endpoints
//!
//! `start` issues a challenge and creation options; `finish` runs the ceremony
//! against the browser's `AuthenticatorAttestationResponse`.

use axum::{extract::State, Json};
use base64::alphabet;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use passkey_core::{
    CredentialStore, PublicKeyCredentialCreationOptions, RegistrationResponse, UserAccount,
    UserStore,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::state::AppState;

/// Browsers send unpadded base64url, some client libraries pad it.
const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const MAX_NAME_LEN: usize = 64;

/// Request to start a registration
#[derive(Debug, Deserialize, ToSchema)]
pub struct StartRegistrationRequest {
    /// Account name the credential is created for
    #[schema(example = "alice")]
    pub username: String,
    /// Human-readable name shown by the authenticator (defaults to `username`)
    #[schema(example = "Alice")]
    pub display_name: Option<String>,
}

/// Response containing the registration challenge
#[derive(Debug, Serialize)]
pub struct StartRegistrationResponse {
    /// Challenge ID to send back with the finish request
    pub challenge_id: String,
    /// Options to pass to `navigator.credentials.create({ publicKey })`
    pub public_key: PublicKeyCredentialCreationOptions,
}

/// The `response` member of a `PublicKeyCredential` from `navigator.credentials.create`
#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthenticatorResponse {
    /// base64url-encoded `clientDataJSON`
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    /// base64url-encoded CBOR attestation object
    #[serde(rename = "attestationObject")]
    pub attestation_object: String,
    /// Result of `getClientExtensionResults()`
    #[serde(rename = "clientExtensionResults", default)]
    pub client_extension_results: Option<serde_json::Value>,
}

/// Request to complete a registration
#[derive(Debug, Deserialize, ToSchema)]
pub struct FinishRegistrationRequest {
    /// Challenge ID from start_registration
    pub challenge_id: String,
    pub response: AuthenticatorResponse,
}

/// The credential that was registered
#[derive(Debug, Serialize, ToSchema)]
pub struct RegisteredCredentialResponse {
    /// Credential id (base64url)
    pub credential_id: String,
    /// User handle the credential belongs to (base64url)
    pub user_id: String,
    /// Authenticator model identifier
    #[schema(example = "00000000-0000-0000-0000-000000000000")]
    pub aaguid: String,
    /// Attestation statement format that was verified
    #[schema(example = "packed")]
    pub format: String,
    pub sign_count: u32,
    /// RFC 3339 registration time
    pub registered_at: String,
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, ApiError> {
    BASE64URL
        .decode(value.trim())
        .map_err(|e| ApiError::bad_request(format!("{name} is not valid base64url: {e}")))
}

/// POST /register/start
///
/// Start a registration for a new credential.
/// Returns a challenge that must be signed by the authenticator.
///
/// A username keeps the user handle it was first given, and the credentials
/// already registered to it are listed in `excludeCredentials`.
#[utoipa::path(
    post,
    path = "/register/start",
    tag = "Registration",
    request_body = StartRegistrationRequest,
    responses(
        (status = 200, description = "Registration challenge created (JSON with challenge_id and public_key options)"),
        (status = 400, description = "Invalid username"),
        (status = 500, description = "Failed to generate challenge"),
        (status = 503, description = "User storage unavailable")
    )
)]
pub async fn start_registration(
    State(state): State<AppState>,
    Json(req): Json<StartRegistrationRequest>,
) -> Result<Json<StartRegistrationResponse>, ApiError> {
    let username = req.username.trim();
    if username.is_empty() || username.len() > MAX_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "username must be 1 to {MAX_NAME_LEN} bytes"
        )));
    }
    let display_name = req
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(username);

    // Opaque user handle, never derived from the username
    let candidate = UserAccount::new(
        uuid::Uuid::new_v4().as_bytes().to_vec(),
        username,
        display_name,
    )?;
    let user = state.credentials.get_or_create(candidate).await?;

    let exclude: Vec<Vec<u8>> = state
        .credentials
        .find_by_user_id(&user.id)
        .await?
        .into_iter()
        .map(|c| c.credential_id)
        .collect();

    let challenge_id = uuid::Uuid::new_v4().to_string();
    let public_key = state
        .registrar
        .start(state.challenges.as_ref(), challenge_id.clone(), &user, &exclude)?;

    tracing::info!(
        challenge_id = %challenge_id,
        username = %username,
        excluded = exclude.len(),
        "Registration started"
    );

    Ok(Json(StartRegistrationResponse {
        challenge_id,
        public_key,
    }))
}

/// POST /register/finish
///
/// Complete a registration with the authenticator's response.
/// The challenge is consumed whether or not the ceremony succeeds.
#[utoipa::path(
    post,
    path = "/register/finish",
    tag = "Registration",
    request_body = FinishRegistrationRequest,
    responses(
        (status = 200, description = "Credential registered", body = RegisteredCredentialResponse),
        (status = 400, description = "Malformed response (bad base64, JSON or CBOR)"),
        (status = 409, description = "Credential id already registered"),
        (status = 422, description = "Ceremony check failed (challenge, origin, flags, attestation)"),
        (status = 503, description = "Credential storage unavailable")
    )
)]
pub async fn finish_registration(
    State(state): State<AppState>,
    Json(req): Json<FinishRegistrationRequest>,
) -> Result<Json<RegisteredCredentialResponse>, ApiError> {
    let client_data_json = decode_field("clientDataJSON", &req.response.client_data_json)?;
    let attestation_object = decode_field("attestationObject", &req.response.attestation_object)?;

    let mut response = RegistrationResponse::new(&client_data_json, &attestation_object);
    if let Some(results) = &req.response.client_extension_results {
        response = response.with_extension_results(results);
    }

    let credential = state
        .registrar
        .finish_session(
            state.challenges.as_ref(),
            &req.challenge_id,
            &response,
            state.credentials.as_ref(),
        )
        .await?;

    Ok(Json(RegisteredCredentialResponse {
        credential_id: URL_SAFE_NO_PAD.encode(&credential.credential_id),
        user_id: URL_SAFE_NO_PAD.encode(&credential.user_id),
        aaguid: uuid::Uuid::from_bytes(credential.aaguid).to_string(),
        format: credential.format,
        sign_count: credential.sign_count,
        registered_at: credential.registered_at.to_rfc3339(),
    }))
}
