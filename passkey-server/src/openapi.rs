//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3.0 document served at `/api-docs/openapi.json`.

use axum::Json;
use utoipa::OpenApi;

use crate::handlers::{
    AuthenticatorResponse, FinishRegistrationRequest, HealthResponse, ReadyResponse,
    RegisteredCredentialResponse, StartRegistrationRequest,
};

/// Passkey registration API - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Passkey Registration API",
        version = "0.1.0",
        description = r#"
## WebAuthn credential registration

A relying party endpoint for `navigator.credentials.create()`:

1. **Start** via `POST /register/start` to receive a challenge and creation options
2. Pass `public_key` to the browser and let the authenticator create a credential
3. **Finish** via `POST /register/finish` with the base64url `clientDataJSON` and `attestationObject`

The finish call checks client data (type, challenge, origin), authenticator data
(rpIdHash, user presence, user verification when required), the attestation
statement (`none`, `packed`, `fido-u2f`) and stores the credential at most once.
Every failure carries a stable `code` and the ceremony `step` that rejected it.
"#,
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    ),
    tags(
        (name = "Registration", description = "WebAuthn registration ceremony"),
        (name = "Health", description = "Service health and readiness endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::ready,
        crate::handlers::registration::start_registration,
        crate::handlers::registration::finish_registration,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            StartRegistrationRequest,
            FinishRegistrationRequest,
            AuthenticatorResponse,
            RegisteredCredentialResponse,
        )
    )
)]
pub struct ApiDoc;

/// GET /api-docs/openapi.json
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_registration_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/register/start"));
        assert!(doc.paths.paths.contains_key("/register/finish"));
        assert!(doc.paths.paths.contains_key("/health"));
    }
}
