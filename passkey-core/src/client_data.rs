//! Collected client data parsing and validation.

use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::{alphabet, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{CeremonyError, ClientDataCheck, Result};

/// `type` value for registration ceremonies.
pub const CREATE_TYPE: &str = "webauthn.create";

/// URL-safe alphabet, padding optional.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBinding {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// The client data JSON the browser signed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub type_: String,
    pub challenge: String,
    pub origin: String,
    #[serde(rename = "crossOrigin", default, skip_serializing_if = "Option::is_none")]
    pub cross_origin: Option<bool>,
    #[serde(rename = "tokenBinding", default, skip_serializing_if = "Option::is_none")]
    pub token_binding: Option<TokenBinding>,
}

impl CollectedClientData {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| CeremonyError::MalformedClientData(format!("not UTF-8: {e}")))?;
        serde_json::from_str(text).map_err(|e| CeremonyError::MalformedClientData(e.to_string()))
    }

    /// Check type, then challenge, then origin. The first failure wins.
    pub fn validate(&self, expected_challenge: &[u8], expected_origin: &str) -> Result<()> {
        if self.type_ != CREATE_TYPE {
            return Err(CeremonyError::client_data(
                ClientDataCheck::Type,
                format!("expected {CREATE_TYPE}, got {}", self.type_),
            ));
        }

        match decode_challenge(&self.challenge) {
            Some(bytes) if challenges_match(&bytes, expected_challenge) => {}
            Some(_) => {
                return Err(CeremonyError::client_data(
                    ClientDataCheck::Challenge,
                    "challenge does not match the issued challenge",
                ))
            }
            None => {
                return Err(CeremonyError::client_data(
                    ClientDataCheck::Challenge,
                    "challenge is not valid base64",
                ))
            }
        }

        if self.origin != expected_origin {
            return Err(CeremonyError::client_data(
                ClientDataCheck::Origin,
                format!("expected {expected_origin}, got {}", self.origin),
            ));
        }

        Ok(())
    }
}

/// Parse `raw` and validate it against the issued challenge and configured origin.
pub fn validate_client_data(
    raw: &[u8],
    expected_challenge: &[u8],
    expected_origin: &str,
) -> Result<CollectedClientData> {
    let client_data = CollectedClientData::parse(raw)?;
    client_data.validate(expected_challenge, expected_origin)?;
    Ok(client_data)
}

/// Decode challenge text: URL-safe base64 (padded or not), then standard base64.
pub fn decode_challenge(text: &str) -> Option<Vec<u8>> {
    URL_SAFE_LENIENT
        .decode(text)
        .or_else(|_| STANDARD.decode(text))
        .ok()
}

/// Constant-time comparison; slices of different lengths never match.
fn challenges_match(received: &[u8], expected: &[u8]) -> bool {
    bool::from(received.ct_eq(expected))
}

/// SHA-256 of the raw client data JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientDataHash([u8; 32]);

impl ClientDataHash {
    pub fn compute(raw_client_data: &[u8]) -> Self {
        Self(Sha256::digest(raw_client_data).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}
