//! Credential creation options sent to the browser at ceremony start.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Serialize;
use thiserror::Error;

use crate::cose::CoseAlgorithm;

/// Smallest challenge the ceremony accepts.
pub const MIN_CHALLENGE_LEN: usize = 16;
/// Length of generated challenges.
pub const CHALLENGE_LEN: usize = 32;
/// Largest user handle WebAuthn allows.
pub const MAX_USER_ID_LEN: usize = 64;

#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("Failed to generate challenge: {0}")]
    Randomness(String),

    #[error("User id must be 1 to {MAX_USER_ID_LEN} bytes, got {0}")]
    InvalidUserId(usize),
}

/// Random bytes a client must sign over. Compared by exact byte equality.
#[derive(Clone, PartialEq, Eq)]
pub struct Challenge(Vec<u8>);

impl Challenge {
    pub fn generate() -> Result<Self, OptionsError> {
        let mut bytes = vec![0u8; CHALLENGE_LEN];
        getrandom::fill(&mut bytes).map_err(|e| OptionsError::Randomness(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Wrap existing bytes, rejecting anything shorter than [`MIN_CHALLENGE_LEN`].
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        (bytes.len() >= MIN_CHALLENGE_LEN).then_some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Challenge").field(&self.0.len()).finish()
    }
}

/// The account a credential is being created for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub id: Vec<u8>,
    pub name: String,
    pub display_name: String,
}

impl UserAccount {
    pub fn new(
        id: Vec<u8>,
        name: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Result<Self, OptionsError> {
        if id.is_empty() || id.len() > MAX_USER_ID_LEN {
            return Err(OptionsError::InvalidUserId(id.len()));
        }
        Ok(Self {
            id,
            name: name.into(),
            display_name: display_name.into(),
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RpEntity {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserEntity {
    /// base64url, unpadded.
    pub id: String,
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CredentialParameter {
    #[serde(rename = "type")]
    pub type_: &'static str,
    pub alg: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CredentialDescriptor {
    #[serde(rename = "type")]
    pub type_: &'static str,
    pub id: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Required,
    Preferred,
    Discouraged,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResidentKeyRequirement {
    Required,
    Preferred,
    Discouraged,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyance {
    None,
    Indirect,
    Direct,
    Enterprise,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuthenticatorSelection {
    #[serde(rename = "residentKey")]
    pub resident_key: ResidentKeyRequirement,
    #[serde(rename = "requireResidentKey")]
    pub require_resident_key: bool,
    #[serde(rename = "userVerification")]
    pub user_verification: UserVerificationRequirement,
}

/// `PublicKeyCredentialCreationOptions` as consumed by `navigator.credentials.create`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PublicKeyCredentialCreationOptions {
    pub rp: RpEntity,
    pub user: UserEntity,
    pub challenge: String,
    #[serde(rename = "pubKeyCredParams")]
    pub pub_key_cred_params: Vec<CredentialParameter>,
    pub timeout: u32,
    #[serde(rename = "excludeCredentials")]
    pub exclude_credentials: Vec<CredentialDescriptor>,
    #[serde(rename = "authenticatorSelection")]
    pub authenticator_selection: AuthenticatorSelection,
    pub attestation: AttestationConveyance,
    pub extensions: serde_json::Map<String, serde_json::Value>,
}

/// Algorithms offered to authenticators, most preferred first.
pub const SUPPORTED_ALGORITHMS: [CoseAlgorithm; 3] =
    [CoseAlgorithm::Es256, CoseAlgorithm::EdDsa, CoseAlgorithm::Rs256];

pub(crate) struct OptionsInput<'a> {
    pub rp_id: &'a str,
    pub rp_name: &'a str,
    pub user: &'a UserAccount,
    pub challenge: &'a Challenge,
    pub timeout_ms: u32,
    pub require_user_verification: bool,
    pub exclude_credentials: &'a [Vec<u8>],
}

pub(crate) fn creation_options(input: OptionsInput<'_>) -> PublicKeyCredentialCreationOptions {
    PublicKeyCredentialCreationOptions {
        rp: RpEntity {
            id: input.rp_id.to_string(),
            name: input.rp_name.to_string(),
        },
        user: UserEntity {
            id: URL_SAFE_NO_PAD.encode(&input.user.id),
            name: input.user.name.clone(),
            display_name: input.user.display_name.clone(),
        },
        challenge: input.challenge.to_base64url(),
        pub_key_cred_params: SUPPORTED_ALGORITHMS
            .iter()
            .map(|alg| CredentialParameter {
                type_: "public-key",
                alg: alg.id(),
            })
            .collect(),
        timeout: input.timeout_ms,
        exclude_credentials: input
            .exclude_credentials
            .iter()
            .map(|id| CredentialDescriptor {
                type_: "public-key",
                id: URL_SAFE_NO_PAD.encode(id),
            })
            .collect(),
        authenticator_selection: AuthenticatorSelection {
            resident_key: ResidentKeyRequirement::Preferred,
            require_resident_key: false,
            user_verification: if input.require_user_verification {
                UserVerificationRequirement::Required
            } else {
                UserVerificationRequirement::Preferred
            },
        },
        attestation: AttestationConveyance::Direct,
        extensions: serde_json::Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_challenges_differ() {
        let a = Challenge::generate().unwrap();
        let b = Challenge::generate().unwrap();
        assert_eq!(a.as_bytes().len(), CHALLENGE_LEN);
        assert_ne!(a, b);
        assert_eq!(format!("{a:?}"), "Challenge(32)");
    }

    #[test]
    fn test_short_challenge_rejected() {
        assert!(Challenge::from_bytes(vec![0; 15]).is_none());
        assert!(Challenge::from_bytes(vec![0; 16]).is_some());
    }

    #[test]
    fn test_user_id_bounds() {
        assert!(UserAccount::new(vec![], "a", "A").is_err());
        assert!(UserAccount::new(vec![1; 65], "a", "A").is_err());
        assert!(UserAccount::new(vec![1; 64], "a", "A").is_ok());
    }

    #[test]
    fn test_options_json_shape() {
        let user = UserAccount::new(b"user-1".to_vec(), "alice", "Alice").unwrap();
        let challenge = Challenge::from_bytes(vec![0xff; 16]).unwrap();
        let options = creation_options(OptionsInput {
            rp_id: "example.com",
            rp_name: "Example",
            user: &user,
            challenge: &challenge,
            timeout_ms: 60_000,
            require_user_verification: true,
            exclude_credentials: &[vec![1, 2, 3]],
        });

        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["rp"]["id"], "example.com");
        assert_eq!(json["user"]["id"], "dXNlci0x");
        assert_eq!(json["user"]["displayName"], "Alice");
        assert_eq!(json["challenge"], "_____________________w");
        assert_eq!(json["pubKeyCredParams"][0]["alg"], -7);
        assert_eq!(json["pubKeyCredParams"][1]["alg"], -8);
        assert_eq!(json["excludeCredentials"][0]["id"], "AQID");
        assert_eq!(json["authenticatorSelection"]["userVerification"], "required");
        assert_eq!(json["attestation"], "direct");
        assert!(json["extensions"].as_object().unwrap().is_empty());
    }
}
