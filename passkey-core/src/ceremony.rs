//! The registration ceremony.
//!
//! [`Registrar::validate`] runs steps 1 to 7 synchronously and yields a
//! [`ValidatedRegistration`]; [`Registrar::register`] is step 8 against a
//! [`CredentialStore`]. [`Registrar::finish`] and [`Registrar::finish_session`]
//! chain the two and log the outcome. The first failing step ends the ceremony.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::attestation::{AttestationObject, VerifierRegistry};
use crate::authenticator_data::AuthenticatorData;
use crate::client_data::{ClientDataHash, CollectedClientData};
use crate::error::{AuthenticatorDataCheck, CeremonyError, CeremonyStep, ClientDataCheck, Result};
use crate::options::{self, Challenge, OptionsError, OptionsInput, PublicKeyCredentialCreationOptions, UserAccount};
use crate::store::{ChallengeStore, Credential, CredentialStore, InsertError, PendingRegistration};

/// Default lifetime of an issued challenge.
pub const DEFAULT_CHALLENGE_TTL: Duration = Duration::from_secs(300);
/// Default client-side timeout advertised in creation options.
pub const DEFAULT_TIMEOUT_MS: u32 = 60_000;

#[derive(Error, Debug)]
pub enum RelyingPartyError {
    #[error("Relying party id must not be empty")]
    EmptyId,

    #[error("Invalid relying party origin {origin}: {reason}")]
    InvalidOrigin { origin: String, reason: String },
}

/// The relying party credentials are registered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelyingParty {
    id: String,
    origin: String,
    name: String,
    require_user_verification: bool,
}

impl RelyingParty {
    pub fn new(
        id: impl Into<String>,
        origin: impl Into<String>,
        name: impl Into<String>,
    ) -> std::result::Result<Self, RelyingPartyError> {
        let id = id.into();
        let origin = origin.into();
        if id.is_empty() {
            return Err(RelyingPartyError::EmptyId);
        }

        let parsed = url::Url::parse(&origin).map_err(|e| RelyingPartyError::InvalidOrigin {
            origin: origin.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(RelyingPartyError::InvalidOrigin {
                origin,
                reason: "expected an http(s) origin with a host".into(),
            });
        }

        Ok(Self {
            id,
            origin,
            name: name.into(),
            require_user_verification: false,
        })
    }

    pub fn with_user_verification(mut self, required: bool) -> Self {
        self.require_user_verification = required;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn require_user_verification(&self) -> bool {
        self.require_user_verification
    }

    pub fn rp_id_hash(&self) -> [u8; 32] {
        Sha256::digest(self.id.as_bytes()).into()
    }
}

/// Client-side extension output checks (step 6).
pub trait ExtensionValidator: Send + Sync {
    fn validate(
        &self,
        client_extension_results: Option<&serde_json::Value>,
        authenticator_data: &AuthenticatorData,
    ) -> std::result::Result<(), String>;
}

/// Accepts any extension outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllExtensions;

impl ExtensionValidator for AcceptAllExtensions {
    fn validate(
        &self,
        _client_extension_results: Option<&serde_json::Value>,
        _authenticator_data: &AuthenticatorData,
    ) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// What to do when a credential id is already registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    #[default]
    Reject,
    /// Overwrite the existing credential, whoever owns it.
    ReplaceExisting,
}

/// The client's response to `navigator.credentials.create`, raw.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationResponse<'a> {
    pub client_data_json: &'a [u8],
    pub attestation_object: &'a [u8],
    pub client_extension_results: Option<&'a serde_json::Value>,
}

impl<'a> RegistrationResponse<'a> {
    pub fn new(client_data_json: &'a [u8], attestation_object: &'a [u8]) -> Self {
        Self {
            client_data_json,
            attestation_object,
            client_extension_results: None,
        }
    }

    pub fn with_extension_results(mut self, results: &'a serde_json::Value) -> Self {
        self.client_extension_results = Some(results);
        self
    }
}

/// A response that passed steps 1 to 7.
#[derive(Debug, Clone)]
pub struct ValidatedRegistration {
    client_data: CollectedClientData,
    client_data_hash: ClientDataHash,
    attestation: AttestationObject,
}

impl ValidatedRegistration {
    pub fn client_data(&self) -> &CollectedClientData {
        &self.client_data
    }

    pub fn client_data_hash(&self) -> &ClientDataHash {
        &self.client_data_hash
    }

    pub fn attestation(&self) -> &AttestationObject {
        &self.attestation
    }

    pub fn credential_id(&self) -> Option<&[u8]> {
        self.attestation
            .authenticator_data()
            .attested_credential_data()
            .map(|c| c.credential_id())
    }

    pub fn user_verified(&self) -> bool {
        self.attestation.authenticator_data().flags().user_verified()
    }

    fn to_credential(&self, user_id: &[u8]) -> Result<Credential> {
        let authenticator_data = self.attestation.authenticator_data();
        let attested = authenticator_data.attested_credential_data().ok_or_else(|| {
            CeremonyError::authenticator_data(
                AuthenticatorDataCheck::AttestedCredentialData,
                "no attested credential data",
            )
        })?;
        Ok(Credential {
            credential_id: attested.credential_id().to_vec(),
            user_id: user_id.to_vec(),
            public_key: attested.credential_public_key().to_vec(),
            sign_count: authenticator_data.sign_count(),
            aaguid: *attested.aaguid(),
            format: self.attestation.format().to_string(),
            registered_at: Utc::now(),
        })
    }
}

/// Runs registration ceremonies for one relying party.
#[derive(Clone)]
pub struct Registrar {
    relying_party: RelyingParty,
    verifiers: Arc<VerifierRegistry>,
    extensions: Arc<dyn ExtensionValidator>,
    duplicate_policy: DuplicatePolicy,
    challenge_ttl: Duration,
    timeout_ms: u32,
}

impl Registrar {
    pub fn new(relying_party: RelyingParty, verifiers: Arc<VerifierRegistry>) -> Self {
        Self {
            relying_party,
            verifiers,
            extensions: Arc::new(AcceptAllExtensions),
            duplicate_policy: DuplicatePolicy::default(),
            challenge_ttl: DEFAULT_CHALLENGE_TTL,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_extension_validator(mut self, validator: Arc<dyn ExtensionValidator>) -> Self {
        self.extensions = validator;
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn with_challenge_ttl(mut self, ttl: Duration) -> Self {
        self.challenge_ttl = ttl;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn relying_party(&self) -> &RelyingParty {
        &self.relying_party
    }

    pub fn verifiers(&self) -> &VerifierRegistry {
        &self.verifiers
    }

    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.duplicate_policy
    }

    /// Begin a ceremony: issue a fresh challenge under `session_id` and build
    /// the creation options for the client.
    pub fn start<C>(
        &self,
        challenges: &C,
        session_id: impl Into<String>,
        user: &UserAccount,
        exclude_credentials: &[Vec<u8>],
    ) -> std::result::Result<PublicKeyCredentialCreationOptions, OptionsError>
    where
        C: ChallengeStore + ?Sized,
    {
        let challenge = Challenge::generate()?;
        let options = options::creation_options(OptionsInput {
            rp_id: self.relying_party.id(),
            rp_name: self.relying_party.name(),
            user,
            challenge: &challenge,
            timeout_ms: self.timeout_ms,
            require_user_verification: self.relying_party.require_user_verification(),
            exclude_credentials,
        });

        let session_id = session_id.into();
        tracing::debug!(session_id = %session_id, user = %user.name, "registration challenge issued");
        challenges.issue(
            session_id,
            PendingRegistration {
                user_id: user.id.clone(),
                challenge,
                expires_at: Instant::now() + self.challenge_ttl,
            },
        );
        Ok(options)
    }

    /// Steps 1 to 7.
    pub fn validate(
        &self,
        response: &RegistrationResponse<'_>,
        expected_challenge: &[u8],
    ) -> Result<ValidatedRegistration> {
        // 1. Parse client data
        let client_data = CollectedClientData::parse(response.client_data_json)?;

        // 2. Validate client data: type, challenge, origin
        client_data.validate(expected_challenge, self.relying_party.origin())?;

        // 3. Hash the raw client data JSON
        let client_data_hash = ClientDataHash::compute(response.client_data_json);

        // 4. Decode the attestation object, authenticator data and COSE key
        let attestation = AttestationObject::decode(response.attestation_object)?;
        tracing::debug!(
            step = %CeremonyStep::DecodeAttestationObject,
            format = %attestation.format(),
            "attestation object decoded"
        );

        // 5. Validate authenticator data
        self.validate_authenticator_data(attestation.authenticator_data())?;

        // 6. Validate client extension outputs
        self.extensions
            .validate(
                response.client_extension_results,
                attestation.authenticator_data(),
            )
            .map_err(CeremonyError::InvalidExtensionOutputs)?;

        // 7. Verify the attestation statement
        self.verifiers.verify(&attestation, &client_data_hash)?;
        tracing::debug!(
            step = %CeremonyStep::VerifyAttestationStatement,
            format = %attestation.format(),
            "attestation statement verified"
        );

        Ok(ValidatedRegistration {
            client_data,
            client_data_hash,
            attestation,
        })
    }

    fn validate_authenticator_data(&self, data: &AuthenticatorData) -> Result<()> {
        if data.rp_id_hash() != &self.relying_party.rp_id_hash() {
            return Err(CeremonyError::authenticator_data(
                AuthenticatorDataCheck::RpIdHash,
                format!("rpIdHash is not SHA-256 of {}", self.relying_party.id()),
            ));
        }
        let flags = data.flags();
        if !flags.user_present() {
            return Err(CeremonyError::authenticator_data(
                AuthenticatorDataCheck::UserPresent,
                "user presence flag is not set",
            ));
        }
        if self.relying_party.require_user_verification() && !flags.user_verified() {
            return Err(CeremonyError::authenticator_data(
                AuthenticatorDataCheck::UserVerified,
                "user verification is required but the flag is not set",
            ));
        }
        if data.attested_credential_data().is_none() {
            return Err(CeremonyError::authenticator_data(
                AuthenticatorDataCheck::AttestedCredentialData,
                "no attested credential data",
            ));
        }
        Ok(())
    }

    /// Step 8: store the credential for `user_id`.
    pub async fn register<S>(
        &self,
        validated: &ValidatedRegistration,
        user_id: &[u8],
        store: &S,
    ) -> Result<Credential>
    where
        S: CredentialStore + ?Sized,
    {
        let credential = validated.to_credential(user_id)?;

        if store
            .find_by_credential_id(&credential.credential_id)
            .await?
            .is_some()
        {
            return self.on_duplicate(credential, store).await;
        }

        match store.create_if_absent(credential.clone()).await {
            Ok(stored) => Ok(stored),
            // Lost a race with a concurrent registration of the same id.
            Err(InsertError::AlreadyExists) => self.on_duplicate(credential, store).await,
            Err(InsertError::Storage(e)) => Err(e.into()),
        }
    }

    async fn on_duplicate<S>(&self, credential: Credential, store: &S) -> Result<Credential>
    where
        S: CredentialStore + ?Sized,
    {
        match self.duplicate_policy {
            DuplicatePolicy::Reject => Err(CeremonyError::CredentialAlreadyRegistered),
            DuplicatePolicy::ReplaceExisting => {
                let previous = store.replace(credential.clone()).await?;
                tracing::warn!(
                    credential = %hex_prefix(&credential.credential_id),
                    owner_changed = previous.as_ref().is_some_and(|p| p.user_id != credential.user_id),
                    "replaced existing credential"
                );
                Ok(credential)
            }
        }
    }

    /// Validate and register against an already consumed pending registration.
    pub async fn finish<S>(
        &self,
        pending: &PendingRegistration,
        response: &RegistrationResponse<'_>,
        store: &S,
    ) -> Result<Credential>
    where
        S: CredentialStore + ?Sized,
    {
        let outcome = match self.validate(response, pending.challenge.as_bytes()) {
            Ok(validated) => self.register(&validated, &pending.user_id, store).await,
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(credential) => tracing::info!(
                credential = %hex_prefix(&credential.credential_id),
                format = %credential.format,
                sign_count = credential.sign_count,
                "credential registered"
            ),
            Err(e) => tracing::warn!(
                step = %e.step(),
                code = e.kind().code(),
                error = %e,
                "registration ceremony failed"
            ),
        }
        outcome
    }

    /// Consume the challenge issued for `session_id`, then [`finish`](Self::finish).
    ///
    /// The challenge is gone afterwards whatever the outcome; presenting the
    /// same session again fails the challenge check.
    pub async fn finish_session<C, S>(
        &self,
        challenges: &C,
        session_id: &str,
        response: &RegistrationResponse<'_>,
        store: &S,
    ) -> Result<Credential>
    where
        C: ChallengeStore + ?Sized,
        S: CredentialStore + ?Sized,
    {
        let Some(pending) = challenges.consume(session_id) else {
            tracing::warn!(session_id, "no pending registration for session");
            return Err(CeremonyError::client_data(
                ClientDataCheck::Challenge,
                "no pending challenge for this session (expired or already used)",
            ));
        };
        self.finish(&pending, response, store).await
    }
}

impl std::fmt::Debug for Registrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrar")
            .field("relying_party", &self.relying_party)
            .field("verifiers", &self.verifiers)
            .field("duplicate_policy", &self.duplicate_policy)
            .field("challenge_ttl", &self.challenge_ttl)
            .finish()
    }
}

/// First 8 bytes of an id, hex encoded, for logs.
fn hex_prefix(id: &[u8]) -> String {
    hex::encode(&id[..id.len().min(8)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relying_party_validation() {
        assert!(RelyingParty::new("example.com", "https://example.com", "Example").is_ok());
        assert!(matches!(
            RelyingParty::new("", "https://example.com", "Example"),
            Err(RelyingPartyError::EmptyId)
        ));
        assert!(matches!(
            RelyingParty::new("example.com", "not a url", "Example"),
            Err(RelyingPartyError::InvalidOrigin { .. })
        ));
        assert!(matches!(
            RelyingParty::new("example.com", "ftp://example.com", "Example"),
            Err(RelyingPartyError::InvalidOrigin { .. })
        ));
    }

    #[test]
    fn test_rp_id_hash() {
        let rp = RelyingParty::new("example.com", "https://example.com", "Example").unwrap();
        assert_eq!(
            hex::encode(rp.rp_id_hash()),
            "a379a6f6eeafb9a55e378c118034e2751e682fab9f2d30ab13d2125586ce1947"
        );
    }

    #[test]
    fn test_hex_prefix() {
        assert_eq!(hex_prefix(&[0xab; 20]), "abababababababab");
        assert_eq!(hex_prefix(&[1, 2]), "0102");
    }

    #[test]
    fn test_start_issues_pending_registration() {
        use crate::store::MemoryChallengeStore;

        let rp = RelyingParty::new("example.com", "https://example.com", "Example")
            .unwrap()
            .with_user_verification(true);
        let registrar = Registrar::new(rp, Arc::new(VerifierRegistry::with_builtin_verifiers()));
        let challenges = MemoryChallengeStore::new();
        let user = UserAccount::new(b"user-1".to_vec(), "alice", "Alice").unwrap();

        let options = registrar.start(&challenges, "session-1", &user, &[]).unwrap();
        assert_eq!(options.rp.id, "example.com");
        assert_eq!(options.timeout, DEFAULT_TIMEOUT_MS);

        let pending = challenges.consume("session-1").unwrap();
        assert_eq!(pending.user_id, b"user-1");
        assert_eq!(pending.challenge.to_base64url(), options.challenge);
    }
}
