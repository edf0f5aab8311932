//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;

use passkey_core::{
    DuplicatePolicy, MemoryChallengeStore, Registrar, RelyingPartyError, StorageError,
    VerifierRegistry,
};
use thiserror::Error;

use crate::config::Config;
use crate::storage::CredentialBackend;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Invalid relying party configuration: {0}")]
    RelyingParty(#[from] RelyingPartyError),

    #[error("Credential storage unavailable: {0}")]
    Storage(#[from] StorageError),
}

/// Application state containing shared resources.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Ceremony orchestrator with the built-in attestation verifiers
    pub registrar: Arc<Registrar>,
    /// Pending registrations keyed by challenge id (always in memory)
    pub challenges: Arc<MemoryChallengeStore>,
    /// Registered credentials (PostgreSQL or memory fallback)
    pub credentials: Arc<CredentialBackend>,
}

impl AppState {
    /// Build state from configuration, connecting to the database when configured.
    pub async fn from_config(config: &Config) -> Result<Self, StateError> {
        let credentials = CredentialBackend::from_config(config).await?;
        Self::with_backend(config, credentials)
    }

    /// Build state with in-memory credential storage (for testing)
    pub fn in_memory(config: &Config) -> Result<Self, StateError> {
        Self::with_backend(config, CredentialBackend::in_memory())
    }

    fn with_backend(config: &Config, credentials: CredentialBackend) -> Result<Self, StateError> {
        let policy = if config.allow_credential_replacement {
            DuplicatePolicy::ReplaceExisting
        } else {
            DuplicatePolicy::Reject
        };

        let registrar = Registrar::new(
            config.relying_party()?,
            Arc::new(VerifierRegistry::with_builtin_verifiers()),
        )
        .with_duplicate_policy(policy)
        .with_challenge_ttl(config.challenge_ttl())
        .with_timeout_ms(config.registration_timeout_ms);

        tracing::info!(
            rp_id = %registrar.relying_party().id(),
            origin = %registrar.relying_party().origin(),
            formats = ?registrar.verifiers().formats(),
            "Registrar configured"
        );

        Ok(Self {
            registrar: Arc::new(registrar),
            challenges: Arc::new(MemoryChallengeStore::new()),
            credentials: Arc::new(credentials),
        })
    }
}
