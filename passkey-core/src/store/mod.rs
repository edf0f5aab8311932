//! Storage contracts for registration ceremonies.
//!
//! - **Challenges** are short-lived and single use. [`ChallengeStore::consume`]
//!   removes the pending registration before checking its expiry, so a challenge
//!   can never be presented twice.
//! - **Users** map an account name to a stable user handle, so every passkey
//!   registered under one name joins the same account.
//! - **Credentials** are durable. [`CredentialStore::create_if_absent`] is the
//!   one atomic check-and-insert that makes registration at-most-once per
//!   credential id.
//!
//! In-memory implementations live in [`memory`]; the server crate adds PostgreSQL.

pub mod memory;

pub use memory::{MemoryChallengeStore, MemoryCredentialStore, MemoryUserStore};

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::options::{Challenge, UserAccount};

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Outcome of a failed [`CredentialStore::create_if_absent`].
#[derive(Debug, thiserror::Error)]
pub enum InsertError {
    #[error("Credential id already exists")]
    AlreadyExists,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A registered credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub credential_id: Vec<u8>,
    pub user_id: Vec<u8>,
    /// COSE_Key bytes as sent by the authenticator.
    pub public_key: Vec<u8>,
    pub sign_count: u32,
    pub aaguid: [u8; 16],
    pub format: String,
    pub registered_at: DateTime<Utc>,
}

/// Durable credential storage.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_credential_id(
        &self,
        credential_id: &[u8],
    ) -> Result<Option<Credential>, StorageError>;

    /// All credentials bound to `user_id`, used to fill `excludeCredentials`.
    async fn find_by_user_id(&self, user_id: &[u8]) -> Result<Vec<Credential>, StorageError>;

    /// Insert `credential` unless its id is already taken. Must be atomic:
    /// of any number of concurrent calls with one id, exactly one succeeds.
    async fn create_if_absent(&self, credential: Credential) -> Result<Credential, InsertError>;

    /// Overwrite (or insert) `credential`, returning whatever it displaced.
    async fn replace(&self, credential: Credential) -> Result<Option<Credential>, StorageError>;
}

/// Accounts keyed by name.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<UserAccount>, StorageError>;

    /// Return the account stored under `user.name`, storing `user` first if
    /// there is none. Atomic per name: concurrent calls agree on one handle.
    async fn get_or_create(&self, user: UserAccount) -> Result<UserAccount, StorageError>;
}

/// A registration ceremony waiting for the client's response.
#[derive(Debug, Clone)]
pub struct PendingRegistration {
    pub user_id: Vec<u8>,
    pub challenge: Challenge,
    pub expires_at: Instant,
}

impl PendingRegistration {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Instant::now()
    }
}

/// Session-keyed pending registrations.
pub trait ChallengeStore: Send + Sync {
    fn issue(&self, session_id: String, pending: PendingRegistration);

    /// Remove and return the pending registration, or `None` if it is unknown,
    /// already consumed or expired.
    fn consume(&self, session_id: &str) -> Option<PendingRegistration>;
}
