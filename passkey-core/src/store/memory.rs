//! In-memory stores backed by `DashMap`.
//!
//! Challenges never need persistence. The credential and user stores are for
//! tests and development; their contents are lost on restart.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{
    ChallengeStore, Credential, CredentialStore, InsertError, PendingRegistration, StorageError,
    UserStore,
};
use crate::options::UserAccount;

/// Pending registrations keyed by session id.
#[derive(Default)]
pub struct MemoryChallengeStore {
    pending: DashMap<String, PendingRegistration>,
}

impl MemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove expired entries (called periodically)
    pub fn cleanup_expired(&self) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.pending.len())
    }

    /// Number of pending registrations
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl ChallengeStore for MemoryChallengeStore {
    fn issue(&self, session_id: String, pending: PendingRegistration) {
        self.pending.insert(session_id, pending);
    }

    fn consume(&self, session_id: &str) -> Option<PendingRegistration> {
        let (_, entry) = self.pending.remove(session_id)?;
        if entry.is_expired() {
            None
        } else {
            Some(entry)
        }
    }
}

impl std::fmt::Debug for MemoryChallengeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChallengeStore")
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Credentials keyed by credential id.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: DashMap<Vec<u8>, Credential>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_credential_id(
        &self,
        credential_id: &[u8],
    ) -> Result<Option<Credential>, StorageError> {
        Ok(self.credentials.get(credential_id).map(|c| c.clone()))
    }

    async fn find_by_user_id(&self, user_id: &[u8]) -> Result<Vec<Credential>, StorageError> {
        let mut owned: Vec<Credential> = self
            .credentials
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        owned.sort_by_key(|c| c.registered_at);
        Ok(owned)
    }

    async fn create_if_absent(&self, credential: Credential) -> Result<Credential, InsertError> {
        // The entry holds the shard lock until it is dropped.
        match self.credentials.entry(credential.credential_id.clone()) {
            Entry::Occupied(_) => Err(InsertError::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(credential.clone());
                Ok(credential)
            }
        }
    }

    async fn replace(&self, credential: Credential) -> Result<Option<Credential>, StorageError> {
        Ok(self
            .credentials
            .insert(credential.credential_id.clone(), credential))
    }
}

impl std::fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCredentialStore")
            .field("credentials", &self.credentials.len())
            .finish()
    }
}

/// Accounts keyed by name.
#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<String, UserAccount>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<UserAccount>, StorageError> {
        Ok(self.users.get(name).map(|u| u.clone()))
    }

    async fn get_or_create(&self, user: UserAccount) -> Result<UserAccount, StorageError> {
        Ok(self
            .users
            .entry(user.name.clone())
            .or_insert(user)
            .value()
            .clone())
    }
}

impl std::fmt::Debug for MemoryUserStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryUserStore")
            .field("users", &self.users.len())
            .finish()
    }
}
