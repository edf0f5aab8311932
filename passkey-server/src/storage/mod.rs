//! Credential storage selection
//!
//! Registered credentials and user accounts live in PostgreSQL when `DATABASE_URL`
//! is set and in memory otherwise (useful for development, but both are lost on restart).
//! Pending challenges are always kept in memory; see [`passkey_core::MemoryChallengeStore`].

mod postgres;

pub use postgres::PostgresCredentialStore;

use async_trait::async_trait;
use passkey_core::{
    Credential, CredentialStore, InsertError, MemoryCredentialStore, MemoryUserStore, StorageError,
    UserAccount, UserStore,
};

use crate::config::Config;

/// Credential and user storage backend
pub enum CredentialBackend {
    /// PostgreSQL storage (production)
    Postgres(PostgresCredentialStore),
    /// In-memory storage (development fallback)
    Memory {
        credentials: MemoryCredentialStore,
        users: MemoryUserStore,
    },
}

impl CredentialBackend {
    /// Create storage with PostgreSQL backend
    pub async fn with_postgres(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pg_store = PostgresCredentialStore::new(database_url, max_connections).await?;
        pg_store.migrate().await?;
        Ok(Self::Postgres(pg_store))
    }

    /// Create storage with in-memory backend (development only)
    pub fn in_memory() -> Self {
        tracing::warn!("Using in-memory credential storage - credentials will be lost on restart!");
        Self::Memory {
            credentials: MemoryCredentialStore::new(),
            users: MemoryUserStore::new(),
        }
    }

    /// Uses PostgreSQL if `database_url` is configured, otherwise falls back to in-memory.
    pub async fn from_config(config: &Config) -> Result<Self, StorageError> {
        match &config.database_url {
            Some(url) => {
                tracing::info!("Using PostgreSQL credential storage");
                Self::with_postgres(url, config.database_max_connections).await
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory storage");
                Ok(Self::in_memory())
            }
        }
    }

    /// Check if using persistent storage
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Postgres(_))
    }

    /// Check database health (always Ok for memory backend)
    pub async fn check_health(&self) -> Result<(), StorageError> {
        match self {
            Self::Postgres(pg) => pg.check_health().await,
            Self::Memory { .. } => Ok(()),
        }
    }
}

#[async_trait]
impl CredentialStore for CredentialBackend {
    async fn find_by_credential_id(
        &self,
        credential_id: &[u8],
    ) -> Result<Option<Credential>, StorageError> {
        match self {
            Self::Postgres(pg) => pg.find_by_credential_id(credential_id).await,
            Self::Memory { credentials, .. } => credentials.find_by_credential_id(credential_id).await,
        }
    }

    async fn find_by_user_id(&self, user_id: &[u8]) -> Result<Vec<Credential>, StorageError> {
        match self {
            Self::Postgres(pg) => pg.find_by_user_id(user_id).await,
            Self::Memory { credentials, .. } => credentials.find_by_user_id(user_id).await,
        }
    }

    async fn create_if_absent(&self, credential: Credential) -> Result<Credential, InsertError> {
        match self {
            Self::Postgres(pg) => pg.create_if_absent(credential).await,
            Self::Memory { credentials, .. } => credentials.create_if_absent(credential).await,
        }
    }

    async fn replace(&self, credential: Credential) -> Result<Option<Credential>, StorageError> {
        match self {
            Self::Postgres(pg) => pg.replace(credential).await,
            Self::Memory { credentials, .. } => credentials.replace(credential).await,
        }
    }
}

#[async_trait]
impl UserStore for CredentialBackend {
    async fn find_by_name(&self, name: &str) -> Result<Option<UserAccount>, StorageError> {
        match self {
            Self::Postgres(pg) => pg.find_by_name(name).await,
            Self::Memory { users, .. } => users.find_by_name(name).await,
        }
    }

    async fn get_or_create(&self, user: UserAccount) -> Result<UserAccount, StorageError> {
        match self {
            Self::Postgres(pg) => pg.get_or_create(user).await,
            Self::Memory { users, .. } => users.get_or_create(user).await,
        }
    }
}

impl std::fmt::Debug for CredentialBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match self {
            Self::Postgres(_) => "PostgreSQL",
            Self::Memory { .. } => "Memory",
        };
        f.debug_struct("CredentialBackend")
            .field("backend", &backend)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_backend() {
        let backend = CredentialBackend::from_config(&Config::default()).await.unwrap();
        assert!(!backend.is_persistent());
        assert!(backend.check_health().await.is_ok());
        assert!(backend.find_by_credential_id(b"missing").await.unwrap().is_none());
        assert!(backend.find_by_user_id(b"nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_backend_keeps_users() {
        let backend = CredentialBackend::in_memory();
        let first = UserAccount::new(vec![1; 16], "alice", "Alice").unwrap();
        let second = UserAccount::new(vec![2; 16], "alice", "Alice").unwrap();

        assert_eq!(backend.get_or_create(first).await.unwrap().id, vec![1; 16]);
        assert_eq!(backend.get_or_create(second).await.unwrap().id, vec![1; 16]);
        assert!(backend.find_by_name("bob").await.unwrap().is_none());
    }
}
