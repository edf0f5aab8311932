//! PostgreSQL implementation of the credential and user stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use passkey_core::{Credential, CredentialStore, InsertError, StorageError, UserAccount, UserStore};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed credential and user store.
#[derive(Clone)]
pub struct PostgresCredentialStore {
    pool: PgPool,
}

/// Row type for database queries.
#[derive(FromRow)]
struct CredentialRow {
    credential_id: Vec<u8>,
    user_id: Vec<u8>,
    public_key: Vec<u8>,
    sign_count: i64,
    aaguid: Vec<u8>,
    format: String,
    registered_at: DateTime<Utc>,
}

impl TryFrom<CredentialRow> for Credential {
    type Error = StorageError;

    fn try_from(row: CredentialRow) -> Result<Self, Self::Error> {
        let aaguid: [u8; 16] = row.aaguid.as_slice().try_into().map_err(|_| {
            StorageError::Serialization(format!("aaguid has {} bytes", row.aaguid.len()))
        })?;
        let sign_count = u32::try_from(row.sign_count).map_err(|_| {
            StorageError::Serialization(format!("sign_count {} out of range", row.sign_count))
        })?;

        Ok(Self {
            credential_id: row.credential_id,
            user_id: row.user_id,
            public_key: row.public_key,
            sign_count,
            aaguid,
            format: row.format,
            registered_at: row.registered_at,
        })
    }
}

#[derive(FromRow)]
struct UserRow {
    user_id: Vec<u8>,
    name: String,
    display_name: String,
}

impl TryFrom<UserRow> for UserAccount {
    type Error = StorageError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        UserAccount::new(row.user_id, row.name, row.display_name)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

fn query_error(e: sqlx::Error) -> StorageError {
    StorageError::Query(e.to_string())
}

impl PostgresCredentialStore {
    /// Connect to the database. Call [`migrate`](Self::migrate) before use.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;

        tracing::info!("Credential store connected and migrations applied");
        Ok(())
    }

    pub async fn check_health(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    async fn find_by_credential_id(
        &self,
        credential_id: &[u8],
    ) -> Result<Option<Credential>, StorageError> {
        let row: Option<CredentialRow> = sqlx::query_as(
            r#"
            SELECT credential_id, user_id, public_key, sign_count, aaguid, format, registered_at
            FROM credentials
            WHERE credential_id = $1
            "#,
        )
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.map(Credential::try_from).transpose()
    }

    async fn find_by_user_id(&self, user_id: &[u8]) -> Result<Vec<Credential>, StorageError> {
        let rows: Vec<CredentialRow> = sqlx::query_as(
            r#"
            SELECT credential_id, user_id, public_key, sign_count, aaguid, format, registered_at
            FROM credentials
            WHERE user_id = $1
            ORDER BY registered_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.into_iter().map(Credential::try_from).collect()
    }

    /// Relies on the primary key: of concurrent inserts for one id, only one
    /// returns a row.
    async fn create_if_absent(&self, credential: Credential) -> Result<Credential, InsertError> {
        let inserted: Option<CredentialRow> = sqlx::query_as(
            r#"
            INSERT INTO credentials
                (credential_id, user_id, public_key, sign_count, aaguid, format, registered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (credential_id) DO NOTHING
            RETURNING credential_id, user_id, public_key, sign_count, aaguid, format, registered_at
            "#,
        )
        .bind(&credential.credential_id)
        .bind(&credential.user_id)
        .bind(&credential.public_key)
        .bind(i64::from(credential.sign_count))
        .bind(credential.aaguid.as_slice())
        .bind(&credential.format)
        .bind(credential.registered_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        match inserted {
            Some(row) => {
                tracing::debug!(
                    credential = %hex::encode(&credential.credential_id),
                    "Stored credential"
                );
                Ok(Credential::try_from(row)?)
            }
            None => Err(InsertError::AlreadyExists),
        }
    }

    async fn replace(&self, credential: Credential) -> Result<Option<Credential>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        let previous: Option<CredentialRow> = sqlx::query_as(
            r#"
            SELECT credential_id, user_id, public_key, sign_count, aaguid, format, registered_at
            FROM credentials
            WHERE credential_id = $1
            FOR UPDATE
            "#,
        )
        .bind(&credential.credential_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_error)?;

        sqlx::query(
            r#"
            INSERT INTO credentials
                (credential_id, user_id, public_key, sign_count, aaguid, format, registered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (credential_id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                public_key = EXCLUDED.public_key,
                sign_count = EXCLUDED.sign_count,
                aaguid = EXCLUDED.aaguid,
                format = EXCLUDED.format,
                registered_at = EXCLUDED.registered_at
            "#,
        )
        .bind(&credential.credential_id)
        .bind(&credential.user_id)
        .bind(&credential.public_key)
        .bind(i64::from(credential.sign_count))
        .bind(credential.aaguid.as_slice())
        .bind(&credential.format)
        .bind(credential.registered_at)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;

        previous.map(Credential::try_from).transpose()
    }
}

#[async_trait]
impl UserStore for PostgresCredentialStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<UserAccount>, StorageError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT user_id, name, display_name FROM users WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.map(UserAccount::try_from).transpose()
    }

    /// The unique name column decides concurrent creates; the loser reads the
    /// winner's row.
    async fn get_or_create(&self, user: UserAccount) -> Result<UserAccount, StorageError> {
        let inserted: Option<UserRow> = sqlx::query_as(
            r#"
            INSERT INTO users (user_id, name, display_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO NOTHING
            RETURNING user_id, name, display_name
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.display_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        if let Some(row) = inserted {
            tracing::debug!(user = %row.name, "Created user");
            return UserAccount::try_from(row);
        }

        self.find_by_name(&user.name).await?.ok_or_else(|| {
            StorageError::Query(format!("user {} vanished after insert conflict", user.name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(aaguid: Vec<u8>, sign_count: i64) -> CredentialRow {
        CredentialRow {
            credential_id: vec![1, 2, 3],
            user_id: b"user".to_vec(),
            public_key: vec![0xa0],
            sign_count,
            aaguid,
            format: "none".to_string(),
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_conversion() {
        let credential = Credential::try_from(row(vec![7; 16], 5)).unwrap();
        assert_eq!(credential.aaguid, [7; 16]);
        assert_eq!(credential.sign_count, 5);
    }

    #[test]
    fn test_row_conversion_rejects_bad_columns() {
        assert!(matches!(
            Credential::try_from(row(vec![7; 15], 0)),
            Err(StorageError::Serialization(_))
        ));
        assert!(matches!(
            Credential::try_from(row(vec![7; 16], -1)),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn test_user_row_conversion() {
        let user = UserAccount::try_from(UserRow {
            user_id: vec![9; 16],
            name: "alice".to_string(),
            display_name: "Alice".to_string(),
        })
        .unwrap();
        assert_eq!(user.id, vec![9; 16]);
        assert_eq!(user.display_name, "Alice");

        assert!(matches!(
            UserAccount::try_from(UserRow {
                user_id: Vec::new(),
                name: "alice".to_string(),
                display_name: "Alice".to_string(),
            }),
            Err(StorageError::Serialization(_))
        ));
    }
}
