//! Persisted API keys, addressed by `(issuer, id)`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use tracing::instrument;

use crate::models::{Key, KeyType};
use crate::services::error::AuthError;

/// Store of long-lived keys. API keys are the only persisted key type.
#[async_trait]
pub trait KeyRepository: Send + Sync {
    /// Persist `key`, returning its id. Duplicate `(issuer, id)` conflicts.
    async fn save(&self, key: &Key) -> Result<String, AuthError>;
    async fn retrieve(&self, issuer: &str, id: &str) -> Result<Key, AuthError>;
    async fn remove(&self, issuer: &str, id: &str) -> Result<(), AuthError>;
}

#[derive(Debug, FromRow)]
struct KeyRow {
    issuer: String,
    id: String,
    #[sqlx(rename = "type")]
    key_type: i32,
    subject: String,
    issued_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl From<KeyRow> for Key {
    fn from(row: KeyRow) -> Self {
        Key {
            id: row.id,
            key_type: KeyType::try_from(row.key_type as u32).unwrap_or(KeyType::Api),
            issuer: row.issuer,
            subject: row.subject,
            user: String::new(),
            domain: String::new(),
            issued_at: row.issued_at,
            expires_at: row.expires_at,
        }
    }
}

/// PostgreSQL-backed key store.
#[derive(Clone)]
pub struct PostgresKeyRepository {
    pool: PgPool,
}

impl PostgresKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyRepository for PostgresKeyRepository {
    #[instrument(skip(self, key), fields(issuer = %key.issuer, id = %key.id))]
    async fn save(&self, key: &Key) -> Result<String, AuthError> {
        sqlx::query(
            r#"
            INSERT INTO keys (issuer, id, type, subject, issued_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&key.issuer)
        .bind(&key.id)
        .bind(key.key_type as i32)
        .bind(&key.subject)
        .bind(key.issued_at)
        .bind(key.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AuthError::Conflict
            }
            _ => AuthError::CreateEntity(anyhow::anyhow!("failed to save key: {}", e)),
        })?;

        tracing::info!(issuer = %key.issuer, id = %key.id, "API key saved");
        Ok(key.id.clone())
    }

    #[instrument(skip(self))]
    async fn retrieve(&self, issuer: &str, id: &str) -> Result<Key, AuthError> {
        let row = sqlx::query_as::<_, KeyRow>(
            r#"
            SELECT issuer, id, type, subject, issued_at, expires_at
            FROM keys
            WHERE issuer = $1 AND id = $2
            "#,
        )
        .bind(issuer)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::ViewEntity(anyhow::anyhow!("failed to retrieve key: {}", e)))?;

        row.map(Key::from).ok_or(AuthError::NotFound)
    }

    #[instrument(skip(self))]
    async fn remove(&self, issuer: &str, id: &str) -> Result<(), AuthError> {
        let result = sqlx::query("DELETE FROM keys WHERE issuer = $1 AND id = $2")
            .bind(issuer)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AuthError::RemoveEntity(anyhow::anyhow!("failed to remove key: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound);
        }
        tracing::info!(issuer = issuer, id = id, "API key removed");
        Ok(())
    }
}

/// In-memory key store for tests, with an injectable save failure.
#[derive(Default)]
pub struct MockKeyRepository {
    keys: Mutex<HashMap<(String, String), Key>>,
    pub fail_save: AtomicBool,
}

impl MockKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyRepository for MockKeyRepository {
    async fn save(&self, key: &Key) -> Result<String, AuthError> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(AuthError::CreateEntity(anyhow::anyhow!(
                "injected save failure"
            )));
        }
        let mut keys = self.keys.lock().unwrap();
        let slot = (key.issuer.clone(), key.id.clone());
        if keys.contains_key(&slot) {
            return Err(AuthError::Conflict);
        }
        keys.insert(slot, key.clone());
        Ok(key.id.clone())
    }

    async fn retrieve(&self, issuer: &str, id: &str) -> Result<Key, AuthError> {
        self.keys
            .lock()
            .unwrap()
            .get(&(issuer.to_string(), id.to_string()))
            .cloned()
            .ok_or(AuthError::NotFound)
    }

    async fn remove(&self, issuer: &str, id: &str) -> Result<(), AuthError> {
        self.keys
            .lock()
            .unwrap()
            .remove(&(issuer.to_string(), id.to_string()))
            .map(|_| ())
            .ok_or(AuthError::NotFound)
    }
}
