//! Key/value storage backed by SQLite

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use super::{KeyValueStore, StorageError};

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) the database at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// An in-memory database, gone when the pool closes
    pub async fn new_in_memory() -> Result<Self, StorageError> {
        // Each connection to sqlite::memory: is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS storage (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl KeyValueStore for SqliteStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM storage WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO storage (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM storage WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AUTH_TOKEN_KEY, USER_KEY};

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = SqliteStorage::new_in_memory().await.unwrap();

        store.set(AUTH_TOKEN_KEY, "fake_token_1").await.unwrap();
        assert_eq!(
            store.get(AUTH_TOKEN_KEY).await.unwrap().as_deref(),
            Some("fake_token_1")
        );

        store.remove(AUTH_TOKEN_KEY).await.unwrap();
        assert!(store.get(AUTH_TOKEN_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites_existing_value() {
        let store = SqliteStorage::new_in_memory().await.unwrap();

        store.set(USER_KEY, r#"{"id":"u1","username":"a"}"#).await.unwrap();
        store.set(USER_KEY, r#"{"id":"u2","username":"b"}"#).await.unwrap();

        let value = store.get(USER_KEY).await.unwrap().unwrap();
        assert!(value.contains("u2"));
    }

    #[tokio::test]
    async fn test_file_database_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("chatter-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("chatter.db");

        let store = SqliteStorage::new(&path).await.unwrap();
        store.set(AUTH_TOKEN_KEY, "persisted").await.unwrap();
        store.close().await;

        let reopened = SqliteStorage::new(&path).await.unwrap();
        assert_eq!(
            reopened.get(AUTH_TOKEN_KEY).await.unwrap().as_deref(),
            Some("persisted")
        );
        reopened.close().await;

        std::fs::remove_dir_all(&dir).ok();
    }
}
