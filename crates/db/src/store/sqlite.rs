use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::KeyValueStore;
use crate::error::Result;
use crate::pool::{create_pool, run_migrations};

/// Durable store over the `kv_entries` table.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) the database at `database_url` and apply migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        run_migrations(&pool).await?;
        tracing::info!(database_url, "Key-value store ready");
        Ok(Self::new(pool))
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            r#"
            SELECT value
            FROM kv_entries
            WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)
            "#,
        )
        .bind(key)
        .bind(now_millis())
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| now_millis().saturating_add(ttl.as_millis() as i64));

        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let keys: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT key
            FROM kv_entries
            WHERE substr(key, 1, length(?)) = ? AND (expires_at IS NULL OR expires_at > ?)
            ORDER BY key
            "#,
        )
        .bind(prefix)
        .bind(prefix)
        .bind(now_millis())
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at <= ?")
            .bind(now_millis())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = setup_test_store().await;
        store.set("job:a", "one", None).await.unwrap();

        assert_eq!(store.get("job:a").await.unwrap().as_deref(), Some("one"));
        assert_eq!(store.get("job:missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = setup_test_store().await;
        store.set("job:a", "one", None).await.unwrap();
        store
            .set("job:a", "two", Some(Duration::from_secs(3600)))
            .await
            .unwrap();

        assert_eq!(store.get("job:a").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_keys_by_prefix() {
        let store = setup_test_store().await;
        for key in ["job:b", "job:a", "job:a:steps", "jobx", "other"] {
            store.set(key, "{}", None).await.unwrap();
        }

        let keys = store.keys("job:").await.unwrap();
        assert_eq!(keys, vec!["job:a", "job:a:steps", "job:b"]);
    }

    #[tokio::test]
    async fn test_expired_entries_hidden_and_purged() {
        let store = setup_test_store().await;
        store
            .set("job:short", "x", Some(Duration::from_millis(1)))
            .await
            .unwrap();
        store.set("job:long", "y", None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(store.get("job:short").await.unwrap(), None);
        assert_eq!(store.keys("job:").await.unwrap(), vec!["job:long"]);
        assert_eq!(store.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("jobs.db").display());

        {
            let store = SqliteStore::connect(&url).await.unwrap();
            store.set("job:a", "kept", None).await.unwrap();
            store.pool.close().await;
        }

        let reopened = SqliteStore::connect(&url).await.unwrap();
        assert_eq!(reopened.get("job:a").await.unwrap().as_deref(), Some("kept"));
    }
}
