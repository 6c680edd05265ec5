use super::{CacheError, CacheStore};
use serde_json::Value;
use sqlx::PgPool;
use std::time::Duration;

/// Cache backed by the `cache_entries` table, shared by every importer process
/// pointed at the same database.
///
/// Values are stored as JSON text and decoded on read. Expired rows are ignored
/// by reads and removed the next time their key is read.
#[derive(Debug, Clone)]
pub struct PgCache {
    pool: PgPool,
}

impl PgCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Delete every expired entry, returning how many rows were removed.
    pub async fn purge_expired(&self) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl CacheStore for PgCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let row: Option<(String, bool)> = sqlx::query_as(
            r#"SELECT value, expires_at > NOW() AS live
               FROM cache_entries
               WHERE key = $1"#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((raw, true)) => Ok(Some(serde_json::from_str(&raw)?)),
            Some((_, false)) => {
                log::debug!("cache entry '{}' expired, removing", key);
                self.forget(key).await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        let encoded = serde_json::to_string(&value)?;
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        sqlx::query(
            r#"INSERT INTO cache_entries (key, value, expires_at)
               VALUES ($1, $2, NOW() + ($3::bigint * INTERVAL '1 millisecond'))
               ON CONFLICT (key) DO UPDATE
               SET value = EXCLUDED.value,
                   expires_at = EXCLUDED.expires_at"#,
        )
        .bind(key)
        .bind(encoded)
        .bind(ttl_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM cache_entries WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
