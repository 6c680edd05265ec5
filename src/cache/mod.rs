//! Expiring key-value storage for importer state.
//!
//! The checkpoint and the rate-limit window both live behind [`CacheStore`], so a
//! run can keep its state in process memory ([`MemoryCache`]) or share it across
//! processes through PostgreSQL ([`PgCache`]). Keys act as namespaces: two
//! importers configured with different identifiers never see each other's state.

pub mod memory;
pub mod postgres;

pub use memory::MemoryCache;
pub use postgres::PgCache;

use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("cache value could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

pub trait CacheStore: Send + Sync {
    /// Value stored under `key`, or `None` when unset or expired.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Value>, CacheError>> + Send;

    /// Store `value` under `key`, replacing any previous entry, expiring after `ttl`.
    fn put(
        &self,
        key: &str,
        value: Value,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    fn forget(&self, key: &str) -> impl Future<Output = Result<(), CacheError>> + Send;

    fn has(&self, key: &str) -> impl Future<Output = Result<bool, CacheError>> + Send {
        async move { Ok(self.get(key).await?.is_some()) }
    }
}
