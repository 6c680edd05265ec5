//! Resume marker for interrupted imports.
//!
//! The checkpoint holds the next page to fetch. It is written after every fully
//! processed page, cleared when a run completes, and read once at start-up when
//! the operator asks to resume.

use crate::cache::{CacheError, CacheStore};
use serde_json::Value;
use std::time::Duration;

pub struct CheckpointStore<S> {
    store: S,
    key: String,
    ttl: Duration,
}

impl<S: CacheStore> CheckpointStore<S> {
    pub fn new(store: S, key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            ttl,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn save(&self, page: u32) -> Result<(), CacheError> {
        self.store.put(&self.key, Value::from(page), self.ttl).await?;
        log::debug!("checkpoint '{}' saved at page {}", self.key, page);
        Ok(())
    }

    /// Stored page, or `None` when never set, expired, or not a page number.
    pub async fn get(&self) -> Result<Option<u32>, CacheError> {
        let value = self.store.get(&self.key).await?;
        Ok(value.as_ref().and_then(page_from_value))
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        self.store.forget(&self.key).await
    }

    pub async fn has_checkpoint(&self) -> Result<bool, CacheError> {
        self.store.has(&self.key).await
    }
}

fn page_from_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
