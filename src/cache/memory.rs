use super::{CacheError, CacheStore};
use crate::clock::Clock;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: DateTime<Utc>,
}

/// In-process cache. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, Entry>>,
    clock: Clock,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[tokio::test]
    async fn entries_expire_with_the_clock() {
        let (clock, handle) = Clock::manual(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        let cache = MemoryCache::with_clock(clock);

        cache
            .put("checkpoint", json!(4), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("checkpoint").await.unwrap(), Some(json!(4)));
        assert!(cache.has("checkpoint").await.unwrap());

        handle.advance(Duration::from_secs(61));
        assert_eq!(cache.get("checkpoint").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn keys_are_isolated() {
        let cache = MemoryCache::new();
        cache
            .put("a", json!("first"), Duration::from_secs(10))
            .await
            .unwrap();
        cache
            .put("b", json!("second"), Duration::from_secs(10))
            .await
            .unwrap();

        cache.forget("a").await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.get("b").await.unwrap(), Some(json!("second")));
    }
}
