use crate::cache::CacheStore;
use crate::clock::Clock;
use serde_json::Value;
use std::time::Duration;

const CACHE_KEY_PREFIX: &str = "api_rate_limiter:";

/// Length of the sliding window, in seconds.
pub const WINDOW_SECONDS: i64 = 60;

/// Sliding-window limiter for outbound API requests.
///
/// Request timestamps (unix seconds) are kept in the cache under
/// `api_rate_limiter:<identifier>`, so runs that share a cache and an identifier
/// share one window. The limiter never fails: an unreadable window counts as
/// empty and a failed write is logged.
pub struct RateLimiter<S> {
    store: S,
    clock: Clock,
    max_requests: u32,
    cache_key: String,
}

impl<S: CacheStore> RateLimiter<S> {
    pub fn new(store: S, clock: Clock, max_requests: u32, identifier: &str) -> Self {
        Self {
            store,
            clock,
            max_requests: max_requests.max(1),
            cache_key: format!("{CACHE_KEY_PREFIX}{identifier}"),
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub async fn is_limit_exceeded(&self) -> bool {
        self.window().await.len() >= self.max_requests as usize
    }

    /// Wait until one more request fits in the window.
    pub async fn throttle(&self) {
        let timestamps = self.window().await;
        if timestamps.len() < self.max_requests as usize {
            return;
        }

        let Some(oldest) = timestamps.iter().min().copied() else {
            return;
        };
        let wait = WINDOW_SECONDS - (self.clock.unix_seconds() - oldest);
        if wait > 0 {
            log::info!(
                "rate limit of {} requests/{}s reached, waiting {}s",
                self.max_requests,
                WINDOW_SECONDS,
                wait
            );
            self.clock.sleep(Duration::from_secs(wait as u64)).await;
        }
    }

    /// Record a request made now.
    pub async fn hit(&self) {
        let mut timestamps = self.window().await;
        timestamps.push(self.clock.unix_seconds());

        let ttl = Duration::from_secs((WINDOW_SECONDS + 10) as u64);
        if let Err(err) = self
            .store
            .put(&self.cache_key, Value::from(timestamps), ttl)
            .await
        {
            log::warn!("failed to record rate limiter hit: {}", err);
        }
    }

    pub async fn remaining(&self) -> u32 {
        let used = self.window().await.len();
        (self.max_requests as usize).saturating_sub(used) as u32
    }

    pub async fn clear(&self) {
        if let Err(err) = self.store.forget(&self.cache_key).await {
            log::warn!("failed to clear rate limiter window: {}", err);
        }
    }

    /// Timestamps still inside the window.
    async fn window(&self) -> Vec<i64> {
        let stored = match self.store.get(&self.cache_key).await {
            Ok(value) => value,
            Err(err) => {
                log::warn!("failed to read rate limiter window: {}", err);
                None
            }
        };

        let cutoff = self.clock.unix_seconds() - WINDOW_SECONDS;
        stored
            .as_ref()
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_i64)
                    .filter(|timestamp| *timestamp > cutoff)
                    .collect()
            })
            .unwrap_or_default()
    }
}
