use std::env;
use std::time::Duration;

pub const DEFAULT_RECOVERABLE_ERRORS: [&str; 4] =
    ["timeout", "connection", "network", "temporarily unavailable"];

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_duration_millis(key: &str, default_millis: u64) -> Duration {
    Duration::from_millis(env_u64(key, default_millis))
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match env::var(key) {
        Ok(value) => {
            let items: Vec<String> = value
                .split(',')
                .map(|item| item.trim().to_lowercase())
                .filter(|item| !item.is_empty())
                .collect();
            if items.is_empty() {
                default.iter().map(|item| item.to_string()).collect()
            } else {
                items
            }
        }
        Err(_) => default.iter().map(|item| item.to_string()).collect(),
    }
}

/// Tuning knobs for the import pipeline.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub checkpoint_key: String,
    pub checkpoint_ttl: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Declared for operators; pages are persisted at whatever size the source returns.
    pub batch_size: usize,
    pub rate_limit: u32,
    pub rate_limit_identifier: String,
    pub recoverable_errors: Vec<String>,
    pub recoverable_delay: Duration,
    /// `None` retries recoverable fetch errors for as long as they keep occurring.
    pub max_recoverable_retries: Option<u32>,
}

impl ImportConfig {
    pub fn from_env() -> Self {
        let ttl_hours = env_u64("IMPORT_CHECKPOINT_TTL", 24);
        let max_recoverable_retries = env::var("IMPORT_MAX_RECOVERABLE_RETRIES")
            .ok()
            .and_then(|value| value.trim().parse::<u32>().ok());

        Self {
            checkpoint_key: env_string("IMPORT_CHECKPOINT_KEY", "product_import_checkpoint"),
            checkpoint_ttl: Duration::from_secs(ttl_hours * 60 * 60),
            max_retries: env_u32("IMPORT_MAX_RETRIES", 3).max(1),
            retry_delay: env_duration_millis("IMPORT_RETRY_DELAY_MS", 1_000),
            batch_size: env_usize("IMPORT_BATCH_SIZE", 100),
            rate_limit: env_u32("IMPORT_RATE_LIMIT", 10).max(1),
            rate_limit_identifier: env_string("IMPORT_RATE_LIMIT_ID", "default"),
            recoverable_errors: env_list("IMPORT_RECOVERABLE_ERRORS", &DEFAULT_RECOVERABLE_ERRORS),
            recoverable_delay: env_duration_millis("IMPORT_RECOVERABLE_DELAY_MS", 5_000),
            max_recoverable_retries,
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Connection settings for the upstream product API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_millis(1_000),
        }
    }

    /// Reads `PRODUCT_API_*` variables; retry settings come from the import config.
    pub fn from_env(import: &ImportConfig) -> Option<Self> {
        let base_url = env::var("PRODUCT_API_URL").ok()?;
        let api_key = env::var("PRODUCT_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        Some(Self {
            base_url,
            api_key,
            request_timeout: env_duration_millis("PRODUCT_API_TIMEOUT_MS", 30_000),
            max_retries: import.max_retries,
            retry_delay: import.retry_delay,
        })
    }
}
