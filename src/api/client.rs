use super::error::ApiError;
use super::response::PageResponse;
use super::ProductSource;
use crate::clock::Clock;
use crate::config::ApiConfig;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use std::time::Duration;

/// HTTP client for the upstream product catalogue.
///
/// Each call to [`ProductSource::fetch_products`] makes up to `max_retries`
/// attempts. Transport failures and 429/5xx responses are retried after an
/// exponential backoff of `retry_delay * 2^attempt`; every other failure is
/// returned immediately.
#[derive(Clone)]
pub struct ProductApiClient {
    http: reqwest::Client,
    config: ApiConfig,
    clock: Clock,
}

impl ProductApiClient {
    pub fn new(config: ApiConfig, clock: Clock) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("catalog-importer/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            config,
            clock,
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    async fn request_page(&self, page: u32) -> Result<PageResponse, ApiError> {
        let mut request = self
            .http
            .get(&self.config.base_url)
            .query(&[("page", page)])
            .header(ACCEPT, "application/json");

        if let Some(key) = &self.config.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {key}"));
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Http { status, body });
        }

        let body = response.bytes().await?;
        Ok(PageResponse::from_json(&body)?)
    }
}

/// Delay before the attempt following `attempt` (zero-based).
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

impl ProductSource for ProductApiClient {
    async fn fetch_products(&self, page: u32) -> Result<PageResponse, ApiError> {
        let max_attempts = self.config.max_retries.max(1);
        let mut attempt = 0;

        loop {
            let err = match self.request_page(page).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }

            if attempt + 1 >= max_attempts {
                return Err(ApiError::RetriesExhausted {
                    attempts: max_attempts,
                    last: Box::new(err),
                });
            }

            let delay = backoff_delay(self.config.retry_delay, attempt);
            log::warn!(
                "page {} attempt {}/{} failed: {}; retrying in {:?}",
                page,
                attempt + 1,
                max_attempts,
                err,
                delay
            );
            self.clock.sleep(delay).await;
            attempt += 1;
        }
    }
}
