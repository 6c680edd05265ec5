//! Page loop driving a full import.
//!
//! Pages are handled strictly one after another: throttle, fetch, map and
//! validate every record, persist the valid ones, then move the checkpoint to
//! the next page. Fetch errors whose message matches a configured pattern are
//! retried on the same page after a fixed delay; every other failure aborts the
//! run and leaves the checkpoint where it was.

use crate::api::{ApiError, PageResponse, ProductSource, RawRecord};
use crate::cache::{CacheError, CacheStore};
use crate::clock::Clock;
use crate::config::ImportConfig;
use crate::error::ImportError;
use crate::import::checkpoint::CheckpointStore;
use crate::import::mapper::DataMapper;
use crate::import::rate_limiter::RateLimiter;
use crate::import::stats::ImportStatistics;
use crate::import::validator::Validator;
use crate::store::{ProductStore, StoreError};
use thiserror::Error;

/// Whether valid records are written or only counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    #[default]
    Live,
    DryRun,
}

impl RunMode {
    pub fn is_dry_run(self) -> bool {
        matches!(self, RunMode::DryRun)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Continue from the saved checkpoint instead of page 1.
    pub resume: bool,
    pub mode: RunMode,
}

/// An aborted run, with everything counted before the failure.
#[derive(Debug, Error)]
#[error("import aborted on page {page}: {error}")]
pub struct ImportFailure {
    #[source]
    pub error: ImportError,
    pub page: u32,
    pub stats: ImportStatistics,
    /// Page a `--resume` run would start from.
    pub resume_page: Option<u32>,
}

pub struct ImportOrchestrator<A, K, P> {
    source: A,
    store: P,
    rate_limiter: RateLimiter<K>,
    checkpoints: CheckpointStore<K>,
    mapper: DataMapper,
    validator: Validator,
    clock: Clock,
    config: ImportConfig,
}

impl<A, K, P> ImportOrchestrator<A, K, P>
where
    A: ProductSource,
    K: CacheStore + Clone,
    P: ProductStore,
{
    /// Build an orchestrator whose checkpoint and rate-limit window both live in `cache`.
    pub fn new(source: A, cache: K, store: P, config: ImportConfig, clock: Clock) -> Self {
        let rate_limiter = RateLimiter::new(
            cache.clone(),
            clock.clone(),
            config.rate_limit,
            &config.rate_limit_identifier,
        );
        let checkpoints = CheckpointStore::new(
            cache,
            config.checkpoint_key.clone(),
            config.checkpoint_ttl,
        );

        Self {
            source,
            store,
            rate_limiter,
            checkpoints,
            mapper: DataMapper::new(),
            validator: Validator::new(),
            clock,
            config,
        }
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn checkpoints(&self) -> &CheckpointStore<K> {
        &self.checkpoints
    }

    pub fn rate_limiter(&self) -> &RateLimiter<K> {
        &self.rate_limiter
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Resolve the start page from `options`, import to the last page and clear
    /// the checkpoint once done.
    pub async fn run(&self, options: RunOptions) -> Result<ImportStatistics, ImportFailure> {
        let start_page = self
            .resolve_start_page(options.resume)
            .await
            .map_err(|err| ImportFailure {
                error: ImportError::Checkpoint(err),
                page: 1,
                stats: ImportStatistics::start(),
                resume_page: None,
            })?;

        match self.execute(start_page, options.mode).await {
            Ok(stats) => {
                if let Err(err) = self.checkpoints.clear().await {
                    log::warn!("import finished but checkpoint could not be cleared: {}", err);
                }
                Ok(stats)
            }
            Err(mut failure) => {
                match self.checkpoints.get().await {
                    Ok(stored) => failure.resume_page = stored,
                    Err(err) => log::warn!("failed to read checkpoint after abort: {}", err),
                }
                log::error!(
                    target: "import_errors",
                    "import failed critically on page {}: {} (checkpoint: {})",
                    failure.page,
                    failure.error,
                    failure
                        .resume_page
                        .map_or_else(|| "none".to_string(), |page| page.to_string())
                );
                Err(failure)
            }
        }
    }

    /// Import every page from `start_page` through the last page the source reports.
    pub async fn execute(
        &self,
        start_page: u32,
        mode: RunMode,
    ) -> Result<ImportStatistics, ImportFailure> {
        let mut stats = ImportStatistics::start();
        let mut current_page = start_page.max(1);
        let mut last_page = current_page;

        if mode.is_dry_run() {
            log::info!("dry run: products are validated but not saved");
        }

        while current_page <= last_page {
            match self.import_page(current_page, mode, &mut stats).await {
                Ok(reported_last) => {
                    last_page = reported_last;
                    current_page += 1;
                }
                Err(error) => {
                    return Err(ImportFailure {
                        error,
                        page: current_page,
                        stats,
                        resume_page: Some(current_page),
                    });
                }
            }
        }

        log::info!(
            "import finished: {} processed, {} successful, {} failed validation",
            stats.total_processed,
            stats.successful_imports,
            stats.failed_validations
        );
        Ok(stats)
    }

    /// Whether `err` should be retried on the same page rather than abort the run.
    pub fn is_recoverable(&self, err: &ApiError) -> bool {
        matches_recoverable(&err.to_string(), &self.config.recoverable_errors)
    }

    async fn resolve_start_page(&self, resume: bool) -> Result<u32, CacheError> {
        if !resume {
            self.checkpoints.clear().await?;
            log::info!("starting import from page 1");
            return Ok(1);
        }

        match self.checkpoints.get().await? {
            Some(page) if page > 1 => {
                log::info!("resuming import from page {}", page);
                Ok(page)
            }
            _ => {
                log::info!("no checkpoint found, starting import from page 1");
                Ok(1)
            }
        }
    }

    /// Returns the last page reported by the source.
    async fn import_page(
        &self,
        page: u32,
        mode: RunMode,
        stats: &mut ImportStatistics,
    ) -> Result<u32, ImportError> {
        let response = self.fetch_page(page).await?;
        log::info!(
            "processing page {} of {} ({} products)",
            page,
            response.last_page,
            response.records.len()
        );

        self.process_page(&response.records, mode, stats).await?;
        self.checkpoints.save(page + 1).await?;

        Ok(response.last_page)
    }

    async fn fetch_page(&self, page: u32) -> Result<PageResponse, ApiError> {
        let mut recoveries: u32 = 0;

        loop {
            self.rate_limiter.throttle().await;

            let err = match self.source.fetch_products(page).await {
                Ok(response) => {
                    self.rate_limiter.hit().await;
                    return Ok(response);
                }
                Err(err) => err,
            };

            if !self.is_recoverable(&err) {
                return Err(err);
            }
            if self
                .config
                .max_recoverable_retries
                .is_some_and(|max| recoveries >= max)
            {
                log::error!(
                    "giving up on page {} after {} recoverable errors: {}",
                    page,
                    recoveries,
                    err
                );
                return Err(err);
            }

            recoveries += 1;
            log::warn!(
                "recoverable error during import (page: {}, retry: {}): {}",
                page,
                recoveries,
                err
            );
            self.clock.sleep(self.config.recoverable_delay).await;
        }
    }

    async fn process_page(
        &self,
        records: &[RawRecord],
        mode: RunMode,
        stats: &mut ImportStatistics,
    ) -> Result<(), StoreError> {
        let mut batch = Vec::with_capacity(records.len());
        let mut failed = 0usize;

        for raw in records {
            let mapped = self.mapper.map_to_database_format(raw);
            match self.validator.validate_safe(&mapped, None).data {
                Some(product) => {
                    batch.push(product);
                    stats.record_success();
                }
                None => {
                    failed += 1;
                    stats.record_failure();
                }
            }
        }

        match mode {
            RunMode::DryRun => log::info!("dry run: would import {} products", batch.len()),
            RunMode::Live if !batch.is_empty() => {
                self.store.upsert_batch(&batch).await?;
            }
            RunMode::Live => {}
        }

        log::debug!("page summary: {} valid, {} invalid", batch.len(), failed);
        Ok(())
    }
}

/// Case-insensitive substring match of `message` against `patterns`.
pub fn matches_recoverable(message: &str, patterns: &[String]) -> bool {
    let message = message.to_lowercase();
    patterns
        .iter()
        .filter(|pattern| !pattern.is_empty())
        .any(|pattern| message.contains(&pattern.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_RECOVERABLE_ERRORS;

    fn defaults() -> Vec<String> {
        DEFAULT_RECOVERABLE_ERRORS
            .iter()
            .map(|pattern| pattern.to_string())
            .collect()
    }

    #[test]
    fn recoverable_patterns_match_case_insensitively() {
        let patterns = defaults();
        assert!(matches_recoverable("Connection reset by peer", &patterns));
        assert!(matches_recoverable("request TIMEOUT after 30s", &patterns));
        assert!(matches_recoverable(
            "Service Temporarily Unavailable",
            &patterns
        ));
        assert!(!matches_recoverable(
            "product API returned status 404: not found",
            &patterns
        ));
    }

    #[test]
    fn transport_failures_are_always_recoverable() {
        let patterns = defaults();
        let err = ApiError::Transport("dns lookup failed".into());
        assert!(matches_recoverable(&err.to_string(), &patterns));

        let exhausted = ApiError::RetriesExhausted {
            attempts: 3,
            last: Box::new(ApiError::Transport("reset".into())),
        };
        assert!(matches_recoverable(&exhausted.to_string(), &patterns));
    }

    #[test]
    fn request_errors_are_never_recoverable() {
        let patterns = defaults();
        let err = ApiError::Request("builder error for url (not a url)".into());
        assert!(!matches_recoverable(&err.to_string(), &patterns));
    }

    #[test]
    fn blank_patterns_never_match() {
        assert!(!matches_recoverable("anything", &[String::new()]));
    }

    #[test]
    fn run_mode_flags() {
        assert!(RunMode::DryRun.is_dry_run());
        assert!(!RunMode::default().is_dry_run());
    }
}
