//! Import statistics tracking.
//!
//! Counts processed records for one run and derives rates, timings and memory
//! growth for the final summary.

use serde::Serialize;
use std::time::{Duration, Instant};

/// Statistics for a single import run.
#[derive(Debug, Clone)]
pub struct ImportStatistics {
    /// Records mapped and validated, whatever the outcome
    pub total_processed: u64,
    /// Records that passed validation
    pub successful_imports: u64,
    /// Records rejected by the validator
    pub failed_validations: u64,
    started_at: Instant,
    start_memory: u64,
}

/// Point-in-time view of [`ImportStatistics`], used for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub total_processed: u64,
    pub successful_imports: u64,
    pub failed_validations: u64,
    pub success_rate: f64,
    pub duration_seconds: f64,
    pub memory_used: u64,
    pub average_time_per_item_ms: f64,
}

impl ImportStatistics {
    /// Start measuring now, from the current resident memory.
    pub fn start() -> Self {
        Self {
            total_processed: 0,
            successful_imports: 0,
            failed_validations: 0,
            started_at: Instant::now(),
            start_memory: resident_memory_bytes(),
        }
    }

    pub fn record_success(&mut self) {
        self.successful_imports += 1;
        self.total_processed += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed_validations += 1;
        self.total_processed += 1;
    }

    /// Percentage of processed records that passed validation.
    pub fn success_rate(&self) -> f64 {
        if self.total_processed == 0 {
            return 0.0;
        }
        (self.successful_imports as f64 / self.total_processed as f64) * 100.0
    }

    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn memory_used(&self) -> u64 {
        resident_memory_bytes().saturating_sub(self.start_memory)
    }

    /// Milliseconds spent per processed record.
    pub fn average_time_per_item(&self) -> f64 {
        if self.total_processed == 0 {
            return 0.0;
        }
        self.duration().as_secs_f64() / self.total_processed as f64 * 1000.0
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            total_processed: self.total_processed,
            successful_imports: self.successful_imports,
            failed_validations: self.failed_validations,
            success_rate: self.success_rate(),
            duration_seconds: self.duration().as_secs_f64(),
            memory_used: self.memory_used(),
            average_time_per_item_ms: self.average_time_per_item(),
        }
    }
}

impl Default for ImportStatistics {
    fn default() -> Self {
        Self::start()
    }
}

/// Resident set size of this process, or 0 where it cannot be read.
pub fn resident_memory_bytes() -> u64 {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| parse_vm_rss(&status))
        .unwrap_or(0)
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kilobytes: u64 = line
        .trim_start_matches("VmRSS:")
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    Some(kilobytes * 1024)
}
