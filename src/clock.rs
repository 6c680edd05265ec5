//! Time source shared by the rate limiter, the API client and the orchestrator.
//!
//! Every wait in the import pipeline goes through [`Clock::sleep`], so tests can
//! swap the tokio timer for a [`ManualClock`] that advances instantly and keeps a
//! record of what was requested.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub enum Clock {
    #[default]
    System,
    Manual(ManualClock),
}

impl Clock {
    pub fn system() -> Self {
        Clock::System
    }

    /// Deterministic clock starting at `start`. Returns the handle as well so the
    /// caller can inspect sleeps after handing the clock to the pipeline.
    pub fn manual(start: DateTime<Utc>) -> (Self, ManualClock) {
        let manual = ManualClock::new(start);
        (Clock::Manual(manual.clone()), manual)
    }

    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Manual(manual) => manual.now(),
        }
    }

    pub fn unix_seconds(&self) -> i64 {
        self.now().timestamp()
    }

    pub async fn sleep(&self, duration: Duration) {
        match self {
            Clock::System => tokio::time::sleep(duration).await,
            Clock::Manual(manual) => manual.record_sleep(duration),
        }
    }
}

#[derive(Debug, Default)]
struct ManualState {
    now: DateTime<Utc>,
    sleeps: Vec<Duration>,
}

/// Clock that only moves when told to, or when something sleeps on it.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now: start,
                sleeps: Vec::new(),
            })),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.state.lock().now
    }

    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.now += chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.state.lock().sleeps.iter().sum()
    }

    fn record_sleep(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.sleeps.push(duration);
        state.now += chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
    }
}
