//! Resumable product import pipeline.
//!
//! Each page of upstream products flows through the same steps:
//!
//! 1. **Throttling** (`rate_limiter`) - Sliding-window limit on outbound requests
//! 2. **Mapping** (`mapper`) - Flattens nested API payloads into column space
//! 3. **Validation** (`validator`) - Business rules, producing typed products
//! 4. **Persistence** (`crate::store`) - Atomic batch upsert, with structured fields
//!    encoded by `serializer`
//! 5. **Checkpointing** (`checkpoint`) - Records the next page so a crashed run can resume
//! 6. **Coordination** (`orchestrator`) - Drives the page loop and error policy
//! 7. **Statistics** (`stats`) - Counts and timings for the final summary
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use catalog_importer::import::{ImportOrchestrator, RunMode, RunOptions};
//!
//! let orchestrator = ImportOrchestrator::new(client, cache, store, config, Clock::system());
//! let stats = orchestrator
//!     .run(RunOptions { resume: true, mode: RunMode::Live })
//!     .await?;
//!
//! println!("Imported {} products", stats.successful_imports);
//! ```

pub mod checkpoint;
pub mod mapper;
pub mod orchestrator;
pub mod rate_limiter;
pub mod serializer;
pub mod stats;
pub mod validator;

// Re-export main types
pub use checkpoint::CheckpointStore;
pub use mapper::{DataMapper, MappedRecord};
pub use orchestrator::{ImportFailure, ImportOrchestrator, RunMode, RunOptions};
pub use rate_limiter::RateLimiter;
pub use stats::{ImportStatistics, StatisticsSnapshot};
pub use validator::{SlugIndex, ValidationError, ValidationResult, Validator};
