//! Schema management for the importer database.

pub mod migration;

pub use migration::{reset_database, run_migrations};
