use crate::api::ApiError;
use crate::cache::CacheError;
use crate::store::StoreError;
use thiserror::Error;

/// Reasons an import run stops before reaching the last page.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to fetch products: {0}")]
    Fetch(#[from] ApiError),
    #[error("failed to save products: {0}")]
    Persist(#[from] StoreError),
    #[error("failed to update checkpoint: {0}")]
    Checkpoint(#[from] CacheError),
}
