//! Upstream product API access.

pub mod client;
pub mod error;
pub mod response;

pub use client::ProductApiClient;
pub use error::ApiError;
pub use response::{PageResponse, RawRecord};

use std::future::Future;

/// Anything that can produce pages of raw product records.
pub trait ProductSource: Send + Sync {
    fn fetch_products(
        &self,
        page: u32,
    ) -> impl Future<Output = Result<PageResponse, ApiError>> + Send;
}
