//! Final persistence for validated products.
//!
//! Every backend upserts a whole batch atomically, keyed by slug: either every
//! product of the batch is written or none is.

pub mod memory;
pub mod postgres;

pub use memory::MemoryProductStore;
pub use postgres::PgProductStore;

use crate::models::Product;
use std::collections::HashMap;
use std::future::Future;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to encode structured field: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("batch rejected: {0}")]
    Rejected(String),
}

pub trait ProductStore: Send + Sync {
    /// Insert or update every product of `products` in one transaction,
    /// returning the number of rows written.
    fn upsert_batch(
        &self,
        products: &[Product],
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    fn count(&self) -> impl Future<Output = Result<u64, StoreError>> + Send;

    fn find_by_slug(
        &self,
        slug: &str,
    ) -> impl Future<Output = Result<Option<Product>, StoreError>> + Send;

    /// Every persisted slug with the id of the product owning it.
    fn slug_index(&self) -> impl Future<Output = Result<HashMap<String, Uuid>, StoreError>> + Send;
}

/// Collapse products sharing a slug, keeping the last occurrence in the
/// position of the first.
pub(crate) fn dedupe_by_slug(products: &[Product]) -> Vec<&Product> {
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(products.len());
    let mut unique: Vec<&Product> = Vec::with_capacity(products.len());

    for product in products {
        match positions.get(product.slug.as_str()) {
            Some(&index) => unique[index] = product,
            None => {
                positions.insert(product.slug.as_str(), unique.len());
                unique.push(product);
            }
        }
    }

    if unique.len() < products.len() {
        log::debug!(
            "collapsed {} duplicate slug(s) in batch of {}",
            products.len() - unique.len(),
            products.len()
        );
    }
    unique
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::models::{Product, ProductStatus};
    use uuid::Uuid;

    pub fn product(slug: &str) -> Product {
        Product {
            id: Uuid::new_v4(),
            title: format!("Container {slug}"),
            slug: slug.to_string(),
            content: None,
            price: 1250.0,
            old_price: None,
            discount_percentage: None,
            quantity: 3,
            in_stock: true,
            image_cover: None,
            image_thumbnail: None,
            container_type: Some("dry".into()),
            container_size: Some("20ft".into()),
            production_year: Some(2018),
            condition: None,
            location_city: None,
            location_district: None,
            location_country: None,
            product_type: None,
            is_new: false,
            is_hot_sale: false,
            is_featured: false,
            is_bulk_sale: false,
            accept_offers: true,
            status: ProductStatus::Published,
            colors: None,
            all_prices: None,
            technical_specs: None,
            user_info: None,
        }
    }
}
