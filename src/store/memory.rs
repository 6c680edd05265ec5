use super::{ProductStore, StoreError, dedupe_by_slug};
use crate::import::validator::SlugIndex;
use crate::models::Product;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// In-process product table keyed by slug. Clones share the same rows.
///
/// Mirrors the `products` constraints that matter to an upsert: slugs are
/// unique and an id may only belong to one slug. A batch that would give an id
/// a second slug is rejected whole.
#[derive(Debug, Clone, Default)]
pub struct MemoryProductStore {
    rows: Arc<DashMap<String, Product>>,
    write_lock: Arc<Mutex<()>>,
}

impl MemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, slug: &str) -> Option<Product> {
        self.rows.get(slug).map(|row| row.clone())
    }

    fn write(&self, products: &[Product]) -> Result<u64, StoreError> {
        let batch = dedupe_by_slug(products);
        let _guard = self.write_lock.lock();

        // Only rows that get inserted carry their id; updates keep the stored one.
        let mut claimed: HashMap<Uuid, &str> = HashMap::new();
        for product in batch.iter().filter(|p| !self.rows.contains_key(&p.slug)) {
            let stored = self.rows.iter().find(|row| row.id == product.id);
            if let Some(row) = stored {
                return Err(StoreError::Rejected(format!(
                    "id {} already belongs to slug '{}'",
                    product.id,
                    row.slug
                )));
            }
            if let Some(other) = claimed.insert(product.id, &product.slug) {
                return Err(StoreError::Rejected(format!(
                    "id {} appears under slugs '{}' and '{}' in one batch",
                    product.id, other, product.slug
                )));
            }
        }

        for product in &batch {
            match self.rows.get_mut(&product.slug) {
                // The stored id stays; every other column is replaced.
                Some(mut row) => {
                    let id = row.id;
                    *row = (*product).clone();
                    row.id = id;
                }
                None => {
                    self.rows.insert(product.slug.clone(), (*product).clone());
                }
            }
        }

        Ok(batch.len() as u64)
    }
}

impl ProductStore for MemoryProductStore {
    async fn upsert_batch(&self, products: &[Product]) -> Result<u64, StoreError> {
        if products.is_empty() {
            return Ok(0);
        }
        self.write(products).inspect_err(|err| {
            log::error!(
                target: "import_errors",
                "failed to save products: {} (count: {})",
                err,
                products.len()
            );
        })
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.rows.len() as u64)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.get(slug))
    }

    async fn slug_index(&self) -> Result<HashMap<String, Uuid>, StoreError> {
        Ok(self
            .rows
            .iter()
            .map(|row| (row.key().clone(), row.id))
            .collect())
    }
}

impl SlugIndex for MemoryProductStore {
    fn owner_of(&self, slug: &str) -> Option<Uuid> {
        self.rows.get(slug).map(|row| row.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::product;

    #[tokio::test]
    async fn second_upsert_updates_in_place() {
        let store = MemoryProductStore::new();
        let original = product("reefer-40");
        store.upsert_batch(&[original.clone()]).await.unwrap();

        let mut changed = original.clone();
        changed.price = 900.0;
        changed.quantity = 0;
        changed.in_stock = false;
        store.upsert_batch(&[changed]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let row = store.find_by_slug("reefer-40").await.unwrap().unwrap();
        assert_eq!(row.id, original.id);
        assert_eq!(row.price, 900.0);
        assert!(!row.in_stock);
    }

    #[tokio::test]
    async fn conflicting_id_rejects_the_whole_batch() {
        let store = MemoryProductStore::new();
        let existing = product("a");
        store.upsert_batch(&[existing.clone()]).await.unwrap();

        let mut moved = product("b");
        moved.id = existing.id;
        let err = store
            .upsert_batch(&[product("c"), moved])
            .await
            .expect_err("id reuse must fail");

        assert!(matches!(err, StoreError::Rejected(_)));
        assert_eq!(store.len(), 1);
        assert!(store.get("c").is_none());
    }

    #[tokio::test]
    async fn shared_id_within_one_batch_is_rejected() {
        let store = MemoryProductStore::new();
        let first = product("tank-20");
        let mut second = product("tank-40");
        second.id = first.id;

        let err = store
            .upsert_batch(&[first, second])
            .await
            .expect_err("two new slugs cannot share an id");

        assert!(matches!(err, StoreError::Rejected(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn update_with_foreign_id_keeps_stored_id() {
        let store = MemoryProductStore::new();
        let a = product("a");
        let b = product("b");
        store.upsert_batch(&[a.clone(), b.clone()]).await.unwrap();

        let mut renumbered = a.clone();
        renumbered.id = b.id;
        renumbered.quantity = 42;
        store.upsert_batch(&[renumbered]).await.expect("slug conflict updates");

        let row = store.get("a").unwrap();
        assert_eq!(row.id, a.id);
        assert_eq!(row.quantity, 42);
    }

    #[tokio::test]
    async fn slug_index_reports_owners() {
        let store = MemoryProductStore::new();
        let row = product("flat-rack");
        store.upsert_batch(&[row.clone()]).await.unwrap();

        let index = store.slug_index().await.unwrap();
        assert_eq!(index.get("flat-rack"), Some(&row.id));
        assert_eq!(store.owner_of("flat-rack"), Some(row.id));
        assert_eq!(store.owner_of("missing"), None);
    }
}
