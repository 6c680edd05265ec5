use catalog_importer::cache::{CacheStore, PgCache};
use catalog_importer::clock::Clock;
use catalog_importer::config::ImportConfig;
use catalog_importer::import::{ImportOrchestrator, RunMode, RunOptions};
use catalog_importer::models::{Product, ProductCondition, ProductStatus, ProductType};
use catalog_importer::store::{PgProductStore, ProductStore, StoreError};
use catalog_importer::test_support::{ScriptedSource, TestDatabase, TestDatabaseError};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

async fn provision(test: &str) -> Option<TestDatabase> {
    match TestDatabase::new_from_env().await {
        Ok(db) => Some(db),
        Err(TestDatabaseError::MissingUrl) => {
            eprintln!("skipping {test}: no test database configured");
            None
        }
        Err(err) => panic!("failed to provision test database: {err:?}"),
    }
}

fn product(slug: &str) -> Product {
    Product {
        id: Uuid::new_v4(),
        title: format!("Container {slug}"),
        slug: slug.to_string(),
        content: Some("Cargo worthy".into()),
        price: 2150.5,
        old_price: Some(2500.0),
        discount_percentage: Some(14),
        quantity: 6,
        in_stock: true,
        image_cover: Some("cover.jpg".into()),
        image_thumbnail: None,
        container_type: Some("dry,high-cube".into()),
        container_size: Some("40ft".into()),
        production_year: Some(2017),
        condition: Some(ProductCondition::Used),
        location_city: Some("Mersin".into()),
        location_district: None,
        location_country: Some("TR".into()),
        product_type: Some(ProductType::Sale),
        is_new: false,
        is_hot_sale: true,
        is_featured: false,
        is_bulk_sale: false,
        accept_offers: true,
        status: ProductStatus::Published,
        colors: Some(json!(["grey", "blue"])),
        all_prices: Some(json!({"usd": 2150.5})),
        technical_specs: None,
        user_info: Some(json!({"name": "Port depot"})),
    }
}

#[tokio::test]
async fn upsert_is_idempotent_by_slug() {
    let Some(test_db) = provision("upsert test").await else {
        return;
    };
    let store = PgProductStore::new(test_db.pool_clone());

    let original = product("hc-40");
    let written = store
        .upsert_batch(&[original.clone(), product("dry-20")])
        .await
        .expect("first upsert");
    assert_eq!(written, 2);

    let mut changed = original.clone();
    changed.id = Uuid::new_v4();
    changed.price = 1999.0;
    changed.in_stock = false;
    changed.colors = None;
    store.upsert_batch(&[changed]).await.expect("second upsert");

    assert_eq!(store.count().await.unwrap(), 2);
    let row = store
        .find_by_slug("hc-40")
        .await
        .expect("lookup")
        .expect("row exists");
    assert_eq!(row.id, original.id, "id is not part of the update");
    assert_eq!(row.price, 1999.0);
    assert!(!row.in_stock);
    assert_eq!(row.colors, None);
    assert_eq!(row.user_info, Some(json!({"name": "Port depot"})));
    assert_eq!(row.condition, Some(ProductCondition::Used));

    let index = store.slug_index().await.unwrap();
    assert_eq!(index.get("hc-40"), Some(&original.id));

    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn duplicate_slugs_in_one_batch_collapse() {
    let Some(test_db) = provision("in-batch duplicate test").await else {
        return;
    };
    let store = PgProductStore::new(test_db.pool_clone());

    let first = product("reefer");
    let mut second = product("reefer");
    second.quantity = 1;

    store
        .upsert_batch(&[first, second])
        .await
        .expect("batch with duplicate slugs");

    let row = store.find_by_slug("reefer").await.unwrap().unwrap();
    assert_eq!(row.quantity, 1);
    assert_eq!(store.count().await.unwrap(), 1);

    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn failed_batch_rolls_back_entirely() {
    let Some(test_db) = provision("rollback test").await else {
        return;
    };
    let store = PgProductStore::new(test_db.pool_clone());

    let existing = product("existing");
    store.upsert_batch(&[existing.clone()]).await.unwrap();

    let mut clash = product("new-slug");
    clash.id = existing.id;
    let err = store
        .upsert_batch(&[product("innocent"), clash])
        .await
        .expect_err("primary key clash");

    assert!(matches!(err, StoreError::Database(_)));
    assert_eq!(store.count().await.unwrap(), 1);
    assert!(store.find_by_slug("innocent").await.unwrap().is_none());

    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn pg_cache_round_trips_and_expires() {
    let Some(test_db) = provision("cache test").await else {
        return;
    };
    let cache = PgCache::new(test_db.pool_clone());

    cache
        .put("checkpoint", json!(4), Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(cache.get("checkpoint").await.unwrap(), Some(json!(4)));

    cache
        .put("short", json!([1, 2]), Duration::from_millis(1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(cache.get("short").await.unwrap(), None);

    cache.forget("checkpoint").await.unwrap();
    assert!(!cache.has("checkpoint").await.unwrap());

    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn full_import_against_postgres() {
    let Some(test_db) = provision("postgres import test").await else {
        return;
    };
    let pool = test_db.pool_clone();

    let raw = json!({
        "id": "3c9b2e1d-0a4f-4e8b-9c7d-6a5b4c3d2e1f",
        "title": "Open top 20ft",
        "slug": "open-top-20",
        "price": {"current": "1800.00"},
        "stock": {"quantity": 2, "in_stock": 1},
        "status": "published",
        "technical_specs": {"doors": 2}
    });
    let source = ScriptedSource::new().with_page(1, 1, vec![raw]);
    let mut config = ImportConfig::from_env();
    config.rate_limit_identifier = "postgres-import-test".into();

    let orchestrator = ImportOrchestrator::new(
        source,
        PgCache::new(pool.clone()),
        PgProductStore::new(pool.clone()),
        config,
        Clock::system(),
    );

    let stats = orchestrator
        .run(RunOptions {
            resume: false,
            mode: RunMode::Live,
        })
        .await
        .expect("import succeeds");

    assert_eq!(stats.successful_imports, 1);
    let row = orchestrator
        .store()
        .find_by_slug("open-top-20")
        .await
        .unwrap()
        .expect("imported");
    assert_eq!(row.price, 1800.0);
    assert_eq!(row.technical_specs, Some(json!({"doors": 2})));
    assert_eq!(orchestrator.checkpoints().get().await.unwrap(), None);

    test_db.close().await.expect("failed to drop test database");
}
