use catalog_importer::api::ApiError;
use catalog_importer::cache::MemoryCache;
use catalog_importer::clock::{Clock, ManualClock};
use catalog_importer::config::{DEFAULT_RECOVERABLE_ERRORS, ImportConfig};
use catalog_importer::error::ImportError;
use catalog_importer::import::{ImportOrchestrator, RunMode, RunOptions};
use catalog_importer::store::{MemoryProductStore, ProductStore, StoreError};
use catalog_importer::test_support::ScriptedSource;
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::time::Duration;

type Orchestrator = ImportOrchestrator<ScriptedSource, MemoryCache, MemoryProductStore>;

fn config() -> ImportConfig {
    ImportConfig {
        checkpoint_key: "product_import_checkpoint".into(),
        checkpoint_ttl: Duration::from_secs(24 * 60 * 60),
        max_retries: 3,
        retry_delay: Duration::from_millis(1_000),
        batch_size: 100,
        rate_limit: 10,
        rate_limit_identifier: "pipeline-test".into(),
        recoverable_errors: DEFAULT_RECOVERABLE_ERRORS
            .iter()
            .map(|pattern| pattern.to_string())
            .collect(),
        recoverable_delay: Duration::from_secs(5),
        max_recoverable_retries: None,
    }
}

fn orchestrator(source: ScriptedSource, config: ImportConfig) -> (Orchestrator, ManualClock) {
    let (clock, handle) = Clock::manual(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap());
    let cache = MemoryCache::with_clock(clock.clone());
    let orchestrator =
        ImportOrchestrator::new(source, cache, MemoryProductStore::new(), config, clock);
    (orchestrator, handle)
}

fn product(id: &str, slug: &str) -> Value {
    json!({
        "id": id,
        "title": format!("Container {slug}"),
        "slug": slug,
        "price": {"current": 1200, "old": 1500},
        "stock": {"quantity": 3, "in_stock": true},
        "container": {"types": ["dry"], "size": "20ft"},
        "condition": "used",
        "type": "sale",
        "status": "published",
        "colors": ["blue"]
    })
}

const ID_A: &str = "6f1c2a3b-4d5e-4f60-8a7b-1c2d3e4f5a60";
const ID_B: &str = "7a2d3b4c-5e6f-4071-9b8c-2d3e4f5a6b71";
const ID_C: &str = "8b3e4c5d-6f70-4182-ac9d-3e4f5a6b7c82";

fn live() -> RunOptions {
    RunOptions {
        resume: false,
        mode: RunMode::Live,
    }
}

#[tokio::test]
async fn invalid_records_are_counted_but_not_stored() {
    let mut invalid = product(ID_B, "broken");
    invalid["price"] = json!({"current": -5});

    let source = ScriptedSource::new().with_page(1, 1, vec![product(ID_A, "dry-20"), invalid]);
    let (orchestrator, _clock) = orchestrator(source, config());

    let stats = orchestrator.run(live()).await.expect("import succeeds");

    assert_eq!(stats.total_processed, 2);
    assert_eq!(stats.successful_imports, 1);
    assert_eq!(stats.failed_validations, 1);
    assert_eq!(stats.success_rate(), 50.0);

    let store = orchestrator.store();
    assert_eq!(store.count().await.unwrap(), 1);
    let saved = store.find_by_slug("dry-20").await.unwrap().expect("stored");
    assert_eq!(saved.price, 1200.0);
    assert_eq!(saved.colors, Some(json!(["blue"])));
    assert!(store.get("broken").is_none());
}

#[tokio::test]
async fn completed_run_clears_checkpoint() {
    let source = ScriptedSource::new()
        .with_page(1, 2, vec![product(ID_A, "a")])
        .with_page(2, 2, vec![product(ID_B, "b")]);
    let (orchestrator, _clock) = orchestrator(source.clone(), config());

    orchestrator.run(live()).await.expect("import succeeds");

    assert_eq!(source.calls(), vec![1, 2]);
    assert_eq!(orchestrator.checkpoints().get().await.unwrap(), None);
    assert_eq!(orchestrator.store().len(), 2);
}

#[tokio::test]
async fn execute_leaves_checkpoint_after_last_page() {
    let source = ScriptedSource::new()
        .with_page(1, 2, vec![product(ID_A, "a")])
        .with_page(2, 2, vec![]);
    let (orchestrator, _clock) = orchestrator(source, config());

    orchestrator
        .execute(1, RunMode::Live)
        .await
        .expect("import succeeds");

    assert_eq!(orchestrator.checkpoints().get().await.unwrap(), Some(3));
}

#[tokio::test]
async fn dry_run_validates_without_persisting() {
    let source = ScriptedSource::new().with_page(1, 1, vec![product(ID_A, "dry-run")]);
    let (orchestrator, _clock) = orchestrator(source, config());

    let stats = orchestrator
        .run(RunOptions {
            resume: false,
            mode: RunMode::DryRun,
        })
        .await
        .expect("dry run succeeds");

    assert_eq!(stats.successful_imports, 1);
    assert!(orchestrator.store().is_empty());
}

#[tokio::test]
async fn resume_starts_from_saved_checkpoint() {
    let source = ScriptedSource::new()
        .with_page(1, 2, vec![product(ID_A, "a")])
        .with_page(2, 2, vec![product(ID_B, "b")]);
    let (orchestrator, _clock) = orchestrator(source.clone(), config());
    orchestrator.checkpoints().save(2).await.unwrap();

    orchestrator
        .run(RunOptions {
            resume: true,
            mode: RunMode::Live,
        })
        .await
        .expect("resumed import succeeds");

    assert_eq!(source.calls(), vec![2]);
    assert!(orchestrator.store().get("a").is_none());
    assert!(orchestrator.store().get("b").is_some());
}

#[tokio::test]
async fn fresh_run_discards_stale_checkpoint() {
    let source = ScriptedSource::new().with_page(1, 1, vec![product(ID_A, "a")]);
    let (orchestrator, _clock) = orchestrator(source.clone(), config());
    orchestrator.checkpoints().save(7).await.unwrap();

    orchestrator.run(live()).await.expect("import succeeds");

    assert_eq!(source.calls(), vec![1]);
}

#[tokio::test]
async fn recoverable_error_retries_same_page_after_delay() {
    let source = ScriptedSource::new()
        .with_page(1, 1, vec![product(ID_A, "a")])
        .fail_page(1, ApiError::Transport("connection reset by peer".into()));
    let (orchestrator, clock) = orchestrator(source.clone(), config());

    let stats = orchestrator.run(live()).await.expect("import recovers");

    assert_eq!(source.calls(), vec![1, 1]);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
    assert_eq!(stats.successful_imports, 1);
}

#[tokio::test]
async fn bounded_recoverable_retries_give_up() {
    let timeout = || ApiError::Transport("request timeout: deadline elapsed".into());
    let source = ScriptedSource::new()
        .with_page(1, 1, vec![product(ID_A, "a")])
        .fail_page(1, timeout())
        .fail_page(1, timeout())
        .fail_page(1, timeout());
    let mut config = config();
    config.max_recoverable_retries = Some(2);
    let (orchestrator, clock) = orchestrator(source.clone(), config);

    let failure = orchestrator.run(live()).await.expect_err("import aborts");

    assert!(matches!(failure.error, ImportError::Fetch(ApiError::Transport(_))));
    assert_eq!(source.calls(), vec![1, 1, 1]);
    assert_eq!(clock.total_slept(), Duration::from_secs(10));
}

#[tokio::test]
async fn unrecoverable_fetch_error_keeps_checkpoint() {
    let source = ScriptedSource::new()
        .with_page(1, 3, vec![product(ID_A, "a")])
        .fail_page(2, ApiError::http(StatusCode::NOT_FOUND, "no such page"));
    let (orchestrator, clock) = orchestrator(source.clone(), config());

    let failure = orchestrator.run(live()).await.expect_err("import aborts");

    assert!(matches!(failure.error, ImportError::Fetch(ApiError::Http { .. })));
    assert_eq!(failure.page, 2);
    assert_eq!(failure.resume_page, Some(2));
    assert_eq!(failure.stats.successful_imports, 1);
    assert_eq!(source.calls(), vec![1, 2]);
    assert!(clock.sleeps().is_empty());
    assert_eq!(orchestrator.checkpoints().get().await.unwrap(), Some(2));
    assert!(orchestrator.store().get("a").is_some());
}

#[tokio::test]
async fn request_errors_abort_without_recoverable_delay() {
    let source = ScriptedSource::new()
        .with_page(1, 1, vec![product(ID_A, "a")])
        .fail_page(1, ApiError::Request("builder error".into()));
    let (orchestrator, clock) = orchestrator(source.clone(), config());

    let failure = orchestrator.run(live()).await.expect_err("import aborts");

    assert!(matches!(failure.error, ImportError::Fetch(ApiError::Request(_))));
    assert_eq!(failure.page, 1);
    assert_eq!(source.calls(), vec![1]);
    assert!(clock.sleeps().is_empty());
    assert!(orchestrator.store().is_empty());
}

#[tokio::test]
async fn persistence_failure_aborts_the_run() {
    // Same id under a new slug violates the primary key.
    let source = ScriptedSource::new()
        .with_page(1, 2, vec![product(ID_A, "original")])
        .with_page(2, 2, vec![product(ID_C, "c"), product(ID_A, "renamed")]);
    let (orchestrator, _clock) = orchestrator(source.clone(), config());

    let failure = orchestrator.run(live()).await.expect_err("import aborts");

    assert!(matches!(
        failure.error,
        ImportError::Persist(StoreError::Rejected(_))
    ));
    assert_eq!(failure.resume_page, Some(2));
    assert_eq!(failure.stats.successful_imports, 3);
    assert!(orchestrator.store().get("c").is_none());
    assert_eq!(orchestrator.store().len(), 1);
}

#[tokio::test]
async fn rate_limit_delays_the_next_request() {
    let source = ScriptedSource::new()
        .with_page(1, 2, vec![product(ID_A, "a")])
        .with_page(2, 2, vec![product(ID_B, "b")]);
    let mut config = config();
    config.rate_limit = 1;
    let (orchestrator, clock) = orchestrator(source, config);

    orchestrator.run(live()).await.expect("import succeeds");

    assert_eq!(clock.sleeps(), vec![Duration::from_secs(60)]);
    assert_eq!(orchestrator.rate_limiter().remaining().await, 0);
    assert!(orchestrator.rate_limiter().is_limit_exceeded().await);
}

#[tokio::test]
async fn reimport_updates_existing_rows() {
    let mut changed = product(ID_A, "a");
    changed["price"] = json!({"current": 999});

    let first = ScriptedSource::new().with_page(1, 1, vec![product(ID_A, "a")]);
    let (orchestrator, _clock) = orchestrator(first, config());
    orchestrator.run(live()).await.expect("first import");
    let store = orchestrator.store().clone();

    let (clock, _handle) = Clock::manual(Utc::now());
    let second = ImportOrchestrator::new(
        ScriptedSource::new().with_page(1, 1, vec![changed]),
        MemoryCache::with_clock(clock.clone()),
        store.clone(),
        config(),
        clock,
    );
    second.run(live()).await.expect("second import");

    assert_eq!(store.len(), 1);
    assert_eq!(store.get("a").unwrap().price, 999.0);
}
