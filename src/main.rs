use std::io::{self, Write};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use catalog_importer::api::ProductApiClient;
use catalog_importer::cache::{CacheStore, MemoryCache, PgCache};
use catalog_importer::clock::Clock;
use catalog_importer::config::{ApiConfig, ImportConfig};
use catalog_importer::database::run_migrations;
use catalog_importer::db::connect_pool;
use catalog_importer::import::{ImportOrchestrator, RunMode, RunOptions};
use catalog_importer::store::{MemoryProductStore, PgProductStore, ProductStore};
use catalog_importer::summary::render_summary;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum CacheBackend {
    /// Process memory; checkpoints do not survive the process.
    Memory,
    /// The `cache_entries` table, shared by every importer on the database.
    Database,
}

#[derive(Parser, Debug)]
#[command(
    name = "catalog-importer",
    about = "Import products from the third-party API with rate limiting and validation"
)]
struct Args {
    /// Resume from the last checkpoint.
    #[arg(long)]
    resume: bool,

    /// Validate products without saving them to the database.
    #[arg(long)]
    dry_run: bool,

    /// Where checkpoints and the rate-limit window are kept.
    #[arg(long, value_enum, default_value_t = CacheBackend::Database)]
    cache: CacheBackend,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    catalog_importer::init_logger();

    let args = Args::parse();
    let config = ImportConfig::from_env();
    let Some(api_config) = ApiConfig::from_env(&config) else {
        writeln!(io::stderr(), "error: PRODUCT_API_URL is not set")?;
        return Ok(ExitCode::FAILURE);
    };

    let clock = Clock::system();
    let client = ProductApiClient::new(api_config, clock.clone())?;
    let options = RunOptions {
        resume: args.resume,
        mode: if args.dry_run {
            RunMode::DryRun
        } else {
            RunMode::Live
        },
    };

    println!("Starting product import...");

    // A dry run with an in-memory cache never touches the database.
    if args.dry_run && args.cache == CacheBackend::Memory {
        let orchestrator = ImportOrchestrator::new(
            client,
            MemoryCache::with_clock(clock.clone()),
            MemoryProductStore::new(),
            config,
            clock,
        );
        return import(&orchestrator, options).await;
    }

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = connect_pool(&database_url).await?;
    run_migrations(&pool).await?;

    let store = PgProductStore::new(pool.clone());
    match args.cache {
        CacheBackend::Database => {
            let cache = PgCache::new(pool);
            match cache.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => log::debug!("purged {} expired cache entries", purged),
                Err(err) => log::warn!("failed to purge expired cache entries: {}", err),
            }
            let orchestrator = ImportOrchestrator::new(client, cache, store, config, clock);
            import(&orchestrator, options).await
        }
        CacheBackend::Memory => {
            let cache = MemoryCache::with_clock(clock.clone());
            let orchestrator = ImportOrchestrator::new(client, cache, store, config, clock);
            import(&orchestrator, options).await
        }
    }
}

async fn import<K, P>(
    orchestrator: &ImportOrchestrator<ProductApiClient, K, P>,
    options: RunOptions,
) -> Result<ExitCode, Box<dyn std::error::Error>>
where
    K: CacheStore + Clone,
    P: ProductStore,
{
    match orchestrator.run(options).await {
        Ok(stats) => {
            print!("{}", render_summary(&stats.snapshot(), options.mode));
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            writeln!(
                io::stderr(),
                "Critical error during import: {}",
                failure.error
            )?;
            if let Some(page) = failure.resume_page {
                writeln!(
                    io::stderr(),
                    "\nYou can resume from page {page} using: catalog-importer --resume"
                )?;
            }
            Ok(ExitCode::FAILURE)
        }
    }
}
