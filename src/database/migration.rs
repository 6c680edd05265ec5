//! Database migration management.
//!
//! Validates and applies the embedded SQLx migrations before an import touches
//! the `products` or `cache_entries` tables.

use sqlx::{PgPool, migrate::Migrator};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run database migrations.
///
/// This is idempotent - migrations that have already been applied will be skipped.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    log::info!("checking database migration state");

    // `run` creates the migrations table, verifies checksums and applies
    // anything pending.
    MIGRATOR.run(pool).await?;

    log::info!("database migrations up to date");
    Ok(())
}

/// Drop every importer table and re-run migrations from scratch.
///
/// **WARNING**: This removes all imported products and any stored checkpoint.
pub async fn reset_database(pool: &PgPool) -> Result<(), sqlx::Error> {
    log::info!("resetting database schema");

    sqlx::query("DROP TABLE IF EXISTS cache_entries CASCADE")
        .execute(pool)
        .await?;

    sqlx::query("DROP TABLE IF EXISTS products CASCADE")
        .execute(pool)
        .await?;

    sqlx::query("DROP TABLE IF EXISTS _sqlx_migrations")
        .execute(pool)
        .await?;

    log::info!("importer tables dropped, running migrations");

    MIGRATOR.run(pool).await?;

    log::info!("database schema recreated via migrations");
    Ok(())
}
