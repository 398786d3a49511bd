//! Dataset database initialization
//!
//! One SQLite file per loaded dataset holds both the scan records and the
//! component overlay. Creation is idempotent so reopening an existing
//! dataset runs the same path as creating a fresh one.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Schema version written to fresh datasets
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize a dataset database connection, creating the file and schema
/// if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new dataset: {}", db_path.display());
    } else {
        info!("Opened existing dataset: {}", db_path.display());
    }

    configure_connection(&pool).await?;

    create_schema_version_table(&pool).await?;
    create_files_table(&pool).await?;
    create_components_table(&pool).await?;
    create_scan_headers_table(&pool).await?;

    Ok(pool)
}

/// Open an in-memory dataset, used by tests and scratch sessions
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    configure_connection(&pool).await?;

    create_schema_version_table(&pool).await?;
    create_files_table(&pool).await?;
    create_components_table(&pool).await?;
    create_scan_headers_table(&pool).await?;

    Ok(pool)
}

async fn configure_connection(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    // WAL allows a reader to observe committed batches while ingest writes
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the files table
///
/// One row per scanned path. Findings are stored as a JSON object mapping
/// scanner field names to value arrays.
pub async fn create_files_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            guid TEXT PRIMARY KEY,
            path TEXT NOT NULL UNIQUE,
            type TEXT NOT NULL CHECK (type IN ('file', 'directory')),
            findings TEXT NOT NULL DEFAULT '{}',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_path ON files(path)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_type ON files(type)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the components table
///
/// At most one overlay row per path. No foreign key into files: the overlay
/// is path-addressed and may outlive the records it annotates.
pub async fn create_components_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS components (
            guid TEXT PRIMARY KEY,
            path TEXT NOT NULL UNIQUE,
            review_status TEXT NOT NULL DEFAULT ''
                CHECK (review_status IN ('', 'Analyzed', 'Attention', 'Original', 'NR')),
            name TEXT,
            version TEXT,
            license_expression TEXT,
            owner TEXT,
            copyright TEXT,
            homepage_url TEXT,
            notes TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_components_path ON components(path)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the scan_headers table
///
/// Captures producer metadata carried next to the `files` array: scanner
/// version, invocation options, and the producer version the caller passed.
pub async fn create_scan_headers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scan_headers (
            key TEXT PRIMARY KEY,
            value TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
