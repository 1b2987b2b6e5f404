//! Database initialization
//!
//! Opens (creating if missing) the responses database and brings it to the
//! current schema: tables, then column sync, then versioned migrations.
//! Safe to run against a database written by any earlier deployment.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Open or create the responses database at `db_path`
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    // WAL lets page handlers read while a round is being written
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new responses database: {}", db_path.display());
    } else {
        info!("Opened existing responses database: {}", db_path.display());
    }

    prepare_schema(&pool).await?;
    Ok(pool)
}

/// Private in-memory database with the full schema
///
/// Limited to one long-lived connection: every connection to
/// `sqlite::memory:` is a separate database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    prepare_schema(&pool).await?;
    Ok(pool)
}

async fn prepare_schema(pool: &SqlitePool) -> Result<()> {
    // Phase 1
    create_schema_version_table(pool).await?;
    create_participant_table(pool).await?;
    create_round_table(pool).await?;

    // Phase 2
    crate::db::table_schemas::sync_all_table_schemas(pool).await?;

    // Phase 3
    crate::db::migrations::run_migrations(pool).await?;

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

    Ok(())
}

async fn create_participant_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS participant (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            prolific_id TEXT NOT NULL UNIQUE,
            condition TEXT,
            timestamp_start TIMESTAMP,
            demographics TEXT,
            pre_questionnaire TEXT,
            post_questionnaire TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Flat rating columns are added by the column sync that follows
async fn create_round_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS "round" (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            round_number INTEGER,
            participant_id INTEGER NOT NULL REFERENCES participant(id) ON DELETE CASCADE,
            theme_selection TEXT,
            article TEXT,
            mid_questionnaire TEXT,
            timestamp TIMESTAMP,
            UNIQUE (participant_id, round_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
