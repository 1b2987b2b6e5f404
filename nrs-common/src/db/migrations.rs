//! Versioned schema migrations
//!
//! Each migration runs once, in order, and records its version in
//! `schema_version`. Migrations must stay safe to re-run against a
//! partially migrated database. Never edit a released migration; add a
//! new one.

use crate::db::rounds;
use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Highest migration version this build knows
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let version: Option<i32> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current = get_schema_version(pool).await?;

    if current == CURRENT_SCHEMA_VERSION {
        info!("Responses schema is up to date (v{})", current);
        return Ok(());
    }
    if current > CURRENT_SCHEMA_VERSION {
        warn!(
            "Responses schema v{} is newer than this build (v{}); continuing without migrating",
            current, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!("Migrating responses schema v{} -> v{}", current, CURRENT_SCHEMA_VERSION);

    if current < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1 completed");
    }
    if current < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("Migration v2 completed");
    }

    Ok(())
}

/// v1: one round row per (participant, round number)
///
/// Databases created before the table-level UNIQUE constraint may hold
/// duplicate rows. The earliest row of each pair is the one that received
/// later updates, so it is kept; the unique index then prevents new
/// duplicates.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    let removed = sqlx::query(
        r#"
        DELETE FROM "round"
        WHERE round_number IS NOT NULL
          AND id NOT IN (
            SELECT MIN(id) FROM "round"
            WHERE round_number IS NOT NULL
            GROUP BY participant_id, round_number
          )
        "#,
    )
    .execute(pool)
    .await?
    .rows_affected();

    if removed > 0 {
        warn!("Migration v1: removed {} duplicate round row(s)", removed);
    }

    sqlx::query(
        r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_round_participant_number ON "round" (participant_id, round_number)"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// v2: fill flat rating columns for rounds stored before they existed
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    let updated = rounds::backfill_flat(pool, None).await?;
    info!("Migration v2: flat rating columns filled for {} round(s)", updated);
    Ok(())
}
