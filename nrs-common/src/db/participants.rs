//! Participant queries
//!
//! Writes take a transaction so a section update and the participant
//! upsert it depends on commit together. Participant sections are
//! replaced whole; round blobs are merged (see [`super::rounds`]).

use crate::db::models::ParticipantRow;
use crate::study::Condition;
use crate::time::db_timestamp;
use crate::Result;
use serde_json::Value;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::{HashMap, HashSet};

/// Participant-level JSON blob columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantSection {
    Demographics,
    PreQuestionnaire,
    PostQuestionnaire,
}

impl ParticipantSection {
    pub fn column(self) -> &'static str {
        match self {
            ParticipantSection::Demographics => "demographics",
            ParticipantSection::PreQuestionnaire => "pre_questionnaire",
            ParticipantSection::PostQuestionnaire => "post_questionnaire",
        }
    }
}

pub async fn find_by_prolific_id(pool: &SqlitePool, prolific_id: &str) -> Result<Option<ParticipantRow>> {
    let row = sqlx::query_as::<_, ParticipantRow>("SELECT * FROM participant WHERE prolific_id = ?")
        .bind(prolific_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Get or create the participant row, returning its id
///
/// A condition is only written when the stored one is empty; an assigned
/// condition never changes through this path.
pub async fn ensure_participant(
    tx: &mut Transaction<'_, Sqlite>,
    prolific_id: &str,
    condition: Option<Condition>,
) -> Result<i64> {
    sqlx::query(
        r#"
        INSERT INTO participant (prolific_id, condition, timestamp_start)
        VALUES (?, ?, ?)
        ON CONFLICT(prolific_id) DO NOTHING
        "#,
    )
    .bind(prolific_id)
    .bind(condition.map(Condition::as_str))
    .bind(db_timestamp())
    .execute(&mut **tx)
    .await?;

    let id: i64 = sqlx::query_scalar("SELECT id FROM participant WHERE prolific_id = ?")
        .bind(prolific_id)
        .fetch_one(&mut **tx)
        .await?;

    if let Some(condition) = condition {
        sqlx::query("UPDATE participant SET condition = ? WHERE id = ? AND (condition IS NULL OR condition = '')")
            .bind(condition.as_str())
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }

    Ok(id)
}

/// Replace a participant blob column (last write wins)
pub async fn write_section(
    tx: &mut Transaction<'_, Sqlite>,
    participant_id: i64,
    section: ParticipantSection,
    value: &Value,
) -> Result<()> {
    sqlx::query(&format!("UPDATE participant SET {} = ? WHERE id = ?", section.column()))
        .bind(serde_json::to_string(value)?)
        .bind(participant_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Stored participants per known condition (zero counts included)
pub async fn condition_counts(pool: &SqlitePool) -> Result<HashMap<Condition, i64>> {
    let rows: Vec<(Option<String>, i64)> =
        sqlx::query_as("SELECT condition, COUNT(*) FROM participant GROUP BY condition")
            .fetch_all(pool)
            .await?;

    let mut counts: HashMap<Condition, i64> = Condition::ALL.iter().map(|c| (*c, 0)).collect();
    for (condition, count) in rows {
        if let Some(condition) = condition.and_then(|c| c.parse::<Condition>().ok()) {
            counts.insert(condition, count);
        }
    }
    Ok(counts)
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM participant")
        .fetch_one(pool)
        .await?;
    Ok(total)
}

/// Identifiers of every stored participant
pub async fn prolific_ids(pool: &SqlitePool) -> Result<HashSet<String>> {
    let ids: Vec<String> = sqlx::query_scalar("SELECT prolific_id FROM participant")
        .fetch_all(pool)
        .await?;
    Ok(ids.into_iter().collect())
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<ParticipantRow>> {
    let rows = sqlx::query_as::<_, ParticipantRow>("SELECT * FROM participant ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Overwrite a participant's condition (diagnostics)
pub async fn set_condition(pool: &SqlitePool, prolific_id: &str, condition: Condition) -> Result<bool> {
    let result = sqlx::query("UPDATE participant SET condition = ? WHERE prolific_id = ?")
        .bind(condition.as_str())
        .bind(prolific_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove every participant and round; returns (participants, rounds) deleted
pub async fn delete_all(pool: &SqlitePool) -> Result<(u64, u64)> {
    let mut tx = pool.begin().await?;
    let rounds = sqlx::query("DELETE FROM \"round\"").execute(&mut *tx).await?.rows_affected();
    let participants = sqlx::query("DELETE FROM participant").execute(&mut *tx).await?.rows_affected();
    tx.commit().await?;
    Ok((participants, rounds))
}
