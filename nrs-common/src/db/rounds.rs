//! Round queries
//!
//! At most one row exists per (participant, round number); writers get or
//! create it with an upsert and then merge their blob into it.

use crate::db::models::RoundRow;
use crate::db::table_schemas::flat_rating_columns;
use crate::ratings::{FlatRatings, LabelStatement, RecStatement};
use crate::responses::{merge_blob, parse_blob, ArticleRatings};
use crate::time::db_timestamp;
use crate::Result;
use serde_json::Value;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, warn};

/// Round-level JSON blob columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundSection {
    ThemeSelection,
    Article,
    MidQuestionnaire,
}

impl RoundSection {
    pub fn column(self) -> &'static str {
        match self {
            RoundSection::ThemeSelection => "theme_selection",
            RoundSection::Article => "article",
            RoundSection::MidQuestionnaire => "mid_questionnaire",
        }
    }
}

/// Get or create the round row, returning its id
pub async fn ensure_round(tx: &mut Transaction<'_, Sqlite>, participant_id: i64, round_number: u32) -> Result<i64> {
    sqlx::query(
        r#"
        INSERT INTO "round" (round_number, participant_id, timestamp)
        VALUES (?, ?, ?)
        ON CONFLICT(participant_id, round_number) DO NOTHING
        "#,
    )
    .bind(round_number as i64)
    .bind(participant_id)
    .bind(db_timestamp())
    .execute(&mut **tx)
    .await?;

    let id: i64 = sqlx::query_scalar(r#"SELECT id FROM "round" WHERE participant_id = ? AND round_number = ?"#)
        .bind(participant_id)
        .bind(round_number as i64)
        .fetch_one(&mut **tx)
        .await?;
    Ok(id)
}

/// Merge `value` into a round blob column and return the merged value
pub async fn merge_section(
    tx: &mut Transaction<'_, Sqlite>,
    round_id: i64,
    section: RoundSection,
    value: Value,
) -> Result<Value> {
    let column = section.column();
    let stored: Option<String> = sqlx::query_scalar(&format!(r#"SELECT {} FROM "round" WHERE id = ?"#, column))
        .bind(round_id)
        .fetch_one(&mut **tx)
        .await?;

    let existing = match parse_blob(stored.as_deref()) {
        Ok(existing) => existing,
        Err(e) => {
            warn!(
                "Round {} {} holds unreadable JSON ({}); replacing it. Previous value: {}",
                round_id,
                column,
                e,
                stored.as_deref().unwrap_or_default()
            );
            None
        }
    };
    let merged = merge_blob(existing, value);

    sqlx::query(&format!(r#"UPDATE "round" SET {} = ? WHERE id = ?"#, column))
        .bind(serde_json::to_string(&merged)?)
        .bind(round_id)
        .execute(&mut **tx)
        .await?;

    Ok(merged)
}

enum FlatValue {
    Text(Option<String>),
    Int(Option<i64>),
}

/// Values in the order of [`flat_rating_columns`]
fn flat_values(flat: &FlatRatings) -> Vec<FlatValue> {
    let mut values = vec![
        FlatValue::Text(flat.main_article_stable_id.clone()),
        FlatValue::Text(flat.main_article_title.clone()),
        FlatValue::Int(flat.main_article_id),
    ];
    for rec in &flat.recs {
        values.push(FlatValue::Text(rec.stable_id.clone()));
        values.push(FlatValue::Text(rec.title.clone()));
        for statement in RecStatement::ALL {
            values.push(FlatValue::Int(rec.scores.get(statement)));
        }
    }
    for statement in LabelStatement::ALL {
        values.push(FlatValue::Int(flat.labels.get(statement)));
    }
    values
}

/// Overwrite the flat rating columns of one round
pub async fn write_flat(tx: &mut Transaction<'_, Sqlite>, round_id: i64, flat: &FlatRatings) -> Result<()> {
    let assignments: Vec<String> = flat_rating_columns()
        .iter()
        .map(|c| format!("{} = ?", c.name))
        .collect();
    let sql = format!(r#"UPDATE "round" SET {} WHERE id = ?"#, assignments.join(", "));

    let mut query = sqlx::query(&sql);
    for value in flat_values(flat) {
        query = match value {
            FlatValue::Text(v) => query.bind(v),
            FlatValue::Int(v) => query.bind(v),
        };
    }
    query.bind(round_id).execute(&mut **tx).await?;

    Ok(())
}

/// Set the round's timestamp to now
pub async fn touch(tx: &mut Transaction<'_, Sqlite>, round_id: i64) -> Result<()> {
    sqlx::query(r#"UPDATE "round" SET timestamp = ? WHERE id = ?"#)
        .bind(db_timestamp())
        .bind(round_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Project an article blob onto the flat columns
///
/// `None` when the value is not an article record.
pub fn flatten_article_value(article: Value) -> Option<FlatRatings> {
    if !article.is_object() {
        return None;
    }
    let parsed: ArticleRatings = serde_json::from_value(article).ok()?;
    Some(FlatRatings::from_article(&parsed))
}

/// [`flatten_article_value`] for a stored text column
pub fn flatten_article_blob(article: Option<&str>) -> Option<FlatRatings> {
    flatten_article_value(parse_blob(article).ok().flatten()?)
}

/// Recompute flat columns from article blobs
///
/// Limited to one participant when `participant_id` is given. Returns the
/// number of rounds rewritten.
pub async fn backfill_flat(pool: &SqlitePool, participant_id: Option<i64>) -> Result<usize> {
    let rows: Vec<(i64, Option<String>)> = match participant_id {
        Some(pid) => {
            sqlx::query_as(r#"SELECT id, article FROM "round" WHERE participant_id = ? AND article IS NOT NULL"#)
                .bind(pid)
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query_as(r#"SELECT id, article FROM "round" WHERE article IS NOT NULL"#)
                .fetch_all(pool)
                .await?
        }
    };

    let mut tx = pool.begin().await?;
    let mut updated = 0;
    for (round_id, article) in rows {
        match flatten_article_blob(article.as_deref()) {
            Some(flat) => {
                write_flat(&mut tx, round_id, &flat).await?;
                updated += 1;
            }
            None => warn!("Round {} has an unreadable article blob; flat columns left as is", round_id),
        }
    }
    tx.commit().await?;

    debug!("Backfilled flat rating columns for {} round(s)", updated);
    Ok(updated)
}

pub async fn list_for_participant(pool: &SqlitePool, participant_id: i64) -> Result<Vec<RoundRow>> {
    let rows = sqlx::query_as::<_, RoundRow>(r#"SELECT * FROM "round" WHERE participant_id = ? ORDER BY round_number, id"#)
        .bind(participant_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<RoundRow>> {
    let rows = sqlx::query_as::<_, RoundRow>(r#"SELECT * FROM "round" ORDER BY participant_id, round_number, id"#)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database;
    use crate::db::participants::ensure_participant;
    use crate::responses::versioned_json;
    use serde_json::json;

    #[tokio::test]
    async fn test_ensure_round_returns_single_row_per_number() {
        let pool = init_memory_database().await.unwrap();
        let mut tx = pool.begin().await.unwrap();
        let pid = ensure_participant(&mut tx, "P1", None).await.unwrap();
        let a = ensure_round(&mut tx, pid, 1).await.unwrap();
        let b = ensure_round(&mut tx, pid, 1).await.unwrap();
        let c = ensure_round(&mut tx, pid, 2).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(list_for_participant(&pool, pid).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_write_flat_and_read_back() {
        let pool = init_memory_database().await.unwrap();
        let article = ArticleRatings {
            main_article_id: Some(5),
            main_article_stable_id: Some("S5".into()),
            main_article_title: Some("Five".into()),
            recommendations: vec![7, 9],
            recommendations_stable_ids: vec![Some("S7".into()), Some("S9".into())],
            recommendations_titles: vec![Some("Seven".into()), Some("Nine".into())],
            ratings: [("likelihood_7", "4"), ("relevant_9", "2"), ("label_attention", "5")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };

        let mut tx = pool.begin().await.unwrap();
        let pid = ensure_participant(&mut tx, "P1", None).await.unwrap();
        let rid = ensure_round(&mut tx, pid, 1).await.unwrap();
        merge_section(&mut tx, rid, RoundSection::Article, versioned_json(&article).unwrap())
            .await
            .unwrap();
        write_flat(&mut tx, rid, &FlatRatings::from_article(&article)).await.unwrap();
        tx.commit().await.unwrap();

        let rows = list_for_participant(&pool, pid).await.unwrap();
        let flat = &rows[0].flat;
        assert_eq!(flat.main_article_id, Some(5));
        assert_eq!(flat.recs[0].title.as_deref(), Some("Seven"));
        assert_eq!(flat.recs[0].scores.get(RecStatement::Likelihood), Some(4));
        assert_eq!(flat.recs[1].scores.get(RecStatement::Relevant), Some(2));
        assert_eq!(flat.labels.get(LabelStatement::Attention), Some(5));

        let as_json = rows[0].to_json();
        assert_eq!(as_json["rec1_relevant"], json!(2));
        assert_eq!(as_json["article"]["main_article_title"], json!("Five"));
    }

    #[tokio::test]
    async fn test_backfill_rewrites_from_article_blob() {
        let pool = init_memory_database().await.unwrap();
        let mut tx = pool.begin().await.unwrap();
        let pid = ensure_participant(&mut tx, "P1", None).await.unwrap();
        let rid = ensure_round(&mut tx, pid, 1).await.unwrap();
        merge_section(
            &mut tx,
            rid,
            RoundSection::Article,
            json!({"recommendations": [3, 4], "ratings": {"constructive_0": "3", "constructive_4": "1"}}),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(backfill_flat(&pool, Some(pid)).await.unwrap(), 1);
        let rows = list_for_participant(&pool, pid).await.unwrap();
        assert_eq!(rows[0].flat.recs[0].scores.get(RecStatement::Constructive), Some(3));
        assert_eq!(rows[0].flat.recs[1].scores.get(RecStatement::Constructive), Some(1));
    }

    #[tokio::test]
    async fn test_merge_replaces_unreadable_blob() {
        let pool = init_memory_database().await.unwrap();
        let mut tx = pool.begin().await.unwrap();
        let pid = ensure_participant(&mut tx, "P1", None).await.unwrap();
        let rid = ensure_round(&mut tx, pid, 1).await.unwrap();
        sqlx::query(r#"UPDATE "round" SET mid_questionnaire = '{not json' WHERE id = ?"#)
            .bind(rid)
            .execute(&mut *tx)
            .await
            .unwrap();

        let merged = merge_section(&mut tx, rid, RoundSection::MidQuestionnaire, json!({"reason": "Other"}))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(merged, json!({"reason": "Other"}));
        let stored: Option<String> = sqlx::query_scalar(r#"SELECT mid_questionnaire FROM "round" WHERE id = ?"#)
            .bind(rid)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(serde_json::from_str::<Value>(&stored.unwrap()).unwrap(), merged);
    }
}
