//! Declared shapes of the response tables

use crate::db::schema_sync::{ColumnDefinition, SchemaSync, TableSchema};
use crate::ratings::{LabelStatement, RecStatement, RECOMMENDATION_SLOTS};
use crate::Result;
use sqlx::SqlitePool;
use tracing::info;

pub const PARTICIPANT_TABLE: &str = "participant";
pub const ROUND_TABLE: &str = "round";

pub struct ParticipantTableSchema;

impl TableSchema for ParticipantTableSchema {
    fn table_name() -> &'static str {
        PARTICIPANT_TABLE
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::new("id", "INTEGER").primary_key(),
            ColumnDefinition::new("prolific_id", "TEXT").not_null(),
            ColumnDefinition::new("condition", "TEXT"),
            ColumnDefinition::new("timestamp_start", "TIMESTAMP"),
            // JSON blobs
            ColumnDefinition::new("demographics", "TEXT"),
            ColumnDefinition::new("pre_questionnaire", "TEXT"),
            ColumnDefinition::new("post_questionnaire", "TEXT"),
        ]
    }
}

pub struct RoundTableSchema;

impl TableSchema for RoundTableSchema {
    fn table_name() -> &'static str {
        ROUND_TABLE
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        let mut columns = vec![
            ColumnDefinition::new("id", "INTEGER").primary_key(),
            ColumnDefinition::new("round_number", "INTEGER"),
            ColumnDefinition::new("participant_id", "INTEGER").not_null(),
            ColumnDefinition::new("theme_selection", "TEXT"),
            ColumnDefinition::new("article", "TEXT"),
            ColumnDefinition::new("mid_questionnaire", "TEXT"),
            ColumnDefinition::new("timestamp", "TIMESTAMP"),
        ];
        columns.extend(flat_rating_columns());
        columns
    }
}

/// Flat per-recommendation columns, derived from the article blob
///
/// `main_article_stable_id, main_article_title, main_article_id,
/// rec{0,1}_stable_id, rec{0,1}_title, rec{0,1}_<statement>, label_*`
pub fn flat_rating_columns() -> Vec<ColumnDefinition> {
    let mut columns = vec![
        ColumnDefinition::new("main_article_stable_id", "TEXT"),
        ColumnDefinition::new("main_article_title", "TEXT"),
        ColumnDefinition::new("main_article_id", "INTEGER"),
    ];
    for slot in 0..RECOMMENDATION_SLOTS {
        columns.push(ColumnDefinition::new(format!("rec{}_stable_id", slot), "TEXT"));
        columns.push(ColumnDefinition::new(format!("rec{}_title", slot), "TEXT"));
        for statement in RecStatement::ALL {
            columns.push(ColumnDefinition::new(rec_column(slot, statement), "INTEGER"));
        }
    }
    for statement in LabelStatement::ALL {
        columns.push(ColumnDefinition::new(statement.key(), "INTEGER"));
    }
    columns
}

/// `rec1_trustworthy`
pub fn rec_column(slot: usize, statement: RecStatement) -> String {
    format!("rec{}_{}", slot, statement.as_str())
}

/// Phase 2 of initialization
pub async fn sync_all_table_schemas(pool: &SqlitePool) -> Result<()> {
    let added = SchemaSync::sync_table::<ParticipantTableSchema>(pool).await?
        + SchemaSync::sync_table::<RoundTableSchema>(pool).await?;
    if added > 0 {
        info!("Schema sync added {} column(s)", added);
    }
    Ok(())
}
