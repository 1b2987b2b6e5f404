//! Database row models

use crate::db::table_schemas::rec_column;
use crate::ratings::{FlatRatings, LabelStatement, RecStatement};
use crate::responses::parse_blob;
use crate::study::Condition;
use serde::Serialize;
use serde_json::{json, Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ParticipantRow {
    pub id: i64,
    pub prolific_id: String,
    pub condition: Option<String>,
    pub timestamp_start: Option<String>,
    pub demographics: Option<String>,
    pub pre_questionnaire: Option<String>,
    pub post_questionnaire: Option<String>,
}

impl ParticipantRow {
    /// Stored condition, `None` when unset or unrecognized
    pub fn condition(&self) -> Option<Condition> {
        self.condition.as_deref().and_then(|c| c.parse().ok())
    }

    /// Row with the JSON blobs parsed (unparseable blobs are shown raw)
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "prolific_id": self.prolific_id,
            "condition": self.condition,
            "timestamp_start": self.timestamp_start,
            "demographics": blob_value(self.demographics.as_deref()),
            "pre_questionnaire": blob_value(self.pre_questionnaire.as_deref()),
            "post_questionnaire": blob_value(self.post_questionnaire.as_deref()),
        })
    }
}

/// One stored round: JSON blobs plus the flat rating columns
#[derive(Debug, Clone)]
pub struct RoundRow {
    pub id: i64,
    pub round_number: Option<i64>,
    pub participant_id: i64,
    pub theme_selection: Option<String>,
    pub article: Option<String>,
    pub mid_questionnaire: Option<String>,
    pub timestamp: Option<String>,
    pub flat: FlatRatings,
}

impl<'r> FromRow<'r, SqliteRow> for RoundRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let mut flat = FlatRatings {
            main_article_id: row.try_get("main_article_id")?,
            main_article_stable_id: row.try_get("main_article_stable_id")?,
            main_article_title: row.try_get("main_article_title")?,
            ..Default::default()
        };
        for (slot, rec) in flat.recs.iter_mut().enumerate() {
            rec.stable_id = row.try_get(format!("rec{}_stable_id", slot).as_str())?;
            rec.title = row.try_get(format!("rec{}_title", slot).as_str())?;
            for statement in RecStatement::ALL {
                rec.scores
                    .set(statement, row.try_get(rec_column(slot, statement).as_str())?);
            }
        }
        for statement in LabelStatement::ALL {
            flat.labels.set(statement, row.try_get(statement.key())?);
        }

        Ok(Self {
            id: row.try_get("id")?,
            round_number: row.try_get("round_number")?,
            participant_id: row.try_get("participant_id")?,
            theme_selection: row.try_get("theme_selection")?,
            article: row.try_get("article")?,
            mid_questionnaire: row.try_get("mid_questionnaire")?,
            timestamp: row.try_get("timestamp")?,
            flat,
        })
    }
}

impl RoundRow {
    /// Row as JSON, flat columns under their column names
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("id".into(), json!(self.id));
        out.insert("round_number".into(), json!(self.round_number));
        out.insert("participant_id".into(), json!(self.participant_id));
        out.insert("timestamp".into(), json!(self.timestamp));
        out.insert("theme_selection".into(), blob_value(self.theme_selection.as_deref()));
        out.insert("article".into(), blob_value(self.article.as_deref()));
        out.insert("mid_questionnaire".into(), blob_value(self.mid_questionnaire.as_deref()));

        out.insert("main_article_id".into(), json!(self.flat.main_article_id));
        out.insert("main_article_stable_id".into(), json!(self.flat.main_article_stable_id));
        out.insert("main_article_title".into(), json!(self.flat.main_article_title));
        for (slot, rec) in self.flat.recs.iter().enumerate() {
            out.insert(format!("rec{}_stable_id", slot), json!(rec.stable_id));
            out.insert(format!("rec{}_title", slot), json!(rec.title));
            for statement in RecStatement::ALL {
                out.insert(rec_column(slot, statement), json!(rec.scores.get(statement)));
            }
        }
        for statement in LabelStatement::ALL {
            out.insert(statement.key().to_string(), json!(self.flat.labels.get(statement)));
        }

        Value::Object(out)
    }
}

fn blob_value(text: Option<&str>) -> Value {
    match parse_blob(text) {
        Ok(Some(value)) => value,
        Ok(None) => Value::Null,
        Err(_) => json!(text),
    }
}
