//! Round recorder
//!
//! Writes one section of a participant's answers in a single transaction.
//! Participant sections replace the stored blob; round sections are merged
//! into the round row for `(participant, round_number)` and the flat rating
//! columns are recomputed from the merged article blob.
//!
//! A failed write is rolled back and logged; the participant's flow goes on
//! and they can resubmit.

use nrs_common::db::participants::{self, ParticipantSection};
use nrs_common::db::rounds::{self, RoundSection};
use nrs_common::responses::{
    versioned_json, ArticleRatings, Demographics, MidQuestionnaire, PostQuestionnaire, PreQuestionnaire,
    ThemeSelection,
};
use nrs_common::study::Condition;
use nrs_common::Result;
use sqlx::SqlitePool;
use tracing::{debug, error, info};

/// Round fields present in one submission
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundUpdate {
    pub theme_selection: Option<ThemeSelection>,
    pub article: Option<ArticleRatings>,
    pub mid_questionnaire: Option<MidQuestionnaire>,
}

/// One section of answers
#[derive(Debug, Clone, PartialEq)]
pub enum SectionData {
    Demographics(Demographics),
    PreQuestionnaire(PreQuestionnaire),
    PostQuestionnaire(PostQuestionnaire),
    Round(RoundUpdate),
}

impl SectionData {
    pub fn name(&self) -> &'static str {
        match self {
            SectionData::Demographics(_) => "demographics",
            SectionData::PreQuestionnaire(_) => "pre_questionnaire",
            SectionData::PostQuestionnaire(_) => "post_questionnaire",
            SectionData::Round(_) => "round",
        }
    }
}

/// Who the write belongs to
#[derive(Debug, Clone, Copy)]
pub struct RecordContext<'a> {
    pub prolific_id: &'a str,
    /// Written onto the participant record if it has none yet
    pub condition: Option<Condition>,
    pub round_number: u32,
}

/// Persist one section; errors leave the database unchanged
pub async fn record(pool: &SqlitePool, ctx: &RecordContext<'_>, data: &SectionData) -> Result<()> {
    let mut tx = pool.begin().await?;
    let participant_id = participants::ensure_participant(&mut tx, ctx.prolific_id, ctx.condition).await?;

    match data {
        SectionData::Demographics(d) => {
            participants::write_section(&mut tx, participant_id, ParticipantSection::Demographics, &versioned_json(d)?)
                .await?;
        }
        SectionData::PreQuestionnaire(p) => {
            participants::write_section(
                &mut tx,
                participant_id,
                ParticipantSection::PreQuestionnaire,
                &versioned_json(p)?,
            )
            .await?;
        }
        SectionData::PostQuestionnaire(p) => {
            participants::write_section(
                &mut tx,
                participant_id,
                ParticipantSection::PostQuestionnaire,
                &versioned_json(p)?,
            )
            .await?;
        }
        SectionData::Round(update) => {
            let round_id = rounds::ensure_round(&mut tx, participant_id, ctx.round_number).await?;

            if let Some(theme) = &update.theme_selection {
                rounds::merge_section(&mut tx, round_id, RoundSection::ThemeSelection, versioned_json(theme)?).await?;
            }
            if let Some(article) = &update.article {
                let merged = rounds::merge_section(&mut tx, round_id, RoundSection::Article, versioned_json(article)?)
                    .await?;
                match rounds::flatten_article_value(merged) {
                    Some(flat) => rounds::write_flat(&mut tx, round_id, &flat).await?,
                    None => debug!("Round {} article blob did not flatten", round_id),
                }
            }
            if let Some(mid) = &update.mid_questionnaire {
                rounds::merge_section(&mut tx, round_id, RoundSection::MidQuestionnaire, versioned_json(mid)?)
                    .await?;
            }
            rounds::touch(&mut tx, round_id).await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

/// [`record`] with logging; returns whether the write succeeded
pub async fn persist(pool: &SqlitePool, ctx: &RecordContext<'_>, data: &SectionData) -> bool {
    match record(pool, ctx, data).await {
        Ok(()) => {
            info!("[{}] saved for participant {}", data.name(), ctx.prolific_id);
            true
        }
        Err(e) => {
            error!(
                "Failed to save [{}] for participant {} (round {}): {}",
                data.name(),
                ctx.prolific_id,
                ctx.round_number,
                e
            );
            false
        }
    }
}
