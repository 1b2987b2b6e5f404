//! HTTP handlers for nrs-study

pub mod admin;
pub mod article;
pub mod health;
pub mod pages;
pub mod questionnaires;

pub use admin::{
    admin_auth, article_detail, article_summary, backfill_flat, list_tables, reset_data, round_data, set_condition,
};
pub use article::{article_entry, article_page, submit_article};
pub use health::health_routes;
pub use pages::{
    demographics_page, instructions_page, landing, pre_questionnaire_page, submit_demographics,
    submit_instructions, submit_pre_questionnaire, thank_you_page,
};
pub use questionnaires::{
    mid_questionnaire_page, post_questionnaire_page, submit_mid_questionnaire, submit_post_questionnaire,
};

use crate::flow::gate::Step;
use crate::flow::RecordContext;
use crate::render::Page;
use crate::session::StudySession;
use crate::AppState;
use axum::response::{Html, IntoResponse, Response};
use nrs_common::study::StudyProfile;

/// Render a page with the configured renderer
pub(crate) fn render(state: &AppState, page: Page<'_>) -> Response {
    Html(state.renderer.render(&page)).into_response()
}

/// Writes go to the session's participant and current round
///
/// The participant middleware guarantees an identifier on every step route.
pub(crate) fn record_context(session: &StudySession) -> RecordContext<'_> {
    RecordContext {
        prolific_id: session.prolific_id.as_deref().unwrap_or_default(),
        condition: session.condition,
        round_number: session.round,
    }
}

/// Where to go once the last article round is done
///
/// Steps the profile leaves out are marked complete so the gate lets the
/// participant through to the end.
pub(crate) fn after_last_round(session: &mut StudySession, profile: &StudyProfile) -> &'static str {
    session.complete(Step::MidQuestionnaire);
    if profile.post_questionnaire {
        Step::PostQuestionnaire.path()
    } else {
        session.complete(Step::PostQuestionnaire);
        Step::ThankYou.path()
    }
}

pub(crate) fn no_articles(state: &AppState) -> Response {
    render(
        state,
        Page::Message {
            title: "Study unavailable",
            message: "No articles are available right now. Please try again later.",
        },
    )
}
