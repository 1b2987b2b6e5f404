//! nrs-study library - news recommendation study service
//!
//! Participants move through a fixed sequence of steps (demographics,
//! pre-questionnaire, instructions, N article rounds, optional mid- and
//! post-questionnaires, thank-you). Each article round shows one main
//! article with two recommendations drawn from the participant's favourite
//! and least-favourite topics; the ratings are stored per round.

use axum::Router;
use nrs_common::articles::ArticleTable;
use nrs_common::config::TomlConfig;
use nrs_common::study::StudyProfile;
use sqlx::SqlitePool;
use std::sync::Arc;

pub mod api;
pub mod error;
pub mod flow;
pub mod forms;
pub mod render;
pub mod session;

pub use error::{ApiError, ApiResult};

use flow::ConditionAssigner;
use render::{HtmlRenderer, Renderer};
use session::SessionStore;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Participant and round store
    pub db: SqlitePool,
    /// Article corpus, read-only after startup
    pub articles: Arc<ArticleTable>,
    pub profile: Arc<StudyProfile>,
    pub sessions: SessionStore,
    pub assigner: Arc<ConditionAssigner>,
    pub renderer: Arc<dyn Renderer>,
    /// `None` leaves the admin routes open
    pub admin_token: Option<String>,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, articles: ArticleTable, profile: StudyProfile, config: &TomlConfig) -> Self {
        let assigner = ConditionAssigner::new(profile.assignment);
        Self {
            db,
            articles: Arc::new(articles),
            profile: Arc::new(profile),
            sessions: SessionStore::new(&config.session),
            assigner: Arc::new(assigner),
            renderer: Arc::new(HtmlRenderer),
            admin_token: config.admin.token.clone().filter(|t| !t.is_empty()),
        }
    }

    /// Replace the page renderer
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }
}

/// Build application router
///
/// Participant steps run behind the session middleware; admin routes
/// behind the admin token check; `/health` is public.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let participant = Router::new()
        .route("/", get(api::landing))
        .route("/demographics", get(api::demographics_page).post(api::submit_demographics))
        .route(
            "/pre-questionnaire",
            get(api::pre_questionnaire_page).post(api::submit_pre_questionnaire),
        )
        .route("/instructions", get(api::instructions_page).post(api::submit_instructions))
        .route("/article", get(api::article_entry))
        .route("/article/:id", get(api::article_page).post(api::submit_article))
        .route(
            "/mid-questionnaire",
            get(api::mid_questionnaire_page).post(api::submit_mid_questionnaire),
        )
        .route(
            "/post-questionnaire",
            get(api::post_questionnaire_page).post(api::submit_post_questionnaire),
        )
        .route("/thank-you", get(api::thank_you_page))
        .layer(middleware::from_fn_with_state(state.clone(), session::identify_participant));

    // Acts on the caller's session
    let set_condition = Router::new()
        .route("/admin/set-condition/:condition", get(api::set_condition))
        .layer(middleware::from_fn_with_state(state.clone(), session::identify_participant));

    let admin = Router::new()
        .route("/admin/reset", post(api::reset_data))
        .route("/admin/articles", get(api::article_summary))
        .route("/admin/articles/:id", get(api::article_detail))
        .route("/admin/rounds", get(api::round_data))
        .route("/admin/backfill-flat", post(api::backfill_flat))
        .route("/admin/tables", get(api::list_tables))
        .merge(set_condition)
        .layer(middleware::from_fn_with_state(state.clone(), api::admin_auth));

    Router::new()
        .merge(participant)
        .merge(admin)
        .merge(api::health_routes())
        .with_state(state)
}
