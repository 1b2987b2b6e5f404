//! Linear wizard steps: landing, demographics, pre-questionnaire,
//! instructions, thank-you

use crate::api::{record_context, render};
use crate::flow::gate::{self, Step};
use crate::flow::{persist, SectionData, Selector};
use crate::forms::{self, DemographicsForm, FormFields, UNDERAGE_MESSAGE};
use crate::render::Page;
use crate::session::Session;
use crate::AppState;
use axum::extract::{Form, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Extension;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

/// GET /
pub async fn landing(State(state): State<AppState>, Extension(session): Extension<Session>) -> Response {
    render(
        &state,
        Page::Landing {
            participant_known: session.prolific_id.is_some(),
        },
    )
}

/// GET /demographics
pub async fn demographics_page(State(state): State<AppState>) -> Response {
    render(&state, Page::Demographics { error: None })
}

/// POST /demographics
///
/// Underage participants are shown the ineligibility message and nothing
/// is stored.
pub async fn submit_demographics(
    State(state): State<AppState>,
    Extension(mut session): Extension<Session>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Response {
    let form = FormFields::from(pairs);
    let demographics = match forms::parse_demographics(&form) {
        DemographicsForm::Eligible(d) => d,
        DemographicsForm::Underage => {
            info!(
                "Participant {} screened out by age",
                session.prolific_id.as_deref().unwrap_or_default()
            );
            return render(
                &state,
                Page::ThankYou {
                    condition: session.condition,
                    message: Some(UNDERAGE_MESSAGE),
                },
            );
        }
    };

    persist(&state.db, &record_context(&session), &SectionData::Demographics(demographics)).await;
    session.complete(Step::Demographics);
    session.save().await;

    Redirect::to(Step::PreQuestionnaire.path()).into_response()
}

/// GET /pre-questionnaire
pub async fn pre_questionnaire_page(State(state): State<AppState>, Extension(session): Extension<Session>) -> Response {
    if let Some(redirect) = gate::guard(Step::PreQuestionnaire, &session, &state.profile) {
        return redirect.into_response();
    }
    render(
        &state,
        Page::PreQuestionnaire {
            list_a: state.profile.topic_map_a.keys().map(String::as_str).collect(),
            list_b: state.profile.topic_map_b.keys().map(String::as_str).collect(),
            error: None,
        },
    )
}

/// POST /pre-questionnaire
///
/// Stores the answers, keeps them in the session for topic resolution, and
/// picks the first main article from the round-1 favourite topic.
pub async fn submit_pre_questionnaire(
    State(state): State<AppState>,
    Extension(mut session): Extension<Session>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Response {
    if let Some(redirect) = gate::guard(Step::PreQuestionnaire, &session, &state.profile) {
        return redirect.into_response();
    }

    let pre = forms::parse_pre_questionnaire(&FormFields::from(pairs));
    persist(&state.db, &record_context(&session), &SectionData::PreQuestionnaire(pre.clone())).await;
    session.pre_questionnaire = Some(pre);
    session.complete(Step::PreQuestionnaire);

    if session.first_article_id.is_none() {
        let mut rng = StdRng::from_entropy();
        let topics = session.topics_for(&mut rng, &state.profile, 1);
        let first = Selector::new(&state.articles).first_main(&mut rng, &topics, session.seen());
        match first {
            Some(id) => {
                session.mark_seen(id);
                session.first_article_id = Some(id);
            }
            None => warn!("Article table is empty; no first article for this participant"),
        }
    }
    session.save().await;

    Redirect::to(Step::Instructions.path()).into_response()
}

/// GET /instructions
pub async fn instructions_page(State(state): State<AppState>, Extension(session): Extension<Session>) -> Response {
    if let Some(redirect) = gate::guard(Step::Instructions, &session, &state.profile) {
        return redirect.into_response();
    }
    render(
        &state,
        Page::Instructions {
            total_rounds: state.profile.total_rounds,
        },
    )
}

/// POST /instructions
pub async fn submit_instructions(State(state): State<AppState>, Extension(mut session): Extension<Session>) -> Response {
    if let Some(redirect) = gate::guard(Step::Instructions, &session, &state.profile) {
        return redirect.into_response();
    }
    session.complete(Step::Instructions);
    session.save().await;

    Redirect::to(&gate::entry_path(Step::Article, &session)).into_response()
}

/// GET /thank-you
pub async fn thank_you_page(State(state): State<AppState>, Extension(session): Extension<Session>) -> Response {
    if let Some(redirect) = gate::guard(Step::ThankYou, &session, &state.profile) {
        return redirect.into_response();
    }
    info!(
        "Participant {} reached the end of the study",
        session.prolific_id.as_deref().unwrap_or_default()
    );
    render(
        &state,
        Page::ThankYou {
            condition: session.condition,
            message: None,
        },
    )
}
