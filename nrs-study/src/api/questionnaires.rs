//! Mid-questionnaire (after each round) and post-questionnaire (after the
//! last round), when the study profile enables them

use crate::api::{after_last_round, record_context, render};
use crate::flow::gate::{self, Step};
use crate::flow::{persist, RoundUpdate, SectionData};
use crate::forms::{self, FormFields};
use crate::render::Page;
use crate::session::Session;
use crate::AppState;
use axum::extract::{Form, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Extension;
use nrs_common::study::Condition;
use tracing::debug;

fn mid_page<'a>(state: &'a AppState, session: &Session, error: Option<&'a str>) -> Page<'a> {
    let upcoming = if session.round < state.profile.total_rounds {
        session.next_article.and_then(|id| state.articles.get(id))
    } else {
        None
    };
    Page::MidQuestionnaire {
        article: upcoming,
        condition: session.condition,
        error,
    }
}

/// GET /mid-questionnaire
pub async fn mid_questionnaire_page(State(state): State<AppState>, Extension(session): Extension<Session>) -> Response {
    if let Some(redirect) = gate::guard(Step::MidQuestionnaire, &session, &state.profile) {
        return redirect.into_response();
    }
    render(&state, mid_page(&state, &session, None))
}

/// POST /mid-questionnaire
///
/// Invalid answers re-render the step with the message; nothing is stored.
pub async fn submit_mid_questionnaire(
    State(state): State<AppState>,
    Extension(mut session): Extension<Session>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Response {
    if let Some(redirect) = gate::guard(Step::MidQuestionnaire, &session, &state.profile) {
        return redirect.into_response();
    }

    let mid = match forms::parse_mid_questionnaire(&FormFields::from(pairs)) {
        Ok(mid) => mid,
        Err(e) => {
            debug!("Mid-questionnaire rejected: {}", e);
            let message = e.to_string();
            return render(&state, mid_page(&state, &session, Some(&message)));
        }
    };

    let update = RoundUpdate {
        mid_questionnaire: Some(mid),
        ..Default::default()
    };
    persist(&state.db, &record_context(&session), &SectionData::Round(update)).await;

    let round = session.round;
    session.mid_rounds_completed = session.mid_rounds_completed.max(round);
    session.complete(Step::MidQuestionnaire);

    let next_path = if round < state.profile.total_rounds {
        session.advance_round();
        gate::article_entry(&session)
    } else {
        after_last_round(&mut session, &state.profile).to_string()
    };
    session.save().await;

    Redirect::to(&next_path).into_response()
}

/// GET /post-questionnaire
pub async fn post_questionnaire_page(State(state): State<AppState>, Extension(session): Extension<Session>) -> Response {
    if let Some(redirect) = gate::guard(Step::PostQuestionnaire, &session, &state.profile) {
        return redirect.into_response();
    }
    render(
        &state,
        Page::PostQuestionnaire {
            condition: session.condition,
            error: None,
        },
    )
}

/// POST /post-questionnaire
pub async fn submit_post_questionnaire(
    State(state): State<AppState>,
    Extension(mut session): Extension<Session>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Response {
    if let Some(redirect) = gate::guard(Step::PostQuestionnaire, &session, &state.profile) {
        return redirect.into_response();
    }

    let condition = session.condition.unwrap_or(Condition::Nolabel);
    let post = match forms::parse_post_questionnaire(&FormFields::from(pairs), condition, session.last_article_had_label)
    {
        Ok(post) => post,
        Err(e) => {
            debug!("Post-questionnaire rejected: {}", e);
            let message = e.to_string();
            return render(
                &state,
                Page::PostQuestionnaire {
                    condition: session.condition,
                    error: Some(&message),
                },
            );
        }
    };

    persist(&state.db, &record_context(&session), &SectionData::PostQuestionnaire(post)).await;
    session.complete(Step::PostQuestionnaire);
    session.save().await;

    Redirect::to(Step::ThankYou.path()).into_response()
}
