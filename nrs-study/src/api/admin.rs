//! Administrative and diagnostic routes (JSON)
//!
//! Guarded by the optional admin token: header `x-admin-token` or query
//! parameter `token`. Without a configured token the routes are open.

use crate::error::{ApiError, ApiResult};
use crate::session::Session;
use crate::AppState;
use axum::extract::{Path, Query, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum::{Extension, Json};
use nrs_common::articles::ArticleId;
use nrs_common::db::{participants, rounds, SchemaIntrospector};
use nrs_common::study::Condition;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{info, warn};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Articles included in the corpus summary
const SAMPLE_SIZE: usize = 5;

/// Admin token middleware
pub async fn admin_auth(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, ApiError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let from_header = request
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let from_query = Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(params)| params.get("token").cloned());

    if from_header.as_deref() == Some(expected) || from_query.as_deref() == Some(expected) {
        Ok(next.run(request).await)
    } else {
        warn!("Rejected admin request to {}", request.uri().path());
        Err(ApiError::Unauthorized("Admin token missing or invalid".to_string()))
    }
}

/// POST /admin/reset
///
/// Deletes every round and participant.
pub async fn reset_data(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let (participants_deleted, rounds_deleted) = participants::delete_all(&state.db).await?;
    state.assigner.clear_pending().await;
    info!(
        "Study data reset: {} participant(s), {} round(s) deleted",
        participants_deleted, rounds_deleted
    );
    Ok(Json(json!({
        "status": "ok",
        "participants_deleted": participants_deleted,
        "rounds_deleted": rounds_deleted,
    })))
}

/// GET /admin/articles
pub async fn article_summary(State(state): State<AppState>) -> Json<Value> {
    let articles = &state.articles;
    let topics: Vec<Value> = articles
        .topic_counts()
        .into_iter()
        .map(|(topic, count)| json!({ "topic": topic, "count": count }))
        .collect();
    let sample: Vec<_> = articles.all().iter().take(SAMPLE_SIZE).collect();

    Json(json!({
        "count": articles.len(),
        "columns": articles.columns(),
        "topic_column": articles.topic_column(),
        "has_stable_ids": articles.has_stable_ids(),
        "topics": topics,
        "sample": sample,
    }))
}

/// GET /admin/articles/:id
pub async fn article_detail(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    let article = state
        .articles
        .get(ArticleId(id))
        .ok_or_else(|| ApiError::NotFound(format!("Article {}", id)))?;
    Ok(Json(json!(article)))
}

#[derive(Debug, Deserialize)]
pub struct ParticipantQuery {
    pub pid: Option<String>,
}

async fn participant_id(state: &AppState, pid: &str) -> ApiResult<i64> {
    participants::find_by_prolific_id(&state.db, pid)
        .await?
        .map(|row| row.id)
        .ok_or_else(|| ApiError::NotFound(format!("Participant {}", pid)))
}

/// GET /admin/rounds?pid=
///
/// One participant with their rounds, or everything when `pid` is absent.
pub async fn round_data(State(state): State<AppState>, Query(query): Query<ParticipantQuery>) -> ApiResult<Json<Value>> {
    match query.pid.as_deref().filter(|p| !p.is_empty()) {
        Some(pid) => {
            let participant = participants::find_by_prolific_id(&state.db, pid)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("Participant {}", pid)))?;
            let rounds = rounds::list_for_participant(&state.db, participant.id).await?;
            Ok(Json(json!({
                "participant": participant.to_json(),
                "rounds": rounds.iter().map(|r| r.to_json()).collect::<Vec<_>>(),
            })))
        }
        None => {
            let participants = participants::list(&state.db).await?;
            let rounds = rounds::list(&state.db).await?;
            Ok(Json(json!({
                "participants": participants.iter().map(|p| p.to_json()).collect::<Vec<_>>(),
                "rounds": rounds.iter().map(|r| r.to_json()).collect::<Vec<_>>(),
            })))
        }
    }
}

/// POST /admin/backfill-flat?pid=
pub async fn backfill_flat(State(state): State<AppState>, Query(query): Query<ParticipantQuery>) -> ApiResult<Json<Value>> {
    let scope = match query.pid.as_deref().filter(|p| !p.is_empty()) {
        Some(pid) => Some(participant_id(&state, pid).await?),
        None => None,
    };
    let updated = rounds::backfill_flat(&state.db, scope).await?;
    info!("Backfilled flat rating columns for {} round(s)", updated);
    Ok(Json(json!({ "status": "ok", "updated": updated })))
}

/// GET /admin/tables
pub async fn list_tables(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let tables = SchemaIntrospector::list_tables(&state.db).await?;
    Ok(Json(json!({ "tables": tables })))
}

/// GET /admin/set-condition/:condition
///
/// Overrides the condition of the caller's session (and stored record, if
/// any) for piloting the label variants.
pub async fn set_condition(
    State(state): State<AppState>,
    Extension(mut session): Extension<Session>,
    Path(raw): Path<String>,
) -> ApiResult<Json<Value>> {
    let condition: Condition = raw
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Unknown condition '{}'", raw)))?;

    session.condition = Some(condition);
    session.save().await;

    let stored = match session.prolific_id.as_deref() {
        Some(pid) => {
            state.assigner.override_pending(pid, condition).await;
            participants::set_condition(&state.db, pid, condition).await?
        }
        None => false,
    };
    info!(
        "Session condition set to {} for participant {}",
        condition,
        session.prolific_id.as_deref().unwrap_or("-")
    );

    Ok(Json(json!({
        "condition": condition.as_str(),
        "prolific_id": session.prolific_id,
        "stored": stored,
    })))
}
