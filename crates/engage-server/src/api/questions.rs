//! Question and vote handlers

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::{Question, QuestionView, Sort, VoteReceipt};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub sort: Option<String>,
    /// `true` for answered questions only, `false` for open only.
    pub answered: Option<bool>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(event_uid): Path<String>,
    Query(query): Query<ListQuery>,
) -> EngineResult<Json<Vec<QuestionView>>> {
    let sort = match query.sort.as_deref() {
        Some(raw) => raw.parse()?,
        None => Sort::Popular,
    };
    let questions = state
        .engine
        .list_questions(&event_uid, sort, query.answered)
        .await?;
    Ok(Json(questions))
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub question: String,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Path(event_uid): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateRequest>,
) -> EngineResult<Json<QuestionView>> {
    let principal = super::require_principal(&state, &headers)?;
    let view = state
        .engine
        .submit_question(&principal, &event_uid, &req.question)
        .await?;
    Ok(Json(view))
}

/// One endpoint for both directions; the receipt says whether the vote now
/// stands.
pub async fn upvote(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<Uuid>,
    headers: HeaderMap,
) -> EngineResult<Json<VoteReceipt>> {
    let principal = super::require_principal(&state, &headers)?;
    let receipt = state.engine.toggle_vote(&principal, uid).await?;
    Ok(Json(receipt))
}

pub async fn select(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<Uuid>,
    headers: HeaderMap,
) -> EngineResult<Json<Question>> {
    let principal = super::require_principal(&state, &headers)?;
    let question = state.engine.select_question(&principal, uid).await?;
    Ok(Json(question))
}

pub async fn mark_answered(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<Uuid>,
    headers: HeaderMap,
) -> EngineResult<Json<Question>> {
    let principal = super::require_principal(&state, &headers)?;
    let question = state.engine.mark_answered(&principal, uid).await?;
    Ok(Json(question))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<Uuid>,
    headers: HeaderMap,
) -> EngineResult<Json<Question>> {
    let principal = super::require_principal(&state, &headers)?;
    let question = state.engine.remove_question(&principal, uid).await?;
    Ok(Json(question))
}
