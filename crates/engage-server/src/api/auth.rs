//! Login and account handlers

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::{ConferenceId, User};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Venue the caller is joining.
    pub conference_id: ConferenceId,
    /// Optional display name; omitted means anonymous login with a
    /// generated name, where the venue allows it.
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: i64,
    pub user: User,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> EngineResult<Json<LoginResponse>> {
    let user = state
        .engine
        .register_user(req.conference_id, req.name.as_deref())
        .await?;
    let (token, expires_at) = state.issue_session(user.uid);
    info!(user_id = user.id, "session issued");
    Ok(Json(LoginResponse {
        token,
        expires_at,
        user,
    }))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> EngineResult<Json<User>> {
    let principal = super::require_principal(&state, &headers)?;
    let user = state.engine.current_user(&principal).await?;
    Ok(Json(user))
}

pub async fn block_user(
    State(state): State<Arc<AppState>>,
    Path((conference_id, target_uid)): Path<(ConferenceId, Uuid)>,
    headers: HeaderMap,
) -> EngineResult<Json<serde_json::Value>> {
    let principal = super::require_principal(&state, &headers)?;
    state
        .engine
        .block_user(&principal, conference_id, target_uid)
        .await?;
    Ok(Json(serde_json::json!({ "blocked": true })))
}
