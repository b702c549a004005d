//! HTTP API
//!
//! Thin handlers: extract, authenticate, call the engine, serialize. All
//! policy lives in the engine; `EngineError` carries its own status mapping.

pub mod auth;
pub mod events;
pub mod leaderboard;
pub mod questions;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::error::{EngineError, EngineResult};
use crate::models::Principal;
use crate::state::AppState;
use crate::websocket;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/login", post(auth::login))
        .route("/api/v1/users/me", get(auth::me))
        .route("/api/v1/conferences", post(events::create_conference))
        .route(
            "/api/v1/conferences/:id/roles",
            post(events::grant_role),
        )
        .route(
            "/api/v1/conferences/:id/users/:uid/block",
            post(auth::block_user),
        )
        .route(
            "/api/v1/conferences/:id/live",
            get(events::conference_live),
        )
        .route(
            "/api/v1/conferences/:id/leaderboard",
            get(leaderboard::top),
        )
        .route(
            "/api/v1/conferences/:id/leaderboard/me",
            get(leaderboard::my_rank),
        )
        .route("/api/v1/events", get(events::list).put(events::upsert))
        .route("/api/v1/events/:uid", get(events::get_one))
        .route(
            "/api/v1/events/:uid/questions",
            get(questions::list).post(questions::create),
        )
        .route("/api/v1/events/:uid/react", post(events::react))
        .route("/api/v1/events/:uid/live", put(events::go_live))
        .route(
            "/api/v1/events/:uid/participants",
            get(events::participants),
        )
        .route("/api/v1/stages/:stage/live", get(events::stage_live))
        .route("/api/v1/questions/:uid/upvote", post(questions::upvote))
        .route("/api/v1/questions/:uid/select", post(questions::select))
        .route(
            "/api/v1/questions/:uid/mark-as-answered",
            post(questions::mark_answered),
        )
        .route("/api/v1/questions/:uid", delete(questions::remove))
        .route("/ws", get(websocket::ws_handler))
        .with_state(state)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Resolve the caller's session or refuse with 401.
pub fn require_principal(state: &AppState, headers: &HeaderMap) -> EngineResult<Principal> {
    let token = bearer_token(headers)
        .ok_or_else(|| EngineError::Unauthenticated("missing bearer token".to_string()))?;
    state
        .principal_for(token)
        .ok_or_else(|| EngineError::Unauthenticated("invalid or expired token".to_string()))
}

/// Check the shared sync credential carried in `x-api-key`.
pub fn require_sync_key(state: &AppState, headers: &HeaderMap) -> EngineResult<()> {
    let provided = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| EngineError::Unauthenticated("missing api key".to_string()))?;
    if !state.is_sync_key(provided) {
        return Err(EngineError::Unauthenticated("invalid api key".to_string()));
    }
    Ok(())
}
