//! Leaderboard handlers

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::error::EngineResult;
use crate::models::{ConferenceId, LeaderboardEntry, RankAndPoints};
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct TopQuery {
    pub limit: Option<usize>,
}

pub async fn top(
    State(state): State<Arc<AppState>>,
    Path(conference_id): Path<ConferenceId>,
    Query(query): Query<TopQuery>,
) -> EngineResult<Json<Vec<LeaderboardEntry>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let entries = state.engine.leaderboard(conference_id, limit).await?;
    Ok(Json(entries))
}

pub async fn my_rank(
    State(state): State<Arc<AppState>>,
    Path(conference_id): Path<ConferenceId>,
    headers: HeaderMap,
) -> EngineResult<Json<RankAndPoints>> {
    let principal = super::require_principal(&state, &headers)?;
    let rank = state
        .engine
        .contribution_rank(conference_id, &principal)
        .await?;
    Ok(Json(rank))
}
