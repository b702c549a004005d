//! Event, reaction and venue handlers

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::{
    Conference, ConferenceId, Event, EventFilter, Feature, NewEvent, Reaction, Role, RoleGrant,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub conference_id: Option<ConferenceId>,
    pub stage: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> EngineResult<Json<Vec<Event>>> {
    let filter = EventFilter {
        conference_id: query.conference_id,
        stage: query.stage,
        limit: query.limit,
    };
    let events = state.engine.list_events(&filter).await?;
    Ok(Json(events))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> EngineResult<Json<Event>> {
    let event = state.engine.event_by_uid(&uid).await?;
    Ok(Json(event))
}

/// Bulk schedule sync, gated by the sync credential.
pub async fn upsert(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(events): Json<Vec<NewEvent>>,
) -> EngineResult<Json<Vec<Event>>> {
    super::require_sync_key(&state, &headers)?;
    let upserted = state.engine.upsert_events(&events).await?;
    Ok(Json(upserted))
}

#[derive(Debug, Deserialize)]
pub struct CreateConferenceRequest {
    pub name: String,
    #[serde(default)]
    pub features: Vec<Feature>,
}

pub async fn create_conference(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateConferenceRequest>,
) -> EngineResult<Json<Conference>> {
    super::require_sync_key(&state, &headers)?;
    let conference = state
        .engine
        .create_conference(&req.name, &req.features)
        .await?;
    Ok(Json(conference))
}

#[derive(Debug, Deserialize)]
pub struct GrantRoleRequest {
    pub user_uid: Uuid,
    pub role: Role,
}

/// Role grants come in two flavors: an organizer's session, or the sync
/// credential for bootstrapping the first organizer of a venue.
pub async fn grant_role(
    State(state): State<Arc<AppState>>,
    Path(conference_id): Path<ConferenceId>,
    headers: HeaderMap,
    Json(req): Json<GrantRoleRequest>,
) -> EngineResult<Json<RoleGrant>> {
    if super::require_sync_key(&state, &headers).is_ok() {
        let grant = state
            .engine
            .admin_grant_role(conference_id, req.user_uid, req.role)
            .await?;
        return Ok(Json(grant));
    }
    let principal = super::require_principal(&state, &headers)?;
    let grant = state
        .engine
        .grant_role(&principal, conference_id, req.user_uid, req.role)
        .await?;
    Ok(Json(grant))
}

#[derive(Debug, Deserialize)]
pub struct ReactRequest {
    pub reaction: String,
}

pub async fn react(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ReactRequest>,
) -> EngineResult<Json<Reaction>> {
    let principal = super::require_principal(&state, &headers)?;
    let reaction = state.engine.react(&principal, &uid, &req.reaction).await?;
    Ok(Json(reaction))
}

pub async fn go_live(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
    headers: HeaderMap,
) -> EngineResult<Json<Event>> {
    let principal = super::require_principal(&state, &headers)?;
    let event = state.engine.go_live(&principal, &uid).await?;
    Ok(Json(event))
}

#[derive(Debug, Serialize)]
pub struct ParticipantCount {
    pub participants: u64,
}

pub async fn participants(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> EngineResult<Json<ParticipantCount>> {
    let participants = state.engine.count_participants(&uid).await?;
    Ok(Json(ParticipantCount { participants }))
}

/// What the stage is showing now: live event, or next scheduled. `null`
/// when the stage has neither.
pub async fn stage_live(
    State(state): State<Arc<AppState>>,
    Path(stage): Path<String>,
) -> EngineResult<Json<Option<Event>>> {
    let event = state.engine.current_event_for_stage(&stage).await?;
    Ok(Json(event))
}

pub async fn conference_live(
    State(state): State<Arc<AppState>>,
    Path(conference_id): Path<ConferenceId>,
) -> EngineResult<Json<Option<Event>>> {
    let event = state.engine.live_event_for_conference(conference_id).await?;
    Ok(Json(event))
}
