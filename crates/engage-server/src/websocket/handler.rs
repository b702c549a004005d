//! WebSocket connection handler
//!
//! Read-only: clients subscribe to topics and receive change notifications;
//! nothing a client sends mutates state. A connection that falls behind the
//! broadcast buffer skips the missed notifications and keeps going, matching
//! the best-effort delivery contract.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{ConferenceId, EventId};
use crate::notify::{Notification, Topic};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Subscribe to one event's feed.
    pub event: Option<EventId>,
    /// Subscribe to a whole conference.
    pub conference: Option<ConferenceId>,
    /// Subscribe to a stage's live-state feed.
    pub stage: Option<String>,
}

impl WsQuery {
    /// No filter means the firehose; otherwise a notification passes if any
    /// requested topic matches.
    fn matches(&self, notification: &Notification) -> bool {
        if self.event.is_none() && self.conference.is_none() && self.stage.is_none() {
            return true;
        }
        match &notification.topic {
            Topic::Event { event_id } => self.event == Some(*event_id),
            Topic::Conference { conference_id } => self.conference == Some(*conference_id),
            Topic::Stage { stage } => self.stage.as_deref() == Some(stage.as_str()),
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> Response {
    let conn_id = Uuid::new_v4();
    ws.on_upgrade(move |socket| handle_socket(socket, state, conn_id, query))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, conn_id: Uuid, query: WsQuery) {
    let (mut sender, mut receiver) = socket.split();
    let mut notifications = state.notifier.subscribe();

    info!(%conn_id, ?query, "websocket connected");

    let send_task = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => {
                    if !query.matches(&notification) {
                        continue;
                    }
                    let msg = match serde_json::to_string(&notification) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(%conn_id, "failed to serialize notification: {e}");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(msg)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(%conn_id, missed = n, "websocket lagged, notifications dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    debug!(%conn_id, "keepalive");
                }
                Ok(Message::Close(_)) => {
                    info!(%conn_id, "websocket closed by client");
                    break;
                }
                Ok(Message::Text(_)) | Ok(Message::Binary(_)) => {
                    // Inbound payloads are ignored; the feed is one-way
                    debug!(%conn_id, "ignoring client payload");
                }
                Err(e) => {
                    debug!(%conn_id, "websocket error: {e}");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!(%conn_id, "websocket disconnected");
}
