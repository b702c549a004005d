//! Engine error kinds
//!
//! Every engine operation returns a typed kind so the transport layer can map
//! it to a wire status without string-matching. `RateLimited` is deliberately
//! distinct from `Forbidden`: clients show a cooldown for the former and a
//! hard denial for the latter.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Why a privileged or submitting principal was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenReason {
    /// The user is banned or blocked.
    Banned,
    /// The user lacks the organizer role for the venue.
    Role,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("forbidden: {reason:?}")]
    Forbidden { reason: ForbiddenReason },

    #[error("rate limited: {reason}")]
    RateLimited { reason: String },

    #[error("validation: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn banned() -> Self {
        EngineError::Forbidden {
            reason: ForbiddenReason::Banned,
        }
    }

    pub fn not_organizer() -> Self {
        EngineError::Forbidden {
            reason: ForbiddenReason::Role,
        }
    }

    pub fn rate_limited(reason: impl Into<String>) -> Self {
        EngineError::RateLimited {
            reason: reason.into(),
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        EngineError::Storage(err.to_string())
    }
}

impl From<tokio_postgres::Error> for EngineError {
    fn from(err: tokio_postgres::Error) -> Self {
        EngineError::storage(err)
    }
}

impl From<deadpool_postgres::PoolError> for EngineError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        EngineError::storage(err)
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            EngineError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            EngineError::Forbidden { reason } => (
                StatusCode::FORBIDDEN,
                match reason {
                    ForbiddenReason::Banned => "banned",
                    ForbiddenReason::Role => "insufficient_role",
                },
            ),
            EngineError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            EngineError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            EngineError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            EngineError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
        };

        let message = match &self {
            // Do not leak storage internals to clients
            EngineError::Storage(_) => "internal error".to_string(),
            other => other.to_string(),
        };

        (status, Json(json!({ "error": kind, "message": message }))).into_response()
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
