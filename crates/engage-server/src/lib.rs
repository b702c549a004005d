//! Engage Server - Audience Engagement & Moderation Engine
//!
//! Real-time Q&A for live venues: attendees submit questions, vote them up,
//! and react; organizers curate and put sessions live.
//!
//! Architecture:
//! - Engine: every state change flows through one path
//!   (authenticate, authorize, admit, mutate, notify)
//! - Repository: storage seam; PostgreSQL in production, in-memory for
//!   development and tests
//! - Admission control: per-user rate limits enforced against the shared
//!   store, so they hold across server processes
//! - Notifier: best-effort broadcast of change notifications to WebSocket
//!   subscribers
//!
//! Key invariants:
//! - Vote toggling is idempotent in pairs: the same user voting twice is a
//!   no-op overall, never a double count
//! - At most one live event per stage; the flip is atomic
//! - A denied request (ban, rate limit, validation) writes nothing

pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod repo;
pub mod state;
pub mod username;
pub mod websocket;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use notify::Notifier;
pub use state::AppState;
