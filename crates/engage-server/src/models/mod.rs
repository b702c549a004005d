//! Data models for the engagement engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

pub type ConferenceId = i32;
pub type EventId = i32;
pub type QuestionId = i32;
pub type UserId = i32;

// ============================================================================
// CONFERENCE (venue)
// ============================================================================

/// Per-venue capabilities. Typed so a misspelled flag fails at load time
/// instead of silently gating nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    Leaderboard,
    AnonymousLogin,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Leaderboard => "leaderboard",
            Feature::AnonymousLogin => "anonymous-login",
        }
    }
}

impl std::str::FromStr for Feature {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leaderboard" => Ok(Feature::Leaderboard),
            "anonymous-login" => Ok(Feature::AnonymousLogin),
            other => Err(EngineError::Validation(format!(
                "unknown feature flag: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conference {
    pub id: ConferenceId,
    pub name: String,
    pub features: Vec<Feature>,
}

impl Conference {
    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }
}

// ============================================================================
// EVENT (track-bound session)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    /// External-facing identifier, unique case-insensitively.
    pub uid: String,
    pub conference_id: ConferenceId,
    pub title: String,
    /// Track the session belongs to ("stage"); at most one live event per
    /// stage at any instant.
    pub stage: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub speaker: Option<String>,
    pub live: bool,
}

/// Bulk-upsert payload for schedule syncs. Deliberately has no `live` field:
/// the live flag only moves through the go-live transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub uid: String,
    pub conference_id: ConferenceId,
    pub title: String,
    pub stage: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub speaker: Option<String>,
}

/// Filters for event listings.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub conference_id: Option<ConferenceId>,
    pub stage: Option<String>,
    pub limit: Option<usize>,
}

// ============================================================================
// QUESTION & VOTE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    /// Time-sortable v7 uid, immutable after creation.
    pub uid: Uuid,
    pub event_id: EventId,
    pub user_id: UserId,
    pub question: String,
    pub created_at: DateTime<Utc>,
    pub selected_at: Option<DateTime<Utc>>,
    pub answered_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Question {
    /// Display precedence: answered wins over selected; selection is only a
    /// transient highlight while the question is still open.
    pub fn is_answered(&self) -> bool {
        self.answered_at.is_some()
    }

    pub fn is_selected(&self) -> bool {
        self.selected_at.is_some() && self.answered_at.is_none()
    }
}

/// The single timestamp a moderation action is allowed to set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionMark {
    Selected,
    Answered,
    Deleted,
}

/// A question annotated with its aggregate vote count and public author info,
/// as returned by listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    #[serde(flatten)]
    pub question: Question,
    pub votes: u64,
    pub author_name: String,
}

/// Result of a vote toggle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VoteReceipt {
    /// Membership state after the toggle.
    pub voted: bool,
    /// Aggregate vote count after the toggle.
    pub votes: u64,
}

// ============================================================================
// REACTION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    /// Caller-supplied identifier (e.g. the emoji slug).
    pub uid: String,
    pub event_id: EventId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// USER & ROLES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub uid: Uuid,
    /// Generated display name; the only user field listings expose.
    pub name: String,
    /// Permanent block flag.
    pub blocked: bool,
    /// Finite ban expiry; banned while in the future.
    pub banned_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_banned(&self, now: DateTime<Utc>) -> bool {
        self.blocked || self.banned_until.is_some_and(|until| until > now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Attendee,
    Speaker,
    Organizer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Attendee => "attendee",
            Role::Speaker => "speaker",
            Role::Organizer => "organizer",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "attendee" => Ok(Role::Attendee),
            "speaker" => Ok(Role::Speaker),
            "organizer" => Ok(Role::Organizer),
            other => Err(EngineError::Validation(format!("unknown role: {other}"))),
        }
    }
}

/// At most one grant per (conference, user); re-grants only ever upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleGrant {
    pub conference_id: ConferenceId,
    pub user_id: UserId,
    pub role: Role,
    pub granted_at: DateTime<Utc>,
}

/// The authenticated identity handed in by the (out-of-scope) identity layer.
/// The engine trusts it; it never verifies credentials itself.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_uid: Uuid,
}

// ============================================================================
// LEADERBOARD
// ============================================================================

/// Raw per-user contribution counts the ranking engine scores from.
#[derive(Debug, Clone)]
pub struct ContributionTally {
    pub user_id: UserId,
    pub user_uid: Uuid,
    pub name: String,
    pub answered_questions: u64,
    pub received_votes: u64,
}

/// Public-safe leaderboard projection: no identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub name: String,
    pub rank: u64,
    pub points: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RankAndPoints {
    pub rank: u64,
    pub points: u64,
}

// ============================================================================
// LISTING OPTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sort {
    Popular,
    Newest,
}

impl std::str::FromStr for Sort {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "popular" => Ok(Sort::Popular),
            "newest" => Ok(Sort::Newest),
            other => Err(EngineError::Validation(format!("invalid sort {other}"))),
        }
    }
}
