//! Repository abstraction
//!
//! All shared mutable state (questions, votes, sessions, roles, bans) is
//! reached through this trait so the atomicity guarantees live in one place.
//! The engine may run as several concurrent processes; nothing here relies on
//! in-process locking for correctness — the backing store's constraints do
//! the work. Per-operation contracts are documented on each method.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::{
    Conference, ConferenceId, ContributionTally, Event, EventFilter, EventId, Feature, NewEvent,
    Question, QuestionId, QuestionMark, QuestionView, Reaction, Role, RoleGrant, User, UserId,
};

#[async_trait]
pub trait Repository: Send + Sync {
    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    async fn create_user(&self, name: &str) -> EngineResult<User>;

    async fn user_by_uid(&self, uid: Uuid) -> EngineResult<Option<User>>;

    async fn get_user(&self, id: UserId) -> EngineResult<Option<User>>;

    /// Write ban state. `until = Some(t)` sets a finite ban expiry;
    /// `until = None` sets the permanent block flag.
    async fn ban_user(&self, id: UserId, until: Option<DateTime<Utc>>) -> EngineResult<()>;

    // ------------------------------------------------------------------
    // Conferences & roles
    // ------------------------------------------------------------------

    async fn create_conference(&self, name: &str, features: &[Feature])
        -> EngineResult<Conference>;

    async fn get_conference(&self, id: ConferenceId) -> EngineResult<Option<Conference>>;

    /// Upsert a role grant. Contract: atomic per (conference, user); when a
    /// grant already exists the stored role only ever moves up the
    /// attendee < speaker < organizer order, never down.
    async fn grant_role(
        &self,
        user_id: UserId,
        conference_id: ConferenceId,
        role: Role,
    ) -> EngineResult<RoleGrant>;

    async fn role_for(
        &self,
        user_id: UserId,
        conference_id: ConferenceId,
    ) -> EngineResult<Option<RoleGrant>>;

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Bulk upsert keyed by uid (case-insensitive). Never touches `live`.
    async fn upsert_events(&self, events: &[NewEvent]) -> EngineResult<Vec<Event>>;

    /// Case-insensitive uid lookup.
    async fn event_by_uid(&self, uid: &str) -> EngineResult<Option<Event>>;

    async fn get_event(&self, id: EventId) -> EngineResult<Option<Event>>;

    async fn list_events(&self, filter: &EventFilter) -> EngineResult<Vec<Event>>;

    /// The go-live flip. Contract: one transaction sets the target live and
    /// clears `live` on every other event sharing its stage; no observer ever
    /// sees two live events (or none, if one was live before) on that stage
    /// outside the transaction boundary. Returns the updated target.
    async fn set_event_live(&self, id: EventId) -> EngineResult<Event>;

    async fn live_event_for_conference(
        &self,
        conference_id: ConferenceId,
    ) -> EngineResult<Option<Event>>;

    /// Most recently started explicitly-live event for the stage, if any.
    async fn live_event_for_stage(&self, stage: &str) -> EngineResult<Option<Event>>;

    /// Soonest event on the stage starting at or after `after`.
    async fn next_event_for_stage(
        &self,
        stage: &str,
        after: DateTime<Utc>,
    ) -> EngineResult<Option<Event>>;

    /// Distinct count of the union of question authors and voters for the
    /// event. An engagement metric, not a row count.
    async fn count_participants(&self, event_id: EventId) -> EngineResult<u64>;

    // ------------------------------------------------------------------
    // Questions
    // ------------------------------------------------------------------

    async fn create_question(
        &self,
        event_id: EventId,
        user_id: UserId,
        text: &str,
    ) -> EngineResult<Question>;

    async fn question_by_uid(&self, uid: Uuid) -> EngineResult<Option<Question>>;

    /// Non-deleted questions for the event with aggregate vote counts and
    /// author names. Ban state is enforced here at read time: questions by
    /// currently-banned authors are omitted and their votes are not counted.
    /// `answered` narrows to answered (`Some(true)`) or open (`Some(false)`)
    /// questions; `None` returns both. Unordered; the ranking engine sorts.
    async fn questions_with_votes(
        &self,
        event_id: EventId,
        answered: Option<bool>,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<QuestionView>>;

    /// Set exactly the one timestamp named by `mark` to `now`; no other field
    /// is touched. Answered and selected may coexist in storage.
    async fn mark_question(&self, id: QuestionId, mark: QuestionMark) -> EngineResult<Question>;

    /// Questions this user created after `since` (any event).
    async fn question_count_since(&self, user_id: UserId, since: DateTime<Utc>)
        -> EngineResult<u64>;

    /// Questions this user has ever created for the event, deleted included.
    async fn question_count_for_event(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> EngineResult<u64>;

    // ------------------------------------------------------------------
    // Votes
    // ------------------------------------------------------------------

    /// Flip vote membership for (question, user) and append one toggle to the
    /// vote activity log. Contract: atomic under concurrent identical calls —
    /// the storage-level primary key on (question_id, user_id) guarantees two
    /// simultaneous toggles from the same user never both land as an insert.
    /// Returns the resulting membership state.
    async fn toggle_vote(
        &self,
        question_id: QuestionId,
        user_id: UserId,
        event_id: EventId,
    ) -> EngineResult<bool>;

    async fn vote_count(&self, question_id: QuestionId) -> EngineResult<u64>;

    /// Toggle operations (both directions) by the user for the event after
    /// `since`. Counts the activity log, not surviving memberships.
    async fn vote_toggle_count_since(
        &self,
        user_id: UserId,
        event_id: EventId,
        since: DateTime<Utc>,
    ) -> EngineResult<u64>;

    // ------------------------------------------------------------------
    // Reactions
    // ------------------------------------------------------------------

    async fn create_reaction(
        &self,
        uid: &str,
        event_id: EventId,
        user_id: UserId,
    ) -> EngineResult<Reaction>;

    async fn reaction_count_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> EngineResult<u64>;

    // ------------------------------------------------------------------
    // Leaderboard
    // ------------------------------------------------------------------

    /// Per-user answered-question and received-vote counts across all events.
    /// Soft-deleted questions are excluded from both tallies.
    async fn contribution_tallies(&self) -> EngineResult<Vec<ContributionTally>>;
}
