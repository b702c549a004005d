//! In-memory repository
//!
//! Backs the server when no database is configured and drives the integration
//! tests. A single `RwLock` over all tables gives this backend stronger
//! atomicity than the trait demands, so the contract holds trivially.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    Conference, ConferenceId, ContributionTally, Event, EventFilter, EventId, Feature, NewEvent,
    Question, QuestionId, QuestionMark, QuestionView, Reaction, Role, RoleGrant, User, UserId,
};
use crate::repo::Repository;

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    conferences: HashMap<ConferenceId, Conference>,
    roles: HashMap<(ConferenceId, UserId), RoleGrant>,
    events: HashMap<EventId, Event>,
    questions: HashMap<QuestionId, Question>,
    /// Vote membership, keyed like the storage pk.
    votes: HashSet<(QuestionId, UserId)>,
    /// One row per toggle operation, both directions.
    vote_activity: Vec<(UserId, EventId, DateTime<Utc>)>,
    reactions: Vec<Reaction>,
    next_user_id: UserId,
    next_conference_id: ConferenceId,
    next_event_id: EventId,
    next_question_id: QuestionId,
}

#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift every recorded activity timestamp backwards by `delta`, as if
    /// that much time had passed. Lets tests cross rate-limit windows without
    /// sleeping.
    pub fn rewind(&self, delta: Duration) {
        let mut t = self.tables.write();
        for q in t.questions.values_mut() {
            q.created_at -= delta;
        }
        for (_, _, at) in t.vote_activity.iter_mut() {
            *at -= delta;
        }
        for r in t.reactions.iter_mut() {
            r.created_at -= delta;
        }
    }
}

fn banned_user_ids(t: &Tables, now: DateTime<Utc>) -> HashSet<UserId> {
    t.users
        .values()
        .filter(|u| u.is_banned(now))
        .map(|u| u.id)
        .collect()
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_user(&self, name: &str) -> EngineResult<User> {
        let mut t = self.tables.write();
        t.next_user_id += 1;
        let user = User {
            id: t.next_user_id,
            uid: Uuid::now_v7(),
            name: name.to_string(),
            blocked: false,
            banned_until: None,
            created_at: Utc::now(),
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user_by_uid(&self, uid: Uuid) -> EngineResult<Option<User>> {
        let t = self.tables.read();
        Ok(t.users.values().find(|u| u.uid == uid).cloned())
    }

    async fn get_user(&self, id: UserId) -> EngineResult<Option<User>> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn ban_user(&self, id: UserId, until: Option<DateTime<Utc>>) -> EngineResult<()> {
        let mut t = self.tables.write();
        let user = t
            .users
            .get_mut(&id)
            .ok_or(EngineError::NotFound("user"))?;
        match until {
            Some(expiry) => user.banned_until = Some(expiry),
            None => user.blocked = true,
        }
        Ok(())
    }

    async fn create_conference(
        &self,
        name: &str,
        features: &[Feature],
    ) -> EngineResult<Conference> {
        let mut t = self.tables.write();
        t.next_conference_id += 1;
        let conference = Conference {
            id: t.next_conference_id,
            name: name.to_string(),
            features: features.to_vec(),
        };
        t.conferences.insert(conference.id, conference.clone());
        Ok(conference)
    }

    async fn get_conference(&self, id: ConferenceId) -> EngineResult<Option<Conference>> {
        Ok(self.tables.read().conferences.get(&id).cloned())
    }

    async fn grant_role(
        &self,
        user_id: UserId,
        conference_id: ConferenceId,
        role: Role,
    ) -> EngineResult<RoleGrant> {
        let mut t = self.tables.write();
        let key = (conference_id, user_id);
        let grant = match t.roles.get(&key) {
            // Upgrades only; a re-grant at a lower rank keeps the old role.
            Some(existing) if existing.role >= role => existing.clone(),
            _ => {
                let grant = RoleGrant {
                    conference_id,
                    user_id,
                    role,
                    granted_at: Utc::now(),
                };
                t.roles.insert(key, grant.clone());
                grant
            }
        };
        Ok(grant)
    }

    async fn role_for(
        &self,
        user_id: UserId,
        conference_id: ConferenceId,
    ) -> EngineResult<Option<RoleGrant>> {
        let t = self.tables.read();
        Ok(t.roles.get(&(conference_id, user_id)).cloned())
    }

    async fn upsert_events(&self, events: &[NewEvent]) -> EngineResult<Vec<Event>> {
        let mut t = self.tables.write();
        let mut out = Vec::with_capacity(events.len());
        for new in events {
            let existing_id = t
                .events
                .values()
                .find(|e| e.uid.eq_ignore_ascii_case(&new.uid))
                .map(|e| e.id);
            let event = match existing_id {
                Some(id) => {
                    let event = t
                        .events
                        .get_mut(&id)
                        .ok_or(EngineError::NotFound("event"))?;
                    event.title = new.title.clone();
                    event.stage = new.stage.clone();
                    event.start = new.start;
                    event.end = new.end;
                    event.speaker = new.speaker.clone();
                    event.conference_id = new.conference_id;
                    // live is never written here
                    event.clone()
                }
                None => {
                    t.next_event_id += 1;
                    let event = Event {
                        id: t.next_event_id,
                        uid: new.uid.clone(),
                        conference_id: new.conference_id,
                        title: new.title.clone(),
                        stage: new.stage.clone(),
                        start: new.start,
                        end: new.end,
                        speaker: new.speaker.clone(),
                        live: false,
                    };
                    t.events.insert(event.id, event.clone());
                    event
                }
            };
            out.push(event);
        }
        Ok(out)
    }

    async fn event_by_uid(&self, uid: &str) -> EngineResult<Option<Event>> {
        let t = self.tables.read();
        Ok(t.events
            .values()
            .find(|e| e.uid.eq_ignore_ascii_case(uid))
            .cloned())
    }

    async fn get_event(&self, id: EventId) -> EngineResult<Option<Event>> {
        Ok(self.tables.read().events.get(&id).cloned())
    }

    async fn list_events(&self, filter: &EventFilter) -> EngineResult<Vec<Event>> {
        let t = self.tables.read();
        let mut events: Vec<Event> = t
            .events
            .values()
            .filter(|e| {
                filter
                    .conference_id
                    .map_or(true, |c| e.conference_id == c)
                    && filter.stage.as_deref().map_or(true, |s| e.stage == s)
            })
            .cloned()
            .collect();
        events.sort_by_key(|e| e.start);
        events.truncate(filter.limit.unwrap_or(100));
        Ok(events)
    }

    async fn set_event_live(&self, id: EventId) -> EngineResult<Event> {
        let mut t = self.tables.write();
        let stage = t
            .events
            .get(&id)
            .ok_or(EngineError::NotFound("event"))?
            .stage
            .clone();
        for event in t.events.values_mut() {
            if event.stage == stage {
                event.live = event.id == id;
            }
        }
        t.events
            .get(&id)
            .cloned()
            .ok_or(EngineError::NotFound("event"))
    }

    async fn live_event_for_conference(
        &self,
        conference_id: ConferenceId,
    ) -> EngineResult<Option<Event>> {
        let t = self.tables.read();
        Ok(t.events
            .values()
            .filter(|e| e.conference_id == conference_id && e.live)
            .max_by_key(|e| e.start)
            .cloned())
    }

    async fn live_event_for_stage(&self, stage: &str) -> EngineResult<Option<Event>> {
        let t = self.tables.read();
        Ok(t.events
            .values()
            .filter(|e| e.stage == stage && e.live)
            .max_by_key(|e| e.start)
            .cloned())
    }

    async fn next_event_for_stage(
        &self,
        stage: &str,
        after: DateTime<Utc>,
    ) -> EngineResult<Option<Event>> {
        let t = self.tables.read();
        Ok(t.events
            .values()
            .filter(|e| e.stage == stage && e.start >= after)
            .min_by_key(|e| e.start)
            .cloned())
    }

    async fn count_participants(&self, event_id: EventId) -> EngineResult<u64> {
        let t = self.tables.read();
        let mut participants: HashSet<UserId> = HashSet::new();
        for q in t.questions.values().filter(|q| q.event_id == event_id) {
            participants.insert(q.user_id);
            for (question_id, user_id) in &t.votes {
                if *question_id == q.id {
                    participants.insert(*user_id);
                }
            }
        }
        Ok(participants.len() as u64)
    }

    async fn create_question(
        &self,
        event_id: EventId,
        user_id: UserId,
        text: &str,
    ) -> EngineResult<Question> {
        let mut t = self.tables.write();
        t.next_question_id += 1;
        let question = Question {
            id: t.next_question_id,
            uid: Uuid::now_v7(),
            event_id,
            user_id,
            question: text.to_string(),
            created_at: Utc::now(),
            selected_at: None,
            answered_at: None,
            deleted_at: None,
        };
        t.questions.insert(question.id, question.clone());
        Ok(question)
    }

    async fn question_by_uid(&self, uid: Uuid) -> EngineResult<Option<Question>> {
        let t = self.tables.read();
        Ok(t.questions.values().find(|q| q.uid == uid).cloned())
    }

    async fn questions_with_votes(
        &self,
        event_id: EventId,
        answered: Option<bool>,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<QuestionView>> {
        let t = self.tables.read();
        let banned = banned_user_ids(&t, now);
        let views = t
            .questions
            .values()
            .filter(|q| {
                q.event_id == event_id
                    && q.deleted_at.is_none()
                    && !banned.contains(&q.user_id)
                    && answered.map_or(true, |want| q.answered_at.is_some() == want)
            })
            .map(|q| {
                let votes = t
                    .votes
                    .iter()
                    .filter(|(question_id, voter)| {
                        *question_id == q.id && !banned.contains(voter)
                    })
                    .count() as u64;
                let author_name = t
                    .users
                    .get(&q.user_id)
                    .map(|u| u.name.clone())
                    .unwrap_or_default();
                QuestionView {
                    question: q.clone(),
                    votes,
                    author_name,
                }
            })
            .collect();
        Ok(views)
    }

    async fn mark_question(&self, id: QuestionId, mark: QuestionMark) -> EngineResult<Question> {
        let mut t = self.tables.write();
        let question = t
            .questions
            .get_mut(&id)
            .ok_or(EngineError::NotFound("question"))?;
        let now = Utc::now();
        match mark {
            QuestionMark::Selected => question.selected_at = Some(now),
            QuestionMark::Answered => question.answered_at = Some(now),
            QuestionMark::Deleted => question.deleted_at = Some(now),
        }
        Ok(question.clone())
    }

    async fn question_count_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> EngineResult<u64> {
        let t = self.tables.read();
        Ok(t.questions
            .values()
            .filter(|q| q.user_id == user_id && q.created_at > since)
            .count() as u64)
    }

    async fn question_count_for_event(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> EngineResult<u64> {
        let t = self.tables.read();
        Ok(t.questions
            .values()
            .filter(|q| q.user_id == user_id && q.event_id == event_id)
            .count() as u64)
    }

    async fn toggle_vote(
        &self,
        question_id: QuestionId,
        user_id: UserId,
        event_id: EventId,
    ) -> EngineResult<bool> {
        let mut t = self.tables.write();
        let key = (question_id, user_id);
        let voted = if t.votes.contains(&key) {
            t.votes.remove(&key);
            false
        } else {
            t.votes.insert(key);
            true
        };
        t.vote_activity.push((user_id, event_id, Utc::now()));
        Ok(voted)
    }

    async fn vote_count(&self, question_id: QuestionId) -> EngineResult<u64> {
        let t = self.tables.read();
        Ok(t.votes.iter().filter(|(q, _)| *q == question_id).count() as u64)
    }

    async fn vote_toggle_count_since(
        &self,
        user_id: UserId,
        event_id: EventId,
        since: DateTime<Utc>,
    ) -> EngineResult<u64> {
        let t = self.tables.read();
        Ok(t.vote_activity
            .iter()
            .filter(|(u, e, at)| *u == user_id && *e == event_id && *at > since)
            .count() as u64)
    }

    async fn create_reaction(
        &self,
        uid: &str,
        event_id: EventId,
        user_id: UserId,
    ) -> EngineResult<Reaction> {
        let mut t = self.tables.write();
        let reaction = Reaction {
            uid: uid.to_string(),
            event_id,
            user_id,
            created_at: Utc::now(),
        };
        t.reactions.push(reaction.clone());
        Ok(reaction)
    }

    async fn reaction_count_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> EngineResult<u64> {
        let t = self.tables.read();
        Ok(t.reactions
            .iter()
            .filter(|r| r.user_id == user_id && r.created_at > since)
            .count() as u64)
    }

    async fn contribution_tallies(&self) -> EngineResult<Vec<ContributionTally>> {
        let t = self.tables.read();
        let tallies = t
            .users
            .values()
            .map(|user| {
                let mut answered = 0u64;
                let mut received = 0u64;
                for q in t
                    .questions
                    .values()
                    .filter(|q| q.user_id == user.id && q.deleted_at.is_none())
                {
                    if q.answered_at.is_some() {
                        answered += 1;
                    }
                    received += t.votes.iter().filter(|(qid, _)| *qid == q.id).count() as u64;
                }
                ContributionTally {
                    user_id: user.id,
                    user_uid: user.uid,
                    name: user.name.clone(),
                    answered_questions: answered,
                    received_votes: received,
                }
            })
            .collect();
        Ok(tallies)
    }
}
