//! Engagement engine
//!
//! The single entry point for every state change. Each operation follows the
//! same order: authenticate the principal, authorize, admit, mutate through
//! the repository, then notify. A denial at any step returns before the first
//! write, so refused requests leave no partial state behind.

pub mod admission;
pub mod authorize;
pub mod ranking;

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    Conference, ConferenceId, Event, EventFilter, Feature, LeaderboardEntry, NewEvent, Principal,
    Question, QuestionMark, QuestionView, RankAndPoints, Reaction, Role, RoleGrant, Sort, User,
    VoteReceipt,
};
use crate::notify::{ChangeKind, Notifier, Topic};
use crate::repo::Repository;
use crate::username;

use admission::AdmissionController;
use authorize::ModerationAction;

pub struct Engine {
    repo: Arc<dyn Repository>,
    notifier: Arc<Notifier>,
    admission: AdmissionController,
    config: EngineConfig,
}

impl Engine {
    pub fn new(repo: Arc<dyn Repository>, notifier: Arc<Notifier>, config: EngineConfig) -> Self {
        Self {
            repo,
            notifier,
            admission: AdmissionController::new(config.clone()),
            config,
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    /// Create a principal for a venue. Callers without a name get a
    /// generated one, but only where the venue allows anonymous login.
    pub async fn register_user(
        &self,
        conference_id: ConferenceId,
        name: Option<&str>,
    ) -> EngineResult<User> {
        let conference = self
            .repo
            .get_conference(conference_id)
            .await?
            .ok_or(EngineError::NotFound("conference"))?;
        let generated;
        let name = match name.map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => {
                if !conference.has_feature(Feature::AnonymousLogin) {
                    return Err(EngineError::Validation(
                        "a display name is required for this venue".to_string(),
                    ));
                }
                generated = username::generate();
                &generated
            }
        };
        let user = self.repo.create_user(name).await?;
        info!(user_id = user.id, "user registered");
        Ok(user)
    }

    pub async fn current_user(&self, principal: &Principal) -> EngineResult<User> {
        self.resolve(principal).await
    }

    async fn resolve(&self, principal: &Principal) -> EngineResult<User> {
        self.repo
            .user_by_uid(principal.user_uid)
            .await?
            .ok_or_else(|| EngineError::Unauthenticated("unknown user".to_string()))
    }

    /// Resolve and reject banned principals in one step. Used by every
    /// submitting operation; moderation goes through role checks instead.
    async fn resolve_active(&self, principal: &Principal) -> EngineResult<User> {
        let user = self.resolve(principal).await?;
        if user.is_banned(Utc::now()) {
            return Err(EngineError::banned());
        }
        Ok(user)
    }

    // ------------------------------------------------------------------
    // Questions & votes
    // ------------------------------------------------------------------

    pub async fn submit_question(
        &self,
        principal: &Principal,
        event_uid: &str,
        text: &str,
    ) -> EngineResult<QuestionView> {
        let user = self.resolve_active(principal).await?;
        let event = self
            .repo
            .event_by_uid(event_uid)
            .await?
            .ok_or(EngineError::NotFound("event"))?;

        self.admission
            .check_question(self.repo.as_ref(), user.id, event.id, text, Utc::now())
            .await?;

        let question = self
            .repo
            .create_question(event.id, user.id, text.trim())
            .await?;
        info!(question_id = question.id, event_id = event.id, "question created");

        self.notifier.publish_all(
            [
                Topic::Event { event_id: event.id },
                Topic::Conference {
                    conference_id: event.conference_id,
                },
            ],
            ChangeKind::QuestionCreated {
                question_uid: question.uid.to_string(),
            },
        );

        Ok(QuestionView {
            question,
            votes: 0,
            author_name: user.name,
        })
    }

    /// Ranked listing for one event. `answered` narrows to answered or open
    /// questions when set. Ban filtering happens at read time in the
    /// repository; ordering happens here.
    pub async fn list_questions(
        &self,
        event_uid: &str,
        sort: Sort,
        answered: Option<bool>,
    ) -> EngineResult<Vec<QuestionView>> {
        let event = self
            .repo
            .event_by_uid(event_uid)
            .await?
            .ok_or(EngineError::NotFound("event"))?;
        let mut questions = self
            .repo
            .questions_with_votes(event.id, answered, Utc::now())
            .await?;
        ranking::sort_questions(&mut questions, sort);
        Ok(questions)
    }

    /// Flip the caller's vote on a question. The same call is both upvote and
    /// un-vote; the receipt says which way it landed.
    pub async fn toggle_vote(
        &self,
        principal: &Principal,
        question_uid: Uuid,
    ) -> EngineResult<VoteReceipt> {
        let user = self.resolve_active(principal).await?;
        let question = self.visible_question(question_uid).await?;
        let event = self
            .repo
            .get_event(question.event_id)
            .await?
            .ok_or(EngineError::NotFound("event"))?;

        self.admission
            .check_vote(self.repo.as_ref(), user.id, event.id, Utc::now())
            .await?;

        let voted = self
            .repo
            .toggle_vote(question.id, user.id, event.id)
            .await?;
        let votes = self.repo.vote_count(question.id).await?;

        self.notifier.publish_all(
            [
                Topic::Event { event_id: event.id },
                Topic::Conference {
                    conference_id: event.conference_id,
                },
            ],
            ChangeKind::VoteChanged {
                question_uid: question.uid.to_string(),
                votes,
            },
        );

        Ok(VoteReceipt { voted, votes })
    }

    pub async fn react(
        &self,
        principal: &Principal,
        event_uid: &str,
        reaction_uid: &str,
    ) -> EngineResult<Reaction> {
        if reaction_uid.trim().is_empty() {
            return Err(EngineError::Validation("reaction is empty".to_string()));
        }
        let user = self.resolve_active(principal).await?;
        let event = self
            .repo
            .event_by_uid(event_uid)
            .await?
            .ok_or(EngineError::NotFound("event"))?;

        self.admission
            .check_reaction(self.repo.as_ref(), user.id, Utc::now())
            .await?;

        let reaction = self
            .repo
            .create_reaction(reaction_uid.trim(), event.id, user.id)
            .await?;

        self.notifier.publish(
            Topic::Event { event_id: event.id },
            ChangeKind::Reaction {
                reaction_uid: reaction.uid.clone(),
            },
        );

        Ok(reaction)
    }

    /// Removed questions are invisible to voting: gone means gone.
    async fn visible_question(&self, uid: Uuid) -> EngineResult<Question> {
        let question = self
            .repo
            .question_by_uid(uid)
            .await?
            .ok_or(EngineError::NotFound("question"))?;
        if question.deleted_at.is_some() {
            return Err(EngineError::NotFound("question"));
        }
        Ok(question)
    }

    // ------------------------------------------------------------------
    // Moderation
    // ------------------------------------------------------------------

    pub async fn select_question(
        &self,
        principal: &Principal,
        question_uid: Uuid,
    ) -> EngineResult<Question> {
        self.moderate_question(principal, question_uid, QuestionMark::Selected)
            .await
    }

    pub async fn mark_answered(
        &self,
        principal: &Principal,
        question_uid: Uuid,
    ) -> EngineResult<Question> {
        self.moderate_question(principal, question_uid, QuestionMark::Answered)
            .await
    }

    pub async fn remove_question(
        &self,
        principal: &Principal,
        question_uid: Uuid,
    ) -> EngineResult<Question> {
        self.moderate_question(principal, question_uid, QuestionMark::Deleted)
            .await
    }

    async fn moderate_question(
        &self,
        principal: &Principal,
        question_uid: Uuid,
        mark: QuestionMark,
    ) -> EngineResult<Question> {
        let user = self.resolve(principal).await?;
        let question = self
            .repo
            .question_by_uid(question_uid)
            .await?
            .ok_or(EngineError::NotFound("question"))?;
        // Moderating an already-removed question is a caller mistake, not a
        // missing resource
        if question.deleted_at.is_some() {
            return Err(EngineError::Conflict("question already removed".to_string()));
        }
        let event = self
            .repo
            .get_event(question.event_id)
            .await?
            .ok_or(EngineError::NotFound("event"))?;

        let action = match mark {
            QuestionMark::Selected => ModerationAction::SelectQuestion,
            QuestionMark::Answered => ModerationAction::MarkAnswered,
            QuestionMark::Deleted => ModerationAction::RemoveQuestion,
        };
        authorize::require_organizer(self.repo.as_ref(), user.id, event.conference_id, action)
            .await?;

        let updated = self.repo.mark_question(question.id, mark).await?;
        info!(
            question_id = updated.id,
            action = action.as_str(),
            moderator = user.id,
            "question moderated"
        );

        let change = match mark {
            QuestionMark::Deleted => ChangeKind::QuestionRemoved {
                question_uid: updated.uid.to_string(),
            },
            _ => ChangeKind::QuestionUpdated {
                question_uid: updated.uid.to_string(),
            },
        };
        self.notifier.publish_all(
            [
                Topic::Event { event_id: event.id },
                Topic::Conference {
                    conference_id: event.conference_id,
                },
            ],
            change,
        );

        Ok(updated)
    }

    /// Ban a user from the venue's activities. With `ban_hours` configured
    /// the ban expires on its own; without it the block is permanent.
    pub async fn block_user(
        &self,
        principal: &Principal,
        conference_id: ConferenceId,
        target_uid: Uuid,
    ) -> EngineResult<()> {
        let user = self.resolve(principal).await?;
        authorize::require_organizer(
            self.repo.as_ref(),
            user.id,
            conference_id,
            ModerationAction::BlockUser,
        )
        .await?;

        let target = self
            .repo
            .user_by_uid(target_uid)
            .await?
            .ok_or(EngineError::NotFound("user"))?;
        let until = self.config.ban_duration().map(|d| Utc::now() + d);
        self.repo.ban_user(target.id, until).await?;
        info!(target = target.id, moderator = user.id, "user blocked");
        Ok(())
    }

    pub async fn grant_role(
        &self,
        principal: &Principal,
        conference_id: ConferenceId,
        target_uid: Uuid,
        role: Role,
    ) -> EngineResult<RoleGrant> {
        let user = self.resolve(principal).await?;
        authorize::require_organizer(
            self.repo.as_ref(),
            user.id,
            conference_id,
            ModerationAction::GrantRole,
        )
        .await?;

        let target = self
            .repo
            .user_by_uid(target_uid)
            .await?
            .ok_or(EngineError::NotFound("user"))?;
        self.repo.grant_role(target.id, conference_id, role).await
    }

    // ------------------------------------------------------------------
    // Venue administration
    // ------------------------------------------------------------------
    // No principal involved: the transport gates these behind the sync
    // credential. This is also how the first organizer of a venue gets
    // granted, since grant_role needs an existing organizer.

    pub async fn create_conference(
        &self,
        name: &str,
        features: &[Feature],
    ) -> EngineResult<Conference> {
        if name.trim().is_empty() {
            return Err(EngineError::Validation("conference name is empty".to_string()));
        }
        let conference = self.repo.create_conference(name.trim(), features).await?;
        info!(conference_id = conference.id, "conference created");
        Ok(conference)
    }

    pub async fn admin_grant_role(
        &self,
        conference_id: ConferenceId,
        target_uid: Uuid,
        role: Role,
    ) -> EngineResult<RoleGrant> {
        let target = self
            .repo
            .user_by_uid(target_uid)
            .await?
            .ok_or(EngineError::NotFound("user"))?;
        self.repo.grant_role(target.id, conference_id, role).await
    }

    // ------------------------------------------------------------------
    // Events & live state
    // ------------------------------------------------------------------

    /// Schedule sync. Unauthenticated at this layer; the transport gates it
    /// behind the sync credential. Never touches live state.
    pub async fn upsert_events(&self, events: &[NewEvent]) -> EngineResult<Vec<Event>> {
        let upserted = self.repo.upsert_events(events).await?;
        info!(count = upserted.len(), "events upserted");
        Ok(upserted)
    }

    pub async fn list_events(&self, filter: &EventFilter) -> EngineResult<Vec<Event>> {
        self.repo.list_events(filter).await
    }

    pub async fn event_by_uid(&self, uid: &str) -> EngineResult<Event> {
        self.repo
            .event_by_uid(uid)
            .await?
            .ok_or(EngineError::NotFound("event"))
    }

    /// Put an event live, displacing whatever was live on its stage.
    pub async fn go_live(&self, principal: &Principal, event_uid: &str) -> EngineResult<Event> {
        let user = self.resolve(principal).await?;
        let event = self
            .repo
            .event_by_uid(event_uid)
            .await?
            .ok_or(EngineError::NotFound("event"))?;
        authorize::require_organizer(
            self.repo.as_ref(),
            user.id,
            event.conference_id,
            ModerationAction::GoLive,
        )
        .await?;

        let event = self.repo.set_event_live(event.id).await?;
        info!(event_id = event.id, stage = %event.stage, "event live");

        self.notifier.publish_all(
            [
                Topic::Stage {
                    stage: event.stage.clone(),
                },
                Topic::Conference {
                    conference_id: event.conference_id,
                },
            ],
            ChangeKind::EventLive {
                event_uid: event.uid.clone(),
            },
        );

        Ok(event)
    }

    /// What a stage display should show right now: the explicitly-live event
    /// if there is one, otherwise the next event scheduled on the stage.
    pub async fn current_event_for_stage(&self, stage: &str) -> EngineResult<Option<Event>> {
        if let Some(live) = self.repo.live_event_for_stage(stage).await? {
            return Ok(Some(live));
        }
        self.repo.next_event_for_stage(stage, Utc::now()).await
    }

    pub async fn live_event_for_conference(
        &self,
        conference_id: ConferenceId,
    ) -> EngineResult<Option<Event>> {
        self.repo.live_event_for_conference(conference_id).await
    }

    pub async fn count_participants(&self, event_uid: &str) -> EngineResult<u64> {
        let event = self
            .repo
            .event_by_uid(event_uid)
            .await?
            .ok_or(EngineError::NotFound("event"))?;
        self.repo.count_participants(event.id).await
    }

    // ------------------------------------------------------------------
    // Leaderboard
    // ------------------------------------------------------------------

    pub async fn leaderboard(
        &self,
        conference_id: ConferenceId,
        limit: usize,
    ) -> EngineResult<Vec<LeaderboardEntry>> {
        self.require_leaderboard(conference_id).await?;
        let tallies = self.repo.contribution_tallies().await?;
        Ok(ranking::leaderboard(tallies, limit))
    }

    pub async fn contribution_rank(
        &self,
        conference_id: ConferenceId,
        principal: &Principal,
    ) -> EngineResult<RankAndPoints> {
        self.require_leaderboard(conference_id).await?;
        let user = self.resolve(principal).await?;
        let tallies = self.repo.contribution_tallies().await?;
        Ok(ranking::rank_for(&tallies, user.uid))
    }

    /// Venues without the flag have no leaderboard at all, not an empty one.
    async fn require_leaderboard(&self, conference_id: ConferenceId) -> EngineResult<()> {
        let conference = self
            .repo
            .get_conference(conference_id)
            .await?
            .ok_or(EngineError::NotFound("conference"))?;
        if !conference.has_feature(Feature::Leaderboard) {
            return Err(EngineError::NotFound("leaderboard"));
        }
        Ok(())
    }
}
