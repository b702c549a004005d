//! Admission control
//!
//! Per-user submission throttles, enforced against the shared store so the
//! limits hold across every process serving the same venue. A denial must
//! leave no trace: these checks run before any write for the operation.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::{EventId, UserId};
use crate::repo::Repository;

pub struct AdmissionController {
    config: EngineConfig,
}

impl AdmissionController {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Question gate: content validation plus two independent caps, a
    /// trailing-window rate and a lifetime per-event total. Either denies on
    /// its own.
    pub async fn check_question(
        &self,
        repo: &dyn Repository,
        user_id: UserId,
        event_id: EventId,
        text: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        if text.trim().is_empty() {
            return Err(EngineError::Validation("question is empty".to_string()));
        }
        if text.chars().count() > self.config.max_chars_per_question {
            return Err(EngineError::Validation(format!(
                "question exceeds {} characters",
                self.config.max_chars_per_question
            )));
        }

        let since = now - self.config.question_window();
        let recent = repo.question_count_since(user_id, since).await?;
        if recent >= self.config.max_questions_per_interval {
            warn!(user_id, recent, "question rate limit hit");
            return Err(EngineError::rate_limited(
                "too many questions, slow down",
            ));
        }

        // Lifetime cap counts everything ever submitted for the event,
        // removed questions included, so deletion does not refund quota
        let total = repo.question_count_for_event(user_id, event_id).await?;
        if total >= self.config.max_questions_per_event {
            warn!(user_id, event_id, total, "per-event question cap hit");
            return Err(EngineError::rate_limited(
                "question limit reached for this event",
            ));
        }

        Ok(())
    }

    /// Vote gate: counts toggle operations in the trailing window, both
    /// directions, so flipping a vote on and off burns quota each time.
    pub async fn check_vote(
        &self,
        repo: &dyn Repository,
        user_id: UserId,
        event_id: EventId,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let since = now - self.config.vote_window();
        let toggles = repo.vote_toggle_count_since(user_id, event_id, since).await?;
        if toggles >= self.config.max_votes_per_event {
            warn!(user_id, event_id, toggles, "vote rate limit hit");
            return Err(EngineError::rate_limited("too many votes, slow down"));
        }
        Ok(())
    }

    pub async fn check_reaction(
        &self,
        repo: &dyn Repository,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let since = now - self.config.reaction_window();
        let recent = repo.reaction_count_since(user_id, since).await?;
        if recent >= self.config.max_reactions_per_interval {
            return Err(EngineError::rate_limited("too many reactions, slow down"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewEvent;
    use crate::repo::memory::MemoryRepository;
    use chrono::Duration;

    async fn seed(repo: &MemoryRepository) -> (UserId, EventId) {
        let conference = repo.create_conference("conf", &[]).await.unwrap();
        let user = repo.create_user("tester").await.unwrap();
        let events = repo
            .upsert_events(&[NewEvent {
                uid: "talk-1".to_string(),
                conference_id: conference.id,
                title: "Talk".to_string(),
                stage: "main".to_string(),
                start: Utc::now(),
                end: Utc::now() + Duration::hours(1),
                speaker: None,
            }])
            .await
            .unwrap();
        (user.id, events[0].id)
    }

    #[tokio::test]
    async fn rejects_empty_and_oversized_questions() {
        let repo = MemoryRepository::new();
        let (user_id, event_id) = seed(&repo).await;
        let admission = AdmissionController::new(EngineConfig::default());

        let empty = admission
            .check_question(&repo, user_id, event_id, "   ", Utc::now())
            .await;
        assert!(matches!(empty, Err(EngineError::Validation(_))));

        let long = "x".repeat(201);
        let oversized = admission
            .check_question(&repo, user_id, event_id, &long, Utc::now())
            .await;
        assert!(matches!(oversized, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn question_window_denies_at_limit_and_recovers() {
        let repo = MemoryRepository::new();
        let (user_id, event_id) = seed(&repo).await;
        let config = EngineConfig {
            max_questions_per_interval: 2,
            ..EngineConfig::default()
        };
        let admission = AdmissionController::new(config);

        for text in ["first", "second"] {
            admission
                .check_question(&repo, user_id, event_id, text, Utc::now())
                .await
                .unwrap();
            repo.create_question(event_id, user_id, text).await.unwrap();
        }

        let denied = admission
            .check_question(&repo, user_id, event_id, "third", Utc::now())
            .await;
        assert!(matches!(denied, Err(EngineError::RateLimited { .. })));

        // Once the earlier submissions age past the window the gate reopens
        repo.rewind(Duration::seconds(61));
        admission
            .check_question(&repo, user_id, event_id, "third", Utc::now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn per_event_cap_is_independent_of_the_window() {
        let repo = MemoryRepository::new();
        let (user_id, event_id) = seed(&repo).await;
        let config = EngineConfig {
            max_questions_per_interval: 100,
            max_questions_per_event: 3,
            ..EngineConfig::default()
        };
        let admission = AdmissionController::new(config);

        for i in 0..3 {
            repo.create_question(event_id, user_id, &format!("q{i}"))
                .await
                .unwrap();
        }
        // Aging the rows past the rate window does not lift the lifetime cap
        repo.rewind(Duration::hours(2));

        let denied = admission
            .check_question(&repo, user_id, event_id, "one more", Utc::now())
            .await;
        assert!(matches!(denied, Err(EngineError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn vote_limit_counts_toggles_not_surviving_votes() {
        let repo = MemoryRepository::new();
        let (user_id, event_id) = seed(&repo).await;
        let question = repo.create_question(event_id, user_id, "q").await.unwrap();
        let config = EngineConfig {
            max_votes_per_event: 4,
            ..EngineConfig::default()
        };
        let admission = AdmissionController::new(config);

        // Two on/off cycles leave zero votes but four logged toggles
        for _ in 0..4 {
            admission
                .check_vote(&repo, user_id, event_id, Utc::now())
                .await
                .unwrap();
            repo.toggle_vote(question.id, user_id, event_id).await.unwrap();
        }
        assert_eq!(repo.vote_count(question.id).await.unwrap(), 0);

        let denied = admission.check_vote(&repo, user_id, event_id, Utc::now()).await;
        assert!(matches!(denied, Err(EngineError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn reaction_window_denies_at_limit() {
        let repo = MemoryRepository::new();
        let (user_id, event_id) = seed(&repo).await;
        let config = EngineConfig {
            max_reactions_per_interval: 2,
            ..EngineConfig::default()
        };
        let admission = AdmissionController::new(config);

        for i in 0..2 {
            admission.check_reaction(&repo, user_id, Utc::now()).await.unwrap();
            repo.create_reaction(&format!("clap-{i}"), event_id, user_id)
                .await
                .unwrap();
        }
        let denied = admission.check_reaction(&repo, user_id, Utc::now()).await;
        assert!(matches!(denied, Err(EngineError::RateLimited { .. })));

        repo.rewind(Duration::seconds(31));
        admission.check_reaction(&repo, user_id, Utc::now()).await.unwrap();
    }
}
