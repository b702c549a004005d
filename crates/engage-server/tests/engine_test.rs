//! Engine integration tests over the in-memory repository
//!
//! Exercises full operation flows: authentication, admission, mutation and
//! notification, with the same engine wiring the server uses.

use std::sync::Arc;

use chrono::{Duration, Utc};
use engage_server::config::EngineConfig;
use engage_server::engine::Engine;
use engage_server::error::EngineError;
use engage_server::models::{Feature, NewEvent, Principal, Role, Sort, User};
use engage_server::notify::{ChangeKind, Notifier};
use engage_server::repo::memory::MemoryRepository;

struct Harness {
    repo: Arc<MemoryRepository>,
    notifier: Arc<Notifier>,
    engine: Engine,
    conference_id: i32,
}

impl Harness {
    async fn new(features: &[Feature]) -> Self {
        Self::with_config(features, EngineConfig::default()).await
    }

    async fn with_config(features: &[Feature], config: EngineConfig) -> Self {
        let repo = Arc::new(MemoryRepository::new());
        let notifier = Arc::new(Notifier::new(64));
        let engine = Engine::new(repo.clone(), notifier.clone(), config);
        let conference = engine.create_conference("rustconf", features).await.unwrap();
        Self {
            repo,
            notifier,
            engine,
            conference_id: conference.id,
        }
    }

    async fn seed_event(&self, uid: &str, stage: &str, start_in_mins: i64) {
        self.engine
            .upsert_events(&[NewEvent {
                uid: uid.to_string(),
                conference_id: self.conference_id,
                title: format!("Session {uid}"),
                stage: stage.to_string(),
                start: Utc::now() + Duration::minutes(start_in_mins),
                end: Utc::now() + Duration::minutes(start_in_mins + 45),
                speaker: Some("A. Speaker".to_string()),
            }])
            .await
            .unwrap();
    }

    async fn attendee(&self, name: &str) -> (User, Principal) {
        let user = self
            .engine
            .register_user(self.conference_id, Some(name))
            .await
            .unwrap();
        let principal = Principal { user_uid: user.uid };
        (user, principal)
    }

    async fn organizer(&self, name: &str) -> (User, Principal) {
        let (user, principal) = self.attendee(name).await;
        self.engine
            .admin_grant_role(self.conference_id, user.uid, Role::Organizer)
            .await
            .unwrap();
        (user, principal)
    }
}

// ----------------------------------------------------------------------
// Votes
// ----------------------------------------------------------------------

#[tokio::test]
async fn vote_toggle_is_an_involution() {
    let h = Harness::new(&[]).await;
    h.seed_event("talk-1", "main", 5).await;
    let (_, author) = h.attendee("author").await;
    let (_, voter) = h.attendee("voter").await;

    let question = h
        .engine
        .submit_question(&author, "talk-1", "Why is the borrow checker like that?")
        .await
        .unwrap();

    let up = h
        .engine
        .toggle_vote(&voter, question.question.uid)
        .await
        .unwrap();
    assert!(up.voted);
    assert_eq!(up.votes, 1);

    let down = h
        .engine
        .toggle_vote(&voter, question.question.uid)
        .await
        .unwrap();
    assert!(!down.voted);
    assert_eq!(down.votes, 0);
}

#[tokio::test]
async fn voting_on_a_removed_question_is_not_found() {
    let h = Harness::new(&[]).await;
    h.seed_event("talk-1", "main", 5).await;
    let (_, author) = h.attendee("author").await;
    let (_, voter) = h.attendee("voter").await;
    let (_, moderator) = h.organizer("mod").await;

    let question = h
        .engine
        .submit_question(&author, "talk-1", "Hidden soon")
        .await
        .unwrap();
    h.engine
        .remove_question(&moderator, question.question.uid)
        .await
        .unwrap();

    let denied = h.engine.toggle_vote(&voter, question.question.uid).await;
    assert!(matches!(denied, Err(EngineError::NotFound(_))));
}

// ----------------------------------------------------------------------
// Ranking
// ----------------------------------------------------------------------

#[tokio::test]
async fn popular_listing_ranks_open_questions_by_votes_then_age() {
    let h = Harness::new(&[]).await;
    h.seed_event("talk-1", "main", 5).await;
    let (_, author) = h.attendee("author").await;
    let (_, moderator) = h.organizer("mod").await;

    let first = h
        .engine
        .submit_question(&author, "talk-1", "first")
        .await
        .unwrap();
    let second = h
        .engine
        .submit_question(&author, "talk-1", "second")
        .await
        .unwrap();
    let third = h
        .engine
        .submit_question(&author, "talk-1", "third")
        .await
        .unwrap();

    // Three voters push "second" to the top; "third" gets one vote
    for name in ["v1", "v2", "v3"] {
        let (_, voter) = h.attendee(name).await;
        h.engine
            .toggle_vote(&voter, second.question.uid)
            .await
            .unwrap();
    }
    let (_, voter) = h.attendee("v4").await;
    h.engine
        .toggle_vote(&voter, third.question.uid)
        .await
        .unwrap();

    // Answering "second" drops it below every open question
    h.engine
        .mark_answered(&moderator, second.question.uid)
        .await
        .unwrap();

    let listed = h
        .engine
        .list_questions("talk-1", Sort::Popular, None)
        .await
        .unwrap();
    let order: Vec<_> = listed.iter().map(|q| q.question.id).collect();
    assert_eq!(
        order,
        vec![third.question.id, first.question.id, second.question.id]
    );
}

#[tokio::test]
async fn answered_filter_splits_the_listing() {
    let h = Harness::new(&[]).await;
    h.seed_event("talk-1", "main", 5).await;
    let (_, author) = h.attendee("author").await;
    let (_, moderator) = h.organizer("mod").await;

    let answered = h
        .engine
        .submit_question(&author, "talk-1", "answered one")
        .await
        .unwrap();
    let open = h
        .engine
        .submit_question(&author, "talk-1", "still open")
        .await
        .unwrap();
    h.engine
        .mark_answered(&moderator, answered.question.uid)
        .await
        .unwrap();

    let only_open = h
        .engine
        .list_questions("talk-1", Sort::Popular, Some(false))
        .await
        .unwrap();
    assert_eq!(only_open.len(), 1);
    assert_eq!(only_open[0].question.id, open.question.id);

    let only_answered = h
        .engine
        .list_questions("talk-1", Sort::Popular, Some(true))
        .await
        .unwrap();
    assert_eq!(only_answered.len(), 1);
    assert_eq!(only_answered[0].question.id, answered.question.id);

    let both = h
        .engine
        .list_questions("talk-1", Sort::Popular, None)
        .await
        .unwrap();
    assert_eq!(both.len(), 2);
}

#[tokio::test]
async fn newest_listing_is_reverse_chronological() {
    let h = Harness::new(&[]).await;
    h.seed_event("talk-1", "main", 5).await;
    let (_, author) = h.attendee("author").await;

    let first = h
        .engine
        .submit_question(&author, "talk-1", "first")
        .await
        .unwrap();
    h.repo.rewind(Duration::seconds(61));
    let second = h
        .engine
        .submit_question(&author, "talk-1", "second")
        .await
        .unwrap();

    let listed = h
        .engine
        .list_questions("talk-1", Sort::Newest, None)
        .await
        .unwrap();
    let order: Vec<_> = listed.iter().map(|q| q.question.id).collect();
    assert_eq!(order, vec![second.question.id, first.question.id]);
}

// ----------------------------------------------------------------------
// Admission control
// ----------------------------------------------------------------------

#[tokio::test]
async fn question_rate_limit_denies_then_recovers_after_the_window() {
    let config = EngineConfig {
        max_questions_per_interval: 2,
        ..EngineConfig::default()
    };
    let h = Harness::with_config(&[], config).await;
    h.seed_event("talk-1", "main", 5).await;
    let (_, author) = h.attendee("author").await;

    h.engine
        .submit_question(&author, "talk-1", "one")
        .await
        .unwrap();
    h.engine
        .submit_question(&author, "talk-1", "two")
        .await
        .unwrap();

    let denied = h.engine.submit_question(&author, "talk-1", "three").await;
    assert!(matches!(denied, Err(EngineError::RateLimited { .. })));

    h.repo.rewind(Duration::seconds(61));
    h.engine
        .submit_question(&author, "talk-1", "three")
        .await
        .unwrap();
}

#[tokio::test]
async fn denied_submission_writes_nothing_and_notifies_nobody() {
    let h = Harness::new(&[]).await;
    h.seed_event("talk-1", "main", 5).await;
    let (user, author) = h.attendee("author").await;
    let (_, moderator) = h.organizer("mod").await;

    h.engine
        .block_user(&moderator, h.conference_id, user.uid)
        .await
        .unwrap();

    let mut rx = h.notifier.subscribe();
    let denied = h.engine.submit_question(&author, "talk-1", "hello?").await;
    assert!(matches!(denied, Err(EngineError::Forbidden { .. })));

    let listed = h
        .engine
        .list_questions("talk-1", Sort::Popular, None)
        .await
        .unwrap();
    assert!(listed.is_empty());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn banned_authors_questions_and_votes_vanish_from_listings() {
    let h = Harness::new(&[]).await;
    h.seed_event("talk-1", "main", 5).await;
    let (bad_user, bad) = h.attendee("troll").await;
    let (_, good) = h.attendee("regular").await;
    let (_, moderator) = h.organizer("mod").await;

    h.engine
        .submit_question(&bad, "talk-1", "spam")
        .await
        .unwrap();
    let kept = h
        .engine
        .submit_question(&good, "talk-1", "real question")
        .await
        .unwrap();
    // The troll's vote on the good question also stops counting
    h.engine.toggle_vote(&bad, kept.question.uid).await.unwrap();

    h.engine
        .block_user(&moderator, h.conference_id, bad_user.uid)
        .await
        .unwrap();

    let listed = h
        .engine
        .list_questions("talk-1", Sort::Popular, None)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].question.id, kept.question.id);
    assert_eq!(listed[0].votes, 0);
}

// ----------------------------------------------------------------------
// Live state
// ----------------------------------------------------------------------

#[tokio::test]
async fn going_live_displaces_only_the_same_stage() {
    let h = Harness::new(&[]).await;
    h.seed_event("talk-1", "main", 10).await;
    h.seed_event("talk-2", "main", 60).await;
    h.seed_event("workshop", "lab", 10).await;
    let (_, organizer) = h.organizer("org").await;

    h.engine.go_live(&organizer, "workshop").await.unwrap();
    h.engine.go_live(&organizer, "talk-1").await.unwrap();
    let second = h.engine.go_live(&organizer, "talk-2").await.unwrap();
    assert!(second.live);

    let main_live = h
        .engine
        .current_event_for_stage("main")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(main_live.uid, "talk-2");

    // The lab stage keeps its own live event
    let lab_live = h
        .engine
        .current_event_for_stage("lab")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lab_live.uid, "workshop");
    assert!(lab_live.live);
}

#[tokio::test]
async fn stage_with_no_live_event_falls_back_to_next_scheduled() {
    let h = Harness::new(&[]).await;
    h.seed_event("late", "main", 120).await;
    h.seed_event("soon", "main", 15).await;

    let current = h
        .engine
        .current_event_for_stage("main")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.uid, "soon");
    assert!(!current.live);

    assert!(h
        .engine
        .current_event_for_stage("empty-stage")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn schedule_sync_updates_fields_but_never_live_state() {
    let h = Harness::new(&[]).await;
    h.seed_event("talk-1", "main", 10).await;
    let (_, organizer) = h.organizer("org").await;
    h.engine.go_live(&organizer, "talk-1").await.unwrap();

    // Re-sync with a different uid casing and a new title
    let resynced = h
        .engine
        .upsert_events(&[NewEvent {
            uid: "TALK-1".to_string(),
            conference_id: h.conference_id,
            title: "Renamed Session".to_string(),
            stage: "main".to_string(),
            start: Utc::now() + Duration::minutes(10),
            end: Utc::now() + Duration::minutes(55),
            speaker: None,
        }])
        .await
        .unwrap();

    assert_eq!(resynced.len(), 1);
    assert_eq!(resynced[0].title, "Renamed Session");
    assert!(resynced[0].live, "sync must not clear the live flag");
}

// ----------------------------------------------------------------------
// Moderation
// ----------------------------------------------------------------------

#[tokio::test]
async fn moderation_requires_an_organizer_grant() {
    let h = Harness::new(&[]).await;
    h.seed_event("talk-1", "main", 5).await;
    let (_, author) = h.attendee("author").await;
    let question = h
        .engine
        .submit_question(&author, "talk-1", "pick me")
        .await
        .unwrap();

    // The author cannot moderate their own question
    let denied = h.engine.select_question(&author, question.question.uid).await;
    assert!(matches!(denied, Err(EngineError::Forbidden { .. })));

    let denied = h.engine.go_live(&author, "talk-1").await;
    assert!(matches!(denied, Err(EngineError::Forbidden { .. })));
}

#[tokio::test]
async fn answered_wins_over_selected_in_display_state() {
    let h = Harness::new(&[]).await;
    h.seed_event("talk-1", "main", 5).await;
    let (_, author) = h.attendee("author").await;
    let (_, moderator) = h.organizer("mod").await;
    let question = h
        .engine
        .submit_question(&author, "talk-1", "both marks")
        .await
        .unwrap();

    let selected = h
        .engine
        .select_question(&moderator, question.question.uid)
        .await
        .unwrap();
    assert!(selected.is_selected());

    let answered = h
        .engine
        .mark_answered(&moderator, question.question.uid)
        .await
        .unwrap();
    assert!(answered.is_answered());
    assert!(!answered.is_selected(), "selection yields to answered");
    assert!(answered.selected_at.is_some(), "storage keeps both marks");
}

#[tokio::test]
async fn moderating_a_removed_question_is_a_conflict() {
    let h = Harness::new(&[]).await;
    h.seed_event("talk-1", "main", 5).await;
    let (_, author) = h.attendee("author").await;
    let (_, moderator) = h.organizer("mod").await;
    let question = h
        .engine
        .submit_question(&author, "talk-1", "gone")
        .await
        .unwrap();

    h.engine
        .remove_question(&moderator, question.question.uid)
        .await
        .unwrap();
    let again = h
        .engine
        .remove_question(&moderator, question.question.uid)
        .await;
    assert!(matches!(again, Err(EngineError::Conflict(_))));
}

// ----------------------------------------------------------------------
// Leaderboard
// ----------------------------------------------------------------------

#[tokio::test]
async fn anonymous_login_requires_the_feature_flag() {
    let h = Harness::new(&[]).await;
    let denied = h.engine.register_user(h.conference_id, None).await;
    assert!(matches!(denied, Err(EngineError::Validation(_))));

    let h = Harness::new(&[Feature::AnonymousLogin]).await;
    let user = h
        .engine
        .register_user(h.conference_id, None)
        .await
        .unwrap();
    assert!(!user.name.is_empty());
}

#[tokio::test]
async fn leaderboard_requires_the_feature_flag() {
    let h = Harness::new(&[]).await;
    let denied = h.engine.leaderboard(h.conference_id, 10).await;
    assert!(matches!(denied, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn leaderboard_scores_answered_questions_and_received_votes() {
    let h = Harness::new(&[Feature::Leaderboard]).await;
    h.seed_event("talk-1", "main", 5).await;
    let (_, star) = h.attendee("star").await;
    let (_, moderator) = h.organizer("mod").await;

    // Two answered questions and five received votes: 2 * 10 + 5 = 25
    let q1 = h
        .engine
        .submit_question(&star, "talk-1", "first")
        .await
        .unwrap();
    let q2 = h
        .engine
        .submit_question(&star, "talk-1", "second")
        .await
        .unwrap();
    for name in ["v1", "v2", "v3"] {
        let (_, voter) = h.attendee(name).await;
        h.engine.toggle_vote(&voter, q1.question.uid).await.unwrap();
    }
    for name in ["v4", "v5"] {
        let (_, voter) = h.attendee(name).await;
        h.engine.toggle_vote(&voter, q2.question.uid).await.unwrap();
    }
    h.engine.mark_answered(&moderator, q1.question.uid).await.unwrap();
    h.engine.mark_answered(&moderator, q2.question.uid).await.unwrap();

    let entries = h.engine.leaderboard(h.conference_id, 3).await.unwrap();
    assert_eq!(entries[0].name, "star");
    assert_eq!(entries[0].points, 25);
    assert_eq!(entries[0].rank, 1);

    let my_rank = h
        .engine
        .contribution_rank(h.conference_id, &star)
        .await
        .unwrap();
    assert_eq!((my_rank.rank, my_rank.points), (1, 25));
}

#[tokio::test]
async fn unscored_users_have_no_rank() {
    let h = Harness::new(&[Feature::Leaderboard]).await;
    let (_, newcomer) = h.attendee("newcomer").await;
    let rank = h
        .engine
        .contribution_rank(h.conference_id, &newcomer)
        .await
        .unwrap();
    assert_eq!((rank.rank, rank.points), (0, 0));
}

// ----------------------------------------------------------------------
// Participants & notifications
// ----------------------------------------------------------------------

#[tokio::test]
async fn participant_count_is_a_distinct_union_of_authors_and_voters() {
    let h = Harness::new(&[]).await;
    h.seed_event("talk-1", "main", 5).await;
    let (_, author) = h.attendee("author").await;
    let (_, voter) = h.attendee("voter").await;

    let q1 = h
        .engine
        .submit_question(&author, "talk-1", "one")
        .await
        .unwrap();
    h.engine
        .submit_question(&author, "talk-1", "two")
        .await
        .unwrap();
    // The author voting on their own question must not count twice
    h.engine.toggle_vote(&author, q1.question.uid).await.unwrap();
    h.engine.toggle_vote(&voter, q1.question.uid).await.unwrap();

    assert_eq!(h.engine.count_participants("talk-1").await.unwrap(), 2);
}

#[tokio::test]
async fn accepted_mutations_notify_event_and_conference_feeds() {
    let h = Harness::new(&[]).await;
    h.seed_event("talk-1", "main", 5).await;
    let (_, author) = h.attendee("author").await;

    let mut rx = h.notifier.subscribe();
    let question = h
        .engine
        .submit_question(&author, "talk-1", "notify me")
        .await
        .unwrap();

    let first = rx.try_recv().unwrap();
    let second = rx.try_recv().unwrap();
    let expected = ChangeKind::QuestionCreated {
        question_uid: question.question.uid.to_string(),
    };
    assert_eq!(first.change, expected);
    assert_eq!(second.change, expected);
    assert_ne!(first.topic, second.topic);
}
