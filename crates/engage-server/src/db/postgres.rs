//! PostgreSQL repository
//!
//! The production `Repository` backend. Atomicity lives in the database: the
//! votes primary key guards toggles, the go-live flip is one transaction, and
//! the role upsert only upgrades via its conflict clause.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    Conference, ConferenceId, ContributionTally, Event, EventFilter, EventId, Feature, NewEvent,
    Question, QuestionId, QuestionMark, QuestionView, Reaction, Role, RoleGrant, User, UserId,
};
use crate::repo::Repository;

pub struct PgRepository {
    pool: Pool,
}

impl PgRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

const EVENT_COLUMNS: &str = "id, uid, conference_id, title, stage, start_at, end_at, speaker, live";
const QUESTION_COLUMNS: &str =
    "id, uid, event_id, user_id, question, created_at, selected_at, answered_at, deleted_at";
const USER_COLUMNS: &str = "id, uid, name, blocked, banned_until, created_at";

fn event_from_row(row: &Row) -> Event {
    Event {
        id: row.get(0),
        uid: row.get(1),
        conference_id: row.get(2),
        title: row.get(3),
        stage: row.get(4),
        start: row.get(5),
        end: row.get(6),
        speaker: row.get(7),
        live: row.get(8),
    }
}

fn question_from_row(row: &Row) -> Question {
    Question {
        id: row.get(0),
        uid: row.get(1),
        event_id: row.get(2),
        user_id: row.get(3),
        question: row.get(4),
        created_at: row.get(5),
        selected_at: row.get(6),
        answered_at: row.get(7),
        deleted_at: row.get(8),
    }
}

fn user_from_row(row: &Row) -> User {
    User {
        id: row.get(0),
        uid: row.get(1),
        name: row.get(2),
        blocked: row.get(3),
        banned_until: row.get(4),
        created_at: row.get(5),
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn create_user(&self, name: &str) -> EngineResult<User> {
        let client = self.pool.get().await?;
        let uid = Uuid::now_v7();
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO users (uid, name) VALUES ($1, $2) RETURNING {USER_COLUMNS}"
                ),
                &[&uid, &name],
            )
            .await?;
        Ok(user_from_row(&row))
    }

    async fn user_by_uid(&self, uid: Uuid) -> EngineResult<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE uid = $1"),
                &[&uid],
            )
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn get_user(&self, id: UserId) -> EngineResult<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"),
                &[&id],
            )
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn ban_user(&self, id: UserId, until: Option<DateTime<Utc>>) -> EngineResult<()> {
        let client = self.pool.get().await?;
        let updated = match until {
            Some(expiry) => {
                client
                    .execute(
                        "UPDATE users SET banned_until = $1 WHERE id = $2",
                        &[&expiry, &id],
                    )
                    .await?
            }
            None => {
                client
                    .execute("UPDATE users SET blocked = TRUE WHERE id = $1", &[&id])
                    .await?
            }
        };
        if updated == 0 {
            return Err(EngineError::NotFound("user"));
        }
        Ok(())
    }

    async fn create_conference(
        &self,
        name: &str,
        features: &[Feature],
    ) -> EngineResult<Conference> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let row = tx
            .query_one(
                "INSERT INTO conferences (name) VALUES ($1) RETURNING id",
                &[&name],
            )
            .await?;
        let id: ConferenceId = row.get(0);
        for feature in features {
            tx.execute(
                "INSERT INTO conference_features (conference_id, name) VALUES ($1, $2)
                 ON CONFLICT DO NOTHING",
                &[&id, &feature.as_str()],
            )
            .await?;
        }
        tx.commit().await?;
        Ok(Conference {
            id,
            name: name.to_string(),
            features: features.to_vec(),
        })
    }

    async fn get_conference(&self, id: ConferenceId) -> EngineResult<Option<Conference>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT id, name FROM conferences WHERE id = $1", &[&id])
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let feature_rows = client
            .query(
                "SELECT name FROM conference_features WHERE conference_id = $1",
                &[&id],
            )
            .await?;
        // Flag names are validated here so a typo in the table surfaces as an
        // error instead of a silently-dead capability.
        let features = feature_rows
            .iter()
            .map(|r| r.get::<_, String>(0).parse::<Feature>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(Conference {
            id: row.get(0),
            name: row.get(1),
            features,
        }))
    }

    async fn grant_role(
        &self,
        user_id: UserId,
        conference_id: ConferenceId,
        role: Role,
    ) -> EngineResult<RoleGrant> {
        let client = self.pool.get().await?;
        // Conflict clause compares role rank so a re-grant never downgrades
        client
            .execute(
                "INSERT INTO conference_roles (conference_id, user_id, role)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (conference_id, user_id) DO UPDATE
                 SET role = EXCLUDED.role, granted_at = NOW()
                 WHERE CASE conference_roles.role
                         WHEN 'attendee' THEN 0 WHEN 'speaker' THEN 1 ELSE 2 END
                     < CASE EXCLUDED.role
                         WHEN 'attendee' THEN 0 WHEN 'speaker' THEN 1 ELSE 2 END",
                &[&conference_id, &user_id, &role.as_str()],
            )
            .await?;
        let row = client
            .query_one(
                "SELECT conference_id, user_id, role, granted_at FROM conference_roles
                 WHERE conference_id = $1 AND user_id = $2",
                &[&conference_id, &user_id],
            )
            .await?;
        Ok(RoleGrant {
            conference_id: row.get(0),
            user_id: row.get(1),
            role: row.get::<_, String>(2).parse()?,
            granted_at: row.get(3),
        })
    }

    async fn role_for(
        &self,
        user_id: UserId,
        conference_id: ConferenceId,
    ) -> EngineResult<Option<RoleGrant>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT conference_id, user_id, role, granted_at FROM conference_roles
                 WHERE conference_id = $1 AND user_id = $2",
                &[&conference_id, &user_id],
            )
            .await?;
        row.map(|row| {
            Ok(RoleGrant {
                conference_id: row.get(0),
                user_id: row.get(1),
                role: row.get::<_, String>(2).parse()?,
                granted_at: row.get(3),
            })
        })
        .transpose()
    }

    async fn upsert_events(&self, events: &[NewEvent]) -> EngineResult<Vec<Event>> {
        let client = self.pool.get().await?;
        let mut out = Vec::with_capacity(events.len());
        for new in events {
            // live is deliberately absent from the update set: schedule syncs
            // must not clobber the state machine
            let row = client
                .query_one(
                    &format!(
                        "INSERT INTO events (uid, conference_id, title, stage, start_at, end_at, speaker)
                         VALUES ($1, $2, $3, $4, $5, $6, $7)
                         ON CONFLICT ((LOWER(uid))) DO UPDATE SET
                            conference_id = EXCLUDED.conference_id,
                            title = EXCLUDED.title,
                            stage = EXCLUDED.stage,
                            start_at = EXCLUDED.start_at,
                            end_at = EXCLUDED.end_at,
                            speaker = EXCLUDED.speaker
                         RETURNING {EVENT_COLUMNS}"
                    ),
                    &[
                        &new.uid,
                        &new.conference_id,
                        &new.title,
                        &new.stage,
                        &new.start,
                        &new.end,
                        &new.speaker,
                    ],
                )
                .await?;
            out.push(event_from_row(&row));
        }
        Ok(out)
    }

    async fn event_by_uid(&self, uid: &str) -> EngineResult<Option<Event>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE LOWER(uid) = LOWER($1)"),
                &[&uid],
            )
            .await?;
        Ok(row.as_ref().map(event_from_row))
    }

    async fn get_event(&self, id: EventId) -> EngineResult<Option<Event>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"),
                &[&id],
            )
            .await?;
        Ok(row.as_ref().map(event_from_row))
    }

    async fn list_events(&self, filter: &EventFilter) -> EngineResult<Vec<Event>> {
        let client = self.pool.get().await?;
        let limit = filter.limit.unwrap_or(100) as i64;
        let rows = client
            .query(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM events
                     WHERE ($1::INTEGER IS NULL OR conference_id = $1)
                       AND ($2::TEXT IS NULL OR stage = $2)
                     ORDER BY start_at ASC
                     LIMIT $3"
                ),
                &[&filter.conference_id, &filter.stage, &limit],
            )
            .await?;
        Ok(rows.iter().map(event_from_row).collect())
    }

    async fn set_event_live(&self, id: EventId) -> EngineResult<Event> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let row = tx
            .query_opt(
                &format!(
                    "UPDATE events SET live = TRUE WHERE id = $1 RETURNING {EVENT_COLUMNS}"
                ),
                &[&id],
            )
            .await?
            .ok_or(EngineError::NotFound("event"))?;
        let event = event_from_row(&row);
        tx.execute(
            "UPDATE events SET live = FALSE WHERE stage = $1 AND id <> $2",
            &[&event.stage, &event.id],
        )
        .await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn live_event_for_conference(
        &self,
        conference_id: ConferenceId,
    ) -> EngineResult<Option<Event>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM events
                     WHERE conference_id = $1 AND live = TRUE
                     ORDER BY start_at DESC LIMIT 1"
                ),
                &[&conference_id],
            )
            .await?;
        Ok(row.as_ref().map(event_from_row))
    }

    async fn live_event_for_stage(&self, stage: &str) -> EngineResult<Option<Event>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM events
                     WHERE stage = $1 AND live = TRUE
                     ORDER BY start_at DESC LIMIT 1"
                ),
                &[&stage],
            )
            .await?;
        Ok(row.as_ref().map(event_from_row))
    }

    async fn next_event_for_stage(
        &self,
        stage: &str,
        after: DateTime<Utc>,
    ) -> EngineResult<Option<Event>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM events
                     WHERE stage = $1 AND start_at >= $2
                     ORDER BY start_at ASC LIMIT 1"
                ),
                &[&stage, &after],
            )
            .await?;
        Ok(row.as_ref().map(event_from_row))
    }

    async fn count_participants(&self, event_id: EventId) -> EngineResult<u64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT COUNT(DISTINCT participants.user_id)::BIGINT FROM (
                    SELECT user_id FROM questions WHERE event_id = $1
                    UNION
                    SELECT v.user_id FROM votes v
                    JOIN questions q ON q.id = v.question_id
                    WHERE q.event_id = $1
                 ) participants",
                &[&event_id],
            )
            .await?;
        Ok(row.get::<_, i64>(0) as u64)
    }

    async fn create_question(
        &self,
        event_id: EventId,
        user_id: UserId,
        text: &str,
    ) -> EngineResult<Question> {
        let client = self.pool.get().await?;
        let uid = Uuid::now_v7();
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO questions (uid, event_id, user_id, question)
                     VALUES ($1, $2, $3, $4)
                     RETURNING {QUESTION_COLUMNS}"
                ),
                &[&uid, &event_id, &user_id, &text],
            )
            .await?;
        Ok(question_from_row(&row))
    }

    async fn question_by_uid(&self, uid: Uuid) -> EngineResult<Option<Question>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE uid = $1"),
                &[&uid],
            )
            .await?;
        Ok(row.as_ref().map(question_from_row))
    }

    async fn questions_with_votes(
        &self,
        event_id: EventId,
        answered: Option<bool>,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<QuestionView>> {
        let client = self.pool.get().await?;
        // Ban state is applied at read time, for both authors and voters
        let rows = client
            .query(
                "SELECT q.id, q.uid, q.event_id, q.user_id, q.question, q.created_at,
                        q.selected_at, q.answered_at, q.deleted_at,
                        u.name,
                        (SELECT COUNT(*)::BIGINT FROM votes v
                         JOIN users vu ON vu.id = v.user_id
                         WHERE v.question_id = q.id
                           AND NOT vu.blocked
                           AND (vu.banned_until IS NULL OR vu.banned_until <= $2)) AS votes
                 FROM questions q
                 JOIN users u ON u.id = q.user_id
                 WHERE q.event_id = $1
                   AND q.deleted_at IS NULL
                   AND NOT u.blocked
                   AND (u.banned_until IS NULL OR u.banned_until <= $2)
                   AND ($3::BOOLEAN IS NULL OR (q.answered_at IS NOT NULL) = $3)",
                &[&event_id, &now, &answered],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| QuestionView {
                question: question_from_row(row),
                author_name: row.get(9),
                votes: row.get::<_, i64>(10) as u64,
            })
            .collect())
    }

    async fn mark_question(&self, id: QuestionId, mark: QuestionMark) -> EngineResult<Question> {
        let client = self.pool.get().await?;
        let column = match mark {
            QuestionMark::Selected => "selected_at",
            QuestionMark::Answered => "answered_at",
            QuestionMark::Deleted => "deleted_at",
        };
        let row = client
            .query_opt(
                &format!(
                    "UPDATE questions SET {column} = NOW() WHERE id = $1
                     RETURNING {QUESTION_COLUMNS}"
                ),
                &[&id],
            )
            .await?
            .ok_or(EngineError::NotFound("question"))?;
        Ok(question_from_row(&row))
    }

    async fn question_count_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> EngineResult<u64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT COUNT(*)::BIGINT FROM questions WHERE user_id = $1 AND created_at > $2",
                &[&user_id, &since],
            )
            .await?;
        Ok(row.get::<_, i64>(0) as u64)
    }

    async fn question_count_for_event(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> EngineResult<u64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT COUNT(*)::BIGINT FROM questions WHERE user_id = $1 AND event_id = $2",
                &[&user_id, &event_id],
            )
            .await?;
        Ok(row.get::<_, i64>(0) as u64)
    }

    async fn toggle_vote(
        &self,
        question_id: QuestionId,
        user_id: UserId,
        event_id: EventId,
    ) -> EngineResult<bool> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        // The pk makes the insert the linearization point: of two concurrent
        // toggles for the same pair, exactly one inserts and the other falls
        // through to the delete branch.
        let inserted = tx
            .execute(
                "INSERT INTO votes (question_id, user_id) VALUES ($1, $2)
                 ON CONFLICT (question_id, user_id) DO NOTHING",
                &[&question_id, &user_id],
            )
            .await?;
        let voted = if inserted == 1 {
            true
        } else {
            tx.execute(
                "DELETE FROM votes WHERE question_id = $1 AND user_id = $2",
                &[&question_id, &user_id],
            )
            .await?;
            false
        };
        tx.execute(
            "INSERT INTO vote_activity (user_id, event_id) VALUES ($1, $2)",
            &[&user_id, &event_id],
        )
        .await?;
        tx.commit().await?;
        Ok(voted)
    }

    async fn vote_count(&self, question_id: QuestionId) -> EngineResult<u64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT COUNT(*)::BIGINT FROM votes WHERE question_id = $1",
                &[&question_id],
            )
            .await?;
        Ok(row.get::<_, i64>(0) as u64)
    }

    async fn vote_toggle_count_since(
        &self,
        user_id: UserId,
        event_id: EventId,
        since: DateTime<Utc>,
    ) -> EngineResult<u64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT COUNT(*)::BIGINT FROM vote_activity
                 WHERE user_id = $1 AND event_id = $2 AND created_at > $3",
                &[&user_id, &event_id, &since],
            )
            .await?;
        Ok(row.get::<_, i64>(0) as u64)
    }

    async fn create_reaction(
        &self,
        uid: &str,
        event_id: EventId,
        user_id: UserId,
    ) -> EngineResult<Reaction> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "INSERT INTO reactions (uid, event_id, user_id) VALUES ($1, $2, $3)
                 RETURNING uid, event_id, user_id, created_at",
                &[&uid, &event_id, &user_id],
            )
            .await?;
        Ok(Reaction {
            uid: row.get(0),
            event_id: row.get(1),
            user_id: row.get(2),
            created_at: row.get(3),
        })
    }

    async fn reaction_count_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> EngineResult<u64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT COUNT(*)::BIGINT FROM reactions WHERE user_id = $1 AND created_at > $2",
                &[&user_id, &since],
            )
            .await?;
        Ok(row.get::<_, i64>(0) as u64)
    }

    async fn contribution_tallies(&self) -> EngineResult<Vec<ContributionTally>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT u.id, u.uid, u.name,
                        COUNT(q.id) FILTER (WHERE q.answered_at IS NOT NULL)::BIGINT AS answered,
                        COALESCE(SUM(
                            (SELECT COUNT(*) FROM votes v WHERE v.question_id = q.id)
                        ), 0)::BIGINT AS received
                 FROM users u
                 LEFT JOIN questions q ON q.user_id = u.id AND q.deleted_at IS NULL
                 GROUP BY u.id, u.uid, u.name",
                &[],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| ContributionTally {
                user_id: row.get(0),
                user_uid: row.get(1),
                name: row.get(2),
                answered_questions: row.get::<_, i64>(3) as u64,
                received_votes: row.get::<_, i64>(4) as u64,
            })
            .collect())
    }
}
