//! Database schema and migrations

use anyhow::Result;
use deadpool_postgres::Object;
use tracing::info;

pub async fn run_migrations(client: &Object) -> Result<()> {
    client.batch_execute(SCHEMA_SQL).await?;
    info!("Database migrations applied");
    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Engagement Engine Database Schema

-- Venues
CREATE TABLE IF NOT EXISTS conferences (
    id SERIAL PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Per-venue capability flags (names validated in code at load time)
CREATE TABLE IF NOT EXISTS conference_features (
    conference_id INTEGER NOT NULL REFERENCES conferences(id) ON DELETE CASCADE,
    name VARCHAR(64) NOT NULL,
    PRIMARY KEY (conference_id, name)
);

-- Principals. Ban state lives here: blocked is permanent, banned_until is a
-- finite expiry.
CREATE TABLE IF NOT EXISTS users (
    id SERIAL PRIMARY KEY,
    uid UUID NOT NULL UNIQUE,
    name VARCHAR(128) NOT NULL,
    blocked BOOLEAN NOT NULL DEFAULT FALSE,
    banned_until TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- One role per (conference, user); upgrades only, enforced in the upsert
CREATE TABLE IF NOT EXISTS conference_roles (
    conference_id INTEGER NOT NULL REFERENCES conferences(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    role VARCHAR(32) NOT NULL,
    granted_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (conference_id, user_id)
);

-- Track-bound sessions. live flips only through the go-live transition.
CREATE TABLE IF NOT EXISTS events (
    id SERIAL PRIMARY KEY,
    uid TEXT NOT NULL,
    conference_id INTEGER NOT NULL REFERENCES conferences(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    stage TEXT NOT NULL,
    start_at TIMESTAMPTZ NOT NULL,
    end_at TIMESTAMPTZ NOT NULL,
    speaker TEXT,
    live BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Case-insensitive uniqueness for external uids; also the upsert target
CREATE UNIQUE INDEX IF NOT EXISTS idx_events_uid_lower ON events(LOWER(uid));
CREATE INDEX IF NOT EXISTS idx_events_stage ON events(stage);
CREATE INDEX IF NOT EXISTS idx_events_conference ON events(conference_id);

CREATE TABLE IF NOT EXISTS questions (
    id SERIAL PRIMARY KEY,
    uid UUID NOT NULL UNIQUE,
    event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    question TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    selected_at TIMESTAMPTZ,
    answered_at TIMESTAMPTZ,
    deleted_at TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS idx_questions_event ON questions(event_id);
CREATE INDEX IF NOT EXISTS idx_questions_user ON questions(user_id);
CREATE INDEX IF NOT EXISTS idx_questions_created ON questions(created_at DESC);

-- Vote membership. The primary key is the toggle atomicity mechanism: two
-- concurrent inserts for the same pair cannot both succeed.
CREATE TABLE IF NOT EXISTS votes (
    question_id INTEGER NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (question_id, user_id)
);

-- One row per toggle operation (up or un); feeds the vote rate limit window
CREATE TABLE IF NOT EXISTS vote_activity (
    id BIGSERIAL PRIMARY KEY,
    user_id INTEGER NOT NULL,
    event_id INTEGER NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_vote_activity_user ON vote_activity(user_id, event_id, created_at);

CREATE TABLE IF NOT EXISTS reactions (
    id BIGSERIAL PRIMARY KEY,
    uid TEXT NOT NULL,
    event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_reactions_user ON reactions(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_reactions_event ON reactions(event_id);
"#;
