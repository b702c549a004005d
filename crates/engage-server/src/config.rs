//! Engine configuration
//!
//! All tunables are carried in an explicit struct handed to `Engine::new`;
//! nothing reads the environment after startup.

use chrono::Duration;

/// Admission-control thresholds and moderation settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Questions a user may create within the trailing 60s window.
    pub max_questions_per_interval: u64,
    /// Lifetime question cap per user per event.
    pub max_questions_per_event: u64,
    /// Vote toggles (up or un) per user per event within the trailing 60s.
    pub max_votes_per_event: u64,
    /// Reactions per user within the trailing 30s window.
    pub max_reactions_per_interval: u64,
    /// Maximum question length in characters.
    pub max_chars_per_question: usize,
    /// Ban duration applied by `block_user`. `None` means a permanent block
    /// flag instead of an expiring ban.
    pub ban_hours: Option<u64>,
}

impl EngineConfig {
    pub fn question_window(&self) -> Duration {
        Duration::seconds(60)
    }

    pub fn vote_window(&self) -> Duration {
        Duration::seconds(60)
    }

    pub fn reaction_window(&self) -> Duration {
        Duration::seconds(30)
    }

    pub fn ban_duration(&self) -> Option<Duration> {
        self.ban_hours.map(|h| Duration::hours(h as i64))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_questions_per_interval: 3,
            max_questions_per_event: 10,
            max_votes_per_event: 20,
            max_reactions_per_interval: 5,
            max_chars_per_question: 200,
            ban_hours: Some(24),
        }
    }
}
