//! Moderation authorization
//!
//! Every privileged operation names its action and the venue it acts within;
//! the check is the same for all of them: an explicit organizer grant for
//! that venue. Speaker grants do not moderate, and organizer status on one
//! venue confers nothing on another.

use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::models::{ConferenceId, Role, UserId};
use crate::repo::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationAction {
    SelectQuestion,
    MarkAnswered,
    RemoveQuestion,
    BlockUser,
    GoLive,
    GrantRole,
}

impl ModerationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationAction::SelectQuestion => "select_question",
            ModerationAction::MarkAnswered => "mark_answered",
            ModerationAction::RemoveQuestion => "remove_question",
            ModerationAction::BlockUser => "block_user",
            ModerationAction::GoLive => "go_live",
            ModerationAction::GrantRole => "grant_role",
        }
    }
}

/// Require an organizer grant on the venue. Absent grant and insufficient
/// grant are the same denial; callers never learn which.
pub async fn require_organizer(
    repo: &dyn Repository,
    user_id: UserId,
    conference_id: ConferenceId,
    action: ModerationAction,
) -> EngineResult<()> {
    let grant = repo.role_for(user_id, conference_id).await?;
    match grant {
        Some(grant) if grant.role == Role::Organizer => Ok(()),
        _ => {
            warn!(
                user_id,
                conference_id,
                action = action.as_str(),
                "moderation denied"
            );
            Err(EngineError::not_organizer())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::memory::MemoryRepository;

    #[tokio::test]
    async fn speaker_grant_does_not_moderate() {
        let repo = MemoryRepository::new();
        let conference = repo.create_conference("conf", &[]).await.unwrap();
        let user = repo.create_user("speaker").await.unwrap();
        repo.grant_role(user.id, conference.id, Role::Speaker)
            .await
            .unwrap();

        let denied = require_organizer(
            &repo,
            user.id,
            conference.id,
            ModerationAction::RemoveQuestion,
        )
        .await;
        assert!(matches!(denied, Err(EngineError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn organizer_grant_is_venue_scoped() {
        let repo = MemoryRepository::new();
        let home = repo.create_conference("home", &[]).await.unwrap();
        let other = repo.create_conference("other", &[]).await.unwrap();
        let user = repo.create_user("org").await.unwrap();
        repo.grant_role(user.id, home.id, Role::Organizer)
            .await
            .unwrap();

        require_organizer(&repo, user.id, home.id, ModerationAction::GoLive)
            .await
            .unwrap();
        let denied =
            require_organizer(&repo, user.id, other.id, ModerationAction::GoLive).await;
        assert!(matches!(denied, Err(EngineError::Forbidden { .. })));
    }
}
