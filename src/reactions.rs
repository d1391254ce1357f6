use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::db::models::{Reaction, TargetType};
use crate::db::repository::{ReactionRepository, RepositoryError};

/// Aggregate view of one target's reactions, plus the viewer's own vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionSummary {
    pub target_id: i64,
    pub target_type: TargetType,
    pub likes: i64,
    pub dislikes: i64,
    /// `Some(true)` liked, `Some(false)` disliked, `None` no reaction or anonymous.
    pub mine: Option<bool>,
}

/// One like or dislike per (user, target). Counts are recomputed on every
/// call; nothing is cached.
#[derive(Clone)]
pub struct ReactionLedger {
    repo: Arc<dyn ReactionRepository>,
}

impl ReactionLedger {
    pub fn new(repo: Arc<dyn ReactionRepository>) -> Self {
        Self { repo }
    }

    /// Record a reaction, replacing any earlier one by the same user on the
    /// same target. Repeating the same value is a no-op apart from the timestamp.
    pub async fn upsert(
        &self,
        user_id: i64,
        target_id: i64,
        target_type: TargetType,
        is_like: bool,
    ) -> Result<(), RepositoryError> {
        self.repo
            .upsert_reaction(user_id, target_id, target_type, is_like, Utc::now())
            .await?;

        tracing::debug!(
            user_id,
            target_id,
            target_type = %target_type,
            is_like,
            "Recorded reaction"
        );
        Ok(())
    }

    pub async fn count_likes(
        &self,
        target_id: i64,
        target_type: TargetType,
    ) -> Result<i64, RepositoryError> {
        self.repo.count_reactions(target_id, target_type, true).await
    }

    pub async fn count_dislikes(
        &self,
        target_id: i64,
        target_type: TargetType,
    ) -> Result<i64, RepositoryError> {
        self.repo.count_reactions(target_id, target_type, false).await
    }

    pub async fn find(
        &self,
        user_id: i64,
        target_id: i64,
        target_type: TargetType,
    ) -> Result<Option<Reaction>, RepositoryError> {
        self.repo.find_reaction(user_id, target_id, target_type).await
    }

    pub async fn summary(
        &self,
        target_id: i64,
        target_type: TargetType,
        viewer: Option<i64>,
    ) -> Result<ReactionSummary, RepositoryError> {
        let likes = self.count_likes(target_id, target_type).await?;
        let dislikes = self.count_dislikes(target_id, target_type).await?;
        let mine = match viewer {
            Some(user_id) => self
                .find(user_id, target_id, target_type)
                .await?
                .map(|r| r.is_like),
            None => None,
        };

        Ok(ReactionSummary {
            target_id,
            target_type,
            likes,
            dislikes,
            mine,
        })
    }
}
