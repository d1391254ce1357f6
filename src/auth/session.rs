use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::db::models::Session;
use crate::db::repository::{RepositoryError, SessionRepository};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("secure random source failed: {0}")]
    Random(#[from] rand::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Generate an opaque session token: 128 bits from the OS random source,
/// formatted as a UUID v4 string.
pub fn create_token() -> Result<String, SessionError> {
    let mut bytes = [0u8; 16];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(uuid::Builder::from_random_bytes(bytes)
        .into_uuid()
        .to_string())
}

/// Issues, resolves and revokes sessions. Holds no state of its own; every
/// call goes to the repository.
#[derive(Clone)]
pub struct SessionManager {
    repo: Arc<dyn SessionRepository>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(repo: Arc<dyn SessionRepository>, ttl: Duration) -> Self {
        Self { repo, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create and persist a session for a user. Returns the session token.
    pub async fn issue_session(&self, user_id: i64) -> Result<String, SessionError> {
        self.issue_session_at(user_id, Utc::now()).await
    }

    pub async fn issue_session_at(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<String, SessionError> {
        let token = create_token()?;

        self.repo
            .insert_session(&Session {
                token: token.clone(),
                user_id,
                created_at: now,
                expires_at: now + self.ttl,
            })
            .await?;

        tracing::debug!(user_id, "Issued session");
        Ok(token)
    }

    /// Look up the user behind a token. Unknown, expired and unreadable
    /// sessions all come back as `None`.
    pub async fn resolve_session(&self, token: &str) -> Option<i64> {
        self.resolve_session_at(token, Utc::now()).await
    }

    pub async fn resolve_session_at(&self, token: &str, now: DateTime<Utc>) -> Option<i64> {
        match self.repo.find_session(token).await {
            Ok(Some(session)) if !session.is_expired(now) => Some(session.user_id),
            Ok(Some(session)) => {
                tracing::debug!(user_id = session.user_id, "Rejected expired session");
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Session lookup failed: {}", e);
                None
            }
        }
    }

    /// Delete a session. Deleting an unknown token is not an error.
    pub async fn invalidate(&self, token: &str) -> Result<(), SessionError> {
        if self.repo.delete_session(token).await? {
            tracing::debug!("Invalidated session");
        }
        Ok(())
    }

    /// Remove every session whose expiry has passed.
    pub async fn purge_expired(&self) -> Result<u64, SessionError> {
        let purged = self.repo.purge_expired_sessions(Utc::now()).await?;
        if purged > 0 {
            tracing::info!("Purged {} expired sessions", purged);
        }
        Ok(purged)
    }
}
