// Repository traits isolate storage side effects from the session and reaction logic.
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension};
use thiserror::Error;

use crate::db::models::{Reaction, Session, TargetType};
use crate::state::DbPool;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert_session(&self, session: &Session) -> Result<(), RepositoryError>;

    async fn find_session(&self, token: &str) -> Result<Option<Session>, RepositoryError>;

    /// Returns whether a row was actually removed.
    async fn delete_session(&self, token: &str) -> Result<bool, RepositoryError>;

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait ReactionRepository: Send + Sync {
    /// Insert the reaction or overwrite `is_like`/`created_at` of the existing
    /// row for the same (user, target, type) in a single statement.
    async fn upsert_reaction(
        &self,
        user_id: i64,
        target_id: i64,
        target_type: TargetType,
        is_like: bool,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn find_reaction(
        &self,
        user_id: i64,
        target_id: i64,
        target_type: TargetType,
    ) -> Result<Option<Reaction>, RepositoryError>;

    async fn count_reactions(
        &self,
        target_id: i64,
        target_type: TargetType,
        is_like: bool,
    ) -> Result<i64, RepositoryError>;
}

/// Timestamps are stored as fixed-width RFC 3339 UTC strings so that
/// lexicographic order in SQL matches chronological order.
pub fn encode_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_time(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Corrupt(format!("bad timestamp {:?}: {}", s, e)))
}

/// SQLite implementation over the shared connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for SqliteStore {
    async fn insert_session(&self, session: &Session) -> Result<(), RepositoryError> {
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT INTO sessions (user_id, session_token, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.user_id,
                session.token,
                encode_time(session.created_at),
                encode_time(session.expires_at),
            ],
        )?;

        Ok(())
    }

    async fn find_session(&self, token: &str) -> Result<Option<Session>, RepositoryError> {
        let conn = self.pool.get()?;

        let row: Option<(i64, String, String)> = conn
            .query_row(
                "SELECT user_id, created_at, expires_at FROM sessions WHERE session_token = ?1",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match row {
            Some((user_id, created_at, expires_at)) => Ok(Some(Session {
                token: token.to_string(),
                user_id,
                created_at: decode_time(&created_at)?,
                expires_at: decode_time(&expires_at)?,
            })),
            None => Ok(None),
        }
    }

    async fn delete_session(&self, token: &str) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;

        let rows = conn.execute(
            "DELETE FROM sessions WHERE session_token = ?1",
            params![token],
        )?;

        Ok(rows > 0)
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let conn = self.pool.get()?;

        let rows = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![encode_time(now)],
        )?;

        Ok(rows as u64)
    }
}

#[async_trait]
impl ReactionRepository for SqliteStore {
    async fn upsert_reaction(
        &self,
        user_id: i64,
        target_id: i64,
        target_type: TargetType,
        is_like: bool,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT INTO likes_dislikes (user_id, target_id, target_type, is_like, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id, target_id, target_type) DO UPDATE SET
               is_like = excluded.is_like,
               created_at = excluded.created_at",
            params![
                user_id,
                target_id,
                target_type.as_str(),
                is_like,
                encode_time(at)
            ],
        )?;

        Ok(())
    }

    async fn find_reaction(
        &self,
        user_id: i64,
        target_id: i64,
        target_type: TargetType,
    ) -> Result<Option<Reaction>, RepositoryError> {
        let conn = self.pool.get()?;

        let row: Option<(i64, bool, String)> = conn
            .query_row(
                "SELECT id, is_like, created_at FROM likes_dislikes
                 WHERE user_id = ?1 AND target_id = ?2 AND target_type = ?3",
                params![user_id, target_id, target_type.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match row {
            Some((id, is_like, created_at)) => Ok(Some(Reaction {
                id,
                user_id,
                target_id,
                target_type,
                is_like,
                created_at: decode_time(&created_at)?,
            })),
            None => Ok(None),
        }
    }

    async fn count_reactions(
        &self,
        target_id: i64,
        target_type: TargetType,
        is_like: bool,
    ) -> Result<i64, RepositoryError> {
        let conn = self.pool.get()?;

        let count = conn.query_row(
            "SELECT COUNT(*) FROM likes_dislikes
             WHERE target_id = ?1 AND target_type = ?2 AND is_like = ?3",
            params![target_id, target_type.as_str(), is_like],
            |row| row.get(0),
        )?;

        Ok(count)
    }
}
