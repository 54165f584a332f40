//! Repository for the `sessions` table.
//!
//! Reads return [`SessionWithUser`] so callers get the owner's username and
//! email without a second query. Deletes use `RETURNING` so the caller learns
//! exactly which tokens disappeared and can purge their cache keys.

use greenhouse_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::session::{
    CreateSession, RotateRefreshToken, Session, SessionKeys, SessionWithUser,
};

/// Session columns qualified with the `s` alias.
const SESSION_COLUMNS: &str = "s.id, s.user_id, s.session_token, s.refresh_token, s.expires_at, \
                               s.ip_address, s.user_agent, s.is_active, s.last_activity_at, \
                               s.created_at, s.updated_at";

/// Session columns plus the owner's public identity.
const JOINED_COLUMNS: &str = "s.id, s.user_id, s.session_token, s.refresh_token, s.expires_at, \
                              s.ip_address, s.user_agent, s.is_active, s.last_activity_at, \
                              s.created_at, s.updated_at, u.username, u.email";

/// Token pair returned by deletes.
const KEY_COLUMNS: &str = "session_token, refresh_token";

/// Provides the session-store operations.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a new session, returning it joined with its owner.
    pub async fn create(
        pool: &PgPool,
        input: &CreateSession,
    ) -> Result<SessionWithUser, sqlx::Error> {
        let query = format!(
            "WITH s AS (
                 INSERT INTO sessions
                     (user_id, session_token, refresh_token, expires_at, ip_address, user_agent)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING *
             )
             SELECT {JOINED_COLUMNS} FROM s JOIN users u ON u.id = s.user_id"
        );
        sqlx::query_as::<_, SessionWithUser>(&query)
            .bind(input.user_id)
            .bind(&input.session_token)
            .bind(&input.refresh_token)
            .bind(input.expires_at)
            .bind(&input.client.ip_address)
            .bind(&input.client.user_agent)
            .fetch_one(pool)
            .await
    }

    /// Find a session by its session token, regardless of state.
    pub async fn find_by_session_token(
        pool: &PgPool,
        session_token: &str,
    ) -> Result<Option<SessionWithUser>, sqlx::Error> {
        let query = format!(
            "SELECT {JOINED_COLUMNS} FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.session_token = $1"
        );
        sqlx::query_as::<_, SessionWithUser>(&query)
            .bind(session_token)
            .fetch_optional(pool)
            .await
    }

    /// Find a session by its current refresh token, regardless of state.
    pub async fn find_by_refresh_token(
        pool: &PgPool,
        refresh_token: &str,
    ) -> Result<Option<SessionWithUser>, sqlx::Error> {
        let query = format!(
            "SELECT {JOINED_COLUMNS} FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.refresh_token = $1"
        );
        sqlx::query_as::<_, SessionWithUser>(&query)
            .bind(refresh_token)
            .fetch_optional(pool)
            .await
    }

    /// Replace the refresh token and expiry, conditioned on the current
    /// refresh token still matching.
    ///
    /// Returns `None` when the condition fails (already rotated, deleted, or
    /// deactivated). Client metadata is only overwritten when supplied.
    pub async fn rotate_refresh_token(
        pool: &PgPool,
        input: &RotateRefreshToken,
    ) -> Result<Option<SessionWithUser>, sqlx::Error> {
        let query = format!(
            "WITH s AS (
                 UPDATE sessions SET
                     refresh_token = $3,
                     expires_at = $4,
                     last_activity_at = NOW(),
                     ip_address = COALESCE($5, ip_address),
                     user_agent = COALESCE($6, user_agent)
                 WHERE id = $1 AND refresh_token = $2 AND is_active = true
                 RETURNING *
             )
             SELECT {JOINED_COLUMNS} FROM s JOIN users u ON u.id = s.user_id"
        );
        sqlx::query_as::<_, SessionWithUser>(&query)
            .bind(input.id)
            .bind(&input.current_refresh_token)
            .bind(&input.new_refresh_token)
            .bind(input.expires_at)
            .bind(&input.client.ip_address)
            .bind(&input.client.user_agent)
            .fetch_optional(pool)
            .await
    }

    /// Bump `last_activity_at`. Returns `true` if the session still exists.
    pub async fn touch(pool: &PgPool, session_token: &str) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE sessions SET last_activity_at = NOW() WHERE session_token = $1")
                .bind(session_token)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete one session by session token.
    pub async fn delete_by_session_token(
        pool: &PgPool,
        session_token: &str,
    ) -> Result<Option<SessionKeys>, sqlx::Error> {
        let query =
            format!("DELETE FROM sessions WHERE session_token = $1 RETURNING {KEY_COLUMNS}");
        sqlx::query_as::<_, SessionKeys>(&query)
            .bind(session_token)
            .fetch_optional(pool)
            .await
    }

    /// Delete one session by refresh token.
    pub async fn delete_by_refresh_token(
        pool: &PgPool,
        refresh_token: &str,
    ) -> Result<Option<SessionKeys>, sqlx::Error> {
        let query =
            format!("DELETE FROM sessions WHERE refresh_token = $1 RETURNING {KEY_COLUMNS}");
        sqlx::query_as::<_, SessionKeys>(&query)
            .bind(refresh_token)
            .fetch_optional(pool)
            .await
    }

    /// Delete every session owned by a user.
    pub async fn delete_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<SessionKeys>, sqlx::Error> {
        let query = format!("DELETE FROM sessions WHERE user_id = $1 RETURNING {KEY_COLUMNS}");
        sqlx::query_as::<_, SessionKeys>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Delete every session with `expires_at <= now`.
    pub async fn delete_expired(
        pool: &PgPool,
        now: Timestamp,
    ) -> Result<Vec<SessionKeys>, sqlx::Error> {
        let query = format!("DELETE FROM sessions WHERE expires_at <= $1 RETURNING {KEY_COLUMNS}");
        sqlx::query_as::<_, SessionKeys>(&query)
            .bind(now)
            .fetch_all(pool)
            .await
    }

    /// List a user's active, unexpired sessions, most recently used first.
    pub async fn list_active_for_user(
        pool: &PgPool,
        user_id: DbId,
        now: Timestamp,
    ) -> Result<Vec<Session>, sqlx::Error> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions s
             WHERE s.user_id = $1 AND s.is_active = true AND s.expires_at > $2
             ORDER BY s.last_activity_at DESC"
        );
        sqlx::query_as::<_, Session>(&query)
            .bind(user_id)
            .bind(now)
            .fetch_all(pool)
            .await
    }
}
