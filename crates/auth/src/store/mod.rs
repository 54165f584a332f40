//! Credential and session persistence seams.
//!
//! [`UserStore`] and [`SessionStore`] are the only way the session manager
//! and auth service reach durable state. [`PgStore`] backs them with
//! PostgreSQL through the `greenhouse-db` repositories; [`MemoryStore`]
//! keeps everything in process for tests and local development.

mod memory;
mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use greenhouse_core::error::CoreError;
use greenhouse_core::types::{DbId, Timestamp};
use greenhouse_db::models::session::{
    CreateSession, RotateRefreshToken, Session, SessionKeys, SessionWithUser,
};
use greenhouse_db::models::user::{CreateUser, User};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Constraint names shared by the schema and [`MemoryStore`].
pub mod constraints {
    pub const USERNAME: &str = "uq_users_username";
    pub const EMAIL: &str = "uq_users_email";
    pub const SESSION_TOKEN: &str = "uq_sessions_session_token";
    pub const REFRESH_TOKEN: &str = "uq_sessions_refresh_token";
    pub const SESSION_USER: &str = "fk_sessions_user_id";
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A referenced row does not exist.
    #[error("Foreign key violated: {0}")]
    ForeignKeyViolation(String),

    /// The operation did not finish within the configured store timeout.
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// The backing store cannot be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(constraint) = greenhouse_db::unique_violation(&err) {
            return StoreError::UniqueViolation(constraint);
        }
        match err {
            sqlx::Error::PoolTimedOut => StoreError::Unavailable("connection pool timed out".into()),
            sqlx::Error::Database(ref db_err) if db_err.code().as_deref() == Some("23503") => {
                StoreError::ForeignKeyViolation(
                    db_err.constraint().unwrap_or(constraints::SESSION_USER).to_string(),
                )
            }
            other => StoreError::Database(other),
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(c) if c == constraints::USERNAME => {
                CoreError::Conflict("Username already exists".into())
            }
            StoreError::UniqueViolation(c) if c == constraints::EMAIL => {
                CoreError::Conflict("Email already exists".into())
            }
            other => CoreError::Internal(other.to_string()),
        }
    }
}

/// Durable user credentials.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, input: &CreateUser) -> Result<User, StoreError>;

    async fn find_user_by_id(&self, id: DbId) -> Result<Option<User>, StoreError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Any user holding the username or the email; a username match wins.
    async fn find_user_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Stamp `last_login_at`. Returns the updated user, `None` if it is gone.
    async fn record_login(&self, id: DbId) -> Result<Option<User>, StoreError>;

    /// Returns `false` if the user no longer exists.
    async fn update_password(&self, id: DbId, password_hash: &str) -> Result<bool, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// The durable source of truth for sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, input: &CreateSession) -> Result<SessionWithUser, StoreError>;

    async fn find_by_session_token(
        &self,
        session_token: &str,
    ) -> Result<Option<SessionWithUser>, StoreError>;

    async fn find_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<SessionWithUser>, StoreError>;

    /// Conditional rotation. `None` means another caller rotated, deleted or
    /// deactivated the session first.
    async fn rotate_refresh_token(
        &self,
        input: &RotateRefreshToken,
    ) -> Result<Option<SessionWithUser>, StoreError>;

    async fn touch(&self, session_token: &str) -> Result<bool, StoreError>;

    async fn delete_by_session_token(
        &self,
        session_token: &str,
    ) -> Result<Option<SessionKeys>, StoreError>;

    async fn delete_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<SessionKeys>, StoreError>;

    async fn delete_for_user(&self, user_id: DbId) -> Result<Vec<SessionKeys>, StoreError>;

    /// Delete every session with `expires_at <= now`.
    async fn delete_expired(&self, now: Timestamp) -> Result<Vec<SessionKeys>, StoreError>;

    async fn list_active_for_user(
        &self,
        user_id: DbId,
        now: Timestamp,
    ) -> Result<Vec<Session>, StoreError>;
}
