//! Session model and DTOs.

use greenhouse_core::identity::UserIdentity;
use greenhouse_core::types::{ClientInfo, DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A session row from the `sessions` table.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: DbId,
    pub user_id: DbId,
    pub session_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Timestamp,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub is_active: bool,
    pub last_activity_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Session {
    /// Active and not yet expired at `now`.
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        self.is_active && now < self.expires_at
    }

    pub fn client_info(&self) -> ClientInfo {
        ClientInfo {
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn keys(&self) -> SessionKeys {
        SessionKeys {
            session_token: self.session_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

/// A session joined with the owning user's public identity.
#[derive(Debug, Clone, FromRow)]
pub struct SessionWithUser {
    #[sqlx(flatten)]
    pub session: Session,
    pub username: String,
    pub email: String,
}

impl SessionWithUser {
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            id: self.session.user_id,
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

/// The tokens of a deleted session, returned so cache entries can be purged.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SessionKeys {
    pub session_token: String,
    pub refresh_token: Option<String>,
}

/// DTO for creating a new session.
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub user_id: DbId,
    pub session_token: String,
    pub refresh_token: String,
    pub expires_at: Timestamp,
    pub client: ClientInfo,
}

/// DTO for rotating a session's refresh token.
///
/// The update only applies while the stored refresh token still equals
/// `current_refresh_token`, so of two concurrent rotations exactly one wins.
#[derive(Debug, Clone)]
pub struct RotateRefreshToken {
    pub id: DbId,
    pub current_refresh_token: String,
    pub new_refresh_token: String,
    pub expires_at: Timestamp,
    pub client: ClientInfo,
}

/// Public listing entry for `GET /auth/sessions`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: DbId,
    pub session_token: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub last_activity_at: Timestamp,
    pub expires_at: Timestamp,
    pub created_at: Timestamp,
    /// Whether this is the session making the listing request.
    pub is_current: bool,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id,
            session_token: s.session_token.clone(),
            ip_address: s.ip_address.clone(),
            user_agent: s.user_agent.clone(),
            last_activity_at: s.last_activity_at,
            expires_at: s.expires_at,
            created_at: s.created_at,
            is_current: false,
        }
    }
}
