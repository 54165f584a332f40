//! Authentication flows: register, login, refresh, validate, logout, and
//! credential management.
//!
//! Every operation returns [`CoreError`]; the HTTP layer decides status codes.

use std::sync::Arc;

use greenhouse_core::error::CoreError;
use greenhouse_core::identity::UserIdentity;
use greenhouse_core::types::{ClientInfo, DbId, Timestamp};
use greenhouse_core::validation::{check_login, check_new_password, RegisterInput};
use greenhouse_db::models::session::SessionSummary;
use greenhouse_db::models::user::{CreateUser, User, UserResponse};

use crate::auth::jwt::{generate_access_token, validate_token, JwtConfig, TokenError};
use crate::auth::password::{hash_password, verify_against_dummy, verify_password};
use crate::session::{SessionManager, SessionView};
use crate::store::UserStore;

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub access_token: String,
    pub session_token: String,
    pub refresh_token: String,
    /// Session expiry.
    pub expires_at: Timestamp,
    pub user: UserResponse,
}

/// Result of a successful refresh.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub access_token: String,
    pub session_token: String,
    pub refresh_token: String,
    pub expires_at: Timestamp,
    pub user: UserIdentity,
}

/// Identity established by [`AuthService::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated {
    pub user: UserIdentity,
    /// Session expiry when a session token was checked, else token expiry.
    pub expires_at: Timestamp,
    pub session_token: Option<String>,
}

pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: Arc<SessionManager>,
    jwt: JwtConfig,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, sessions: Arc<SessionManager>, jwt: JwtConfig) -> Self {
        Self {
            users,
            sessions,
            jwt,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn users(&self) -> &dyn UserStore {
        self.users.as_ref()
    }

    /// Create an account. New users are active and unverified.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserResponse, CoreError> {
        let input = RegisterInput::normalized(username, email, password);
        input.check()?;

        if let Some(existing) = self
            .users
            .find_user_by_username_or_email(&input.username, &input.email)
            .await?
        {
            let message = if existing.username == input.username {
                "Username already exists"
            } else {
                "Email already exists"
            };
            return Err(CoreError::Conflict(message.into()));
        }

        let password_hash = hash_blocking(input.password.clone()).await?;
        let user = self
            .users
            .create_user(&CreateUser {
                username: input.username,
                email: input.email,
                password_hash,
            })
            .await?;

        tracing::info!(user_id = user.id, username = %user.username, "User registered");
        Ok(UserResponse::from(&user))
    }

    /// Authenticate by username and password and open a new session.
    ///
    /// Unknown user, inactive user, and wrong password all produce the same
    /// `Unauthorized("Invalid credentials")`.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        client: ClientInfo,
    ) -> Result<LoginOutcome, CoreError> {
        check_login(username, password)?;

        let Some(user) = self.users.find_user_by_username(username.trim()).await? else {
            dummy_verify_blocking(password.to_string()).await;
            tracing::debug!("Login failed: unknown username");
            return Err(CoreError::invalid_credentials());
        };

        let password_ok = verify_blocking(password.to_string(), user.password_hash.clone()).await?;
        if !password_ok || !user.is_active {
            tracing::info!(user_id = user.id, "Login failed");
            return Err(CoreError::invalid_credentials());
        }

        let user = self.users.record_login(user.id).await?.unwrap_or(user);
        let session = self.sessions.create_session(user.id, client).await?;
        let access_token = self.issue(&user.identity())?;

        tracing::info!(user_id = user.id, "User logged in");
        Ok(LoginOutcome {
            access_token,
            session_token: session.session_token,
            refresh_token: session.refresh_token.unwrap_or_default(),
            expires_at: session.expires_at,
            user: UserResponse::from(&user),
        })
    }

    /// Exchange a refresh token for a new access token and a rotated refresh token.
    pub async fn refresh(
        &self,
        refresh_token: Option<&str>,
        client: ClientInfo,
    ) -> Result<RefreshOutcome, CoreError> {
        let refresh_token = refresh_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CoreError::BadRequest("Refresh token is required".into()))?;

        let view = self
            .sessions
            .refresh_session(refresh_token, client)
            .await?
            .ok_or_else(|| CoreError::Unauthorized("Invalid or expired refresh token".into()))?;

        let access_token = self.issue(&view.user)?;
        Ok(RefreshOutcome {
            access_token,
            session_token: view.session_token,
            refresh_token: view.refresh_token.unwrap_or_default(),
            expires_at: view.expires_at,
            user: view.user,
        })
    }

    /// Verify an access token and, if supplied, the session it was presented with.
    pub async fn validate(
        &self,
        access_token: Option<&str>,
        session_token: Option<&str>,
    ) -> Result<Validated, CoreError> {
        let access_token = access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CoreError::Unauthorized("No token provided".into()))?;

        let claims = validate_token(access_token, &self.jwt).map_err(|e| match e {
            TokenError::Expired => CoreError::Unauthorized("Token expired".into()),
            TokenError::Invalid => CoreError::Unauthorized("Invalid token".into()),
            TokenError::Signing(e) => CoreError::Internal(e.to_string()),
        })?;

        let Some(session_token) = session_token.filter(|t| !t.is_empty()) else {
            return Ok(Validated {
                user: claims.identity(),
                expires_at: claims.expires_at(),
                session_token: None,
            });
        };

        let session: SessionView = self
            .sessions
            .validate_session(session_token)
            .await?
            .ok_or_else(|| CoreError::Unauthorized("Invalid or expired session".into()))?;

        if session.user.id != claims.sub {
            tracing::warn!(
                token_user = claims.sub,
                session_user = session.user.id,
                "Access token and session belong to different users",
            );
            return Err(CoreError::Unauthorized("Token mismatch".into()));
        }

        Ok(Validated {
            user: session.user,
            expires_at: session.expires_at,
            session_token: Some(session.session_token),
        })
    }

    /// End a session by session token and/or refresh token. Always succeeds
    /// unless the store fails.
    pub async fn logout(
        &self,
        session_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<(), CoreError> {
        if let Some(token) = session_token.filter(|t| !t.is_empty()) {
            self.sessions.delete_session(token).await?;
        }
        if let Some(token) = refresh_token.filter(|t| !t.is_empty()) {
            self.sessions.delete_session_by_refresh_token(token).await?;
        }
        Ok(())
    }

    /// End every session of a user.
    pub async fn logout_all(&self, user_id: DbId) -> Result<u64, CoreError> {
        self.sessions.delete_user_sessions(user_id).await
    }

    /// Replace a password after checking the current one, then revoke every
    /// session of the user.
    pub async fn change_password(
        &self,
        user_id: DbId,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), CoreError> {
        if current_password.is_empty() {
            return Err(CoreError::BadRequest("Current password is required".into()));
        }
        check_new_password(new_password)?;

        let user = self.require_user(user_id).await?;
        if !verify_blocking(current_password.to_string(), user.password_hash.clone()).await? {
            return Err(CoreError::Unauthorized("Current password is incorrect".into()));
        }

        let password_hash = hash_blocking(new_password.to_string()).await?;
        if !self.users.update_password(user_id, &password_hash).await? {
            return Err(not_found("User", user_id));
        }

        let revoked = self.sessions.delete_user_sessions(user_id).await?;
        tracing::info!(user_id, revoked, "Password changed");
        Ok(())
    }

    pub async fn current_user(&self, user_id: DbId) -> Result<UserResponse, CoreError> {
        let user = self.require_user(user_id).await?;
        Ok(UserResponse::from(&user))
    }

    pub async fn list_sessions(
        &self,
        user_id: DbId,
        current_session: Option<&str>,
    ) -> Result<Vec<SessionSummary>, CoreError> {
        self.sessions
            .list_user_sessions(user_id, current_session)
            .await
    }

    /// Revoke one of the caller's own sessions. Sessions owned by anyone
    /// else are reported as not found.
    pub async fn revoke_session(&self, user_id: DbId, session_token: &str) -> Result<(), CoreError> {
        match self.sessions.find_session(session_token).await? {
            Some(row) if row.session.user_id == user_id => {
                self.sessions.delete_session(session_token).await?;
                tracing::info!(user_id, session_id = row.session.id, "Session revoked");
                Ok(())
            }
            _ => Err(CoreError::NotFound {
                entity: "Session",
                id: String::new(),
            }),
        }
    }

    async fn require_user(&self, user_id: DbId) -> Result<User, CoreError> {
        self.users
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| not_found("User", user_id))
    }

    fn issue(&self, identity: &UserIdentity) -> Result<String, CoreError> {
        generate_access_token(identity, &self.jwt).map_err(|e| {
            tracing::error!(error = %e, "Access token signing failed");
            CoreError::Internal(format!("Token generation error: {e}"))
        })
    }
}

fn not_found(entity: &'static str, id: DbId) -> CoreError {
    CoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Argon2 runs on the blocking pool
// ---------------------------------------------------------------------------

async fn hash_blocking(password: String) -> Result<String, CoreError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| CoreError::Internal(format!("Hashing task failed: {e}")))?
        .map_err(|e| CoreError::Internal(format!("Password hashing error: {e}")))
}

async fn verify_blocking(password: String, hash: String) -> Result<bool, CoreError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| CoreError::Internal(format!("Verification task failed: {e}")))?
        .map_err(|e| CoreError::Internal(format!("Password verification error: {e}")))
}

async fn dummy_verify_blocking(password: String) {
    let _ = tokio::task::spawn_blocking(move || verify_against_dummy(&password)).await;
}
