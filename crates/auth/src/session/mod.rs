//! Session lifecycle: create, validate, rotate, revoke, and sweep.
//!
//! The store is the source of truth. The cache is consulted first on reads
//! and written through on every create, repopulate, and rotation; deletes
//! purge both key families. Cache trouble never fails an operation.

use std::sync::Arc;

use chrono::Utc;
use greenhouse_core::duration::{compute_expiry, lifetime_or_default, parse_duration};
use greenhouse_core::error::CoreError;
use greenhouse_core::identity::UserIdentity;
use greenhouse_core::types::{ClientInfo, DbId, Timestamp};
use greenhouse_db::models::session::{
    CreateSession, RotateRefreshToken, SessionKeys, SessionSummary, SessionWithUser,
};

use crate::auth::tokens::{generate_refresh_token, generate_session_token};
use crate::cache::{refresh_key, session_key, CachedSession, SessionCache};
use crate::store::SessionStore;

/// Default session lifetime string.
const DEFAULT_EXPIRES_IN: &str = "7d";
/// Default interval between expired-session sweeps (1 hour).
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session lifetime, `<int>[smhd]` (default: `7d`).
    pub expires_in: String,
    pub cleanup_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expires_in: DEFAULT_EXPIRES_IN.into(),
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
        }
    }
}

impl SessionConfig {
    /// Load session configuration from environment variables.
    ///
    /// | Env Var                          | Default |
    /// |----------------------------------|---------|
    /// | `SESSION_EXPIRES_IN`             | `7d`    |
    /// | `SESSION_CLEANUP_INTERVAL_SECS`  | `3600`  |
    pub fn from_env() -> Self {
        let expires_in =
            std::env::var("SESSION_EXPIRES_IN").unwrap_or_else(|_| DEFAULT_EXPIRES_IN.into());
        if parse_duration(&expires_in).is_none() {
            tracing::warn!(
                expires_in = %expires_in,
                "SESSION_EXPIRES_IN is not <int>[smhd]; sessions will use the 2h default"
            );
        }

        let cleanup_interval_secs: u64 = std::env::var("SESSION_CLEANUP_INTERVAL_SECS")
            .unwrap_or_else(|_| DEFAULT_CLEANUP_INTERVAL_SECS.to_string())
            .parse()
            .expect("SESSION_CLEANUP_INTERVAL_SECS must be a valid u64");
        assert!(
            cleanup_interval_secs > 0,
            "SESSION_CLEANUP_INTERVAL_SECS must be positive"
        );

        Self {
            expires_in,
            cleanup_interval_secs,
        }
    }

    pub fn expiry_from(&self, now: Timestamp) -> Timestamp {
        compute_expiry(&self.expires_in, now)
    }

    /// Session lifetime in seconds, used for the refresh cookie's `Max-Age`.
    pub fn lifetime_secs(&self) -> i64 {
        lifetime_or_default(&self.expires_in).num_seconds()
    }
}

/// What callers learn about a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub user: UserIdentity,
    pub session_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Timestamp,
}

impl From<&SessionWithUser> for SessionView {
    fn from(row: &SessionWithUser) -> Self {
        Self {
            user: row.identity(),
            session_token: row.session.session_token.clone(),
            refresh_token: row.session.refresh_token.clone(),
            expires_at: row.session.expires_at,
        }
    }
}

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    cache: SessionCache,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, cache: SessionCache, config: SessionConfig) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Persist a new session for `user_id` and write it through to the cache.
    pub async fn create_session(
        &self,
        user_id: DbId,
        client: ClientInfo,
    ) -> Result<SessionView, CoreError> {
        let now = Utc::now();
        let input = CreateSession {
            user_id,
            session_token: generate_session_token(),
            refresh_token: generate_refresh_token(),
            expires_at: self.config.expiry_from(now),
            client,
        };

        let row = self.store.create_session(&input).await?;
        self.repopulate(&row, now).await?;

        tracing::info!(user_id, session_id = row.session.id, "Session created");
        Ok(SessionView::from(&row))
    }

    /// Resolve a session token to a live session.
    ///
    /// Returns `None` for unknown, expired, or inactive sessions. Expired and
    /// inactive sessions found in the store are deleted on the way out.
    pub async fn validate_session(
        &self,
        session_token: &str,
    ) -> Result<Option<SessionView>, CoreError> {
        let now = Utc::now();

        if let Some(entry) = self.cache.get_session(session_token).await {
            if entry.is_valid_at(now) {
                self.touch_in_background(session_token);
                return Ok(Some(SessionView {
                    user: entry.identity(),
                    session_token: session_token.to_string(),
                    refresh_token: entry.refresh_token,
                    expires_at: entry.expires_at,
                }));
            }
        }

        let Some(row) = self.store.find_by_session_token(session_token).await? else {
            self.cache.purge_keys(&[session_key(session_token)]).await;
            return Ok(None);
        };

        if !row.session.is_valid_at(now) {
            tracing::debug!(
                session_id = row.session.id,
                is_active = row.session.is_active,
                "Rejecting expired or inactive session",
            );
            self.delete_session(session_token).await?;
            return Ok(None);
        }

        self.store.touch(session_token).await?;
        if !self.repopulate(&row, now).await? {
            return Ok(None);
        }
        Ok(Some(SessionView::from(&row)))
    }

    /// Rotate a refresh token.
    ///
    /// The old refresh token is single use: of any number of concurrent calls
    /// presenting it, at most one gets `Some`. The session token is kept; its
    /// expiry is pushed out by a full session lifetime.
    pub async fn refresh_session(
        &self,
        refresh_token: &str,
        client: ClientInfo,
    ) -> Result<Option<SessionView>, CoreError> {
        let now = Utc::now();

        let Some(row) = self.find_by_refresh_token(refresh_token).await? else {
            return Ok(None);
        };

        if !row.session.is_active {
            return Ok(None);
        }
        if now >= row.session.expires_at {
            tracing::debug!(session_id = row.session.id, "Refresh presented for expired session");
            self.delete_session(&row.session.session_token).await?;
            return Ok(None);
        }

        let rotate = RotateRefreshToken {
            id: row.session.id,
            current_refresh_token: refresh_token.to_string(),
            new_refresh_token: generate_refresh_token(),
            expires_at: self.config.expiry_from(now),
            client,
        };

        let Some(rotated) = self.store.rotate_refresh_token(&rotate).await? else {
            tracing::warn!(
                session_id = row.session.id,
                "Refresh token already rotated; rejecting replay",
            );
            return Ok(None);
        };

        self.cache
            .purge_keys(&[
                session_key(&row.session.session_token),
                refresh_key(refresh_token),
            ])
            .await;
        if !self.repopulate(&rotated, now).await? {
            tracing::info!(session_id = rotated.session.id, "Session revoked during rotation");
            return Ok(None);
        }

        tracing::info!(session_id = rotated.session.id, "Refresh token rotated");
        Ok(Some(SessionView::from(&rotated)))
    }

    /// Delete a session by session token. Idempotent.
    pub async fn delete_session(&self, session_token: &str) -> Result<(), CoreError> {
        let deleted = self.store.delete_by_session_token(session_token).await?;
        let keys = deleted.unwrap_or_else(|| SessionKeys {
            session_token: session_token.to_string(),
            refresh_token: None,
        });
        self.cache.purge(&keys).await;
        Ok(())
    }

    /// Delete a session by refresh token. Idempotent.
    pub async fn delete_session_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<(), CoreError> {
        match self.store.delete_by_refresh_token(refresh_token).await? {
            Some(keys) => {
                self.cache.purge(&keys).await;
            }
            None => {
                self.cache.purge_keys(&[refresh_key(refresh_token)]).await;
            }
        }
        Ok(())
    }

    /// Delete every session a user owns. Returns how many were removed.
    pub async fn delete_user_sessions(&self, user_id: DbId) -> Result<u64, CoreError> {
        let deleted = self.store.delete_for_user(user_id).await?;
        self.cache.purge_all(&deleted).await;
        tracing::info!(user_id, count = deleted.len(), "User sessions deleted");
        Ok(deleted.len() as u64)
    }

    /// Delete every session with `expires_at <= now`. Returns the count.
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, CoreError> {
        let deleted = self.store.delete_expired(Utc::now()).await?;
        self.cache.purge_all(&deleted).await;
        Ok(deleted.len() as u64)
    }

    /// Active, unexpired sessions of a user, most recently used first.
    pub async fn list_user_sessions(
        &self,
        user_id: DbId,
        current_session: Option<&str>,
    ) -> Result<Vec<SessionSummary>, CoreError> {
        let sessions = self
            .store
            .list_active_for_user(user_id, Utc::now())
            .await?;
        Ok(sessions
            .iter()
            .map(|s| SessionSummary {
                is_current: current_session == Some(s.session_token.as_str()),
                ..SessionSummary::from(s)
            })
            .collect())
    }

    /// Raw store lookup, regardless of state.
    pub async fn find_session(
        &self,
        session_token: &str,
    ) -> Result<Option<SessionWithUser>, CoreError> {
        Ok(self.store.find_by_session_token(session_token).await?)
    }

    /// Resolve a refresh token through the reverse index, confirming the hit
    /// against the store, then fall back to a direct store lookup.
    async fn find_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<SessionWithUser>, CoreError> {
        if let Some(session_token) = self.cache.lookup_refresh(refresh_token).await {
            if let Some(row) = self.store.find_by_session_token(&session_token).await? {
                if row.session.refresh_token.as_deref() == Some(refresh_token) {
                    return Ok(Some(row));
                }
            }
            self.cache.purge_keys(&[refresh_key(refresh_token)]).await;
        }
        Ok(self.store.find_by_refresh_token(refresh_token).await?)
    }

    /// Write `row` to the cache, then confirm the store still holds it.
    ///
    /// A delete or rotation that lands between our store read and the cache
    /// write purges before we write. The re-read catches it and removes what
    /// we wrote. Returns whether the session is still live.
    async fn repopulate(&self, row: &SessionWithUser, now: Timestamp) -> Result<bool, CoreError> {
        if !self
            .cache
            .put(&row.session.session_token, &CachedSession::from(row), now)
            .await
        {
            tracing::warn!(session_id = row.session.id, "Session not cached");
        }

        let current = self
            .store
            .find_by_session_token(&row.session.session_token)
            .await?;
        let live = current
            .as_ref()
            .is_some_and(|c| c.session.is_valid_at(now));
        let unchanged = current
            .as_ref()
            .is_some_and(|c| c.session.refresh_token == row.session.refresh_token);

        if !live || !unchanged {
            tracing::debug!(session_id = row.session.id, live, "Dropping stale cache entry");
            self.cache
                .purge(&SessionKeys {
                    session_token: row.session.session_token.clone(),
                    refresh_token: row.session.refresh_token.clone(),
                })
                .await;
        }
        Ok(live)
    }

    fn touch_in_background(&self, session_token: &str) {
        let store = Arc::clone(&self.store);
        let token = session_token.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.touch(&token).await {
                tracing::debug!(error = %e, "Failed to record session activity");
            }
        });
    }
}
