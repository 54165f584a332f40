//! In-process stores for tests and local development.
//!
//! Enforces the same uniqueness rules and conditional rotation as the
//! PostgreSQL schema, reporting violations with the same constraint names.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use greenhouse_core::types::{DbId, Timestamp};
use greenhouse_db::models::session::{
    CreateSession, RotateRefreshToken, Session, SessionKeys, SessionWithUser,
};
use greenhouse_db::models::user::{CreateUser, User};
use tokio::sync::Mutex;

use super::{constraints, SessionStore, StoreError, UserStore};

#[derive(Default)]
struct State {
    users: HashMap<DbId, User>,
    sessions: HashMap<DbId, Session>,
    next_user_id: DbId,
    next_session_id: DbId,
}

impl State {
    fn join(&self, session: &Session) -> Option<SessionWithUser> {
        let user = self.users.get(&session.user_id)?;
        Some(SessionWithUser {
            session: session.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
        })
    }

    fn find_session(&self, pred: impl Fn(&Session) -> bool) -> Option<SessionWithUser> {
        self.sessions
            .values()
            .find(|s| pred(s))
            .and_then(|s| self.join(s))
    }

    fn remove_sessions(&mut self, pred: impl Fn(&Session) -> bool) -> Vec<SessionKeys> {
        let ids: Vec<DbId> = self
            .sessions
            .values()
            .filter(|s| pred(s))
            .map(|s| s.id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.sessions.remove(&id))
            .map(|s| s.keys())
            .collect()
    }
}

/// Both store traits over a mutex-guarded map.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline, every operation fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Overwrite a session's expiry, e.g. to move it into the past.
    pub async fn set_session_expiry(&self, session_token: &str, expires_at: Timestamp) -> bool {
        let mut state = self.state.lock().await;
        match state
            .sessions
            .values_mut()
            .find(|s| s.session_token == session_token)
        {
            Some(session) => {
                session.expires_at = expires_at;
                true
            }
            None => false,
        }
    }

    /// Mark a session inactive without deleting it.
    pub async fn deactivate_session(&self, session_token: &str) -> bool {
        let mut state = self.state.lock().await;
        match state
            .sessions
            .values_mut()
            .find(|s| s.session_token == session_token)
        {
            Some(session) => {
                session.is_active = false;
                true
            }
            None => false,
        }
    }

    pub async fn set_user_active(&self, user_id: DbId, is_active: bool) -> bool {
        let mut state = self.state.lock().await;
        match state.users.get_mut(&user_id) {
            Some(user) => {
                user.is_active = is_active;
                true
            }
            None => false,
        }
    }

    /// Number of stored sessions, expired or not.
    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, input: &CreateUser) -> Result<User, StoreError> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.username == input.username) {
            return Err(StoreError::UniqueViolation(constraints::USERNAME.into()));
        }
        if state.users.values().any(|u| u.email == input.email) {
            return Err(StoreError::UniqueViolation(constraints::EMAIL.into()));
        }

        state.next_user_id += 1;
        let now = Utc::now();
        let user = User {
            id: state.next_user_id,
            username: input.username.clone(),
            email: input.email.clone(),
            password_hash: input.password_hash.clone(),
            is_active: true,
            is_verified: false,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_id(&self, id: DbId) -> Result<Option<User>, StoreError> {
        self.check_online()?;
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.check_online()?;
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_user_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        self.check_online()?;
        let state = self.state.lock().await;
        let by_username = state.users.values().find(|u| u.username == username);
        Ok(by_username
            .or_else(|| state.users.values().find(|u| u.email == email))
            .cloned())
    }

    async fn record_login(&self, id: DbId) -> Result<Option<User>, StoreError> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        Ok(state.users.get_mut(&id).map(|user| {
            user.last_login_at = Some(Utc::now());
            user.clone()
        }))
    }

    async fn update_password(&self, id: DbId, password_hash: &str) -> Result<bool, StoreError> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        match state.users.get_mut(&id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.check_online()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, input: &CreateSession) -> Result<SessionWithUser, StoreError> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&input.user_id) {
            return Err(StoreError::ForeignKeyViolation(
                constraints::SESSION_USER.into(),
            ));
        }
        if state
            .sessions
            .values()
            .any(|s| s.session_token == input.session_token)
        {
            return Err(StoreError::UniqueViolation(
                constraints::SESSION_TOKEN.into(),
            ));
        }
        if state
            .sessions
            .values()
            .any(|s| s.refresh_token.as_deref() == Some(input.refresh_token.as_str()))
        {
            return Err(StoreError::UniqueViolation(
                constraints::REFRESH_TOKEN.into(),
            ));
        }

        state.next_session_id += 1;
        let now = Utc::now();
        let session = Session {
            id: state.next_session_id,
            user_id: input.user_id,
            session_token: input.session_token.clone(),
            refresh_token: Some(input.refresh_token.clone()),
            expires_at: input.expires_at,
            ip_address: input.client.ip_address.clone(),
            user_agent: input.client.user_agent.clone(),
            is_active: true,
            last_activity_at: now,
            created_at: now,
            updated_at: now,
        };
        state.sessions.insert(session.id, session.clone());
        state
            .join(&session)
            .ok_or_else(|| StoreError::ForeignKeyViolation(constraints::SESSION_USER.into()))
    }

    async fn find_by_session_token(
        &self,
        session_token: &str,
    ) -> Result<Option<SessionWithUser>, StoreError> {
        self.check_online()?;
        let state = self.state.lock().await;
        Ok(state.find_session(|s| s.session_token == session_token))
    }

    async fn find_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<SessionWithUser>, StoreError> {
        self.check_online()?;
        let state = self.state.lock().await;
        Ok(state.find_session(|s| s.refresh_token.as_deref() == Some(refresh_token)))
    }

    async fn rotate_refresh_token(
        &self,
        input: &RotateRefreshToken,
    ) -> Result<Option<SessionWithUser>, StoreError> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        if state.sessions.values().any(|s| {
            s.id != input.id && s.refresh_token.as_deref() == Some(input.new_refresh_token.as_str())
        }) {
            return Err(StoreError::UniqueViolation(
                constraints::REFRESH_TOKEN.into(),
            ));
        }

        let Some(session) = state.sessions.get_mut(&input.id) else {
            return Ok(None);
        };
        if !session.is_active
            || session.refresh_token.as_deref() != Some(input.current_refresh_token.as_str())
        {
            return Ok(None);
        }

        let now = Utc::now();
        let client = input.client.or(&session.client_info());
        session.refresh_token = Some(input.new_refresh_token.clone());
        session.expires_at = input.expires_at;
        session.last_activity_at = now;
        session.updated_at = now;
        session.ip_address = client.ip_address;
        session.user_agent = client.user_agent;

        let session = session.clone();
        Ok(state.join(&session))
    }

    async fn touch(&self, session_token: &str) -> Result<bool, StoreError> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        match state
            .sessions
            .values_mut()
            .find(|s| s.session_token == session_token)
        {
            Some(session) => {
                session.last_activity_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_by_session_token(
        &self,
        session_token: &str,
    ) -> Result<Option<SessionKeys>, StoreError> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        Ok(state
            .remove_sessions(|s| s.session_token == session_token)
            .pop())
    }

    async fn delete_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<SessionKeys>, StoreError> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        Ok(state
            .remove_sessions(|s| s.refresh_token.as_deref() == Some(refresh_token))
            .pop())
    }

    async fn delete_for_user(&self, user_id: DbId) -> Result<Vec<SessionKeys>, StoreError> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        Ok(state.remove_sessions(|s| s.user_id == user_id))
    }

    async fn delete_expired(&self, now: Timestamp) -> Result<Vec<SessionKeys>, StoreError> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        Ok(state.remove_sessions(|s| s.expires_at <= now))
    }

    async fn list_active_for_user(
        &self,
        user_id: DbId,
        now: Timestamp,
    ) -> Result<Vec<Session>, StoreError> {
        self.check_online()?;
        let state = self.state.lock().await;
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_active && s.expires_at > now)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(sessions)
    }
}
