//! PostgreSQL-backed stores.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use greenhouse_core::types::{DbId, Timestamp};
use greenhouse_db::models::session::{
    CreateSession, RotateRefreshToken, Session, SessionKeys, SessionWithUser,
};
use greenhouse_db::models::user::{CreateUser, User};
use greenhouse_db::repositories::{SessionRepo, UserRepo};
use greenhouse_db::DbPool;

use super::{SessionStore, StoreError, UserStore};

/// Implements both store traits over one connection pool. Every query is
/// bounded by `timeout`.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
    timeout: Duration,
}

impl PgStore {
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, input: &CreateUser) -> Result<User, StoreError> {
        self.bounded(UserRepo::create(&self.pool, input)).await
    }

    async fn find_user_by_id(&self, id: DbId) -> Result<Option<User>, StoreError> {
        self.bounded(UserRepo::find_by_id(&self.pool, id)).await
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.bounded(UserRepo::find_by_username(&self.pool, username))
            .await
    }

    async fn find_user_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        self.bounded(UserRepo::find_by_username_or_email(
            &self.pool, username, email,
        ))
        .await
    }

    async fn record_login(&self, id: DbId) -> Result<Option<User>, StoreError> {
        self.bounded(UserRepo::record_successful_login(&self.pool, id))
            .await
    }

    async fn update_password(&self, id: DbId, password_hash: &str) -> Result<bool, StoreError> {
        self.bounded(UserRepo::update_password(&self.pool, id, password_hash))
            .await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.bounded(greenhouse_db::health_check(&self.pool)).await
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(&self, input: &CreateSession) -> Result<SessionWithUser, StoreError> {
        self.bounded(SessionRepo::create(&self.pool, input)).await
    }

    async fn find_by_session_token(
        &self,
        session_token: &str,
    ) -> Result<Option<SessionWithUser>, StoreError> {
        self.bounded(SessionRepo::find_by_session_token(&self.pool, session_token))
            .await
    }

    async fn find_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<SessionWithUser>, StoreError> {
        self.bounded(SessionRepo::find_by_refresh_token(&self.pool, refresh_token))
            .await
    }

    async fn rotate_refresh_token(
        &self,
        input: &RotateRefreshToken,
    ) -> Result<Option<SessionWithUser>, StoreError> {
        self.bounded(SessionRepo::rotate_refresh_token(&self.pool, input))
            .await
    }

    async fn touch(&self, session_token: &str) -> Result<bool, StoreError> {
        self.bounded(SessionRepo::touch(&self.pool, session_token))
            .await
    }

    async fn delete_by_session_token(
        &self,
        session_token: &str,
    ) -> Result<Option<SessionKeys>, StoreError> {
        self.bounded(SessionRepo::delete_by_session_token(&self.pool, session_token))
            .await
    }

    async fn delete_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<SessionKeys>, StoreError> {
        self.bounded(SessionRepo::delete_by_refresh_token(&self.pool, refresh_token))
            .await
    }

    async fn delete_for_user(&self, user_id: DbId) -> Result<Vec<SessionKeys>, StoreError> {
        self.bounded(SessionRepo::delete_for_user(&self.pool, user_id))
            .await
    }

    async fn delete_expired(&self, now: Timestamp) -> Result<Vec<SessionKeys>, StoreError> {
        self.bounded(SessionRepo::delete_expired(&self.pool, now))
            .await
    }

    async fn list_active_for_user(
        &self,
        user_id: DbId,
        now: Timestamp,
    ) -> Result<Vec<Session>, StoreError> {
        self.bounded(SessionRepo::list_active_for_user(&self.pool, user_id, now))
            .await
    }
}
