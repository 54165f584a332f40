//! Session cache in front of the session store.
//!
//! Two key families are kept:
//!
//! - `session:<session_token>` -> JSON [`CachedSession`]
//! - `refresh:<refresh_token>` -> session token (reverse index)
//!
//! Both expire with the session. The store stays authoritative: entries are
//! rebuilt on a miss and purged eagerly on delete and rotation. Every call is
//! bounded by a timeout and retried once; after that the failure is logged
//! and the caller carries on as if the cache were empty.

mod memory;
mod reconnect;
mod redis_backend;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use greenhouse_core::duration::ttl_secs;
use greenhouse_core::identity::UserIdentity;
use greenhouse_core::types::{DbId, Timestamp};
use greenhouse_db::models::session::{SessionKeys, SessionWithUser};
use serde::{Deserialize, Serialize};

pub use self::memory::MemoryCache;
pub use self::reconnect::{ReconnectState, Reconnector, Step};
pub use self::redis_backend::RedisCache;

pub fn session_key(session_token: &str) -> String {
    format!("session:{session_token}")
}

pub fn refresh_key(refresh_token: &str) -> String {
    format!("refresh:{refresh_token}")
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// No connection and none can be attempted right now.
    #[error("Cache unavailable")]
    Unavailable,

    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// A stored entry is not a valid [`CachedSession`].
    #[error("Cache entry could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Raw key-value operations a cache backend must provide.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short backend name for logs and the health endpoint.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError>;

    /// Delete keys; missing keys are not an error.
    async fn del(&self, keys: &[String]) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

/// Denormalized snapshot of a session stored under `session:<token>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSession {
    pub user_id: DbId,
    pub username: String,
    pub email: String,
    pub expires_at: Timestamp,
    pub refresh_token: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub is_active: bool,
}

impl CachedSession {
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            id: self.user_id,
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }

    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        self.is_active && now < self.expires_at
    }
}

impl From<&SessionWithUser> for CachedSession {
    fn from(row: &SessionWithUser) -> Self {
        Self {
            user_id: row.session.user_id,
            username: row.username.clone(),
            email: row.email.clone(),
            expires_at: row.session.expires_at,
            refresh_token: row.session.refresh_token.clone(),
            ip_address: row.session.ip_address.clone(),
            user_agent: row.session.user_agent.clone(),
            is_active: row.session.is_active,
        }
    }
}

/// Session-aware wrapper around a [`CacheBackend`].
///
/// Never returns an error: every failure is logged at `warn` and reported as
/// a miss (reads) or `false` (writes).
#[derive(Clone)]
pub struct SessionCache {
    backend: Arc<dyn CacheBackend>,
    timeout: Duration,
}

impl SessionCache {
    pub fn new(backend: Arc<dyn CacheBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Look up a session snapshot. Undecodable entries are deleted.
    pub async fn get_session(&self, session_token: &str) -> Option<CachedSession> {
        let key = session_key(session_token);
        let raw = self
            .call("get", || self.backend.get(&key))
            .await
            .ok()
            .flatten()?;

        match serde_json::from_str::<CachedSession>(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %CacheError::from(e), "Discarding corrupt session cache entry");
                let _ = self.call("del", || self.backend.del(std::slice::from_ref(&key))).await;
                None
            }
        }
    }

    /// Resolve a refresh token to its session token via the reverse index.
    pub async fn lookup_refresh(&self, refresh_token: &str) -> Option<String> {
        let key = refresh_key(refresh_token);
        self.call("get", || self.backend.get(&key))
            .await
            .ok()
            .flatten()
    }

    /// Write both key families for a session. Returns `false` if any write failed.
    pub async fn put(&self, session_token: &str, entry: &CachedSession, now: Timestamp) -> bool {
        let ttl = ttl_secs(entry.expires_at, now);
        let value = match serde_json::to_string(entry) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode session cache entry");
                return false;
            }
        };

        let key = session_key(session_token);
        if self
            .call("set_ex", || self.backend.set_ex(&key, &value, ttl))
            .await
            .is_err()
        {
            return false;
        }

        match &entry.refresh_token {
            Some(refresh) => {
                let rkey = refresh_key(refresh);
                self.call("set_ex", || self.backend.set_ex(&rkey, session_token, ttl))
                    .await
                    .is_ok()
            }
            None => true,
        }
    }

    /// Purge the cache keys of one session.
    pub async fn purge(&self, keys: &SessionKeys) -> bool {
        self.purge_all(std::slice::from_ref(keys)).await
    }

    /// Purge the cache keys of many sessions in one round trip.
    pub async fn purge_all(&self, keys: &[SessionKeys]) -> bool {
        let cache_keys: Vec<String> = keys
            .iter()
            .flat_map(|k| {
                std::iter::once(session_key(&k.session_token))
                    .chain(k.refresh_token.as_deref().map(refresh_key))
            })
            .collect();
        self.purge_keys(&cache_keys).await
    }

    /// Purge raw cache keys (built with [`session_key`] / [`refresh_key`]).
    pub async fn purge_keys(&self, cache_keys: &[String]) -> bool {
        if cache_keys.is_empty() {
            return true;
        }
        self.call("del", || self.backend.del(cache_keys))
            .await
            .is_ok()
    }

    pub async fn is_healthy(&self) -> bool {
        self.call("ping", || self.backend.ping()).await.is_ok()
    }

    /// Run one backend operation with a timeout, retrying once on failure.
    async fn call<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T, CacheError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        let mut last_err = CacheError::Unavailable;
        for attempt in 1..=2u32 {
            let result = match tokio::time::timeout(self.timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(CacheError::Timeout(self.timeout)),
            };
            match result {
                Ok(value) => return Ok(value),
                Err(CacheError::Unavailable) => {
                    last_err = CacheError::Unavailable;
                    break;
                }
                Err(e) => {
                    tracing::debug!(op, attempt, error = %e, "Cache operation failed");
                    last_err = e;
                }
            }
        }
        if matches!(last_err, CacheError::Unavailable) {
            tracing::debug!(op, backend = self.backend.name(), "Cache unavailable; skipping");
        } else {
            tracing::warn!(
                op,
                backend = self.backend.name(),
                error = %last_err,
                "Cache operation failed; continuing without cache",
            );
        }
        Err(last_err)
    }
}
