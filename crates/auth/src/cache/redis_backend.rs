//! Redis cache backend.

use std::time::Instant;

use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client, RedisError};
use async_trait::async_trait;
use greenhouse_core::retry::RetryPolicy;
use tokio::sync::Mutex;

use super::reconnect::{Reconnector, Step};
use super::{CacheBackend, CacheError};

#[derive(Debug)]
struct Link {
    connection: Option<MultiplexedConnection>,
    reconnect: Reconnector,
}

/// A multiplexed Redis connection that reconnects lazily, paced by a
/// [`Reconnector`].
#[derive(Debug)]
pub struct RedisCache {
    client: Client,
    link: Mutex<Link>,
}

impl RedisCache {
    /// Parse the URL. No connection is made until the first operation.
    pub fn new(url: &str, policy: RetryPolicy) -> Result<Self, CacheError> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            link: Mutex::new(Link {
                connection: None,
                reconnect: Reconnector::new(policy, Instant::now()),
            }),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        let mut link = self.link.lock().await;
        let now = Instant::now();

        match (link.reconnect.next(now), &link.connection) {
            (Step::Use, Some(conn)) => return Ok(conn.clone()),
            (Step::Unavailable, _) => return Err(CacheError::Unavailable),
            _ => {}
        }

        match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => {
                tracing::info!("Connected to Redis");
                link.reconnect.connected();
                link.connection = Some(conn.clone());
                Ok(conn)
            }
            Err(e) => {
                link.reconnect.connect_failed(Instant::now());
                link.connection = None;
                tracing::warn!(
                    error = %e,
                    state = ?link.reconnect.state(),
                    "Redis connect attempt failed",
                );
                Err(e.into())
            }
        }
    }

    /// Inspect a command error and mark the connection lost if it was.
    async fn observe(&self, err: RedisError) -> CacheError {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            let mut link = self.link.lock().await;
            link.connection = None;
            link.reconnect.connection_lost(Instant::now());
            tracing::warn!(error = %err, "Redis connection lost");
        }
        err.into()
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => Ok(value),
            Err(e) => Err(self.observe(e).await),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        match conn.set_ex::<_, _, ()>(key, value, ttl_secs).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.observe(e).await),
        }
    }

    async fn del(&self, keys: &[String]) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        match conn.del::<_, ()>(keys.to_vec()).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.observe(e).await),
        }
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let pong: Result<String, RedisError> = ::redis::cmd("PING").query_async(&mut conn).await;
        match pong {
            Ok(_) => Ok(()),
            Err(e) => Err(self.observe(e).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn malformed_url_is_rejected() {
        assert_matches!(
            RedisCache::new("not a url", RetryPolicy::default()),
            Err(CacheError::Redis(_))
        );
    }

    #[tokio::test]
    async fn unreachable_server_becomes_unavailable_without_waiting() {
        let cache = RedisCache::new(
            "redis://127.0.0.1:1/",
            RetryPolicy {
                max_attempts: 1,
                ..RetryPolicy::default()
            },
        )
        .unwrap();

        assert_matches!(cache.get("k").await, Err(CacheError::Redis(_)));
        assert_matches!(cache.get("k").await, Err(CacheError::Unavailable));
    }
}
