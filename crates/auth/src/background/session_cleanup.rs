//! Periodic sweep of expired sessions.
//!
//! Deletes every session whose `expires_at` has passed and purges its cache
//! keys. A failed sweep is logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::session::SessionManager;

/// Run the cleanup loop until `cancel` is triggered.
///
/// The first sweep runs immediately on start.
pub async fn run(sessions: Arc<SessionManager>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        "Session cleanup job started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Session cleanup job stopping");
                break;
            }
            _ = ticker.tick() => {
                match sessions.cleanup_expired_sessions().await {
                    Ok(deleted) if deleted > 0 => {
                        tracing::info!(deleted, "Session cleanup: removed expired sessions");
                    }
                    Ok(_) => {
                        tracing::debug!("Session cleanup: nothing to remove");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Session cleanup failed");
                    }
                }
            }
        }
    }
}
