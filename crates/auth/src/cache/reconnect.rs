//! Reconnect pacing for the Redis backend.
//!
//! [`Reconnector`] is a pure state machine: callers ask it what to do at a
//! given instant and report the outcome back. It never sleeps, so a request
//! arriving during a backoff window is told the cache is unavailable instead
//! of waiting for it.

use std::time::Instant;

use greenhouse_core::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    Connected,
    /// Not connected. `failures` consecutive connect attempts have failed and
    /// the next one may start at `retry_at`.
    Disconnected { failures: u32, retry_at: Instant },
    /// `max_attempts` consecutive failures; no further attempts are made.
    Exhausted,
}

/// What the caller should do right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Use the existing connection.
    Use,
    /// Try to open a new connection.
    Connect,
    /// Skip the cache for this call.
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct Reconnector {
    policy: RetryPolicy,
    state: ReconnectState,
}

impl Reconnector {
    /// Start disconnected with an immediate first attempt allowed.
    pub fn new(policy: RetryPolicy, now: Instant) -> Self {
        Self {
            policy,
            state: ReconnectState::Disconnected {
                failures: 0,
                retry_at: now,
            },
        }
    }

    pub fn state(&self) -> ReconnectState {
        self.state
    }

    pub fn next(&self, now: Instant) -> Step {
        match self.state {
            ReconnectState::Connected => Step::Use,
            ReconnectState::Disconnected { retry_at, .. } if now >= retry_at => Step::Connect,
            ReconnectState::Disconnected { .. } | ReconnectState::Exhausted => Step::Unavailable,
        }
    }

    pub fn connected(&mut self) {
        self.state = ReconnectState::Connected;
    }

    /// Record a failed connect attempt and schedule the next one.
    pub fn connect_failed(&mut self, now: Instant) {
        let failures = match self.state {
            ReconnectState::Disconnected { failures, .. } => failures + 1,
            ReconnectState::Connected => 1,
            ReconnectState::Exhausted => return,
        };

        self.state = if self.policy.allows(failures) {
            ReconnectState::Disconnected {
                failures,
                retry_at: now + self.policy.delay_for(failures),
            }
        } else {
            ReconnectState::Exhausted
        };
    }

    /// An established connection broke. The first reconnect is immediate.
    pub fn connection_lost(&mut self, now: Instant) {
        if self.state == ReconnectState::Connected {
            self.state = ReconnectState::Disconnected {
                failures: 0,
                retry_at: now,
            };
        }
    }
}
