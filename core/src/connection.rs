//! Bus connection lifecycle.
//!
//! ```text
//! Uninitialized ──► Connecting ──► Ready ◄──► Failed
//!                        │           │
//!                        │           └──────► Closed
//!                        └──────► Failed
//! ```
//!
//! [`ConnectionStatus`] is shared between the transport (which drives the transitions)
//! and everything that needs a readiness check. Reads never block. After start-up the
//! transport reports outages and recoveries with [`ConnectionStatus::mark_unhealthy`]
//! and [`ConnectionStatus::mark_healthy`].

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle state of a bus connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection attempt yet
    #[default]
    Uninitialized,
    /// Connection attempt in progress
    Connecting,
    /// Connected; publish and subscribe are allowed
    Ready,
    /// Connection attempt failed, or an established connection was lost
    Failed,
    /// Closed on shutdown
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Shared, cheaply clonable view of a connection's lifecycle.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    state: Arc<watch::Sender<ConnectionState>>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStatus {
    /// Create a status in [`ConnectionState::Uninitialized`].
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Uninitialized);
        Self {
            state: Arc::new(state),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Non-blocking readiness check.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Transition to `next`.
    pub fn set(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "Bus connection state changed");
        }
    }

    /// Record that the transport just worked.
    ///
    /// Moves `Failed` back to `Ready`. Other states are left alone: a closed bus stays
    /// closed.
    pub fn mark_healthy(&self) {
        if self.transition_from(ConnectionState::Failed, ConnectionState::Ready) {
            tracing::info!("Bus connection recovered");
        }
    }

    /// Record that the transport lost its connection.
    ///
    /// Moves `Ready` to `Failed`, so readiness checks report the outage until
    /// [`ConnectionStatus::mark_healthy`] is called.
    pub fn mark_unhealthy(&self, reason: &str) {
        if self.transition_from(ConnectionState::Ready, ConnectionState::Failed) {
            tracing::warn!(reason = %reason, "Bus connection lost");
        }
    }

    fn transition_from(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::debug!(from = %from, to = %to, "Bus connection state changed");
        }
        changed
    }
}
