//! Request/response correlation over pub/sub.
//!
//! Pub/sub is one-way: a publisher never learns who, if anyone, received its message.
//! [`CorrelatedSubscription`] turns a response topic into an awaitable, request-scoped
//! reply channel:
//!
//! ```text
//! idle ──► subscribing ──► listening ──┬──► resolved  ──┐
//!                                      ├──► timed_out ──┼──► released
//!                                      └──► errored   ──┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let correlation_id = CorrelationId::new();
//!
//! // Listening (acknowledged by the transport) before anything is published
//! let pending = correlated.open("paymentCompleted").await?;
//!
//! if let Err(e) = publisher.publish("bookingStarted", &start).await {
//!     pending.release().await?;
//!     return Err(e.into());
//! }
//!
//! // First matching message wins; the subscription is released on every path
//! let reply: PaymentReply = pending
//!     .wait(Duration::from_secs(30), |reply: &PaymentReply| reply.correlation_id == correlation_id)
//!     .await?;
//! ```
//!
//! # Key Design Points
//!
//! - **One subscription per request**: no shared waiter map, nothing to clean up later
//! - **Subscribe before publish**: `open` resolves only after the transport acknowledged
//! - **Bounded wait**: every wait has a timeout
//! - **Unconditional release**: resolved, timed out or errored, the handle is torn down
//!   before `wait` returns

use crate::event_bus::{EventBus, EventBusError};
use crate::subscription::Subscription;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Value tying a response message to the request that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Create a new random correlation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a correlated subscription is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationState {
    /// Nothing requested yet
    Idle,
    /// Subscribe command sent, not yet acknowledged
    Subscribing,
    /// Acknowledged; matching incoming messages
    Listening,
    /// A matching message arrived
    Resolved,
    /// No match within the bound
    TimedOut,
    /// Transport failure while listening
    Errored,
    /// Subscription and its channel are torn down
    Released,
}

impl fmt::Display for CorrelationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Subscribing => "subscribing",
            Self::Listening => "listening",
            Self::Resolved => "resolved",
            Self::TimedOut => "timed_out",
            Self::Errored => "errored",
            Self::Released => "released",
        };
        f.write_str(name)
    }
}

/// Errors from a correlated subscription.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    /// No matching message arrived within the bound
    #[error("No matching message on '{topic}' within {waited:?}")]
    Timeout {
        /// Topic that was listened on
        topic: String,
        /// The bound that elapsed
        waited: Duration,
    },

    /// Opening, subscribing or listening failed
    #[error("Subscription on '{topic}' failed: {source}")]
    Subscription {
        /// Topic of the failed subscription
        topic: String,
        /// Underlying bus error
        #[source]
        source: EventBusError,
    },
}

/// Factory for request-scoped response listeners.
#[derive(Clone)]
pub struct CorrelatedSubscription {
    bus: Arc<dyn EventBus>,
}

impl CorrelatedSubscription {
    /// Create a factory over `bus`.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    /// Subscribe to `topic` and return once the transport acknowledged it.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Subscription`] if the bus is not ready or the
    /// dedicated channel cannot be opened.
    pub async fn open(&self, topic: &str) -> Result<PendingResponse, CorrelationError> {
        tracing::debug!(topic = %topic, state = %CorrelationState::Subscribing, "Opening correlated subscription");

        if !self.bus.is_ready() {
            return Err(CorrelationError::Subscription {
                topic: topic.to_string(),
                source: EventBusError::NotReady,
            });
        }

        let subscription =
            self.bus
                .subscribe(topic)
                .await
                .map_err(|source| CorrelationError::Subscription {
                    topic: topic.to_string(),
                    source,
                })?;

        tracing::debug!(topic = %topic, state = %CorrelationState::Listening, "Correlated subscription acknowledged");

        Ok(PendingResponse {
            subscription,
            state: CorrelationState::Listening,
        })
    }

    /// Open a subscription on `topic` and wait for the first message matching
    /// `predicate`.
    ///
    /// # Errors
    ///
    /// See [`CorrelatedSubscription::open`] and [`PendingResponse::wait`].
    pub async fn await_one<T, P>(
        &self,
        topic: &str,
        timeout: Duration,
        predicate: P,
    ) -> Result<T, CorrelationError>
    where
        T: DeserializeOwned + Send,
        P: Fn(&T) -> bool + Send + Sync,
    {
        self.open(topic).await?.wait(timeout, predicate).await
    }
}

impl fmt::Debug for CorrelatedSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelatedSubscription").finish_non_exhaustive()
    }
}

/// An acknowledged subscription waiting for its response.
#[derive(Debug)]
pub struct PendingResponse {
    subscription: Subscription,
    state: CorrelationState,
}

impl PendingResponse {
    /// Topic being listened on.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.subscription.topic()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> CorrelationState {
        self.state
    }

    /// Wait for the first message that decodes as `T` and satisfies `predicate`.
    ///
    /// Non-matching messages and messages that fail to decode are skipped. The
    /// subscription is released before this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// - [`CorrelationError::Timeout`] if nothing matches within `timeout`
    /// - [`CorrelationError::Subscription`] if the transport fails while listening
    pub async fn wait<T, P>(mut self, timeout: Duration, predicate: P) -> Result<T, CorrelationError>
    where
        T: DeserializeOwned + Send,
        P: Fn(&T) -> bool + Send + Sync,
    {
        let topic = self.topic().to_string();

        let waited = tokio::time::timeout(timeout, self.first_match(&predicate)).await;

        let outcome = match waited {
            Ok(Ok(value)) => {
                self.transition(CorrelationState::Resolved);
                Ok(value)
            }
            Ok(Err(source)) => {
                self.transition(CorrelationState::Errored);
                Err(CorrelationError::Subscription {
                    topic: topic.clone(),
                    source,
                })
            }
            Err(_) => {
                self.transition(CorrelationState::TimedOut);
                Err(CorrelationError::Timeout {
                    topic: topic.clone(),
                    waited: timeout,
                })
            }
        };

        if let Err(e) = self.release().await {
            tracing::warn!(topic = %topic, error = %e, "Correlated subscription cleanup failed");
        }

        outcome
    }

    /// Release the subscription without waiting for a response.
    ///
    /// # Errors
    ///
    /// Returns the transport error if teardown did not complete cleanly. The
    /// subscription is gone either way.
    pub async fn release(mut self) -> Result<(), EventBusError> {
        let topic = self.topic().to_string();
        let last = self.state;
        self.state = CorrelationState::Released;
        self.subscription.release().await?;
        tracing::debug!(topic = %topic, from = %last, state = %CorrelationState::Released, "Correlated subscription released");
        Ok(())
    }

    async fn first_match<T, P>(&mut self, predicate: &P) -> Result<T, EventBusError>
    where
        T: DeserializeOwned,
        P: Fn(&T) -> bool,
    {
        while let Some(item) = self.subscription.next().await {
            let message = item?;
            match message.decode::<T>() {
                Ok(value) if predicate(&value) => return Ok(value),
                Ok(_) => {
                    tracing::debug!(topic = %message.topic, "Ignoring message for another request");
                }
                Err(e) => {
                    tracing::warn!(topic = %message.topic, error = %e, "Ignoring undecodable message");
                }
            }
        }

        Err(EventBusError::TransportError(format!(
            "Subscription to '{}' ended before a matching message arrived",
            self.topic()
        )))
    }

    fn transition(&mut self, next: CorrelationState) {
        tracing::debug!(topic = %self.topic(), from = %self.state, to = %next, "Correlated subscription transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_ids_are_unique() {
        assert_ne!(CorrelationId::new(), CorrelationId::new());
    }

    #[test]
    fn correlation_id_serializes_as_plain_uuid() {
        let uuid = Uuid::nil();
        let id = CorrelationId::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, format!("\"{uuid}\""));
        assert_eq!(id.as_uuid(), &uuid);
    }

    #[test]
    fn timeout_error_display() {
        let err = CorrelationError::Timeout {
            topic: "paymentCompleted".to_string(),
            waited: Duration::from_secs(2),
        };
        assert_eq!(
            err.to_string(),
            "No matching message on 'paymentCompleted' within 2s"
        );
    }
}
