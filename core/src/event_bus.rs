//! Event bus abstraction over a fire-and-forget publish/subscribe transport.
//!
//! This module provides the [`EventBus`] trait used by every other component in the
//! workspace. A bus publishes raw payloads on named topics and hands out
//! [`Subscription`] handles that deliver whatever is published on a topic *after* the
//! subscription was acknowledged.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐        publish(topic, bytes)        ┌───────────────┐
//! │    Publisher     │ ──────────────────────────────────► │               │
//! └──────────────────┘                                     │   EventBus    │
//!                                                          │ (Redis, fake) │
//! ┌──────────────────┐   subscribe(topic) → Subscription   │               │
//! │ Correlated Sub.  │ ◄────────────────────────────────── │               │
//! └──────────────────┘                                     └───────────────┘
//! ```
//!
//! # Delivery Semantics
//!
//! - **No replay**: messages published before a subscription is acknowledged are lost
//! - **At-least-once** at best, depending on the transport
//! - **Unordered** across subscribers
//!
//! # Implementations
//!
//! - `InMemoryEventBus` in `booking-relay-testing` - For tests (fault injection, accounting)
//! - `RedisEventBus` in `booking-relay-redis` - For production (Redis pub/sub)
//!
//! # Example
//!
//! ```rust,ignore
//! use booking_relay_core::event_bus::EventBus;
//!
//! async fn example(event_bus: &dyn EventBus) -> Result<(), EventBusError> {
//!     // Subscribe first: pub/sub has no replay
//!     let mut subscription = event_bus.subscribe("paymentCompleted").await?;
//!
//!     event_bus.publish("bookingStarted", br#"{"roomId":"101"}"#).await?;
//!
//!     if let Some(Ok(message)) = subscription.next().await {
//!         println!("Received: {:?}", message.payload_str());
//!     }
//!     subscription.release().await
//! }
//! ```

use crate::subscription::Subscription;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Failed to connect to the transport
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The bus connection is not (yet) established
    #[error("Event bus is not ready")]
    NotReady,

    /// Failed to publish a message to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to open a dedicated channel or subscribe to a topic
    #[error("Subscription failed for topic '{topic}': {reason}")]
    SubscriptionFailed {
        /// The topic that failed to subscribe
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to serialize a payload before publishing
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to deserialize a received payload
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Network or transport error while listening
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Generic error for other failures
    #[error("Event bus error: {0}")]
    Other(String),
}

/// A message received from a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Topic the message was published on
    pub topic: String,
    /// Raw payload bytes (JSON for every topic in this workspace)
    pub payload: Vec<u8>,
}

impl BusMessage {
    /// Create a new message.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Get the payload as a string (if valid UTF-8).
    #[must_use]
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Decode the JSON payload into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::DeserializationFailed`] if the payload is not valid JSON
    /// for `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, EventBusError> {
        serde_json::from_slice(&self.payload).map_err(|e| {
            EventBusError::DeserializationFailed(format!(
                "Failed to decode message on '{}': {e}",
                self.topic
            ))
        })
    }
}

/// Boxed future returned by [`EventBus`] operations.
pub type BusFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EventBusError>> + Send + 'a>>;

/// Trait for event bus implementations.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: one bus is shared by every in-flight request
/// as an `Arc<dyn EventBus>`.
///
/// # Dyn Compatibility
///
/// Methods return [`BusFuture`] instead of using `async fn` so the trait can be used as
/// a trait object and swapped for a fake in tests.
pub trait EventBus: Send + Sync {
    /// Non-blocking readiness check.
    ///
    /// Callers consult this before any publish or subscribe attempt.
    fn is_ready(&self) -> bool;

    /// Publish a payload to a topic.
    ///
    /// Exactly one message is sent per call; implementations never retry.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::NotReady`] if the connection is not established, or
    /// [`EventBusError::PublishFailed`] if the transport rejects the message.
    fn publish(&self, topic: &str, payload: &[u8]) -> BusFuture<'_, ()>;

    /// Subscribe to a topic on a dedicated channel.
    ///
    /// The returned future resolves only once the transport has acknowledged the
    /// subscription, so anything published after it resolves is delivered to the
    /// returned [`Subscription`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::NotReady`] if the connection is not established, or
    /// [`EventBusError::SubscriptionFailed`] if the dedicated channel cannot be opened
    /// or the subscribe command fails.
    fn subscribe(&self, topic: &str) -> BusFuture<'_, Subscription>;
}
