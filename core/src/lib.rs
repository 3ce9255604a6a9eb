//! # Booking Relay Core
//!
//! Request/response correlation on top of a fire-and-forget publish/subscribe bus.
//!
//! ## Core Concepts
//!
//! - **Event bus**: [`EventBus`], a dyn-compatible publish/subscribe transport
//! - **Subscription**: [`Subscription`], one live listener that must be released exactly once
//! - **Connection lifecycle**: [`ConnectionStatus`], a non-blocking readiness check
//! - **Publisher**: [`Publisher`], typed JSON publishing, one message per call
//! - **Correlated subscription**: [`CorrelatedSubscription`], a bounded, request-scoped
//!   wait for the first matching reply
//!
//! ## Example
//!
//! ```ignore
//! use booking_relay_core::*;
//!
//! let correlated = CorrelatedSubscription::new(bus.clone());
//! let publisher = Publisher::new(bus);
//!
//! let pending = correlated.open("paymentCompleted").await?;
//! publisher.publish("bookingStarted", &start_event).await?;
//! let reply: Reply = pending.wait(timeout, |r: &Reply| r.correlation_id == id).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod connection;
pub mod correlation;
pub mod event_bus;
pub mod publisher;
pub mod subscription;

pub use connection::{ConnectionState, ConnectionStatus};
pub use correlation::{
    CorrelatedSubscription, CorrelationError, CorrelationId, CorrelationState, PendingResponse,
};
pub use event_bus::{BusFuture, BusMessage, EventBus, EventBusError};
pub use publisher::Publisher;
pub use subscription::{
    DEFAULT_RELEASE_TIMEOUT, Subscription, SubscriptionFeed, SubscriptionItem,
};
