//! Booking Relay - request/response over a fire-and-forget message bus
//!
//! A booking request is announced on the `bookingStarted` topic and the caller waits
//! for the payment result that some other process publishes on `paymentCompleted`.
//!
//! # Architecture
//!
//! ```text
//! HTTP POST /publishBooking
//!          │
//!          ▼
//! ┌────────────────────┐   1. open (acknowledged)   ┌────────────────────────┐
//! │ BookingCoordinator │ ─────────────────────────► │ CorrelatedSubscription │
//! │                    │                            │   (paymentCompleted)   │
//! │                    │   2. publish StartEvent    └────────────────────────┘
//! │                    │ ─────────► Publisher ─────► bookingStarted      │
//! │                    │                                                 │
//! │                    │ ◄────── 3. first CompletionEvent with our ──────┘
//! └────────────────────┘            correlation id (bounded wait)
//! ```
//!
//! # Key Features
//!
//! - **Subscribe before publish**: a reply published the instant the start event lands
//!   is never lost
//! - **Correlation**: every request carries a fresh [`CorrelationId`]; concurrent
//!   requests only ever see their own reply
//! - **No leaks**: the per-request subscription is released on success, timeout and error
//! - **Bounded waiting**: every request has a timeout
//!
//! [`CorrelationId`]: booking_relay_core::CorrelationId

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod server;
pub mod types;

pub use config::Config;
pub use coordinator::{BookingCoordinator, CoordinatorConfig};
pub use error::{CoordinatorError, ErrorKind};
pub use types::{
    BookingRequest, BookingSubmission, CompletionEvent, InvalidBooking, PaymentDetails,
    PaymentStatus, StartEvent,
};
