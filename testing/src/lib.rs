//! # Booking Relay Testing
//!
//! Testing utilities for code built on `booking-relay-core`.
//!
//! This crate provides:
//! - [`InMemoryEventBus`]: a fake pub/sub transport with readiness control, fault
//!   injection, a publish log and live-subscription accounting
//! - [`spawn_responder`]: a stand-in for the external process that answers requests
//! - [`init_test_tracing`]: opt-in log output for tests
//!
//! ## Example
//!
//! ```ignore
//! use booking_relay_testing::{InMemoryEventBus, spawn_responder};
//!
//! #[tokio::test]
//! async fn test_round_trip() {
//!     let bus = InMemoryEventBus::new();
//!     let responder = spawn_responder(bus.shared(), "bookingStarted", "paymentCompleted", |request| {
//!         Some(serde_json::json!({ "status": "completed", "data": request }))
//!     })
//!     .await
//!     .unwrap();
//!
//!     // ... exercise the code under test ...
//!
//!     assert_eq!(bus.active_subscriptions("paymentCompleted"), 0);
//!     responder.abort();
//! }
//! ```

pub mod mocks;

pub mod helpers;

pub use helpers::{init_test_tracing, spawn_responder};
pub use mocks::InMemoryEventBus;
