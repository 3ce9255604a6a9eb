//! Booking metrics.
//!
//! Recorded through the `metrics` facade; whichever recorder the process installs
//! receives them. With no recorder installed they are no-ops.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `booking_requests_total{outcome}` - Bookings by outcome (`completed`, `timeout`,
//!   `not_ready`, `publish_failed`, `subscription_failed`, `internal`)
//!
//! ## Gauges
//! - `event_bus_active_subscriptions` - Open bus subscriptions (maintained by the core)
//!
//! ## Histograms
//! - `booking_request_duration_seconds` - Time from request to completion or failure

use crate::error::ErrorKind;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use std::time::Duration;

/// Outcome label for a successful booking.
pub const OUTCOME_COMPLETED: &str = "completed";

/// Register metric descriptions. Call once at startup.
pub fn register_booking_metrics() {
    describe_counter!(
        "booking_requests_total",
        "Total number of booking requests by outcome"
    );
    describe_histogram!(
        "booking_request_duration_seconds",
        "Time taken from booking request to completion event or failure"
    );
    describe_gauge!(
        booking_relay_core::subscription::ACTIVE_SUBSCRIPTIONS_GAUGE,
        "Current number of open event bus subscriptions"
    );

    tracing::info!("Booking metrics registered");
}

/// Record a booking that received its completion event.
pub fn record_booking_completed(elapsed: Duration) {
    record_outcome(OUTCOME_COMPLETED, elapsed);
}

/// Record a booking that failed.
pub fn record_booking_failed(kind: ErrorKind, elapsed: Duration) {
    record_outcome(kind.as_str(), elapsed);
}

fn record_outcome(outcome: &'static str, elapsed: Duration) {
    metrics::counter!("booking_requests_total", "outcome" => outcome).increment(1);
    metrics::histogram!("booking_request_duration_seconds").record(elapsed.as_secs_f64());
    tracing::debug!(outcome, elapsed_ms = elapsed.as_millis(), "Recorded booking metric");
}
