//! Application state for the booking HTTP server.

use crate::coordinator::BookingCoordinator;
use booking_relay_core::event_bus::EventBus;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Cloned (cheaply via Arc) for each request.
#[derive(Clone)]
pub struct AppState {
    /// Coordinator handling `/publishBooking`
    pub coordinator: Arc<BookingCoordinator>,

    /// Event bus, checked by the readiness endpoint
    pub event_bus: Arc<dyn EventBus>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(coordinator: Arc<BookingCoordinator>, event_bus: Arc<dyn EventBus>) -> Self {
        Self {
            coordinator,
            event_bus,
        }
    }
}
