//! Router configuration for the booking relay.

use super::booking::publish_booking;
use super::health::{health_check, readiness_check};
use super::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// - `POST /publishBooking`
/// - `GET /health`
/// - `GET /ready`
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/publishBooking", post(publish_booking))
        // Health checks
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
