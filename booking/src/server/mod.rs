//! HTTP server module for the booking relay.
//!
//! This module provides the Axum-based HTTP server with:
//! - Application state management
//! - The booking endpoint
//! - Health and readiness endpoints
//! - Router configuration

pub mod booking;
pub mod error;
pub mod health;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use health::{health_check, readiness_check};
pub use routes::build_router;
pub use state::AppState;
