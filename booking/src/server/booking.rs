//! `POST /publishBooking`.

use super::error::AppError;
use super::state::AppState;
use crate::types::{BookingSubmission, CompletionEvent};
use axum::{Json, extract::State, extract::rejection::JsonRejection};
use serde::{Deserialize, Serialize};

/// Status reported alongside a received completion event.
pub const PAYMENT_COMPLETED: &str = "paymentCompleted";

/// Successful booking response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingResponse {
    /// Always `paymentCompleted`
    pub status: String,
    /// The completion event, unchanged
    pub data: CompletionEvent,
}

/// Publish a booking and wait for its payment completion.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:3000/publishBooking \
///   -H 'content-type: application/json' \
///   -d '{"roomId":"101","date":"2025-12-11T10:00:00Z","price":100}'
/// # {"status":"paymentCompleted","data":{"status":"completed","data":{...}}}
/// ```
///
/// # Errors
///
/// - 400 if the body is malformed or `roomId`/`date` is missing
/// - 503 if the event bus is not ready
/// - 504 if no correlated completion arrives in time
/// - 500 on publish/subscribe failures
pub async fn publish_booking(
    State(state): State<AppState>,
    payload: Result<Json<BookingSubmission>, JsonRejection>,
) -> Result<Json<BookingResponse>, AppError> {
    // Readiness first, so a down bus reports 503 even for a bad body
    if !state.coordinator.is_ready() {
        return Err(AppError::unavailable("Event bus not ready"));
    }

    let Json(submission) = payload?;
    let request = submission.validate()?;

    tracing::info!(room_id = %request.room_id, date = %request.date, "Booking received");

    let event = state.coordinator.handle(request).await?;

    Ok(Json(BookingResponse {
        status: PAYMENT_COMPLETED.to_string(),
        data: event,
    }))
}
