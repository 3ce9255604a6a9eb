//! Booking coordinator: announce a booking, await its payment result.
//!
//! # Flow
//!
//! ```text
//! handle(request)
//!   ├─ bus not ready?                       ──► NotReady (no publish, no subscribe)
//!   ├─ open paymentCompleted (acknowledged)  ──► Subscription error
//!   ├─ publish StartEvent on bookingStarted  ──► Publish error (subscription released)
//!   └─ wait for CompletionEvent with our id  ──► Timeout / Subscription error
//!                                                (subscription released either way)
//! ```
//!
//! Each call owns exactly one subscription and releases it before returning.

use crate::error::CoordinatorError;
use crate::metrics::{record_booking_completed, record_booking_failed};
use crate::types::{BookingRequest, CompletionEvent, StartEvent};
use booking_relay_core::{CorrelatedSubscription, CorrelationId, EventBus, Publisher};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

/// Default topic for start events.
pub const DEFAULT_STARTED_TOPIC: &str = "bookingStarted";

/// Default topic for completion events.
pub const DEFAULT_COMPLETED_TOPIC: &str = "paymentCompleted";

/// Default bound on waiting for a completion event.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Topics and timeout used by [`BookingCoordinator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Where start events are published
    pub started_topic: String,
    /// Where completion events are awaited
    pub completed_topic: String,
    /// How long to wait for the correlated completion
    pub timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            started_topic: DEFAULT_STARTED_TOPIC.to_string(),
            completed_topic: DEFAULT_COMPLETED_TOPIC.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl CoordinatorConfig {
    /// Override the wait bound.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Orchestrates one booking: subscribe, publish, await, return.
///
/// Stateless apart from the shared bus; clone freely and call concurrently.
#[derive(Clone)]
pub struct BookingCoordinator {
    bus: Arc<dyn EventBus>,
    publisher: Publisher,
    correlated: CorrelatedSubscription,
    config: CoordinatorConfig,
}

impl BookingCoordinator {
    /// Create a coordinator over `bus`.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>, config: CoordinatorConfig) -> Self {
        Self {
            publisher: Publisher::new(bus.clone()),
            correlated: CorrelatedSubscription::new(bus.clone()),
            bus,
            config,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Whether the underlying bus can take requests right now.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.bus.is_ready()
    }

    /// Publish `request` as a start event and return the correlated completion event.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::NotReady`] if the bus is not ready
    /// - [`CoordinatorError::Subscription`] if the completion topic cannot be listened on
    /// - [`CoordinatorError::Publish`] if the start event cannot be published
    /// - [`CoordinatorError::Timeout`] if no correlated completion arrives in time
    /// - [`CoordinatorError::Internal`] if the start event cannot be encoded
    pub async fn handle(&self, request: BookingRequest) -> Result<CompletionEvent, CoordinatorError> {
        let started = Instant::now();
        let correlation_id = CorrelationId::new();

        let span = tracing::info_span!(
            "booking",
            correlation_id = %correlation_id,
            room_id = %request.room_id,
        );
        let result = self.run(correlation_id, request).instrument(span).await;

        match &result {
            Ok(event) => {
                tracing::info!(correlation_id = %correlation_id, status = %event.status, "Booking completed");
                record_booking_completed(started.elapsed());
            }
            Err(e) => {
                // 5xx responses are logged at error level by the HTTP layer
                tracing::warn!(correlation_id = %correlation_id, kind = e.kind().as_str(), error = %e, "Booking failed");
                record_booking_failed(e.kind(), started.elapsed());
            }
        }

        result
    }

    async fn run(
        &self,
        correlation_id: CorrelationId,
        request: BookingRequest,
    ) -> Result<CompletionEvent, CoordinatorError> {
        if !self.bus.is_ready() {
            return Err(CoordinatorError::NotReady);
        }

        // Listening before the start event exists, so an immediate reply is buffered
        let pending = self.correlated.open(&self.config.completed_topic).await?;

        let event = StartEvent::new(correlation_id, request);
        if let Err(e) = self.publisher.publish(&self.config.started_topic, &event).await {
            if let Err(release_error) = pending.release().await {
                tracing::warn!(error = %release_error, "Failed to release completion subscription");
            }
            return Err(CoordinatorError::from_publish(e));
        }
        tracing::debug!(topic = %self.config.started_topic, "Start event published");

        let completion = pending
            .wait(self.config.timeout, |event: &CompletionEvent| {
                event.correlates_with(&correlation_id)
            })
            .await?;

        Ok(completion)
    }
}

impl std::fmt::Debug for BookingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.started_topic, "bookingStarted");
        assert_eq!(config.completed_topic, "paymentCompleted");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn with_timeout_overrides_bound() {
        let config = CoordinatorConfig::default().with_timeout(Duration::from_millis(5));
        assert_eq!(config.timeout, Duration::from_millis(5));
    }
}
