//! Errors surfaced by the booking coordinator.

use booking_relay_core::{CorrelationError, EventBusError};
use std::time::Duration;
use thiserror::Error;

/// Why a booking could not be completed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// The bus connection is not ready; nothing was published or subscribed
    #[error("Event bus is not ready")]
    NotReady,

    /// The start event could not be published
    #[error("Failed to publish start event: {0}")]
    Publish(#[source] EventBusError),

    /// The completion subscription could not be opened or broke while listening
    #[error("Completion subscription failed: {0}")]
    Subscription(#[source] EventBusError),

    /// No correlated completion arrived in time
    #[error("No completion on '{topic}' within {waited:?}")]
    Timeout {
        /// Topic that was listened on
        topic: String,
        /// The bound that elapsed
        waited: Duration,
    },

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`CoordinatorError`], used for metrics and HTTP
/// status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`CoordinatorError::NotReady`]
    NotReady,
    /// See [`CoordinatorError::Publish`]
    Publish,
    /// See [`CoordinatorError::Subscription`]
    Subscription,
    /// See [`CoordinatorError::Timeout`]
    Timeout,
    /// See [`CoordinatorError::Internal`]
    Internal,
}

impl ErrorKind {
    /// Stable label, e.g. for metric dimensions.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotReady => "not_ready",
            Self::Publish => "publish_failed",
            Self::Subscription => "subscription_failed",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        }
    }
}

impl CoordinatorError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotReady => ErrorKind::NotReady,
            Self::Publish(_) => ErrorKind::Publish,
            Self::Subscription(_) => ErrorKind::Subscription,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Map a failure returned by the publisher.
    #[must_use]
    pub fn from_publish(error: EventBusError) -> Self {
        match error {
            EventBusError::NotReady => Self::NotReady,
            EventBusError::SerializationFailed(reason) => Self::Internal(reason),
            other => Self::Publish(other),
        }
    }
}

impl From<CorrelationError> for CoordinatorError {
    fn from(error: CorrelationError) -> Self {
        match error {
            CorrelationError::Timeout { topic, waited } => Self::Timeout { topic, waited },
            CorrelationError::Subscription {
                source: EventBusError::NotReady,
                ..
            } => Self::NotReady,
            CorrelationError::Subscription { source, .. } => Self::Subscription(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_errors_map_to_kinds() {
        let timeout = CoordinatorError::from(CorrelationError::Timeout {
            topic: "paymentCompleted".to_string(),
            waited: Duration::from_secs(30),
        });
        assert_eq!(timeout.kind(), ErrorKind::Timeout);

        let not_ready = CoordinatorError::from(CorrelationError::Subscription {
            topic: "paymentCompleted".to_string(),
            source: EventBusError::NotReady,
        });
        assert_eq!(not_ready, CoordinatorError::NotReady);

        let broken = CoordinatorError::from(CorrelationError::Subscription {
            topic: "paymentCompleted".to_string(),
            source: EventBusError::TransportError("reset".to_string()),
        });
        assert_eq!(broken.kind(), ErrorKind::Subscription);
    }

    #[test]
    fn publish_errors_map_to_kinds() {
        assert_eq!(
            CoordinatorError::from_publish(EventBusError::NotReady),
            CoordinatorError::NotReady
        );
        assert_eq!(
            CoordinatorError::from_publish(EventBusError::SerializationFailed("nan".to_string()))
                .kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            CoordinatorError::from_publish(EventBusError::PublishFailed {
                topic: "bookingStarted".to_string(),
                reason: "closed".to_string(),
            })
            .kind(),
            ErrorKind::Publish
        );
    }

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(ErrorKind::Timeout.as_str(), "timeout");
        assert_eq!(ErrorKind::NotReady.as_str(), "not_ready");
    }
}
