//! Typed publishing on top of an [`EventBus`].

use crate::event_bus::{EventBus, EventBusError};
use serde::Serialize;
use std::sync::Arc;

/// Serializes typed events to JSON and publishes them on a topic.
///
/// One call sends exactly one message. There is no retry: a failure is returned to the
/// caller, who owns any retry policy.
#[derive(Clone)]
pub struct Publisher {
    bus: Arc<dyn EventBus>,
}

impl Publisher {
    /// Create a publisher over `bus`.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    /// Serialize `payload` and publish it on `topic`.
    ///
    /// # Errors
    ///
    /// - [`EventBusError::NotReady`] if the bus is not connected (nothing is sent)
    /// - [`EventBusError::SerializationFailed`] if `payload` cannot be encoded
    /// - [`EventBusError::PublishFailed`] if the transport rejects the message
    pub async fn publish<T>(&self, topic: &str, payload: &T) -> Result<(), EventBusError>
    where
        T: Serialize + Sync + ?Sized,
    {
        if !self.bus.is_ready() {
            return Err(EventBusError::NotReady);
        }

        let bytes = serde_json::to_vec(payload)
            .map_err(|e| EventBusError::SerializationFailed(e.to_string()))?;

        self.bus.publish(topic, &bytes).await?;

        tracing::debug!(topic = %topic, bytes = bytes.len(), "Event published");
        Ok(())
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("ready", &self.bus.is_ready())
            .finish()
    }
}
