//! Test helpers and utilities.

use booking_relay_core::event_bus::{EventBus, EventBusError};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Stand in for an external process that answers requests over the bus.
///
/// Subscribes to `request_topic` (acknowledged before this returns), then for every
/// JSON request calls `respond` and publishes its reply, if any, on `response_topic`.
/// Abort the returned handle to stop it; its subscription is torn down on drop.
///
/// # Errors
///
/// Returns the bus error if the subscription cannot be opened.
pub async fn spawn_responder<F>(
    bus: Arc<dyn EventBus>,
    request_topic: &str,
    response_topic: &str,
    respond: F,
) -> Result<JoinHandle<()>, EventBusError>
where
    F: Fn(Value) -> Option<Value> + Send + Sync + 'static,
{
    let mut subscription = bus.subscribe(request_topic).await?;
    let response_topic = response_topic.to_string();

    Ok(tokio::spawn(async move {
        while let Some(item) = subscription.next().await {
            let request = match item.and_then(|message| message.decode::<Value>()) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(error = %e, "Responder skipped a request");
                    continue;
                }
            };

            let Some(reply) = respond(request) else {
                continue;
            };

            match serde_json::to_vec(&reply) {
                Ok(bytes) => {
                    if let Err(e) = bus.publish(&response_topic, &bytes).await {
                        tracing::warn!(error = %e, "Responder failed to publish reply");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Responder failed to encode reply"),
            }
        }
    }))
}

/// Install a fmt subscriber honouring `RUST_LOG`, once per test binary.
///
/// Safe to call from every test; later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}
