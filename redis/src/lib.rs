//! Redis event bus implementation for Booking Relay.
//!
//! This crate provides a Redis pub/sub implementation of the [`EventBus`] trait from
//! `booking-relay-core`, using the `redis` crate's tokio support.
//!
//! # Connections
//!
//! ```text
//!                    ┌──────────────────────────┐
//!  publish() ──────► │ ConnectionManager        │  shared, auto-reconnecting
//!                    └──────────────────────────┘
//!                    ┌──────────────────────────┐
//!  subscribe() ────► │ PubSub (dedicated)       │  one per subscription,
//!                    └──────────────────────────┘  closed on release
//! ```
//!
//! A Redis connection in SUBSCRIBE mode cannot issue regular commands, so every
//! subscription opens its own secondary channel from the same client (same address and
//! credentials) and closes it when the subscription is released.
//!
//! # Delivery Semantics
//!
//! Redis pub/sub is **at-most-once** with **no persistence**: a message published while
//! nobody is subscribed is gone. `subscribe` resolves only after Redis confirmed the
//! SUBSCRIBE, so subscribe-then-publish never loses the reply.
//!
//! # Readiness
//!
//! The [`ConnectionManager`] reconnects on its own, so readiness is tracked separately:
//! a connection-class error on publish/subscribe moves the bus to `Failed`, and a
//! background PING every health-check interval moves it back to `Ready` once Redis
//! answers again.
//!
//! # Example
//!
//! ```no_run
//! use booking_relay_redis::RedisEventBus;
//! use booking_relay_core::event_bus::EventBus;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedisEventBus::connect("redis://localhost:6379").await?;
//!
//! let mut subscription = event_bus.subscribe("paymentCompleted").await?;
//! event_bus.publish("bookingStarted", br#"{"roomId":"101"}"#).await?;
//!
//! if let Some(Ok(message)) = subscription.next().await {
//!     println!("Received: {:?}", message.payload_str());
//! }
//! subscription.release().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use booking_relay_core::connection::{ConnectionState, ConnectionStatus};
use booking_relay_core::event_bus::{BusFuture, BusMessage, EventBus, EventBusError};
use booking_relay_core::subscription::Subscription;
use futures::StreamExt;
use redis::aio::{ConnectionManager, PubSub};
use redis::{AsyncCommands, Client, RedisError, RedisResult};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Slack on top of the UNSUBSCRIBE bound before a subscription worker is aborted.
const TEARDOWN_MARGIN: Duration = Duration::from_millis(250);

/// Redis pub/sub event bus.
///
/// - **Publishing** goes through one shared [`ConnectionManager`]
/// - **Subscribing** opens a dedicated pub/sub connection per subscription
/// - **Readiness** is tracked by a [`ConnectionStatus`]
///
/// # Configuration
///
/// - **URL**: `redis://[user:password@]host:port[/db]` (required)
/// - **Connect timeout**: bound on the start-up connection (default: 10s)
/// - **Subscribe timeout**: bound on opening a channel + SUBSCRIBE (default: 5s)
/// - **Teardown timeout**: bound on UNSUBSCRIBE when a subscription is released (default: 1s)
/// - **Health check interval**: how often readiness is re-checked with PING (default: 5s)
/// - **Buffer size**: messages buffered per subscription (default: 64)
///
/// # Example
///
/// ```no_run
/// use booking_relay_redis::RedisEventBus;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedisEventBus::builder()
///     .url("redis://localhost:6379")
///     .connect_timeout(Duration::from_secs(3))
///     .buffer_size(128)
///     .connect()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct RedisEventBus {
    /// Client used to open dedicated pub/sub channels
    client: Client,
    /// Shared connection for publishing
    publisher: ConnectionManager,
    /// Connection lifecycle
    status: ConnectionStatus,
    /// Bound on opening a dedicated channel and subscribing
    subscribe_timeout: Duration,
    /// Bound on UNSUBSCRIBE during release
    teardown_timeout: Duration,
    /// Message buffer size for subscriptions
    buffer_size: usize,
    /// Background PING loop keeping `status` current
    health_monitor: JoinHandle<()>,
}

impl RedisEventBus {
    /// Connect with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the URL is invalid or Redis cannot
    /// be reached within the connect timeout.
    pub async fn connect(url: &str) -> Result<Self, EventBusError> {
        Self::builder().url(url).connect().await
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedisEventBusBuilder {
        RedisEventBusBuilder::default()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.status.state()
    }

    /// Open a dedicated connection for one subscriber.
    ///
    /// Uses the same address and credentials as the publishing connection but never
    /// shares its socket.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the connection cannot be opened.
    pub async fn open_secondary_channel(&self) -> Result<PubSub, EventBusError> {
        self.client.get_async_pubsub().await.map_err(|e| {
            self.observe_error(&e);
            EventBusError::ConnectionFailed(format!("Failed to open pub/sub channel: {e}"))
        })
    }

    /// Mark the bus closed. Subsequent publish/subscribe calls fail with
    /// [`EventBusError::NotReady`]; live subscriptions are unaffected until released.
    pub fn close(&self) {
        self.status.set(ConnectionState::Closed);
        self.health_monitor.abort();
        tracing::info!("RedisEventBus closed");
    }

    async fn open_subscription(&self, topic: &str) -> Result<PubSub, EventBusError> {
        let mut pubsub = self.open_secondary_channel().await?;
        pubsub.subscribe(topic).await.map_err(|e| {
            self.observe_error(&e);
            EventBusError::ConnectionFailed(format!("SUBSCRIBE rejected: {e}"))
        })?;
        Ok(pubsub)
    }

    /// Flag the bus as failed if `error` means the connection is gone.
    fn observe_error(&self, error: &RedisError) {
        if is_connection_error(error) {
            self.status.mark_unhealthy(&error.to_string());
        }
    }
}

impl Drop for RedisEventBus {
    fn drop(&mut self) {
        self.health_monitor.abort();
    }
}

/// Errors after which the connection cannot be trusted until Redis answers again.
fn is_connection_error(error: &RedisError) -> bool {
    error.is_io_error()
        || error.is_connection_dropped()
        || error.is_connection_refusal()
        || error.is_timeout()
}

/// PING Redis every `interval` and report the outcome to `status`.
///
/// Stops once the bus is closed.
fn spawn_health_monitor(
    connection: ConnectionManager,
    status: ConnectionStatus,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the connection was just verified
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if status.state() == ConnectionState::Closed {
                break;
            }

            let mut conn = connection.clone();
            let ping = async move {
                let pong: RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
                pong
            };

            match tokio::time::timeout(interval, ping).await {
                Ok(Ok(_)) => status.mark_healthy(),
                Ok(Err(e)) if is_connection_error(&e) => status.mark_unhealthy(&e.to_string()),
                Ok(Err(e)) => tracing::debug!(error = %e, "Health check PING rejected"),
                Err(_) => status.mark_unhealthy(&format!("PING not answered within {interval:?}")),
            }
        }

        tracing::debug!("Redis health monitor stopped");
    })
}

/// Builder for configuring a [`RedisEventBus`].
#[derive(Default)]
pub struct RedisEventBusBuilder {
    url: Option<String>,
    connect_timeout: Option<Duration>,
    subscribe_timeout: Option<Duration>,
    teardown_timeout: Option<Duration>,
    health_check_interval: Option<Duration>,
    buffer_size: Option<usize>,
}

impl RedisEventBusBuilder {
    /// Set the Redis URL (e.g., `redis://localhost:6379`).
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the bound on the start-up connection.
    ///
    /// Default: 10 seconds
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the bound on opening a dedicated channel and subscribing.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = Some(timeout);
        self
    }

    /// Set the bound on UNSUBSCRIBE when a subscription is released.
    ///
    /// A channel that does not confirm in time is closed without confirmation.
    ///
    /// Default: 1 second
    #[must_use]
    pub const fn teardown_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_timeout = Some(timeout);
        self
    }

    /// Set how often readiness is re-checked with PING.
    ///
    /// Default: 5 seconds
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    #[must_use]
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "health_check_interval must be non-zero");
        self.health_check_interval = Some(interval);
        self
    }

    /// Set the number of messages buffered per subscription.
    ///
    /// Default: 64
    ///
    /// # Panics
    ///
    /// Panics if `buffer_size` is 0.
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        assert!(buffer_size > 0, "buffer_size must be greater than 0");
        self.buffer_size = Some(buffer_size);
        self
    }

    /// Connect and build the [`RedisEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if:
    /// - URL not set or invalid
    /// - Redis not reachable within the connect timeout
    pub async fn connect(self) -> Result<RedisEventBus, EventBusError> {
        let status = ConnectionStatus::new();
        status.set(ConnectionState::Connecting);

        match self.try_connect(&status).await {
            Ok(bus) => {
                status.set(ConnectionState::Ready);
                Ok(bus)
            }
            Err(e) => {
                status.set(ConnectionState::Failed);
                tracing::error!(error = %e, "RedisEventBus connection failed");
                Err(e)
            }
        }
    }

    async fn try_connect(self, status: &ConnectionStatus) -> Result<RedisEventBus, EventBusError> {
        let url = self
            .url
            .ok_or_else(|| EventBusError::ConnectionFailed("Redis URL not configured".to_string()))?;
        let connect_timeout = self.connect_timeout.unwrap_or(Duration::from_secs(10));

        let client = Client::open(url.as_str()).map_err(|e| {
            EventBusError::ConnectionFailed(format!("Failed to create Redis client: {e}"))
        })?;

        let publisher = tokio::time::timeout(connect_timeout, ConnectionManager::new(client.clone()))
            .await
            .map_err(|_| {
                EventBusError::ConnectionFailed(format!(
                    "Redis not reachable within {connect_timeout:?}"
                ))
            })?
            .map_err(|e| {
                EventBusError::ConnectionFailed(format!(
                    "Failed to create Redis connection manager: {e}"
                ))
            })?;

        let buffer_size = self.buffer_size.unwrap_or(64);
        let subscribe_timeout = self.subscribe_timeout.unwrap_or(Duration::from_secs(5));
        let teardown_timeout = self.teardown_timeout.unwrap_or(Duration::from_secs(1));
        let health_check_interval = self
            .health_check_interval
            .unwrap_or(Duration::from_secs(5));

        tracing::info!(
            addr = %client.get_connection_info().addr,
            buffer_size = buffer_size,
            subscribe_timeout = ?subscribe_timeout,
            health_check_interval = ?health_check_interval,
            "RedisEventBus connected"
        );

        let health_monitor =
            spawn_health_monitor(publisher.clone(), status.clone(), health_check_interval);

        Ok(RedisEventBus {
            client,
            publisher,
            status: status.clone(),
            subscribe_timeout,
            teardown_timeout,
            buffer_size,
            health_monitor,
        })
    }
}

impl EventBus for RedisEventBus {
    fn is_ready(&self) -> bool {
        self.status.is_ready()
    }

    fn publish(&self, topic: &str, payload: &[u8]) -> BusFuture<'_, ()> {
        // Clone data before moving into async block
        let topic = topic.to_string();
        let payload = payload.to_vec();

        Box::pin(async move {
            if !self.is_ready() {
                return Err(EventBusError::NotReady);
            }

            let mut conn = self.publisher.clone();
            let receivers: i64 = conn.publish(&topic, payload).await.map_err(|e| {
                self.observe_error(&e);
                tracing::error!(topic = %topic, error = %e, "Failed to publish message");
                EventBusError::PublishFailed {
                    topic: topic.clone(),
                    reason: e.to_string(),
                }
            })?;

            tracing::debug!(topic = %topic, receivers = receivers, "Message published");
            Ok(())
        })
    }

    fn subscribe(&self, topic: &str) -> BusFuture<'_, Subscription> {
        let topic = topic.to_string();

        Box::pin(async move {
            if !self.is_ready() {
                return Err(EventBusError::NotReady);
            }

            let opened = tokio::time::timeout(self.subscribe_timeout, self.open_subscription(&topic))
                .await
                .unwrap_or_else(|_| {
                    let reason = format!(
                        "Subscribe not acknowledged within {:?}",
                        self.subscribe_timeout
                    );
                    self.status.mark_unhealthy(&reason);
                    Err(EventBusError::ConnectionFailed(reason))
                });

            let mut pubsub = opened.map_err(|e| {
                tracing::error!(topic = %topic, error = %e, "Failed to subscribe");
                EventBusError::SubscriptionFailed {
                    topic: topic.clone(),
                    reason: e.to_string(),
                }
            })?;

            tracing::info!(topic = %topic, "Subscribed to topic");

            let worker_topic = topic.clone();
            let teardown_timeout = self.teardown_timeout;
            let subscription = Subscription::spawn(topic, self.buffer_size, move |mut feed| async move {
                {
                    let mut stream = pubsub.on_message();
                    loop {
                        tokio::select! {
                            () = feed.closed() => break,
                            next = stream.next() => {
                                let Some(msg) = next else {
                                    let _ = feed
                                        .deliver(Err(EventBusError::TransportError(format!(
                                            "Pub/sub connection for '{worker_topic}' closed"
                                        ))))
                                        .await;
                                    break;
                                };

                                tracing::trace!(topic = %worker_topic, "Received message");
                                let message = BusMessage::new(
                                    msg.get_channel_name(),
                                    msg.get_payload_bytes().to_vec(),
                                );
                                if !feed.deliver(Ok(message)).await {
                                    break;
                                }
                            }
                        }
                    }
                }

                match tokio::time::timeout(teardown_timeout, pubsub.unsubscribe(&worker_topic)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(topic = %worker_topic, error = %e, "UNSUBSCRIBE failed, closing channel anyway");
                    }
                    Err(_) => {
                        tracing::warn!(topic = %worker_topic, timeout = ?teardown_timeout, "UNSUBSCRIBE not confirmed, closing channel anyway");
                    }
                }
                drop(pubsub);
                tracing::debug!(topic = %worker_topic, "Dedicated pub/sub channel closed");
            });

            Ok(subscription.with_release_timeout(self.teardown_timeout + TEARDOWN_MARGIN))
        })
    }
}
