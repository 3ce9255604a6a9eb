//! Mock implementations for testing.

use booking_relay_core::connection::{ConnectionState, ConnectionStatus};
use booking_relay_core::event_bus::{BusFuture, BusMessage, EventBus, EventBusError};
use booking_relay_core::subscription::Subscription;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Subscription buffer used when none is configured.
const DEFAULT_BUFFER_SIZE: usize = 64;

type Subscribers = HashMap<String, Vec<(u64, mpsc::UnboundedSender<BusMessage>)>>;

/// In-memory event bus for tests.
///
/// Behaves like a pub/sub transport with no replay: a message reaches only the
/// subscriptions registered on its topic at publish time. Subscriptions are registered
/// before `subscribe` resolves, mirroring a transport acknowledgment.
///
/// Clones share the same bus.
///
/// # Example
///
/// ```
/// use booking_relay_testing::InMemoryEventBus;
/// use booking_relay_core::event_bus::EventBus;
///
/// # tokio_test::block_on(async {
/// let bus = InMemoryEventBus::new();
/// let mut subscription = bus.subscribe("greetings").await.unwrap();
///
/// bus.publish("greetings", b"hello").await.unwrap();
/// let message = subscription.next().await.unwrap().unwrap();
/// assert_eq!(message.payload_str(), Some("hello"));
///
/// subscription.release().await.unwrap();
/// assert_eq!(bus.active_subscriptions("greetings"), 0);
/// # });
/// ```
#[derive(Clone)]
pub struct InMemoryEventBus {
    inner: Arc<Inner>,
}

struct Inner {
    status: ConnectionStatus,
    subscribers: Mutex<Subscribers>,
    published: Mutex<Vec<BusMessage>>,
    next_subscription_id: AtomicU64,
    publish_attempts: AtomicUsize,
    subscribe_attempts: AtomicUsize,
    fail_publishes: AtomicBool,
    fail_subscribes: AtomicBool,
    buffer_size: usize,
}

impl Inner {
    fn subscribers(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn published(&self) -> MutexGuard<'_, Vec<BusMessage>> {
        self.published.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unregister(&self, topic: &str, id: u64) {
        let mut subscribers = self.subscribers();
        if let Some(entries) = subscribers.get_mut(topic) {
            entries.retain(|(entry_id, _)| *entry_id != id);
            if entries.is_empty() {
                subscribers.remove(topic);
            }
        }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    /// Create a connected (ready) bus.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create a connected bus whose subscriptions buffer `buffer_size` messages.
    #[must_use]
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        let status = ConnectionStatus::new();
        status.set(ConnectionState::Ready);
        Self {
            inner: Arc::new(Inner {
                status,
                subscribers: Mutex::new(HashMap::new()),
                published: Mutex::new(Vec::new()),
                next_subscription_id: AtomicU64::new(0),
                publish_attempts: AtomicUsize::new(0),
                subscribe_attempts: AtomicUsize::new(0),
                fail_publishes: AtomicBool::new(false),
                fail_subscribes: AtomicBool::new(false),
                buffer_size,
            }),
        }
    }

    /// Create a bus that has not connected yet.
    #[must_use]
    pub fn not_ready() -> Self {
        let bus = Self::new();
        bus.set_state(ConnectionState::Uninitialized);
        bus
    }

    /// This bus as a shared trait object.
    #[must_use]
    pub fn shared(&self) -> Arc<dyn EventBus> {
        Arc::new(self.clone())
    }

    /// Drive the connection lifecycle.
    pub fn set_state(&self, state: ConnectionState) {
        self.inner.status.set(state);
    }

    /// Connection status shared with the bus.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.inner.status.clone()
    }

    /// Make every subsequent publish fail (or stop failing).
    pub fn fail_publishes(&self, fail: bool) {
        self.inner.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent subscribe fail (or stop failing).
    pub fn fail_subscribes(&self, fail: bool) {
        self.inner.fail_subscribes.store(fail, Ordering::SeqCst);
    }

    /// Messages successfully published on `topic`, in order.
    #[must_use]
    pub fn published(&self, topic: &str) -> Vec<BusMessage> {
        self.inner
            .published()
            .iter()
            .filter(|message| message.topic == topic)
            .cloned()
            .collect()
    }

    /// Number of `publish` calls, including rejected ones.
    #[must_use]
    pub fn publish_attempts(&self) -> usize {
        self.inner.publish_attempts.load(Ordering::SeqCst)
    }

    /// Number of `subscribe` calls, including rejected ones.
    #[must_use]
    pub fn subscribe_attempts(&self) -> usize {
        self.inner.subscribe_attempts.load(Ordering::SeqCst)
    }

    /// Subscriptions on `topic` that have not been torn down yet.
    #[must_use]
    pub fn active_subscriptions(&self, topic: &str) -> usize {
        self.inner.subscribers().get(topic).map_or(0, Vec::len)
    }

    /// Subscriptions across all topics that have not been torn down yet.
    #[must_use]
    pub fn total_active_subscriptions(&self) -> usize {
        self.inner.subscribers().values().map(Vec::len).sum()
    }
}

impl EventBus for InMemoryEventBus {
    fn is_ready(&self) -> bool {
        self.inner.status.is_ready()
    }

    fn publish(&self, topic: &str, payload: &[u8]) -> BusFuture<'_, ()> {
        let message = BusMessage::new(topic, payload.to_vec());

        Box::pin(async move {
            self.inner.publish_attempts.fetch_add(1, Ordering::SeqCst);

            if !self.is_ready() {
                return Err(EventBusError::NotReady);
            }
            if self.inner.fail_publishes.load(Ordering::SeqCst) {
                return Err(EventBusError::PublishFailed {
                    topic: message.topic,
                    reason: "injected publish failure".to_string(),
                });
            }

            self.inner.published().push(message.clone());

            let subscribers = self.inner.subscribers();
            if let Some(entries) = subscribers.get(&message.topic) {
                for (_, sender) in entries {
                    let _ = sender.send(message.clone());
                }
            }

            Ok(())
        })
    }

    fn subscribe(&self, topic: &str) -> BusFuture<'_, Subscription> {
        let topic = topic.to_string();

        Box::pin(async move {
            self.inner.subscribe_attempts.fetch_add(1, Ordering::SeqCst);

            if !self.is_ready() {
                return Err(EventBusError::NotReady);
            }
            if self.inner.fail_subscribes.load(Ordering::SeqCst) {
                return Err(EventBusError::SubscriptionFailed {
                    topic,
                    reason: "injected subscribe failure".to_string(),
                });
            }

            // Registered before returning: this is the acknowledgment.
            let id = self.inner.next_subscription_id.fetch_add(1, Ordering::SeqCst);
            let (sender, mut receiver) = mpsc::unbounded_channel();
            self.inner
                .subscribers()
                .entry(topic.clone())
                .or_default()
                .push((id, sender));

            let inner = Arc::clone(&self.inner);
            let worker_topic = topic.clone();

            Ok(Subscription::spawn(
                topic,
                self.inner.buffer_size,
                move |mut feed| async move {
                    loop {
                        tokio::select! {
                            () = feed.closed() => break,
                            message = receiver.recv() => match message {
                                Some(message) => {
                                    if !feed.deliver(Ok(message)).await {
                                        break;
                                    }
                                }
                                None => break,
                            },
                        }
                    }
                    inner.unregister(&worker_topic, id);
                },
            ))
        })
    }
}
