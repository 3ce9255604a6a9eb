//! Subscription handles.
//!
//! A [`Subscription`] represents one live listener on one topic. The transport side of
//! the subscription runs in a worker task that owns the dedicated channel and forwards
//! messages through a bounded buffer. Releasing the handle signals the worker, which
//! unsubscribes and closes its channel; [`Subscription::release`] waits for that
//! teardown to finish.
//!
//! Dropping a handle without releasing it (for example when the owning request is
//! cancelled) still signals the worker, so teardown happens on every path.
//!
//! Teardown is bounded: a worker that has not finished within the release timeout is
//! aborted, which drops whatever transport resources it still holds.

use crate::event_bus::{BusMessage, EventBusError};
use metrics::Gauge;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Gauge tracking subscriptions whose worker is still alive.
pub const ACTIVE_SUBSCRIPTIONS_GAUGE: &str = "event_bus_active_subscriptions";

/// How long a worker gets to tear down after release before it is aborted.
pub const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_secs(2);

/// Item delivered by a subscription.
pub type SubscriptionItem = Result<BusMessage, EventBusError>;

/// Live listener on a single topic.
///
/// Not `Clone`: exactly one owner is responsible for releasing it.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    messages: mpsc::Receiver<SubscriptionItem>,
    shutdown: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
    release_timeout: Duration,
}

/// Transport side of a [`Subscription`], handed to the worker task.
#[derive(Debug)]
pub struct SubscriptionFeed {
    sender: mpsc::Sender<SubscriptionItem>,
    shutdown: oneshot::Receiver<()>,
}

impl SubscriptionFeed {
    /// Forward an item to the subscriber.
    ///
    /// Returns `false` once the subscriber is gone; the worker should stop.
    pub async fn deliver(&self, item: SubscriptionItem) -> bool {
        self.sender.send(item).await.is_ok()
    }

    /// Resolves when the subscriber released or dropped the handle.
    pub async fn closed(&mut self) {
        tokio::select! {
            _ = &mut self.shutdown => {}
            () = self.sender.closed() => {}
        }
    }
}

impl Subscription {
    /// Spawn the worker for a freshly acknowledged subscription.
    ///
    /// `worker` owns the transport resources. It must return only after it has torn
    /// them down (unsubscribe + close). The returned handle delivers what the worker
    /// forwards through [`SubscriptionFeed::deliver`].
    ///
    /// # Panics
    ///
    /// Panics if `buffer_size` is 0.
    pub fn spawn<F, Fut>(topic: impl Into<String>, buffer_size: usize, worker: F) -> Self
    where
        F: FnOnce(SubscriptionFeed) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let topic = topic.into();
        let (sender, messages) = mpsc::channel(buffer_size);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let feed = SubscriptionFeed {
            sender,
            shutdown: shutdown_rx,
        };

        let live = LiveWorker::new(&topic);
        let task = worker(feed);
        let worker = tokio::spawn(async move {
            // Decrements on completion and on abort
            let _live = live;
            task.await;
        });

        Self {
            topic,
            messages,
            shutdown: Some(shutdown_tx),
            worker: Some(worker),
            release_timeout: DEFAULT_RELEASE_TIMEOUT,
        }
    }

    /// Override how long [`Subscription::release`] waits for the worker's teardown.
    #[must_use]
    pub fn with_release_timeout(mut self, timeout: Duration) -> Self {
        self.release_timeout = timeout;
        self
    }

    /// Topic this subscription listens on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Receive the next item, or `None` once the worker has stopped.
    pub async fn next(&mut self) -> Option<SubscriptionItem> {
        self.messages.recv().await
    }

    /// Release the subscription and wait until the transport side is torn down.
    ///
    /// Returns within the release timeout whatever the transport does.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::TransportError`] if the worker task panicked, or did not
    /// finish its cleanup in time and was aborted.
    pub async fn release(mut self) -> Result<(), EventBusError> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.messages.close();

        if let Some(mut worker) = self.worker.take() {
            match tokio::time::timeout(self.release_timeout, &mut worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return Err(EventBusError::TransportError(format!(
                        "Subscription worker for '{}' failed: {e}",
                        self.topic
                    )));
                }
                Err(_) => {
                    worker.abort();
                    return Err(EventBusError::TransportError(format!(
                        "Subscription worker for '{}' did not tear down within {:?}, aborted",
                        self.topic, self.release_timeout
                    )));
                }
            }
        }

        tracing::debug!(topic = %self.topic, "Subscription released");
        Ok(())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            return;
        };
        tracing::debug!(
            topic = %self.topic,
            "Subscription dropped without release, signalling worker"
        );
        let _ = shutdown.send(());

        // Nobody awaits the worker any more: abort it if teardown overruns
        if let (Some(worker), Ok(runtime)) =
            (self.worker.take(), tokio::runtime::Handle::try_current())
        {
            let grace = self.release_timeout;
            let abort = worker.abort_handle();
            runtime.spawn(async move {
                if tokio::time::timeout(grace, worker).await.is_err() {
                    abort.abort();
                }
            });
        }
    }
}

/// Keeps [`ACTIVE_SUBSCRIPTIONS_GAUGE`] in step with live workers.
struct LiveWorker {
    gauge: Gauge,
}

impl LiveWorker {
    fn new(topic: &str) -> Self {
        let gauge = metrics::gauge!(ACTIVE_SUBSCRIPTIONS_GAUGE, "topic" => topic.to_string());
        gauge.increment(1.0);
        Self { gauge }
    }
}

impl Drop for LiveWorker {
    fn drop(&mut self) {
        self.gauge.decrement(1.0);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn echo_subscription(torn_down: Arc<AtomicBool>) -> Subscription {
        Subscription::spawn("test-topic", 8, move |mut feed| async move {
            let _ = feed
                .deliver(Ok(BusMessage::new("test-topic", b"hello".to_vec())))
                .await;
            feed.closed().await;
            torn_down.store(true, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn delivers_and_releases() {
        let torn_down = Arc::new(AtomicBool::new(false));
        let mut subscription = echo_subscription(torn_down.clone());

        let message = subscription.next().await.unwrap().unwrap();
        assert_eq!(message.payload_str(), Some("hello"));
        assert_eq!(subscription.topic(), "test-topic");

        subscription.release().await.unwrap();
        assert!(torn_down.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn drop_signals_worker() {
        let torn_down = Arc::new(AtomicBool::new(false));
        let subscription = echo_subscription(torn_down.clone());
        drop(subscription);

        for _ in 0..100 {
            if torn_down.load(Ordering::SeqCst) {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("worker was not torn down after drop");
    }

    #[tokio::test(start_paused = true)]
    async fn release_aborts_worker_stuck_in_teardown() {
        let torn_down = Arc::new(AtomicBool::new(false));
        let flag = torn_down.clone();
        let subscription = Subscription::spawn("test-topic", 1, move |mut feed| async move {
            feed.closed().await;
            // Teardown that never completes, e.g. an unanswered UNSUBSCRIBE
            std::future::pending::<()>().await;
            flag.store(true, Ordering::SeqCst);
        })
        .with_release_timeout(Duration::from_millis(100));

        let started = tokio::time::Instant::now();
        let err = subscription.release().await.unwrap_err();

        assert!(matches!(err, EventBusError::TransportError(ref reason) if reason.contains("aborted")));
        assert!(started.elapsed() <= Duration::from_millis(150));
        assert!(!torn_down.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_subscription_with_stuck_worker_is_aborted() {
        let dropped = Arc::new(AtomicBool::new(false));

        struct SetOnDrop(Arc<AtomicBool>);
        impl Drop for SetOnDrop {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let guard = SetOnDrop(dropped.clone());
        let subscription = Subscription::spawn("test-topic", 1, move |mut feed| async move {
            let _guard = guard;
            feed.closed().await;
            std::future::pending::<()>().await;
        })
        .with_release_timeout(Duration::from_millis(100));

        drop(subscription);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn release_reports_panicked_worker() {
        let subscription = Subscription::spawn("test-topic", 1, |_feed| async move {
            panic!("worker blew up");
        });

        let err = subscription.release().await.unwrap_err();
        assert!(matches!(err, EventBusError::TransportError(_)));
    }
}
