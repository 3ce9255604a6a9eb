//! Tests for `Publisher` and `CorrelatedSubscription` against the in-memory bus.
//!
//! Run with: `cargo test -p booking-relay-testing --test correlation_tests`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use booking_relay_core::{
    BusFuture, CorrelatedSubscription, CorrelationError, CorrelationState, DEFAULT_RELEASE_TIMEOUT,
    EventBus, EventBusError, Publisher, Subscription,
};
use booking_relay_testing::{InMemoryEventBus, init_test_tracing};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Reply {
    key: String,
    value: u32,
}

fn reply(key: &str, value: u32) -> Vec<u8> {
    serde_json::to_vec(&Reply {
        key: key.to_string(),
        value,
    })
    .expect("encode reply")
}

// ============================================================================
// Publisher
// ============================================================================

#[tokio::test]
async fn publisher_sends_json_once() {
    let bus = InMemoryEventBus::new();
    let publisher = Publisher::new(bus.shared());

    publisher
        .publish("replies", &Reply { key: "a".to_string(), value: 1 })
        .await
        .expect("publish");

    let published = bus.published("replies");
    assert_eq!(published.len(), 1);
    assert_eq!(
        published[0].payload_str(),
        Some(r#"{"key":"a","value":1}"#)
    );
}

#[tokio::test]
async fn publisher_refuses_when_not_ready() {
    let bus = InMemoryEventBus::not_ready();
    let publisher = Publisher::new(bus.shared());

    let err = publisher.publish("replies", &1_u32).await.unwrap_err();

    assert_eq!(err, EventBusError::NotReady);
    assert_eq!(bus.publish_attempts(), 0);
}

#[tokio::test]
async fn publisher_surfaces_transport_rejection() {
    let bus = InMemoryEventBus::new();
    bus.fail_publishes(true);
    let publisher = Publisher::new(bus.shared());

    let err = publisher.publish("replies", &1_u32).await.unwrap_err();

    assert!(matches!(err, EventBusError::PublishFailed { ref topic, .. } if topic == "replies"));
    assert_eq!(bus.publish_attempts(), 1);
}

// ============================================================================
// CorrelatedSubscription
// ============================================================================

#[tokio::test]
async fn open_is_acknowledged_before_returning() {
    let bus = InMemoryEventBus::new();
    let correlated = CorrelatedSubscription::new(bus.shared());

    let pending = correlated.open("replies").await.expect("open");

    assert_eq!(pending.state(), CorrelationState::Listening);
    assert_eq!(pending.topic(), "replies");
    assert_eq!(bus.active_subscriptions("replies"), 1);

    pending.release().await.expect("release");
    assert_eq!(bus.active_subscriptions("replies"), 0);
}

#[tokio::test]
async fn first_match_wins_and_others_are_ignored() {
    init_test_tracing();
    let bus = InMemoryEventBus::new();
    let correlated = CorrelatedSubscription::new(bus.shared());

    let pending = correlated.open("replies").await.expect("open");

    bus.publish("replies", &reply("other", 1)).await.unwrap();
    bus.publish("replies", b"not json at all").await.unwrap();
    bus.publish("replies", &reply("mine", 2)).await.unwrap();
    bus.publish("replies", &reply("mine", 3)).await.unwrap();

    let got: Reply = pending
        .wait(Duration::from_secs(1), |r: &Reply| r.key == "mine")
        .await
        .expect("matching reply");

    assert_eq!(got.value, 2);
    assert_eq!(bus.active_subscriptions("replies"), 0);
}

#[tokio::test]
async fn reply_published_right_after_open_is_not_lost() {
    let bus = InMemoryEventBus::new();
    let correlated = CorrelatedSubscription::new(bus.shared());

    let pending = correlated.open("replies").await.expect("open");
    // Nothing is awaiting the subscription yet: the reply must still be buffered.
    bus.publish("replies", &reply("mine", 7)).await.unwrap();
    tokio::task::yield_now().await;

    let got: Reply = pending
        .wait(Duration::from_secs(1), |r: &Reply| r.key == "mine")
        .await
        .expect("buffered reply");
    assert_eq!(got.value, 7);
}

#[tokio::test(start_paused = true)]
async fn wait_times_out_and_releases() {
    let bus = InMemoryEventBus::new();
    let correlated = CorrelatedSubscription::new(bus.shared());
    let bound = Duration::from_millis(250);

    let started = tokio::time::Instant::now();
    let result = correlated
        .await_one::<Reply, _>("replies", bound, |r| r.key == "never")
        .await;
    let elapsed = started.elapsed();

    match result {
        Err(CorrelationError::Timeout { topic, waited }) => {
            assert_eq!(topic, "replies");
            assert_eq!(waited, bound);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(elapsed >= bound);
    assert!(elapsed < bound + Duration::from_millis(50));
    assert_eq!(bus.active_subscriptions("replies"), 0);
}

#[tokio::test]
async fn open_fails_when_not_ready() {
    let bus = InMemoryEventBus::not_ready();
    let correlated = CorrelatedSubscription::new(bus.shared());

    let err = correlated.open("replies").await.unwrap_err();

    assert_eq!(
        err,
        CorrelationError::Subscription {
            topic: "replies".to_string(),
            source: EventBusError::NotReady,
        }
    );
    assert_eq!(bus.subscribe_attempts(), 0);
}

#[tokio::test]
async fn open_surfaces_subscribe_failure() {
    let bus = InMemoryEventBus::new();
    bus.fail_subscribes(true);
    let correlated = CorrelatedSubscription::new(bus.shared());

    let err = correlated.open("replies").await.unwrap_err();

    assert!(matches!(
        err,
        CorrelationError::Subscription {
            source: EventBusError::SubscriptionFailed { .. },
            ..
        }
    ));
    assert_eq!(bus.total_active_subscriptions(), 0);
}

#[tokio::test]
async fn dropped_pending_response_still_tears_down() {
    let bus = InMemoryEventBus::new();
    let correlated = CorrelatedSubscription::new(bus.shared());

    let pending = correlated.open("replies").await.expect("open");
    assert_eq!(bus.active_subscriptions("replies"), 1);
    drop(pending);

    for _ in 0..100 {
        if bus.active_subscriptions("replies") == 0 {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("subscription leaked after drop");
}

#[tokio::test]
async fn cancelled_wait_still_tears_down() {
    let bus = InMemoryEventBus::new();
    let correlated = CorrelatedSubscription::new(bus.shared());

    let waiting = tokio::spawn(async move {
        correlated
            .await_one::<Reply, _>("replies", Duration::from_secs(60), |_| true)
            .await
    });

    while bus.active_subscriptions("replies") == 0 {
        tokio::task::yield_now().await;
    }
    waiting.abort();
    let _ = waiting.await;

    for _ in 0..100 {
        if bus.active_subscriptions("replies") == 0 {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("subscription leaked after cancellation");
}

/// Transport whose subscriptions never finish tearing down, like a Redis channel whose
/// UNSUBSCRIBE is never answered.
struct StuckTeardownBus;

impl EventBus for StuckTeardownBus {
    fn is_ready(&self) -> bool {
        true
    }

    fn publish(&self, _topic: &str, _payload: &[u8]) -> BusFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn subscribe(&self, topic: &str) -> BusFuture<'_, Subscription> {
        let topic = topic.to_string();
        Box::pin(async move {
            Ok(Subscription::spawn(topic, 8, |mut feed| async move {
                feed.closed().await;
                std::future::pending::<()>().await;
            }))
        })
    }
}

#[tokio::test(start_paused = true)]
async fn timeout_returns_even_when_teardown_hangs() {
    let correlated = CorrelatedSubscription::new(Arc::new(StuckTeardownBus));
    let bound = Duration::from_millis(100);

    let started = tokio::time::Instant::now();
    let result = tokio::time::timeout(
        Duration::from_secs(60),
        correlated.await_one::<serde_json::Value, _>("paymentCompleted", bound, |_| true),
    )
    .await
    .expect("await_one must not hang on a stuck teardown");
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(CorrelationError::Timeout { .. })));
    assert!(elapsed <= bound + DEFAULT_RELEASE_TIMEOUT + Duration::from_millis(50));
}
