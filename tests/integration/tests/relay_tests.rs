//! Relay integration tests
//!
//! Every test runs real gateway instances on ephemeral ports sharing one
//! in-memory broker hub, so no external services are needed.
//!
//! Run with: cargo test -p integration-tests --test relay_tests

use chat_cache::MemoryBrokerHub;
use chat_core::CONNECTION_COUNT_KEY;
use integration_tests::{
    fixtures::*, TestGateway, FRAME_TIMEOUT,
};
use reqwest::StatusCode;
use std::time::Duration;

async fn wait_for_counter(hub: &MemoryBrokerHub, expected: i64) {
    let deadline = tokio::time::Instant::now() + FRAME_TIMEOUT;
    while hub.counter(CONNECTION_COUNT_KEY) != Some(expected) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "counter stuck at {:?}, expected {expected}",
            hub.counter(CONNECTION_COUNT_KEY)
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ============================================================================
// Health Check Tests
// ============================================================================

#[tokio::test]
async fn test_healthcheck_reports_port() {
    let hub = MemoryBrokerHub::new();
    let gateway = TestGateway::start(&hub).await.unwrap();

    let response = gateway.get("/healthcheck").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: HealthBody = response.json().await.unwrap();
    assert_eq!(body.status, "ok");
    assert_eq!(body.port, gateway.addr.port());
}

#[tokio::test]
async fn test_startup_seeds_counter() {
    let hub = MemoryBrokerHub::new();
    assert_eq!(hub.counter(CONNECTION_COUNT_KEY), None);

    let _gateway = TestGateway::start(&hub).await.unwrap();
    assert_eq!(hub.counter(CONNECTION_COUNT_KEY), Some(0));
}

#[tokio::test]
async fn test_startup_fails_without_broker() {
    let hub = MemoryBrokerHub::new();
    hub.set_available(false);

    assert!(TestGateway::start(&hub).await.is_err());
}

// ============================================================================
// Relay Tests
// ============================================================================

#[tokio::test]
async fn test_two_instances_share_count_and_messages() {
    let hub = MemoryBrokerHub::new();
    let a = TestGateway::start(&hub).await.unwrap();
    let b = TestGateway::start(&hub).await.unwrap();

    let mut on_a = a.connect_and_count(1).await.unwrap();
    let mut on_b = b.connect_and_count(2).await.unwrap();
    on_a.wait_for_count(2).await.unwrap();

    on_a.send_message("hello").await.unwrap();

    let seen_on_a: RelayedMessage = on_a.expect(NEW_MESSAGE).await.unwrap();
    let seen_on_b: RelayedMessage = on_b.expect(NEW_MESSAGE).await.unwrap();

    assert_eq!(seen_on_a.message, "hello");
    assert_eq!(seen_on_b.message, "hello");
    assert_ne!(seen_on_a.id, seen_on_b.id);
    assert_eq!(seen_on_a.origin_tag, a.addr.port().to_string());
    assert_eq!(seen_on_b.origin_tag, b.addr.port().to_string());
    assert!(!seen_on_a.created_at.is_empty());

    // A drains with one local client: max(2 - 1, 0)
    a.shutdown().await.unwrap();
    on_a.expect_closed().await.unwrap();
    wait_for_counter(&hub, 1).await;

    // B keeps relaying
    on_b.send_message("still here").await.unwrap();
    let after: RelayedMessage = on_b.expect(NEW_MESSAGE).await.unwrap();
    assert_eq!(after.message, "still here");
    assert_eq!(hub.counter(CONNECTION_COUNT_KEY), Some(1));
}

#[tokio::test]
async fn test_each_delivery_fans_out_once() {
    let hub = MemoryBrokerHub::new();
    let gateway = TestGateway::start(&hub).await.unwrap();

    let mut first = gateway.connect_and_count(1).await.unwrap();
    let mut second = gateway.connect_and_count(2).await.unwrap();

    first.send_message("once").await.unwrap();

    for client in [&mut first, &mut second] {
        let msg: RelayedMessage = client.expect(NEW_MESSAGE).await.unwrap();
        assert_eq!(msg.message, "once");
        client
            .expect_none(NEW_MESSAGE, Duration::from_millis(200))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_empty_message_is_dropped() {
    let hub = MemoryBrokerHub::new();
    let gateway = TestGateway::start(&hub).await.unwrap();
    let mut client = gateway.connect_and_count(1).await.unwrap();

    // One publish so far: the count announcement
    assert_eq!(hub.publish_calls(), 1);

    client.send_message("").await.unwrap();
    client.send_frame(&OutgoingFrame::without_message()).await.unwrap();
    client.send_message("after").await.unwrap();

    let msg: RelayedMessage = client.expect(NEW_MESSAGE).await.unwrap();
    assert_eq!(msg.message, "after");
    assert_eq!(hub.publish_calls(), 2);
}

#[tokio::test]
async fn test_malformed_frames_are_ignored() {
    let hub = MemoryBrokerHub::new();
    let gateway = TestGateway::start(&hub).await.unwrap();
    let mut client = gateway.connect_and_count(1).await.unwrap();

    client.send_raw("not json").await.unwrap();
    client
        .send_raw(r#"{"event":"chat:typing","data":{}}"#)
        .await
        .unwrap();
    client.send_message("ok").await.unwrap();

    let msg: RelayedMessage = client.expect(NEW_MESSAGE).await.unwrap();
    assert_eq!(msg.message, "ok");
}

#[tokio::test]
async fn test_broker_outage_reported_to_sender_only() {
    let hub = MemoryBrokerHub::new();
    let gateway = TestGateway::start(&hub).await.unwrap();
    let mut sender = gateway.connect_and_count(1).await.unwrap();
    let mut bystander = gateway.connect_and_count(2).await.unwrap();
    sender.wait_for_count(2).await.unwrap();

    hub.set_available(false);
    sender.send_message("lost").await.unwrap();

    let failed: DeliveryFailed = sender.expect(DELIVERY_FAILED).await.unwrap();
    assert_eq!(failed.message, "lost");
    assert_eq!(failed.reason, "BROKER_UNAVAILABLE");
    bystander
        .expect_none(DELIVERY_FAILED, Duration::from_millis(200))
        .await
        .unwrap();

    // The connection stays usable once the broker is back
    hub.set_available(true);
    sender.send_message("back").await.unwrap();
    for client in [&mut sender, &mut bystander] {
        let msg: RelayedMessage = client.expect(NEW_MESSAGE).await.unwrap();
        assert_eq!(msg.message, "back");
    }
}

// ============================================================================
// Presence Tests
// ============================================================================

#[tokio::test]
async fn test_count_tracks_connects_and_disconnects() {
    let hub = MemoryBrokerHub::new();
    let a = TestGateway::start(&hub).await.unwrap();
    let b = TestGateway::start(&hub).await.unwrap();

    // N = 3 on A, M = 2 on B
    let mut total = 0;
    let mut on_a = Vec::new();
    for _ in 0..3 {
        total += 1;
        on_a.push(a.connect_and_count(total).await.unwrap());
    }
    let mut on_b = Vec::new();
    for _ in 0..2 {
        total += 1;
        on_b.push(b.connect_and_count(total).await.unwrap());
    }
    assert_eq!(hub.counter(CONNECTION_COUNT_KEY), Some(5));
    assert_eq!(a.local_count(), 3);
    assert_eq!(b.local_count(), 2);

    // K = 2 disconnects, one per instance
    on_a.pop().unwrap().close().await.unwrap();
    on_b.pop().unwrap().close().await.unwrap();

    wait_for_counter(&hub, 3).await;
    on_a[0].wait_for_count(3).await.unwrap();
    on_b[0].wait_for_count(3).await.unwrap();
    assert_eq!(a.local_count(), 2);
    assert_eq!(b.local_count(), 1);
}

#[tokio::test]
async fn test_uncounted_connection_never_decrements() {
    let hub = MemoryBrokerHub::new();
    let gateway = TestGateway::start(&hub).await.unwrap();

    // Connect while the broker is down: the session opens but is not counted
    hub.set_available(false);
    let client = gateway.connect().await.unwrap();
    gateway.wait_for_sessions(1).await.unwrap();
    assert_eq!(gateway.local_count(), 0);

    hub.set_available(true);
    client.close().await.unwrap();
    gateway.wait_for_sessions(0).await.unwrap();

    assert_eq!(hub.counter(CONNECTION_COUNT_KEY), Some(0));
    let mut observer = gateway.connect_and_count(1).await.unwrap();
    observer.expect_none(COUNT_UPDATED, Duration::from_millis(100)).await.unwrap();
    assert_eq!(hub.counter(CONNECTION_COUNT_KEY), Some(1));
}

#[tokio::test]
async fn test_shutdown_without_clients_leaves_counter() {
    let hub = MemoryBrokerHub::new();
    let a = TestGateway::start(&hub).await.unwrap();
    let b = TestGateway::start(&hub).await.unwrap();
    let _on_b = b.connect_and_count(1).await.unwrap();

    let report = a.shutdown().await.unwrap();
    assert_eq!(report.reconciled, None);
    assert!(!report.timed_out);
    assert_eq!(hub.counter(CONNECTION_COUNT_KEY), Some(1));
}

#[tokio::test]
async fn test_shutdown_clamps_at_zero() {
    let hub = MemoryBrokerHub::new();
    let gateway = TestGateway::start(&hub).await.unwrap();
    let mut first = gateway.connect_and_count(1).await.unwrap();
    let mut second = gateway.connect_and_count(2).await.unwrap();

    // Another process clobbered the counter
    hub.set_counter(CONNECTION_COUNT_KEY, 1);

    gateway.shutdown().await.unwrap();
    first.expect_closed().await.unwrap();
    second.expect_closed().await.unwrap();
    wait_for_counter(&hub, 0).await;
}
