//! Cancellation id scoping and bulk cancel.

mod common;

use std::time::Duration;

use courier::{CallOptions, CancelKind, Courier, CourierConfig};

use common::MockTransport;

fn slow_client() -> (std::sync::Arc<MockTransport>, Courier) {
    let transport =
        MockTransport::ok(serde_json::json!({"done": true})).delayed(Duration::from_millis(300));
    let client = Courier::new(transport.clone(), CourierConfig::default());
    (transport, client)
}

fn with_id(id: &str) -> CallOptions {
    CallOptions {
        cancel_id: Some(id.into()),
        ..CallOptions::default()
    }
}

#[tokio::test]
async fn cancelling_one_id_leaves_the_other_in_flight() {
    let (_, client) = slow_client();

    let first = {
        let client = client.clone();
        tokio::spawn(async move { client.get("/a", with_id("first")).await })
    };
    let second = {
        let client = client.clone();
        tokio::spawn(async move { client.get("/b", with_id("second")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(client.cancel_request("first"));

    let first = first.await.unwrap();
    assert_eq!(
        first.unwrap_err().cancel_kind(),
        Some(CancelKind::Manual)
    );
    assert!(second.await.unwrap().is_ok());
}

#[tokio::test]
async fn cancel_all_aborts_everything_and_empties_the_registry() {
    let (_, client) = slow_client();

    let mut handles = Vec::new();
    for id in ["one", "two"] {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.get("/job", with_id(id)).await
        }));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.pending_cancel_handles(), 2);
    client.cancel_all_requests();

    for handle in handles {
        let outcome = handle.await.unwrap();
        assert_eq!(
            outcome.unwrap_err().cancel_kind(),
            Some(CancelKind::Manual)
        );
    }
    assert_eq!(client.pending_cancel_handles(), 0);
}

#[tokio::test]
async fn settled_requests_leave_no_registry_entries() {
    let transport = MockTransport::ok(serde_json::json!(null));
    let client = Courier::new(transport, CourierConfig::default());

    client.get("/fast", with_id("gone")).await.unwrap();
    assert_eq!(client.pending_cancel_handles(), 0);
    // Cancelling after settlement is a no-op.
    assert!(!client.cancel_request("gone"));
}

#[tokio::test]
async fn cancel_by_unknown_id_does_not_disturb_requests() {
    let (transport, client) = slow_client();
    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.get("/a", with_id("live")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!client.cancel_request("phantom"));
    assert!(pending.await.unwrap().is_ok());
    assert_eq!(transport.calls(), 1);
}
