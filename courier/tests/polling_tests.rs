//! Polling lifecycle: bounded iterations, stop semantics, key reuse.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use courier::{Courier, CourierConfig, PollingConfig, Request};

use common::MockTransport;

#[tokio::test]
async fn bounded_polling_fires_exactly_max_times() {
    let transport = MockTransport::ok(serde_json::json!({"tick": true}));
    let client = Courier::new(transport.clone(), CourierConfig::default());

    let successes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&successes);
    client.start_polling(
        PollingConfig::new("status", Request::get("/status"), Duration::from_millis(50))
            .max_polling_times(3)
            .on_success(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
    );

    // 3 iterations at ~0/50/100ms; wait well past the last.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(successes.load(Ordering::SeqCst), 3);
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn stop_during_an_interval_prevents_the_next_iteration() {
    let transport = MockTransport::ok(serde_json::json!(null));
    let client = Courier::new(transport.clone(), CourierConfig::default());

    let successes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&successes);
    client.start_polling(
        PollingConfig::new("job", Request::get("/job"), Duration::from_millis(80))
            .max_polling_times(10)
            .on_success(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
    );

    // Let two iterations settle (t≈0 and t≈80), stop inside the second
    // interval.
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(client.stop_polling("job"));
    let seen = successes.load(Ordering::SeqCst);
    assert_eq!(seen, 2);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(successes.load(Ordering::SeqCst), seen);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn next_iteration_is_scheduled_after_settlement() {
    // Each request takes 60ms; with a 50ms interval the cadence is
    // settle-relative (~110ms), not start-relative (~50ms).
    let transport =
        MockTransport::ok(serde_json::json!(null)).delayed(Duration::from_millis(60));
    let client = Courier::new(transport.clone(), CourierConfig::default());

    client.start_polling(
        PollingConfig::new("tick", Request::get("/tick"), Duration::from_millis(50))
            .max_polling_times(3),
    );

    tokio::time::sleep(Duration::from_millis(160)).await;
    // Start-relative scheduling would already show 3 sends by now.
    assert_eq!(transport.calls(), 2);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn errors_reach_the_error_callback_and_polling_continues() {
    let transport = MockTransport::with_handler(|seq, _| {
        if seq == 0 {
            Err(courier::Error::transport("hiccup"))
        } else {
            Ok(common::ok_envelope(serde_json::json!(null)))
        }
    });
    let client = Courier::new(transport.clone(), CourierConfig::default());

    let errors = Arc::new(AtomicUsize::new(0));
    let successes = Arc::new(AtomicUsize::new(0));
    let error_counter = Arc::clone(&errors);
    let success_counter = Arc::clone(&successes);
    client.start_polling(
        PollingConfig::new("mixed", Request::get("/mixed"), Duration::from_millis(40))
            .max_polling_times(3)
            .on_success(move |_| {
                success_counter.fetch_add(1, Ordering::SeqCst);
            })
            .on_error(move |_| {
                error_counter.fetch_add(1, Ordering::SeqCst);
            }),
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(successes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn restarting_a_key_stops_the_previous_task() {
    let transport = MockTransport::ok(serde_json::json!(null));
    let client = Courier::new(transport.clone(), CourierConfig::default());

    let first = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&first);
    client.start_polling(
        PollingConfig::new("shared", Request::get("/v1"), Duration::from_millis(40))
            .on_success(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
    );
    tokio::time::sleep(Duration::from_millis(60)).await;

    let second = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&second);
    client.start_polling(
        PollingConfig::new("shared", Request::get("/v2"), Duration::from_millis(40))
            .max_polling_times(2)
            .on_success(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
    );

    let first_seen = first.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    // The first task stopped when its key was reused.
    assert_eq!(first.load(Ordering::SeqCst), first_seen);
    assert_eq!(second.load(Ordering::SeqCst), 2);

    assert!(!client.stop_polling("shared"));
}

#[tokio::test]
async fn stopping_an_unknown_key_is_a_noop() {
    let transport = MockTransport::ok(serde_json::json!(null));
    let client = Courier::new(transport, CourierConfig::default());
    assert!(!client.stop_polling("missing"));
}
