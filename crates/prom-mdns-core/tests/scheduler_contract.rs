//! Architectural Contract Test: Periodic Scheduling
//!
//! This test verifies how the scheduler paces refresh cycles.
//!
//! Constraints verified:
//! - The first cycle runs at startup, without waiting for the interval
//! - Subsequent cycles run once per interval
//! - Aggregates are delivered in cycle order, one per cycle
//! - Changes between cycles reach the consumer on the next tick
//! - A slow consumer delays the next cycle instead of queueing aggregates
//!
//! If this test fails, someone has changed the ticker setup or started
//! running cycles on detached tasks.

mod common;

use common::*;
use prom_mdns_core::config::HTTP_SERVICE;
use prom_mdns_core::{CancellationToken, DiscoveryEngine, EngineEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::test]
async fn initial_cycle_is_immediate() {
    let browser = StaticBrowser::new();
    browser.set_entries(HTTP_SERVICE, vec![http_entry("a.local", 9100, [10, 0, 0, 1])]);

    let (engine, _events) =
        DiscoveryEngine::new(Arc::new(browser), &test_config(60_000)).expect("engine construction succeeds");

    let (tx, mut rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { engine.run(run_cancel, tx).await });

    let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
    assert!(first.is_ok(), "First aggregate should arrive well before the 60s interval");

    // Nothing else until the interval elapses
    let second = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(second.is_err(), "No second cycle before the interval");

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn cycles_follow_the_interval() {
    let browser = StaticBrowser::new();
    let counters = StaticBrowser::sharing_state_with(&browser);

    let (engine, _events) =
        DiscoveryEngine::new(Arc::new(browser), &test_config(30)).expect("engine construction succeeds");

    let (tx, mut rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let started = tokio::time::Instant::now();
    let handle = tokio::spawn(async move { engine.run(run_cancel, tx).await });

    // Startup cycle plus one per elapsed interval
    for _ in 0..3 {
        assert!(rx.recv().await.is_some());
    }
    assert!(started.elapsed() >= Duration::from_millis(60));

    // Two lookups (http + https) per cycle
    assert!(counters.lookup_call_count() >= 6);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn aggregates_arrive_in_cycle_order() {
    let browser = StaticBrowser::new();

    let (engine, mut events) =
        DiscoveryEngine::new(Arc::new(browser), &test_config(20)).expect("engine construction succeeds");

    let (tx, mut rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { engine.run(run_cancel, tx).await });

    for _ in 0..4 {
        assert!(rx.recv().await.is_some());
    }
    cancel.cancel();
    handle.await.unwrap().unwrap();

    let completed: Vec<u64> = std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|event| match event {
            EngineEvent::CycleCompleted { cycle, .. } => Some(cycle),
            _ => None,
        })
        .collect();

    assert!(completed.len() >= 4);
    assert!(
        completed.windows(2).all(|w| w[1] == w[0] + 1),
        "Cycles should complete strictly in order: {:?}",
        completed
    );
}

#[tokio::test]
async fn changes_are_picked_up_next_cycle() {
    let browser = StaticBrowser::new();
    let control = StaticBrowser::sharing_state_with(&browser);

    let (engine, _events) =
        DiscoveryEngine::new(Arc::new(browser), &test_config(30)).expect("engine construction succeeds");

    let (tx, mut rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { engine.run(run_cancel, tx).await });

    assert_eq!(rx.recv().await.map(|a| a.len()), Some(0));

    control.set_entries(HTTP_SERVICE, vec![http_entry("a.local", 9100, [10, 0, 0, 1])]);

    let mut seen = false;
    for _ in 0..5 {
        if rx.recv().await.is_some_and(|a| a.len() == 1) {
            seen = true;
            break;
        }
    }
    assert!(seen, "New advertisement should appear in a later aggregate");

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn slow_consumer_applies_backpressure() {
    let browser = StaticBrowser::new();
    let counters = StaticBrowser::sharing_state_with(&browser);

    let (engine, _events) =
        DiscoveryEngine::new(Arc::new(browser), &test_config(10)).expect("engine construction succeeds");

    // Never drained: the first aggregate fills the buffer, the second blocks
    let (tx, _rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { engine.run(run_cancel, tx).await });

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(
        counters.lookup_call_count(),
        4,
        "Only two cycles should run while the consumer is stalled"
    );

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(result.is_ok(), "A blocked delivery must still observe cancellation");
}
