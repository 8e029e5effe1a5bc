//! Contract Test: Reconciliation Loop
//!
//! Constraints verified:
//! - A failed probe skips reconciliation entirely
//! - Provider errors are logged and never stop the loop
//! - The loop sleeps a fixed interval between cycles, success or failure
//! - Every cycle re-reads the provider (no cached state)
//! - The shutdown signal ends the loop while it sleeps
//!
//! If this test fails, the loop's state machine is broken.

mod common;

use common::*;
use std::net::Ipv4Addr;
use std::time::Duration;
use stunddns_core::traits::ResultCode;
use stunddns_core::{CycleOutcome, EngineEvent, ReconcileOutcome, ReconciliationLoop};
use tokio::sync::{mpsc, watch};

/// Receive events until one matches `pred`
async fn wait_for(
    rx: &mut mpsc::Receiver<EngineEvent>,
    pred: impl Fn(&EngineEvent) -> bool,
) -> EngineEvent {
    loop {
        let event = rx.recv().await.expect("event channel open");
        if pred(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn probe_failure_skips_reconcile() {
    let client = ScriptedDiscoveryClient::new()
        .script("a.example.net", ServerScript::Fail(ResultCode::TIMEOUT));
    let provider = RecordingProvider::with_records(vec![]);

    let (engine, mut events) = ReconciliationLoop::new(
        Box::new(client.clone()),
        Box::new(provider.clone()),
        minimal_config("home.example.com", &["a.example.net"]),
    )
    .expect("engine construction succeeds");

    assert_eq!(engine.run_cycle().await, CycleOutcome::ProbeExhausted);
    assert!(provider.listed_domains().is_empty());
    assert_eq!(provider.mutation_count(), 0);
    assert_eq!(
        events.recv().await,
        Some(EngineEvent::ProbeExhausted { attempts: 1 })
    );
}

#[tokio::test]
async fn cycle_creates_then_reports_outcome() {
    let client = ScriptedDiscoveryClient::new()
        .script("a.example.net", ServerScript::Reflect(mapped("203.0.113.5")));
    let provider = RecordingProvider::with_records(vec![]);

    let (engine, mut events) = ReconciliationLoop::new(
        Box::new(client),
        Box::new(provider.clone()),
        minimal_config("home.example.com", &["a.example.net"]),
    )
    .expect("engine construction succeeds");

    assert_eq!(
        engine.run_cycle().await,
        CycleOutcome::Reconciled(ReconcileOutcome::Created)
    );
    assert_eq!(provider.mutation_count(), 1);

    let event = wait_for(&mut events, |e| matches!(e, EngineEvent::RecordCreated { .. })).await;
    assert_eq!(
        event,
        EngineEvent::RecordCreated {
            hostname: "home.example.com".to_string(),
            address: Ipv4Addr::new(203, 0, 113, 5),
        }
    );
}

#[tokio::test]
async fn mutation_failure_is_reported_not_fatal() {
    let client = ScriptedDiscoveryClient::new()
        .script("a.example.net", ServerScript::Reflect(mapped("198.51.100.9")));
    let provider = RecordingProvider::with_records(vec![record("r1", "ddns", "A", "198.51.100.1")])
        .answering(500);

    let (engine, _events) = ReconciliationLoop::new(
        Box::new(client),
        Box::new(provider.clone()),
        minimal_config("ddns.example.org", &["a.example.net"]),
    )
    .expect("engine construction succeeds");

    assert!(matches!(engine.run_cycle().await, CycleOutcome::Failed(_)));
    assert!(matches!(engine.run_cycle().await, CycleOutcome::Failed(_)));
    assert_eq!(provider.mutation_count(), 2, "one attempt per cycle");
}

#[tokio::test]
async fn malformed_listing_abandons_cycle() {
    let client = ScriptedDiscoveryClient::new()
        .script("a.example.net", ServerScript::Reflect(mapped("198.51.100.9")));
    let provider = RecordingProvider::with_listing(ListingScript::Malformed);

    let (engine, mut events) = ReconciliationLoop::new(
        Box::new(client),
        Box::new(provider.clone()),
        minimal_config("ddns.example.org", &["a.example.net"]),
    )
    .expect("engine construction succeeds");

    assert!(matches!(engine.run_cycle().await, CycleOutcome::Abandoned(_)));
    assert_eq!(provider.mutation_count(), 0);
    wait_for(&mut events, |e| matches!(e, EngineEvent::CycleAbandoned { .. })).await;
}

#[tokio::test(start_paused = true)]
async fn loop_keeps_running_after_errors_with_fixed_interval() {
    let client = ScriptedDiscoveryClient::new()
        .script("a.example.net", ServerScript::Reflect(mapped("198.51.100.9")));
    let provider = RecordingProvider::with_records(vec![record("r1", "ddns", "A", "198.51.100.1")])
        .answering(500);

    let (engine, mut events) = ReconciliationLoop::new(
        Box::new(client),
        Box::new(provider.clone()),
        minimal_config("ddns.example.org", &["a.example.net"]),
    )
    .expect("engine construction succeeds");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine_handle = tokio::spawn(async move { engine.run_with_shutdown(shutdown_rx).await });

    let started = tokio::time::Instant::now();
    for expected_cycle in 1..=3u64 {
        let event =
            wait_for(&mut events, |e| matches!(e, EngineEvent::CycleStarted { .. })).await;
        assert_eq!(event, EngineEvent::CycleStarted { cycle: expected_cycle });
        wait_for(&mut events, |e| matches!(e, EngineEvent::UpdateFailed { .. })).await;
    }

    // Two full sleeps separate three cycles.
    assert!(started.elapsed() >= Duration::from_secs(1200));
    assert!(started.elapsed() < Duration::from_secs(1800));
    assert_eq!(provider.mutation_count(), 3);
    assert_eq!(provider.listed_domains().len(), 3, "listing re-read every cycle");

    shutdown_tx.send(true).unwrap();
    let result = engine_handle.await.unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn shutdown_interrupts_sleep() {
    let client = ScriptedDiscoveryClient::new()
        .script("a.example.net", ServerScript::Reflect(mapped("203.0.113.5")));
    let provider = RecordingProvider::with_records(vec![record("r1", "home", "A", "203.0.113.5")]);

    let (engine, mut events) = ReconciliationLoop::new(
        Box::new(client),
        Box::new(provider.clone()),
        minimal_config("home.example.com", &["a.example.net"]),
    )
    .expect("engine construction succeeds");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine_handle = tokio::spawn(async move { engine.run_with_shutdown(shutdown_rx).await });

    // First cycle completes, loop is now in its 600s sleep.
    wait_for(&mut events, |e| matches!(e, EngineEvent::RecordUnchanged { .. })).await;
    shutdown_tx.send(true).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), engine_handle).await;
    assert!(result.is_ok(), "loop should stop within 5 seconds");
    assert!(result.unwrap().unwrap().is_ok());

    wait_for(&mut events, |e| matches!(e, EngineEvent::Stopped { .. })).await;
    assert_eq!(provider.mutation_count(), 0);
}

#[tokio::test]
async fn invalid_config_rejected_at_construction() {
    let mut config = minimal_config("home.example.com", &["a.example.net"]);
    config.provider.access_key_id.clear();

    let result = ReconciliationLoop::new(
        Box::new(ScriptedDiscoveryClient::new()),
        Box::new(RecordingProvider::with_records(vec![])),
        config,
    );

    assert!(matches!(result, Err(stunddns_core::Error::Config(_))));
}

#[tokio::test]
async fn full_event_channel_drops_events_without_blocking() {
    let client = ScriptedDiscoveryClient::new()
        .script("a.example.net", ServerScript::Reflect(mapped("203.0.113.5")));
    let provider = RecordingProvider::with_records(vec![record("r1", "home", "A", "203.0.113.5")]);

    let mut config = minimal_config("home.example.com", &["a.example.net"]);
    config.engine.event_channel_capacity = 1;

    let (engine, mut events) =
        ReconciliationLoop::new(Box::new(client), Box::new(provider), config)
            .expect("engine construction succeeds");

    // Each cycle emits two events; the second cycle must not wait for a reader.
    let both = async {
        engine.run_cycle().await;
        engine.run_cycle().await
    };
    let outcome = tokio::time::timeout(Duration::from_secs(5), both)
        .await
        .expect("cycles complete while the channel is full");
    assert_eq!(outcome, CycleOutcome::Reconciled(ReconcileOutcome::NoChange));

    assert!(matches!(
        events.recv().await,
        Some(EngineEvent::AddressDiscovered { .. })
    ));
    assert!(events.try_recv().is_err(), "overflow events were dropped");
}
