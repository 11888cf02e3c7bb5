//! Contract Test: Reload Semantics
//!
//! Constraints verified:
//! - A reload requested during an in-flight cycle makes the next cycle use
//!   the newly written document, even when the file's mtime does not reveal
//!   the change
//! - Several requests before the next check collapse into one reload
//! - An mtime change is picked up without an explicit request
//! - A reload replaces the document wholesale
//! - A reload request wakes an idle engine promptly
//! - A request already consumed by a cycle does not trigger another one
//!
//! If this test fails, operator edits can be lost or applied late.

mod common;

use common::*;
use ddns_core::{EngineEvent, MemoryHistoryStore};
use std::sync::Arc;
use std::time::Duration;

fn reload_count(events: &[EngineEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, EngineEvent::ConfigReloaded { .. }))
        .count()
}

#[tokio::test]
async fn reload_raised_during_cycle_applies_to_next_cycle() {
    let fixture = Arc::new(Fixture::new());
    fixture.write(vec![fixture.entry(1, "www", 300)]);

    let ip_source = ControlledIpSource::new(ip("203.0.113.10"));
    let endpoint = RecordingEndpoint::new();
    let (mut engine, mut events) =
        fixture.engine(&ip_source, &endpoint, Arc::new(MemoryHistoryStore::new()));

    // While the first vendor call is in flight: trigger, then rewrite the file
    // without the mtime changing.
    let reload = engine.reload_handle();
    let writer = Arc::clone(&fixture);
    let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let fired_in_hook = Arc::clone(&fired);
    endpoint.on_call(move |_url| {
        if !fired_in_hook.swap(true, std::sync::atomic::Ordering::SeqCst) {
            reload.request_reload();
            writer.write_preserving_mtime(vec![writer.entry(2, "new", 300)]);
        }
    });

    engine.run_cycle().await;
    assert_eq!(engine.document().unwrap().hostnames(), vec!["www"]);

    let report = engine.run_cycle().await;

    assert_eq!(engine.document().unwrap().hostnames(), vec!["new"]);
    assert_eq!(report.updated, 1);
    assert_eq!(endpoint.calls_for("new"), 1);
    assert_eq!(reload_count(&drain(&mut events)), 2);
}

#[tokio::test]
async fn repeated_requests_collapse_into_one_reload() {
    let fixture = Fixture::new();
    fixture.write(vec![fixture.entry(1, "www", 300)]);

    let ip_source = ControlledIpSource::new(ip("203.0.113.10"));
    let endpoint = RecordingEndpoint::new();
    let (mut engine, mut events) =
        fixture.engine(&ip_source, &endpoint, Arc::new(MemoryHistoryStore::new()));

    engine.run_cycle().await;
    drain(&mut events);

    let handle = engine.reload_handle();
    handle.request_reload();
    handle.request_reload();
    handle.clone().request_reload();

    engine.run_cycle().await;
    engine.run_cycle().await;

    assert_eq!(reload_count(&drain(&mut events)), 1);
    assert!(!handle.is_pending());
}

#[tokio::test]
async fn mtime_change_is_detected_without_request() {
    let fixture = Fixture::new();
    fixture.write(vec![fixture.entry(1, "www", 300)]);

    let ip_source = ControlledIpSource::new(ip("203.0.113.10"));
    let endpoint = RecordingEndpoint::new();
    let (mut engine, _events) =
        fixture.engine(&ip_source, &endpoint, Arc::new(MemoryHistoryStore::new()));

    engine.run_cycle().await;
    fixture.write(vec![fixture.entry(1, "www", 300), fixture.entry(1, "mail", 300)]);
    engine.run_cycle().await;

    assert_eq!(engine.document().unwrap().hostnames(), vec!["www", "mail"]);
}

#[tokio::test]
async fn reload_replaces_document_wholesale() {
    let fixture = Fixture::new();
    fixture.write(vec![fixture.entry(1, "mail", 300), fixture.entry(1, "www", 300)]);

    let ip_source = ControlledIpSource::new(ip("203.0.113.10"));
    let endpoint = RecordingEndpoint::new();
    endpoint.reply_with(500, "down");
    let (mut engine, _events) =
        fixture.engine(&ip_source, &endpoint, Arc::new(MemoryHistoryStore::new()));

    engine.run_cycle().await;
    assert_eq!(endpoint.call_count(), 2);

    // Entry removed; the remaining one is due again right after the reload
    fixture.write(vec![fixture.entry(1, "www", 300)]);
    let report = engine.run_cycle().await;

    assert_eq!(report.failed, 1);
    assert_eq!(endpoint.calls_for("mail"), 1);
    assert_eq!(endpoint.calls_for("www"), 2);
}

#[tokio::test]
async fn reload_request_wakes_idle_engine() {
    let fixture = Fixture::new();
    fixture.write(vec![fixture.entry(1, "www", 3600)]);

    let ip_source = ControlledIpSource::new(ip("203.0.113.10"));
    let endpoint = RecordingEndpoint::new();
    let (mut engine, mut events) =
        fixture.engine(&ip_source, &endpoint, Arc::new(MemoryHistoryStore::new()));
    let reload = engine.reload_handle();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let engine_handle = tokio::spawn(async move { engine.run(shutdown_rx).await });

    // Initial cycle loads the first document
    wait_for(&mut events, |e| matches!(e, EngineEvent::CycleFinished { .. })).await;

    fixture.write_preserving_mtime(vec![fixture.entry(1, "www", 3600), fixture.entry(1, "vpn", 3600)]);
    reload.request_reload();

    let reloaded = wait_for(&mut events, |e| matches!(e, EngineEvent::ConfigReloaded { .. })).await;
    assert_eq!(reloaded, EngineEvent::ConfigReloaded { entries: 2 });
    wait_for(&mut events, |e| matches!(e, EngineEvent::CycleFinished { .. })).await;

    shutdown_tx.send(()).unwrap();
    engine_handle.await.unwrap().unwrap();
    assert_eq!(endpoint.calls_for("vpn"), 1);
}

#[tokio::test]
async fn consumed_request_does_not_cut_sleep_short() {
    let fixture = Fixture::new();
    fixture.write(vec![fixture.entry(1, "www", 3600)]);

    let ip_source = ControlledIpSource::new(ip("203.0.113.10"));
    let endpoint = RecordingEndpoint::new();
    let (mut engine, mut events) =
        fixture.engine(&ip_source, &endpoint, Arc::new(MemoryHistoryStore::new()));

    // The first cycle consumes this request; its wakeup must not start a second
    engine.reload_handle().request_reload();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let engine_handle = tokio::spawn(async move { engine.run(shutdown_rx).await });

    wait_for(&mut events, |e| matches!(e, EngineEvent::CycleFinished { .. })).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    let extra = drain(&mut events)
        .iter()
        .filter(|e| matches!(e, EngineEvent::CycleStarted { .. }))
        .count();

    shutdown_tx.send(()).unwrap();
    engine_handle.await.unwrap().unwrap();
    assert_eq!(extra, 0);
    assert_eq!(ip_source.call_count(), 1);
}

async fn wait_for(
    events: &mut tokio::sync::mpsc::Receiver<EngineEvent>,
    pred: impl Fn(&EngineEvent) -> bool,
) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("engine still running");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event arrives promptly")
}
