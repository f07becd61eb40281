//! Workload registry: identity, reconciliation and background dispatch.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use deckhand_cli::application::services::{Operation, WorkloadRegistry};
use deckhand_cli::domain::LifecycleError;
use deckhand_common::{DesiredState, RunState, StreamKind};

use crate::mocks::{FakePlane, MemoryLogSink, deps, running, starting};

fn registry() -> (WorkloadRegistry, Arc<FakePlane>, Arc<MemoryLogSink>) {
    let plane = FakePlane::new();
    let log = MemoryLogSink::new();
    (WorkloadRegistry::new(deps(&plane, &log, 1000, 60)), plane, log)
}

#[test]
fn ensure_returns_the_same_controller() {
    let (registry, _, _) = registry();
    let first = registry.ensure("api");
    let second = registry.ensure("api");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.id().to_string(), "api@test");
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn set_names_creates_and_disposes() {
    let (registry, _, _) = registry();
    let old = registry.ensure("old");
    let kept = registry.ensure("kept");

    registry.set_names(["kept", "new"]);

    assert_eq!(registry.names(), vec!["kept".to_string(), "new".to_string()]);
    assert!(Arc::ptr_eq(&kept, &registry.get("kept").expect("kept")));
    assert!(registry.get("old").is_none());
    // Disposed controllers refuse further work.
    assert_eq!(old.delete().await, Err(LifecycleError::Canceled));
}

#[tokio::test]
async fn remove_disposes_controller() {
    let (registry, _, _) = registry();
    let controller = registry.ensure("api");
    assert!(registry.remove("api"));
    assert!(!registry.remove("api"));
    assert!(registry.is_empty());
    assert_eq!(controller.stop().await, Err(LifecycleError::Canceled));
}

#[tokio::test(start_paused = true)]
async fn dispatch_swallows_superseded_operations() {
    let (registry, plane, log) = registry();
    plane.script("api", vec![starting("api"), starting("api"), starting("api"), running("api")]);

    let first = registry.dispatch("api", Operation::Restart(DesiredState::Started));
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = registry.dispatch("api", Operation::Restart(DesiredState::Started));

    assert_eq!(first.await.unwrap(), Ok(()));
    assert_eq!(second.await.unwrap(), Ok(()));
    assert_eq!(registry.ensure("api").state(), RunState::Running);
    assert!(log.messages(StreamKind::Error).is_empty());
}

#[tokio::test(start_paused = true)]
async fn dispatch_removes_vanished_workloads() {
    let (registry, plane, log) = registry();
    plane.script("gone", vec![starting("gone"), None]);
    registry.ensure("gone");

    let outcome = registry
        .dispatch("gone", Operation::Restart(DesiredState::Started))
        .await
        .unwrap();

    assert!(matches!(outcome, Err(LifecycleError::Vanished { .. })));
    assert!(registry.get("gone").is_none());
    assert_eq!(log.messages(StreamKind::Error).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn dispatch_delete_does_not_cancel_restart() {
    let (registry, plane, _) = registry();
    plane.script("api", vec![starting("api"), running("api")]);

    let restart = registry.dispatch("api", Operation::Restart(DesiredState::Started));
    tokio::time::sleep(Duration::from_millis(10)).await;
    let delete = registry.dispatch("api", Operation::Delete);

    assert_eq!(delete.await.unwrap(), Ok(()));
    assert_eq!(restart.await.unwrap(), Ok(()));
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_in_flight_operations() {
    let (registry, plane, log) = registry();
    plane.script("api", vec![starting("api")]);

    let restart = registry.dispatch("api", Operation::Restart(DesiredState::Started));
    tokio::time::sleep(Duration::from_millis(10)).await;
    registry.shutdown();

    assert_eq!(restart.await.unwrap(), Ok(()));
    assert!(registry.is_empty());
    assert!(log.messages(StreamKind::Error).is_empty());
}

#[test]
fn operation_names_are_stable() {
    assert_eq!(Operation::Stop.name(), "stop");
    assert_eq!(Operation::AttachDebug { port: 1 }.name(), "attach-debug");
    assert_eq!(Operation::Delete.name(), "delete");
}
