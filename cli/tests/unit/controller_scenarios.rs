//! Workload controller scenarios against the scripted fake plane.
//!
//! All tests run on a paused clock, so poll intervals cost no wall time.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use deckhand_cli::application::NoDebugger;
use deckhand_cli::application::services::WorkloadController;
use deckhand_cli::domain::{FailureKind, LifecycleError};
use deckhand_common::{ArtifactRef, DesiredState, ReplicaStatus, RunState, StreamKind, WorkloadId};
use tokio_util::sync::CancellationToken;

use crate::mocks::{FakePlane, MemoryLogSink, deps, running, snapshot, starting, stopped};

struct Harness {
    plane: Arc<FakePlane>,
    log: Arc<MemoryLogSink>,
    controller: Arc<WorkloadController>,
}

fn harness(poll_interval_ms: u64, start_timeout_secs: u64) -> Harness {
    let plane = FakePlane::new();
    let log = MemoryLogSink::new();
    let controller = Arc::new(WorkloadController::new(
        WorkloadId::new("api", "test"),
        deps(&plane, &log, poll_interval_ms, start_timeout_secs),
        CancellationToken::new(),
    ));
    Harness {
        plane,
        log,
        controller,
    }
}

/// Record every state the controller publishes.
fn record_states(controller: &Arc<WorkloadController>) -> Arc<Mutex<Vec<RunState>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let weak = Arc::downgrade(controller);
    let sink = Arc::clone(&seen);
    controller.on_state_change(move || {
        if let Some(controller) = weak.upgrade() {
            sink.lock().unwrap().push(controller.state());
        }
    });
    seen
}

#[tokio::test(start_paused = true)]
async fn restart_waits_for_running() {
    let h = harness(1000, 60);
    h.plane.script("api", vec![starting("api"), starting("api"), running("api")]);
    let states = record_states(&h.controller);

    let state = h.controller.restart(DesiredState::Started).await.expect("restart");

    assert_eq!(state, RunState::Running);
    assert_eq!(h.controller.in_progress(), 0);
    assert!(h.controller.last_failure().is_none());
    assert_eq!(*states.lock().unwrap(), vec![RunState::Starting, RunState::Running]);
    assert_eq!(h.plane.count("restart"), 1);
    assert!(!h.log.messages(StreamKind::Progress).is_empty());
}

#[tokio::test(start_paused = true)]
async fn restart_to_stopped_skips_polling() {
    let h = harness(1000, 60);
    h.plane.script("api", vec![stopped("api")]);

    let state = h.controller.restart(DesiredState::Stopped).await.expect("restart");

    assert_eq!(state, RunState::Inactive);
    // Only the closing refresh.
    assert_eq!(h.plane.count("fetch"), 1);
}

#[tokio::test(start_paused = true)]
async fn second_restart_supersedes_first() {
    let h = harness(1000, 60);
    h.plane.script(
        "api",
        vec![starting("api"), starting("api"), starting("api"), running("api")],
    );
    let states = record_states(&h.controller);

    let first = {
        let c = Arc::clone(&h.controller);
        tokio::spawn(async move { c.restart(DesiredState::Started).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = {
        let c = Arc::clone(&h.controller);
        tokio::spawn(async move { c.restart(DesiredState::Started).await })
    };

    assert_eq!(first.await.unwrap(), Err(LifecycleError::Canceled));
    assert_eq!(second.await.unwrap(), Ok(RunState::Running));
    assert!(h.controller.last_failure().is_none());
    assert_eq!(h.controller.in_progress(), 0);
    // The hand-over never lets the state fall out of `Starting`.
    assert_eq!(*states.lock().unwrap(), vec![RunState::Starting, RunState::Running]);
    assert!(h.log.messages(StreamKind::Error).is_empty());
}

#[tokio::test(start_paused = true)]
async fn superseded_restart_writes_no_snapshot() {
    let h = harness(1000, 60);
    h.plane.script("api", vec![starting("api")]);

    let first = {
        let c = Arc::clone(&h.controller);
        tokio::spawn(async move { c.restart(DesiredState::Started).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    // A stop takes over; the plane now reports no replicas.
    h.plane.script("api", vec![stopped("api")]);
    let stop = h.controller.stop().await.expect("stop");
    assert_eq!(stop, RunState::Inactive);

    assert_eq!(first.await.unwrap(), Err(LifecycleError::Canceled));
    assert_eq!(h.controller.state(), RunState::Inactive);
    let seen = h.controller.snapshot().expect("snapshot");
    assert!(seen.replicas.is_empty(), "stop's snapshot must not be overwritten");
}

#[tokio::test(start_paused = true)]
async fn never_running_times_out_and_degrades_to_unknown() {
    let h = harness(2000, 6);
    h.plane.script("api", vec![starting("api")]);

    let err = h
        .controller
        .restart(DesiredState::Started)
        .await
        .expect_err("times out");

    assert!(matches!(
        err,
        LifecycleError::TimedOut { last_state: RunState::Starting, settled: false, .. }
    ));
    assert_eq!(h.controller.state(), RunState::Unknown);
    assert_eq!(h.controller.last_failure().map(|f| f.kind), Some(FailureKind::TimedOut));
    // Initial fetch plus three re-polls.
    assert_eq!(h.plane.count("fetch"), 4);
    assert_eq!(h.log.messages(StreamKind::Error).len(), 1);

    h.plane.script("api", vec![running("api")]);
    assert_eq!(h.controller.refresh().await.expect("refresh"), RunState::Running);
    assert!(h.controller.last_failure().is_none());
}

#[tokio::test(start_paused = true)]
async fn crashed_replica_is_reported_with_its_cause() {
    let h = harness(1000, 60);
    h.plane.script(
        "api",
        vec![
            starting("api"),
            Some(snapshot("api", &[ReplicaStatus::Running, ReplicaStatus::Crashed])),
        ],
    );

    let err = h
        .controller
        .restart(DesiredState::Started)
        .await
        .expect_err("crashed");

    assert!(matches!(
        err,
        LifecycleError::TimedOut { last_state: RunState::Crashed, settled: true, .. }
    ));
    assert_eq!(h.controller.state(), RunState::Unknown);
}

#[tokio::test(start_paused = true)]
async fn vanished_workload_is_recorded() {
    let h = harness(1000, 60);
    h.plane.script("api", vec![starting("api"), None]);

    let err = h
        .controller
        .restart(DesiredState::Started)
        .await
        .expect_err("vanished");

    assert_eq!(err, LifecycleError::Vanished { name: "api".into() });
    assert_eq!(h.controller.last_failure().map(|f| f.kind), Some(FailureKind::Vanished));
    assert_eq!(h.controller.state(), RunState::Unknown);
}

#[tokio::test(start_paused = true)]
async fn remote_failure_keeps_context_and_releases_counter() {
    let h = harness(1000, 60);
    h.plane.script("api", vec![running("api")]);
    h.plane.fail_next("redeploy", "upload rejected: quota exceeded");

    let err = h
        .controller
        .redeploy(&ArtifactRef::new("build/api.tar"), DesiredState::Started)
        .await
        .expect_err("remote failure");

    match err {
        LifecycleError::RemoteFailure(message) => assert!(message.contains("quota exceeded")),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(h.controller.in_progress(), 0);
    assert_eq!(h.controller.state(), RunState::Unknown);
    let errors = h.log.messages(StreamKind::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("redeploy failed"));
}

#[tokio::test(start_paused = true)]
async fn delete_runs_alongside_restart() {
    let h = harness(1000, 60);
    h.plane.script("api", vec![starting("api"), starting("api"), running("api")]);

    let restart = {
        let c = Arc::clone(&h.controller);
        tokio::spawn(async move { c.restart(DesiredState::Started).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let delete = {
        let c = Arc::clone(&h.controller);
        tokio::spawn(async move { c.delete().await })
    };

    assert_eq!(delete.await.unwrap(), Ok(()));
    assert_eq!(restart.await.unwrap(), Ok(RunState::Running));
    assert_eq!(h.plane.count("delete"), 1);
}

#[tokio::test(start_paused = true)]
async fn attach_debug_upgrades_running_to_debugging() {
    let h = harness(1000, 60);
    h.plane.script("api", vec![starting("api"), running("api")]);

    let state = h.controller.attach_debug(5005).await.expect("debug");

    assert_eq!(state, RunState::Debugging);
    assert!(h.controller.is_debugger_attached());
    assert_eq!(h.plane.count("debug"), 1);
    assert_eq!(h.plane.count("attach"), 1);
}

#[tokio::test(start_paused = true)]
async fn attach_debug_without_debugger_support_fails() {
    let plane = FakePlane::new();
    let log = MemoryLogSink::new();
    let mut deps = deps(&plane, &log, 1000, 60);
    deps.debugger = Arc::new(NoDebugger);
    let controller = WorkloadController::new(WorkloadId::new("api", "test"), deps, CancellationToken::new());
    plane.script("api", vec![starting("api"), running("api")]);

    let err = controller.attach_debug(5005).await.expect_err("no debugger");

    assert!(matches!(err, LifecycleError::RemoteFailure(ref m) if m.contains("no debugger available")));
    assert!(!controller.is_debugger_attached());
    assert_eq!(controller.in_progress(), 0);
    assert_eq!(log.messages(StreamKind::Error).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_after_dispose_is_canceled_before_remote_call() {
    let h = harness(1000, 60);
    h.plane.script("api", vec![running("api")]);
    h.controller.dispose();

    assert_eq!(h.controller.stop().await, Err(LifecycleError::Canceled));
    assert_eq!(h.controller.delete().await, Err(LifecycleError::Canceled));
    assert_eq!(h.plane.count("stop"), 0);
    assert_eq!(h.plane.count("delete"), 0);
    assert!(h.log.messages(StreamKind::Error).is_empty());
}

#[tokio::test(start_paused = true)]
async fn applied_snapshot_notifies_once() {
    let h = harness(1000, 60);
    let states = record_states(&h.controller);

    let state = h
        .controller
        .apply_snapshot(snapshot("api", &[ReplicaStatus::Running, ReplicaStatus::Starting, ReplicaStatus::Running]))
        .await;

    assert_eq!(state, RunState::Starting);
    assert_eq!(*states.lock().unwrap(), vec![RunState::Starting]);
}
