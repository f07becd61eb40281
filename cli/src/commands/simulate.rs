//! `deckhand simulate`: drive one lifecycle operation against an in-memory
//! control plane and print every run-state transition.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use deckhand_common::{DesiredState, ReplicaStatus, RunState};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::app::AppContext;
use crate::application::ports::{ConfigStore, ControlPlane, DebuggerProbe, LogSink};
use crate::application::services::{ControllerDeps, Operation, WorkloadRegistry};
use crate::infra::log_sink::TracingLogSink;
use crate::infra::simulated::{SimulatedControlPlane, SimulationPlan};
use crate::output::TerminalReporter;

/// Arguments for the simulate command.
#[derive(Args)]
pub struct SimulateArgs {
    /// Workload name
    #[arg(long, default_value = "demo")]
    pub name: String,

    /// Number of replicas
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=64))]
    pub replicas: u32,

    /// Status fetches that still report `starting` after the restart
    #[arg(long, default_value_t = 2)]
    pub settle_after: u32,

    /// State the first replica settles in
    #[arg(long, value_enum, default_value_t = Outcome::Running)]
    pub outcome: Outcome,

    /// Restart in debug mode and attach a debugger
    #[arg(long)]
    pub debug: bool,

    /// Port the debugger attaches to
    #[arg(long, default_value_t = 5005)]
    pub debug_port: u16,

    /// Override `lifecycle.poll_interval_ms` for this run
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Override `lifecycle.start_timeout_secs` for this run
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

/// Settled state of a simulated activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Outcome {
    Running,
    Crashed,
    Flapping,
}

impl From<Outcome> for ReplicaStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Running => Self::Running,
            Outcome::Crashed => Self::Crashed,
            Outcome::Flapping => Self::Flapping,
        }
    }
}

/// Run the simulate command.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or output fails. A failed
/// lifecycle operation is reported and yields a failure exit code instead.
pub async fn run(app: &AppContext, args: SimulateArgs) -> Result<ExitCode> {
    let mut config = app.config_store.load()?;
    if let Some(ms) = args.poll_interval_ms {
        config.set("lifecycle.poll_interval_ms", &ms.to_string())?;
    }
    if let Some(secs) = args.timeout_secs {
        config.set("lifecycle.start_timeout_secs", &secs.to_string())?;
    }

    let plan = SimulationPlan {
        replicas: args.replicas,
        settle_after: args.settle_after,
        outcome: args.outcome.into(),
        ..SimulationPlan::default()
    };
    let plane = Arc::new(SimulatedControlPlane::new(plan).with_workload(&args.name));
    let log: Arc<dyn LogSink> = if app.is_json() {
        Arc::new(TracingLogSink)
    } else {
        Arc::new(TerminalReporter::new(&app.output))
    };
    let registry = WorkloadRegistry::new(ControllerDeps {
        plane: Arc::clone(&plane) as Arc<dyn ControlPlane>,
        debugger: Arc::clone(&plane) as Arc<dyn DebuggerProbe>,
        log,
        config: config.lifecycle,
    });
    registry.set_names(plane.names());

    let controller = registry.ensure(&args.name);
    let renderer = app.renderer();
    let started = Instant::now();
    let initial = controller.refresh().await.context("initial refresh failed")?;
    renderer.render_transition(controller.id(), initial, started.elapsed())?;

    let (tx, mut rx) = mpsc::unbounded_channel::<RunState>();
    let watched = Arc::downgrade(&controller);
    let listener = controller.on_state_change(move || {
        if let Some(controller) = watched.upgrade() {
            let _ = tx.send(controller.state());
        }
    });

    let op = if args.debug {
        Operation::AttachDebug {
            port: args.debug_port,
        }
    } else {
        Operation::Restart(DesiredState::Started)
    };
    tracing::debug!(workload = %controller.id(), op = op.name(), "simulation started");
    let mut task = registry.dispatch(&args.name, op.clone());

    let mut interrupted = false;
    let joined = loop {
        tokio::select! {
            Some(state) = rx.recv() => {
                renderer.render_transition(controller.id(), state, started.elapsed())?;
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                app.output.warn("Interrupted, canceling");
                registry.shutdown();
            }
            joined = &mut task => break joined,
        }
    };
    while let Ok(state) = rx.try_recv() {
        renderer.render_transition(controller.id(), state, started.elapsed())?;
    }
    controller.remove_state_listener(listener);

    let outcome = joined.context("operation task panicked")?;
    let error = outcome.as_ref().err().map(ToString::to_string);
    renderer.render_outcome(controller.id(), op.name(), controller.state(), error.as_deref())?;
    registry.shutdown();

    Ok(if error.is_none() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
