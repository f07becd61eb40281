//! Application service: one controller per workload of a session.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use deckhand_common::{ArtifactRef, DesiredState, WorkloadId};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::services::controller::{ControllerDeps, WorkloadController};
use crate::domain::error::LifecycleError;

/// User-triggered operation run in the background by
/// [`WorkloadRegistry::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Stop,
    Restart(DesiredState),
    Redeploy {
        artifact: ArtifactRef,
        target: DesiredState,
    },
    AttachDebug {
        port: u16,
    },
    Delete,
}

impl Operation {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Restart(_) => "restart",
            Self::Redeploy { .. } => "redeploy",
            Self::AttachDebug { .. } => "attach-debug",
            Self::Delete => "delete",
        }
    }
}

struct Inner {
    deps: ControllerDeps,
    session: CancellationToken,
    controllers: Mutex<HashMap<String, Arc<WorkloadController>>>,
}

/// Keeps exactly one [`WorkloadController`] per workload name.
///
/// Clones share the same set of controllers.
#[derive(Clone)]
pub struct WorkloadRegistry {
    inner: Arc<Inner>,
}

impl WorkloadRegistry {
    #[must_use]
    pub fn new(deps: ControllerDeps) -> Self {
        Self::with_session(deps, CancellationToken::new())
    }

    /// Registry whose controllers are all canceled when `session` fires.
    #[must_use]
    pub fn with_session(deps: ControllerDeps, session: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                deps,
                session,
                controllers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Get the controller for `name`, creating it on first reference.
    #[must_use]
    pub fn ensure(&self, name: &str) -> Arc<WorkloadController> {
        let mut controllers = self.lock();
        Arc::clone(
            controllers
                .entry(name.to_string())
                .or_insert_with(|| self.create(name)),
        )
    }

    /// Reconcile to exactly `names`: create what is new, dispose what is gone.
    pub fn set_names<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wanted: BTreeSet<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
        let removed: Vec<Arc<WorkloadController>> = {
            let mut controllers = self.lock();
            let stale: Vec<String> = controllers
                .keys()
                .filter(|name| !wanted.contains(*name))
                .cloned()
                .collect();
            for name in &wanted {
                if !controllers.contains_key(name) {
                    let controller = self.create(name);
                    controllers.insert(name.clone(), controller);
                }
            }
            stale
                .iter()
                .filter_map(|name| controllers.remove(name))
                .collect()
        };
        for controller in removed {
            controller.dispose();
        }
    }

    /// Drop and dispose the controller for `name`, if any.
    pub fn remove(&self, name: &str) -> bool {
        let Some(controller) = self.lock().remove(name) else {
            return false;
        };
        controller.dispose();
        true
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<WorkloadController>> {
        self.lock().get(name).cloned()
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run `op` against `name` on its own task.
    ///
    /// `Canceled` outcomes are swallowed. A `Vanished` outcome removes the
    /// workload from the registry. Every other failure has already been
    /// written to the log sink by the controller and is only traced here.
    pub fn dispatch(&self, name: &str, op: Operation) -> JoinHandle<Result<(), LifecycleError>> {
        let controller = self.ensure(name);
        let registry = self.clone();
        tokio::spawn(async move {
            let outcome = match &op {
                Operation::Stop => controller.stop().await.map(drop),
                Operation::Restart(target) => controller.restart(*target).await.map(drop),
                Operation::Redeploy { artifact, target } => {
                    controller.redeploy(artifact, *target).await.map(drop)
                }
                Operation::AttachDebug { port } => controller.attach_debug(*port).await.map(drop),
                Operation::Delete => controller.delete().await,
            };
            match outcome {
                Err(LifecycleError::Canceled) => Ok(()),
                Err(err @ LifecycleError::Vanished { .. }) => {
                    tracing::info!(workload = %controller.id(), op = op.name(), "workload vanished");
                    registry.remove_if_same(&controller);
                    Err(err)
                }
                Err(err) => {
                    tracing::debug!(workload = %controller.id(), op = op.name(), "dispatched operation failed: {err}");
                    Err(err)
                }
                Ok(()) => Ok(()),
            }
        })
    }

    /// Cancel every controller and empty the registry.
    pub fn shutdown(&self) {
        self.inner.session.cancel();
        let drained: Vec<_> = self.lock().drain().map(|(_, c)| c).collect();
        for controller in drained {
            controller.dispose();
        }
    }

    fn remove_if_same(&self, controller: &Arc<WorkloadController>) {
        let name = &controller.id().name;
        let removed = {
            let mut controllers = self.lock();
            match controllers.get(name) {
                Some(current) if Arc::ptr_eq(current, controller) => controllers.remove(name),
                _ => None,
            }
        };
        if let Some(controller) = removed {
            controller.dispose();
        }
    }

    fn create(&self, name: &str) -> Arc<WorkloadController> {
        let id = WorkloadId::new(name, self.inner.deps.config.target.clone());
        tracing::debug!(workload = %id, "controller created");
        Arc::new(WorkloadController::new(
            id,
            self.inner.deps.clone(),
            self.inner.session.child_token(),
        ))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<WorkloadController>>> {
        self.inner
            .controllers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
