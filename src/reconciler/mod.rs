//! The Reconciler Set (C6): independent tick loops, one per entity
//! class, each converging observed state toward desired state by
//! calling the [`Cluster`](crate::cluster::Cluster) trait. Grounded on
//! the teacher's `DeploymentEngine::run` loop shape (bounded work unit,
//! `tokio::spawn` per item, status written back through the store) but
//! generalized from a single mpsc-driven engine into five independent
//! tickers per spec.md §4.6, each with its own interval and a
//! wake-on-write path so a fresh deployment doesn't wait out a full
//! tick before its first reconcile pass.

mod addon;
mod deployment;
mod function;
mod route;
mod service_health;

pub use addon::run_addon_loop;
pub use deployment::run_deployment_loop;
pub use function::run_function_loop;
pub use route::run_route_loop;
pub use service_health::run_service_health_loop;

use crate::cluster::{AddonProvisioner, Cluster};
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// A handle a caller can use to nudge a loop to run immediately instead
/// of waiting for its next tick — used right after a write that the
/// loop cares about (e.g. a newly pending deployment).
#[derive(Clone, Default)]
pub struct WakeHandle(Arc<Notify>);

impl WakeHandle {
    pub fn wake(&self) {
        self.0.notify_one();
    }
}

pub struct ReconcilerHandles {
    pub deployment_wake: WakeHandle,
}

/// Runs `body` on `tick_interval` plus wake-on-write until `shutdown`
/// fires, then gives it one last `shutdown_grace`-bounded pass. Each of
/// the five loops is a single instantiation of this shape against a
/// different entity class, matching spec.md §4.6's "five cooperating
/// loops, each single-writer for its entity class."
fn spawn_loop<F, Fut>(
    tick_interval: Duration,
    shutdown_grace: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
    wake: Option<Arc<Notify>>,
    mut body: F,
) where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        loop {
            match &wake {
                Some(wake) => {
                    tokio::select! {
                        _ = tokio::time::sleep(tick_interval) => {}
                        _ = wake.notified() => {}
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
                None => {
                    tokio::select! {
                        _ = tokio::time::sleep(tick_interval) => {}
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }
            body().await;
        }
        let _ = tokio::time::timeout(shutdown_grace, body()).await;
    });
}

/// Spawns every reconciler loop. Each loop runs until the provided
/// `shutdown` signal fires, then has `shutdown_grace` to finish its
/// current pass before the process moves on — mirrors the bounded
/// shutdown window spec.md §4.6 calls for.
#[allow(clippy::too_many_arguments)]
pub fn spawn_all(
    store: Store,
    cluster: Arc<dyn Cluster>,
    addon_provisioner: Arc<dyn AddonProvisioner>,
    tick_interval: Duration,
    shutdown_grace: Duration,
    shutdown: tokio::sync::watch::Receiver<bool>,
    addon_encryption_key: Option<String>,
    webhook_dispatcher: crate::webhook_dispatcher::WebhookDispatcher,
    deployment_deadline: Duration,
) -> ReconcilerHandles {
    let deployment_wake = WakeHandle::default();

    {
        let store = store.clone();
        let cluster = cluster.clone();
        let wake = deployment_wake.0.clone();
        let dispatcher = webhook_dispatcher.clone();
        let encryption_key = addon_encryption_key.clone();
        spawn_loop(tick_interval, shutdown_grace, shutdown.clone(), Some(wake), move || {
            let store = store.clone();
            let cluster = cluster.clone();
            let dispatcher = dispatcher.clone();
            let encryption_key = encryption_key.clone();
            async move {
                deployment::run_deployment_loop(
                    &store,
                    cluster.as_ref(),
                    &dispatcher,
                    deployment_deadline,
                    encryption_key.as_deref(),
                )
                .await
            }
        });
    }

    {
        let store = store.clone();
        spawn_loop(tick_interval, shutdown_grace, shutdown.clone(), None, move || {
            let store = store.clone();
            async move { service_health::run_service_health_loop(&store).await }
        });
    }

    {
        let store = store.clone();
        let provisioner = addon_provisioner.clone();
        let encryption_key = addon_encryption_key.clone();
        spawn_loop(tick_interval, shutdown_grace, shutdown.clone(), None, move || {
            let store = store.clone();
            let provisioner = provisioner.clone();
            let encryption_key = encryption_key.clone();
            async move { addon::run_addon_loop(&store, provisioner.as_ref(), encryption_key.as_deref()).await }
        });
    }

    {
        let store = store.clone();
        let cluster = cluster.clone();
        spawn_loop(tick_interval, shutdown_grace, shutdown.clone(), None, move || {
            let store = store.clone();
            let cluster = cluster.clone();
            async move { function::run_function_loop(&store, cluster.as_ref()).await }
        });
    }

    {
        let store = store.clone();
        let cluster = cluster.clone();
        spawn_loop(tick_interval, shutdown_grace, shutdown, None, move || {
            let store = store.clone();
            let cluster = cluster.clone();
            async move { route::run_route_loop(&store, cluster.as_ref()).await }
        });
    }

    ReconcilerHandles { deployment_wake }
}
