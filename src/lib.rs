pub mod api;
pub mod audit;
pub mod auth;
pub mod builder;
pub mod cluster;
pub mod config;
pub mod crypto;
pub mod error;
pub mod preview;
pub mod reconciler;
pub mod store;
pub mod webhook_dispatcher;

use std::sync::Arc;

use audit::AuditSink;
use builder::BuildIntent;
use cluster::{AddonProvisioner, Cluster};
use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use preview::AccessTracker;
use reconciler::ReconcilerHandles;
use store::Store;
use tokio::sync::mpsc;
use webhook_dispatcher::WebhookDispatcher;

use crate::api::rate_limit::RateLimiter;

/// Everything an API handler needs to reach the rest of the control
/// plane. Assembled once in `main` and shared behind an `Arc` the same
/// way the teacher's `AppState` is — one struct, cheap to extract, no
/// handler holds its own copy of a collaborator.
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub audit: AuditSink,
    pub cluster: Arc<dyn Cluster>,
    pub addon_provisioner: Arc<dyn AddonProvisioner>,
    pub build_tx: mpsc::Sender<BuildIntent>,
    pub reconciler_handles: ReconcilerHandles,
    pub webhook_dispatcher: WebhookDispatcher,
    pub preview_access_tracker: AccessTracker,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        store: Store,
        audit: AuditSink,
        cluster: Arc<dyn Cluster>,
        addon_provisioner: Arc<dyn AddonProvisioner>,
        build_tx: mpsc::Sender<BuildIntent>,
        reconciler_handles: ReconcilerHandles,
        webhook_dispatcher: WebhookDispatcher,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config,
            store,
            audit,
            cluster,
            addon_provisioner,
            build_tx,
            reconciler_handles,
            webhook_dispatcher,
            preview_access_tracker: AccessTracker::new(),
            rate_limiter,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
