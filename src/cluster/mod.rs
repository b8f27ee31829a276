//! The `Cluster` trait: the external collaborator that actually runs
//! workloads (a Kubernetes-like orchestrator in production). Stands in
//! for the teacher's `ContainerRuntime` trait (`runtime::ContainerRuntime`
//! in rivetr), generalized from "run one container" to "apply/observe
//! a declarative deployment spec" since Switchyard's core never talks
//! to a container engine directly — only to this trait object.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The desired state for one deployment, handed to `Cluster::apply`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSpec {
    pub deployment_id: String,
    pub service_name: String,
    pub environment_name: String,
    pub image_uri: String,
    pub replicas: i64,
    pub env_vars: Vec<(String, String)>,
}

/// The observed state for one deployment, returned by `Cluster::status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentObservation {
    pub observed_replicas: i64,
    pub healthy: bool,
}

/// The orchestrator seam. A production implementation talks to
/// whatever scheduler runs the workloads; tests and local dev use
/// `cluster::fake::FakeCluster`.
#[async_trait]
pub trait Cluster: Send + Sync {
    async fn apply(&self, spec: &DeploymentSpec) -> Result<()>;
    async fn status(&self, deployment_id: &str) -> Result<DeploymentObservation>;
    async fn remove(&self, deployment_id: &str) -> Result<()>;
}

/// What the addon reconciler asks for when provisioning a managed
/// backing service (database, cache, queue).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddonRequest {
    pub addon_id: String,
    pub addon_type: String,
    pub config: String,
}

/// Connection details handed back once provisioning completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddonProvisioned {
    pub host: String,
    pub port: i64,
    pub database_name: String,
    pub username: String,
    pub secret_ref: String,
}

/// The managed-backing-service seam, separate from `Cluster` because
/// provisioning a database or queue talks to a different external
/// control plane than scheduling a workload.
#[async_trait]
pub trait AddonProvisioner: Send + Sync {
    async fn provision(&self, request: &AddonRequest) -> Result<AddonProvisioned>;
    async fn deprovision(&self, addon_id: &str) -> Result<()>;
}

/// An in-memory stand-in for the real orchestrator, used by tests and
/// by `switchyard` when started with no cluster backend configured.
pub mod fake {
    use super::*;
    use dashmap::DashMap;
    use std::sync::Arc;

    /// An in-memory `Cluster` that immediately reports every applied
    /// deployment as fully healthy — used by integration tests and
    /// local `switchyard` runs with no real orchestrator attached.
    #[derive(Clone, Default)]
    pub struct FakeCluster {
        state: Arc<DashMap<String, DeploymentObservation>>,
    }

    impl FakeCluster {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl Cluster for FakeCluster {
        async fn apply(&self, spec: &DeploymentSpec) -> Result<()> {
            self.state.insert(
                spec.deployment_id.clone(),
                DeploymentObservation { observed_replicas: spec.replicas, healthy: true },
            );
            Ok(())
        }

        async fn status(&self, deployment_id: &str) -> Result<DeploymentObservation> {
            Ok(self
                .state
                .get(deployment_id)
                .map(|entry| entry.clone())
                .unwrap_or(DeploymentObservation { observed_replicas: 0, healthy: false }))
        }

        async fn remove(&self, deployment_id: &str) -> Result<()> {
            self.state.remove(deployment_id);
            Ok(())
        }
    }

    /// An in-memory `AddonProvisioner` that succeeds immediately with
    /// deterministic connection details.
    #[derive(Clone, Default)]
    pub struct FakeAddonProvisioner;

    impl FakeAddonProvisioner {
        pub fn new() -> Self {
            Self
        }
    }

    #[async_trait]
    impl AddonProvisioner for FakeAddonProvisioner {
        async fn provision(&self, request: &AddonRequest) -> Result<AddonProvisioned> {
            Ok(AddonProvisioned {
                host: format!("{}.addons.local", request.addon_id),
                port: 5432,
                database_name: request.addon_type.clone(),
                username: "app".to_string(),
                secret_ref: format!("addon-secret-{}", request.addon_id),
            })
        }

        async fn deprovision(&self, _addon_id: &str) -> Result<()> {
            Ok(())
        }
    }
}
