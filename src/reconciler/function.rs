//! The function reconciler (§4.6.4): walks `pending` functions, applies
//! them to the cluster as a single-replica workload, and once the
//! cluster reports it healthy records the endpoint and transitions to
//! `ready`. Functions use the same `Cluster` trait as deployments —
//! conceptually a serverless workload is just a deployment with a
//! fixed replica count of one and its own address space, so this loop
//! mirrors `deployment::run_deployment_loop`'s claim/poll shape rather
//! than inventing a parallel one.

use crate::cluster::{Cluster, DeploymentSpec};
use crate::store::Store;
use tracing::{error, info, warn};

pub async fn run_function_loop(store: &Store, cluster: &dyn Cluster) {
    claim_pending(store, cluster).await;
    poll_deploying(store, cluster).await;
}

async fn claim_pending(store: &Store, cluster: &dyn Cluster) {
    let projects = match crate::store::project::list(store.pool()).await {
        Ok(rows) => rows,
        Err(err) => {
            error!(error = %err, "failed to list projects for function reconciliation");
            return;
        }
    };

    for project in projects {
        let functions = match crate::store::function::list_for_project(store.pool(), &project.id).await {
            Ok(rows) => rows,
            Err(_) => continue,
        };

        for function in functions.into_iter().filter(|f| f.status == "pending") {
            if let Err(err) = crate::store::function::set_status(store.pool(), &function.id, "deploying").await {
                warn!(error = %err, function_id = %function.id, "function already claimed");
                continue;
            }

            let spec = DeploymentSpec {
                deployment_id: format!("function-{}", function.id),
                service_name: function.name.clone(),
                environment_name: "functions".to_string(),
                image_uri: function.image_uri.clone().unwrap_or_default(),
                replicas: 1,
                env_vars: Vec::new(),
            };

            if let Err(err) = cluster.apply(&spec).await {
                error!(error = %err, function_id = %function.id, "function apply failed");
                let _ = crate::store::function::set_status(store.pool(), &function.id, "failed").await;
                continue;
            }

            info!(function_id = %function.id, "function applied to cluster");
        }
    }
}

async fn poll_deploying(store: &Store, cluster: &dyn Cluster) {
    let projects = match crate::store::project::list(store.pool()).await {
        Ok(rows) => rows,
        Err(_) => return,
    };

    for project in projects {
        let functions = match crate::store::function::list_for_project(store.pool(), &project.id).await {
            Ok(rows) => rows,
            Err(_) => continue,
        };

        for function in functions.into_iter().filter(|f| f.status == "deploying") {
            let observation = match cluster.status(&format!("function-{}", function.id)).await {
                Ok(obs) => obs,
                Err(err) => {
                    warn!(error = %err, function_id = %function.id, "function status check failed");
                    continue;
                }
            };

            let _ = crate::store::function::set_observed_replicas(
                store.pool(),
                &function.id,
                observation.observed_replicas,
            )
            .await;

            if observation.healthy && observation.observed_replicas >= 1 {
                let image_uri = function.image_uri.clone().unwrap_or_default();
                let endpoint_url = format!("https://{}.functions.local", function.name);
                let _ = crate::store::function::transition_ready(
                    store.pool(),
                    &function.id,
                    &image_uri,
                    &endpoint_url,
                )
                .await;
                info!(function_id = %function.id, "function ready");
            }
        }
    }
}
