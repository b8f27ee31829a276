//! The routes/domain reconciler (§4.6.5): materializes pending
//! `CustomDomain` rows into orchestrator ingress objects and tracks
//! certificate issuance. Domain entry is idempotent — re-observing the
//! same pending row and reapplying costs nothing, so the loop doesn't
//! need to distinguish "first attempt" from "retry."

use crate::cluster::Cluster;
use crate::store::Store;
use tracing::{error, info, warn};

pub async fn run_route_loop(store: &Store, cluster: &dyn Cluster) {
    let pending = match crate::store::route::list_pending(store.pool()).await {
        Ok(rows) => rows,
        Err(err) => {
            error!(error = %err, "failed to list pending custom domains");
            return;
        }
    };

    for domain in pending {
        let spec = crate::cluster::DeploymentSpec {
            deployment_id: format!("route-{}", domain.id),
            service_name: domain.hostname.clone(),
            environment_name: domain.environment_id.clone(),
            image_uri: String::new(),
            replicas: 0,
            env_vars: Vec::new(),
        };

        if let Err(err) = cluster.apply(&spec).await {
            warn!(error = %err, domain_id = %domain.id, "route apply failed, will retry next tick");
            continue;
        }

        if crate::store::route::set_status(store.pool(), &domain.id, "active", "issued")
            .await
            .is_ok()
        {
            info!(domain_id = %domain.id, hostname = %domain.hostname, "custom domain materialized");
        }
    }
}
