//! The service health aggregator: rolls each service's live deployments
//! up into a single `health` label. A service with no live deployments
//! is `unknown`; one where every live deployment reports `healthy` is
//! `healthy`; any other mix is `degraded`. Single writer for
//! `services.health`, same discipline as the deployment loop owning
//! `deployments.status`.

use crate::store::Store;
use tracing::error;

pub async fn run_service_health_loop(store: &Store) {
    let projects = match crate::store::project::list(store.pool()).await {
        Ok(rows) => rows,
        Err(err) => {
            error!(error = %err, "failed to list projects for health aggregation");
            return;
        }
    };

    for project in projects {
        let services = match crate::store::service::list_for_project(store.pool(), &project.id).await {
            Ok(rows) => rows,
            Err(err) => {
                error!(error = %err, project_id = %project.id, "failed to list services for health aggregation");
                continue;
            }
        };

        for service in services {
            let live = match crate::store::deployment::list_live_for_service(store.pool(), &service.id).await {
                Ok(rows) => rows,
                Err(err) => {
                    error!(error = %err, service_id = %service.id, "failed to list live deployments");
                    continue;
                }
            };

            let health = if live.is_empty() {
                "unknown"
            } else if live.iter().all(|d| d.health == "healthy") {
                "healthy"
            } else {
                "degraded"
            };

            if health != service.health {
                let _ = crate::store::service::set_health(store.pool(), &service.id, health).await;
            }
        }
    }
}
