//! The Deployment reconciler loop: claims every `pending` deployment
//! FIFO-by-creation, applies it to the cluster, then polls `deploying`
//! deployments for the cluster's observed state, promoting to
//! `live`/`degraded`/`failed` as appropriate and superseding whatever
//! was previously live for that (service, environment) pair. Single
//! writer per deployment row: only this loop transitions deployment
//! status, so no other component races it.

use crate::cluster::{Cluster, DeploymentSpec};
use crate::store::Store;
use crate::webhook_dispatcher::{WebhookDispatcher, WebhookEvent};
use tracing::{error, info, warn};

pub async fn run_deployment_loop(
    store: &Store,
    cluster: &dyn Cluster,
    dispatcher: &WebhookDispatcher,
    deadline: std::time::Duration,
    encryption_key: Option<&str>,
) {
    claim_pending(store, cluster, dispatcher, encryption_key).await;
    poll_deploying(store, cluster, dispatcher, deadline).await;
}

/// Resolves the env vars a deployment's container needs from its
/// service's addon bindings: one `(env_var_name, connection_string)`
/// pair per binding to a `ready` addon, decrypting the addon's
/// `secret_ref` with the configured encryption key (§4.8). A binding
/// whose addon isn't ready yet, or whose secret fails to decrypt, is
/// skipped rather than failing the whole deployment — the service still
/// deploys, just without that one variable set.
async fn resolve_addon_env_vars(
    store: &Store,
    service_id: &str,
    encryption_key: Option<&str>,
) -> Vec<(String, String)> {
    let bindings = crate::store::addon::list_bindings_for_service(store.pool(), service_id)
        .await
        .unwrap_or_default();
    let key = encryption_key.map(crate::crypto::derive_key);

    let mut env_vars = Vec::new();
    for binding in bindings {
        if binding.status == "deleted" {
            continue;
        }
        let addon = match crate::store::addon::get(store.pool(), &binding.addon_id).await {
            Ok(addon) if addon.status == "ready" => addon,
            _ => continue,
        };
        let (Some(host), Some(port), Some(database_name), Some(username), Some(secret_ref)) = (
            addon.host.as_deref(),
            addon.port,
            addon.database_name.as_deref(),
            addon.username.as_deref(),
            addon.secret_ref.as_deref(),
        ) else {
            continue;
        };
        let secret = match crate::crypto::decrypt_if_encrypted(secret_ref, key.as_ref()) {
            Ok(secret) => secret,
            Err(err) => {
                warn!(error = %err, addon_id = %addon.id, "failed to decrypt addon secret for binding");
                continue;
            }
        };
        let connection_string =
            format!("{}://{}:{}@{}:{}/{}", addon.addon_type, username, secret, host, port, database_name);
        env_vars.push((binding.env_var_name, connection_string));
    }
    env_vars
}

async fn claim_pending(
    store: &Store,
    cluster: &dyn Cluster,
    dispatcher: &WebhookDispatcher,
    encryption_key: Option<&str>,
) {
    let pending = match crate::store::deployment::list_by_status(store.pool(), "pending").await {
        Ok(rows) => rows,
        Err(err) => {
            error!(error = %err, "failed to list pending deployments");
            return;
        }
    };

    for deployment in pending {
        if let Err(err) = crate::store::deployment::transition(
            store.pool(),
            &deployment.id,
            "pending",
            "deploying",
            None,
        )
        .await
        {
            warn!(error = %err, deployment_id = %deployment.id, "deployment already claimed");
            continue;
        }

        let service = match crate::store::service::get(store.pool(), &deployment.service_id).await {
            Ok(svc) => svc,
            Err(err) => {
                // No project to route a webhook event against without the
                // service row, so this one failure path falls back to the
                // service id — every later path uses the real project id.
                fail(store, dispatcher, &deployment.service_id, &deployment.id, &err.to_string()).await;
                continue;
            }
        };
        let project_id = &service.project_id;

        let release = match crate::store::release::get(store.pool(), &deployment.release_id).await {
            Ok(release) => release,
            Err(err) => {
                fail(store, dispatcher, project_id, &deployment.id, &err.to_string()).await;
                continue;
            }
        };
        let Some(image_uri) = release.image_uri else {
            fail(store, dispatcher, project_id, &deployment.id, "release has no image_uri").await;
            continue;
        };
        let environment = match crate::store::environment::get(store.pool(), &deployment.environment_id).await {
            Ok(env) => env,
            Err(err) => {
                fail(store, dispatcher, project_id, &deployment.id, &err.to_string()).await;
                continue;
            }
        };

        let env_vars = resolve_addon_env_vars(store, &service.id, encryption_key).await;

        let spec = DeploymentSpec {
            deployment_id: deployment.id.clone(),
            service_name: service.name.clone(),
            environment_name: environment.name,
            image_uri,
            replicas: deployment.replicas,
            env_vars,
        };

        if let Err(err) = cluster.apply(&spec).await {
            fail(store, dispatcher, project_id, &deployment.id, &err.to_string()).await;
            continue;
        }

        info!(deployment_id = %deployment.id, "deployment applied to cluster");
    }
}

async fn poll_deploying(
    store: &Store,
    cluster: &dyn Cluster,
    dispatcher: &WebhookDispatcher,
    deadline: std::time::Duration,
) {
    let deploying = match crate::store::deployment::list_by_status(store.pool(), "deploying").await {
        Ok(rows) => rows,
        Err(err) => {
            error!(error = %err, "failed to list deploying deployments");
            return;
        }
    };

    for deployment in deploying {
        if past_deadline(&deployment.created_at, deadline) {
            let project_id = crate::store::service::get(store.pool(), &deployment.service_id)
                .await
                .map(|svc| svc.project_id)
                .unwrap_or_else(|_| deployment.service_id.clone());
            fail(
                store,
                dispatcher,
                &project_id,
                &deployment.id,
                &format!("deployment exceeded {}s deadline", deadline.as_secs()),
            )
            .await;
            continue;
        }

        let observation = match cluster.status(&deployment.id).await {
            Ok(obs) => obs,
            Err(err) => {
                warn!(error = %err, deployment_id = %deployment.id, "cluster status check failed");
                continue;
            }
        };

        let health = if observation.healthy { "healthy" } else { "unhealthy" };
        let _ = crate::store::deployment::set_observed(
            store.pool(),
            &deployment.id,
            observation.observed_replicas,
            health,
        )
        .await;

        if observation.healthy && observation.observed_replicas >= deployment.replicas {
            if crate::store::deployment::transition(
                store.pool(),
                &deployment.id,
                "deploying",
                "live",
                None,
            )
            .await
            .is_ok()
            {
                let _ = crate::store::deployment::supersede_other_live(
                    store.pool(),
                    &deployment.service_id,
                    &deployment.environment_id,
                    &deployment.id,
                )
                .await;
                let _ = crate::store::service::set_health(store.pool(), &deployment.service_id, "healthy").await;
                crate::api::metrics::record_deployment_outcome("live");
                promote_linked_preview(store, &deployment.id).await;
                info!(deployment_id = %deployment.id, "deployment is live");
            }
        }
    }
}

/// Whether a deployment's age since creation exceeds the configured
/// per-service deploy deadline (§4.6.1); malformed timestamps never
/// trip the deadline rather than risk flapping a healthy deployment.
fn past_deadline(created_at: &str, deadline: std::time::Duration) -> bool {
    let Ok(created) = chrono::DateTime::parse_from_rfc3339(created_at) else {
        return false;
    };
    let age = chrono::Utc::now().signed_duration_since(created);
    age.num_seconds() >= 0 && age.num_seconds() as u64 >= deadline.as_secs()
}

/// A deployment created by `preview::provision`'s auto-deploy hand-off
/// carries its preview's id on `preview_environments.deployment_id`;
/// once that deployment goes live, the preview it belongs to is done
/// waking and ready to serve traffic.
async fn promote_linked_preview(store: &Store, deployment_id: &str) {
    if let Ok(Some(preview)) = crate::store::preview::get_by_deployment_id(store.pool(), deployment_id).await {
        let _ = crate::store::preview::transition_active(store.pool(), &preview.id).await;
    }
}

async fn fail_linked_preview(store: &Store, deployment_id: &str) {
    if let Ok(Some(preview)) = crate::store::preview::get_by_deployment_id(store.pool(), deployment_id).await {
        let _ = crate::store::preview::transition_failed(store.pool(), &preview.id).await;
    }
}

async fn fail(store: &Store, dispatcher: &WebhookDispatcher, project_id: &str, deployment_id: &str, message: &str) {
    let _ = crate::store::deployment::transition(
        store.pool(),
        deployment_id,
        "deploying",
        "failed",
        Some(message),
    )
    .await;
    crate::api::metrics::record_deployment_outcome("failed");
    fail_linked_preview(store, deployment_id).await;
    dispatcher.emit(WebhookEvent {
        project_id: project_id.to_string(),
        event_type: "deployment.failed".to_string(),
        event_id: crate::store::models::new_id(),
        data: serde_json::json!({ "deployment_id": deployment_id, "error": message }),
    });
    error!(deployment_id = %deployment_id, error = %message, "deployment failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::FakeCluster;

    #[tokio::test]
    async fn a_pending_deployment_linked_to_a_preview_promotes_it_to_active() {
        let store = Store::in_memory().await.unwrap();
        let pool = store.pool();
        let cluster = FakeCluster::new();

        crate::store::project::create(pool, "p1", "p1").await.unwrap();
        let svc = crate::store::service::create(
            pool, "p1", "svc1", "https://github.com/acme/app", None, "{}", false, None, None,
        )
        .await
        .unwrap();
        let env = crate::store::environment::create(pool, "p1", "preview", "p1-preview")
            .await
            .unwrap();
        let release = crate::store::release::create_pending(pool, &svc.id, "abc123", "hash1")
            .await
            .unwrap();
        crate::store::release::transition_ready(pool, &release.id, "registry.local/app:abc123", None, None)
            .await
            .unwrap();
        let deployment =
            crate::store::deployment::create_pending(pool, &svc.id, &release.id, &env.id, 1)
                .await
                .unwrap();

        let preview = crate::store::preview::create_pending(
            pool, &svc.id, 1, None, None, "feature/w", "main", "abc123", "pr-1", 30,
        )
        .await
        .unwrap();
        crate::store::preview::set_deployment(pool, &preview.id, &deployment.id, "deploying")
            .await
            .unwrap();

        let dispatcher = WebhookDispatcher::spawn(store.clone(), crate::config::WebhookConfig::default());
        let deadline = std::time::Duration::from_secs(600);

        // claim_pending applies the spec and moves it to "deploying"
        run_deployment_loop(&store, &cluster, &dispatcher, deadline, None).await;
        // poll_deploying observes it healthy immediately (FakeCluster) and promotes to live
        run_deployment_loop(&store, &cluster, &dispatcher, deadline, None).await;

        let deployment = crate::store::deployment::get(pool, &deployment.id).await.unwrap();
        assert_eq!(deployment.status, "live");

        let preview = crate::store::preview::get(pool, &preview.id).await.unwrap();
        assert_eq!(preview.status, "active");
    }

    #[tokio::test]
    async fn a_deploying_deployment_past_its_deadline_fails() {
        let store = Store::in_memory().await.unwrap();
        let pool = store.pool();
        let cluster = FakeCluster::new();

        crate::store::project::create(pool, "p1", "p1").await.unwrap();
        let svc = crate::store::service::create(
            pool, "p1", "svc1", "https://github.com/acme/app", None, "{}", false, None, None,
        )
        .await
        .unwrap();
        let env = crate::store::environment::create(pool, "p1", "prod", "p1-prod").await.unwrap();
        let release = crate::store::release::create_pending(pool, &svc.id, "abc123", "hash1")
            .await
            .unwrap();
        crate::store::release::transition_ready(pool, &release.id, "registry.local/app:abc123", None, None)
            .await
            .unwrap();
        let deployment =
            crate::store::deployment::create_pending(pool, &svc.id, &release.id, &env.id, 1)
                .await
                .unwrap();
        crate::store::deployment::transition(pool, &deployment.id, "pending", "deploying", None)
            .await
            .unwrap();

        let dispatcher = WebhookDispatcher::spawn(store.clone(), crate::config::WebhookConfig::default());
        // A zero-second deadline means any age at all counts as "past due".
        poll_deploying(&store, &cluster, &dispatcher, std::time::Duration::from_secs(0)).await;

        let deployment = crate::store::deployment::get(pool, &deployment.id).await.unwrap();
        assert_eq!(deployment.status, "failed");
    }
}
