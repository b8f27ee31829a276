//! The Preview Manager (C7): provisions a preview environment's
//! deployment, tracks access with a coalesced write, and runs the
//! sleep/wake lifecycle (§4.7). Grounded on the teacher's
//! `preview_deployment` handling (ephemeral per-PR deployments) and the
//! `DeploymentEngine` tick shape, adapted to the sleep/wake state
//! machine Switchyard's spec requires that the teacher never had
//! (rivetr's preview deployments were torn down on PR close only, with
//! no idle-sleep tier).

use crate::builder::BuildIntent;
use crate::store::models::now_rfc3339;
use crate::store::Store;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Coalesces access-tracking writes to at most once per second per
/// preview, so a burst of requests against a warm preview doesn't
/// hammer the store with identical `touch_access` calls.
#[derive(Clone, Default)]
pub struct AccessTracker {
    last_touch: Arc<DashMap<String, Instant>>,
}

impl AccessTracker {
    const COALESCE_WINDOW: Duration = Duration::from_secs(1);

    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if this call should actually perform the write.
    pub fn should_touch(&self, preview_id: &str) -> bool {
        let now = Instant::now();
        match self.last_touch.get(preview_id) {
            Some(last) if now.duration_since(*last) < Self::COALESCE_WINDOW => false,
            _ => {
                self.last_touch.insert(preview_id.to_string(), now);
                true
            }
        }
    }
}

pub async fn record_access(store: &Store, tracker: &AccessTracker, preview_id: &str) {
    if !tracker.should_touch(preview_id) {
        return;
    }
    if let Err(err) = crate::store::preview::touch_access(store.pool(), preview_id).await {
        warn!(error = %err, preview_id, "failed to record preview access");
    }
}

/// Provisions a preview environment: creates the pending row, then
/// enqueues a build intent targeting a preview-dedicated environment.
/// The reconciler picks up the resulting deployment once the build
/// completes and auto-deploys, same as any other service.
#[allow(clippy::too_many_arguments)]
pub async fn provision(
    store: &Store,
    build_tx: &mpsc::Sender<BuildIntent>,
    service_id: &str,
    preview_environment_id: &str,
    pr_number: i64,
    pr_title: Option<&str>,
    pr_author: Option<&str>,
    branch: &str,
    base_branch: &str,
    commit_sha: &str,
    subdomain: &str,
    build_config_hash: &str,
    auto_sleep_after_minutes: i64,
    base_domain: Option<&str>,
) -> crate::error::Result<crate::store::models::PreviewEnvironment> {
    let mut preview = crate::store::preview::create_pending(
        store.pool(),
        service_id,
        pr_number,
        pr_title,
        pr_author,
        branch,
        base_branch,
        commit_sha,
        subdomain,
        auto_sleep_after_minutes,
    )
    .await?;

    if let Some(base_domain) = base_domain {
        let preview_url = format!("https://{subdomain}.{base_domain}");
        if crate::store::preview::set_preview_url(store.pool(), &preview.id, &preview_url)
            .await
            .is_ok()
        {
            preview.preview_url = Some(preview_url);
        }
    }

    let intent = BuildIntent {
        service_id: service_id.to_string(),
        commit_sha: commit_sha.to_string(),
        build_config_hash: build_config_hash.to_string(),
        build_config: String::new(),
        replicas: 1,
        auto_deploy: true,
        auto_deploy_environment_id: Some(preview_environment_id.to_string()),
        preview_id: Some(preview.id.clone()),
    };

    if build_tx.send(intent).await.is_err() {
        warn!(preview_id = %preview.id, "build pipeline channel closed, preview will not deploy");
    }

    Ok(preview)
}

/// Wakes a sleeping preview by re-applying its last deployment; called
/// from the access-path when a sleeping preview receives a request.
/// Requeues the preview's deployment as `pending` so the deployment
/// reconciler re-applies it to the cluster on its next tick; that same
/// loop promotes the preview back to `active` once it reports live.
pub async fn wake(store: &Store, preview_id: &str) -> crate::error::Result<()> {
    crate::store::preview::transition_waking(store.pool(), preview_id).await?;

    let preview = crate::store::preview::get(store.pool(), preview_id).await?;
    if let Some(deployment_id) = &preview.deployment_id {
        crate::store::deployment::transition(store.pool(), deployment_id, "live", "pending", None).await?;
    }

    info!(preview_id, "preview waking");
    Ok(())
}

pub async fn close(store: &Store, preview_id: &str) -> crate::error::Result<()> {
    crate::store::preview::close(store.pool(), preview_id).await?;
    info!(preview_id, "preview closed");
    Ok(())
}

/// The sleep-scan tick (§4.7 default 60s): every `active` preview whose
/// `last_accessed_at` has exceeded its own `auto_sleep_after_minutes`
/// transitions to `sleeping`.
pub async fn run_sleep_tick(store: &Store) {
    let active = match crate::store::preview::list_active(store.pool()).await {
        Ok(rows) => rows,
        Err(err) => {
            error!(error = %err, "failed to list active previews");
            return;
        }
    };

    let now = now_rfc3339();
    for preview in active {
        let idle_for = idle_minutes(&preview.last_accessed_at, &now);
        if idle_for >= preview.auto_sleep_after_minutes {
            if crate::store::preview::transition_sleeping(store.pool(), &preview.id).await.is_ok() {
                info!(preview_id = %preview.id, idle_minutes = idle_for, "preview put to sleep");
            }
        }
    }
}

/// Minutes between two RFC3339 timestamps, computed via string parse
/// rather than the store (which only deals in opaque strings).
fn idle_minutes(last_accessed_at: &str, now: &str) -> i64 {
    let (Ok(last), Ok(now)) = (
        chrono::DateTime::parse_from_rfc3339(last_accessed_at),
        chrono::DateTime::parse_from_rfc3339(now),
    ) else {
        return 0;
    };
    (now - last).num_minutes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_tracker_coalesces_within_window() {
        let tracker = AccessTracker::new();
        assert!(tracker.should_touch("p1"));
        assert!(!tracker.should_touch("p1"));
    }

    #[test]
    fn idle_minutes_computes_elapsed_time() {
        let last = "2026-08-01T10:00:00+00:00";
        let now = "2026-08-01T10:45:00+00:00";
        assert_eq!(idle_minutes(last, now), 45);
    }

    #[tokio::test]
    async fn wake_requeues_the_linked_deployment() {
        let store = Store::in_memory().await.unwrap();
        let pool = store.pool();
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
        let deployment =
            crate::store::deployment::create_pending(pool, &svc.id, &release.id, &env.id, 1)
                .await
                .unwrap();
        crate::store::deployment::transition(pool, &deployment.id, "pending", "deploying", None)
            .await
            .unwrap();
        crate::store::deployment::transition(pool, &deployment.id, "deploying", "live", None)
            .await
            .unwrap();

        let preview = crate::store::preview::create_pending(
            pool, &svc.id, 1, None, None, "feature/z", "main", "abc123", "pr-1", 30,
        )
        .await
        .unwrap();
        crate::store::preview::set_deployment(pool, &preview.id, &deployment.id, "active")
            .await
            .unwrap();
        crate::store::preview::transition_active(pool, &preview.id).await.unwrap();
        crate::store::preview::transition_sleeping(pool, &preview.id).await.unwrap();

        wake(&store, &preview.id).await.unwrap();

        let preview = crate::store::preview::get(pool, &preview.id).await.unwrap();
        assert_eq!(preview.status, "deploying");

        let deployment = crate::store::deployment::get(pool, &deployment.id).await.unwrap();
        assert_eq!(deployment.status, "pending");
    }
}
