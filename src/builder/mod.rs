//! The Build Pipeline (C5): a bounded FIFO queue of build intents
//! drained by a worker pool, fingerprint-keyed dedup against
//! in-flight/terminal releases, and an auto-deploy hand-off. Grounded
//! on the teacher's build-pipeline module (`engine::pack_builder` /
//! `engine::nixpacks`, invoked from the `DeploymentEngine`
//! `tokio::spawn`-per-job loop) but built against the external
//! [`Builder`] trait instead of an in-process Docker build, since the
//! build toolchain is explicitly out-of-core-scope.

mod queue;

pub use queue::{BuildIntent, BuildOutcome};

use crate::error::Result;
use crate::store::models::{now_rfc3339, Release};
use crate::store::Store;
use crate::webhook_dispatcher::{WebhookDispatcher, WebhookEvent};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Semaphore};
use tracing::{error, info, warn};

/// Dedup key for the build pipeline's "at most one concurrent build"
/// invariant (§4.5): `(service_id, commit_sha, build_config_hash)`.
type Fingerprint = (String, String, String);

/// Per-fingerprint locks held for the lifetime of a build. Two intents
/// with the same fingerprint contend on the same `Arc<AsyncMutex<()>>`,
/// so the loser blocks until the winner has written a terminal
/// (ready/failed) release instead of racing it to `create_pending`.
/// Backed up by the storage-layer partial unique index
/// (`idx_releases_fingerprint_inflight`) for the cross-process case this
/// in-memory map can't see — e.g. two server instances sharing one
/// database.
type FingerprintLocks = DashMap<Fingerprint, Arc<AsyncMutex<()>>>;

/// The build-toolchain seam: given a commit and build config, produce
/// a pushed image URI (and optional SBOM). A real implementation shells
/// out to a builder like buildpacks/nixpacks against an image registry;
/// tests use `builder::fake::FakeBuilder`.
#[async_trait]
pub trait Builder: Send + Sync {
    async fn build(&self, intent: &BuildIntent) -> Result<BuildOutcome>;
}

pub struct BuildPipelineConfig {
    pub max_concurrent_builds: usize,
    pub build_timeout: Duration,
}

/// Spawns the worker pool and returns a sender for enqueuing intents.
/// The pool size is bounded by a `Semaphore` rather than a fixed number
/// of long-lived worker tasks, so a burst of intents queues behind the
/// semaphore instead of behind a single consumer loop — multiple
/// builds can be in flight at once, up to the configured concurrency.
pub fn spawn(
    store: Store,
    cluster: Arc<dyn crate::cluster::Cluster>,
    builder: Arc<dyn Builder>,
    dispatcher: WebhookDispatcher,
    config: BuildPipelineConfig,
) -> mpsc::Sender<BuildIntent> {
    let (tx, mut rx) = mpsc::channel::<BuildIntent>(256);
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_builds));
    let timeout = config.build_timeout;
    let fingerprint_locks: Arc<FingerprintLocks> = Arc::new(DashMap::new());

    tokio::spawn(async move {
        while let Some(intent) = rx.recv().await {
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
            let store = store.clone();
            let cluster = cluster.clone();
            let builder = builder.clone();
            let dispatcher = dispatcher.clone();
            let fingerprint_locks = fingerprint_locks.clone();

            tokio::spawn(async move {
                let _permit = permit;
                process_intent(&store, cluster, builder.as_ref(), &dispatcher, intent, timeout, &fingerprint_locks)
                    .await;
            });
        }
    });

    tx
}

/// Polls `release_id` until it leaves `pending`/`building`, for the
/// case where this process sees an in-flight release it didn't start
/// itself (another instance sharing the same database, or a release
/// left mid-build by a crashed process). §4.5 requires joining such a
/// build to wait for its terminal state rather than reusing a release
/// whose `image_uri` is still null.
async fn wait_for_terminal_release(store: &Store, release_id: &str, timeout: Duration) -> Result<Release> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let release = crate::store::release::get(store.pool(), release_id).await?;
        if release.status != "pending" && release.status != "building" {
            return Ok(release);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(release);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

async fn process_intent(
    store: &Store,
    cluster: Arc<dyn crate::cluster::Cluster>,
    builder: &dyn Builder,
    dispatcher: &WebhookDispatcher,
    intent: BuildIntent,
    timeout: Duration,
    fingerprint_locks: &FingerprintLocks,
) {
    let key: Fingerprint =
        (intent.service_id.clone(), intent.commit_sha.clone(), intent.build_config_hash.clone());
    let lock = fingerprint_locks.entry(key).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone();
    // Held for the rest of this function: a second intent with the same
    // fingerprint blocks here until this one has written a terminal
    // release, so it can never observe its own "pending"/"building" row
    // and race `create_pending` against it (§4.5 Scenario B).
    let _fingerprint_guard = lock.lock().await;

    // Re-check after acquiring the lock: another intent may have already
    // built this exact fingerprint while this one waited.
    let existing = crate::store::release::find_by_fingerprint(
        store.pool(),
        &intent.service_id,
        &intent.commit_sha,
        &intent.build_config_hash,
    )
    .await;

    let release = match existing {
        Ok(Some(release)) if release.status == "ready" => {
            info!(release_id = %release.id, "build fingerprint already ready, skipping");
            release
        }
        Ok(Some(release)) if release.status == "building" || release.status == "pending" => {
            info!(release_id = %release.id, "joining in-flight build with same fingerprint, awaiting its terminal state");
            match wait_for_terminal_release(store, &release.id, timeout).await {
                Ok(release) => release,
                Err(err) => {
                    error!(error = %err, release_id = %release.id, "failed to observe in-flight release's terminal state");
                    return;
                }
            }
        }
        _ => match crate::store::release::create_pending(
            store.pool(),
            &intent.service_id,
            &intent.commit_sha,
            &intent.build_config_hash,
        )
        .await
        {
            Ok(release) => release,
            Err(err) => {
                // The storage layer's partial unique index rejected this
                // insert: a concurrent writer outside this process (a
                // second server instance) won the race. Join it instead
                // of failing the intent outright.
                warn!(error = %err, "create_pending rejected by fingerprint uniqueness, joining the winner");
                match crate::store::release::find_by_fingerprint(
                    store.pool(),
                    &intent.service_id,
                    &intent.commit_sha,
                    &intent.build_config_hash,
                )
                .await
                {
                    Ok(Some(release)) => match wait_for_terminal_release(store, &release.id, timeout).await {
                        Ok(release) => release,
                        Err(err) => {
                            error!(error = %err, "failed to observe competing release's terminal state");
                            return;
                        }
                    },
                    _ => {
                        error!("failed to create pending release and no competing release found");
                        return;
                    }
                }
            }
        },
    };

    if release.status == "pending" {
        if let Err(err) = crate::store::release::transition_building(store.pool(), &release.id).await {
            warn!(error = %err, release_id = %release.id, "another worker already claimed this release");
            return;
        }

        let project_id = crate::store::service::get(store.pool(), &intent.service_id)
            .await
            .map(|svc| svc.project_id)
            .unwrap_or_else(|_| intent.service_id.clone());

        let result = tokio::time::timeout(timeout, builder.build(&intent)).await;

        match result {
            Ok(Ok(outcome)) => {
                if let Err(err) = crate::store::release::transition_ready(
                    store.pool(),
                    &release.id,
                    &outcome.image_uri,
                    outcome.sbom_format.as_deref(),
                    outcome.sbom_blob.as_deref(),
                )
                .await
                {
                    error!(error = %err, release_id = %release.id, "failed to record ready release");
                    return;
                }
                crate::api::metrics::record_release_outcome("ready");
                dispatcher.emit(WebhookEvent {
                    project_id,
                    event_type: "release.ready".to_string(),
                    event_id: crate::store::models::new_id(),
                    data: serde_json::json!({ "release_id": release.id, "image_uri": outcome.image_uri }),
                });
                info!(release_id = %release.id, image = %outcome.image_uri, "build succeeded");
            }
            Ok(Err(err)) => {
                let _ = crate::store::release::transition_failed(store.pool(), &release.id, &err.to_string()).await;
                crate::api::metrics::record_release_outcome("failed");
                dispatcher.emit(WebhookEvent {
                    project_id,
                    event_type: "release.failed".to_string(),
                    event_id: crate::store::models::new_id(),
                    data: serde_json::json!({ "release_id": release.id, "error": err.to_string() }),
                });
                error!(error = %err, release_id = %release.id, "build failed");
                return;
            }
            Err(_) => {
                let message = format!("build exceeded {}s timeout", timeout.as_secs());
                let _ = crate::store::release::transition_failed(store.pool(), &release.id, &message).await;
                crate::api::metrics::record_release_outcome("timeout");
                dispatcher.emit(WebhookEvent {
                    project_id,
                    event_type: "release.failed".to_string(),
                    event_id: crate::store::models::new_id(),
                    data: serde_json::json!({ "release_id": release.id, "error": message }),
                });
                error!(release_id = %release.id, "build timed out");
                return;
            }
        }
    }

    if intent.auto_deploy {
        auto_deploy(store, cluster, &intent, &release.id).await;
    }
}

/// Creates a pending Deployment for a freshly built (or reused) ready
/// release when the service has auto-deploy enabled (§3/§5). The
/// Deployment reconciler picks it up on its next tick; this function
/// never talks to the cluster directly.
async fn auto_deploy(
    store: &Store,
    _cluster: Arc<dyn crate::cluster::Cluster>,
    intent: &BuildIntent,
    release_id: &str,
) {
    let Some(environment_id) = &intent.auto_deploy_environment_id else {
        return;
    };

    match crate::store::deployment::create_pending(
        store.pool(),
        &intent.service_id,
        release_id,
        environment_id,
        intent.replicas,
    )
    .await
    {
        Ok(deployment) => {
            info!(deployment_id = %deployment.id, "auto-deploy created pending deployment");
            if let Some(preview_id) = &intent.preview_id {
                if let Err(err) =
                    crate::store::preview::set_deployment(store.pool(), preview_id, &deployment.id, "deploying").await
                {
                    error!(error = %err, preview_id, "failed to link preview to its deployment");
                }
            }
        }
        Err(err) => error!(error = %err, "auto-deploy failed to create deployment"),
    }
}

pub mod fake {
    use super::*;

    /// Always succeeds with a deterministic fake image URI — used by
    /// tests and local dev runs with no real builder wired in.
    pub struct FakeBuilder;

    #[async_trait]
    impl Builder for FakeBuilder {
        async fn build(&self, intent: &BuildIntent) -> Result<BuildOutcome> {
            Ok(BuildOutcome {
                image_uri: format!("registry.local/{}:{}", intent.service_id, &intent.commit_sha[..7.min(intent.commit_sha.len())]),
                sbom_format: None,
                sbom_blob: None,
                built_at: now_rfc3339(),
            })
        }
    }

    /// Always fails — used to exercise the `release.failed` webhook path.
    pub struct FailingBuilder;

    #[async_trait]
    impl Builder for FailingBuilder {
        async fn build(&self, _intent: &BuildIntent) -> Result<BuildOutcome> {
            Err(crate::error::SwitchyardError::invalid("build toolchain exploded"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{FailingBuilder, FakeBuilder};
    use super::*;
    use crate::webhook_dispatcher::WebhookDispatcher;

    fn intent(service_id: &str) -> BuildIntent {
        BuildIntent {
            service_id: service_id.to_string(),
            commit_sha: "abc1234".to_string(),
            build_config_hash: "hash1".to_string(),
            build_config: "{}".to_string(),
            replicas: 1,
            auto_deploy: false,
            auto_deploy_environment_id: None,
            preview_id: None,
        }
    }

    /// No destinations are registered in either test, so `emit` enqueues
    /// onto the dispatcher's channel and the delivery task finds nothing
    /// to send to — this only exercises that `process_intent` reaches
    /// and survives the emit call on both the success and failure paths.
    #[tokio::test]
    async fn a_successful_build_transitions_the_release_to_ready() {
        let store = Store::in_memory().await.unwrap();
        let pool = store.pool();
        crate::store::project::create(pool, "p1", "p1").await.unwrap();
        let svc = crate::store::service::create(
            pool, "p1", "svc1", "https://github.com/acme/app", None, "{}", false, None, None,
        )
        .await
        .unwrap();

        let dispatcher = WebhookDispatcher::spawn(store.clone(), crate::config::WebhookConfig::default());
        let cluster: Arc<dyn crate::cluster::Cluster> = Arc::new(crate::cluster::fake::FakeCluster::new());
        let locks = FingerprintLocks::new();

        process_intent(&store, cluster, &FakeBuilder, &dispatcher, intent(&svc.id), Duration::from_secs(30), &locks)
            .await;

        let release = crate::store::release::find_by_fingerprint(pool, &svc.id, "abc1234", "hash1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(release.status, "ready");
        assert!(release.image_uri.is_some());
    }

    #[tokio::test]
    async fn a_failing_build_transitions_the_release_to_failed() {
        let store = Store::in_memory().await.unwrap();
        let pool = store.pool();
        crate::store::project::create(pool, "p1", "p1").await.unwrap();
        let svc = crate::store::service::create(
            pool, "p1", "svc1", "https://github.com/acme/app", None, "{}", false, None, None,
        )
        .await
        .unwrap();

        let dispatcher = WebhookDispatcher::spawn(store.clone(), crate::config::WebhookConfig::default());
        let cluster: Arc<dyn crate::cluster::Cluster> = Arc::new(crate::cluster::fake::FakeCluster::new());
        let locks = FingerprintLocks::new();

        process_intent(
            &store,
            cluster,
            &FailingBuilder,
            &dispatcher,
            intent(&svc.id),
            Duration::from_secs(30),
            &locks,
        )
        .await;

        let release = crate::store::release::find_by_fingerprint(pool, &svc.id, "abc1234", "hash1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(release.status, "failed");
    }

    /// A builder that sleeps before returning, long enough for a second
    /// `process_intent` call with the same fingerprint to start while the
    /// first is still mid-build.
    struct SlowBuilder;

    #[async_trait]
    impl Builder for SlowBuilder {
        async fn build(&self, intent: &BuildIntent) -> Result<BuildOutcome> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(BuildOutcome {
                image_uri: format!("registry.local/{}:slow", intent.service_id),
                sbom_format: None,
                sbom_blob: None,
                built_at: now_rfc3339(),
            })
        }
    }

    #[tokio::test]
    async fn two_concurrent_intents_with_the_same_fingerprint_produce_exactly_one_release() {
        let store = Store::in_memory().await.unwrap();
        let pool = store.pool();
        crate::store::project::create(pool, "p1", "p1").await.unwrap();
        let svc = crate::store::service::create(
            pool, "p1", "svc1", "https://github.com/acme/app", None, "{}", false, None, None,
        )
        .await
        .unwrap();

        let dispatcher = WebhookDispatcher::spawn(store.clone(), crate::config::WebhookConfig::default());
        let locks = Arc::new(FingerprintLocks::new());

        let run = |svc_id: String| {
            let store = store.clone();
            let dispatcher = dispatcher.clone();
            let locks = locks.clone();
            async move {
                let cluster: Arc<dyn crate::cluster::Cluster> = Arc::new(crate::cluster::fake::FakeCluster::new());
                process_intent(&store, cluster, &SlowBuilder, &dispatcher, intent(&svc_id), Duration::from_secs(5), &locks)
                    .await;
            }
        };

        tokio::join!(run(svc.id.clone()), run(svc.id.clone()));

        let releases = crate::store::release::list_for_service(pool, &svc.id).await.unwrap();
        assert_eq!(releases.len(), 1, "same fingerprint must produce exactly one release");
        assert_eq!(releases[0].status, "ready");
        assert!(releases[0].image_uri.is_some());
    }
}
