use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use switchyard::api::rate_limit::spawn_cleanup_task;
use switchyard::audit::AuditSink;
use switchyard::builder::fake::FakeBuilder;
use switchyard::builder::BuildPipelineConfig;
use switchyard::cluster::fake::{FakeAddonProvisioner, FakeCluster};
use switchyard::config::Config;
use switchyard::store::Store;
use switchyard::webhook_dispatcher::WebhookDispatcher;
use switchyard::AppState;

#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(author, version, about = "Multi-tenant application-delivery control plane", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "switchyard.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;

    let log_level = cli.log_level.as_ref().unwrap_or(&config.logging.level).clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Switchyard v{}", env!("CARGO_PKG_VERSION"));

    let metrics_handle = switchyard::api::metrics::init_metrics();
    tracing::info!("Prometheus metrics initialized at /metrics");

    let store = Store::init(&config.database.url, &config.server.data_dir).await?;
    tracing::info!("Store initialized at {}", config.database.url);

    let audit = AuditSink::spawn(store.clone());

    // No real orchestrator or managed-backing-service provider is
    // specified by this deployment; the fakes give the control plane
    // something to converge against out of the box. Swap these for
    // real implementations of `Cluster`/`AddonProvisioner`/`Builder`
    // to point Switchyard at an actual scheduler.
    let cluster: Arc<dyn switchyard::cluster::Cluster> = Arc::new(FakeCluster::new());
    let addon_provisioner: Arc<dyn switchyard::cluster::AddonProvisioner> =
        Arc::new(FakeAddonProvisioner::new());

    let webhook_dispatcher = WebhookDispatcher::spawn(store.clone(), config.webhooks.clone());

    let build_tx = switchyard::builder::spawn(
        store.clone(),
        cluster.clone(),
        Arc::new(FakeBuilder),
        webhook_dispatcher.clone(),
        BuildPipelineConfig {
            max_concurrent_builds: config.builder.max_concurrent_builds,
            build_timeout: Duration::from_secs(config.builder.build_timeout_secs),
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler_handles = switchyard::reconciler::spawn_all(
        store.clone(),
        cluster.clone(),
        addon_provisioner.clone(),
        Duration::from_secs(config.reconciler.tick_interval_secs),
        Duration::from_secs(config.reconciler.shutdown_grace_secs),
        shutdown_rx,
        config.auth.encryption_key.clone(),
        webhook_dispatcher.clone(),
        Duration::from_secs(config.reconciler.deployment_deadline_secs),
    );

    // The sleep-tick loop has no internal spawn wrapper like the
    // reconciler set, since it's a single loop over one entity class
    // rather than five independent tickers.
    {
        let store = store.clone();
        let sleep_tick_secs = config.preview.sleep_tick_secs;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(sleep_tick_secs));
            loop {
                interval.tick().await;
                switchyard::preview::run_sleep_tick(&store).await;
            }
        });
    }

    let state = Arc::new(
        AppState::new(
            config.clone(),
            store.clone(),
            audit.clone(),
            cluster,
            addon_provisioner,
            build_tx,
            reconciler_handles,
            webhook_dispatcher,
        )
        .with_metrics(metrics_handle),
    );

    spawn_cleanup_task(state.rate_limiter.clone(), config.rate_limit.window_seconds);
    tracing::info!(
        "Rate limiting enabled: {} req/min (API), {} req/min (webhooks), {} req/min (auth)",
        config.rate_limit.api_requests_per_window,
        config.rate_limit.webhook_requests_per_window,
        config.rate_limit.auth_requests_per_window
    );

    let app = switchyard::api::create_router(state.clone());

    let api_addr = format!("{}:{}", config.server.host, config.server.api_port);
    let listener = tokio::net::TcpListener::bind(&api_addr).await?;

    tracing::info!("API server listening on http://{}", api_addr);
    tracing::info!("Admin token: {}", config.auth.admin_token);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx, audit))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(reconciler_shutdown: watch::Sender<bool>, audit: AuditSink) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining reconciler loops and audit queue");
    let _ = reconciler_shutdown.send(true);
    audit.flush_and_wait().await;
}
