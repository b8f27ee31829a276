//! Prometheus metrics endpoint and HTTP request tracking middleware.
//!
//! Provides the `/metrics` scrape endpoint, an HTTP request counter +
//! duration histogram middleware, and helpers the build/release/
//! deployment/webhook/audit subsystems call to record domain metrics.

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::AppState;

pub const HTTP_REQUESTS_TOTAL: &str = "switchyard_http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "switchyard_http_request_duration_seconds";

pub const RELEASES_TOTAL: &str = "switchyard_releases_total";
pub const DEPLOYMENTS_TOTAL: &str = "switchyard_deployments_total";
pub const PROJECTS_GAUGE: &str = "switchyard_projects";
pub const SERVICES_GAUGE: &str = "switchyard_services";
pub const LIVE_DEPLOYMENTS_GAUGE: &str = "switchyard_live_deployments";
pub const ACTIVE_PREVIEWS_GAUGE: &str = "switchyard_active_previews";

pub const WEBHOOK_DELIVERIES_TOTAL: &str = "switchyard_webhook_deliveries_total";
pub const AUDIT_BATCHES_DROPPED_TOTAL: &str = "switchyard_audit_batches_dropped_total";

/// Initializes the Prometheus recorder and registers metric
/// descriptions. Call once during startup.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder.install_recorder().expect("failed to install Prometheus recorder");

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request duration in seconds");

    describe_counter!(RELEASES_TOTAL, "Total number of releases by terminal status");
    describe_counter!(DEPLOYMENTS_TOTAL, "Total number of deployments by terminal status");
    describe_gauge!(PROJECTS_GAUGE, "Total number of registered projects");
    describe_gauge!(SERVICES_GAUGE, "Total number of registered services");
    describe_gauge!(LIVE_DEPLOYMENTS_GAUGE, "Number of deployments currently live");
    describe_gauge!(ACTIVE_PREVIEWS_GAUGE, "Number of preview environments currently active");

    describe_counter!(WEBHOOK_DELIVERIES_TOTAL, "Total outbound webhook deliveries by outcome");
    describe_counter!(AUDIT_BATCHES_DROPPED_TOTAL, "Audit batches dropped after exhausting retries");

    handle
}

/// `GET /metrics` — renders the Prometheus text exposition format.
/// Unauthenticated, matching the teacher's scrape-endpoint convention.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_gauge_metrics(&state).await;

    match state.metrics_handle.as_ref() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "metrics not initialized".to_string()),
    }
}

async fn update_gauge_metrics(state: &AppState) {
    if let Ok(projects) = crate::store::project::list(state.store.pool()).await {
        gauge!(PROJECTS_GAUGE).set(projects.len() as f64);
    }

    if let Ok(live) = crate::store::deployment::list_by_status(
        state.store.pool(),
        crate::store::models::DeploymentStatus::Live.as_str(),
    )
    .await
    {
        gauge!(LIVE_DEPLOYMENTS_GAUGE).set(live.len() as f64);
    }

    if let Ok(active) = crate::store::preview::list_active(state.store.pool()).await {
        gauge!(ACTIVE_PREVIEWS_GAUGE).set(active.len() as f64);
    }
}

/// Tracks `switchyard_http_requests_total` and the matching duration
/// histogram, labeled by method, matched route template, and status.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

pub fn record_release_outcome(status: &str) {
    counter!(RELEASES_TOTAL, "status" => status.to_string()).increment(1);
}

pub fn record_deployment_outcome(status: &str) {
    counter!(DEPLOYMENTS_TOTAL, "status" => status.to_string()).increment(1);
}

pub fn record_webhook_delivery(outcome: &str) {
    counter!(WEBHOOK_DELIVERIES_TOTAL, "outcome" => outcome.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(HTTP_REQUESTS_TOTAL.contains("_total"));
        assert!(DEPLOYMENTS_TOTAL.contains("_total"));
        assert!(HTTP_REQUEST_DURATION_SECONDS.contains("_seconds"));
    }
}
