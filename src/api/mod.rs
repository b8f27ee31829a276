mod access;
mod addons;
pub mod audit;
pub mod auth;
mod deployments;
pub mod error;
mod functions;
pub mod metrics;
mod previews;
mod projects;
pub mod rate_limit;
mod releases;
mod routes;
mod services;
pub mod validation;
mod webhooks;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::AppState;
use rate_limit::{rate_limit_api, rate_limit_auth, rate_limit_webhook};

pub fn create_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/whoami", get(auth::whoami))
        .route("/tokens", get(auth::list_tokens))
        .route("/tokens", post(auth::create_token))
        .route("/tokens/:id", axum::routing::delete(auth::revoke_token))
        .route("/users", post(auth::create_user))
        .route("/users/:id/active", post(auth::set_user_active))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_auth));

    let api_routes = Router::new()
        // Projects + environments
        .route("/projects", get(projects::list_projects))
        .route("/projects", post(projects::create_project))
        .route("/projects/:id", get(projects::get_project))
        .route("/projects/:id", axum::routing::delete(projects::delete_project))
        .route("/projects/:id/environments", get(projects::list_environments))
        .route("/projects/:id/environments", post(projects::create_environment))
        .route("/environments/:id", get(projects::get_environment))
        .route("/projects/:id/audit", get(audit::list_for_project))
        .route("/audit", get(audit::list_recent))
        // Access grants
        .route("/projects/:id/access", get(access::list_access))
        .route("/projects/:id/access", post(access::grant_access))
        .route("/projects/:id/access/:grant_id", axum::routing::delete(access::revoke_access))
        // Services + dependencies
        .route("/projects/:id/services", get(services::list_services))
        .route("/projects/:id/services", post(services::create_service))
        .route("/services/:id", get(services::get_service))
        .route("/services/:id", axum::routing::delete(services::delete_service))
        .route("/projects/:id/dependencies", get(services::list_dependencies))
        .route("/projects/:id/dependencies", post(services::add_dependency))
        .route("/projects/:id/dependencies/:dep_id", axum::routing::delete(services::remove_dependency))
        // Releases
        .route("/services/:id/releases", get(releases::list_releases))
        .route("/services/:id/releases", post(releases::trigger_build))
        .route("/releases/:id", get(releases::get_release))
        .route("/releases/:id/signature", post(releases::attach_signature))
        // Deployments
        .route("/releases/:id/deployments", post(deployments::create_deployment))
        .route("/releases/:id/deployments", get(deployments::list_deployments_for_release))
        .route("/deployments/:id", get(deployments::get_deployment))
        .route("/services/:id/deployments/live", get(deployments::list_live_for_service))
        // Preview environments
        .route("/services/:id/previews", get(previews::list_previews_for_service))
        .route("/services/:id/previews", post(previews::create_preview))
        .route("/previews/:id", get(previews::get_preview))
        .route("/previews/:id/close", post(previews::close_preview))
        // Database addons
        .route("/projects/:id/addons", get(addons::list_addons))
        .route("/projects/:id/addons", post(addons::create_addon))
        .route("/addons/:id", get(addons::get_addon))
        .route("/addons/:id", axum::routing::delete(addons::delete_addon))
        .route("/addons/:id/bindings", post(addons::create_binding))
        .route("/services/:id/addon-bindings", get(addons::list_bindings_for_service))
        // Functions
        .route("/projects/:id/functions", get(functions::list_functions))
        .route("/projects/:id/functions", post(functions::create_function))
        .route("/functions/:id", get(functions::get_function))
        .route("/functions/:id", axum::routing::delete(functions::delete_function))
        .route("/functions/:id/invocations", post(functions::record_invocation))
        // Custom domains
        .route("/services/:id/domains", get(routes::list_custom_domains))
        .route("/services/:id/domains", post(routes::create_custom_domain))
        .route("/domains/:id", get(routes::get_custom_domain))
        .route("/domains/:id", axum::routing::delete(routes::delete_custom_domain))
        // Webhook destinations
        .route("/projects/:id/webhook-destinations", post(webhooks::create_destination))
        .route("/webhook-destinations/:id", get(webhooks::get_destination))
        .route("/webhook-destinations/:id/reset", post(webhooks::reset_destination))
        .route("/webhook-destinations/:id/deliveries", get(webhooks::list_recent_deliveries))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_api));

    let webhook_routes = Router::new()
        .route("/github", post(webhooks::github_webhook))
        .route("/ci/runs", post(webhooks::upsert_ci_run))
        .route("/ci/runs/complete", post(webhooks::complete_ci_run))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_webhook));

    let static_dir = std::path::Path::new("static/dist/client");
    let fallback_file = static_dir.join("__spa-fallback.html");
    let serve_static = ServeDir::new(static_dir).not_found_service(ServeFile::new(&fallback_file));

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/metrics",
            get(metrics::metrics_endpoint)
                .layer(middleware::from_fn_with_state(state.clone(), crate::auth::middleware::require_authenticated)),
        )
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .nest("/webhooks", webhook_routes)
        .fallback_service(serve_static)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
