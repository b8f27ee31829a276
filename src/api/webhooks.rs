//! Webhook subsystem API surface (§4.6.7/C8): outbound destination
//! management plus the inbound GitHub intake that turns a push/PR
//! event into a build, a deployment, or a preview lifecycle transition.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;

use crate::api::audit;
use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::auth::Principal;
use crate::builder::BuildIntent;
use crate::store::models::{Role, WebhookDestination};
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
pub struct CreateDestinationRequest {
    pub name: String,
    pub transport: String,
    pub endpoint_url: String,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub signing_secret: Option<String>,
    #[serde(default = "default_subscribed_events")]
    pub subscribed_events: Vec<String>,
}

fn default_subscribed_events() -> Vec<String> {
    vec!["*".to_string()]
}

pub async fn create_destination(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(body): Json<CreateDestinationRequest>,
) -> Result<Json<WebhookDestination>, ApiError> {
    crate::api::auth::require_role(&state, &principal, &project_id, None, Role::Admin).await?;

    let mut errors = ValidationErrorBuilder::new();
    if body.name.trim().is_empty() {
        errors.add("name", "is required");
    }
    if body.endpoint_url.trim().is_empty() {
        errors.add("endpoint_url", "is required");
    }
    errors.finish()?;

    let subscribed_events_json =
        serde_json::to_string(&body.subscribed_events).unwrap_or_else(|_| "[\"*\"]".to_string());

    let destination = crate::store::webhook::create_destination(
        state.store.pool(),
        &project_id,
        &body.name,
        &body.transport,
        &body.endpoint_url,
        body.bot_token.as_deref(),
        body.chat_id.as_deref(),
        body.signing_secret.as_deref(),
        &subscribed_events_json,
    )
    .await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "webhook_destination.create",
        "webhook_destination",
        Some(&destination.id),
        Some(&destination.name),
        Some(&project_id),
        "success",
        serde_json::json!({ "transport": destination.transport }),
    );

    Ok(Json(destination))
}

pub async fn get_destination(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<WebhookDestination>, ApiError> {
    let destination = crate::store::webhook::get_destination(state.store.pool(), &id).await?;
    Ok(Json(destination))
}

/// `POST /api/webhook-destinations/:id/reset` — clears the
/// consecutive-failure streak and re-enables a destination that
/// auto-disabled (§C8).
pub async fn reset_destination(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let destination = crate::store::webhook::get_destination(state.store.pool(), &id).await?;
    crate::api::auth::require_role(&state, &principal, &destination.project_id, None, Role::Admin).await?;

    crate::webhook_dispatcher::reset_destination(&state.store, &id).await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "webhook_destination.reset",
        "webhook_destination",
        Some(&id),
        Some(&destination.name),
        Some(&destination.project_id),
        "success",
        serde_json::json!({}),
    );

    Ok(Json(serde_json::json!({ "reset": true })))
}

pub async fn list_recent_deliveries(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Vec<crate::store::models::WebhookDelivery>>, ApiError> {
    let deliveries = crate::store::webhook::list_recent_for_destination(state.store.pool(), &id, 50).await?;
    Ok(Json(deliveries))
}

/// Verifies a GitHub-style `X-Hub-Signature-256: sha256=<hex>` header
/// against the configured shared secret, constant-time.
fn verify_github_signature(secret: &str, signature_header: &str, body: &[u8]) -> bool {
    let Some(expected_hex) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    let computed_hex = hex::encode(mac.finalize().into_bytes());
    crate::auth::constant_time_eq(&computed_hex, expected_hex)
}

#[derive(Debug, Deserialize)]
struct GithubPushEvent {
    #[serde(rename = "ref")]
    git_ref: String,
    after: String,
    repository: GithubRepository,
}

#[derive(Debug, Deserialize)]
struct GithubRepository {
    clone_url: String,
}

#[derive(Debug, Deserialize)]
struct GithubPullRequestEvent {
    action: String,
    number: i64,
    pull_request: GithubPullRequest,
    repository: GithubRepository,
}

#[derive(Debug, Deserialize)]
struct GithubPullRequest {
    title: String,
    head: GithubRef,
    base: GithubRef,
    user: GithubUser,
}

#[derive(Debug, Deserialize)]
struct GithubRef {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    login: String,
}

/// `POST /api/webhooks/github` — inbound intake. Dispatches on the
/// `X-GitHub-Event` header: `push` triggers a build (auto-deploying if
/// the service is configured for the pushed branch), `pull_request`
/// opens/updates/closes the matching preview environment.
pub async fn github_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(secret) = state.config.webhooks.github_secret.as_deref() {
        let signature = headers
            .get("x-hub-signature-256")
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| ApiError::Unauthenticated)?;
        if !verify_github_signature(secret, signature, &body) {
            return Err(ApiError::Unauthenticated);
        }
    }

    let event_type = headers
        .get("x-github-event")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("missing X-GitHub-Event header"))?
        .to_string();

    match event_type.as_str() {
        "push" => handle_push(&state, &body).await,
        "pull_request" => handle_pull_request(&state, &body).await,
        _ => Ok(Json(serde_json::json!({ "ignored": event_type }))),
    }
}

async fn handle_push(state: &AppState, body: &[u8]) -> Result<Json<serde_json::Value>, ApiError> {
    let event: GithubPushEvent =
        serde_json::from_slice(body).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let branch = event.git_ref.trim_start_matches("refs/heads/");

    let services = crate::store::service::find_by_git_url(
        state.store.pool(),
        &event.repository.clone_url,
    )
    .await?;

    let mut triggered = Vec::new();
    for service in services {
        let auto_deploy = service.auto_deploy
            && service.auto_deploy_branch.as_deref() == Some(branch);
        let intent = BuildIntent {
            service_id: service.id.clone(),
            commit_sha: event.after.clone(),
            build_config_hash: event.after.clone(),
            build_config: service.build_config.clone(),
            replicas: 1,
            auto_deploy,
            auto_deploy_environment_id: service.auto_deploy_environment_id.clone(),
            preview_id: None,
        };
        if state.build_tx.send(intent).await.is_ok() {
            triggered.push(service.id);
        }
    }

    Ok(Json(serde_json::json!({ "triggered": triggered })))
}

async fn handle_pull_request(state: &AppState, body: &[u8]) -> Result<Json<serde_json::Value>, ApiError> {
    let event: GithubPullRequestEvent =
        serde_json::from_slice(body).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let services = crate::store::service::find_by_git_url(
        state.store.pool(),
        &event.repository.clone_url,
    )
    .await?;
    let Some(service) = services.into_iter().next() else {
        return Ok(Json(serde_json::json!({ "ignored": "no matching service" })));
    };

    match event.action.as_str() {
        "closed" => {
            if let Some(preview) = crate::store::preview::get_by_service_and_pr(
                state.store.pool(),
                &service.id,
                event.number,
            )
            .await?
            {
                crate::preview::close(&state.store, &preview.id).await?;
            }
            Ok(Json(serde_json::json!({ "closed": event.number })))
        }
        "opened" | "synchronize" | "reopened" => {
            let Some(preview_environment_id) = service.auto_deploy_environment_id.clone() else {
                return Ok(Json(serde_json::json!({ "ignored": "service has no preview environment configured" })));
            };
            if let Some(existing) = crate::store::preview::get_by_service_and_pr(
                state.store.pool(),
                &service.id,
                event.number,
            )
            .await?
            {
                return Ok(Json(serde_json::json!({ "existing": existing.id })));
            }

            let subdomain = format!("pr-{}", event.number);
            let preview = crate::preview::provision(
                &state.store,
                &state.build_tx,
                &service.id,
                &preview_environment_id,
                event.number,
                Some(&event.pull_request.title),
                Some(&event.pull_request.user.login),
                &event.pull_request.head.git_ref,
                &event.pull_request.base.git_ref,
                &event.pull_request.head.sha,
                &subdomain,
                &event.pull_request.head.sha,
                30,
                state.config.preview.base_domain.as_deref(),
            )
            .await?;
            Ok(Json(serde_json::json!({ "preview_id": preview.id })))
        }
        _ => Ok(Json(serde_json::json!({ "ignored": event.action }))),
    }
}

/// `POST /api/ci/runs` — CI provider callback ingestion (§4.6.6):
/// idempotent on `external_run_id` so a provider's retried delivery
/// never double-counts.
#[derive(Debug, Deserialize)]
pub struct CiRunUpsertRequest {
    pub service_id: String,
    pub commit_sha: String,
    pub workflow_name: String,
    pub external_run_id: String,
    pub run_number: i64,
    pub status: String,
    pub branch: String,
    pub event_type: String,
    pub actor: Option<String>,
}

pub async fn upsert_ci_run(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CiRunUpsertRequest>,
) -> Result<Json<crate::store::models::CiRun>, ApiError> {
    let run = crate::store::cirun::upsert(
        state.store.pool(),
        &body.service_id,
        &body.commit_sha,
        &body.workflow_name,
        &body.external_run_id,
        body.run_number,
        &body.status,
        &body.branch,
        &body.event_type,
        body.actor.as_deref().unwrap_or_default(),
    )
    .await?;
    Ok(Json(run))
}

#[derive(Debug, Deserialize)]
pub struct CiRunCompleteRequest {
    pub external_run_id: String,
    pub conclusion: String,
    pub url: Option<String>,
}

pub async fn complete_ci_run(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CiRunCompleteRequest>,
) -> Result<Json<crate::store::models::CiRun>, ApiError> {
    crate::store::cirun::get_by_external_id(state.store.pool(), &body.external_run_id)
        .await?
        .ok_or_else(|| ApiError::not_found("ci run not found"))?;

    crate::store::cirun::complete(
        state.store.pool(),
        &body.external_run_id,
        &body.conclusion,
        body.url.as_deref(),
    )
    .await?;

    let run = crate::store::cirun::get_by_external_id(state.store.pool(), &body.external_run_id)
        .await?
        .ok_or_else(|| ApiError::not_found("ci run not found"))?;
    Ok(Json(run))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_signature_matches_hmac_sha256() {
        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(b"payload");
        let hex_sig = hex::encode(mac.finalize().into_bytes());
        let header = format!("sha256={hex_sig}");
        assert!(verify_github_signature("secret", &header, b"payload"));
        assert!(!verify_github_signature("wrong", &header, b"payload"));
    }
}
