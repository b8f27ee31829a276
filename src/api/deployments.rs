//! Deployment API endpoints (§4.1/§4.6.1): creating a deployment only
//! ever writes a `pending` row — the deployment reconciler owns every
//! subsequent status transition. A rollback is just a new pending
//! deployment pointed at an earlier release; no separate code path.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::audit;
use crate::api::error::ApiError;
use crate::api::validation::validate_replicas;
use crate::auth::Principal;
use crate::store::models::{Deployment, Role};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateDeploymentRequest {
    pub environment_id: String,
    #[serde(default = "default_replicas")]
    pub replicas: i64,
}

fn default_replicas() -> i64 {
    1
}

/// `POST /api/releases/:release_id/deployments` — queues a new
/// deployment for an already-built release. Also used for rollback:
/// point `release_id` at a prior release and the reconciler supersedes
/// whatever is currently live once this one reports healthy.
pub async fn create_deployment(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path(release_id): Path<String>,
    Json(body): Json<CreateDeploymentRequest>,
) -> Result<Json<Deployment>, ApiError> {
    validate_replicas(body.replicas).map_err(ApiError::bad_request)?;

    let release = crate::store::release::get(state.store.pool(), &release_id).await?;
    if release.status != "ready" {
        return Err(ApiError::conflict("release is not ready to deploy"));
    }
    let service = crate::store::service::get(state.store.pool(), &release.service_id).await?;

    crate::api::auth::require_role(
        &state,
        &principal,
        &service.project_id,
        Some(&body.environment_id),
        Role::Developer,
    )
    .await?;

    let deployment = crate::store::deployment::create_pending(
        state.store.pool(),
        &release.service_id,
        &release_id,
        &body.environment_id,
        body.replicas,
    )
    .await?;

    state.reconciler_handles.deployment_wake.wake();

    audit::record(
        &state,
        &principal,
        &headers,
        "deployment.create",
        "deployment",
        Some(&deployment.id),
        None,
        Some(&service.project_id),
        "success",
        serde_json::json!({ "release_id": release_id, "environment_id": body.environment_id }),
    );

    Ok(Json(deployment))
}

pub async fn get_deployment(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Deployment>, ApiError> {
    let deployment = crate::store::deployment::get(state.store.pool(), &id).await?;
    Ok(Json(deployment))
}

pub async fn list_deployments_for_release(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(release_id): Path<String>,
) -> Result<Json<Vec<Deployment>>, ApiError> {
    let deployments = crate::store::deployment::list_by_release(state.store.pool(), &release_id).await?;
    Ok(Json(deployments))
}

/// `GET /api/services/:id/deployments/live` — every currently-live
/// deployment for a service, one per environment it's running in.
pub async fn list_live_for_service(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(service_id): Path<String>,
) -> Result<Json<Vec<Deployment>>, ApiError> {
    let deployments = crate::store::deployment::list_live_for_service(state.store.pool(), &service_id).await?;
    Ok(Json(deployments))
}
