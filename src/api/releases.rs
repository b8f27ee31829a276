//! Release API endpoints (§4.5): read-only views onto the build
//! pipeline's output, plus the intake that enqueues a build.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::audit;
use crate::api::error::ApiError;
use crate::auth::Principal;
use crate::builder::BuildIntent;
use crate::store::models::{Release, Role};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TriggerBuildRequest {
    pub commit_sha: String,
    pub build_config_hash: String,
    #[serde(default = "default_replicas")]
    pub replicas: i64,
    #[serde(default)]
    pub auto_deploy: bool,
    pub auto_deploy_environment_id: Option<String>,
}

fn default_replicas() -> i64 {
    1
}

/// `POST /api/services/:id/releases` — enqueues a build intent for the
/// service. Returns immediately; the pipeline's worker pool picks it
/// up and the resulting release can be polled via `list_releases`.
pub async fn trigger_build(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path(service_id): Path<String>,
    Json(body): Json<TriggerBuildRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = crate::store::service::get(state.store.pool(), &service_id).await?;
    crate::api::auth::require_role(
        &state,
        &principal,
        &service.project_id,
        body.auto_deploy_environment_id.as_deref(),
        Role::Developer,
    )
    .await?;

    if body.commit_sha.is_empty() {
        return Err(ApiError::bad_request("commit_sha is required"));
    }

    let intent = BuildIntent {
        service_id: service_id.clone(),
        commit_sha: body.commit_sha.clone(),
        build_config_hash: body.build_config_hash.clone(),
        build_config: service.build_config.clone(),
        replicas: body.replicas,
        auto_deploy: body.auto_deploy,
        auto_deploy_environment_id: body.auto_deploy_environment_id.clone(),
        preview_id: None,
    };

    state
        .build_tx
        .send(intent)
        .await
        .map_err(|_| ApiError::internal("build pipeline is not accepting work"))?;

    audit::record(
        &state,
        &principal,
        &headers,
        "release.build_triggered",
        "service",
        Some(&service_id),
        Some(&service.name),
        Some(&service.project_id),
        "success",
        serde_json::json!({ "commit_sha": body.commit_sha }),
    );

    Ok(Json(serde_json::json!({ "enqueued": true })))
}

pub async fn list_releases(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(service_id): Path<String>,
) -> Result<Json<Vec<Release>>, ApiError> {
    let releases = crate::store::release::list_for_service(state.store.pool(), &service_id).await?;
    Ok(Json(releases))
}

pub async fn get_release(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Release>, ApiError> {
    let release = crate::store::release::get(state.store.pool(), &id).await?;
    Ok(Json(release))
}

#[derive(Debug, Deserialize)]
pub struct AttachSignatureRequest {
    pub signature: String,
}

/// `POST /api/releases/:id/signature` — attaches an externally produced
/// image signature (e.g. from a cosign step run by the build toolchain,
/// which is out of core scope) to a ready release. Only a ready release
/// has an `image_uri` worth signing.
pub async fn attach_signature(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AttachSignatureRequest>,
) -> Result<Json<Release>, ApiError> {
    let release = crate::store::release::get(state.store.pool(), &id).await?;
    let service = crate::store::service::get(state.store.pool(), &release.service_id).await?;
    crate::api::auth::require_role(&state, &principal, &service.project_id, None, Role::Admin).await?;

    crate::store::release::attach_signature(state.store.pool(), &id, &body.signature).await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "release.signature_attached",
        "release",
        Some(&id),
        None,
        Some(&service.project_id),
        "success",
        serde_json::json!({}),
    );

    Ok(Json(crate::store::release::get(state.store.pool(), &id).await?))
}
