//! Preview environment API endpoints (§4.7): provisioning from a PR
//! event, the access-path that records activity and wakes a sleeping
//! preview, and an explicit close for PR-merge/close.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::audit;
use crate::api::error::ApiError;
use crate::auth::Principal;
use crate::store::models::{PreviewEnvironment, Role};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ProvisionPreviewRequest {
    pub pr_number: i64,
    pub pr_title: Option<String>,
    pub pr_author: Option<String>,
    pub branch: String,
    pub base_branch: String,
    pub commit_sha: String,
    pub subdomain: String,
    pub build_config_hash: String,
    pub preview_environment_id: String,
    #[serde(default = "default_auto_sleep_minutes")]
    pub auto_sleep_after_minutes: i64,
}

fn default_auto_sleep_minutes() -> i64 {
    30
}

/// `POST /api/services/:id/previews` — usually called from the webhook
/// intake when a PR opens, but exposed directly too for manual preview
/// creation.
pub async fn create_preview(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path(service_id): Path<String>,
    Json(body): Json<ProvisionPreviewRequest>,
) -> Result<Json<PreviewEnvironment>, ApiError> {
    let service = crate::store::service::get(state.store.pool(), &service_id).await?;
    crate::api::auth::require_role(
        &state,
        &principal,
        &service.project_id,
        Some(&body.preview_environment_id),
        Role::Developer,
    )
    .await?;

    if let Some(existing) = crate::store::preview::get_by_service_and_pr(
        state.store.pool(),
        &service_id,
        body.pr_number,
    )
    .await?
    {
        return Ok(Json(existing));
    }

    let preview = crate::preview::provision(
        &state.store,
        &state.build_tx,
        &service_id,
        &body.preview_environment_id,
        body.pr_number,
        body.pr_title.as_deref(),
        body.pr_author.as_deref(),
        &body.branch,
        &body.base_branch,
        &body.commit_sha,
        &body.subdomain,
        &body.build_config_hash,
        body.auto_sleep_after_minutes,
        state.config.preview.base_domain.as_deref(),
    )
    .await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "preview.create",
        "preview_environment",
        Some(&preview.id),
        Some(&preview.subdomain),
        Some(&service.project_id),
        "success",
        serde_json::json!({ "pr_number": preview.pr_number }),
    );

    Ok(Json(preview))
}

pub async fn list_previews_for_service(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(service_id): Path<String>,
) -> Result<Json<Vec<PreviewEnvironment>>, ApiError> {
    let previews = crate::store::preview::list_for_service(state.store.pool(), &service_id).await?;
    Ok(Json(previews))
}

/// `GET /api/previews/:id` — also the access-path: every successful
/// read bumps `last_accessed_at` (coalesced) and, if the preview is
/// sleeping, kicks off a wake.
pub async fn get_preview(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<PreviewEnvironment>, ApiError> {
    let preview = crate::store::preview::get(state.store.pool(), &id).await?;

    if preview.status == "sleeping" {
        crate::preview::wake(&state.store, &id).await?;
        state.reconciler_handles.deployment_wake.wake();
        return Ok(Json(crate::store::preview::get(state.store.pool(), &id).await?));
    }

    crate::preview::record_access(&state.store, &state.preview_access_tracker, &id).await;
    Ok(Json(preview))
}

/// `POST /api/previews/:id/close` — terminal close, e.g. on PR merge.
pub async fn close_preview(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let preview = crate::store::preview::get(state.store.pool(), &id).await?;
    let service = crate::store::service::get(state.store.pool(), &preview.service_id).await?;
    crate::api::auth::require_role(&state, &principal, &service.project_id, None, Role::Developer).await?;

    crate::preview::close(&state.store, &id).await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "preview.close",
        "preview_environment",
        Some(&id),
        Some(&preview.subdomain),
        Some(&service.project_id),
        "success",
        serde_json::json!({}),
    );

    Ok(Json(serde_json::json!({ "closed": true })))
}
