//! Serverless function API endpoints (§4.9): a lighter-weight
//! deployable than Service — no replicas/health tier, just a build
//! artifact behind an invocation endpoint the function reconciler
//! maintains.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::audit;
use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::api::validation::validate_slug;
use crate::auth::Principal;
use crate::store::models::{Function, Role};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateFunctionRequest {
    pub name: String,
    pub config: String,
}

pub async fn create_function(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(body): Json<CreateFunctionRequest>,
) -> Result<Json<Function>, ApiError> {
    crate::api::auth::require_role(&state, &principal, &project_id, None, Role::Developer).await?;

    let mut errors = ValidationErrorBuilder::new();
    if let Err(msg) = validate_slug(&body.name, "name") {
        errors.add("name", msg);
    }
    errors.finish()?;

    let function =
        crate::store::function::create_pending(state.store.pool(), &project_id, &body.name, &body.config)
            .await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "function.create",
        "function",
        Some(&function.id),
        Some(&function.name),
        Some(&project_id),
        "success",
        serde_json::json!({}),
    );

    Ok(Json(function))
}

pub async fn list_functions(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<Function>>, ApiError> {
    let functions = crate::store::function::list_for_project(state.store.pool(), &project_id).await?;
    Ok(Json(functions))
}

pub async fn get_function(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Function>, ApiError> {
    let function = crate::store::function::get(state.store.pool(), &id).await?;
    Ok(Json(function))
}

#[derive(Debug, Deserialize)]
pub struct RecordInvocationRequest {
    pub duration_ms: f64,
}

/// `POST /functions/:id/invocations` — called by the function's own
/// invocation gateway (outside this control plane) to report a
/// completed call, the same unauthenticated callback shape the CI-run
/// ingestion endpoints use.
pub async fn record_invocation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<RecordInvocationRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    crate::store::function::record_invocation(state.store.pool(), &id, body.duration_ms).await?;
    Ok(Json(serde_json::json!({ "recorded": true })))
}

pub async fn delete_function(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let function = crate::store::function::get(state.store.pool(), &id).await?;
    crate::api::auth::require_role(&state, &principal, &function.project_id, None, Role::Admin).await?;

    if function.status == "deleting" {
        return Err(ApiError::conflict("function is already being deleted"));
    }
    crate::store::function::soft_delete(state.store.pool(), &id).await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "function.delete",
        "function",
        Some(&id),
        Some(&function.name),
        Some(&function.project_id),
        "success",
        serde_json::json!({}),
    );

    Ok(Json(serde_json::json!({ "deleting": true })))
}
