//! Service API endpoints (§4.1): the deployable unit within a project,
//! pointing at a git repository and an opaque build configuration.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::audit;
use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::api::validation::{validate_branch, validate_git_url, validate_slug};
use crate::auth::Principal;
use crate::store::models::{Role, Service};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub git_url: String,
    pub app_path: Option<String>,
    pub build_config: String,
    #[serde(default)]
    pub auto_deploy: bool,
    pub auto_deploy_branch: Option<String>,
    pub auto_deploy_environment_id: Option<String>,
}

pub async fn create_service(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(body): Json<CreateServiceRequest>,
) -> Result<Json<Service>, ApiError> {
    crate::api::auth::require_role(&state, &principal, &project_id, None, Role::Developer).await?;

    let mut errors = ValidationErrorBuilder::new();
    if let Err(msg) = validate_slug(&body.name, "name") {
        errors.add("name", msg);
    }
    if let Err(msg) = validate_git_url(&body.git_url) {
        errors.add("git_url", msg);
    }
    if let Some(branch) = &body.auto_deploy_branch {
        if let Err(msg) = validate_branch(branch) {
            errors.add("auto_deploy_branch", msg);
        }
    }
    errors.finish()?;

    if crate::store::service::get_by_name(state.store.pool(), &project_id, &body.name).await?.is_some() {
        return Err(ApiError::conflict("a service with this name already exists in this project"));
    }

    let service = crate::store::service::create(
        state.store.pool(),
        &project_id,
        &body.name,
        &body.git_url,
        body.app_path.as_deref(),
        &body.build_config,
        body.auto_deploy,
        body.auto_deploy_branch.as_deref(),
        body.auto_deploy_environment_id.as_deref(),
    )
    .await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "service.create",
        "service",
        Some(&service.id),
        Some(&service.name),
        Some(&project_id),
        "success",
        serde_json::json!({ "git_url": service.git_url }),
    );

    Ok(Json(service))
}

pub async fn list_services(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<Service>>, ApiError> {
    let services = crate::store::service::list_for_project(state.store.pool(), &project_id).await?;
    Ok(Json(services))
}

pub async fn get_service(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Service>, ApiError> {
    let service = crate::store::service::get(state.store.pool(), &id).await?;
    Ok(Json(service))
}

pub async fn delete_service(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = crate::store::service::get(state.store.pool(), &id).await?;
    crate::api::auth::require_role(&state, &principal, &service.project_id, None, Role::Admin).await?;

    crate::store::service::delete(state.store.pool(), &id).await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "service.delete",
        "service",
        Some(&id),
        Some(&service.name),
        Some(&service.project_id),
        "success",
        serde_json::json!({}),
    );

    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// `GET /api/services/dependencies?project_id=` helper body used by
/// `add_dependency`; a service cannot depend on another service in a
/// way that would close a cycle in the project's dependency graph
/// (§4.1.1).
#[derive(Debug, Deserialize)]
pub struct AddDependencyRequest {
    pub source_service_id: String,
    pub target_service_id: String,
    pub dependency_type: String,
}

pub async fn add_dependency(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(body): Json<AddDependencyRequest>,
) -> Result<Json<crate::store::models::ServiceDependency>, ApiError> {
    crate::api::auth::require_role(&state, &principal, &project_id, None, Role::Developer).await?;

    let edges = crate::store::dependency::list_for_project(state.store.pool(), &project_id).await?;
    if crate::store::dependency::would_cycle(&edges, &body.source_service_id, &body.target_service_id) {
        return Err(ApiError::conflict("adding this dependency would create a cycle"));
    }

    let edge = crate::store::dependency::insert_edge(
        state.store.pool(),
        &project_id,
        &body.source_service_id,
        &body.target_service_id,
        &body.dependency_type,
    )
    .await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "service.dependency.create",
        "service_dependency",
        Some(&edge.id),
        None,
        Some(&project_id),
        "success",
        serde_json::json!({ "source": edge.source_service_id, "target": edge.target_service_id }),
    );

    Ok(Json(edge))
}

pub async fn remove_dependency(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path((project_id, id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    crate::api::auth::require_role(&state, &principal, &project_id, None, Role::Developer).await?;
    crate::store::dependency::remove_edge(state.store.pool(), &id).await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "service.dependency.delete",
        "service_dependency",
        Some(&id),
        None,
        Some(&project_id),
        "success",
        serde_json::json!({}),
    );

    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn list_dependencies(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<crate::store::models::ServiceDependency>>, ApiError> {
    let edges = crate::store::dependency::list_for_project(state.store.pool(), &project_id).await?;
    Ok(Json(edges))
}
