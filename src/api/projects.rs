//! Project API endpoints (§4.1): the top-level tenant boundary every
//! service, environment, and access grant hangs off.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::audit;
use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::api::validation::{validate_slug, validate_uuid};
use crate::auth::Principal;
use crate::store::models::{Project, Role};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub slug: String,
}

pub async fn create_project(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Json(body): Json<CreateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if body.name.trim().is_empty() {
        errors.add("name", "is required");
    }
    if let Err(msg) = validate_slug(&body.slug, "slug") {
        errors.add("slug", msg);
    }
    errors.finish()?;

    if crate::store::project::get_by_slug(state.store.pool(), &body.slug).await?.is_some() {
        return Err(ApiError::conflict("a project with this slug already exists"));
    }

    let project = crate::store::project::create(state.store.pool(), &body.name, &body.slug).await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "project.create",
        "project",
        Some(&project.id),
        Some(&project.name),
        Some(&project.id),
        "success",
        serde_json::json!({ "slug": project.slug }),
    );

    Ok(Json(project))
}

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
) -> Result<Json<Vec<Project>>, ApiError> {
    let projects = crate::store::project::list(state.store.pool()).await?;
    Ok(Json(projects))
}

pub async fn get_project(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Project>, ApiError> {
    validate_uuid(&id, "id").map_err(ApiError::bad_request)?;
    let project = crate::store::project::get(state.store.pool(), &id).await?;
    Ok(Json(project))
}

pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    crate::api::auth::require_role(&state, &principal, &id, None, Role::Admin).await?;

    crate::store::project::delete(state.store.pool(), &id).await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "project.delete",
        "project",
        Some(&id),
        None,
        Some(&id),
        "success",
        serde_json::json!({}),
    );

    Ok(Json(serde_json::json!({ "deleted": true })))
}

#[derive(Debug, Deserialize)]
pub struct CreateEnvironmentRequest {
    pub name: String,
    pub namespace_label: String,
}

pub async fn create_environment(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(body): Json<CreateEnvironmentRequest>,
) -> Result<Json<crate::store::models::Environment>, ApiError> {
    crate::api::auth::require_role(&state, &principal, &project_id, None, Role::Admin).await?;

    validate_slug(&body.name, "name").map_err(ApiError::bad_request)?;

    if crate::store::environment::get_by_name(state.store.pool(), &project_id, &body.name).await?.is_some() {
        return Err(ApiError::conflict("an environment with this name already exists in this project"));
    }

    let env = crate::store::environment::create(
        state.store.pool(),
        &project_id,
        &body.name,
        &body.namespace_label,
    )
    .await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "environment.create",
        "environment",
        Some(&env.id),
        Some(&env.name),
        Some(&project_id),
        "success",
        serde_json::json!({}),
    );

    Ok(Json(env))
}

pub async fn list_environments(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<crate::store::models::Environment>>, ApiError> {
    let envs = crate::store::environment::list_for_project(state.store.pool(), &project_id).await?;
    Ok(Json(envs))
}

pub async fn get_environment(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<crate::store::models::Environment>, ApiError> {
    let env = crate::store::environment::get(state.store.pool(), &id).await?;
    Ok(Json(env))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_project_request_rejects_bad_slug() {
        assert!(validate_slug("My Project", "slug").is_err());
        assert!(validate_slug("my-project", "slug").is_ok());
    }
}
