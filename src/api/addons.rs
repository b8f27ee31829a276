//! Database addon API endpoints (§4.8): provisioning a managed backing
//! service and binding it into a service's environment via an env var
//! name. Provisioning itself is owned by the addon reconciler; this
//! layer only ever writes `pending`/`deleting` rows.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::audit;
use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::api::validation::validate_slug;
use crate::auth::Principal;
use crate::store::models::{DatabaseAddon, DatabaseAddonBinding, Role};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateAddonRequest {
    pub addon_type: String,
    pub name: String,
    #[serde(default)]
    pub config: String,
}

pub async fn create_addon(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(body): Json<CreateAddonRequest>,
) -> Result<Json<DatabaseAddon>, ApiError> {
    crate::api::auth::require_role(&state, &principal, &project_id, None, Role::Admin).await?;

    let mut errors = ValidationErrorBuilder::new();
    if let Err(msg) = validate_slug(&body.name, "name") {
        errors.add("name", msg);
    }
    if body.addon_type.trim().is_empty() {
        errors.add("addon_type", "is required");
    }
    errors.finish()?;

    let addon = crate::store::addon::create_pending(
        state.store.pool(),
        &project_id,
        &body.addon_type,
        &body.name,
        &body.config,
    )
    .await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "addon.create",
        "database_addon",
        Some(&addon.id),
        Some(&addon.name),
        Some(&project_id),
        "success",
        serde_json::json!({ "addon_type": addon.addon_type }),
    );

    Ok(Json(addon))
}

pub async fn list_addons(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<DatabaseAddon>>, ApiError> {
    let addons = crate::store::addon::list_for_project(state.store.pool(), &project_id).await?;
    Ok(Json(addons))
}

pub async fn get_addon(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<DatabaseAddon>, ApiError> {
    let addon = crate::store::addon::get(state.store.pool(), &id).await?;
    Ok(Json(addon))
}

pub async fn delete_addon(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let addon = crate::store::addon::get(state.store.pool(), &id).await?;
    crate::api::auth::require_role(&state, &principal, &addon.project_id, None, Role::Admin).await?;

    crate::store::addon::soft_delete(state.store.pool(), &id).await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "addon.delete",
        "database_addon",
        Some(&id),
        Some(&addon.name),
        Some(&addon.project_id),
        "success",
        serde_json::json!({}),
    );

    Ok(Json(serde_json::json!({ "deleting": true })))
}

#[derive(Debug, Deserialize)]
pub struct CreateBindingRequest {
    pub service_id: String,
    pub env_var_name: String,
}

/// `POST /api/addons/:id/bindings` — wires a provisioned addon's
/// connection secret into a service as an env var name; the actual
/// secret value is resolved from `secret_ref` at deploy time, not here.
pub async fn create_binding(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path(addon_id): Path<String>,
    Json(body): Json<CreateBindingRequest>,
) -> Result<Json<DatabaseAddonBinding>, ApiError> {
    let addon = crate::store::addon::get(state.store.pool(), &addon_id).await?;
    crate::api::auth::require_role(&state, &principal, &addon.project_id, None, Role::Developer).await?;

    if body.env_var_name.trim().is_empty() {
        return Err(ApiError::bad_request("env_var_name is required"));
    }

    let binding = crate::store::addon::create_binding(
        state.store.pool(),
        &addon_id,
        &body.service_id,
        &body.env_var_name,
    )
    .await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "addon.binding.create",
        "database_addon_binding",
        Some(&binding.id),
        None,
        Some(&addon.project_id),
        "success",
        serde_json::json!({ "service_id": binding.service_id, "env_var_name": binding.env_var_name }),
    );

    Ok(Json(binding))
}

pub async fn list_bindings_for_service(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(service_id): Path<String>,
) -> Result<Json<Vec<DatabaseAddonBinding>>, ApiError> {
    let bindings = crate::store::addon::list_bindings_for_service(state.store.pool(), &service_id).await?;
    Ok(Json(bindings))
}
