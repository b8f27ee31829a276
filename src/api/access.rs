//! Project access-grant API endpoints (§4.3): who holds which role on
//! a project, optionally scoped to one environment. Managing grants is
//! itself an Admin-only operation.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;

use crate::api::audit;
use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::api::validation::validate_role;
use crate::auth::Principal;
use crate::store::models::{ProjectAccess, Role};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GrantAccessRequest {
    pub user_id: String,
    pub environment_id: Option<String>,
    pub role: String,
    pub expires_at: Option<String>,
}

pub async fn grant_access(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(body): Json<GrantAccessRequest>,
) -> Result<Json<ProjectAccess>, ApiError> {
    crate::api::auth::require_role(&state, &principal, &project_id, None, Role::Admin).await?;

    let mut errors = ValidationErrorBuilder::new();
    if body.user_id.trim().is_empty() {
        errors.add("user_id", "is required");
    }
    if let Err(msg) = validate_role(&body.role) {
        errors.add("role", msg);
    }
    errors.finish()?;

    let role = Role::from_str(&body.role).map_err(ApiError::from)?;
    let grant = crate::store::access::grant(
        state.store.pool(),
        &body.user_id,
        &project_id,
        body.environment_id.as_deref(),
        role,
        body.expires_at.as_deref(),
    )
    .await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "access.grant",
        "project_access",
        Some(&grant.id),
        None,
        Some(&project_id),
        "success",
        serde_json::json!({ "user_id": grant.user_id, "role": grant.role }),
    );

    Ok(Json(grant))
}

pub async fn list_access(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<ProjectAccess>>, ApiError> {
    crate::api::auth::require_role(&state, &principal, &project_id, None, Role::Admin).await?;
    let grants = crate::store::access::list_for_project(state.store.pool(), &project_id).await?;
    Ok(Json(grants))
}

pub async fn revoke_access(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path((project_id, id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    crate::api::auth::require_role(&state, &principal, &project_id, None, Role::Admin).await?;

    crate::store::access::revoke(state.store.pool(), &id).await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "access.revoke",
        "project_access",
        Some(&id),
        None,
        Some(&project_id),
        "success",
        serde_json::json!({}),
    );

    Ok(Json(serde_json::json!({ "revoked": true })))
}
