//! Custom domain API endpoints (§4.6.5): desired-state CRUD for a
//! service's routed hostnames. Certificate issuance and ingress
//! materialization belong to the route reconciler, not here.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::audit;
use crate::api::error::ApiError;
use crate::api::validation::validate_domain_name;
use crate::auth::Principal;
use crate::store::models::{CustomDomain, Role};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCustomDomainRequest {
    pub environment_id: String,
    pub hostname: String,
}

pub async fn create_custom_domain(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path(service_id): Path<String>,
    Json(body): Json<CreateCustomDomainRequest>,
) -> Result<Json<CustomDomain>, ApiError> {
    let service = crate::store::service::get(state.store.pool(), &service_id).await?;
    crate::api::auth::require_role(
        &state,
        &principal,
        &service.project_id,
        Some(&body.environment_id),
        Role::Developer,
    )
    .await?;

    validate_domain_name(&body.hostname).map_err(ApiError::bad_request)?;

    let domain = crate::store::route::create(
        state.store.pool(),
        &service_id,
        &body.environment_id,
        &body.hostname,
    )
    .await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "route.create",
        "custom_domain",
        Some(&domain.id),
        Some(&domain.hostname),
        Some(&service.project_id),
        "success",
        serde_json::json!({ "environment_id": body.environment_id }),
    );

    Ok(Json(domain))
}

pub async fn list_custom_domains(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(service_id): Path<String>,
) -> Result<Json<Vec<CustomDomain>>, ApiError> {
    let domains = crate::store::route::list_for_service(state.store.pool(), &service_id).await?;
    Ok(Json(domains))
}

pub async fn get_custom_domain(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<CustomDomain>, ApiError> {
    let domain = crate::store::route::get(state.store.pool(), &id).await?;
    Ok(Json(domain))
}

pub async fn delete_custom_domain(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let domain = crate::store::route::get(state.store.pool(), &id).await?;
    let service = crate::store::service::get(state.store.pool(), &domain.service_id).await?;
    crate::api::auth::require_role(&state, &principal, &service.project_id, None, Role::Developer).await?;

    crate::store::route::remove(state.store.pool(), &id).await?;

    audit::record(
        &state,
        &principal,
        &headers,
        "route.delete",
        "custom_domain",
        Some(&id),
        Some(&domain.hostname),
        Some(&service.project_id),
        "success",
        serde_json::json!({}),
    );

    Ok(Json(serde_json::json!({ "deleted": true })))
}
