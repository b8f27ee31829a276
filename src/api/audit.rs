//! Audit log query surface and the `record` helper every mutating
//! handler calls to emit an [`AuditEvent`](crate::audit::AuditEvent)
//! without duplicating header-parsing boilerplate.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::audit::AuditEvent;
use crate::auth::Principal;
use crate::AppState;

/// Client IP from `X-Forwarded-For`/`X-Real-IP`, matching the rate
/// limiter's own extraction order so audit rows and rate-limit
/// decisions attribute the same request to the same address.
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let ip = first.trim();
            if !ip.is_empty() {
                return Some(ip.to_string());
            }
        }
    }
    headers.get("x-real-ip").and_then(|h| h.to_str().ok()).map(|s| s.trim().to_string())
}

/// Builds and enqueues an [`AuditEvent`] for a mutating API call. Never
/// fails the request: the sink already drops events under backpressure
/// rather than blocking, and this helper mirrors that contract.
#[allow(clippy::too_many_arguments)]
pub fn record(
    state: &AppState,
    principal: &Principal,
    headers: &HeaderMap,
    action: &str,
    resource_type: &str,
    resource_id: Option<&str>,
    resource_name: Option<&str>,
    project_id: Option<&str>,
    outcome: &'static str,
    context: Value,
) {
    let mut event = AuditEvent::new(action, resource_type, outcome);
    event.actor_id = Some(principal.user_id.clone());
    event.actor_email = Some(principal.email.clone());
    event.resource_id = resource_id.map(str::to_string);
    event.resource_name = resource_name.map(str::to_string);
    event.project_id = project_id.map(str::to_string);
    event.source_ip = extract_client_ip(headers);
    event.user_agent = headers.get("user-agent").and_then(|h| h.to_str().ok()).map(str::to_string);
    event.context = context;
    state.audit.record(event);
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// `GET /api/projects/:id/audit` — recent audit entries scoped to a
/// project.
pub async fn list_for_project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<crate::store::models::AuditLog>>, ApiError> {
    let logs = crate::store::audit::list_for_project(state.store.pool(), &project_id, query.limit).await?;
    Ok(Json(logs))
}

/// `GET /api/audit` — most recent audit entries across all projects,
/// for a platform-level admin view.
pub async fn list_recent(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<crate::store::models::AuditLog>>, ApiError> {
    let logs = crate::store::audit::list_recent(state.store.pool(), query.limit).await?;
    Ok(Json(logs))
}
