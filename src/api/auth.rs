//! Authentication surface: password login (issues an API token),
//! and token self-management for the calling principal. Authorization
//! (role checks against a project/environment) lives alongside each
//! resource's handlers via `require_role`, not here.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::auth::{self, Principal};
use crate::store::models::Role;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: String,
    pub email: String,
}

/// `POST /api/auth/login` — verifies a password and mints a fresh API
/// token on success. The plaintext is returned exactly once; only its
/// digest is ever persisted.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = crate::store::user::get_by_email(state.store.pool(), &body.email)
        .await?
        .ok_or_else(|| ApiError::bad_request("invalid email or password"))?;

    let matches = user
        .password_hash
        .as_deref()
        .map(|hash| auth::verify_password(&body.password, hash))
        .unwrap_or(false);
    if !matches || !user.active {
        return Err(ApiError::bad_request("invalid email or password"));
    }

    let issued = auth::generate_token();
    crate::store::token::create(
        state.store.pool(),
        &user.id,
        "login session",
        &issued.prefix,
        &issued.digest,
        "[]",
        None,
    )
    .await?;

    Ok(Json(LoginResponse { token: issued.plaintext, user_id: user.id, email: user.email }))
}

#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    pub user_id: String,
    pub email: String,
}

/// `GET /api/auth/whoami` — resolves the caller's identity. Exists
/// mostly so a UI can confirm a stored token is still valid.
pub async fn whoami(principal: Principal) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse { user_id: principal.user_id, email: principal.email })
}

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub name: String,
    pub expires_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub id: String,
    pub token: String,
    pub prefix: String,
}

/// `POST /api/auth/tokens` — issues an additional named token for the
/// caller (e.g. a CI token separate from their interactive session).
pub async fn create_token(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(body): Json<CreateTokenRequest>,
) -> Result<Json<CreateTokenResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if body.name.trim().is_empty() {
        errors.add("name", "is required");
    }
    errors.finish()?;

    let issued = auth::generate_token();
    let token = crate::store::token::create(
        state.store.pool(),
        &principal.user_id,
        &body.name,
        &issued.prefix,
        &issued.digest,
        "[]",
        body.expires_at.as_deref(),
    )
    .await?;

    Ok(Json(CreateTokenResponse { id: token.id, token: issued.plaintext, prefix: issued.prefix }))
}

/// `GET /api/auth/tokens` — lists the caller's tokens (digests never
/// leave the store).
pub async fn list_tokens(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Vec<crate::store::models::ApiToken>>, ApiError> {
    let tokens = crate::store::token::list_for_user(state.store.pool(), &principal.user_id).await?;
    Ok(Json(tokens))
}

/// `DELETE /api/auth/tokens/:id` — revokes one of the caller's tokens.
pub async fn revoke_token(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let tokens = crate::store::token::list_for_user(state.store.pool(), &principal.user_id).await?;
    if !tokens.iter().any(|t| t.id == id) {
        return Err(ApiError::not_found("token not found"));
    }
    crate::store::token::revoke(state.store.pool(), &id).await?;
    Ok(Json(serde_json::json!({ "revoked": true })))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
}

/// `POST /api/auth/users` — bootstrap-admin-only account provisioning;
/// there's no self-service signup, matching §3's "no billing engine, no
/// plugin runtime" scope line — users are seeded by whoever holds the
/// admin token.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(body): Json<CreateUserRequest>,
) -> Result<Json<WhoAmIResponse>, ApiError> {
    if principal.user_id != "bootstrap-admin" {
        return Err(ApiError::Unauthorized);
    }

    let mut errors = ValidationErrorBuilder::new();
    if !body.email.contains('@') {
        errors.add("email", "must be a valid email address");
    }
    if body.password.len() < 8 {
        errors.add("password", "must be at least 8 characters");
    }
    errors.finish()?;

    if crate::store::user::get_by_email(state.store.pool(), &body.email).await?.is_some() {
        return Err(ApiError::conflict("a user with this email already exists"));
    }

    let hash = auth::hash_password(&body.password)?;
    let user = crate::store::user::create_with_password(state.store.pool(), &body.email, &hash).await?;

    Ok(Json(WhoAmIResponse { user_id: user.id, email: user.email }))
}

#[derive(Debug, Deserialize)]
pub struct SetUserActiveRequest {
    pub active: bool,
}

/// `POST /api/auth/users/:id/active` — bootstrap-admin-only account
/// suspension; a deactivated user's existing tokens stop authenticating
/// on their next request (`auth::middleware` checks `user.active`).
pub async fn set_user_active(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(body): Json<SetUserActiveRequest>,
) -> Result<Json<Value>, ApiError> {
    if principal.user_id != "bootstrap-admin" {
        return Err(ApiError::Unauthorized);
    }

    crate::store::user::set_active(state.store.pool(), &id, body.active).await?;
    Ok(Json(serde_json::json!({ "active": body.active })))
}

/// Resolves the caller's effective role for a project (optionally
/// scoped to an environment) and rejects with 403 if it doesn't meet
/// `required`. The bootstrap admin token always satisfies any role.
pub async fn require_role(
    state: &AppState,
    principal: &Principal,
    project_id: &str,
    environment_id: Option<&str>,
    required: Role,
) -> Result<(), ApiError> {
    if principal.user_id == "bootstrap-admin" {
        return Ok(());
    }

    let role = crate::store::access::effective_role(
        state.store.pool(),
        &principal.user_id,
        project_id,
        environment_id,
    )
    .await?;

    match role {
        Some(role) if auth::has_access(role, required) => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}
