//! axum extractor + middleware resolving a [`Principal`] from either a
//! bearer API token or the configured bootstrap admin token. Mirrors
//! the teacher's `auth_middleware` header-parsing shape (Authorization
//! bearer, then `X-API-Key`, then a query-string fallback for
//! SSE/EventSource clients that can't set custom headers).

use super::{constant_time_eq, digest_token, Principal};
use crate::api::error::ApiError;
use crate::AppState;
use axum::extract::{FromRequestParts, State};
use axum::http::{request::Parts, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

fn extract_token(parts: &Parts) -> Option<String> {
    if let Some(header) = parts.headers.get("Authorization").and_then(|h| h.to_str().ok()) {
        return Some(header.strip_prefix("Bearer ").unwrap_or(header).to_string());
    }
    if let Some(api_key) = parts.headers.get("X-API-Key").and_then(|h| h.to_str().ok()) {
        return Some(api_key.to_string());
    }
    parts.uri.query().and_then(|q| {
        q.split('&').find_map(|pair| {
            let mut it = pair.splitn(2, '=');
            let key = it.next()?;
            let value = it.next()?;
            (key == "token").then(|| value.to_string())
        })
    })
}

#[async_trait::async_trait]
impl FromRequestParts<Arc<AppState>> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = extract_token(parts).ok_or(ApiError::Unauthenticated)?;

        if constant_time_eq(&state.config.auth.admin_token, &token) {
            return Ok(Principal {
                user_id: "bootstrap-admin".to_string(),
                email: "bootstrap-admin".to_string(),
                token_id: None,
            });
        }

        let digest = digest_token(&token);
        let api_token = crate::store::token::find_by_digest(state.store.pool(), &digest)
            .await
            .map_err(ApiError::from)?
            .ok_or(ApiError::Unauthenticated)?;

        if let Some(expires_at) = &api_token.expires_at {
            if expires_at.as_str() < crate::store::models::now_rfc3339().as_str() {
                return Err(ApiError::Unauthenticated);
            }
        }

        let _ = crate::store::token::touch_last_used(state.store.pool(), &api_token.id, None).await;

        let user = crate::store::user::get(state.store.pool(), &api_token.user_id)
            .await
            .map_err(ApiError::from)?;

        if !user.active {
            return Err(ApiError::Unauthorized);
        }

        Ok(Principal {
            user_id: user.id,
            email: user.email,
            token_id: Some(api_token.id),
        })
    }
}

/// Layer-style middleware variant for routes that only need to reject
/// unauthenticated requests without pulling the full `Principal` into
/// the handler signature (e.g. the metrics endpoint behind a simple
/// bearer check).
pub async fn require_authenticated(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> std::result::Result<Response, StatusCode> {
    let (mut parts, body) = request.into_parts();
    if Principal::from_request_parts(&mut parts, &state).await.is_err() {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(Request::from_parts(parts, body)).await)
}
