//! Unified API error handling. Wraps [`SwitchyardError`]'s kind
//! taxonomy in the HTTP-facing envelope the teacher's `api::error`
//! module used (same response shape: `{"error": {code, message,
//! details}}`), generalized to dispatch off `ErrorKind` instead of a
//! bespoke `ErrorCode` so every layer maps through one classification.

use crate::error::{ErrorKind, SwitchyardError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Vec<String>>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<HashMap<String, Vec<String>>>,
}

impl ApiError {
    pub const Unauthenticated: ApiError = ApiError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized",
        message: String::new(),
        details: None,
    };
    pub const Unauthorized: ApiError = ApiError {
        status: StatusCode::FORBIDDEN,
        code: "forbidden",
        message: String::new(),
        details: None,
    };

    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into(), details: None }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", message)
    }

    pub fn validation(errors: HashMap<String, Vec<String>>) -> Self {
        let message = if errors.len() == 1 {
            errors.values().next().and_then(|v| v.first()).cloned().unwrap_or_default()
        } else {
            format!("validation failed for {} fields", errors.len())
        };
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "validation_error",
            message,
            details: Some(errors),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

}

impl From<SwitchyardError> for ApiError {
    fn from(err: SwitchyardError) -> Self {
        match err.kind() {
            ErrorKind::NotFound => ApiError::not_found(err.to_string()),
            ErrorKind::Conflict => ApiError::conflict(err.to_string()),
            ErrorKind::InvalidInput => ApiError::bad_request(err.to_string()),
            ErrorKind::Unauthenticated => ApiError { message: err.to_string(), ..ApiError::Unauthenticated },
            ErrorKind::Unauthorized => ApiError { message: err.to_string(), ..ApiError::Unauthorized },
            ErrorKind::Upstream => {
                tracing::error!(error = %err, "upstream collaborator failed");
                Self::new(StatusCode::BAD_GATEWAY, "external_service_error", "an upstream service failed")
            }
            ErrorKind::Transient => {
                tracing::warn!(error = %err, "transient failure");
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", "temporarily unavailable")
            }
            ErrorKind::Fatal => {
                tracing::error!(error = %err, "fatal error");
                ApiError::internal("an internal error occurred")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody { code: self.code.to_string(), message: self.message, details: self.details },
        };
        (self.status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[derive(Default)]
pub struct ValidationErrorBuilder {
    errors: HashMap<String, Vec<String>>,
}

impl ValidationErrorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.errors.entry(field.into()).or_default().push(message.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_kind_maps_to_404() {
        let err: ApiError = SwitchyardError::not_found("service x").into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_builder_collects_multiple_fields() {
        let mut builder = ValidationErrorBuilder::new();
        builder.add("name", "required");
        builder.add("name", "too short");
        assert!(builder.finish().is_err());
    }
}
