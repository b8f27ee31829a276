//! Error-kind taxonomy shared by every layer of the control plane.
//!
//! Errors are classified by kind, not by the originating stack type.
//! Repository-layer errors are tagged with their kind at the point of call;
//! higher layers add context with [`anyhow::Context`]-style wrapping but
//! never downgrade the kind.

use std::fmt;

/// A classified error kind, mapped to HTTP status codes at the Intake
/// boundary (see `api::error`).
#[derive(Debug, thiserror::Error)]
pub enum SwitchyardError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("unauthorized")]
    Unauthorized,

    #[error("upstream collaborator failed: {0}")]
    Upstream(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("fatal error: {0}")]
    Fatal(#[from] anyhow::Error),
}

impl SwitchyardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SwitchyardError::NotFound(_) => ErrorKind::NotFound,
            SwitchyardError::Conflict(_) => ErrorKind::Conflict,
            SwitchyardError::InvalidInput(_) => ErrorKind::InvalidInput,
            SwitchyardError::Unauthenticated => ErrorKind::Unauthenticated,
            SwitchyardError::Unauthorized => ErrorKind::Unauthorized,
            SwitchyardError::Upstream(_) => ErrorKind::Upstream,
            SwitchyardError::Transient(_) => ErrorKind::Transient,
            SwitchyardError::Fatal(_) => ErrorKind::Fatal,
        }
    }

    pub fn not_found(resource: impl fmt::Display) -> Self {
        SwitchyardError::NotFound(resource.to_string())
    }

    pub fn conflict(msg: impl fmt::Display) -> Self {
        SwitchyardError::Conflict(msg.to_string())
    }

    pub fn invalid(msg: impl fmt::Display) -> Self {
        SwitchyardError::InvalidInput(msg.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidInput,
    Unauthenticated,
    Unauthorized,
    Upstream,
    Transient,
    Fatal,
}

/// Converts sqlx errors into classified kinds the same way the row-level
/// repository code needs: row-missing becomes `NotFound`, constraint
/// violations are pattern-matched on the driver's message text the way
/// SQLite surfaces them (no structured constraint-kind API exists for
/// this driver).
impl From<sqlx::Error> for SwitchyardError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => SwitchyardError::NotFound("row not found".into()),
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                if msg.contains("UNIQUE constraint failed") {
                    SwitchyardError::Conflict(msg.to_string())
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    SwitchyardError::InvalidInput(msg.to_string())
                } else {
                    SwitchyardError::Fatal(anyhow::anyhow!("database error: {msg}"))
                }
            }
            other => SwitchyardError::Fatal(anyhow::anyhow!("database error: {other}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, SwitchyardError>;
