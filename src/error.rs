use derive_more::{Display, From};

use crate::db;

/// Failure of a lifecycle operation.
#[derive(Debug, Display, From)]
pub enum Error {
    /// Referenced entity does not exist.
    #[display("{_0} not found")]
    NotFound(String),

    /// Current state forbids the operation.
    #[display("invalid state: {_0}")]
    InvalidState(String),

    /// Caller is not the owner, or lacks the required role.
    #[display("permission denied: {_0}")]
    PermissionDenied(String),

    /// Malformed input.
    #[display("validation failed: {_0}")]
    Validation(String),

    /// Lower layer failure.
    #[display("unexpected failure: {_0}")]
    #[from]
    Unexpected(db::Error),
}

impl std::error::Error for Error {}

impl From<db::UnknownLabel> for Error {
    fn from(e: db::UnknownLabel) -> Self {
        Self::Validation(e.to_string())
    }
}

impl Error {
    pub(crate) fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub(crate) fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
