//! The stable error-kind taxonomy every subsystem maps its own failures
//! into at its public boundary (see SPEC_FULL.md §7).
//!
//! Subsystems keep their own `thiserror::Error` enums for internal detail
//! (`at_dcg::DcgError`, `at_caam::CaamError`, ...) and provide a `kind()`
//! method converting to `ErrorKind`. Nothing upstream of a subsystem's
//! public API should match on subsystem-internal error variants directly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A caller-branchable error category, stable across subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    NotFound,
    Conflict,
    Unauthenticated,
    Forbidden,
    RateLimited,
    RetryableTransient,
    CursorExpired,
    CommandFailed,
    ParseError,
    Timeout,
    SystemUnavailable,
    Internal,
}

impl ErrorKind {
    /// The stable string code emitted in error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::RetryableTransient => "retryable_transient",
            ErrorKind::CursorExpired => "cursor_expired",
            ErrorKind::CommandFailed => "command_failed",
            ErrorKind::ParseError => "parse_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::SystemUnavailable => "system_unavailable",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A generic error carrying a stable kind plus a human-readable message.
///
/// Used by shared infrastructure (e.g. [`crate::db`]) that has no richer
/// domain-specific error type of its own.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }
}

impl From<tokio_rusqlite::Error> for CoreError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        CoreError::new(ErrorKind::SystemUnavailable, e.to_string())
    }
}
