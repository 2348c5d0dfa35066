//! # AppError
//!
//! Centralized error handling for the dashboard.
//! Maps domain-specific failures to actionable error types.

use thiserror::Error;

/// The primary error type for all cb-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., configuration, content item, user)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., inverted schedule window, blank title)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Missing or expired session, bad credentials
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated, but the role does not allow the action
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Infrastructure failure (e.g., store unreachable, disk full)
    #[error("internal service error: {0}")]
    Internal(String),

    /// Resource already exists (e.g., duplicate user email)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Upload exceeds the configured limit
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
}

/// Plugins may return an `AppError` inside `anyhow` (e.g., a unique-key
/// violation reported as `Conflict`); it is recovered here unchanged.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<AppError>() {
            Ok(app) => app,
            Err(err) => AppError::Internal(format!("{err:#}")),
        }
    }
}

/// A specialized Result type for dashboard logic.
pub type Result<T> = std::result::Result<T, AppError>;
