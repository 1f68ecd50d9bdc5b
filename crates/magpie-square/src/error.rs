//! Error types for the Square connector.

use thiserror::Error;

/// Result type alias using [`SquareError`].
pub type SquareResult<T> = Result<T, SquareError>;

/// Errors that can occur when talking to the Square API.
#[derive(Debug, Error)]
pub enum SquareError {
    /// Configuration validation error.
    #[error("configuration error: {0}")]
    Config(String),

    /// OAuth authentication error.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Token refresh failed.
    #[error("token refresh failed: {0}")]
    TokenRefresh(String),

    /// The tenant's token lacks the scope for a resource (HTTP 403).
    ///
    /// Callers degrade that resource to "zero results, continue" rather than
    /// aborting the sync.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Resource not found (HTTP 404).
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded (HTTP 429).
    #[error("rate limit exceeded, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    /// Any other non-success response, with Square's error envelope decoded
    /// when present.
    #[error("Square API error ({status}): {code} - {detail}")]
    Api {
        status: u16,
        code: String,
        detail: String,
    },

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A payload was missing a field the sync cannot proceed without.
    #[error("unexpected payload shape: {0}")]
    Shape(String),
}

impl SquareError {
    /// True when the tenant is simply not entitled to the resource.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, SquareError::PermissionDenied(_))
    }

    /// True for credential problems that a token refresh or re-authorization
    /// would fix.
    pub fn is_auth(&self) -> bool {
        matches!(self, SquareError::Auth(_) | SquareError::TokenRefresh(_))
    }

    /// True for failures worth retrying at the next scheduled cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            SquareError::Http(_) | SquareError::RateLimited { .. } => true,
            SquareError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
