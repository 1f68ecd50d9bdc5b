//! Error types for sync orchestration.

use thiserror::Error;

use magpie_square::SquareError;
use magpie_store::StoreError;

/// Errors surfaced by the scheduler's fallible entry points.
///
/// Per-tenant sync failures are *not* errors at this level — they are
/// reported through [`crate::SyncReport`] so one tenant never poisons a
/// cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Store access failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Square API call failed.
    #[error(transparent)]
    Square(#[from] SquareError),

    /// The external trigger presented a wrong shared secret.
    #[error("invalid trigger secret")]
    Unauthorized,

    /// The external trigger is not configured for this deployment.
    #[error("external trigger is not configured")]
    TriggerDisabled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparent_store_error() {
        let err = SyncError::from(StoreError::write_failed("disk full"));
        assert_eq!(err.to_string(), "write failed: disk full");
    }

    #[test]
    fn test_trigger_errors_display() {
        assert_eq!(SyncError::Unauthorized.to_string(), "invalid trigger secret");
        assert_eq!(
            SyncError::TriggerDisabled.to_string(),
            "external trigger is not configured"
        );
    }
}
