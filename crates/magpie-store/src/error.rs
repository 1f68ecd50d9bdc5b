//! Error types for store backends.

use thiserror::Error;

/// Result type alias using [`StoreError`].
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur against a credential or record store.
///
/// Lookups that find nothing are *not* errors — they return `Ok(None)`.
/// Only infrastructure failures surface here.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected a write.
    #[error("write failed: {message}")]
    WriteFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The backend could not be reached or the query failed.
    #[error("store unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A stored row could not be decoded into its domain shape.
    #[error("corrupt row for key '{key}': {message}")]
    CorruptRow { key: String, message: String },
}

impl StoreError {
    /// Create a write failure without an underlying source.
    pub fn write_failed(message: impl Into<String>) -> Self {
        StoreError::WriteFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a write failure wrapping an underlying error.
    pub fn write_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        StoreError::WriteFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an unavailable error without an underlying source.
    pub fn unavailable(message: impl Into<String>) -> Self {
        StoreError::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Create an unavailable error wrapping an underlying error.
    pub fn unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        StoreError::Unavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::write_failed("row locked");
        assert_eq!(err.to_string(), "write failed: row locked");

        let err = StoreError::CorruptRow {
            key: "M1".to_string(),
            message: "bad timestamp".to_string(),
        };
        assert_eq!(err.to_string(), "corrupt row for key 'M1': bad timestamp");
    }
}
