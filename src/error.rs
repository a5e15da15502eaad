use std::fmt;
use std::sync::Arc;

/// Error type for cache store operations.
///
/// These never reach subscribers: `CacheService` logs and absorbs them.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// A store operation failed.
    #[error("[{tier}] cache error for key '{key}': {message}")]
    Operation {
        tier: String,
        key: String,
        message: String,
    },
    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CacheError {
    /// Create a new operation error.
    pub fn operation(
        tier: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CacheError::Operation {
            tier: tier.into(),
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Error returned by a fetcher.
///
/// Cloning is cheap: every caller deduplicated onto the same fetch receives
/// the same error.
#[derive(Clone, thiserror::Error)]
#[error("{message}")]
pub struct FetchError {
    message: String,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl FetchError {
    /// Wrap an underlying error (network, backend, decoding...).
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        FetchError {
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }

    /// Create an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        FetchError {
            message: message.into(),
            source: None,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Debug for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchError")
            .field("message", &self.message)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

impl From<String> for FetchError {
    fn from(message: String) -> Self {
        FetchError::msg(message)
    }
}

impl From<&str> for FetchError {
    fn from(message: &str) -> Self {
        FetchError::msg(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_operation_error_display() {
        let err = CacheError::operation("redis", "v1:gastos:user1", "GET failed");
        assert_eq!(
            err.to_string(),
            "[redis] cache error for key 'v1:gastos:user1': GET failed"
        );
    }

    #[test]
    fn test_fetch_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "backend timed out");
        let err = FetchError::new(io);
        assert_eq!(err.message(), "backend timed out");
        assert!(err.source().is_some());

        let cloned = err.clone();
        assert_eq!(cloned.to_string(), "backend timed out");
    }

    #[test]
    fn test_fetch_error_from_str() {
        let err: FetchError = "offline".into();
        assert_eq!(err.to_string(), "offline");
        assert!(err.source().is_none());
    }
}
