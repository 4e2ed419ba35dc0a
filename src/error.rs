//! Crate-wide error type and result alias.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ParakeetError>;

/// All errors parakeet can produce.
///
/// `Clone` is required because a single upstream failure is fanned out to
/// every consumer attached to the same in-flight fetch.
#[derive(Error, Debug, Clone)]
pub enum ParakeetError {
    /// Invalid or missing configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The upstream completion API failed at construction or mid-stream.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The upstream produced no fragment within the idle timeout.
    #[error("upstream idle for more than {0}s, giving up")]
    UpstreamTimeout(u64),

    /// The client request was rejected before any cache or upstream work.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_detail() {
        let err = ParakeetError::Provider("connection reset".into());
        assert_eq!(err.to_string(), "Provider error: connection reset");
    }

    #[test]
    fn test_timeout_display_includes_seconds() {
        let err = ParakeetError::UpstreamTimeout(300);
        assert!(err.to_string().contains("300s"));
    }

    #[test]
    fn test_error_is_cloneable_for_fanout() {
        let err = ParakeetError::Config("capacity must be at least 1".into());
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
