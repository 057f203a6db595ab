//! Error taxonomy shared by loaders, the scheduler and the video manager

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Failure category recorded in a [`crate::PreloadResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Failed security or format validation; never attempted
    InvalidUrl,
    /// Attempt exceeded its deadline
    Timeout,
    /// Cancelled by the caller
    Aborted,
    /// Native load or decode failure
    NetworkOrDecodeError,
    /// Resource release did not complete in time
    CleanupTimeout,
    /// Internal cache bookkeeping problem, logged only
    CacheEvictionInternal,
}

/// Errors produced while loading or releasing media
///
/// Cloneable so that coalesced loads can hand the same failure to every
/// waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("aborted")]
    Aborted,
    #[error("load failed: {0}")]
    NetworkOrDecode(String),
    #[error("cleanup did not finish within {0:?}")]
    CleanupTimeout(Duration),
    #[error("cache bookkeeping: {0}")]
    CacheEvictionInternal(String),
}

impl MediaError {
    /// The failure category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            MediaError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            MediaError::Timeout(_) => ErrorKind::Timeout,
            MediaError::Aborted => ErrorKind::Aborted,
            MediaError::NetworkOrDecode(_) => ErrorKind::NetworkOrDecodeError,
            MediaError::CleanupTimeout(_) => ErrorKind::CleanupTimeout,
            MediaError::CacheEvictionInternal(_) => ErrorKind::CacheEvictionInternal,
        }
    }

    /// Whether a retry could plausibly succeed
    ///
    /// Validation failures and caller cancellation are final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MediaError::Timeout(_) | MediaError::NetworkOrDecode(_))
    }
}

/// Result alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(MediaError::InvalidUrl("x".into()).kind(), ErrorKind::InvalidUrl);
        assert_eq!(
            MediaError::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(MediaError::Aborted.kind(), ErrorKind::Aborted);
        assert_eq!(
            MediaError::NetworkOrDecode("404".into()).kind(),
            ErrorKind::NetworkOrDecodeError
        );
    }

    #[test]
    fn test_retryable() {
        assert!(MediaError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(MediaError::NetworkOrDecode("reset".into()).is_retryable());
        assert!(!MediaError::Aborted.is_retryable());
        assert!(!MediaError::InvalidUrl("ftp://x".into()).is_retryable());
    }

    #[test]
    fn test_kind_serializes_camel_case() {
        let json = serde_json::to_string(&ErrorKind::NetworkOrDecodeError).unwrap();
        assert_eq!(json, "\"networkOrDecodeError\"");
    }
}
