//! The module contains the errors the engine can return.
//!
//! Remote failures are classified by [`RemoteError`]:
//!
//! - [`Network`] and [`Timeout`] are transient and retried.
//! - [`Auth`] suspends remote routing until re-authentication.
//! - [`NotFound`] is success for deletes and an error for updates.
//! - [`Validation`] is never retried.
//!
//!  [`Network`]: RemoteError::Network
//!  [`Timeout`]: RemoteError::Timeout
//!  [`Auth`]: RemoteError::Auth
//!  [`NotFound`]: RemoteError::NotFound
//!  [`Validation`]: RemoteError::Validation
use std::time::Duration;

use thiserror::Error;

/// Failures reported by a [`RemoteStore`](crate::RemoteStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Authorization rejected: {0}")]
    Auth(String),
    #[error("Row not found: {0}")]
    NotFound(String),
    #[error("Validation failed: {0}")]
    Validation(String),
}

impl RemoteError {
    /// Whether the call may succeed if issued again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network(_) | Self::Timeout(_) => FailureKind::Network,
            Self::Auth(_) => FailureKind::Auth,
            Self::NotFound(_) => FailureKind::NotFound,
            Self::Validation(_) => FailureKind::Validation,
        }
    }
}

/// Coarse classification carried by failure events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Auth,
    NotFound,
    Validation,
}

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("Remote writes are suspended while the ledger is locked")]
    Locked,
    #[error("Remote writes are suspended until re-authentication")]
    RemoteSuspended,
    #[error("\"{0}\" entity not found!")]
    EntityNotFound(String),
    #[error("Invalid target: {0}")]
    InvalidTarget(String),
    #[error("{0} change(s) still waiting for the remote store")]
    PendingChanges(usize),
    #[error("Invalid base url: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_failures_are_transient() {
        assert!(RemoteError::Network("reset".to_string()).is_transient());
        assert!(RemoteError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!RemoteError::Auth("expired".to_string()).is_transient());
        assert!(!RemoteError::NotFound("7".to_string()).is_transient());
        assert!(!RemoteError::Validation("name".to_string()).is_transient());
    }

    #[test]
    fn timeout_is_reported_as_network() {
        let err = RemoteError::Timeout(Duration::from_millis(10));
        assert_eq!(err.kind(), FailureKind::Network);
    }
}
