//! Error taxonomy for the session crate
//!
//! Typed errors cross the public API boundary so platform shells can map
//! them to user-facing behavior (re-authentication prompts, retry banners).
//! Peripheral config/IO plumbing keeps using `anyhow` internally.

use serde::{Deserialize, Serialize};

/// Errors surfaced by the coordinator, sync gate, and token store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    /// The sign-in provider rejected the supplied credential.
    /// Fatal to this attempt only; a fresh sign-in may succeed.
    #[error("Credential rejected: {reason}")]
    CredentialRejected { reason: String },

    /// A token refresh failed and the prior session is no longer usable.
    #[error("Token refresh failed: {reason}")]
    RefreshFailed { reason: String },

    /// The token store could not read or write the session record.
    /// Never retried internally, so data loss is not masked.
    #[error("Session storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    /// The pending-operation queue was at capacity; the oldest entry was
    /// dropped to make room.
    #[error("Pending queue overflow: dropped oldest operation for key {dropped_key}")]
    QueueOverflow { dropped_key: String },

    /// A call to the credential provider or remote store timed out.
    #[error("Network timeout contacting {endpoint}")]
    NetworkTimeout { endpoint: String },
}

impl AuthError {
    /// The coarse category of this error, suitable for embedding in
    /// [`crate::AuthState::Error`] and for retry decisions.
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::CredentialRejected { .. } => AuthErrorKind::CredentialRejected,
            AuthError::RefreshFailed { .. } => AuthErrorKind::RefreshFailed,
            AuthError::StorageUnavailable { .. } => AuthErrorKind::StorageUnavailable,
            AuthError::QueueOverflow { .. } => AuthErrorKind::QueueOverflow,
            AuthError::NetworkTimeout { .. } => AuthErrorKind::NetworkTimeout,
        }
    }

    /// Whether a caller-driven retry with backoff can reasonably succeed.
    ///
    /// Rejected credentials and storage failures need user or operator
    /// intervention; timeouts and refresh failures are transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::RefreshFailed { .. } | AuthError::NetworkTimeout { .. }
        )
    }
}

/// Payload-free error category, kept in [`crate::AuthState::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthErrorKind {
    CredentialRejected,
    RefreshFailed,
    StorageUnavailable,
    QueueOverflow,
    NetworkTimeout,
}

impl std::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AuthErrorKind::CredentialRejected => "credential-rejected",
            AuthErrorKind::RefreshFailed => "refresh-failed",
            AuthErrorKind::StorageUnavailable => "storage-unavailable",
            AuthErrorKind::QueueOverflow => "queue-overflow",
            AuthErrorKind::NetworkTimeout => "network-timeout",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = AuthError::CredentialRejected {
            reason: "bad code".to_string(),
        };
        assert_eq!(err.kind(), AuthErrorKind::CredentialRejected);

        let err = AuthError::NetworkTimeout {
            endpoint: "token".to_string(),
        };
        assert_eq!(err.kind(), AuthErrorKind::NetworkTimeout);
    }

    #[test]
    fn test_retryable() {
        assert!(
            AuthError::RefreshFailed {
                reason: "503".to_string()
            }
            .is_retryable()
        );
        assert!(
            AuthError::NetworkTimeout {
                endpoint: "docs".to_string()
            }
            .is_retryable()
        );
        assert!(
            !AuthError::CredentialRejected {
                reason: "expired".to_string()
            }
            .is_retryable()
        );
        assert!(
            !AuthError::StorageUnavailable {
                reason: "read-only fs".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_display() {
        let err = AuthError::QueueOverflow {
            dropped_key: "workouts/w1".to_string(),
        };
        assert!(err.to_string().contains("workouts/w1"));
        assert_eq!(AuthErrorKind::RefreshFailed.to_string(), "refresh-failed");
    }
}
