//! Authenticated session model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Safety margin subtracted from token expiry to trigger proactive refresh.
///
/// Refreshing slightly early avoids racing the server clock on gated
/// operations that are about to be forwarded.
pub const DEFAULT_REFRESH_SKEW_SECS: i64 = 60;

/// An authenticated identity plus its token validity window.
///
/// At most one session is active per process; the coordinator owns the live
/// copy and the token store holds the durable one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque user identifier from the sign-in provider
    pub user_id: String,
    /// Opaque bearer token for the remote store
    pub token: String,
    /// When the token was issued
    pub issued_at: DateTime<Utc>,
    /// When the token stops being valid
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Create a session, validating that the token has a non-empty validity
    /// window (`expires_at > issued_at`).
    pub fn new(
        user_id: impl Into<String>,
        token: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        if expires_at <= issued_at {
            return Err(AuthError::CredentialRejected {
                reason: "token validity window is empty".to_string(),
            });
        }
        Ok(Self {
            user_id: user_id.into(),
            token: token.into(),
            issued_at,
            expires_at,
        })
    }

    /// Whether the token has passed its expiry at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the token is inside the refresh window at `now`.
    ///
    /// Returns true once `now >= expires_at - skew`, i.e. before the token
    /// actually expires, so gated operations refresh proactively.
    pub fn needs_refresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        now >= self.expires_at - skew
    }

    /// Remaining validity at `now`, zero if already expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}
