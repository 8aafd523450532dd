//! Authentication state machine variants

use crate::error::AuthErrorKind;
use crate::models::Session;

/// The authentication state of the process.
///
/// Driven only by the coordinator; everything else observes. Legal
/// transitions:
///
/// ```text
/// SignedOut --sign_in--> SigningIn --ok--> SignedIn
/// SigningIn --fail--> Error
/// SignedIn --expiry--> Refreshing --ok--> SignedIn
/// Refreshing --fail--> Error
/// any state --sign_out--> SignedOut
/// ```
///
/// Error is non-terminal: a fresh sign-in retries from scratch.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    /// No identity; gated operations queue.
    SignedOut,
    /// A sign-in attempt is in flight.
    SigningIn,
    /// Valid session; gated operations forward.
    SignedIn(Session),
    /// A token refresh is in flight; the embedded session is the old one.
    Refreshing(Session),
    /// The last sign-in or refresh failed.
    Error(AuthErrorKind),
}

impl AuthState {
    /// The session, if this state carries one.
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthState::SignedIn(session) | AuthState::Refreshing(session) => Some(session),
            _ => None,
        }
    }

    /// Whether gated operations may be forwarded right now.
    pub fn is_signed_in(&self) -> bool {
        matches!(self, AuthState::SignedIn(_))
    }

    /// Short label for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            AuthState::SignedOut => "signed-out",
            AuthState::SigningIn => "signing-in",
            AuthState::SignedIn(_) => "signed-in",
            AuthState::Refreshing(_) => "refreshing",
            AuthState::Error(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn make_session() -> Session {
        let now = Utc::now();
        Session::new("user-1", "tok-1", now, now + Duration::minutes(5)).unwrap()
    }

    #[test]
    fn test_session_accessor() {
        assert!(AuthState::SignedOut.session().is_none());
        assert!(AuthState::SigningIn.session().is_none());
        assert!(
            AuthState::Error(AuthErrorKind::RefreshFailed)
                .session()
                .is_none()
        );

        let session = make_session();
        assert_eq!(
            AuthState::SignedIn(session.clone()).session(),
            Some(&session)
        );
        assert_eq!(
            AuthState::Refreshing(session.clone()).session(),
            Some(&session)
        );
    }

    #[test]
    fn test_is_signed_in() {
        assert!(AuthState::SignedIn(make_session()).is_signed_in());
        // Refreshing still holds a session but must not forward operations
        assert!(!AuthState::Refreshing(make_session()).is_signed_in());
        assert!(!AuthState::SignedOut.is_signed_in());
    }

    #[test]
    fn test_labels() {
        assert_eq!(AuthState::SignedOut.label(), "signed-out");
        assert_eq!(AuthState::SignedIn(make_session()).label(), "signed-in");
    }
}
