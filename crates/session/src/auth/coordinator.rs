//! Authentication session coordinator
//!
//! Single source of truth for the process-wide authentication state.
//! State transitions are mutually exclusive: only one sign-in or refresh
//! runs at a time, and concurrent callers share the in-flight outcome
//! instead of starting a duplicate provider call. Provider calls run
//! outside the state lock, so they may block the calling thread but never
//! the whole process.

use std::sync::{Arc, Condvar, Mutex, Weak};

use chrono::{Duration, Utc};
use log::{debug, info, warn};

use crate::error::{AuthError, AuthErrorKind};
use crate::models::{AuthState, DEFAULT_REFRESH_SKEW_SECS, Session};
use crate::provider::{Credential, CredentialProvider};
use crate::store::TokenStore;

/// Observer of committed authentication state transitions.
///
/// Listeners are invoked after every committed transition, outside the
/// coordinator's state lock, in subscription order. They are held weakly,
/// so a subscriber may itself hold the coordinator.
pub trait AuthStateListener: Send + Sync {
    fn on_auth_state(&self, state: &AuthState);
}

struct CoordinatorInner {
    state: AuthState,
    /// True while a sign-in or refresh is executing against the provider
    in_flight: bool,
    /// The error behind the current `AuthState::Error`, for callers that
    /// joined an in-flight attempt and need the full error back
    last_error: Option<AuthError>,
}

/// Owner of the authentication state machine.
///
/// Pass an explicit handle to every consumer; there is no ambient
/// singleton. Startup goes through [`AuthSessionCoordinator::restore`],
/// teardown through [`AuthSessionCoordinator::sign_out`].
pub struct AuthSessionCoordinator {
    provider: Arc<dyn CredentialProvider>,
    token_store: Arc<dyn TokenStore>,
    inner: Mutex<CoordinatorInner>,
    settled: Condvar,
    listeners: Mutex<Vec<Weak<dyn AuthStateListener>>>,
    skew: Duration,
}

impl AuthSessionCoordinator {
    /// Create a coordinator in the `SignedOut` state with the default
    /// refresh skew (60 seconds).
    pub fn new(
        provider: Arc<dyn CredentialProvider>,
        token_store: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            provider,
            token_store,
            inner: Mutex::new(CoordinatorInner {
                state: AuthState::SignedOut,
                in_flight: false,
                last_error: None,
            }),
            settled: Condvar::new(),
            listeners: Mutex::new(Vec::new()),
            skew: Duration::seconds(DEFAULT_REFRESH_SKEW_SECS),
        }
    }

    /// Set the refresh skew: how long before expiry a token counts as
    /// needing a refresh.
    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    /// Register a state listener.
    pub fn subscribe(&self, listener: Weak<dyn AuthStateListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    /// The current authentication state.
    pub fn state(&self) -> AuthState {
        self.inner.lock().unwrap().state.clone()
    }

    /// The current session, only while fully signed in.
    ///
    /// Returns `None` during a refresh; gated operations must wait for the
    /// refresh outcome rather than forward a token about to expire.
    pub fn current_session(&self) -> Option<Session> {
        match &self.inner.lock().unwrap().state {
            AuthState::SignedIn(session) => Some(session.clone()),
            _ => None,
        }
    }

    /// Adopt a persisted session at startup.
    ///
    /// An unexpired record becomes the live `SignedIn` session; an expired
    /// one is discarded and purged from the store. Does nothing if a
    /// sign-in already happened.
    pub fn restore(&self) -> Result<Option<Session>, AuthError> {
        let loaded = self.token_store.load()?;

        let Some(session) = loaded else {
            return Ok(None);
        };

        if session.is_expired(Utc::now()) {
            info!("Discarding expired persisted session for {}", session.user_id);
            self.token_store.clear()?;
            return Ok(None);
        }

        {
            let mut inner = self.inner.lock().unwrap();
            if inner.in_flight || !matches!(inner.state, AuthState::SignedOut) {
                // A sign-in raced ahead of restore; keep its result
                return Ok(None);
            }
            inner.state = AuthState::SignedIn(session.clone());
        }

        info!("Restored session for {}", session.user_id);
        self.notify(&AuthState::SignedIn(session.clone()));
        Ok(Some(session))
    }

    /// Sign in with a credential from the platform sign-in flow.
    ///
    /// On success the session is persisted and subscribers are notified.
    /// A provider timeout reverts to `SignedOut` for the caller to retry
    /// with backoff; a rejected credential lands in `Error`, from which a
    /// fresh `sign_in` retries from scratch.
    pub fn sign_in(&self, credential: &Credential) -> Result<Session, AuthError> {
        {
            let mut inner = self.inner.lock().unwrap();

            // Share the outcome of an attempt that is already in flight
            // instead of starting a duplicate.
            while inner.in_flight {
                inner = self.settled.wait(inner).unwrap();
                match &inner.state {
                    AuthState::SignedIn(session) => return Ok(session.clone()),
                    AuthState::Error(kind) => return Err(Self::joined_error(&inner, *kind)),
                    // A sign-out raced in; fall through and attempt our own
                    _ => {}
                }
            }

            if let AuthState::SignedIn(session) = &inner.state {
                debug!("sign_in called while already signed in");
                return Ok(session.clone());
            }

            inner.state = AuthState::SigningIn;
            inner.in_flight = true;
        }
        self.notify(&AuthState::SigningIn);
        info!("Signing in");

        let result = self.provider.exchange(credential);
        let outcome = match result {
            Ok(session) => match self.token_store.save(&session) {
                Ok(()) => {
                    info!("Signed in as {}", session.user_id);
                    Ok(session)
                }
                Err(err) => {
                    warn!("Sign-in succeeded but session could not be persisted: {}", err);
                    Err(err)
                }
            },
            Err(err @ AuthError::NetworkTimeout { .. }) => {
                warn!("Sign-in timed out; reverting to signed-out");
                Err(err)
            }
            Err(err) => {
                warn!("Sign-in failed: {}", err);
                Err(err)
            }
        };

        self.settle(|inner| match &outcome {
            Ok(session) => {
                inner.state = AuthState::SignedIn(session.clone());
                inner.last_error = None;
            }
            Err(err @ AuthError::NetworkTimeout { .. }) => {
                // Revert to the pre-attempt state; the caller retries
                inner.state = AuthState::SignedOut;
                inner.last_error = Some(err.clone());
            }
            Err(err) => {
                inner.state = AuthState::Error(err.kind());
                inner.last_error = Some(err.clone());
            }
        });
        outcome
    }

    /// Sign out, purging the persisted session.
    ///
    /// Pending gated operations stay queued for the next sign-in unless
    /// the gate is explicitly cleared. Any in-flight transition settles
    /// first.
    pub fn sign_out(&self) -> Result<(), AuthError> {
        {
            let mut inner = self.inner.lock().unwrap();
            while inner.in_flight {
                inner = self.settled.wait(inner).unwrap();
            }
            if matches!(inner.state, AuthState::SignedOut) {
                return Ok(());
            }
            inner.state = AuthState::SignedOut;
            inner.last_error = None;
        }

        info!("Signed out");
        let purged = self.token_store.clear();
        self.notify(&AuthState::SignedOut);
        purged
    }

    /// Refresh the token if it is inside the refresh window.
    ///
    /// Called before any gated operation. Returns `Ok(true)` when a
    /// refresh ran, `Ok(false)` when none was needed (including when not
    /// signed in at all). On a provider timeout the old token stays live
    /// if it has not expired yet; otherwise the state degrades to `Error`.
    pub fn refresh_if_needed(&self) -> Result<bool, AuthError> {
        let old = {
            let mut inner = self.inner.lock().unwrap();
            while inner.in_flight {
                inner = self.settled.wait(inner).unwrap();
            }

            match &inner.state {
                AuthState::SignedIn(session)
                    if session.needs_refresh(Utc::now(), self.skew) =>
                {
                    let old = session.clone();
                    inner.state = AuthState::Refreshing(old.clone());
                    inner.in_flight = true;
                    old
                }
                _ => return Ok(false),
            }
        };
        self.notify(&AuthState::Refreshing(old.clone()));
        debug!("Token for {} inside refresh window; refreshing", old.user_id);

        let result = self.provider.refresh(&old);
        let outcome = match result {
            Ok(session) => match self.token_store.save(&session) {
                Ok(()) => {
                    info!("Refreshed token for {}", session.user_id);
                    Ok(session)
                }
                Err(err) => {
                    warn!("Refresh succeeded but session could not be persisted: {}", err);
                    Err(err)
                }
            },
            Err(err) => {
                warn!("Token refresh failed: {}", err);
                Err(err)
            }
        };

        let result = match &outcome {
            Ok(_) => Ok(true),
            Err(err) => Err(err.clone()),
        };

        self.settle(|inner| match outcome {
            Ok(session) => {
                inner.state = AuthState::SignedIn(session);
                inner.last_error = None;
            }
            Err(err @ AuthError::NetworkTimeout { .. }) => {
                if old.is_expired(Utc::now()) {
                    inner.state = AuthState::Error(AuthErrorKind::RefreshFailed);
                } else {
                    // The old token is still usable; revert and let the
                    // caller retry the refresh with backoff
                    inner.state = AuthState::SignedIn(old.clone());
                }
                inner.last_error = Some(err);
            }
            Err(err) => {
                inner.state = AuthState::Error(err.kind());
                inner.last_error = Some(err);
            }
        });
        result
    }

    /// Commit a settled transition: mutate state under the lock, wake
    /// callers sharing the outcome, then notify listeners.
    fn settle(&self, commit: impl FnOnce(&mut CoordinatorInner)) {
        let state = {
            let mut inner = self.inner.lock().unwrap();
            commit(&mut inner);
            inner.in_flight = false;
            inner.state.clone()
        };
        self.settled.notify_all();
        self.notify(&state);
    }

    fn joined_error(inner: &CoordinatorInner, kind: AuthErrorKind) -> AuthError {
        inner.last_error.clone().unwrap_or(AuthError::CredentialRejected {
            reason: format!("shared sign-in attempt failed: {}", kind),
        })
    }

    fn notify(&self, state: &AuthState) {
        let listeners: Vec<_> = {
            let mut guard = self.listeners.lock().unwrap();
            guard.retain(|weak| weak.strong_count() > 0);
            guard.iter().filter_map(|weak| weak.upgrade()).collect()
        };
        debug!("Auth state is now {} ({} listeners)", state.label(), listeners.len());
        for listener in listeners {
            listener.on_auth_state(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticCredentialProvider;
    use crate::store::{InMemoryTokenStore, TokenStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn code() -> Credential {
        Credential::AuthorizationCode {
            code: "auth-code".to_string(),
            redirect_uri: "http://localhost:8080".to_string(),
        }
    }

    /// Coordinator wired to scriptable doubles, with shared handles to them.
    struct Harness {
        coordinator: Arc<AuthSessionCoordinator>,
        provider: Arc<StaticCredentialProvider>,
        token_store: Arc<InMemoryTokenStore>,
    }

    fn harness() -> Harness {
        let provider = Arc::new(StaticCredentialProvider::new("user-1"));
        let token_store = Arc::new(InMemoryTokenStore::new());
        let coordinator = Arc::new(AuthSessionCoordinator::new(
            provider.clone(),
            token_store.clone(),
        ));
        Harness {
            coordinator,
            provider,
            token_store,
        }
    }

    /// Records the sequence of observed state labels.
    struct RecordingListener {
        seen: Mutex<Vec<&'static str>>,
    }

    impl RecordingListener {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }
        fn labels(&self) -> Vec<&'static str> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl AuthStateListener for RecordingListener {
        fn on_auth_state(&self, state: &AuthState) {
            self.seen.lock().unwrap().push(state.label());
        }
    }

    #[test]
    fn test_sign_in_success_transitions_and_persists() {
        let h = harness();
        let listener = RecordingListener::new();
        h.coordinator
            .subscribe(Arc::downgrade(&listener) as Weak<dyn AuthStateListener>);

        let session = h.coordinator.sign_in(&code()).unwrap();

        assert!(h.coordinator.state().is_signed_in());
        assert_eq!(h.coordinator.current_session(), Some(session.clone()));
        assert_eq!(h.token_store.load().unwrap(), Some(session));
        assert_eq!(listener.labels(), vec!["signing-in", "signed-in"]);
    }

    #[test]
    fn test_sign_in_rejection_is_non_terminal() {
        let h = harness();
        h.provider.fail_next_exchange(AuthError::CredentialRejected {
            reason: "bad code".to_string(),
        });

        let err = h.coordinator.sign_in(&code()).unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::CredentialRejected);
        assert_eq!(
            h.coordinator.state(),
            AuthState::Error(AuthErrorKind::CredentialRejected)
        );

        // A fresh sign-in retries from scratch
        h.coordinator.sign_in(&code()).unwrap();
        assert!(h.coordinator.state().is_signed_in());
    }

    #[test]
    fn test_sign_in_timeout_reverts_to_signed_out() {
        let h = harness();
        h.provider.fail_next_exchange(AuthError::NetworkTimeout {
            endpoint: "token".to_string(),
        });

        let err = h.coordinator.sign_in(&code()).unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::NetworkTimeout);
        assert_eq!(h.coordinator.state(), AuthState::SignedOut);
    }

    #[test]
    fn test_sign_in_when_already_signed_in_is_noop() {
        let h = harness();
        let first = h.coordinator.sign_in(&code()).unwrap();
        let second = h.coordinator.sign_in(&code()).unwrap();

        assert_eq!(first, second);
        assert_eq!(h.provider.exchange_calls(), 1);
    }

    #[test]
    fn test_storage_failure_fails_sign_in() {
        let h = harness();
        h.token_store.set_unavailable(true);

        let err = h.coordinator.sign_in(&code()).unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::StorageUnavailable);
        assert_eq!(
            h.coordinator.state(),
            AuthState::Error(AuthErrorKind::StorageUnavailable)
        );
    }

    #[test]
    fn test_sign_out_purges_store() {
        let h = harness();
        h.coordinator.sign_in(&code()).unwrap();
        assert!(h.token_store.load().unwrap().is_some());

        h.coordinator.sign_out().unwrap();
        assert_eq!(h.coordinator.state(), AuthState::SignedOut);
        assert_eq!(h.token_store.load().unwrap(), None);
    }

    #[test]
    fn test_refresh_not_needed_for_fresh_token() {
        let h = harness();
        h.coordinator.sign_in(&code()).unwrap();

        assert!(!h.coordinator.refresh_if_needed().unwrap());
        assert_eq!(h.provider.refresh_calls(), 0);
    }

    #[test]
    fn test_refresh_inside_skew_window() {
        let h = harness();
        // 30s TTL with the default 60s skew puts the token inside the
        // refresh window immediately after sign-in.
        h.provider.set_ttl(Duration::seconds(30));
        let old = h.coordinator.sign_in(&code()).unwrap();

        h.provider.set_ttl(Duration::minutes(30));
        assert!(h.coordinator.refresh_if_needed().unwrap());
        assert_eq!(h.provider.refresh_calls(), 1);

        let current = h.coordinator.current_session().unwrap();
        assert_ne!(current.token, old.token);
        // The refreshed session is also persisted
        assert_eq!(h.token_store.load().unwrap(), Some(current));
    }

    #[test]
    fn test_refresh_failure_degrades_to_error() {
        let h = harness();
        h.provider.set_ttl(Duration::seconds(30));
        h.coordinator.sign_in(&code()).unwrap();

        h.provider.fail_next_refresh(AuthError::RefreshFailed {
            reason: "revoked".to_string(),
        });
        let err = h.coordinator.refresh_if_needed().unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::RefreshFailed);
        assert_eq!(
            h.coordinator.state(),
            AuthState::Error(AuthErrorKind::RefreshFailed)
        );
        assert_eq!(h.coordinator.current_session(), None);
    }

    #[test]
    fn test_refresh_timeout_keeps_valid_old_token() {
        let h = harness();
        // Inside the refresh window but not expired for a while
        h.provider.set_ttl(Duration::seconds(45));
        let old = h.coordinator.sign_in(&code()).unwrap();

        h.provider.fail_next_refresh(AuthError::NetworkTimeout {
            endpoint: "token".to_string(),
        });
        let err = h.coordinator.refresh_if_needed().unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::NetworkTimeout);

        // Reverted to the old session; the caller retries with backoff
        assert_eq!(h.coordinator.current_session(), Some(old));
    }

    #[test]
    fn test_refresh_timeout_with_expired_token_is_an_error() {
        let h = harness();
        h.provider.set_ttl(Duration::seconds(1));
        h.coordinator.sign_in(&code()).unwrap();

        // By the time the timed-out refresh settles, the old token has
        // expired and there is nothing to fall back to.
        h.provider.set_call_delay(std::time::Duration::from_millis(1200));
        h.provider.fail_next_refresh(AuthError::NetworkTimeout {
            endpoint: "token".to_string(),
        });

        let err = h.coordinator.refresh_if_needed().unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::NetworkTimeout);
        assert_eq!(
            h.coordinator.state(),
            AuthState::Error(AuthErrorKind::RefreshFailed)
        );
    }

    #[test]
    fn test_concurrent_sign_in_shares_outcome() {
        let h = harness();
        h.provider.set_call_delay(std::time::Duration::from_millis(200));

        let coordinator = h.coordinator.clone();
        let racer = std::thread::spawn(move || coordinator.sign_in(&code()));

        // Let the first attempt reach the provider, then join it
        std::thread::sleep(std::time::Duration::from_millis(50));
        let second = h.coordinator.sign_in(&code()).unwrap();
        let first = racer.join().unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(h.provider.exchange_calls(), 1);
    }

    #[test]
    fn test_restore_adopts_unexpired_session() {
        let h = harness();
        let now = Utc::now();
        let persisted =
            Session::new("user-1", "tok-old", now, now + Duration::minutes(20)).unwrap();
        h.token_store.save(&persisted).unwrap();

        let restored = h.coordinator.restore().unwrap();
        assert_eq!(restored, Some(persisted.clone()));
        assert_eq!(h.coordinator.current_session(), Some(persisted));
    }

    #[test]
    fn test_restore_discards_expired_session() {
        let h = harness();
        let issued = Utc::now() - Duration::hours(2);
        let expired = Session::new("user-1", "tok-old", issued, issued + Duration::hours(1))
            .unwrap();
        h.token_store.save(&expired).unwrap();

        assert_eq!(h.coordinator.restore().unwrap(), None);
        assert_eq!(h.coordinator.state(), AuthState::SignedOut);
        // The stale record is purged
        assert_eq!(h.token_store.load().unwrap(), None);
    }

    #[test]
    fn test_restore_with_empty_store() {
        let h = harness();
        assert_eq!(h.coordinator.restore().unwrap(), None);
        assert_eq!(h.coordinator.state(), AuthState::SignedOut);
    }

    #[test]
    fn test_dead_listeners_are_pruned() {
        let h = harness();
        let counter = Arc::new(AtomicUsize::new(0));

        struct CountingListener(Arc<AtomicUsize>);
        impl AuthStateListener for CountingListener {
            fn on_auth_state(&self, _state: &AuthState) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let listener = Arc::new(CountingListener(counter.clone()));
        h.coordinator
            .subscribe(Arc::downgrade(&listener) as Weak<dyn AuthStateListener>);

        h.coordinator.sign_in(&code()).unwrap();
        let seen = counter.load(Ordering::SeqCst);
        assert!(seen >= 2);

        drop(listener);
        h.coordinator.sign_out().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), seen);
    }
}
