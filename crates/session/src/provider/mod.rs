//! Credential providers
//!
//! The credential provider is the boundary to the native sign-in layer: it
//! exchanges an opaque grant for a session and refreshes sessions that are
//! about to expire. The coordinator never retries provider calls itself;
//! callers apply their own backoff policy.

mod google;

pub use google::GoogleCredentialProvider;

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Duration, Utc};

use crate::error::AuthError;
use crate::models::Session;

/// An opaque grant obtained from the platform sign-in flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Credential {
    /// Authorization code from an OAuth redirect
    AuthorizationCode { code: String, redirect_uri: String },
    /// Long-lived refresh token from a previous grant
    RefreshToken { token: String },
}

/// Trait for exchanging and refreshing identity tokens.
pub trait CredentialProvider: Send + Sync {
    /// Exchange a fresh credential for a session.
    ///
    /// A rejected credential is fatal to this attempt only; network
    /// failures surface as [`AuthError::NetworkTimeout`] for the caller to
    /// retry with backoff.
    fn exchange(&self, credential: &Credential) -> Result<Session, AuthError>;

    /// Obtain a new token for an existing session.
    fn refresh(&self, session: &Session) -> Result<Session, AuthError>;
}

/// Deterministic provider for tests and local development.
///
/// Issues sequentially numbered tokens and records call counts. Failures
/// and artificial latency are scriptable per call.
pub struct StaticCredentialProvider {
    user_id: String,
    ttl: Mutex<Duration>,
    token_counter: AtomicU64,
    exchange_calls: AtomicU64,
    refresh_calls: AtomicU64,
    next_exchange_error: Mutex<Option<AuthError>>,
    next_refresh_error: Mutex<Option<AuthError>>,
    call_delay: Mutex<std::time::Duration>,
}

impl StaticCredentialProvider {
    /// Create a provider issuing tokens for `user_id` with a 30 minute TTL.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ttl: Mutex::new(Duration::minutes(30)),
            token_counter: AtomicU64::new(0),
            exchange_calls: AtomicU64::new(0),
            refresh_calls: AtomicU64::new(0),
            next_exchange_error: Mutex::new(None),
            next_refresh_error: Mutex::new(None),
            call_delay: Mutex::new(std::time::Duration::ZERO),
        }
    }

    /// Set the validity window of subsequently issued tokens.
    pub fn set_ttl(&self, ttl: Duration) {
        *self.ttl.lock().unwrap() = ttl;
    }

    /// Fail the next `exchange` call with `err`.
    pub fn fail_next_exchange(&self, err: AuthError) {
        *self.next_exchange_error.lock().unwrap() = Some(err);
    }

    /// Fail the next `refresh` call with `err`.
    pub fn fail_next_refresh(&self, err: AuthError) {
        *self.next_refresh_error.lock().unwrap() = Some(err);
    }

    /// Sleep this long inside each provider call (for concurrency tests).
    pub fn set_call_delay(&self, delay: std::time::Duration) {
        *self.call_delay.lock().unwrap() = delay;
    }

    /// How many times `exchange` has been called.
    pub fn exchange_calls(&self) -> u64 {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    /// How many times `refresh` has been called.
    pub fn refresh_calls(&self) -> u64 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn issue(&self, user_id: &str) -> Result<Session, AuthError> {
        let n = self.token_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        Session::new(user_id, format!("tok-{}", n), now, now + *self.ttl.lock().unwrap())
    }

    fn pause(&self) {
        let delay = *self.call_delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn exchange(&self, _credential: &Credential) -> Result<Session, AuthError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        self.pause();
        if let Some(err) = self.next_exchange_error.lock().unwrap().take() {
            return Err(err);
        }
        self.issue(&self.user_id)
    }

    fn refresh(&self, session: &Session) -> Result<Session, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.pause();
        if let Some(err) = self.next_refresh_error.lock().unwrap().take() {
            return Err(err);
        }
        self.issue(&session.user_id)
    }
}
