//! Session crate - Auth session and sync-gate logic for Gymfreek
//!
//! This crate provides platform-independent session functionality including:
//! - Domain models (Session, AuthState, QueuedOperation)
//! - Google OAuth credential provider
//! - Token store trait abstractions with atomic on-disk persistence
//! - Auth session coordinator (sign-in, restore, refresh, sign-out)
//! - Sync gate with bounded offline queue and replay
//!
//! This crate has zero UI dependencies; the coordinator and gate are the
//! process-wide authorities a frontend subscribes to.

pub mod auth;
pub mod backoff;
pub mod credentials;
pub mod error;
pub mod gate;
pub mod models;
pub mod provider;
pub mod remote;
pub mod store;

pub use auth::{AuthSessionCoordinator, AuthStateListener};
pub use backoff::{Backoff, retry_with_backoff};
pub use credentials::GoogleCredentials;
pub use error::{AuthError, AuthErrorKind};
pub use gate::{DEFAULT_QUEUE_CAPACITY, SubmitOutcome, SyncGate};
pub use models::{
    AuthState, DEFAULT_REFRESH_SKEW_SECS, OperationKind, QueuedOperation, Session,
};
pub use provider::{Credential, CredentialProvider, GoogleCredentialProvider, StaticCredentialProvider};
pub use remote::{HttpRemoteStore, InMemoryRemoteStore, RemoteError, RemoteStore};
pub use store::{FileTokenStore, InMemoryTokenStore, TokenStore};
