//! Authentication session coordination
//!
//! The coordinator owns the process-wide [`crate::AuthState`] and mediates
//! every token issuance and refresh.

mod coordinator;

pub use coordinator::{AuthSessionCoordinator, AuthStateListener};
