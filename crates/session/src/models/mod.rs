//! Domain models for the session crate

mod operation;
mod session;
mod state;

pub use operation::{OperationKind, QueuedOperation};
pub use session::{DEFAULT_REFRESH_SKEW_SECS, Session};
pub use state::AuthState;
