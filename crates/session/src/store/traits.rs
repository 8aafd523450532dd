//! Token store trait definition

use crate::error::AuthError;
use crate::models::Session;

/// Trait for durable persistence of the single current session.
///
/// Implementations must make `save` atomic: after a crash, `load` observes
/// either the previous record or the new one, never a partial write. IO
/// failures surface as [`AuthError::StorageUnavailable`] with no internal
/// retry.
pub trait TokenStore: Send + Sync {
    /// Persist the session, replacing any previous record.
    fn save(&self, session: &Session) -> Result<(), AuthError>;

    /// Load the persisted session, or `None` if no record exists.
    fn load(&self) -> Result<Option<Session>, AuthError>;

    /// Remove the persisted record. Clearing an empty store is not an error.
    fn clear(&self) -> Result<(), AuthError>;
}
