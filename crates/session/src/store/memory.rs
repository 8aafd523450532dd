//! In-memory token store
//!
//! Used for testing and as a stub on platforms whose native keystore
//! integration is not wired up yet.

use std::sync::RwLock;

use crate::error::AuthError;
use crate::models::Session;
use crate::store::TokenStore;

/// In-memory implementation of [`TokenStore`].
///
/// Holds the record behind an `RwLock`; optionally fails all operations to
/// simulate an unavailable persistence medium in tests.
pub struct InMemoryTokenStore {
    record: RwLock<Option<Session>>,
    unavailable: RwLock<bool>,
}

impl InMemoryTokenStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            record: RwLock::new(None),
            unavailable: RwLock::new(false),
        }
    }

    /// Make every subsequent operation fail with `StorageUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().unwrap() = unavailable;
    }

    fn check_available(&self) -> Result<(), AuthError> {
        if *self.unavailable.read().unwrap() {
            return Err(AuthError::StorageUnavailable {
                reason: "in-memory store marked unavailable".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for InMemoryTokenStore {
    fn save(&self, session: &Session) -> Result<(), AuthError> {
        self.check_available()?;
        *self.record.write().unwrap() = Some(session.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<Session>, AuthError> {
        self.check_available()?;
        Ok(self.record.read().unwrap().clone())
    }

    fn clear(&self) -> Result<(), AuthError> {
        self.check_available()?;
        *self.record.write().unwrap() = None;
        Ok(())
    }
}
