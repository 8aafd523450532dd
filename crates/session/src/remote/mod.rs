//! Remote document store collaborators
//!
//! The sync gate forwards gated operations through the [`RemoteStore`]
//! trait. The real implementation is an HTTP document client; tests use the
//! in-memory store, which records the order operations were applied in.

mod http;

pub use http::HttpRemoteStore;

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::models::OperationKind;

/// Errors from the remote document store.
///
/// This is the collaborator's own taxonomy; the sync gate maps it onto
/// [`crate::AuthError`] at its boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
    /// The request timed out; the device is likely offline.
    #[error("Remote request timed out")]
    Timeout,

    /// The store rejected the bearer token.
    #[error("Remote request was not authorized")]
    Unauthorized,

    /// The store is reachable but failing (5xx, protocol error).
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
}

/// Trait for the remote document store.
///
/// The bearer token comes from the coordinator's current session on every
/// call, so a refresh mid-drain is picked up by the next operation.
pub trait RemoteStore: Send + Sync {
    /// Fetch a document, `None` if it does not exist.
    fn read(&self, token: &str, key: &str) -> Result<Option<Vec<u8>>, RemoteError>;

    /// Create or replace a document.
    fn write(&self, token: &str, key: &str, payload: &[u8]) -> Result<(), RemoteError>;

    /// Delete a document. Deleting a missing document is not an error.
    fn delete(&self, token: &str, key: &str) -> Result<(), RemoteError>;
}

/// In-memory implementation of [`RemoteStore`] for tests.
///
/// Keeps documents in a map and records every applied operation in order.
/// Can simulate an offline store or one that starts failing after N
/// operations.
pub struct InMemoryRemoteStore {
    documents: RwLock<HashMap<String, Vec<u8>>>,
    applied: Mutex<Vec<(OperationKind, String)>>,
    offline: AtomicBool,
    fail_after: Mutex<Option<usize>>,
}

impl InMemoryRemoteStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            applied: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
            fail_after: Mutex::new(None),
        }
    }

    /// Make every subsequent operation time out.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Let the next `n` operations succeed, then fail the rest.
    pub fn fail_after(&self, n: usize) {
        *self.fail_after.lock().unwrap() = Some(n);
    }

    /// Operations applied so far, in order.
    pub fn applied_ops(&self) -> Vec<(OperationKind, String)> {
        self.applied.lock().unwrap().clone()
    }

    /// Current document under `key`.
    pub fn document(&self, key: &str) -> Option<Vec<u8>> {
        self.documents.read().unwrap().get(key).cloned()
    }

    fn check_reachable(&self) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Timeout);
        }
        let mut budget = self.fail_after.lock().unwrap();
        if let Some(remaining) = budget.as_mut() {
            if *remaining == 0 {
                return Err(RemoteError::Unavailable("scripted failure".to_string()));
            }
            *remaining -= 1;
        }
        Ok(())
    }

    fn record(&self, kind: OperationKind, key: &str) {
        self.applied.lock().unwrap().push((kind, key.to_string()));
    }
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for InMemoryRemoteStore {
    fn read(&self, _token: &str, key: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        self.check_reachable()?;
        self.record(OperationKind::Read, key);
        Ok(self.documents.read().unwrap().get(key).cloned())
    }

    fn write(&self, _token: &str, key: &str, payload: &[u8]) -> Result<(), RemoteError> {
        self.check_reachable()?;
        self.record(OperationKind::Write, key);
        self.documents
            .write()
            .unwrap()
            .insert(key.to_string(), payload.to_vec());
        Ok(())
    }

    fn delete(&self, _token: &str, key: &str) -> Result<(), RemoteError> {
        self.check_reachable()?;
        self.record(OperationKind::Delete, key);
        self.documents.write().unwrap().remove(key);
        Ok(())
    }
}
