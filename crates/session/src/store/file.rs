//! File-backed token store
//!
//! Persists the session as a single JSON record under the Gymfreek config
//! directory. Writes go through the atomic save helper so the record is
//! crash-safe.

use std::fs;
use std::path::PathBuf;

use crate::error::AuthError;
use crate::models::Session;
use crate::store::TokenStore;

/// Session record filename in the Gymfreek config directory
const TOKEN_FILE: &str = "session-token.json";

/// Token store backed by one JSON file.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Create a store at the default location
    /// (~/.config/gymfreek/session-token.json).
    pub fn new() -> Result<Self, AuthError> {
        let path = config::config_path(TOKEN_FILE).ok_or_else(|| AuthError::StorageUnavailable {
            reason: "could not determine config directory".to_string(),
        })?;
        Ok(Self { path })
    }

    /// Create a store at an explicit path (tests, platform shells with
    /// their own data directories).
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The path the record is stored at.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn storage_err(&self, err: impl std::fmt::Display) -> AuthError {
        AuthError::StorageUnavailable {
            reason: format!("{}: {}", self.path.display(), err),
        }
    }
}

impl TokenStore for FileTokenStore {
    fn save(&self, session: &Session) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.storage_err(e))?;
        }
        config::write_json_atomic(&self.path, session).map_err(|e| self.storage_err(e))
    }

    fn load(&self) -> Result<Option<Session>, AuthError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.storage_err(e)),
        };

        let session: Session =
            serde_json::from_str(&content).map_err(|e| self.storage_err(e))?;
        Ok(Some(session))
    }

    fn clear(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.storage_err(e)),
        }
    }
}
