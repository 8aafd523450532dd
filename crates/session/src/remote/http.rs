//! HTTP document store client
//!
//! Talks to the backend's document API (Firestore-style REST) with the
//! coordinator's bearer token. Uses synchronous HTTP (ureq) to be
//! executor-agnostic. Payloads are opaque bytes, carried base64-encoded in
//! a small JSON envelope.

use std::time::Duration;

use base64::prelude::*;
use log::debug;
use serde::{Deserialize, Serialize};
use ureq::Agent;

use crate::remote::{RemoteError, RemoteStore};

/// JSON envelope for document bodies
#[derive(Debug, Serialize, Deserialize)]
struct DocumentBody {
    /// Base64-encoded opaque payload
    payload: String,
}

impl DocumentBody {
    fn encode(payload: &[u8]) -> Self {
        Self {
            payload: BASE64_STANDARD.encode(payload),
        }
    }

    fn decode(&self) -> Result<Vec<u8>, RemoteError> {
        BASE64_STANDARD
            .decode(&self.payload)
            .map_err(|e| RemoteError::Unavailable(format!("undecodable document body: {}", e)))
    }
}

/// Document store client over HTTP.
pub struct HttpRemoteStore {
    agent: Agent,
    base_url: String,
}

impl HttpRemoteStore {
    /// Create a client for the document API rooted at `base_url`, with a
    /// caller-configured request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = Agent::new_with_config(
            Agent::config_builder()
                .timeout_global(Some(timeout))
                .build(),
        );
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn document_url(&self, key: &str) -> String {
        // Keys are logical paths like "workouts/2024-03-01"; encode them so
        // they travel as a single path segment.
        format!("{}/documents/{}", self.base_url, urlencoding::encode(key))
    }
}

impl RemoteStore for HttpRemoteStore {
    fn read(&self, token: &str, key: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        let url = self.document_url(key);
        debug!("GET {}", url);

        let mut response = match self
            .agent
            .get(&url)
            .header("Authorization", &format!("Bearer {}", token))
            .call()
        {
            Ok(response) => response,
            Err(ureq::Error::StatusCode(404)) => return Ok(None),
            Err(e) => return Err(map_remote_error(e)),
        };

        let body: DocumentBody = response
            .body_mut()
            .read_json()
            .map_err(|e| RemoteError::Unavailable(format!("unreadable document: {}", e)))?;
        Ok(Some(body.decode()?))
    }

    fn write(&self, token: &str, key: &str, payload: &[u8]) -> Result<(), RemoteError> {
        let url = self.document_url(key);
        debug!("PUT {} ({} bytes)", url, payload.len());

        self.agent
            .put(&url)
            .header("Authorization", &format!("Bearer {}", token))
            .send_json(DocumentBody::encode(payload))
            .map_err(map_remote_error)?;
        Ok(())
    }

    fn delete(&self, token: &str, key: &str) -> Result<(), RemoteError> {
        let url = self.document_url(key);
        debug!("DELETE {}", url);

        match self
            .agent
            .delete(&url)
            .header("Authorization", &format!("Bearer {}", token))
            .call()
        {
            Ok(_) => Ok(()),
            // Deleting a document that is already gone is a success
            Err(ureq::Error::StatusCode(404)) => Ok(()),
            Err(e) => Err(map_remote_error(e)),
        }
    }
}

/// Map a ureq error onto the remote taxonomy.
fn map_remote_error(err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Timeout(_) => RemoteError::Timeout,
        ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => RemoteError::Timeout,
        ureq::Error::StatusCode(401) | ureq::Error::StatusCode(403) => RemoteError::Unauthorized,
        ureq::Error::StatusCode(code) => RemoteError::Unavailable(format!("HTTP {}", code)),
        other => RemoteError::Unavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_body_round_trip() {
        let body = DocumentBody::encode(b"reps: 12");
        let json = serde_json::to_string(&body).unwrap();
        let decoded: DocumentBody = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.decode().unwrap(), b"reps: 12".to_vec());
    }

    #[test]
    fn test_document_body_rejects_bad_base64() {
        let body = DocumentBody {
            payload: "%%%".to_string(),
        };
        assert!(body.decode().is_err());
    }

    #[test]
    fn test_document_url_encodes_key() {
        let store = HttpRemoteStore::new("https://api.example.com/v1/", Duration::from_secs(5));
        assert_eq!(
            store.document_url("workouts/2024-03-01"),
            "https://api.example.com/v1/documents/workouts%2F2024-03-01"
        );
    }
}
