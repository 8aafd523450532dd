//! Queued remote-store operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of remote document operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Read,
    Write,
    Delete,
}

/// A remote-store operation captured while no valid session was available.
///
/// Queued operations replay in FIFO order once the process signs in.
/// Payloads are opaque to this crate; the remote client encodes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub kind: OperationKind,
    /// Logical document key, e.g. "workouts/2024-03-01"
    pub key: String,
    /// Document body for writes; absent for reads and deletes
    pub payload: Option<Vec<u8>>,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedOperation {
    /// Capture a read of `key`.
    pub fn read(key: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Read,
            key: key.into(),
            payload: None,
            enqueued_at: Utc::now(),
        }
    }

    /// Capture a write of `payload` to `key`.
    pub fn write(key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            kind: OperationKind::Write,
            key: key.into(),
            payload: Some(payload),
            enqueued_at: Utc::now(),
        }
    }

    /// Capture a delete of `key`.
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Delete,
            key: key.into(),
            payload: None,
            enqueued_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let read = QueuedOperation::read("workouts/w1");
        assert_eq!(read.kind, OperationKind::Read);
        assert!(read.payload.is_none());

        let write = QueuedOperation::write("workouts/w1", b"sets: 3".to_vec());
        assert_eq!(write.kind, OperationKind::Write);
        assert_eq!(write.payload.as_deref(), Some(b"sets: 3".as_slice()));

        let delete = QueuedOperation::delete("workouts/w1");
        assert_eq!(delete.kind, OperationKind::Delete);
        assert!(delete.payload.is_none());
    }

    #[test]
    fn test_serialization_round_trip() {
        let op = QueuedOperation::write("workouts/w1", vec![1, 2, 3]);
        let json = serde_json::to_string(&op).unwrap();
        let decoded: QueuedOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(op, decoded);
    }
}
