//! Sync gate for remote document operations
//!
//! Serializes access to the remote store behind a valid session. While the
//! process is signed out or offline, operations queue in FIFO order and
//! replay on the next transition into `SignedIn`. The queue is bounded;
//! overflow drops the oldest entry with a warning, never a crash.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use log::{debug, info, warn};

use crate::auth::{AuthSessionCoordinator, AuthStateListener};
use crate::error::AuthError;
use crate::models::{AuthState, OperationKind, QueuedOperation};
use crate::remote::{RemoteError, RemoteStore};

/// Default bound on the pending-operation queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 500;

/// Result of submitting a gated operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Forwarded to the remote store; carries the document for reads
    Applied(Option<Vec<u8>>),
    /// Captured for later replay; `pending` is the queue depth afterwards
    Queued { pending: usize },
}

/// Gatekeeper between callers and the remote document store.
///
/// Construction subscribes the gate to the coordinator, so a transition
/// into `SignedIn` starts a background replay of the pending queue and a
/// sign-out cancels it after the in-flight operation completes.
pub struct SyncGate {
    coordinator: Arc<AuthSessionCoordinator>,
    remote: Arc<dyn RemoteStore>,
    capacity: usize,
    queue: Mutex<VecDeque<QueuedOperation>>,
    /// Cancel flag of the currently running drain, if any
    drain_cancel: Mutex<Option<Arc<AtomicBool>>>,
    /// Back-reference for spawning the drain thread from listener context
    self_ref: OnceLock<Weak<SyncGate>>,
}

impl SyncGate {
    /// Create a gate with the default queue capacity.
    pub fn new(
        coordinator: Arc<AuthSessionCoordinator>,
        remote: Arc<dyn RemoteStore>,
    ) -> Arc<Self> {
        Self::with_capacity(coordinator, remote, DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a gate with an explicit queue capacity (minimum 1).
    pub fn with_capacity(
        coordinator: Arc<AuthSessionCoordinator>,
        remote: Arc<dyn RemoteStore>,
        capacity: usize,
    ) -> Arc<Self> {
        let gate = Arc::new(Self {
            coordinator: coordinator.clone(),
            remote,
            capacity: capacity.max(1),
            queue: Mutex::new(VecDeque::new()),
            drain_cancel: Mutex::new(None),
            self_ref: OnceLock::new(),
        });
        let _ = gate.self_ref.set(Arc::downgrade(&gate));
        coordinator.subscribe(Arc::downgrade(&gate) as Weak<dyn AuthStateListener>);
        gate
    }

    /// Submit a gated operation.
    ///
    /// Refreshes the token first if it is inside the refresh window. With
    /// a valid session the operation forwards immediately; otherwise (or
    /// when the store is unreachable) it queues for replay. Overflow
    /// surfaces as [`AuthError::QueueOverflow`] after dropping the oldest
    /// entry; the submitted operation itself is still queued.
    pub fn submit(&self, op: QueuedOperation) -> Result<SubmitOutcome, AuthError> {
        if let Err(err) = self.coordinator.refresh_if_needed() {
            debug!("Refresh before gated operation failed: {}", err);
        }

        let Some(session) = self.coordinator.current_session() else {
            debug!("Not signed in; queueing {:?} for {}", op.kind, op.key);
            return self.enqueue(op);
        };

        match self.apply(&session.token, &op) {
            Ok(result) => Ok(SubmitOutcome::Applied(result)),
            Err(RemoteError::Unauthorized) => Err(AuthError::CredentialRejected {
                reason: "remote store rejected the session token".to_string(),
            }),
            Err(err) => {
                warn!(
                    "Remote store unreachable ({}); queueing {:?} for {}",
                    err, op.kind, op.key
                );
                self.enqueue(op)
            }
        }
    }

    /// Number of operations waiting for replay.
    pub fn pending_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Discard all pending operations.
    ///
    /// Sign-out keeps the queue for the next sign-in; this is the explicit
    /// opt-out.
    pub fn clear_pending(&self) {
        let mut queue = self.queue.lock().unwrap();
        if !queue.is_empty() {
            info!("Discarding {} pending operations", queue.len());
            queue.clear();
        }
    }

    fn enqueue(&self, op: QueuedOperation) -> Result<SubmitOutcome, AuthError> {
        let mut queue = self.queue.lock().unwrap();
        if queue.len() >= self.capacity {
            // pop_front cannot fail here: capacity is at least 1
            let dropped = queue.pop_front().unwrap();
            queue.push_back(op);
            warn!(
                "Pending queue at capacity ({}); dropped oldest operation for {}",
                self.capacity, dropped.key
            );
            return Err(AuthError::QueueOverflow {
                dropped_key: dropped.key,
            });
        }
        queue.push_back(op);
        Ok(SubmitOutcome::Queued {
            pending: queue.len(),
        })
    }

    fn apply(&self, token: &str, op: &QueuedOperation) -> Result<Option<Vec<u8>>, RemoteError> {
        match op.kind {
            OperationKind::Read => self.remote.read(token, &op.key),
            OperationKind::Write => {
                let payload = op.payload.as_deref().unwrap_or(&[]);
                self.remote.write(token, &op.key, payload)?;
                Ok(None)
            }
            OperationKind::Delete => {
                self.remote.delete(token, &op.key)?;
                Ok(None)
            }
        }
    }

    fn start_drain(&self) {
        if self.queue.lock().unwrap().is_empty() {
            return;
        }

        let cancel = {
            let mut slot = self.drain_cancel.lock().unwrap();
            if slot.is_some() {
                return; // a drain is already running
            }
            let cancel = Arc::new(AtomicBool::new(false));
            *slot = Some(cancel.clone());
            cancel
        };

        let Some(gate) = self.self_ref.get().and_then(|weak| weak.upgrade()) else {
            return;
        };
        info!("Replaying {} pending operations", gate.pending_len());
        std::thread::spawn(move || gate.run_drain(&cancel));
    }

    fn cancel_drain(&self) {
        if let Some(cancel) = self.drain_cancel.lock().unwrap().as_ref() {
            debug!("Cancelling pending-queue drain");
            cancel.store(true, Ordering::SeqCst);
        }
    }

    /// Replay the pending queue in FIFO order.
    ///
    /// Checks the cancel flag between operations, so a sign-out stops the
    /// drain after the in-flight operation completes and leaves the rest
    /// queued. A replay failure also stops the drain, keeping the failed
    /// operation at the front for the next attempt.
    fn run_drain(&self, cancel: &AtomicBool) {
        {
            let mut queue = self.queue.lock().unwrap();
            let before = queue.len();
            *queue = collapse_queue(std::mem::take(&mut *queue));
            if queue.len() < before {
                debug!(
                    "Collapsed {} superseded writes out of the queue",
                    before - queue.len()
                );
            }
        }

        let mut replayed = 0usize;
        loop {
            if cancel.load(Ordering::SeqCst) {
                debug!(
                    "Drain cancelled after {} operations; {} left queued",
                    replayed,
                    self.pending_len()
                );
                break;
            }

            let Some(op) = self.queue.lock().unwrap().pop_front() else {
                info!("Drained pending queue ({} operations)", replayed);
                break;
            };

            if let Err(err) = self.coordinator.refresh_if_needed() {
                debug!("Refresh during drain failed: {}", err);
            }
            let Some(session) = self.coordinator.current_session() else {
                self.queue.lock().unwrap().push_front(op);
                debug!("Session went away mid-drain; {} left queued", self.pending_len());
                break;
            };

            match self.apply(&session.token, &op) {
                Ok(_) => {
                    debug!("Replayed {:?} for {}", op.kind, op.key);
                    replayed += 1;
                }
                Err(err) => {
                    warn!(
                        "Replay of {:?} for {} failed ({}); keeping it queued",
                        op.kind, op.key, err
                    );
                    self.queue.lock().unwrap().push_front(op);
                    break;
                }
            }
        }

        *self.drain_cancel.lock().unwrap() = None;
    }
}

impl AuthStateListener for SyncGate {
    fn on_auth_state(&self, state: &AuthState) {
        match state {
            AuthState::SignedIn(_) => self.start_drain(),
            AuthState::SignedOut | AuthState::Error(_) => self.cancel_drain(),
            AuthState::SigningIn | AuthState::Refreshing(_) => {}
        }
    }
}

/// Collapse superseded writes out of a queue snapshot.
///
/// A Delete enqueued after a Write to the same key wins: replaying the
/// Write first and the Delete after would be correct but wasteful, and
/// replaying only the Write would resurrect deleted data if the Delete
/// were ever dropped. Reads and Writes that are followed by no Delete are
/// untouched, and a Write enqueued after a Delete (re-creating the
/// document) is kept.
fn collapse_queue(ops: VecDeque<QueuedOperation>) -> VecDeque<QueuedOperation> {
    let mut last_delete: HashMap<String, usize> = HashMap::new();
    for (index, op) in ops.iter().enumerate() {
        if op.kind == OperationKind::Delete {
            last_delete.insert(op.key.clone(), index);
        }
    }

    ops.into_iter()
        .enumerate()
        .filter(|(index, op)| {
            !(op.kind == OperationKind::Write
                && last_delete.get(&op.key).is_some_and(|&d| d > *index))
        })
        .map(|(_, op)| op)
        .collect()
}
