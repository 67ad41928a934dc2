//! Persistence: the key-value store contract, snapshots, and writers.
//!
//! The manager never talks to disk directly. After every mutating
//! operation it builds a [`Snapshot`] of its whole state and hands it to a
//! [`SnapshotWriter`]. Writers are best-effort: a failed write is logged
//! and forgotten, never surfaced to the caller of `lock`/`unlock`.
//!
//! ```text
//! SessionManager ──snapshot──→ SnapshotWriter ──set/delete──→ KeyValueStore
//!                              (Sync | Queued)                (Memory | JsonFile | yours)
//! ```

use std::sync::Arc;

use serde_json::Value;
use tillguard_types::ProfileId;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::LockoutRecord;
use crate::profile::Profile;

/// Store key holding the profile list.
pub const PROFILES_KEY: &str = "sessions";
/// Store key holding the active profile id (or `null`).
pub const ACTIVE_KEY: &str = "active_session_id";
/// Store key holding outstanding lockout records.
pub const LOCKOUTS_KEY: &str = "pin_attempts";

/// Errors from a [`KeyValueStore`].
///
/// These are only ever logged by the session engine; persistence failures
/// never fail a session operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store contents are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A previous writer panicked while holding the store's lock.
    #[error("store lock poisoned")]
    Poisoned,
}

/// A durable key-value store holding JSON values.
///
/// Implementations are called from a blocking context (the queued writer
/// runs them on Tokio's blocking pool), so plain synchronous I/O is fine.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Everything the manager persists, captured at one instant.
///
/// Contains credential records, so it is deliberately opaque: the only
/// thing a writer can do with it is [`write_to`](Self::write_to) a store.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub(crate) profiles: Vec<Profile>,
    pub(crate) active: Option<ProfileId>,
    pub(crate) lockouts: Vec<(ProfileId, LockoutRecord)>,
}

impl Snapshot {
    /// Writes all three keys.
    pub fn write_to(&self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        store.set(PROFILES_KEY, serde_json::to_value(&self.profiles)?)?;
        store.set(ACTIVE_KEY, serde_json::to_value(&self.active)?)?;
        store.set(LOCKOUTS_KEY, serde_json::to_value(&self.lockouts)?)?;
        Ok(())
    }

    /// Reads a snapshot back. Missing keys read as empty.
    pub(crate) fn read_from(store: &dyn KeyValueStore) -> Result<Self, StoreError> {
        let profiles = match store.get(PROFILES_KEY)? {
            Some(v) => serde_json::from_value(v)?,
            None => Vec::new(),
        };
        let active = match store.get(ACTIVE_KEY)? {
            Some(v) => serde_json::from_value(v)?,
            None => None,
        };
        let lockouts = match store.get(LOCKOUTS_KEY)? {
            Some(v) => serde_json::from_value(v)?,
            None => Vec::new(),
        };
        Ok(Self {
            profiles,
            active,
            lockouts,
        })
    }

    /// Number of profiles captured.
    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }
}

/// Removes every key the engine owns.
fn clear_store(store: &dyn KeyValueStore) -> Result<(), StoreError> {
    store.delete(PROFILES_KEY)?;
    store.delete(ACTIVE_KEY)?;
    store.delete(LOCKOUTS_KEY)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// Where the manager sends its snapshots.
///
/// Both methods are fire-and-forget: they must not block for long and must
/// not fail. Implementations log their own errors.
pub trait SnapshotWriter: Send + 'static {
    fn write(&self, snapshot: Snapshot);
    fn clear(&self);
}

/// Writes straight through on the caller's thread.
///
/// Simple and ordered; use it in tests and when the store is in memory.
#[derive(Clone)]
pub struct SyncWriter {
    store: Arc<dyn KeyValueStore>,
}

impl SyncWriter {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

impl SnapshotWriter for SyncWriter {
    fn write(&self, snapshot: Snapshot) {
        if let Err(e) = snapshot.write_to(self.store.as_ref()) {
            tracing::warn!(error = %e, "failed to persist sessions");
        }
    }

    fn clear(&self) {
        if let Err(e) = clear_store(self.store.as_ref()) {
            tracing::warn!(error = %e, "failed to clear session storage");
        }
    }
}

enum PersistOp {
    Write(Snapshot),
    Clear,
    Flush(oneshot::Sender<()>),
}

/// Hands snapshots to a background task so a slow store never stalls the
/// caller.
///
/// Each snapshot is the complete state, so when several are queued only
/// the newest needs writing; the task coalesces them. Cloning the writer
/// is cheap (it's a channel sender) and all clones feed the same task.
#[derive(Clone)]
pub struct QueuedWriter {
    tx: mpsc::UnboundedSender<PersistOp>,
}

impl QueuedWriter {
    /// Spawns the writer task. Must be called inside a Tokio runtime.
    ///
    /// The task exits once every `QueuedWriter` clone has been dropped and
    /// the queue is drained.
    pub fn spawn(store: Arc<dyn KeyValueStore>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_writer(store, rx));
        (Self { tx }, task)
    }

    /// Resolves once everything queued before this call has been written.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(PersistOp::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    fn enqueue(&self, op: PersistOp) {
        if self.tx.send(op).is_err() {
            tracing::warn!("persistence task gone, snapshot dropped");
        }
    }
}

impl SnapshotWriter for QueuedWriter {
    fn write(&self, snapshot: Snapshot) {
        self.enqueue(PersistOp::Write(snapshot));
    }

    fn clear(&self) {
        self.enqueue(PersistOp::Clear);
    }
}

async fn run_writer(store: Arc<dyn KeyValueStore>, mut rx: mpsc::UnboundedReceiver<PersistOp>) {
    while let Some(op) = rx.recv().await {
        // Drain whatever else is already queued, keeping only the newest
        // state-changing op. Flush waiters are answered after the write.
        let mut latest = None;
        let mut waiters = Vec::new();
        let mut next = Some(op);
        while let Some(op) = next {
            match op {
                PersistOp::Flush(done) => waiters.push(done),
                other => latest = Some(other),
            }
            next = rx.try_recv().ok();
        }

        if let Some(op) = latest {
            let store = Arc::clone(&store);
            let outcome = tokio::task::spawn_blocking(move || match op {
                PersistOp::Write(snapshot) => snapshot.write_to(store.as_ref()),
                PersistOp::Clear => clear_store(store.as_ref()),
                PersistOp::Flush(_) => Ok(()),
            })
            .await;
            match outcome {
                Ok(Ok(())) => tracing::trace!("sessions persisted"),
                Ok(Err(e)) => tracing::warn!(error = %e, "failed to persist sessions"),
                Err(e) => tracing::error!(error = %e, "persistence task panicked"),
            }
        }

        for done in waiters {
            let _ = done.send(());
        }
    }
    tracing::debug!("persistence task stopped");
}
