//! `SessionService` builder and lifecycle.
//!
//! This ties the layers together: a key-value store, the queued snapshot
//! writer, the session manager restored from that store, and the actor
//! task that owns it all.

use std::path::PathBuf;
use std::sync::Arc;

use tillguard_session::{
    Clock, JsonFileStore, KeyValueStore, MemoryStore, QueuedWriter, SessionConfig,
    SessionManager, SystemClock,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::actor::SessionActor;
use crate::{ServiceConfig, SessionHandle, TillguardError};

/// Builder for configuring and starting a session service.
///
/// # Example
///
/// ```rust,ignore
/// use tillguard::prelude::*;
///
/// let service = SessionService::builder()
///     .json_file("/var/lib/till/sessions.json")?
///     .spawn();
/// let sessions = service.handle();
/// let alice = sessions.create("Alice", "1234").await?;
/// ```
pub struct SessionServiceBuilder {
    config: ServiceConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
}

impl SessionServiceBuilder {
    /// Creates a new builder with default settings, an in-memory store,
    /// and the system clock.
    pub fn new() -> Self {
        Self {
            config: ServiceConfig::default(),
            store: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the whole service configuration.
    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets only the session engine's configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    /// Persists through the given store.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Persists to a JSON file at `path`, creating it on first write.
    ///
    /// # Errors
    /// Fails if the file exists but can't be read or isn't a JSON object.
    pub fn json_file(self, path: impl Into<PathBuf>) -> Result<Self, TillguardError> {
        let store = JsonFileStore::open(path)?;
        Ok(self.store(Arc::new(store)))
    }

    /// Uses `clock` for timestamps, lockout windows, and retention.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Restores state from the store and starts the actor.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn spawn(self) -> SessionService {
        let config = self.config.validated();
        let store: Arc<dyn KeyValueStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::new()),
        };

        // The writer task exits on its own once the last handle is dropped.
        let (writer, _writer_task) = QueuedWriter::spawn(Arc::clone(&store));
        let (manager, expiries) = SessionManager::restore(
            config.session.clone(),
            self.clock,
            Box::new(writer.clone()),
            store.as_ref(),
        );
        let events = manager.event_sender();

        let (tx, rx) = mpsc::channel(config.command_channel_size);
        let actor = SessionActor::new(manager, rx, expiries, config.sweep_interval);
        let actor_task = tokio::spawn(actor.run());

        SessionService {
            handle: SessionHandle::new(tx, events, writer),
            actor_task,
        }
    }
}

impl Default for SessionServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running session service.
///
/// Hand out [`handle()`](Self::handle) clones to whatever needs sessions,
/// and call [`shutdown()`](Self::shutdown) on the way out so the last
/// snapshot reaches the store.
pub struct SessionService {
    handle: SessionHandle,
    actor_task: JoinHandle<()>,
}

impl SessionService {
    /// Creates a new builder.
    pub fn builder() -> SessionServiceBuilder {
        SessionServiceBuilder::new()
    }

    /// A handle for sending commands to the service.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Flushes pending writes, stops the actor, and waits for it to exit.
    ///
    /// Handles still held elsewhere start failing with
    /// [`TillguardError::ServiceUnavailable`].
    pub async fn shutdown(self) -> Result<(), TillguardError> {
        self.handle.flush().await?;
        self.handle.shutdown().await?;
        if let Err(e) = self.actor_task.await {
            tracing::error!(error = %e, "session actor panicked");
        }
        Ok(())
    }
}
