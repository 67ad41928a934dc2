//! The cloneable client side of the session service.

use tillguard_session::{LifecycleEvent, ProfileId, ProfileState, ProfileView, QueuedWriter};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::TillguardError;
use crate::actor::SessionCommand;

/// Handle to a running session service.
///
/// Cheap to clone: it's a command sender, an event sender, and a writer
/// handle. Every clone talks to the same actor, and commands from one
/// clone are applied in the order they were sent.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<LifecycleEvent>,
    writer: QueuedWriter,
}

impl SessionHandle {
    pub(crate) fn new(
        sender: mpsc::Sender<SessionCommand>,
        events: broadcast::Sender<LifecycleEvent>,
        writer: QueuedWriter,
    ) -> Self {
        Self {
            sender,
            events,
            writer,
        }
    }

    /// Registers a profile and makes it active. Returns its id.
    pub async fn create(&self, name: &str, pin: &str) -> Result<ProfileId, TillguardError> {
        let (name, pin) = (name.to_owned(), pin.to_owned());
        Ok(self.request(|reply| SessionCommand::Create { name, pin, reply }).await??)
    }

    pub async fn delete(&self, id: &ProfileId) -> Result<(), TillguardError> {
        let id = id.clone();
        Ok(self.request(|reply| SessionCommand::Delete { id, reply }).await??)
    }

    pub async fn lock(&self, id: &ProfileId) -> Result<ProfileView, TillguardError> {
        let id = id.clone();
        Ok(self.request(|reply| SessionCommand::Lock { id, reply }).await??)
    }

    pub async fn unlock(&self, id: &ProfileId, pin: &str) -> Result<ProfileView, TillguardError> {
        let (id, pin) = (id.clone(), pin.to_owned());
        Ok(self.request(|reply| SessionCommand::Unlock { id, pin, reply }).await??)
    }

    /// Switches the active profile. `pin` is only needed if it is locked.
    pub async fn switch_to(
        &self,
        id: &ProfileId,
        pin: Option<&str>,
    ) -> Result<ProfileView, TillguardError> {
        let (id, pin) = (id.clone(), pin.map(str::to_owned));
        Ok(self.request(|reply| SessionCommand::SwitchTo { id, pin, reply }).await??)
    }

    pub async fn validate_pin(&self, id: &ProfileId, pin: &str) -> Result<bool, TillguardError> {
        let (id, pin) = (id.clone(), pin.to_owned());
        Ok(self.request(|reply| SessionCommand::ValidatePin { id, pin, reply }).await??)
    }

    pub async fn rename(&self, id: &ProfileId, name: &str) -> Result<ProfileView, TillguardError> {
        let (id, name) = (id.clone(), name.to_owned());
        Ok(self.request(|reply| SessionCommand::Rename { id, name, reply }).await??)
    }

    /// Notes user activity on a profile (fire-and-forget).
    pub async fn record_activity(&self, id: &ProfileId) -> Result<(), TillguardError> {
        self.send(SessionCommand::RecordActivity { id: id.clone() }).await
    }

    /// Fire-and-forget. Non-http(s) URLs are dropped by the engine.
    pub async fn update_url(&self, id: &ProfileId, url: &str) -> Result<(), TillguardError> {
        self.send(SessionCommand::UpdateUrl {
            id: id.clone(),
            url: url.to_owned(),
        })
        .await
    }

    /// Fire-and-forget shallow merge into the profile's state bag.
    pub async fn update_state(
        &self,
        id: &ProfileId,
        patch: ProfileState,
    ) -> Result<(), TillguardError> {
        self.send(SessionCommand::UpdateState {
            id: id.clone(),
            patch,
        })
        .await
    }

    pub async fn set_idle_timeout_minutes(&self, minutes: u64) -> Result<(), TillguardError> {
        self.send(SessionCommand::SetIdleTimeout { minutes }).await
    }

    /// Deletes profiles idle for longer than `retention_days`. Returns how
    /// many went.
    pub async fn sweep_expired(&self, retention_days: u32) -> Result<usize, TillguardError> {
        self.request(|reply| SessionCommand::SweepExpired {
            retention_days,
            reply,
        })
        .await
    }

    /// Removes every profile and wipes the persisted keys.
    pub async fn clear_all(&self) -> Result<(), TillguardError> {
        self.request(|reply| SessionCommand::ClearAll { reply }).await
    }

    pub async fn get(&self, id: &ProfileId) -> Result<Option<ProfileView>, TillguardError> {
        let id = id.clone();
        self.request(|reply| SessionCommand::Get { id, reply }).await
    }

    /// Every profile, most recently accessed first.
    pub async fn list_all(&self) -> Result<Vec<ProfileView>, TillguardError> {
        self.request(|reply| SessionCommand::ListAll { reply }).await
    }

    pub async fn active(&self) -> Result<Option<ProfileView>, TillguardError> {
        self.request(|reply| SessionCommand::Active { reply }).await
    }

    /// Subscribes to lifecycle events (created, locked, switched, ...).
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Waits until everything sent so far has been applied and written to
    /// the store.
    pub async fn flush(&self) -> Result<(), TillguardError> {
        self.request(|reply| SessionCommand::Barrier { reply }).await?;
        self.writer.flush().await;
        Ok(())
    }

    /// Tells the actor to stop. Commands sent before this one are still
    /// applied; anything after fails with `ServiceUnavailable`.
    pub async fn shutdown(&self) -> Result<(), TillguardError> {
        self.send(SessionCommand::Shutdown).await
    }

    /// Sends a command and waits on its reply channel.
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, TillguardError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(command(reply_tx)).await?;
        reply_rx.await.map_err(|_| TillguardError::ServiceUnavailable)
    }

    async fn send(&self, command: SessionCommand) -> Result<(), TillguardError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| TillguardError::ServiceUnavailable)
    }
}
