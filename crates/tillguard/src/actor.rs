//! Session actor: the one Tokio task that owns the [`SessionManager`].
//!
//! Every operation, whether it comes from a UI command, an idle timer
//! firing, or the periodic sweep, is handled here one at a time. That is
//! what makes the manager's `&mut self` API safe to share: there is no
//! lock, just a queue.
//!
//! ```text
//! SessionHandle ──SessionCommand──┐
//! IdleTimers ────IdleExpiry───────┼──→ SessionActor ──→ SessionManager
//! sweep interval ──tick───────────┘
//! ```

use std::time::Duration;

use tillguard_session::{
    ExpiryReceiver, ProfileId, ProfileState, ProfileView, SessionError, SessionManager,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Commands sent to the session actor through its channel.
///
/// Variants with a `reply` are request/response: the caller waits on the
/// oneshot. The rest are fire-and-forget, but still processed in order
/// with everything else.
pub(crate) enum SessionCommand {
    Create {
        name: String,
        pin: String,
        reply: Reply<ProfileId>,
    },
    Delete {
        id: ProfileId,
        reply: Reply<()>,
    },
    Lock {
        id: ProfileId,
        reply: Reply<ProfileView>,
    },
    Unlock {
        id: ProfileId,
        pin: String,
        reply: Reply<ProfileView>,
    },
    SwitchTo {
        id: ProfileId,
        pin: Option<String>,
        reply: Reply<ProfileView>,
    },
    ValidatePin {
        id: ProfileId,
        pin: String,
        reply: Reply<bool>,
    },
    Rename {
        id: ProfileId,
        name: String,
        reply: Reply<ProfileView>,
    },
    RecordActivity {
        id: ProfileId,
    },
    UpdateUrl {
        id: ProfileId,
        url: String,
    },
    UpdateState {
        id: ProfileId,
        patch: ProfileState,
    },
    SetIdleTimeout {
        minutes: u64,
    },
    SweepExpired {
        retention_days: u32,
        reply: oneshot::Sender<usize>,
    },
    ClearAll {
        reply: oneshot::Sender<()>,
    },
    Get {
        id: ProfileId,
        reply: oneshot::Sender<Option<ProfileView>>,
    },
    ListAll {
        reply: oneshot::Sender<Vec<ProfileView>>,
    },
    Active {
        reply: oneshot::Sender<Option<ProfileView>>,
    },
    /// Answers once every command queued before it has been applied.
    Barrier {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

/// The actor state. Runs inside a Tokio task.
pub(crate) struct SessionActor {
    manager: SessionManager,
    commands: mpsc::Receiver<SessionCommand>,
    expiries: ExpiryReceiver,
    sweep_interval: Duration,
}

impl SessionActor {
    pub(crate) fn new(
        manager: SessionManager,
        commands: mpsc::Receiver<SessionCommand>,
        expiries: ExpiryReceiver,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            manager,
            commands,
            expiries,
            sweep_interval,
        }
    }

    /// Runs the actor loop until shutdown or until every handle is gone.
    pub(crate) async fn run(mut self) {
        tracing::info!(profiles = self.manager.len(), "session service started");

        // Startup sweep, then one per interval.
        self.sweep();
        let mut sweep = tokio::time::interval_at(
            Instant::now() + self.sweep_interval,
            self.sweep_interval,
        );
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(SessionCommand::Shutdown) => {
                        tracing::info!("session service shutting down");
                        break;
                    }
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                Some(expiry) = self.expiries.recv() => {
                    self.manager.handle_idle_expiry(expiry);
                }
                _ = sweep.tick() => self.sweep(),
            }
        }

        tracing::info!("session service stopped");
    }

    fn sweep(&mut self) {
        let retention_days = self.manager.config().retention_days;
        self.manager.sweep_expired(retention_days);
    }

    fn handle(&mut self, cmd: SessionCommand) {
        let mgr = &mut self.manager;
        // Reply sends only fail if the caller stopped waiting.
        match cmd {
            SessionCommand::Create { name, pin, reply } => {
                let _ = reply.send(mgr.create(&name, &pin));
            }
            SessionCommand::Delete { id, reply } => {
                let _ = reply.send(mgr.delete(&id));
            }
            SessionCommand::Lock { id, reply } => {
                let _ = reply.send(mgr.lock(&id));
            }
            SessionCommand::Unlock { id, pin, reply } => {
                let _ = reply.send(mgr.unlock(&id, &pin));
            }
            SessionCommand::SwitchTo { id, pin, reply } => {
                let _ = reply.send(mgr.switch_to(&id, pin.as_deref()));
            }
            SessionCommand::ValidatePin { id, pin, reply } => {
                let _ = reply.send(mgr.validate_pin(&id, &pin));
            }
            SessionCommand::Rename { id, name, reply } => {
                let _ = reply.send(mgr.rename(&id, &name));
            }
            SessionCommand::RecordActivity { id } => mgr.record_activity(&id),
            SessionCommand::UpdateUrl { id, url } => mgr.update_url(&id, &url),
            SessionCommand::UpdateState { id, patch } => mgr.update_state(&id, patch),
            SessionCommand::SetIdleTimeout { minutes } => mgr.set_idle_timeout_minutes(minutes),
            SessionCommand::SweepExpired {
                retention_days,
                reply,
            } => {
                let _ = reply.send(mgr.sweep_expired(retention_days));
            }
            SessionCommand::ClearAll { reply } => {
                mgr.clear_all();
                let _ = reply.send(());
            }
            SessionCommand::Get { id, reply } => {
                let _ = reply.send(mgr.get(&id));
            }
            SessionCommand::ListAll { reply } => {
                let _ = reply.send(mgr.list_all());
            }
            SessionCommand::Active { reply } => {
                let _ = reply.send(mgr.active());
            }
            SessionCommand::Barrier { reply } => {
                let _ = reply.send(());
            }
            // Intercepted by the run loop.
            SessionCommand::Shutdown => {}
        }
    }
}
