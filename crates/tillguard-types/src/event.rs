//! Lifecycle events emitted by the session engine.

use serde::{Deserialize, Serialize};

use crate::ProfileView;

/// Something that happened to a profile.
///
/// Every variant carries the profile's public view *after* the change
/// (for `Deleted`, the last view before removal). Subscribers such as a UI
/// bridge forward these without needing to query the engine again.
///
/// On the wire an event looks like
/// `{"event": "locked", "profile": { "id": "...", ... }}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "profile", rename_all = "lowercase")]
pub enum LifecycleEvent {
    Created(ProfileView),
    Deleted(ProfileView),
    Locked(ProfileView),
    Unlocked(ProfileView),
    Switched(ProfileView),
    Renamed(ProfileView),
}

impl LifecycleEvent {
    /// The short event name (`"created"`, `"locked"`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Deleted(_) => "deleted",
            Self::Locked(_) => "locked",
            Self::Unlocked(_) => "unlocked",
            Self::Switched(_) => "switched",
            Self::Renamed(_) => "renamed",
        }
    }

    /// The profile this event is about.
    pub fn profile(&self) -> &ProfileView {
        match self {
            Self::Created(p)
            | Self::Deleted(p)
            | Self::Locked(p)
            | Self::Unlocked(p)
            | Self::Switched(p)
            | Self::Renamed(p) => p,
        }
    }
}
