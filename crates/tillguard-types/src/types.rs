//! Identity and view types for local user profiles.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A unique identifier for a profile.
///
/// This is a newtype over the hyphenated string form of a random UUID.
/// Callers should treat it as opaque: the only guarantees are that it is
/// non-empty, unique among profiles ever created on this device, and never
/// reused after deletion.
///
/// `#[serde(transparent)]` serializes it as the bare string, so a persisted
/// profile list reads `"id": "5f0c…"` rather than `"id": { "0": "5f0c…" }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    /// Generates a fresh random identifier (UUID v4, 122 bits of entropy).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ProfileId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ProfileId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

// ---------------------------------------------------------------------------
// State bag
// ---------------------------------------------------------------------------

/// UI-level continuity data attached to a profile (cart contents, open
/// tabs, scroll positions).
///
/// The engine never interprets it. Updates are applied key by key at the top
/// level only: a patch `{"cart": [...]}` replaces the whole `cart` entry and
/// leaves every other key untouched.
pub type ProfileState = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// ProfileView
// ---------------------------------------------------------------------------

/// The public, credential-free view of a profile.
///
/// This is the only shape in which profile data leaves the session engine.
/// Field names are camelCase on the wire because the consumers are
/// JavaScript UI layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: ProfileId,
    /// Display name, already trimmed.
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Bumped by unlock, switch, activity pings, and URL/state updates.
    pub last_accessed_at: DateTime<Utc>,
    /// `true` means the PIN must be entered again before the profile is used.
    pub is_locked: bool,
    /// Last accepted `http`/`https` navigation target.
    pub current_url: Option<String>,
    pub state: ProfileState,
}
