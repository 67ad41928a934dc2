//! The private profile record and the validation rules for its fields.
//!
//! A [`Profile`] is the manager's full record, credential included. It
//! never leaves this crate in that form: callers only ever see the
//! [`ProfileView`] produced by [`Profile::view`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tillguard_types::{ProfileId, ProfileState, ProfileView};

use crate::{Credential, SessionError};

/// Longest accepted profile name, in characters, after trimming.
pub const MAX_NAME_CHARS: usize = 50;

/// A registered local profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Profile {
    pub(crate) id: ProfileId,
    pub(crate) name: String,
    pub(crate) credential: Credential,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) last_accessed_at: DateTime<Utc>,
    pub(crate) is_locked: bool,
    #[serde(default)]
    pub(crate) current_url: Option<String>,
    #[serde(default)]
    pub(crate) state: ProfileState,
}

impl Profile {
    /// A new, unlocked profile with an empty state bag.
    pub(crate) fn new(name: String, credential: Credential, now: DateTime<Utc>) -> Self {
        Self {
            id: ProfileId::generate(),
            name,
            credential,
            created_at: now,
            last_accessed_at: now,
            is_locked: false,
            current_url: None,
            state: ProfileState::new(),
        }
    }

    /// The credential-free view handed to callers.
    pub(crate) fn view(&self) -> ProfileView {
        ProfileView {
            id: self.id.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at,
            is_locked: self.is_locked,
            current_url: self.current_url.clone(),
            state: self.state.clone(),
        }
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed_at = now;
    }

    /// Shallow merge: each top-level key in `patch` replaces the key of the
    /// same name. Nested objects are replaced wholesale, never merged.
    pub(crate) fn apply_patch(&mut self, patch: ProfileState) {
        for (key, value) in patch {
            self.state.insert(key, value);
        }
    }
}

/// Trims `raw` and checks it is a usable profile name.
///
/// Returns the trimmed name. Rejects empty names, names longer than
/// 50 characters, and names containing control characters.
pub fn validate_name(raw: &str) -> Result<String, SessionError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(SessionError::InvalidName("name is required"));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(SessionError::InvalidName("name must be 50 characters or fewer"));
    }
    if name.chars().any(char::is_control) {
        return Err(SessionError::InvalidName("name must not contain control characters"));
    }
    Ok(name.to_owned())
}

/// `true` if `url` parses as an absolute `http` or `https` URL.
///
/// Anything else (`javascript:`, `file:`, `data:`, relative paths, garbage)
/// is not a navigation target the shell should ever restore.
pub fn is_navigable_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}
