//! The in-memory profile table and active-profile pointer.
//!
//! `ProfileStore` owns the structural invariants:
//! - at most `capacity` live profiles,
//! - names unique (case-sensitive) among live profiles,
//! - the active pointer is empty or names a live profile.
//!
//! It knows nothing about PINs, lockouts, or timers; the manager layers
//! those on top.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tillguard_types::{ProfileId, ProfileView};

use crate::SessionError;
use crate::profile::Profile;

#[derive(Debug)]
pub(crate) struct ProfileStore {
    profiles: HashMap<ProfileId, Profile>,
    active: Option<ProfileId>,
    capacity: usize,
}

impl ProfileStore {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            profiles: HashMap::new(),
            active: None,
            capacity,
        }
    }

    /// Checks that a profile called `name` could be added right now.
    ///
    /// Name uniqueness is checked before capacity, so a full device still
    /// reports a duplicate name as such.
    pub(crate) fn check_insertable(&self, name: &str) -> Result<(), SessionError> {
        if self.name_taken(name, None) {
            return Err(SessionError::DuplicateName(name.to_owned()));
        }
        if self.profiles.len() >= self.capacity {
            return Err(SessionError::CapacityExceeded { max: self.capacity });
        }
        Ok(())
    }

    /// Adds a profile. Re-checks the invariants so the table can never be
    /// pushed out of shape, even by a caller that skipped the pre-check.
    pub(crate) fn insert(&mut self, profile: Profile) -> Result<(), SessionError> {
        self.check_insertable(&profile.name)?;
        self.profiles.insert(profile.id.clone(), profile);
        Ok(())
    }

    /// Removes a profile, clearing the active pointer if it pointed there.
    pub(crate) fn remove(&mut self, id: &ProfileId) -> Option<Profile> {
        let removed = self.profiles.remove(id)?;
        if self.active.as_ref() == Some(id) {
            self.active = None;
        }
        Some(removed)
    }

    pub(crate) fn get(&self, id: &ProfileId) -> Option<&Profile> {
        self.profiles.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &ProfileId) -> Option<&mut Profile> {
        self.profiles.get_mut(id)
    }

    pub(crate) fn contains(&self, id: &ProfileId) -> bool {
        self.profiles.contains_key(id)
    }

    /// Whether a live profile other than `except` already uses `name`.
    pub(crate) fn name_taken(&self, name: &str, except: Option<&ProfileId>) -> bool {
        self.profiles
            .values()
            .any(|p| p.name == name && Some(&p.id) != except)
    }

    /// Points the active pointer at `id`. Returns `false` (and changes
    /// nothing) if no such profile exists.
    pub(crate) fn set_active(&mut self, id: &ProfileId) -> bool {
        if !self.profiles.contains_key(id) {
            return false;
        }
        self.active = Some(id.clone());
        true
    }

    pub(crate) fn active_id(&self) -> Option<&ProfileId> {
        self.active.as_ref()
    }

    pub(crate) fn active(&self) -> Option<&Profile> {
        self.active.as_ref().and_then(|id| self.profiles.get(id))
    }

    /// Public views, most recently accessed first.
    pub(crate) fn views_by_recency(&self) -> Vec<ProfileView> {
        let mut views: Vec<ProfileView> = self.profiles.values().map(Profile::view).collect();
        views.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));
        views
    }

    /// Ids of profiles last accessed strictly before `cutoff`.
    pub(crate) fn idle_since(&self, cutoff: DateTime<Utc>) -> Vec<ProfileId> {
        self.profiles
            .values()
            .filter(|p| p.last_accessed_at < cutoff)
            .map(|p| p.id.clone())
            .collect()
    }

    pub(crate) fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.profiles.len()
    }

    pub(crate) fn clear(&mut self) {
        self.profiles.clear();
        self.active = None;
    }

    /// Replaces the table with persisted records.
    ///
    /// A store written by this crate always satisfies the invariants, but
    /// the file may have been edited by hand. Records are taken most
    /// recently accessed first; duplicates (by id or name) and anything
    /// past capacity are dropped with a warning. An active id that names
    /// no surviving profile is cleared.
    pub(crate) fn restore(&mut self, mut records: Vec<Profile>, active: Option<ProfileId>) {
        self.clear();
        records.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));

        for profile in records {
            if self.profiles.contains_key(&profile.id) {
                tracing::warn!(profile_id = %profile.id, "duplicate profile id in store, skipping");
                continue;
            }
            if let Err(e) = self.insert(profile) {
                tracing::warn!(error = %e, "persisted profile rejected on restore");
            }
        }

        self.active = active.filter(|id| self.profiles.contains_key(id));
    }
}
