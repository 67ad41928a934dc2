//! The session manager: owns every profile on the device.
//!
//! This is the central piece of the session layer. It's responsible for:
//! - Creating and deleting profiles (name + PIN)
//! - Locking and unlocking them, and tracking which one is active
//! - Rate-limiting PIN checks with the lockout tracker
//! - Auto-locking profiles after a period of inactivity
//! - Sweeping profiles nobody has used for days
//! - Persisting a snapshot after every change and announcing lifecycle events
//!
//! # Concurrency note
//!
//! `SessionManager` is NOT thread-safe by itself: every method takes
//! `&mut self` and runs to completion. It is meant to be owned by a single
//! task (the service actor) that also receives the idle-timer firings, so
//! a timer firing is just one more command in the same serialized stream
//! and can never interleave with an `unlock` or `delete`.

use std::sync::Arc;

use chrono::TimeDelta;
use tillguard_timer::IdleTimers;
use tillguard_types::{LifecycleEvent, ProfileId, ProfileState, ProfileView};
use tokio::sync::broadcast;

use crate::config::MAX_RETENTION_DAYS;
use crate::credential;
use crate::persistence::{KeyValueStore, Snapshot, SnapshotWriter};
use crate::profile::{Profile, is_navigable_url, validate_name};
use crate::store::ProfileStore;
use crate::{Clock, FailureOutcome, LockoutTracker, SessionConfig, SessionError};

/// An idle-timer firing for one profile.
pub type IdleExpiry = tillguard_timer::IdleExpiry<ProfileId>;

/// Where idle-timer firings arrive. Feed each one to
/// [`SessionManager::handle_idle_expiry`].
pub type ExpiryReceiver = tillguard_timer::ExpiryReceiver<ProfileId>;

/// How many events a slow subscriber may fall behind before it starts
/// missing them.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Manages all local profiles.
///
/// ## Lifecycle
///
/// ```text
/// create() ──→ [Unlocked, active] ──lock() / idle timeout──→ [Locked]
///                    ↑                                          │
///                    └──────── unlock(pin) / switch_to(pin) ────┘
///
/// delete() or sweep_expired() ──→ gone
/// ```
pub struct SessionManager {
    /// The profile table and active pointer.
    store: ProfileStore,

    /// Failed PIN attempts and lockout windows, keyed by profile id.
    lockouts: LockoutTracker,

    /// One idle timer per *unlocked* profile. Locked profiles never have
    /// one; every transition below keeps that true.
    timers: IdleTimers<ProfileId>,

    config: SessionConfig,
    clock: Arc<dyn Clock>,
    writer: Box<dyn SnapshotWriter>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl SessionManager {
    /// Creates an empty manager.
    ///
    /// Returns the manager and the receiver its idle timers fire into.
    /// Must be called inside a Tokio runtime (the timers are Tokio tasks).
    pub fn new(
        config: SessionConfig,
        clock: Arc<dyn Clock>,
        writer: Box<dyn SnapshotWriter>,
    ) -> (Self, ExpiryReceiver) {
        let config = config.validated();
        let (timers, expiries) = IdleTimers::new(config.idle_timeout);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let manager = Self {
            store: ProfileStore::new(config.max_profiles),
            lockouts: LockoutTracker::new(config.max_pin_attempts, config.lockout_duration),
            timers,
            config,
            clock,
            writer,
            events,
        };
        (manager, expiries)
    }

    /// Creates a manager pre-loaded from `source`.
    ///
    /// Profiles, the active pointer, and still-running lockouts are
    /// restored; unlocked profiles get a fresh idle timer. If the store
    /// can't be read the manager starts empty and the error is logged.
    pub fn restore(
        config: SessionConfig,
        clock: Arc<dyn Clock>,
        writer: Box<dyn SnapshotWriter>,
        source: &dyn KeyValueStore,
    ) -> (Self, ExpiryReceiver) {
        let (mut manager, expiries) = Self::new(config, clock, writer);

        match Snapshot::read_from(source) {
            Ok(snapshot) => {
                let now = manager.clock.now();
                manager.store.restore(snapshot.profiles, snapshot.active);
                let lockouts = snapshot
                    .lockouts
                    .into_iter()
                    .filter(|(id, _)| manager.store.contains(id))
                    .collect();
                manager.lockouts.restore(lockouts, now);
                let unlocked: Vec<ProfileId> = manager
                    .store
                    .profiles()
                    .filter(|p| !p.is_locked)
                    .map(|p| p.id.clone())
                    .collect();
                for id in unlocked {
                    manager.timers.arm(id);
                }
                tracing::info!(
                    profiles = manager.store.len(),
                    lockouts = manager.lockouts.len(),
                    "sessions restored"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not restore sessions, starting empty");
            }
        }

        (manager, expiries)
    }

    // =====================================================================
    // Commands
    // =====================================================================

    /// Registers a new profile and makes it the active one.
    ///
    /// Validation runs in full before anything is touched, so a failed
    /// create reserves neither the name nor an id.
    ///
    /// # Errors
    /// - [`SessionError::InvalidName`]: empty, too long, or control chars
    /// - [`SessionError::InvalidPinFormat`]: not exactly 4 digits
    /// - [`SessionError::DuplicateName`]: name already in use
    /// - [`SessionError::CapacityExceeded`]: device already full
    pub fn create(&mut self, name: &str, pin: &str) -> Result<ProfileId, SessionError> {
        let name = validate_name(name)?;
        if !credential::validate_pin_format(pin) {
            return Err(SessionError::InvalidPinFormat);
        }
        self.store.check_insertable(&name)?;

        let credential = credential::derive(pin, self.config.stretch_rounds);
        let profile = Profile::new(name, credential, self.clock.now());
        let id = profile.id.clone();
        let view = profile.view();

        self.store.insert(profile)?;
        self.store.set_active(&id);
        self.timers.arm(id.clone());

        tracing::info!(profile_id = %id, name = %view.name, "profile created");
        self.emit(LifecycleEvent::Created(view));
        self.persist();
        Ok(id)
    }

    /// Deletes a profile, its idle timer, and any lockout record.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if no such profile exists.
    pub fn delete(&mut self, id: &ProfileId) -> Result<(), SessionError> {
        let profile = self
            .store
            .remove(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;

        // Same transition as the removal: no orphaned timer can outlive
        // the profile and fire `lock` on a missing id.
        self.timers.cancel(id);
        self.lockouts.remove(id);

        tracing::info!(profile_id = %id, "profile deleted");
        self.emit(LifecycleEvent::Deleted(profile.view()));
        self.persist();
        Ok(())
    }

    /// Locks a profile and stops its idle timer.
    ///
    /// The active pointer is left alone so the same profile can be resumed
    /// by unlocking it. Locking an already-locked profile is fine.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if no such profile exists.
    pub fn lock(&mut self, id: &ProfileId) -> Result<ProfileView, SessionError> {
        let profile = self
            .store
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        profile.is_locked = true;
        let view = profile.view();

        self.timers.cancel(id);

        tracing::info!(profile_id = %id, "profile locked");
        self.emit(LifecycleEvent::Locked(view.clone()));
        self.persist();
        Ok(view)
    }

    /// Checks a PIN, counting failures toward a lockout.
    ///
    /// Returns `Ok(true)` for the right PIN (which also clears the failure
    /// count) and `Ok(false)` for a wrong one below the attempt limit.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`]: no such profile
    /// - [`SessionError::LockedOut`]: a lockout is already running (the
    ///   PIN is not even looked at), or this failure just started one
    pub fn validate_pin(&mut self, id: &ProfileId, pin: &str) -> Result<bool, SessionError> {
        let profile = self
            .store
            .get(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;

        let now = self.clock.now();
        // Check lockout before `verify`: attempts during a lockout must
        // neither consume the budget nor run the comparison.
        if let Some(remaining_secs) = self.lockouts.check_locked(id, now) {
            tracing::warn!(profile_id = %id, remaining_secs, "PIN check refused during lockout");
            return Err(SessionError::LockedOut { remaining_secs });
        }

        if credential::verify(pin, &profile.credential) {
            self.lockouts.record_success(id);
            self.persist();
            return Ok(true);
        }

        let outcome = self.lockouts.record_failure(id, now);
        self.persist();
        match outcome {
            FailureOutcome::Warned {
                attempts,
                remaining_attempts,
            } => {
                tracing::warn!(profile_id = %id, attempts, remaining_attempts, "wrong PIN");
                Ok(false)
            }
            FailureOutcome::LockedOut { remaining_secs, .. } => {
                tracing::warn!(profile_id = %id, remaining_secs, "too many wrong PINs, locked out");
                Err(SessionError::LockedOut { remaining_secs })
            }
        }
    }

    /// Unlocks a profile with its PIN and makes it active.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`]: no such profile
    /// - [`SessionError::LockedOut`]: too many recent failures
    /// - [`SessionError::InvalidCredential`]: wrong PIN
    pub fn unlock(&mut self, id: &ProfileId, pin: &str) -> Result<ProfileView, SessionError> {
        if !self.validate_pin(id, pin)? {
            return Err(SessionError::InvalidCredential);
        }

        let now = self.clock.now();
        let profile = self
            .store
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        profile.is_locked = false;
        profile.touch(now);
        let view = profile.view();

        self.store.set_active(id);
        self.timers.arm(id.clone());

        tracing::info!(profile_id = %id, "profile unlocked");
        self.emit(LifecycleEvent::Unlocked(view.clone()));
        self.persist();
        Ok(view)
    }

    /// Makes a profile the active one.
    ///
    /// An unlocked profile needs no PIN. A locked one behaves exactly like
    /// [`unlock`](Self::unlock) and needs the PIN.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`]: no such profile
    /// - [`SessionError::PinRequired`]: profile is locked and `pin` is `None`
    /// - [`SessionError::InvalidCredential`] / [`SessionError::LockedOut`]:
    ///   as for `unlock`
    pub fn switch_to(
        &mut self,
        id: &ProfileId,
        pin: Option<&str>,
    ) -> Result<ProfileView, SessionError> {
        let now = self.clock.now();
        let profile = self
            .store
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;

        if profile.is_locked {
            return match pin {
                Some(pin) => self.unlock(id, pin),
                None => Err(SessionError::PinRequired(id.clone())),
            };
        }

        profile.touch(now);
        let view = profile.view();
        self.store.set_active(id);
        self.timers.arm(id.clone());

        tracing::info!(profile_id = %id, "switched profile");
        self.emit(LifecycleEvent::Switched(view.clone()));
        self.persist();
        Ok(view)
    }

    /// Renames a profile under the same rules as `create`.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`]: no such profile
    /// - [`SessionError::InvalidName`]: empty, too long, or control chars
    /// - [`SessionError::DuplicateName`]: another profile has that name
    pub fn rename(&mut self, id: &ProfileId, new_name: &str) -> Result<ProfileView, SessionError> {
        if !self.store.contains(id) {
            return Err(SessionError::NotFound(id.clone()));
        }
        let name = validate_name(new_name)?;
        if self.store.name_taken(&name, Some(id)) {
            return Err(SessionError::DuplicateName(name));
        }

        let profile = self
            .store
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        profile.name = name;
        let view = profile.view();

        tracing::info!(profile_id = %id, name = %view.name, "profile renamed");
        self.emit(LifecycleEvent::Renamed(view.clone()));
        self.persist();
        Ok(view)
    }

    /// Notes user activity: bumps `last_accessed_at` and restarts the idle
    /// countdown. Does nothing for a locked or unknown profile.
    pub fn record_activity(&mut self, id: &ProfileId) {
        let now = self.clock.now();
        let Some(profile) = self.store.get_mut(id) else {
            return;
        };
        if profile.is_locked {
            return;
        }
        profile.touch(now);
        self.timers.arm(id.clone());
        tracing::trace!(profile_id = %id, "activity recorded");
        self.persist();
    }

    /// Remembers where the profile's webview was. Only absolute `http`
    /// and `https` URLs are kept; anything else is silently ignored.
    pub fn update_url(&mut self, id: &ProfileId, url: &str) {
        if !is_navigable_url(url) {
            tracing::debug!(profile_id = %id, "ignoring non-http(s) URL");
            return;
        }
        let now = self.clock.now();
        let Some(profile) = self.store.get_mut(id) else {
            return;
        };
        profile.current_url = Some(url.to_owned());
        profile.touch(now);
        self.persist();
    }

    /// Merges `patch` into the profile's state bag, top-level keys only.
    pub fn update_state(&mut self, id: &ProfileId, patch: ProfileState) {
        let now = self.clock.now();
        let Some(profile) = self.store.get_mut(id) else {
            return;
        };
        profile.apply_patch(patch);
        profile.touch(now);
        self.persist();
    }

    /// Deletes every profile last accessed more than `retention_days` ago.
    ///
    /// Returns how many were deleted.
    pub fn sweep_expired(&mut self, retention_days: u32) -> usize {
        let days = retention_days.min(MAX_RETENTION_DAYS);
        let cutoff = self.clock.now() - TimeDelta::days(i64::from(days));
        let expired = self.store.idle_since(cutoff);

        for id in &expired {
            // Ids came from the table a moment ago; NotFound can't happen.
            if let Err(e) = self.delete(id) {
                tracing::warn!(profile_id = %id, error = %e, "sweep could not delete profile");
            }
        }

        if !expired.is_empty() {
            tracing::info!(deleted = expired.len(), retention_days = days, "swept idle profiles");
        }
        expired.len()
    }

    /// Changes the idle timeout (5–120 minutes, else the 30-minute
    /// default) and restarts every running countdown with it.
    pub fn set_idle_timeout_minutes(&mut self, minutes: u64) {
        let timeout = SessionConfig::idle_timeout_from_minutes(minutes);
        self.config.idle_timeout = timeout;
        self.timers.rescale_all(timeout);
        tracing::info!(timeout_mins = timeout.as_secs() / 60, "idle timeout updated");
    }

    /// Applies an idle-timer firing.
    ///
    /// Locks the profile if the firing belongs to its current timer and
    /// returns the locked view. A stale firing (the timer was reset or
    /// cancelled after it fired) is ignored and returns `None`.
    pub fn handle_idle_expiry(&mut self, expiry: IdleExpiry) -> Option<ProfileView> {
        if !self.timers.claim(&expiry) {
            return None;
        }
        tracing::info!(profile_id = %expiry.key, "idle timeout reached");
        self.lock(&expiry.key).ok()
    }

    /// Forgets everything: profiles, lockouts, timers, active pointer, and
    /// the persisted keys.
    pub fn clear_all(&mut self) {
        self.timers.cancel_all();
        self.lockouts.clear();
        self.store.clear();
        self.writer.clear();
        tracing::info!("all sessions cleared");
    }

    // =====================================================================
    // Queries
    // =====================================================================

    /// Looks up a profile's public view.
    pub fn get(&self, id: &ProfileId) -> Option<ProfileView> {
        self.store.get(id).map(Profile::view)
    }

    /// Every profile, most recently accessed first.
    pub fn list_all(&self) -> Vec<ProfileView> {
        self.store.views_by_recency()
    }

    /// The active profile, if any (it may be locked).
    pub fn active(&self) -> Option<ProfileView> {
        self.store.active().map(Profile::view)
    }

    pub fn active_id(&self) -> Option<&ProfileId> {
        self.store.active_id()
    }

    /// Whether `id` currently has a running idle timer.
    pub fn has_idle_timer(&self, id: &ProfileId) -> bool {
        self.timers.is_armed(id)
    }

    /// Consecutive failed PIN attempts currently counted for `id`.
    pub fn failed_attempts(&self, id: &ProfileId) -> u32 {
        self.lockouts.attempts(id)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Number of live profiles.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns `true` if there are no profiles.
    pub fn is_empty(&self) -> bool {
        self.store.len() == 0
    }

    /// Subscribes to lifecycle events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// A sender handle for the event channel, so owners can hand out
    /// subscriptions without going through the manager.
    pub fn event_sender(&self) -> broadcast::Sender<LifecycleEvent> {
        self.events.clone()
    }

    // =====================================================================
    // Internals
    // =====================================================================

    fn emit(&self, event: LifecycleEvent) {
        // `send` only fails when nobody is subscribed, which is fine.
        if self.events.send(event).is_err() {
            tracing::trace!("lifecycle event dropped (no subscribers)");
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            profiles: self.store.profiles().cloned().collect(),
            active: self.store.active_id().cloned(),
            lockouts: self.lockouts.snapshot(),
        }
    }

    fn persist(&self) {
        self.writer.write(self.snapshot());
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionManager`.
    //!
    //! Naming convention: `test_{function}_{scenario}_{expected}`.
    //!
    //! # Testing time-dependent behavior
    //!
    //! Two clocks are in play. Wall-clock time (lockout windows, retention)
    //! comes from a `ManualClock` that the test advances by hand. Idle
    //! timers run on Tokio time, which `start_paused = true` freezes until
    //! the test advances it. Neither requires real sleeping.

    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{ManualClock, MemoryStore, SyncWriter};

    struct Harness {
        mgr: SessionManager,
        expiries: ExpiryReceiver,
        clock: ManualClock,
        store: Arc<MemoryStore>,
    }

    /// Manager over an in-memory store with a manual clock and cheap PIN
    /// stretching.
    fn harness() -> Harness {
        let clock = ManualClock::default();
        let store = Arc::new(MemoryStore::new());
        let config = SessionConfig {
            stretch_rounds: 16,
            ..SessionConfig::default()
        };
        let (mgr, expiries) = SessionManager::new(
            config,
            Arc::new(clock.clone()),
            Box::new(SyncWriter::new(store.clone())),
        );
        Harness {
            mgr,
            expiries,
            clock,
            store,
        }
    }

    fn patch(value: serde_json::Value) -> ProfileState {
        value.as_object().cloned().unwrap_or_default()
    }

    // =====================================================================
    // create()
    // =====================================================================

    #[tokio::test]
    async fn test_create_returns_id_and_activates_profile() {
        let mut h = harness();

        let id = h.mgr.create("Alice", "1234").unwrap();

        assert!(!id.as_str().is_empty());
        assert_eq!(h.mgr.active_id(), Some(&id));
        assert!(h.mgr.has_idle_timer(&id), "new profiles start their idle timer");
        let view = h.mgr.get(&id).unwrap();
        assert_eq!(view.name, "Alice");
        assert!(!view.is_locked);
    }

    #[tokio::test]
    async fn test_create_trims_name() {
        let mut h = harness();

        let id = h.mgr.create("  Bob  ", "0000").unwrap();

        assert_eq!(h.mgr.get(&id).unwrap().name, "Bob");
    }

    #[tokio::test]
    async fn test_create_invalid_inputs_leave_state_unchanged() {
        let mut h = harness();

        assert!(matches!(h.mgr.create("", "1234"), Err(SessionError::InvalidName(_))));
        assert!(matches!(
            h.mgr.create(&"x".repeat(51), "1234"),
            Err(SessionError::InvalidName(_))
        ));
        for pin in ["123", "12345", "abcd", ""] {
            assert!(matches!(
                h.mgr.create("Alice", pin),
                Err(SessionError::InvalidPinFormat)
            ));
        }

        assert!(h.mgr.is_empty());
        assert!(h.mgr.active_id().is_none());
        // A failed create must not have reserved the name.
        assert!(h.mgr.create("Alice", "1234").is_ok());
    }

    #[tokio::test]
    async fn test_create_duplicate_name_returns_error() {
        let mut h = harness();
        h.mgr.create("Alice", "1234").unwrap();

        let result = h.mgr.create(" Alice ", "5678");

        assert!(matches!(result, Err(SessionError::DuplicateName(n)) if n == "Alice"));
        assert_eq!(h.mgr.len(), 1);
    }

    #[tokio::test]
    async fn test_create_sixth_profile_exceeds_capacity() {
        let mut h = harness();
        for i in 1..=5 {
            h.mgr.create(&format!("U{i}"), "1111").unwrap();
        }

        let result = h.mgr.create("U6", "1111");

        assert!(matches!(result, Err(SessionError::CapacityExceeded { max: 5 })));
        assert_eq!(h.mgr.len(), 5);
    }

    #[tokio::test]
    async fn test_create_after_delete_reuses_freed_slot() {
        let mut h = harness();
        let mut ids = Vec::new();
        for i in 1..=5 {
            ids.push(h.mgr.create(&format!("U{i}"), "1111").unwrap());
        }

        h.mgr.delete(&ids[2]).unwrap();

        assert!(h.mgr.create("U6", "1111").is_ok());
        assert!(matches!(
            h.mgr.create("U7", "1111"),
            Err(SessionError::CapacityExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_persists_snapshot() {
        let mut h = harness();

        let id = h.mgr.create("Alice", "1234").unwrap();

        let restored = Snapshot::read_from(h.store.as_ref()).unwrap();
        assert_eq!(restored.profile_count(), 1);
        assert_eq!(restored.active, Some(id));
    }

    #[tokio::test]
    async fn test_create_emits_created_event() {
        let mut h = harness();
        let mut events = h.mgr.subscribe();

        let id = h.mgr.create("Alice", "1234").unwrap();

        let event = events.try_recv().unwrap();
        assert_eq!(event.name(), "created");
        assert_eq!(event.profile().id, id);
    }

    // =====================================================================
    // delete()
    // =====================================================================

    #[tokio::test]
    async fn test_delete_active_clears_pointer_timer_and_lockout() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();
        h.mgr.validate_pin(&id, "0000").unwrap();

        h.mgr.delete(&id).unwrap();

        assert!(h.mgr.get(&id).is_none());
        assert!(h.mgr.active_id().is_none());
        assert!(!h.mgr.has_idle_timer(&id));
        assert_eq!(h.mgr.failed_attempts(&id), 0);
    }

    #[tokio::test]
    async fn test_delete_unknown_returns_not_found() {
        let mut h = harness();
        let ghost = ProfileId::from("ghost");

        assert!(matches!(h.mgr.delete(&ghost), Err(SessionError::NotFound(p)) if p == ghost));
    }

    // =====================================================================
    // lock()
    // =====================================================================

    #[tokio::test]
    async fn test_lock_keeps_active_pointer_and_stops_timer() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();

        let view = h.mgr.lock(&id).unwrap();

        assert!(view.is_locked);
        assert_eq!(h.mgr.active_id(), Some(&id));
        assert!(!h.mgr.has_idle_timer(&id));
    }

    #[tokio::test]
    async fn test_lock_twice_is_not_an_error() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();
        h.mgr.lock(&id).unwrap();

        let second = h.mgr.lock(&id);

        assert!(second.is_ok_and(|v| v.is_locked));
    }

    #[tokio::test]
    async fn test_lock_unknown_returns_not_found() {
        let mut h = harness();

        assert!(matches!(
            h.mgr.lock(&ProfileId::from("ghost")),
            Err(SessionError::NotFound(_))
        ));
    }

    // =====================================================================
    // validate_pin()
    // =====================================================================

    #[tokio::test]
    async fn test_validate_pin_correct_returns_true() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();

        assert!(h.mgr.validate_pin(&id, "1234").unwrap());
    }

    #[tokio::test]
    async fn test_validate_pin_third_failure_locks_out() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();

        assert!(!h.mgr.validate_pin(&id, "0000").unwrap());
        assert!(!h.mgr.validate_pin(&id, "0000").unwrap());
        let third = h.mgr.validate_pin(&id, "0000");

        assert!(matches!(third, Err(SessionError::LockedOut { remaining_secs: 300 })));
    }

    #[tokio::test]
    async fn test_validate_pin_third_failure_with_oversized_lockout_is_capped() {
        let store = Arc::new(MemoryStore::new());
        let config = SessionConfig {
            stretch_rounds: 16,
            lockout_duration: Duration::from_secs(u64::MAX / 4),
            ..SessionConfig::default()
        };
        let (mut mgr, _expiries) = SessionManager::new(
            config,
            Arc::new(ManualClock::default()),
            Box::new(SyncWriter::new(store)),
        );
        let id = mgr.create("Alice", "1234").unwrap();

        let _ = mgr.validate_pin(&id, "0000");
        let _ = mgr.validate_pin(&id, "0000");
        let third = mgr.validate_pin(&id, "0000");

        assert!(matches!(
            third,
            Err(SessionError::LockedOut { remaining_secs: 86_400 })
        ));
    }

    #[tokio::test]
    async fn test_validate_pin_correct_pin_rejected_during_lockout() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();
        for _ in 0..3 {
            let _ = h.mgr.validate_pin(&id, "0000");
        }

        h.clock.advance(Duration::from_secs(60));
        let result = h.mgr.validate_pin(&id, "1234");

        assert!(matches!(result, Err(SessionError::LockedOut { remaining_secs: 240 })));
        assert_eq!(h.mgr.failed_attempts(&id), 3, "rejected checks are not counted");
    }

    #[tokio::test]
    async fn test_validate_pin_accepted_after_lockout_window() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();
        for _ in 0..3 {
            let _ = h.mgr.validate_pin(&id, "0000");
        }

        h.clock.advance(Duration::from_secs(5 * 60));

        assert!(h.mgr.validate_pin(&id, "1234").unwrap());
        assert_eq!(h.mgr.failed_attempts(&id), 0);
    }

    #[tokio::test]
    async fn test_validate_pin_success_resets_failure_count() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();
        h.mgr.validate_pin(&id, "0000").unwrap();
        h.mgr.validate_pin(&id, "0000").unwrap();

        assert!(h.mgr.validate_pin(&id, "1234").unwrap());

        assert_eq!(h.mgr.failed_attempts(&id), 0);
        // Two more failures are only warnings again.
        assert!(!h.mgr.validate_pin(&id, "0000").unwrap());
        assert!(!h.mgr.validate_pin(&id, "0000").unwrap());
    }

    #[tokio::test]
    async fn test_validate_pin_lockout_is_per_profile() {
        let mut h = harness();
        let alice = h.mgr.create("Alice", "1234").unwrap();
        let bob = h.mgr.create("Bob", "5678").unwrap();
        for _ in 0..3 {
            let _ = h.mgr.validate_pin(&alice, "0000");
        }

        assert!(h.mgr.validate_pin(&bob, "5678").unwrap());
    }

    #[tokio::test]
    async fn test_validate_pin_unknown_returns_not_found() {
        let mut h = harness();

        assert!(matches!(
            h.mgr.validate_pin(&ProfileId::from("ghost"), "1234"),
            Err(SessionError::NotFound(_))
        ));
    }

    // =====================================================================
    // unlock()
    // =====================================================================

    #[tokio::test]
    async fn test_unlock_correct_pin_unlocks_and_activates() {
        let mut h = harness();
        let alice = h.mgr.create("Alice", "1234").unwrap();
        h.mgr.lock(&alice).unwrap();
        let bob = h.mgr.create("Bob", "5678").unwrap();
        assert_eq!(h.mgr.active_id(), Some(&bob));

        let view = h.mgr.unlock(&alice, "1234").unwrap();

        assert!(!view.is_locked);
        assert_eq!(h.mgr.active_id(), Some(&alice));
        assert!(h.mgr.has_idle_timer(&alice));
    }

    #[tokio::test]
    async fn test_unlock_wrong_pin_returns_invalid_credential() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();
        h.mgr.lock(&id).unwrap();

        let result = h.mgr.unlock(&id, "9999");

        assert!(matches!(result, Err(SessionError::InvalidCredential)));
        assert!(h.mgr.get(&id).unwrap().is_locked);
        assert!(!h.mgr.has_idle_timer(&id));
    }

    #[tokio::test]
    async fn test_unlock_bumps_last_accessed() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();
        h.mgr.lock(&id).unwrap();
        let before = h.mgr.get(&id).unwrap().last_accessed_at;

        h.clock.advance(Duration::from_secs(120));
        let view = h.mgr.unlock(&id, "1234").unwrap();

        assert_eq!(view.last_accessed_at - before, TimeDelta::seconds(120));
    }

    // =====================================================================
    // switch_to()
    // =====================================================================

    #[tokio::test]
    async fn test_switch_to_unlocked_needs_no_pin() {
        let mut h = harness();
        let alice = h.mgr.create("Alice", "1234").unwrap();
        let _bob = h.mgr.create("Bob", "5678").unwrap();
        let mut events = h.mgr.subscribe();

        let view = h.mgr.switch_to(&alice, None).unwrap();

        assert_eq!(view.id, alice);
        assert_eq!(h.mgr.active_id(), Some(&alice));
        assert_eq!(events.try_recv().unwrap().name(), "switched");
    }

    #[tokio::test]
    async fn test_switch_to_locked_without_pin_requires_pin() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();
        h.mgr.lock(&id).unwrap();

        let result = h.mgr.switch_to(&id, None);

        assert!(matches!(result, Err(SessionError::PinRequired(p)) if p == id));
    }

    #[tokio::test]
    async fn test_switch_to_locked_with_pin_unlocks() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();
        h.mgr.lock(&id).unwrap();

        let view = h.mgr.switch_to(&id, Some("1234")).unwrap();

        assert!(!view.is_locked);
    }

    #[tokio::test]
    async fn test_switch_to_locked_wrong_pin_is_invalid_credential() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();
        h.mgr.lock(&id).unwrap();

        assert!(matches!(
            h.mgr.switch_to(&id, Some("0000")),
            Err(SessionError::InvalidCredential)
        ));
    }

    // =====================================================================
    // rename()
    // =====================================================================

    #[tokio::test]
    async fn test_rename_to_own_name_is_allowed() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();

        let view = h.mgr.rename(&id, " Alice ").unwrap();

        assert_eq!(view.name, "Alice");
    }

    #[tokio::test]
    async fn test_rename_to_taken_name_is_rejected() {
        let mut h = harness();
        let alice = h.mgr.create("Alice", "1234").unwrap();
        h.mgr.create("Bob", "1234").unwrap();

        assert!(matches!(
            h.mgr.rename(&alice, "Bob"),
            Err(SessionError::DuplicateName(_))
        ));
        assert_eq!(h.mgr.get(&alice).unwrap().name, "Alice");
    }

    // =====================================================================
    // record_activity() / update_url() / update_state()
    // =====================================================================

    #[tokio::test]
    async fn test_record_activity_on_locked_profile_is_noop() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();
        h.mgr.lock(&id).unwrap();
        let before = h.mgr.get(&id).unwrap();

        h.clock.advance(Duration::from_secs(60));
        h.mgr.record_activity(&id);

        let after = h.mgr.get(&id).unwrap();
        assert!(after.is_locked);
        assert_eq!(after.last_accessed_at, before.last_accessed_at);
        assert!(!h.mgr.has_idle_timer(&id));
    }

    #[tokio::test]
    async fn test_record_activity_persists_new_timestamp() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();

        h.clock.advance(Duration::from_secs(60));
        h.mgr.record_activity(&id);

        let stored = h.store.get(crate::PROFILES_KEY).unwrap().unwrap();
        let touched = h.mgr.get(&id).unwrap().last_accessed_at;
        assert_eq!(stored[0]["lastAccessedAt"], json!(touched));
    }

    #[tokio::test]
    async fn test_record_activity_unknown_profile_is_noop() {
        let mut h = harness();

        h.mgr.record_activity(&ProfileId::from("ghost"));

        assert!(h.mgr.is_empty());
    }

    #[tokio::test]
    async fn test_update_url_rejects_non_http_schemes() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();

        h.mgr.update_url(&id, "javascript:alert(1)");
        assert_eq!(h.mgr.get(&id).unwrap().current_url, None);

        h.mgr.update_url(&id, "https://x.test/page");
        assert_eq!(
            h.mgr.get(&id).unwrap().current_url.as_deref(),
            Some("https://x.test/page")
        );

        h.mgr.update_url(&id, "file:///etc/passwd");
        assert_eq!(
            h.mgr.get(&id).unwrap().current_url.as_deref(),
            Some("https://x.test/page")
        );
    }

    #[tokio::test]
    async fn test_update_state_shallow_merges_and_touches() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();
        h.mgr.update_state(&id, patch(json!({"cart": [1], "tab": "sales"})));
        let before = h.mgr.get(&id).unwrap().last_accessed_at;

        h.clock.advance(Duration::from_secs(5));
        h.mgr.update_state(&id, patch(json!({"cart": [2, 3]})));

        let view = h.mgr.get(&id).unwrap();
        assert_eq!(view.state["cart"], json!([2, 3]));
        assert_eq!(view.state["tab"], json!("sales"));
        assert!(view.last_accessed_at > before);
    }

    // =====================================================================
    // list_all()
    // =====================================================================

    #[tokio::test]
    async fn test_list_all_sorted_most_recent_first() {
        let mut h = harness();
        let alice = h.mgr.create("Alice", "1234").unwrap();
        h.clock.advance(Duration::from_secs(1));
        h.mgr.create("Bob", "1234").unwrap();
        h.clock.advance(Duration::from_secs(1));
        h.mgr.record_activity(&alice);

        let names: Vec<String> = h.mgr.list_all().into_iter().map(|v| v.name).collect();

        assert_eq!(names, ["Alice", "Bob"]);
    }

    // =====================================================================
    // sweep_expired()
    // =====================================================================

    #[tokio::test]
    async fn test_sweep_expired_deletes_only_stale_profiles() {
        let mut h = harness();
        let old = h.mgr.create("Old", "1234").unwrap();
        h.clock.advance(Duration::from_secs(2 * 24 * 3600));
        let fresh = h.mgr.create("Fresh", "1234").unwrap();
        h.clock.advance(Duration::from_secs(2 * 24 * 3600));

        let deleted = h.mgr.sweep_expired(3);

        assert_eq!(deleted, 1);
        assert!(h.mgr.get(&old).is_none());
        assert!(h.mgr.get(&fresh).is_some());
        assert!(!h.mgr.has_idle_timer(&old));
    }

    #[tokio::test]
    async fn test_sweep_expired_nothing_stale_returns_zero() {
        let mut h = harness();
        h.mgr.create("Alice", "1234").unwrap();

        assert_eq!(h.mgr.sweep_expired(3), 0);
        assert_eq!(h.mgr.len(), 1);
    }

    // =====================================================================
    // Idle timeout
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_idle_expiry_locks_profile() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();

        let expiry = h.expiries.recv().await.unwrap();
        let locked = h.mgr.handle_idle_expiry(expiry);

        assert!(locked.is_some_and(|v| v.is_locked && v.id == id));
        assert!(!h.mgr.has_idle_timer(&id));
        assert_eq!(h.mgr.active_id(), Some(&id), "auto-lock keeps the pointer");
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_expiry_stale_after_activity_is_ignored() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();
        let stale = h.expiries.recv().await.unwrap();

        // Activity lands between the firing and its processing.
        h.mgr.record_activity(&id);

        assert!(h.mgr.handle_idle_expiry(stale).is_none());
        assert!(!h.mgr.get(&id).unwrap().is_locked);
        assert!(h.mgr.has_idle_timer(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_expiry_after_delete_is_ignored() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();
        let expiry = h.expiries.recv().await.unwrap();

        h.mgr.delete(&id).unwrap();

        assert!(h.mgr.handle_idle_expiry(expiry).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_idle_timeout_rescales_running_timers() {
        let mut h = harness();
        h.mgr.create("Alice", "1234").unwrap();
        let start = tokio::time::Instant::now();

        h.mgr.set_idle_timeout_minutes(5);
        let expiry = h.expiries.recv().await.unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(300) && elapsed < Duration::from_secs(301));
        assert!(h.mgr.handle_idle_expiry(expiry).is_some());
        assert_eq!(h.mgr.config().idle_timeout, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_set_idle_timeout_out_of_range_uses_default() {
        let mut h = harness();

        h.mgr.set_idle_timeout_minutes(500);

        assert_eq!(h.mgr.config().idle_timeout, Duration::from_secs(30 * 60));
    }

    // =====================================================================
    // clear_all() / restore()
    // =====================================================================

    #[tokio::test]
    async fn test_clear_all_removes_everything_including_store_keys() {
        let mut h = harness();
        let id = h.mgr.create("Alice", "1234").unwrap();
        h.mgr.validate_pin(&id, "0000").unwrap();

        h.mgr.clear_all();

        assert!(h.mgr.is_empty());
        assert!(h.mgr.active_id().is_none());
        assert!(!h.mgr.has_idle_timer(&id));
        assert_eq!(h.mgr.failed_attempts(&id), 0);
        assert!(h.store.get(crate::PROFILES_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restore_reproduces_profiles_active_and_lockouts() {
        let mut h = harness();
        let alice = h.mgr.create("Alice", "1234").unwrap();
        let bob = h.mgr.create("Bob", "5678").unwrap();
        h.mgr.lock(&bob).unwrap();
        for _ in 0..3 {
            let _ = h.mgr.validate_pin(&bob, "0000");
        }

        let (mut restored, _expiries) = SessionManager::restore(
            SessionConfig::default(),
            Arc::new(h.clock.clone()),
            Box::new(SyncWriter::new(h.store.clone())),
            h.store.as_ref(),
        );

        assert_eq!(restored.len(), 2);
        assert_eq!(restored.active_id(), Some(&bob));
        assert!(restored.has_idle_timer(&alice), "unlocked profiles re-arm");
        assert!(!restored.has_idle_timer(&bob), "locked profiles stay timer-free");
        assert!(restored.validate_pin(&alice, "1234").unwrap());
        assert!(matches!(
            restored.validate_pin(&bob, "5678"),
            Err(SessionError::LockedOut { .. })
        ));
    }

    #[tokio::test]
    async fn test_restore_drops_lockouts_of_profiles_not_restored() {
        let mut h = harness();
        let alice = h.mgr.create("Alice", "1234").unwrap();
        h.clock.advance(Duration::from_secs(1));
        let bob = h.mgr.create("Bob", "5678").unwrap();
        for id in [&alice, &bob] {
            for _ in 0..3 {
                let _ = h.mgr.validate_pin(id, "0000");
            }
        }
        let capped = SessionConfig {
            max_profiles: 1,
            ..SessionConfig::default()
        };

        let (mut restored, _expiries) = SessionManager::restore(
            capped,
            Arc::new(h.clock.clone()),
            Box::new(SyncWriter::new(Arc::new(MemoryStore::new()))),
            h.store.as_ref(),
        );

        assert_eq!(restored.len(), 1);
        assert!(restored.get(&alice).is_none(), "least recently used goes first");
        assert_eq!(restored.failed_attempts(&alice), 0);
        assert_eq!(restored.failed_attempts(&bob), 3);
        assert_eq!(restored.lockouts.len(), 1);
        assert!(restored.validate_pin(&bob, "5678").is_err());
    }

    #[tokio::test]
    async fn test_restore_from_corrupt_store_starts_empty() {
        let store = MemoryStore::new();
        store.set(crate::PROFILES_KEY, json!({"not": "a list"})).unwrap();

        let (mgr, _expiries) = SessionManager::restore(
            SessionConfig::default(),
            Arc::new(ManualClock::default()),
            Box::new(SyncWriter::new(Arc::new(MemoryStore::new()))),
            &store,
        );

        assert!(mgr.is_empty());
    }
}
