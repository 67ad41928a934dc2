//! Session engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::credential::{DEFAULT_STRETCH_ROUNDS, MAX_STRETCH_ROUNDS};

/// Hard ceiling on live profiles. Configuration can lower it, never raise it.
pub const MAX_PROFILES: usize = 5;

/// Accepted idle-timeout range, in minutes.
pub const MIN_IDLE_TIMEOUT_MINUTES: u64 = 5;
pub const MAX_IDLE_TIMEOUT_MINUTES: u64 = 120;
pub const DEFAULT_IDLE_TIMEOUT_MINUTES: u64 = 30;

/// Longest lockout configuration may ask for.
pub const MAX_LOCKOUT_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Retention beyond ten years is treated as ten years.
pub const MAX_RETENTION_DAYS: u32 = 3650;

/// Configuration for the session engine.
///
/// Hosts usually load this from their own settings file, so every field
/// has a default and missing fields deserialize to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How many profiles may exist at once. Capped at [`MAX_PROFILES`].
    pub max_profiles: usize,

    /// Inactivity window after which an unlocked profile locks itself.
    /// Default: 30 minutes. Accepted range: 5–120 minutes.
    pub idle_timeout: Duration,

    /// Consecutive wrong PINs that trigger a lockout. Default: 3.
    pub max_pin_attempts: u32,

    /// How long a lockout lasts. Default: 5 minutes.
    pub lockout_duration: Duration,

    /// Profiles untouched for longer than this many days are deleted by
    /// the retention sweep. Default: 3.
    pub retention_days: u32,

    /// SHA-256 iterations used when deriving a new PIN credential.
    /// Existing credentials keep the round count they were created with.
    pub stretch_rounds: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_profiles: MAX_PROFILES,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_MINUTES * 60),
            max_pin_attempts: 3,
            lockout_duration: Duration::from_secs(5 * 60),
            retention_days: 3,
            stretch_rounds: DEFAULT_STRETCH_ROUNDS,
        }
    }
}

impl SessionConfig {
    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called automatically when a `SessionManager` is constructed. Rules:
    /// - `max_profiles` clamped to `1..=MAX_PROFILES`.
    /// - `idle_timeout` outside 5–120 minutes falls back to 30 minutes.
    /// - `max_pin_attempts` at least 1.
    /// - `stretch_rounds` clamped to `1..=MAX_STRETCH_ROUNDS`.
    /// - `lockout_duration` capped to [`MAX_LOCKOUT_DURATION`].
    /// - `retention_days` capped to [`MAX_RETENTION_DAYS`].
    pub fn validated(mut self) -> Self {
        if self.max_profiles == 0 || self.max_profiles > MAX_PROFILES {
            warn!(
                max_profiles = self.max_profiles,
                cap = MAX_PROFILES,
                "max_profiles out of range, clamping"
            );
            self.max_profiles = self.max_profiles.clamp(1, MAX_PROFILES);
        }
        let minutes = self.idle_timeout.as_secs() / 60;
        self.idle_timeout = Self::idle_timeout_from_minutes(minutes);
        if self.max_pin_attempts == 0 {
            self.max_pin_attempts = 1;
        }
        if self.stretch_rounds == 0 {
            self.stretch_rounds = 1;
        } else if self.stretch_rounds > MAX_STRETCH_ROUNDS {
            warn!(
                stretch_rounds = self.stretch_rounds,
                cap = MAX_STRETCH_ROUNDS,
                "stretch_rounds too high, clamping"
            );
            self.stretch_rounds = MAX_STRETCH_ROUNDS;
        }
        if self.lockout_duration > MAX_LOCKOUT_DURATION {
            warn!(
                lockout_secs = self.lockout_duration.as_secs(),
                cap_secs = MAX_LOCKOUT_DURATION.as_secs(),
                "lockout_duration too long, clamping"
            );
            self.lockout_duration = MAX_LOCKOUT_DURATION;
        }
        self.retention_days = self.retention_days.min(MAX_RETENTION_DAYS);
        self
    }

    /// Converts a requested idle timeout in minutes to a duration, falling
    /// back to the default for anything outside 5–120.
    pub fn idle_timeout_from_minutes(minutes: u64) -> Duration {
        let minutes = if (MIN_IDLE_TIMEOUT_MINUTES..=MAX_IDLE_TIMEOUT_MINUTES).contains(&minutes) {
            minutes
        } else {
            warn!(
                minutes,
                default = DEFAULT_IDLE_TIMEOUT_MINUTES,
                "invalid idle timeout, using default"
            );
            DEFAULT_IDLE_TIMEOUT_MINUTES
        };
        Duration::from_secs(minutes * 60)
    }
}
