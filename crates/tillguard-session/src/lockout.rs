//! Failed-attempt tracking and timed PIN lockout.
//!
//! Each profile is in one of three states:
//!
//! ```text
//!   Clean ──(wrong PIN)──→ Warned ──(attempts ≥ max)──→ Locked
//!     ↑                      │                            │
//!     └──────(right PIN)─────┘                            │
//!     └───────────────(window expires)────────────────────┘
//! ```
//!
//! `Clean` means "no record". The manager checks [`LockoutTracker::check_locked`]
//! *before* verifying a PIN, so attempts made during a lockout are rejected
//! without being counted and without running the (slow) verification.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tillguard_types::ProfileId;

use crate::clock::to_time_delta;

/// Outstanding failed attempts for one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockoutRecord {
    /// Consecutive failures since the last success (or record creation).
    pub attempts: u32,
    /// When checks are accepted again. `None` until the limit is hit.
    pub locked_until: Option<DateTime<Utc>>,
}

/// What [`LockoutTracker::record_failure`] decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still below the limit.
    Warned { attempts: u32, remaining_attempts: u32 },
    /// This failure hit the limit; checks are refused until `until`.
    LockedOut {
        until: DateTime<Utc>,
        remaining_secs: u64,
    },
}

/// Per-profile failure counters and lockout windows.
#[derive(Debug)]
pub struct LockoutTracker {
    records: HashMap<ProfileId, LockoutRecord>,
    max_attempts: u32,
    lockout_duration: chrono::TimeDelta,
}

impl LockoutTracker {
    pub fn new(max_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            records: HashMap::new(),
            max_attempts: max_attempts.max(1),
            lockout_duration: to_time_delta(lockout_duration),
        }
    }

    /// Returns the remaining lockout in whole seconds (rounded up) if `id`
    /// is currently locked out.
    ///
    /// A record whose window has already passed is deleted here, returning
    /// the profile to `Clean` with a fresh attempt budget.
    pub fn check_locked(&mut self, id: &ProfileId, now: DateTime<Utc>) -> Option<u64> {
        let until = self.records.get(id)?.locked_until?;
        if until > now {
            return Some(remaining_secs(until, now));
        }
        self.records.remove(id);
        tracing::debug!(profile_id = %id, "lockout window expired");
        None
    }

    /// Counts a failed PIN check.
    pub fn record_failure(&mut self, id: &ProfileId, now: DateTime<Utc>) -> FailureOutcome {
        let record = self.records.entry(id.clone()).or_insert(LockoutRecord {
            attempts: 0,
            locked_until: None,
        });

        // A stale window left behind (no `check_locked` in between) starts
        // a new round of attempts.
        if record.locked_until.is_some_and(|until| until <= now) {
            record.attempts = 0;
            record.locked_until = None;
        }

        record.attempts += 1;
        if record.attempts >= self.max_attempts {
            let until = now
                .checked_add_signed(self.lockout_duration)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            record.locked_until = Some(until);
            FailureOutcome::LockedOut {
                until,
                remaining_secs: remaining_secs(until, now),
            }
        } else {
            FailureOutcome::Warned {
                attempts: record.attempts,
                remaining_attempts: self.max_attempts - record.attempts,
            }
        }
    }

    /// A correct PIN clears the record entirely.
    pub fn record_success(&mut self, id: &ProfileId) {
        self.records.remove(id);
    }

    /// Forgets a profile (used when it is deleted).
    pub fn remove(&mut self, id: &ProfileId) {
        self.records.remove(id);
    }

    /// Consecutive failures currently counted for `id`.
    pub fn attempts(&self, id: &ProfileId) -> u32 {
        self.records.get(id).map_or(0, |r| r.attempts)
    }

    pub fn record(&self, id: &ProfileId) -> Option<&LockoutRecord> {
        self.records.get(id)
    }

    /// All records, for persistence.
    pub fn snapshot(&self) -> Vec<(ProfileId, LockoutRecord)> {
        self.records
            .iter()
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect()
    }

    /// Loads persisted records, keeping only lockouts still in force.
    ///
    /// Sub-limit attempt counts are not carried across a restart.
    pub fn restore(&mut self, records: Vec<(ProfileId, LockoutRecord)>, now: DateTime<Utc>) {
        self.records = records
            .into_iter()
            .filter(|(_, r)| r.locked_until.is_some_and(|until| until > now))
            .collect();
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn remaining_secs(until: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let ms = (until - now).num_milliseconds().max(0) as u64;
    ms.div_ceil(1000).max(1)
}
