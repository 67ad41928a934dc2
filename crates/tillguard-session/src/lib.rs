//! Local profile session management for Tillguard.
//!
//! This crate handles the lifecycle of the profiles sharing one device
//! (cashiers taking turns at a till, say):
//!
//! 1. **Credentials**: turning a 4-digit PIN into a salted, stretched hash
//!    and checking it in constant time ([`credential`])
//! 2. **Lockout**: refusing PIN checks for a while after repeated failures
//!    ([`LockoutTracker`])
//! 3. **Profile tracking**: who exists, who is active, who is locked
//!    ([`SessionManager`])
//! 4. **Idle auto-lock**: locking profiles nobody has touched for a while
//! 5. **Persistence**: snapshots to a pluggable key-value store
//!    ([`KeyValueStore`], [`SnapshotWriter`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Service layer (above)  ← runs the manager inside one actor task
//!     ↕
//! Session layer (this crate)  ← owns profiles, credentials, lockouts, timers
//!     ↕
//! Types / Timer layers (below)  ← ProfileId, events, idle timers
//! ```

mod backends;
mod clock;
mod config;
pub mod credential;
mod error;
mod lockout;
mod manager;
mod persistence;
mod profile;
mod store;

pub use backends::{JsonFileStore, MemoryStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SessionConfig;
pub use credential::Credential;
pub use error::{ErrorKind, SessionError};
pub use lockout::{FailureOutcome, LockoutRecord, LockoutTracker};
pub use manager::{ExpiryReceiver, IdleExpiry, SessionManager};
pub use persistence::{
    ACTIVE_KEY, KeyValueStore, LOCKOUTS_KEY, PROFILES_KEY, QueuedWriter, Snapshot,
    SnapshotWriter, StoreError, SyncWriter,
};
pub use profile::{is_navigable_url, validate_name};
pub use tillguard_types::{LifecycleEvent, ProfileId, ProfileState, ProfileView};
