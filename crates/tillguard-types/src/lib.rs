//! Shared value types for Tillguard.
//!
//! This crate defines the data that crosses the session engine's boundary:
//!
//! - **Identity** ([`ProfileId`]): the opaque handle callers use to name a
//!   profile.
//! - **Views** ([`ProfileView`], [`ProfileState`]): what a caller is allowed
//!   to see about a profile. Credentials never appear here.
//! - **Events** ([`LifecycleEvent`]): what the engine announces when a
//!   profile is created, deleted, locked, unlocked, switched to, or renamed.
//!
//! # Architecture
//!
//! ```text
//! UI / IPC bridge  ← consumes ProfileView and LifecycleEvent
//!     ↕
//! Types (this crate)
//!     ↕
//! Session engine   ← produces them, owns the private profile records
//! ```

mod event;
mod types;

pub use event::LifecycleEvent;
pub use types::{ProfileId, ProfileState, ProfileView};
