//! # Tillguard
//!
//! PIN-gated local profiles for shared point-of-sale terminals.
//!
//! Several cashiers share one device. Each gets a profile protected by a
//! 4-digit PIN; profiles lock themselves when left idle, repeated wrong
//! PINs trigger a timed lockout, and profiles nobody has used for days
//! are swept away. This crate runs the session engine from
//! [`tillguard_session`] inside a single actor task and gives the UI a
//! cloneable async [`SessionHandle`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tillguard::prelude::*;
//!
//! # async fn run() -> Result<(), TillguardError> {
//! let service = SessionService::builder()
//!     .json_file("sessions.json")?
//!     .spawn();
//! let sessions = service.handle();
//!
//! let alice = sessions.create("Alice", "1234").await?;
//! sessions.lock(&alice).await?;
//! sessions.unlock(&alice, "1234").await?;
//!
//! service.shutdown().await
//! # }
//! ```

mod actor;
mod config;
mod error;
mod handle;
mod service;
pub mod telemetry;

pub use config::ServiceConfig;
pub use error::TillguardError;
pub use handle::SessionHandle;
pub use service::{SessionService, SessionServiceBuilder};

/// Re-exports everything a host usually needs.
pub mod prelude {
    pub use crate::{ServiceConfig, SessionHandle, SessionService, TillguardError};
    pub use tillguard_session::{
        ErrorKind, KeyValueStore, LifecycleEvent, ProfileId, ProfileState, ProfileView,
        SessionConfig, SessionError,
    };
}
