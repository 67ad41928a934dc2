//! Unified error type for the Tillguard service.

use tillguard_session::{SessionError, StoreError};

/// Top-level error that wraps the session layer's errors.
///
/// When talking to the service through a [`SessionHandle`](crate::SessionHandle)
/// you deal with this single error type. The `#[from]` attributes let `?`
/// convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TillguardError {
    /// The operation was rejected by the session engine (bad PIN, lockout,
    /// unknown profile, ...).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The backing store could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The service task has stopped, so nothing can answer the request.
    #[error("session service is not running")]
    ServiceUnavailable,
}

impl TillguardError {
    /// The session error inside, if this is one.
    pub fn as_session(&self) -> Option<&SessionError> {
        match self {
            Self::Session(e) => Some(e),
            _ => None,
        }
    }
}
