//! Error types for the session layer.

use tillguard_types::ProfileId;

/// Errors that can occur during profile session management.
///
/// Every error is raised to the immediate caller and leaves the manager's
/// state exactly as it was before the call. Nothing is retried internally;
/// re-prompting for a PIN is the UI's business.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The profile name is empty after trimming, too long, or contains
    /// control characters.
    #[error("invalid profile name: {0}")]
    InvalidName(&'static str),

    /// The PIN is not exactly four ASCII digits.
    #[error("PIN must be exactly 4 digits")]
    InvalidPinFormat,

    /// Another live profile already uses this name (case-sensitive).
    #[error("profile name already exists: {0}")]
    DuplicateName(String),

    /// The device already holds the maximum number of profiles.
    #[error("maximum of {max} profiles allowed")]
    CapacityExceeded { max: usize },

    /// No profile exists with this id. It may have been deleted or swept.
    #[error("profile not found: {0}")]
    NotFound(ProfileId),

    /// The PIN was well-formed but wrong.
    #[error("invalid PIN")]
    InvalidCredential,

    /// Too many failed PIN attempts; checks are refused until the lockout
    /// window ends.
    #[error("too many failed attempts, try again in {remaining_secs} seconds")]
    LockedOut { remaining_secs: u64 },

    /// The profile is locked and the caller tried to switch to it without
    /// supplying a PIN.
    #[error("PIN required to switch to locked profile {0}")]
    PinRequired(ProfileId),
}

/// Coarse classification of a [`SessionError`], for callers that map
/// errors onto UI prompts rather than matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    DuplicateName,
    CapacityExceeded,
    NotFound,
    InvalidCredential,
    LockedOut,
    PinRequired,
}

impl SessionError {
    /// Which broad category this error falls into.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidName(_) | Self::InvalidPinFormat => ErrorKind::InvalidInput,
            Self::DuplicateName(_) => ErrorKind::DuplicateName,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidCredential => ErrorKind::InvalidCredential,
            Self::LockedOut { .. } => ErrorKind::LockedOut,
            Self::PinRequired(_) => ErrorKind::PinRequired,
        }
    }
}
