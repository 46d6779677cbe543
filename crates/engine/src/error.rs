//! Engine errors

use inbox_core::ParsePriorityError;
use inbox_ports::BackendError;
use thiserror::Error;

/// Commands rejected before any backend call is made
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error(transparent)]
    InvalidPriority(#[from] ParsePriorityError),

    #[error("No authenticated session")]
    NoSession,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InboxError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("A snapshot load is already in flight")]
    LoadInFlight,

    #[error("Session ended before the operation completed")]
    SessionClosed,
}

impl InboxError {
    /// Returns true if the session was torn down because of this error
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, InboxError::Backend(e) if e.is_unauthorized())
    }
}

pub type Result<T> = std::result::Result<T, InboxError>;
