use thiserror::Error;

/// Errors returned by request/response calls against the backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Network or service failure; the same call may succeed later
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The session credentials are no longer accepted
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The backend refused the request itself (constraint, policy, ...)
    #[error("Rejected by backend: {0}")]
    Rejected(String),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, BackendError::Unauthorized(_))
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Errors surfaced by a change feed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The stream dropped; events emitted while down are not replayed
    #[error("Change stream disconnected: {0}")]
    Disconnected(String),

    /// The consumer fell behind and the transport discarded events
    #[error("Change stream lagged, {0} events dropped")]
    Lagged(u64),

    /// The feed could not be opened right now
    #[error("Change feed unavailable: {0}")]
    Unavailable(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl FeedError {
    /// Returns true if events may have been missed and local state needs a re-read
    pub fn requires_resync(&self) -> bool {
        matches!(self, FeedError::Disconnected(_) | FeedError::Lagged(_))
    }
}
