//! Error types for remote operations.

use thiserror::Error;

/// Failure reported by the remote (or the transport underneath it).
///
/// Only [`RemoteError::Conflict`] is ever retried; everything else is
/// structural and surfaces immediately.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    /// The push was rejected because the base tip is no longer the branch
    /// head. Carries the remote's diagnostic when available.
    #[error("concurrent update rejected: {0}")]
    Conflict(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    /// Any other remote failure; the remote's message is passed through
    /// unmodified when available.
    #[error("remote error: {0}")]
    Remote(String),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for remote operations.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Terminal outcome of a publish call.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error(
        "publish gave up after {attempts} attempts: the branch head kept moving \
         (likely a concurrent edit of the same branch)"
    )]
    ConflictExhausted { attempts: u32 },

    #[error(transparent)]
    Remote(#[from] RemoteError),
}
