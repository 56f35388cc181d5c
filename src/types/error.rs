use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::UserId;

/// Errors produced by the follow graph core.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The referenced user does not exist.
    #[error("user {0} not found")]
    UserNotFound(UserId),
    /// A user tried to follow themselves.
    #[error("cannot follow yourself")]
    SelfFollow,
    /// The edge already exists.
    #[error("already following this user")]
    AlreadyFollowing,
    /// The edge to delete does not exist.
    #[error("not following this user")]
    NotFollowing,
    /// Provisioning collided with an existing username.
    #[error("username already exists")]
    DuplicateUsername,
    /// Provisioning collided with an existing email.
    #[error("email already exists")]
    DuplicateEmail,
    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
    /// The caller's deadline passed before the operation finished.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// No pooled connection became available in time.
    #[error("timed out after {0:?} waiting for a pooled connection")]
    PoolTimeout(Duration),
    /// Invalid argument.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// Stored data violates an invariant the schema should have enforced.
    #[error("corruption: {0}")]
    Corruption(String),
    /// Backing store failure.
    #[error("storage: {0}")]
    Storage(#[from] rusqlite::Error),
    /// IO failure.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Caller-facing classification of a [`GraphError`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown user id.
    NotFound,
    /// follower == following.
    SelfFollow,
    /// Duplicate edge.
    AlreadyFollowing,
    /// Delete of an absent edge.
    NotFollowing,
    /// Duplicate username or email during provisioning.
    Conflict,
    /// Structurally invalid request.
    InvalidInput,
    /// Cancelled by the caller.
    Cancelled,
    /// Caller deadline passed.
    DeadlineExceeded,
    /// Unexpected failure; details stay server-side.
    Internal,
}

impl GraphError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::UserNotFound(_) => ErrorKind::NotFound,
            GraphError::SelfFollow => ErrorKind::SelfFollow,
            GraphError::AlreadyFollowing => ErrorKind::AlreadyFollowing,
            GraphError::NotFollowing => ErrorKind::NotFollowing,
            GraphError::DuplicateUsername | GraphError::DuplicateEmail => ErrorKind::Conflict,
            GraphError::Invalid(_) => ErrorKind::InvalidInput,
            GraphError::Cancelled => ErrorKind::Cancelled,
            GraphError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            GraphError::PoolTimeout(_)
            | GraphError::Corruption(_)
            | GraphError::Storage(_)
            | GraphError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether this is an expected outcome of the follow state machine rather
    /// than a failure.
    pub fn is_domain(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound
                | ErrorKind::SelfFollow
                | ErrorKind::AlreadyFollowing
                | ErrorKind::NotFollowing
                | ErrorKind::Conflict
        )
    }
}
