#![forbid(unsafe_code)]

//! Identifiers, records, and the error type shared by every layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

mod error;

pub use error::{ErrorKind, GraphError, Result};

/// Opaque user identifier. Valid ids are positive.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Returns true when the id could name a stored user.
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        UserId(value)
    }
}

impl From<UserId> for i64 {
    fn from(value: UserId) -> Self {
        value.0
    }
}

/// A user record with its denormalized relationship counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Store-assigned identifier.
    pub id: UserId,
    /// Unique handle.
    pub username: String,
    /// Unique email address.
    pub email: String,
    /// Number of edges terminating at this user.
    pub followers_count: u64,
    /// Number of edges originating from this user.
    pub following_count: u64,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A directed follow edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follow {
    /// The user doing the following.
    pub follower_id: UserId,
    /// The user being followed.
    pub following_id: UserId,
    /// When the edge was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// One window of an ordered listing plus the size of the whole listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    /// Rows inside the requested window.
    pub items: Vec<T>,
    /// Total rows across all windows, counted independently of `items`.
    pub total: u64,
    /// Window size that was requested.
    pub limit: u32,
    /// Window start that was requested.
    pub offset: u64,
}

impl<T> Page<T> {
    /// Number of rows in this window.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether this window is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Input for provisioning a new user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    /// Requested handle.
    pub username: String,
    /// Requested email address.
    pub email: String,
}

impl NewUser {
    /// Convenience constructor.
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
        }
    }
}

/// Current wall-clock time as unix microseconds, the on-disk timestamp unit.
pub fn now_micros() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000) as i64
}

/// Converts stored unix microseconds back into a timestamp.
pub fn timestamp_from_micros(
    micros: i64,
) -> std::result::Result<OffsetDateTime, time::error::ComponentRange> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000)
}
