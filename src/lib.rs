//! A directed "follow" graph between users backed by SQLite.
//!
//! Edges and the denormalized `followers_count` / `following_count` counters
//! change together inside one store transaction, so the counters always match
//! the edge set after every committed mutation.

#![warn(missing_docs)]

pub mod admin;
pub mod config;
pub mod context;
pub mod graph;
pub mod logging;
pub mod server;
pub mod storage;
pub mod types;

pub use context::{CancelOnDrop, Context};
pub use graph::{Direction, FollowGraph};
pub use storage::{Store, StoreOptions};
pub use types::{ErrorKind, Follow, GraphError, NewUser, Page, Result, User, UserId};
