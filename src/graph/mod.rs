#![forbid(unsafe_code)]

//! The follow graph engine.
//!
//! [`FollowGraph`] is the core contract consumed by the boundary adapter. Read
//! paths live in `query`, the transactional Follow/Unfollow rules in
//! `mutation`. The engine keeps no graph state of its own: every call checks
//! out a pooled connection, re-reads what it needs, and returns it.

mod mutation;
mod query;
mod rows;

use crate::context::Context;
use crate::storage::{classify, PooledConnection, Store, StoreOptions};
use crate::types::Result;

pub(crate) use rows::{fetch_user, user_exists, user_from_row, USER_COLUMNS};

/// Which side of a user's edges a listing walks.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Users following the subject (edges terminating at it).
    Followers,
    /// Users the subject follows (edges originating from it).
    Following,
}

/// Entry point for graph reads and mutations.
#[derive(Clone)]
pub struct FollowGraph {
    store: Store,
}

impl FollowGraph {
    /// Opens (and by default migrates) the database described by `opts`.
    pub fn open(opts: StoreOptions) -> Result<Self> {
        Ok(Self::new(Store::open(opts)?))
    }

    /// Wraps an already opened store.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// The backing store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Runs `f` on a connection bound to `ctx`, translating statement
    /// interrupts into the context's cancellation error.
    pub(crate) fn with_connection<T>(
        &self,
        ctx: &Context,
        f: impl FnOnce(&mut PooledConnection) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.store.connection(ctx)?;
        f(&mut conn).map_err(|err| classify::settle(ctx, err))
    }
}
