use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use tracing::{debug, warn};

use super::classify::is_busy;
use super::options::StoreOptions;
use crate::context::Context;
use crate::types::{GraphError, Result};

/// SQLite virtual machine instructions between cancellation polls.
const PROGRESS_OPS: i32 = 1_000;
/// Longest a waiting checkout sleeps before re-checking its context.
const WAIT_SLICE: Duration = Duration::from_millis(25);
/// Longest SQLite sleeps on a locked database before a write transaction
/// re-checks its context.
const BUSY_SLICE: Duration = Duration::from_millis(25);

/// Fixed-size pool of SQLite connections to one database file.
///
/// Connections are opened lazily up to `pool_size`. A checkout blocks until a
/// connection is free, the acquire timeout elapses, or the caller's context
/// is done.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    opts: StoreOptions,
    state: Mutex<PoolState>,
    available: Condvar,
}

#[derive(Default)]
struct PoolState {
    idle: Vec<Connection>,
    open: usize,
}

/// Snapshot of pool occupancy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct PoolStatus {
    /// Connections currently open (idle or checked out).
    pub open: usize,
    /// Connections waiting in the pool.
    pub idle: usize,
    /// Configured maximum.
    pub max: usize,
}

impl ConnectionPool {
    /// Opens the pool and eagerly establishes one connection so that a bad
    /// path fails here rather than on first use.
    pub fn open(opts: StoreOptions) -> Result<Self> {
        if opts.pool_size == 0 {
            return Err(GraphError::Invalid("pool size must be at least 1"));
        }
        if !opts.create_if_missing && !opts.path.exists() {
            return Err(GraphError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("database not found: {}", opts.path.display()),
            )));
        }
        let first = open_connection(&opts)?;
        debug!(path = %opts.path.display(), pool_size = opts.pool_size, "connection pool opened");
        Ok(Self {
            inner: Arc::new(PoolInner {
                opts,
                state: Mutex::new(PoolState {
                    idle: vec![first],
                    open: 1,
                }),
                available: Condvar::new(),
            }),
        })
    }

    /// Options the pool was opened with.
    pub fn options(&self) -> &StoreOptions {
        &self.inner.opts
    }

    /// Current occupancy.
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            open: state.open,
            idle: state.idle.len(),
            max: self.inner.opts.pool_size,
        }
    }

    /// Checks out a connection bound to `ctx`.
    ///
    /// While checked out, the connection interrupts any running statement once
    /// `ctx` is cancelled or past its deadline.
    pub fn get(&self, ctx: &Context) -> Result<PooledConnection> {
        ctx.check()?;
        let acquire_timeout = self.inner.opts.acquire_timeout;
        let give_up = Instant::now() + acquire_timeout;
        let mut state = self.inner.state.lock();
        loop {
            if let Some(conn) = state.idle.pop() {
                drop(state);
                return self.bind(conn, ctx);
            }
            if state.open < self.inner.opts.pool_size {
                state.open += 1;
                drop(state);
                return match open_connection(&self.inner.opts) {
                    Ok(conn) => self.bind(conn, ctx),
                    Err(err) => {
                        self.inner.state.lock().open -= 1;
                        self.inner.available.notify_one();
                        Err(err)
                    }
                };
            }

            ctx.check()?;
            let now = Instant::now();
            if now >= give_up {
                warn!(?acquire_timeout, "connection pool exhausted");
                return Err(GraphError::PoolTimeout(acquire_timeout));
            }
            let mut wake = give_up;
            if let Some(deadline) = ctx.deadline() {
                wake = wake.min(deadline);
            }
            let slice = wake.saturating_duration_since(now).min(WAIT_SLICE);
            self.inner.available.wait_for(&mut state, slice);
        }
    }

    fn bind(&self, conn: Connection, ctx: &Context) -> Result<PooledConnection> {
        // SQLite's busy wait never runs the progress handler, so a deadline
        // has to bound it directly.
        let busy_budget = ctx
            .remaining()
            .map_or(self.inner.opts.busy_timeout, |left| {
                left.min(self.inner.opts.busy_timeout)
            });
        let pooled = PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            ctx: ctx.clone(),
            busy_budget,
        };
        pooled.busy_timeout(busy_budget)?;
        pooled.progress_handler(PROGRESS_OPS, Some(ctx.interrupter()));
        Ok(pooled)
    }
}

/// A connection on loan from a [`ConnectionPool`]; returned on drop.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
    ctx: Context,
    busy_budget: Duration,
}

impl PooledConnection {
    /// Opens a `BEGIN IMMEDIATE` transaction, waiting for the write lock.
    ///
    /// The wait polls the bound context between short busy slices and gives
    /// up with the context's error once it is done, or with `SQLITE_BUSY`
    /// once the busy budget is spent.
    pub fn write_transaction(&self) -> Result<Transaction<'_>> {
        let give_up = Instant::now() + self.busy_budget;
        self.busy_timeout(BUSY_SLICE.min(self.busy_budget))?;
        let outcome = loop {
            match Transaction::new_unchecked(self, TransactionBehavior::Immediate) {
                Ok(tx) => break Ok(tx),
                Err(err) if is_busy(&err) => {
                    if let Err(ctx_err) = self.ctx.check() {
                        break Err(ctx_err);
                    }
                    if Instant::now() >= give_up {
                        break Err(err.into());
                    }
                }
                Err(err) => break Err(err.into()),
            }
        };
        self.busy_timeout(self.busy_budget)?;
        outcome
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("pooled connection used after release")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("pooled connection used after release")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        conn.progress_handler(0, None::<fn() -> bool>);
        if let Err(err) = conn.busy_timeout(self.pool.opts.busy_timeout) {
            debug!(%err, "failed to reset busy timeout");
        }
        let mut state = self.pool.state.lock();
        if conn.is_autocommit() {
            state.idle.push(conn);
        } else {
            // Still inside a transaction: never hand that to the next caller.
            state.open -= 1;
            drop(state);
            warn!("discarding pooled connection left inside a transaction");
        }
        self.pool.available.notify_one();
    }
}

fn open_connection(opts: &StoreOptions) -> Result<Connection> {
    let flags = if opts.create_if_missing {
        OpenFlags::default()
    } else {
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
    };
    let conn = Connection::open_with_flags(&opts.path, flags)?;
    conn.busy_timeout(opts.busy_timeout)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        debug!(%mode, "database did not switch to WAL journaling");
    }
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}
