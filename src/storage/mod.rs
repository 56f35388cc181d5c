//! Relational backing store.
//!
//! SQLite is the single source of truth for users and follow edges. This
//! module owns the connection pool, schema migrations, and the mapping from
//! SQLite constraint failures to typed errors; it holds no graph state.

pub(crate) mod classify;
mod options;
mod pool;
mod schema;

use crate::context::Context;
use crate::types::Result;

pub use options::{StoreOptions, DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_BUSY_TIMEOUT, DEFAULT_POOL_SIZE};
pub use pool::{ConnectionPool, PoolStatus, PooledConnection};
pub use schema::{migrate, schema_version, MigrationReport, SCHEMA_VERSION};

/// Handle to an opened database: a connection pool over a migrated schema.
#[derive(Clone)]
pub struct Store {
    pool: ConnectionPool,
}

impl Store {
    /// Opens the database described by `opts`, migrating it when requested.
    pub fn open(opts: StoreOptions) -> Result<Self> {
        let migrate_on_open = opts.migrate;
        let pool = ConnectionPool::open(opts)?;
        let store = Self { pool };
        if migrate_on_open {
            store.migrate(&Context::background())?;
        }
        Ok(store)
    }

    /// Applies pending schema migrations.
    pub fn migrate(&self, ctx: &Context) -> Result<MigrationReport> {
        let mut conn = self.pool.get(ctx)?;
        migrate(&mut conn).map_err(|err| classify::settle(ctx, err))
    }

    /// Reads the stamped schema version.
    pub fn schema_version(&self, ctx: &Context) -> Result<u32> {
        let conn = self.pool.get(ctx)?;
        schema_version(&conn).map_err(|err| classify::settle(ctx, err))
    }

    /// Round-trips a trivial query; used by readiness probes.
    pub fn ping(&self, ctx: &Context) -> Result<()> {
        let conn = self.pool.get(ctx)?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|err| classify::settle(ctx, err.into()))?;
        Ok(())
    }

    /// Checks out a pooled connection bound to `ctx`.
    pub fn connection(&self, ctx: &Context) -> Result<PooledConnection> {
        self.pool.get(ctx)
    }

    /// The underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}
