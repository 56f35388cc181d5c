use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use tracing::info;

use crate::types::{GraphError, Result};

/// Ordered schema steps. Step `n` moves `user_version` from `n` to `n + 1`.
const MIGRATIONS: &[&str] = &[
    // 1: users and follow edges
    r#"
    CREATE TABLE users (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        username        TEXT    NOT NULL UNIQUE,
        email           TEXT    NOT NULL UNIQUE,
        followers_count INTEGER NOT NULL DEFAULT 0,
        following_count INTEGER NOT NULL DEFAULT 0,
        created_at      INTEGER NOT NULL,
        CONSTRAINT users_counts_non_negative
            CHECK (followers_count >= 0 AND following_count >= 0)
    );

    CREATE TABLE follows (
        follower_id  INTEGER NOT NULL REFERENCES users (id),
        following_id INTEGER NOT NULL REFERENCES users (id),
        created_at   INTEGER NOT NULL,
        PRIMARY KEY (follower_id, following_id),
        CONSTRAINT follows_no_self_follow CHECK (follower_id <> following_id)
    );

    CREATE INDEX idx_follows_follower_id ON follows (follower_id);
    CREATE INDEX idx_follows_following_id ON follows (following_id);
    "#,
    // 2: index-backed most-recent-first listings
    r#"
    CREATE INDEX idx_follows_following_recent ON follows (following_id, created_at DESC);
    CREATE INDEX idx_follows_follower_recent ON follows (follower_id, created_at DESC);
    "#,
];

/// Schema version produced by [`migrate`].
pub const SCHEMA_VERSION: u32 = MIGRATIONS.len() as u32;

/// Outcome of a [`migrate`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Version found before migrating.
    pub from: u32,
    /// Version after migrating.
    pub to: u32,
}

impl MigrationReport {
    /// Whether any step ran.
    pub fn applied(&self) -> bool {
        self.from != self.to
    }
}

/// Reads the schema version stamped on the database.
pub fn schema_version(conn: &Connection) -> Result<u32> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    u32::try_from(version)
        .map_err(|_| GraphError::Corruption(format!("invalid schema version {version}")))
}

/// Applies every pending migration in one write transaction.
///
/// Concurrent callers serialize on the write lock; the loser finds nothing
/// left to apply.
pub fn migrate(conn: &mut Connection) -> Result<MigrationReport> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let from = schema_version(&tx)?;
    if from > SCHEMA_VERSION {
        return Err(GraphError::Corruption(format!(
            "schema version {from} is newer than supported version {SCHEMA_VERSION}"
        )));
    }
    for (idx, step) in MIGRATIONS.iter().enumerate().skip(from as usize) {
        tx.execute_batch(step)?;
        info!(version = idx + 1, "applied schema migration");
    }
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;
    Ok(MigrationReport {
        from,
        to: SCHEMA_VERSION,
    })
}
