use rusqlite::{params, Transaction};
use tracing::debug;

use super::{user_exists, FollowGraph};
use crate::context::Context;
use crate::storage::classify::{violation, Constraint};
use crate::types::{now_micros, timestamp_from_micros, Follow, GraphError, Result, UserId};

const INSERT_EDGE: &str =
    "INSERT INTO follows (follower_id, following_id, created_at) VALUES (?1, ?2, ?3)";
const DELETE_EDGE: &str = "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2";

const INCR_FOLLOWING: &str =
    "UPDATE users SET following_count = following_count + 1 WHERE id = ?1";
const INCR_FOLLOWERS: &str =
    "UPDATE users SET followers_count = followers_count + 1 WHERE id = ?1";
const DECR_FOLLOWING: &str =
    "UPDATE users SET following_count = following_count - 1 WHERE id = ?1";
const DECR_FOLLOWERS: &str =
    "UPDATE users SET followers_count = followers_count - 1 WHERE id = ?1";

impl FollowGraph {
    /// Creates the edge `follower -> following` and bumps both counters.
    ///
    /// The edge insert and both counter increments commit together or not at
    /// all. Two concurrent calls for the same pair serialize on the store's
    /// write lock: one commits, the other hits the composite key and reports
    /// [`GraphError::AlreadyFollowing`].
    ///
    /// # Errors
    ///
    /// * [`GraphError::SelfFollow`] when both ids are equal (no store access).
    /// * [`GraphError::UserNotFound`] when either user is missing.
    /// * [`GraphError::AlreadyFollowing`] when the edge exists.
    /// * [`GraphError::Cancelled`] / [`GraphError::DeadlineExceeded`] when
    ///   `ctx` is done before commit; nothing is written.
    pub fn follow(&self, ctx: &Context, follower: UserId, following: UserId) -> Result<Follow> {
        if follower == following {
            return Err(GraphError::SelfFollow);
        }
        ctx.check()?;
        self.with_connection(ctx, |conn| {
            for id in [follower, following] {
                if !user_exists(conn, id)? {
                    return Err(GraphError::UserNotFound(id));
                }
            }
            ctx.check()?;

            let tx = conn.write_transaction()?;
            let created_micros = now_micros();
            insert_edge(&tx, follower, following, created_micros)?;
            apply(&tx, INCR_FOLLOWING, follower)?;
            apply(&tx, INCR_FOLLOWERS, following)?;
            ctx.check()?;
            tx.commit()?;

            debug!(follower_id = %follower, following_id = %following, "follow committed");
            Ok(Follow {
                follower_id: follower,
                following_id: following,
                created_at: timestamp_from_micros(created_micros)
                    .map_err(|err| GraphError::Corruption(err.to_string()))?,
            })
        })
    }

    /// Removes the edge `follower -> following` and decrements both counters.
    ///
    /// # Errors
    ///
    /// * [`GraphError::NotFollowing`] when no such edge exists; counters are
    ///   left untouched.
    /// * [`GraphError::Cancelled`] / [`GraphError::DeadlineExceeded`] when
    ///   `ctx` is done before commit; nothing is written.
    pub fn unfollow(&self, ctx: &Context, follower: UserId, following: UserId) -> Result<()> {
        ctx.check()?;
        self.with_connection(ctx, |conn| {
            let tx = conn.write_transaction()?;
            let removed = tx.execute(DELETE_EDGE, params![follower.0, following.0])?;
            match removed {
                0 => return Err(GraphError::NotFollowing),
                1 => {}
                n => {
                    return Err(GraphError::Corruption(format!(
                        "{n} edges stored for {follower}->{following}"
                    )))
                }
            }
            apply(&tx, DECR_FOLLOWING, follower)?;
            apply(&tx, DECR_FOLLOWERS, following)?;
            ctx.check()?;
            tx.commit()?;

            debug!(follower_id = %follower, following_id = %following, "unfollow committed");
            Ok(())
        })
    }
}

fn insert_edge(
    tx: &Transaction<'_>,
    follower: UserId,
    following: UserId,
    created_micros: i64,
) -> Result<()> {
    let err = match tx.execute(INSERT_EDGE, params![follower.0, following.0, created_micros]) {
        Ok(_) => return Ok(()),
        Err(err) => err,
    };
    let Some(constraint) = violation(&err).map(|v| v.constraint) else {
        return Err(err.into());
    };
    match constraint {
        Constraint::PrimaryKey | Constraint::Unique => Err(GraphError::AlreadyFollowing),
        Constraint::Check => Err(GraphError::SelfFollow),
        Constraint::ForeignKey => {
            // A user vanished between the existence check and the insert.
            let missing = if user_exists(tx, follower)? {
                following
            } else {
                follower
            };
            Err(GraphError::UserNotFound(missing))
        }
        Constraint::NotNull | Constraint::Other => Err(err.into()),
    }
}

/// Runs one relative counter update; exactly one row must change.
fn apply(tx: &Transaction<'_>, sql: &'static str, id: UserId) -> Result<()> {
    match tx.execute(sql, [id.0]) {
        Ok(1) => Ok(()),
        Ok(0) => Err(GraphError::UserNotFound(id)),
        Ok(n) => Err(GraphError::Corruption(format!("{n} user rows share id {id}"))),
        Err(err) => {
            let constraint = violation(&err).map(|v| v.constraint);
            if constraint == Some(Constraint::Check) {
                return Err(GraphError::Corruption(format!(
                    "counter of user {id} would drop below zero"
                )));
            }
            Err(err.into())
        }
    }
}
