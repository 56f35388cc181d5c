use rusqlite::{params, Connection, OptionalExtension};

use super::{fetch_user, user_from_row, Direction, FollowGraph, USER_COLUMNS};
use crate::context::Context;
use crate::types::{timestamp_from_micros, Follow, GraphError, Page, Result, User, UserId};

const COUNT_USERS: &str = "SELECT COUNT(*) FROM users";
const COUNT_FOLLOWERS: &str = "SELECT COUNT(*) FROM follows WHERE following_id = ?1";
const COUNT_FOLLOWING: &str = "SELECT COUNT(*) FROM follows WHERE follower_id = ?1";

impl FollowGraph {
    /// Fetches one user.
    ///
    /// # Errors
    ///
    /// [`GraphError::UserNotFound`] when no user has this id.
    pub fn get_user(&self, ctx: &Context, id: UserId) -> Result<User> {
        self.with_connection(ctx, |conn| {
            fetch_user(conn, id)?.ok_or(GraphError::UserNotFound(id))
        })
    }

    /// Lists users by ascending id.
    ///
    /// `limit` and `offset` are applied as given; callers own clamping.
    pub fn list_users(&self, ctx: &Context, limit: u32, offset: u64) -> Result<Page<User>> {
        self.with_connection(ctx, |conn| {
            let total = count(conn, COUNT_USERS, [])?;
            ctx.check()?;
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users u ORDER BY u.id ASC LIMIT ?1 OFFSET ?2"
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let items = stmt
                .query_map(params![i64::from(limit), sql_offset(offset)], user_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(Page {
                items,
                total,
                limit,
                offset,
            })
        })
    }

    /// Users following `user`, most recent follower first.
    ///
    /// `total` is counted from the edge set, not read from the user's
    /// `followers_count`, so the two can be cross-checked.
    pub fn get_followers(
        &self,
        ctx: &Context,
        user: UserId,
        limit: u32,
        offset: u64,
    ) -> Result<Page<User>> {
        self.neighbors(ctx, user, Direction::Followers, limit, offset)
    }

    /// Users `user` follows, most recently followed first.
    pub fn get_following(
        &self,
        ctx: &Context,
        user: UserId,
        limit: u32,
        offset: u64,
    ) -> Result<Page<User>> {
        self.neighbors(ctx, user, Direction::Following, limit, offset)
    }

    /// Lists one side of `user`'s edges.
    ///
    /// The count and the window are two separate reads; under concurrent
    /// writes `total` may describe a slightly different instant than `items`.
    pub fn neighbors(
        &self,
        ctx: &Context,
        user: UserId,
        dir: Direction,
        limit: u32,
        offset: u64,
    ) -> Result<Page<User>> {
        let (count_sql, join_col, filter_col) = match dir {
            Direction::Followers => (COUNT_FOLLOWERS, "follower_id", "following_id"),
            Direction::Following => (COUNT_FOLLOWING, "following_id", "follower_id"),
        };
        self.with_connection(ctx, |conn| {
            let total = count(conn, count_sql, [user.0])?;
            ctx.check()?;
            let sql = format!(
                "SELECT {USER_COLUMNS}
                 FROM follows f
                 INNER JOIN users u ON u.id = f.{join_col}
                 WHERE f.{filter_col} = ?1
                 ORDER BY f.created_at DESC, f.rowid DESC
                 LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let items = stmt
                .query_map(
                    params![user.0, i64::from(limit), sql_offset(offset)],
                    user_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(Page {
                items,
                total,
                limit,
                offset,
            })
        })
    }

    /// Returns the edge `follower -> following` if it exists.
    pub fn get_follow(
        &self,
        ctx: &Context,
        follower: UserId,
        following: UserId,
    ) -> Result<Option<Follow>> {
        self.with_connection(ctx, |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT created_at FROM follows WHERE follower_id = ?1 AND following_id = ?2",
            )?;
            let created: Option<i64> = stmt
                .query_row(params![follower.0, following.0], |row| row.get(0))
                .optional()?;
            created
                .map(|micros| {
                    let created_at = timestamp_from_micros(micros).map_err(|_| {
                        GraphError::Corruption(format!(
                            "edge {follower}->{following} has out-of-range timestamp {micros}"
                        ))
                    })?;
                    Ok(Follow {
                        follower_id: follower,
                        following_id: following,
                        created_at,
                    })
                })
                .transpose()
        })
    }

    /// Whether `follower` currently follows `following`.
    pub fn is_following(
        &self,
        ctx: &Context,
        follower: UserId,
        following: UserId,
    ) -> Result<bool> {
        Ok(self.get_follow(ctx, follower, following)?.is_some())
    }

    /// Total number of follow edges.
    pub fn edge_count(&self, ctx: &Context) -> Result<u64> {
        self.with_connection(ctx, |conn| count(conn, "SELECT COUNT(*) FROM follows", []))
    }
}

fn count<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<u64> {
    let mut stmt = conn.prepare_cached(sql)?;
    let raw: i64 = stmt.query_row(params, |row| row.get(0))?;
    u64::try_from(raw).map_err(|_| GraphError::Corruption(format!("negative count {raw}")))
}

/// SQLite takes signed offsets; anything past `i64::MAX` is past the end anyway.
fn sql_offset(offset: u64) -> i64 {
    i64::try_from(offset).unwrap_or(i64::MAX)
}
