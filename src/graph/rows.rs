use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::types::{timestamp_from_micros, Result, User, UserId};

/// Column list matching [`user_from_row`], qualified with the `u` alias.
pub(crate) const USER_COLUMNS: &str =
    "u.id, u.username, u.email, u.followers_count, u.following_count, u.created_at";

/// Decodes a row selected with [`USER_COLUMNS`].
pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let created_micros: i64 = row.get(5)?;
    let created_at = timestamp_from_micros(created_micros).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(5, Type::Integer, Box::new(err))
    })?;
    Ok(User {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        email: row.get(2)?,
        followers_count: counter(row, 3)?,
        following_count: counter(row, 4)?,
        created_at,
    })
}

fn counter(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    u64::try_from(raw).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, raw))
}

/// Loads one user, `None` when the id is unknown.
pub(crate) fn fetch_user(conn: &Connection, id: UserId) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1");
    let mut stmt = conn.prepare_cached(&sql)?;
    Ok(stmt.query_row([id.0], user_from_row).optional()?)
}

/// Whether a user row exists.
pub(crate) fn user_exists(conn: &Connection, id: UserId) -> Result<bool> {
    let mut stmt = conn.prepare_cached("SELECT EXISTS (SELECT 1 FROM users WHERE id = ?1)")?;
    Ok(stmt.query_row([id.0], |row| row.get(0))?)
}
