use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use tracing::info;

use crate::context::Context;
use crate::graph::{fetch_user, user_from_row, FollowGraph, USER_COLUMNS};
use crate::storage::classify::{violation, Constraint};
use crate::types::{now_micros, GraphError, NewUser, Result, User, UserId};

const MAX_USERNAME_LEN: usize = 64;
const MAX_EMAIL_LEN: usize = 254;

/// Creates a user with zeroed counters.
///
/// # Errors
///
/// * [`GraphError::Invalid`] for an empty or oversized username, or an email
///   without a local part and a domain.
/// * [`GraphError::DuplicateUsername`] / [`GraphError::DuplicateEmail`] when
///   either unique column collides.
pub fn create_user(graph: &FollowGraph, ctx: &Context, new: &NewUser) -> Result<User> {
    let username = new.username.trim();
    let email = new.email.trim();
    validate(username, email)?;
    let user = graph.with_connection(ctx, |conn| {
        let inserted = conn.execute(
            "INSERT INTO users (username, email, created_at) VALUES (?1, ?2, ?3)",
            params![username, email, now_micros()],
        );
        if let Err(err) = inserted {
            let duplicate = violation(&err)
                .filter(|v| v.constraint == Constraint::Unique)
                .map(|v| v.names("users.email"));
            return Err(match duplicate {
                Some(true) => GraphError::DuplicateEmail,
                Some(false) => GraphError::DuplicateUsername,
                None => err.into(),
            });
        }
        let id = UserId(conn.last_insert_rowid());
        fetch_user(conn, id)?.ok_or(GraphError::UserNotFound(id))
    })?;
    info!(user_id = %user.id, username = %user.username, "user created");
    Ok(user)
}

/// Looks a user up by username.
pub fn find_user_by_username(
    graph: &FollowGraph,
    ctx: &Context,
    username: &str,
) -> Result<Option<User>> {
    graph.with_connection(ctx, |conn| {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.username = ?1");
        let mut stmt = conn.prepare_cached(&sql)?;
        Ok(stmt.query_row([username], user_from_row).optional()?)
    })
}

fn validate(username: &str, email: &str) -> Result<()> {
    if username.is_empty() {
        return Err(GraphError::Invalid("username must not be empty"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(GraphError::Invalid("username is too long"));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(GraphError::Invalid("email is too long"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(GraphError::Invalid("email must look like local@domain")),
    }
}

/// Users and edges touched by [`seed_demo`].
#[derive(Clone, Debug, Default, Serialize)]
pub struct SeedSummary {
    /// Users created by this call.
    pub users_created: u64,
    /// Edges created by this call.
    pub follows_created: u64,
}

const DEMO_USERS: [(&str, &str); 3] = [
    ("ada", "ada@example.com"),
    ("grace", "grace@example.com"),
    ("alan", "alan@example.com"),
];

/// Demo edges as indexes into `DEMO_USERS`.
const DEMO_FOLLOWS: [(usize, usize); 3] = [(0, 1), (2, 1), (1, 0)];

/// Populates three demo users and a few edges. Safe to run repeatedly.
pub fn seed_demo(graph: &FollowGraph, ctx: &Context) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();
    let mut ids = Vec::with_capacity(DEMO_USERS.len());
    for (username, email) in DEMO_USERS {
        let user = match find_user_by_username(graph, ctx, username)? {
            Some(existing) => existing,
            None => {
                summary.users_created += 1;
                create_user(graph, ctx, &NewUser::new(username, email))?
            }
        };
        ids.push(user.id);
    }
    for (from, to) in DEMO_FOLLOWS {
        match graph.follow(ctx, ids[from], ids[to]) {
            Ok(_) => summary.follows_created += 1,
            Err(GraphError::AlreadyFollowing) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(summary)
}
