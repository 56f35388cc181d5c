use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use tracing::{info, warn};

use crate::context::Context;
use crate::graph::FollowGraph;
use crate::types::{Result, UserId};

const MAX_FINDINGS: usize = 32;

const COUNTER_AUDIT: &str = "
    SELECT u.id, u.username, u.followers_count, u.following_count,
           (SELECT COUNT(*) FROM follows f WHERE f.following_id = u.id),
           (SELECT COUNT(*) FROM follows f WHERE f.follower_id = u.id)
    FROM users u
    ORDER BY u.id";

const REPAIR_COUNTERS: &str = "
    UPDATE users SET
        followers_count = (SELECT COUNT(*) FROM follows f WHERE f.following_id = users.id),
        following_count = (SELECT COUNT(*) FROM follows f WHERE f.follower_id = users.id)
    WHERE followers_count <> (SELECT COUNT(*) FROM follows f WHERE f.following_id = users.id)
       OR following_count <> (SELECT COUNT(*) FROM follows f WHERE f.follower_id = users.id)";

/// Indicates the severity level of a verification finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Informational message about the verification process.
    Info,
    /// Non-critical issue that may indicate a problem.
    Warning,
    /// Invariant violation.
    Error,
}

/// Represents a single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// The severity level of this finding.
    pub severity: VerifySeverity,
    /// Human-readable description of the issue.
    pub message: String,
}

impl VerifyFinding {
    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: VerifySeverity::Error,
            message: message.into(),
        }
    }

    fn info(message: impl Into<String>) -> Self {
        Self {
            severity: VerifySeverity::Info,
            message: message.into(),
        }
    }
}

/// Stored counters of one user next to the counts derived from edges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CounterDrift {
    /// The affected user.
    pub user_id: UserId,
    /// Their username.
    pub username: String,
    /// `followers_count` as stored.
    pub stored_followers: i64,
    /// Edges terminating at the user.
    pub actual_followers: i64,
    /// `following_count` as stored.
    pub stored_following: i64,
    /// Edges originating from the user.
    pub actual_following: i64,
}

/// Statistics collected during verification.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    /// Users examined.
    pub users_checked: u64,
    /// Edges in the edge set.
    pub edges_found: u64,
    /// Users whose counters disagree with the edge set.
    pub users_with_drift: u64,
    /// Edges whose endpoints are equal.
    pub self_loops: u64,
    /// Edges pointing at a missing user.
    pub dangling_edges: u64,
}

/// Complete report of a verification run.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// Whether every invariant held.
    pub success: bool,
    /// Issues discovered, capped; `counts` is always complete.
    pub findings: Vec<VerifyFinding>,
    /// Per-user counter drift, capped like `findings`.
    pub drift: Vec<CounterDrift>,
    /// Statistics about what was examined.
    pub counts: VerifyCounts,
}

/// Checks the counter invariant and edge-set constraints.
///
/// Reads happen inside one read transaction, so the report describes a
/// single snapshot even while writers are active.
pub fn verify(graph: &FollowGraph, ctx: &Context) -> Result<VerifyReport> {
    let report = graph.with_connection(ctx, |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let mut counts = VerifyCounts::default();
        let mut findings = Vec::new();
        let mut drift = Vec::new();

        counts.edges_found = count(&tx, "SELECT COUNT(*) FROM follows")?;
        counts.self_loops = count(
            &tx,
            "SELECT COUNT(*) FROM follows WHERE follower_id = following_id",
        )?;
        counts.dangling_edges = count(
            &tx,
            "SELECT COUNT(*) FROM follows f
             WHERE NOT EXISTS (SELECT 1 FROM users u WHERE u.id = f.follower_id)
                OR NOT EXISTS (SELECT 1 FROM users u WHERE u.id = f.following_id)",
        )?;
        if counts.self_loops > 0 {
            findings.push(VerifyFinding::error(format!(
                "{} self-follow edges stored",
                counts.self_loops
            )));
        }
        if counts.dangling_edges > 0 {
            findings.push(VerifyFinding::error(format!(
                "{} edges reference missing users",
                counts.dangling_edges
            )));
        }

        let mut stmt = tx.prepare(COUNTER_AUDIT)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            counts.users_checked += 1;
            let entry = CounterDrift {
                user_id: UserId(row.get(0)?),
                username: row.get(1)?,
                stored_followers: row.get(2)?,
                stored_following: row.get(3)?,
                actual_followers: row.get(4)?,
                actual_following: row.get(5)?,
            };
            if entry.stored_followers == entry.actual_followers
                && entry.stored_following == entry.actual_following
            {
                continue;
            }
            counts.users_with_drift += 1;
            if findings.len() < MAX_FINDINGS {
                findings.push(VerifyFinding::error(format!(
                    "user {} ({}): followers_count {} vs {} edges, following_count {} vs {} edges",
                    entry.user_id,
                    entry.username,
                    entry.stored_followers,
                    entry.actual_followers,
                    entry.stored_following,
                    entry.actual_following,
                )));
                drift.push(entry);
            }
        }
        drop(rows);
        drop(stmt);
        tx.finish()?;

        if counts.users_with_drift as usize > drift.len() {
            findings.push(VerifyFinding::info(format!(
                "{} more users with drift not listed",
                counts.users_with_drift as usize - drift.len()
            )));
        }
        let success = counts.users_with_drift == 0
            && counts.self_loops == 0
            && counts.dangling_edges == 0;
        Ok(VerifyReport {
            success,
            findings,
            drift,
            counts,
        })
    })?;
    if report.success {
        info!(
            users = report.counts.users_checked,
            edges = report.counts.edges_found,
            "verify passed"
        );
    } else {
        warn!(
            users_with_drift = report.counts.users_with_drift,
            self_loops = report.counts.self_loops,
            dangling_edges = report.counts.dangling_edges,
            "verify found invariant violations"
        );
    }
    Ok(report)
}

/// Rewrites every drifted counter from the edge set in one transaction.
///
/// Returns the number of users whose counters changed.
pub fn repair_counters(graph: &FollowGraph, ctx: &Context) -> Result<u64> {
    let fixed = graph.with_connection(ctx, |conn| {
        let tx = conn.write_transaction()?;
        let fixed = tx.execute(REPAIR_COUNTERS, [])?;
        ctx.check()?;
        tx.commit()?;
        Ok(fixed as u64)
    })?;
    if fixed > 0 {
        warn!(users = fixed, "repaired drifted counters");
    }
    Ok(fixed)
}

fn count(conn: &Connection, sql: &str) -> rusqlite::Result<u64> {
    let raw: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(raw.max(0) as u64)
}
