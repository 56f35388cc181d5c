use std::fs;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, warn};

use crate::admin::error::{AdminError, Result};
use crate::admin::provision::create_user;
use crate::context::Context;
use crate::graph::FollowGraph;
use crate::types::{timestamp_from_micros, GraphError, NewUser};

/// Summary of an [`import_users`] run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ImportSummary {
    /// Rows that produced a new user.
    pub users_created: u64,
    /// Rows skipped because the username or email already existed.
    pub duplicates_skipped: u64,
}

/// Summary of an [`export_follows`] run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ExportSummary {
    /// Edges written.
    pub follows_exported: u64,
    /// Destination file.
    pub path: PathBuf,
}

#[derive(Serialize)]
struct FollowRecord {
    follower_id: i64,
    following_id: i64,
    created_at: String,
}

/// Provisions users from a CSV file with `username` and `email` columns.
///
/// Each row is created independently; rows colliding with an existing
/// username or email are skipped and counted.
pub fn import_users(
    graph: &FollowGraph,
    ctx: &Context,
    path: impl AsRef<Path>,
) -> Result<ImportSummary> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .map_err(|err| AdminError::csv(path, err))?;
    let mut summary = ImportSummary::default();
    for (idx, record) in reader.deserialize::<NewUser>().enumerate() {
        let new = record.map_err(|err| AdminError::csv(path, err))?;
        match create_user(graph, ctx, &new) {
            Ok(_) => summary.users_created += 1,
            Err(GraphError::DuplicateUsername | GraphError::DuplicateEmail) => {
                warn!(row = idx + 1, username = %new.username, "skipping duplicate user");
                summary.duplicates_skipped += 1;
            }
            Err(GraphError::Invalid(reason)) => {
                return Err(AdminError::Message(format!(
                    "{}: row {}: {reason}",
                    path.display(),
                    idx + 1
                )))
            }
            Err(err) => return Err(err.into()),
        }
    }
    debug!(path = %path.display(), ?summary, "user import finished");
    Ok(summary)
}

/// Writes every follow edge, oldest first, to a CSV file.
pub fn export_follows(
    graph: &FollowGraph,
    ctx: &Context,
    path: impl AsRef<Path>,
) -> Result<ExportSummary> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let edges = graph.with_connection(ctx, |conn| {
        let mut stmt = conn.prepare(
            "SELECT follower_id, following_id, created_at FROM follows
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })?;

    let mut writer = WriterBuilder::new()
        .from_path(path)
        .map_err(|err| AdminError::csv(path, err))?;
    for (follower_id, following_id, micros) in &edges {
        let created_at = timestamp_from_micros(*micros)
            .ok()
            .and_then(|ts| ts.format(&Rfc3339).ok())
            .ok_or_else(|| {
                AdminError::Message(format!(
                    "edge {follower_id}->{following_id} has invalid timestamp {micros}"
                ))
            })?;
        writer
            .serialize(FollowRecord {
                follower_id: *follower_id,
                following_id: *following_id,
                created_at,
            })
            .map_err(|err| AdminError::csv(path, err))?;
    }
    writer.flush()?;
    Ok(ExportSummary {
        follows_exported: edges.len() as u64,
        path: path.to_path_buf(),
    })
}
