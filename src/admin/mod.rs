#![forbid(unsafe_code)]

//! Administration utilities.
//!
//! Users enter the graph through the provisioning functions here; the core
//! engine only ever reads them and adjusts their counters. The module also
//! audits the counter invariant and moves data in and out as CSV.

mod error;
mod provision;
mod transfer;
mod verify;

/// Error types for administrative operations.
pub use error::{AdminError, Result};

/// User provisioning.
///
/// Creates users with zeroed counters and seeds a small demo graph.
pub use provision::{create_user, find_user_by_username, seed_demo, SeedSummary};

/// CSV import of users and export of follow edges.
pub use transfer::{export_follows, import_users, ExportSummary, ImportSummary};

/// Counter invariant auditing.
///
/// Compares stored counters with counts derived from the edge set and
/// optionally rewrites them.
pub use verify::{
    repair_counters, verify, CounterDrift, VerifyCounts, VerifyFinding, VerifyReport,
    VerifySeverity,
};
