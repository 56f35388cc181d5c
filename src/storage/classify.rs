use rusqlite::ffi;
use rusqlite::ErrorCode;

use crate::context::Context;
use crate::types::GraphError;

/// Which schema constraint rejected a statement.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Constraint {
    PrimaryKey,
    Unique,
    Check,
    ForeignKey,
    NotNull,
    Other,
}

/// A constraint failure plus the message SQLite attached to it.
#[derive(Debug)]
pub(crate) struct Violation<'a> {
    pub(crate) constraint: Constraint,
    pub(crate) message: &'a str,
}

impl Violation<'_> {
    /// Whether the message names `table.column`.
    pub(crate) fn names(&self, column: &str) -> bool {
        self.message.contains(column)
    }
}

/// Returns the constraint failure carried by `err`, if any.
pub(crate) fn violation(err: &rusqlite::Error) -> Option<Violation<'_>> {
    let rusqlite::Error::SqliteFailure(failure, message) = err else {
        return None;
    };
    if failure.code != ErrorCode::ConstraintViolation {
        return None;
    }
    let constraint = match failure.extended_code {
        ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Constraint::PrimaryKey,
        ffi::SQLITE_CONSTRAINT_UNIQUE => Constraint::Unique,
        ffi::SQLITE_CONSTRAINT_CHECK => Constraint::Check,
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Constraint::ForeignKey,
        ffi::SQLITE_CONSTRAINT_NOTNULL => Constraint::NotNull,
        _ => Constraint::Other,
    };
    Some(Violation {
        constraint,
        message: message.as_deref().unwrap_or_default(),
    })
}

/// Whether the statement was aborted by the connection's progress handler.
pub(crate) fn is_interrupt(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::OperationInterrupted
    )
}

/// Whether the statement gave up waiting for another connection's lock.
pub(crate) fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::DatabaseBusy
    )
}

/// Rewrites an interrupted statement, or a lock wait cut short by the
/// deadline, into the context's own error.
///
/// Every other error passes through unchanged.
pub(crate) fn settle(ctx: &Context, err: GraphError) -> GraphError {
    match err {
        GraphError::Storage(inner) if is_busy(&inner) => match ctx.check() {
            Err(ctx_err) => ctx_err,
            Ok(()) => GraphError::Storage(inner),
        },
        GraphError::Storage(ref inner) if is_interrupt(inner) => match ctx.check() {
            Err(ctx_err) => ctx_err,
            // Interrupted but the context looks alive: another checkout's
            // handler fired. Report it as a cancellation rather than a fault.
            Ok(()) => GraphError::Cancelled,
        },
        other => other,
    }
}
