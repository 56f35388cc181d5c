#![forbid(unsafe_code)]

//! Cancellation and deadline propagation for core operations.
//!
//! Every engine call takes a [`Context`]. The engine polls it before acquiring
//! a connection, between statements, and right before commit; pooled
//! connections also poll it from inside SQLite through a progress handler, so
//! a long statement is interrupted rather than run to completion. A failed
//! check inside a transaction drops the transaction, which rolls it back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::types::{GraphError, Result};

/// Caller-supplied cancellation flag and optional deadline.
///
/// Clones share the same flag: cancelling any clone cancels all of them.
#[derive(Clone, Debug, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context expiring at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    /// Derives a context sharing this one's cancel flag with a deadline no
    /// later than `timeout` from now.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline: Some(deadline),
        }
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Whether the operation should stop now.
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Returns the matching error when the operation should stop.
    ///
    /// Cancellation wins over an expired deadline.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(GraphError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Returns a guard that cancels this context when dropped.
    ///
    /// Hold it across a blocking call spawned from an async task: if the task
    /// is dropped, the blocking side observes the cancellation.
    pub fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop {
            ctx: Some(self.clone()),
        }
    }

    /// Builds the closure installed as SQLite's progress handler.
    pub(crate) fn interrupter(
        &self,
    ) -> impl FnMut() -> bool + Send + std::panic::RefUnwindSafe + 'static {
        let cancelled = Arc::clone(&self.cancelled);
        let deadline = self.deadline;
        move || {
            cancelled.load(Ordering::Acquire) || deadline.is_some_and(|d| Instant::now() >= d)
        }
    }
}

/// Cancels its context on drop unless [`CancelOnDrop::disarm`] was called.
#[derive(Debug)]
pub struct CancelOnDrop {
    ctx: Option<Context>,
}

impl CancelOnDrop {
    /// Releases the guard without cancelling.
    pub fn disarm(mut self) {
        self.ctx = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            ctx.cancel();
        }
    }
}
