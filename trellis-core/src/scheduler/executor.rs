//! Flush executors.
//!
//! An executor decides *when* the coalesced flush happens. The queue only
//! asks for one flush per idle period; the executor runs it.

use std::cell::Cell;
use std::fmt;

/// Arranges for the job queue to be flushed later.
pub trait Executor {
    /// Call `flush` once, after the current synchronous work completes.
    fn schedule(&self, flush: fn());

    /// Run a flush that was scheduled but has not run yet. Executors that
    /// flush on their own return `false`.
    fn run_pending(&self) -> bool {
        false
    }
}

/// Executor driven by hand: nothing flushes until the host calls
/// [`tick`](super::tick).
#[derive(Default)]
pub struct ManualExecutor {
    pending: Cell<Option<fn()>>,
    requests: Cell<usize>,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many flushes the queue has asked for so far.
    pub fn requests(&self) -> usize {
        self.requests.get()
    }
}

impl Executor for ManualExecutor {
    fn schedule(&self, flush: fn()) {
        self.requests.set(self.requests.get() + 1);
        self.pending.set(Some(flush));
    }

    fn run_pending(&self) -> bool {
        match self.pending.take() {
            Some(flush) => {
                flush();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for ManualExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualExecutor")
            .field("pending", &self.pending.get().is_some())
            .field("requests", &self.requests.get())
            .finish()
    }
}

/// Executor that flushes on a tokio local task.
///
/// Scheduling must happen inside a [`tokio::task::LocalSet`]; the flush runs
/// the next time the current task yields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioExecutor;

impl Executor for TokioExecutor {
    fn schedule(&self, flush: fn()) {
        tokio::task::spawn_local(async move {
            flush();
        });
    }
}
