//! Scheduler jobs.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

struct JobInner {
    id: JobId,
    callback: Box<dyn Fn()>,
    allow_recurse: Cell<bool>,
    active: Cell<bool>,
    pre: Cell<bool>,
}

/// A unit of deferred work.
///
/// Clones share identity: queuing any clone of a job that is already
/// queued does nothing.
#[derive(Clone)]
pub struct Job {
    inner: Rc<JobInner>,
}

impl Job {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self {
            inner: Rc::new(JobInner {
                id: JobId::new(),
                callback: Box::new(callback),
                allow_recurse: Cell::new(false),
                active: Cell::new(true),
                pre: Cell::new(false),
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.inner.id
    }

    /// Run the callback unless the job was deactivated.
    pub fn run(&self) {
        if self.inner.active.get() {
            (self.inner.callback)();
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Turn every queued occurrence of this job into a no-op.
    pub fn deactivate(&self) {
        self.inner.active.set(false);
    }

    /// Whether the job may queue itself again while it is running.
    pub fn allow_recurse(&self) -> bool {
        self.inner.allow_recurse.get()
    }

    pub fn set_allow_recurse(&self, allow: bool) {
        self.inner.allow_recurse.set(allow);
    }

    /// Pre-flush jobs (watchers) may be pulled forward to run before a
    /// component re-renders with new props.
    pub fn is_pre(&self) -> bool {
        self.inner.pre.get()
    }

    pub fn set_pre(&self, pre: bool) {
        self.inner.pre.set(pre);
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Job {}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .field("allow_recurse", &self.allow_recurse())
            .field("pre", &self.is_pre())
            .finish()
    }
}
