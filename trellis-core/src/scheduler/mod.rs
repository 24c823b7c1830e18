//! Job Scheduler
//!
//! This module defers and batches re-runs requested by reactive writes.
//!
//! # Overview
//!
//! A write during synchronous code does not re-render anything immediately.
//! The render effect's scheduler queues a [`Job`] instead, and all jobs
//! queued before the current turn ends run together in one flush:
//!
//! - The render-phase queue holds component updates and pre-flush watchers,
//!   runs them in FIFO order and never holds the same job twice.
//! - The post-phase queue holds callbacks (lifecycle hooks, post-flush
//!   watchers) that must run strictly after every render-phase job of the
//!   flush. Hooks queued while post callbacks run are appended to the
//!   in-progress batch.
//!
//! The first job queued in an idle period asks the installed [`Executor`]
//! for one coalesced flush.
//!
//! # Design Decisions
//!
//! 1. A job is an identity plus a callback. Queuing the same job twice
//!    before it runs coalesces.
//!
//! 2. A deactivated job stays in the queue but becomes a no-op at dequeue
//!    time, so stopping an effect never has to search the queues.
//!
//! 3. A panicking job is caught and reported; the rest of the flush still
//!    runs.

mod executor;
mod job;
mod queue;

pub use executor::{Executor, ManualExecutor, TokioExecutor};
pub use job::{Job, JobId};
pub use queue::{
    executor, flush, flush_post_flush_cbs, flush_pre_flush_cbs, has_pending_flush, invalidate_job, is_flushing,
    next_tick, queue_job, queue_post_flush_cb, queue_post_flush_cbs, queued_job_count,
    set_executor, tick,
};
