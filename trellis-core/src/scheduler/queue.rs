//! The render-phase and post-phase queues.

use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use indexmap::IndexSet;
use tokio::sync::Notify;

use super::executor::{Executor, ManualExecutor};
use super::job::{Job, JobId};
use crate::config;
use crate::error::{report, RuntimeError};

#[derive(Default)]
struct QueueState {
    jobs: Vec<Job>,
    flush_index: usize,
    flushing: bool,
    flush_pending: bool,
    pending_post: Vec<Job>,
    /// The post-phase batch currently running, if any.
    active_post: Option<Vec<Job>>,
    post_index: usize,
    /// Runs per job within the current flush chain.
    run_counts: HashMap<JobId, usize>,
}

thread_local! {
    static QUEUE: RefCell<QueueState> = RefCell::new(QueueState::default());
    static EXECUTOR: RefCell<Rc<dyn Executor>> = RefCell::new(Rc::new(ManualExecutor::new()));
    static FLUSHED: Rc<Notify> = Rc::new(Notify::new());
}

/// Install the executor for this thread and return the previous one.
pub fn set_executor(executor: Rc<dyn Executor>) -> Rc<dyn Executor> {
    EXECUTOR.with(|slot| std::mem::replace(&mut *slot.borrow_mut(), executor))
}

/// The executor installed for this thread.
pub fn executor() -> Rc<dyn Executor> {
    EXECUTOR.with(|slot| slot.borrow().clone())
}

/// Queue a render-phase job.
///
/// A job already waiting in the queue is not added again. While flushing,
/// the running job counts as queued unless it allows recursion.
pub fn queue_job(job: Job) {
    let queued = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        let start = if queue.flushing && job.allow_recurse() {
            queue.flush_index + 1
        } else {
            queue.flush_index
        };
        let already = queue
            .jobs
            .get(start..)
            .is_some_and(|rest| rest.contains(&job));
        if !already {
            tracing::trace!(job = %job.id(), "queue job");
            queue.jobs.push(job);
        }
        !already
    });
    if queued {
        queue_flush();
    }
}

/// Drop a job that has not run yet from the render-phase queue.
pub fn invalidate_job(job: &Job) {
    QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        // The running job and those before it have already been taken.
        let start = if queue.flushing { queue.flush_index + 1 } else { 0 };
        let position = queue.jobs.iter().position(|queued| queued == job);
        if let Some(position) = position.filter(|&position| position >= start) {
            queue.jobs.remove(position);
        }
    });
}

/// Run queued pre-flush jobs now, ahead of their turn.
///
/// While flushing, only jobs after the running one are considered.
pub fn flush_pre_flush_cbs() {
    let mut index = QUEUE.with(|queue| {
        let queue = queue.borrow();
        if queue.flushing {
            queue.flush_index + 1
        } else {
            0
        }
    });
    loop {
        let job = QUEUE.with(|queue| {
            let mut queue = queue.borrow_mut();
            while index < queue.jobs.len() {
                if queue.jobs[index].is_pre() {
                    return Some(queue.jobs.remove(index));
                }
                index += 1;
            }
            None
        });
        let Some(job) = job else {
            break;
        };
        if job.is_active() && !exceeds_recursion_limit(&job) {
            run_guarded(&job);
        }
    }
}

/// Queue a callback to run after the render phase.
pub fn queue_post_flush_cb(job: Job) {
    QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        let start = if job.allow_recurse() {
            queue.post_index + 1
        } else {
            queue.post_index
        };
        let running = queue
            .active_post
            .as_ref()
            .and_then(|active| active.get(start..))
            .is_some_and(|rest| rest.contains(&job));
        if !running {
            queue.pending_post.push(job);
        }
    });
    queue_flush();
}

/// Queue a batch of post-phase callbacks at once. Duplicates are removed
/// when the batch runs.
pub fn queue_post_flush_cbs(jobs: impl IntoIterator<Item = Job>) {
    QUEUE.with(|queue| queue.borrow_mut().pending_post.extend(jobs));
    queue_flush();
}

fn queue_flush() {
    let schedule = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        if queue.flushing || queue.flush_pending {
            false
        } else {
            queue.flush_pending = true;
            true
        }
    });
    if schedule {
        executor().schedule(flush);
    }
}

/// Whether a flush has been requested and not started yet.
pub fn has_pending_flush() -> bool {
    QUEUE.with(|queue| queue.borrow().flush_pending)
}

pub fn is_flushing() -> bool {
    QUEUE.with(|queue| queue.borrow().flushing)
}

/// Number of render-phase jobs waiting to run.
pub fn queued_job_count() -> usize {
    QUEUE.with(|queue| {
        let queue = queue.borrow();
        queue.jobs.len().saturating_sub(queue.flush_index)
    })
}

/// Run every queued job now. Does nothing while a flush is running.
pub fn flush() {
    let start = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        if queue.flushing {
            return false;
        }
        queue.flush_pending = false;
        true
    });
    if start {
        flush_jobs();
    }
}

/// Run a flush the manual executor is holding. Returns whether one ran.
pub fn tick() -> bool {
    executor().run_pending()
}

/// Wait until the pending flush, if any, has completed.
///
/// With an executor that flushes on its own this waits for it; otherwise
/// the pending flush runs right away.
pub async fn next_tick() {
    if !has_pending_flush() && !is_flushing() {
        return;
    }
    if executor().run_pending() {
        return;
    }
    let flushed = FLUSHED.with(Rc::clone);
    while has_pending_flush() || is_flushing() {
        flushed.notified().await;
    }
}

fn flush_jobs() {
    QUEUE.with(|queue| queue.borrow_mut().flushing = true);
    tracing::debug!(jobs = queued_job_count(), "flush start");

    loop {
        let job = QUEUE.with(|queue| {
            let queue = queue.borrow();
            queue.jobs.get(queue.flush_index).cloned()
        });
        let Some(job) = job else {
            break;
        };
        if job.is_active() && !exceeds_recursion_limit(&job) {
            run_guarded(&job);
        }
        QUEUE.with(|queue| queue.borrow_mut().flush_index += 1);
    }

    QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        queue.jobs.clear();
        queue.flush_index = 0;
    });

    flush_post_flush_cbs();

    let again = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        queue.flushing = false;
        let again = !queue.jobs.is_empty() || !queue.pending_post.is_empty();
        if !again {
            queue.run_counts.clear();
        }
        again
    });

    if again {
        flush_jobs();
    } else {
        tracing::debug!("flush done");
        FLUSHED.with(|flushed| flushed.notify_waiters());
    }
}

/// Run pending post-phase callbacks.
///
/// Called while a post-phase batch is already running, this appends to
/// that batch instead of starting a second one.
pub fn flush_post_flush_cbs() {
    let batch = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        if queue.pending_post.is_empty() {
            return None;
        }
        let mut seen = IndexSet::new();
        let deduped: Vec<Job> = std::mem::take(&mut queue.pending_post)
            .into_iter()
            .filter(|job| seen.insert(job.id()))
            .collect();
        match queue.active_post.as_mut() {
            Some(active) => {
                active.extend(deduped);
                None
            }
            None => Some(deduped),
        }
    });
    let Some(batch) = batch else {
        return;
    };

    tracing::debug!(callbacks = batch.len(), "post flush");
    QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        queue.active_post = Some(batch);
        queue.post_index = 0;
    });

    loop {
        let job = QUEUE.with(|queue| {
            let queue = queue.borrow();
            queue
                .active_post
                .as_ref()
                .and_then(|active| active.get(queue.post_index).cloned())
        });
        let Some(job) = job else {
            break;
        };
        if job.is_active() {
            run_guarded(&job);
        }
        QUEUE.with(|queue| queue.borrow_mut().post_index += 1);
    }

    QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        queue.active_post = None;
        queue.post_index = 0;
    });
}

fn exceeds_recursion_limit(job: &Job) -> bool {
    let limit = config::config().recursion_limit;
    let count = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        let count = queue.run_counts.entry(job.id()).or_insert(0);
        *count += 1;
        *count
    });
    if count > limit {
        report(RuntimeError::RecursionLimit {
            job: job.id().raw(),
            limit,
        });
        return true;
    }
    false
}

fn run_guarded(job: &Job) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| job.run())) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        report(RuntimeError::JobPanicked {
            job: job.id().raw(),
            message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Job) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |name: &'static str| {
            let log = log_clone.clone();
            Job::new(move || log.borrow_mut().push(name))
        };
        (log, make)
    }

    #[test]
    fn jobs_are_deduplicated_and_fifo() {
        let (log, make) = recorder();
        let a = make("a");
        let b = make("b");

        queue_job(a.clone());
        queue_job(b.clone());
        queue_job(a.clone());
        assert_eq!(queued_job_count(), 2);

        flush();
        assert_eq!(*log.borrow(), vec!["a", "b"]);
        assert_eq!(queued_job_count(), 0);
    }

    #[test]
    fn idle_queue_job_can_be_invalidated() {
        let (log, make) = recorder();
        let only = make("only");

        queue_job(only.clone());
        invalidate_job(&only);
        assert_eq!(queued_job_count(), 0);

        flush();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn running_job_is_not_invalidated() {
        let (log, make) = recorder();
        let later = make("later");
        let first = {
            let log = log.clone();
            let later = later.clone();
            let this: Rc<RefCell<Option<Job>>> = Rc::default();
            let job = Job::new({
                let this = this.clone();
                move || {
                    log.borrow_mut().push("first");
                    if let Some(this) = this.borrow().as_ref() {
                        invalidate_job(this);
                    }
                    invalidate_job(&later);
                }
            });
            *this.borrow_mut() = Some(job.clone());
            job
        };

        queue_job(first);
        queue_job(later);
        flush();
        assert_eq!(*log.borrow(), vec!["first"]);
    }

    #[test]
    fn one_flush_is_requested_per_idle_period() {
        let manual = Rc::new(ManualExecutor::new());
        let previous = set_executor(manual.clone());

        queue_job(Job::new(|| {}));
        queue_job(Job::new(|| {}));
        assert_eq!(manual.requests(), 1);
        assert!(tick());
        assert!(!tick());

        queue_job(Job::new(|| {}));
        assert_eq!(manual.requests(), 2);
        tick();
        set_executor(previous);
    }

    #[test]
    fn post_callbacks_run_after_render_jobs() {
        let (log, make) = recorder();
        let post = make("post");
        let render = {
            let log = log.clone();
            let post = post.clone();
            Job::new(move || {
                log.borrow_mut().push("render");
                queue_post_flush_cb(post.clone());
            })
        };

        queue_post_flush_cb(make("early-post"));
        queue_job(render);
        queue_job(make("render-2"));
        flush();

        assert_eq!(*log.borrow(), vec!["render", "render-2", "early-post", "post"]);
    }

    #[test]
    fn pre_jobs_can_be_pulled_forward() {
        let (log, make) = recorder();
        let watcher = make("watcher");
        watcher.set_pre(true);
        let render = {
            let log = log.clone();
            Job::new(move || {
                flush_pre_flush_cbs();
                log.borrow_mut().push("render");
            })
        };
        queue_job(render);
        queue_job(make("other"));
        queue_job(watcher);
        flush();
        assert_eq!(*log.borrow(), vec!["watcher", "render", "other"]);
    }

    #[test]
    fn post_batch_is_deduplicated() {
        let (log, make) = recorder();
        let hook = make("hook");
        queue_post_flush_cbs([hook.clone(), hook.clone(), make("other"), hook]);
        flush();
        assert_eq!(*log.borrow(), vec!["hook", "other"]);
    }

    #[test]
    fn nested_post_flush_appends_to_running_batch() {
        let (log, make) = recorder();
        let late = make("late");
        let first = {
            let log = log.clone();
            let late = late.clone();
            Job::new(move || {
                log.borrow_mut().push("first");
                queue_post_flush_cb(late.clone());
                flush_post_flush_cbs();
                log.borrow_mut().push("first-end");
            })
        };
        queue_post_flush_cbs([first, make("second")]);
        flush();

        assert_eq!(*log.borrow(), vec!["first", "first-end", "second", "late"]);
    }

    #[test]
    fn panicking_job_does_not_block_others() {
        let reported = Rc::new(Cell::new(false));
        let reported_clone = reported.clone();
        crate::error::set_report_handler(move |err| {
            if matches!(err, RuntimeError::JobPanicked { .. }) {
                reported_clone.set(true);
            }
        });

        let (log, make) = recorder();
        queue_job(Job::new(|| panic!("boom")));
        queue_job(make("after"));
        flush();

        assert!(reported.get());
        assert_eq!(*log.borrow(), vec!["after"]);
        crate::error::clear_report_handler();
    }

    #[test]
    fn deactivated_job_is_skipped_at_dequeue() {
        let (log, make) = recorder();
        let job = make("stopped");
        queue_job(job.clone());
        job.deactivate();
        flush();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn invalidated_job_does_not_run() {
        let (log, make) = recorder();
        let child = make("child");
        let parent = {
            let child = child.clone();
            let log = log.clone();
            Job::new(move || {
                log.borrow_mut().push("parent");
                invalidate_job(&child);
            })
        };
        queue_job(parent);
        queue_job(child);
        flush();
        assert_eq!(*log.borrow(), vec!["parent"]);
    }

    #[test]
    fn self_requeue_requires_allow_recurse() {
        let runs = Rc::new(Cell::new(0));
        let slot: Rc<RefCell<Option<Job>>> = Rc::new(RefCell::new(None));
        let job = {
            let runs = runs.clone();
            let slot = slot.clone();
            Job::new(move || {
                runs.set(runs.get() + 1);
                if runs.get() < 3 {
                    if let Some(me) = slot.borrow().clone() {
                        queue_job(me);
                    }
                }
            })
        };
        *slot.borrow_mut() = Some(job.clone());

        queue_job(job.clone());
        flush();
        assert_eq!(runs.get(), 1);

        job.set_allow_recurse(true);
        runs.set(0);
        queue_job(job.clone());
        flush();
        assert_eq!(runs.get(), 3);
        slot.borrow_mut().take();
    }

    #[test]
    fn runaway_job_hits_recursion_limit() {
        crate::config::configure(crate::config::RuntimeConfig {
            recursion_limit: 5,
            ..Default::default()
        })
        .unwrap();
        let hit = Rc::new(Cell::new(false));
        let hit_clone = hit.clone();
        crate::error::set_report_handler(move |err| {
            if matches!(err, RuntimeError::RecursionLimit { .. }) {
                hit_clone.set(true);
            }
        });

        let runs = Rc::new(Cell::new(0));
        let slot: Rc<RefCell<Option<Job>>> = Rc::new(RefCell::new(None));
        let job = {
            let runs = runs.clone();
            let slot = slot.clone();
            Job::new(move || {
                runs.set(runs.get() + 1);
                if let Some(me) = slot.borrow().clone() {
                    queue_job(me);
                }
            })
        };
        job.set_allow_recurse(true);
        *slot.borrow_mut() = Some(job.clone());
        queue_job(job);
        flush();

        assert!(hit.get());
        assert_eq!(runs.get(), 5);
        slot.borrow_mut().take();
        crate::error::clear_report_handler();
        crate::config::configure(crate::config::RuntimeConfig::default()).unwrap();
    }
}
