//! Integration tests for batched re-runs.
//!
//! Effects below hand their re-runs to the job queue the way a component's
//! render effect does.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use trellis_core::reactive::{watch_effect, Effect, EffectOptions, Flush, Reactive, Value};
use trellis_core::scheduler::{
    flush, has_pending_flush, next_tick, queue_job, queue_post_flush_cb, set_executor, tick, Job, ManualExecutor,
    TokioExecutor,
};

/// A lazy effect whose re-runs go through the job queue.
fn queued_effect(run: impl Fn() + 'static) -> (Effect, Job) {
    let effect = Effect::with_options(
        run,
        EffectOptions {
            lazy: true,
            ..EffectOptions::default()
        },
    );
    let job = {
        let effect = effect.downgrade();
        Job::new(move || {
            if let Some(effect) = effect.upgrade().filter(Effect::is_active) {
                effect.run();
            }
        })
    };
    effect.set_scheduler({
        let job = job.clone();
        move || queue_job(job.clone())
    });
    effect.run();
    (effect, job)
}

#[test]
fn two_writes_cause_one_rerun() {
    let state = Reactive::new_object([("a", Value::from(0)), ("b", Value::from(0))]);
    let runs = Rc::new(Cell::new(0));

    let (_effect, _job) = queued_effect({
        let state = state.clone();
        let runs = runs.clone();
        move || {
            state.get("a");
            state.get("b");
            runs.set(runs.get() + 1);
        }
    });
    assert_eq!(runs.get(), 1);

    state.set("a", 1);
    state.set("b", 1);
    assert_eq!(runs.get(), 1);
    assert!(has_pending_flush());

    assert!(tick());
    assert_eq!(runs.get(), 2);
    assert!(!tick());
}

#[test]
fn stopped_effect_job_is_a_no_op() {
    let state = Reactive::new_object([("a", Value::from(0))]);
    let runs = Rc::new(Cell::new(0));

    let (effect, _job) = queued_effect({
        let state = state.clone();
        let runs = runs.clone();
        move || {
            state.get("a");
            runs.set(runs.get() + 1);
        }
    });

    state.set("a", 1);
    effect.stop();
    tick();
    assert_eq!(runs.get(), 1);
}

#[test]
fn post_callbacks_run_after_render_jobs() {
    let log: Rc<RefCell<Vec<&'static str>>> = Rc::default();

    queue_post_flush_cb(Job::new({
        let log = log.clone();
        move || log.borrow_mut().push("post")
    }));
    queue_job(Job::new({
        let log = log.clone();
        move || {
            log.borrow_mut().push("render");
            // Queued from inside the flush: still before the post phase.
            queue_job(Job::new({
                let log = log.clone();
                move || log.borrow_mut().push("nested")
            }));
        }
    }));

    flush();
    assert_eq!(*log.borrow(), ["render", "nested", "post"]);
}

#[test]
fn panicking_job_does_not_block_the_flush() {
    let ran = Rc::new(Cell::new(false));

    queue_job(Job::new(|| panic!("boom")));
    queue_job(Job::new({
        let ran = ran.clone();
        move || ran.set(true)
    }));

    flush();
    assert!(ran.get());
}

#[test]
fn watchers_flush_with_the_queue() {
    let state = Reactive::new_object([("n", Value::from(0))]);
    let seen = Rc::new(RefCell::new(Vec::new()));

    let _pre = watch_effect(
        {
            let state = state.clone();
            let seen = seen.clone();
            move |_| seen.borrow_mut().push(("pre", state.get("n")))
        },
        Flush::Pre,
    );
    let _post = watch_effect(
        {
            let state = state.clone();
            let seen = seen.clone();
            move |_| seen.borrow_mut().push(("post", state.get("n")))
        },
        Flush::Post,
    );
    seen.borrow_mut().clear();

    state.set("n", 1);
    state.set("n", 2);
    assert!(seen.borrow().is_empty());

    tick();
    assert_eq!(*seen.borrow(), [("pre", Value::from(2)), ("post", Value::from(2))]);
}

#[test]
fn tokio_executor_flushes_after_the_current_task_yields() {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let local = tokio::task::LocalSet::new();

    local.block_on(&rt, async {
        let previous = set_executor(Rc::new(TokioExecutor));

        let state = Reactive::new_object([("a", Value::from(0))]);
        let runs = Rc::new(Cell::new(0));
        let (_effect, _job) = queued_effect({
            let state = state.clone();
            let runs = runs.clone();
            move || {
                state.get("a");
                runs.set(runs.get() + 1);
            }
        });

        state.set("a", 1);
        state.set("a", 2);
        assert_eq!(runs.get(), 1);

        next_tick().await;
        assert_eq!(runs.get(), 2);
        assert!(!has_pending_flush());

        set_executor(previous);
    });

    set_executor(Rc::new(ManualExecutor::new()));
}
