//! Watchers
//!
//! A watcher is an effect bound to an explicit source plus a callback that
//! receives the new and the previous value. Unlike a plain effect, the
//! callback itself is not tracked, and when it runs is configurable:
//!
//! - [`Flush::Pre`]: queued as a render-phase job (the default).
//! - [`Flush::Post`]: queued as a post-phase callback, after rendering.
//! - [`Flush::Sync`]: runs synchronously inside the triggering write.
//!
//! The callback gets an [`OnCleanup`] to register a stale callback. It runs
//! before the next invocation and when the watcher stops, so an async
//! side effect started by one run can discard its result once superseded.
//!
//! Dropping the last [`WatchHandle`] outside an effect scope stops the
//! watcher.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use super::context::untracked;
use super::effect::{Effect, EffectOptions};
use super::proxy::Reactive;
use super::value::{same_value, TargetId, Value};
use crate::scheduler::{queue_job, queue_post_flush_cb, Job};

/// When a triggered watcher runs its callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flush {
    #[default]
    Pre,
    Post,
    Sync,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Invoke the callback right away, with no previous value.
    pub immediate: bool,
    /// Read the whole source tree, so nested writes trigger too. The
    /// callback fires on every trigger, even if the value compares equal.
    pub deep: bool,
    pub flush: Flush,
    /// Stop after the first callback.
    pub once: bool,
}

type CleanupSlot = Rc<RefCell<Option<Box<dyn FnOnce()>>>>;

/// Registers the stale callback for the current run.
#[derive(Clone, Default)]
pub struct OnCleanup {
    slot: CleanupSlot,
}

impl OnCleanup {
    /// Replace the callback to run before the next invocation or on stop.
    pub fn register<F>(&self, f: F)
    where
        F: FnOnce() + 'static,
    {
        *self.slot.borrow_mut() = Some(Box::new(f));
    }

    fn run(&self) {
        let cleanup = self.slot.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            untracked(cleanup);
        }
    }
}

/// Handle returned by the watch functions.
#[derive(Clone)]
#[must_use = "dropping the handle stops the watcher"]
pub struct WatchHandle {
    effect: Effect,
    job: Job,
}

impl WatchHandle {
    /// Stop watching. A queued run becomes a no-op; the stale callback runs.
    pub fn stop(&self) {
        self.job.deactivate();
        self.effect.stop();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }

    pub fn effect(&self) -> &Effect {
        &self.effect
    }
}

fn scheduler_for(job: &Job, flush: Flush) -> Rc<dyn Fn()> {
    let job = job.clone();
    match flush {
        Flush::Sync => Rc::new(move || job.run()),
        Flush::Post => Rc::new(move || queue_post_flush_cb(job.clone())),
        Flush::Pre => {
            job.set_allow_recurse(true);
            job.set_pre(true);
            Rc::new(move || queue_job(job.clone()))
        }
    }
}

/// Deep-read a value through its proxies so every nested slot is tracked.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    traverse_inner(value, &mut seen);
}

fn traverse_inner(value: &Value, seen: &mut HashSet<TargetId>) {
    let Value::Proxy(proxy) = value else {
        return;
    };
    if !seen.insert(proxy.raw_target().id()) {
        return;
    }
    for (key, nested) in proxy.entries() {
        traverse_inner(&key, seen);
        traverse_inner(&nested, seen);
    }
}

fn traverse_any<T: 'static>(value: &T) {
    let value: &dyn Any = value;
    if let Some(value) = value.downcast_ref::<Value>() {
        traverse(value);
    } else if let Some(proxy) = value.downcast_ref::<Reactive>() {
        traverse(&Value::Proxy(proxy.clone()));
    }
}

/// Watch the result of `getter`.
///
/// The callback runs when the result changes (or on every trigger with
/// `deep`). Deep traversal applies to results of type [`Value`] or
/// [`Reactive`].
#[must_use = "dropping the handle stops the watcher"]
pub fn watch<T, G, C>(getter: G, callback: C, options: WatchOptions) -> WatchHandle
where
    T: Clone + PartialEq + 'static,
    G: Fn() -> T + 'static,
    C: Fn(&T, Option<&T>, &OnCleanup) + 'static,
{
    build_watch(getter, callback, options, false)
}

/// Watch a reactive object deeply. The callback fires on every nested
/// write; new and old are the same proxy.
#[must_use = "dropping the handle stops the watcher"]
pub fn watch_reactive<C>(source: Reactive, callback: C, options: WatchOptions) -> WatchHandle
where
    C: Fn(&Reactive, Option<&Reactive>, &OnCleanup) + 'static,
{
    let options = WatchOptions {
        deep: true,
        ..options
    };
    build_watch(move || source.clone(), callback, options, true)
}

fn build_watch<T, G, C>(getter: G, callback: C, options: WatchOptions, force: bool) -> WatchHandle
where
    T: Clone + PartialEq + 'static,
    G: Fn() -> T + 'static,
    C: Fn(&T, Option<&T>, &OnCleanup) + 'static,
{
    let latest: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
    let old: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
    let on_cleanup = OnCleanup::default();
    let deep = options.deep;

    let run = {
        let latest = latest.clone();
        move || {
            let value = getter();
            if deep {
                traverse_any(&value);
            }
            *latest.borrow_mut() = Some(value);
        }
    };

    let effect = Effect::with_options(
        run,
        EffectOptions {
            lazy: true,
            on_stop: Some(Box::new({
                let on_cleanup = on_cleanup.clone();
                move || on_cleanup.run()
            })),
            ..EffectOptions::default()
        },
    );

    let job = {
        let weak = effect.downgrade();
        let latest = latest.clone();
        let old = old.clone();
        let on_cleanup = on_cleanup.clone();
        Job::new(move || {
            let Some(effect) = weak.upgrade() else {
                return;
            };
            if !effect.is_active() {
                return;
            }
            effect.run();
            let Some(new_value) = latest.borrow().clone() else {
                return;
            };
            let changed = deep
                || force
                || !old
                    .borrow()
                    .as_ref()
                    .is_some_and(|old| same_value(old, &new_value));
            if !changed {
                return;
            }
            on_cleanup.run();
            let previous = old.borrow_mut().replace(new_value.clone());
            untracked(|| callback(&new_value, previous.as_ref(), &on_cleanup));
            if options.once {
                effect.stop();
            }
        })
    };
    effect.set_scheduler({
        let scheduler = scheduler_for(&job, options.flush);
        move || scheduler()
    });

    if options.immediate {
        job.run();
    } else {
        effect.run();
        *old.borrow_mut() = latest.borrow_mut().take();
    }

    WatchHandle { effect, job }
}

/// Run `f` now and again whenever what it reads changes, on the chosen
/// flush. The stale callback registered during one run fires before the
/// next.
#[must_use = "dropping the handle stops the watcher"]
pub fn watch_effect<F>(f: F, flush: Flush) -> WatchHandle
where
    F: Fn(&OnCleanup) + 'static,
{
    let on_cleanup = OnCleanup::default();
    let run = {
        let on_cleanup = on_cleanup.clone();
        move || {
            on_cleanup.run();
            f(&on_cleanup);
        }
    };
    let effect = Effect::with_options(
        run,
        EffectOptions {
            lazy: true,
            on_stop: Some(Box::new({
                let on_cleanup = on_cleanup.clone();
                move || on_cleanup.run()
            })),
            ..EffectOptions::default()
        },
    );
    let job = {
        let weak = effect.downgrade();
        Job::new(move || {
            if let Some(effect) = weak.upgrade().filter(Effect::is_active) {
                effect.run();
            }
        })
    };
    effect.set_scheduler({
        let scheduler = scheduler_for(&job, flush);
        move || scheduler()
    });
    effect.run();
    WatchHandle { effect, job }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use crate::scheduler::flush;
    use std::cell::Cell;

    #[test]
    fn callback_receives_new_and_old() {
        let count = Signal::new(1);
        let seen: Rc<RefCell<Vec<(i32, Option<i32>)>>> = Rc::default();

        let source = count.clone();
        let seen_clone = seen.clone();
        let _handle = watch(
            move || source.get(),
            move |new, old, _| seen_clone.borrow_mut().push((*new, old.copied())),
            WatchOptions::default(),
        );
        assert!(seen.borrow().is_empty());

        count.set(2);
        count.set(3);
        assert!(seen.borrow().is_empty());
        flush();
        assert_eq!(*seen.borrow(), vec![(3, Some(1))]);
    }

    #[test]
    fn nan_result_counts_as_unchanged() {
        let count = Signal::new(1);
        let calls = Rc::new(Cell::new(0));

        let source = count.clone();
        let calls_clone = calls.clone();
        let _handle = watch(
            move || {
                source.get();
                f64::NAN
            },
            move |_: &f64, _, _| calls_clone.set(calls_clone.get() + 1),
            WatchOptions::default(),
        );

        count.set(2);
        flush();
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn immediate_has_no_old_value() {
        let count = Signal::new(1);
        let seen: Rc<RefCell<Vec<(i32, Option<i32>)>>> = Rc::default();
        let source = count.clone();
        let seen_clone = seen.clone();
        let _handle = watch(
            move || source.get(),
            move |new, old, _| seen_clone.borrow_mut().push((*new, old.copied())),
            WatchOptions {
                immediate: true,
                flush: Flush::Sync,
                ..WatchOptions::default()
            },
        );
        count.set(4);
        assert_eq!(*seen.borrow(), vec![(1, None), (4, Some(1))]);
    }

    #[test]
    fn unchanged_result_does_not_call_back() {
        let count = Signal::new(1);
        let calls = Rc::new(Cell::new(0));
        let source = count.clone();
        let calls_clone = calls.clone();
        let _handle = watch(
            move || source.get() % 2,
            move |_, _, _| calls_clone.set(calls_clone.get() + 1),
            WatchOptions {
                flush: Flush::Sync,
                ..WatchOptions::default()
            },
        );
        count.set(3);
        assert_eq!(calls.get(), 0);
        count.set(4);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn stale_callback_runs_before_next_call_and_on_stop() {
        let count = Signal::new(0);
        let stale = Rc::new(Cell::new(0));
        let source = count.clone();
        let stale_clone = stale.clone();
        let handle = watch(
            move || source.get(),
            move |_, _, on_cleanup| {
                let stale = stale_clone.clone();
                on_cleanup.register(move || stale.set(stale.get() + 1));
            },
            WatchOptions {
                flush: Flush::Sync,
                ..WatchOptions::default()
            },
        );

        count.set(1);
        assert_eq!(stale.get(), 0);
        count.set(2);
        assert_eq!(stale.get(), 1);
        handle.stop();
        assert_eq!(stale.get(), 2);

        count.set(3);
        assert_eq!(stale.get(), 2);
    }

    #[test]
    fn deep_watch_sees_nested_writes() {
        let inner = crate::reactive::Target::object([("n", Value::from(1))]);
        let state = Reactive::new_object([("inner", Value::from(inner))]);
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let _handle = watch_reactive(
            state.clone(),
            move |new, old, _| {
                assert!(old.is_some_and(|old| old == new));
                calls_clone.set(calls_clone.get() + 1);
            },
            WatchOptions {
                flush: Flush::Sync,
                ..WatchOptions::default()
            },
        );

        state.get("inner").get("n");
        let nested = state.get("inner");
        nested.as_proxy().unwrap().set("n", 2);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn once_stops_after_first_call() {
        let count = Signal::new(0);
        let calls = Rc::new(Cell::new(0));
        let source = count.clone();
        let calls_clone = calls.clone();
        let handle = watch(
            move || source.get(),
            move |_, _, _| calls_clone.set(calls_clone.get() + 1),
            WatchOptions {
                flush: Flush::Sync,
                once: true,
                ..WatchOptions::default()
            },
        );
        count.set(1);
        count.set(2);
        assert_eq!(calls.get(), 1);
        assert!(!handle.is_active());
    }

    #[test]
    fn post_flush_watcher_runs_after_jobs() {
        let count = Signal::new(0);
        let log: Rc<RefCell<Vec<&'static str>>> = Rc::default();
        let source = count.clone();
        let log_clone = log.clone();
        let _handle = watch(
            move || source.get(),
            move |_, _, _| log_clone.borrow_mut().push("post"),
            WatchOptions {
                flush: Flush::Post,
                ..WatchOptions::default()
            },
        );
        let log_clone = log.clone();
        queue_job(Job::new(move || log_clone.borrow_mut().push("job")));
        count.set(1);
        flush();
        assert_eq!(*log.borrow(), vec!["job", "post"]);
    }

    #[test]
    fn watch_effect_reruns_with_cleanup() {
        let count = Signal::new(0);
        let cleanups = Rc::new(Cell::new(0));
        let runs = Rc::new(Cell::new(0));
        let source = count.clone();
        let cleanups_clone = cleanups.clone();
        let runs_clone = runs.clone();
        let handle = watch_effect(
            move |on_cleanup| {
                source.get();
                runs_clone.set(runs_clone.get() + 1);
                let cleanups = cleanups_clone.clone();
                on_cleanup.register(move || cleanups.set(cleanups.get() + 1));
            },
            Flush::Pre,
        );
        assert_eq!(runs.get(), 1);

        count.set(1);
        count.set(2);
        flush();
        assert_eq!((runs.get(), cleanups.get()), (2, 1));

        handle.stop();
        assert_eq!(cleanups.get(), 2);
    }
}
