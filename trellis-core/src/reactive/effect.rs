//! Effect Implementation
//!
//! An Effect is a re-runnable computation that subscribes to whatever
//! reactive state it reads while running. It is the tracking context behind
//! every memo, watcher and component render.
//!
//! # How Effects Work
//!
//! 1. Unless created lazily, the effect runs its function immediately to
//!    establish initial dependencies.
//!
//! 2. When any dependency changes, the effect either re-runs synchronously
//!    or, if it has a scheduler, hands the re-run request to the scheduler.
//!
//! 3. Each run keeps the subscriptions it refreshed and drops the ones it no
//!    longer reads (branch pruning, see [`ReactiveContext`]).
//!
//! # Self-trigger guard
//!
//! An effect that writes to state it has just read (`n = n + 1`) would
//! notify itself while still running. Notification skips the effect that is
//! currently executing unless it explicitly allows recursion.
//!
//! # Lifetime
//!
//! Deps hold effects weakly. An effect lives while a handle to it (or the
//! [`EffectScope`](super::EffectScope) it was created in) lives; dropping
//! the last handle stops it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::context::{untracked, ReactiveContext};
use super::dep::Dep;
use super::scope;
use super::subscriber::SubscriberId;

pub(crate) struct EffectInner {
    pub(crate) id: SubscriberId,
    run: Rc<dyn Fn()>,
    scheduler: RefCell<Option<Rc<dyn Fn()>>>,
    on_stop: RefCell<Option<Box<dyn FnOnce()>>>,
    /// Deps this effect currently subscribes to.
    pub(crate) deps: RefCell<SmallVec<[Weak<Dep>; 4]>>,
    active: Cell<bool>,
    /// Set when `stop` is requested from inside the effect's own run.
    pub(crate) defer_stop: Cell<bool>,
    allow_recurse: Cell<bool>,
    /// Memo effects are notified before all others.
    pub(crate) is_computed: bool,
    run_count: Cell<usize>,
}

impl EffectInner {
    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        if !self.active.get() {
            return;
        }
        self.active.set(false);
        for dep in self.deps.get_mut().drain(..) {
            if let Some(dep) = dep.upgrade() {
                dep.remove(self.id);
            }
        }
        if let Some(on_stop) = self.on_stop.get_mut().take() {
            on_stop();
        }
    }
}

/// Options for [`Effect::with_options`].
#[derive(Default)]
pub struct EffectOptions {
    /// Do not run on creation.
    pub lazy: bool,
    /// Called instead of re-running when a dependency changes.
    pub scheduler: Option<Rc<dyn Fn()>>,
    /// Teardown, fired exactly once when the effect stops.
    pub on_stop: Option<Box<dyn FnOnce()>>,
    /// Let the effect be re-triggered by its own writes.
    pub allow_recurse: bool,
}

/// A computation that re-runs when its dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let effect = Effect::new({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// ```
///
/// Dependencies hold effects weakly: dropping the last handle outside an
/// [`EffectScope`](super::EffectScope) stops the effect.
#[derive(Clone)]
#[must_use = "dropping the handle stops the effect"]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self::with_options(run, EffectOptions::default())
    }

    /// Create a new effect without running it immediately.
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self::with_options(
            run,
            EffectOptions {
                lazy: true,
                ..EffectOptions::default()
            },
        )
    }

    pub fn with_options<F>(run: F, options: EffectOptions) -> Self
    where
        F: Fn() + 'static,
    {
        let lazy = options.lazy;
        let effect = Self::build(Rc::new(run), options, false);
        scope::record_effect(&effect);
        if !lazy {
            effect.run();
        }
        effect
    }

    /// Lazy effect backing a memo.
    pub(crate) fn computed(run: Rc<dyn Fn()>, scheduler: Rc<dyn Fn()>) -> Self {
        Self::build(
            run,
            EffectOptions {
                lazy: true,
                scheduler: Some(scheduler),
                ..EffectOptions::default()
            },
            true,
        )
    }

    fn build(run: Rc<dyn Fn()>, options: EffectOptions, is_computed: bool) -> Self {
        let inner = Rc::new(EffectInner {
            id: SubscriberId::new(),
            run,
            scheduler: RefCell::new(options.scheduler),
            on_stop: RefCell::new(options.on_stop),
            deps: RefCell::new(SmallVec::new()),
            active: Cell::new(true),
            defer_stop: Cell::new(false),
            allow_recurse: Cell::new(options.allow_recurse),
            is_computed,
            run_count: Cell::new(0),
        });
        Self { inner }
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Execute the effect function inside its own tracking context.
    pub fn run(&self) {
        run_effect(&self.inner);
    }

    /// Unsubscribe from everything and fire the teardown callback.
    ///
    /// Stopping is idempotent. A stop requested from inside the effect's own
    /// run takes effect as soon as that run finishes.
    pub fn stop(&self) {
        stop_effect(&self.inner);
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Get the number of times the effect has run while active.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of live dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner
            .deps
            .borrow()
            .iter()
            .filter(|dep| dep.strong_count() > 0)
            .count()
    }

    /// Replace the scheduler.
    pub fn set_scheduler<F>(&self, scheduler: F)
    where
        F: Fn() + 'static,
    {
        *self.inner.scheduler.borrow_mut() = Some(Rc::new(scheduler));
    }

    pub fn set_allow_recurse(&self, allow: bool) {
        self.inner.allow_recurse.set(allow);
    }

    pub fn downgrade(&self) -> WeakEffect {
        WeakEffect(Rc::downgrade(&self.inner))
    }
}

impl PartialEq for Effect {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Non-owning effect handle, for jobs and schedulers that must not keep the
/// effect alive.
#[derive(Clone)]
pub struct WeakEffect(Weak<EffectInner>);

impl WeakEffect {
    pub fn upgrade(&self) -> Option<Effect> {
        self.0.upgrade().map(|inner| Effect { inner })
    }
}

/// Create and immediately run an effect.
///
/// The effect lives as long as the returned handle, or as long as the
/// effect scope that was active when it was created.
#[must_use = "dropping the handle stops the effect"]
pub fn effect<F>(run: F) -> Effect
where
    F: Fn() + 'static,
{
    Effect::new(run)
}

pub(crate) fn run_effect(inner: &Rc<EffectInner>) {
    let run = inner.run.clone();
    if !inner.active.get() {
        // A stopped effect still runs on request, it just no longer tracks.
        untracked(|| run());
        return;
    }
    if ReactiveContext::is_running(inner.id) {
        return;
    }

    let _ctx = ReactiveContext::enter(inner.clone());
    inner.run_count.set(inner.run_count.get() + 1);
    run();
}

pub(crate) fn stop_effect(inner: &Rc<EffectInner>) {
    if ReactiveContext::current_subscriber() == Some(inner.id) {
        inner.defer_stop.set(true);
        return;
    }
    if !inner.active.get() {
        return;
    }
    cleanup_effect(inner);
    inner.active.set(false);
    let on_stop = inner.on_stop.borrow_mut().take();
    if let Some(on_stop) = on_stop {
        on_stop();
    }
}

/// Unsubscribe from every dep.
pub(crate) fn cleanup_effect(inner: &EffectInner) {
    let deps = std::mem::take(&mut *inner.deps.borrow_mut());
    for dep in deps {
        if let Some(dep) = dep.upgrade() {
            dep.remove(inner.id);
        }
    }
}

pub(crate) fn init_dep_markers(inner: &EffectInner, bit: u32) {
    for dep in inner.deps.borrow().iter() {
        if let Some(dep) = dep.upgrade() {
            dep.mark_was_tracked(bit);
        }
    }
}

/// Drop subscriptions that were tracked before the run but not during it.
pub(crate) fn finalize_dep_markers(inner: &EffectInner, bit: u32) {
    inner.deps.borrow_mut().retain(|dep| match dep.upgrade() {
        None => false,
        Some(dep) => {
            let stale = dep.was_tracked(bit) && !dep.new_tracked(bit);
            if stale {
                dep.remove(inner.id);
            }
            dep.clear_markers(bit);
            !stale
        }
    });
}

/// Notify a snapshot of subscribers. Memo effects go first so that effects
/// reading a memo see it already marked dirty.
pub(crate) fn trigger_effects(effects: Vec<Rc<EffectInner>>) {
    let running = ReactiveContext::current_subscriber();
    for effect in effects.iter().filter(|effect| effect.is_computed) {
        trigger_effect(effect, running);
    }
    for effect in effects.iter().filter(|effect| !effect.is_computed) {
        trigger_effect(effect, running);
    }
}

fn trigger_effect(effect: &Rc<EffectInner>, running: Option<SubscriberId>) {
    if !effect.active.get() {
        return;
    }
    if running == Some(effect.id) && !effect.allow_recurse.get() {
        tracing::trace!(effect = %effect.id, "skipping self-trigger");
        return;
    }
    let scheduler = effect.scheduler.borrow().clone();
    match scheduler {
        Some(scheduler) => scheduler(),
        None => run_effect(effect),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
