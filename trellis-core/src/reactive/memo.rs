//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when read after
//! one of its dependencies changed.
//!
//! # How Memos Work
//!
//! 1. A memo starts dirty and runs nothing until first read.
//!
//! 2. On read while dirty, the getter runs inside the memo's own effect,
//!    the result is cached and the memo becomes clean.
//!
//! 3. When a dependency changes, the memo's effect scheduler only flips the
//!    memo back to dirty and triggers the memo's own subscribers. Nothing
//!    is recomputed until somebody reads again.
//!
//! # Two tracking layers
//!
//! The internal effect tracks what the getter reads. Separately, reading a
//! memo from inside another computation subscribes that outer computation
//! to the memo's own dep, so "may have changed" reaches it.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use super::context::ReactiveContext;
use super::dep::{track_dep, trigger_deps, Dep};
use super::effect::Effect;
use super::scope;
use crate::error::{report, RuntimeError};

/// Dirty state for a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// The memo needs to recompute on next read.
    Dirty,
}

struct MemoInner<T> {
    getter: Box<dyn Fn() -> T>,
    setter: Option<Box<dyn Fn(T)>>,
    value: RefCell<Option<T>>,
    dirty: Cell<bool>,
    dep: Rc<Dep>,
    effect: RefCell<Option<Effect>>,
}

/// A cached derived value that recomputes lazily.
pub struct Memo<T: 'static> {
    inner: Rc<MemoInner<T>>,
}

impl<T> Memo<T>
where
    T: Clone + 'static,
{
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(Box::new(getter), None)
    }

    /// Create a writable memo. Writes go to `setter`, which is expected to
    /// update the state the getter reads.
    pub fn with_setter<F, S>(getter: F, setter: S) -> Self
    where
        F: Fn() -> T + 'static,
        S: Fn(T) + 'static,
    {
        Self::build(Box::new(getter), Some(Box::new(setter)))
    }

    fn build(getter: Box<dyn Fn() -> T>, setter: Option<Box<dyn Fn(T)>>) -> Self {
        let inner = Rc::new(MemoInner {
            getter,
            setter,
            value: RefCell::new(None),
            dirty: Cell::new(true),
            dep: Dep::new(),
            effect: RefCell::new(None),
        });

        let weak: Weak<MemoInner<T>> = Rc::downgrade(&inner);
        let run = {
            let weak = weak.clone();
            Rc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let value = (inner.getter)();
                    *inner.value.borrow_mut() = Some(value);
                }
            })
        };
        let scheduler = Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                if !inner.dirty.replace(true) {
                    trigger_deps([&inner.dep]);
                }
            }
        });

        let effect = Effect::computed(run, scheduler);
        scope::record_effect(&effect);
        *inner.effect.borrow_mut() = Some(effect);
        Self { inner }
    }

    /// Get the current value, recomputing if necessary.
    pub fn get(&self) -> T {
        track_dep(&self.inner.dep);
        self.refresh();

        if let Some(value) = self.inner.value.borrow().as_ref() {
            return value.clone();
        }
        // Only reachable when the getter reads its own memo: there is no
        // cached value to hand out, so evaluate once without caching.
        (self.inner.getter)()
    }

    /// Get the current value without subscribing the running computation.
    pub fn get_untracked(&self) -> T {
        super::context::untracked(|| self.get())
    }

    /// Write through the setter. Read-only memos report and ignore writes.
    pub fn set(&self, value: T) {
        match &self.inner.setter {
            Some(setter) => setter(value),
            None => report(RuntimeError::ReadonlyMemo),
        }
    }

    fn refresh(&self) {
        if !self.inner.dirty.get() {
            return;
        }
        let effect = self.inner.effect.borrow().clone();
        if let Some(effect) = effect {
            if ReactiveContext::is_running(effect.id()) {
                return;
            }
            self.inner.dirty.set(false);
            effect.run();
        }
    }

    /// Get the current dirty state.
    pub fn state(&self) -> MemoState {
        if self.inner.dirty.get() {
            MemoState::Dirty
        } else {
            MemoState::Clean
        }
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Get the number of computations subscribed to this memo.
    pub fn dependent_count(&self) -> usize {
        self.inner.dep.len()
    }

    /// Stop tracking. The last cached value stays readable.
    pub fn stop(&self) {
        if let Some(effect) = self.inner.effect.borrow().as_ref() {
            effect.stop();
        }
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
