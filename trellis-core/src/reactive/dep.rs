//! Deps
//!
//! A dep is the subscriber set of one observable slot: one property of one
//! reactive object, the value of a signal, the value of a memo. Besides the
//! subscribers it carries two generation bitmasks, `was_tracked` and
//! `new_tracked`, with one bit per nesting depth of the running effect. They
//! let an effect find out which of its subscriptions went stale during a
//! run without rebuilding its dependency list from scratch.
//!
//! Subscribers are held weakly. An effect lives as long as its handles (or
//! the scope that owns it); a dead entry is skipped and dropped lazily.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::context::{should_track, ReactiveContext};
use super::effect::{self, EffectInner};
use super::SubscriberId;

#[derive(Default)]
pub struct Dep {
    subscribers: RefCell<IndexMap<SubscriberId, Weak<EffectInner>>>,
    was_tracked: Cell<u32>,
    new_tracked: Cell<u32>,
}

impl Dep {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        self.subscribers
            .borrow()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.borrow().contains_key(&id)
    }

    pub(crate) fn insert(&self, effect: &Rc<EffectInner>) {
        self.subscribers
            .borrow_mut()
            .insert(effect.id, Rc::downgrade(effect));
    }

    pub(crate) fn remove(&self, id: SubscriberId) {
        self.subscribers.borrow_mut().shift_remove(&id);
    }

    pub(crate) fn was_tracked(&self, bit: u32) -> bool {
        self.was_tracked.get() & bit != 0
    }

    pub(crate) fn new_tracked(&self, bit: u32) -> bool {
        self.new_tracked.get() & bit != 0
    }

    pub(crate) fn mark_was_tracked(&self, bit: u32) {
        self.was_tracked.set(self.was_tracked.get() | bit);
    }

    pub(crate) fn mark_new_tracked(&self, bit: u32) {
        self.new_tracked.set(self.new_tracked.get() | bit);
    }

    pub(crate) fn clear_markers(&self, bit: u32) {
        self.was_tracked.set(self.was_tracked.get() & !bit);
        self.new_tracked.set(self.new_tracked.get() & !bit);
    }

    /// Snapshot of the live subscribers, in subscription order.
    ///
    /// Notification always iterates a snapshot: subscriptions added while
    /// subscribers run are not visited in the same pass.
    pub(crate) fn snapshot(&self) -> Vec<Rc<EffectInner>> {
        let mut subscribers = self.subscribers.borrow_mut();
        subscribers.retain(|_, weak| weak.strong_count() > 0);
        subscribers.values().filter_map(Weak::upgrade).collect()
    }
}

/// Subscribe the running effect, if any, to `dep`.
pub(crate) fn track_dep(dep: &Rc<Dep>) {
    if !should_track() {
        return;
    }
    let Some((effect, bit)) = ReactiveContext::current() else {
        return;
    };
    if !effect.is_active() {
        return;
    }

    let subscribe = match bit {
        Some(bit) => {
            if dep.new_tracked(bit) {
                false
            } else {
                dep.mark_new_tracked(bit);
                !dep.was_tracked(bit)
            }
        }
        None => !dep.contains(effect.id),
    };

    if subscribe {
        dep.insert(&effect);
        effect.deps.borrow_mut().push(Rc::downgrade(dep));
    }
}

/// Notify every subscriber of every dep, each at most once.
pub(crate) fn trigger_deps<'a>(deps: impl IntoIterator<Item = &'a Rc<Dep>>) {
    let mut effects: IndexMap<SubscriberId, Rc<EffectInner>> = IndexMap::new();
    for dep in deps {
        for subscriber in dep.snapshot() {
            effects.entry(subscriber.id).or_insert(subscriber);
        }
    }
    if effects.is_empty() {
        return;
    }
    tracing::trace!(subscribers = effects.len(), "trigger");
    effect::trigger_effects(effects.into_values().collect());
}
