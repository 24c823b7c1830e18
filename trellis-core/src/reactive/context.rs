//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when reactive state is read,
//! the current computation is registered as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the chain of executing computations.
//! Running an effect pushes it onto the stack; the returned guard pops it
//! again, even if the computation panics. Nested runs (a memo read inside an
//! effect, a child component rendered inside its parent) are attributed to
//! the innermost entry.
//!
//! Each entry also carries the dependency marker bit for its depth. Before a
//! run, every dep the effect currently subscribes to is marked "was tracked"
//! with that bit; reads mark deps "newly tracked". When the guard drops, deps
//! that were tracked before but not during this run are unsubscribed. Up to
//! [`MAX_MARKER_BITS`](crate::config::MAX_MARKER_BITS) levels of nesting get
//! their own bit; deeper runs fall back to a full unsubscribe before running
//! and resubscribe as they read.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::effect::{self, EffectInner};
use super::SubscriberId;
use crate::config;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
    static TRACK_DEPTH: Cell<u32> = const { Cell::new(0) };
    static SHOULD_TRACK: Cell<bool> = const { Cell::new(true) };
    static TRACK_STACK: RefCell<Vec<bool>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
#[derive(Clone)]
struct ContextEntry {
    effect: Rc<EffectInner>,
    /// Marker bit for this depth, or `None` past the marker limit.
    bit: Option<u32>,
}

/// Guard that pops the context when dropped.
pub(crate) struct ReactiveContext {
    effect: Rc<EffectInner>,
    bit: Option<u32>,
    last_should_track: bool,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given effect.
    ///
    /// While this context is active, any reactive state that is read will
    /// register the effect as a dependent.
    pub(crate) fn enter(effect: Rc<EffectInner>) -> Self {
        let depth = TRACK_DEPTH.with(|d| {
            let depth = d.get() + 1;
            d.set(depth);
            depth
        });

        let bit = (depth <= config::config().max_marker_bits).then(|| 1u32 << depth);
        match bit {
            Some(bit) => effect::init_dep_markers(&effect, bit),
            None => effect::cleanup_effect(&effect),
        }

        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                effect: effect.clone(),
                bit,
            });
        });
        let last_should_track = SHOULD_TRACK.with(|s| s.replace(true));

        Self {
            effect,
            bit,
            last_should_track,
        }
    }

    /// Check if there is an active reactive context.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().map(|entry| entry.effect.id))
    }

    /// The innermost running effect and its marker bit.
    pub(crate) fn current() -> Option<(Rc<EffectInner>, Option<u32>)> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| (entry.effect.clone(), entry.bit))
        })
    }

    /// Whether the given subscriber is anywhere on the stack.
    pub(crate) fn is_running(id: SubscriberId) -> bool {
        CONTEXT_STACK.with(|stack| stack.borrow().iter().any(|entry| entry.effect.id == id))
    }

    /// Number of nested contexts currently running.
    #[cfg(test)]
    pub fn depth() -> u32 {
        TRACK_DEPTH.with(|d| d.get())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if let Some(bit) = self.bit {
            effect::finalize_dep_markers(&self.effect, bit);
        }
        TRACK_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));

        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.effect.id, self.effect.id,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.effect.id, entry.effect.id
                );
            }
        });
        SHOULD_TRACK.with(|s| s.set(self.last_should_track));

        if self.effect.defer_stop.replace(false) {
            effect::stop_effect(&self.effect);
        }
    }
}

/// Whether reads are currently being recorded.
pub fn should_track() -> bool {
    SHOULD_TRACK.with(|s| s.get())
}

/// Stop recording reads until the matching [`reset_tracking`].
pub fn pause_tracking() {
    let last = SHOULD_TRACK.with(|s| s.replace(false));
    TRACK_STACK.with(|stack| stack.borrow_mut().push(last));
}

/// Force reads to be recorded until the matching [`reset_tracking`].
pub fn enable_tracking() {
    let last = SHOULD_TRACK.with(|s| s.replace(true));
    TRACK_STACK.with(|stack| stack.borrow_mut().push(last));
}

/// Undo the last [`pause_tracking`] or [`enable_tracking`].
pub fn reset_tracking() {
    let last = TRACK_STACK.with(|stack| stack.borrow_mut().pop());
    SHOULD_TRACK.with(|s| s.set(last.unwrap_or(true)));
}

struct TrackingReset;

impl Drop for TrackingReset {
    fn drop(&mut self) {
        reset_tracking();
    }
}

/// Run `f` without recording any reads.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    pause_tracking();
    let _reset = TrackingReset;
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;

    #[test]
    fn context_tracks_subscriber() {
        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        let seen = Rc::new(Cell::new(None));
        let seen_clone = seen.clone();
        let effect = Effect::new(move || {
            seen_clone.set(ReactiveContext::current_subscriber());
        });

        assert_eq!(seen.get(), Some(effect.id()));

        // Context should be cleaned up after the run
        assert!(!ReactiveContext::is_active());
        assert_eq!(ReactiveContext::depth(), 0);
    }

    #[test]
    fn nested_contexts() {
        let inner_seen = Rc::new(Cell::new(None));
        let outer_after = Rc::new(Cell::new(None));

        let inner_seen_clone = inner_seen.clone();
        let outer_after_clone = outer_after.clone();
        let outer = Effect::new(move || {
            let seen = inner_seen_clone.clone();
            let inner = Effect::new(move || {
                seen.set(ReactiveContext::current_subscriber());
            });
            assert_ne!(Some(inner.id()), ReactiveContext::current_subscriber());

            // After inner run, outer should be current again
            outer_after_clone.set(ReactiveContext::current_subscriber());
        });

        assert!(inner_seen.get().is_some());
        assert_ne!(inner_seen.get(), Some(outer.id()));
        assert_eq!(outer_after.get(), Some(outer.id()));
        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn pause_and_reset_nest() {
        assert!(should_track());
        pause_tracking();
        assert!(!should_track());
        enable_tracking();
        assert!(should_track());
        reset_tracking();
        assert!(!should_track());
        reset_tracking();
        assert!(should_track());
    }

    #[test]
    fn untracked_restores_on_return() {
        let inside = untracked(should_track);
        assert!(!inside);
        assert!(should_track());
    }
}
