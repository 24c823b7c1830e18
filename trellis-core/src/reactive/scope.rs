//! Effect scopes.
//!
//! A scope owns every effect (and therefore every memo effect, watcher and
//! render effect) created while it is running, and stops them together.
//! Component instances run `setup` inside their own scope, so watchers
//! created there die with the component.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::effect::Effect;

thread_local! {
    static ACTIVE_SCOPE: RefCell<Vec<EffectScope>> = const { RefCell::new(Vec::new()) };
}

#[derive(Default)]
struct ScopeInner {
    effects: RefCell<Vec<Effect>>,
    cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
    children: RefCell<Vec<EffectScope>>,
    stopped: Cell<bool>,
}

#[derive(Clone, Default)]
pub struct EffectScope {
    inner: Rc<ScopeInner>,
}

impl EffectScope {
    /// Create a scope nested in the currently running scope, if any.
    pub fn new() -> Self {
        let scope = Self::detached();
        if let Some(parent) = current_scope() {
            parent.inner.children.borrow_mut().push(scope.clone());
        }
        scope
    }

    /// Create a scope that is not collected by its surrounding scope.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        !self.inner.stopped.get()
    }

    /// Run `f` with this scope collecting effects. Returns `None` once the
    /// scope has been stopped.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if !self.is_active() {
            tracing::warn!("cannot run an inactive effect scope");
            return None;
        }
        ACTIVE_SCOPE.with(|stack| stack.borrow_mut().push(self.clone()));
        let _pop = ScopeReset;
        Some(f())
    }

    /// Number of effects owned directly by this scope.
    pub fn effect_count(&self) -> usize {
        self.inner.effects.borrow().len()
    }

    /// Stop every owned effect and child scope, then run dispose callbacks.
    pub fn stop(&self) {
        if self.inner.stopped.replace(true) {
            return;
        }
        let effects = std::mem::take(&mut *self.inner.effects.borrow_mut());
        for effect in &effects {
            effect.stop();
        }
        let children = std::mem::take(&mut *self.inner.children.borrow_mut());
        for child in &children {
            child.stop();
        }
        let cleanups = std::mem::take(&mut *self.inner.cleanups.borrow_mut());
        for cleanup in cleanups {
            cleanup();
        }
    }
}

struct ScopeReset;

impl Drop for ScopeReset {
    fn drop(&mut self) {
        ACTIVE_SCOPE.with(|stack| stack.borrow_mut().pop());
    }
}

fn current_scope() -> Option<EffectScope> {
    ACTIVE_SCOPE.with(|stack| stack.borrow().last().cloned())
}

pub(crate) fn record_effect(effect: &Effect) {
    if let Some(scope) = current_scope() {
        scope.inner.effects.borrow_mut().push(effect.clone());
    }
}

/// Register a callback to run when the current scope stops.
pub fn on_scope_dispose<F>(f: F)
where
    F: FnOnce() + 'static,
{
    match current_scope() {
        Some(scope) => scope.inner.cleanups.borrow_mut().push(Box::new(f)),
        None => tracing::warn!("on_scope_dispose called without an active effect scope"),
    }
}
