//! Reactive Primitives
//!
//! This module implements the core reactive system: deps, effects, proxies,
//! memos and watchers. These primitives form the foundation of the render
//! layer's fine-grained updates.
//!
//! # Concepts
//!
//! ## Deps and Effects
//!
//! A [`Dep`] is the subscriber set of one observable slot. An [`Effect`] is
//! a re-runnable computation; while it runs, every slot it reads records it
//! in the slot's dep. When the slot changes, the effect re-runs (or asks its
//! scheduler to).
//!
//! ## Proxies
//!
//! [`Reactive`] wraps plain data ([`Target`] containers of [`Value`]s).
//! Reads through the proxy track, writes trigger. Reactivity shows up at
//! the call site as explicit `get`/`set` rather than being transparent.
//!
//! ## Signals
//!
//! A [`Signal`] is a single typed observable cell for state that is not
//! shaped like a container.
//!
//! ## Memos
//!
//! A [`Memo`] is a derived value that caches its result. It re-evaluates
//! only when read after one of its dependencies changed.
//!
//! ## Watchers
//!
//! [`watch`] and friends run a callback with new and old values when a
//! source changes, on a configurable flush timing.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to detect
//! dependencies automatically. When a slot is read, we check if there is an
//! active tracking context and, if so, register the dependency.

mod collections;
mod context;
mod dep;
mod effect;
mod memo;
mod proxy;
mod runtime;
mod scope;
mod signal;
mod subscriber;
mod value;
mod watch;

pub use context::{enable_tracking, pause_tracking, reset_tracking, should_track, untracked};
pub(crate) use context::ReactiveContext;
pub use dep::Dep;
pub use effect::{effect, Effect, EffectOptions, WeakEffect};
pub use memo::{Memo, MemoState};
pub use proxy::{
    is_proxy, is_reactive, is_readonly, mark_raw, reactive, readonly, shallow_reactive,
    shallow_readonly, to_raw, ProxyFlavor, Reactive,
};
pub use runtime::{DepKey, Runtime, TrackOp, TriggerOp};
pub use scope::{on_scope_dispose, EffectScope};
pub use signal::Signal;
pub use subscriber::SubscriberId;
pub use value::{same_value, Container, ContainerKind, Target, TargetId, Value};
pub use watch::{traverse, watch, watch_effect, watch_reactive, Flush, OnCleanup, WatchHandle, WatchOptions};

/// Whether a computation is currently tracking reads.
pub fn is_tracking() -> bool {
    ReactiveContext::is_active() && should_track()
}
