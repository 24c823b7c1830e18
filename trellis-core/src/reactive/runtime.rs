//! Reactive Runtime
//!
//! The runtime owns the dependency map behind the proxy layer: for every
//! raw target, one [`Dep`] per observed key.
//!
//! # How It Works
//!
//! 1. A proxy read calls [`Runtime::track`] with the target and the key it
//!    read. The dep for that pair is created on first use and the running
//!    computation subscribes to it.
//!
//! 2. A proxy write calls [`Runtime::trigger`] with the kind of mutation.
//!    The runtime collects every dep the mutation can affect (the key itself,
//!    the synthetic iteration keys, array indices past a new length) and
//!    notifies their subscribers, each at most once.
//!
//! 3. When a target is dropped its whole entry is released.
//!
//! # Thread Model
//!
//! The map is thread-local. Reactive state is single-threaded and never
//! crosses threads.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::context::{should_track, ReactiveContext};
use super::dep::{track_dep, trigger_deps, Dep};
use super::value::{ContainerKind, Target, TargetId, Value};

/// Which slot of a target a dep belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// Object property.
    Prop(Rc<str>),
    /// Array slot.
    Index(usize),
    /// Array length.
    Length,
    /// The key set (and, for maps, the values) of a collection or object.
    Iterate,
    /// The key set of a map, for key-only iteration.
    KeyIterate,
    /// A map entry or set member, keyed by its raw value.
    Entry(Value),
}

/// Kind of read being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOp {
    Get,
    Has,
    Iterate,
}

/// Kind of write being propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    Set,
    Add,
    Delete,
    Clear,
}

type KeyToDep = HashMap<DepKey, Rc<Dep>>;

thread_local! {
    static TARGET_MAP: RefCell<HashMap<TargetId, KeyToDep>> = RefCell::new(HashMap::new());
}

/// Entry points into the dependency map.
pub struct Runtime;

impl Runtime {
    /// Subscribe the running computation to `key` of `target`.
    pub fn track(target: TargetId, op: TrackOp, key: DepKey) {
        if !should_track() || !ReactiveContext::is_active() {
            return;
        }
        tracing::trace!(target = target.raw(), ?op, ?key, "track");

        // A key equal to an existing one is dropped only after the map is
        // released: it may hold the last handle to another target.
        let (dep, _unused) = TARGET_MAP.with(|map| {
            let mut map = map.borrow_mut();
            let deps = map.entry(target).or_default();
            match deps.get(&key) {
                Some(dep) => (dep.clone(), Some(key)),
                None => {
                    let dep = Dep::new();
                    deps.insert(key, dep.clone());
                    (dep, None)
                }
            }
        });
        track_dep(&dep);
    }

    /// Notify everything that depends on the mutated slot.
    ///
    /// `new_len` is set when the mutation changed an array's length (or
    /// shifted its tail): every index at or past it is affected.
    pub fn trigger(target: &Target, op: TriggerOp, key: Option<DepKey>, new_len: Option<usize>) {
        let kind = target.kind();
        let deps = TARGET_MAP.with(|map| {
            let map = map.borrow();
            let Some(deps_map) = map.get(&target.id()) else {
                return Vec::new();
            };

            if op == TriggerOp::Clear {
                return deps_map.values().cloned().collect();
            }

            if kind == ContainerKind::Array && key == Some(DepKey::Length) {
                let from = new_len.unwrap_or(0);
                return deps_map
                    .iter()
                    .filter(|(dep_key, _)| match dep_key {
                        DepKey::Length => true,
                        DepKey::Index(index) => *index >= from,
                        _ => false,
                    })
                    .map(|(_, dep)| dep.clone())
                    .collect();
            }

            let mut deps: Vec<Rc<Dep>> = Vec::new();
            let mut push = |key: &DepKey| {
                if let Some(dep) = deps_map.get(key) {
                    deps.push(dep.clone());
                }
            };
            if let Some(key) = &key {
                push(key);
            }
            match (op, kind) {
                (TriggerOp::Add, ContainerKind::Array) => {
                    if matches!(key, Some(DepKey::Index(_))) {
                        push(&DepKey::Length);
                    }
                }
                (TriggerOp::Add | TriggerOp::Delete, ContainerKind::Map) => {
                    push(&DepKey::Iterate);
                    push(&DepKey::KeyIterate);
                }
                (TriggerOp::Add | TriggerOp::Delete, ContainerKind::Object | ContainerKind::Set) => {
                    push(&DepKey::Iterate);
                }
                (TriggerOp::Set, ContainerKind::Map) => push(&DepKey::Iterate),
                _ => {}
            }
            deps
        });

        if deps.is_empty() {
            return;
        }
        tracing::trace!(target = target.id().raw(), ?op, deps = deps.len(), "trigger");
        trigger_deps(deps.iter());
    }

    /// Forget every dep of a target that no longer exists.
    pub(crate) fn release(target: TargetId) {
        // The removed entry is dropped after the borrow ends; dropping its
        // keys can release further targets.
        let _removed = TARGET_MAP
            .try_with(|map| map.borrow_mut().remove(&target))
            .ok()
            .flatten();
    }

    /// Number of keys of `target` that have a dep.
    pub fn dep_count(target: TargetId) -> usize {
        TARGET_MAP.with(|map| map.borrow().get(&target).map_or(0, HashMap::len))
    }

    /// Number of live subscribers of one key of `target`.
    pub fn subscriber_count(target: TargetId, key: &DepKey) -> usize {
        TARGET_MAP.with(|map| {
            map.borrow()
                .get(&target)
                .and_then(|deps| deps.get(key))
                .map_or(0, |dep| dep.len())
        })
    }
}
