//! Reactive proxies.
//!
//! A [`Reactive`] wraps a raw [`Target`] and turns every access into
//! dependency bookkeeping: reads record the running computation against the
//! key they read, writes compare old and new values and trigger the deps of
//! the key they changed. Nested containers are wrapped lazily, on access.
//!
//! There are four flavors:
//!
//! | flavor              | tracks reads | writes   | nested values  |
//! |---------------------|--------------|----------|----------------|
//! | `reactive`          | yes          | allowed  | wrapped        |
//! | `shallow_reactive`  | yes          | allowed  | returned as-is |
//! | `readonly`          | no           | rejected | wrapped        |
//! | `shallow_readonly`  | no           | rejected | returned as-is |
//!
//! A read-only view over a reactive proxy still tracks, since the state
//! under it can change. Rejected writes are reported, never raised.
//!
//! Object and array access lives here; map and set access lives in
//! `collections.rs`.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::context::untracked;
use super::runtime::{DepKey, Runtime, TrackOp, TriggerOp};
use super::value::{Container, ContainerKind, Target, Value};
use crate::config;
use crate::error::{report, RuntimeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyFlavor {
    Reactive,
    ShallowReactive,
    Readonly,
    ShallowReadonly,
}

impl ProxyFlavor {
    pub fn is_readonly(self) -> bool {
        matches!(self, ProxyFlavor::Readonly | ProxyFlavor::ShallowReadonly)
    }

    pub fn is_shallow(self) -> bool {
        matches!(self, ProxyFlavor::ShallowReactive | ProxyFlavor::ShallowReadonly)
    }

    fn slot(self) -> usize {
        match self {
            ProxyFlavor::Reactive => 0,
            ProxyFlavor::ShallowReactive => 1,
            ProxyFlavor::Readonly => 2,
            ProxyFlavor::ShallowReadonly => 3,
        }
    }
}

pub(crate) struct ProxyInner {
    target: Target,
    flavor: ProxyFlavor,
    /// Reactive proxy this read-only view delegates to.
    source: Option<Reactive>,
    /// Read-only views over this proxy, by flavor slot.
    views: RefCell<[Weak<ProxyInner>; 4]>,
}

/// Handle to a proxy over a container.
#[derive(Clone)]
pub struct Reactive {
    pub(super) inner: Rc<ProxyInner>,
}

enum ArrayKey {
    Index(usize),
    Length,
    Other(Rc<str>),
}

fn array_key(key: &Value) -> ArrayKey {
    match key.as_index() {
        Some(index) => ArrayKey::Index(index),
        None if key.as_str() == Some("length") => ArrayKey::Length,
        None => ArrayKey::Other(key.to_property_key()),
    }
}

/// Wrap a container in a deep reactive proxy.
///
/// Primitives are reported and returned unchanged. Containers marked raw or
/// frozen are returned unwrapped. A read-only proxy is returned as it is.
pub fn reactive(value: impl Into<Value>) -> Value {
    create(value.into(), ProxyFlavor::Reactive)
}

/// Wrap a container so only its own slots are reactive.
pub fn shallow_reactive(value: impl Into<Value>) -> Value {
    create(value.into(), ProxyFlavor::ShallowReactive)
}

/// Wrap a container in a deep read-only proxy.
pub fn readonly(value: impl Into<Value>) -> Value {
    create(value.into(), ProxyFlavor::Readonly)
}

/// Wrap a container so only its own slots are read-only.
pub fn shallow_readonly(value: impl Into<Value>) -> Value {
    create(value.into(), ProxyFlavor::ShallowReadonly)
}

/// The raw value behind any number of proxies.
pub fn to_raw(value: &Value) -> Value {
    value.to_raw()
}

/// Exempt a container from ever being proxied.
pub fn mark_raw(target: &Target) -> &Target {
    target.mark_raw()
}

pub fn is_reactive(value: &Value) -> bool {
    value.as_proxy().is_some_and(Reactive::is_reactive)
}

pub fn is_readonly(value: &Value) -> bool {
    value.as_proxy().is_some_and(Reactive::is_readonly)
}

pub fn is_proxy(value: &Value) -> bool {
    value.as_proxy().is_some()
}

fn create(value: Value, flavor: ProxyFlavor) -> Value {
    match value {
        Value::Raw(target) => {
            if !target.is_observable() {
                return Value::Raw(target);
            }
            Value::Proxy(Reactive::cached(&target, flavor))
        }
        Value::Proxy(proxy) => {
            if flavor.is_readonly() && !proxy.is_readonly() {
                Value::Proxy(proxy.readonly_view(flavor))
            } else {
                Value::Proxy(proxy)
            }
        }
        other => {
            report(RuntimeError::NotObservable {
                value: other.to_string(),
            });
            other
        }
    }
}

impl Reactive {
    fn cached(target: &Target, flavor: ProxyFlavor) -> Self {
        let slot = flavor.slot();
        if let Some(inner) = target.proxies().borrow()[slot].upgrade() {
            return Self { inner };
        }
        let inner = Rc::new(ProxyInner {
            target: target.clone(),
            flavor,
            source: None,
            views: RefCell::default(),
        });
        target.proxies().borrow_mut()[slot] = Rc::downgrade(&inner);
        Self { inner }
    }

    fn readonly_view(&self, flavor: ProxyFlavor) -> Self {
        let slot = flavor.slot();
        if let Some(inner) = self.inner.views.borrow()[slot].upgrade() {
            return Self { inner };
        }
        let inner = Rc::new(ProxyInner {
            target: self.inner.target.clone(),
            flavor,
            source: Some(self.clone()),
            views: RefCell::default(),
        });
        self.inner.views.borrow_mut()[slot] = Rc::downgrade(&inner);
        Self { inner }
    }

    /// Deep reactive proxy over a new object.
    pub fn new_object<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<Rc<str>>,
    {
        Self::cached(&Target::object(entries), ProxyFlavor::Reactive)
    }

    /// Shallow reactive proxy over a new object.
    pub fn new_shallow_object<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<Rc<str>>,
    {
        Self::cached(&Target::object(entries), ProxyFlavor::ShallowReactive)
    }

    /// Read-only view over the same state. Reads through it still track.
    pub fn as_readonly(&self) -> Self {
        match self.inner.flavor {
            ProxyFlavor::Readonly | ProxyFlavor::ShallowReadonly => self.clone(),
            ProxyFlavor::Reactive => self.readonly_view(ProxyFlavor::Readonly),
            ProxyFlavor::ShallowReactive => self.readonly_view(ProxyFlavor::ShallowReadonly),
        }
    }

    /// Deep reactive proxy over a new array.
    pub fn new_array<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self::cached(&Target::array(items), ProxyFlavor::Reactive)
    }

    /// Deep reactive proxy over a new map.
    pub fn new_map<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Value, Value)>,
    {
        Self::cached(&Target::map(entries), ProxyFlavor::Reactive)
    }

    /// Deep reactive proxy over a new set.
    pub fn new_set<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self::cached(&Target::set(items), ProxyFlavor::Reactive)
    }

    pub fn flavor(&self) -> ProxyFlavor {
        self.inner.flavor
    }

    pub fn kind(&self) -> ContainerKind {
        self.inner.target.kind()
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.flavor.is_readonly()
    }

    pub fn is_shallow(&self) -> bool {
        self.inner.flavor.is_shallow()
    }

    /// Whether the state behind this proxy can change and is observed.
    pub fn is_reactive(&self) -> bool {
        !self.is_readonly() || self.inner.source.is_some()
    }

    /// The container under every layer of proxies.
    pub fn raw_target(&self) -> Target {
        match &self.inner.source {
            Some(source) => source.raw_target(),
            None => self.inner.target.clone(),
        }
    }

    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub(super) fn target(&self) -> &Target {
        &self.inner.target
    }

    pub(super) fn track(&self, op: TrackOp, key: DepKey) {
        if self.is_reactive() {
            Runtime::track(self.inner.target.id(), op, key);
        }
    }

    pub(super) fn trigger(&self, op: TriggerOp, key: Option<DepKey>, new_len: Option<usize>) {
        Runtime::trigger(&self.inner.target, op, key, new_len);
    }

    /// Wrap a value read out of the container according to this flavor.
    pub(super) fn wrap(&self, value: Value) -> Value {
        if self.is_shallow() {
            return value;
        }
        let is_raw = matches!(value, Value::Raw(_));
        if is_raw && !value.as_target().is_some_and(Target::is_observable) {
            return value;
        }
        match self.inner.flavor {
            ProxyFlavor::Reactive if is_raw => reactive(value),
            ProxyFlavor::Readonly if is_raw && self.inner.source.is_some() => {
                readonly(reactive(value))
            }
            ProxyFlavor::Readonly if value.is_object() => readonly(value),
            _ => value,
        }
    }

    /// Values written through a deep proxy are stored raw.
    pub(super) fn unwrap(&self, value: Value) -> Value {
        if self.is_shallow() {
            value
        } else {
            value.to_raw()
        }
    }

    pub(super) fn reject_write(&self, key: &Value) -> bool {
        if self.is_readonly() {
            report(RuntimeError::ReadonlyWrite {
                key: key.to_string(),
            });
            return true;
        }
        false
    }

    pub(super) fn reject_delete(&self, key: &Value) -> bool {
        if self.is_readonly() {
            report(RuntimeError::ReadonlyDelete {
                key: key.to_string(),
            });
            return true;
        }
        false
    }

    /// Read one slot.
    pub fn get(&self, key: impl Into<Value>) -> Value {
        let key = key.into();
        match self.kind() {
            ContainerKind::Object => {
                let prop = key.to_property_key();
                self.track(TrackOp::Get, DepKey::Prop(prop.clone()));
                let value = self.target().with(|data| match data {
                    Container::Object(entries) => entries.get(&prop).cloned(),
                    _ => None,
                });
                self.wrap(value.unwrap_or_default())
            }
            ContainerKind::Array => match array_key(&key) {
                ArrayKey::Index(index) => {
                    self.track(TrackOp::Get, DepKey::Index(index));
                    let value = self.target().with(|data| match data {
                        Container::Array(items) => items.get(index).cloned(),
                        _ => None,
                    });
                    self.wrap(value.unwrap_or_default())
                }
                ArrayKey::Length => Value::from(self.len()),
                ArrayKey::Other(prop) => {
                    self.track(TrackOp::Get, DepKey::Prop(prop));
                    Value::Null
                }
            },
            ContainerKind::Map | ContainerKind::Set => self.collection_get(key),
        }
    }

    /// Write one slot. Subscribers are triggered only if the value changed.
    ///
    /// On a set, this adds `value`; the key is ignored.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) {
        let key = key.into();
        if self.reject_write(&key) {
            return;
        }
        let value = self.unwrap(value.into());
        match self.kind() {
            ContainerKind::Object => {
                let prop = key.to_property_key();
                let change = self.target().with_mut(|data| {
                    let Container::Object(entries) = data else {
                        return None;
                    };
                    match entries.get_mut(&prop) {
                        Some(slot) if *slot == value => None,
                        Some(slot) => {
                            *slot = value;
                            Some(TriggerOp::Set)
                        }
                        None => {
                            entries.insert(prop.clone(), value);
                            Some(TriggerOp::Add)
                        }
                    }
                });
                if let Some(op) = change {
                    self.trigger(op, Some(DepKey::Prop(prop)), None);
                }
            }
            ContainerKind::Array => match array_key(&key) {
                ArrayKey::Index(index) => self.set_index(index, value),
                ArrayKey::Length => match value.as_index() {
                    Some(len) => self.set_len(len),
                    None => tracing::warn!(%value, "invalid array length"),
                },
                ArrayKey::Other(prop) => {
                    tracing::warn!(key = %prop, "ignoring non-index key on array");
                }
            },
            ContainerKind::Map => self.map_set(key, value),
            ContainerKind::Set => self.add(value),
        }
    }

    fn set_index(&self, index: usize, value: Value) {
        if !self.gap_allowed(index) {
            return;
        }
        let change = self.target().with_mut(|data| {
            let Container::Array(items) = data else {
                return None;
            };
            match items.get_mut(index) {
                Some(slot) if *slot == value => None,
                Some(slot) => {
                    *slot = value;
                    Some(TriggerOp::Set)
                }
                None => {
                    items.resize(index, Value::Null);
                    items.push(value);
                    Some(TriggerOp::Add)
                }
            }
        });
        if let Some(op) = change {
            self.trigger(op, Some(DepKey::Index(index)), None);
        }
    }

    /// Remove one slot. Returns whether it existed.
    ///
    /// Deleting an array index leaves a `null` hole, like a sparse array.
    pub fn delete(&self, key: impl Into<Value>) -> bool {
        let key = key.into();
        if self.reject_delete(&key) {
            return false;
        }
        match self.kind() {
            ContainerKind::Object => {
                let prop = key.to_property_key();
                let had = self.target().with_mut(|data| match data {
                    Container::Object(entries) => entries.shift_remove(&prop).is_some(),
                    _ => false,
                });
                if had {
                    self.trigger(TriggerOp::Delete, Some(DepKey::Prop(prop)), None);
                }
                had
            }
            ContainerKind::Array => {
                let ArrayKey::Index(index) = array_key(&key) else {
                    return false;
                };
                let had = self.target().with_mut(|data| match data {
                    Container::Array(items) => match items.get_mut(index) {
                        Some(slot) => {
                            *slot = Value::Null;
                            true
                        }
                        None => false,
                    },
                    _ => false,
                });
                if had {
                    self.trigger(TriggerOp::Delete, Some(DepKey::Index(index)), None);
                }
                had
            }
            ContainerKind::Map | ContainerKind::Set => self.collection_delete(key),
        }
    }

    /// Whether a slot exists.
    pub fn has(&self, key: impl Into<Value>) -> bool {
        let key = key.into();
        match self.kind() {
            ContainerKind::Object => {
                let prop = key.to_property_key();
                self.track(TrackOp::Has, DepKey::Prop(prop.clone()));
                self.target().with(|data| match data {
                    Container::Object(entries) => entries.contains_key(&prop),
                    _ => false,
                })
            }
            ContainerKind::Array => match array_key(&key) {
                ArrayKey::Index(index) => {
                    self.track(TrackOp::Has, DepKey::Index(index));
                    index < self.target().len()
                }
                ArrayKey::Length => true,
                ArrayKey::Other(_) => false,
            },
            ContainerKind::Map | ContainerKind::Set => self.collection_has(key),
        }
    }

    /// Number of entries. Tracks the key set.
    pub fn len(&self) -> usize {
        match self.kind() {
            ContainerKind::Array => self.track(TrackOp::Get, DepKey::Length),
            _ => self.track(TrackOp::Iterate, DepKey::Iterate),
        }
        self.target().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Own keys: property names for objects, indices for arrays.
    ///
    /// Tracks only the key set, so overwriting a value does not re-run
    /// key-only readers.
    pub fn keys(&self) -> Vec<Value> {
        match self.kind() {
            ContainerKind::Object => {
                self.track(TrackOp::Iterate, DepKey::Iterate);
                self.target().with(|data| match data {
                    Container::Object(entries) => {
                        entries.keys().map(|k| Value::Str(k.clone())).collect()
                    }
                    _ => Vec::new(),
                })
            }
            ContainerKind::Array => (0..self.len()).map(Value::from).collect(),
            ContainerKind::Map | ContainerKind::Set => self.collection_keys(),
        }
    }

    /// All values, wrapped according to this flavor.
    pub fn values(&self) -> Vec<Value> {
        match self.kind() {
            ContainerKind::Object | ContainerKind::Array => {
                self.keys().into_iter().map(|key| self.get(key)).collect()
            }
            ContainerKind::Map | ContainerKind::Set => self.collection_values(),
        }
    }

    /// All `(key, value)` pairs, wrapped according to this flavor.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        match self.kind() {
            ContainerKind::Object | ContainerKind::Array => self
                .keys()
                .into_iter()
                .map(|key| {
                    let value = self.get(key.clone());
                    (key, value)
                })
                .collect(),
            ContainerKind::Map | ContainerKind::Set => self.collection_entries(),
        }
    }

    /// Visit every `(value, key)` pair.
    pub fn for_each(&self, mut f: impl FnMut(&Value, &Value)) {
        for (key, value) in self.entries() {
            f(&value, &key);
        }
    }

    fn expect_array(&self, op: &'static str) -> bool {
        if self.kind() == ContainerKind::Array {
            return true;
        }
        tracing::warn!(op, kind = ?self.kind(), "array operation on a non-array");
        false
    }

    /// Whether growing the array to reach `index` stays within the padding
    /// limit. Reports when it does not.
    fn gap_allowed(&self, index: usize) -> bool {
        let len = self.target().len();
        let limit = config::config().max_array_gap;
        if index.saturating_sub(len) <= limit {
            return true;
        }
        report(RuntimeError::ArrayGap { index, len, limit });
        false
    }

    /// Change an array's length, truncating or padding with `null`.
    pub fn set_len(&self, len: usize) {
        if self.reject_write(&Value::from("length"))
            || !self.expect_array("set_len")
            || !self.gap_allowed(len)
        {
            return;
        }
        let changed = self.target().with_mut(|data| match data {
            Container::Array(items) if items.len() != len => {
                items.resize(len, Value::Null);
                true
            }
            _ => false,
        });
        if changed {
            self.trigger(TriggerOp::Set, Some(DepKey::Length), Some(len));
        }
    }

    /// Append to an array.
    ///
    /// Structural array mutations never subscribe the running computation
    /// to the length they read internally.
    pub fn push(&self, value: impl Into<Value>) {
        let value = value.into();
        if self.reject_write(&Value::from("push")) || !self.expect_array("push") {
            return;
        }
        let value = self.unwrap(value);
        untracked(|| {
            let index = self.target().with_mut(|data| match data {
                Container::Array(items) => {
                    items.push(value);
                    Some(items.len() - 1)
                }
                _ => None,
            });
            if let Some(index) = index {
                self.trigger(TriggerOp::Add, Some(DepKey::Index(index)), None);
            }
        });
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        if self.reject_delete(&Value::from("pop")) || !self.expect_array("pop") {
            return None;
        }
        untracked(|| {
            let popped = self.target().with_mut(|data| match data {
                Container::Array(items) => items.pop().map(|value| (value, items.len())),
                _ => None,
            });
            popped.map(|(value, len)| {
                self.trigger(TriggerOp::Set, Some(DepKey::Length), Some(len));
                self.wrap(value)
            })
        })
    }

    /// Insert at `index`, shifting later elements. Past the end this appends.
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        let value = value.into();
        if self.reject_write(&Value::from(index)) || !self.expect_array("insert") {
            return;
        }
        let value = self.unwrap(value);
        untracked(|| {
            let at = self.target().with_mut(|data| match data {
                Container::Array(items) => {
                    let at = index.min(items.len());
                    items.insert(at, value);
                    Some(at)
                }
                _ => None,
            });
            if let Some(at) = at {
                self.trigger(TriggerOp::Set, Some(DepKey::Length), Some(at));
            }
        });
    }

    /// Remove and return the element at `index`, shifting later elements.
    pub fn remove(&self, index: usize) -> Option<Value> {
        if self.reject_delete(&Value::from(index)) || !self.expect_array("remove") {
            return None;
        }
        untracked(|| {
            let removed = self.target().with_mut(|data| match data {
                Container::Array(items) if index < items.len() => Some(items.remove(index)),
                _ => None,
            });
            removed.map(|value| {
                self.trigger(TriggerOp::Set, Some(DepKey::Length), Some(index));
                self.wrap(value)
            })
        })
    }

    /// Position of `needle` in an array, compared by raw identity.
    ///
    /// Tracks every element, since any of them could become a match.
    pub fn index_of(&self, needle: impl Into<Value>) -> Option<usize> {
        if !self.expect_array("index_of") {
            return None;
        }
        let needle = needle.into().to_raw();
        let len = self.len();
        for index in 0..len {
            self.track(TrackOp::Get, DepKey::Index(index));
        }
        self.target().with(|data| match data {
            Container::Array(items) => items.iter().position(|item| item.to_raw() == needle),
            _ => None,
        })
    }

    pub fn includes(&self, needle: impl Into<Value>) -> bool {
        self.index_of(needle).is_some()
    }

    /// Untracked deep snapshot.
    pub fn to_json(&self) -> serde_json::Value {
        Value::Raw(self.raw_target()).to_json()
    }
}

impl PartialEq for Reactive {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("flavor", &self.inner.flavor)
            .field("target", &self.inner.target)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{clear_report_handler, set_report_handler};
    use crate::reactive::Effect;
    use std::cell::Cell;

    fn counter(state: &Reactive, key: &'static str) -> (Effect, Rc<Cell<usize>>) {
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let state = state.clone();
        let effect = Effect::new(move || {
            state.get(key);
            runs_clone.set(runs_clone.get() + 1);
        });
        (effect, runs)
    }

    #[test]
    fn proxy_identity_is_cached() {
        let target = Target::object([("a", Value::from(1))]);
        let first = reactive(target.clone());
        let second = reactive(target.clone());
        assert_eq!(first, second);
        assert_ne!(first, readonly(target));
        assert_eq!(reactive(first.clone()), first);
    }

    #[test]
    fn write_triggers_only_on_change() {
        let state = Reactive::new_object([("a", Value::from(1))]);
        let (_effect, runs) = counter(&state, "a");

        state.set("a", 2);
        assert_eq!(runs.get(), 2);
        state.set("a", 2);
        assert_eq!(runs.get(), 2);

        state.set("a", f64::NAN);
        state.set("a", f64::NAN);
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn nested_values_wrap_lazily() {
        let inner = Target::object([("n", Value::from(1))]);
        let state = Reactive::new_object([("inner", Value::from(inner.clone()))]);

        let nested = state.get("inner");
        assert!(is_reactive(&nested));
        assert_eq!(nested.raw_target(), Some(inner));
        assert_eq!(state.get("inner"), nested);
    }

    #[test]
    fn readonly_write_is_reported_noop() {
        let reported = Rc::new(Cell::new(0));
        let reported_clone = reported.clone();
        set_report_handler(move |err| {
            if matches!(err, RuntimeError::ReadonlyWrite { .. } | RuntimeError::ReadonlyDelete { .. }) {
                reported_clone.set(reported_clone.get() + 1);
            }
        });

        let view = readonly(Target::object([("a", Value::from(1))]));
        let view = view.as_proxy().unwrap();
        view.set("a", 2);
        assert!(!view.delete("a"));
        assert_eq!(view.get("a"), Value::from(1));
        assert_eq!(reported.get(), 2);
        clear_report_handler();
    }

    #[test]
    fn readonly_over_reactive_still_tracks() {
        let state = Reactive::new_object([("a", Value::from(1))]);
        let view = readonly(state.clone());
        let view = view.as_proxy().unwrap().clone();
        assert!(view.is_readonly());
        assert!(view.is_reactive());
        assert_eq!(readonly(state.clone()), Value::Proxy(view.clone()));
        assert_eq!(reactive(view.clone()), Value::Proxy(view.clone()));

        let (_effect, runs) = counter(&view, "a");
        state.set("a", 5);
        assert_eq!(runs.get(), 2);
        assert_eq!(view.get("a"), Value::from(5));
    }

    #[test]
    fn marked_raw_and_frozen_are_not_wrapped() {
        let exempt = Target::object([("a", Value::from(1))]);
        mark_raw(&exempt);
        assert!(!is_proxy(&reactive(exempt)));

        let frozen = Target::array([Value::from(1)]);
        frozen.freeze();
        assert!(!is_proxy(&reactive(frozen)));
    }

    #[test]
    fn primitive_is_not_observable() {
        let reported = Rc::new(Cell::new(false));
        let reported_clone = reported.clone();
        set_report_handler(move |err| {
            if matches!(err, RuntimeError::NotObservable { .. }) {
                reported_clone.set(true);
            }
        });
        assert_eq!(reactive(3), Value::from(3));
        assert!(reported.get());
        clear_report_handler();
    }

    #[test]
    fn object_keys_track_key_set_only() {
        let state = Reactive::new_object([("a", Value::from(1))]);
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let state_clone = state.clone();
        let _effect = Effect::new(move || {
            state_clone.keys();
            runs_clone.set(runs_clone.get() + 1);
        });

        state.set("a", 2);
        assert_eq!(runs.get(), 1);
        state.set("b", 1);
        assert_eq!(runs.get(), 2);
        state.delete("a");
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn array_length_truncation_triggers_dropped_indices() {
        let list = Reactive::new_array([1, 2, 3, 4].map(Value::from));
        let (_first, first_runs) = counter(&list, "0");
        let (_last, last_runs) = counter(&list, "3");

        list.set_len(2);
        assert_eq!(first_runs.get(), 1);
        assert_eq!(last_runs.get(), 2);
        assert_eq!(list.get(3), Value::Null);
    }

    #[test]
    fn far_out_of_range_writes_are_rejected() {
        let rejected = Rc::new(Cell::new(0));
        let rejected_clone = rejected.clone();
        set_report_handler(move |err| {
            if matches!(err, RuntimeError::ArrayGap { .. }) {
                rejected_clone.set(rejected_clone.get() + 1);
            }
        });

        let list = Reactive::new_array([Value::from(1)]);
        let (_effect, runs) = counter(&list, "length");
        list.set(10_000_000, 2);
        list.set_len(usize::MAX);
        clear_report_handler();

        assert_eq!(rejected.get(), 2);
        assert_eq!(list.len(), 1);
        assert_eq!(runs.get(), 1);

        list.set(3, 4);
        assert_eq!(list.len(), 4);
        assert_eq!(list.get(2), Value::Null);
    }

    #[test]
    fn push_does_not_track_length() {
        let list = Reactive::new_array(Vec::new());
        let list_clone = list.clone();
        let effect = Effect::new(move || list_clone.push(1));
        assert_eq!(effect.dependency_count(), 0);

        let list_clone = list.clone();
        let _other = Effect::new(move || list_clone.push(2));
        assert_eq!(list.len(), 2);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn push_triggers_length_readers() {
        let list = Reactive::new_array(Vec::new());
        let (_effect, runs) = counter(&list, "length");
        list.push(1);
        list.push(2);
        assert_eq!(runs.get(), 3);
        assert_eq!(list.pop(), Some(Value::from(2)));
        assert_eq!(runs.get(), 4);
    }

    #[test]
    fn insert_and_remove_shift() {
        let list = Reactive::new_array([1, 3].map(Value::from));
        list.insert(1, 2);
        assert_eq!(list.values(), vec![Value::from(1), Value::from(2), Value::from(3)]);
        assert_eq!(list.remove(0), Some(Value::from(1)));
        assert_eq!(list.index_of(3), Some(1));
        assert!(!list.includes(1));
    }

    #[test]
    fn index_of_sees_through_proxies() {
        let item = Target::object([("id", Value::from(1))]);
        let list = Reactive::new_array([Value::from(item.clone())]);
        let wrapped = list.get(0);
        assert!(is_proxy(&wrapped));
        assert_eq!(list.index_of(wrapped), Some(0));
        assert_eq!(list.index_of(item), Some(0));
    }
}
