//! Plain data model.
//!
//! Reactive state is made of dynamically-shaped containers (objects,
//! arrays, maps, sets) holding [`Value`]s. A container lives behind a
//! [`Target`], the raw, untracked handle. Proxies ([`Reactive`]) wrap a
//! target and record reads and trigger writes; the target itself never does.
//!
//! Every target gets a stable [`TargetId`] in the dependency registry. When
//! the last handle to a target goes away its dependency map entry is
//! released.
//!
//! Equality is SameValueZero: numbers compare by value with NaN equal to
//! itself, strings by content, containers and proxies by identity. The same
//! relation is used for change detection and for map/set keys.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};

use super::proxy::{ProxyInner, Reactive};
use super::runtime::Runtime;

/// Stable identity of a raw container in the dependency registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// The data behind a target.
#[derive(Debug, Clone)]
pub enum Container {
    Object(IndexMap<Rc<str>, Value>),
    Array(Vec<Value>),
    Map(IndexMap<Value, Value>),
    Set(IndexSet<Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Object,
    Array,
    Map,
    Set,
}

impl Container {
    pub fn kind(&self) -> ContainerKind {
        match self {
            Container::Object(_) => ContainerKind::Object,
            Container::Array(_) => ContainerKind::Array,
            Container::Map(_) => ContainerKind::Map,
            Container::Set(_) => ContainerKind::Set,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Container::Object(entries) => entries.len(),
            Container::Array(items) => items.len(),
            Container::Map(entries) => entries.len(),
            Container::Set(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Proxy slots cached per flavor: reactive, shallow reactive, readonly,
/// shallow readonly.
pub(crate) type ProxyCache = RefCell<[Weak<ProxyInner>; 4]>;

pub(crate) struct TargetInner {
    id: TargetId,
    data: RefCell<Container>,
    skip: Cell<bool>,
    frozen: Cell<bool>,
    pub(crate) proxies: ProxyCache,
}

impl Drop for TargetInner {
    fn drop(&mut self) {
        Runtime::release(self.id);
    }
}

/// Raw handle to a container.
#[derive(Clone)]
pub struct Target {
    inner: Rc<TargetInner>,
}

impl Target {
    pub fn new(data: Container) -> Self {
        Self {
            inner: Rc::new(TargetInner {
                id: TargetId::next(),
                data: RefCell::new(data),
                skip: Cell::new(false),
                frozen: Cell::new(false),
                proxies: RefCell::default(),
            }),
        }
    }

    pub fn object<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<Rc<str>>,
    {
        Self::new(Container::Object(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn array<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self::new(Container::Array(items.into_iter().collect()))
    }

    pub fn map<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Value, Value)>,
    {
        Self::new(Container::Map(entries.into_iter().collect()))
    }

    pub fn set<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self::new(Container::Set(items.into_iter().collect()))
    }

    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    pub fn kind(&self) -> ContainerKind {
        self.inner.data.borrow().kind()
    }

    /// Untracked length.
    pub fn len(&self) -> usize {
        self.inner.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exempt this target from ever being wrapped in a proxy.
    pub fn mark_raw(&self) -> &Self {
        self.inner.skip.set(true);
        self
    }

    /// Make the target non-extensible. Frozen targets are never wrapped.
    pub fn freeze(&self) -> &Self {
        self.inner.frozen.set(true);
        self
    }

    /// Whether proxies may wrap this target.
    pub fn is_observable(&self) -> bool {
        !self.inner.skip.get() && !self.inner.frozen.get()
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.get()
    }

    /// Read the container without tracking.
    pub fn with<R>(&self, f: impl FnOnce(&Container) -> R) -> R {
        f(&self.inner.data.borrow())
    }

    pub(crate) fn with_mut<R>(&self, f: impl FnOnce(&mut Container) -> R) -> R {
        f(&mut self.inner.data.borrow_mut())
    }

    pub(crate) fn proxies(&self) -> &ProxyCache {
        &self.inner.proxies
    }

    /// Untracked read of one slot: object property, array index, map entry
    /// or set membership (which returns the member itself).
    pub fn get_raw(&self, key: &Value) -> Value {
        self.with(|data| match data {
            Container::Object(entries) => entries
                .get(key.to_property_key().as_ref())
                .cloned()
                .unwrap_or(Value::Null),
            Container::Array(items) => match key.as_index() {
                Some(index) => items.get(index).cloned().unwrap_or(Value::Null),
                None if key.as_str() == Some("length") => Value::from(items.len()),
                None => Value::Null,
            },
            Container::Map(entries) => entries.get(&key.to_raw()).cloned().unwrap_or(Value::Null),
            Container::Set(items) => items.get(&key.to_raw()).cloned().unwrap_or(Value::Null),
        })
    }

    pub fn ptr_eq(&self, other: &Target) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Target {}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.inner.id)
            .field("kind", &self.kind())
            .field("len", &self.len())
            .finish()
    }
}

/// One slot of reactive data.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    /// A raw container.
    Raw(Target),
    /// A proxy over a container.
    Proxy(Reactive),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64()
            .filter(|n| n.fract() == 0.0 && n.is_finite())
            .map(|n| n as i64)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Reactive> {
        match self {
            Value::Proxy(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Value::Raw(t) => Some(t),
            _ => None,
        }
    }

    /// Whether this is a container (raw or proxied).
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Raw(_) | Value::Proxy(_))
    }

    /// Non-negative integral numbers (and their decimal strings) address
    /// array slots.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && n.is_finite() => {
                Some(*n as usize)
            }
            Value::Str(s) => s.parse::<usize>().ok().filter(|i| i.to_string() == **s),
            _ => None,
        }
    }

    /// The string form used as an object property key.
    pub fn to_property_key(&self) -> Rc<str> {
        match self {
            Value::Str(s) => s.clone(),
            other => Rc::from(other.to_string()),
        }
    }

    /// The container this value refers to, through any number of proxies.
    pub fn raw_target(&self) -> Option<Target> {
        match self {
            Value::Raw(t) => Some(t.clone()),
            Value::Proxy(p) => Some(p.raw_target()),
            _ => None,
        }
    }

    /// Strip proxies; primitives are returned as they are.
    pub fn to_raw(&self) -> Value {
        match self {
            Value::Proxy(p) => Value::Raw(p.raw_target()),
            other => other.clone(),
        }
    }

    /// Read a slot. Through a proxy this tracks; on raw data it does not.
    pub fn get(&self, key: impl Into<Value>) -> Value {
        match self {
            Value::Proxy(p) => p.get(key),
            Value::Raw(t) => t.get_raw(&key.into()),
            _ => Value::Null,
        }
    }

    /// Type name used in prop validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Boolean",
            Value::Number(_) => "Number",
            Value::Str(_) => "String",
            Value::Raw(_) | Value::Proxy(_) => match self.raw_target().map(|t| t.kind()) {
                Some(ContainerKind::Array) => "Array",
                Some(ContainerKind::Map) => "Map",
                Some(ContainerKind::Set) => "Set",
                _ => "Object",
            },
        }
    }

    /// Deep untracked snapshot. Containers seen twice become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut seen = HashSet::new();
        self.to_json_inner(&mut seen)
    }

    fn to_json_inner(&self, seen: &mut HashSet<TargetId>) -> serde_json::Value {
        use serde_json::Value as Json;
        let target = match self {
            Value::Null => return Json::Null,
            Value::Bool(b) => return Json::Bool(*b),
            Value::Number(n) => {
                return serde_json::Number::from_f64(*n)
                    .map(Json::Number)
                    .unwrap_or(Json::Null)
            }
            Value::Str(s) => return Json::String(s.to_string()),
            Value::Raw(_) | Value::Proxy(_) => match self.raw_target() {
                Some(target) => target,
                None => return Json::Null,
            },
        };
        if !seen.insert(target.id()) {
            return Json::Null;
        }
        let json = target.with(|data| match data {
            Container::Object(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_json_inner(seen)))
                    .collect(),
            ),
            Container::Array(items) => {
                Json::Array(items.iter().map(|v| v.to_json_inner(seen)).collect())
            }
            Container::Map(entries) => Json::Array(
                entries
                    .iter()
                    .map(|(k, v)| Json::Array(vec![k.to_json_inner(seen), v.to_json_inner(seen)]))
                    .collect(),
            ),
            Container::Set(items) => {
                Json::Array(items.iter().map(|v| v.to_json_inner(seen)).collect())
            }
        });
        seen.remove(&target.id());
        json
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Raw(a), Value::Raw(b)) => a.ptr_eq(b),
            (Value::Proxy(a), Value::Proxy(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// Whether writing `next` over `current` counts as no change.
///
/// `PartialEq` plus NaN equal to itself for bare `f64` and `f32`, matching
/// how [`Value`] compares numbers.
pub fn same_value<T: PartialEq + 'static>(current: &T, next: &T) -> bool {
    if current == next {
        return true;
    }
    let (current, next) = (current as &dyn Any, next as &dyn Any);
    if let (Some(a), Some(b)) = (current.downcast_ref::<f64>(), next.downcast_ref::<f64>()) {
        return a.is_nan() && b.is_nan();
    }
    if let (Some(a), Some(b)) = (current.downcast_ref::<f32>(), next.downcast_ref::<f32>()) {
        return a.is_nan() && b.is_nan();
    }
    false
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => {
                let bits = if *n == 0.0 {
                    0
                } else if n.is_nan() {
                    f64::NAN.to_bits()
                } else {
                    n.to_bits()
                };
                bits.hash(state);
            }
            Value::Str(s) => s.hash(state),
            Value::Raw(t) => t.id().hash(state),
            Value::Proxy(p) => p.addr().hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => f.write_str(s),
            Value::Raw(t) => write!(f, "[{:?} #{}]", t.kind(), t.id().raw()),
            Value::Proxy(p) => write!(f, "[proxy {:?} #{}]", p.kind(), p.raw_target().id().raw()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            other => write!(f, "{other}"),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! number_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Number(n as f64)
            }
        })*
    };
}

number_from!(i32, i64, u32, u64, usize, f32, f64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<Target> for Value {
    fn from(t: Target) -> Self {
        Value::Raw(t)
    }
}

impl From<Reactive> for Value {
    fn from(p: Reactive) -> Self {
        Value::Proxy(p)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::from(s),
            Json::Array(items) => Value::Raw(Target::array(items.into_iter().map(Value::from))),
            Json::Object(entries) => Value::Raw(Target::object(
                entries.into_iter().map(|(k, v)| (k, Value::from(v))),
            )),
        }
    }
}
