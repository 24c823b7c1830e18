//! Map and set access through a proxy.
//!
//! Hash-based collections have three levels of reactivity:
//!
//! 1. Per-entry deps, keyed by the raw key: `get` and `has` readers re-run
//!    only when that entry changes.
//! 2. The iterate dep: whole-collection readers (`len`, `values`,
//!    `entries`, `for_each`) re-run on add, delete and clear, and for maps
//!    also when a value is overwritten.
//! 3. The key-iterate dep (maps only): `keys` readers re-run only when the
//!    key set changes.
//!
//! Keys are always stored and compared raw, so a proxy and its target
//! address the same entry.

use super::proxy::Reactive;
use super::runtime::{DepKey, TrackOp, TriggerOp};
use super::value::{Container, ContainerKind, Value};

impl Reactive {
    pub(super) fn collection_get(&self, key: Value) -> Value {
        let key = key.to_raw();
        self.track(TrackOp::Get, DepKey::Entry(key.clone()));
        let value = self.target().with(|data| match data {
            Container::Map(entries) => entries.get(&key).cloned(),
            Container::Set(items) => items.get(&key).cloned(),
            _ => None,
        });
        self.wrap(value.unwrap_or_default())
    }

    pub(super) fn collection_has(&self, key: Value) -> bool {
        let key = key.to_raw();
        self.track(TrackOp::Has, DepKey::Entry(key.clone()));
        self.target().with(|data| match data {
            Container::Map(entries) => entries.contains_key(&key),
            Container::Set(items) => items.contains(&key),
            _ => false,
        })
    }

    pub(super) fn map_set(&self, key: Value, value: Value) {
        let key = key.to_raw();
        let change = self.target().with_mut(|data| {
            let Container::Map(entries) = data else {
                return None;
            };
            match entries.get_mut(&key) {
                Some(slot) if *slot == value => None,
                Some(slot) => {
                    *slot = value;
                    Some(TriggerOp::Set)
                }
                None => {
                    entries.insert(key.clone(), value);
                    Some(TriggerOp::Add)
                }
            }
        });
        if let Some(op) = change {
            self.trigger(op, Some(DepKey::Entry(key)), None);
        }
    }

    pub(super) fn collection_delete(&self, key: Value) -> bool {
        let key = key.to_raw();
        let removed = self.target().with_mut(|data| match data {
            Container::Map(entries) => entries.shift_remove(&key).is_some(),
            Container::Set(items) => items.shift_remove(&key),
            _ => false,
        });
        if removed {
            self.trigger(TriggerOp::Delete, Some(DepKey::Entry(key)), None);
        }
        removed
    }

    /// Insert a member into a set. Adding an existing member does nothing.
    pub fn add(&self, value: impl Into<Value>) {
        let value = value.into();
        if self.reject_write(&value) {
            return;
        }
        if self.kind() != ContainerKind::Set {
            tracing::warn!(kind = ?self.kind(), "add on a non-set");
            return;
        }
        let value = value.to_raw();
        let added = self.target().with_mut(|data| match data {
            Container::Set(items) => items.insert(value.clone()),
            _ => false,
        });
        if added {
            self.trigger(TriggerOp::Add, Some(DepKey::Entry(value)), None);
        }
    }

    /// Remove every entry. Every reader of the collection re-runs.
    pub fn clear(&self) {
        if self.reject_delete(&Value::from("clear")) {
            return;
        }
        let had_entries = self.target().with_mut(|data| {
            let had_entries = !data.is_empty();
            match data {
                Container::Object(entries) => entries.clear(),
                Container::Array(items) => items.clear(),
                Container::Map(entries) => entries.clear(),
                Container::Set(items) => items.clear(),
            }
            had_entries
        });
        if had_entries {
            self.trigger(TriggerOp::Clear, None, None);
        }
    }

    pub(super) fn collection_keys(&self) -> Vec<Value> {
        match self.kind() {
            ContainerKind::Map => {
                self.track(TrackOp::Iterate, DepKey::KeyIterate);
                let keys = self.target().with(|data| match data {
                    Container::Map(entries) => entries.keys().cloned().collect(),
                    _ => Vec::new(),
                });
                keys.into_iter().map(|key| self.wrap(key)).collect()
            }
            _ => self.collection_values(),
        }
    }

    pub(super) fn collection_values(&self) -> Vec<Value> {
        self.track(TrackOp::Iterate, DepKey::Iterate);
        let values: Vec<Value> = self.target().with(|data| match data {
            Container::Map(entries) => entries.values().cloned().collect(),
            Container::Set(items) => items.iter().cloned().collect(),
            _ => Vec::new(),
        });
        values.into_iter().map(|value| self.wrap(value)).collect()
    }

    /// Map entries as `(key, value)`; set members as `(member, member)`.
    pub(super) fn collection_entries(&self) -> Vec<(Value, Value)> {
        self.track(TrackOp::Iterate, DepKey::Iterate);
        let entries: Vec<(Value, Value)> = self.target().with(|data| match data {
            Container::Map(entries) => entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            Container::Set(items) => items.iter().map(|v| (v.clone(), v.clone())).collect(),
            _ => Vec::new(),
        });
        entries
            .into_iter()
            .map(|(key, value)| (self.wrap(key), self.wrap(value)))
            .collect()
    }
}
