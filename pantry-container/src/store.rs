//! Entry store — insertion-ordered storage for every key's slot and
//! the bookkeeping the resolver layers on top.
//!
//! The store is pure storage: it enforces no invariants itself. The
//! mutation guard and the resolver in [`crate::container`] decide
//! when each method may be called.

use std::collections::{HashMap, HashSet};
use std::fmt;

use indexmap::IndexMap;
use tracing::trace;

use crate::entry::{Entry, FactoryFn, Raw, Slot, Value};
use crate::key::ServiceKey;
use crate::service::ServiceMode;

#[derive(Default)]
pub(crate) struct EntryStore {
    slots: IndexMap<ServiceKey, Slot>,
    /// Original factories of resolved keys; survives memoization.
    raw: HashMap<ServiceKey, FactoryFn>,
    frozen: HashSet<ServiceKey>,
    protected: HashSet<ServiceKey>,
    /// Registration metadata side-table.
    modes: HashMap<ServiceKey, ServiceMode>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `entry` under `key`, keeping the key's position if it
    /// already exists. The entry's tag decides protection.
    pub fn write(&mut self, key: ServiceKey, entry: Entry) {
        self.raw.remove(&key);

        let slot = match entry {
            Entry::Literal(value) => {
                self.protected.remove(&key);
                self.modes.remove(&key);
                Slot::Ready(value)
            }
            Entry::Factory(factory) => {
                self.protected.remove(&key);
                self.modes.insert(key.clone(), ServiceMode::COMMON);
                Slot::Pending(factory)
            }
            Entry::Protected(factory) => {
                self.protected.insert(key.clone());
                self.modes.insert(key.clone(), ServiceMode::FACTORY);
                Slot::Pending(factory)
            }
        };

        trace!(key = %key, slot = ?slot, "Stored entry");
        self.slots.insert(key, slot);
    }

    pub fn slot(&self, key: &str) -> Option<&Slot> {
        self.slots.get(key)
    }

    /// The stored key together with its slot.
    pub fn entry(&self, key: &str) -> Option<(&ServiceKey, &Slot)> {
        self.slots.get_key_value(key)
    }

    /// The stored (shared) key equal to `key`.
    pub fn stored_key(&self, key: &str) -> Option<ServiceKey> {
        self.slots.get_key_value(key).map(|(stored, _)| stored.clone())
    }

    /// Replaces the slot of an existing key without touching bookkeeping.
    pub fn replace_slot(&mut self, key: &str, slot: Slot) {
        if let Some(current) = self.slots.get_mut(key) {
            *current = slot;
        }
    }

    /// Records a resolved factory result: value in place, factory kept
    /// as raw, key frozen.
    pub fn memoize(&mut self, key: &ServiceKey, value: Value, factory: FactoryFn) {
        self.replace_slot(key, Slot::Ready(value));
        self.raw.insert(key.clone(), factory);
        self.frozen.insert(key.clone());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Removes `key` and every piece of derived state.
    pub fn remove(&mut self, key: &str) -> Option<Slot> {
        self.raw.remove(key);
        self.frozen.remove(key);
        self.protected.remove(key);
        self.modes.remove(key);
        self.slots.shift_remove(key)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.raw.clear();
        self.frozen.clear();
        self.protected.clear();
        self.modes.clear();
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<ServiceKey> {
        self.slots.keys().cloned().collect()
    }

    pub fn key_names(&self) -> Vec<&str> {
        self.slots.keys().map(ServiceKey::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The unevaluated definition: recorded factory first, else the slot.
    pub fn raw(&self, key: &str) -> Option<Raw> {
        if let Some(factory) = self.raw.get(key) {
            return Some(Raw::Factory(factory.clone()));
        }

        self.slots.get(key).map(|slot| match slot {
            Slot::Ready(value) => Raw::Value(value.clone()),
            Slot::Pending(factory) | Slot::Resolving { factory, .. } => {
                Raw::Factory(factory.clone())
            }
        })
    }

    pub fn recorded_factory(&self, key: &str) -> Option<&FactoryFn> {
        self.raw.get(key)
    }

    pub fn is_frozen(&self, key: &str) -> bool {
        self.frozen.contains(key)
    }

    pub fn unfreeze(&mut self, key: &str) -> bool {
        self.frozen.remove(key)
    }

    pub fn frozen_count(&self) -> usize {
        self.frozen.len()
    }

    pub fn is_protected(&self, key: &str) -> bool {
        self.protected.contains(key)
    }

    pub fn protect(&mut self, key: ServiceKey) {
        if let Some(mode) = self.modes.get_mut(&key) {
            mode.insert(ServiceMode::FACTORY);
        }
        self.protected.insert(key);
    }

    pub fn protected_count(&self) -> usize {
        self.protected.len()
    }

    pub fn mode(&self, key: &str) -> Option<ServiceMode> {
        self.modes.get(key).copied()
    }

    pub fn set_mode(&mut self, key: ServiceKey, mode: ServiceMode) {
        self.modes.insert(key, mode);
    }
}

impl fmt::Debug for EntryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryStore")
            .field("slots", &self.slots)
            .field("recorded", &self.raw.len())
            .field("frozen", &self.frozen.len())
            .field("protected", &self.protected.len())
            .finish()
    }
}
