//! # The Container — heart of Pantry
//!
//! A key/value registry that wires application objects together
//! lazily: factories run on first read, their results are memoized,
//! and resolved keys are frozen against further writes.
//!
//! # Entry lifecycle
//! ```text
//!   set(Factory) ──> Pending ──get()──> Resolving ──ok──> Ready (frozen)
//!                       ▲                   │
//!                       └──────── err ──────┘
//!
//!   set(Literal)   ──> Ready (never frozen)
//!   set(Protected) ──> Pending, re-invoked on every get()
//!   delete(key)    ──> forgotten, may be redefined
//! ```
//!
//! # Examples
//! ```rust
//! use pantry_container::prelude::*;
//!
//! struct SessionStorage {
//!     cookie_name: String,
//! }
//!
//! let container = Container::new();
//! container.set_value("cookie_name", String::from("SESSION_ID")).unwrap();
//! container
//!     .set_factory("session_storage", |c| {
//!         let cookie_name = c.get_as::<String>("cookie_name")?;
//!         Ok(SessionStorage { cookie_name: cookie_name.to_string() })
//!     })
//!     .unwrap();
//!
//! let storage = container.get_as::<SessionStorage>("session_storage").unwrap();
//! assert_eq!(storage.cookie_name, "SESSION_ID");
//!
//! // Resolved keys are frozen.
//! assert!(container.set_value("session_storage", 1u8).is_err());
//! ```

use std::any::Any;
use std::fmt;

use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex};
use pantry_support::rendering::suggest_similar;
use tracing::{debug, info, instrument, warn};

use crate::entry::{Entry, Raw, Slot, Value};
use crate::error::{ContainerError, Result, UnknownIdentifierError};
use crate::guard::RecursionGuard;
use crate::key::ServiceKey;
use crate::provider::Provider;
use crate::service::ServiceMode;
use crate::settings::{ContainerSettings, DeprecationPolicy};
use crate::store::EntryStore;

const MAX_SUGGESTIONS: usize = 3;

// ============================================================
// ContainerBuilder
// ============================================================

/// Builds a [`Container`] with settings, initial entries and providers.
///
/// # Examples
/// ```rust
/// use pantry_container::prelude::*;
///
/// let container = Container::builder()
///     .atomic_update(true)
///     .value("cookie_name", String::from("SESSION_ID"))
///     .factory("greeting", |c| {
///         Ok(format!("cookie: {}", c.get_as::<String>("cookie_name")?))
///     })
///     .build()
///     .expect("Failed to build container");
///
/// let greeting = container.get_as::<String>("greeting").unwrap();
/// assert_eq!(greeting.as_str(), "cookie: SESSION_ID");
/// ```
pub struct ContainerBuilder {
    settings: ContainerSettings,
    entries: Vec<(ServiceKey, Entry)>,
    providers: Vec<Box<dyn Provider>>,
    discover: bool,
}

impl ContainerBuilder {
    fn new() -> Self {
        Self {
            settings: ContainerSettings::default(),
            entries: Vec::new(),
            providers: Vec::new(),
            discover: false,
        }
    }

    /// Replace all settings at once (e.g. deserialized from a config file).
    pub fn settings(mut self, settings: ContainerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Validate every pair before applying any in [`Container::update`].
    pub fn atomic_update(mut self, atomic: bool) -> Self {
        self.settings.atomic_update = atomic;
        self
    }

    /// Reject overwrites of FINAL services even before their first read.
    pub fn strict_final(mut self, strict: bool) -> Self {
        self.settings.strict_final = strict;
        self
    }

    /// Select the deprecation-notice policy.
    pub fn deprecation(mut self, policy: DeprecationPolicy) -> Self {
        self.settings.deprecation = policy;
        self
    }

    // ── Entries ──

    /// Register a literal value.
    pub fn value<T: Any + Send + Sync>(self, key: impl Into<ServiceKey>, value: T) -> Self {
        self.entry(key, Entry::value(value))
    }

    /// Register a lazy factory, memoized on first read.
    pub fn factory<T, F>(self, key: impl Into<ServiceKey>, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        self.entry(key, Entry::factory(factory))
    }

    /// Register a protected factory, re-invoked on every read.
    pub fn protected<T, F>(self, key: impl Into<ServiceKey>, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        self.entry(key, Entry::protected(factory))
    }

    /// Register any entry.
    pub fn entry(mut self, key: impl Into<ServiceKey>, entry: Entry) -> Self {
        self.entries.push((key.into(), entry));
        self
    }

    // ── Provider modules ──

    /// Add a [`Provider`] module, applied after the entries.
    pub fn provider(mut self, provider: impl Provider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Also apply every provider submitted with `inventory::submit!`.
    pub fn discover_providers(mut self) -> Self {
        self.discover = true;
        self
    }

    // ── Build ──

    /// Build the container, applying entries then providers in order.
    ///
    /// # Errors
    /// Any error raised by a provider's registrations.
    #[instrument(skip(self), name = "container_build")]
    pub fn build(self) -> Result<Container> {
        info!(
            entries = self.entries.len(),
            providers = self.providers.len(),
            discover = self.discover,
            "Building container"
        );

        let container = Container::with_settings(self.settings);
        container.update(self.entries)?;

        for provider in &self.providers {
            container.add_provider(provider.as_ref())?;
        }

        if self.discover {
            container.discover_providers()?;
        }

        info!(entries = container.len(), "Container built successfully ✓");
        Ok(container)
    }
}

impl fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("settings", &self.settings)
            .field("entries", &self.entries.len())
            .field("providers", &self.providers.len())
            .field("discover", &self.discover)
            .finish()
    }
}

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

/// Lazily-resolving, mutation-guarded service container.
///
/// `Container` is `Send + Sync`. Concurrent first reads of the same key
/// invoke its factory once; the other readers wait for the result.
pub struct Container {
    pub(crate) store: Mutex<EntryStore>,
    /// Signalled whenever a resolving slot settles or the store changes.
    pub(crate) settled: Condvar,
    pub(crate) guard: RecursionGuard,
    settings: ContainerSettings,
}

impl Container {
    /// Create an empty container with default settings.
    pub fn new() -> Self {
        Self::with_settings(ContainerSettings::default())
    }

    /// Create a new builder.
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    /// Create an empty container with explicit settings.
    pub fn with_settings(settings: ContainerSettings) -> Self {
        settings
            .deprecation
            .notify("legacy container", "Container::new or Container::builder");

        Self {
            store: Mutex::new(EntryStore::new()),
            settled: Condvar::new(),
            guard: RecursionGuard::new(),
            settings,
        }
    }

    /// Create a container for callers of the legacy entry point.
    ///
    /// Behaves exactly like [`Container::new`] but logs a deprecation
    /// notice through `tracing`.
    pub fn legacy() -> Self {
        Self::with_settings(ContainerSettings {
            deprecation: DeprecationPolicy::Log,
            ..ContainerSettings::default()
        })
    }

    /// The settings this container was built with.
    pub fn settings(&self) -> &ContainerSettings {
        &self.settings
    }

    // ── Mutation guard ──

    /// Store `entry` under `key`.
    ///
    /// Factories stay unresolved until first read.
    ///
    /// # Errors
    /// [`ContainerError::FrozenService`] if `key` was already resolved.
    pub fn set(&self, key: impl Into<ServiceKey>, entry: impl Into<Entry>) -> Result<()> {
        let mut store = self.store.lock();
        self.write_locked(&mut store, key.into(), entry.into())
    }

    /// Store a literal value.
    pub fn set_value<T: Any + Send + Sync>(&self, key: impl Into<ServiceKey>, value: T) -> Result<()> {
        self.set(key, Entry::value(value))
    }

    /// Store a lazy factory, memoized on first read.
    pub fn set_factory<T, F>(&self, key: impl Into<ServiceKey>, factory: F) -> Result<()>
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        self.set(key, Entry::factory(factory))
    }

    /// Store a protected factory, re-invoked on every read.
    pub fn set_protected<T, F>(&self, key: impl Into<ServiceKey>, factory: F) -> Result<()>
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        self.set(key, Entry::protected(factory))
    }

    /// Apply each pair via [`set`](Container::set), in iteration order.
    ///
    /// By default the update is not atomic: it stops at the first
    /// frozen key and earlier pairs stay applied. With
    /// [`ContainerSettings::atomic_update`] every pair is checked first
    /// and nothing is written on failure.
    pub fn update<I, K, E>(&self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, E)>,
        K: Into<ServiceKey>,
        E: Into<Entry>,
    {
        let pairs: Vec<(ServiceKey, Entry)> = pairs
            .into_iter()
            .map(|(key, entry)| (key.into(), entry.into()))
            .collect();

        let mut store = self.store.lock();

        if self.settings.atomic_update {
            for (key, _) in &pairs {
                self.ensure_writable(&store, key)?;
            }
        }

        for (key, entry) in pairs {
            self.write_locked(&mut store, key, entry)?;
        }

        Ok(())
    }

    /// Remove `key` and forget its history; it may be freshly redefined.
    ///
    /// # Errors
    /// [`ContainerError::UnknownIdentifier`] if `key` is absent.
    pub fn delete(&self, key: &str) -> Result<()> {
        let mut store = self.store.lock();

        if store.remove(key).is_none() {
            return Err(unknown_identifier(&store, key));
        }

        debug!(key, "Deleted entry");
        drop(store);
        self.settled.notify_all();
        Ok(())
    }

    /// Resolve `key`, then delete it, returning the resolved value.
    pub fn pop(&self, key: &str) -> Result<Value> {
        let value = self.get(key)?;
        self.delete(key)?;
        Ok(value)
    }

    /// Remove every entry along with all resolution bookkeeping.
    pub fn clear(&self) {
        let mut store = self.store.lock();
        store.clear();
        debug!("Cleared container");
        drop(store);
        self.settled.notify_all();
    }

    // ── Protection ──

    /// Re-invoke `key`'s factory on every read from now on.
    ///
    /// Protecting a resolved key un-freezes it: its original factory is
    /// restored and the memoized result is dropped.
    ///
    /// # Errors
    /// [`ContainerError::UnknownIdentifier`] if `key` is absent.
    pub fn protect(&self, key: &str) -> Result<()> {
        let mut store = self.store.lock();

        let Some(stored) = store.stored_key(key) else {
            return Err(unknown_identifier(&store, key));
        };

        if store.unfreeze(key)
            && let Some(factory) = store.recorded_factory(key).cloned()
        {
            store.replace_slot(key, Slot::Pending(factory));
        }

        store.protect(stored);
        debug!(key, "Protected entry");
        Ok(())
    }

    // ── Introspection ──

    /// Returns `true` if `key` is present.
    pub fn has(&self, key: &str) -> bool {
        self.store.lock().contains(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<ServiceKey> {
        self.store.lock().keys()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    /// Returns `true` if the container holds no entries.
    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    /// Returns `true` if `key` was resolved and is now immutable.
    pub fn is_frozen(&self, key: &str) -> bool {
        self.store.lock().is_frozen(key)
    }

    /// Returns `true` if `key` is re-invoked on every read.
    pub fn is_protected(&self, key: &str) -> bool {
        self.store.lock().is_protected(key)
    }

    /// The registration mode recorded for `key`.
    ///
    /// Literal entries carry no mode.
    ///
    /// # Errors
    /// [`ContainerError::UnknownIdentifier`] if `key` is absent.
    pub fn mode(&self, key: &str) -> Result<Option<ServiceMode>> {
        let store = self.store.lock();
        if !store.contains(key) {
            return Err(unknown_identifier(&store, key));
        }
        Ok(store.mode(key))
    }

    /// The original factory if one was recorded, else the stored definition.
    ///
    /// Survives memoization: after a factory key is resolved this still
    /// returns the factory, not its result.
    ///
    /// # Errors
    /// [`ContainerError::UnknownIdentifier`] if `key` is absent.
    pub fn raw(&self, key: &str) -> Result<Raw> {
        let store = self.store.lock();
        store.raw(key).ok_or_else(|| unknown_identifier(&store, key))
    }

    // ── Warm-up ──

    /// Resolve every pending, unprotected factory in insertion order.
    #[instrument(skip(self), name = "container_warm_up")]
    pub fn warm_up(&self) -> Result<()> {
        for key in self.keys() {
            let pending = {
                let store = self.store.lock();
                matches!(store.slot(&key), Some(Slot::Pending(_))) && !store.is_protected(&key)
            };

            if pending {
                self.get(&key)?;
            }
        }
        Ok(())
    }

    /// Resolved `(key, value)` pairs in insertion order.
    ///
    /// Forces resolution of every entry first.
    pub fn items(&self) -> Result<Vec<(ServiceKey, Value)>> {
        let keys = self.keys();
        let mut items = Vec::with_capacity(keys.len());

        for key in keys {
            match self.get(&key) {
                Ok(value) => items.push((key, value)),
                // removed by a factory during warm-up
                Err(ContainerError::UnknownIdentifier(_)) if !self.has(&key) => continue,
                Err(err) => return Err(err),
            }
        }

        Ok(items)
    }

    /// Resolved values in key insertion order.
    pub fn values(&self) -> Result<Vec<Value>> {
        Ok(self.items()?.into_iter().map(|(_, value)| value).collect())
    }

    /// A plain mapping of every key to its resolved value.
    pub fn copy(&self) -> Result<IndexMap<ServiceKey, Value>> {
        Ok(self.items()?.into_iter().collect())
    }

    // ── Internal ──

    /// Checks the mutation guard without writing.
    pub(crate) fn ensure_writable(&self, store: &EntryStore, key: &ServiceKey) -> Result<()> {
        if store.is_frozen(key) {
            debug!(key = %key, "Rejected write to frozen service");
            return Err(ContainerError::FrozenService(key.clone()));
        }

        if self.settings.strict_final && is_final(store, key) {
            debug!(key = %key, "Rejected write to final service");
            return Err(ContainerError::FrozenService(key.clone()));
        }

        Ok(())
    }

    /// Mutation-guarded write under an already-held store lock.
    pub(crate) fn write_locked(&self, store: &mut EntryStore, key: ServiceKey, entry: Entry) -> Result<()> {
        self.ensure_writable(store, &key)?;

        if is_final(store, &key) {
            warn!(key = %key, "Overwriting a FINAL service before its first read");
        }

        debug!(key = %key, entry = ?entry, "Set entry");
        store.write(key, entry);
        self.settled.notify_all();
        Ok(())
    }
}

fn is_final(store: &EntryStore, key: &str) -> bool {
    store.mode(key).is_some_and(|mode| mode.contains(ServiceMode::FINAL))
}

/// Builds an [`ContainerError::UnknownIdentifier`] with suggestions.
pub(crate) fn unknown_identifier(store: &EntryStore, key: &str) -> ContainerError {
    let suggestions = suggest_similar(key, &store.key_names(), MAX_SUGGESTIONS);
    debug!(key, suggestions = suggestions.len(), "Unknown identifier");

    ContainerError::UnknownIdentifier(UnknownIdentifierError {
        key: ServiceKey::from(key),
        suggestions,
    })
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.store.lock();
        f.debug_struct("Container")
            .field("entries", &store.len())
            .field("frozen", &store.frozen_count())
            .field("protected", &store.protected_count())
            .finish()
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::{Container, ContainerBuilder};
    pub use crate::entry::{Entry, Raw, Value};
    pub use crate::error::{ContainerError, Result};
    pub use crate::key::ServiceKey;
    pub use crate::provider::Provider;
    pub use crate::service::{Injection, Service, ServiceMode};
    pub use crate::settings::{ContainerSettings, DeprecationPolicy};
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
