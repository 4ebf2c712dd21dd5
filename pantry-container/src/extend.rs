//! Extension chain — wrap an existing factory with a transform.
//!
//! `extend(key, transform)` installs
//! `composed(c) = transform(base(c), c)` as the key's new, unresolved
//! factory. Repeated extensions chain oldest-first.

use std::any::Any;
use std::sync::Arc;

use tracing::debug;

use crate::container::{Container, unknown_identifier};
use crate::entry::{FactoryFn, Slot, Value};
use crate::error::{ContainerError, Result};
use crate::resolve::downcast;

impl Container {
    /// Compose a new factory for `key` from its current one and `transform`.
    ///
    /// The transform receives the value the previous definition produces
    /// and the container. The key stays unresolved until its next read.
    ///
    /// # Errors
    /// - [`ContainerError::UnknownIdentifier`] if `key` is absent
    /// - [`ContainerError::FrozenService`] if `key` was already resolved
    /// - [`ContainerError::ProtectedService`] if `key` is protected
    /// - [`ContainerError::ExpectedInvokable`] if `key` holds a literal
    ///
    /// # Examples
    /// ```rust
    /// use pantry_container::prelude::*;
    ///
    /// let container = Container::new();
    /// container.set_factory("x", |_| Ok(String::from("base"))).unwrap();
    /// container
    ///     .extend_as::<String, _, _>("x", |prev, _| Ok(format!("extended {prev}")))
    ///     .unwrap();
    ///
    /// assert_eq!(*container.get_as::<String>("x").unwrap(), "extended base");
    /// ```
    pub fn extend<T, F>(&self, key: &str, transform: F) -> Result<()>
    where
        T: Any + Send + Sync,
        F: Fn(Value, &Container) -> Result<T> + Send + Sync + 'static,
    {
        let mut store = self.store.lock();

        let Some((stored, slot)) = store.entry(key) else {
            return Err(unknown_identifier(&store, key));
        };
        let stored = stored.clone();

        if store.is_frozen(key) {
            return Err(ContainerError::FrozenService(stored));
        }

        if store.is_protected(key) {
            return Err(ContainerError::ProtectedService(stored));
        }

        let Some(base) = store.recorded_factory(key).or(slot.factory()).cloned() else {
            return Err(ContainerError::ExpectedInvokable(stored));
        };

        let composed: FactoryFn = Arc::new(move |container: &Container| {
            let previous = base(container)?;
            Ok(Arc::new(transform(previous, container)?) as Value)
        });

        store.replace_slot(key, Slot::Pending(composed));
        debug!(key, "Extended service definition");
        drop(store);
        self.settled.notify_all();
        Ok(())
    }

    /// Like [`extend`](Container::extend), downcasting the previous value to `P`.
    ///
    /// # Errors
    /// As [`extend`](Container::extend); the composed factory fails with
    /// [`ContainerError::TypeMismatch`] if the previous value is not a `P`.
    pub fn extend_as<P, T, F>(&self, key: &str, transform: F) -> Result<()>
    where
        P: Any + Send + Sync,
        T: Any + Send + Sync,
        F: Fn(Arc<P>, &Container) -> Result<T> + Send + Sync + 'static,
    {
        let target = key.to_owned();
        self.extend(key, move |previous, container| {
            transform(downcast::<P>(&target, previous)?, container)
        })
    }
}
