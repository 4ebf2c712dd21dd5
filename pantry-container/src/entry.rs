//! Entry definitions — what a caller writes into the container.
//!
//! An [`Entry`] is tagged once, at write time:
//! - [`Entry::Literal`] — returned verbatim, never invoked
//! - [`Entry::Factory`] — invoked on first read, result memoized
//! - [`Entry::Protected`] — invoked on every read, never memoized
//!
//! A closure stored as a literal is an opaque callable value: the
//! resolver never calls it. This is how constructor-like values are
//! kept as configuration.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::thread::ThreadId;

use crate::container::Container;
use crate::error::Result;

/// A type-erased, shareable value held by the container.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Type alias for factory functions.
///
/// A factory receives the container (to read its own dependencies)
/// and returns a type-erased value or an error.
///
/// # Why `Arc` and not `Box`?
/// The same factory is kept as the raw definition after memoization
/// and handed out by [`Container::raw`], so it must be shareable.
pub type FactoryFn = Arc<dyn Fn(&Container) -> Result<Value> + Send + Sync>;

/// Wraps a typed factory closure into a [`FactoryFn`].
pub fn factory_fn<T, F>(factory: F) -> FactoryFn
where
    T: Any + Send + Sync,
    F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
{
    Arc::new(move |container: &Container| Ok(Arc::new(factory(container)?) as Value))
}

/// The stored definition for one key.
#[derive(Clone)]
pub enum Entry {
    /// A plain value; returned as-is on every read.
    Literal(Value),
    /// A lazy factory; invoked once, then frozen.
    Factory(FactoryFn),
    /// A factory re-invoked on every read.
    Protected(FactoryFn),
}

impl Entry {
    /// A literal entry holding `value`.
    ///
    /// ```
    /// use pantry_container::entry::Entry;
    ///
    /// let entry = Entry::value(String::from("SESSION_ID"));
    /// assert!(!entry.is_invokable());
    /// ```
    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        Self::Literal(Arc::new(value))
    }

    /// A literal entry around an already type-erased value.
    pub fn shared(value: Value) -> Self {
        Self::Literal(value)
    }

    /// A lazy factory entry, memoized on first read.
    pub fn factory<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        Self::Factory(factory_fn(factory))
    }

    /// A protected factory entry, re-invoked on every read.
    pub fn protected<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        Self::Protected(factory_fn(factory))
    }

    /// Returns `true` for factory and protected entries.
    pub fn is_invokable(&self) -> bool {
        !matches!(self, Self::Literal(_))
    }
}

impl From<FactoryFn> for Entry {
    fn from(factory: FactoryFn) -> Self {
        Self::Factory(factory)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(_) => f.write_str("Entry::Literal(..)"),
            Self::Factory(_) => f.write_str("Entry::Factory(..)"),
            Self::Protected(_) => f.write_str("Entry::Protected(..)"),
        }
    }
}

/// Result of raw introspection: the unevaluated definition of a key.
#[derive(Clone)]
pub enum Raw {
    /// The original factory, even after its result was memoized.
    Factory(FactoryFn),
    /// The stored value of a literal entry.
    Value(Value),
}

impl Raw {
    /// The factory, if the key was defined by one.
    pub fn as_factory(&self) -> Option<&FactoryFn> {
        match self {
            Self::Factory(factory) => Some(factory),
            Self::Value(_) => None,
        }
    }

    /// The literal value, if the key was defined by one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Factory(_) => None,
        }
    }
}

impl fmt::Debug for Raw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Factory(_) => f.write_str("Raw::Factory(..)"),
            Self::Value(_) => f.write_str("Raw::Value(..)"),
        }
    }
}

/// Per-key resolution state inside the store.
#[derive(Clone)]
pub(crate) enum Slot {
    /// A literal, or the memoized result of a factory.
    Ready(Value),
    /// A factory not yet invoked.
    Pending(FactoryFn),
    /// Recursion-guard sentinel: `owner` is currently running `factory`.
    Resolving { owner: ThreadId, factory: FactoryFn },
}

impl Slot {
    /// The factory behind this slot, if it still has one.
    pub(crate) fn factory(&self) -> Option<&FactoryFn> {
        match self {
            Self::Ready(_) => None,
            Self::Pending(factory) | Self::Resolving { factory, .. } => Some(factory),
        }
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(_) => f.write_str("Ready"),
            Self::Pending(_) => f.write_str("Pending"),
            Self::Resolving { owner, .. } => write!(f, "Resolving({owner:?})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_is_not_invokable() {
        assert!(!Entry::value(5i32).is_invokable());
        assert!(Entry::factory(|_| Ok(5i32)).is_invokable());
        assert!(Entry::protected(|_| Ok(5i32)).is_invokable());
    }

    #[test]
    fn closure_stored_as_literal_stays_opaque() {
        let constructor: fn(&str) -> String = |name| name.to_uppercase();
        let entry = Entry::value(constructor);
        assert!(!entry.is_invokable());

        let Entry::Literal(value) = entry else {
            panic!("Expected literal entry");
        };
        let stored = value.downcast_ref::<fn(&str) -> String>().unwrap();
        assert_eq!(stored("sid"), "SID");
    }

    #[test]
    fn raw_accessors() {
        let raw = Raw::Value(Arc::new(1u8));
        assert!(raw.as_value().is_some());
        assert!(raw.as_factory().is_none());

        let raw = Raw::Factory(factory_fn(|_| Ok(1u8)));
        assert!(raw.as_factory().is_some());
    }

    #[test]
    fn slot_factory() {
        let factory = factory_fn(|_| Ok(()));
        assert!(Slot::Pending(factory.clone()).factory().is_some());
        assert!(Slot::Ready(Arc::new(())).factory().is_none());
        let resolving = Slot::Resolving {
            owner: std::thread::current().id(),
            factory,
        };
        assert!(resolving.factory().is_some());
        assert!(format!("{resolving:?}").starts_with("Resolving"));
    }

    #[test]
    fn debug_does_not_expose_contents() {
        assert_eq!(format!("{:?}", Entry::value(1)), "Entry::Literal(..)");
    }
}
