//! Service registration with explicit mode metadata.
//!
//! Modes are bit-flags recorded in a side-table next to the entry:
//! - [`ServiceMode::COMMON`] — lazy, memoized on first read (default)
//! - [`ServiceMode::FACTORY`] — re-invoked on every read (protected)
//! - [`ServiceMode::EXTENDED`] — composes with the key's prior entry
//! - [`ServiceMode::FINAL`] — overwrites are flagged (or rejected with
//!   [`strict_final`](crate::settings::ContainerSettings::strict_final))
//! - [`ServiceMode::KEYWORDED`] — named arguments filled from the container
//!
//! # Examples
//! ```rust
//! use pantry_container::prelude::*;
//!
//! let container = Container::new();
//! container.set_value("cookie_name", String::from("SESSION_ID")).unwrap();
//!
//! container
//!     .service(
//!         Service::new("storage").keyworded(["cookie_name"]),
//!         |inj: &Injection<'_>| Ok(format!("storage({})", inj.arg_as::<String>("cookie_name")?)),
//!     )
//!     .unwrap();
//!
//! assert_eq!(*container.get_as::<String>("storage").unwrap(), "storage(SESSION_ID)");
//! ```

use std::any::Any;
use std::sync::Arc;

use bitflags::bitflags;
use indexmap::IndexMap;
use pantry_support::rendering::suggest_similar;
use tracing::{debug, instrument};

use crate::container::{Container, unknown_identifier};
use crate::entry::{Entry, FactoryFn, Raw, Value};
use crate::error::{ContainerError, Result, UnknownIdentifierError};
use crate::key::ServiceKey;
use crate::resolve::downcast;

bitflags! {
    /// How a registered service is resolved and guarded.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ServiceMode: u8 {
        /// Lazy, memoized on first read.
        const COMMON = 1 << 0;
        /// Re-invoked on every read, never memoized.
        const FACTORY = 1 << 1;
        /// Composes with the prior entry of the same key.
        const EXTENDED = 1 << 2;
        /// Write-once intent.
        const FINAL = 1 << 3;
        /// Arguments filled from container entries by name.
        const KEYWORDED = 1 << 4;
    }
}

impl ServiceMode {
    /// Validates raw mode bits.
    ///
    /// ```
    /// use pantry_container::service::ServiceMode;
    ///
    /// let mode = ServiceMode::from_raw(0b1001).unwrap();
    /// assert_eq!(mode, ServiceMode::COMMON | ServiceMode::FINAL);
    /// assert!(ServiceMode::from_raw(0b10_0000).is_err());
    /// ```
    ///
    /// # Errors
    /// [`ContainerError::InvalidServiceMode`] for bits outside the known flags.
    pub fn from_raw(bits: u8) -> Result<Self> {
        Self::from_bits(bits).ok_or(ContainerError::InvalidServiceMode(bits))
    }

    /// Returns `true` unless the service is re-invoked on every read.
    #[inline]
    pub fn is_memoized(&self) -> bool {
        !self.contains(Self::FACTORY)
    }
}

impl Default for ServiceMode {
    fn default() -> Self {
        Self::COMMON
    }
}

/// Explicit registration for [`Container::service`].
#[derive(Debug, Clone)]
pub struct Service {
    key: ServiceKey,
    mode: ServiceMode,
    params: Vec<ServiceKey>,
}

impl Service {
    /// A COMMON registration for `key`.
    pub fn new(key: impl Into<ServiceKey>) -> Self {
        Self {
            key: key.into(),
            mode: ServiceMode::COMMON,
            params: Vec::new(),
        }
    }

    /// Replace the mode. An empty mode means COMMON.
    pub fn with_mode(mut self, mode: ServiceMode) -> Self {
        self.mode = if mode.is_empty() { ServiceMode::COMMON } else { mode };
        self
    }

    /// Replace the mode from raw bits.
    ///
    /// # Errors
    /// [`ContainerError::InvalidServiceMode`] for unknown bits.
    pub fn with_bits(self, bits: u8) -> Result<Self> {
        Ok(self.with_mode(ServiceMode::from_raw(bits)?))
    }

    /// Fill the named arguments from container entries on every build.
    pub fn keyworded<I, K>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ServiceKey>,
    {
        self.mode |= ServiceMode::KEYWORDED;
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    pub fn mode(&self) -> ServiceMode {
        self.mode
    }

    pub fn params(&self) -> &[ServiceKey] {
        &self.params
    }
}

/// What a registered service factory receives.
pub struct Injection<'a> {
    container: &'a Container,
    key: &'a ServiceKey,
    previous: Option<Value>,
    args: IndexMap<ServiceKey, Value>,
}

impl<'a> Injection<'a> {
    pub fn container(&self) -> &'a Container {
        self.container
    }

    /// The key being built.
    pub fn key(&self) -> &ServiceKey {
        self.key
    }

    /// The prior entry's value, for EXTENDED services.
    pub fn previous(&self) -> Option<&Value> {
        self.previous.as_ref()
    }

    /// The prior entry's value downcast to `T`.
    ///
    /// # Errors
    /// [`ContainerError::UnknownIdentifier`] if the service is not
    /// EXTENDED, [`ContainerError::TypeMismatch`] on a type mismatch.
    pub fn previous_as<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        let previous = self.previous.clone().ok_or_else(|| {
            ContainerError::UnknownIdentifier(UnknownIdentifierError {
                key: self.key.clone(),
                suggestions: Vec::new(),
            })
        })?;
        downcast(self.key, previous)
    }

    /// A named argument, for KEYWORDED services.
    ///
    /// # Errors
    /// [`ContainerError::UnknownIdentifier`] if `name` was not declared.
    pub fn arg(&self, name: &str) -> Result<&Value> {
        self.args.get(name).ok_or_else(|| {
            let declared: Vec<&str> = self.args.keys().map(ServiceKey::as_str).collect();
            ContainerError::UnknownIdentifier(UnknownIdentifierError {
                key: ServiceKey::from(name),
                suggestions: suggest_similar(name, &declared, 3),
            })
        })
    }

    /// A named argument downcast to `T`.
    pub fn arg_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        downcast(name, self.arg(name)?.clone())
    }

    /// Declared arguments in declaration order.
    pub fn args(&self) -> impl Iterator<Item = (&ServiceKey, &Value)> {
        self.args.iter()
    }
}

impl Container {
    /// Register `factory` under the service's key and mode.
    ///
    /// Returns `factory` unchanged so call sites can keep using it.
    ///
    /// # Errors
    /// - [`ContainerError::UnknownIdentifier`] for EXTENDED without a prior entry
    /// - [`ContainerError::FrozenService`] if the key was already resolved
    /// - [`ContainerError::ProtectedService`] for EXTENDED on a protected key
    #[instrument(skip(self, factory), fields(key = %service.key(), mode = ?service.mode()))]
    pub fn service<T, F>(&self, service: Service, factory: F) -> Result<F>
    where
        T: Any + Send + Sync,
        F: Fn(&Injection<'_>) -> Result<T> + Clone + Send + Sync + 'static,
    {
        let Service { key, mode, params } = service;
        let mut store = self.store.lock();

        let base: Option<FactoryFn> = if mode.contains(ServiceMode::EXTENDED) {
            if store.is_frozen(&key) {
                return Err(ContainerError::FrozenService(key));
            }
            if store.is_protected(&key) {
                return Err(ContainerError::ProtectedService(key));
            }

            match store.raw(&key) {
                Some(Raw::Factory(factory)) => Some(factory),
                Some(Raw::Value(value)) => Some(Arc::new(move |_: &Container| Ok(value.clone()))),
                None => return Err(unknown_identifier(&store, &key)),
            }
        } else {
            None
        };

        let wrapped = factory.clone();
        let target = key.clone();
        let wired: FactoryFn = Arc::new(move |container: &Container| {
            let previous = match &base {
                Some(base) => Some(base(container)?),
                None => None,
            };

            let mut args = IndexMap::with_capacity(params.len());
            for param in &params {
                args.insert(param.clone(), container.get(param)?);
            }

            let injection = Injection {
                container,
                key: &target,
                previous,
                args,
            };
            Ok(Arc::new(wrapped(&injection)?) as Value)
        });

        let entry = if mode.is_memoized() {
            Entry::Factory(wired)
        } else {
            Entry::Protected(wired)
        };

        self.write_locked(&mut store, key.clone(), entry)?;
        store.set_mode(key, mode);
        debug!("Registered service");

        Ok(factory)
    }
}
