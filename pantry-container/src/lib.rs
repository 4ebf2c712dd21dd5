//! Core container implementation for Pantry.

pub mod container;
pub mod entry;
pub mod error;
mod extend;
mod guard;
pub mod key;
pub mod provider;
mod resolve;
pub mod service;
pub mod settings;
mod store;

pub use container::prelude;
pub use container::{Container, ContainerBuilder};
pub use entry::{Entry, FactoryFn, Raw, Value, factory_fn};
pub use error::{ContainerError, RecursionLoopError, Result, UnknownIdentifierError};
pub use key::ServiceKey;
pub use provider::{Provider, ProviderRegistration};
pub use service::{Injection, Service, ServiceMode};
pub use settings::{ContainerSettings, DeprecationPolicy};

#[doc(hidden)]
pub use inventory;
