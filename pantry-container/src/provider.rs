//! Provider trait — a module of related registrations.
//!
//! Providers group the entries of one concern so an application can
//! assemble its container from several modules instead of one long
//! registration block.
//!
//! # Examples
//! ```rust
//! use pantry_container::prelude::*;
//!
//! struct SessionProvider;
//!
//! impl Provider for SessionProvider {
//!     fn register(&self, container: &Container) -> Result<()> {
//!         container.set_value("cookie_name", String::from("SESSION_ID"))?;
//!         container.set_factory("session", |c| {
//!             Ok(format!("session({})", c.get_as::<String>("cookie_name")?))
//!         })
//!     }
//! }
//!
//! let container = Container::builder().provider(SessionProvider).build().unwrap();
//! assert_eq!(*container.get_as::<String>("session").unwrap(), "session(SESSION_ID)");
//! ```
//!
//! Providers can also be submitted at link time and picked up with
//! [`ContainerBuilder::discover_providers`](crate::container::ContainerBuilder::discover_providers):
//!
//! ```rust,ignore
//! pantry_container::inventory::submit! {
//!     ProviderRegistration::new("mailer", |c| c.set_value("smtp_port", 25u16))
//! }
//! ```

use tracing::{debug, info, instrument};

use crate::container::Container;
use crate::error::Result;

/// A module that registers related entries into a container.
pub trait Provider: Send + Sync {
    /// Register entries into `container`.
    ///
    /// # Errors
    /// Whatever the registrations fail with, typically
    /// [`ContainerError::FrozenService`](crate::error::ContainerError::FrozenService).
    fn register(&self, container: &Container) -> Result<()>;

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A provider submitted with `inventory::submit!`.
#[derive(Debug, Clone, Copy)]
pub struct ProviderRegistration {
    pub name: &'static str,
    pub register: fn(&Container) -> Result<()>,
}

impl ProviderRegistration {
    pub const fn new(name: &'static str, register: fn(&Container) -> Result<()>) -> Self {
        Self { name, register }
    }
}

impl Provider for ProviderRegistration {
    fn register(&self, container: &Container) -> Result<()> {
        (self.register)(container)
    }

    fn name(&self) -> &str {
        self.name
    }
}

inventory::collect!(ProviderRegistration);

impl Container {
    /// Apply a provider's registrations.
    #[instrument(skip_all, fields(provider = provider.name()))]
    pub fn add_provider(&self, provider: &dyn Provider) -> Result<()> {
        let before = self.len();
        provider.register(self)?;
        debug!(added = self.len().saturating_sub(before), "Applied provider");
        Ok(())
    }

    /// Apply every submitted [`ProviderRegistration`], ordered by name.
    ///
    /// Returns how many providers were applied.
    pub fn discover_providers(&self) -> Result<usize> {
        let mut registrations: Vec<&ProviderRegistration> =
            inventory::iter::<ProviderRegistration>.into_iter().collect();
        registrations.sort_by_key(|registration| registration.name);

        for registration in &registrations {
            self.add_provider(*registration)?;
        }

        info!(count = registrations.len(), "Discovered providers");
        Ok(registrations.len())
    }
}
