//! # Pantry — lazily-resolving service container for Rust
//!
//! A key/value registry that wires application objects together on
//! demand. Factories run on first read and are memoized, resolved keys
//! refuse further writes, and protected factories are re-invoked on
//! every read.
//!
//! ```rust
//! use pantry::prelude::*;
//!
//! let container = Container::builder()
//!     .value("cookie_name", String::from("SESSION_ID"))
//!     .factory("session", |c| Ok(format!("session({})", c.get_as::<String>("cookie_name")?)))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(*container.get_as::<String>("session").unwrap(), "session(SESSION_ID)");
//! ```

pub use pantry_container::*;
pub use pantry_support::*;
