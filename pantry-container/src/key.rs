//! Service identification keys.
//!
//! [`ServiceKey`] uniquely identifies an entry within the container.
//! It is a cheap-to-clone shared string; lookups accept plain `&str`.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Uniquely identifies an entry in the container.
///
/// Cloning is a reference-count bump, so keys can be handed to
/// factories, errors and resolution paths freely.
///
/// # Examples
/// ```
/// use pantry_container::key::ServiceKey;
///
/// let key = ServiceKey::from("session_storage");
/// assert_eq!(key.as_str(), "session_storage");
/// assert_eq!(key, ServiceKey::from(String::from("session_storage")));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey(Arc<str>);

impl ServiceKey {
    /// Creates a key from anything string-like.
    #[inline]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Returns the identifier as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServiceKey {
    fn from(name: &str) -> Self {
        Self(Arc::from(name))
    }
}

impl From<String> for ServiceKey {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&String> for ServiceKey {
    fn from(name: &String) -> Self {
        Self(Arc::from(name.as_str()))
    }
}

impl From<&ServiceKey> for ServiceKey {
    fn from(key: &ServiceKey) -> Self {
        key.clone()
    }
}

// Borrow<str> lets every map keyed by ServiceKey be queried with &str.
// Hash of Arc<str> matches the hash of str, which this relies on.
impl Borrow<str> for ServiceKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ServiceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ServiceKey {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ServiceKey {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for ServiceKey {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceKey({:?})", &*self.0)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
