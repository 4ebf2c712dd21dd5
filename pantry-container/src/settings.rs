//! Container settings.
//!
//! Settings are plain data and deserialize from any serde format, so an
//! application can keep them next to the rest of its configuration:
//!
//! ```rust
//! use pantry_container::settings::{ContainerSettings, DeprecationPolicy};
//!
//! let settings = ContainerSettings {
//!     strict_final: true,
//!     ..ContainerSettings::default()
//! };
//! assert!(!settings.atomic_update);
//! assert_eq!(settings.deprecation, DeprecationPolicy::Silent);
//! ```

use serde::Deserialize;
use tracing::warn;

/// Behavior switches for a [`Container`](crate::container::Container).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    /// Check every pair of an `update` before writing any of them.
    pub atomic_update: bool,
    /// Reject overwrites of FINAL services instead of logging them.
    pub strict_final: bool,
    /// What to do when a deprecated entry point is used.
    pub deprecation: DeprecationPolicy,
}

/// How deprecation notices are surfaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeprecationPolicy {
    #[default]
    Silent,
    /// Emit a `tracing` warning.
    Log,
}

impl DeprecationPolicy {
    /// Reports that `subject` is deprecated in favor of `replacement`.
    pub fn notify(&self, subject: &str, replacement: &str) {
        if *self == Self::Log {
            warn!(subject, replacement, "Deprecated: use {replacement} instead of the {subject}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = ContainerSettings::default();
        assert!(!settings.atomic_update);
        assert!(!settings.strict_final);
        assert_eq!(settings.deprecation, DeprecationPolicy::Silent);
    }

    #[test]
    fn deserializes_partial_config() {
        let settings: ContainerSettings =
            serde_json::from_str(r#"{ "strict_final": true, "deprecation": "log" }"#).unwrap();

        assert_eq!(
            settings,
            ContainerSettings {
                atomic_update: false,
                strict_final: true,
                deprecation: DeprecationPolicy::Log,
            }
        );
    }

    #[test]
    fn deserializes_empty_config() {
        let settings: ContainerSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, ContainerSettings::default());
    }

    #[test]
    fn rejects_unknown_policy() {
        let result = serde_json::from_str::<ContainerSettings>(r#"{ "deprecation": "panic" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn notify_does_not_panic() {
        DeprecationPolicy::Silent.notify("legacy container", "Container::new");
        DeprecationPolicy::Log.notify("legacy container", "Container::new");
    }
}
