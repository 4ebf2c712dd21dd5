//! Error types for Pantry container operations.
//!
//! Every failure is local and synchronous: nothing is retried and the
//! container performs no recovery beyond leaving a failed entry unresolved.

use std::fmt;

use pantry_support::rendering::render_chain;

use crate::key::ServiceKey;

/// Main error type for all container operations.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Read, delete, raw, protect or extend on an absent key.
    #[error("{}", .0)]
    UnknownIdentifier(UnknownIdentifierError),

    /// Write or extend targeting an already-resolved key.
    #[error("Service is frozen and cannot be modified: {:?}\n  Hint: delete the key first to redefine it", .0.as_str())]
    FrozenService(ServiceKey),

    /// Extend targeting a protected key.
    #[error("Protected service cannot be extended: {:?}", .0.as_str())]
    ProtectedService(ServiceKey),

    /// Extend targeting a plain value rather than a factory.
    #[error("Expected an invokable definition for {:?}, found a plain value", .0.as_str())]
    ExpectedInvokable(ServiceKey),

    /// A factory, directly or transitively, read its own still-resolving key.
    #[error("{}", .0)]
    RecursionInfiniteLoop(RecursionLoopError),

    /// Service mode bits outside the known flag set.
    #[error("Invalid service mode: {0:#010b} contains unknown flags")]
    InvalidServiceMode(u8),

    /// A typed read found a value of another type.
    #[error("Type mismatch for {:?}: expected {}", .key.as_str(), .expected)]
    TypeMismatch { key: ServiceKey, expected: String },

    /// A factory failed with a foreign error.
    #[error("Failed to construct {:?}: {}", .key.as_str(), .source)]
    ConstructionFailed {
        key: ServiceKey,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ContainerError {
    /// Wraps a foreign error raised while building `key`.
    ///
    /// ```
    /// use pantry_container::error::ContainerError;
    ///
    /// let err = ContainerError::construction("port", "not a number");
    /// assert!(err.to_string().contains("port"));
    /// ```
    pub fn construction(
        key: impl Into<ServiceKey>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ConstructionFailed {
            key: key.into(),
            source: source.into(),
        }
    }

    /// The key this error is about, when there is one.
    pub fn key(&self) -> Option<&ServiceKey> {
        match self {
            Self::UnknownIdentifier(e) => Some(&e.key),
            Self::FrozenService(key)
            | Self::ProtectedService(key)
            | Self::ExpectedInvokable(key)
            | Self::TypeMismatch { key, .. }
            | Self::ConstructionFailed { key, .. } => Some(key),
            Self::RecursionInfiniteLoop(e) => e.chain.last(),
            Self::InvalidServiceMode(_) => None,
        }
    }
}

/// Error when an identifier is not present in the container.
#[derive(Debug)]
pub struct UnknownIdentifierError {
    /// The identifier that was requested.
    pub key: ServiceKey,
    /// Registered identifiers close to the requested one.
    pub suggestions: Vec<String>,
}

impl fmt::Display for UnknownIdentifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown identifier: {:?}", self.key.as_str())?;

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        Ok(())
    }
}

/// Error when resolution re-enters a key that is still being resolved.
///
/// The chain starts and ends with the re-entered key.
#[derive(Debug)]
pub struct RecursionLoopError {
    /// Example: `["a", "b", "a"]`
    pub chain: Vec<ServiceKey>,
}

impl RecursionLoopError {
    /// The key whose factory was re-entered.
    pub fn key(&self) -> Option<&ServiceKey> {
        self.chain.first()
    }
}

impl fmt::Display for RecursionLoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Infinite recursion while resolving:\n  {}", render_chain(&self.chain))?;
        write!(
            f,
            "\n  Hint: a factory reads its own key, directly or through another service"
        )
    }
}

/// Convenient Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;
