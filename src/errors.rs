// Copyright 2025 Cowboy AI, LLC.

//! Error types for composition operations

use thiserror::Error;

/// Errors that can occur while wiring or dispatching through the composition core
///
/// Only container lookups are hard failures. Missing components and events
/// without subscribers are ordinary outcomes and never surface here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositionError {
    /// No service is bound to the requested key
    #[error("Service not registered: {key}")]
    NotRegistered {
        /// Key that was looked up
        key: String,
    },

    /// A service is bound to the key, but with a different concrete type
    #[error("Service {key} is not of type {expected}")]
    TypeMismatch {
        /// Key that was looked up
        key: String,
        /// Type the caller asked for
        expected: &'static str,
    },

    /// A lazily constructed service could not be built
    #[error("Provider for {key} failed: {reason}")]
    ProviderFailed {
        /// Key whose factory failed
        key: String,
        /// Error reported by the factory
        reason: String,
    },

    /// A lazy provider asked for its own key while being constructed
    #[error("Circular dependency while constructing {key}")]
    CircularDependency {
        /// Key whose provider re-entered itself
        key: String,
    },

    /// One or more handlers failed during a single emission
    #[error("{failures} handler(s) failed for event {event}, first: {first}")]
    HandlerFailures {
        /// Event that was emitted
        event: String,
        /// Number of handlers that failed
        failures: usize,
        /// Message of the first failure, in invocation order
        first: String,
    },

    /// Configuration could not be parsed or is inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for composition operations
pub type CompositionResult<T> = Result<T, CompositionError>;

impl From<serde_json::Error> for CompositionError {
    fn from(err: serde_json::Error) -> Self {
        CompositionError::InvalidConfiguration(err.to_string())
    }
}

impl CompositionError {
    /// Create a not-registered error for a key
    pub fn not_registered(key: impl Into<String>) -> Self {
        CompositionError::NotRegistered { key: key.into() }
    }

    /// Check if this is a not-registered error
    pub fn is_not_registered(&self) -> bool {
        matches!(self, CompositionError::NotRegistered { .. })
    }

    /// Check if this error came from handler fan-out
    pub fn is_handler_failure(&self) -> bool {
        matches!(self, CompositionError::HandlerFailures { .. })
    }

    /// Check if this error is a resolution failure of any kind
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            CompositionError::NotRegistered { .. }
                | CompositionError::TypeMismatch { .. }
                | CompositionError::ProviderFailed { .. }
                | CompositionError::CircularDependency { .. }
        )
    }
}
