//! Error types for the Stratus provisioning engine.
//!
//! This module provides a comprehensive error hierarchy for all operations
//! in the provisioning lifecycle: configuration, graph construction, state
//! management, provider operations, and plan execution.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Stratus provisioning engine.
#[derive(Debug, Error)]
pub enum StratusError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Dependency graph errors.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Provider API errors.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Plan execution errors.
    #[error("Apply error: {0}")]
    Apply(#[from] ApplyError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Duplicate resource declaration.
    #[error("Duplicate resource name: {name}")]
    DuplicateName {
        /// The duplicated logical name.
        name: String,
    },

    /// Unknown resource kind tag.
    #[error("Unknown resource kind '{kind}' for resource '{name}'")]
    UnknownKind {
        /// The declaring resource.
        name: String,
        /// The unrecognized kind tag.
        kind: String,
    },

    /// A reference token in a property value is malformed.
    #[error("Invalid reference in resource '{name}': {message}")]
    InvalidReference {
        /// The declaring resource.
        name: String,
        /// Description of the problem.
        message: String,
    },

    /// A `${param.*}` token names a parameter that is not defined.
    #[error("Resource '{name}' references undefined parameter '{parameter}'")]
    UndefinedParameter {
        /// The declaring resource.
        name: String,
        /// The missing parameter name.
        parameter: String,
    },
}

/// Dependency graph errors.
///
/// Both variants are structural: they are detected before any provider
/// mutation and abort the run with nothing applied.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The reference graph contains a cycle.
    #[error("Cyclic dependency detected: {}", cycle.join(" -> "))]
    CyclicDependency {
        /// Logical names participating in the cycle, in order.
        cycle: Vec<String>,
    },

    /// A declaration references a logical name that does not exist.
    #[error("Resource '{name}' references unknown resource '{target}'")]
    ReferenceUnresolved {
        /// The declaring resource.
        name: String,
        /// The missing logical name.
        target: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another run.
    #[error("State is locked by another run (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Backend IO error.
    #[error("State backend error: {message}")]
    BackendError {
        /// Description of the backend error.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Provider API errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Authentication failed.
    #[error("Provider authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request failed.
    #[error("Provider API request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the provider.
        message: String,
    },

    /// Rate limited.
    #[error("Provider API rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Physical resource not found.
    #[error("Resource not found: {physical_id}")]
    ResourceNotFound {
        /// Provider-assigned identifier of the missing resource.
        physical_id: String,
    },

    /// Network error.
    #[error("Network error communicating with provider: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the provider API.
    #[error("Invalid response from provider API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// Timeout waiting for a resource to stabilize.
    #[error("Timeout waiting for resource '{name}' ({physical_id}) to stabilize")]
    StabilizeTimeout {
        /// Logical name of the resource.
        name: String,
        /// Provider-assigned identifier.
        physical_id: String,
    },

    /// The provider reported the resource entered a failed state.
    #[error("Resource '{name}' ({physical_id}) entered a failed state")]
    ResourceFailed {
        /// Logical name of the resource.
        name: String,
        /// Provider-assigned identifier.
        physical_id: String,
    },
}

/// Plan execution errors.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// A reference could not be resolved against committed state outputs.
    #[error("Cannot resolve '${{{target}.{attribute}}}' for resource '{name}': {reason}")]
    UnresolvedOutput {
        /// The resource whose properties were being resolved.
        name: String,
        /// The referenced logical name (or `param`).
        target: String,
        /// The referenced output attribute.
        attribute: String,
        /// Why resolution failed.
        reason: String,
    },

    /// The run was cancelled between actions.
    #[error("Run cancelled: {applied} actions applied, {remaining} skipped")]
    Cancelled {
        /// Actions committed before cancellation.
        applied: usize,
        /// Actions never attempted.
        remaining: usize,
    },
}

/// Result type alias for Stratus operations.
pub type Result<T> = std::result::Result<T, StratusError>;

impl StratusError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider(
                ProviderError::RateLimited { .. } | ProviderError::NetworkError { .. }
            ) | Self::State(StateError::LockFailed { .. })
        )
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Provider(ProviderError::RateLimited { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            Self::Provider(ProviderError::NetworkError { .. }) => Some(5),
            Self::State(StateError::LockFailed { .. }) => Some(2),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

}

impl StateError {
    /// Creates a backend error with the given message.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::BackendError {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl ProviderError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }
}
