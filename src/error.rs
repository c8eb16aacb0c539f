//! Error types for engine operations.
//!
//! Every failure the engine surfaces falls into one of five kinds: a version
//! conflict, a missing resource, a business-rule rejection raised by a hook,
//! a configuration fault (a programming error in a definition or the resource
//! graph), or cancellation of the request. Store failures that are none of
//! these are carried through unchanged.

use crate::store::StoreError;

/// Fixed, resource-type independent text reported for every version conflict.
pub const CONFLICT_MESSAGE: &str = "The concurrency token is missing or does not match the server version. This indicates that data has been modified since the resource was retrieved.";

/// Main error type for engine operations.
///
/// All variants bubble to the caller unmodified; the engine performs no local
/// recovery or retries.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The concurrency token was missing or stale.
    ///
    /// Deliberately carries no payload so that store internals never leak.
    #[error("{}", CONFLICT_MESSAGE)]
    Conflict,

    /// The identifier does not resolve to a stored resource
    #[error("Resource not found: {resource_type} with ID {id}")]
    NotFound { resource_type: String, id: String },

    /// A hook rejected the operation based on business rules
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// A hook returned an invalid expression, or the resource graph is inconsistent
    #[error("Configuration fault: {message}")]
    Configuration { message: String },

    /// The request was cancelled while the operation was in flight
    #[error("The operation was cancelled")]
    Cancelled,

    /// Errors from the underlying store
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Create a resource not found error
    pub fn not_found(resource_type: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.to_string(),
        }
    }

    /// Create a validation error carrying the hook-supplied reason
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration fault
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether this error is a version conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }

    /// Whether this error indicates a programming error rather than bad input.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::Store(_))
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
