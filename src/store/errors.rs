//! Store-level error types.
//!
//! These describe failures of the persistence layer itself. They know nothing
//! about hooks or request semantics; the engine maps the ones it understands
//! (version mismatch, missing rows) onto its own taxonomy and carries the rest
//! through as-is.

use std::fmt;

/// Errors that can occur inside a unit of work.
#[derive(Debug)]
pub enum StoreError {
    /// A conditional write found a different token than expected, or a
    /// concurrent writer committed first.
    VersionMismatch { resource_type: String, id: String },

    /// The addressed row does not exist.
    NotFound { resource_type: String, id: String },

    /// Stored data could not be converted to or from a resource.
    Serialization {
        message: String,
        resource_type: Option<String>,
    },

    /// Anything else that went wrong in the backend.
    Internal {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::VersionMismatch { resource_type, id } => {
                write!(f, "Version mismatch for {}/{}", resource_type, id)
            }
            StoreError::NotFound { resource_type, id } => {
                write!(f, "Row not found: {}/{}", resource_type, id)
            }
            StoreError::Serialization {
                message,
                resource_type,
            } => {
                if let Some(resource_type) = resource_type {
                    write!(f, "Serialization error: {} (type: {})", message, resource_type)
                } else {
                    write!(f, "Serialization error: {}", message)
                }
            }
            StoreError::Internal { message, .. } => {
                write!(f, "Internal store error: {}", message)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Internal { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl StoreError {
    /// Create a new VersionMismatch error.
    pub fn version_mismatch(resource_type: impl Into<String>, id: impl ToString) -> Self {
        Self::VersionMismatch {
            resource_type: resource_type.into(),
            id: id.to_string(),
        }
    }

    /// Create a new NotFound error.
    pub fn not_found(resource_type: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.to_string(),
        }
    }

    /// Create a new Serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
            resource_type: None,
        }
    }

    /// Create a new Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new Internal error wrapping a backend error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether this error reports a lost optimistic-concurrency race.
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, StoreError::VersionMismatch { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            message: error.to_string(),
            resource_type: None,
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
