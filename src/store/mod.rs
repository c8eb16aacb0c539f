//! Unit-of-work abstraction consumed by the engine.
//!
//! The engine never talks to a database directly. Everything it needs from
//! persistence goes through a [`UnitOfWork`]: a transaction-scoped handle
//! that reads and writes resources keyed by type and identifier, and that
//! enforces optimistic concurrency through conditional writes.
//!
//! # Architecture
//!
//! The store layer is responsible for:
//! - Assigning identifiers and stamping a fresh concurrency token on every write
//! - Conditional update/delete against an expected token
//! - Executing composed [`QueryLayer`]s
//! - Staging writes until commit, and discarding them on rollback
//!
//! The store layer is NOT responsible for:
//! - Calling hooks or applying defaults
//! - Deciding whether a token is required
//! - Mapping version mismatches to client-facing errors
//!
//! Hooks receive the open unit of work as `&mut dyn UnitOfWork` so they can
//! write extra rows (an outbox record, an audit entry) inside the same
//! transaction. Only the owner of the [`Transaction`] can commit it.
//!
//! # Example Usage
//!
//! ```rust
//! use resource_engine::resource::{Resource, ResourceGraph, ResourceTypeDescriptor};
//! use resource_engine::store::{InMemoryStore, Transaction, TransactionalStore, UnitOfWork};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = ResourceGraph::new()
//!     .with(ResourceTypeDescriptor::builder("tags").attribute("name").build())?;
//! let store = InMemoryStore::new(Arc::new(graph));
//!
//! let mut transaction = store.begin().await?;
//! let tag = Resource::new("tags").with_attribute("name", json!("urgent"));
//! let (id, _token) = transaction.insert(tag).await?;
//! transaction.commit().await?;
//!
//! let mut reader = store.begin().await?;
//! assert!(reader.fetch_by_id("tags", &id).await?.is_some());
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod evaluate;
pub mod in_memory;

pub use errors::{StoreError, StoreResult};
pub use in_memory::{InMemoryStore, InMemoryUnitOfWork};

use crate::query::QueryLayer;
use crate::resource::{ConcurrencyToken, Resource, ResourceId};
use async_trait::async_trait;
use std::future::Future;

/// Outcome of a conditional write.
///
/// Carries no detail on mismatch: which token the store held is nobody's
/// business above this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionalResult<T> {
    /// Operation completed successfully
    Success(T),

    /// The stored token differs from the expected one
    VersionMismatch,

    /// The row does not exist
    NotFound,
}

impl<T> ConditionalResult<T> {
    /// Check if the result represents a successful operation.
    pub fn is_success(&self) -> bool {
        matches!(self, ConditionalResult::Success(_))
    }

    /// Check if the result represents a version mismatch.
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, ConditionalResult::VersionMismatch)
    }

    /// Check if the result represents a not found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConditionalResult::NotFound)
    }

    /// Extract the success value, if present.
    pub fn into_success(self) -> Option<T> {
        match self {
            ConditionalResult::Success(value) => Some(value),
            _ => None,
        }
    }
}

/// Rows returned for a composed query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Primary resources, filtered, sorted, paged and projected
    pub primary: Vec<Resource>,
    /// Related resources reached through the include tree, deduplicated
    pub included: Vec<Resource>,
}

/// Transaction-scoped read/write access to stored resources.
///
/// All methods are scoped to the open transaction: reads observe the
/// transaction's own staged writes.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Insert a new resource. The store assigns the identifier (unless the
    /// resource type uses client-chosen keys and one is present) and stamps a
    /// fresh token. Any token on `resource` is ignored.
    async fn insert(&mut self, resource: Resource) -> StoreResult<(ResourceId, ConcurrencyToken)>;

    /// Fetch a single resource with all fields. `None` if it does not exist.
    async fn fetch_by_id(
        &mut self,
        resource_type: &str,
        id: &ResourceId,
    ) -> StoreResult<Option<Resource>>;

    /// Replace the stored fields of an existing resource.
    ///
    /// When `expected` is given, the write only happens if the stored token
    /// equals it. On success the new token is returned.
    async fn update(
        &mut self,
        resource: &Resource,
        expected: Option<&ConcurrencyToken>,
    ) -> StoreResult<ConditionalResult<ConcurrencyToken>>;

    /// Remove a resource, optionally conditioned on its current token.
    async fn delete(
        &mut self,
        resource_type: &str,
        id: &ResourceId,
        expected: Option<&ConcurrencyToken>,
    ) -> StoreResult<ConditionalResult<()>>;

    /// Execute a composed query.
    async fn query(&mut self, layer: &QueryLayer) -> StoreResult<QueryResult>;
}

/// An open transaction that only its owner can finish.
pub trait Transaction: UnitOfWork + Sized {
    /// Make every staged write visible atomically.
    ///
    /// Fails with [`StoreError::VersionMismatch`] when a concurrent writer
    /// committed a change to a row this transaction wrote.
    fn commit(self) -> impl Future<Output = StoreResult<()>> + Send;

    /// Discard every staged write.
    fn rollback(self) -> impl Future<Output = StoreResult<()>> + Send;
}

/// Factory for transactions.
pub trait TransactionalStore: Send + Sync {
    type Transaction: Transaction;

    /// Open a new transaction.
    fn begin(&self) -> impl Future<Output = StoreResult<Self::Transaction>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conditional_result_predicates() {
        let success: ConditionalResult<u8> = ConditionalResult::Success(1);
        assert!(success.is_success());
        assert_eq!(success.into_success(), Some(1));

        let mismatch: ConditionalResult<u8> = ConditionalResult::VersionMismatch;
        assert!(mismatch.is_version_mismatch());
        assert_eq!(mismatch.into_success(), None);

        let missing: ConditionalResult<u8> = ConditionalResult::NotFound;
        assert!(missing.is_not_found());
    }
}
