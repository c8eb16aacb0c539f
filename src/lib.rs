//! Resource request engine for Rust.
//!
//! Composes per-request queries through user-supplied resource definition
//! hooks, drives create/update/delete through an ordered hook lifecycle, and
//! enforces optimistic concurrency with store-stamped tokens.
//!
//! # Core Components
//!
//! - [`ResourceService`] - Entry point wiring composition, writes and shaping
//! - [`ResourceDefinition`] - Per-type hooks, every method optional
//! - [`QueryComposer`] - Turns request intent into a composed [`QueryLayer`]
//! - [`MutationOrchestrator`] - Create, update and delete pipelines
//! - [`UnitOfWork`] - Transactional store contract, with [`InMemoryStore`] as reference backend
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use resource_engine::{
//!     DefinitionRegistry, EngineOptions, InMemoryStore, QueryIntent, RequestContext, Resource,
//!     ResourceGraph, ResourceService, ResourceTypeDescriptor,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = Arc::new(ResourceGraph::new().with(
//!     ResourceTypeDescriptor::builder("disks")
//!         .attribute("manufacturer")
//!         .concurrency_token("concurrencyToken")
//!         .build(),
//! )?);
//! let service = ResourceService::new(
//!     InMemoryStore::new(Arc::clone(&graph)),
//!     graph,
//!     Arc::new(DefinitionRegistry::new()),
//!     EngineOptions::default(),
//! )?;
//!
//! let context = RequestContext::new("req-1");
//! let disk = Resource::new("disks").with_attribute("manufacturer", json!("WD"));
//! service.create("disks", disk, &context).await?;
//! let page = service.get_collection("disks", &QueryIntent::new(), &context).await?;
//! println!("{}", serde_json::to_string(&page)?);
//! # Ok(())
//! # }
//! ```

pub mod cancellation;
pub mod config;
pub mod context;
pub mod definition;
pub mod error;
pub mod mutation;
pub mod query;
pub mod resource;
pub mod serialization;
pub mod service;
pub mod store;

// Re-export commonly used types for convenience
pub use cancellation::{CancellationSignal, CancellationSource, cancellation_pair};
pub use config::EngineOptions;
pub use context::RequestContext;
pub use definition::{
    DefinitionRegistry, QueryParameterHandlers, ResourceDefinition, WriteScope,
};
pub use error::{EngineError, EngineResult};
pub use mutation::{ConflictDetector, MutationKind, MutationOrchestrator, MutationStage};
pub use query::{
    FieldSelection, FieldSelectionPhase, FilterExpression, IncludeElement, PaginationExpression,
    QueryComposer, QueryIntent, QueryLayer, SortExpression, SparseFieldSet,
};
pub use resource::{
    ConcurrencyToken, Resource, ResourceGraph, ResourceId, ResourceTypeDescriptor,
};
pub use serialization::{ResponseShaper, ShapedData, ShapedDocument, ShapedResource};
pub use service::ResourceService;
pub use store::{
    ConditionalResult, InMemoryStore, StoreError, Transaction, TransactionalStore, UnitOfWork,
};
