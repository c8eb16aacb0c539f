//! Request entry points.
//!
//! [`ResourceService`] ties the pieces together for one request: it composes
//! the query, opens a transaction, runs the read or the write pipeline, shapes
//! the response and finally commits. Any error rolls the transaction back,
//! so hook side effects written through the unit of work disappear with it.

use crate::config::EngineOptions;
use crate::context::RequestContext;
use crate::definition::DefinitionRegistry;
use crate::error::{EngineError, EngineResult};
use crate::mutation::MutationOrchestrator;
use crate::query::{FilterExpression, QueryComposer, QueryIntent, QueryLayer};
use crate::resource::{ConcurrencyToken, Resource, ResourceGraph, ResourceId};
use crate::serialization::{PrimaryShape, RequestedFields, ResponseShaper, ShapedDocument};
use crate::store::{QueryResult, Transaction, TransactionalStore, UnitOfWork};
use log::{debug, info, warn};
use std::sync::Arc;

/// The engine's front door, generic over the transactional store.
pub struct ResourceService<S: TransactionalStore> {
    store: S,
    graph: Arc<ResourceGraph>,
    composer: QueryComposer,
    orchestrator: MutationOrchestrator,
    shaper: ResponseShaper,
}

impl<S: TransactionalStore> ResourceService<S> {
    /// Build a service after checking that the graph is consistent and every
    /// registered definition belongs to a known resource type.
    pub fn new(
        store: S,
        graph: Arc<ResourceGraph>,
        registry: Arc<DefinitionRegistry>,
        options: EngineOptions,
    ) -> EngineResult<Self> {
        graph.validate()?;
        registry.validate(&graph)?;

        debug!(
            "Resource service ready for types {:?} with {} definitions",
            graph.resource_types(),
            registry.len()
        );

        Ok(Self {
            store,
            composer: QueryComposer::new(
                Arc::clone(&graph),
                Arc::clone(&registry),
                Arc::new(options),
            ),
            orchestrator: MutationOrchestrator::new(Arc::clone(&registry)),
            shaper: ResponseShaper::new(Arc::clone(&graph), registry),
            graph,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    pub fn composer(&self) -> &QueryComposer {
        &self.composer
    }

    /// Fetch a page of resources.
    pub async fn get_collection(
        &self,
        resource_type: &str,
        intent: &QueryIntent,
        context: &RequestContext,
    ) -> EngineResult<ShapedDocument> {
        info!(
            "Listing {} resources (request: '{}')",
            resource_type,
            context.request_id()
        );

        let descriptor = Arc::clone(self.graph.require(resource_type)?);
        let layer = self.composer.compose(&descriptor, intent, context)?;
        let result = self.read(&layer, context).await?;

        self.shaper.shape(
            &result.primary,
            &result.included,
            PrimaryShape::Collection,
            &RequestedFields::from_intent(&self.graph, &descriptor, intent),
            context,
        )
    }

    /// Fetch one resource by identifier.
    ///
    /// The composed filter still applies, so a hook that hides resources
    /// turns a hidden resource into [`EngineError::NotFound`].
    pub async fn get_by_id(
        &self,
        resource_type: &str,
        id: &ResourceId,
        intent: &QueryIntent,
        context: &RequestContext,
    ) -> EngineResult<ShapedDocument> {
        info!(
            "Getting {} resource with ID '{}' (request: '{}')",
            resource_type,
            id,
            context.request_id()
        );

        let descriptor = Arc::clone(self.graph.require(resource_type)?);
        let mut layer = self.composer.compose(&descriptor, intent, context)?;
        layer.filter = Some(FilterExpression::combine(
            layer.filter.take(),
            FilterExpression::equals("id", id.to_json()),
        ));
        layer.pagination = None;

        let result = self.read(&layer, context).await?;
        if result.primary.is_empty() {
            return Err(EngineError::not_found(resource_type, id));
        }

        self.shaper.shape(
            &result.primary,
            &result.included,
            PrimaryShape::Single,
            &RequestedFields::from_intent(&self.graph, &descriptor, intent),
            context,
        )
    }

    /// Create a resource and return it as stored.
    pub async fn create(
        &self,
        resource_type: &str,
        input: Resource,
        context: &RequestContext,
    ) -> EngineResult<ShapedDocument> {
        let descriptor = Arc::clone(self.graph.require(resource_type)?);
        let mut transaction = self.begin(context).await?;

        let result = self
            .orchestrator
            .create(&mut transaction, &descriptor, input, context)
            .await;
        let created = self.finish(transaction, result, context).await?;

        self.shape_written(&created, context)
    }

    /// Update a resource. The client's token travels on `input`.
    pub async fn update(
        &self,
        resource_type: &str,
        id: &ResourceId,
        input: Resource,
        context: &RequestContext,
    ) -> EngineResult<ShapedDocument> {
        let descriptor = Arc::clone(self.graph.require(resource_type)?);
        let mut transaction = self.begin(context).await?;

        let result = self
            .orchestrator
            .update(&mut transaction, &descriptor, id, input, context)
            .await;
        let updated = self.finish(transaction, result, context).await?;

        self.shape_written(&updated, context)
    }

    /// Delete a resource, checked against `token` when one is supplied.
    pub async fn delete(
        &self,
        resource_type: &str,
        id: &ResourceId,
        token: Option<ConcurrencyToken>,
        context: &RequestContext,
    ) -> EngineResult<()> {
        let descriptor = Arc::clone(self.graph.require(resource_type)?);
        let mut transaction = self.begin(context).await?;

        let result = self
            .orchestrator
            .delete(&mut transaction, &descriptor, id, token, context)
            .await;
        self.finish(transaction, result, context).await
    }

    /// Link `targets` through a to-many relationship. No token is needed.
    pub async fn add_to_relationship(
        &self,
        resource_type: &str,
        id: &ResourceId,
        relationship: &str,
        targets: &[ResourceId],
        context: &RequestContext,
    ) -> EngineResult<()> {
        let descriptor = Arc::clone(self.graph.require(resource_type)?);
        let mut transaction = self.begin(context).await?;

        let result = self
            .orchestrator
            .add_to_relationship(&mut transaction, &descriptor, id, relationship, targets, context)
            .await;
        self.finish(transaction, result, context).await
    }

    /// Unlink `targets` from a to-many relationship. No token is needed.
    pub async fn remove_from_relationship(
        &self,
        resource_type: &str,
        id: &ResourceId,
        relationship: &str,
        targets: &[ResourceId],
        context: &RequestContext,
    ) -> EngineResult<()> {
        let descriptor = Arc::clone(self.graph.require(resource_type)?);
        let mut transaction = self.begin(context).await?;

        let result = self
            .orchestrator
            .remove_from_relationship(&mut transaction, &descriptor, id, relationship, targets, context)
            .await;
        self.finish(transaction, result, context).await
    }

    async fn begin(&self, context: &RequestContext) -> EngineResult<S::Transaction> {
        context
            .cancellation()
            .guard(async {
                self.store
                    .begin()
                    .await
                    .map_err(|error| self.orchestrator.detector().translate_store_error(error, context))
            })
            .await
    }

    async fn read(&self, layer: &QueryLayer, context: &RequestContext) -> EngineResult<QueryResult> {
        let mut transaction = self.begin(context).await?;
        let result = context
            .cancellation()
            .guard(async {
                transaction
                    .query(layer)
                    .await
                    .map_err(|error| self.orchestrator.detector().translate_store_error(error, context))
            })
            .await;

        let result = self.finish(transaction, result, context).await?;
        debug!(
            "Read {} primary and {} included resources (request: '{}')",
            result.primary.len(),
            result.included.len(),
            context.request_id()
        );
        Ok(result)
    }

    /// Commit on success, roll back on failure.
    ///
    /// A commit that loses a race surfaces as [`EngineError::Conflict`]. A
    /// failed rollback is logged; the original error wins.
    async fn finish<T>(
        &self,
        transaction: S::Transaction,
        result: EngineResult<T>,
        context: &RequestContext,
    ) -> EngineResult<T> {
        match result {
            Ok(value) => match transaction.commit().await {
                Ok(()) => {
                    debug!("Committed (request: '{}')", context.request_id());
                    Ok(value)
                }
                Err(error) => {
                    warn!(
                        "Commit failed: {} (request: '{}')",
                        error,
                        context.request_id()
                    );
                    Err(self.orchestrator.detector().translate_store_error(error, context))
                }
            },
            Err(error) => {
                if let Err(rollback_error) = transaction.rollback().await {
                    warn!(
                        "Rollback failed after '{}': {} (request: '{}')",
                        error,
                        rollback_error,
                        context.request_id()
                    );
                }
                Err(error)
            }
        }
    }

    fn shape_written(&self, resource: &Resource, context: &RequestContext) -> EngineResult<ShapedDocument> {
        self.shaper.shape(
            std::slice::from_ref(resource),
            &[],
            PrimaryShape::Single,
            &RequestedFields::new(),
            context,
        )
    }
}

impl<S: TransactionalStore> std::fmt::Debug for ResourceService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceService")
            .field("resource_types", &self.graph.resource_types())
            .finish_non_exhaustive()
    }
}
