//! Create, update and delete pipelines, plus to-many relationship edits.
//!
//! Each operation is an ordered chain of suspending steps: hooks from the
//! resource type's definition around a single store write. Every step runs
//! under the request's cancellation signal, and the first failure ends the
//! chain. The orchestrator never commits; the caller owns the transaction
//! and rolls it back when an operation returns an error.

use super::{ConflictDetector, MutationKind, MutationStage, StageTracker};
use crate::context::RequestContext;
use crate::definition::{DefinitionRegistry, WriteScope};
use crate::error::{EngineError, EngineResult};
use crate::resource::{
    ConcurrencyToken, RelationshipValue, Resource, ResourceId, ResourceTypeDescriptor,
};
use crate::store::{StoreResult, UnitOfWork};
use log::{debug, info, trace, warn};
use std::future::Future;
use std::sync::Arc;

/// Drives writes through the hook sequence of their resource type.
#[derive(Debug, Clone)]
pub struct MutationOrchestrator {
    registry: Arc<DefinitionRegistry>,
    detector: ConflictDetector,
}

impl MutationOrchestrator {
    pub fn new(registry: Arc<DefinitionRegistry>) -> Self {
        Self {
            registry,
            detector: ConflictDetector::new(),
        }
    }

    pub fn detector(&self) -> &ConflictDetector {
        &self.detector
    }

    /// Create a resource from client input.
    ///
    /// Initialize → apply client fields → BeforeCreate → insert → re-fetch →
    /// AfterCreate. The input must not carry an identifier; any token it
    /// carries is ignored. Returns the resource as stored.
    pub async fn create(
        &self,
        unit_of_work: &mut dyn UnitOfWork,
        descriptor: &ResourceTypeDescriptor,
        input: Resource,
        context: &RequestContext,
    ) -> EngineResult<Resource> {
        info!(
            "Creating {} resource (request: '{}')",
            descriptor.name(),
            context.request_id()
        );
        trace!("Create input: {}", input.to_json(descriptor));

        let mut tracker = StageTracker::new(MutationKind::Create, descriptor.name(), context.request_id());
        let result = self
            .run_create(unit_of_work, descriptor, input, context, &mut tracker)
            .await;
        self.finish(&mut tracker, result, context)
    }

    async fn run_create(
        &self,
        unit_of_work: &mut dyn UnitOfWork,
        descriptor: &ResourceTypeDescriptor,
        input: Resource,
        context: &RequestContext,
        tracker: &mut StageTracker<'_>,
    ) -> EngineResult<Resource> {
        Self::check_type(descriptor, &input)?;
        if input.id().is_some() {
            return Err(EngineError::validation(format!(
                "Client-generated identifiers are not supported for resource type '{}'",
                descriptor.name()
            )));
        }

        let signal = context.cancellation();
        let definition = self.registry.get(descriptor.name());
        let mut resource = Resource::new(descriptor.name());

        tracker.advance(MutationStage::InitializeResource);
        if let Some(definition) = definition {
            let mut scope = WriteScope::new(&mut *unit_of_work, context);
            signal
                .guard(definition.on_initialize_resource(&mut resource, &mut scope))
                .await?;
        }

        resource.apply_client_fields(&input);
        strip_token_attribute(descriptor, &mut resource);

        tracker.advance(MutationStage::BeforeWrite);
        if let Some(definition) = definition {
            let mut scope = WriteScope::new(&mut *unit_of_work, context);
            signal
                .guard(definition.on_before_create(&mut resource, &mut scope))
                .await?;
        }

        tracker.advance(MutationStage::Persist);
        let (id, token) = self
            .store_call(context, unit_of_work.insert(resource))
            .await?;
        debug!(
            "Inserted {}/{} with token {} (request: '{}')",
            descriptor.name(),
            id,
            token,
            context.request_id()
        );
        let persisted = self.refetch(unit_of_work, descriptor, &id, context).await?;

        tracker.advance(MutationStage::AfterWrite);
        if let Some(definition) = definition {
            let mut scope = WriteScope::new(&mut *unit_of_work, context);
            signal
                .guard(definition.on_after_create(&persisted, &mut scope))
                .await?;
        }

        Ok(persisted)
    }

    /// Update a stored resource with client input.
    ///
    /// Fetch → AfterGetForUpdate → apply client fields → BeforeUpdate →
    /// conflict check → conditional write → re-fetch → AfterUpdate. The
    /// client's token travels on `input`.
    pub async fn update(
        &self,
        unit_of_work: &mut dyn UnitOfWork,
        descriptor: &ResourceTypeDescriptor,
        id: &ResourceId,
        input: Resource,
        context: &RequestContext,
    ) -> EngineResult<Resource> {
        info!(
            "Updating {} resource with ID '{}' (request: '{}')",
            descriptor.name(),
            id,
            context.request_id()
        );
        trace!("Update input: {}", input.to_json(descriptor));

        let mut tracker = StageTracker::new(MutationKind::Update, descriptor.name(), context.request_id());
        let result = self
            .run_update(unit_of_work, descriptor, id, input, context, &mut tracker)
            .await;
        self.finish(&mut tracker, result, context)
    }

    async fn run_update(
        &self,
        unit_of_work: &mut dyn UnitOfWork,
        descriptor: &ResourceTypeDescriptor,
        id: &ResourceId,
        input: Resource,
        context: &RequestContext,
        tracker: &mut StageTracker<'_>,
    ) -> EngineResult<Resource> {
        Self::check_type(descriptor, &input)?;
        if input.id().is_some_and(|input_id| input_id != id) {
            return Err(EngineError::validation(format!(
                "Resource identifier in the request body does not match '{}'",
                id
            )));
        }

        let signal = context.cancellation();
        let definition = self.registry.get(descriptor.name());

        let stored = self
            .store_call(context, unit_of_work.fetch_by_id(descriptor.name(), id))
            .await?
            .ok_or_else(|| EngineError::not_found(descriptor.name(), id))?;

        tracker.advance(MutationStage::BeforeWrite);
        if let Some(definition) = definition {
            let mut scope = WriteScope::new(&mut *unit_of_work, context);
            signal
                .guard(definition.on_after_get_for_update(&stored, &mut scope))
                .await?;
        }

        let mut resource = stored.clone();
        resource.apply_client_fields(&input);
        strip_token_attribute(descriptor, &mut resource);

        if let Some(definition) = definition {
            let mut scope = WriteScope::new(&mut *unit_of_work, context);
            signal
                .guard(definition.on_before_update(&mut resource, &mut scope))
                .await?;
        }

        tracker.advance(MutationStage::Persist);
        let expected = self.detector.check_before_write(
            descriptor,
            MutationKind::Update,
            input.token(),
            stored.token(),
            context,
        )?;
        let outcome = self
            .store_call(context, unit_of_work.update(&resource, expected.as_ref()))
            .await?;
        let token = self
            .detector
            .translate(outcome, descriptor.name(), id, context)?;
        debug!(
            "Updated {}/{} to token {} (request: '{}')",
            descriptor.name(),
            id,
            token,
            context.request_id()
        );
        let persisted = self.refetch(unit_of_work, descriptor, id, context).await?;

        tracker.advance(MutationStage::AfterWrite);
        if let Some(definition) = definition {
            let mut scope = WriteScope::new(&mut *unit_of_work, context);
            signal
                .guard(definition.on_after_update(&persisted, &mut scope))
                .await?;
        }

        Ok(persisted)
    }

    /// Delete a stored resource.
    ///
    /// BeforeDelete → conditional delete (checked against `token` when one is
    /// supplied) → AfterDelete.
    pub async fn delete(
        &self,
        unit_of_work: &mut dyn UnitOfWork,
        descriptor: &ResourceTypeDescriptor,
        id: &ResourceId,
        token: Option<ConcurrencyToken>,
        context: &RequestContext,
    ) -> EngineResult<()> {
        info!(
            "Deleting {} resource with ID '{}' (request: '{}')",
            descriptor.name(),
            id,
            context.request_id()
        );

        let mut tracker = StageTracker::new(MutationKind::Delete, descriptor.name(), context.request_id());
        let result = self
            .run_delete(unit_of_work, descriptor, id, token, context, &mut tracker)
            .await;
        self.finish(&mut tracker, result, context)
    }

    async fn run_delete(
        &self,
        unit_of_work: &mut dyn UnitOfWork,
        descriptor: &ResourceTypeDescriptor,
        id: &ResourceId,
        token: Option<ConcurrencyToken>,
        context: &RequestContext,
        tracker: &mut StageTracker<'_>,
    ) -> EngineResult<()> {
        let signal = context.cancellation();
        let definition = self.registry.get(descriptor.name());

        tracker.advance(MutationStage::BeforeWrite);
        if let Some(definition) = definition {
            let mut scope = WriteScope::new(&mut *unit_of_work, context);
            signal
                .guard(definition.on_before_delete(id, &mut scope))
                .await?;
        }

        tracker.advance(MutationStage::Persist);
        let expected = self.detector.check_before_write(
            descriptor,
            MutationKind::Delete,
            token.as_ref(),
            None,
            context,
        )?;
        let outcome = self
            .store_call(
                context,
                unit_of_work.delete(descriptor.name(), id, expected.as_ref()),
            )
            .await?;
        self.detector
            .translate(outcome, descriptor.name(), id, context)?;

        tracker.advance(MutationStage::AfterWrite);
        if let Some(definition) = definition {
            let mut scope = WriteScope::new(&mut *unit_of_work, context);
            signal
                .guard(definition.on_after_delete(id, &mut scope))
                .await?;
        }

        Ok(())
    }

    /// Link more resources through a to-many relationship.
    ///
    /// Fetch → verify the targets exist → append the ones not linked yet →
    /// unconditional write. No token is required, even for types that
    /// declare one.
    pub async fn add_to_relationship(
        &self,
        unit_of_work: &mut dyn UnitOfWork,
        descriptor: &ResourceTypeDescriptor,
        id: &ResourceId,
        relationship: &str,
        targets: &[ResourceId],
        context: &RequestContext,
    ) -> EngineResult<()> {
        self.change_relationship(
            MutationKind::AddToRelationship,
            unit_of_work,
            descriptor,
            id,
            relationship,
            targets,
            context,
        )
        .await
    }

    /// Unlink resources from a to-many relationship. Targets that are not
    /// linked are ignored.
    pub async fn remove_from_relationship(
        &self,
        unit_of_work: &mut dyn UnitOfWork,
        descriptor: &ResourceTypeDescriptor,
        id: &ResourceId,
        relationship: &str,
        targets: &[ResourceId],
        context: &RequestContext,
    ) -> EngineResult<()> {
        self.change_relationship(
            MutationKind::RemoveFromRelationship,
            unit_of_work,
            descriptor,
            id,
            relationship,
            targets,
            context,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn change_relationship(
        &self,
        kind: MutationKind,
        unit_of_work: &mut dyn UnitOfWork,
        descriptor: &ResourceTypeDescriptor,
        id: &ResourceId,
        relationship: &str,
        targets: &[ResourceId],
        context: &RequestContext,
    ) -> EngineResult<()> {
        info!(
            "Applying {} '{}' on {} resource with ID '{}' (request: '{}')",
            kind,
            relationship,
            descriptor.name(),
            id,
            context.request_id()
        );

        let mut tracker = StageTracker::new(kind, descriptor.name(), context.request_id());
        let result = self
            .run_relationship_change(
                kind,
                unit_of_work,
                descriptor,
                id,
                relationship,
                targets,
                context,
                &mut tracker,
            )
            .await;
        self.finish(&mut tracker, result, context)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_relationship_change(
        &self,
        kind: MutationKind,
        unit_of_work: &mut dyn UnitOfWork,
        descriptor: &ResourceTypeDescriptor,
        id: &ResourceId,
        relationship: &str,
        targets: &[ResourceId],
        context: &RequestContext,
        tracker: &mut StageTracker<'_>,
    ) -> EngineResult<()> {
        let target_type = match descriptor.relationship(relationship) {
            Some(found) if found.is_to_many() => found.target_type.clone(),
            Some(_) => {
                return Err(EngineError::validation(format!(
                    "Relationship '{}' on resource type '{}' is not to-many",
                    relationship,
                    descriptor.name()
                )));
            }
            None => {
                return Err(EngineError::validation(format!(
                    "Unknown relationship '{}' on resource type '{}'",
                    relationship,
                    descriptor.name()
                )));
            }
        };

        let mut resource = self
            .store_call(context, unit_of_work.fetch_by_id(descriptor.name(), id))
            .await?
            .ok_or_else(|| EngineError::not_found(descriptor.name(), id))?;

        tracker.advance(MutationStage::BeforeWrite);
        let mut linked = match resource.relationship(relationship) {
            Some(RelationshipValue::ToMany(ids)) => ids.clone(),
            _ => Vec::new(),
        };
        if kind == MutationKind::AddToRelationship {
            for target in targets {
                self.store_call(context, unit_of_work.fetch_by_id(&target_type, target))
                    .await?
                    .ok_or_else(|| EngineError::not_found(&target_type, target))?;
                if !linked.contains(target) {
                    linked.push(target.clone());
                }
            }
        } else {
            linked.retain(|linked_id| !targets.contains(linked_id));
        }
        resource.set_relationship(relationship, RelationshipValue::ToMany(linked));

        tracker.advance(MutationStage::Persist);
        let outcome = self
            .store_call(context, unit_of_work.update(&resource, None))
            .await?;
        let token = self
            .detector
            .translate(outcome, descriptor.name(), id, context)?;
        debug!(
            "Rewrote {}/{} '{}' to token {} (request: '{}')",
            descriptor.name(),
            id,
            relationship,
            token,
            context.request_id()
        );

        tracker.advance(MutationStage::AfterWrite);
        Ok(())
    }

    /// Read back a row the current operation just wrote.
    async fn refetch(
        &self,
        unit_of_work: &mut dyn UnitOfWork,
        descriptor: &ResourceTypeDescriptor,
        id: &ResourceId,
        context: &RequestContext,
    ) -> EngineResult<Resource> {
        self.store_call(context, unit_of_work.fetch_by_id(descriptor.name(), id))
            .await?
            .ok_or_else(|| EngineError::not_found(descriptor.name(), id))
    }

    /// Run a store call under the cancellation signal, mapping store failures.
    async fn store_call<T, F>(&self, context: &RequestContext, operation: F) -> EngineResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        context
            .cancellation()
            .guard(async {
                operation
                    .await
                    .map_err(|error| self.detector.translate_store_error(error, context))
            })
            .await
    }

    fn check_type(descriptor: &ResourceTypeDescriptor, input: &Resource) -> EngineResult<()> {
        if input.resource_type() != descriptor.name() {
            return Err(EngineError::configuration(format!(
                "Resource of type '{}' passed to a '{}' operation",
                input.resource_type(),
                descriptor.name()
            )));
        }
        Ok(())
    }

    fn finish<T>(
        &self,
        tracker: &mut StageTracker<'_>,
        result: EngineResult<T>,
        context: &RequestContext,
    ) -> EngineResult<T> {
        match &result {
            Ok(_) => {
                tracker.advance(MutationStage::Completed);
                trace!(
                    "{} pipeline for '{}' done, commit pending (request: '{}')",
                    tracker.kind(),
                    tracker.resource_type(),
                    context.request_id()
                );
            }
            Err(error) if error.is_conflict() && tracker.stage() == MutationStage::Persist => {
                tracker.advance(MutationStage::Conflict)
            }
            Err(error) => {
                warn!(
                    "Write failed at stage {}: {} (request: '{}')",
                    tracker.stage(),
                    error,
                    context.request_id()
                );
                tracker.advance(MutationStage::Failed);
            }
        }
        result
    }
}

/// Tokens never travel as client attributes.
fn strip_token_attribute(descriptor: &ResourceTypeDescriptor, resource: &mut Resource) {
    if let Some(field) = descriptor.concurrency_token_field() {
        resource.remove_attribute(field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ResourceDefinition;
    use crate::resource::ResourceGraph;
    use crate::store::{InMemoryStore, Transaction, TransactionalStore};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    fn graph() -> Arc<ResourceGraph> {
        Arc::new(
            ResourceGraph::new()
                .with(
                    ResourceTypeDescriptor::builder("disks")
                        .attribute("manufacturer")
                        .attribute("serialCode")
                        .attribute("createdBy")
                        .concurrency_token("concurrencyToken")
                        .build(),
                )
                .unwrap(),
        )
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResourceDefinition for Recorder {
        async fn on_initialize_resource(
            &self,
            resource: &mut Resource,
            _scope: &mut WriteScope<'_>,
        ) -> EngineResult<()> {
            self.record("initialize");
            resource.set_attribute("createdBy", json!("system"));
            resource.set_attribute("serialCode", json!("default"));
            Ok(())
        }

        async fn on_before_create(
            &self,
            resource: &mut Resource,
            _scope: &mut WriteScope<'_>,
        ) -> EngineResult<()> {
            self.record(format!(
                "before_create serialCode={}",
                resource.attribute("serialCode").cloned().unwrap_or_default()
            ));
            Ok(())
        }

        async fn on_after_create(
            &self,
            resource: &Resource,
            _scope: &mut WriteScope<'_>,
        ) -> EngineResult<()> {
            self.record(format!(
                "after_create id={} token={}",
                resource.id().is_some(),
                resource.token().is_some()
            ));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_create_sequence() {
        let graph = graph();
        let recorder = Arc::new(Recorder::default());
        let registry = DefinitionRegistry::new()
            .with("disks", recorder.clone())
            .unwrap();
        let orchestrator = MutationOrchestrator::new(Arc::new(registry));
        let store = InMemoryStore::new(graph.clone());
        let descriptor = graph.require("disks").unwrap();
        let context = RequestContext::new("t");

        let input = Resource::new("disks")
            .with_attribute("serialCode", json!("X-1"))
            .with_token(ConcurrencyToken::from_opaque("client"));

        let mut tx = store.begin().await.unwrap();
        let created = orchestrator
            .create(&mut tx, descriptor, input, &context)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(
            recorder.calls(),
            vec![
                "initialize".to_string(),
                "before_create serialCode=\"X-1\"".to_string(),
                "after_create id=true token=true".to_string(),
            ]
        );
        assert_eq!(created.attribute("createdBy"), Some(&json!("system")));
        assert_ne!(created.token().map(ConcurrencyToken::as_str), Some("client"));
    }

    #[tokio::test]
    async fn test_create_rejects_client_identifier() {
        let graph = graph();
        let orchestrator = MutationOrchestrator::new(Arc::new(DefinitionRegistry::new()));
        let store = InMemoryStore::new(graph.clone());
        let descriptor = graph.require("disks").unwrap();

        let mut tx = store.begin().await.unwrap();
        let input = Resource::new("disks").with_id(ResourceId::Integer(7));
        let result = orchestrator
            .create(&mut tx, descriptor, input, &RequestContext::new("t"))
            .await;
        assert!(matches!(result, Err(EngineError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_update_missing_resource() {
        let graph = graph();
        let orchestrator = MutationOrchestrator::new(Arc::new(DefinitionRegistry::new()));
        let store = InMemoryStore::new(graph.clone());
        let descriptor = graph.require("disks").unwrap();

        let mut tx = store.begin().await.unwrap();
        let result = orchestrator
            .update(
                &mut tx,
                descriptor,
                &ResourceId::Integer(99),
                Resource::new("disks"),
                &RequestContext::new("t"),
            )
            .await;
        assert!(matches!(result, Err(EngineError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_with_stale_token() {
        let graph = graph();
        let orchestrator = MutationOrchestrator::new(Arc::new(DefinitionRegistry::new()));
        let store = InMemoryStore::new(graph.clone());
        let descriptor = graph.require("disks").unwrap();
        let context = RequestContext::new("t");

        let mut tx = store.begin().await.unwrap();
        let created = orchestrator
            .create(&mut tx, descriptor, Resource::new("disks"), &context)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        let id = created.id().cloned().unwrap();

        let mut tx = store.begin().await.unwrap();
        let result = orchestrator
            .delete(
                &mut tx,
                descriptor,
                &id,
                Some(ConcurrencyToken::from_opaque("stale")),
                &context,
            )
            .await;
        assert!(result.unwrap_err().is_conflict());

        orchestrator
            .delete(&mut tx, descriptor, &id, created.token().cloned(), &context)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.count("disks").await, 0);
    }
}
