//! Shared fixtures for integration tests.
//!
//! A small storage domain: disks with partitions, plus an outbox type that
//! hooks write to inside the request's transaction.

#![allow(dead_code)]

use async_trait::async_trait;
use resource_engine::definition::{QueryParameterHandlers, ResourceDefinition, WriteScope};
use resource_engine::query::{FieldSelection, FilterExpression, SparseFieldSet};
use resource_engine::resource::{ConcurrencyToken, Resource, ResourceGraph, ResourceId, ResourceTypeDescriptor};
use resource_engine::serialization::ShapedDocument;
use resource_engine::store::InMemoryStore;
use resource_engine::{DefinitionRegistry, EngineError, EngineOptions, EngineResult, ResourceService};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn disk_graph() -> Arc<ResourceGraph> {
    let graph = ResourceGraph::new()
        .with(
            ResourceTypeDescriptor::builder("disks")
                .attribute("manufacturer")
                .attribute("serialCode")
                .attribute("internalFlag")
                .concurrency_token("concurrencyToken")
                .to_many("partitions", "partitions")
                .build(),
        )
        .and_then(|graph| {
            graph.with(
                ResourceTypeDescriptor::builder("partitions")
                    .attribute("mountPoint")
                    .attribute("capacity")
                    .concurrency_token("concurrencyToken")
                    .to_one("owner", "disks")
                    .build(),
            )
        })
        .and_then(|graph| {
            graph.with(
                ResourceTypeDescriptor::builder("outbox")
                    .attribute("event")
                    .build(),
            )
        })
        .expect("valid graph");
    Arc::new(graph)
}

pub fn service_with(registry: DefinitionRegistry) -> ResourceService<InMemoryStore> {
    service_with_options(registry, EngineOptions::default())
}

pub fn service_with_options(
    registry: DefinitionRegistry,
    options: EngineOptions,
) -> ResourceService<InMemoryStore> {
    let graph = disk_graph();
    ResourceService::new(
        InMemoryStore::new(Arc::clone(&graph)),
        graph,
        Arc::new(registry),
        options,
    )
    .expect("valid service")
}

pub fn disk(manufacturer: &str) -> Resource {
    Resource::new("disks")
        .with_attribute("manufacturer", json!(manufacturer))
        .with_attribute("serialCode", json!(format!("{}-0001", manufacturer)))
        .with_attribute("internalFlag", json!(false))
}

/// Identifier and token of the single resource in a document.
pub fn identity(document: &ShapedDocument) -> (ResourceId, Option<ConcurrencyToken>) {
    let resource = document.data.resources()[0];
    let token = resource
        .fields
        .get("concurrencyToken")
        .and_then(ConcurrencyToken::from_json);
    (resource.id.clone().expect("stored resource has an id"), token)
}

pub fn field<'d>(document: &'d ShapedDocument, name: &str) -> Option<&'d Value> {
    document.data.resources()[0].fields.get(name)
}

/// Records every hook invocation, optionally failing at one of them.
#[derive(Default)]
pub struct RecordingDefinition {
    calls: Mutex<Vec<String>>,
    fail_at: Option<&'static str>,
    write_outbox: bool,
}

impl RecordingDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(hook: &'static str) -> Self {
        Self {
            fail_at: Some(hook),
            ..Self::default()
        }
    }

    pub fn with_outbox(mut self) -> Self {
        self.write_outbox = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn count(&self, hook: &str) -> usize {
        self.calls().iter().filter(|call| call.as_str() == hook).count()
    }

    fn record(&self, hook: &str) -> EngineResult<()> {
        self.calls.lock().expect("calls lock").push(hook.to_string());
        if self.fail_at == Some(hook) {
            return Err(EngineError::validation(format!("{} rejected the request", hook)));
        }
        Ok(())
    }

    async fn outbox(&self, scope: &mut WriteScope<'_>, event: &str) -> EngineResult<()> {
        if self.write_outbox {
            let record = Resource::new("outbox").with_attribute("event", json!(event));
            scope.unit_of_work().insert(record).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceDefinition for RecordingDefinition {
    fn on_apply_filter(&self, existing: Option<FilterExpression>) -> Option<FilterExpression> {
        let _ = self.record("filter");
        existing
    }

    fn on_apply_sparse_field_set(
        &self,
        existing: Option<SparseFieldSet>,
        selection: &FieldSelection<'_>,
    ) -> Option<SparseFieldSet> {
        let _ = self.record(if selection.is_query() {
            "fields:query"
        } else {
            "fields:serialization"
        });
        existing
    }

    fn query_parameter_handlers(&self) -> QueryParameterHandlers {
        QueryParameterHandlers::new().with("isHighlighted", |value: &str| {
            let highlighted = value.parse::<bool>().map_err(|_| {
                EngineError::validation(format!("'{}' is not a boolean", value))
            })?;
            Ok(FilterExpression::equals("internalFlag", json!(highlighted)))
        })
    }

    async fn on_initialize_resource(
        &self,
        resource: &mut Resource,
        _scope: &mut WriteScope<'_>,
    ) -> EngineResult<()> {
        self.record("initialize")?;
        resource.set_attribute("manufacturer", json!("unknown"));
        Ok(())
    }

    async fn on_before_create(
        &self,
        _resource: &mut Resource,
        scope: &mut WriteScope<'_>,
    ) -> EngineResult<()> {
        self.outbox(scope, "disk created").await?;
        self.record("before_create")
    }

    async fn on_after_create(
        &self,
        _resource: &Resource,
        _scope: &mut WriteScope<'_>,
    ) -> EngineResult<()> {
        self.record("after_create")
    }

    async fn on_after_get_for_update(
        &self,
        _resource: &Resource,
        _scope: &mut WriteScope<'_>,
    ) -> EngineResult<()> {
        self.record("after_get_for_update")
    }

    async fn on_before_update(
        &self,
        _resource: &mut Resource,
        scope: &mut WriteScope<'_>,
    ) -> EngineResult<()> {
        self.outbox(scope, "disk updated").await?;
        self.record("before_update")
    }

    async fn on_after_update(
        &self,
        _resource: &Resource,
        _scope: &mut WriteScope<'_>,
    ) -> EngineResult<()> {
        self.record("after_update")
    }

    async fn on_before_delete(
        &self,
        _id: &ResourceId,
        scope: &mut WriteScope<'_>,
    ) -> EngineResult<()> {
        self.outbox(scope, "disk deleted").await?;
        self.record("before_delete")
    }

    async fn on_after_delete(
        &self,
        _id: &ResourceId,
        _scope: &mut WriteScope<'_>,
    ) -> EngineResult<()> {
        self.record("after_delete")
    }
}
