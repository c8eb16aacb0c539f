//! Response shaping.
//!
//! The last step before the (external) serializer: decide which fields of each
//! fetched resource are exposed, and attach per-resource meta. This is where
//! the second sparse field set pass runs, once per resource type present in
//! the response, with the fields the client asked for (or every viewable field
//! when it asked for none). A hook may therefore fetch a field at query time
//! and still keep it out of the response.

use crate::context::RequestContext;
use crate::definition::DefinitionRegistry;
use crate::error::EngineResult;
use crate::query::{FieldSelection, FieldSelectionPhase, IncludeElement, QueryIntent, SparseFieldSet};
use crate::resource::{Resource, ResourceGraph, ResourceId, ResourceTypeDescriptor};
use log::{debug, trace};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Field sets the client asked for, per resource type.
///
/// A type missing from the map was requested without restriction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestedFields {
    by_type: HashMap<String, SparseFieldSet>,
}

impl RequestedFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the field sets from the primary request and its include tree.
    pub fn from_intent(
        graph: &ResourceGraph,
        descriptor: &ResourceTypeDescriptor,
        intent: &QueryIntent,
    ) -> Self {
        Self::from_parts(
            graph,
            descriptor,
            intent.sparse_field_set.as_ref(),
            &intent.includes,
        )
    }

    /// Collect from a primary field set and an (already composed) include tree.
    pub fn from_parts(
        graph: &ResourceGraph,
        descriptor: &ResourceTypeDescriptor,
        primary: Option<&SparseFieldSet>,
        includes: &[IncludeElement],
    ) -> Self {
        let mut requested = Self::new();
        if let Some(fields) = primary {
            requested.insert(descriptor.name(), fields.clone());
        }
        requested.collect_includes(graph, descriptor, includes);
        requested
    }

    fn collect_includes(
        &mut self,
        graph: &ResourceGraph,
        descriptor: &ResourceTypeDescriptor,
        includes: &[IncludeElement],
    ) {
        for element in includes {
            let Some(target) = descriptor
                .relationship(&element.relationship)
                .and_then(|relationship| graph.get(&relationship.target_type))
            else {
                continue;
            };
            if let Some(fields) = &element.fields {
                self.insert(target.name(), fields.clone());
            }
            self.collect_includes(graph, target, &element.children);
        }
    }

    /// Record a field set for a type, merging with any set already recorded.
    pub fn insert(&mut self, resource_type: impl Into<String>, fields: SparseFieldSet) {
        self.by_type
            .entry(resource_type.into())
            .and_modify(|existing| *existing = existing.union(&fields))
            .or_insert(fields);
    }

    pub fn get(&self, resource_type: &str) -> Option<&SparseFieldSet> {
        self.by_type.get(resource_type)
    }
}

/// One resource as exposed to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapedResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: Option<ResourceId>,
    pub fields: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

/// Primary data: one resource or a collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ShapedData {
    Single(Box<ShapedResource>),
    Collection(Vec<ShapedResource>),
}

impl ShapedData {
    pub fn resources(&self) -> Vec<&ShapedResource> {
        match self {
            ShapedData::Single(resource) => vec![resource.as_ref()],
            ShapedData::Collection(resources) => resources.iter().collect(),
        }
    }
}

/// A complete response body, ready for the wire serializer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapedDocument {
    pub data: ShapedData,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<ShapedResource>,
}

/// Whether the primary data is a single resource or a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryShape {
    Single,
    Collection,
}

/// Applies the serialization-phase field selection and meta.
#[derive(Debug, Clone)]
pub struct ResponseShaper {
    graph: Arc<ResourceGraph>,
    registry: Arc<DefinitionRegistry>,
}

impl ResponseShaper {
    pub fn new(graph: Arc<ResourceGraph>, registry: Arc<DefinitionRegistry>) -> Self {
        Self { graph, registry }
    }

    /// Shape primary and included resources.
    ///
    /// The sparse field set hook of each resource type runs exactly once, no
    /// matter how many resources of that type the response holds.
    pub fn shape(
        &self,
        primary: &[Resource],
        included: &[Resource],
        shape: PrimaryShape,
        requested: &RequestedFields,
        context: &RequestContext,
    ) -> EngineResult<ShapedDocument> {
        let mut exposed: HashMap<String, SparseFieldSet> = HashMap::new();

        let mut shaped_primary = Vec::with_capacity(primary.len());
        for resource in primary {
            shaped_primary.push(self.shape_resource(resource, requested, &mut exposed, context)?);
        }

        let mut shaped_included = Vec::with_capacity(included.len());
        for resource in included {
            shaped_included.push(self.shape_resource(resource, requested, &mut exposed, context)?);
        }

        let data = match shape {
            PrimaryShape::Single => match shaped_primary.into_iter().next() {
                Some(resource) => ShapedData::Single(Box::new(resource)),
                None => ShapedData::Collection(Vec::new()),
            },
            PrimaryShape::Collection => ShapedData::Collection(shaped_primary),
        };

        trace!(
            "Shaped response with {} included resources (request: '{}')",
            shaped_included.len(),
            context.request_id()
        );
        Ok(ShapedDocument {
            data,
            included: shaped_included,
        })
    }

    fn shape_resource(
        &self,
        resource: &Resource,
        requested: &RequestedFields,
        exposed: &mut HashMap<String, SparseFieldSet>,
        context: &RequestContext,
    ) -> EngineResult<ShapedResource> {
        let descriptor = self.graph.require(resource.resource_type())?;

        if !exposed.contains_key(descriptor.name()) {
            let fields = self.exposed_fields(descriptor, requested.get(descriptor.name()), context);
            exposed.insert(descriptor.name().to_string(), fields);
        }
        let fields = &exposed[descriptor.name()];

        let values = descriptor
            .viewable_fields()
            .filter(|field| fields.contains(field))
            .filter_map(|field| {
                resource
                    .field_value(descriptor, field)
                    .map(|value| (field.to_string(), value))
            })
            .collect();

        let meta = self
            .registry
            .get(descriptor.name())
            .and_then(|definition| definition.get_meta(resource));

        Ok(ShapedResource {
            resource_type: descriptor.name().to_string(),
            id: resource.id().cloned(),
            fields: values,
            meta,
        })
    }

    /// Run the serialization-phase hook for one resource type.
    fn exposed_fields(
        &self,
        descriptor: &ResourceTypeDescriptor,
        requested: Option<&SparseFieldSet>,
        context: &RequestContext,
    ) -> SparseFieldSet {
        let requested = requested
            .cloned()
            .unwrap_or_else(|| SparseFieldSet::all_of(descriptor));

        let Some(definition) = self.registry.get(descriptor.name()) else {
            return requested;
        };

        debug!(
            "Selecting output fields for '{}' (request: '{}')",
            descriptor.name(),
            context.request_id()
        );
        let selection = FieldSelection::new(FieldSelectionPhase::Serialization, descriptor);
        definition
            .on_apply_sparse_field_set(Some(requested), &selection)
            .unwrap_or_else(|| SparseFieldSet::all_of(descriptor))
    }
}
