//! Query composition.
//!
//! Turns a request's [`QueryIntent`] into the [`QueryLayer`] the store
//! executes. For each expression kind the composer first applies the engine
//! default, then hands that value to the resource type's definition (if one is
//! registered) and uses whatever the hook returns. The order is fixed:
//!
//! 1. includes
//! 2. filter (then custom query parameter filters, AND-ed on)
//! 3. sort
//! 4. pagination
//! 5. sparse field set (query phase)
//!
//! Include layers are composed the same way through the *target* type's
//! definition. The query-phase field selection is worked out once per
//! resource type and shared by every layer of that type. The composer never
//! mutates its input.

use super::{
    FieldSelection, FieldSelectionPhase, FilterExpression, IncludeElement, IncludeLayer,
    LayerValidator, PaginationExpression, QueryIntent, QueryLayer, SortExpression, SparseFieldSet,
};
use crate::config::EngineOptions;
use crate::context::RequestContext;
use crate::definition::DefinitionRegistry;
use crate::error::{EngineError, EngineResult};
use crate::resource::{ResourceGraph, ResourceTypeDescriptor};
use crate::serialization::RequestedFields;
use log::{debug, trace, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Builds query layers from request intent.
#[derive(Debug, Clone)]
pub struct QueryComposer {
    graph: Arc<ResourceGraph>,
    registry: Arc<DefinitionRegistry>,
    options: Arc<EngineOptions>,
}

impl QueryComposer {
    pub fn new(
        graph: Arc<ResourceGraph>,
        registry: Arc<DefinitionRegistry>,
        options: Arc<EngineOptions>,
    ) -> Self {
        Self {
            graph,
            registry,
            options,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Compose the full query for a primary resource type.
    ///
    /// Fails with a configuration fault if a hook produced an expression that
    /// does not fit the resource graph, and with a validation error if the
    /// request carries a custom parameter nobody handles.
    pub fn compose(
        &self,
        descriptor: &ResourceTypeDescriptor,
        intent: &QueryIntent,
        context: &RequestContext,
    ) -> EngineResult<QueryLayer> {
        debug!(
            "Composing query for '{}' (request: '{}')",
            descriptor.name(),
            context.request_id()
        );

        let includes = self.compose_includes(descriptor, intent.includes.clone());
        let filter = self.compose_filter(descriptor, intent.filter.clone());
        let filter = self.apply_query_parameters(descriptor, filter, &intent.custom_parameters)?;
        let sort = self.compose_sort(descriptor, intent.sort.clone());
        let pagination = self.compose_pagination(descriptor, intent.pagination);

        let requested = RequestedFields::from_parts(
            &self.graph,
            descriptor,
            intent.sparse_field_set.as_ref(),
            &includes,
        );
        let mut selections = HashMap::new();
        let selection = self.query_selection(descriptor, &requested, &mut selections);

        let layer = QueryLayer {
            resource_type: descriptor.name().to_string(),
            filter,
            sort,
            pagination: Some(pagination),
            selection,
            includes: self.compose_include_layers(
                descriptor,
                &includes,
                &requested,
                &mut selections,
            )?,
        };

        LayerValidator::new(&self.graph, &self.options, context.request_id()).validate(&layer)?;

        trace!(
            "Composed query for '{}': {:?} (request: '{}')",
            descriptor.name(),
            layer,
            context.request_id()
        );
        Ok(layer)
    }

    /// Run the includes hook. The input is never absent; an empty vector is
    /// passed when the request asked for nothing.
    pub fn compose_includes(
        &self,
        descriptor: &ResourceTypeDescriptor,
        existing: Vec<IncludeElement>,
    ) -> Vec<IncludeElement> {
        match self.registry.get(descriptor.name()) {
            Some(definition) => definition.on_apply_includes(existing),
            None => existing,
        }
    }

    pub fn compose_filter(
        &self,
        descriptor: &ResourceTypeDescriptor,
        existing: Option<FilterExpression>,
    ) -> Option<FilterExpression> {
        match self.registry.get(descriptor.name()) {
            Some(definition) => definition.on_apply_filter(existing),
            None => existing,
        }
    }

    pub fn compose_sort(
        &self,
        descriptor: &ResourceTypeDescriptor,
        existing: Option<SortExpression>,
    ) -> Option<SortExpression> {
        match self.registry.get(descriptor.name()) {
            Some(definition) => definition.on_apply_sort(existing),
            None => existing,
        }
    }

    /// Apply the default pagination, then the hook. A hook returning `None`
    /// gets the default back.
    pub fn compose_pagination(
        &self,
        descriptor: &ResourceTypeDescriptor,
        existing: Option<PaginationExpression>,
    ) -> PaginationExpression {
        let current = existing.unwrap_or_else(|| self.options.default_pagination());

        match self.registry.get(descriptor.name()) {
            Some(definition) => definition
                .on_apply_pagination(Some(current))
                .unwrap_or_else(|| self.options.default_pagination()),
            None => current,
        }
    }

    /// Run the sparse field set hook for the given phase.
    pub fn compose_sparse_field_set(
        &self,
        descriptor: &ResourceTypeDescriptor,
        existing: Option<SparseFieldSet>,
        phase: FieldSelectionPhase,
    ) -> Option<SparseFieldSet> {
        match self.registry.get(descriptor.name()) {
            Some(definition) => {
                let selection = FieldSelection::new(phase, descriptor);
                definition.on_apply_sparse_field_set(existing, &selection)
            }
            None => existing,
        }
    }

    fn apply_query_parameters(
        &self,
        descriptor: &ResourceTypeDescriptor,
        filter: Option<FilterExpression>,
        parameters: &BTreeMap<String, String>,
    ) -> EngineResult<Option<FilterExpression>> {
        if parameters.is_empty() {
            return Ok(filter);
        }

        let handlers = self.registry.parameter_handlers(descriptor.name());
        parameters.iter().try_fold(filter, |filter, (name, value)| {
            let handler = handlers.and_then(|handlers| handlers.get(name)).ok_or_else(|| {
                warn!(
                    "Unsupported query parameter '{}' for resource type '{}'",
                    name,
                    descriptor.name()
                );
                EngineError::validation(format!(
                    "Query parameter '{}' is not supported for resource type '{}'",
                    name,
                    descriptor.name()
                ))
            })?;

            let extra = handler(value.as_str())?;
            Ok(Some(FilterExpression::combine(filter, extra)))
        })
    }

    /// Query-phase selection for a type, running its hook on first use only.
    fn query_selection(
        &self,
        descriptor: &ResourceTypeDescriptor,
        requested: &RequestedFields,
        selections: &mut HashMap<String, Option<SparseFieldSet>>,
    ) -> Option<SparseFieldSet> {
        selections
            .entry(descriptor.name().to_string())
            .or_insert_with(|| {
                self.compose_sparse_field_set(
                    descriptor,
                    requested.get(descriptor.name()).cloned(),
                    FieldSelectionPhase::Query,
                )
            })
            .clone()
    }

    fn compose_include_layers(
        &self,
        descriptor: &ResourceTypeDescriptor,
        includes: &[IncludeElement],
        requested: &RequestedFields,
        selections: &mut HashMap<String, Option<SparseFieldSet>>,
    ) -> EngineResult<Vec<IncludeLayer>> {
        let mut layers = Vec::with_capacity(includes.len());

        for element in includes {
            let relationship = descriptor.relationship(&element.relationship).ok_or_else(|| {
                EngineError::configuration(format!(
                    "Unknown relationship '{}' on resource type '{}'",
                    element.relationship,
                    descriptor.name()
                ))
            })?;
            let target = self.graph.require(&relationship.target_type)?;

            let pagination = if relationship.is_to_many() {
                Some(self.compose_pagination(target, element.pagination))
            } else {
                None
            };

            let layer = QueryLayer {
                resource_type: target.name().to_string(),
                filter: self.compose_filter(target, element.filter.clone()),
                sort: self.compose_sort(target, element.sort.clone()),
                pagination,
                selection: self.query_selection(target, requested, selections),
                includes: self.compose_include_layers(
                    target,
                    &element.children,
                    requested,
                    selections,
                )?,
            };

            layers.push(IncludeLayer {
                relationship: element.relationship.clone(),
                layer,
            });
        }

        Ok(layers)
    }
}
