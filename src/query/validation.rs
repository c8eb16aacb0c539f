//! Structural checks on composed query layers.
//!
//! Upstream parsing guarantees the request intent is well formed, so anything
//! caught here was introduced by a hook (or by a broken resource graph). That
//! is a programming error: it is logged and reported as a configuration
//! fault, never as bad client input.

use super::{FilterExpression, QueryLayer, SortExpression, SparseFieldSet};
use crate::config::EngineOptions;
use crate::error::{EngineError, EngineResult};
use crate::resource::{ResourceGraph, ResourceTypeDescriptor};
use log::warn;

/// Validates composed layers against the resource graph and engine limits.
pub struct LayerValidator<'a> {
    graph: &'a ResourceGraph,
    options: &'a EngineOptions,
    request_id: &'a str,
}

impl<'a> LayerValidator<'a> {
    pub fn new(graph: &'a ResourceGraph, options: &'a EngineOptions, request_id: &'a str) -> Self {
        Self {
            graph,
            options,
            request_id,
        }
    }

    /// Validate a layer and every include layer below it.
    pub fn validate(&self, layer: &QueryLayer) -> EngineResult<()> {
        self.validate_at_depth(layer, 0)
    }

    fn validate_at_depth(&self, layer: &QueryLayer, depth: usize) -> EngineResult<()> {
        if let Some(maximum) = self.options.maximum_include_depth {
            if depth > maximum {
                return Err(self.fault(format!(
                    "Include chain exceeds the maximum depth of {}",
                    maximum
                )));
            }
        }

        let descriptor = self.descriptor(&layer.resource_type)?;

        if let Some(filter) = &layer.filter {
            self.validate_filter(descriptor, filter)?;
        }
        if let Some(sort) = &layer.sort {
            self.validate_sort(descriptor, sort)?;
        }
        if let Some(selection) = &layer.selection {
            self.validate_selection(descriptor, selection)?;
        }
        if let Some(pagination) = &layer.pagination {
            if let (Some(maximum), Some(size)) = (self.options.maximum_page_size, pagination.page_size()) {
                if size > maximum {
                    return Err(self.fault(format!(
                        "Page size {} exceeds the maximum of {}",
                        size, maximum
                    )));
                }
            }
            if let Some(maximum) = self.options.maximum_page_number {
                if pagination.page_number() > maximum {
                    return Err(self.fault(format!(
                        "Page number {} exceeds the maximum of {}",
                        pagination.page_number(),
                        maximum
                    )));
                }
            }
        }

        for include in &layer.includes {
            let relationship = descriptor.relationship(&include.relationship).ok_or_else(|| {
                self.fault(format!(
                    "Unknown relationship '{}' on resource type '{}'",
                    include.relationship,
                    descriptor.name()
                ))
            })?;
            if relationship.target_type != include.layer.resource_type {
                return Err(self.fault(format!(
                    "Include layer for '{}.{}' targets '{}' instead of '{}'",
                    descriptor.name(),
                    relationship.name,
                    include.layer.resource_type,
                    relationship.target_type
                )));
            }
            self.validate_at_depth(&include.layer, depth + 1)?;
        }

        Ok(())
    }

    fn validate_filter(
        &self,
        descriptor: &ResourceTypeDescriptor,
        filter: &FilterExpression,
    ) -> EngineResult<()> {
        match filter {
            FilterExpression::Comparison { field, .. } | FilterExpression::Any { field, .. } => {
                if !descriptor.is_comparable(field) {
                    return Err(self.fault(format!(
                        "Filter references unknown field '{}' on resource type '{}'",
                        field,
                        descriptor.name()
                    )));
                }
                Ok(())
            }
            FilterExpression::Logical { terms, .. } => {
                if terms.len() < 2 {
                    return Err(self.fault("Logical filter requires at least two terms"));
                }
                terms
                    .iter()
                    .try_for_each(|term| self.validate_filter(descriptor, term))
            }
            FilterExpression::Not { term } => self.validate_filter(descriptor, term),
            FilterExpression::Has {
                relationship,
                filter,
            } => {
                let target = descriptor
                    .relationship(relationship)
                    .ok_or_else(|| {
                        self.fault(format!(
                            "Filter references unknown relationship '{}' on resource type '{}'",
                            relationship,
                            descriptor.name()
                        ))
                    })?
                    .target_type
                    .as_str();

                match filter {
                    Some(nested) => self.validate_filter(self.descriptor(target)?, nested),
                    None => Ok(()),
                }
            }
        }
    }

    fn validate_sort(&self, descriptor: &ResourceTypeDescriptor, sort: &SortExpression) -> EngineResult<()> {
        match sort
            .elements()
            .iter()
            .find(|element| !descriptor.is_comparable(&element.field))
        {
            Some(element) => Err(self.fault(format!(
                "Sort references unknown field '{}' on resource type '{}'",
                element.field,
                descriptor.name()
            ))),
            None => Ok(()),
        }
    }

    fn validate_selection(
        &self,
        descriptor: &ResourceTypeDescriptor,
        selection: &SparseFieldSet,
    ) -> EngineResult<()> {
        match selection.fields().find(|field| !descriptor.has_field(field)) {
            Some(field) => Err(self.fault(format!(
                "Field set references unknown field '{}' on resource type '{}'",
                field,
                descriptor.name()
            ))),
            None => Ok(()),
        }
    }

    fn descriptor(&self, resource_type: &str) -> EngineResult<&'a ResourceTypeDescriptor> {
        self.graph
            .require(resource_type)
            .map(|descriptor| descriptor.as_ref())
    }

    fn fault(&self, message: impl Into<String>) -> EngineError {
        let message = message.into();
        warn!("Invalid composed query: {} (request: '{}')", message, self.request_id);
        EngineError::configuration(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{IncludeLayer, PaginationExpression};
    use serde_json::json;

    fn graph() -> ResourceGraph {
        ResourceGraph::new()
            .with(
                ResourceTypeDescriptor::builder("disks")
                    .attribute("manufacturer")
                    .to_many("partitions", "partitions")
                    .build(),
            )
            .unwrap()
            .with(
                ResourceTypeDescriptor::builder("partitions")
                    .attribute("mountPoint")
                    .to_one("owner", "disks")
                    .build(),
            )
            .unwrap()
    }

    #[test]
    fn test_valid_layer() {
        let graph = graph();
        let options = EngineOptions::default();
        let mut layer = QueryLayer::unrestricted("disks");
        layer.filter = Some(FilterExpression::has(
            "partitions",
            Some(FilterExpression::equals("mountPoint", json!("/"))),
        ));
        layer.sort = Some(SortExpression::ascending("manufacturer"));
        layer.selection = Some(SparseFieldSet::new(["manufacturer", "partitions"]));

        assert!(LayerValidator::new(&graph, &options, "t").validate(&layer).is_ok());
    }

    #[test]
    fn test_unknown_fields_are_configuration_faults() {
        let graph = graph();
        let options = EngineOptions::default();
        let validator = LayerValidator::new(&graph, &options, "t");

        let mut layer = QueryLayer::unrestricted("disks");
        layer.filter = Some(FilterExpression::equals("capacity", json!(1)));
        assert!(matches!(
            validator.validate(&layer),
            Err(EngineError::Configuration { .. })
        ));

        let mut layer = QueryLayer::unrestricted("disks");
        layer.sort = Some(SortExpression::descending("partitions"));
        assert!(validator.validate(&layer).is_err());

        let mut layer = QueryLayer::unrestricted("disks");
        layer.selection = Some(SparseFieldSet::new(["internalFlag"]));
        assert!(validator.validate(&layer).is_err());

        let mut layer = QueryLayer::unrestricted("disks");
        layer.filter = Some(FilterExpression::has(
            "partitions",
            Some(FilterExpression::equals("manufacturer", json!("WD"))),
        ));
        assert!(validator.validate(&layer).is_err());
    }

    #[test]
    fn test_limits() {
        let graph = graph();
        let options = EngineOptions::new()
            .with_maximum_page_size(20)
            .with_maximum_include_depth(1);
        let validator = LayerValidator::new(&graph, &options, "t");

        let mut layer = QueryLayer::unrestricted("disks");
        layer.pagination = PaginationExpression::from_numbers(1, Some(50));
        assert!(validator.validate(&layer).is_err());

        let mut owner = QueryLayer::unrestricted("partitions");
        owner.includes.push(IncludeLayer {
            relationship: "owner".to_string(),
            layer: QueryLayer::unrestricted("disks"),
        });
        let mut layer = QueryLayer::unrestricted("disks");
        layer.includes.push(IncludeLayer {
            relationship: "partitions".to_string(),
            layer: owner,
        });
        assert!(validator.validate(&layer).is_err());
    }
}
