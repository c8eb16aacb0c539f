//! Registry of resource definitions.
//!
//! Built once at startup and read concurrently afterwards. Lookup is a single
//! map access by resource type name; there is no chaining or fallback.

use super::{QueryParameterHandlers, ResourceDefinition};
use crate::error::{EngineError, EngineResult};
use crate::resource::ResourceGraph;
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

struct Registration {
    definition: Arc<dyn ResourceDefinition>,
    parameter_handlers: QueryParameterHandlers,
}

/// Maps resource type names to at most one definition each.
#[derive(Default)]
pub struct DefinitionRegistry {
    registrations: HashMap<String, Registration>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the definition for a resource type.
    ///
    /// Registering a second definition for the same type is a configuration
    /// fault.
    pub fn register(
        &mut self,
        resource_type: impl Into<String>,
        definition: Arc<dyn ResourceDefinition>,
    ) -> EngineResult<()> {
        let resource_type = resource_type.into();
        if self.registrations.contains_key(&resource_type) {
            return Err(EngineError::configuration(format!(
                "A resource definition for '{}' is already registered",
                resource_type
            )));
        }

        let parameter_handlers = definition.query_parameter_handlers();
        debug!(
            "Registered resource definition for '{}' ({:?})",
            resource_type, parameter_handlers
        );

        self.registrations.insert(
            resource_type,
            Registration {
                definition,
                parameter_handlers,
            },
        );
        Ok(())
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with(
        mut self,
        resource_type: impl Into<String>,
        definition: Arc<dyn ResourceDefinition>,
    ) -> EngineResult<Self> {
        self.register(resource_type, definition)?;
        Ok(self)
    }

    /// The definition for a resource type, if one is registered.
    pub fn get(&self, resource_type: &str) -> Option<&Arc<dyn ResourceDefinition>> {
        self.registrations
            .get(resource_type)
            .map(|registration| &registration.definition)
    }

    /// Custom query parameter handlers declared by the type's definition.
    pub fn parameter_handlers(&self, resource_type: &str) -> Option<&QueryParameterHandlers> {
        self.registrations
            .get(resource_type)
            .map(|registration| &registration.parameter_handlers)
    }

    pub fn contains(&self, resource_type: &str) -> bool {
        self.registrations.contains_key(resource_type)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Check that every registered definition targets a known resource type.
    pub fn validate(&self, graph: &ResourceGraph) -> EngineResult<()> {
        match self
            .registrations
            .keys()
            .find(|resource_type| !graph.contains(resource_type))
        {
            Some(unknown) => Err(EngineError::configuration(format!(
                "Resource definition registered for unknown resource type '{}'",
                unknown
            ))),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for DefinitionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.registrations.keys().map(String::as_str).collect();
        types.sort_unstable();
        f.debug_struct("DefinitionRegistry")
            .field("resource_types", &types)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::FilterExpression;
    use crate::resource::ResourceTypeDescriptor;
    use serde_json::json;

    struct Plain;

    impl ResourceDefinition for Plain {}

    struct WithParameters;

    impl ResourceDefinition for WithParameters {
        fn query_parameter_handlers(&self) -> QueryParameterHandlers {
            QueryParameterHandlers::new()
                .with("isHighRisk", |_| Ok(FilterExpression::equals("riskLevel", json!("high"))))
        }
    }

    #[test]
    fn test_at_most_one_definition_per_type() {
        let mut registry = DefinitionRegistry::new();
        registry.register("disks", Arc::new(Plain)).unwrap();

        let result = registry.register("disks", Arc::new(Plain));
        assert!(matches!(result, Err(EngineError::Configuration { .. })));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup() {
        let registry = DefinitionRegistry::new()
            .with("disks", Arc::new(WithParameters))
            .unwrap();

        assert!(registry.get("disks").is_some());
        assert!(registry.get("partitions").is_none());
        assert!(
            registry
                .parameter_handlers("disks")
                .is_some_and(|handlers| handlers.contains("isHighRisk"))
        );
    }

    #[test]
    fn test_validate_against_graph() {
        let graph = ResourceGraph::new()
            .with(ResourceTypeDescriptor::builder("disks").build())
            .unwrap();

        let registry = DefinitionRegistry::new().with("disks", Arc::new(Plain)).unwrap();
        assert!(registry.validate(&graph).is_ok());

        let registry = registry.with("volumes", Arc::new(Plain)).unwrap();
        assert!(registry.validate(&graph).is_err());
    }
}
