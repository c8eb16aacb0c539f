//! Catalog of resource type descriptors.
//!
//! The graph is assembled once at startup, validated, and then shared
//! read-only (behind an `Arc`) by every component.

use super::descriptor::ResourceTypeDescriptor;
use crate::error::{EngineError, EngineResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of all resource types known to the engine.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    descriptors: HashMap<String, Arc<ResourceTypeDescriptor>>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor. Each resource type name may be registered once.
    pub fn add(&mut self, descriptor: ResourceTypeDescriptor) -> EngineResult<()> {
        if self.descriptors.contains_key(descriptor.name()) {
            return Err(EngineError::configuration(format!(
                "Resource type '{}' is registered more than once",
                descriptor.name()
            )));
        }

        self.descriptors
            .insert(descriptor.name().to_string(), Arc::new(descriptor));
        Ok(())
    }

    /// Builder-style variant of [`add`](Self::add).
    pub fn with(mut self, descriptor: ResourceTypeDescriptor) -> EngineResult<Self> {
        self.add(descriptor)?;
        Ok(self)
    }

    /// Get a descriptor by resource type name.
    pub fn get(&self, resource_type: &str) -> Option<&Arc<ResourceTypeDescriptor>> {
        self.descriptors.get(resource_type)
    }

    /// Get a descriptor, treating an unknown type as a configuration fault.
    pub fn require(&self, resource_type: &str) -> EngineResult<&Arc<ResourceTypeDescriptor>> {
        self.get(resource_type).ok_or_else(|| {
            EngineError::configuration(format!("Unknown resource type '{}'", resource_type))
        })
    }

    /// Get all registered resource type names.
    pub fn resource_types(&self) -> Vec<&str> {
        self.descriptors.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, resource_type: &str) -> bool {
        self.descriptors.contains_key(resource_type)
    }

    /// Check that every relationship targets a registered type.
    pub fn validate(&self) -> EngineResult<()> {
        for descriptor in self.descriptors.values() {
            for relationship in descriptor.relationships() {
                if !self.contains(&relationship.target_type) {
                    return Err(EngineError::configuration(format!(
                        "Relationship '{}.{}' targets unknown resource type '{}'",
                        descriptor.name(),
                        relationship.name,
                        relationship.target_type
                    )));
                }
            }
        }
        Ok(())
    }
}
