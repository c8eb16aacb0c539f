//! Per-resource-type extension points.
//!
//! A [`ResourceDefinition`] bundles the optional hooks for one resource type.
//! Every method has a default that passes its input through unchanged, so an
//! implementation only overrides what it needs. At most one definition is
//! registered per resource type (see [`DefinitionRegistry`]).
//!
//! Query hooks receive the *existing* expression (already defaulted) and return
//! the one to use instead. They replace; they never merge. A hook that wants to
//! narrow the request combines old and new itself:
//!
//! ```rust
//! use resource_engine::definition::ResourceDefinition;
//! use resource_engine::query::FilterExpression;
//! use serde_json::json;
//!
//! struct HideArchived;
//!
//! impl ResourceDefinition for HideArchived {
//!     fn on_apply_filter(&self, existing: Option<FilterExpression>) -> Option<FilterExpression> {
//!         let visible = FilterExpression::equals("archived", json!(false));
//!         Some(FilterExpression::combine(existing, visible))
//!     }
//! }
//! ```
//!
//! Write hooks are asynchronous and receive a [`WriteScope`]: the open unit of
//! work (for extra writes that must commit atomically with the primary one)
//! and the request context (for the request id and cancellation signal).
//! Returning an error from any write hook aborts the operation and rolls the
//! transaction back.

pub mod parameters;
pub mod registry;

pub use parameters::{QueryParameterHandler, QueryParameterHandlers};
pub use registry::DefinitionRegistry;

use crate::context::RequestContext;
use crate::error::EngineResult;
use crate::query::{
    FieldSelection, FilterExpression, IncludeElement, PaginationExpression, SortExpression,
    SparseFieldSet,
};
use crate::resource::{Resource, ResourceId};
use crate::store::UnitOfWork;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Transaction and request handed to write hooks.
pub struct WriteScope<'a> {
    unit_of_work: &'a mut dyn UnitOfWork,
    context: &'a RequestContext,
}

impl<'a> WriteScope<'a> {
    pub fn new(unit_of_work: &'a mut dyn UnitOfWork, context: &'a RequestContext) -> Self {
        Self {
            unit_of_work,
            context,
        }
    }

    /// The open unit of work. Writes made here commit or roll back together
    /// with the operation that triggered the hook.
    pub fn unit_of_work(&mut self) -> &mut dyn UnitOfWork {
        &mut *self.unit_of_work
    }

    pub fn context(&self) -> &RequestContext {
        self.context
    }

    pub fn request_id(&self) -> &str {
        self.context.request_id()
    }
}

/// Optional hooks for one resource type.
#[allow(unused_variables)]
#[async_trait]
pub trait ResourceDefinition: Send + Sync {
    /// Replace the include tree. Never receives `None`; an empty vector means
    /// nothing is included.
    fn on_apply_includes(&self, existing: Vec<IncludeElement>) -> Vec<IncludeElement> {
        existing
    }

    /// Replace the filter. `None` means no filtering.
    fn on_apply_filter(&self, existing: Option<FilterExpression>) -> Option<FilterExpression> {
        existing
    }

    /// Replace the sort. `None` falls back to identifier order.
    fn on_apply_sort(&self, existing: Option<SortExpression>) -> Option<SortExpression> {
        existing
    }

    /// Replace the pagination. `None` falls back to the configured default.
    fn on_apply_pagination(
        &self,
        existing: Option<PaginationExpression>,
    ) -> Option<PaginationExpression> {
        existing
    }

    /// Replace the field selection.
    ///
    /// Called twice per request, see [`FieldSelectionPhase`](crate::query::FieldSelectionPhase).
    /// Returning `None` selects all viewable fields in either phase.
    fn on_apply_sparse_field_set(
        &self,
        existing: Option<SparseFieldSet>,
        selection: &FieldSelection<'_>,
    ) -> Option<SparseFieldSet> {
        existing
    }

    /// Custom query string parameters this type understands.
    ///
    /// Read once, when the definition is registered.
    fn query_parameter_handlers(&self) -> QueryParameterHandlers {
        QueryParameterHandlers::default()
    }

    /// Per-resource metadata attached to the response.
    fn get_meta(&self, resource: &Resource) -> Option<Map<String, Value>> {
        None
    }

    /// Set defaults on a freshly instantiated resource, before client input
    /// is applied. Create only.
    async fn on_initialize_resource(
        &self,
        resource: &mut Resource,
        scope: &mut WriteScope<'_>,
    ) -> EngineResult<()> {
        Ok(())
    }

    /// Last chance to change a new resource before it is inserted.
    async fn on_before_create(
        &self,
        resource: &mut Resource,
        scope: &mut WriteScope<'_>,
    ) -> EngineResult<()> {
        Ok(())
    }

    /// Observe the inserted resource as re-fetched from the store.
    async fn on_after_create(
        &self,
        resource: &Resource,
        scope: &mut WriteScope<'_>,
    ) -> EngineResult<()> {
        Ok(())
    }

    /// Validate the stored state before client changes are applied.
    async fn on_after_get_for_update(
        &self,
        resource: &Resource,
        scope: &mut WriteScope<'_>,
    ) -> EngineResult<()> {
        Ok(())
    }

    /// Last chance to change a resource before it is written back.
    async fn on_before_update(
        &self,
        resource: &mut Resource,
        scope: &mut WriteScope<'_>,
    ) -> EngineResult<()> {
        Ok(())
    }

    /// Observe the updated resource as re-fetched from the store.
    async fn on_after_update(
        &self,
        resource: &Resource,
        scope: &mut WriteScope<'_>,
    ) -> EngineResult<()> {
        Ok(())
    }

    async fn on_before_delete(
        &self,
        id: &ResourceId,
        scope: &mut WriteScope<'_>,
    ) -> EngineResult<()> {
        Ok(())
    }

    async fn on_after_delete(
        &self,
        id: &ResourceId,
        scope: &mut WriteScope<'_>,
    ) -> EngineResult<()> {
        Ok(())
    }
}
