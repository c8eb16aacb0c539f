//! Request intent and composed query layers.
//!
//! [`QueryIntent`] is what arrives from upstream parsing: every expression is
//! optional. [`QueryLayer`] is what the composer hands to the store: defaults
//! applied, hooks consulted, one layer per resource type in the include tree.

use super::{FilterExpression, IncludeElement, PaginationExpression, SortExpression, SparseFieldSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parsed, already-validated query intent for one request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryIntent {
    #[serde(default)]
    pub includes: Vec<IncludeElement>,
    #[serde(default)]
    pub filter: Option<FilterExpression>,
    #[serde(default)]
    pub sort: Option<SortExpression>,
    #[serde(default)]
    pub pagination: Option<PaginationExpression>,
    #[serde(default)]
    pub sparse_field_set: Option<SparseFieldSet>,
    /// Custom query string parameters, routed to definition handlers by name.
    #[serde(default)]
    pub custom_parameters: BTreeMap<String, String>,
}

impl QueryIntent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_include(mut self, include: IncludeElement) -> Self {
        self.includes.push(include);
        self
    }

    pub fn with_filter(mut self, filter: FilterExpression) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_sort(mut self, sort: SortExpression) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_pagination(mut self, pagination: PaginationExpression) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn with_fields(mut self, fields: SparseFieldSet) -> Self {
        self.sparse_field_set = Some(fields);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_parameters.insert(name.into(), value.into());
        self
    }
}

/// Composed query for one resource type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryLayer {
    pub resource_type: String,
    pub filter: Option<FilterExpression>,
    pub sort: Option<SortExpression>,
    /// `None` for to-one includes and single-resource lookups.
    pub pagination: Option<PaginationExpression>,
    /// Fields to fetch. `None` fetches everything.
    pub selection: Option<SparseFieldSet>,
    pub includes: Vec<IncludeLayer>,
}

impl QueryLayer {
    /// A layer with no restrictions at all.
    pub fn unrestricted(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            filter: None,
            sort: None,
            pagination: None,
            selection: None,
            includes: Vec::new(),
        }
    }

    /// Visit this layer and every nested include layer, depth first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a QueryLayer)) {
        visit(self);
        for include in &self.includes {
            include.layer.walk(visit);
        }
    }
}

/// Composed query for one relationship of a parent layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludeLayer {
    pub relationship: String,
    pub layer: QueryLayer,
}
