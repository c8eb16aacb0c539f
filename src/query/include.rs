//! Include trees.
//!
//! Each element names a relationship to traverse and may carry its own
//! filter, sort, pagination and field selection for the related type. The
//! tree mirrors what the request asked for, so it is finite even when the
//! schema has cycles.

use super::{FilterExpression, PaginationExpression, SortExpression, SparseFieldSet};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludeElement {
    pub relationship: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<IncludeElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterExpression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortExpression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationExpression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<SparseFieldSet>,
}

impl IncludeElement {
    pub fn new(relationship: impl Into<String>) -> Self {
        Self {
            relationship: relationship.into(),
            ..Default::default()
        }
    }

    /// Parse a dotted chain such as `partitions.owner`.
    pub fn from_path(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.split('.').map(str::trim).collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return None;
        }

        segments
            .into_iter()
            .rev()
            .fold(None, |child: Option<IncludeElement>, segment| {
                let mut element = IncludeElement::new(segment);
                element.children.extend(child);
                Some(element)
            })
    }

    pub fn with_child(mut self, child: IncludeElement) -> Self {
        self.children.push(child);
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
        self.fields = Some(fields);
        self
    }

    /// Length of the longest chain starting at this element (1 for a leaf).
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(IncludeElement::depth).max().unwrap_or(0)
    }
}

impl fmt::Display for IncludeElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relationship)?;
        if !self.children.is_empty() {
            let children: Vec<String> = self.children.iter().map(ToString::to_string).collect();
            write!(f, "({})", children.join(","))?;
        }
        Ok(())
    }
}

/// Longest chain across a set of include elements (0 when empty).
pub fn include_depth(includes: &[IncludeElement]) -> usize {
    includes.iter().map(IncludeElement::depth).max().unwrap_or(0)
}
