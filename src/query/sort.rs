//! Sort expressions.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One `(field, direction)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortElement {
    pub field: String,
    pub direction: SortDirection,
}

/// Ordered sequence of sort elements. Earlier elements take precedence.
///
/// An empty sequence leaves the order to the store, which sorts by
/// identifier ascending.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortExpression {
    elements: Vec<SortElement>,
}

impl SortExpression {
    pub fn new(elements: Vec<SortElement>) -> Self {
        Self { elements }
    }

    pub fn ascending(field: impl Into<String>) -> Self {
        Self::default().then(field, SortDirection::Ascending)
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self::default().then(field, SortDirection::Descending)
    }

    /// Append a tie-breaker.
    pub fn then(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.elements.push(SortElement {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn elements(&self) -> &[SortElement] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl fmt::Display for SortExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .elements
            .iter()
            .map(|element| match element.direction {
                SortDirection::Ascending => element.field.clone(),
                SortDirection::Descending => format!("-{}", element.field),
            })
            .collect();
        write!(f, "{}", parts.join(","))
    }
}
