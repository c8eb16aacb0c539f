//! Query execution over materialized rows.
//!
//! The in-memory backend has no query engine of its own, so composed layers
//! are evaluated here against whatever row source the transaction exposes:
//! filter, sort (identifier ascending when unspecified), page, resolve
//! includes, then project to the selected fields.

use super::{QueryResult, StoreError, StoreResult};
use crate::query::{
    ComparisonOperator, FilterExpression, IncludeLayer, LogicalOperator, PaginationExpression,
    QueryLayer, SortDirection, SortExpression,
};
use crate::resource::{RelationshipValue, Resource, ResourceGraph, ResourceId, ResourceTypeDescriptor};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Read access to the rows visible inside one transaction.
pub trait RowSource {
    /// Every visible row of a resource type, in no particular order.
    fn rows(&self, resource_type: &str) -> StoreResult<Vec<Resource>>;

    /// A single visible row.
    fn row(&self, resource_type: &str, id: &ResourceId) -> StoreResult<Option<Resource>>;
}

/// Evaluates query layers against a [`RowSource`].
pub struct Evaluator<'a, S: RowSource> {
    graph: &'a ResourceGraph,
    source: &'a S,
}

impl<'a, S: RowSource> Evaluator<'a, S> {
    pub fn new(graph: &'a ResourceGraph, source: &'a S) -> Self {
        Self { graph, source }
    }

    /// Execute a layer and its include tree.
    pub fn execute(&self, layer: &QueryLayer) -> StoreResult<QueryResult> {
        let descriptor = self.descriptor(&layer.resource_type)?;

        let mut rows = Vec::new();
        for row in self.source.rows(&layer.resource_type)? {
            if self.matches_optional(descriptor, &row, layer.filter.as_ref())? {
                rows.push(row);
            }
        }
        sort_rows(descriptor, &mut rows, layer.sort.as_ref());
        let rows = paginate(rows, layer.pagination.as_ref());

        let mut included = IncludedSet::default();
        for row in &rows {
            included.exclude(row);
        }
        self.resolve_includes(descriptor, &rows, &layer.includes, &mut included)?;

        let primary = rows
            .iter()
            .map(|row| project(descriptor, row, layer))
            .collect();

        Ok(QueryResult {
            primary,
            included: included.into_resources(),
        })
    }

    fn resolve_includes(
        &self,
        descriptor: &ResourceTypeDescriptor,
        parents: &[Resource],
        includes: &[IncludeLayer],
        included: &mut IncludedSet,
    ) -> StoreResult<()> {
        for include in includes {
            let layer = &include.layer;
            let target = self.descriptor(&layer.resource_type)?;
            if descriptor.relationship(&include.relationship).is_none() {
                return Err(StoreError::internal(format!(
                    "Unknown relationship '{}' on resource type '{}'",
                    include.relationship,
                    descriptor.name()
                )));
            }

            let mut reached = Vec::new();
            for parent in parents {
                let Some(linkage) = parent.relationship(&include.relationship) else {
                    continue;
                };

                let mut related = Vec::new();
                for id in linkage.ids() {
                    if let Some(row) = self.source.row(&layer.resource_type, id)? {
                        if self.matches_optional(target, &row, layer.filter.as_ref())? {
                            related.push(row);
                        }
                    }
                }

                if matches!(linkage, RelationshipValue::ToMany(_)) {
                    sort_rows(target, &mut related, layer.sort.as_ref());
                    related = paginate(related, layer.pagination.as_ref());
                }
                reached.extend(related);
            }

            for row in &reached {
                included.insert(project(target, row, layer));
            }
            self.resolve_includes(target, &reached, &layer.includes, included)?;
        }
        Ok(())
    }

    fn matches_optional(
        &self,
        descriptor: &ResourceTypeDescriptor,
        row: &Resource,
        filter: Option<&FilterExpression>,
    ) -> StoreResult<bool> {
        match filter {
            Some(filter) => self.matches(descriptor, row, filter),
            None => Ok(true),
        }
    }

    /// Whether `row` satisfies `filter`.
    pub fn matches(
        &self,
        descriptor: &ResourceTypeDescriptor,
        row: &Resource,
        filter: &FilterExpression,
    ) -> StoreResult<bool> {
        match filter {
            FilterExpression::Comparison {
                field,
                operator,
                value,
            } => {
                let actual = row.field_value(descriptor, field).unwrap_or(Value::Null);
                Ok(compare(&actual, *operator, value))
            }
            FilterExpression::Any { field, values } => {
                let actual = row.field_value(descriptor, field).unwrap_or(Value::Null);
                Ok(values.iter().any(|value| values_equal(&actual, value)))
            }
            FilterExpression::Logical { operator, terms } => {
                for term in terms {
                    let matched = self.matches(descriptor, row, term)?;
                    match (operator, matched) {
                        (LogicalOperator::And, false) => return Ok(false),
                        (LogicalOperator::Or, true) => return Ok(true),
                        _ => {}
                    }
                }
                Ok(*operator == LogicalOperator::And)
            }
            FilterExpression::Not { term } => Ok(!self.matches(descriptor, row, term)?),
            FilterExpression::Has {
                relationship,
                filter,
            } => {
                let Some(linkage) = row.relationship(relationship) else {
                    return Ok(false);
                };
                let target_type = descriptor
                    .relationship(relationship)
                    .map(|r| r.target_type.as_str())
                    .ok_or_else(|| {
                        StoreError::internal(format!(
                            "Unknown relationship '{}' on resource type '{}'",
                            relationship,
                            descriptor.name()
                        ))
                    })?;
                let target = self.descriptor(target_type)?;

                for id in linkage.ids() {
                    if let Some(related) = self.source.row(target_type, id)? {
                        let matched = match filter {
                            Some(nested) => self.matches(target, &related, nested)?,
                            None => true,
                        };
                        if matched {
                            return Ok(true);
                        }
                    }
                }
                Ok(false)
            }
        }
    }

    fn descriptor(&self, resource_type: &str) -> StoreResult<&'a ResourceTypeDescriptor> {
        self.graph
            .get(resource_type)
            .map(|descriptor| descriptor.as_ref())
            .ok_or_else(|| StoreError::internal(format!("Unknown resource type '{}'", resource_type)))
    }
}

/// Included resources, unique by type and identifier, in discovery order.
#[derive(Default)]
struct IncludedSet {
    seen: HashSet<(String, ResourceId)>,
    resources: Vec<Resource>,
}

impl IncludedSet {
    /// Mark a primary resource so it is never repeated as included.
    fn exclude(&mut self, resource: &Resource) {
        if let Some(id) = resource.id() {
            self.seen
                .insert((resource.resource_type().to_string(), id.clone()));
        }
    }

    fn insert(&mut self, resource: Resource) {
        let Some(id) = resource.id() else {
            return;
        };
        if self
            .seen
            .insert((resource.resource_type().to_string(), id.clone()))
        {
            self.resources.push(resource);
        }
    }

    fn into_resources(self) -> Vec<Resource> {
        self.resources
    }
}

fn project(descriptor: &ResourceTypeDescriptor, row: &Resource, layer: &QueryLayer) -> Resource {
    match &layer.selection {
        Some(selection) => row.project(descriptor, selection),
        None => row.clone(),
    }
}

fn paginate(rows: Vec<Resource>, pagination: Option<&PaginationExpression>) -> Vec<Resource> {
    match pagination.and_then(|p| p.limit().map(|limit| (p.offset(), limit))) {
        Some((offset, limit)) => rows.into_iter().skip(offset).take(limit).collect(),
        None => rows,
    }
}

fn sort_rows(descriptor: &ResourceTypeDescriptor, rows: &mut [Resource], sort: Option<&SortExpression>) {
    rows.sort_by(|left, right| {
        let by_elements = sort
            .map(|sort| sort.elements())
            .unwrap_or_default()
            .iter()
            .map(|element| {
                let l = left.field_value(descriptor, &element.field).unwrap_or(Value::Null);
                let r = right.field_value(descriptor, &element.field).unwrap_or(Value::Null);
                match element.direction {
                    SortDirection::Ascending => order_values(&l, &r),
                    SortDirection::Descending => order_values(&r, &l),
                }
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal);

        by_elements.then_with(|| left.id().cmp(&right.id()))
    });
}

fn compare(actual: &Value, operator: ComparisonOperator, expected: &Value) -> bool {
    match operator {
        ComparisonOperator::Equals => values_equal(actual, expected),
        ComparisonOperator::NotEquals => !values_equal(actual, expected),
        ComparisonOperator::LessThan => comparable(actual, expected) == Some(Ordering::Less),
        ComparisonOperator::LessOrEqual => matches!(
            comparable(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        ComparisonOperator::GreaterThan => comparable(actual, expected) == Some(Ordering::Greater),
        ComparisonOperator::GreaterOrEqual => matches!(
            comparable(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        ComparisonOperator::Contains => text_pair(actual, expected).is_some_and(|(a, e)| a.contains(e)),
        ComparisonOperator::StartsWith => {
            text_pair(actual, expected).is_some_and(|(a, e)| a.starts_with(e))
        }
        ComparisonOperator::EndsWith => text_pair(actual, expected).is_some_and(|(a, e)| a.ends_with(e)),
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => actual == expected,
    }
}

/// Ordering between two values of the same kind; `None` across kinds.
fn comparable(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn text_pair<'v>(actual: &'v Value, expected: &'v Value) -> Option<(&'v str, &'v str)> {
    Some((actual.as_str()?, expected.as_str()?))
}

/// Total order for sorting: null < bool < number < string < everything else.
fn order_values(left: &Value, right: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }

    comparable(left, right).unwrap_or_else(|| rank(left).cmp(&rank(right)))
}
