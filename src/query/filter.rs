//! Filter expressions.
//!
//! A filter is a boolean predicate tree over the attributes and
//! relationships of one resource type. `None` (no filter) is represented by
//! `Option<FilterExpression>` at every call site.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Comparison applied between a field and a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Contains,
    StartsWith,
    EndsWith,
}

impl ComparisonOperator {
    fn keyword(&self) -> &'static str {
        match self {
            ComparisonOperator::Equals => "equals",
            ComparisonOperator::NotEquals => "notEquals",
            ComparisonOperator::LessThan => "lessThan",
            ComparisonOperator::LessOrEqual => "lessOrEqual",
            ComparisonOperator::GreaterThan => "greaterThan",
            ComparisonOperator::GreaterOrEqual => "greaterOrEqual",
            ComparisonOperator::Contains => "contains",
            ComparisonOperator::StartsWith => "startsWith",
            ComparisonOperator::EndsWith => "endsWith",
        }
    }
}

/// Logical combinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogicalOperator {
    And,
    Or,
}

/// Boolean predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum FilterExpression {
    /// `field <operator> value`. Comparing with `null` tests for absence.
    Comparison {
        field: String,
        operator: ComparisonOperator,
        value: Value,
    },

    /// `field` equals any of `values`.
    Any { field: String, values: Vec<Value> },

    /// Combination of two or more terms.
    Logical {
        operator: LogicalOperator,
        terms: Vec<FilterExpression>,
    },

    /// Negation.
    Not { term: Box<FilterExpression> },

    /// Relationship has at least one related resource, optionally matching a
    /// filter over the related resource type.
    Has {
        relationship: String,
        filter: Option<Box<FilterExpression>>,
    },
}

impl FilterExpression {
    pub fn compare(field: impl Into<String>, operator: ComparisonOperator, value: Value) -> Self {
        FilterExpression::Comparison {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn equals(field: impl Into<String>, value: Value) -> Self {
        Self::compare(field, ComparisonOperator::Equals, value)
    }

    pub fn any(field: impl Into<String>, values: Vec<Value>) -> Self {
        FilterExpression::Any {
            field: field.into(),
            values,
        }
    }

    pub fn has(relationship: impl Into<String>, filter: Option<FilterExpression>) -> Self {
        FilterExpression::Has {
            relationship: relationship.into(),
            filter: filter.map(Box::new),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(term: FilterExpression) -> Self {
        FilterExpression::Not {
            term: Box::new(term),
        }
    }

    /// Conjunction of `terms`, flattening nested conjunctions.
    /// A single term is returned as-is.
    pub fn and(terms: Vec<FilterExpression>) -> Self {
        Self::logical(LogicalOperator::And, terms)
    }

    /// Disjunction of `terms`, flattening nested disjunctions.
    pub fn or(terms: Vec<FilterExpression>) -> Self {
        Self::logical(LogicalOperator::Or, terms)
    }

    fn logical(operator: LogicalOperator, terms: Vec<FilterExpression>) -> Self {
        let mut flattened = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                FilterExpression::Logical {
                    operator: nested,
                    terms,
                } if nested == operator => flattened.extend(terms),
                other => flattened.push(other),
            }
        }

        if flattened.len() == 1 {
            flattened.remove(0)
        } else {
            FilterExpression::Logical {
                operator,
                terms: flattened,
            }
        }
    }

    /// Add `extra` to an optional existing filter.
    ///
    /// Hooks replace the existing filter wholesale; this is the helper for
    /// hooks that want to narrow it instead.
    pub fn combine(existing: Option<FilterExpression>, extra: FilterExpression) -> FilterExpression {
        match existing {
            Some(existing) => Self::and(vec![existing, extra]),
            None => extra,
        }
    }

    /// Fields compared directly on this resource type (not inside `Has`).
    pub fn compared_fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, fields: &mut Vec<&'a str>) {
        match self {
            FilterExpression::Comparison { field, .. } | FilterExpression::Any { field, .. } => {
                fields.push(field)
            }
            FilterExpression::Logical { terms, .. } => {
                terms.iter().for_each(|term| term.collect_fields(fields))
            }
            FilterExpression::Not { term } => term.collect_fields(fields),
            FilterExpression::Has { .. } => {}
        }
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpression::Comparison {
                field,
                operator,
                value,
            } => write!(f, "{}({},{})", operator.keyword(), field, value),
            FilterExpression::Any { field, values } => {
                let values: Vec<String> = values.iter().map(Value::to_string).collect();
                write!(f, "any({},{})", field, values.join(","))
            }
            FilterExpression::Logical { operator, terms } => {
                let keyword = match operator {
                    LogicalOperator::And => "and",
                    LogicalOperator::Or => "or",
                };
                let terms: Vec<String> = terms.iter().map(ToString::to_string).collect();
                write!(f, "{}({})", keyword, terms.join(","))
            }
            FilterExpression::Not { term } => write!(f, "not({})", term),
            FilterExpression::Has {
                relationship,
                filter: Some(filter),
            } => write!(f, "has({},{})", relationship, filter),
            FilterExpression::Has {
                relationship,
                filter: None,
            } => write!(f, "has({})", relationship),
        }
    }
}
