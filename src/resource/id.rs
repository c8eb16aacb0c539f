//! Resource identifiers.

use super::descriptor::IdentifierKind;
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifier of a resource instance, unique within its resource type.
///
/// Immutable once assigned. Ordering is only used to give the store a stable
/// default sort; integers order before text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceId {
    /// Numeric identifier (store sequence)
    Integer(i64),
    /// Text identifier (natural key or UUID)
    Text(String),
}

impl ResourceId {
    /// Parse a raw identifier according to the descriptor's identifier kind.
    pub fn parse(kind: IdentifierKind, raw: &str) -> EngineResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EngineError::validation("Resource identifier cannot be empty"));
        }

        match kind {
            IdentifierKind::Integer => trimmed
                .parse::<i64>()
                .map(ResourceId::Integer)
                .map_err(|_| {
                    EngineError::validation(format!("'{}' is not a valid integer identifier", raw))
                }),
            IdentifierKind::Text => Ok(ResourceId::Text(trimmed.to_string())),
            IdentifierKind::Uuid => uuid::Uuid::parse_str(trimmed)
                .map(|parsed| ResourceId::Text(parsed.to_string()))
                .map_err(|_| {
                    EngineError::validation(format!("'{}' is not a valid UUID identifier", raw))
                }),
        }
    }

    /// Read an identifier from a JSON value (number or string).
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(ResourceId::Integer),
            Value::String(s) if !s.is_empty() => Some(ResourceId::Text(s.clone())),
            _ => None,
        }
    }

    /// JSON representation of the identifier.
    pub fn to_json(&self) -> Value {
        match self {
            ResourceId::Integer(n) => Value::from(*n),
            ResourceId::Text(s) => Value::String(s.clone()),
        }
    }

    /// Whether the identifier matches the given kind.
    pub fn matches_kind(&self, kind: IdentifierKind) -> bool {
        match (self, kind) {
            (ResourceId::Integer(_), IdentifierKind::Integer) => true,
            (ResourceId::Text(_), IdentifierKind::Text) => true,
            (ResourceId::Text(s), IdentifierKind::Uuid) => uuid::Uuid::parse_str(s).is_ok(),
            _ => false,
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Integer(n) => write!(f, "{}", n),
            ResourceId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for ResourceId {
    fn from(value: i64) -> Self {
        ResourceId::Integer(value)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        ResourceId::Text(value.to_string())
    }
}
