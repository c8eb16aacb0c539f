//! Resource instances.
//!
//! A [`Resource`] is a loosely typed instance of a resource type: identifier,
//! concurrency token, attribute values and relationship linkage. The same type
//! is used for client input (partially populated), stored rows, and query
//! results (possibly projected to a sparse field set).

use super::descriptor::{ID_FIELD, RelationshipKind, ResourceTypeDescriptor};
use super::id::ResourceId;
use super::token::ConcurrencyToken;
use crate::error::{EngineError, EngineResult};
use crate::query::SparseFieldSet;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Linkage of one relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipValue {
    ToOne(Option<ResourceId>),
    ToMany(Vec<ResourceId>),
}

impl RelationshipValue {
    /// Identifiers of all linked resources.
    pub fn ids(&self) -> Vec<&ResourceId> {
        match self {
            RelationshipValue::ToOne(id) => id.iter().collect(),
            RelationshipValue::ToMany(ids) => ids.iter().collect(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            RelationshipValue::ToOne(Some(id)) => id.to_json(),
            RelationshipValue::ToOne(None) => Value::Null,
            RelationshipValue::ToMany(ids) => {
                Value::Array(ids.iter().map(ResourceId::to_json).collect())
            }
        }
    }
}

/// An instance of a resource type.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    resource_type: String,
    id: Option<ResourceId>,
    token: Option<ConcurrencyToken>,
    attributes: Map<String, Value>,
    relationships: BTreeMap<String, RelationshipValue>,
}

impl Resource {
    /// A fresh, empty instance with no identifier.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: None,
            token: None,
            attributes: Map::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Builder-style identifier assignment.
    pub fn with_id(mut self, id: impl Into<ResourceId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder-style attribute assignment.
    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Builder-style token assignment.
    pub fn with_token(mut self, token: ConcurrencyToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Builder-style relationship assignment.
    pub fn with_relationship(mut self, name: impl Into<String>, value: RelationshipValue) -> Self {
        self.relationships.insert(name.into(), value);
        self
    }

    /// Parse a flat JSON object into a resource of the given type.
    ///
    /// `id` is optional. The descriptor's token attribute populates the
    /// token; relationship fields take an identifier, `null`, or an array of
    /// identifiers. Unknown fields are rejected.
    ///
    /// ```rust
    /// use resource_engine::resource::{Resource, ResourceTypeDescriptor};
    /// use serde_json::json;
    ///
    /// let disks = ResourceTypeDescriptor::builder("disks")
    ///     .attribute("manufacturer")
    ///     .concurrency_token("concurrencyToken")
    ///     .build();
    ///
    /// let disk = Resource::from_json(&disks, json!({
    ///     "manufacturer": "Seagate",
    ///     "concurrencyToken": "17"
    /// })).unwrap();
    /// assert_eq!(disk.token().unwrap().as_str(), "17");
    /// ```
    pub fn from_json(descriptor: &ResourceTypeDescriptor, data: Value) -> EngineResult<Self> {
        let Value::Object(object) = data else {
            return Err(EngineError::validation("Resource must be a JSON object"));
        };

        let mut resource = Self::new(descriptor.name());

        for (field, value) in object {
            if field == ID_FIELD {
                if value.is_null() {
                    continue;
                }
                let id = ResourceId::from_json(&value)
                    .filter(|id| id.matches_kind(descriptor.identifier_kind()))
                    .ok_or_else(|| {
                        EngineError::validation(format!("Invalid 'id' value: {}", value))
                    })?;
                resource.id = Some(id);
            } else if descriptor.concurrency_token_field() == Some(field.as_str()) {
                resource.token = ConcurrencyToken::from_json(&value);
            } else if descriptor.has_attribute(&field) {
                resource.attributes.insert(field, value);
            } else if let Some(relationship) = descriptor.relationship(&field) {
                let linkage = Self::parse_linkage(&field, relationship.kind, &value)?;
                resource.relationships.insert(field, linkage);
            } else {
                return Err(EngineError::validation(format!(
                    "Unknown field '{}' on resource type '{}'",
                    field,
                    descriptor.name()
                )));
            }
        }

        Ok(resource)
    }

    fn parse_linkage(
        field: &str,
        kind: RelationshipKind,
        value: &Value,
    ) -> EngineResult<RelationshipValue> {
        let invalid = || EngineError::validation(format!("Invalid linkage for relationship '{}'", field));

        match (kind, value) {
            (RelationshipKind::ToOne, Value::Null) => Ok(RelationshipValue::ToOne(None)),
            (RelationshipKind::ToOne, value) => ResourceId::from_json(value)
                .map(|id| RelationshipValue::ToOne(Some(id)))
                .ok_or_else(invalid),
            (RelationshipKind::ToMany, Value::Array(items)) => items
                .iter()
                .map(|item| ResourceId::from_json(item).ok_or_else(invalid))
                .collect::<EngineResult<Vec<_>>>()
                .map(RelationshipValue::ToMany),
            (RelationshipKind::ToMany, _) => Err(invalid()),
        }
    }

    /// Flat JSON representation (inverse of [`from_json`](Self::from_json)).
    pub fn to_json(&self, descriptor: &ResourceTypeDescriptor) -> Value {
        let mut object = Map::new();
        if let Some(id) = &self.id {
            object.insert(ID_FIELD.to_string(), id.to_json());
        }
        for (name, value) in &self.attributes {
            object.insert(name.clone(), value.clone());
        }
        if let (Some(field), Some(token)) = (descriptor.concurrency_token_field(), &self.token) {
            object.insert(field.to_string(), token.to_json());
        }
        for (name, linkage) in &self.relationships {
            object.insert(name.clone(), linkage.to_json());
        }
        Value::Object(object)
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn id(&self) -> Option<&ResourceId> {
        self.id.as_ref()
    }

    /// Assign the identifier. Only the store does this, once.
    pub fn set_id(&mut self, id: ResourceId) {
        self.id = Some(id);
    }

    pub fn token(&self) -> Option<&ConcurrencyToken> {
        self.token.as_ref()
    }

    pub fn set_token(&mut self, token: Option<ConcurrencyToken>) {
        self.token = token;
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) {
        self.attributes.insert(name.into(), value);
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    pub fn relationships(&self) -> &BTreeMap<String, RelationshipValue> {
        &self.relationships
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipValue> {
        self.relationships.get(name)
    }

    pub fn set_relationship(&mut self, name: impl Into<String>, value: RelationshipValue) {
        self.relationships.insert(name.into(), value);
    }

    /// Copy every client-supplied attribute and relationship over this instance.
    ///
    /// The identifier and token are never taken from client input.
    pub fn apply_client_fields(&mut self, input: &Resource) {
        for (name, value) in &input.attributes {
            self.attributes.insert(name.clone(), value.clone());
        }
        for (name, linkage) in &input.relationships {
            self.relationships.insert(name.clone(), linkage.clone());
        }
    }

    /// Value of a field for comparison, sorting or output.
    pub fn field_value(&self, descriptor: &ResourceTypeDescriptor, name: &str) -> Option<Value> {
        if name == ID_FIELD {
            return self.id.as_ref().map(ResourceId::to_json);
        }
        if descriptor.concurrency_token_field() == Some(name) {
            return self.token.as_ref().map(ConcurrencyToken::to_json);
        }
        if let Some(value) = self.attributes.get(name) {
            return Some(value.clone());
        }
        self.relationships.get(name).map(RelationshipValue::to_json)
    }

    /// Copy of this resource restricted to the selected fields.
    ///
    /// The identifier is always kept.
    pub fn project(&self, descriptor: &ResourceTypeDescriptor, selection: &SparseFieldSet) -> Self {
        let keeps_token = descriptor
            .concurrency_token_field()
            .is_some_and(|field| selection.contains(field));

        Self {
            resource_type: self.resource_type.clone(),
            id: self.id.clone(),
            token: if keeps_token { self.token.clone() } else { None },
            attributes: self
                .attributes
                .iter()
                .filter(|(name, _)| selection.contains(name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            relationships: self
                .relationships
                .iter()
                .filter(|(name, _)| selection.contains(name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }
}
