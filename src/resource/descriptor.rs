//! Resource type descriptors.
//!
//! A descriptor names a resource kind and lists its identifier type,
//! attributes, relationships and (optionally) the attribute carrying its
//! concurrency token. Descriptors are built once at startup and never change.

use serde::{Deserialize, Serialize};

/// Name of the identifier field, valid in every filter and sort.
pub const ID_FIELD: &str = "id";

/// Semantic type of a resource type's identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IdentifierKind {
    /// Store-generated integer sequence
    Integer,
    /// Free-form text
    Text,
    /// UUID, stored as text
    Uuid,
}

/// Cardinality of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipKind {
    ToOne,
    ToMany,
}

/// A named relationship to another resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDescriptor {
    pub name: String,
    pub kind: RelationshipKind,
    pub target_type: String,
}

impl RelationshipDescriptor {
    pub fn is_to_many(&self) -> bool {
        self.kind == RelationshipKind::ToMany
    }
}

/// Immutable description of one resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTypeDescriptor {
    name: String,
    identifier_kind: IdentifierKind,
    attributes: Vec<String>,
    relationships: Vec<RelationshipDescriptor>,
    concurrency_token: Option<String>,
}

impl ResourceTypeDescriptor {
    /// Start building a descriptor for the named resource type.
    pub fn builder(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder {
            name: name.into(),
            identifier_kind: IdentifierKind::Integer,
            attributes: Vec::new(),
            relationships: Vec::new(),
            concurrency_token: None,
        }
    }

    /// Resource type name (e.g. "disks").
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifier_kind(&self) -> IdentifierKind {
        self.identifier_kind
    }

    /// Attribute names, including the concurrency token attribute if declared.
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn relationships(&self) -> &[RelationshipDescriptor] {
        &self.relationships
    }

    /// Look up a relationship by name.
    pub fn relationship(&self, name: &str) -> Option<&RelationshipDescriptor> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Name of the attribute carrying the concurrency token, if this type opts in.
    pub fn concurrency_token_field(&self) -> Option<&str> {
        self.concurrency_token.as_deref()
    }

    /// Whether this type requires a concurrency token on writes.
    pub fn uses_concurrency_token(&self) -> bool {
        self.concurrency_token.is_some()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }

    /// Whether `name` is a field that can appear in a sparse field set.
    pub fn has_field(&self, name: &str) -> bool {
        self.has_attribute(name) || self.relationship(name).is_some()
    }

    /// Whether `name` can be compared or sorted on.
    pub fn is_comparable(&self, name: &str) -> bool {
        name == ID_FIELD || self.has_attribute(name)
    }

    /// All viewable fields: attributes followed by relationships.
    pub fn viewable_fields(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .map(String::as_str)
            .chain(self.relationships.iter().map(|r| r.name.as_str()))
    }
}

/// Builder for [`ResourceTypeDescriptor`].
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    name: String,
    identifier_kind: IdentifierKind,
    attributes: Vec<String>,
    relationships: Vec<RelationshipDescriptor>,
    concurrency_token: Option<String>,
}

impl DescriptorBuilder {
    pub fn identifier(mut self, kind: IdentifierKind) -> Self {
        self.identifier_kind = kind;
        self
    }

    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.attributes.contains(&name) {
            self.attributes.push(name);
        }
        self
    }

    pub fn to_one(self, name: impl Into<String>, target_type: impl Into<String>) -> Self {
        self.relationship(name, RelationshipKind::ToOne, target_type)
    }

    pub fn to_many(self, name: impl Into<String>, target_type: impl Into<String>) -> Self {
        self.relationship(name, RelationshipKind::ToMany, target_type)
    }

    fn relationship(
        mut self,
        name: impl Into<String>,
        kind: RelationshipKind,
        target_type: impl Into<String>,
    ) -> Self {
        self.relationships.push(RelationshipDescriptor {
            name: name.into(),
            kind,
            target_type: target_type.into(),
        });
        self
    }

    /// Opt in to optimistic concurrency. The token is exposed as an attribute
    /// with the given name.
    pub fn concurrency_token(mut self, attribute: impl Into<String>) -> Self {
        let attribute = attribute.into();
        self.concurrency_token = Some(attribute.clone());
        self.attribute(attribute)
    }

    pub fn build(self) -> ResourceTypeDescriptor {
        ResourceTypeDescriptor {
            name: self.name,
            identifier_kind: self.identifier_kind,
            attributes: self.attributes,
            relationships: self.relationships,
            concurrency_token: self.concurrency_token,
        }
    }
}
