//! Sparse field sets.
//!
//! An absent field set (`None`) and an empty one are different things:
//! absent means "no restriction", empty means "no fields besides the
//! identifier".

use crate::resource::ResourceTypeDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A set of field names to include.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SparseFieldSet {
    fields: BTreeSet<String>,
}

impl SparseFieldSet {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// The empty set: no fields besides the identifier.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every viewable field of the resource type.
    pub fn all_of(descriptor: &ResourceTypeDescriptor) -> Self {
        Self::new(descriptor.viewable_fields())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    /// Copy of this set with `field` added.
    pub fn with_field(&self, field: impl Into<String>) -> Self {
        let mut fields = self.fields.clone();
        fields.insert(field.into());
        Self { fields }
    }

    /// Copy of this set with `field` removed.
    pub fn without_field(&self, field: &str) -> Self {
        let mut fields = self.fields.clone();
        fields.remove(field);
        Self { fields }
    }

    /// Union of two sets.
    pub fn union(&self, other: &SparseFieldSet) -> Self {
        Self {
            fields: self.fields.union(&other.fields).cloned().collect(),
        }
    }
}

impl fmt::Display for SparseFieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.fields().collect();
        write!(f, "{}", joined.join(","))
    }
}

/// When a sparse field set hook runs.
///
/// The hook runs twice per request: once to select what to fetch and once to
/// select what to expose. At query time an absent set means the client sent
/// no field selection; at serialization time the incoming set is never absent
/// and holds everything the client asked to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldSelectionPhase {
    /// Selecting which fields to fetch from the store
    Query,
    /// Selecting which fields to expose in the response
    Serialization,
}

/// Context handed to a sparse field set hook, with null-safe helpers.
#[derive(Debug, Clone, Copy)]
pub struct FieldSelection<'a> {
    phase: FieldSelectionPhase,
    descriptor: &'a ResourceTypeDescriptor,
}

impl<'a> FieldSelection<'a> {
    pub fn new(phase: FieldSelectionPhase, descriptor: &'a ResourceTypeDescriptor) -> Self {
        Self { phase, descriptor }
    }

    pub fn phase(&self) -> FieldSelectionPhase {
        self.phase
    }

    pub fn descriptor(&self) -> &'a ResourceTypeDescriptor {
        self.descriptor
    }

    pub fn is_query(&self) -> bool {
        self.phase == FieldSelectionPhase::Query
    }

    /// Make sure `fields` are selected.
    ///
    /// An absent set already selects everything, so it stays absent.
    pub fn including<I, S>(&self, existing: Option<SparseFieldSet>, fields: I) -> Option<SparseFieldSet>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        existing.map(|set| fields.into_iter().fold(set, |set, field| set.with_field(field)))
    }

    /// Make sure `fields` are not selected.
    ///
    /// An absent set is expanded to all viewable fields before removal.
    pub fn excluding<'f, I>(&self, existing: Option<SparseFieldSet>, fields: I) -> Option<SparseFieldSet>
    where
        I: IntoIterator<Item = &'f str>,
    {
        let base = existing.unwrap_or_else(|| SparseFieldSet::all_of(self.descriptor));
        Some(fields.into_iter().fold(base, |set, field| set.without_field(field)))
    }
}
