//! Resource model: type descriptors, the descriptor catalog, identifiers,
//! concurrency tokens and resource instances.

pub mod descriptor;
pub mod graph;
pub mod id;
pub mod resource;
pub mod token;

pub use descriptor::{
    DescriptorBuilder, ID_FIELD, IdentifierKind, RelationshipDescriptor, RelationshipKind,
    ResourceTypeDescriptor,
};
pub use graph::ResourceGraph;
pub use id::ResourceId;
pub use resource::{RelationshipValue, Resource};
pub use token::{ConcurrencyToken, TokenError};
