//! Query expressions and their composition.
//!
//! The expression types ([`FilterExpression`], [`SortExpression`],
//! [`PaginationExpression`], [`SparseFieldSet`], [`IncludeElement`]) are pure
//! values with structural equality. [`QueryComposer`] turns a request's
//! [`QueryIntent`] into a [`QueryLayer`] by applying defaults and consulting
//! resource definitions.

pub mod composer;
pub mod filter;
pub mod include;
pub mod layer;
pub mod pagination;
pub mod sort;
pub mod sparse_fieldset;
pub mod validation;

pub use composer::QueryComposer;
pub use filter::{ComparisonOperator, FilterExpression, LogicalOperator};
pub use include::{IncludeElement, include_depth};
pub use layer::{IncludeLayer, QueryIntent, QueryLayer};
pub use pagination::PaginationExpression;
pub use sort::{SortDirection, SortElement, SortExpression};
pub use sparse_fieldset::{FieldSelection, FieldSelectionPhase, SparseFieldSet};
pub use validation::LayerValidator;
