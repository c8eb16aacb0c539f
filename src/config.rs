//! Engine-wide options.
//!
//! These values are fixed once the engine is constructed and shared
//! read-only across all requests.

use crate::query::PaginationExpression;
use std::num::NonZeroUsize;

/// Global defaults and limits applied while composing queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Page size used when a request does not specify one.
    /// `None` disables pagination by default.
    pub default_page_size: Option<NonZeroUsize>,

    /// Largest page size a composed query may carry.
    pub maximum_page_size: Option<NonZeroUsize>,

    /// Largest page number a composed query may carry.
    pub maximum_page_number: Option<NonZeroUsize>,

    /// Deepest include chain a composed query may carry.
    pub maximum_include_depth: Option<usize>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_page_size: NonZeroUsize::new(10),
            maximum_page_size: None,
            maximum_page_number: None,
            maximum_include_depth: None,
        }
    }
}

impl EngineOptions {
    /// Create options with the default page size of 10 and no limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default page size. Pass `None` to disable paging by default.
    pub fn with_default_page_size(mut self, page_size: Option<usize>) -> Self {
        self.default_page_size = page_size.and_then(NonZeroUsize::new);
        self
    }

    /// Set the maximum page size.
    pub fn with_maximum_page_size(mut self, page_size: usize) -> Self {
        self.maximum_page_size = NonZeroUsize::new(page_size);
        self
    }

    /// Set the maximum page number.
    pub fn with_maximum_page_number(mut self, page_number: usize) -> Self {
        self.maximum_page_number = NonZeroUsize::new(page_number);
        self
    }

    /// Set the maximum include depth.
    pub fn with_maximum_include_depth(mut self, depth: usize) -> Self {
        self.maximum_include_depth = Some(depth);
        self
    }

    /// The pagination a request gets when neither the client nor a hook sets one:
    /// the first page at the default page size.
    pub fn default_pagination(&self) -> PaginationExpression {
        PaginationExpression::first_page(self.default_page_size)
    }
}
