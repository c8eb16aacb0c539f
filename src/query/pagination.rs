//! Pagination expressions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;

const FIRST_PAGE: NonZeroUsize = NonZeroUsize::MIN;

/// A page number (1-based) and an optional page size.
///
/// A page size of `None` disables paging: the whole result set is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationExpression {
    page_number: NonZeroUsize,
    page_size: Option<NonZeroUsize>,
}

impl PaginationExpression {
    pub fn new(page_number: NonZeroUsize, page_size: Option<NonZeroUsize>) -> Self {
        Self {
            page_number,
            page_size,
        }
    }

    /// Page 1 at the given size.
    pub fn first_page(page_size: Option<NonZeroUsize>) -> Self {
        Self::new(FIRST_PAGE, page_size)
    }

    /// Build from raw numbers. Zero is rejected.
    pub fn from_numbers(page_number: usize, page_size: Option<usize>) -> Option<Self> {
        let page_number = NonZeroUsize::new(page_number)?;
        let page_size = match page_size {
            Some(size) => Some(NonZeroUsize::new(size)?),
            None => None,
        };
        Some(Self::new(page_number, page_size))
    }

    /// Paging turned off.
    pub fn disabled() -> Self {
        Self::first_page(None)
    }

    pub fn page_number(&self) -> NonZeroUsize {
        self.page_number
    }

    pub fn page_size(&self) -> Option<NonZeroUsize> {
        self.page_size
    }

    pub fn is_disabled(&self) -> bool {
        self.page_size.is_none()
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> usize {
        self.page_size
            .map(|size| (self.page_number.get() - 1).saturating_mul(size.get()))
            .unwrap_or(0)
    }

    /// Maximum number of rows to return, if paging is on.
    pub fn limit(&self) -> Option<usize> {
        self.page_size.map(NonZeroUsize::get)
    }
}

impl fmt::Display for PaginationExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page_size {
            Some(size) => write!(f, "page {} of size {}", self.page_number, size),
            None => write!(f, "unpaged"),
        }
    }
}
