//! Paging and slicing over sorted result sets.
//!
//! # Responsibility
//! - Describe a requested window (`PageRequest`, `Sort`).
//! - Carry window results with (`Page`) or without (`Slice`) a total count.
//!
//! # Invariants
//! - Page indexes are 0-based; page size is always > 0.
//! - Sort properties are validated against the queried entity, never ignored.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod page;
mod request;

pub use page::{Page, Slice};
pub use request::{Direction, Order, PageRequest, Sort};

/// Request-validation failure for paging and sorting input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagingError {
    ZeroPageSize,
    UnknownSortProperty { entity: &'static str, property: String },
    UnknownDirection(String),
    OffsetOverflow { page: u64, size: u64 },
    MissingPageRequest(String),
}

impl Display for PagingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroPageSize => write!(f, "page size must be greater than zero"),
            Self::UnknownSortProperty { entity, property } => {
                write!(f, "no property `{property}` found for type `{entity}`")
            }
            Self::UnknownDirection(value) => {
                write!(f, "invalid sort direction `{value}`; expected asc|desc")
            }
            Self::OffsetOverflow { page, size } => {
                write!(f, "page {page} with size {size} exceeds the addressable offset")
            }
            Self::MissingPageRequest(query) => {
                write!(f, "query `{query}` requires a page request")
            }
        }
    }
}

impl Error for PagingError {}
