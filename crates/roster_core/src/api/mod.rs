//! Request-facing glue over the member repository.
//!
//! # Responsibility
//! - Parse request parameters (`page`, `size`, `sort`) into repository inputs.
//! - Map entities to DTOs so entity handles never leave this layer.
//!
//! # Invariants
//! - No HTTP server lives here; callers pass raw path/query values.

mod member_controller;

pub use member_controller::{
    parse_pageable, ApiError, MemberController, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
