//! Entity model for members and teams.
//!
//! # Responsibility
//! - Define persisted shapes (`Member`, `Team`) and their audit fields.
//! - Make association loading explicit (`Assoc`) and shared identity visible (`Managed`).
//!
//! # Invariants
//! - An entity without id is transient; ids are assigned by the store only.
//! - `Team` member views are in-memory only and never authoritative.

use std::fmt::{Debug, Display};
use std::hash::Hash;

pub mod audit;
pub mod managed;
pub mod member;
pub mod team;

/// Entities whose identity is a store-generated integer surrogate key.
pub trait Identifiable {
    type Id: Copy + Eq + Hash + Debug + Display + From<i64> + Into<i64> + 'static;

    /// `None` while the entity is transient.
    fn id(&self) -> Option<Self::Id>;
}
