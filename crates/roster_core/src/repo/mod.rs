//! Repository layer: unit of work, entity mapping and repositories.
//!
//! # Responsibility
//! - Define the generic CRUD contract and the member query surface.
//! - Keep every SQL statement behind the unit of work that counts and logs it.
//!
//! # Invariants
//! - Repositories are constructed only over a migrated connection
//!   (`UninitializedConnection`, `MissingRequiredTable`, `MissingRequiredColumn`).
//! - Not-found lookups return `None`; they are never errors.

pub mod crud;
pub mod entity;
mod error;
mod identity_map;
pub mod member_custom;
pub mod member_repo;
mod schema;
pub mod team_repo;
pub mod unit_of_work;

pub use crud::{CrudRepository, SqliteRepository};
pub use entity::{Entity, Property};
pub use error::{RepoError, RepoResult};
pub use identity_map::IdentityMap;
pub use member_custom::{
    member_select_sql, query_members, MemberRepositoryCustom, MemberRepositoryImpl,
};
pub use member_repo::{member_queries, MemberRepository, QueryOutput};
pub use team_repo::TeamRepository;
pub use unit_of_work::{FlushMode, UnitOfWork};
