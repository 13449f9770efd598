//! Core domain logic for the roster store: members, teams and their repositories.
//! This crate is the single source of truth for persistence invariants.

pub mod api;
pub mod config;
pub mod db;
pub mod dto;
pub mod logging;
pub mod model;
pub mod paging;
pub mod query;
pub mod repo;

pub use api::{ApiError, MemberController};
pub use config::{ConfigError, StoreConfig};
pub use dto::MemberDto;
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LoggingError,
};
pub use model::audit::AuditFields;
pub use model::managed::{Assoc, Managed};
pub use model::member::{Member, MemberId};
pub use model::team::{Team, TeamId};
pub use model::Identifiable;
pub use paging::{Direction, Order, Page, PageRequest, PagingError, Slice, Sort};
pub use query::{QueryError, QueryResult};
pub use repo::{
    CrudRepository, FlushMode, MemberRepository, MemberRepositoryCustom, MemberRepositoryImpl,
    RepoError, RepoResult, TeamRepository, UnitOfWork,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
