//! Query descriptors and their eager compilation into SQL templates.
//!
//! # Responsibility
//! - Describe repository queries as values (`QueryMethod`, `NamedQuery`,
//!   `ModifyingQuery`) instead of inferring them at call time.
//! - Validate every descriptor against the entity mapping when it is registered.
//!
//! # Invariants
//! - A registry never holds a query that references an unknown property,
//!   association, named query or parameter.
//! - Parameters bind in declared order; templates refer to them by `:name`.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod derive;
mod descriptor;
mod registry;
mod template;

pub use derive::parse_method_name;
pub use descriptor::{
    EntityGraph, LockMode, ModifyingQuery, NamedQuery, Predicate, QueryHints, QueryMethod,
    QuerySource, ResultShape,
};
pub use registry::{PreparedModifying, PreparedQuery, QueryRegistry, Resolved};
pub use template::{bind_positional, placeholders};

pub type QueryResult<T> = Result<T, QueryError>;

/// Registration-time (and dispatch-time) query failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Method name does not follow `find_[subject_]by_<clauses>`.
    UnparseableMethodName { method: String, reason: &'static str },
    /// Predicate or template refers to a property the entity does not map.
    UnknownProperty {
        method: String,
        entity: &'static str,
        property: String,
    },
    /// Entity graph names an association the entity does not declare.
    UnknownAssociation {
        method: String,
        entity: &'static str,
        path: String,
    },
    /// Query method references a named query that was never registered.
    MissingNamedQuery { method: String, named_query: String },
    /// Template placeholders and declared parameters disagree.
    ParameterMismatch {
        query: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    /// A modifying query template is not an UPDATE or DELETE statement.
    NotModifying(String),
    DuplicateQuery(String),
    UnknownQuery(String),
    /// A read was dispatched to a modifying query, or the reverse.
    WrongKind {
        query: String,
        expected: &'static str,
    },
    ArgumentCount {
        query: String,
        expected: usize,
        actual: usize,
    },
    ShapeMismatch {
        query: String,
        expected: ResultShape,
        actual: ResultShape,
    },
    /// Compiled SQL was rejected by the database when the repository was built.
    InvalidSql { query: String, message: String },
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnparseableMethodName { method, reason } => {
                write!(f, "cannot derive query from `{method}`: {reason}")
            }
            Self::UnknownProperty {
                method,
                entity,
                property,
            } => write!(
                f,
                "query `{method}` references unknown property `{property}` of `{entity}`"
            ),
            Self::UnknownAssociation {
                method,
                entity,
                path,
            } => write!(
                f,
                "query `{method}` fetches unknown association `{path}` of `{entity}`"
            ),
            Self::MissingNamedQuery {
                method,
                named_query,
            } => write!(
                f,
                "query `{method}` references missing named query `{named_query}`"
            ),
            Self::ParameterMismatch {
                query,
                missing,
                unexpected,
            } => write!(
                f,
                "query `{query}` parameters do not match template: missing [{}], unexpected [{}]",
                missing.join(", "),
                unexpected.join(", ")
            ),
            Self::NotModifying(query) => {
                write!(f, "modifying query `{query}` must be an UPDATE or DELETE")
            }
            Self::DuplicateQuery(name) => write!(f, "query `{name}` is already registered"),
            Self::UnknownQuery(name) => write!(f, "no query registered as `{name}`"),
            Self::WrongKind { query, expected } => {
                write!(f, "query `{query}` is not a {expected} query")
            }
            Self::ArgumentCount {
                query,
                expected,
                actual,
            } => write!(
                f,
                "query `{query}` expects {expected} argument(s), got {actual}"
            ),
            Self::ShapeMismatch {
                query,
                expected,
                actual,
            } => write!(
                f,
                "query `{query}` returns {actual} but caller expected {expected}"
            ),
            Self::InvalidSql { query, message } => {
                write!(f, "query `{query}` does not compile against the schema: {message}")
            }
        }
    }
}

impl Error for QueryError {}
