use crate::db::DbError;
use crate::paging::PagingError;
use crate::query::QueryError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by repository and unit-of-work operations.
pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from repository construction, reads and writes.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error, including constraint violations.
    Db(DbError),
    /// Query registration or dispatch failure.
    Query(QueryError),
    /// Paging or sort input rejected before any statement ran.
    InvalidRequest(PagingError),
    /// Single-result query matched more than one row.
    TooManyResults { expected: usize, actual: usize },
    /// Update of a managed entity whose row no longer exists.
    StaleEntity { table: &'static str, id: i64 },
    /// Entity references an association target that was never saved.
    TransientReference {
        entity: &'static str,
        association: &'static str,
    },
    /// Persisted data cannot be converted to a valid entity.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Query(err) => write!(f, "{err}"),
            Self::InvalidRequest(err) => write!(f, "invalid request: {err}"),
            Self::TooManyResults { expected, actual } => write!(
                f,
                "query did not return a unique result: expected at most {expected}, got {actual}"
            ),
            Self::StaleEntity { table, id } => {
                write!(f, "row {id} in `{table}` no longer exists")
            }
            Self::TransientReference {
                entity,
                association,
            } => write!(
                f,
                "`{entity}.{association}` references an unsaved entity; save it first"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "roster repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "roster repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "roster repository requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Query(err) => Some(err),
            Self::InvalidRequest(err) => Some(err),
            Self::TooManyResults { .. }
            | Self::StaleEntity { .. }
            | Self::TransientReference { .. }
            | Self::InvalidData(_)
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_)
            | Self::MissingRequiredColumn { .. } => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<QueryError> for RepoError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl From<PagingError> for RepoError {
    fn from(value: PagingError) -> Self {
        Self::InvalidRequest(value)
    }
}
