//! Hand-written member queries attached next to the declarative ones.
//!
//! An implementation lists the operation names it answers; the member
//! repository routes those names here instead of to a declared query.

use crate::model::managed::Managed;
use crate::model::member::Member;
use crate::query::QueryError;
use crate::repo::entity::{select_columns, Entity};
use crate::repo::error::RepoResult;
use crate::repo::unit_of_work::UnitOfWork;
use rusqlite::types::Value;

pub trait MemberRepositoryCustom {
    /// Operation names this implementation answers.
    fn operations(&self) -> &[&'static str];

    fn execute(
        &self,
        operation: &str,
        uow: &UnitOfWork<'_>,
        args: &[Value],
    ) -> RepoResult<Vec<Managed<Member>>>;
}

/// Default custom implementation: `find_member_custom` lists every member.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemberRepositoryImpl;

impl MemberRepositoryCustom for MemberRepositoryImpl {
    fn operations(&self) -> &[&'static str] {
        &["find_member_custom"]
    }

    fn execute(
        &self,
        operation: &str,
        uow: &UnitOfWork<'_>,
        args: &[Value],
    ) -> RepoResult<Vec<Managed<Member>>> {
        match operation {
            "find_member_custom" => {
                let sql = format!("{} ORDER BY m.member_id ASC;", member_select_sql());
                query_members(uow, &sql, args)
            }
            other => Err(QueryError::UnknownQuery(other.to_string()).into()),
        }
    }
}

/// `SELECT <member columns> FROM member m`, ready for a WHERE/ORDER BY suffix.
pub fn member_select_sql() -> String {
    format!(
        "SELECT {} FROM {} {}",
        select_columns::<Member>(),
        Member::TABLE,
        Member::ALIAS
    )
}

/// Runs `sql` (which must select the member columns first) and returns
/// managed handles, reusing any handle the unit of work already tracks.
pub fn query_members(
    uow: &UnitOfWork<'_>,
    sql: &str,
    params: &[Value],
) -> RepoResult<Vec<Managed<Member>>> {
    let rows = uow.query(sql, params, |row| Member::from_row(row, 0))?;
    rows.into_iter()
        .map(|member| uow.attach(member, false))
        .collect()
}
