//! Member repository: CRUD plus the declared member queries.
//!
//! # Responsibility
//! - Register every member query once, at construction, so a malformed
//!   descriptor fails before any call.
//! - Dispatch by name to a custom implementation, a declared read or a bulk write.
//! - Load the `team` association either in the same statement (entity graph)
//!   or on demand through [`MemberRepository::load_team`].
//!
//! # Invariants
//! - A member read never returns two handles for one id within a unit of work.
//! - Single-result reads fail with `TooManyResults` instead of picking a row.
//! - Bulk writes never touch managed handles; only `clear` refreshes them.

use crate::dto::MemberDto;
use crate::model::managed::{Assoc, Managed};
use crate::model::member::{Member, MemberId};
use crate::model::team::Team;
use crate::paging::{Page, PageRequest, PagingError, Slice, Sort};
use crate::query::{
    LockMode, ModifyingQuery, NamedQuery, PreparedQuery, QueryError, QueryMethod, QueryRegistry,
    QueryResult, Resolved, ResultShape,
};
use crate::repo::crud::{order_by_clause, window_clause, CrudRepository, SqliteRepository};
use crate::repo::entity::{column_count, select_columns, Entity};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::member_custom::{MemberRepositoryCustom, MemberRepositoryImpl};
use crate::repo::unit_of_work::UnitOfWork;
use log::{error, info};
use rusqlite::types::Value;

/// Result of a dispatched member read, shaped by its descriptor.
#[derive(Debug)]
pub enum QueryOutput<T> {
    List(Vec<T>),
    Single(Option<T>),
    Page(Page<T>),
    Slice(Slice<T>),
}

impl<T> QueryOutput<T> {
    pub fn into_list(self) -> Vec<T> {
        match self {
            Self::List(items) => items,
            Self::Single(item) => item.into_iter().collect(),
            Self::Page(page) => page.into_content(),
            Self::Slice(slice) => slice.into_content(),
        }
    }

    /// At most one element; more is `TooManyResults`.
    pub fn into_single(self) -> RepoResult<Option<T>> {
        match self {
            Self::Single(item) => Ok(item),
            other => single_result(other.into_list()),
        }
    }

    pub fn into_page(self, query: &str) -> RepoResult<Page<T>> {
        match self {
            Self::Page(page) => Ok(page),
            other => Err(shape_mismatch(query, ResultShape::Page, &other).into()),
        }
    }

    pub fn into_slice(self, query: &str) -> RepoResult<Slice<T>> {
        match self {
            Self::Slice(slice) => Ok(slice),
            other => Err(shape_mismatch(query, ResultShape::Slice, &other).into()),
        }
    }

    fn shape(&self) -> ResultShape {
        match self {
            Self::List(_) => ResultShape::List,
            Self::Single(_) => ResultShape::Single,
            Self::Page(_) => ResultShape::Page,
            Self::Slice(_) => ResultShape::Slice,
        }
    }
}

fn shape_mismatch<T>(query: &str, expected: ResultShape, actual: &QueryOutput<T>) -> QueryError {
    QueryError::ShapeMismatch {
        query: query.to_string(),
        expected,
        actual: actual.shape(),
    }
}

fn single_result<T>(mut items: Vec<T>) -> RepoResult<Option<T>> {
    if items.len() > 1 {
        return Err(RepoError::TooManyResults {
            expected: 1,
            actual: items.len(),
        });
    }
    Ok(items.pop())
}

/// Named query templates and query methods of the member repository.
pub fn member_queries() -> QueryResult<QueryRegistry<Member>> {
    let mut registry = QueryRegistry::new();

    registry.register_named(NamedQuery::new(
        "Member.findByUsername2",
        "m.username = :username",
    ))?;

    registry.register(QueryMethod::from_method_name(
        "find_by_username_and_age_greater_than",
    )?)?;
    registry.register(QueryMethod::named(
        "find_by_username",
        "Member.findByUsername2",
        &["username"],
    ))?;
    registry.register(QueryMethod::inline(
        "find_user",
        "m.username = :username AND m.age = :age",
        &["username", "age"],
    ))?;

    registry.register(QueryMethod::from_method_name("find_list_by_username")?)?;
    registry.register(
        QueryMethod::from_method_name("find_member_by_username")?.returning(ResultShape::Single),
    )?;
    registry.register(
        QueryMethod::from_method_name("find_optional_by_username")?
            .returning(ResultShape::Optional),
    )?;

    registry.register(
        QueryMethod::from_method_name("find_join_by_age")?.returning(ResultShape::Page),
    )?;
    registry.register(
        QueryMethod::from_method_name("find_slice_by_age")?.returning(ResultShape::Slice),
    )?;

    for name in [
        "find_all_with_team",
        "find_members_fetch_join",
        "find_member_entity_graph",
    ] {
        registry.register(QueryMethod::all(name).with_entity_graph(&["team"]))?;
    }
    registry.register(
        QueryMethod::from_method_name("find_entity_graph_by_username")?
            .with_entity_graph(&["team"]),
    )?;

    registry.register(
        QueryMethod::from_method_name("find_read_only_by_username")?
            .returning(ResultShape::Single)
            .read_only(),
    )?;
    registry.register(
        QueryMethod::from_method_name("find_lock_by_username")?.lock(LockMode::PessimisticWrite),
    )?;

    registry.register_modifying(ModifyingQuery::new(
        "bulk_age_plus",
        "UPDATE member SET age = age + 3 WHERE age >= :age",
        &["age"],
    ))?;
    registry.register_modifying(
        ModifyingQuery::new(
            "bulk_age_plus_clear",
            "UPDATE member SET age = age + 3 WHERE age >= :age",
            &["age"],
        )
        .clear_automatically(true),
    )?;

    Ok(registry)
}

pub struct MemberRepository<'u, 'conn> {
    members: SqliteRepository<'u, 'conn, Member>,
    teams: SqliteRepository<'u, 'conn, Team>,
    registry: QueryRegistry<Member>,
    custom: Option<Box<dyn MemberRepositoryCustom>>,
}

impl<'u, 'conn> MemberRepository<'u, 'conn> {
    /// Creates repository, compiles every member query and attaches
    /// [`MemberRepositoryImpl`].
    pub fn try_new(uow: &'u UnitOfWork<'conn>) -> RepoResult<Self> {
        Self::build(uow, member_queries()?, Some(Box::new(MemberRepositoryImpl)))
    }

    /// Same as [`MemberRepository::try_new`], routing the operations `custom`
    /// declares to it instead of [`MemberRepositoryImpl`].
    pub fn with_custom(
        uow: &'u UnitOfWork<'conn>,
        custom: impl MemberRepositoryCustom + 'static,
    ) -> RepoResult<Self> {
        Self::build(uow, member_queries()?, Some(Box::new(custom)))
    }

    /// Builds the repository over a caller-assembled registry.
    pub fn with_registry(
        uow: &'u UnitOfWork<'conn>,
        registry: QueryRegistry<Member>,
        custom: Option<Box<dyn MemberRepositoryCustom>>,
    ) -> RepoResult<Self> {
        Self::build(uow, registry, custom)
    }

    fn build(
        uow: &'u UnitOfWork<'conn>,
        mut registry: QueryRegistry<Member>,
        custom: Option<Box<dyn MemberRepositoryCustom>>,
    ) -> RepoResult<Self> {
        let members = SqliteRepository::try_new(uow)?;
        let teams = SqliteRepository::try_new(uow)?;
        check_compiled_sql(uow, &registry)?;

        if let Some(custom) = &custom {
            for operation in custom.operations() {
                registry.register_custom(operation);
            }
        }
        info!(
            "event=repo_init module=repo status=ok entity=Member queries={} custom={}",
            registry.len(),
            custom.is_some()
        );

        Ok(Self {
            members,
            teams,
            registry,
            custom,
        })
    }

    pub fn registry(&self) -> &QueryRegistry<Member> {
        &self.registry
    }

    fn uow(&self) -> &'u UnitOfWork<'conn> {
        self.members.unit_of_work()
    }

    /// Runs the read registered as `name`. `page` is required for page and
    /// slice queries and ignored otherwise.
    pub fn run(
        &self,
        name: &str,
        args: &[Value],
        page: Option<&PageRequest>,
    ) -> RepoResult<QueryOutput<Managed<Member>>> {
        match self.registry.resolve(name)? {
            Resolved::Custom => {
                let custom = self
                    .custom
                    .as_ref()
                    .ok_or_else(|| QueryError::UnknownQuery(name.to_string()))?;
                self.uow().auto_flush()?;
                Ok(QueryOutput::List(custom.execute(name, self.uow(), args)?))
            }
            Resolved::Declared(query) => self.run_declared(query, args, page),
            Resolved::Modifying(_) => Err(QueryError::WrongKind {
                query: name.to_string(),
                expected: "read",
            }
            .into()),
        }
    }

    /// Runs the bulk write registered as `name`. Returns affected rows.
    pub fn run_modifying(&self, name: &str, args: &[Value]) -> RepoResult<usize> {
        let Resolved::Modifying(query) = self.registry.resolve(name)? else {
            return Err(QueryError::WrongKind {
                query: name.to_string(),
                expected: "modifying",
            }
            .into());
        };
        check_arguments(query.name(), query.param_count(), args)?;

        let uow = self.uow();
        uow.auto_flush()?;
        let affected = uow.execute(query.sql(), args)?;
        if query.clears_automatically() {
            uow.clear();
        }
        info!(
            "event=bulk_update module=repo status=ok query={} affected={affected} cleared={}",
            query.name(),
            query.clears_automatically()
        );
        Ok(affected)
    }

    fn run_declared(
        &self,
        query: &PreparedQuery,
        args: &[Value],
        page: Option<&PageRequest>,
    ) -> RepoResult<QueryOutput<Managed<Member>>> {
        check_arguments(query.name(), query.param_count(), args)?;
        let uow = self.uow();
        uow.auto_flush()?;

        let where_clause = where_clause(query);
        if query.lock_mode() == LockMode::PessimisticWrite {
            self.acquire_write_lock(query.name(), &where_clause, args)?;
        }

        let fetch_team = query.fetches("team");
        let select = select_clause(fetch_team);

        match query.shape() {
            ResultShape::List | ResultShape::Single | ResultShape::Optional => {
                let sql = format!("{select}{where_clause} ORDER BY m.member_id ASC;");
                let members = self.load(&sql, args, fetch_team, query.is_read_only())?;
                if query.shape() == ResultShape::List {
                    Ok(QueryOutput::List(members))
                } else {
                    Ok(QueryOutput::Single(single_result(members)?))
                }
            }
            ResultShape::Page => {
                let request = require_page(query.name(), page)?;
                let order_by = order_by_clause::<Member>(request.sort())?;
                let offset = request.offset()?;
                let mut params = args.to_vec();
                let window = window_clause(&mut params, request.size(), offset);
                let sql = format!("{select}{where_clause}{order_by}{window};");
                let content = self.load(&sql, &params, fetch_team, query.is_read_only())?;

                let count_sql = format!("SELECT COUNT(*) FROM member m{where_clause};");
                let total = uow.query_count(&count_sql, args)?;
                Ok(QueryOutput::Page(Page::new(content, request, total)))
            }
            ResultShape::Slice => {
                let request = require_page(query.name(), page)?;
                let order_by = order_by_clause::<Member>(request.sort())?;
                let offset = request.offset()?;
                let mut params = args.to_vec();
                let window =
                    window_clause(&mut params, request.size().saturating_add(1), offset);
                let sql = format!("{select}{where_clause}{order_by}{window};");
                let fetched = self.load(&sql, &params, fetch_team, query.is_read_only())?;
                Ok(QueryOutput::Slice(Slice::from_lookahead(fetched, request)))
            }
        }
    }

    /// Takes the database write lock by touching the matched rows.
    fn acquire_write_lock(
        &self,
        query: &str,
        where_clause: &str,
        args: &[Value],
    ) -> RepoResult<()> {
        let sql = lock_sql(where_clause);
        let locked = self.uow().execute(&sql, args)?;
        info!(
            "event=lock_acquire module=repo status=ok query={query} mode=pessimistic_write rows={locked}"
        );
        Ok(())
    }

    fn load(
        &self,
        sql: &str,
        params: &[Value],
        fetch_team: bool,
        read_only: bool,
    ) -> RepoResult<Vec<Managed<Member>>> {
        let uow = self.uow();
        let team_offset = column_count::<Member>();
        let rows = uow.query(sql, params, |row| {
            let member = Member::from_row(row, 0)?;
            let team = if fetch_team && row.get::<_, Option<i64>>(team_offset)?.is_some() {
                Some(Team::from_row(row, team_offset)?)
            } else {
                None
            };
            Ok((member, team))
        })?;

        let mut members = Vec::with_capacity(rows.len());
        for (member, team) in rows {
            let handle = uow.attach(member, read_only)?;
            let team_id = handle.borrow().team_id();
            match (team, team_id) {
                (Some(team), _) => {
                    let team = uow.attach(team, read_only)?;
                    handle.resolve_team(&team);
                }
                (None, Some(team_id)) => {
                    if let Some(team) = Team::identity_map(uow).get(team_id) {
                        handle.resolve_team(&team);
                    }
                }
                (None, None) => {}
            }
            members.push(handle);
        }
        Ok(members)
    }

    /// Resolves the member's team, issuing one lookup when it is not yet loaded.
    pub fn load_team(&self, member: &Managed<Member>) -> RepoResult<Option<Managed<Team>>> {
        let assoc = member.borrow().team().cloned();
        match assoc {
            None => Ok(None),
            Some(Assoc::Loaded(team)) => Ok(Some(team)),
            Some(Assoc::Reference(team_id)) => {
                let team = self.teams.find_by_id(team_id)?.ok_or_else(|| {
                    RepoError::InvalidData(format!(
                        "member references missing team {team_id} in member.team_id"
                    ))
                })?;
                member.resolve_team(&team);
                Ok(Some(team))
            }
        }
    }

    pub fn find_by_username_and_age_greater_than(
        &self,
        username: &str,
        age: i32,
    ) -> RepoResult<Vec<Managed<Member>>> {
        self.list("find_by_username_and_age_greater_than", &[text(username), int(age)])
    }

    /// Uses the `Member.findByUsername2` named query.
    pub fn find_by_username(&self, username: &str) -> RepoResult<Vec<Managed<Member>>> {
        self.list("find_by_username", &[text(username)])
    }

    pub fn find_user(&self, username: &str, age: i32) -> RepoResult<Vec<Managed<Member>>> {
        self.list("find_user", &[text(username), int(age)])
    }

    /// Empty when nothing matches.
    pub fn find_list_by_username(&self, username: &str) -> RepoResult<Vec<Managed<Member>>> {
        self.list("find_list_by_username", &[text(username)])
    }

    pub fn find_member_by_username(&self, username: &str) -> RepoResult<Option<Managed<Member>>> {
        self.single("find_member_by_username", &[text(username)])
    }

    pub fn find_optional_by_username(
        &self,
        username: &str,
    ) -> RepoResult<Option<Managed<Member>>> {
        self.single("find_optional_by_username", &[text(username)])
    }

    pub fn find_join_by_age(
        &self,
        age: i32,
        request: &PageRequest,
    ) -> RepoResult<Page<Managed<Member>>> {
        self.run("find_join_by_age", &[int(age)], Some(request))?
            .into_page("find_join_by_age")
    }

    /// Window without total count.
    pub fn find_slice_by_age(
        &self,
        age: i32,
        request: &PageRequest,
    ) -> RepoResult<Slice<Managed<Member>>> {
        self.run("find_slice_by_age", &[int(age)], Some(request))?
            .into_slice("find_slice_by_age")
    }

    pub fn find_all_with_team(&self) -> RepoResult<Vec<Managed<Member>>> {
        self.list("find_all_with_team", &[])
    }

    pub fn find_members_fetch_join(&self) -> RepoResult<Vec<Managed<Member>>> {
        self.list("find_members_fetch_join", &[])
    }

    pub fn find_member_entity_graph(&self) -> RepoResult<Vec<Managed<Member>>> {
        self.list("find_member_entity_graph", &[])
    }

    pub fn find_entity_graph_by_username(
        &self,
        username: &str,
    ) -> RepoResult<Vec<Managed<Member>>> {
        self.list("find_entity_graph_by_username", &[text(username)])
    }

    /// Loaded member is not tracked for changes unless it was already managed.
    pub fn find_read_only_by_username(
        &self,
        username: &str,
    ) -> RepoResult<Option<Managed<Member>>> {
        self.single("find_read_only_by_username", &[text(username)])
    }

    pub fn find_lock_by_username(&self, username: &str) -> RepoResult<Vec<Managed<Member>>> {
        self.list("find_lock_by_username", &[text(username)])
    }

    /// Served by the attached custom implementation.
    pub fn find_member_custom(&self) -> RepoResult<Vec<Managed<Member>>> {
        self.list("find_member_custom", &[])
    }

    /// `age = age + 3` for every member with `age >= age`. Managed handles
    /// keep their old age until the unit of work is cleared.
    pub fn bulk_age_plus(&self, age: i32) -> RepoResult<usize> {
        self.run_modifying("bulk_age_plus", &[int(age)])
    }

    /// [`MemberRepository::bulk_age_plus`] followed by clearing the unit of work.
    pub fn bulk_age_plus_clear(&self, age: i32) -> RepoResult<usize> {
        self.run_modifying("bulk_age_plus_clear", &[int(age)])
    }

    pub fn find_username_list(&self) -> RepoResult<Vec<String>> {
        let uow = self.uow();
        uow.auto_flush()?;
        uow.query(
            "SELECT m.username FROM member m ORDER BY m.member_id ASC;",
            &[],
            |row| Ok(row.get(0)?),
        )
    }

    /// Members with a team, projected with the team name.
    pub fn find_member_dto(&self) -> RepoResult<Vec<MemberDto>> {
        let uow = self.uow();
        uow.auto_flush()?;
        uow.query(
            "SELECT m.member_id, m.username, t.name
             FROM member m
             JOIN team t ON t.team_id = m.team_id
             ORDER BY m.member_id ASC;",
            &[],
            |row| {
                Ok(MemberDto::new(
                    row.get(0)?,
                    row.get::<_, String>(1)?,
                    Some(row.get(2)?),
                ))
            },
        )
    }

    fn list(&self, name: &str, args: &[Value]) -> RepoResult<Vec<Managed<Member>>> {
        Ok(self.run(name, args, None)?.into_list())
    }

    fn single(&self, name: &str, args: &[Value]) -> RepoResult<Option<Managed<Member>>> {
        self.run(name, args, None)?.into_single()
    }
}

impl CrudRepository<Member> for MemberRepository<'_, '_> {
    fn save(&self, entity: &Managed<Member>) -> RepoResult<Managed<Member>> {
        self.members.save(entity)
    }

    fn find_by_id(&self, id: MemberId) -> RepoResult<Option<Managed<Member>>> {
        self.members.find_by_id(id)
    }

    fn exists_by_id(&self, id: MemberId) -> RepoResult<bool> {
        self.members.exists_by_id(id)
    }

    fn find_all(&self) -> RepoResult<Vec<Managed<Member>>> {
        self.members.find_all()
    }

    fn find_all_sorted(&self, sort: &Sort) -> RepoResult<Vec<Managed<Member>>> {
        self.members.find_all_sorted(sort)
    }

    fn find_all_paged(&self, request: &PageRequest) -> RepoResult<Page<Managed<Member>>> {
        self.members.find_all_paged(request)
    }

    fn delete(&self, entity: &Managed<Member>) -> RepoResult<()> {
        self.members.delete(entity)
    }

    fn delete_by_id(&self, id: MemberId) -> RepoResult<()> {
        self.members.delete_by_id(id)
    }

    fn count(&self) -> RepoResult<u64> {
        self.members.count()
    }
}

fn where_clause(query: &PreparedQuery) -> String {
    query
        .filter_sql()
        .map(|filter| format!(" WHERE {filter}"))
        .unwrap_or_default()
}

fn select_clause(fetch_team: bool) -> String {
    if fetch_team {
        format!(
            "SELECT {}, {} FROM member m LEFT JOIN team t ON t.team_id = m.team_id",
            select_columns::<Member>(),
            select_columns::<Team>()
        )
    } else {
        format!("SELECT {} FROM member m", select_columns::<Member>())
    }
}

fn lock_sql(where_clause: &str) -> String {
    format!(
        "UPDATE member SET member_id = member_id
         WHERE member_id IN (SELECT m.member_id FROM member m{where_clause});"
    )
}

/// Prepares, without running, every statement the registry can dispatch.
fn check_compiled_sql(uow: &UnitOfWork<'_>, registry: &QueryRegistry<Member>) -> RepoResult<()> {
    for query in registry.declared() {
        let where_clause = where_clause(query);
        let read = format!("{}{where_clause};", select_clause(query.fetches("team")));
        prepare_only(uow, query.name(), &read)?;
        if query.lock_mode() == LockMode::PessimisticWrite {
            prepare_only(uow, query.name(), &lock_sql(&where_clause))?;
        }
    }
    for query in registry.modifying_queries() {
        prepare_only(uow, query.name(), query.sql())?;
    }
    Ok(())
}

fn prepare_only(uow: &UnitOfWork<'_>, query: &str, sql: &str) -> RepoResult<()> {
    match uow.connection().prepare(sql) {
        Ok(_) => Ok(()),
        Err(err) => {
            error!(
                "event=repo_init module=repo status=error entity=Member query={query} error={err}"
            );
            Err(QueryError::InvalidSql {
                query: query.to_string(),
                message: err.to_string(),
            }
            .into())
        }
    }
}

fn check_arguments(query: &str, expected: usize, args: &[Value]) -> RepoResult<()> {
    if args.len() != expected {
        return Err(QueryError::ArgumentCount {
            query: query.to_string(),
            expected,
            actual: args.len(),
        }
        .into());
    }
    Ok(())
}

fn require_page<'p>(query: &str, page: Option<&'p PageRequest>) -> RepoResult<&'p PageRequest> {
    page.ok_or_else(|| PagingError::MissingPageRequest(query.to_string()).into())
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn int(value: i32) -> Value {
    Value::Integer(i64::from(value))
}

#[cfg(test)]
mod tests {
    use super::{member_queries, single_result, QueryOutput};
    use crate::repo::error::RepoError;

    #[test]
    fn every_member_query_registers() {
        let registry = member_queries().unwrap();
        for name in [
            "find_by_username_and_age_greater_than",
            "find_by_username",
            "find_user",
            "find_join_by_age",
            "find_slice_by_age",
            "find_lock_by_username",
            "bulk_age_plus",
        ] {
            assert!(registry.contains(name), "{name}");
        }
    }

    #[test]
    fn single_result_rejects_multiple_rows() {
        assert_eq!(single_result(vec![7]).unwrap(), Some(7));
        assert_eq!(single_result(Vec::<i32>::new()).unwrap(), None);
        assert!(matches!(
            single_result(vec![1, 2]),
            Err(RepoError::TooManyResults {
                expected: 1,
                actual: 2
            })
        ));
    }

    #[test]
    fn list_output_converts_to_single_with_cardinality_check() {
        assert!(QueryOutput::List(vec![1, 2]).into_single().is_err());
        assert_eq!(QueryOutput::Single(Some(3)).into_list(), vec![3]);
    }
}
