use roster_core::db::open_db_in_memory;
use roster_core::{
    CrudRepository, Identifiable, Managed, Member, MemberDto, MemberRepository, QueryError,
    RepoError, Team, TeamRepository, UnitOfWork,
};
use roster_core::query::{ModifyingQuery, NamedQuery, QueryMethod, QueryRegistry};
use roster_core::repo::member_queries;
use rusqlite::types::Value;

fn save_member(repo: &MemberRepository<'_, '_>, username: &str, age: i32) -> Managed<Member> {
    let member = Managed::new(Member::with_age(username, age));
    repo.save(&member).unwrap();
    member
}

fn usernames(members: &[Managed<Member>]) -> Vec<String> {
    members
        .iter()
        .map(|member| member.borrow().username.clone())
        .collect()
}

#[test]
fn derived_query_combines_equality_and_greater_than() {
    let mut conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();
    let aaa10 = save_member(&repo, "AAA", 10);
    let aaa20 = save_member(&repo, "AAA", 20);

    let result = repo.find_by_username_and_age_greater_than("AAA", 15).unwrap();

    assert_eq!(result.len(), 1);
    assert!(result[0].same_instance(&aaa20));
    assert!(!result[0].same_instance(&aaa10));
    assert_eq!(result[0].borrow().age, 20);
}

#[test]
fn named_query_matches_by_username() {
    let mut conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();
    let aaa = save_member(&repo, "AAA", 10);
    save_member(&repo, "BBB", 20);

    let result = repo.find_by_username("AAA").unwrap();

    assert_eq!(usernames(&result), vec!["AAA"]);
    assert!(result[0].same_instance(&aaa));
}

#[test]
fn inline_query_binds_named_parameters() {
    let mut conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();
    let aaa = save_member(&repo, "AAA", 10);
    save_member(&repo, "AAA", 20);

    let result = repo.find_user("AAA", 10).unwrap();
    assert_eq!(result.len(), 1);
    assert!(result[0].same_instance(&aaa));

    assert!(repo.find_user("AAA", 11).unwrap().is_empty());
}

#[test]
fn result_shapes_follow_descriptors() {
    let mut conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();
    let aaa = save_member(&repo, "AAA", 10);
    save_member(&repo, "BBB", 20);

    assert!(repo.find_list_by_username("nobody").unwrap().is_empty());
    assert_eq!(repo.find_list_by_username("AAA").unwrap().len(), 1);

    let single = repo.find_member_by_username("AAA").unwrap().unwrap();
    assert!(single.same_instance(&aaa));
    assert!(repo.find_member_by_username("nobody").unwrap().is_none());

    let optional = repo.find_optional_by_username("BBB").unwrap();
    assert_eq!(optional.unwrap().borrow().age, 20);
    assert!(repo.find_optional_by_username("nobody").unwrap().is_none());
}

#[test]
fn single_result_with_two_matches_is_an_error() {
    let mut conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();
    save_member(&repo, "AAA", 10);
    save_member(&repo, "AAA", 20);

    let err = repo.find_optional_by_username("AAA").err().unwrap();
    assert!(matches!(
        err,
        RepoError::TooManyResults {
            expected: 1,
            actual: 2
        }
    ));
    assert!(repo.find_member_by_username("AAA").is_err());
}

#[test]
fn pending_changes_are_flushed_before_queries() {
    let mut conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();
    let member = save_member(&repo, "AAA", 10);

    member.borrow_mut().username = "renamed".to_string();

    let found = repo.find_list_by_username("renamed").unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].same_instance(&member));
    assert!(repo.find_list_by_username("AAA").unwrap().is_empty());
}

#[test]
fn username_list_projection_returns_plain_strings() {
    let mut conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();
    save_member(&repo, "AAA", 10);
    save_member(&repo, "BBB", 20);

    assert_eq!(repo.find_username_list().unwrap(), vec!["AAA", "BBB"]);
}

#[test]
fn dto_projection_joins_team_name() {
    let mut conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let teams = TeamRepository::try_new(&uow).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();

    let team = Managed::new(Team::new("teamA"));
    teams.save(&team).unwrap();
    let member = Member::with_team("AAA", 10, &team);
    repo.save(&member).unwrap();
    save_member(&repo, "loner", 30);

    let dtos = repo.find_member_dto().unwrap();
    assert_eq!(member.borrow().team_id(), team.borrow().id());
    assert_eq!(dtos.len(), 1);
    assert_eq!(dtos[0].username, "AAA");
    assert_eq!(dtos[0].team_name.as_deref(), Some("teamA"));
    assert_eq!(
        serde_json::to_value(&dtos[0]).unwrap()["teamName"],
        serde_json::json!("teamA")
    );
    assert_eq!(
        dtos,
        vec![MemberDto::new(dtos[0].id, "AAA", Some("teamA".to_string()))]
    );
}

#[test]
fn dispatch_rejects_unknown_names_and_bad_arity() {
    let mut conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();

    let err = repo.run("find_by_nickname", &[], None).err().unwrap();
    assert!(matches!(err, RepoError::Query(QueryError::UnknownQuery(_))));

    let err = repo
        .run("find_user", &[Value::Text("AAA".to_string())], None)
        .err()
        .unwrap();
    assert!(matches!(
        err,
        RepoError::Query(QueryError::ArgumentCount { .. })
    ));

    let err = repo
        .run("bulk_age_plus", &[Value::Integer(20)], None)
        .err()
        .unwrap();
    assert!(matches!(err, RepoError::Query(QueryError::WrongKind { .. })));
}

fn invalid_sql_query(err: RepoError) -> String {
    match err {
        RepoError::Query(QueryError::InvalidSql { query, message }) => {
            assert!(message.contains("no such column"), "{message}");
            query
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn misspelled_column_in_named_query_fails_when_repository_is_built() {
    let mut conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let mut registry = member_queries().unwrap();
    registry
        .register_named(NamedQuery::new("Member.typo", "usernme = :username"))
        .unwrap();
    registry
        .register(QueryMethod::named("find_typo", "Member.typo", &["username"]))
        .unwrap();

    let err = MemberRepository::with_registry(&uow, registry, None)
        .err()
        .unwrap();
    assert_eq!(invalid_sql_query(err), "find_typo");
}

#[test]
fn misspelled_column_in_inline_filter_fails_when_repository_is_built() {
    let mut conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let mut registry = QueryRegistry::<Member>::new();
    registry
        .register(QueryMethod::inline("find_by_age", "agee > :age", &["age"]))
        .unwrap();

    let err = MemberRepository::with_registry(&uow, registry, None)
        .err()
        .unwrap();
    assert_eq!(invalid_sql_query(err), "find_by_age");
}

#[test]
fn misspelled_column_in_bulk_update_fails_when_repository_is_built() {
    let mut conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let mut registry = member_queries().unwrap();
    registry
        .register_modifying(ModifyingQuery::new(
            "bulk_agee_plus",
            "UPDATE member SET agee = agee + 3 WHERE agee >= :age",
            &["age"],
        ))
        .unwrap();

    let err = MemberRepository::with_registry(&uow, registry, None)
        .err()
        .unwrap();
    assert_eq!(invalid_sql_query(err), "bulk_agee_plus");
    assert_eq!(uow.statement_count(), 0);
}
