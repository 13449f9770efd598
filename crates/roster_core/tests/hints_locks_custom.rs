use roster_core::db::{open_db, open_db_in_memory};
use roster_core::repo::{member_queries, member_select_sql, query_members};
use roster_core::{
    CrudRepository, Managed, Member, MemberRepository, MemberRepositoryCustom, RepoResult,
    UnitOfWork,
};
use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode};
use std::path::Path;
use std::time::Duration;

fn seed(conn: &mut Connection, members: &[(&str, i32)]) {
    let uow = UnitOfWork::begin(conn).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();
    for (name, age) in members {
        repo.save(&Managed::new(Member::with_age(*name, *age))).unwrap();
    }
    uow.commit().unwrap();
}

#[test]
fn read_only_result_is_not_flushed() {
    let mut conn = open_db_in_memory().unwrap();
    seed(&mut conn, &[("member1", 10)]);

    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();
    let member = repo.find_read_only_by_username("member1").unwrap().unwrap();
    member.borrow_mut().username = "member2".to_string();
    assert_eq!(uow.flush().unwrap(), 0);
    uow.commit().unwrap();

    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();
    assert!(repo.find_member_by_username("member1").unwrap().is_some());
    assert!(repo.find_member_by_username("member2").unwrap().is_none());
}

#[test]
fn read_only_hint_does_not_untrack_a_managed_member() {
    let mut conn = open_db_in_memory().unwrap();
    seed(&mut conn, &[("member1", 10)]);

    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();
    let tracked = repo.find_member_by_username("member1").unwrap().unwrap();
    let read_only = repo.find_read_only_by_username("member1").unwrap().unwrap();
    assert!(read_only.same_instance(&tracked));

    read_only.borrow_mut().age = 11;
    assert_eq!(uow.flush().unwrap(), 1);
}

#[test]
fn lock_query_touches_rows_before_reading() {
    let mut conn = open_db_in_memory().unwrap();
    seed(&mut conn, &[("member1", 10), ("member2", 20)]);

    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();

    let before = uow.statement_count();
    let locked = repo.find_lock_by_username("member1").unwrap();
    assert_eq!(uow.statement_count() - before, 2);
    assert_eq!(locked.len(), 1);
    assert_eq!(locked[0].borrow().age, 10);
}

/// Second connection to the same file that gives up on a lock after 50 ms.
fn impatient_writer(path: &Path) -> Connection {
    let conn = Connection::open(path).unwrap();
    conn.busy_timeout(Duration::from_millis(50)).unwrap();
    conn
}

fn assert_busy(result: rusqlite::Result<usize>) {
    match result {
        Err(rusqlite::Error::SqliteFailure(err, _)) => {
            assert_eq!(err.code, ErrorCode::DatabaseBusy)
        }
        other => panic!("expected a busy database, got {other:?}"),
    }
}

#[test]
fn lock_query_blocks_other_writers_until_commit() {
    for username in ["member1", "nobody"] {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.db");
        let mut conn = open_db(&path).unwrap();
        seed(&mut conn, &[("member1", 10), ("member2", 20)]);
        let other = impatient_writer(&path);

        let uow = UnitOfWork::begin(&mut conn).unwrap();
        let repo = MemberRepository::try_new(&uow).unwrap();
        repo.find_lock_by_username(username).unwrap();

        assert_busy(other.execute("UPDATE member SET age = 99 WHERE username = 'member2';", []));
        assert_busy(other.execute(
            "INSERT INTO member (username, age, created_date, updated_date) VALUES ('x', 1, 0, 0);",
            [],
        ));

        uow.commit().unwrap();
        assert_eq!(
            other
                .execute("UPDATE member SET age = 99 WHERE username = 'member2';", [])
                .unwrap(),
            1
        );
    }
}

#[test]
fn default_custom_implementation_lists_every_member() {
    let mut conn = open_db_in_memory().unwrap();
    seed(&mut conn, &[("member1", 10), ("member2", 20)]);

    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();
    assert!(repo.registry().is_custom("find_member_custom"));

    let first = repo.find_member_by_username("member1").unwrap().unwrap();
    let members = repo.find_member_custom().unwrap();
    assert_eq!(members.len(), 2);
    assert!(members[0].same_instance(&first));
}

/// Answers `find_by_username` with members at least as old as the argument.
struct AgeFloor;

impl MemberRepositoryCustom for AgeFloor {
    fn operations(&self) -> &[&'static str] {
        &["find_by_username"]
    }

    fn execute(
        &self,
        _operation: &str,
        uow: &UnitOfWork<'_>,
        _args: &[Value],
    ) -> RepoResult<Vec<Managed<Member>>> {
        let sql = format!(
            "{} WHERE m.age >= ?1 ORDER BY m.member_id ASC;",
            member_select_sql()
        );
        query_members(uow, &sql, &[Value::Integer(15)])
    }
}

#[test]
fn custom_implementation_overrides_declared_query() {
    let mut conn = open_db_in_memory().unwrap();
    seed(&mut conn, &[("member1", 10), ("member2", 20)]);

    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::with_custom(&uow, AgeFloor).unwrap();

    let found = repo.find_by_username("member1").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].borrow().username, "member2");

    assert!(repo.find_member_custom().is_err());
}

#[test]
fn assembled_registry_without_custom_keeps_declared_queries() {
    let mut conn = open_db_in_memory().unwrap();
    seed(&mut conn, &[("member1", 10), ("member2", 20)]);

    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::with_registry(&uow, member_queries().unwrap(), None).unwrap();

    assert!(!repo.registry().is_custom("find_by_username"));
    assert_eq!(repo.find_by_username("member1").unwrap().len(), 1);
    assert!(repo.find_member_custom().is_err());
}
