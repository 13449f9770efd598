use roster_core::db::open_db_in_memory;
use roster_core::{
    CrudRepository, FlushMode, Managed, Member, MemberRepository, Team, TeamRepository, UnitOfWork,
};

#[test]
fn commit_flush_mode_defers_writes_until_commit() {
    let mut conn = open_db_in_memory().unwrap();

    let uow = UnitOfWork::begin(&mut conn)
        .unwrap()
        .with_flush_mode(FlushMode::Commit);
    let repo = MemberRepository::try_new(&uow).unwrap();
    let member = Managed::new(Member::with_age("member1", 10));
    repo.save(&member).unwrap();

    member.borrow_mut().username = "renamed".to_string();
    assert!(repo.find_list_by_username("renamed").unwrap().is_empty());
    uow.commit().unwrap();

    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();
    assert_eq!(repo.find_list_by_username("renamed").unwrap().len(), 1);
}

#[test]
fn explicit_rollback_discards_inserts() {
    let mut conn = open_db_in_memory().unwrap();

    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let teams = TeamRepository::try_new(&uow).unwrap();
    teams.save(&Managed::new(Team::new("teamA"))).unwrap();
    assert_eq!(uow.managed_count(), 1);
    uow.rollback().unwrap();

    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let teams = TeamRepository::try_new(&uow).unwrap();
    assert_eq!(teams.count().unwrap(), 0);
}

#[test]
fn clear_discards_pending_changes() {
    let mut conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();
    let member = Managed::new(Member::with_age("member1", 10));
    repo.save(&member).unwrap();

    member.borrow_mut().age = 99;
    uow.clear();

    assert_eq!(uow.managed_count(), 0);
    assert_eq!(uow.flush().unwrap(), 0);
    let reloaded = repo.find_member_by_username("member1").unwrap().unwrap();
    assert_eq!(reloaded.borrow().age, 10);
}

#[test]
fn detached_member_is_reloaded_as_new_instance() {
    let mut conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();
    let member = Managed::new(Member::with_age("member1", 10));
    repo.save(&member).unwrap();

    assert!(uow.detach(&member));
    assert!(!uow.detach(&member));
    assert!(!uow.contains(&member));

    let reloaded = repo.find_member_by_username("member1").unwrap().unwrap();
    assert!(!reloaded.same_instance(&member));
    assert!(uow.contains(&reloaded));
}

#[test]
fn every_statement_is_counted() {
    let mut conn = open_db_in_memory().unwrap();
    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();
    assert_eq!(uow.statement_count(), 0);

    repo.save(&Managed::new(Member::new("member1"))).unwrap();
    assert_eq!(uow.statement_count(), 1);

    repo.count().unwrap();
    assert_eq!(uow.statement_count(), 2);
}
