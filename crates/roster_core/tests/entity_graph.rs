use roster_core::db::open_db_in_memory;
use roster_core::{
    Assoc, CrudRepository, Managed, Member, MemberRepository, Team, TeamRepository, UnitOfWork,
};
use rusqlite::Connection;

/// member1 and member3 in teamA, member2 in teamB, loner without team.
fn seed(conn: &mut Connection) {
    let uow = UnitOfWork::begin(conn).unwrap();
    let teams = TeamRepository::try_new(&uow).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();

    let team_a = Managed::new(Team::new("teamA"));
    let team_b = Managed::new(Team::new("teamB"));
    teams.save(&team_a).unwrap();
    teams.save(&team_b).unwrap();
    repo.save(&Member::with_team("member1", 10, &team_a)).unwrap();
    repo.save(&Member::with_team("member2", 10, &team_b)).unwrap();
    repo.save(&Member::with_team("member3", 20, &team_a)).unwrap();
    repo.save(&Managed::new(Member::with_age("loner", 30))).unwrap();
    uow.commit().unwrap();
}

fn loaded_team(member: &Managed<Member>) -> Option<Managed<Team>> {
    member.borrow().team().and_then(Assoc::loaded).cloned()
}

#[test]
fn lazy_association_costs_one_statement_per_distinct_team() {
    let mut conn = open_db_in_memory().unwrap();
    seed(&mut conn);

    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();

    let before = uow.statement_count();
    let members = repo.find_all().unwrap();
    assert_eq!(uow.statement_count() - before, 1);
    assert_eq!(members.len(), 4);
    assert!(members[..3]
        .iter()
        .all(|member| matches!(member.borrow().team(), Some(Assoc::Reference(_)))));

    let mut names = Vec::new();
    for member in &members {
        if let Some(team) = repo.load_team(member).unwrap() {
            names.push(team.borrow().name.clone());
        }
    }

    assert_eq!(names, vec!["teamA", "teamB", "teamA"]);
    assert_eq!(uow.statement_count() - before, 3);
    assert!(loaded_team(&members[0])
        .unwrap()
        .same_instance(&loaded_team(&members[2]).unwrap()));
}

#[test]
fn entity_graph_loads_teams_in_the_same_statement() {
    let mut conn = open_db_in_memory().unwrap();
    seed(&mut conn);

    for query in [
        "find_all_with_team",
        "find_members_fetch_join",
        "find_member_entity_graph",
    ] {
        let uow = UnitOfWork::begin(&mut conn).unwrap();
        let repo = MemberRepository::try_new(&uow).unwrap();

        let before = uow.statement_count();
        let members = repo.run(query, &[], None).unwrap().into_list();
        assert_eq!(uow.statement_count() - before, 1, "{query}");
        assert_eq!(members.len(), 4, "{query}");

        let team_a = loaded_team(&members[0]).unwrap();
        assert_eq!(team_a.borrow().name, "teamA");
        assert!(team_a.same_instance(&loaded_team(&members[2]).unwrap()));
        assert_eq!(team_a.borrow().members().len(), 2);
        assert_eq!(loaded_team(&members[1]).unwrap().borrow().name, "teamB");
        assert!(members[3].borrow().team().is_none());

        assert!(repo.load_team(&members[0]).unwrap().is_some());
        assert_eq!(uow.statement_count() - before, 1, "{query}");
    }
}

#[test]
fn entity_graph_applies_to_derived_filter() {
    let mut conn = open_db_in_memory().unwrap();
    seed(&mut conn);

    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();

    let members = repo.find_entity_graph_by_username("member2").unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(loaded_team(&members[0]).unwrap().borrow().name, "teamB");
}

#[test]
fn already_managed_team_is_resolved_without_a_statement() {
    let mut conn = open_db_in_memory().unwrap();
    seed(&mut conn);

    let uow = UnitOfWork::begin(&mut conn).unwrap();
    let teams = TeamRepository::try_new(&uow).unwrap();
    let repo = MemberRepository::try_new(&uow).unwrap();

    let team_a = teams.find_all().unwrap().remove(0);
    let member = repo.find_member_by_username("member1").unwrap().unwrap();
    assert!(loaded_team(&member).unwrap().same_instance(&team_a));

    let before = uow.statement_count();
    assert!(repo.load_team(&member).unwrap().unwrap().same_instance(&team_a));
    assert_eq!(uow.statement_count(), before);
}
