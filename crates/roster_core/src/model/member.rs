//! Member entity and the member/team association helper.
//!
//! # Invariants
//! - `team` is the owning side; `Team::members` only mirrors it in memory.
//! - After [`Managed::change_team`] the member appears exactly once in the new
//!   team's view and no longer in the previous loaded team's view.

use crate::model::audit::AuditFields;
use crate::model::managed::{Assoc, Managed};
use crate::model::team::{Team, TeamId};
use crate::model::Identifiable;
use std::fmt::{Display, Formatter};

/// Store-generated member identity (`member.member_id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(pub i64);

impl From<i64> for MemberId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<MemberId> for i64 {
    fn from(value: MemberId) -> Self {
        value.0
    }
}

impl Display for MemberId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
pub struct Member {
    id: Option<MemberId>,
    pub username: String,
    pub age: i32,
    team: Option<Assoc<Team>>,
    audit: AuditFields,
}

impl Member {
    /// Member with `age = 0` and no team.
    pub fn new(username: impl Into<String>) -> Self {
        Self::with_age(username, 0)
    }

    pub fn with_age(username: impl Into<String>, age: i32) -> Self {
        Self {
            id: None,
            username: username.into(),
            age,
            team: None,
            audit: AuditFields::default(),
        }
    }

    /// Builds a managed member already associated with `team` (both sides).
    pub fn with_team(username: impl Into<String>, age: i32, team: &Managed<Team>) -> Managed<Self> {
        let member = Managed::new(Self::with_age(username, age));
        member.change_team(team);
        member
    }

    pub(crate) fn restore(
        id: MemberId,
        username: String,
        age: i32,
        team_id: Option<TeamId>,
        audit: AuditFields,
    ) -> Self {
        Self {
            id: Some(id),
            username,
            age,
            team: team_id.map(Assoc::Reference),
            audit,
        }
    }

    pub fn team(&self) -> Option<&Assoc<Team>> {
        self.team.as_ref()
    }

    /// Foreign key as it would be persisted.
    pub fn team_id(&self) -> Option<TeamId> {
        self.team.as_ref().and_then(Assoc::id)
    }

    pub fn audit(&self) -> &AuditFields {
        &self.audit
    }

    pub(crate) fn audit_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }

    pub(crate) fn assign_id(&mut self, id: MemberId) {
        self.id = Some(id);
    }

    pub(crate) fn set_team_assoc(&mut self, team: Option<Assoc<Team>>) {
        self.team = team;
    }
}

impl Identifiable for Member {
    type Id = MemberId;

    fn id(&self) -> Option<MemberId> {
        self.id
    }
}

impl Display for Member {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.id {
            Some(id) => write!(
                f,
                "Member(id={id}, username={}, age={})",
                self.username, self.age
            ),
            None => write!(
                f,
                "Member(id=transient, username={}, age={})",
                self.username, self.age
            ),
        }
    }
}

impl Managed<Member> {
    /// Points this member at `team` and keeps both in-memory views consistent.
    ///
    /// Repeating the call with the same team is a no-op for the team's view.
    pub fn change_team(&self, team: &Managed<Team>) {
        let previous = self.previous_loaded_team();
        if let Some(previous) = previous {
            if !previous.same_instance(team) {
                previous.borrow_mut().unregister_member(self);
            }
        }
        self.borrow_mut()
            .set_team_assoc(Some(Assoc::Loaded(team.clone())));
        team.borrow_mut().register_member(self);
    }

    /// Clears the association and removes this member from the loaded team's view.
    pub fn leave_team(&self) {
        if let Some(previous) = self.previous_loaded_team() {
            previous.borrow_mut().unregister_member(self);
        }
        self.borrow_mut().set_team_assoc(None);
    }

    /// Upgrades `Assoc::Reference(id)` to the loaded `team` when ids match.
    ///
    /// Returns `false` when the member points elsewhere (or nowhere) in memory.
    pub(crate) fn resolve_team(&self, team: &Managed<Team>) -> bool {
        let team_id = team.borrow().id();
        let matches = match self.borrow().team() {
            Some(Assoc::Reference(id)) => Some(*id) == team_id,
            Some(Assoc::Loaded(current)) => return current.same_instance(team),
            None => false,
        };
        if !matches {
            return false;
        }
        self.borrow_mut()
            .set_team_assoc(Some(Assoc::Loaded(team.clone())));
        team.borrow_mut().register_member(self);
        true
    }

    fn previous_loaded_team(&self) -> Option<Managed<Team>> {
        self.borrow()
            .team()
            .and_then(Assoc::loaded)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::Member;
    use crate::model::managed::Managed;
    use crate::model::team::Team;

    #[test]
    fn repeated_change_team_registers_member_once() {
        let team = Managed::new(Team::new("FC Bar"));
        let member = Managed::new(Member::with_age("aa", 10));

        member.change_team(&team);
        member.change_team(&team);

        let members = team.borrow().members();
        assert_eq!(members.len(), 1);
        assert!(members[0].same_instance(&member));
    }

    #[test]
    fn moving_between_teams_updates_both_views() {
        let team_a = Managed::new(Team::new("FC Bar"));
        let team_b = Managed::new(Team::new("FC Real"));
        let member = Member::with_team("aa", 10, &team_a);

        member.change_team(&team_b);

        assert!(team_a.borrow().members().is_empty());
        assert_eq!(team_b.borrow().members().len(), 1);
        let current = member.borrow().team().and_then(|assoc| assoc.loaded().cloned());
        assert!(current.unwrap().same_instance(&team_b));
    }

    #[test]
    fn leave_team_clears_both_sides() {
        let team = Managed::new(Team::new("FC Bar"));
        let member = Member::with_team("aa", 10, &team);

        member.leave_team();

        assert!(member.borrow().team().is_none());
        assert!(team.borrow().members().is_empty());
    }

    #[test]
    fn dropped_members_disappear_from_team_view() {
        let team = Managed::new(Team::new("FC Bar"));
        {
            let _member = Member::with_team("aa", 10, &team);
        }
        assert!(team.borrow().members().is_empty());
    }
}
