//! Team entity.

use crate::model::audit::AuditFields;
use crate::model::managed::{Managed, WeakManaged};
use crate::model::member::Member;
use crate::model::Identifiable;
use std::fmt::{Display, Formatter};

/// Store-generated team identity (`team.team_id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TeamId(pub i64);

impl From<i64> for TeamId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<TeamId> for i64 {
    fn from(value: TeamId) -> Self {
        value.0
    }
}

impl Display for TeamId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
pub struct Team {
    id: Option<TeamId>,
    pub name: String,
    /// Inverse side of `Member::team`. Holds members this process has associated
    /// or loaded; it is never written to the store.
    members: Vec<WeakManaged<Member>>,
    audit: AuditFields,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            members: Vec::new(),
            audit: AuditFields::default(),
        }
    }

    pub(crate) fn restore(id: TeamId, name: String, audit: AuditFields) -> Self {
        Self {
            id: Some(id),
            name,
            members: Vec::new(),
            audit,
        }
    }

    /// Live members currently registered on this team's in-memory view.
    pub fn members(&self) -> Vec<Managed<Member>> {
        self.members.iter().filter_map(WeakManaged::upgrade).collect()
    }

    pub fn audit(&self) -> &AuditFields {
        &self.audit
    }

    pub(crate) fn audit_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }

    pub(crate) fn assign_id(&mut self, id: TeamId) {
        self.id = Some(id);
    }

    /// Adds `member` unless it is already present. Dead entries are pruned.
    pub(crate) fn register_member(&mut self, member: &Managed<Member>) {
        self.members.retain(WeakManaged::is_alive);
        if !self.members.iter().any(|entry| entry.points_to(member)) {
            self.members.push(member.downgrade());
        }
    }

    pub(crate) fn unregister_member(&mut self, member: &Managed<Member>) {
        self.members
            .retain(|entry| entry.is_alive() && !entry.points_to(member));
    }
}

impl Identifiable for Team {
    type Id = TeamId;

    fn id(&self) -> Option<TeamId> {
        self.id
    }
}

impl Display for Team {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.id {
            Some(id) => write!(f, "Team(id={id}, name={})", self.name),
            None => write!(f, "Team(id=transient, name={})", self.name),
        }
    }
}
