//! Table mapping for persisted entities.
//!
//! # Invariants
//! - Selected columns are always `id` followed by `COLUMNS`, in order; row
//!   readers address them by position from a caller-supplied offset.
//! - `column_values` returns exactly `COLUMNS.len()` values in `COLUMNS` order.

use crate::model::audit::AuditFields;
use crate::model::managed::{Assoc, Managed};
use crate::model::member::{Member, MemberId};
use crate::model::team::{Team, TeamId};
use crate::model::Identifiable;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::identity_map::IdentityMap;
use crate::repo::unit_of_work::UnitOfWork;
use rusqlite::types::Value;
use rusqlite::Row;
use std::fmt::Debug;

/// Queryable entity property and the column that stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Property {
    pub name: &'static str,
    pub column: &'static str,
}

const fn property(name: &'static str, column: &'static str) -> Property {
    Property { name, column }
}

/// An entity type the unit of work can load, track and write.
pub trait Entity: Identifiable + Debug + Sized + 'static {
    /// Name used in error messages, e.g. `Member`.
    const NAME: &'static str;
    const TABLE: &'static str;
    /// Table alias used by filter templates (`m.username`).
    const ALIAS: &'static str;
    const ID_COLUMN: &'static str;
    /// Writable columns, in bind order.
    const COLUMNS: &'static [&'static str];
    const PROPERTIES: &'static [Property];
    /// To-one associations an entity graph may fetch.
    const ASSOCIATIONS: &'static [&'static str];

    fn assign_id(&mut self, id: Self::Id);

    fn audit_mut(&mut self) -> &mut AuditFields;

    /// Persistable state in `COLUMNS` order.
    fn column_values(&self) -> RepoResult<Vec<Value>>;

    /// Reads `id` + `COLUMNS` starting at column index `offset`.
    fn from_row(row: &Row<'_>, offset: usize) -> RepoResult<Self>;

    /// Overwrites column state with `source`'s, associations excepted.
    fn copy_state_from(&mut self, source: &Self);

    /// Merges detached `source` into the managed `target`.
    fn merge(target: &Managed<Self>, source: &Managed<Self>) {
        target.borrow_mut().copy_state_from(&source.borrow());
    }

    fn identity_map<'u>(uow: &'u UnitOfWork<'_>) -> &'u IdentityMap<Self>;
}

/// Column storing `property`, if the entity maps it.
pub fn property_column<E: Entity>(property: &str) -> Option<&'static str> {
    E::PROPERTIES
        .iter()
        .find(|candidate| candidate.name == property)
        .map(|candidate| candidate.column)
}

/// `alias.id, alias.col1, ...` for `E`.
pub fn select_columns<E: Entity>() -> String {
    std::iter::once(E::ID_COLUMN)
        .chain(E::COLUMNS.iter().copied())
        .map(|column| format!("{}.{column}", E::ALIAS))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Number of columns `select_columns::<E>()` yields.
pub fn column_count<E: Entity>() -> usize {
    E::COLUMNS.len() + 1
}

fn audit_from_row(row: &Row<'_>, offset: usize, table: &str) -> RepoResult<AuditFields> {
    let created_date: i64 = row.get(offset)?;
    let updated_date: i64 = row.get(offset + 1)?;
    if updated_date < created_date {
        return Err(RepoError::InvalidData(format!(
            "updated_date {updated_date} precedes created_date {created_date} in {table}"
        )));
    }
    Ok(AuditFields::from_persisted(created_date, updated_date))
}

fn audit_values(audit: &AuditFields) -> [Value; 2] {
    [
        audit.created_date().map_or(Value::Null, Value::Integer),
        audit.updated_date().map_or(Value::Null, Value::Integer),
    ]
}

impl Entity for Member {
    const NAME: &'static str = "Member";
    const TABLE: &'static str = "member";
    const ALIAS: &'static str = "m";
    const ID_COLUMN: &'static str = "member_id";
    const COLUMNS: &'static [&'static str] =
        &["username", "age", "team_id", "created_date", "updated_date"];
    const PROPERTIES: &'static [Property] = &[
        property("id", "member_id"),
        property("username", "username"),
        property("age", "age"),
        property("team", "team_id"),
        property("created_date", "created_date"),
        property("updated_date", "updated_date"),
    ];
    const ASSOCIATIONS: &'static [&'static str] = &["team"];

    fn assign_id(&mut self, id: MemberId) {
        Member::assign_id(self, id);
    }

    fn audit_mut(&mut self) -> &mut AuditFields {
        Member::audit_mut(self)
    }

    fn column_values(&self) -> RepoResult<Vec<Value>> {
        let team_id = match self.team() {
            None => Value::Null,
            Some(assoc) => match assoc.id() {
                Some(id) => Value::Integer(id.0),
                None => {
                    return Err(RepoError::TransientReference {
                        entity: Self::NAME,
                        association: "team",
                    })
                }
            },
        };
        let [created_date, updated_date] = audit_values(self.audit());
        Ok(vec![
            Value::Text(self.username.clone()),
            Value::Integer(i64::from(self.age)),
            team_id,
            created_date,
            updated_date,
        ])
    }

    fn from_row(row: &Row<'_>, offset: usize) -> RepoResult<Self> {
        let id: i64 = row.get(offset)?;
        let username: String = row.get(offset + 1)?;
        let age: i32 = row.get(offset + 2)?;
        let team_id: Option<i64> = row.get(offset + 3)?;
        let audit = audit_from_row(row, offset + 4, Self::TABLE)?;
        Ok(Member::restore(
            MemberId(id),
            username,
            age,
            team_id.map(TeamId),
            audit,
        ))
    }

    fn copy_state_from(&mut self, source: &Self) {
        self.username = source.username.clone();
        self.age = source.age;
        *Member::audit_mut(self) = *source.audit();
    }

    /// A loaded team ends up listing `target` in place of `source`.
    fn merge(target: &Managed<Self>, source: &Managed<Self>) {
        target.borrow_mut().copy_state_from(&source.borrow());
        let team = source.borrow().team().cloned();
        match team {
            Some(Assoc::Loaded(team)) => {
                team.borrow_mut().unregister_member(source);
                target.change_team(&team);
            }
            Some(Assoc::Reference(team_id)) => {
                if target.borrow().team_id() != Some(team_id) {
                    target.leave_team();
                    target
                        .borrow_mut()
                        .set_team_assoc(Some(Assoc::Reference(team_id)));
                }
            }
            None => target.leave_team(),
        }
    }

    fn identity_map<'u>(uow: &'u UnitOfWork<'_>) -> &'u IdentityMap<Self> {
        &uow.members
    }
}

impl Entity for Team {
    const NAME: &'static str = "Team";
    const TABLE: &'static str = "team";
    const ALIAS: &'static str = "t";
    const ID_COLUMN: &'static str = "team_id";
    const COLUMNS: &'static [&'static str] = &["name", "created_date", "updated_date"];
    const PROPERTIES: &'static [Property] = &[
        property("id", "team_id"),
        property("name", "name"),
        property("created_date", "created_date"),
        property("updated_date", "updated_date"),
    ];
    const ASSOCIATIONS: &'static [&'static str] = &[];

    fn assign_id(&mut self, id: TeamId) {
        Team::assign_id(self, id);
    }

    fn audit_mut(&mut self) -> &mut AuditFields {
        Team::audit_mut(self)
    }

    fn column_values(&self) -> RepoResult<Vec<Value>> {
        let [created_date, updated_date] = audit_values(self.audit());
        Ok(vec![
            Value::Text(self.name.clone()),
            created_date,
            updated_date,
        ])
    }

    fn from_row(row: &Row<'_>, offset: usize) -> RepoResult<Self> {
        let id: i64 = row.get(offset)?;
        let name: String = row.get(offset + 1)?;
        let audit = audit_from_row(row, offset + 2, Self::TABLE)?;
        Ok(Team::restore(TeamId(id), name, audit))
    }

    fn copy_state_from(&mut self, source: &Self) {
        self.name = source.name.clone();
        *Team::audit_mut(self) = *source.audit();
    }

    fn identity_map<'u>(uow: &'u UnitOfWork<'_>) -> &'u IdentityMap<Self> {
        &uow.teams
    }
}
