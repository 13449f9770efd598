//! Transaction scope with identity map and snapshot-based dirty checking.
//!
//! # Responsibility
//! - Own the SQLite transaction every repository in a request shares.
//! - Guarantee one in-memory handle per persisted identity.
//! - Write changed entities on `flush`/`commit`, stamping audit fields.
//!
//! # Invariants
//! - Every statement goes through `execute`/`query` and is counted.
//! - Dropping an uncommitted unit of work rolls the transaction back.
//! - Teams flush before members so new foreign keys always resolve.

use crate::logging::sanitize_message;
use crate::model::audit::now_epoch_ms;
use crate::model::managed::Managed;
use crate::model::member::Member;
use crate::model::team::Team;
use crate::repo::entity::Entity;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::identity_map::IdentityMap;
use log::{debug, info, log_enabled, Level};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row, Transaction};
use std::cell::Cell;

const MAX_LOGGED_SQL_CHARS: usize = 240;

/// When pending changes are written without an explicit `flush`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlushMode {
    /// Before every repository query and bulk statement, and on commit.
    #[default]
    Auto,
    /// Only on `flush` and `commit`.
    Commit,
}

pub struct UnitOfWork<'conn> {
    tx: Transaction<'conn>,
    pub(crate) members: IdentityMap<Member>,
    pub(crate) teams: IdentityMap<Team>,
    flush_mode: FlushMode,
    statements: Cell<u64>,
    clock: Box<dyn Fn() -> i64>,
}

impl<'conn> UnitOfWork<'conn> {
    /// Starts a deferred transaction on `conn`.
    pub fn begin(conn: &'conn mut Connection) -> RepoResult<Self> {
        let tx = conn.transaction()?;
        debug!("event=uow_begin module=repo status=ok");
        Ok(Self {
            tx,
            members: IdentityMap::default(),
            teams: IdentityMap::default(),
            flush_mode: FlushMode::default(),
            statements: Cell::new(0),
            clock: Box::new(now_epoch_ms),
        })
    }

    /// Replaces the audit clock (epoch milliseconds).
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_flush_mode(mut self, flush_mode: FlushMode) -> Self {
        self.flush_mode = flush_mode;
        self
    }

    pub fn flush_mode(&self) -> FlushMode {
        self.flush_mode
    }

    pub fn now(&self) -> i64 {
        (self.clock)()
    }

    /// Statements issued so far, reads and writes alike.
    pub fn statement_count(&self) -> u64 {
        self.statements.get()
    }

    pub fn managed_count(&self) -> usize {
        self.members.len() + self.teams.len()
    }

    /// True when `handle` is the instance this unit of work tracks for its id.
    pub fn contains<E: Entity>(&self, handle: &Managed<E>) -> bool {
        E::identity_map(self).tracks(handle)
    }

    /// Stops tracking `handle`; later loads of its id return a fresh handle.
    pub fn detach<E: Entity>(&self, handle: &Managed<E>) -> bool {
        if !self.contains(handle) {
            return false;
        }
        let id = handle.borrow().id();
        id.and_then(|id| E::identity_map(self).remove(id)).is_some()
    }

    /// Detaches every managed entity. Pending changes are discarded.
    pub fn clear(&self) {
        let cleared = self.members.clear() + self.teams.clear();
        info!("event=uow_clear module=repo status=ok detached={cleared}");
    }

    /// Writes every changed, snapshotted entity. Returns the number written.
    pub fn flush(&self) -> RepoResult<usize> {
        let written = self.flush_entities::<Team>()? + self.flush_entities::<Member>()?;
        if written > 0 {
            info!("event=uow_flush module=repo status=ok written={written}");
        }
        Ok(written)
    }

    pub fn commit(self) -> RepoResult<()> {
        let written = self.flush()?;
        let statements = self.statements.get();
        self.tx.commit()?;
        info!(
            "event=uow_commit module=repo status=ok flushed={written} statements={statements}"
        );
        Ok(())
    }

    pub fn rollback(self) -> RepoResult<()> {
        let statements = self.statements.get();
        self.tx.rollback()?;
        info!("event=uow_rollback module=repo status=ok statements={statements}");
        Ok(())
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.tx
    }

    pub(crate) fn auto_flush(&self) -> RepoResult<()> {
        if self.flush_mode == FlushMode::Auto {
            self.flush()?;
        }
        Ok(())
    }

    pub(crate) fn execute(&self, sql: &str, params: &[Value]) -> RepoResult<usize> {
        self.record_statement(sql);
        let changed = self.tx.execute(sql, params_from_iter(params.iter()))?;
        Ok(changed)
    }

    pub(crate) fn query<T>(
        &self,
        sql: &str,
        params: &[Value],
        mut read: impl FnMut(&Row<'_>) -> RepoResult<T>,
    ) -> RepoResult<Vec<T>> {
        self.record_statement(sql);
        let mut stmt = self.tx.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read(row)?);
        }
        Ok(out)
    }

    pub(crate) fn query_count(&self, sql: &str, params: &[Value]) -> RepoResult<u64> {
        self.record_statement(sql);
        let count: i64 = self
            .tx
            .query_row(sql, params_from_iter(params.iter()), |row| row.get(0))?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count {count}")))
    }

    /// Registers a freshly read entity, or returns the handle already managed
    /// for its id. An existing handle is returned as is, even if the row changed.
    pub(crate) fn attach<E: Entity>(&self, entity: E, read_only: bool) -> RepoResult<Managed<E>> {
        let id = entity
            .id()
            .ok_or_else(|| RepoError::InvalidData(format!("{} row without id", E::NAME)))?;
        let map = E::identity_map(self);
        if let Some(existing) = map.get(id) {
            return Ok(existing);
        }
        let snapshot = if read_only {
            None
        } else {
            Some(entity.column_values()?)
        };
        let handle = Managed::new(entity);
        map.insert(id, handle.clone(), snapshot);
        Ok(handle)
    }

    pub(crate) fn insert<E: Entity>(&self, handle: &Managed<E>) -> RepoResult<E::Id> {
        let now = self.now();
        handle.borrow_mut().audit_mut().on_insert(now);
        let values = handle.borrow().column_values()?;

        let placeholders = (1..=E::COLUMNS.len())
            .map(|position| format!("?{position}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders});",
            E::TABLE,
            E::COLUMNS.join(", ")
        );
        self.execute(&sql, &values)?;

        let id: E::Id = self.tx.last_insert_rowid().into();
        handle.borrow_mut().assign_id(id);
        E::identity_map(self).insert(id, handle.clone(), Some(values));
        debug!(
            "event=entity_insert module=repo status=ok entity={} id={id}",
            E::NAME
        );
        Ok(id)
    }

    pub(crate) fn update<E: Entity>(&self, id: E::Id, handle: &Managed<E>) -> RepoResult<()> {
        let now = self.now();
        handle.borrow_mut().audit_mut().on_update(now);
        let snapshot = handle.borrow().column_values()?;

        let assignments = E::COLUMNS
            .iter()
            .enumerate()
            .map(|(index, column)| format!("{column} = ?{}", index + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE {} = ?{};",
            E::TABLE,
            E::ID_COLUMN,
            E::COLUMNS.len() + 1
        );
        let mut values = snapshot.clone();
        values.push(Value::Integer(id.into()));

        if self.execute(&sql, &values)? == 0 {
            return Err(RepoError::StaleEntity {
                table: E::TABLE,
                id: id.into(),
            });
        }
        E::identity_map(self).set_snapshot(id, snapshot);
        debug!(
            "event=entity_update module=repo status=ok entity={} id={id}",
            E::NAME
        );
        Ok(())
    }

    /// Deletes the row for `id` and detaches its handle. Returns rows removed.
    pub(crate) fn remove<E: Entity>(&self, id: E::Id) -> RepoResult<usize> {
        let sql = format!("DELETE FROM {} WHERE {} = ?1;", E::TABLE, E::ID_COLUMN);
        let removed = self.execute(&sql, &[Value::Integer(id.into())])?;
        E::identity_map(self).remove(id);
        debug!(
            "event=entity_delete module=repo status=ok entity={} id={id} removed={removed}",
            E::NAME
        );
        Ok(removed)
    }

    fn flush_entities<E: Entity>(&self) -> RepoResult<usize> {
        let dirty = E::identity_map(self).dirty()?;
        for (id, handle) in &dirty {
            self.update(*id, handle)?;
        }
        Ok(dirty.len())
    }

    fn record_statement(&self, sql: &str) {
        let seq = self.statements.get() + 1;
        self.statements.set(seq);
        if log_enabled!(Level::Debug) {
            debug!(
                "event=sql module=repo status=ok seq={seq} sql={}",
                sanitize_message(sql, MAX_LOGGED_SQL_CHARS)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FlushMode, UnitOfWork};
    use crate::db::open_db_in_memory;
    use crate::model::managed::Managed;
    use crate::model::team::Team;

    #[test]
    fn insert_stamps_audit_with_injected_clock() {
        let mut conn = open_db_in_memory().unwrap();
        let uow = UnitOfWork::begin(&mut conn).unwrap().with_clock(|| 42);
        let team = Managed::new(Team::new("FC Bar"));

        let id = uow.insert(&team).unwrap();

        assert_eq!(team.borrow().audit().created_date(), Some(42));
        assert_eq!(team.borrow().audit().updated_date(), Some(42));
        assert!(uow.contains(&team));
        assert_eq!(uow.statement_count(), 1);
        assert!(id.0 > 0);
    }

    #[test]
    fn commit_mode_skips_auto_flush() {
        let mut conn = open_db_in_memory().unwrap();
        let uow = UnitOfWork::begin(&mut conn)
            .unwrap()
            .with_flush_mode(FlushMode::Commit);
        let team = Managed::new(Team::new("FC Bar"));
        uow.insert(&team).unwrap();
        team.borrow_mut().name = "FC Baz".to_string();

        uow.auto_flush().unwrap();
        assert_eq!(uow.statement_count(), 1);

        assert_eq!(uow.flush().unwrap(), 1);
        assert_eq!(uow.statement_count(), 2);
    }
}
