//! Generic CRUD contract and its SQLite implementation.
//!
//! # Responsibility
//! - Provide save/find/delete/count for any mapped [`Entity`].
//! - Route every read through the unit of work so identity is preserved.
//!
//! # Invariants
//! - `find_by_id` on a managed id never issues a statement.
//! - Reads flush pending changes first when the unit of work is in auto mode.
//! - Sorted reads always end with an id tie-breaker.

use crate::model::managed::Managed;
use crate::paging::{Page, PageRequest, PagingError, Sort};
use crate::repo::entity::{property_column, select_columns, Entity};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::schema::ensure_entity_ready;
use crate::repo::unit_of_work::UnitOfWork;
use log::debug;
use rusqlite::types::Value;
use std::marker::PhantomData;

/// Repository interface shared by every entity.
pub trait CrudRepository<E: Entity> {
    /// Inserts a transient entity or merges a detached one.
    ///
    /// Returns the managed handle; for a transient entity that is `entity`
    /// itself with its id assigned.
    fn save(&self, entity: &Managed<E>) -> RepoResult<Managed<E>>;
    fn find_by_id(&self, id: E::Id) -> RepoResult<Option<Managed<E>>>;
    fn exists_by_id(&self, id: E::Id) -> RepoResult<bool>;
    fn find_all(&self) -> RepoResult<Vec<Managed<E>>>;
    fn find_all_sorted(&self, sort: &Sort) -> RepoResult<Vec<Managed<E>>>;
    fn find_all_paged(&self, request: &PageRequest) -> RepoResult<Page<Managed<E>>>;
    fn delete(&self, entity: &Managed<E>) -> RepoResult<()>;
    /// Deleting an id without row is a no-op.
    fn delete_by_id(&self, id: E::Id) -> RepoResult<()>;
    fn count(&self) -> RepoResult<u64>;
}

/// SQLite-backed repository bound to one unit of work.
pub struct SqliteRepository<'u, 'conn, E> {
    uow: &'u UnitOfWork<'conn>,
    _entity: PhantomData<fn() -> E>,
}

impl<'u, 'conn, E: Entity> SqliteRepository<'u, 'conn, E> {
    /// Creates repository from a unit of work over a migrated connection.
    pub fn try_new(uow: &'u UnitOfWork<'conn>) -> RepoResult<Self> {
        ensure_entity_ready::<E>(uow.connection())?;
        Ok(Self {
            uow,
            _entity: PhantomData,
        })
    }

    pub fn unit_of_work(&self) -> &'u UnitOfWork<'conn> {
        self.uow
    }

    fn base_select() -> String {
        format!(
            "SELECT {} FROM {} {}",
            select_columns::<E>(),
            E::TABLE,
            E::ALIAS
        )
    }

    fn load(&self, sql: &str, params: &[Value]) -> RepoResult<Vec<Managed<E>>> {
        let rows = self.uow.query(sql, params, |row| E::from_row(row, 0))?;
        rows.into_iter()
            .map(|entity| self.uow.attach(entity, false))
            .collect()
    }
}

impl<E: Entity> CrudRepository<E> for SqliteRepository<'_, '_, E> {
    fn save(&self, entity: &Managed<E>) -> RepoResult<Managed<E>> {
        let id = entity.borrow().id();
        let Some(id) = id else {
            self.uow.insert(entity)?;
            return Ok(entity.clone());
        };

        if let Some(managed) = E::identity_map(self.uow).get(id) {
            if !managed.same_instance(entity) {
                E::merge(&managed, entity);
            }
            return Ok(managed);
        }

        let managed = self.find_by_id(id)?.ok_or(RepoError::StaleEntity {
            table: E::TABLE,
            id: id.into(),
        })?;
        E::merge(&managed, entity);
        debug!(
            "event=entity_merge module=repo status=ok entity={} id={id}",
            E::NAME
        );
        Ok(managed)
    }

    fn find_by_id(&self, id: E::Id) -> RepoResult<Option<Managed<E>>> {
        if let Some(managed) = E::identity_map(self.uow).get(id) {
            return Ok(Some(managed));
        }
        let sql = format!(
            "{} WHERE {}.{} = ?1;",
            Self::base_select(),
            E::ALIAS,
            E::ID_COLUMN
        );
        Ok(self.load(&sql, &[Value::Integer(id.into())])?.pop())
    }

    fn exists_by_id(&self, id: E::Id) -> RepoResult<bool> {
        if E::identity_map(self.uow).get(id).is_some() {
            return Ok(true);
        }
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1);",
            E::TABLE,
            E::ID_COLUMN
        );
        Ok(self.uow.query_count(&sql, &[Value::Integer(id.into())])? > 0)
    }

    fn find_all(&self) -> RepoResult<Vec<Managed<E>>> {
        self.find_all_sorted(&Sort::unsorted())
    }

    fn find_all_sorted(&self, sort: &Sort) -> RepoResult<Vec<Managed<E>>> {
        let order_by = order_by_clause::<E>(sort)?;
        self.uow.auto_flush()?;
        let sql = format!("{}{order_by};", Self::base_select());
        self.load(&sql, &[])
    }

    fn find_all_paged(&self, request: &PageRequest) -> RepoResult<Page<Managed<E>>> {
        let order_by = order_by_clause::<E>(request.sort())?;
        let offset = request.offset()?;
        self.uow.auto_flush()?;

        let mut params = Vec::new();
        let window = window_clause(&mut params, request.size(), offset);
        let sql = format!("{}{order_by}{window};", Self::base_select());
        let content = self.load(&sql, &params)?;

        let total = self.count()?;
        Ok(Page::new(content, request, total))
    }

    fn delete(&self, entity: &Managed<E>) -> RepoResult<()> {
        let id = entity.borrow().id();
        match id {
            Some(id) => self.delete_by_id(id),
            None => Ok(()),
        }
    }

    fn delete_by_id(&self, id: E::Id) -> RepoResult<()> {
        self.uow.auto_flush()?;
        if self.uow.remove::<E>(id)? == 0 {
            debug!(
                "event=entity_delete module=repo status=skipped entity={} id={id} reason=not_found",
                E::NAME
            );
        }
        Ok(())
    }

    fn count(&self) -> RepoResult<u64> {
        self.uow.auto_flush()?;
        let sql = format!("SELECT COUNT(*) FROM {};", E::TABLE);
        self.uow.query_count(&sql, &[])
    }
}

/// ` ORDER BY ...` for `sort`, always ending with the id column.
///
/// Unknown properties are rejected rather than ignored.
pub(crate) fn order_by_clause<E: Entity>(sort: &Sort) -> RepoResult<String> {
    let mut terms = Vec::with_capacity(sort.orders().len() + 1);
    let mut has_id = false;
    for order in sort.orders() {
        let column = property_column::<E>(&order.property).ok_or_else(|| {
            PagingError::UnknownSortProperty {
                entity: E::NAME,
                property: order.property.clone(),
            }
        })?;
        has_id |= column == E::ID_COLUMN;
        terms.push(format!(
            "{}.{column} {}",
            E::ALIAS,
            order.direction.as_sql()
        ));
    }
    if !has_id {
        terms.push(format!("{}.{} ASC", E::ALIAS, E::ID_COLUMN));
    }
    Ok(format!(" ORDER BY {}", terms.join(", ")))
}

/// ` LIMIT ?n OFFSET ?n+1`, numbered after the parameters already in `params`.
pub(crate) fn window_clause(params: &mut Vec<Value>, limit: u64, offset: u64) -> String {
    let limit_position = params.len() + 1;
    params.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    params.push(Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));
    format!(" LIMIT ?{limit_position} OFFSET ?{}", limit_position + 1)
}

#[cfg(test)]
mod tests {
    use super::{order_by_clause, window_clause};
    use crate::model::member::Member;
    use crate::paging::{Direction, Order, PagingError, Sort};
    use crate::repo::error::RepoError;
    use rusqlite::types::Value;

    #[test]
    fn order_by_appends_id_tie_breaker() {
        let sort = Sort::by(Direction::Desc, &["username"]).and(Order::asc("age"));
        assert_eq!(
            order_by_clause::<Member>(&sort).unwrap(),
            " ORDER BY m.username DESC, m.age ASC, m.member_id ASC"
        );
        assert_eq!(
            order_by_clause::<Member>(&Sort::by(Direction::Desc, &["id"])).unwrap(),
            " ORDER BY m.member_id DESC"
        );
    }

    #[test]
    fn unknown_sort_property_is_a_request_error() {
        let err = order_by_clause::<Member>(&Sort::by(Direction::Asc, &["nickname"])).unwrap_err();
        assert!(matches!(
            err,
            RepoError::InvalidRequest(PagingError::UnknownSortProperty { .. })
        ));
    }

    #[test]
    fn window_numbers_follow_existing_parameters() {
        let mut params = vec![Value::Integer(10)];
        assert_eq!(window_clause(&mut params, 3, 6), " LIMIT ?2 OFFSET ?3");
        assert_eq!(params.len(), 3);
    }
}
