//! Per-unit-of-work cache of managed entities keyed by identity.
//!
//! # Invariants
//! - At most one handle per id; lookups return clones of that handle.
//! - An entry without snapshot (read-only load) is never reported dirty.

use crate::model::managed::Managed;
use crate::repo::entity::Entity;
use crate::repo::error::RepoResult;
use rusqlite::types::Value;
use std::cell::RefCell;
use std::collections::HashMap;

struct Tracked<E> {
    handle: Managed<E>,
    /// Column values as last read or written; `None` for read-only loads.
    snapshot: Option<Vec<Value>>,
}

pub struct IdentityMap<E: Entity> {
    entries: RefCell<HashMap<E::Id, Tracked<E>>>,
}

impl<E: Entity> Default for IdentityMap<E> {
    fn default() -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
        }
    }
}

impl<E: Entity> IdentityMap<E> {
    pub(crate) fn get(&self, id: E::Id) -> Option<Managed<E>> {
        self.entries
            .borrow()
            .get(&id)
            .map(|tracked| tracked.handle.clone())
    }

    pub(crate) fn insert(&self, id: E::Id, handle: Managed<E>, snapshot: Option<Vec<Value>>) {
        self.entries
            .borrow_mut()
            .insert(id, Tracked { handle, snapshot });
    }

    pub(crate) fn set_snapshot(&self, id: E::Id, snapshot: Vec<Value>) {
        if let Some(tracked) = self.entries.borrow_mut().get_mut(&id) {
            tracked.snapshot = Some(snapshot);
        }
    }

    pub(crate) fn remove(&self, id: E::Id) -> Option<Managed<E>> {
        self.entries
            .borrow_mut()
            .remove(&id)
            .map(|tracked| tracked.handle)
    }

    pub(crate) fn clear(&self) -> usize {
        let mut entries = self.entries.borrow_mut();
        let cleared = entries.len();
        entries.clear();
        cleared
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// True when `handle` is the instance tracked under its own id.
    pub(crate) fn tracks(&self, handle: &Managed<E>) -> bool {
        let Some(id) = handle.borrow().id() else {
            return false;
        };
        self.entries
            .borrow()
            .get(&id)
            .is_some_and(|tracked| tracked.handle.same_instance(handle))
    }

    #[cfg(test)]
    fn is_read_only(&self, id: E::Id) -> bool {
        self.entries
            .borrow()
            .get(&id)
            .is_some_and(|tracked| tracked.snapshot.is_none())
    }

    /// Snapshotted entries whose current column values differ, ordered by id.
    pub(crate) fn dirty(&self) -> RepoResult<Vec<(E::Id, Managed<E>)>> {
        let entries = self.entries.borrow();
        let mut dirty = Vec::new();
        for (id, tracked) in entries.iter() {
            let Some(snapshot) = &tracked.snapshot else {
                continue;
            };
            let current = tracked.handle.borrow().column_values()?;
            if &current != snapshot {
                dirty.push((*id, tracked.handle.clone()));
            }
        }
        dirty.sort_by_key(|(id, _)| -> i64 { (*id).into() });
        Ok(dirty)
    }
}
