//! Shared entity handles and explicit association wrappers.
//!
//! # Invariants
//! - Two handles are "the same entity" iff [`Managed::same_instance`] holds.
//! - `Assoc::Reference` never triggers I/O; loading is an explicit repository call.

use crate::model::Identifiable;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};

/// Shared, mutable handle to one in-memory entity.
///
/// Cloning the handle clones the reference, not the entity.
pub struct Managed<T>(Rc<RefCell<T>>);

impl<T> Managed<T> {
    /// Wraps a new (usually transient) entity.
    pub fn new(value: T) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    /// Identity comparison: both handles point at the same allocation.
    pub fn same_instance(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> WeakManaged<T> {
        WeakManaged(Rc::downgrade(&self.0))
    }
}

impl<T> Clone for Managed<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: Debug> Debug for Managed<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0.try_borrow() {
            Ok(value) => f.debug_tuple("Managed").field(&*value).finish(),
            Err(_) => f.write_str("Managed(<borrowed>)"),
        }
    }
}

/// Non-owning handle used by inverse-side collections.
pub struct WeakManaged<T>(Weak<RefCell<T>>);

impl<T> WeakManaged<T> {
    pub fn upgrade(&self) -> Option<Managed<T>> {
        self.0.upgrade().map(Managed)
    }

    pub fn points_to(&self, handle: &Managed<T>) -> bool {
        Weak::ptr_eq(&self.0, &Rc::downgrade(&handle.0))
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl<T> Clone for WeakManaged<T> {
    fn clone(&self) -> Self {
        Self(Weak::clone(&self.0))
    }
}

impl<T> Debug for WeakManaged<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "WeakManaged(alive={})", self.is_alive())
    }
}

/// A to-one association: either just the foreign key, or the loaded entity.
pub enum Assoc<T: Identifiable> {
    /// Foreign key only. Resolving it costs one lookup.
    Reference(T::Id),
    /// Association resolved to a handle.
    Loaded(Managed<T>),
}

impl<T: Identifiable> Assoc<T> {
    /// Target id; `None` only for a loaded target that is still transient.
    pub fn id(&self) -> Option<T::Id> {
        match self {
            Self::Reference(id) => Some(*id),
            Self::Loaded(handle) => handle.borrow().id(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    pub fn loaded(&self) -> Option<&Managed<T>> {
        match self {
            Self::Reference(_) => None,
            Self::Loaded(handle) => Some(handle),
        }
    }
}

impl<T: Identifiable> Clone for Assoc<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Reference(id) => Self::Reference(*id),
            Self::Loaded(handle) => Self::Loaded(handle.clone()),
        }
    }
}

impl<T: Identifiable> Debug for Assoc<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reference(id) => write!(f, "Reference({id})"),
            Self::Loaded(handle) => match handle.0.try_borrow() {
                Ok(value) => match value.id() {
                    Some(id) => write!(f, "Loaded({id})"),
                    None => f.write_str("Loaded(transient)"),
                },
                Err(_) => f.write_str("Loaded(<borrowed>)"),
            },
        }
    }
}
