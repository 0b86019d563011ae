#![forbid(unsafe_code)]

//! Per-mutation active set used to cut recompute cycles.
//!
//! A [`Cascade`] is created when an external write starts and travels with
//! every change event that write causes, so the recomputes it triggers can see
//! which `(object, key)` pairs are already mid-recomputation. It is dropped
//! when the outermost write returns; there is no global state.
//!
//! # Invariants
//!
//! 1. A pair is active from [`Cascade::enter`] until its [`ActiveGuard`] is
//!    dropped, including on early return or unwinding.
//! 2. Entering an already-active pair returns `None` and changes nothing.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashSet;

use crate::object::ObjectId;

static NEXT_CASCADE_ID: AtomicU64 = AtomicU64::new(1);

struct CascadeInner {
    id: u64,
    active: RefCell<AHashSet<(ObjectId, String)>>,
}

/// Shared handle to one cascade's active set.
///
/// Cloning yields another handle to the same set.
#[derive(Clone)]
pub struct Cascade {
    inner: Rc<CascadeInner>,
}

impl Cascade {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(CascadeInner {
                id: NEXT_CASCADE_ID.fetch_add(1, Ordering::Relaxed),
                active: RefCell::new(AHashSet::new()),
            }),
        }
    }

    /// Identifier for tracing.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Mark `(object, key)` active for the lifetime of the returned guard.
    ///
    /// Returns `None` if the pair is already active in this cascade.
    #[must_use]
    pub fn enter(&self, object: ObjectId, key: &str) -> Option<ActiveGuard> {
        let entry = (object, key.to_owned());
        if !self.inner.active.borrow_mut().insert(entry.clone()) {
            return None;
        }
        Some(ActiveGuard {
            cascade: self.clone(),
            entry,
        })
    }

    #[must_use]
    pub fn is_active(&self, object: ObjectId, key: &str) -> bool {
        self.inner
            .active
            .borrow()
            .contains(&(object, key.to_owned()))
    }

    /// Number of pairs currently mid-recomputation.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.inner.active.borrow().len()
    }

    /// Whether two handles refer to the same cascade.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Cascade {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cascade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cascade")
            .field("id", &self.inner.id)
            .field("active", &self.active_len())
            .finish()
    }
}

/// RAII marker for one active `(object, key)` pair.
#[must_use = "the pair stops being active as soon as the guard is dropped"]
pub struct ActiveGuard {
    cascade: Cascade,
    entry: (ObjectId, String),
}

impl ActiveGuard {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.entry.1
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.cascade.inner.active.borrow_mut().remove(&self.entry);
    }
}

impl fmt::Debug for ActiveGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveGuard")
            .field("cascade", &self.cascade.id())
            .field("object", &self.entry.0)
            .field("key", &self.entry.1)
            .finish()
    }
}
