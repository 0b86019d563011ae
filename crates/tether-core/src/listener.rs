#![forbid(unsafe_code)]

//! Listener registry: per-object named listeners and RAII subscriptions.
//!
//! Emission snapshots the matching listeners before invoking any of them, so
//! listeners may add or remove listeners (on any object) while running. A
//! listener removed mid-emission is marked dead and skipped.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::Result;
use crate::event::Event;
use crate::object::{Object, ObjectInner};

pub(crate) type Handler = Rc<dyn Fn(&Event) -> Result<()>>;

/// Identifier of one registered listener on one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

struct Entry {
    id: ListenerId,
    event: String,
    handler: Handler,
    live: Cell<bool>,
}

#[derive(Default)]
pub(crate) struct Listeners {
    entries: RefCell<Vec<Rc<Entry>>>,
    next_id: Cell<u64>,
}

impl Listeners {
    pub(crate) fn add(&self, event: &str, handler: Handler) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.entries.borrow_mut().push(Rc::new(Entry {
            id,
            event: event.to_owned(),
            handler,
            live: Cell::new(true),
        }));
        id
    }

    /// Remove one listener. The entry is dropped after the borrow is released
    /// so that handler captures may themselves touch listener registries.
    pub(crate) fn remove(&self, id: ListenerId, event: Option<&str>) -> bool {
        let removed = {
            let mut entries = self.entries.borrow_mut();
            entries
                .iter()
                .position(|e| e.id == id && event.is_none_or(|name| e.event == name))
                .map(|pos| entries.remove(pos))
        };
        match removed {
            Some(entry) => {
                entry.live.set(false);
                true
            }
            None => false,
        }
    }

    pub(crate) fn emit(&self, event: &Event) -> Result<()> {
        let snapshot: Vec<Rc<Entry>> = self
            .entries
            .borrow()
            .iter()
            .filter(|e| e.event == event.name)
            .cloned()
            .collect();
        for entry in snapshot {
            if entry.live.get() {
                (entry.handler)(event)?;
            }
        }
        Ok(())
    }

    pub(crate) fn count(&self, event: &str) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.event == event)
            .count()
    }

    pub(crate) fn contains(&self, id: ListenerId) -> bool {
        self.entries.borrow().iter().any(|e| e.id == id)
    }
}

/// RAII guard for a listener. Dropping it removes the listener.
///
/// The guard holds the owning object weakly; if the object is gone the drop
/// is a no-op.
#[must_use = "dropping a Subscription removes its listener"]
pub struct Subscription {
    owner: Weak<ObjectInner>,
    id: ListenerId,
}

impl Subscription {
    pub(crate) fn new(owner: Weak<ObjectInner>, id: ListenerId) -> Self {
        Self { owner, id }
    }

    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Whether the owning object is alive and the listener still registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.owner
            .upgrade()
            .is_some_and(|inner| inner.listeners.contains(self.id))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.owner.upgrade() {
            inner.listeners.remove(self.id, None);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Register `handler` for `event` on `object`. The listener stays until
/// [`remove_listener`] is called.
pub fn add_listener(
    object: &Object,
    event: &str,
    handler: impl Fn(&Event) -> Result<()> + 'static,
) -> ListenerId {
    object.inner().listeners.add(event, Rc::new(handler))
}

/// Remove a listener registered with [`add_listener`].
pub fn remove_listener(object: &Object, event: &str, id: ListenerId) -> bool {
    object.inner().listeners.remove(id, Some(event))
}

/// Deliver `event` to the listeners of `event.name` on `object`.
pub fn emit(object: &Object, event: &Event) -> Result<()> {
    object.inner().listeners.emit(event)
}
