#![forbid(unsafe_code)]

//! Change subscriptions for resolved sources.
//!
//! A [`SourceWatch`] keeps one dependency-channel subscription per hop of
//! its chain. When hop `i` fires, the chain below it may now lead somewhere
//! else, so hops `i + 1..` are unsubscribed, re-walked from the current
//! value, and subscribed again before the change callback runs.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tether_core::{Event, Result, Subscription, Value};

use crate::path::{KeyPath, ResolvedSource};

type OnChange = Rc<dyn Fn(&Event) -> Result<()>>;

struct WatchState {
    source: ResolvedSource,
    /// `subs[i]` watches `source.hops()[i]`.
    subs: Vec<Subscription>,
    on_change: OnChange,
}

/// Live subscriptions for one [`ResolvedSource`]. Dropping the watch
/// removes every listener it installed.
pub struct SourceWatch {
    state: Rc<RefCell<WatchState>>,
}

/// Subscribe to every hop of `source`; `on_change` runs after any hop's key
/// is written.
pub fn subscribe(
    source: ResolvedSource,
    on_change: impl Fn(&Event) -> Result<()> + 'static,
) -> SourceWatch {
    let state = Rc::new(RefCell::new(WatchState {
        source,
        subs: Vec::new(),
        on_change: Rc::new(on_change),
    }));
    let weak = Rc::downgrade(&state);
    state.borrow_mut().subscribe_from(0, &weak);
    SourceWatch { state }
}

impl SourceWatch {
    /// Remove every listener this watch installed.
    pub fn unsubscribe(self) {
        drop(self);
    }

    #[must_use]
    pub fn path(&self) -> KeyPath {
        self.state.borrow().source.path().clone()
    }

    #[must_use]
    pub fn current_value(&self) -> Value {
        self.state.borrow().source.current_value()
    }

    /// Number of hops currently subscribed.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.state.borrow().subs.len()
    }

    #[must_use]
    pub fn source(&self) -> ResolvedSource {
        self.state.borrow().source.clone()
    }
}

impl fmt::Debug for SourceWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("SourceWatch")
            .field("path", &state.source.path().to_string())
            .field("subscriptions", &state.subs.len())
            .finish()
    }
}

impl WatchState {
    fn subscribe_from(&mut self, start: usize, weak: &Weak<RefCell<WatchState>>) {
        for index in start..self.source.hops().len() {
            let hop = &self.source.hops()[index];
            let Some(object) = hop.object.upgrade() else {
                break;
            };
            let weak = weak.clone();
            let sub = object.watch_key(&hop.key, move |event| on_hop_change(&weak, index, event));
            self.subs.push(sub);
        }
    }

    fn rebuild_from(&mut self, start: usize, weak: &Weak<RefCell<WatchState>>) {
        let start = self.source.rewalk_from(start);
        self.subs.truncate(start);
        self.subscribe_from(self.subs.len(), weak);
        tracing::trace!(
            message = "watch.rebuild",
            path = %self.source.path(),
            from = start,
            hops = self.source.hops().len(),
        );
    }
}

fn on_hop_change(weak: &Weak<RefCell<WatchState>>, index: usize, event: &Event) -> Result<()> {
    let Some(state) = weak.upgrade() else {
        return Ok(());
    };
    let on_change = {
        let mut state = state.borrow_mut();
        if index + 1 < state.source.path().len() {
            state.rebuild_from(index + 1, weak);
        }
        Rc::clone(&state.on_change)
    };
    on_change(event)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use tether_core::Object;

    use super::*;

    fn counting(path: &str, root: &Object) -> (SourceWatch, Rc<Cell<u32>>) {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let source = ResolvedSource::new(root, KeyPath::parse(path).expect("path"));
        let watch = subscribe(source, move |_| {
            h.set(h.get() + 1);
            Ok(())
        });
        (watch, hits)
    }

    #[test]
    fn shallow_watch_fires_on_write() {
        let obj = Object::new();
        let (watch, hits) = counting("a", &obj);
        assert_eq!(watch.subscription_count(), 1);
        obj.set("a", 1).expect("set");
        assert_eq!(hits.get(), 1);
        obj.set("a", 1).expect("same value");
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn deep_watch_follows_replaced_intermediate() {
        let old_b = Object::new().with("c", 1);
        let a = Object::new().with("b", old_b.clone());
        let root = Object::new().with("a", a.clone());
        let (watch, hits) = counting("a.b.c", &root);
        assert_eq!(watch.subscription_count(), 3);

        let new_b = Object::new().with("c", 2);
        a.set("b", new_b.clone()).expect("swap");
        assert_eq!(hits.get(), 1);
        assert_eq!(watch.current_value(), Value::Int(2));
        assert_eq!(old_b.listener_count("_change:deps:c"), 0);
        assert_eq!(new_b.listener_count("_change:deps:c"), 1);

        old_b.set("c", 10).expect("stale write");
        assert_eq!(hits.get(), 1);
        new_b.set("c", 11).expect("live write");
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn chain_grows_when_path_becomes_reachable() {
        let root = Object::new();
        let (watch, hits) = counting("a.b", &root);
        assert_eq!(watch.subscription_count(), 1);
        let a = Object::new();
        root.set("a", a.clone()).expect("set");
        assert_eq!(watch.subscription_count(), 2);
        a.set("b", 5).expect("set");
        assert_eq!(hits.get(), 2);
        assert_eq!(watch.current_value(), Value::Int(5));
    }

    #[test]
    fn dropping_watch_removes_listeners() {
        let obj = Object::new();
        let (watch, hits) = counting("a", &obj);
        watch.unsubscribe();
        assert_eq!(obj.listener_count("_change:deps:a"), 0);
        obj.set("a", 1).expect("set");
        assert_eq!(hits.get(), 0);
    }
}
