#![forbid(unsafe_code)]

//! Observable objects.
//!
//! [`Object`] is a shared map from string keys to [`Value`]s. Cloning an
//! `Object` yields another handle to the **same** object; identity is stable
//! and exposed as [`ObjectId`].
//!
//! Every effective write goes through [`Object::set_with`], which stores the
//! value first and then emits `_change:deps:<key>` followed (unless silent) by
//! `change:<key>`. Listener failures are returned to the writer; the stored
//! value is not rolled back.
//!
//! Objects also carry named attachment slots (`Rc<dyn Any>`), which let
//! higher layers hang state off an object whose lifetime should follow it.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::event::{Event, Fields, SetOptions, change_event, deps_event};
use crate::listener::{Listeners, Subscription};
use crate::value::Value;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of an [`Object`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

pub(crate) struct ObjectInner {
    id: ObjectId,
    props: RefCell<BTreeMap<String, Value>>,
    pub(crate) listeners: Listeners,
    attachments: RefCell<BTreeMap<String, Rc<dyn Any>>>,
}

/// Shared observable object handle.
#[derive(Clone)]
pub struct Object {
    inner: Rc<ObjectInner>,
}

impl Object {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                id: ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)),
                props: RefCell::new(BTreeMap::new()),
                listeners: Listeners::default(),
                attachments: RefCell::new(BTreeMap::new()),
            }),
        }
    }

    /// Builder-style initial value. Emits nothing.
    #[must_use]
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inner
            .props
            .borrow_mut()
            .insert(key.into(), value.into());
        self
    }

    pub(crate) fn inner(&self) -> &ObjectInner {
        &self.inner
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakObject {
        WeakObject {
            inner: Rc::downgrade(&self.inner),
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Current value of `key`, or `Value::Null` if unset.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        self.inner
            .props
            .borrow()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Follow `segments` through nested objects. Any missing or non-object
    /// intermediate yields `Value::Null`.
    #[must_use]
    pub fn get_in<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Value {
        let mut current = Value::Object(self.clone());
        for segment in segments {
            current = match current {
                Value::Object(o) => o.get(segment),
                _ => return Value::Null,
            };
        }
        current
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.props.borrow().contains_key(key)
    }

    /// Keys in ascending order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.props.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.props.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.props.borrow().is_empty()
    }

    /// First key (in key order) whose value equals `value`.
    #[must_use]
    pub fn key_of(&self, value: &Value) -> Option<String> {
        self.inner
            .props
            .borrow()
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(k, _)| k.clone())
    }

    /// Snapshot iterator over `(key, value)` pairs. Each call starts over.
    #[must_use]
    pub fn iter(&self) -> Entries {
        let snapshot: Vec<(String, Value)> = self
            .inner
            .props
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Entries {
            inner: snapshot.into_iter(),
        }
    }

    /// Alias of [`iter`](Self::iter).
    #[must_use]
    pub fn entries(&self) -> Entries {
        self.iter()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Write `value` to `key`, notifying listeners if it changed.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.set_with(key, value.into(), SetOptions::default())
    }

    /// Write with explicit options.
    ///
    /// The value is stored before any listener runs, so listeners observe the
    /// new state. Returns the first listener failure.
    pub fn set_with(&self, key: &str, value: Value, options: SetOptions) -> Result<()> {
        let previous = {
            let mut props = self.inner.props.borrow_mut();
            let previous = props.get(key).cloned().unwrap_or_default();
            if previous == value && !options.force {
                return Ok(());
            }
            props.insert(key.to_owned(), value.clone());
            previous
        };
        self.notify(key, value, previous, options)
    }

    /// Remove `key`, emitting a change to `Value::Null` if it was present.
    pub fn remove(&self, key: &str) -> Result<Option<Value>> {
        let Some(previous) = self.inner.props.borrow_mut().remove(key) else {
            return Ok(None);
        };
        self.notify(key, Value::Null, previous.clone(), SetOptions::default())?;
        Ok(Some(previous))
    }

    fn notify(&self, key: &str, value: Value, previous: Value, options: SetOptions) -> Result<()> {
        let SetOptions {
            silent,
            fields,
            cascade,
            ..
        } = options;
        let cascade = cascade.unwrap_or_default();
        tracing::trace!(
            message = "object.set",
            object = self.id().raw(),
            key,
            silent,
            cascade = cascade.id()
        );
        let mut event = Event::change(key, value, previous, fields, silent, cascade);
        self.inner.listeners.emit(&event)?;
        if !silent {
            event.name = change_event(key);
            self.inner.listeners.emit(&event)?;
        }
        Ok(())
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Register a listener that lives as long as the returned guard.
    pub fn subscribe(
        &self,
        event: &str,
        handler: impl Fn(&Event) -> Result<()> + 'static,
    ) -> Subscription {
        let id = self.inner.listeners.add(event, Rc::new(handler));
        Subscription::new(Rc::downgrade(&self.inner), id)
    }

    /// Subscribe to the dependency channel of `key` (fires on every
    /// effective write, silent or not).
    pub fn watch_key(
        &self,
        key: &str,
        handler: impl Fn(&Event) -> Result<()> + 'static,
    ) -> Subscription {
        self.subscribe(&deps_event(key), handler)
    }

    /// Emit a custom event.
    pub fn emit(&self, event: &Event) -> Result<()> {
        self.inner.listeners.emit(event)
    }

    /// Emit a custom event named `name` carrying `fields`.
    pub fn trigger(&self, name: &str, fields: Fields) -> Result<()> {
        let mut event = Event::new(name);
        event.fields = fields;
        self.emit(&event)
    }

    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.listeners.count(event)
    }

    // ── Attachments ──────────────────────────────────────────────────

    /// Store `value` under `slot`, returning what was there.
    ///
    /// The previous value is handed back rather than dropped here, so its
    /// destructor runs outside this object's borrow.
    pub fn attach(&self, slot: &str, value: Rc<dyn Any>) -> Option<Rc<dyn Any>> {
        self.inner
            .attachments
            .borrow_mut()
            .insert(slot.to_owned(), value)
    }

    pub fn detach(&self, slot: &str) -> Option<Rc<dyn Any>> {
        self.inner.attachments.borrow_mut().remove(slot)
    }

    #[must_use]
    pub fn attachment(&self, slot: &str) -> Option<Rc<dyn Any>> {
        self.inner.attachments.borrow().get(slot).cloned()
    }

    /// Attachments whose slot starts with `prefix`, in slot order.
    #[must_use]
    pub fn attachments(&self, prefix: &str) -> Vec<(String, Rc<dyn Any>)> {
        self.inner
            .attachments
            .borrow()
            .iter()
            .filter(|(slot, _)| slot.starts_with(prefix))
            .map(|(slot, v)| (slot.clone(), Rc::clone(v)))
            .collect()
    }

    // ── Serialization ────────────────────────────────────────────────

    /// Plain JSON view of this object and everything reachable from it.
    ///
    /// Object graphs with cycles recurse without bound.
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Object");
        dbg.field("id", &self.inner.id.0);
        match self.inner.props.try_borrow() {
            Ok(props) => dbg.field("keys", &props.keys().collect::<Vec<_>>()),
            Err(_) => dbg.field("keys", &"<borrowed>"),
        };
        dbg.finish()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let obj = Self::new();
        {
            let mut props = obj.inner.props.borrow_mut();
            for (k, v) in iter {
                props.insert(k.into(), v.into());
            }
        }
        obj
    }
}

impl IntoIterator for &Object {
    type Item = (String, Value);
    type IntoIter = Entries;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Object {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let entries: Vec<(String, Value)> = self.iter().collect();
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (k, v) in &entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Finite snapshot of an object's `(key, value)` pairs.
#[derive(Debug)]
pub struct Entries {
    inner: std::vec::IntoIter<(String, Value)>,
}

impl Iterator for Entries {
    type Item = (String, Value);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Entries {}

/// Non-owning handle to an [`Object`].
#[derive(Clone)]
pub struct WeakObject {
    inner: Weak<ObjectInner>,
}

impl WeakObject {
    #[must_use]
    pub fn upgrade(&self) -> Option<Object> {
        self.inner.upgrade().map(|inner| Object { inner })
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(obj) => f.debug_tuple("WeakObject").field(&obj.id()).finish(),
            None => f.write_str("WeakObject(<dropped>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::Cell;

    fn counter(obj: &Object, event: &str) -> (Rc<Cell<u32>>, Subscription) {
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        let sub = obj.subscribe(event, move |_| {
            h.set(h.get() + 1);
            Ok(())
        });
        (hits, sub)
    }

    #[test]
    fn get_missing_is_null() {
        let obj = Object::new();
        assert!(obj.get("nope").is_null());
        assert!(!obj.contains_key("nope"));
    }

    #[test]
    fn set_emits_deps_then_change() {
        let obj = Object::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let o1 = Rc::clone(&order);
        let _a = obj.subscribe("change:a", move |e| {
            o1.borrow_mut().push(e.name.clone());
            Ok(())
        });
        let o2 = Rc::clone(&order);
        let _b = obj.watch_key("a", move |e| {
            o2.borrow_mut().push(e.name.clone());
            Ok(())
        });
        obj.set("a", 1).expect("set");
        assert_eq!(*order.borrow(), vec!["_change:deps:a", "change:a"]);
    }

    #[test]
    fn same_value_write_is_noop() {
        let obj = Object::new().with("a", 1);
        let (hits, _sub) = counter(&obj, "change:a");
        obj.set("a", 1).expect("set");
        assert_eq!(hits.get(), 0);
        obj.set("a", 2).expect("set");
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn write_across_numeric_variants_is_stored_verbatim() {
        let obj = Object::new().with("a", Value::Float(9_007_199_254_740_992.0));
        let (hits, _sub) = counter(&obj, "change:a");
        obj.set("a", Value::Int((1 << 53) + 1)).expect("set");
        assert_eq!(obj.get("a"), Value::Int((1 << 53) + 1));
        obj.set("a", Value::Float(3.0)).expect("set");
        obj.set("a", Value::Int(3)).expect("set");
        assert_eq!(obj.get("a"), Value::Int(3));
        assert_eq!(hits.get(), 3);
    }

    #[test]
    fn force_emits_without_change() {
        let obj = Object::new().with("a", 1);
        let (hits, _sub) = counter(&obj, "change:a");
        obj.set_with("a", Value::Int(1), SetOptions::new().force(true))
            .expect("set");
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn silent_skips_public_event_only() {
        let obj = Object::new();
        let (public, _p) = counter(&obj, "change:a");
        let (deps, _d) = counter(&obj, "_change:deps:a");
        obj.set_with("a", Value::Int(5), SetOptions::new().silent(true))
            .expect("set");
        assert_eq!(obj.get("a"), Value::Int(5));
        assert_eq!(public.get(), 0);
        assert_eq!(deps.get(), 1);
    }

    #[test]
    fn event_carries_metadata_and_fields() {
        let obj = Object::new().with("a", 1);
        let seen = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        let _sub = obj.subscribe("change:a", move |e| {
            *s.borrow_mut() = Some(e.clone());
            Ok(())
        });
        obj.set_with("a", Value::Int(2), SetOptions::new().field("foo", "bar"))
            .expect("set");
        let evt = seen.borrow().clone().expect("event delivered");
        assert_eq!(evt.key.as_deref(), Some("a"));
        assert_eq!(evt.value, Value::Int(2));
        assert_eq!(evt.previous, Value::Int(1));
        assert_eq!(evt.get("foo"), Some(&Value::from("bar")));
    }

    #[test]
    fn one_cascade_per_external_write() {
        let obj = Object::new();
        let ids = Rc::new(RefCell::new(Vec::new()));
        let i = Rc::clone(&ids);
        let _d = obj.watch_key("a", move |e| {
            i.borrow_mut().push(e.cascade().id());
            Ok(())
        });
        let i = Rc::clone(&ids);
        let _c = obj.subscribe("change:a", move |e| {
            i.borrow_mut().push(e.cascade().id());
            Ok(())
        });
        obj.set("a", 1).expect("set");
        obj.set("a", 2).expect("set");
        let ids = ids.borrow();
        assert_eq!(ids[0], ids[1]);
        assert_eq!(ids[2], ids[3]);
        assert_ne!(ids[0], ids[2]);
    }

    #[test]
    fn listener_error_propagates_but_value_sticks() {
        let obj = Object::new();
        let _sub = obj.subscribe("change:a", |_| Err(Error::listener("change:a", "rejected")));
        let err = obj.set("a", 1).expect_err("listener fails");
        assert!(err.to_string().contains("rejected"));
        assert_eq!(obj.get("a"), Value::Int(1));
    }

    #[test]
    fn get_in_walks_nested_objects() {
        let c = Object::new().with("c", 7);
        let b = Object::new().with("b", c);
        let root = Object::new().with("a", b).with("x", 1);
        assert_eq!(root.get_in(["a", "b", "c"]), Value::Int(7));
        assert!(root.get_in(["a", "z", "c"]).is_null());
        assert!(root.get_in(["x", "y"]).is_null());
    }

    #[test]
    fn remove_emits_change_to_null() {
        let obj = Object::new().with("a", 3);
        let (hits, _sub) = counter(&obj, "change:a");
        assert_eq!(obj.remove("a").expect("remove"), Some(Value::Int(3)));
        assert_eq!(hits.get(), 1);
        assert_eq!(obj.remove("a").expect("remove"), None);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn iteration_is_restartable_and_ordered() {
        let obj: Object = [("b", 2), ("a", 1)].into_iter().collect();
        let first: Vec<_> = obj.iter().map(|(k, _)| k).collect();
        let second: Vec<_> = (&obj).into_iter().map(|(k, _)| k).collect();
        assert_eq!(first, vec!["a", "b"]);
        assert_eq!(first, second);
        assert_eq!(obj.entries().len(), 2);
    }

    #[test]
    fn key_of_finds_value() {
        let obj = Object::new().with("a", 1).with("b", "x");
        assert_eq!(obj.key_of(&Value::from("x")).as_deref(), Some("b"));
        assert!(obj.key_of(&Value::Int(9)).is_none());
    }

    #[test]
    fn attachments_replace_and_detach() {
        let obj = Object::new();
        assert!(obj.attach("calc:a", Rc::new(1u8)).is_none());
        let old = obj.attach("calc:a", Rc::new(2u8)).expect("previous");
        assert_eq!(old.downcast_ref::<u8>(), Some(&1));
        obj.attach("other", Rc::new(3u8));
        assert_eq!(obj.attachments("calc:").len(), 1);
        assert!(obj.detach("calc:a").is_some());
        assert!(obj.attachment("calc:a").is_none());
    }

    #[test]
    fn weak_object_does_not_keep_alive() {
        let weak = {
            let obj = Object::new();
            let weak = obj.downgrade();
            assert!(weak.upgrade().is_some());
            weak
        };
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn to_json_nested() {
        let inner = Object::new().with("c", 1);
        let obj = Object::new().with("a", inner).with("s", "x");
        let json = obj.to_json().expect("json");
        assert_eq!(json, serde_json::json!({"a": {"c": 1}, "s": "x"}));
    }
}
