#![forbid(unsafe_code)]

//! Change events and write options.

use std::collections::BTreeMap;

use crate::cascade::Cascade;
use crate::value::Value;

/// Opaque caller-supplied fields carried on an event payload.
pub type Fields = BTreeMap<String, Value>;

const CHANGE_PREFIX: &str = "change:";
const DEPS_PREFIX: &str = "_change:deps:";

/// Public change event name for `key` (skipped by silent writes).
#[must_use]
pub fn change_event(key: &str) -> String {
    format!("{CHANGE_PREFIX}{key}")
}

/// Dependency-tracking event name for `key` (fired on every effective write).
#[must_use]
pub fn deps_event(key: &str) -> String {
    format!("{DEPS_PREFIX}{key}")
}

/// Payload delivered to listeners.
#[derive(Debug, Clone)]
pub struct Event {
    /// Event name the payload was emitted under.
    pub name: String,
    /// Key that changed, for change events.
    pub key: Option<String>,
    pub value: Value,
    pub previous: Value,
    /// Opaque fields supplied by whoever caused the write.
    pub fields: Fields,
    pub silent: bool,
    cascade: Cascade,
}

impl Event {
    /// A custom event with no change metadata, starting its own cascade.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: None,
            value: Value::Null,
            previous: Value::Null,
            fields: Fields::new(),
            silent: false,
            cascade: Cascade::new(),
        }
    }

    pub(crate) fn change(
        key: &str,
        value: Value,
        previous: Value,
        fields: Fields,
        silent: bool,
        cascade: Cascade,
    ) -> Self {
        Self {
            name: deps_event(key),
            key: Some(key.to_owned()),
            value,
            previous,
            fields,
            silent,
            cascade,
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_cascade(mut self, cascade: Cascade) -> Self {
        self.cascade = cascade;
        self
    }

    /// Opaque field lookup.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Cascade of the write that produced this event.
    #[must_use]
    pub fn cascade(&self) -> &Cascade {
        &self.cascade
    }
}

/// Options for [`Object::set_with`](crate::Object::set_with).
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Skip the public `change:<key>` event. Dependency tracking still fires.
    pub silent: bool,
    /// Emit even if the value did not change.
    pub force: bool,
    /// Fields merged into the event payload.
    pub fields: Fields,
    /// Cascade to join; a fresh one is started when `None`.
    pub cascade: Option<Cascade>,
}

impl SetOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn fields(mut self, fields: Fields) -> Self {
        self.fields.extend(fields);
        self
    }

    #[must_use]
    pub fn cascade(mut self, cascade: Cascade) -> Self {
        self.cascade = Some(cascade);
        self
    }
}
