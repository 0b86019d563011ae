#![forbid(unsafe_code)]

//! Key paths and their resolution into concrete hop chains.
//!
//! A [`ResolvedSource`] for `a.b.c` rooted at `obj` holds one [`Hop`] per
//! segment: `(obj, "a")`, `(obj.a, "b")`, `(obj.a.b, "c")`. The chain stops
//! early at the first intermediate value that is not an object; reads past
//! that point yield `Value::Null`.
//!
//! Hops hold their objects weakly. A chain never keeps the objects it walks
//! through alive.

use std::fmt;

use tether_core::{Object, Value, WeakObject};

use crate::error::{CalcError, Result};

/// A validated dotted key path (`a`, `a.b.c`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// Parse `raw`, rejecting empty keys and empty segments.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(CalcError::source_spec(raw, "key is empty"));
        }
        let segments: Vec<String> = raw.split('.').map(str::to_owned).collect();
        if segments.iter().any(String::is_empty) {
            return Err(CalcError::source_spec(raw, "path has an empty segment"));
        }
        Ok(Self { segments })
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments; never zero.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always `false`; parsing rejects empty paths.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    #[must_use]
    pub fn is_deep(&self) -> bool {
        self.segments.len() > 1
    }

    /// Read this path from `root`.
    #[must_use]
    pub fn read(&self, root: &Object) -> Value {
        root.get_in(self.segments.iter().map(String::as_str))
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// One link of a resolved chain: `key` as read on `object`.
#[derive(Debug, Clone)]
pub struct Hop {
    pub object: WeakObject,
    pub key: String,
}

/// A key path bound to a root object, with the chain of hops currently
/// reachable from it.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    root: WeakObject,
    path: KeyPath,
    hops: Vec<Hop>,
}

impl ResolvedSource {
    /// Walk `path` from `root` as it stands now.
    #[must_use]
    pub fn new(root: &Object, path: KeyPath) -> Self {
        let mut resolved = Self {
            root: root.downgrade(),
            path,
            hops: Vec::new(),
        };
        resolved.extend();
        resolved
    }

    #[must_use]
    pub fn path(&self) -> &KeyPath {
        &self.path
    }

    #[must_use]
    pub fn root(&self) -> Option<Object> {
        self.root.upgrade()
    }

    #[must_use]
    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    /// Whether every segment currently has a hop.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.hops.len() == self.path.len()
    }

    /// Current value at the end of the path, read fresh from the root.
    #[must_use]
    pub fn current_value(&self) -> Value {
        self.root
            .upgrade()
            .map_or(Value::Null, |root| self.path.read(&root))
    }

    /// Drop hops from `index` on and re-walk from the object now reached by
    /// hop `index - 1`. Returns the index of the first rebuilt hop.
    pub(crate) fn rewalk_from(&mut self, index: usize) -> usize {
        let index = index.min(self.hops.len());
        self.hops.truncate(index);
        self.extend();
        index
    }

    fn extend(&mut self) {
        if self.hops.is_empty() {
            if self.root.upgrade().is_none() {
                return;
            }
            self.hops.push(Hop {
                object: self.root.clone(),
                key: self.path.segments[0].clone(),
            });
        }
        while self.hops.len() < self.path.len() {
            let Some(last) = self.hops.last() else {
                break;
            };
            let Some(object) = last.object.upgrade() else {
                break;
            };
            let Value::Object(next) = object.get(&last.key) else {
                break;
            };
            let key = self.path.segments[self.hops.len()].clone();
            self.hops.push(Hop {
                object: next.downgrade(),
                key,
            });
        }
    }
}
