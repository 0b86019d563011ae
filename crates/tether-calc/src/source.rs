#![forbid(unsafe_code)]

//! Source specifications and their flattening into `(object, path)` pairs.

use std::fmt;

use tether_core::{Object, Value};

use crate::error::{CalcError, Result};
use crate::path::KeyPath;

/// The sources a binding reads, as declared.
///
/// ```text
/// "total"                          Key
/// "order.total"                    Key (deep path)
/// ["a", "b.c"]                     List
/// { object: other, key: "x" }      Foreign
/// ["a", { object: other, key: ["x", "y"] }]
/// ```
#[derive(Debug, Clone)]
pub enum SourceSpec {
    /// Key or dotted path on the target object.
    Key(String),
    /// Several sources, flattened in order. Lists do not nest.
    List(Vec<SourceSpec>),
    /// Key, path, or list of those on another object.
    Foreign {
        object: Object,
        key: Box<SourceSpec>,
    },
}

impl SourceSpec {
    #[must_use]
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key(key.into())
    }

    #[must_use]
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SourceSpec>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Sources living on `object` instead of the target.
    #[must_use]
    pub fn foreign(object: &Object, key: impl Into<SourceSpec>) -> Self {
        Self::Foreign {
            object: object.clone(),
            key: Box::new(key.into()),
        }
    }

    /// Parse a dynamic value: a string, a list, or an object with `object`
    /// and `key` fields.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Str(key) => Ok(Self::Key(key.clone())),
            Value::List(items) => items
                .iter()
                .map(Self::from_value)
                .collect::<Result<Vec<_>>>()
                .map(Self::List),
            Value::Object(descriptor) => {
                let object = match descriptor.get("object") {
                    Value::Object(object) => object,
                    Value::Null => {
                        return Err(CalcError::descriptor("missing `object` field"));
                    }
                    other => {
                        return Err(CalcError::descriptor(format!(
                            "`object` must be an object, got {}",
                            other.type_name()
                        )));
                    }
                };
                let key = match descriptor.get("key") {
                    Value::Null => return Err(CalcError::descriptor("missing `key` field")),
                    key => Self::from_value(&key)?,
                };
                Ok(Self::Foreign {
                    object,
                    key: Box::new(key),
                })
            }
            other => Err(CalcError::source_spec(
                other.to_string(),
                "expected a key, a list, or an {object, key} descriptor",
            )),
        }
    }

    /// Flatten into `(object, path)` pairs in declaration order, validating
    /// the shape. Plain keys resolve against `target`.
    pub fn resolve(&self, target: &Object) -> Result<Vec<SourceRef>> {
        let mut out = Vec::new();
        collect(target, self, Level::Top, &mut out)?;
        Ok(out)
    }
}

/// One flattened source: a path read from a specific object.
#[derive(Debug, Clone)]
pub struct SourceRef {
    pub object: Object,
    pub path: KeyPath,
}

#[derive(Clone, Copy)]
enum Level {
    Top,
    InList,
    InDescriptor,
    InDescriptorList,
}

fn collect(
    object: &Object,
    spec: &SourceSpec,
    level: Level,
    out: &mut Vec<SourceRef>,
) -> Result<()> {
    match spec {
        SourceSpec::Key(key) => {
            out.push(SourceRef {
                object: object.clone(),
                path: KeyPath::parse(key)?,
            });
        }
        SourceSpec::List(items) => {
            let inner = match level {
                Level::Top => Level::InList,
                Level::InDescriptor => Level::InDescriptorList,
                Level::InList => {
                    return Err(CalcError::source_spec(
                        spec.to_string(),
                        "lists cannot be nested",
                    ));
                }
                Level::InDescriptorList => {
                    return Err(CalcError::descriptor("key lists cannot be nested"));
                }
            };
            for item in items {
                collect(object, item, inner, out)?;
            }
        }
        SourceSpec::Foreign { object: foreign, key } => match level {
            Level::Top | Level::InList => collect(foreign, key, Level::InDescriptor, out)?,
            Level::InDescriptor | Level::InDescriptorList => {
                return Err(CalcError::descriptor(
                    "key must be a key, a path, or a list of those",
                ));
            }
        },
    }
    Ok(())
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Foreign { object, key } => {
                write!(f, "{{object #{}, key {key}}}", object.id().raw())
            }
        }
    }
}

impl From<&str> for SourceSpec {
    fn from(key: &str) -> Self {
        Self::Key(key.to_owned())
    }
}

impl From<String> for SourceSpec {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<&String> for SourceSpec {
    fn from(key: &String) -> Self {
        Self::Key(key.clone())
    }
}

impl<const N: usize> From<[&str; N]> for SourceSpec {
    fn from(keys: [&str; N]) -> Self {
        Self::list(keys)
    }
}

impl From<Vec<&str>> for SourceSpec {
    fn from(keys: Vec<&str>) -> Self {
        Self::list(keys)
    }
}

impl From<Vec<String>> for SourceSpec {
    fn from(keys: Vec<String>) -> Self {
        Self::list(keys)
    }
}

impl<const N: usize> From<[SourceSpec; N]> for SourceSpec {
    fn from(items: [SourceSpec; N]) -> Self {
        Self::List(items.into())
    }
}

impl From<Vec<SourceSpec>> for SourceSpec {
    fn from(items: Vec<SourceSpec>) -> Self {
        Self::List(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(refs: &[SourceRef]) -> Vec<String> {
        refs.iter().map(|r| r.path.to_string()).collect()
    }

    #[test]
    fn single_key_resolves_on_target() {
        let target = Object::new();
        let refs = SourceSpec::from("a").resolve(&target).expect("valid");
        assert_eq!(refs.len(), 1);
        assert!(refs[0].object.ptr_eq(&target));
    }

    #[test]
    fn mixed_list_flattens_in_order() {
        let target = Object::new();
        let other = Object::new();
        let spec = SourceSpec::from([
            SourceSpec::key("a"),
            SourceSpec::foreign(&other, ["x", "y.z"]),
            SourceSpec::key("b"),
        ]);
        let refs = spec.resolve(&target).expect("valid");
        assert_eq!(paths(&refs), vec!["a", "x", "y.z", "b"]);
        assert!(refs[0].object.ptr_eq(&target));
        assert!(refs[1].object.ptr_eq(&other));
        assert!(refs[2].object.ptr_eq(&other));
        assert!(refs[3].object.ptr_eq(&target));
    }

    #[test]
    fn empty_list_is_allowed() {
        let refs = SourceSpec::List(Vec::new())
            .resolve(&Object::new())
            .expect("valid");
        assert!(refs.is_empty());
    }

    #[test]
    fn nested_lists_are_rejected() {
        let spec = SourceSpec::List(vec![SourceSpec::from(["a", "b"])]);
        let err = spec.resolve(&Object::new()).expect_err("nested");
        assert!(matches!(err, CalcError::InvalidSource { .. }));
    }

    #[test]
    fn descriptor_inside_descriptor_is_rejected() {
        let a = Object::new();
        let b = Object::new();
        let spec = SourceSpec::foreign(&a, SourceSpec::foreign(&b, "x"));
        let err = spec.resolve(&Object::new()).expect_err("nested descriptor");
        assert!(matches!(err, CalcError::InvalidDescriptor { .. }));
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(SourceSpec::from("").resolve(&Object::new()).is_err());
        assert!(SourceSpec::from(["a", "b..c"]).resolve(&Object::new()).is_err());
    }

    #[test]
    fn from_value_parses_descriptor() {
        let other = Object::new();
        let raw = Value::List(vec![
            Value::from("a"),
            Value::Object(
                Object::new()
                    .with("object", other.clone())
                    .with("key", "b.c"),
            ),
        ]);
        let refs = SourceSpec::from_value(&raw)
            .expect("parse")
            .resolve(&Object::new())
            .expect("valid");
        assert_eq!(paths(&refs), vec!["a", "b.c"]);
        assert!(refs[1].object.ptr_eq(&other));
    }

    #[test]
    fn from_value_rejects_malformed_shapes() {
        let no_object = Value::Object(Object::new().with("key", "a"));
        assert!(matches!(
            SourceSpec::from_value(&no_object),
            Err(CalcError::InvalidDescriptor { .. })
        ));
        let bad_object = Value::Object(Object::new().with("object", 3).with("key", "a"));
        assert!(matches!(
            SourceSpec::from_value(&bad_object),
            Err(CalcError::InvalidDescriptor { .. })
        ));
        assert!(matches!(
            SourceSpec::from_value(&Value::Int(4)),
            Err(CalcError::InvalidSource { .. })
        ));
    }
}
