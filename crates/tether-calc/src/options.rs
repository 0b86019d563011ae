#![forbid(unsafe_code)]

//! Declaration options: control flags plus opaque payload fields.
//!
//! Three fields are control options and never reach listeners:
//!
//! | name        | type                          | default |
//! |-------------|-------------------------------|---------|
//! | `setOnInit` | bool                          | `true`  |
//! | `silent`    | bool                          | `false` |
//! | `debounce`  | bool, or milliseconds (>= 0)  | `false` |
//!
//! Every other field is copied verbatim into the payload of the
//! `change:<key>` events the binding emits.

use tether_core::{Fields, Value};
use web_time::Duration;

use crate::error::{CalcError, Result};
use crate::run_loop::RunLoop;

/// Field names recognised as control options by [`CalcOptions::from_fields`].
pub const CONTROL_OPTIONS: [&str; 4] = ["setOnInit", "set_on_init", "silent", "debounce"];

/// Debounce request as declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Debounce {
    #[default]
    Off,
    /// Use the run loop's default window.
    On,
    Window(Duration),
}

/// Options for one `calc` declaration.
///
/// Unset control options fall back to their defaults during
/// [`normalize`](Self::normalize); [`merge`](Self::merge) lets a later set
/// override an earlier one field by field.
#[derive(Debug, Clone, Default)]
pub struct CalcOptions {
    set_on_init: Option<bool>,
    silent: Option<bool>,
    debounce: Option<Debounce>,
    run_loop: Option<RunLoop>,
    fields: Fields,
}

impl CalcOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a dynamic option map, type-checking control fields.
    pub fn from_fields(fields: Fields) -> Result<Self> {
        let mut options = Self::default();
        for (name, value) in fields {
            match name.as_str() {
                "setOnInit" | "set_on_init" => {
                    options.set_on_init = Some(expect_bool(&name, &value)?);
                }
                "silent" => options.silent = Some(expect_bool(&name, &value)?),
                "debounce" => options.debounce = Some(parse_debounce(&value)?),
                _ => {
                    options.fields.insert(name, value);
                }
            }
        }
        Ok(options)
    }

    /// Run the first recompute during the declaration.
    #[must_use]
    pub fn set_on_init(mut self, enabled: bool) -> Self {
        self.set_on_init = Some(enabled);
        self
    }

    /// Write computed values without the public `change:<key>` event.
    #[must_use]
    pub fn silent(mut self, enabled: bool) -> Self {
        self.silent = Some(enabled);
        self
    }

    /// Debounce with the run loop's default window.
    #[must_use]
    pub fn debounce(mut self, enabled: bool) -> Self {
        self.debounce = Some(if enabled { Debounce::On } else { Debounce::Off });
        self
    }

    /// Debounce with an explicit settle window.
    #[must_use]
    pub fn debounce_for(mut self, window: Duration) -> Self {
        self.debounce = Some(Debounce::Window(window));
        self
    }

    /// Run loop that debounced recomputes are scheduled on. Defaults to
    /// [`RunLoop::current`].
    #[must_use]
    pub fn run_loop(mut self, run_loop: &RunLoop) -> Self {
        self.run_loop = Some(run_loop.clone());
        self
    }

    /// Opaque field forwarded to listeners.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Overlay `other` on `self`: options set in `other` win.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.set_on_init = other.set_on_init.or(self.set_on_init);
        self.silent = other.silent.or(self.silent);
        self.debounce = other.debounce.or(self.debounce);
        self.run_loop = other.run_loop.or(self.run_loop);
        self.fields.extend(other.fields);
        self
    }

    /// Apply defaults and resolve the debounce window.
    #[must_use]
    pub fn normalize(self) -> NormalizedOptions {
        let debounce = match self.debounce.unwrap_or_default() {
            Debounce::Off => None,
            Debounce::On => {
                let run_loop = self.run_loop.unwrap_or_else(RunLoop::current);
                let window = run_loop.default_debounce();
                Some(DebounceSettings { window, run_loop })
            }
            Debounce::Window(window) => Some(DebounceSettings {
                window,
                run_loop: self.run_loop.unwrap_or_else(RunLoop::current),
            }),
        };
        NormalizedOptions {
            set_on_init: self.set_on_init.unwrap_or(true),
            silent: self.silent.unwrap_or(false),
            debounce,
            fields: self.fields,
        }
    }
}

/// Resolved debounce parameters.
#[derive(Debug, Clone)]
pub struct DebounceSettings {
    pub window: Duration,
    pub run_loop: RunLoop,
}

/// Options with every default applied.
#[derive(Debug, Clone)]
pub struct NormalizedOptions {
    pub set_on_init: bool,
    pub silent: bool,
    pub debounce: Option<DebounceSettings>,
    /// Opaque fields, control options excluded.
    pub fields: Fields,
}

impl Default for NormalizedOptions {
    fn default() -> Self {
        CalcOptions::default().normalize()
    }
}

fn expect_bool(name: &str, value: &Value) -> Result<bool> {
    value.as_bool().ok_or_else(|| CalcError::InvalidOption {
        name: name.to_owned(),
        expected: "a boolean",
        found: value.type_name(),
    })
}

fn parse_debounce(value: &Value) -> Result<Debounce> {
    let invalid = || CalcError::InvalidOption {
        name: "debounce".to_owned(),
        expected: "a boolean or non-negative milliseconds",
        found: value.type_name(),
    };
    match value {
        Value::Bool(true) => Ok(Debounce::On),
        Value::Bool(false) => Ok(Debounce::Off),
        Value::Int(ms) => u64::try_from(*ms)
            .map(|ms| Debounce::Window(Duration::from_millis(ms)))
            .map_err(|_| invalid()),
        Value::Float(ms) if *ms >= 0.0 => Duration::try_from_secs_f64(ms / 1000.0)
            .map(Debounce::Window)
            .map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}
