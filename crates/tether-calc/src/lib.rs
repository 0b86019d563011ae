#![forbid(unsafe_code)]

//! Computed properties for [`tether_core::Object`].
//!
//! [`calc`] declares that `target.key` is a function of other keys, of deep
//! paths such as `order.items.count`, or of keys on other objects. Every
//! effective write to a source recomputes the value and writes it back
//! through the ordinary change-event path, so computed keys can feed further
//! computed keys.
//!
//! ```
//! use tether_calc::{CalcExt, CalcOptions};
//! use tether_core::{Object, Value};
//!
//! let order = Object::new().with("price", 4).with("qty", 3);
//! order
//!     .calc(
//!         "total",
//!         ["price", "qty"],
//!         |v| Value::from(v[0].as_i64().unwrap_or(0) * v[1].as_i64().unwrap_or(0)),
//!         CalcOptions::new(),
//!     )
//!     .unwrap();
//! assert_eq!(order.get("total"), Value::Int(12));
//!
//! order.set("qty", 5).unwrap();
//! assert_eq!(order.get("total"), Value::Int(20));
//! ```
//!
//! # Cycles
//!
//! Declarations may form cycles. Each external write starts a cascade, and a
//! binding is skipped when its `(object, key)` is already being recomputed in
//! that cascade. Cyclic graphs settle after a bounded number of steps, in an
//! order fixed by declaration order.
//!
//! # Debounce
//!
//! Debounced bindings defer their recompute to a [`RunLoop`] timer; a burst
//! of source writes inside the window yields one recompute, in a fresh
//! cascade. The host drives the loop with [`RunLoop::run_due`],
//! [`RunLoop::advance`] or [`RunLoop::run_until_idle`].
//!
//! # Tracing
//!
//! | event                     | level | fields                                  |
//! |---------------------------|-------|-----------------------------------------|
//! | `calc.declare`            | debug | binding, target, key, sources, flags    |
//! | `calc.replace`            | debug | target, key, replaced                   |
//! | `calc.recompute` (span)   | trace | binding, key, cascade                   |
//! | `calc.cycle_skip`         | trace | binding, key, cascade                   |
//! | `calc.debounce.schedule`  | trace | binding, key, window_us, superseded     |
//! | `watch.rebuild`           | trace | path, from, hops                        |
//! | `run_loop.turn`           | trace | ran, pending                            |

pub mod binding;
pub mod clock;
mod debounce;
pub mod error;
pub mod options;
pub mod path;
pub mod run_loop;
pub mod source;
pub mod watch;

use std::rc::Rc;

use tether_core::{ComputeError, Object, Value};

pub use binding::Binding;
pub use clock::{Clock, LabClock};
pub use error::{CalcError, Result};
pub use options::{CONTROL_OPTIONS, CalcOptions, Debounce, DebounceSettings, NormalizedOptions};
pub use path::{Hop, KeyPath, ResolvedSource};
pub use run_loop::{DEBOUNCE_WINDOW_ENV, RunLoop, RunLoopConfig, TimerId};
pub use source::{SourceRef, SourceSpec};
pub use watch::SourceWatch;

/// Declare `target.key` as computed from `sources` by an infallible
/// function.
///
/// `compute` receives the current source values in declaration order, with
/// `Value::Null` for anything missing. Declaring again on the same key
/// replaces the earlier binding.
///
/// # Errors
///
/// Declaration errors ([`CalcError::is_declaration`]) for malformed keys,
/// sources or options, and [`CalcError::Runtime`] if the initial recompute's
/// write fails in a listener.
pub fn calc<F>(
    target: &Object,
    key: &str,
    sources: impl Into<SourceSpec>,
    compute: F,
    options: CalcOptions,
) -> Result<Binding>
where
    F: Fn(&[Value]) -> Value + 'static,
{
    try_calc(target, key, sources, move |values| Ok(compute(values)), options)
}

/// Like [`calc`], for compute functions that can fail.
///
/// A failure leaves the target key untouched and surfaces as
/// [`tether_core::Error::Compute`] from the write that triggered it.
pub fn try_calc<F>(
    target: &Object,
    key: &str,
    sources: impl Into<SourceSpec>,
    compute: F,
    options: CalcOptions,
) -> Result<Binding>
where
    F: Fn(&[Value]) -> std::result::Result<Value, ComputeError> + 'static,
{
    binding::declare(target, key, sources.into(), Rc::new(compute), options)
}

/// Remove the binding on `target.key`. Returns `false` if there was none.
///
/// The current value of the key is left in place.
pub fn uncalc(target: &Object, key: &str) -> bool {
    binding::undeclare(target, key)
}

/// Bindings attached to `target`, ordered by key.
#[must_use]
pub fn bindings(target: &Object) -> Vec<Binding> {
    binding::attached(target)
}

/// Method-style access to [`calc`] and friends.
pub trait CalcExt {
    fn calc<F>(
        &self,
        key: &str,
        sources: impl Into<SourceSpec>,
        compute: F,
        options: CalcOptions,
    ) -> Result<Binding>
    where
        F: Fn(&[Value]) -> Value + 'static;

    fn try_calc<F>(
        &self,
        key: &str,
        sources: impl Into<SourceSpec>,
        compute: F,
        options: CalcOptions,
    ) -> Result<Binding>
    where
        F: Fn(&[Value]) -> std::result::Result<Value, ComputeError> + 'static;

    fn uncalc(&self, key: &str) -> bool;

    fn bindings(&self) -> Vec<Binding>;
}

impl CalcExt for Object {
    fn calc<F>(
        &self,
        key: &str,
        sources: impl Into<SourceSpec>,
        compute: F,
        options: CalcOptions,
    ) -> Result<Binding>
    where
        F: Fn(&[Value]) -> Value + 'static,
    {
        calc(self, key, sources, compute, options)
    }

    fn try_calc<F>(
        &self,
        key: &str,
        sources: impl Into<SourceSpec>,
        compute: F,
        options: CalcOptions,
    ) -> Result<Binding>
    where
        F: Fn(&[Value]) -> std::result::Result<Value, ComputeError> + 'static,
    {
        try_calc(self, key, sources, compute, options)
    }

    fn uncalc(&self, key: &str) -> bool {
        uncalc(self, key)
    }

    fn bindings(&self) -> Vec<Binding> {
        bindings(self)
    }
}
