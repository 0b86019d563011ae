#![forbid(unsafe_code)]

//! Core: observable objects, change events, and per-mutation cascade tracking.
//!
//! - [`Object`]: a shared, identity-bearing map of [`Value`]s whose writes
//!   emit change events.
//! - [`Event`] / [`SetOptions`]: the change payload and the knobs of a write.
//! - [`Subscription`]: RAII guard that removes its listener on drop.
//! - [`Cascade`]: the set of `(object, key)` pairs being recomputed during one
//!   external mutation.
//!
//! # Invariants
//!
//! 1. A write that does not change the stored value (same-value equality) emits
//!    nothing, unless forced.
//! 2. Listeners run in registration order; the first failing listener stops
//!    the emission and its error is returned to the writer.
//! 3. Every effective write emits `_change:deps:<key>`; only non-silent writes
//!    also emit `change:<key>`.
//! 4. A listener removed during an emission is not invoked later in that
//!    emission.

pub mod cascade;
pub mod error;
pub mod event;
pub mod listener;
pub mod object;
pub mod value;

pub use cascade::{ActiveGuard, Cascade};
pub use error::{ComputeError, Error, Result};
pub use event::{Event, Fields, SetOptions, change_event, deps_event};
pub use listener::{ListenerId, Subscription, add_listener, emit, remove_listener};
pub use object::{Entries, Object, ObjectId, WeakObject};
pub use value::Value;
