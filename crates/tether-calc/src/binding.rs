#![forbid(unsafe_code)]

//! Bindings and the recompute engine.
//!
//! # Ownership
//!
//! The target object owns each binding through an attachment slot
//! (`calc:<key>`). Bindings hold the target and every source object weakly,
//! so a binding never keeps an object alive and dies with its target.
//!
//! # Cycle guard
//!
//! Every external write starts a [`Cascade`] that travels on the events it
//! causes. A recompute first enters `(target, key)` in the cascade; if the
//! pair is already active the recompute is skipped. Each binding therefore
//! runs at most once per chain of nested writes, and cyclic declarations
//! terminate deterministically.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tether_core::{
    Cascade, ComputeError, Error, Event, Object, ObjectId, SetOptions, Value, WeakObject,
};

use crate::debounce::Debouncer;
use crate::error::{CalcError, Result};
use crate::options::{CalcOptions, NormalizedOptions};
use crate::path::{KeyPath, ResolvedSource};
use crate::source::SourceSpec;
use crate::watch::{self, SourceWatch};

/// Attachment slot prefix under which targets hold their bindings.
pub(crate) const SLOT_PREFIX: &str = "calc:";

pub(crate) type ComputeFn = Rc<dyn Fn(&[Value]) -> std::result::Result<Value, ComputeError>>;

static NEXT_BINDING_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn slot(key: &str) -> String {
    format!("{SLOT_PREFIX}{key}")
}

pub(crate) struct BindingInner {
    id: u64,
    target: WeakObject,
    target_id: ObjectId,
    key: String,
    /// One watch per flattened source, in declaration order.
    sources: RefCell<Vec<SourceWatch>>,
    compute: ComputeFn,
    options: NormalizedOptions,
    debouncer: Option<Debouncer>,
    recomputes: Cell<u64>,
    disposed: Cell<bool>,
}

impl BindingInner {
    /// Stop reacting: remove every source listener and cancel any pending
    /// debounced recompute. Idempotent.
    pub(crate) fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let watches = std::mem::take(&mut *self.sources.borrow_mut());
        drop(watches);
        if let Some(debouncer) = &self.debouncer {
            debouncer.cancel();
        }
    }

    fn values(&self) -> Vec<Value> {
        self.sources
            .borrow()
            .iter()
            .map(SourceWatch::current_value)
            .collect()
    }
}

/// Declare a binding on `target.key`, replacing any existing one.
pub(crate) fn declare(
    target: &Object,
    key: &str,
    spec: SourceSpec,
    compute: ComputeFn,
    options: CalcOptions,
) -> Result<Binding> {
    validate_target_key(key)?;
    let refs = spec.resolve(target)?;
    let options = options.normalize();

    if let Some(previous) = target.detach(&slot(key)) {
        let replaced = retire(previous);
        tracing::debug!(
            message = "calc.replace",
            target = target.id().raw(),
            key,
            replaced = replaced.unwrap_or_default(),
        );
    }

    let inner = Rc::new(BindingInner {
        id: NEXT_BINDING_ID.fetch_add(1, Ordering::Relaxed),
        target: target.downgrade(),
        target_id: target.id(),
        key: key.to_owned(),
        sources: RefCell::new(Vec::with_capacity(refs.len())),
        compute,
        debouncer: options.debounce.as_ref().map(Debouncer::new),
        options,
        recomputes: Cell::new(0),
        disposed: Cell::new(false),
    });

    let weak = Rc::downgrade(&inner);
    let watches: Vec<SourceWatch> = refs
        .into_iter()
        .map(|source| {
            let weak = weak.clone();
            watch::subscribe(ResolvedSource::new(&source.object, source.path), move |event| {
                on_source_change(&weak, event)
            })
        })
        .collect();
    let source_count = watches.len();
    *inner.sources.borrow_mut() = watches;

    let erased: Rc<dyn Any> = inner.clone();
    if let Some(stale) = target.attach(&slot(key), erased) {
        retire(stale);
    }

    tracing::debug!(
        message = "calc.declare",
        binding = inner.id,
        target = target.id().raw(),
        key,
        sources = source_count,
        set_on_init = inner.options.set_on_init,
        silent = inner.options.silent,
        debounced = inner.debouncer.is_some(),
    );

    if inner.options.set_on_init {
        recompute(&inner, None)?;
    }
    Ok(Binding { inner })
}

/// Remove and dispose the binding on `target.key`.
pub(crate) fn undeclare(target: &Object, key: &str) -> bool {
    target.detach(&slot(key)).and_then(retire).is_some()
}

/// Every binding currently attached to `target`, ordered by key.
pub(crate) fn attached(target: &Object) -> Vec<Binding> {
    target
        .attachments(SLOT_PREFIX)
        .into_iter()
        .filter_map(|(_, any)| any.downcast::<BindingInner>().ok())
        .map(|inner| Binding { inner })
        .collect()
}

fn retire(previous: Rc<dyn Any>) -> Option<u64> {
    let binding = previous.downcast::<BindingInner>().ok()?;
    binding.dispose();
    Some(binding.id)
}

fn validate_target_key(key: &str) -> Result<()> {
    let reason = if key.is_empty() {
        "key is empty"
    } else if key.contains('.') {
        "computed keys cannot be paths"
    } else {
        return Ok(());
    };
    Err(CalcError::InvalidTarget {
        key: key.to_owned(),
        reason,
    })
}

fn on_source_change(weak: &Weak<BindingInner>, event: &Event) -> tether_core::Result<()> {
    let Some(binding) = weak.upgrade() else {
        return Ok(());
    };
    if binding.disposed.get() {
        return Ok(());
    }
    match &binding.debouncer {
        Some(debouncer) => {
            let deferred = Rc::downgrade(&binding);
            let superseded = debouncer.trigger(move || match deferred.upgrade() {
                Some(binding) => recompute(&binding, None).map(drop),
                None => Ok(()),
            });
            tracing::trace!(
                message = "calc.debounce.schedule",
                binding = binding.id,
                key = %binding.key,
                window_us = debouncer.window().as_micros() as u64,
                superseded,
            );
            Ok(())
        }
        None => recompute(&binding, Some(event.cascade())).map(drop),
    }
}

/// Recompute `binding` within `cascade` (a fresh one when `None`).
///
/// Returns `Ok(false)` when the recompute was skipped: the binding is
/// disposed, its target is gone, or `(target, key)` is already active in the
/// cascade.
pub(crate) fn recompute(
    binding: &Rc<BindingInner>,
    cascade: Option<&Cascade>,
) -> tether_core::Result<bool> {
    if binding.disposed.get() {
        return Ok(false);
    }
    let Some(target) = binding.target.upgrade() else {
        return Ok(false);
    };
    let cascade = cascade.cloned().unwrap_or_default();
    let Some(_active) = cascade.enter(binding.target_id, &binding.key) else {
        tracing::trace!(
            message = "calc.cycle_skip",
            binding = binding.id,
            key = %binding.key,
            cascade = cascade.id(),
        );
        return Ok(false);
    };

    let span = tracing::trace_span!(
        "calc.recompute",
        binding = binding.id,
        key = %binding.key,
        cascade = cascade.id(),
    );
    let _entered = span.enter();

    let values = binding.values();
    let value = (binding.compute)(&values).map_err(|source| Error::compute(&binding.key, source))?;
    binding.recomputes.set(binding.recomputes.get() + 1);

    let options = SetOptions::new()
        .silent(binding.options.silent)
        .fields(binding.options.fields.clone())
        .cascade(cascade.clone());
    target.set_with(&binding.key, value, options)?;
    Ok(true)
}

/// Handle to a declared binding.
///
/// The target object owns the binding; this handle only observes it. A
/// handle outliving a replaced or removed binding reports
/// [`is_active`](Self::is_active) as `false`.
#[derive(Clone)]
pub struct Binding {
    inner: Rc<BindingInner>,
}

impl Binding {
    /// Process-unique binding id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn target(&self) -> Option<Object> {
        self.inner.target.upgrade()
    }

    #[must_use]
    pub fn target_key(&self) -> &str {
        &self.inner.key
    }

    /// Flattened source paths in declaration order.
    #[must_use]
    pub fn source_paths(&self) -> Vec<KeyPath> {
        self.inner.sources.borrow().iter().map(SourceWatch::path).collect()
    }

    /// Resolved hop chains as they stand now, in declaration order.
    #[must_use]
    pub fn sources(&self) -> Vec<ResolvedSource> {
        self.inner.sources.borrow().iter().map(SourceWatch::source).collect()
    }

    /// Current source values in declaration order.
    #[must_use]
    pub fn source_values(&self) -> Vec<Value> {
        self.inner.values()
    }

    #[must_use]
    pub fn options(&self) -> &NormalizedOptions {
        &self.inner.options
    }

    /// Recompute now in a fresh cascade, bypassing any debounce window.
    pub fn recompute(&self) -> Result<bool> {
        Ok(recompute(&self.inner, None)?)
    }

    /// Whether a debounced recompute is waiting on the run loop.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner
            .debouncer
            .as_ref()
            .is_some_and(Debouncer::is_pending)
    }

    /// Number of completed compute calls.
    #[must_use]
    pub fn recompute_count(&self) -> u64 {
        self.inner.recomputes.get()
    }

    /// `false` once the binding was replaced, removed, or disposed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.inner.disposed.get() && self.inner.target.is_alive()
    }

    /// Detach from the target and stop reacting.
    pub fn dispose(&self) {
        if let Some(target) = self.inner.target.upgrade()
            && let Some(current) = target.attachment(&slot(&self.inner.key))
            && let Ok(current) = current.downcast::<BindingInner>()
            && Rc::ptr_eq(&current, &self.inner)
        {
            target.detach(&slot(&self.inner.key));
        }
        self.inner.dispose();
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.inner.id)
            .field("target", &self.inner.target_id)
            .field("key", &self.inner.key)
            .field("sources", &self.inner.sources.borrow().len())
            .field("debounced", &self.inner.debouncer.is_some())
            .field("active", &self.is_active())
            .finish()
    }
}
