#![forbid(unsafe_code)]

//! Trailing-edge debouncing on a [`RunLoop`].

use std::cell::Cell;
use std::rc::Rc;

use tether_core::Result;
use web_time::Duration;

use crate::options::DebounceSettings;
use crate::run_loop::{RunLoop, TimerId};

/// Collapses bursts of triggers into one deferred task.
///
/// Each [`trigger`](Self::trigger) cancels the pending task, if any, and
/// schedules the new one `window` from now. Only the last task of a burst
/// runs. Dropping the debouncer cancels whatever is pending.
pub(crate) struct Debouncer {
    window: Duration,
    run_loop: RunLoop,
    pending: Rc<Cell<Option<TimerId>>>,
}

impl Debouncer {
    pub(crate) fn new(settings: &DebounceSettings) -> Self {
        Self {
            window: settings.window,
            run_loop: settings.run_loop.clone(),
            pending: Rc::new(Cell::new(None)),
        }
    }

    /// Replace the pending task with `task`. Returns `true` if a pending
    /// task was superseded.
    pub(crate) fn trigger(&self, task: impl FnOnce() -> Result<()> + 'static) -> bool {
        let superseded = self
            .pending
            .take()
            .is_some_and(|id| self.run_loop.cancel(id));
        let pending = Rc::clone(&self.pending);
        let id = self.run_loop.schedule(self.window, move || {
            pending.set(None);
            task()
        });
        self.pending.set(Some(id));
        superseded
    }

    /// Cancel the pending task, if any.
    pub(crate) fn cancel(&self) -> bool {
        self.pending
            .take()
            .is_some_and(|id| self.run_loop.cancel(id))
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.get().is_some()
    }

    pub(crate) fn window(&self) -> Duration {
        self.window
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
