#![forbid(unsafe_code)]

//! Single-threaded timer queue that drives deferred (debounced) recomputes.
//!
//! A [`RunLoop`] never runs anything on its own: the host calls
//! [`run_due`](RunLoop::run_due), [`advance`](RunLoop::advance) or
//! [`run_until_idle`](RunLoop::run_until_idle) from its event loop, and task
//! failures surface there.
//!
//! # Invariants
//!
//! 1. Due timers run in `(deadline, scheduling order)` order.
//! 2. A timer scheduled while the loop is running fires on a later turn,
//!    never in the turn that scheduled it.
//! 3. A failing task stops the turn; timers not yet run stay queued.
//!
//! # Configuration
//!
//! `TETHER_DEBOUNCE_WINDOW_MS` overrides the default debounce window of loops
//! built with [`RunLoopConfig::from_env`], including the per-thread
//! [`RunLoop::current`] loop.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;
use std::rc::Rc;

use tether_core::Result;
use web_time::{Duration, Instant};

use crate::clock::{Clock, LabClock};

/// Environment variable holding the default debounce window in milliseconds.
pub const DEBOUNCE_WINDOW_ENV: &str = "TETHER_DEBOUNCE_WINDOW_MS";

type Task = Box<dyn FnOnce() -> Result<()>>;

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Configuration for a [`RunLoop`].
#[derive(Debug, Clone)]
pub struct RunLoopConfig {
    /// Time source.
    pub clock: Clock,
    /// Window used by bindings declared with `debounce: true`.
    pub default_debounce: Duration,
}

impl Default for RunLoopConfig {
    fn default() -> Self {
        Self {
            clock: Clock::Real,
            default_debounce: Duration::ZERO,
        }
    }
}

impl RunLoopConfig {
    /// Defaults, with the debounce window taken from
    /// `TETHER_DEBOUNCE_WINDOW_MS` when it parses.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = env::var(DEBOUNCE_WINDOW_ENV)
            && let Ok(ms) = val.trim().parse::<u64>()
        {
            config.default_debounce = Duration::from_millis(ms);
        }
        config
    }

    /// Use a lab clock.
    #[must_use]
    pub fn lab(clock: &LabClock) -> Self {
        Self {
            clock: Clock::Lab(clock.clone()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_default_debounce(mut self, window: Duration) -> Self {
        self.default_debounce = window;
        self
    }
}

struct RunLoopInner {
    config: RunLoopConfig,
    queue: BTreeMap<(Instant, u64), Task>,
    deadlines: HashMap<u64, Instant>,
    next_seq: u64,
    turns: u64,
}

/// Shared handle to a timer queue. Clones refer to the same queue.
#[derive(Clone)]
pub struct RunLoop {
    inner: Rc<RefCell<RunLoopInner>>,
}

thread_local! {
    static CURRENT: RunLoop = RunLoop::with_config(RunLoopConfig::from_env());
}

impl RunLoop {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RunLoopConfig::default())
    }

    #[must_use]
    pub fn with_config(config: RunLoopConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(RunLoopInner {
                config,
                queue: BTreeMap::new(),
                deadlines: HashMap::new(),
                next_seq: 0,
                turns: 0,
            })),
        }
    }

    /// A loop on a lab clock.
    #[must_use]
    pub fn lab(clock: &LabClock) -> Self {
        Self::with_config(RunLoopConfig::lab(clock))
    }

    /// The per-thread default loop.
    #[must_use]
    pub fn current() -> Self {
        CURRENT.with(Clone::clone)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn now(&self) -> Instant {
        self.inner.borrow().config.clock.now()
    }

    #[must_use]
    pub fn default_debounce(&self) -> Duration {
        self.inner.borrow().config.default_debounce
    }

    /// Number of completed turns (calls to `run_due`).
    #[must_use]
    pub fn turns(&self) -> u64 {
        self.inner.borrow().turns
    }

    /// Run `task` once `delay` has elapsed and the loop is turned.
    pub fn schedule(&self, delay: Duration, task: impl FnOnce() -> Result<()> + 'static) -> TimerId {
        let mut inner = self.inner.borrow_mut();
        let deadline = inner.config.clock.now() + delay;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.queue.insert((deadline, seq), Box::new(task));
        inner.deadlines.insert(seq, deadline);
        TimerId(seq)
    }

    /// Cancel a pending timer. Returns `false` if it already ran or was
    /// cancelled.
    pub fn cancel(&self, id: TimerId) -> bool {
        let removed = {
            let mut inner = self.inner.borrow_mut();
            inner
                .deadlines
                .remove(&id.0)
                .and_then(|deadline| inner.queue.remove(&(deadline, id.0)))
        };
        removed.is_some()
    }

    #[must_use]
    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.inner.borrow().deadlines.contains_key(&id.0)
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner
            .borrow()
            .queue
            .keys()
            .next()
            .map(|(deadline, _)| *deadline)
    }

    /// Run every timer due now that was scheduled before this turn began.
    ///
    /// Returns the number of tasks run.
    pub fn run_due(&self) -> Result<usize> {
        let (now, horizon) = {
            let mut inner = self.inner.borrow_mut();
            inner.turns += 1;
            (inner.config.clock.now(), inner.next_seq)
        };
        let mut ran = 0;
        loop {
            let task = {
                let mut inner = self.inner.borrow_mut();
                let key = inner
                    .queue
                    .range(..=(now, u64::MAX))
                    .map(|(key, _)| *key)
                    .find(|(_, seq)| *seq < horizon);
                key.and_then(|key| {
                    inner.deadlines.remove(&key.1);
                    inner.queue.remove(&key)
                })
            };
            let Some(task) = task else {
                break;
            };
            ran += 1;
            task()?;
        }
        tracing::trace!(message = "run_loop.turn", ran, pending = self.pending());
        Ok(ran)
    }

    /// Move time forward by `delta` (instantly on a lab clock, by sleeping on
    /// a real one) and run what became due.
    pub fn advance(&self, delta: Duration) -> Result<usize> {
        let clock = self.inner.borrow().config.clock.clone();
        match &clock {
            Clock::Lab(lab) => lab.advance(delta),
            Clock::Real => std::thread::sleep(delta),
        }
        self.run_due()
    }

    /// Keep turning until no timers remain, waiting for each deadline.
    ///
    /// Tasks that reschedule themselves forever keep this from returning.
    pub fn run_until_idle(&self) -> Result<usize> {
        let mut ran = self.run_due()?;
        while let Some(deadline) = self.next_deadline() {
            let clock = self.inner.borrow().config.clock.clone();
            clock.wait_until(deadline);
            ran += self.run_due()?;
        }
        Ok(ran)
    }
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("RunLoop")
            .field("clock", &inner.config.clock)
            .field("pending", &inner.queue.len())
            .field("turns", &inner.turns)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tether_core::Error;

    fn lab_loop() -> (LabClock, RunLoop) {
        let clock = LabClock::new();
        let rl = RunLoop::lab(&clock);
        (clock, rl)
    }

    #[test]
    fn timers_wait_for_their_deadline() {
        let (_clock, rl) = lab_loop();
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        rl.schedule(Duration::from_millis(10), move || {
            h.set(h.get() + 1);
            Ok(())
        });
        assert_eq!(rl.run_due().expect("turn"), 0);
        assert_eq!(rl.advance(Duration::from_millis(9)).expect("turn"), 0);
        assert_eq!(rl.advance(Duration::from_millis(1)).expect("turn"), 1);
        assert_eq!(hits.get(), 1);
        assert_eq!(rl.pending(), 0);
    }

    #[test]
    fn due_timers_run_in_deadline_then_schedule_order() {
        let (_clock, rl) = lab_loop();
        let log = Rc::new(RefCell::new(Vec::new()));
        for (tag, ms) in [("late", 5), ("first", 0), ("second", 0)] {
            let log = Rc::clone(&log);
            rl.schedule(Duration::from_millis(ms), move || {
                log.borrow_mut().push(tag);
                Ok(())
            });
        }
        rl.advance(Duration::from_millis(5)).expect("turn");
        assert_eq!(*log.borrow(), vec!["first", "second", "late"]);
    }

    #[test]
    fn cancel_prevents_run() {
        let (_clock, rl) = lab_loop();
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        let id = rl.schedule(Duration::ZERO, move || {
            h.set(h.get() + 1);
            Ok(())
        });
        assert!(rl.is_scheduled(id));
        assert!(rl.cancel(id));
        assert!(!rl.cancel(id));
        rl.run_due().expect("turn");
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn timers_scheduled_during_turn_wait_for_next_turn() {
        let (_clock, rl) = lab_loop();
        let hits = Rc::new(Cell::new(0u32));
        let rl2 = rl.clone();
        let h = Rc::clone(&hits);
        rl.schedule(Duration::ZERO, move || {
            let h = Rc::clone(&h);
            rl2.schedule(Duration::ZERO, move || {
                h.set(h.get() + 1);
                Ok(())
            });
            Ok(())
        });
        assert_eq!(rl.run_due().expect("turn"), 1);
        assert_eq!(hits.get(), 0);
        assert_eq!(rl.run_due().expect("turn"), 1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn failing_task_stops_turn_and_keeps_rest_queued() {
        let (_clock, rl) = lab_loop();
        rl.schedule(Duration::ZERO, || Err(Error::listener("timer", "boom")));
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        rl.schedule(Duration::ZERO, move || {
            h.set(h.get() + 1);
            Ok(())
        });
        assert!(rl.run_due().is_err());
        assert_eq!(rl.pending(), 1);
        assert_eq!(rl.run_due().expect("turn"), 1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn run_until_idle_jumps_lab_clock() {
        let (clock, rl) = lab_loop();
        let start = clock.now();
        rl.schedule(Duration::from_secs(3), || Ok(()));
        rl.schedule(Duration::from_secs(1), || Ok(()));
        assert_eq!(rl.run_until_idle().expect("idle"), 2);
        assert_eq!(clock.now() - start, Duration::from_secs(3));
        assert!(rl.next_deadline().is_none());
    }

    #[test]
    fn config_builder() {
        let config = RunLoopConfig::default().with_default_debounce(Duration::from_millis(40));
        assert_eq!(config.default_debounce, Duration::from_millis(40));
        assert!(!config.clock.is_lab());
        let rl = RunLoop::with_config(config.with_clock(Clock::Lab(LabClock::new())));
        assert_eq!(rl.default_debounce(), Duration::from_millis(40));
    }

    #[test]
    fn current_is_shared_per_thread() {
        assert!(RunLoop::current().ptr_eq(&RunLoop::current()));
    }
}
