//! Cooperative processes that drive device polling.
//!
//! Nothing in the core blocks. Progress is made by stepping processes from
//! a host loop; each step does one bounded pass of work and returns.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use quanta::Instant;

use crate::ib::registry::Registry;

/// A cooperative process.
pub trait Process {
    /// Do one bounded pass of work.
    fn step(&mut self);
}

/// Round-robin scheduler of permanent processes.
///
/// Processes added here are never removed.
#[derive(Default)]
pub struct Scheduler {
    processes: Vec<Box<dyn Process>>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("processes", &self.processes.len())
            .finish()
    }
}

impl Scheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a permanent process.
    pub fn add(&mut self, process: Box<dyn Process>) {
        self.processes.push(process);
    }

    /// Get the number of processes.
    #[inline]
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    /// Determine whether there is no process.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Step every process once, in the order they were added.
    pub fn step(&mut self) {
        for process in &mut self.processes {
            process.step();
        }
    }
}

/// Statistics of an [`EqPoller`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Number of steps taken.
    pub steps: u64,

    /// Time spent inside steps.
    pub busy: Duration,
}

/// Event queue poller: each step polls every registered device.
pub struct EqPoller {
    registry: Rc<RefCell<Registry>>,
    stats: PollerStats,
}

impl EqPoller {
    /// Create a poller over a shared registry.
    pub fn new(registry: Rc<RefCell<Registry>>) -> Self {
        Self {
            registry,
            stats: PollerStats::default(),
        }
    }

    /// Get the statistics gathered so far.
    #[inline]
    pub fn stats(&self) -> PollerStats {
        self.stats
    }
}

impl Process for EqPoller {
    fn step(&mut self) {
        let start = Instant::now();
        self.registry.borrow_mut().poll_all();
        let elapsed = Instant::now().duration_since(start);

        self.stats.steps += 1;
        self.stats.busy += elapsed;
        log::trace!(
            "EQ poller step {} took {:?} ({:?} total)",
            self.stats.steps,
            elapsed,
            self.stats.busy
        );
    }
}
