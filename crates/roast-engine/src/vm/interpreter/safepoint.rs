//! Cooperative safepoints
//!
//! Interpreters poll at loop back-edges, the only point where an activation
//! may be suspended or cancelled. Other threads queue deferred actions with
//! [`SafepointCoordinator::request`]; the next poll on any interpreter sharing
//! the coordinator drains the queue and runs them on its own thread.
//!
//! ## Guarantees
//! - Fast-path polling is a single atomic load when nothing is queued
//! - Every queued action runs exactly once, in request order
//! - An action returning an error cancels the polling activation with it

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::vm::VmResult;

/// Reasons for requesting a safepoint
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Garbage collection
    GarbageCollection,
    /// Debugger suspension or inspection
    Debug,
    /// Cancel the running guest code
    Cancel,
    /// Per-thread handshake operation
    Handshake,
}

/// Deferred safepoint action
pub type SafepointAction = Box<dyn FnOnce() -> VmResult<()> + Send>;

/// Statistics tracking for safepoint operations
#[derive(Debug, Default)]
pub struct SafepointStats {
    /// Total number of safepoints that ran actions
    total_safepoints: AtomicUsize,
    /// Total number of actions executed
    total_actions: AtomicUsize,
    /// Total time spent at safepoints (microseconds)
    total_pause_time_us: AtomicUsize,
    /// Maximum pause time (microseconds)
    max_pause_time_us: AtomicUsize,
}

impl SafepointStats {
    fn reset(&self) {
        self.total_safepoints.store(0, Ordering::Relaxed);
        self.total_actions.store(0, Ordering::Relaxed);
        self.total_pause_time_us.store(0, Ordering::Relaxed);
        self.max_pause_time_us.store(0, Ordering::Relaxed);
    }

    fn record(&self, actions: usize, elapsed_us: usize) {
        self.total_safepoints.fetch_add(1, Ordering::Relaxed);
        self.total_actions.fetch_add(actions, Ordering::Relaxed);
        self.total_pause_time_us
            .fetch_add(elapsed_us, Ordering::Relaxed);
        self.max_pause_time_us
            .fetch_max(elapsed_us, Ordering::Relaxed);
    }
}

/// Coordinates deferred actions across interpreter threads
pub struct SafepointCoordinator {
    /// An action is queued
    pending: AtomicBool,
    /// Queued actions with their reasons
    queue: Mutex<VecDeque<(StopReason, SafepointAction)>>,
    /// Statistics
    stats: SafepointStats,
}

impl SafepointCoordinator {
    /// Create a coordinator with an empty queue
    pub fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            queue: Mutex::new(VecDeque::new()),
            stats: SafepointStats::default(),
        }
    }

    /// Fast inline check - called on every loop back-edge
    #[inline(always)]
    pub fn poll(&self) -> VmResult<()> {
        if self.pending.load(Ordering::Acquire) {
            return self.enter_safepoint();
        }
        Ok(())
    }

    /// Slow path: drain and run queued actions
    #[cold]
    #[inline(never)]
    fn enter_safepoint(&self) -> VmResult<()> {
        let start = std::time::Instant::now();
        let actions: Vec<(StopReason, SafepointAction)> = {
            let mut queue = self.queue.lock();
            self.pending.store(false, Ordering::Release);
            queue.drain(..).collect()
        };
        if actions.is_empty() {
            return Ok(());
        }

        let count = actions.len();
        let mut first_error = None;
        for (reason, action) in actions {
            tracing::trace!(target: "roast::safepoint", ?reason, "running deferred action");
            if let Err(e) = action() {
                first_error.get_or_insert(e);
            }
        }

        self.stats
            .record(count, start.elapsed().as_micros() as usize);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Queue an action for the next poll
    pub fn request(&self, reason: StopReason, action: SafepointAction) {
        let mut queue = self.queue.lock();
        queue.push_back((reason, action));
        self.pending.store(true, Ordering::Release);
    }

    /// Check if an action is queued
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Number of queued actions
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Get safepoint statistics: (safepoints, actions, total pause us, max pause us)
    pub fn stats(&self) -> (usize, usize, usize, usize) {
        (
            self.stats.total_safepoints.load(Ordering::Relaxed),
            self.stats.total_actions.load(Ordering::Relaxed),
            self.stats.total_pause_time_us.load(Ordering::Relaxed),
            self.stats.max_pause_time_us.load(Ordering::Relaxed),
        )
    }

    /// Reset statistics
    pub fn reset_stats(&self) {
        self.stats.reset();
    }
}

impl Default for SafepointCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SafepointCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafepointCoordinator")
            .field("pending", &self.is_pending())
            .field("stats", &self.stats)
            .finish()
    }
}
