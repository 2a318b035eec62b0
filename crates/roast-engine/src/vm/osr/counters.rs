//! Per-method profiling counters
//!
//! Atomic counters the interpreter bumps at activation entry and flushes at
//! activation exit (loop iterations), plus the OSR compilation claim and the
//! installed OSR entry points keyed by loop-header bci.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::vm::osr::OsrCode;

/// Profiling counters for one method version
pub struct MethodProfile {
    /// Number of interpreted activations started
    invocations: AtomicU64,
    /// Loop back-edges flushed from finished activations
    loop_count: AtomicU64,
    /// Whether an OSR compilation is in progress
    compiling: AtomicBool,
    /// Set once the compiler refused this method
    osr_unavailable: AtomicBool,
    /// Installed OSR code by loop-header bci
    osr_code: RwLock<FxHashMap<u32, Arc<dyn OsrCode>>>,
}

impl MethodProfile {
    /// Create a profile with zero counters
    pub fn new() -> Self {
        MethodProfile {
            invocations: AtomicU64::new(0),
            loop_count: AtomicU64::new(0),
            compiling: AtomicBool::new(false),
            osr_unavailable: AtomicBool::new(false),
            osr_code: RwLock::new(FxHashMap::default()),
        }
    }

    /// Record an activation, return the new count
    pub fn record_invocation(&self) -> u64 {
        self.invocations.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Add an activation's loop count, return the new total
    pub fn add_loop_count(&self, count: u32) -> u64 {
        self.loop_count.fetch_add(u64::from(count), Ordering::Relaxed) + u64::from(count)
    }

    /// Activations started so far
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    /// Loop iterations flushed so far
    pub fn loop_count(&self) -> u64 {
        self.loop_count.load(Ordering::Relaxed)
    }

    /// Try to claim this method for OSR compilation (CAS on `compiling`)
    pub fn try_start_compile(&self) -> bool {
        self.compiling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Release the compilation claim
    pub fn finish_compile(&self) {
        self.compiling.store(false, Ordering::Release);
    }

    /// Whether a compilation is in progress
    pub fn is_compiling(&self) -> bool {
        self.compiling.load(Ordering::Acquire)
    }

    /// Stop asking the compiler for this method
    pub fn mark_osr_unavailable(&self) {
        self.osr_unavailable.store(true, Ordering::Release);
    }

    /// Whether the compiler refused this method
    pub fn is_osr_unavailable(&self) -> bool {
        self.osr_unavailable.load(Ordering::Acquire)
    }

    /// Installed OSR code for the loop header at `bci`
    pub fn osr_code(&self, bci: u32) -> Option<Arc<dyn OsrCode>> {
        self.osr_code.read().get(&bci).cloned()
    }

    /// Install OSR code for the loop header at `bci`
    pub fn install_osr_code(&self, bci: u32, code: Arc<dyn OsrCode>) {
        self.osr_code.write().insert(bci, code);
    }

    /// Drop every installed OSR entry point (deoptimization)
    pub fn invalidate_osr_code(&self) {
        self.osr_code.write().clear();
    }
}

impl Default for MethodProfile {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MethodProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodProfile")
            .field("invocations", &self.invocations())
            .field("loop_count", &self.loop_count())
            .field("compiling", &self.is_compiling())
            .field("osr_unavailable", &self.is_osr_unavailable())
            .finish()
    }
}
