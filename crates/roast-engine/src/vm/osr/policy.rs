//! Tiering policy: decides when a hot loop leaves the interpreter
//!
//! The interpreter asks its [`TieringPolicy`] on loop back-edges. The stock
//! [`ThresholdPolicy`] compiles once a method's accumulated plus live loop
//! count crosses a threshold, and remembers compiler refusals.

use std::sync::Arc;

use crate::vm::class::MethodInfo;
use crate::vm::defaults::DEFAULT_OSR_LOOP_THRESHOLD;
use crate::vm::osr::{OsrCode, OsrEntry};

/// Host tiering heuristics consulted by the interpreter
pub trait TieringPolicy: Send + Sync {
    /// Decide whether to enter compiled code at `entry`
    ///
    /// `live_loop_count` is the calling activation's back-edge count not yet
    /// flushed into the method profile.
    fn request_osr(
        &self,
        method: &Arc<MethodInfo>,
        entry: OsrEntry,
        live_loop_count: u32,
    ) -> Option<Arc<dyn OsrCode>>;

    /// Loop count of a finished activation
    fn report_loop_count(&self, method: &MethodInfo, count: u32) {
        let _ = (method, count);
    }
}

/// Optimizing compiler producing OSR entry points
pub trait OsrCompiler: Send + Sync {
    /// Compile `method` for entry at `entry.bci`; `None` if it cannot
    fn compile_osr(&self, method: &Arc<MethodInfo>, entry: OsrEntry) -> Option<Arc<dyn OsrCode>>;
}

/// Loop-count threshold policy
pub struct ThresholdPolicy {
    /// Loop iterations (flushed plus live) before compiling
    pub loop_threshold: u64,
    compiler: Arc<dyn OsrCompiler>,
}

impl ThresholdPolicy {
    /// Create a policy with the default threshold
    pub fn new(compiler: Arc<dyn OsrCompiler>) -> Self {
        Self {
            loop_threshold: DEFAULT_OSR_LOOP_THRESHOLD,
            compiler,
        }
    }

    /// Override the loop threshold
    pub fn with_threshold(mut self, loop_threshold: u64) -> Self {
        self.loop_threshold = loop_threshold;
        self
    }
}

impl TieringPolicy for ThresholdPolicy {
    fn request_osr(
        &self,
        method: &Arc<MethodInfo>,
        entry: OsrEntry,
        live_loop_count: u32,
    ) -> Option<Arc<dyn OsrCode>> {
        let profile = method.code.as_ref()?.profile();
        if profile.is_osr_unavailable() {
            return None;
        }
        if let Some(code) = profile.osr_code(entry.bci) {
            return Some(code);
        }
        if profile.loop_count() + u64::from(live_loop_count) < self.loop_threshold {
            return None;
        }
        if !profile.try_start_compile() {
            return None;
        }
        let compiled = self.compiler.compile_osr(method, entry);
        match &compiled {
            Some(code) => {
                tracing::debug!(target: "roast::osr", %method, bci = entry.bci, "OSR code installed");
                profile.install_osr_code(entry.bci, code.clone());
            }
            None => {
                tracing::debug!(target: "roast::osr", %method, bci = entry.bci, "OSR compilation refused");
                profile.mark_osr_unavailable();
            }
        }
        profile.finish_compile();
        compiled
    }
}

impl std::fmt::Debug for ThresholdPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThresholdPolicy")
            .field("loop_threshold", &self.loop_threshold)
            .finish()
    }
}
