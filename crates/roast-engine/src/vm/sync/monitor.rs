//! Per-activation monitor stack
//!
//! Tracks which object monitors an activation holds so they can be released
//! on every exit path. The runtime owns the actual locks; this stack only
//! records acquisition order.

use crate::vm::runtime::Runtime;
use crate::vm::value::ObjRef;
use crate::vm::VmResult;

/// Monitors held by one activation
#[derive(Debug, Default)]
pub struct MonitorStack {
    /// `monitorenter` acquisitions, innermost last
    held: Vec<ObjRef>,
    /// Lock taken by a synchronized method prologue
    method_lock: Option<ObjRef>,
}

impl MonitorStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `obj` and record it
    pub fn enter(&mut self, runtime: &dyn Runtime, obj: ObjRef) -> VmResult<()> {
        runtime.monitor_enter(obj)?;
        self.held.push(obj);
        Ok(())
    }

    /// Release `obj` if this activation holds it
    ///
    /// Returns `Ok(false)` when `obj` is not held; the caller raises
    /// `IllegalMonitorStateException`. The innermost acquisition is checked
    /// first, then the rest of the stack from the top down.
    pub fn exit(&mut self, runtime: &dyn Runtime, obj: ObjRef) -> VmResult<bool> {
        let position = match self.held.last() {
            Some(&top) if top == obj => self.held.len() - 1,
            _ => match self.held.iter().rposition(|&held| held == obj) {
                Some(position) => position,
                None => return Ok(false),
            },
        };
        self.held.remove(position);
        runtime.monitor_exit(obj)?;
        Ok(true)
    }

    /// Acquire the synchronized-method lock
    pub fn lock_method(&mut self, runtime: &dyn Runtime, obj: ObjRef) -> VmResult<()> {
        runtime.monitor_enter(obj)?;
        self.method_lock = Some(obj);
        Ok(())
    }

    /// Release the synchronized-method lock, if taken
    pub fn unlock_method(&mut self, runtime: &dyn Runtime) -> VmResult<()> {
        match self.method_lock.take() {
            Some(obj) => runtime.monitor_exit(obj),
            None => Ok(()),
        }
    }

    /// Release every explicit monitor, innermost first
    ///
    /// Returns how many were held. The method lock is left alone.
    pub fn release_explicit(&mut self, runtime: &dyn Runtime) -> VmResult<usize> {
        let count = self.held.len();
        while let Some(obj) = self.held.pop() {
            runtime.monitor_exit(obj)?;
        }
        Ok(count)
    }

    /// Release everything, best effort
    ///
    /// Used on abrupt termination. Release failures are logged and skipped so
    /// the remaining monitors are still released.
    pub fn abort(&mut self, runtime: &dyn Runtime) {
        while let Some(obj) = self.held.pop() {
            if let Err(e) = runtime.monitor_exit(obj) {
                tracing::warn!(target: "roast::monitor", ?obj, error = %e, "monitor release failed during abort");
            }
        }
        if let Some(obj) = self.method_lock.take() {
            if let Err(e) = runtime.monitor_exit(obj) {
                tracing::warn!(target: "roast::monitor", ?obj, error = %e, "method lock release failed during abort");
            }
        }
    }

    /// Number of explicit monitors held
    #[inline]
    pub fn depth(&self) -> usize {
        self.held.len()
    }

    /// Whether nothing is held (including the method lock)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty() && self.method_lock.is_none()
    }

    /// Explicit monitors, outermost first
    pub fn held(&self) -> &[ObjRef] {
        &self.held
    }

    /// Lock taken by the synchronized-method prologue
    pub fn method_lock(&self) -> Option<ObjRef> {
        self.method_lock
    }
}
