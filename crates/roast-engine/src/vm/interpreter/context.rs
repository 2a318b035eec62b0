//! Shared interpreter context
//!
//! Everything an [`Interpreter`](super::Interpreter) borrows from its host:
//! the runtime, options, tiering policy, instrumentation and the safepoint
//! coordinator. One context is typically shared by every interpreter thread.

use std::sync::Arc;

use crate::vm::interpreter::SafepointCoordinator;
use crate::vm::options::{OptionsError, VmOptions};
use crate::vm::osr::TieringPolicy;
use crate::vm::runtime::{Instrumentation, Runtime};

/// Host collaborators and configuration for a group of interpreters
pub struct VmContext {
    /// Heap, type system and native bridge
    pub runtime: Arc<dyn Runtime>,
    /// Interpreter options
    pub options: VmOptions,
    /// OSR decisions; `None` disables OSR
    pub tiering: Option<Arc<dyn TieringPolicy>>,
    /// Observation hooks
    pub instrumentation: Option<Arc<dyn Instrumentation>>,
    safepoint: SafepointCoordinator,
}

impl VmContext {
    /// Create a context with default options and no tiering or hooks
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        Self {
            runtime,
            options: VmOptions::default(),
            tiering: None,
            instrumentation: None,
            safepoint: SafepointCoordinator::new(),
        }
    }

    /// Replace the options after validating them
    pub fn with_options(mut self, options: VmOptions) -> Result<Self, OptionsError> {
        options.validate()?;
        self.options = options;
        Ok(self)
    }

    /// Install a tiering policy
    pub fn with_tiering(mut self, tiering: Arc<dyn TieringPolicy>) -> Self {
        self.tiering = Some(tiering);
        self
    }

    /// Install instrumentation hooks
    pub fn with_instrumentation(mut self, hooks: Arc<dyn Instrumentation>) -> Self {
        self.instrumentation = Some(hooks);
        self
    }

    /// Safepoint coordinator polled at loop back-edges
    #[inline]
    pub fn safepoint(&self) -> &SafepointCoordinator {
        &self.safepoint
    }
}

impl std::fmt::Debug for VmContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmContext")
            .field("options", &self.options)
            .field("tiering", &self.tiering.is_some())
            .field("instrumentation", &self.instrumentation.is_some())
            .field("safepoint", &self.safepoint)
            .finish()
    }
}
