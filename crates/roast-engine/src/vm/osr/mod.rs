//! On-stack replacement
//!
//! A hot loop hands its live activation to compiled code at a loop header.
//! The transfer carries the frame, the monitor stack and the resumption
//! triple `(bci, top, statement_index)`. Compiled code runs the rest of the
//! activation and its result (value or exception) becomes the activation's
//! result. Code that cannot continue natively may resume interpretation of
//! the same frame through [`OsrTransfer::resume_interpreted`].

pub mod counters;
pub mod policy;

use std::sync::Arc;

pub use counters::MethodProfile;
pub use policy::{OsrCompiler, ThresholdPolicy, TieringPolicy};

use crate::vm::class::MethodInfo;
use crate::vm::frame::Frame;
use crate::vm::interpreter::Interpreter;
use crate::vm::sync::MonitorStack;
use crate::vm::value::Value;
use crate::vm::VmResult;

/// Where compiled code picks up the activation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsrEntry {
    /// Loop header bci (the back-edge target)
    pub bci: u32,
    /// Operand stack top as a value index
    pub top: usize,
    /// Line-table statement containing `bci`
    pub statement_index: Option<usize>,
}

/// Live activation state handed to compiled code
pub struct OsrTransfer<'t, 'a> {
    /// Method being replaced
    pub method: &'t Arc<MethodInfo>,
    /// Resumption point
    pub entry: OsrEntry,
    /// Locals and operand stack at the loop header
    pub frame: &'t mut Frame,
    /// Monitors held by the activation
    pub monitors: &'t mut MonitorStack,
    /// Interpreter that owned the activation
    pub interpreter: &'t mut Interpreter<'a>,
}

impl OsrTransfer<'_, '_> {
    /// Continue interpreting the activation from the entry point
    ///
    /// The resumed activation does not consult OSR again.
    pub fn resume_interpreted(self) -> VmResult<Value> {
        self.interpreter
            .resume(self.method, self.frame, self.monitors, self.entry)
    }
}

/// Compiled entry point for one loop header
pub trait OsrCode: Send + Sync {
    /// Run the rest of the activation
    fn enter(&self, transfer: OsrTransfer<'_, '_>) -> VmResult<Value>;
}
