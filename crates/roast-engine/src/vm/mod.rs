//! Roast VM execution core
//!
//! This module provides:
//! - Frame layout and slot values
//! - The self-modifying opcode stream and its quick-node table
//! - The bytecode interpreter (dispatch loop)
//! - On-stack replacement hand-off
//! - Exception, stack-overflow and monitor handling
//!
//! Everything the core does not own (class loading, the heap, natives, the
//! optimizing compiler) is reached through the traits in [`runtime`] and [`osr`].

pub mod class;
pub mod defaults;
pub mod exception;
pub mod frame;
pub mod interpreter;
pub mod method;
pub mod options;
pub mod osr;
pub mod quicken;
pub mod runtime;
pub mod stream;
pub mod subroutine;
pub mod sync;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use class::{ClassId, ClassInfo, FieldInfo, Kind, MethodFlags, MethodInfo};
pub use exception::{HandlerEntry, HandlerTable};
pub use frame::Frame;
pub use interpreter::{Interpreter, SafepointCoordinator, StopReason, VmContext};
pub use method::{LineEntry, MethodCode};
pub use options::{BooleanPolicy, OptionsError, VmOptions};
pub use osr::{OsrCode, OsrCompiler, OsrEntry, OsrTransfer, ThresholdPolicy, TieringPolicy};
pub use runtime::{
    Constant, HookAction, Instrumentation, LinkError, Resolver, ResourceKind, Runtime,
    ThrowableKind,
};
pub use sync::MonitorStack;
pub use value::{ObjRef, Value};

/// VM execution errors
///
/// `Exception` is the only variant guest handlers can catch directly.
/// `ResourceExhausted` is caught through the method's allocation-free
/// recovery entries. The remaining variants are fatal: they skip handler
/// search and abort held monitors on the way out.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VmError {
    /// Guest exception (explicitly thrown or raised by an instruction)
    #[error("Exception thrown: {0:?}")]
    Exception(ObjRef),

    /// Stack overflow or out of memory
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(ResourceKind),

    /// Host-requested termination or an unrecoverable runtime failure
    #[error("Fatal error: {0}")]
    Fatal(String),

    /// Undefined opcode byte in the stream
    #[error("Invalid opcode {opcode:#04x} at bci {bci}")]
    InvalidOpcode {
        /// Offending byte
        opcode: u8,
        /// Where it was found
        bci: u32,
    },

    /// Bytecode or frame access that violates structural constraints
    #[error("Malformed bytecode: {0}")]
    Malformed(String),
}

impl VmError {
    /// Whether handler search may intercept this error
    #[inline]
    pub fn is_catchable(&self) -> bool {
        matches!(self, VmError::Exception(_) | VmError::ResourceExhausted(_))
    }

    /// Guest exception object, if this is one
    #[inline]
    pub fn exception(&self) -> Option<ObjRef> {
        match self {
            VmError::Exception(obj) => Some(*obj),
            _ => None,
        }
    }
}

/// VM execution result
pub type VmResult<T> = Result<T, VmError>;
