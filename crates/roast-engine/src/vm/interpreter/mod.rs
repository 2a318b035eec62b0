//! Bytecode interpreter
//!
//! One [`Interpreter`] per thread. Activations run in a single dispatch loop
//! over the shared, self-modifying opcode stream of their method version; the
//! handlers for each opcode category live in [`opcodes`].

mod context;
mod core;
mod execution;
pub mod opcodes;
mod safepoint;

pub use context::VmContext;
pub use self::core::Interpreter;
pub use execution::{Completion, ControlFlow, JumpOutcome};
pub use safepoint::{SafepointAction, SafepointCoordinator, SafepointStats, StopReason};
