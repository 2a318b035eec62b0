//! Result types of the dispatch loop
//!
//! Opcode handlers return `Result<ControlFlow, VmError>`: the `Ok` side says
//! how the loop moves on, the `Err` side enters exception dispatch.

use crate::vm::value::Value;
use crate::vm::VmResult;

/// Control flow directive from executing one instruction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlFlow {
    /// Fall through; `top` moves by the opcode's static stack effect
    Next,

    /// Fall through; `top` moves by the given delta
    ///
    /// Used by value-dependent opcodes (field access, invokes,
    /// `multianewarray`, `wide`) and by quick nodes.
    NextWith(isize),

    /// Transfer to an absolute bci after applying the static stack effect
    ///
    /// Every jump goes through the `before_jump` checkpoint.
    Jump(u32),

    /// Leave the activation with a value (`Top` for void)
    Return(Value),
}

/// Outcome of the `before_jump` checkpoint
#[derive(Debug)]
pub enum JumpOutcome {
    /// Take the jump in the interpreter
    Continue,
    /// Compiled code finished the activation; this is its result
    Osr(VmResult<Value>),
}

/// How an activation's dispatch loop ended
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Completion {
    /// Normal or early return
    Return(Value),
    /// A statement hook asked to restart the activation
    Reenter,
}
