//! Opcode handler modules for the interpreter
//!
//! Each module implements a category of opcode handlers as methods on
//! `Interpreter`. Handlers read operands from the original (never rewritten)
//! bytes, work on the frame at `top` and report how the cursor moves.

pub mod arithmetic;
pub mod calls;
pub mod comparison;
pub mod constants;
pub mod control_flow;
pub mod conversions;
pub mod exceptions;
pub mod monitors;
pub mod objects;
pub mod quick;
pub mod stack;
pub mod variables;

use crate::bytecode::opcode::{read_i16, read_i32, read_u16};
use crate::vm::{VmError, VmResult};

fn truncated(bci: u32) -> VmError {
    VmError::Malformed(format!("truncated operands at bci {}", bci))
}

/// `u8` operand at `at`
#[inline]
pub(in crate::vm::interpreter) fn operand_u8(code: &[u8], at: usize, bci: u32) -> VmResult<u8> {
    code.get(at).copied().ok_or_else(|| truncated(bci))
}

/// Big-endian `u16` operand at `at`
#[inline]
pub(in crate::vm::interpreter) fn operand_u16(code: &[u8], at: usize, bci: u32) -> VmResult<u16> {
    read_u16(code, at).ok_or_else(|| truncated(bci))
}

/// Big-endian `i16` operand at `at`
#[inline]
pub(in crate::vm::interpreter) fn operand_i16(code: &[u8], at: usize, bci: u32) -> VmResult<i16> {
    read_i16(code, at).ok_or_else(|| truncated(bci))
}

/// Big-endian `i32` operand at `at`
#[inline]
pub(in crate::vm::interpreter) fn operand_i32(code: &[u8], at: usize, bci: u32) -> VmResult<i32> {
    read_i32(code, at).ok_or_else(|| truncated(bci))
}

/// Absolute target of a relative branch
#[inline]
pub(in crate::vm::interpreter) fn branch_target(bci: u32, offset: i32) -> VmResult<u32> {
    let target = i64::from(bci) + i64::from(offset);
    u32::try_from(target)
        .map_err(|_| VmError::Malformed(format!("branch from {} by {} leaves the code", bci, offset)))
}
