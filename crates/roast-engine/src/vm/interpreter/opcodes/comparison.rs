use std::cmp::Ordering;

use crate::bytecode::Opcode;
use crate::vm::frame::Frame;
use crate::vm::interpreter::{ControlFlow, Interpreter};
use crate::vm::{VmError, VmResult};

/// `-1`, `0` or `1`; `nan` is the result when the operands are unordered
#[inline]
fn compare<T: PartialOrd>(a: T, b: T, nan: i32) -> i32 {
    match a.partial_cmp(&b) {
        Some(Ordering::Less) => -1,
        Some(Ordering::Equal) => 0,
        Some(Ordering::Greater) => 1,
        None => nan,
    }
}

impl<'a> Interpreter<'a> {
    /// `lcmp`, `fcmpl`/`fcmpg`, `dcmpl`/`dcmpg`
    ///
    /// The `l` variants treat NaN as less (-1), the `g` variants as greater (+1).
    pub(in crate::vm::interpreter) fn exec_comparison_ops(
        &mut self,
        frame: &mut Frame,
        top: usize,
        opcode: Opcode,
    ) -> VmResult<ControlFlow> {
        let (at, result) = match opcode {
            Opcode::Lcmp => {
                let at = Frame::below(top, 4)?;
                (at, compare(frame.get_long(at)?, frame.get_long(at + 2)?, 0))
            }
            Opcode::Fcmpl | Opcode::Fcmpg => {
                let at = Frame::below(top, 2)?;
                let nan = if opcode == Opcode::Fcmpl { -1 } else { 1 };
                (at, compare(frame.get_float(at)?, frame.get_float(at + 1)?, nan))
            }
            Opcode::Dcmpl | Opcode::Dcmpg => {
                let at = Frame::below(top, 4)?;
                let nan = if opcode == Opcode::Dcmpl { -1 } else { 1 };
                (at, compare(frame.get_double(at)?, frame.get_double(at + 2)?, nan))
            }
            other => {
                return Err(VmError::Malformed(format!(
                    "{} routed to comparison handler",
                    other.name()
                )))
            }
        };
        frame.put_int(at, result)?;
        Ok(ControlFlow::Next)
    }
}
