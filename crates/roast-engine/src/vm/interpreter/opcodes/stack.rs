use crate::bytecode::Opcode;
use crate::vm::frame::Frame;
use crate::vm::interpreter::{ControlFlow, Interpreter};
use crate::vm::{VmError, VmResult};

impl<'a> Interpreter<'a> {
    /// `pop` .. `swap`
    ///
    /// Shuffles copy raw slots; `top` moves by the static stack effect.
    pub(in crate::vm::interpreter) fn exec_stack_ops(
        &mut self,
        frame: &mut Frame,
        top: usize,
        opcode: Opcode,
    ) -> VmResult<ControlFlow> {
        match opcode {
            Opcode::Pop => {
                Frame::below(top, 1)?;
            }
            Opcode::Pop2 => {
                Frame::below(top, 2)?;
            }
            Opcode::Dup => frame.dup1(top)?,
            Opcode::DupX1 => frame.dup_x1(top)?,
            Opcode::DupX2 => frame.dup_x2(top)?,
            Opcode::Dup2 => frame.dup2(top)?,
            Opcode::Dup2X1 => frame.dup2_x1(top)?,
            Opcode::Dup2X2 => frame.dup2_x2(top)?,
            Opcode::Swap => frame.swap(top)?,
            other => {
                return Err(VmError::Malformed(format!(
                    "{} routed to stack handler",
                    other.name()
                )))
            }
        }
        Ok(ControlFlow::Next)
    }
}
