use crate::bytecode::Opcode;
use crate::vm::frame::Frame;
use crate::vm::interpreter::core::Activation;
use crate::vm::interpreter::opcodes::{operand_i16, operand_u16, operand_u8};
use crate::vm::interpreter::{ControlFlow, Interpreter};
use crate::vm::{VmError, VmResult};

impl<'a> Interpreter<'a> {
    /// Constant pushes and `ldc` family
    pub(in crate::vm::interpreter) fn exec_constant_ops(
        &mut self,
        act: &Activation<'_>,
        frame: &mut Frame,
        bci: u32,
        top: usize,
        opcode: Opcode,
    ) -> VmResult<ControlFlow> {
        let code = act.code.stream().original();
        let at = bci as usize;
        match opcode {
            Opcode::Nop => {}
            Opcode::AconstNull => frame.put_object(top, None)?,
            Opcode::IconstM1
            | Opcode::Iconst0
            | Opcode::Iconst1
            | Opcode::Iconst2
            | Opcode::Iconst3
            | Opcode::Iconst4
            | Opcode::Iconst5 => {
                let v = opcode.to_u8() as i32 - Opcode::Iconst0.to_u8() as i32;
                frame.put_int(top, v)?;
            }
            Opcode::Lconst0 => frame.put_long(top, 0)?,
            Opcode::Lconst1 => frame.put_long(top, 1)?,
            Opcode::Fconst0 => frame.put_float(top, 0.0)?,
            Opcode::Fconst1 => frame.put_float(top, 1.0)?,
            Opcode::Fconst2 => frame.put_float(top, 2.0)?,
            Opcode::Dconst0 => frame.put_double(top, 0.0)?,
            Opcode::Dconst1 => frame.put_double(top, 1.0)?,
            Opcode::Bipush => {
                let v = operand_u8(code, at + 1, bci)? as i8;
                frame.put_int(top, i32::from(v))?;
            }
            Opcode::Sipush => {
                let v = operand_i16(code, at + 1, bci)?;
                frame.put_int(top, i32::from(v))?;
            }
            Opcode::Ldc | Opcode::LdcW | Opcode::Ldc2W => {
                let index = if opcode == Opcode::Ldc {
                    u16::from(operand_u8(code, at + 1, bci)?)
                } else {
                    operand_u16(code, at + 1, bci)?
                };
                let constant = act
                    .code
                    .resolver()
                    .resolve_constant(index)
                    .map_err(|e| self.link_error(e))?;
                if constant.is_wide() != (opcode == Opcode::Ldc2W) {
                    return Err(VmError::Malformed(format!(
                        "{} of {:?} at bci {}",
                        opcode.name(),
                        constant,
                        bci
                    )));
                }
                frame.put_value(top, constant.to_value())?;
            }
            other => {
                return Err(VmError::Malformed(format!(
                    "{} routed to constant handler",
                    other.name()
                )))
            }
        }
        Ok(ControlFlow::Next)
    }
}
