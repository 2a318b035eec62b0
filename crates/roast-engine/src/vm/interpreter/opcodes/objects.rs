use crate::bytecode::Opcode;
use crate::vm::class::Kind;
use crate::vm::frame::Frame;
use crate::vm::interpreter::core::Activation;
use crate::vm::interpreter::opcodes::operand_u8;
use crate::vm::interpreter::{ControlFlow, Interpreter};
use crate::vm::runtime::ThrowableKind;
use crate::vm::{VmError, VmResult};

impl<'a> Interpreter<'a> {
    /// `newarray` and `arraylength`
    pub(in crate::vm::interpreter) fn exec_object_ops(
        &mut self,
        act: &Activation<'_>,
        frame: &mut Frame,
        bci: u32,
        top: usize,
        opcode: Opcode,
    ) -> VmResult<ControlFlow> {
        let at = Frame::below(top, 1)?;
        match opcode {
            Opcode::Newarray => {
                let atype = operand_u8(act.code.stream().original(), bci as usize + 1, bci)?;
                let kind = Kind::from_array_type(atype).ok_or_else(|| {
                    VmError::Malformed(format!("newarray with type code {} at bci {}", atype, bci))
                })?;
                let length = frame.get_int(at)?;
                if length < 0 {
                    return Err(self.raise(ThrowableKind::NegativeArraySize, &length.to_string()));
                }
                let array = self.runtime().new_array(kind, None, length)?;
                frame.put_object(at, Some(array))?;
            }
            Opcode::Arraylength => {
                let array = frame
                    .get_object(at)?
                    .ok_or_else(|| self.raise(ThrowableKind::NullPointer, "length of null array"))?;
                let length = self.runtime().array_length(array)?;
                frame.put_int(at, length)?;
            }
            other => {
                return Err(VmError::Malformed(format!(
                    "{} routed to object handler",
                    other.name()
                )))
            }
        }
        Ok(ControlFlow::Next)
    }
}
