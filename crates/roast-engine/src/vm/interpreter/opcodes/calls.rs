use crate::bytecode::Opcode;
use crate::vm::class::Kind;
use crate::vm::frame::Frame;
use crate::vm::interpreter::core::Activation;
use crate::vm::interpreter::{ControlFlow, Interpreter};
use crate::vm::value::Value;
use crate::vm::{VmError, VmResult};

impl<'a> Interpreter<'a> {
    /// `ireturn` .. `return`
    ///
    /// Int-like results are narrowed to the declared return kind; booleans go
    /// through the configured [`BooleanPolicy`](crate::vm::BooleanPolicy).
    pub(in crate::vm::interpreter) fn exec_return_ops(
        &mut self,
        act: &Activation<'_>,
        frame: &mut Frame,
        top: usize,
        opcode: Opcode,
    ) -> VmResult<ControlFlow> {
        let kind = act.method.return_kind;
        let value = match opcode {
            Opcode::Ireturn => {
                let v = frame.get_int(Frame::below(top, 1)?)?;
                let v = match kind {
                    Kind::Boolean => self.ctx.options.boolean_policy.normalize(v),
                    Kind::Byte | Kind::Char | Kind::Short => kind.narrow(v),
                    _ => v,
                };
                Value::Int(v)
            }
            Opcode::Lreturn => Value::Long(frame.get_long(Frame::below(top, 2)?)?),
            Opcode::Freturn => Value::Float(frame.get_float(Frame::below(top, 1)?)?),
            Opcode::Dreturn => Value::Double(frame.get_double(Frame::below(top, 2)?)?),
            Opcode::Areturn => Value::object(frame.get_object(Frame::below(top, 1)?)?),
            Opcode::Return => Value::Top,
            other => {
                return Err(VmError::Malformed(format!(
                    "{} routed to return handler",
                    other.name()
                )))
            }
        };
        Ok(ControlFlow::Return(value))
    }
}
