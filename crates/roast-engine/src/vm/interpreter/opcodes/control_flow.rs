use crate::bytecode::opcode::switch_operands_start;
use crate::bytecode::Opcode;
use crate::vm::frame::Frame;
use crate::vm::interpreter::core::Activation;
use crate::vm::interpreter::opcodes::{branch_target, operand_i16, operand_i32, operand_u8};
use crate::vm::interpreter::{ControlFlow, Interpreter};
use crate::vm::{VmError, VmResult};

impl<'a> Interpreter<'a> {
    /// Branches, `goto`, `jsr`/`ret` and switches
    ///
    /// Taken transfers return `ControlFlow::Jump`; the loop applies the static
    /// stack effect and runs the back-edge checkpoint.
    pub(in crate::vm::interpreter) fn exec_control_flow_ops(
        &mut self,
        act: &Activation<'_>,
        frame: &mut Frame,
        bci: u32,
        top: usize,
        opcode: Opcode,
    ) -> VmResult<ControlFlow> {
        let code = act.code.stream().original();
        let at = bci as usize;
        let offset16 = || operand_i16(code, at + 1, bci).map(i32::from);

        let taken = match opcode {
            Opcode::Ifeq | Opcode::Ifne | Opcode::Iflt | Opcode::Ifge | Opcode::Ifgt | Opcode::Ifle => {
                let v = frame.get_int(Frame::below(top, 1)?)?;
                match opcode {
                    Opcode::Ifeq => v == 0,
                    Opcode::Ifne => v != 0,
                    Opcode::Iflt => v < 0,
                    Opcode::Ifge => v >= 0,
                    Opcode::Ifgt => v > 0,
                    _ => v <= 0,
                }
            }
            Opcode::IfIcmpeq
            | Opcode::IfIcmpne
            | Opcode::IfIcmplt
            | Opcode::IfIcmpge
            | Opcode::IfIcmpgt
            | Opcode::IfIcmple => {
                let a_at = Frame::below(top, 2)?;
                let a = frame.get_int(a_at)?;
                let b = frame.get_int(a_at + 1)?;
                match opcode {
                    Opcode::IfIcmpeq => a == b,
                    Opcode::IfIcmpne => a != b,
                    Opcode::IfIcmplt => a < b,
                    Opcode::IfIcmpge => a >= b,
                    Opcode::IfIcmpgt => a > b,
                    _ => a <= b,
                }
            }
            Opcode::IfAcmpeq | Opcode::IfAcmpne => {
                let a_at = Frame::below(top, 2)?;
                let same = frame.get_object(a_at)? == frame.get_object(a_at + 1)?;
                same == (opcode == Opcode::IfAcmpeq)
            }
            Opcode::Ifnull | Opcode::Ifnonnull => {
                let is_null = frame.get_object(Frame::below(top, 1)?)?.is_none();
                is_null == (opcode == Opcode::Ifnull)
            }
            Opcode::Goto => true,
            Opcode::GotoW => {
                let offset = operand_i32(code, at + 1, bci)?;
                return Ok(ControlFlow::Jump(branch_target(bci, offset)?));
            }
            Opcode::Jsr | Opcode::JsrW => {
                let (offset, len) = if opcode == Opcode::Jsr {
                    (offset16()?, 3)
                } else {
                    (operand_i32(code, at + 1, bci)?, 5)
                };
                frame.put_return_address(top, bci + len)?;
                return Ok(ControlFlow::Jump(branch_target(bci, offset)?));
            }
            Opcode::Ret => {
                let local = usize::from(operand_u8(code, at + 1, bci)?);
                let target = frame.get_return_address(local)?;
                let target = act
                    .code
                    .subroutines()
                    .resolve(act.code.section(), code, bci, target)?;
                return Ok(ControlFlow::Jump(target));
            }
            Opcode::Tableswitch => {
                let key = frame.get_int(Frame::below(top, 1)?)?;
                let base = switch_operands_start(at);
                let default = operand_i32(code, base, bci)?;
                let low = operand_i32(code, base + 4, bci)?;
                let high = operand_i32(code, base + 8, bci)?;
                let offset = if key < low || key > high {
                    default
                } else {
                    let index = (i64::from(key) - i64::from(low)) as usize;
                    operand_i32(code, base + 12 + index * 4, bci)?
                };
                return Ok(ControlFlow::Jump(branch_target(bci, offset)?));
            }
            Opcode::Lookupswitch => {
                let key = frame.get_int(Frame::below(top, 1)?)?;
                let base = switch_operands_start(at);
                let default = operand_i32(code, base, bci)?;
                let npairs = operand_i32(code, base + 4, bci)?;
                let pairs = base + 8;

                // pairs are sorted by match value
                let (mut lo, mut hi) = (0usize, npairs.max(0) as usize);
                let mut offset = default;
                while lo < hi {
                    let mid = lo + (hi - lo) / 2;
                    let candidate = operand_i32(code, pairs + mid * 8, bci)?;
                    if candidate == key {
                        offset = operand_i32(code, pairs + mid * 8 + 4, bci)?;
                        break;
                    }
                    if candidate < key {
                        lo = mid + 1;
                    } else {
                        hi = mid;
                    }
                }
                return Ok(ControlFlow::Jump(branch_target(bci, offset)?));
            }
            other => {
                return Err(VmError::Malformed(format!(
                    "{} routed to control-flow handler",
                    other.name()
                )))
            }
        };

        if taken {
            Ok(ControlFlow::Jump(branch_target(bci, offset16()?)?))
        } else {
            Ok(ControlFlow::Next)
        }
    }
}
