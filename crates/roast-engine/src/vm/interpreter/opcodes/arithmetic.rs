use crate::bytecode::Opcode;
use crate::vm::frame::Frame;
use crate::vm::interpreter::{ControlFlow, Interpreter};
use crate::vm::runtime::ThrowableKind;
use crate::vm::{VmError, VmResult};

impl<'a> Interpreter<'a> {
    /// Integer and floating-point arithmetic, shifts and bitwise ops
    ///
    /// Integer ops wrap; `div`/`rem` by zero raise `ArithmeticException`.
    /// Float ops follow IEEE-754 and never fault.
    pub(in crate::vm::interpreter) fn exec_arithmetic_ops(
        &mut self,
        frame: &mut Frame,
        top: usize,
        opcode: Opcode,
    ) -> VmResult<ControlFlow> {
        match opcode {
            // =========================================================
            // Int
            // =========================================================
            Opcode::Iadd
            | Opcode::Isub
            | Opcode::Imul
            | Opcode::Idiv
            | Opcode::Irem
            | Opcode::Ishl
            | Opcode::Ishr
            | Opcode::Iushr
            | Opcode::Iand
            | Opcode::Ior
            | Opcode::Ixor => {
                let at = Frame::below(top, 2)?;
                let a = frame.get_int(at)?;
                let b = frame.get_int(at + 1)?;
                let result = match opcode {
                    Opcode::Iadd => a.wrapping_add(b),
                    Opcode::Isub => a.wrapping_sub(b),
                    Opcode::Imul => a.wrapping_mul(b),
                    Opcode::Idiv | Opcode::Irem if b == 0 => return Err(self.divide_by_zero()),
                    Opcode::Idiv => a.wrapping_div(b),
                    Opcode::Irem => a.wrapping_rem(b),
                    Opcode::Ishl => a.wrapping_shl(b as u32 & 31),
                    Opcode::Ishr => a.wrapping_shr(b as u32 & 31),
                    Opcode::Iushr => ((a as u32) >> (b as u32 & 31)) as i32,
                    Opcode::Iand => a & b,
                    Opcode::Ior => a | b,
                    _ => a ^ b,
                };
                frame.put_int(at, result)?;
            }
            Opcode::Ineg => {
                let at = Frame::below(top, 1)?;
                let v = frame.get_int(at)?;
                frame.put_int(at, v.wrapping_neg())?;
            }

            // =========================================================
            // Long
            // =========================================================
            Opcode::Ladd
            | Opcode::Lsub
            | Opcode::Lmul
            | Opcode::Ldiv
            | Opcode::Lrem
            | Opcode::Land
            | Opcode::Lor
            | Opcode::Lxor => {
                let at = Frame::below(top, 4)?;
                let a = frame.get_long(at)?;
                let b = frame.get_long(at + 2)?;
                let result = match opcode {
                    Opcode::Ladd => a.wrapping_add(b),
                    Opcode::Lsub => a.wrapping_sub(b),
                    Opcode::Lmul => a.wrapping_mul(b),
                    Opcode::Ldiv | Opcode::Lrem if b == 0 => return Err(self.divide_by_zero()),
                    Opcode::Ldiv => a.wrapping_div(b),
                    Opcode::Lrem => a.wrapping_rem(b),
                    Opcode::Land => a & b,
                    Opcode::Lor => a | b,
                    _ => a ^ b,
                };
                frame.put_long(at, result)?;
            }
            Opcode::Lshl | Opcode::Lshr | Opcode::Lushr => {
                let at = Frame::below(top, 3)?;
                let a = frame.get_long(at)?;
                let distance = frame.get_int(at + 2)? as u32 & 63;
                let result = match opcode {
                    Opcode::Lshl => a.wrapping_shl(distance),
                    Opcode::Lshr => a.wrapping_shr(distance),
                    _ => ((a as u64) >> distance) as i64,
                };
                frame.put_long(at, result)?;
            }
            Opcode::Lneg => {
                let at = Frame::below(top, 2)?;
                let v = frame.get_long(at)?;
                frame.put_long(at, v.wrapping_neg())?;
            }

            // =========================================================
            // Float
            // =========================================================
            Opcode::Fadd | Opcode::Fsub | Opcode::Fmul | Opcode::Fdiv | Opcode::Frem => {
                let at = Frame::below(top, 2)?;
                let a = frame.get_float(at)?;
                let b = frame.get_float(at + 1)?;
                let result = match opcode {
                    Opcode::Fadd => a + b,
                    Opcode::Fsub => a - b,
                    Opcode::Fmul => a * b,
                    Opcode::Fdiv => a / b,
                    _ => a % b,
                };
                frame.put_float(at, result)?;
            }
            Opcode::Fneg => {
                let at = Frame::below(top, 1)?;
                let v = frame.get_float(at)?;
                frame.put_float(at, -v)?;
            }

            // =========================================================
            // Double
            // =========================================================
            Opcode::Dadd | Opcode::Dsub | Opcode::Dmul | Opcode::Ddiv | Opcode::Drem => {
                let at = Frame::below(top, 4)?;
                let a = frame.get_double(at)?;
                let b = frame.get_double(at + 2)?;
                let result = match opcode {
                    Opcode::Dadd => a + b,
                    Opcode::Dsub => a - b,
                    Opcode::Dmul => a * b,
                    Opcode::Ddiv => a / b,
                    _ => a % b,
                };
                frame.put_double(at, result)?;
            }
            Opcode::Dneg => {
                let at = Frame::below(top, 2)?;
                let v = frame.get_double(at)?;
                frame.put_double(at, -v)?;
            }

            other => {
                return Err(VmError::Malformed(format!(
                    "{} routed to arithmetic handler",
                    other.name()
                )))
            }
        }
        Ok(ControlFlow::Next)
    }

    #[cold]
    fn divide_by_zero(&self) -> VmError {
        self.raise(ThrowableKind::Arithmetic, "/ by zero")
    }
}
