use crate::bytecode::Opcode;
use crate::vm::frame::Frame;
use crate::vm::interpreter::{ControlFlow, Interpreter};
use crate::vm::{VmError, VmResult};

impl<'a> Interpreter<'a> {
    /// Primitive conversions
    ///
    /// Float-to-integer conversions saturate and map NaN to zero, which is
    /// exactly what Rust's `as` casts do.
    pub(in crate::vm::interpreter) fn exec_conversion_ops(
        &mut self,
        frame: &mut Frame,
        top: usize,
        opcode: Opcode,
    ) -> VmResult<ControlFlow> {
        match opcode {
            Opcode::I2l | Opcode::I2f | Opcode::I2d | Opcode::I2b | Opcode::I2c | Opcode::I2s => {
                let at = Frame::below(top, 1)?;
                let v = frame.get_int(at)?;
                match opcode {
                    Opcode::I2l => frame.put_long(at, i64::from(v))?,
                    Opcode::I2f => frame.put_float(at, v as f32)?,
                    Opcode::I2d => frame.put_double(at, f64::from(v))?,
                    Opcode::I2b => frame.put_int(at, i32::from(v as i8))?,
                    Opcode::I2c => frame.put_int(at, i32::from(v as u16))?,
                    _ => frame.put_int(at, i32::from(v as i16))?,
                }
            }
            Opcode::L2i | Opcode::L2f | Opcode::L2d => {
                let at = Frame::below(top, 2)?;
                let v = frame.get_long(at)?;
                match opcode {
                    Opcode::L2i => frame.put_int(at, v as i32)?,
                    Opcode::L2f => frame.put_float(at, v as f32)?,
                    _ => frame.put_double(at, v as f64)?,
                }
            }
            Opcode::F2i | Opcode::F2l | Opcode::F2d => {
                let at = Frame::below(top, 1)?;
                let v = frame.get_float(at)?;
                match opcode {
                    Opcode::F2i => frame.put_int(at, v as i32)?,
                    Opcode::F2l => frame.put_long(at, v as i64)?,
                    _ => frame.put_double(at, f64::from(v))?,
                }
            }
            Opcode::D2i | Opcode::D2l | Opcode::D2f => {
                let at = Frame::below(top, 2)?;
                let v = frame.get_double(at)?;
                match opcode {
                    Opcode::D2i => frame.put_int(at, v as i32)?,
                    Opcode::D2l => frame.put_long(at, v as i64)?,
                    _ => frame.put_float(at, v as f32)?,
                }
            }
            other => {
                return Err(VmError::Malformed(format!(
                    "{} routed to conversion handler",
                    other.name()
                )))
            }
        }
        Ok(ControlFlow::Next)
    }
}
