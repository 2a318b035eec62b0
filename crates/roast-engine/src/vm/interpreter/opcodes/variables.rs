use crate::bytecode::Opcode;
use crate::vm::frame::Frame;
use crate::vm::interpreter::core::Activation;
use crate::vm::interpreter::opcodes::{operand_i16, operand_u16, operand_u8};
use crate::vm::interpreter::{ControlFlow, Interpreter};
use crate::vm::value::Value;
use crate::vm::{VmError, VmResult};

/// Value kind moved by a load/store opcode
#[derive(Clone, Copy)]
enum Slots {
    Int,
    Long,
    Float,
    Double,
    Ref,
}

impl Slots {
    fn width(self) -> usize {
        match self {
            Slots::Long | Slots::Double => 2,
            _ => 1,
        }
    }
}

/// Decode a load or store into `(is_store, kind, implicit local index)`
fn decode(opcode: Opcode) -> Option<(bool, Slots, Option<usize>)> {
    use Opcode::*;
    let b = opcode.to_u8();
    let shorthand = |first: Opcode| Some(usize::from((b - first.to_u8()) % 4));
    Some(match opcode {
        Iload => (false, Slots::Int, None),
        Lload => (false, Slots::Long, None),
        Fload => (false, Slots::Float, None),
        Dload => (false, Slots::Double, None),
        Aload => (false, Slots::Ref, None),
        Iload0 | Iload1 | Iload2 | Iload3 => (false, Slots::Int, shorthand(Iload0)),
        Lload0 | Lload1 | Lload2 | Lload3 => (false, Slots::Long, shorthand(Lload0)),
        Fload0 | Fload1 | Fload2 | Fload3 => (false, Slots::Float, shorthand(Fload0)),
        Dload0 | Dload1 | Dload2 | Dload3 => (false, Slots::Double, shorthand(Dload0)),
        Aload0 | Aload1 | Aload2 | Aload3 => (false, Slots::Ref, shorthand(Aload0)),
        Istore => (true, Slots::Int, None),
        Lstore => (true, Slots::Long, None),
        Fstore => (true, Slots::Float, None),
        Dstore => (true, Slots::Double, None),
        Astore => (true, Slots::Ref, None),
        Istore0 | Istore1 | Istore2 | Istore3 => (true, Slots::Int, shorthand(Istore0)),
        Lstore0 | Lstore1 | Lstore2 | Lstore3 => (true, Slots::Long, shorthand(Lstore0)),
        Fstore0 | Fstore1 | Fstore2 | Fstore3 => (true, Slots::Float, shorthand(Fstore0)),
        Dstore0 | Dstore1 | Dstore2 | Dstore3 => (true, Slots::Double, shorthand(Dstore0)),
        Astore0 | Astore1 | Astore2 | Astore3 => (true, Slots::Ref, shorthand(Astore0)),
        _ => return None,
    })
}

impl<'a> Interpreter<'a> {
    /// Local loads, stores and `iinc`
    pub(in crate::vm::interpreter) fn exec_variable_ops(
        &mut self,
        act: &Activation<'_>,
        frame: &mut Frame,
        bci: u32,
        top: usize,
        opcode: Opcode,
    ) -> VmResult<ControlFlow> {
        let code = act.code.stream().original();
        let at = bci as usize;
        if opcode == Opcode::Iinc {
            let local = usize::from(operand_u8(code, at + 1, bci)?);
            let delta = i32::from(operand_u8(code, at + 2, bci)? as i8);
            Self::increment(frame, local, delta)?;
            return Ok(ControlFlow::Next);
        }

        let (is_store, kind, implicit) = decode(opcode).ok_or_else(|| {
            VmError::Malformed(format!("{} routed to variable handler", opcode.name()))
        })?;
        let local = match implicit {
            Some(local) => local,
            None => usize::from(operand_u8(code, at + 1, bci)?),
        };
        Self::move_local(frame, top, local, kind, is_store)?;
        Ok(ControlFlow::Next)
    }

    /// `wide` forms of loads, stores, `ret` and `iinc`
    pub(in crate::vm::interpreter) fn exec_wide(
        &mut self,
        act: &Activation<'_>,
        frame: &mut Frame,
        bci: u32,
        top: usize,
    ) -> VmResult<ControlFlow> {
        let code = act.code.stream().original();
        let at = bci as usize;
        let inner_byte = operand_u8(code, at + 1, bci)?;
        let inner = Opcode::from_u8(inner_byte)
            .filter(|op| op.is_widenable())
            .ok_or(VmError::InvalidOpcode {
                opcode: inner_byte,
                bci: bci + 1,
            })?;
        let local = usize::from(operand_u16(code, at + 2, bci)?);

        match inner {
            Opcode::Iinc => {
                let delta = i32::from(operand_i16(code, at + 4, bci)?);
                Self::increment(frame, local, delta)?;
                Ok(ControlFlow::NextWith(0))
            }
            Opcode::Ret => {
                let target = frame.get_return_address(local)?;
                let target = act
                    .code
                    .subroutines()
                    .resolve(act.code.section(), code, bci, target)?;
                Ok(ControlFlow::Jump(target))
            }
            op => {
                let (is_store, kind, _) = decode(op).ok_or_else(|| {
                    VmError::Malformed(format!("wide {} is not a local access", op.name()))
                })?;
                Self::move_local(frame, top, local, kind, is_store)?;
                let delta = kind.width() as isize;
                Ok(ControlFlow::NextWith(if is_store { -delta } else { delta }))
            }
        }
    }

    fn increment(frame: &mut Frame, local: usize, delta: i32) -> VmResult<()> {
        if local >= frame.max_locals() {
            return Err(VmError::Malformed(format!("iinc of local {} out of range", local)));
        }
        let v = frame.get_int(local)?;
        frame.put_int(local, v.wrapping_add(delta))
    }

    fn move_local(
        frame: &mut Frame,
        top: usize,
        local: usize,
        kind: Slots,
        is_store: bool,
    ) -> VmResult<()> {
        if local + kind.width() > frame.max_locals() {
            return Err(VmError::Malformed(format!(
                "local {} out of range (max_locals={})",
                local,
                frame.max_locals()
            )));
        }
        if !is_store {
            return match kind {
                Slots::Int => frame.put_int(top, frame.get_int(local)?),
                Slots::Long => frame.put_long(top, frame.get_long(local)?),
                Slots::Float => frame.put_float(top, frame.get_float(local)?),
                Slots::Double => frame.put_double(top, frame.get_double(local)?),
                Slots::Ref => frame.put_object(top, frame.get_object(local)?),
            };
        }

        let from = Frame::below(top, kind.width())?;
        match kind {
            Slots::Int => frame.put_int(local, frame.get_int(from)?),
            Slots::Long => frame.put_long(local, frame.get_long(from)?),
            Slots::Float => frame.put_float(local, frame.get_float(from)?),
            Slots::Double => frame.put_double(local, frame.get_double(from)?),
            // astore also stores jsr return addresses
            Slots::Ref => match frame.get(from)? {
                value @ (Value::Ref(_) | Value::Null | Value::ReturnAddress(_)) => frame.set(local, value),
                other => Err(VmError::Malformed(format!(
                    "astore of {} into local {}",
                    other.type_name(),
                    local
                ))),
            },
        }
    }
}
