use crate::bytecode::Opcode;
use crate::vm::frame::Frame;
use crate::vm::interpreter::core::Activation;
use crate::vm::interpreter::{ControlFlow, Interpreter};
use crate::vm::quicken::{self, linker, Site};
use crate::vm::{VmError, VmResult};

impl<'a> Interpreter<'a> {
    /// First execution of a quickenable site (or every execution with
    /// quickening off): resolve, publish, run
    pub(in crate::vm::interpreter) fn exec_quickenable(
        &mut self,
        act: &Activation<'_>,
        frame: &mut Frame,
        bci: u32,
        top: usize,
        opcode: Opcode,
    ) -> VmResult<ControlFlow> {
        let site = Site {
            method: act.method,
            code: act.code,
            bci,
            slot: None,
        };
        let node = linker::link(self, &site, opcode, frame, top)?;

        if !self.ctx.options.quickening {
            let delta = node.execute(self, &site, frame, top)?;
            return Ok(ControlFlow::NextWith(delta));
        }

        let (node, slot) = quicken::install(act.code, bci, opcode, node);
        let site = Site { slot, ..site };
        let delta = node.execute(self, &site, frame, top)?;
        Ok(ControlFlow::NextWith(delta))
    }

    /// `QUICK` and `SLIM_QUICK` sites
    pub(in crate::vm::interpreter) fn exec_quick_ops(
        &mut self,
        act: &Activation<'_>,
        frame: &mut Frame,
        bci: u32,
        top: usize,
        opcode: Opcode,
    ) -> VmResult<ControlFlow> {
        let table = act.code.quick_table();
        let slot = match opcode {
            Opcode::Quick => act
                .code
                .stream()
                .quick_operand(bci as usize + 1)
                .map(usize::from),
            _ => table.slim_index(bci),
        };
        let (node, slot) = slot
            .and_then(|slot| Some((table.get(slot)?, slot)))
            .ok_or_else(|| VmError::Malformed(format!("dangling {} at bci {}", opcode.name(), bci)))?;

        let site = Site {
            method: act.method,
            code: act.code,
            bci,
            slot: Some(slot),
        };
        let delta = node.execute(self, &site, frame, top)?;
        Ok(ControlFlow::NextWith(delta))
    }
}
