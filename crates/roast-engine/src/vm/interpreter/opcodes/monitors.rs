use crate::bytecode::Opcode;
use crate::vm::frame::Frame;
use crate::vm::interpreter::{ControlFlow, Interpreter};
use crate::vm::runtime::ThrowableKind;
use crate::vm::sync::MonitorStack;
use crate::vm::{VmError, VmResult};

impl<'a> Interpreter<'a> {
    /// `monitorenter` / `monitorexit`
    pub(in crate::vm::interpreter) fn exec_monitor_ops(
        &mut self,
        frame: &mut Frame,
        monitors: &mut MonitorStack,
        top: usize,
        opcode: Opcode,
    ) -> VmResult<ControlFlow> {
        let rt = self.runtime();
        let obj = frame
            .get_object(Frame::below(top, 1)?)?
            .ok_or_else(|| self.raise(ThrowableKind::NullPointer, "locking null"))?;
        match opcode {
            Opcode::Monitorenter => monitors.enter(rt, obj)?,
            Opcode::Monitorexit => {
                if !monitors.exit(rt, obj)? {
                    return Err(self.raise(
                        ThrowableKind::IllegalMonitorState,
                        "current activation does not own the monitor",
                    ));
                }
            }
            other => {
                return Err(VmError::Malformed(format!(
                    "{} routed to monitor handler",
                    other.name()
                )))
            }
        }
        Ok(ControlFlow::Next)
    }
}
