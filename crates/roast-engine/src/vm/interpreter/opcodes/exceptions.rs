use crate::vm::frame::Frame;
use crate::vm::interpreter::{ControlFlow, Interpreter};
use crate::vm::runtime::ThrowableKind;
use crate::vm::{VmError, VmResult};

impl<'a> Interpreter<'a> {
    /// `athrow`: a null operand raises `NullPointerException` instead
    pub(in crate::vm::interpreter) fn exec_athrow(
        &mut self,
        frame: &mut Frame,
        top: usize,
    ) -> VmResult<ControlFlow> {
        match frame.get_object(Frame::below(top, 1)?)? {
            Some(exception) => Err(VmError::Exception(exception)),
            None => Err(self.raise(ThrowableKind::NullPointer, "throwing null")),
        }
    }
}
