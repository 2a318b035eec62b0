//! Activation driver and dispatch loop
//!
//! An activation is one interpreted method invocation: a [`Frame`], a
//! [`MonitorStack`] and a `(bci, top)` cursor. The loop decodes the live tag
//! at `bci`, runs its handler, then moves the cursor according to the
//! returned [`ControlFlow`]. Errors enter exception dispatch; anything no
//! handler catches leaves the activation after its loop count is flushed and
//! its monitors are released.

use std::sync::Arc;

use super::execution::{Completion, ControlFlow, JumpOutcome};
use crate::bytecode::opcode::instruction_length;
use crate::bytecode::Opcode;
use crate::vm::class::MethodInfo;
use crate::vm::frame::Frame;
use crate::vm::method::MethodCode;
use crate::vm::osr::{OsrEntry, OsrTransfer};
use crate::vm::runtime::{HookAction, Instrumentation, LinkError, Runtime, ThrowableKind};
use crate::vm::sync::MonitorStack;
use crate::vm::value::{ObjRef, Value};
use crate::vm::{MethodFlags, ResourceKind, VmContext, VmError, VmResult};

/// Per-activation dispatch state
pub(in crate::vm::interpreter) struct Activation<'m> {
    pub(in crate::vm::interpreter) method: &'m Arc<MethodInfo>,
    pub(in crate::vm::interpreter) code: &'m MethodCode,
    /// Back-edges taken, saturating at `loop_count_limit`
    loop_count: u32,
    /// Still eligible for OSR
    osr_allowed: bool,
    /// Entered through `resume` (after an OSR hand-off)
    resumed: bool,
}

impl<'m> Activation<'m> {
    fn new(ctx: &VmContext, method: &'m Arc<MethodInfo>, code: &'m MethodCode, resumed: bool) -> Self {
        Self {
            method,
            code,
            loop_count: 0,
            osr_allowed: !resumed && ctx.options.osr && ctx.tiering.is_some(),
            resumed,
        }
    }
}

/// Where the cursor goes after one step
enum Step {
    At(u32, usize),
    Done(Completion),
    /// Compiled code ran the rest of the activation
    Exit(VmResult<Value>),
}

/// Bytecode interpreter for one thread
///
/// Holds a reference to the shared context and the thread's activation
/// depth. Activations are plain Rust recursion through [`Interpreter::invoke`].
pub struct Interpreter<'a> {
    pub(in crate::vm::interpreter) ctx: &'a VmContext,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    /// Create an interpreter over a shared context
    pub fn new(ctx: &'a VmContext) -> Self {
        Self { ctx, depth: 0 }
    }

    /// Current activation depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Invoke `method` with arguments in slot form
    ///
    /// `args` holds the receiver first for instance methods; longs and doubles
    /// take two entries (the value, then `Value::Top`).
    pub fn invoke(&mut self, method: &Arc<MethodInfo>, args: &[Value]) -> VmResult<Value> {
        if args.len() != method.param_slots() {
            return Err(VmError::Malformed(format!(
                "{} takes {} argument slots, got {}",
                method,
                method.param_slots(),
                args.len()
            )));
        }
        if method.is_abstract() {
            return Err(self.raise(ThrowableKind::AbstractMethod, &method.to_string()));
        }
        let Some(code) = method.code.clone() else {
            if method.flags.contains(MethodFlags::NATIVE) {
                return self.runtime().invoke_native(method, args);
            }
            return Err(self.raise(ThrowableKind::AbstractMethod, &method.to_string()));
        };
        if self.depth >= self.ctx.options.max_call_depth {
            return Err(VmError::ResourceExhausted(ResourceKind::StackOverflow));
        }

        self.depth += 1;
        let result = self.run_activation(method, &code, args);
        self.depth -= 1;
        result
    }

    /// Continue interpreting a live activation at `entry`
    ///
    /// Used by compiled code that hands its activation back. The activation
    /// does not consult OSR again and ignores `Reenter` requests; its normal
    /// return epilogue is left to the activation that performed the hand-off.
    pub fn resume(
        &mut self,
        method: &Arc<MethodInfo>,
        frame: &mut Frame,
        monitors: &mut MonitorStack,
        entry: OsrEntry,
    ) -> VmResult<Value> {
        let code = method
            .code
            .clone()
            .ok_or_else(|| VmError::Malformed(format!("resuming {} without code", method)))?;
        let mut act = Activation::new(self.ctx, method, &code, true);
        match self.run_loop(&mut act, frame, monitors, entry.bci, entry.top)? {
            Completion::Return(value) => Ok(value),
            Completion::Reenter => Err(VmError::Fatal(format!(
                "resumed activation of {} asked to reenter",
                method
            ))),
        }
    }

    // ===== Shared helpers =====

    /// Host runtime
    #[inline]
    pub(crate) fn runtime(&self) -> &'a dyn Runtime {
        &*self.ctx.runtime
    }

    /// Instrumentation hooks, if installed
    #[inline]
    pub(crate) fn instrumentation(&self) -> Option<&'a dyn Instrumentation> {
        self.ctx.instrumentation.as_deref()
    }

    /// Construct a guest throwable and wrap it as an error
    ///
    /// A failure to construct the throwable is returned in its place.
    pub(crate) fn raise(&self, kind: ThrowableKind, message: &str) -> VmError {
        match self.runtime().new_throwable(kind, message) {
            Ok(obj) => VmError::Exception(obj),
            Err(e) => e,
        }
    }

    /// Surface a resolution or linking failure as a guest linkage error
    pub(crate) fn link_error(&self, error: LinkError) -> VmError {
        tracing::debug!(target: "roast::quicken", %error, "linkage failed");
        self.raise(error.throwable_kind(), &error.to_string())
    }

    // ===== Activation =====

    fn run_activation(
        &mut self,
        method: &Arc<MethodInfo>,
        code: &MethodCode,
        args: &[Value],
    ) -> VmResult<Value> {
        let rt = self.runtime();
        code.profile().record_invocation();

        let mut frame = Frame::new(code.max_locals(), code.max_stack());
        frame.load_arguments(args)?;
        let mut monitors = MonitorStack::new();
        if method.is_synchronized() {
            let lock = self.method_lock_object(method, args)?;
            monitors.lock_method(rt, lock)?;
        }

        if let Some(hooks) = self.instrumentation() {
            match hooks.method_entry(method, &frame) {
                HookAction::EarlyReturn(value) => {
                    monitors.unlock_method(rt)?;
                    return Ok(value);
                }
                HookAction::Continue | HookAction::Reenter => {}
            }
        }

        let base = frame.stack_base();
        loop {
            let mut act = Activation::new(self.ctx, method, code, false);
            match self.run_loop(&mut act, &mut frame, &mut monitors, 0, base)? {
                Completion::Return(value) => return self.finish_return(method, &mut monitors, value),
                Completion::Reenter => {
                    tracing::debug!(target: "roast::interpreter", %method, "reentering activation");
                    if let Err(e) = monitors.release_explicit(rt) {
                        monitors.abort(rt);
                        return Err(e);
                    }
                    frame = Frame::new(code.max_locals(), code.max_stack());
                    frame.load_arguments(args)?;
                }
            }
        }
    }

    /// Receiver, or the holder's class mirror for static methods
    fn method_lock_object(&self, method: &MethodInfo, args: &[Value]) -> VmResult<ObjRef> {
        if method.is_static() {
            return method.holder.mirror.ok_or_else(|| {
                VmError::Fatal(format!("class {} has no mirror to lock", method.holder))
            });
        }
        match args.first().and_then(|v| v.as_object()) {
            Some(Some(obj)) => Ok(obj),
            _ => Err(self.raise(ThrowableKind::NullPointer, "synchronized method on null receiver")),
        }
    }

    /// Normal-return epilogue: structured locking check, method unlock, hook
    ///
    /// Runs after the dispatch loop has finished, so an
    /// `IllegalMonitorStateException` raised here is thrown to the caller;
    /// handlers of this method never see it.
    fn finish_return(
        &mut self,
        method: &Arc<MethodInfo>,
        monitors: &mut MonitorStack,
        value: Value,
    ) -> VmResult<Value> {
        let rt = self.runtime();
        let leftover = match monitors.release_explicit(rt) {
            Ok(count) => count,
            Err(e) => {
                monitors.abort(rt);
                return Err(e);
            }
        };
        monitors.unlock_method(rt)?;
        if leftover > 0 {
            return Err(self.raise(
                ThrowableKind::IllegalMonitorState,
                &format!("{} returned holding {} monitor(s)", method, leftover),
            ));
        }
        if let Some(hooks) = self.instrumentation() {
            hooks.method_return(method, value);
        }
        Ok(value)
    }

    /// Run the dispatch loop, then flush loop bookkeeping
    ///
    /// Monitors are aborted when an error leaves the activation.
    fn run_loop(
        &mut self,
        act: &mut Activation<'_>,
        frame: &mut Frame,
        monitors: &mut MonitorStack,
        bci: u32,
        top: usize,
    ) -> VmResult<Completion> {
        let result = self.dispatch(act, frame, monitors, bci, top);

        if act.loop_count > 0 {
            act.code.profile().add_loop_count(act.loop_count);
            if let Some(tiering) = &self.ctx.tiering {
                tiering.report_loop_count(act.method, act.loop_count);
            }
        }
        if let Err(e) = &result {
            tracing::debug!(target: "roast::exception", method = %act.method, error = %e, "leaving activation abruptly");
            monitors.abort(self.runtime());
        }
        result
    }

    fn dispatch(
        &mut self,
        act: &mut Activation<'_>,
        frame: &mut Frame,
        monitors: &mut MonitorStack,
        mut bci: u32,
        mut top: usize,
    ) -> VmResult<Completion> {
        let mut pending: Option<VmError> = None;
        loop {
            let result = match pending.take() {
                Some(e) => Err(e),
                None => self.step(act, frame, monitors, bci, top),
            };
            let error = match result {
                Ok(Step::At(next_bci, next_top)) => {
                    bci = next_bci;
                    top = next_top;
                    continue;
                }
                Ok(Step::Done(completion)) => return Ok(completion),
                Ok(Step::Exit(result)) => return result.map(Completion::Return),
                Err(e) => e,
            };

            let (handler, exception) = self.find_handler(act, bci, error)?;
            let base = frame.stack_base();
            frame.clear(base, top.max(base))?;
            frame.put_object(base, Some(exception))?;
            top = base + 1;
            if handler <= bci {
                match self.before_jump(act, frame, monitors, handler, top) {
                    Ok(JumpOutcome::Continue) => {}
                    Ok(JumpOutcome::Osr(result)) => return result.map(Completion::Return),
                    Err(e) => pending = Some(e),
                }
            }
            bci = handler;
        }
    }

    /// Execute the instruction at `bci` and compute the next cursor
    fn step(
        &mut self,
        act: &mut Activation<'_>,
        frame: &mut Frame,
        monitors: &mut MonitorStack,
        bci: u32,
        top: usize,
    ) -> VmResult<Step> {
        frame.set_bci(bci);
        if let Some(hooks) = self.instrumentation() {
            if let Some((_, line)) = act.code.statement_starting_at(bci) {
                match hooks.statement(act.method, bci, line) {
                    HookAction::Continue => {}
                    HookAction::EarlyReturn(value) => return Ok(Step::Done(Completion::Return(value))),
                    HookAction::Reenter if act.resumed => {
                        tracing::debug!(target: "roast::interpreter", method = %act.method, bci, "reenter ignored in resumed activation");
                    }
                    HookAction::Reenter => return Ok(Step::Done(Completion::Reenter)),
                }
            }
        }

        let flow = self.execute_opcode(act, frame, monitors, bci, top)?;
        let original = act.code.stream().original();
        let opcode = original
            .get(bci as usize)
            .and_then(|&b| Opcode::from_u8(b))
            .ok_or_else(|| VmError::Malformed(format!("no instruction at bci {}", bci)))?;

        match flow {
            ControlFlow::Next => {
                let len = Self::length_at(original, bci)?;
                let effect = opcode.stack_effect().unwrap_or(0) as isize;
                Ok(Step::At(bci + len, Self::adjust(top, effect)?))
            }
            ControlFlow::NextWith(delta) => {
                let len = Self::length_at(original, bci)?;
                Ok(Step::At(bci + len, Self::adjust(top, delta)?))
            }
            ControlFlow::Jump(target) => {
                let effect = opcode.stack_effect().unwrap_or(0) as isize;
                let top = Self::adjust(top, effect)?;
                if target as usize >= original.len() {
                    return Err(VmError::Malformed(format!(
                        "jump from {} to {} outside code",
                        bci, target
                    )));
                }
                if target <= bci {
                    if let JumpOutcome::Osr(result) = self.before_jump(act, frame, monitors, target, top)? {
                        return Ok(Step::Exit(result));
                    }
                }
                Ok(Step::At(target, top))
            }
            ControlFlow::Return(value) => Ok(Step::Done(Completion::Return(value))),
        }
    }

    fn length_at(original: &[u8], bci: u32) -> VmResult<u32> {
        instruction_length(original, bci as usize)
            .map(|len| len as u32)
            .ok_or_else(|| VmError::Malformed(format!("undecodable instruction at bci {}", bci)))
    }

    #[inline]
    fn adjust(top: usize, delta: isize) -> VmResult<usize> {
        top.checked_add_signed(delta)
            .ok_or_else(|| VmError::Malformed(format!("Operand stack underflow at top={}", top)))
    }

    /// Back-edge checkpoint: safepoint poll, loop counting, OSR
    fn before_jump(
        &mut self,
        act: &mut Activation<'_>,
        frame: &mut Frame,
        monitors: &mut MonitorStack,
        target: u32,
        top: usize,
    ) -> VmResult<JumpOutcome> {
        let ctx = self.ctx;
        ctx.safepoint().poll()?;

        if act.loop_count < ctx.options.loop_count_limit {
            act.loop_count += 1;
        }
        if !act.osr_allowed || act.loop_count % ctx.options.osr_poll_interval.max(1) != 0 {
            return Ok(JumpOutcome::Continue);
        }
        let Some(tiering) = ctx.tiering.as_ref() else {
            return Ok(JumpOutcome::Continue);
        };
        let entry = OsrEntry {
            bci: target,
            top,
            statement_index: act.code.statement_index(target),
        };
        let Some(osr) = tiering.request_osr(act.method, entry, act.loop_count) else {
            return Ok(JumpOutcome::Continue);
        };

        tracing::debug!(target: "roast::osr", method = %act.method, bci = target, top, "transferring activation to compiled code");
        act.osr_allowed = false;
        frame.set_bci(target);
        let transfer = OsrTransfer {
            method: act.method,
            entry,
            frame,
            monitors,
            interpreter: self,
        };
        Ok(JumpOutcome::Osr(osr.enter(transfer)))
    }

    /// Route an error to a handler of this activation
    ///
    /// Returns the handler bci and the exception to push, or the error to
    /// propagate when nothing here catches it.
    fn find_handler(
        &mut self,
        act: &Activation<'_>,
        bci: u32,
        error: VmError,
    ) -> VmResult<(u32, ObjRef)> {
        let rt = self.runtime();
        let code = act.code;
        match error {
            VmError::Exception(exception) => {
                if let Some(hooks) = self.instrumentation() {
                    hooks.exception_seen(act.method, bci, exception);
                }
                let thrown = rt.class_of(exception);
                match code.handlers().find_handler(bci, &thrown, code.resolver(), rt) {
                    Ok(Some(handler)) => {
                        tracing::debug!(target: "roast::exception", method = %act.method, bci, handler, exception = %thrown, "exception caught");
                        Ok((handler, exception))
                    }
                    Ok(None) => Err(VmError::Exception(exception)),
                    Err(link) => Err(self.link_error(link)),
                }
            }
            VmError::ResourceExhausted(kind) => {
                let exception = rt.preallocated(kind);
                if let Some(hooks) = self.instrumentation() {
                    hooks.exception_seen(act.method, bci, exception);
                }
                let thrown = rt.class_of(exception);
                match code
                    .handlers()
                    .find_recovery_handler(bci, kind, &thrown, code.resolver(), rt)
                {
                    Some(handler) => {
                        tracing::debug!(target: "roast::exception", method = %act.method, bci, handler, %kind, "resource exhaustion caught");
                        Ok((handler, exception))
                    }
                    None => Err(VmError::ResourceExhausted(kind)),
                }
            }
            fatal => Err(fatal),
        }
    }

    // ===== Dispatch =====

    /// Decode the live tag at `bci` and run its handler
    fn execute_opcode(
        &mut self,
        act: &Activation<'_>,
        frame: &mut Frame,
        monitors: &mut MonitorStack,
        bci: u32,
        top: usize,
    ) -> VmResult<ControlFlow> {
        let tag = act
            .code
            .stream()
            .tag(bci as usize)
            .ok_or_else(|| VmError::Malformed(format!("bci {} past end of code", bci)))?;
        let opcode = Opcode::from_u8(tag).ok_or(VmError::InvalidOpcode { opcode: tag, bci })?;

        match opcode {
            // =========================================================
            // Constants
            // =========================================================
            Opcode::Nop
            | Opcode::AconstNull
            | Opcode::IconstM1
            | Opcode::Iconst0
            | Opcode::Iconst1
            | Opcode::Iconst2
            | Opcode::Iconst3
            | Opcode::Iconst4
            | Opcode::Iconst5
            | Opcode::Lconst0
            | Opcode::Lconst1
            | Opcode::Fconst0
            | Opcode::Fconst1
            | Opcode::Fconst2
            | Opcode::Dconst0
            | Opcode::Dconst1
            | Opcode::Bipush
            | Opcode::Sipush
            | Opcode::Ldc
            | Opcode::LdcW
            | Opcode::Ldc2W => self.exec_constant_ops(act, frame, bci, top, opcode),

            // =========================================================
            // Locals
            // =========================================================
            Opcode::Iload
            | Opcode::Lload
            | Opcode::Fload
            | Opcode::Dload
            | Opcode::Aload
            | Opcode::Iload0
            | Opcode::Iload1
            | Opcode::Iload2
            | Opcode::Iload3
            | Opcode::Lload0
            | Opcode::Lload1
            | Opcode::Lload2
            | Opcode::Lload3
            | Opcode::Fload0
            | Opcode::Fload1
            | Opcode::Fload2
            | Opcode::Fload3
            | Opcode::Dload0
            | Opcode::Dload1
            | Opcode::Dload2
            | Opcode::Dload3
            | Opcode::Aload0
            | Opcode::Aload1
            | Opcode::Aload2
            | Opcode::Aload3
            | Opcode::Istore
            | Opcode::Lstore
            | Opcode::Fstore
            | Opcode::Dstore
            | Opcode::Astore
            | Opcode::Istore0
            | Opcode::Istore1
            | Opcode::Istore2
            | Opcode::Istore3
            | Opcode::Lstore0
            | Opcode::Lstore1
            | Opcode::Lstore2
            | Opcode::Lstore3
            | Opcode::Fstore0
            | Opcode::Fstore1
            | Opcode::Fstore2
            | Opcode::Fstore3
            | Opcode::Dstore0
            | Opcode::Dstore1
            | Opcode::Dstore2
            | Opcode::Dstore3
            | Opcode::Astore0
            | Opcode::Astore1
            | Opcode::Astore2
            | Opcode::Astore3
            | Opcode::Iinc => self.exec_variable_ops(act, frame, bci, top, opcode),
            Opcode::Wide => self.exec_wide(act, frame, bci, top),

            // =========================================================
            // Operand stack
            // =========================================================
            Opcode::Pop
            | Opcode::Pop2
            | Opcode::Dup
            | Opcode::DupX1
            | Opcode::DupX2
            | Opcode::Dup2
            | Opcode::Dup2X1
            | Opcode::Dup2X2
            | Opcode::Swap => self.exec_stack_ops(frame, top, opcode),

            // =========================================================
            // Arithmetic
            // =========================================================
            Opcode::Iadd
            | Opcode::Ladd
            | Opcode::Fadd
            | Opcode::Dadd
            | Opcode::Isub
            | Opcode::Lsub
            | Opcode::Fsub
            | Opcode::Dsub
            | Opcode::Imul
            | Opcode::Lmul
            | Opcode::Fmul
            | Opcode::Dmul
            | Opcode::Idiv
            | Opcode::Ldiv
            | Opcode::Fdiv
            | Opcode::Ddiv
            | Opcode::Irem
            | Opcode::Lrem
            | Opcode::Frem
            | Opcode::Drem
            | Opcode::Ineg
            | Opcode::Lneg
            | Opcode::Fneg
            | Opcode::Dneg
            | Opcode::Ishl
            | Opcode::Lshl
            | Opcode::Ishr
            | Opcode::Lshr
            | Opcode::Iushr
            | Opcode::Lushr
            | Opcode::Iand
            | Opcode::Land
            | Opcode::Ior
            | Opcode::Lor
            | Opcode::Ixor
            | Opcode::Lxor => self.exec_arithmetic_ops(frame, top, opcode),

            // =========================================================
            // Conversions
            // =========================================================
            Opcode::I2l
            | Opcode::I2f
            | Opcode::I2d
            | Opcode::L2i
            | Opcode::L2f
            | Opcode::L2d
            | Opcode::F2i
            | Opcode::F2l
            | Opcode::F2d
            | Opcode::D2i
            | Opcode::D2l
            | Opcode::D2f
            | Opcode::I2b
            | Opcode::I2c
            | Opcode::I2s => self.exec_conversion_ops(frame, top, opcode),

            // =========================================================
            // Comparison
            // =========================================================
            Opcode::Lcmp | Opcode::Fcmpl | Opcode::Fcmpg | Opcode::Dcmpl | Opcode::Dcmpg => {
                self.exec_comparison_ops(frame, top, opcode)
            }

            // =========================================================
            // Control flow
            // =========================================================
            Opcode::Ifeq
            | Opcode::Ifne
            | Opcode::Iflt
            | Opcode::Ifge
            | Opcode::Ifgt
            | Opcode::Ifle
            | Opcode::IfIcmpeq
            | Opcode::IfIcmpne
            | Opcode::IfIcmplt
            | Opcode::IfIcmpge
            | Opcode::IfIcmpgt
            | Opcode::IfIcmple
            | Opcode::IfAcmpeq
            | Opcode::IfAcmpne
            | Opcode::Ifnull
            | Opcode::Ifnonnull
            | Opcode::Goto
            | Opcode::GotoW
            | Opcode::Jsr
            | Opcode::JsrW
            | Opcode::Ret
            | Opcode::Tableswitch
            | Opcode::Lookupswitch => self.exec_control_flow_ops(act, frame, bci, top, opcode),

            Opcode::Ireturn
            | Opcode::Lreturn
            | Opcode::Freturn
            | Opcode::Dreturn
            | Opcode::Areturn
            | Opcode::Return => self.exec_return_ops(act, frame, top, opcode),

            // =========================================================
            // Quickenable (generic path)
            // =========================================================
            Opcode::Getstatic
            | Opcode::Putstatic
            | Opcode::Getfield
            | Opcode::Putfield
            | Opcode::Invokevirtual
            | Opcode::Invokespecial
            | Opcode::Invokestatic
            | Opcode::Invokeinterface
            | Opcode::Invokedynamic
            | Opcode::New
            | Opcode::Anewarray
            | Opcode::Multianewarray
            | Opcode::Checkcast
            | Opcode::Instanceof
            | Opcode::Iaload
            | Opcode::Laload
            | Opcode::Faload
            | Opcode::Daload
            | Opcode::Aaload
            | Opcode::Baload
            | Opcode::Caload
            | Opcode::Saload
            | Opcode::Iastore
            | Opcode::Lastore
            | Opcode::Fastore
            | Opcode::Dastore
            | Opcode::Aastore
            | Opcode::Bastore
            | Opcode::Castore
            | Opcode::Sastore => self.exec_quickenable(act, frame, bci, top, opcode),

            // =========================================================
            // Quickened sites
            // =========================================================
            Opcode::Quick | Opcode::SlimQuick => self.exec_quick_ops(act, frame, bci, top, opcode),

            // =========================================================
            // Objects, exceptions, monitors
            // =========================================================
            Opcode::Newarray | Opcode::Arraylength => self.exec_object_ops(act, frame, bci, top, opcode),
            Opcode::Athrow => self.exec_athrow(frame, top),
            Opcode::Monitorenter | Opcode::Monitorexit => {
                self.exec_monitor_ops(frame, monitors, top, opcode)
            }
        }
    }
}
