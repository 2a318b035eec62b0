//! Method body assembler
//!
//! Emits big-endian JVM bytecode with symbolic labels. Branch offsets,
//! switch tables and handler ranges are written against labels and patched
//! when [`CodeBuilder::finish`] runs. Emission methods chain; the first
//! misuse is remembered and reported by `finish`.
//!
//! ```rust,ignore
//! let mut b = CodeBuilder::new(1, 2);
//! let done = b.new_label();
//! b.op_u8(Opcode::Iload, 0).branch(Opcode::Ifeq, done);
//! b.op(Opcode::Iconst1).op(Opcode::Ireturn);
//! b.bind(done).op(Opcode::Iconst0).op(Opcode::Ireturn);
//! let code = b.finish(resolver)?;
//! ```

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::bytecode::opcode::switch_operands_start;
use crate::bytecode::Opcode;
use crate::vm::exception::HandlerEntry;
use crate::vm::method::{LineEntry, MethodCode};
use crate::vm::runtime::Resolver;
use crate::vm::VmError;

/// Branch target placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

/// Assembly failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum BuildError {
    /// A label was referenced but never bound
    #[error("label {0} was never bound")]
    UnboundLabel(usize),

    /// A label was bound twice
    #[error("label {0} bound twice")]
    LabelRebound(usize),

    /// A 16-bit branch cannot reach its target
    #[error("branch at {from} cannot reach {to}")]
    BranchOutOfRange {
        /// Branch instruction bci
        from: u32,
        /// Target bci
        to: u32,
    },

    /// The opcode does not take the operands of the emitter used
    #[error("{0} cannot be emitted with these operands")]
    WrongOperands(&'static str),

    /// The assembled code was rejected
    #[error(transparent)]
    Code(#[from] VmError),
}

/// Where a label offset is written
#[derive(Debug, Clone, Copy)]
struct Fixup {
    /// Bci the offset is relative to
    base: u32,
    /// Byte position of the operand
    at: usize,
    /// 4-byte operand
    wide: bool,
    label: Label,
}

#[derive(Debug, Clone, Copy)]
struct PendingHandler {
    start: Label,
    end: Label,
    handler: Label,
    catch_type: Option<u16>,
}

/// Bytecode assembler for one method body
#[derive(Debug)]
pub struct CodeBuilder {
    code: Vec<u8>,
    max_locals: u16,
    max_stack: u16,
    next_label: usize,
    bound: FxHashMap<Label, u32>,
    fixups: Vec<Fixup>,
    handlers: Vec<PendingHandler>,
    lines: Vec<LineEntry>,
    error: Option<BuildError>,
}

impl CodeBuilder {
    /// Start a method body with the given frame sizes
    pub fn new(max_locals: u16, max_stack: u16) -> Self {
        Self {
            code: Vec::with_capacity(64),
            max_locals,
            max_stack,
            next_label: 0,
            bound: FxHashMap::default(),
            fixups: Vec::new(),
            handlers: Vec::new(),
            lines: Vec::new(),
            error: None,
        }
    }

    /// Bci of the next instruction
    pub fn position(&self) -> u32 {
        self.code.len() as u32
    }

    fn fail(&mut self, error: BuildError) -> &mut Self {
        self.error.get_or_insert(error);
        self
    }

    fn expect(&mut self, opcode: Opcode, ok: bool) -> bool {
        if !ok {
            self.fail(BuildError::WrongOperands(opcode.name()));
        }
        ok
    }

    // ===== Plain instructions =====

    /// Emit an operand-less instruction
    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        if self.expect(opcode, opcode.fixed_length() == 1 && opcode != Opcode::SlimQuick) {
            self.code.push(opcode.to_u8());
        }
        self
    }

    /// Emit an instruction with one byte operand (`bipush`, `ldc`, `iload`, `newarray`, `ret`, ...)
    pub fn op_u8(&mut self, opcode: Opcode, operand: u8) -> &mut Self {
        if self.expect(opcode, opcode.fixed_length() == 2) {
            self.code.extend_from_slice(&[opcode.to_u8(), operand]);
        }
        self
    }

    /// Emit an instruction with a two-byte operand (`sipush`, `ldc_w`, field, invoke, type ops)
    ///
    /// `invokeinterface` gets its count byte computed by the caller through
    /// [`invokeinterface`](Self::invokeinterface); `invokedynamic` gets its
    /// two zero bytes here.
    pub fn op_u16(&mut self, opcode: Opcode, operand: u16) -> &mut Self {
        let ok = (opcode.fixed_length() == 3
            && !opcode.is_branch()
            && !matches!(opcode, Opcode::Iinc | Opcode::Quick))
            || opcode == Opcode::Invokedynamic;
        if self.expect(opcode, ok) {
            self.code.push(opcode.to_u8());
            self.code.extend_from_slice(&operand.to_be_bytes());
            if opcode == Opcode::Invokedynamic {
                self.code.extend_from_slice(&[0, 0]);
            }
        }
        self
    }

    /// Push an int constant with the shortest encoding
    pub fn int(&mut self, value: i32) -> &mut Self {
        match value {
            -1..=5 => {
                let byte = (Opcode::Iconst0.to_u8() as i32 + value) as u8;
                self.code.push(byte);
                self
            }
            v if i8::try_from(v).is_ok() => self.op_u8(Opcode::Bipush, v as i8 as u8),
            v if i16::try_from(v).is_ok() => self.op_u16(Opcode::Sipush, v as i16 as u16),
            _ => self.fail(BuildError::WrongOperands("int constant needs ldc")),
        }
    }

    /// `invokeinterface` with its argument-slot count byte
    pub fn invokeinterface(&mut self, index: u16, count: u8) -> &mut Self {
        self.code.push(Opcode::Invokeinterface.to_u8());
        self.code.extend_from_slice(&index.to_be_bytes());
        self.code.extend_from_slice(&[count, 0]);
        self
    }

    /// `multianewarray`
    pub fn multianewarray(&mut self, index: u16, dimensions: u8) -> &mut Self {
        self.code.push(Opcode::Multianewarray.to_u8());
        self.code.extend_from_slice(&index.to_be_bytes());
        self.code.push(dimensions);
        self
    }

    /// Local access, choosing `wide` when the index does not fit a byte
    pub fn local(&mut self, opcode: Opcode, index: u16) -> &mut Self {
        if !self.expect(opcode, opcode.is_widenable() && opcode != Opcode::Iinc) {
            return self;
        }
        match u8::try_from(index) {
            Ok(byte) => self.op_u8(opcode, byte),
            Err(_) => {
                self.code.extend_from_slice(&[Opcode::Wide.to_u8(), opcode.to_u8()]);
                self.code.extend_from_slice(&index.to_be_bytes());
                self
            }
        }
    }

    /// `iinc`, choosing `wide` when needed
    pub fn iinc(&mut self, index: u16, delta: i16) -> &mut Self {
        match (u8::try_from(index), i8::try_from(delta)) {
            (Ok(index), Ok(delta)) => {
                self.code
                    .extend_from_slice(&[Opcode::Iinc.to_u8(), index, delta as u8]);
            }
            _ => {
                self.code.extend_from_slice(&[Opcode::Wide.to_u8(), Opcode::Iinc.to_u8()]);
                self.code.extend_from_slice(&index.to_be_bytes());
                self.code.extend_from_slice(&delta.to_be_bytes());
            }
        }
        self
    }

    /// Append raw bytes
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.code.extend_from_slice(bytes);
        self
    }

    // ===== Labels and control flow =====

    /// Create an unbound label
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Bind `label` to the current position
    pub fn bind(&mut self, label: Label) -> &mut Self {
        let position = self.position();
        if self.bound.insert(label, position).is_some() {
            return self.fail(BuildError::LabelRebound(label.0));
        }
        self
    }

    /// Emit a branch to `label` (`goto_w` and `jsr_w` take 4-byte offsets)
    pub fn branch(&mut self, opcode: Opcode, label: Label) -> &mut Self {
        if !self.expect(opcode, opcode.is_branch()) {
            return self;
        }
        let base = self.position();
        let wide = matches!(opcode, Opcode::GotoW | Opcode::JsrW);
        self.code.push(opcode.to_u8());
        self.fixups.push(Fixup {
            base,
            at: self.code.len(),
            wide,
            label,
        });
        let width = if wide { 4 } else { 2 };
        self.code.extend(std::iter::repeat(0).take(width));
        self
    }

    fn pad_switch(&mut self, opcode: Opcode) -> u32 {
        let base = self.position();
        self.code.push(opcode.to_u8());
        let start = switch_operands_start(base as usize);
        self.code.resize(start, 0);
        base
    }

    fn offset_slot(&mut self, base: u32, label: Label) {
        self.fixups.push(Fixup {
            base,
            at: self.code.len(),
            wide: true,
            label,
        });
        self.code.extend_from_slice(&[0; 4]);
    }

    /// `tableswitch` over `low .. low + targets.len()`
    pub fn tableswitch(&mut self, low: i32, default: Label, targets: &[Label]) -> &mut Self {
        let Some(high) = i32::try_from(targets.len())
            .ok()
            .filter(|&n| n > 0)
            .and_then(|n| low.checked_add(n - 1))
        else {
            return self.fail(BuildError::WrongOperands("tableswitch"));
        };
        let base = self.pad_switch(Opcode::Tableswitch);
        self.offset_slot(base, default);
        self.code.extend_from_slice(&low.to_be_bytes());
        self.code.extend_from_slice(&high.to_be_bytes());
        for &target in targets {
            self.offset_slot(base, target);
        }
        self
    }

    /// `lookupswitch`; pairs are sorted by key
    pub fn lookupswitch(&mut self, default: Label, pairs: &[(i32, Label)]) -> &mut Self {
        let mut pairs = pairs.to_vec();
        pairs.sort_by_key(|&(key, _)| key);
        let base = self.pad_switch(Opcode::Lookupswitch);
        self.offset_slot(base, default);
        self.code
            .extend_from_slice(&(pairs.len() as i32).to_be_bytes());
        for (key, target) in pairs {
            self.code.extend_from_slice(&key.to_be_bytes());
            self.offset_slot(base, target);
        }
        self
    }

    // ===== Tables =====

    /// Cover `[start, end)` with a handler; `catch_type` `None` catches everything
    pub fn handler(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<u16>) -> &mut Self {
        self.handlers.push(PendingHandler {
            start,
            end,
            handler,
            catch_type,
        });
        self
    }

    /// Start a source line at the current position
    pub fn line(&mut self, line: u32) -> &mut Self {
        let start_bci = self.position();
        self.lines.push(LineEntry { start_bci, line });
        self
    }

    // ===== Finish =====

    fn resolve(&self, label: Label) -> Result<u32, BuildError> {
        self.bound
            .get(&label)
            .copied()
            .ok_or(BuildError::UnboundLabel(label.0))
    }

    /// Patch labels and return the raw code with its tables
    pub fn assemble(mut self) -> Result<(Vec<u8>, Vec<HandlerEntry>, Vec<LineEntry>), BuildError> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        for fixup in &self.fixups {
            let target = self.resolve(fixup.label)?;
            let offset = i64::from(target) - i64::from(fixup.base);
            if fixup.wide {
                self.code[fixup.at..fixup.at + 4].copy_from_slice(&(offset as i32).to_be_bytes());
            } else {
                let offset = i16::try_from(offset).map_err(|_| BuildError::BranchOutOfRange {
                    from: fixup.base,
                    to: target,
                })?;
                self.code[fixup.at..fixup.at + 2].copy_from_slice(&offset.to_be_bytes());
            }
        }
        let handlers = self
            .handlers
            .iter()
            .map(|h| {
                Ok(HandlerEntry {
                    start_bci: self.resolve(h.start)?,
                    end_bci: self.resolve(h.end)?,
                    handler_bci: self.resolve(h.handler)?,
                    catch_type: h.catch_type,
                })
            })
            .collect::<Result<Vec<_>, BuildError>>()?;
        Ok((self.code, handlers, self.lines))
    }

    /// Assemble into a method version using `resolver` for its constant pool
    pub fn finish(self, resolver: Arc<dyn Resolver>) -> Result<MethodCode, BuildError> {
        let (max_locals, max_stack) = (self.max_locals, self.max_stack);
        let (code, handlers, lines) = self.assemble()?;
        Ok(MethodCode::new(&code, max_locals, max_stack, handlers, lines, resolver)?)
    }
}
