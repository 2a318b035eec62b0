//! Activation frame
//!
//! One frame per interpreted activation, exclusively owned by it.
//!
//! # Memory Layout
//!
//! ```text
//! slot 0                      BCI header
//! slot 1 .. 1+max_locals      locals      (value index 0 .. max_locals)
//! slot 1+max_locals .. end    operand stack (value index max_locals ..)
//! ```
//!
//! Callers address slots by *value index* (the header is excluded). The
//! dispatch loop keeps `top` as a value index one past the last stack slot, so
//! `top == max_locals + stack depth`. Slots at or above `top` are undefined.
//! Longs and doubles keep their value in the lower slot of a pair and
//! `Value::Top` in the upper slot.

use crate::vm::value::{ObjRef, Value};
use crate::vm::{VmError, VmResult};

/// Slot holding the current bytecode index
const BCI_SLOT: usize = 0;

/// First slot of the value area
const VALUES_START: usize = 1;

/// Activation frame: BCI header, locals and operand stack in one slice
#[derive(Debug, Clone)]
pub struct Frame {
    /// `1 + max_locals + max_stack` slots
    slots: Box<[Value]>,
    /// Number of local variable slots
    max_locals: usize,
}

impl Frame {
    /// Allocate a frame with every slot undefined and BCI 0
    pub fn new(max_locals: usize, max_stack: usize) -> Self {
        let mut slots = vec![Value::Top; VALUES_START + max_locals + max_stack].into_boxed_slice();
        slots[BCI_SLOT] = Value::Int(0);
        Self { slots, max_locals }
    }

    /// Number of local variable slots
    #[inline]
    pub fn max_locals(&self) -> usize {
        self.max_locals
    }

    /// Value index of the first operand-stack slot (`top` of an empty stack)
    #[inline]
    pub fn stack_base(&self) -> usize {
        self.max_locals
    }

    /// Number of value slots (locals plus operand stack)
    #[inline]
    pub fn value_slots(&self) -> usize {
        self.slots.len() - VALUES_START
    }

    /// Current bytecode index stored in the header
    #[inline]
    pub fn bci(&self) -> u32 {
        match self.slots[BCI_SLOT] {
            Value::Int(bci) => bci as u32,
            _ => 0,
        }
    }

    /// Record the current bytecode index
    #[inline]
    pub fn set_bci(&mut self, bci: u32) {
        self.slots[BCI_SLOT] = Value::Int(bci as i32);
    }

    #[inline]
    fn slot(&self, index: usize) -> VmResult<usize> {
        let slot = VALUES_START + index;
        if slot < self.slots.len() {
            Ok(slot)
        } else {
            Err(VmError::Malformed(format!(
                "Frame slot {} out of bounds (slots={})",
                index,
                self.value_slots()
            )))
        }
    }

    /// Read a raw slot
    #[inline]
    pub fn get(&self, index: usize) -> VmResult<Value> {
        Ok(self.slots[self.slot(index)?])
    }

    /// Write a raw slot
    #[inline]
    pub fn set(&mut self, index: usize, value: Value) -> VmResult<()> {
        let slot = self.slot(index)?;
        self.slots[slot] = value;
        Ok(())
    }

    /// Copy slot `from` into slot `to`
    #[inline]
    pub fn copy(&mut self, from: usize, to: usize) -> VmResult<()> {
        let value = self.get(from)?;
        self.set(to, value)
    }

    /// Mark slots `[from, to)` undefined
    pub fn clear(&mut self, from: usize, to: usize) -> VmResult<()> {
        if from >= to {
            return Ok(());
        }
        self.slot(to - 1)?;
        for slot in &mut self.slots[VALUES_START + from..VALUES_START + to] {
            *slot = Value::Top;
        }
        Ok(())
    }

    /// Borrow `count` consecutive slots starting at `start`
    pub fn slice(&self, start: usize, count: usize) -> VmResult<&[Value]> {
        let begin = VALUES_START + start;
        let end = begin + count;
        if end > self.slots.len() {
            return Err(VmError::Malformed(format!(
                "Frame slice [{}, {}) out of bounds (slots={})",
                start,
                start + count,
                self.value_slots()
            )));
        }
        Ok(&self.slots[begin..end])
    }

    /// Copy `args` into the first local slots
    pub fn load_arguments(&mut self, args: &[Value]) -> VmResult<()> {
        if args.len() > self.max_locals {
            return Err(VmError::Malformed(format!(
                "{} argument slots exceed max_locals {}",
                args.len(),
                self.max_locals
            )));
        }
        self.slots[VALUES_START..VALUES_START + args.len()].copy_from_slice(args);
        Ok(())
    }

    fn mismatch(&self, index: usize, expected: &str) -> VmError {
        let found = self.get(index).map(Value::type_name).unwrap_or("nothing");
        VmError::Malformed(format!(
            "Slot {} holds {}, expected {}",
            index, found, expected
        ))
    }

    // ===== Typed accessors =====

    /// Read an int slot
    #[inline]
    pub fn get_int(&self, index: usize) -> VmResult<i32> {
        match self.get(index)? {
            Value::Int(v) => Ok(v),
            _ => Err(self.mismatch(index, "int")),
        }
    }

    /// Write an int slot
    #[inline]
    pub fn put_int(&mut self, index: usize, v: i32) -> VmResult<()> {
        self.set(index, Value::Int(v))
    }

    /// Read a long from the lower slot of a pair
    #[inline]
    pub fn get_long(&self, index: usize) -> VmResult<i64> {
        match self.get(index)? {
            Value::Long(v) => Ok(v),
            _ => Err(self.mismatch(index, "long")),
        }
    }

    /// Write a long into slots `index` and `index + 1`
    #[inline]
    pub fn put_long(&mut self, index: usize, v: i64) -> VmResult<()> {
        self.set(index + 1, Value::Top)?;
        self.set(index, Value::Long(v))
    }

    /// Read a float slot
    #[inline]
    pub fn get_float(&self, index: usize) -> VmResult<f32> {
        match self.get(index)? {
            Value::Float(v) => Ok(v),
            _ => Err(self.mismatch(index, "float")),
        }
    }

    /// Write a float slot
    #[inline]
    pub fn put_float(&mut self, index: usize, v: f32) -> VmResult<()> {
        self.set(index, Value::Float(v))
    }

    /// Read a double from the lower slot of a pair
    #[inline]
    pub fn get_double(&self, index: usize) -> VmResult<f64> {
        match self.get(index)? {
            Value::Double(v) => Ok(v),
            _ => Err(self.mismatch(index, "double")),
        }
    }

    /// Write a double into slots `index` and `index + 1`
    #[inline]
    pub fn put_double(&mut self, index: usize, v: f64) -> VmResult<()> {
        self.set(index + 1, Value::Top)?;
        self.set(index, Value::Double(v))
    }

    /// Read a reference slot (`None` is null)
    #[inline]
    pub fn get_object(&self, index: usize) -> VmResult<Option<ObjRef>> {
        match self.get(index)? {
            Value::Ref(r) => Ok(Some(r)),
            Value::Null => Ok(None),
            _ => Err(self.mismatch(index, "reference")),
        }
    }

    /// Write a reference slot
    #[inline]
    pub fn put_object(&mut self, index: usize, obj: Option<ObjRef>) -> VmResult<()> {
        self.set(index, Value::object(obj))
    }

    /// Read a `jsr` return address
    #[inline]
    pub fn get_return_address(&self, index: usize) -> VmResult<u32> {
        match self.get(index)? {
            Value::ReturnAddress(bci) => Ok(bci),
            _ => Err(self.mismatch(index, "returnAddress")),
        }
    }

    /// Write a `jsr` return address
    #[inline]
    pub fn put_return_address(&mut self, index: usize, bci: u32) -> VmResult<()> {
        self.set(index, Value::ReturnAddress(bci))
    }

    /// Write a value of any kind, filling the upper slot for two-slot kinds
    pub fn put_value(&mut self, index: usize, value: Value) -> VmResult<()> {
        match value {
            Value::Long(_) | Value::Double(_) => {
                self.set(index + 1, Value::Top)?;
                self.set(index, value)
            }
            _ => self.set(index, value),
        }
    }

    // ===== Stack shuffles =====
    //
    // Each takes `top` (one past the last stack slot) and copies raw slots, so
    // they work unchanged for one- and two-slot values.

    /// Value index `n` slots below `top`
    #[inline]
    pub(crate) fn below(top: usize, n: usize) -> VmResult<usize> {
        top.checked_sub(n)
            .ok_or_else(|| VmError::Malformed(format!("Operand stack underflow at top={}", top)))
    }

    /// `dup`: `v1 -> v1 v1`
    pub fn dup1(&mut self, top: usize) -> VmResult<()> {
        self.copy(Self::below(top, 1)?, top)
    }

    /// `dup_x1`: `v2 v1 -> v1 v2 v1`
    pub fn dup_x1(&mut self, top: usize) -> VmResult<()> {
        let base = Self::below(top, 2)?;
        self.copy(top - 1, top)?;
        self.copy(base, top - 1)?;
        self.copy(top, base)
    }

    /// `dup_x2`: `v3 v2 v1 -> v1 v3 v2 v1`
    pub fn dup_x2(&mut self, top: usize) -> VmResult<()> {
        let base = Self::below(top, 3)?;
        self.copy(top - 1, top)?;
        self.copy(top - 2, top - 1)?;
        self.copy(base, top - 2)?;
        self.copy(top, base)
    }

    /// `dup2`: `v2 v1 -> v2 v1 v2 v1`
    pub fn dup2(&mut self, top: usize) -> VmResult<()> {
        let base = Self::below(top, 2)?;
        self.copy(base, top)?;
        self.copy(top - 1, top + 1)
    }

    /// `dup2_x1`: `v3 v2 v1 -> v2 v1 v3 v2 v1`
    pub fn dup2_x1(&mut self, top: usize) -> VmResult<()> {
        let base = Self::below(top, 3)?;
        self.copy(top - 1, top + 1)?;
        self.copy(top - 2, top)?;
        self.copy(base, top - 1)?;
        self.copy(top + 1, top - 2)?;
        self.copy(top, base)
    }

    /// `dup2_x2`: `v4 v3 v2 v1 -> v2 v1 v4 v3 v2 v1`
    pub fn dup2_x2(&mut self, top: usize) -> VmResult<()> {
        let base = Self::below(top, 4)?;
        self.copy(top - 1, top + 1)?;
        self.copy(top - 2, top)?;
        self.copy(top - 3, top - 1)?;
        self.copy(base, top - 2)?;
        self.copy(top + 1, top - 3)?;
        self.copy(top, base)
    }

    /// `swap`: `v2 v1 -> v1 v2`
    pub fn swap(&mut self, top: usize) -> VmResult<()> {
        let lower = Self::below(top, 2)?;
        let upper = self.get(top - 1)?;
        self.copy(lower, top - 1)?;
        self.set(lower, upper)
    }
}
