//! Frame slot values
//!
//! The interpreter works on untyped slots; the bytecode decides how a slot is
//! read. Two-slot kinds (long, double) keep their value in the lower slot of
//! the pair and `Value::Top` in the upper one, so the stack-shuffle opcodes can
//! move slots without knowing what they hold.

use std::fmt;

/// Opaque handle to a heap object owned by the host runtime
///
/// The core never dereferences an `ObjRef`; it only compares handles and hands
/// them back to the [`Runtime`](crate::vm::runtime::Runtime).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(u64);

impl ObjRef {
    /// Wrap a host handle
    #[inline]
    pub const fn new(raw: u64) -> Self {
        ObjRef(raw)
    }

    /// Raw host handle
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjRef({:#x})", self.0)
    }
}

/// A single frame slot
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Value {
    /// Undefined slot: unused stack space, upper half of a long/double, or "no value" (void)
    #[default]
    Top,
    /// 32-bit integer (also boolean, byte, char, short)
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit IEEE float
    Float(f32),
    /// 64-bit IEEE float
    Double(f64),
    /// Null reference
    Null,
    /// Non-null object reference
    Ref(ObjRef),
    /// `jsr` return address
    ReturnAddress(u32),
}

impl Value {
    /// Wrap an optional reference
    #[inline]
    pub fn object(obj: Option<ObjRef>) -> Self {
        match obj {
            Some(r) => Value::Ref(r),
            None => Value::Null,
        }
    }

    /// Integer payload
    #[inline]
    pub fn as_int(self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Long payload
    #[inline]
    pub fn as_long(self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(v),
            _ => None,
        }
    }

    /// Float payload
    #[inline]
    pub fn as_float(self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Double payload
    #[inline]
    pub fn as_double(self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(v),
            _ => None,
        }
    }

    /// Reference payload: `Some(None)` for null, `None` if the slot is not a reference
    #[inline]
    pub fn as_object(self) -> Option<Option<ObjRef>> {
        match self {
            Value::Null => Some(None),
            Value::Ref(r) => Some(Some(r)),
            _ => None,
        }
    }

    /// Check for the null reference
    #[inline]
    pub fn is_null(self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check for the undefined marker
    #[inline]
    pub fn is_top(self) -> bool {
        matches!(self, Value::Top)
    }

    /// Slot-kind name used in diagnostics
    pub fn type_name(self) -> &'static str {
        match self {
            Value::Top => "top",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Null | Value::Ref(_) => "reference",
            Value::ReturnAddress(_) => "returnAddress",
        }
    }

    /// Bitwise identity, treating NaN payloads as equal to themselves
    ///
    /// Used by tests and by result comparison between execution modes.
    pub fn same_as(self, other: Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }
}
