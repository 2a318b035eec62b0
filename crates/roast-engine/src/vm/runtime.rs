//! Host collaborators
//!
//! The execution core owns dispatch, quickening, OSR hand-off and exception
//! routing. Everything else is provided by the embedding runtime:
//! - [`Resolver`]: constant-pool resolution for one method version
//! - [`Runtime`]: heap, type checks, method selection, monitors, natives
//! - [`Instrumentation`]: optional observation hooks

use std::sync::Arc;

use crate::bytecode::Opcode;
use crate::vm::class::{ClassInfo, FieldInfo, Kind, MethodInfo};
use crate::vm::frame::Frame;
use crate::vm::value::{ObjRef, Value};
use crate::vm::VmResult;

// ============================================================================
// Errors and exception kinds
// ============================================================================

/// Resolution or linking failure
///
/// Always surfaced to guest code as a linkage error; never cached, so the
/// failing site re-resolves on its next execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// Referenced class could not be loaded
    #[error("class not found: {0}")]
    ClassNotFound(String),

    /// Field lookup failed
    #[error("no such field: {0}")]
    NoSuchField(String),

    /// Method lookup failed
    #[error("no such method: {0}")]
    NoSuchMethod(String),

    /// Resolved entity has the wrong shape for the instruction
    #[error("incompatible class change: {0}")]
    IncompatibleClassChange(String),

    /// Access check failed
    #[error("illegal access: {0}")]
    IllegalAccess(String),

    /// Virtual selection ended on an abstract method
    #[error("abstract method: {0}")]
    AbstractMethod(String),

    /// Method descriptor could not be parsed
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Constant-pool index out of range or of the wrong tag
    #[error("invalid constant pool index {0}")]
    InvalidIndex(u16),

    /// Bootstrap method failed to produce a call site
    #[error("bootstrap method error: {0}")]
    Bootstrap(String),
}

impl LinkError {
    /// Guest throwable raised for this error
    pub fn throwable_kind(&self) -> ThrowableKind {
        match self {
            LinkError::ClassNotFound(_) => ThrowableKind::NoClassDefFound,
            LinkError::NoSuchField(_) => ThrowableKind::NoSuchField,
            LinkError::NoSuchMethod(_) => ThrowableKind::NoSuchMethod,
            LinkError::IncompatibleClassChange(_) => ThrowableKind::IncompatibleClassChange,
            LinkError::IllegalAccess(_) => ThrowableKind::IllegalAccess,
            LinkError::AbstractMethod(_) => ThrowableKind::AbstractMethod,
            LinkError::InvalidDescriptor(_) | LinkError::InvalidIndex(_) => {
                ThrowableKind::ClassFormat
            }
            LinkError::Bootstrap(_) => ThrowableKind::BootstrapMethod,
        }
    }
}

/// Guest exception classes the core raises on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThrowableKind {
    /// `java/lang/NullPointerException`
    NullPointer,
    /// `java/lang/ArithmeticException`
    Arithmetic,
    /// `java/lang/ArrayIndexOutOfBoundsException`
    ArrayIndexOutOfBounds,
    /// `java/lang/ArrayStoreException`
    ArrayStore,
    /// `java/lang/NegativeArraySizeException`
    NegativeArraySize,
    /// `java/lang/ClassCastException`
    ClassCast,
    /// `java/lang/IllegalMonitorStateException`
    IllegalMonitorState,
    /// `java/lang/IncompatibleClassChangeError`
    IncompatibleClassChange,
    /// `java/lang/NoSuchFieldError`
    NoSuchField,
    /// `java/lang/NoSuchMethodError`
    NoSuchMethod,
    /// `java/lang/AbstractMethodError`
    AbstractMethod,
    /// `java/lang/IllegalAccessError`
    IllegalAccess,
    /// `java/lang/NoClassDefFoundError`
    NoClassDefFound,
    /// `java/lang/ClassFormatError`
    ClassFormat,
    /// `java/lang/BootstrapMethodError`
    BootstrapMethod,
}

impl ThrowableKind {
    /// Internal class name of the throwable
    pub fn class_name(self) -> &'static str {
        match self {
            ThrowableKind::NullPointer => "java/lang/NullPointerException",
            ThrowableKind::Arithmetic => "java/lang/ArithmeticException",
            ThrowableKind::ArrayIndexOutOfBounds => "java/lang/ArrayIndexOutOfBoundsException",
            ThrowableKind::ArrayStore => "java/lang/ArrayStoreException",
            ThrowableKind::NegativeArraySize => "java/lang/NegativeArraySizeException",
            ThrowableKind::ClassCast => "java/lang/ClassCastException",
            ThrowableKind::IllegalMonitorState => "java/lang/IllegalMonitorStateException",
            ThrowableKind::IncompatibleClassChange => "java/lang/IncompatibleClassChangeError",
            ThrowableKind::NoSuchField => "java/lang/NoSuchFieldError",
            ThrowableKind::NoSuchMethod => "java/lang/NoSuchMethodError",
            ThrowableKind::AbstractMethod => "java/lang/AbstractMethodError",
            ThrowableKind::IllegalAccess => "java/lang/IllegalAccessError",
            ThrowableKind::NoClassDefFound => "java/lang/NoClassDefFoundError",
            ThrowableKind::ClassFormat => "java/lang/ClassFormatError",
            ThrowableKind::BootstrapMethod => "java/lang/BootstrapMethodError",
        }
    }

    /// Linkage errors (subclasses of `LinkageError`)
    pub fn is_linkage_error(self) -> bool {
        matches!(
            self,
            ThrowableKind::IncompatibleClassChange
                | ThrowableKind::NoSuchField
                | ThrowableKind::NoSuchMethod
                | ThrowableKind::AbstractMethod
                | ThrowableKind::IllegalAccess
                | ThrowableKind::NoClassDefFound
                | ThrowableKind::ClassFormat
                | ThrowableKind::BootstrapMethod
        )
    }
}

/// Exhausted resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Interpreter call depth exceeded
    StackOverflow,
    /// Allocation failed
    OutOfMemory,
}

impl ResourceKind {
    /// Dense index for per-kind tables
    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            ResourceKind::StackOverflow => 0,
            ResourceKind::OutOfMemory => 1,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::StackOverflow => f.write_str("stack overflow"),
            ResourceKind::OutOfMemory => f.write_str("out of memory"),
        }
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Loadable constant
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    /// `CONSTANT_Integer`
    Int(i32),
    /// `CONSTANT_Float`
    Float(f32),
    /// `CONSTANT_Long`
    Long(i64),
    /// `CONSTANT_Double`
    Double(f64),
    /// String, Class, MethodType, MethodHandle or dynamic constant
    Reference(ObjRef),
}

impl Constant {
    /// Frame value for this constant
    pub fn to_value(self) -> Value {
        match self {
            Constant::Int(v) => Value::Int(v),
            Constant::Float(v) => Value::Float(v),
            Constant::Long(v) => Value::Long(v),
            Constant::Double(v) => Value::Double(v),
            Constant::Reference(r) => Value::Ref(r),
        }
    }

    /// Whether the constant takes two slots (`ldc2_w`)
    pub fn is_wide(self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// Constant-pool resolution for one method version
///
/// Implementations must be idempotent: the core may resolve the same index
/// several times (failures are never cached, and racing threads may both
/// resolve before one of them publishes).
pub trait Resolver: Send + Sync {
    /// Resolve a class reference (`new`, `anewarray`, `checkcast`, catch types, ...)
    fn resolve_type(&self, index: u16) -> Result<Arc<ClassInfo>, LinkError>;

    /// Resolve a method reference for an invoke opcode
    fn resolve_method(&self, opcode: Opcode, index: u16) -> Result<Arc<MethodInfo>, LinkError>;

    /// Resolve a field reference for a field-access opcode
    fn resolve_field(&self, opcode: Opcode, index: u16) -> Result<Arc<FieldInfo>, LinkError>;

    /// Resolve a loadable constant (`ldc`, `ldc_w`, `ldc2_w`)
    fn resolve_constant(&self, index: u16) -> Result<Constant, LinkError>;

    /// Link an `invokedynamic` call site to its target
    ///
    /// The target is invoked without a receiver, taking the arguments named by
    /// the call site's descriptor.
    fn link_call_site(&self, index: u16, bci: u32) -> Result<Arc<MethodInfo>, LinkError> {
        let _ = bci;
        Err(LinkError::Bootstrap(format!(
            "no bootstrap support for call site #{index}"
        )))
    }
}

// ============================================================================
// Runtime
// ============================================================================

/// Heap, type system and native bridge of the embedding VM
pub trait Runtime: Send + Sync {
    /// Class of a live object
    fn class_of(&self, obj: ObjRef) -> Arc<ClassInfo>;

    /// Subtype check used by `checkcast`, `instanceof`, `aastore` and catch matching
    fn is_assignable(&self, from: &ClassInfo, to: &ClassInfo) -> bool {
        from.is_subclass_of(to)
    }

    /// Virtual/interface selection of `method` for a receiver of class `receiver`
    fn select_method(
        &self,
        receiver: &Arc<ClassInfo>,
        method: &Arc<MethodInfo>,
    ) -> Result<Arc<MethodInfo>, LinkError>;

    /// Find a method by name and descriptor, searching `class` and then its superclasses
    fn lookup_method(
        &self,
        class: &Arc<ClassInfo>,
        name: &str,
        descriptor: &str,
    ) -> Option<Arc<MethodInfo>>;

    /// Allocate an instance (`new`)
    fn new_instance(&self, class: &Arc<ClassInfo>) -> VmResult<ObjRef>;

    /// Allocate a one-dimensional array; `component` is set for reference arrays
    fn new_array(
        &self,
        kind: Kind,
        component: Option<&Arc<ClassInfo>>,
        length: i32,
    ) -> VmResult<ObjRef>;

    /// Allocate a multi-dimensional array of `array_class` (`multianewarray`)
    fn new_multi_array(&self, array_class: &Arc<ClassInfo>, dimensions: &[i32])
        -> VmResult<ObjRef>;

    /// Element count of an array
    fn array_length(&self, array: ObjRef) -> VmResult<i32>;

    /// Read an element; the index is already bounds-checked
    fn array_load(&self, array: ObjRef, index: i32) -> VmResult<Value>;

    /// Write an element; the index is bounds-checked and the store type-checked
    fn array_store(&self, array: ObjRef, index: i32, value: Value) -> VmResult<()>;

    /// Component class of a reference array, `None` for primitive arrays
    fn array_component(&self, array: ObjRef) -> Option<Arc<ClassInfo>>;

    /// Read an instance field
    fn get_field(&self, obj: ObjRef, field: &FieldInfo) -> VmResult<Value>;

    /// Write an instance field
    fn put_field(&self, obj: ObjRef, field: &FieldInfo, value: Value) -> VmResult<()>;

    /// Read a static field (the host runs class initialization if needed)
    fn get_static(&self, field: &FieldInfo) -> VmResult<Value>;

    /// Write a static field
    fn put_static(&self, field: &FieldInfo, value: Value) -> VmResult<()>;

    /// Acquire an object monitor, blocking if another thread owns it
    fn monitor_enter(&self, obj: ObjRef) -> VmResult<()>;

    /// Release one level of an object monitor
    fn monitor_exit(&self, obj: ObjRef) -> VmResult<()>;

    /// Call a native method; `args` include the receiver for instance methods
    fn invoke_native(&self, method: &Arc<MethodInfo>, args: &[Value]) -> VmResult<Value>;

    /// Construct a guest throwable
    fn new_throwable(&self, kind: ThrowableKind, message: &str) -> VmResult<ObjRef>;

    /// Pre-allocated exception thrown for an exhausted resource
    fn preallocated(&self, kind: ResourceKind) -> ObjRef;
}

// ============================================================================
// Instrumentation
// ============================================================================

/// What the dispatch loop should do after an entry or statement hook
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum HookAction {
    /// Keep executing
    #[default]
    Continue,
    /// Return from the activation with this value (`Top` for void)
    EarlyReturn(Value),
    /// Restart the activation from bci 0 with its original arguments
    Reenter,
}

/// Observation hooks; every method has a no-op default
pub trait Instrumentation: Send + Sync {
    /// Activation entry, after arguments are in place
    fn method_entry(&self, method: &MethodInfo, frame: &Frame) -> HookAction {
        let _ = (method, frame);
        HookAction::Continue
    }

    /// First instruction of a line-table statement
    fn statement(&self, method: &MethodInfo, bci: u32, line: u32) -> HookAction {
        let _ = (method, bci, line);
        HookAction::Continue
    }

    /// Field read (`receiver` is `None` for static fields)
    fn field_access(&self, method: &MethodInfo, bci: u32, field: &FieldInfo, receiver: Option<ObjRef>) {
        let _ = (method, bci, field, receiver);
    }

    /// Field write
    fn field_modify(
        &self,
        method: &MethodInfo,
        bci: u32,
        field: &FieldInfo,
        receiver: Option<ObjRef>,
        value: Value,
    ) {
        let _ = (method, bci, field, receiver, value);
    }

    /// Exception observed at `bci`, before handler search
    fn exception_seen(&self, method: &MethodInfo, bci: u32, exception: ObjRef) {
        let _ = (method, bci, exception);
    }

    /// Normal return
    fn method_return(&self, method: &MethodInfo, value: Value) {
        let _ = (method, value);
    }
}
