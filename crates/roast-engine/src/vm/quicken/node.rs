//! Specialized operation nodes
//!
//! Each node is the pre-resolved form of one quickened site. `execute` works
//! on the live frame at `top` and returns the operand-stack delta.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::bytecode::Opcode;
use crate::vm::class::{ClassId, ClassInfo, FieldInfo, Kind, MethodInfo};
use crate::vm::frame::Frame;
use crate::vm::interpreter::Interpreter;
use crate::vm::method::MethodCode;
use crate::vm::runtime::ThrowableKind;
use crate::vm::value::{ObjRef, Value};
use crate::vm::{VmError, VmResult};

/// Where a node is executing
pub(crate) struct Site<'s> {
    /// Method being interpreted
    pub method: &'s Arc<MethodInfo>,
    /// Its code version
    pub code: &'s MethodCode,
    /// Bytecode index of the site
    pub bci: u32,
    /// Arena slot of the node; `None` for a transient (unpublished) node
    pub slot: Option<usize>,
}

/// Pre-resolved operation
#[derive(Debug)]
pub enum QuickNode {
    /// `getfield`, `putfield`, `getstatic`, `putstatic`
    FieldAccess(FieldAccessNode),
    /// The invoke family
    Invoke(InvokeNode),
    /// Array element loads and stores
    ArrayAccess(ArrayAccessNode),
    /// `checkcast`
    CheckCast(TypeCheckNode),
    /// `instanceof`
    InstanceOf(TypeCheckNode),
    /// Allocation: `new`, `anewarray`, `multianewarray`
    Misc(MiscNode),
}

impl QuickNode {
    /// Run the node, returning the operand-stack delta
    pub(crate) fn execute(
        &self,
        interp: &mut Interpreter<'_>,
        site: &Site<'_>,
        frame: &mut Frame,
        top: usize,
    ) -> VmResult<isize> {
        match self {
            QuickNode::FieldAccess(node) => node.execute(interp, site, frame, top),
            QuickNode::Invoke(node) => node.execute(interp, site, frame, top),
            QuickNode::ArrayAccess(node) => node.execute(interp, frame, top),
            QuickNode::CheckCast(node) => node.check_cast(interp, frame, top),
            QuickNode::InstanceOf(node) => node.instance_of(interp, frame, top),
            QuickNode::Misc(node) => node.execute(interp, frame, top),
        }
    }
}

fn non_null(interp: &Interpreter<'_>, obj: Option<ObjRef>, what: &str) -> VmResult<ObjRef> {
    obj.ok_or_else(|| interp.raise(ThrowableKind::NullPointer, what))
}

// ============================================================================
// Field access
// ============================================================================

/// Resolved field access
#[derive(Debug)]
pub struct FieldAccessNode {
    /// Original opcode
    pub opcode: Opcode,
    /// Resolved field
    pub field: Arc<FieldInfo>,
}

impl FieldAccessNode {
    fn execute(
        &self,
        interp: &mut Interpreter<'_>,
        site: &Site<'_>,
        frame: &mut Frame,
        top: usize,
    ) -> VmResult<isize> {
        let rt = interp.runtime();
        let hooks = interp.instrumentation();
        let field = &*self.field;
        let slots = field.kind.slots();

        match self.opcode {
            Opcode::Getstatic => {
                if let Some(hooks) = hooks {
                    hooks.field_access(site.method, site.bci, field, None);
                }
                let value = rt.get_static(field)?;
                frame.put_value(top, value)?;
                Ok(slots as isize)
            }
            Opcode::Putstatic => {
                let at = Frame::below(top, slots)?;
                let value = frame.get(at)?;
                if let Some(hooks) = hooks {
                    hooks.field_modify(site.method, site.bci, field, None, value);
                }
                rt.put_static(field, value)?;
                Ok(-(slots as isize))
            }
            Opcode::Getfield => {
                let at = Frame::below(top, 1)?;
                let obj = non_null(interp, frame.get_object(at)?, &format!("reading field {}", field))?;
                if let Some(hooks) = hooks {
                    hooks.field_access(site.method, site.bci, field, Some(obj));
                }
                let value = rt.get_field(obj, field)?;
                frame.put_value(at, value)?;
                Ok(slots as isize - 1)
            }
            Opcode::Putfield => {
                let value_at = Frame::below(top, slots)?;
                let obj_at = Frame::below(value_at, 1)?;
                let value = frame.get(value_at)?;
                let obj = non_null(interp, frame.get_object(obj_at)?, &format!("writing field {}", field))?;
                if let Some(hooks) = hooks {
                    hooks.field_modify(site.method, site.bci, field, Some(obj), value);
                }
                rt.put_field(obj, field, value)?;
                Ok(-(slots as isize + 1))
            }
            other => Err(VmError::Malformed(format!(
                "field node for {}",
                other.name()
            ))),
        }
    }
}

// ============================================================================
// Invocation
// ============================================================================

/// How an invoke site finds its target
#[derive(Debug)]
pub enum Dispatch {
    /// Statically bound target (static, special, private/final, call sites)
    Direct(Arc<MethodInfo>),
    /// Speculative single receiver class
    Monomorphic {
        /// Receiver class seen at link time
        class: ClassId,
        /// Target selected for that class
        target: Arc<MethodInfo>,
    },
    /// Full virtual/interface selection on every call
    Virtual,
}

/// Resolved invoke
#[derive(Debug)]
pub struct InvokeNode {
    /// Original opcode
    pub opcode: Opcode,
    /// Symbolically resolved method (argument shape and return kind)
    pub resolved: Arc<MethodInfo>,
    /// Target selection
    pub dispatch: Dispatch,
}

impl InvokeNode {
    fn execute(
        &self,
        interp: &mut Interpreter<'_>,
        site: &Site<'_>,
        frame: &mut Frame,
        top: usize,
    ) -> VmResult<isize> {
        let rt = interp.runtime();
        let param_slots = self.resolved.param_slots();
        let base = Frame::below(top, param_slots)?;
        let args = frame.slice(base, param_slots)?.to_vec();

        let target = match &self.dispatch {
            Dispatch::Direct(target) => {
                if !target.is_static() {
                    self.receiver(interp, &args)?;
                }
                target.clone()
            }
            Dispatch::Monomorphic { class, target } => {
                let receiver = self.receiver(interp, &args)?;
                let receiver_class = rt.class_of(receiver);
                if receiver_class.id == *class {
                    target.clone()
                } else {
                    self.generify(site);
                    rt.select_method(&receiver_class, &self.resolved)
                        .map_err(|e| interp.link_error(e))?
                }
            }
            Dispatch::Virtual => {
                let receiver = self.receiver(interp, &args)?;
                let receiver_class = rt.class_of(receiver);
                rt.select_method(&receiver_class, &self.resolved)
                    .map_err(|e| interp.link_error(e))?
            }
        };
        if target.is_abstract() {
            return Err(interp.raise(ThrowableKind::AbstractMethod, &target.to_string()));
        }

        let result = interp.invoke(&target, &args)?;
        let return_slots = target.return_kind.slots();
        if return_slots > 0 {
            frame.put_value(base, result)?;
        }
        Ok(return_slots as isize - param_slots as isize)
    }

    fn receiver(&self, interp: &Interpreter<'_>, args: &[Value]) -> VmResult<ObjRef> {
        match args.first().and_then(|v| v.as_object()) {
            Some(Some(obj)) => Ok(obj),
            Some(None) => Err(interp.raise(
                ThrowableKind::NullPointer,
                &format!("invoking {} on null", self.resolved),
            )),
            None => Err(VmError::Malformed(format!(
                "no receiver for {}",
                self.resolved
            ))),
        }
    }

    /// Replace a missed monomorphic cache with full dispatch
    fn generify(&self, site: &Site<'_>) {
        let Some(slot) = site.slot else {
            return;
        };
        let table = site.code.quick_table();
        let _guard = site.code.section().lock();
        if let Some(current) = table.get(slot) {
            if let QuickNode::Invoke(InvokeNode {
                dispatch: Dispatch::Virtual,
                ..
            }) = &*current
            {
                return;
            }
        }
        table.replace(
            slot,
            Arc::new(QuickNode::Invoke(InvokeNode {
                opcode: self.opcode,
                resolved: self.resolved.clone(),
                dispatch: Dispatch::Virtual,
            })),
        );
        tracing::debug!(
            target: "roast::quicken",
            bci = site.bci,
            method = %self.resolved,
            "inline cache miss, site generified"
        );
    }
}

// ============================================================================
// Array access
// ============================================================================

const NO_CLASS_PAIR: u64 = u64::MAX;

/// Array element load or store
#[derive(Debug)]
pub struct ArrayAccessNode {
    /// Original opcode
    pub opcode: Opcode,
    /// `(component class, value class)` of the last `aastore` that passed
    last_store: AtomicU64,
}

impl ArrayAccessNode {
    /// Create a node for an array opcode
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            last_store: AtomicU64::new(NO_CLASS_PAIR),
        }
    }

    fn element_kind(&self) -> Kind {
        match self.opcode {
            Opcode::Iaload | Opcode::Iastore => Kind::Int,
            Opcode::Laload | Opcode::Lastore => Kind::Long,
            Opcode::Faload | Opcode::Fastore => Kind::Float,
            Opcode::Daload | Opcode::Dastore => Kind::Double,
            Opcode::Baload | Opcode::Bastore => Kind::Byte,
            Opcode::Caload | Opcode::Castore => Kind::Char,
            Opcode::Saload | Opcode::Sastore => Kind::Short,
            _ => Kind::Object,
        }
    }

    fn checked_index(
        interp: &Interpreter<'_>,
        array: ObjRef,
        index: i32,
    ) -> VmResult<()> {
        let length = interp.runtime().array_length(array)?;
        if index < 0 || index >= length {
            return Err(interp.raise(
                ThrowableKind::ArrayIndexOutOfBounds,
                &format!("Index {} out of bounds for length {}", index, length),
            ));
        }
        Ok(())
    }

    fn execute(&self, interp: &mut Interpreter<'_>, frame: &mut Frame, top: usize) -> VmResult<isize> {
        let kind = self.element_kind();
        let effect = self.opcode.stack_effect().unwrap_or(0) as isize;
        let rt = interp.runtime();

        if self.opcode.is_array_load() {
            let index = frame.get_int(Frame::below(top, 1)?)?;
            let array_at = Frame::below(top, 2)?;
            let array = non_null(interp, frame.get_object(array_at)?, "loading from null array")?;
            Self::checked_index(interp, array, index)?;
            let value = match rt.array_load(array, index)? {
                Value::Int(v) => Value::Int(kind.narrow(v)),
                other => other,
            };
            frame.put_value(array_at, value)?;
            return Ok(effect);
        }

        let value_at = Frame::below(top, kind.slots())?;
        let index_at = Frame::below(value_at, 1)?;
        let array_at = Frame::below(index_at, 1)?;
        let value = match frame.get(value_at)? {
            Value::Int(v) => Value::Int(kind.narrow(v)),
            other => other,
        };
        let index = frame.get_int(index_at)?;
        let array = non_null(interp, frame.get_object(array_at)?, "storing into null array")?;
        Self::checked_index(interp, array, index)?;
        if let Value::Ref(element) = value {
            self.check_store(interp, array, element)?;
        }
        rt.array_store(array, index, value)?;
        Ok(effect)
    }

    /// `aastore` type check with a single-entry cache
    fn check_store(&self, interp: &Interpreter<'_>, array: ObjRef, element: ObjRef) -> VmResult<()> {
        let rt = interp.runtime();
        let Some(component) = rt.array_component(array) else {
            return Ok(());
        };
        let element_class = rt.class_of(element);
        let key = (u64::from(component.id.0) << 32) | u64::from(element_class.id.0);
        if key != NO_CLASS_PAIR && self.last_store.load(Ordering::Relaxed) == key {
            return Ok(());
        }
        if !rt.is_assignable(&element_class, &component) {
            return Err(interp.raise(
                ThrowableKind::ArrayStore,
                &format!("{} stored into {}[]", element_class, component),
            ));
        }
        self.last_store.store(key, Ordering::Relaxed);
        Ok(())
    }
}

// ============================================================================
// Type checks
// ============================================================================

/// `checkcast` / `instanceof` against a resolved class
#[derive(Debug)]
pub struct TypeCheckNode {
    /// Resolved target type
    pub class: Arc<ClassInfo>,
    /// `class id + 1` of the last object class that passed, 0 when empty
    last_passed: AtomicU64,
}

impl TypeCheckNode {
    /// Create a node checking against `class`
    pub fn new(class: Arc<ClassInfo>) -> Self {
        Self {
            class,
            last_passed: AtomicU64::new(0),
        }
    }

    fn passes(&self, interp: &Interpreter<'_>, object_class: &ClassInfo) -> bool {
        let key = u64::from(object_class.id.0) + 1;
        if self.last_passed.load(Ordering::Relaxed) == key {
            return true;
        }
        if interp.runtime().is_assignable(object_class, &self.class) {
            self.last_passed.store(key, Ordering::Relaxed);
            return true;
        }
        false
    }

    fn check_cast(&self, interp: &mut Interpreter<'_>, frame: &mut Frame, top: usize) -> VmResult<isize> {
        let Some(obj) = frame.get_object(Frame::below(top, 1)?)? else {
            return Ok(0);
        };
        let object_class = interp.runtime().class_of(obj);
        if !self.passes(interp, &object_class) {
            return Err(interp.raise(
                ThrowableKind::ClassCast,
                &format!("class {} cannot be cast to class {}", object_class, self.class),
            ));
        }
        Ok(0)
    }

    fn instance_of(&self, interp: &mut Interpreter<'_>, frame: &mut Frame, top: usize) -> VmResult<isize> {
        let at = Frame::below(top, 1)?;
        let result = match frame.get_object(at)? {
            None => false,
            Some(obj) => {
                let object_class = interp.runtime().class_of(obj);
                self.passes(interp, &object_class)
            }
        };
        frame.put_int(at, i32::from(result))?;
        Ok(0)
    }
}

// ============================================================================
// Allocation
// ============================================================================

/// Allocation nodes
#[derive(Debug)]
pub enum MiscNode {
    /// `new`
    New(Arc<ClassInfo>),
    /// `anewarray` with its component class
    ANewArray(Arc<ClassInfo>),
    /// `multianewarray` with the array class and dimension count
    MultiANewArray {
        /// Array class
        class: Arc<ClassInfo>,
        /// Dimensions popped from the stack
        dimensions: u8,
    },
}

impl MiscNode {
    fn execute(&self, interp: &mut Interpreter<'_>, frame: &mut Frame, top: usize) -> VmResult<isize> {
        let rt = interp.runtime();
        match self {
            MiscNode::New(class) => {
                let obj = rt.new_instance(class)?;
                frame.put_object(top, Some(obj))?;
                Ok(1)
            }
            MiscNode::ANewArray(component) => {
                let at = Frame::below(top, 1)?;
                let length = frame.get_int(at)?;
                if length < 0 {
                    return Err(interp.raise(ThrowableKind::NegativeArraySize, &length.to_string()));
                }
                let array = rt.new_array(Kind::Object, Some(component), length)?;
                frame.put_object(at, Some(array))?;
                Ok(0)
            }
            MiscNode::MultiANewArray { class, dimensions } => {
                let count = *dimensions as usize;
                let base = Frame::below(top, count)?;
                let mut lengths = Vec::with_capacity(count);
                for i in 0..count {
                    let length = frame.get_int(base + i)?;
                    if length < 0 {
                        return Err(interp.raise(ThrowableKind::NegativeArraySize, &length.to_string()));
                    }
                    lengths.push(length);
                }
                let array = rt.new_multi_array(class, &lengths)?;
                frame.put_object(base, Some(array))?;
                Ok(1 - count as isize)
            }
        }
    }
}
