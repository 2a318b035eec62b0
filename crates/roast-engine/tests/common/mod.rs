//! Shared fixtures: an in-memory heap runtime and a table-backed constant pool

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use roast_engine::{
    ClassId, ClassInfo, CodeBuilder, Constant, FieldInfo, Interpreter, Kind, LinkError,
    MethodFlags, MethodInfo, ObjRef, Opcode, Resolver, ResourceKind, Runtime, ThrowableKind,
    Value, VmContext, VmError, VmOptions, VmResult,
};

/// Native method body
pub type NativeFn = Arc<dyn Fn(&[Value]) -> VmResult<Value> + Send + Sync>;

pub enum Object {
    Instance {
        class: Arc<ClassInfo>,
        fields: FxHashMap<u32, Value>,
    },
    Array {
        class: Arc<ClassInfo>,
        component: Option<Arc<ClassInfo>>,
        elements: Vec<Value>,
    },
    Throwable {
        class: Arc<ClassInfo>,
        kind: Option<ThrowableKind>,
        message: String,
    },
}

// ============================================================================
// Heap
// ============================================================================

/// Single-threaded-enough heap: every operation takes a short lock
pub struct Heap {
    classes: RwLock<FxHashMap<String, Arc<ClassInfo>>>,
    kinds: FxHashMap<ThrowableKind, Arc<ClassInfo>>,
    methods: RwLock<FxHashMap<(ClassId, String), Arc<MethodInfo>>>,
    objects: Mutex<Vec<Object>>,
    statics: Mutex<FxHashMap<(ClassId, u32), Value>>,
    monitors: Mutex<FxHashMap<ObjRef, i32>>,
    natives: RwLock<FxHashMap<String, NativeFn>>,
    preallocated: [ObjRef; 2],
    next_class_id: AtomicUsize,
    pub monitor_exits: AtomicUsize,
}

const ALL_KINDS: [ThrowableKind; 15] = [
    ThrowableKind::NullPointer,
    ThrowableKind::Arithmetic,
    ThrowableKind::ArrayIndexOutOfBounds,
    ThrowableKind::ArrayStore,
    ThrowableKind::NegativeArraySize,
    ThrowableKind::ClassCast,
    ThrowableKind::IllegalMonitorState,
    ThrowableKind::IncompatibleClassChange,
    ThrowableKind::NoSuchField,
    ThrowableKind::NoSuchMethod,
    ThrowableKind::AbstractMethod,
    ThrowableKind::IllegalAccess,
    ThrowableKind::NoClassDefFound,
    ThrowableKind::ClassFormat,
    ThrowableKind::BootstrapMethod,
];

impl Heap {
    pub fn new() -> Arc<Self> {
        let mut classes = FxHashMap::default();
        let mut add = |id: u32, name: &str, sup: Option<&Arc<ClassInfo>>| {
            let class = Arc::new(ClassInfo::new(id, name, sup.cloned()));
            classes.insert(name.to_string(), class.clone());
            class
        };
        let object = add(1, "java/lang/Object", None);
        let throwable = add(2, "java/lang/Throwable", Some(&object));
        let exception = add(3, "java/lang/Exception", Some(&throwable));
        let runtime_exception = add(4, "java/lang/RuntimeException", Some(&exception));
        let error = add(5, "java/lang/Error", Some(&throwable));
        let vm_error = add(6, "java/lang/VirtualMachineError", Some(&error));
        let stack_overflow = add(7, "java/lang/StackOverflowError", Some(&vm_error));
        let out_of_memory = add(8, "java/lang/OutOfMemoryError", Some(&vm_error));
        add(9, "[Ljava/lang/Object;", Some(&object));
        let linkage = add(10, "java/lang/LinkageError", Some(&error));
        add(11, "java/lang/String", Some(&object));

        let mut kinds = FxHashMap::default();
        for (i, kind) in ALL_KINDS.into_iter().enumerate() {
            let sup = if kind.is_linkage_error() {
                &linkage
            } else {
                &runtime_exception
            };
            kinds.insert(kind, add(100 + i as u32, kind.class_name(), Some(sup)));
        }

        let mut objects = Vec::new();
        objects.push(Object::Throwable {
            class: stack_overflow,
            kind: None,
            message: String::new(),
        });
        objects.push(Object::Throwable {
            class: out_of_memory,
            kind: None,
            message: String::new(),
        });
        // mirror of the test holder class
        objects.push(Object::Instance {
            class: object.clone(),
            fields: FxHashMap::default(),
        });
        let mut test = ClassInfo::new(20, "Test", Some(object));
        test.mirror = Some(ObjRef::new(3));
        classes.insert("Test".to_string(), Arc::new(test));

        Arc::new(Self {
            classes: RwLock::new(classes),
            kinds,
            methods: RwLock::new(FxHashMap::default()),
            objects: Mutex::new(objects),
            statics: Mutex::new(FxHashMap::default()),
            monitors: Mutex::new(FxHashMap::default()),
            natives: RwLock::new(FxHashMap::default()),
            preallocated: [ObjRef::new(1), ObjRef::new(2)],
            next_class_id: AtomicUsize::new(1000),
            monitor_exits: AtomicUsize::new(0),
        })
    }

    /// Look up a class by internal name
    pub fn class(&self, name: &str) -> Arc<ClassInfo> {
        self.classes
            .read()
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("unknown class {name}"))
    }

    /// Define a class with a fresh id
    pub fn define(&self, name: &str, super_class: &str) -> Arc<ClassInfo> {
        self.define_with(name, super_class, |_| {})
    }

    /// Define a class, adjusting its flags before it is shared
    pub fn define_with(
        &self,
        name: &str,
        super_class: &str,
        adjust: impl FnOnce(&mut ClassInfo),
    ) -> Arc<ClassInfo> {
        let id = self.next_class_id.fetch_add(1, Ordering::Relaxed) as u32;
        let mut class = ClassInfo::new(id, name, Some(self.class(super_class)));
        adjust(&mut class);
        let class = Arc::new(class);
        self.classes.write().insert(name.to_string(), class.clone());
        class
    }

    /// Make `method` visible to virtual selection on its holder
    pub fn declare(&self, method: &Arc<MethodInfo>) {
        let key = (method.holder.id, format!("{}{}", method.name, method.descriptor));
        self.methods.write().insert(key, method.clone());
    }

    /// Register a native body under the method name
    pub fn native(&self, name: &str, body: NativeFn) {
        self.natives.write().insert(name.to_string(), body);
    }

    fn push(&self, object: Object) -> ObjRef {
        let mut objects = self.objects.lock();
        objects.push(object);
        ObjRef::new(objects.len() as u64)
    }

    fn with<T>(&self, obj: ObjRef, f: impl FnOnce(&mut Object) -> T) -> T {
        let mut objects = self.objects.lock();
        let index = (obj.raw() as usize)
            .checked_sub(1)
            .unwrap_or_else(|| panic!("bad handle {obj:?}"));
        f(&mut objects[index])
    }

    /// Allocate a plain instance of `name`
    pub fn instance(&self, name: &str) -> ObjRef {
        let class = self.class(name);
        self.push(Object::Instance {
            class,
            fields: FxHashMap::default(),
        })
    }

    /// Allocate an int array holding `values`
    pub fn int_array(&self, values: &[i32]) -> ObjRef {
        self.push(Object::Array {
            class: self.class("[Ljava/lang/Object;"),
            component: None,
            elements: values.iter().map(|&v| Value::Int(v)).collect(),
        })
    }

    /// Kind of a throwable raised by the core, `None` for other objects
    pub fn throwable_kind(&self, obj: ObjRef) -> Option<ThrowableKind> {
        self.with(obj, |o| match o {
            Object::Throwable { kind, .. } => *kind,
            _ => None,
        })
    }

    /// Message of a throwable
    pub fn message(&self, obj: ObjRef) -> String {
        self.with(obj, |o| match o {
            Object::Throwable { message, .. } => message.clone(),
            _ => String::new(),
        })
    }

    /// Kind of the guest exception carried by `error`
    pub fn kind_of(&self, error: &VmError) -> Option<ThrowableKind> {
        error.exception().and_then(|obj| self.throwable_kind(obj))
    }

    /// Current recursion count of a monitor
    pub fn lock_count(&self, obj: ObjRef) -> i32 {
        self.monitors.lock().get(&obj).copied().unwrap_or(0)
    }

    /// Pre-allocated throwable for `kind`
    pub fn preallocated_for(&self, kind: ResourceKind) -> ObjRef {
        self.preallocated(kind)
    }

    /// Object monitor of the `Test` class
    pub fn test_mirror(&self) -> ObjRef {
        ObjRef::new(3)
    }

    /// Current value of a static field
    pub fn static_value(&self, field: &FieldInfo) -> Value {
        self.statics
            .lock()
            .get(&(field.holder.id, field.slot))
            .copied()
            .unwrap_or_else(|| default_value(field.kind))
    }

    fn array_elements<T>(&self, array: ObjRef, f: impl FnOnce(&mut Vec<Value>) -> T) -> VmResult<T> {
        self.with(array, |o| match o {
            Object::Array { elements, .. } => Ok(f(elements)),
            _ => Err(VmError::Fatal(format!("{array:?} is not an array"))),
        })
    }
}

fn default_value(kind: Kind) -> Value {
    match kind {
        Kind::Long => Value::Long(0),
        Kind::Float => Value::Float(0.0),
        Kind::Double => Value::Double(0.0),
        Kind::Object => Value::Null,
        Kind::Void => Value::Top,
        _ => Value::Int(0),
    }
}

impl Runtime for Heap {
    fn class_of(&self, obj: ObjRef) -> Arc<ClassInfo> {
        self.with(obj, |o| match o {
            Object::Instance { class, .. }
            | Object::Array { class, .. }
            | Object::Throwable { class, .. } => class.clone(),
        })
    }

    fn select_method(
        &self,
        receiver: &Arc<ClassInfo>,
        method: &Arc<MethodInfo>,
    ) -> Result<Arc<MethodInfo>, LinkError> {
        self.lookup_method(receiver, &method.name, &method.descriptor)
            .ok_or_else(|| LinkError::AbstractMethod(format!("{}.{}", receiver, method.name)))
    }

    fn lookup_method(
        &self,
        class: &Arc<ClassInfo>,
        name: &str,
        descriptor: &str,
    ) -> Option<Arc<MethodInfo>> {
        let signature = format!("{name}{descriptor}");
        let methods = self.methods.read();
        let mut current = Some(class.clone());
        while let Some(class) = current {
            if let Some(found) = methods.get(&(class.id, signature.clone())) {
                return Some(found.clone());
            }
            current = class.super_class.clone();
        }
        None
    }

    fn new_instance(&self, class: &Arc<ClassInfo>) -> VmResult<ObjRef> {
        Ok(self.push(Object::Instance {
            class: class.clone(),
            fields: FxHashMap::default(),
        }))
    }

    fn new_array(
        &self,
        kind: Kind,
        component: Option<&Arc<ClassInfo>>,
        length: i32,
    ) -> VmResult<ObjRef> {
        if length > 1 << 20 {
            return Err(VmError::ResourceExhausted(ResourceKind::OutOfMemory));
        }
        Ok(self.push(Object::Array {
            class: self.class("[Ljava/lang/Object;"),
            component: component.cloned(),
            elements: vec![default_value(kind); length as usize],
        }))
    }

    fn new_multi_array(&self, array_class: &Arc<ClassInfo>, dimensions: &[i32]) -> VmResult<ObjRef> {
        match dimensions {
            [] => Err(VmError::Fatal("no dimensions".into())),
            [length] => self.new_array(Kind::Int, None, *length),
            [length, rest @ ..] => {
                let elements = (0..*length)
                    .map(|_| self.new_multi_array(array_class, rest).map(Value::Ref))
                    .collect::<VmResult<Vec<_>>>()?;
                Ok(self.push(Object::Array {
                    class: array_class.clone(),
                    component: None,
                    elements,
                }))
            }
        }
    }

    fn array_length(&self, array: ObjRef) -> VmResult<i32> {
        self.array_elements(array, |e| e.len() as i32)
    }

    fn array_load(&self, array: ObjRef, index: i32) -> VmResult<Value> {
        self.array_elements(array, |e| e[index as usize])
    }

    fn array_store(&self, array: ObjRef, index: i32, value: Value) -> VmResult<()> {
        self.array_elements(array, |e| e[index as usize] = value)
    }

    fn array_component(&self, array: ObjRef) -> Option<Arc<ClassInfo>> {
        self.with(array, |o| match o {
            Object::Array { component, .. } => component.clone(),
            _ => None,
        })
    }

    fn get_field(&self, obj: ObjRef, field: &FieldInfo) -> VmResult<Value> {
        self.with(obj, |o| match o {
            Object::Instance { fields, .. } => Ok(fields
                .get(&field.slot)
                .copied()
                .unwrap_or_else(|| default_value(field.kind))),
            _ => Err(VmError::Fatal(format!("{obj:?} has no fields"))),
        })
    }

    fn put_field(&self, obj: ObjRef, field: &FieldInfo, value: Value) -> VmResult<()> {
        self.with(obj, |o| match o {
            Object::Instance { fields, .. } => {
                fields.insert(field.slot, value);
                Ok(())
            }
            _ => Err(VmError::Fatal(format!("{obj:?} has no fields"))),
        })
    }

    fn get_static(&self, field: &FieldInfo) -> VmResult<Value> {
        Ok(self.static_value(field))
    }

    fn put_static(&self, field: &FieldInfo, value: Value) -> VmResult<()> {
        self.statics.lock().insert((field.holder.id, field.slot), value);
        Ok(())
    }

    fn monitor_enter(&self, obj: ObjRef) -> VmResult<()> {
        *self.monitors.lock().entry(obj).or_default() += 1;
        Ok(())
    }

    fn monitor_exit(&self, obj: ObjRef) -> VmResult<()> {
        let mut monitors = self.monitors.lock();
        let count = monitors.entry(obj).or_default();
        if *count == 0 {
            return Err(VmError::Fatal(format!("{obj:?} released while unlocked")));
        }
        *count -= 1;
        self.monitor_exits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn invoke_native(&self, method: &Arc<MethodInfo>, args: &[Value]) -> VmResult<Value> {
        let body = self
            .natives
            .read()
            .get(&method.name)
            .cloned()
            .ok_or_else(|| VmError::Fatal(format!("no native body for {method}")))?;
        body(args)
    }

    fn new_throwable(&self, kind: ThrowableKind, message: &str) -> VmResult<ObjRef> {
        Ok(self.push(Object::Throwable {
            class: self.kinds[&kind].clone(),
            kind: Some(kind),
            message: message.to_string(),
        }))
    }

    fn preallocated(&self, kind: ResourceKind) -> ObjRef {
        match kind {
            ResourceKind::StackOverflow => self.preallocated[0],
            ResourceKind::OutOfMemory => self.preallocated[1],
        }
    }
}

// ============================================================================
// Constant pool
// ============================================================================

/// Constant pool backed by mutable tables; missing entries fail to resolve
#[derive(Default)]
pub struct Pool {
    types: RwLock<FxHashMap<u16, Arc<ClassInfo>>>,
    methods: RwLock<FxHashMap<u16, Arc<MethodInfo>>>,
    fields: RwLock<FxHashMap<u16, Arc<FieldInfo>>>,
    constants: RwLock<FxHashMap<u16, Constant>>,
    call_sites: RwLock<FxHashMap<u16, Arc<MethodInfo>>>,
    /// Successful and failed resolutions
    pub resolutions: AtomicUsize,
}

impl Pool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_type(&self, index: u16, class: Arc<ClassInfo>) {
        self.types.write().insert(index, class);
    }

    pub fn add_method(&self, index: u16, method: Arc<MethodInfo>) {
        self.methods.write().insert(index, method);
    }

    pub fn add_field(&self, index: u16, field: Arc<FieldInfo>) {
        self.fields.write().insert(index, field);
    }

    pub fn add_constant(&self, index: u16, constant: Constant) {
        self.constants.write().insert(index, constant);
    }

    pub fn add_call_site(&self, index: u16, target: Arc<MethodInfo>) {
        self.call_sites.write().insert(index, target);
    }

    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::Relaxed)
    }

    fn count(&self) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
    }
}

impl Resolver for Pool {
    fn resolve_type(&self, index: u16) -> Result<Arc<ClassInfo>, LinkError> {
        self.count();
        self.types
            .read()
            .get(&index)
            .cloned()
            .ok_or_else(|| LinkError::ClassNotFound(format!("#{index}")))
    }

    fn resolve_method(&self, _: Opcode, index: u16) -> Result<Arc<MethodInfo>, LinkError> {
        self.count();
        self.methods
            .read()
            .get(&index)
            .cloned()
            .ok_or_else(|| LinkError::NoSuchMethod(format!("#{index}")))
    }

    fn resolve_field(&self, _: Opcode, index: u16) -> Result<Arc<FieldInfo>, LinkError> {
        self.count();
        self.fields
            .read()
            .get(&index)
            .cloned()
            .ok_or_else(|| LinkError::NoSuchField(format!("#{index}")))
    }

    fn resolve_constant(&self, index: u16) -> Result<Constant, LinkError> {
        self.count();
        self.constants
            .read()
            .get(&index)
            .copied()
            .ok_or(LinkError::InvalidIndex(index))
    }

    fn link_call_site(&self, index: u16, _: u32) -> Result<Arc<MethodInfo>, LinkError> {
        self.count();
        self.call_sites
            .read()
            .get(&index)
            .cloned()
            .ok_or_else(|| LinkError::Bootstrap(format!("call site #{index}")))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Fresh heap and pool
pub fn setup() -> (Arc<Heap>, Arc<Pool>) {
    (Heap::new(), Pool::new())
}

/// Assemble a method on `holder`
pub fn method(
    holder: &Arc<ClassInfo>,
    name: &str,
    descriptor: &str,
    flags: MethodFlags,
    builder: CodeBuilder,
    pool: &Arc<Pool>,
) -> Arc<MethodInfo> {
    let code = builder.finish(pool.clone()).expect("assemble");
    Arc::new(MethodInfo::new(holder.clone(), name, descriptor, flags, Some(code)).expect("descriptor"))
}

/// Assemble a static method on the `Test` class
pub fn static_method(
    heap: &Heap,
    pool: &Arc<Pool>,
    name: &str,
    descriptor: &str,
    builder: CodeBuilder,
) -> Arc<MethodInfo> {
    method(&heap.class("Test"), name, descriptor, MethodFlags::STATIC, builder, pool)
}

/// Method without a body
pub fn bodiless(holder: &Arc<ClassInfo>, name: &str, descriptor: &str, flags: MethodFlags) -> Arc<MethodInfo> {
    Arc::new(MethodInfo::new(holder.clone(), name, descriptor, flags, None).expect("descriptor"))
}

/// Instance field of `holder`
pub fn field(holder: &Arc<ClassInfo>, name: &str, kind: Kind, is_static: bool, slot: u32) -> Arc<FieldInfo> {
    Arc::new(FieldInfo {
        name: name.to_string(),
        holder: holder.clone(),
        kind,
        is_static,
        slot,
    })
}

/// Context with default options
pub fn context(heap: &Arc<Heap>) -> VmContext {
    VmContext::new(heap.clone())
}

/// Context with `options`
pub fn context_with(heap: &Arc<Heap>, options: VmOptions) -> VmContext {
    VmContext::new(heap.clone())
        .with_options(options)
        .expect("valid options")
}

/// Invoke on a fresh interpreter
pub fn run(ctx: &VmContext, method: &Arc<MethodInfo>, args: &[Value]) -> VmResult<Value> {
    Interpreter::new(ctx).invoke(method, args)
}
