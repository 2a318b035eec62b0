//! Runtime stub for unit tests

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::vm::class::{ClassInfo, FieldInfo, Kind, MethodInfo};
use crate::vm::runtime::{LinkError, ResourceKind, Runtime, ThrowableKind};
use crate::vm::value::{ObjRef, Value};
use crate::vm::{VmError, VmResult};

/// Runtime with no heap: counts monitor operations, everything else fails
#[derive(Default)]
pub(crate) struct StubRuntime {
    pub(crate) counts: Mutex<FxHashMap<ObjRef, i32>>,
    pub(crate) fail_exit: Option<ObjRef>,
}

impl StubRuntime {
    pub(crate) fn lock_count(&self, obj: ObjRef) -> i32 {
        self.counts.lock().get(&obj).copied().unwrap_or(0)
    }
}

fn no_heap<T>() -> VmResult<T> {
    Err(VmError::Fatal("stub runtime has no heap".into()))
}

impl Runtime for StubRuntime {
    fn class_of(&self, obj: ObjRef) -> Arc<ClassInfo> {
        Arc::new(ClassInfo::new(obj.raw() as u32, "Stub", None))
    }
    fn select_method(
        &self,
        _: &Arc<ClassInfo>,
        method: &Arc<MethodInfo>,
    ) -> Result<Arc<MethodInfo>, LinkError> {
        Ok(method.clone())
    }
    fn lookup_method(&self, _: &Arc<ClassInfo>, _: &str, _: &str) -> Option<Arc<MethodInfo>> {
        None
    }
    fn new_instance(&self, _: &Arc<ClassInfo>) -> VmResult<ObjRef> {
        no_heap()
    }
    fn new_array(&self, _: Kind, _: Option<&Arc<ClassInfo>>, _: i32) -> VmResult<ObjRef> {
        no_heap()
    }
    fn new_multi_array(&self, _: &Arc<ClassInfo>, _: &[i32]) -> VmResult<ObjRef> {
        no_heap()
    }
    fn array_length(&self, _: ObjRef) -> VmResult<i32> {
        no_heap()
    }
    fn array_load(&self, _: ObjRef, _: i32) -> VmResult<Value> {
        no_heap()
    }
    fn array_store(&self, _: ObjRef, _: i32, _: Value) -> VmResult<()> {
        no_heap()
    }
    fn array_component(&self, _: ObjRef) -> Option<Arc<ClassInfo>> {
        None
    }
    fn get_field(&self, _: ObjRef, _: &FieldInfo) -> VmResult<Value> {
        no_heap()
    }
    fn put_field(&self, _: ObjRef, _: &FieldInfo, _: Value) -> VmResult<()> {
        no_heap()
    }
    fn get_static(&self, _: &FieldInfo) -> VmResult<Value> {
        no_heap()
    }
    fn put_static(&self, _: &FieldInfo, _: Value) -> VmResult<()> {
        no_heap()
    }
    fn monitor_enter(&self, obj: ObjRef) -> VmResult<()> {
        *self.counts.lock().entry(obj).or_default() += 1;
        Ok(())
    }
    fn monitor_exit(&self, obj: ObjRef) -> VmResult<()> {
        if self.fail_exit == Some(obj) {
            return Err(VmError::Fatal("release failed".into()));
        }
        *self.counts.lock().entry(obj).or_default() -= 1;
        Ok(())
    }
    fn invoke_native(&self, _: &Arc<MethodInfo>, _: &[Value]) -> VmResult<Value> {
        no_heap()
    }
    fn new_throwable(&self, _: ThrowableKind, _: &str) -> VmResult<ObjRef> {
        no_heap()
    }
    fn preallocated(&self, kind: ResourceKind) -> ObjRef {
        ObjRef::new(0xE000 + kind.index() as u64)
    }
}
