//! Site rewriting, inline caches and linking rules

mod common;

use std::sync::{Arc, Barrier};

use common::{context, context_with, field, method, run, setup, static_method, Heap, Pool};
use roast_engine::vm::quicken::{Dispatch, InvokeNode, QuickNode};
use roast_engine::{
    ClassInfo, CodeBuilder, Constant, Interpreter, Kind, MethodFlags, MethodInfo, Opcode, ThrowableKind,
    Value, VmOptions,
};

fn tag_at(m: &MethodInfo, bci: usize) -> Option<Opcode> {
    let code = m.code.as_ref().unwrap();
    code.stream().tag(bci).and_then(Opcode::from_u8)
}

fn dispatch_kind(m: &MethodInfo, slot: usize) -> &'static str {
    let node = m.code.as_ref().unwrap().quick_table().get(slot).unwrap();
    match &*node {
        QuickNode::Invoke(InvokeNode { dispatch, .. }) => match dispatch {
            Dispatch::Direct(_) => "direct",
            Dispatch::Monomorphic { .. } => "monomorphic",
            Dispatch::Virtual => "virtual",
        },
        _ => "other",
    }
}

// ============================================================================
// Rewriting
// ============================================================================

#[test]
fn test_static_field_site_quickened() {
    let (heap, pool) = setup();
    let counter = field(&heap.class("Test"), "counter", Kind::Int, true, 0);
    pool.add_field(1, counter.clone());
    let mut b = CodeBuilder::new(0, 2);
    b.op_u16(Opcode::Getstatic, 1)
        .op(Opcode::Iconst1)
        .op(Opcode::Iadd)
        .op(Opcode::Dup)
        .op_u16(Opcode::Putstatic, 1)
        .op(Opcode::Ireturn);
    let m = static_method(&heap, &pool, "bump", "()I", b);
    let ctx = context(&heap);

    assert_eq!(run(&ctx, &m, &[]).unwrap(), Value::Int(1));
    assert_eq!(tag_at(&m, 0), Some(Opcode::Quick));
    assert_eq!(tag_at(&m, 6), Some(Opcode::Quick));
    let resolved = pool.resolutions();

    assert_eq!(run(&ctx, &m, &[]).unwrap(), Value::Int(2));
    assert_eq!(pool.resolutions(), resolved);
    assert_eq!(heap.static_value(&counter), Value::Int(2));

    let code = m.code.as_ref().unwrap();
    assert_eq!(code.quick_table().len(), 2);
    assert_eq!(code.stream().original()[0], Opcode::Getstatic.to_u8());
}

/// Allocation, fields, arrays and type checks in one body
fn object_workout(heap: &Heap, pool: &Arc<Pool>) -> Arc<MethodInfo> {
    let point = heap.define("Point", "java/lang/Object");
    pool.add_type(1, point.clone());
    pool.add_field(2, field(&point, "x", Kind::Int, false, 0));
    let mut b = CodeBuilder::new(2, 4);
    b.op_u16(Opcode::New, 1).op(Opcode::Astore0);
    b.op(Opcode::Aload0).int(7).op_u16(Opcode::Putfield, 2);
    b.op(Opcode::Iconst3).op_u8(Opcode::Newarray, 10).op(Opcode::Astore1);
    b.op(Opcode::Aload1)
        .op(Opcode::Iconst1)
        .op(Opcode::Aload0)
        .op_u16(Opcode::Getfield, 2)
        .op(Opcode::Iastore);
    b.op(Opcode::Aload1).op(Opcode::Iconst1).op(Opcode::Iaload);
    b.op(Opcode::Aload0).op_u16(Opcode::Instanceof, 1).op(Opcode::Iadd);
    b.op(Opcode::Aload0)
        .op_u16(Opcode::Checkcast, 1)
        .op_u16(Opcode::Getfield, 2)
        .op(Opcode::Iadd);
    b.op(Opcode::Aload1).op(Opcode::Arraylength).op(Opcode::Iadd);
    b.op(Opcode::Ireturn);
    static_method(heap, pool, "workout", "()I", b)
}

#[test]
fn test_quickening_off_gives_identical_results() {
    let (heap, pool) = setup();
    let m = object_workout(&heap, &pool);
    let generic = context_with(&heap, VmOptions::default().without_quickening());
    let expected = Value::Int(7 + 1 + 7 + 3);

    assert_eq!(run(&generic, &m, &[]).unwrap(), expected);
    let per_run = pool.resolutions();
    assert_eq!(run(&generic, &m, &[]).unwrap(), expected);
    assert_eq!(pool.resolutions(), per_run * 2);
    assert_eq!(tag_at(&m, 0), Some(Opcode::New));
    assert!(m.code.as_ref().unwrap().quick_table().is_empty());

    let quick = context(&heap);
    assert_eq!(run(&quick, &m, &[]).unwrap(), expected);
    assert_eq!(run(&quick, &m, &[]).unwrap(), expected);
    assert_eq!(tag_at(&m, 0), Some(Opcode::Quick));
    assert_eq!(pool.resolutions(), per_run * 3);
}

#[test]
fn test_array_sites_use_slim_tag() {
    let (heap, pool) = setup();
    let mut b = CodeBuilder::new(2, 3);
    b.op(Opcode::Aload0).op(Opcode::Iload1).op(Opcode::Iaload).op(Opcode::Ireturn);
    let m = static_method(&heap, &pool, "at", "([II)I", b);
    let ctx = context(&heap);
    let array = heap.int_array(&[4, 5, 6]);

    assert_eq!(run(&ctx, &m, &[Value::Ref(array), Value::Int(2)]).unwrap(), Value::Int(6));
    assert_eq!(tag_at(&m, 2), Some(Opcode::SlimQuick));
    assert_eq!(m.code.as_ref().unwrap().quick_table().slim_index(2), Some(0));

    let err = run(&ctx, &m, &[Value::Ref(array), Value::Int(5)]).unwrap_err();
    assert_eq!(heap.kind_of(&err), Some(ThrowableKind::ArrayIndexOutOfBounds));
    assert_eq!(heap.message(err.exception().unwrap()), "Index 5 out of bounds for length 3");

    let err = run(&ctx, &m, &[Value::Null, Value::Int(0)]).unwrap_err();
    assert_eq!(heap.kind_of(&err), Some(ThrowableKind::NullPointer));
}

#[test]
fn test_aastore_type_check() {
    let (heap, pool) = setup();
    pool.add_type(1, heap.class("java/lang/String"));
    let mut b = CodeBuilder::new(1, 4);
    b.op(Opcode::Iconst1)
        .op_u16(Opcode::Anewarray, 1)
        .op(Opcode::Dup)
        .op(Opcode::Iconst0)
        .op(Opcode::Aload0)
        .op(Opcode::Aastore)
        .op(Opcode::Areturn);
    let m = static_method(&heap, &pool, "store", "(Ljava/lang/Object;)[Ljava/lang/String;", b);
    let ctx = context(&heap);

    let string = heap.instance("java/lang/String");
    assert!(matches!(run(&ctx, &m, &[Value::Ref(string)]).unwrap(), Value::Ref(_)));
    let plain = heap.instance("java/lang/Object");
    let err = run(&ctx, &m, &[Value::Ref(plain)]).unwrap_err();
    assert_eq!(heap.kind_of(&err), Some(ThrowableKind::ArrayStore));
    // null always stores
    assert!(run(&ctx, &m, &[Value::Null]).is_ok());
}

#[test]
fn test_checkcast_failure_message() {
    let (heap, pool) = setup();
    pool.add_type(1, heap.class("java/lang/String"));
    let mut b = CodeBuilder::new(1, 1);
    b.op(Opcode::Aload0).op_u16(Opcode::Checkcast, 1).op(Opcode::Areturn);
    let m = static_method(&heap, &pool, "cast", "(Ljava/lang/Object;)Ljava/lang/Object;", b);
    let ctx = context(&heap);
    assert_eq!(run(&ctx, &m, &[Value::Null]).unwrap(), Value::Null);
    let err = run(&ctx, &m, &[Value::Ref(heap.instance("java/lang/Object"))]).unwrap_err();
    assert_eq!(heap.kind_of(&err), Some(ThrowableKind::ClassCast));
    assert_eq!(
        heap.message(err.exception().unwrap()),
        "class java/lang/Object cannot be cast to class java/lang/String"
    );
}

#[test]
fn test_multianewarray() {
    let (heap, pool) = setup();
    pool.add_type(1, heap.class("[Ljava/lang/Object;"));
    let mut b = CodeBuilder::new(0, 2);
    b.op(Opcode::Iconst2)
        .op(Opcode::Iconst3)
        .multianewarray(1, 2)
        .op(Opcode::Iconst1)
        .op(Opcode::Aaload)
        .op(Opcode::Arraylength)
        .op(Opcode::Ireturn);
    let m = static_method(&heap, &pool, "grid", "()I", b);
    assert_eq!(run(&context(&heap), &m, &[]).unwrap(), Value::Int(3));
}

#[test]
fn test_ldc_constants() {
    let (heap, pool) = setup();
    pool.add_constant(1, Constant::Int(123_456));
    pool.add_constant(2, Constant::Long(1 << 40));
    let mut b = CodeBuilder::new(0, 4);
    b.op_u8(Opcode::Ldc, 1)
        .op(Opcode::I2l)
        .op_u16(Opcode::Ldc2W, 2)
        .op(Opcode::Ladd)
        .op(Opcode::Lreturn);
    let m = static_method(&heap, &pool, "k", "()J", b);
    assert_eq!(run(&context(&heap), &m, &[]).unwrap(), Value::Long(123_456 + (1 << 40)));
}

// ============================================================================
// Linkage failures
// ============================================================================

#[test]
fn test_linkage_failure_is_not_cached() {
    let (heap, pool) = setup();
    let mut b = CodeBuilder::new(0, 1);
    b.op_u16(Opcode::Getstatic, 5).op(Opcode::Ireturn);
    let m = static_method(&heap, &pool, "late", "()I", b);
    let ctx = context(&heap);

    let err = run(&ctx, &m, &[]).unwrap_err();
    assert_eq!(heap.kind_of(&err), Some(ThrowableKind::NoSuchField));
    assert_eq!(tag_at(&m, 0), Some(Opcode::Getstatic));

    pool.add_field(5, field(&heap.class("Test"), "late", Kind::Int, true, 3));
    assert_eq!(run(&ctx, &m, &[]).unwrap(), Value::Int(0));
    assert_eq!(tag_at(&m, 0), Some(Opcode::Quick));
}

#[test]
fn test_static_mismatch_is_incompatible_class_change() {
    let (heap, pool) = setup();
    pool.add_field(1, field(&heap.class("Test"), "inst", Kind::Int, false, 0));
    let mut b = CodeBuilder::new(0, 1);
    b.op_u16(Opcode::Getstatic, 1).op(Opcode::Ireturn);
    let m = static_method(&heap, &pool, "f", "()I", b);
    let err = run(&context(&heap), &m, &[]).unwrap_err();
    assert_eq!(heap.kind_of(&err), Some(ThrowableKind::IncompatibleClassChange));

    let holder = heap.class("Test");
    let instance_method = method(&holder, "g", "()V", MethodFlags::PUBLIC, CodeBuilder::new(1, 0), &pool);
    pool.add_method(2, instance_method);
    let mut b = CodeBuilder::new(0, 0);
    b.op_u16(Opcode::Invokestatic, 2).op(Opcode::Return);
    let m = static_method(&heap, &pool, "h", "()V", b);
    let err = run(&context(&heap), &m, &[]).unwrap_err();
    assert_eq!(heap.kind_of(&err), Some(ThrowableKind::IncompatibleClassChange));
}

#[test]
fn test_missing_method_is_no_such_method() {
    let (heap, pool) = setup();
    let mut b = CodeBuilder::new(0, 0);
    b.op_u16(Opcode::Invokestatic, 42).op(Opcode::Return);
    let m = static_method(&heap, &pool, "f", "()V", b);
    let err = run(&context(&heap), &m, &[]).unwrap_err();
    assert_eq!(heap.kind_of(&err), Some(ThrowableKind::NoSuchMethod));
}

// ============================================================================
// Invoke linking
// ============================================================================

struct Zoo {
    animal_sound: Arc<MethodInfo>,
    dog: Arc<ClassInfo>,
    cat: Arc<ClassInfo>,
}

fn constant_method(
    holder: &Arc<ClassInfo>,
    name: &str,
    flags: MethodFlags,
    v: i32,
    pool: &Arc<Pool>,
) -> Arc<MethodInfo> {
    let mut b = CodeBuilder::new(1, 1);
    b.int(v).op(Opcode::Ireturn);
    method(holder, name, "()I", flags, b, pool)
}

fn zoo(heap: &Heap, pool: &Arc<Pool>) -> Zoo {
    let animal = heap.define("Animal", "java/lang/Object");
    let dog = heap.define("Dog", "Animal");
    let cat = heap.define("Cat", "Animal");
    let animal_sound = common::bodiless(&animal, "sound", "()I", MethodFlags::ABSTRACT);
    heap.declare(&animal_sound);
    heap.declare(&constant_method(&dog, "sound", MethodFlags::PUBLIC, 1, pool));
    heap.declare(&constant_method(&cat, "sound", MethodFlags::PUBLIC, 2, pool));
    Zoo {
        animal_sound,
        dog,
        cat,
    }
}

#[test]
fn test_monomorphic_cache_generifies_on_miss() {
    let (heap, pool) = setup();
    let zoo = zoo(&heap, &pool);
    pool.add_method(1, zoo.animal_sound.clone());
    let mut b = CodeBuilder::new(1, 1);
    b.op(Opcode::Aload0).op_u16(Opcode::Invokevirtual, 1).op(Opcode::Ireturn);
    let m = static_method(&heap, &pool, "speak", "(LAnimal;)I", b);
    let ctx = context(&heap);
    let dog = heap.instance(&zoo.dog.name);
    let cat = heap.instance(&zoo.cat.name);

    assert_eq!(run(&ctx, &m, &[Value::Ref(dog)]).unwrap(), Value::Int(1));
    assert_eq!(dispatch_kind(&m, 0), "monomorphic");
    assert_eq!(run(&ctx, &m, &[Value::Ref(dog)]).unwrap(), Value::Int(1));
    assert_eq!(dispatch_kind(&m, 0), "monomorphic");

    assert_eq!(run(&ctx, &m, &[Value::Ref(cat)]).unwrap(), Value::Int(2));
    assert_eq!(dispatch_kind(&m, 0), "virtual");
    assert_eq!(run(&ctx, &m, &[Value::Ref(dog)]).unwrap(), Value::Int(1));
    assert_eq!(m.code.as_ref().unwrap().quick_table().len(), 1);

    let err = run(&ctx, &m, &[Value::Null]).unwrap_err();
    assert_eq!(heap.kind_of(&err), Some(ThrowableKind::NullPointer));
}

#[test]
fn test_null_receiver_at_link_time_links_virtual() {
    let (heap, pool) = setup();
    let zoo = zoo(&heap, &pool);
    pool.add_method(1, zoo.animal_sound.clone());
    let mut b = CodeBuilder::new(1, 1);
    b.op(Opcode::Aload0).op_u16(Opcode::Invokevirtual, 1).op(Opcode::Ireturn);
    let m = static_method(&heap, &pool, "speak", "(LAnimal;)I", b);
    let ctx = context(&heap);

    let err = run(&ctx, &m, &[Value::Null]).unwrap_err();
    assert_eq!(heap.kind_of(&err), Some(ThrowableKind::NullPointer));
    assert_eq!(dispatch_kind(&m, 0), "virtual");
    let cat = heap.instance(&zoo.cat.name);
    assert_eq!(run(&ctx, &m, &[Value::Ref(cat)]).unwrap(), Value::Int(2));
}

#[test]
fn test_final_method_binds_directly() {
    let (heap, pool) = setup();
    let sealed = heap.define_with("Sealed", "java/lang/Object", |c| c.is_final = true);
    let target = constant_method(&sealed, "id", MethodFlags::PUBLIC, 9, &pool);
    pool.add_method(1, target);
    let mut b = CodeBuilder::new(1, 1);
    b.op(Opcode::Aload0).op_u16(Opcode::Invokevirtual, 1).op(Opcode::Ireturn);
    let m = static_method(&heap, &pool, "call", "(LSealed;)I", b);
    let obj = heap.instance("Sealed");
    assert_eq!(run(&context(&heap), &m, &[Value::Ref(obj)]).unwrap(), Value::Int(9));
    assert_eq!(dispatch_kind(&m, 0), "direct");
}

#[test]
fn test_invokespecial_super_call_uses_superclass_lookup() {
    let (heap, pool) = setup();
    let grand = heap.define("Grand", "java/lang/Object");
    let parent = heap.define("Parent", "Grand");
    let child = heap.define("Child", "Parent");
    let grand_m = constant_method(&grand, "m", MethodFlags::PUBLIC, 1, &pool);
    heap.declare(&grand_m);
    heap.declare(&constant_method(&parent, "m", MethodFlags::PUBLIC, 2, &pool));
    heap.declare(&constant_method(&child, "m", MethodFlags::PUBLIC, 3, &pool));
    pool.add_method(1, grand_m);

    // Child.callSuper() { return super.m(); } with a stale reference to Grand.m
    let mut b = CodeBuilder::new(1, 1);
    b.op(Opcode::Aload0).op_u16(Opcode::Invokespecial, 1).op(Opcode::Ireturn);
    let call_super = method(&child, "callSuper", "()I", MethodFlags::PUBLIC, b, &pool);
    let obj = heap.instance("Child");
    assert_eq!(run(&context(&heap), &call_super, &[Value::Ref(obj)]).unwrap(), Value::Int(2));

    // the same reference from Grand itself is not a super call
    let mut b = CodeBuilder::new(1, 1);
    b.op(Opcode::Aload0).op_u16(Opcode::Invokespecial, 1).op(Opcode::Ireturn);
    let own = method(&grand, "own", "()I", MethodFlags::PUBLIC, b, &pool);
    assert_eq!(run(&context(&heap), &own, &[Value::Ref(obj)]).unwrap(), Value::Int(1));
}

#[test]
fn test_invokedynamic_calls_static_target() {
    let (heap, pool) = setup();
    let mut b = CodeBuilder::new(2, 2);
    b.op(Opcode::Iload0).op(Opcode::Iload1).op(Opcode::Isub).op(Opcode::Ireturn);
    pool.add_call_site(4, static_method(&heap, &pool, "lambda$0", "(II)I", b));
    let mut b = CodeBuilder::new(0, 2);
    b.int(10).int(4).op_u16(Opcode::Invokedynamic, 4).op(Opcode::Ireturn);
    let m = static_method(&heap, &pool, "indy", "()I", b);
    let ctx = context(&heap);
    assert_eq!(run(&ctx, &m, &[]).unwrap(), Value::Int(6));
    assert_eq!(dispatch_kind(&m, 0), "direct");

    let mut b = CodeBuilder::new(0, 1);
    b.op_u16(Opcode::Invokedynamic, 5).op(Opcode::Return);
    let unbound = static_method(&heap, &pool, "unbound", "()V", b);
    let err = run(&ctx, &unbound, &[]).unwrap_err();
    assert_eq!(heap.kind_of(&err), Some(ThrowableKind::BootstrapMethod));
}

#[test]
fn test_interface_dispatch() {
    let (heap, pool) = setup();
    let shape = heap.define_with("Shape", "java/lang/Object", |c| c.is_interface = true);
    let area = common::bodiless(&shape, "area", "()I", MethodFlags::ABSTRACT);
    let square = heap.define_with("Square", "java/lang/Object", |c| c.interfaces.push(shape.clone()));
    heap.declare(&constant_method(&square, "area", MethodFlags::PUBLIC, 16, &pool));
    pool.add_method(1, area);
    let mut b = CodeBuilder::new(1, 1);
    b.op(Opcode::Aload0).invokeinterface(1, 1).op(Opcode::Ireturn);
    let m = static_method(&heap, &pool, "measure", "(LShape;)I", b);
    let obj = heap.instance("Square");
    assert_eq!(run(&context(&heap), &m, &[Value::Ref(obj)]).unwrap(), Value::Int(16));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_racing_threads_install_one_node() {
    const THREADS: usize = 8;
    let (heap, pool) = setup();
    pool.add_field(1, field(&heap.class("Test"), "shared", Kind::Int, true, 0));
    let mut b = CodeBuilder::new(0, 1);
    b.op_u16(Opcode::Getstatic, 1).op(Opcode::Ireturn);
    let m = static_method(&heap, &pool, "read", "()I", b);
    let ctx = context(&heap);
    let barrier = Barrier::new(THREADS);

    std::thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                barrier.wait();
                let mut interp = Interpreter::new(&ctx);
                for _ in 0..50 {
                    assert_eq!(interp.invoke(&m, &[]).unwrap(), Value::Int(0));
                }
            });
        }
    });

    let code = m.code.as_ref().unwrap();
    assert_eq!(code.quick_table().len(), 1);
    assert_eq!(tag_at(&m, 0), Some(Opcode::Quick));
    assert_eq!(code.stream().quick_operand(1), Some(0));
}
