use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use roast_engine::{CodeBuilder, Interpreter, Kind, MethodInfo, Opcode, Value, VmOptions};

#[path = "../tests/common/mod.rs"]
mod common;

use common::{context, context_with, field, setup, static_method, Heap, Pool};

fn loop_sum(heap: &Heap, pool: &Arc<Pool>) -> Arc<MethodInfo> {
    let mut b = CodeBuilder::new(3, 2);
    let (head, done) = (b.new_label(), b.new_label());
    b.op(Opcode::Iconst0).op(Opcode::Istore1);
    b.op(Opcode::Iconst1).op(Opcode::Istore2);
    b.bind(head)
        .op(Opcode::Iload2)
        .op(Opcode::Iload0)
        .branch(Opcode::IfIcmpgt, done);
    b.op(Opcode::Iload1).op(Opcode::Iload2).op(Opcode::Iadd).op(Opcode::Istore1);
    b.iinc(2, 1).branch(Opcode::Goto, head);
    b.bind(done).op(Opcode::Iload1).op(Opcode::Ireturn);
    static_method(heap, pool, "sum", "(I)I", b)
}

/// Loop that reads and writes a static field every iteration
fn field_loop(heap: &Heap, pool: &Arc<Pool>) -> Arc<MethodInfo> {
    pool.add_field(1, field(&heap.class("Test"), "acc", Kind::Int, true, 0));
    let mut b = CodeBuilder::new(1, 2);
    let (head, done) = (b.new_label(), b.new_label());
    b.bind(head).op(Opcode::Iload0).branch(Opcode::Ifle, done);
    b.op_u16(Opcode::Getstatic, 1)
        .op(Opcode::Iconst1)
        .op(Opcode::Iadd)
        .op_u16(Opcode::Putstatic, 1);
    b.iinc(0, -1).branch(Opcode::Goto, head);
    b.bind(done).op(Opcode::Return);
    static_method(heap, pool, "bump", "(I)V", b)
}

fn bench_arithmetic_loop(c: &mut Criterion) {
    let (heap, pool) = setup();
    let m = loop_sum(&heap, &pool);
    let ctx = context(&heap);

    let mut group = c.benchmark_group("arithmetic_loop");
    for n in [100, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let mut interp = Interpreter::new(&ctx);
                interp.invoke(&m, &[Value::Int(black_box(n))]).unwrap()
            });
        });
    }
    group.finish();
}

fn bench_field_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("static_field_loop");
    for (name, options) in [
        ("quickened", VmOptions::default()),
        ("generic", VmOptions::default().without_quickening()),
    ] {
        // a fresh method per variant so the generic run never sees rewritten sites
        let (heap, pool) = setup();
        let m = field_loop(&heap, &pool);
        let ctx = context_with(&heap, options);
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut interp = Interpreter::new(&ctx);
                interp.invoke(&m, &[Value::Int(black_box(1_000))]).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_arithmetic_loop, bench_field_access);
criterion_main!(benches);
