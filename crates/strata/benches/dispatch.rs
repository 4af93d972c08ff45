// Dispatch benchmarks
//
// This benchmark suite measures:
// - Direct slot calls through a static call site
// - Generic name-based calls from host code
// - Field access through a native view versus the host attribute protocol
// - Override depth, which direct calls should not feel

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use strata::{
    Binding, FieldDescriptor, NativeKind, ParamKind, Runtime, RuntimeConfig, Signature, Type,
    TypeBuilder, Value,
};

fn runtime() -> Runtime {
    Runtime::new(RuntimeConfig::new().with_sweep_threshold(0))
}

/// `Counter` with a hybrid `bump` and a native-only `bump_fast`.
fn counter(rt: &Runtime) -> Type {
    rt.register(
        TypeBuilder::native("Counter")
            .field(FieldDescriptor::native("n", NativeKind::I64).public())
            .hybrid_method("bump", Signature::any(0), |_, _, _| Ok(Value::Int(1)))
            .native_method(
                "bump_fast",
                Signature::new(vec![ParamKind::Int]),
                |_, _, args| Ok(args[0].clone()),
            ),
    )
    .unwrap()
}

fn bench_call_paths(c: &mut Criterion) {
    let rt = runtime();
    let ty = counter(&rt);
    let obj = Value::from(rt.instantiate(&ty, &[]).unwrap());
    let view = rt.cast(&obj, &Binding::new(&ty)).unwrap();
    let bump = rt.bind_static(&ty, "bump").unwrap();
    let bump_fast = rt.bind_static(&ty, "bump_fast").unwrap();
    let arg = [Value::Int(7)];

    let mut group = c.benchmark_group("call_path");
    group.bench_function("static_hybrid", |b| {
        b.iter(|| black_box(view.call(&rt, &bump, &[]).unwrap()))
    });
    group.bench_function("static_native_only", |b| {
        b.iter(|| black_box(view.call(&rt, &bump_fast, &arg).unwrap()))
    });
    group.bench_function("host_by_name", |b| {
        b.iter(|| black_box(rt.call_method(&obj, "bump", &[]).unwrap()))
    });
    let site = rt.bind_dynamic("bump");
    group.bench_function("host_bound_site", |b| {
        b.iter(|| black_box(site.invoke(&rt, &obj, &[]).unwrap()))
    });
    group.finish();
}

fn bench_field_access(c: &mut Criterion) {
    let rt = runtime();
    let ty = counter(&rt);
    let obj = rt.instantiate(&ty, &[]).unwrap();
    let view = rt
        .cast(&Value::from(obj.clone()), &Binding::new(&ty))
        .unwrap();
    let slot = view.field("n").unwrap();

    let mut group = c.benchmark_group("field_access");
    group.bench_function("view_resolved_slot", |b| {
        b.iter(|| black_box(view.read(&slot).unwrap()))
    });
    group.bench_function("view_by_name", |b| {
        b.iter(|| black_box(view.get("n").unwrap()))
    });
    group.bench_function("host_attribute", |b| {
        b.iter(|| black_box(obj.get_attr("n").unwrap()))
    });
    group.finish();
}

fn bench_override_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("override_depth");

    for depth in [1usize, 4, 16] {
        let rt = runtime();
        let root = counter(&rt);
        let mut leaf = root.clone();
        for i in 0..depth {
            leaf = rt
                .register(
                    TypeBuilder::native(&format!("Counter{i}"))
                        .base(leaf.name().as_str())
                        .hybrid_method("bump", Signature::any(0), |_, _, _| Ok(Value::Int(2))),
                )
                .unwrap();
        }
        let obj = Value::from(rt.instantiate(&leaf, &[]).unwrap());
        let view = rt.cast(&obj, &Binding::new(&root)).unwrap();
        let site = rt.bind_static(&root, "bump").unwrap();

        group.bench_with_input(BenchmarkId::new("static", depth), &depth, |b, _| {
            b.iter(|| black_box(view.call(&rt, &site, &[]).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("host", depth), &depth, |b, _| {
            b.iter(|| black_box(rt.call_method(&obj, "bump", &[]).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_call_paths,
    bench_field_access,
    bench_override_depth
);
criterion_main!(benches);
