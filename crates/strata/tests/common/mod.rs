// Common test utilities for integration tests
//
// This module provides shared fixtures: a quiet runtime, a small shape
// hierarchy exercising every method tier, an event log for lifecycle
// ordering and a buffer-backed vector with an iterator type.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use strata::{
    Error, FieldDescriptor, NativeKind, ParamKind, Runtime, RuntimeConfig, Signature, Step, Type,
    TypeBuilder, Value,
};

/// Runtime with automatic sweeps disabled, so tests decide when to sweep.
pub fn runtime() -> Runtime {
    Runtime::new(RuntimeConfig::new().with_sweep_threshold(0))
}

/// Shared, ordered record of lifecycle events.
#[derive(Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.0.borrow_mut().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

pub struct Shapes {
    pub shape: Type,
    pub circle: Type,
    pub square: Type,
}

/// `Shape` (native) <- `Circle` (native), and `Shape` <- `Square` (dynamic).
///
/// - `describe`: host-visible on `Shape`.
/// - `area`: hybrid on `Shape`, overridden natively by `Circle` and
///   dynamically by `Square`.
/// - `rescale`: native-only on `Shape`.
/// - `scale` is private, `sides` read-only, `label` public.
pub fn shapes(rt: &Runtime) -> Shapes {
    let shape = rt
        .register(
            TypeBuilder::native("Shape")
                .field(FieldDescriptor::native("scale", NativeKind::F64))
                .field(FieldDescriptor::native("sides", NativeKind::I32).read_only())
                .field(FieldDescriptor::native("label", NativeKind::Any).public())
                .native_init(|ctx, _| ctx.set("scale", Value::Float(1.0)))
                .host_method("describe", Signature::any(0), |_, this, _| {
                    Ok(Value::from(format!("a {}", this.type_name()).as_str()))
                })
                .hybrid_method("area", Signature::any(0), |_, _, _| Ok(Value::Float(0.0)))
                .native_method(
                    "rescale",
                    Signature::new(vec![ParamKind::Float]),
                    |_, this, args| {
                        let view = this.native_view()?;
                        view.set("scale", args[0].clone())?;
                        Ok(Value::Null)
                    },
                ),
        )
        .expect("Failed to register Shape");

    let circle = rt
        .register(
            TypeBuilder::native("Circle")
                .base("Shape")
                .field(FieldDescriptor::native("radius", NativeKind::F64).public())
                .hybrid_method("area", Signature::any(0), |_, this, _| {
                    let view = this.native_view()?;
                    let r = view.get("radius")?.as_float().unwrap_or(0.0);
                    let scale = view.get("scale")?.as_float().unwrap_or(1.0);
                    Ok(Value::Float(3.0 * r * r * scale))
                }),
        )
        .expect("Failed to register Circle");

    let square = rt
        .register(
            TypeBuilder::dynamic("Square")
                .base("Shape")
                .field(FieldDescriptor::dynamic("side"))
                .host_method("area", Signature::any(0), |rt, this, _| {
                    let side = this.get_attr("side")?;
                    rt.multiply(&side, &side)
                }),
        )
        .expect("Failed to register Square");

    Shapes {
        shape,
        circle,
        square,
    }
}

/// `Vector` holds `len` floats in a phase-1 buffer and iterates through a
/// separate `VectorIter` type.
pub struct Vectors {
    pub vector: Type,
    pub iter: Type,
}

pub fn vectors(rt: &Runtime) -> Vectors {
    let vector = rt
        .register(
            TypeBuilder::native("Vector")
                .field(FieldDescriptor::native("len", NativeKind::I64).read_only())
                .field(FieldDescriptor::native("data", NativeKind::Buffer))
                .native_init(|ctx, args| {
                    ctx.allocate_buffer("data", args.len())?;
                    if let Some(buffer) = ctx.buffer_mut("data")? {
                        for (slot, arg) in buffer.as_mut_slice().iter_mut().zip(args) {
                            *slot = arg.as_float().unwrap_or(0.0);
                        }
                    }
                    ctx.set("len", Value::Int(i64::try_from(args.len()).unwrap_or(i64::MAX)))
                })
                .finalizer(|ctx| {
                    let _ = ctx.release_buffer("data");
                })
                .iter(|rt, this| {
                    let iter_type = rt
                        .lookup_type("VectorIter")
                        .ok_or_else(|| Error::raised("VectorIter is not registered"))?;
                    let it = rt.instantiate(&iter_type, &[])?;
                    it.set_attr("source", Value::from(this.clone()))?;
                    Ok(Value::from(it))
                }),
        )
        .expect("Failed to register Vector");

    let iter = rt
        .register(
            TypeBuilder::native("VectorIter")
                .field(FieldDescriptor::native("source", NativeKind::Ref("Vector".into())).public())
                .field(FieldDescriptor::native("pos", NativeKind::I64))
                .next(|rt, this| {
                    let me = this.native_view()?;
                    let pos = me.get("pos")?.as_int().unwrap_or(0);
                    let source = me.get("source")?;
                    let vector_type = rt
                        .lookup_type("Vector")
                        .ok_or_else(|| Error::raised("Vector is not registered"))?;
                    let src = rt.cast(&source, &strata::Binding::new(&vector_type))?;

                    let item = src.with_buffer("data", |buf| {
                        usize::try_from(pos)
                            .ok()
                            .and_then(|i| buf.as_slice().get(i).copied())
                    })?;
                    match item {
                        Some(x) => {
                            me.set("pos", Value::Int(pos + 1))?;
                            Ok(Step::Item(Value::Float(x)))
                        }
                        None => Ok(Step::Exhausted),
                    }
                }),
        )
        .expect("Failed to register VectorIter");

    Vectors { vector, iter }
}

/// Collects a host iteration into plain values.
pub fn drain(rt: &Runtime, value: &Value) -> Vec<Value> {
    rt.host_iter(value)
        .expect("value should be iterable")
        .collect::<Result<Vec<_>, _>>()
        .expect("iteration should not fail")
}
