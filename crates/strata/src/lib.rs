//! `Strata`: a hybrid native/dynamic object model for Rust
//!
//! `Strata` models a class system in which some types are backed by
//! fixed-layout native records and others are ordinary dynamic types layered
//! on top of them. It provides:
//!
//! - **Fixed-Offset Layouts** shared by every level of a native chain
//! - **Tiered Dispatch**: host-visible, hybrid and native-only methods
//! - **Two-Phase Construction** with exact partial-failure teardown
//! - **Checked Casts** and a null sentinel that never reaches native state
//! - **Special Protocols** for comparison, arithmetic and iteration
//! - **Cycle Collection** on top of reference counting
//!
//! # Example
//!
//! ```rust
//! use strata::{
//!     Binding, FieldDescriptor, NativeKind, Runtime, Signature, TypeBuilder, Value,
//! };
//!
//! let rt = Runtime::default();
//! let shape = rt
//!     .register(
//!         TypeBuilder::native("Shape")
//!             .field(FieldDescriptor::native("scale", NativeKind::F64))
//!             .native_init(|ctx, _| ctx.set("scale", Value::Float(2.0)))
//!             .hybrid_method("area", Signature::any(0), |_, _, _| Ok(Value::Float(0.0))),
//!     )
//!     .unwrap();
//!
//! let obj = rt.instantiate(&shape, &[]).unwrap();
//! let view = rt.cast(&Value::from(obj.clone()), &Binding::new(&shape)).unwrap();
//! assert_eq!(view.get("scale").unwrap(), Value::Float(2.0));
//!
//! // `scale` is private: host attribute access cannot see it.
//! assert!(obj.get_attr("scale").is_err());
//! ```

pub mod config;
pub mod error;
pub mod runtime;

// Re-export commonly used types
pub use config::RuntimeConfig;
pub use error::{DefinitionError, Error, Result};
pub use runtime::{
    Binding, CallSite, CompareOp, DynamicSite, FieldDescriptor, HostIter, MethodDef, NativeKind,
    NativeView, Object, ParamKind, Runtime, Signature, StaticSite, Step, Symbol, SweepStats, Tier,
    Type, TypeBuilder, TypeDescriptor, TypeKind, Value, Visibility, WeakObject, cast_unchecked,
};
