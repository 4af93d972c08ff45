//! `Strata` runtime module.
//!
//! This module provides the object model of `Strata`:
//!
//! - Fixed-offset native records shared by a whole inheritance chain
//! - Dynamic-only subclasses layered on top of native-backed types
//! - Three method dispatch tiers with static and dynamic call sites
//! - Two-phase construction, finalization and a cycle sweep
//!
//! # Architecture
//!
//! - [`symbol`]: interned names
//! - [`value`]: host values and the null sentinel
//! - [`layout`]: native records, field slots and accessor visibility
//! - [`method`]: method entries, tiers and flattened method tables
//! - [`types`]: type descriptors, the builder and the registry
//! - `inherit`: single-native-base resolution of a builder
//! - [`object`]: reference-counted instances and host attribute access
//! - [`lifecycle`]: phase-1/phase-2 construction and finalizers
//! - [`dispatch`]: call-site binding and invocation
//! - [`cast`]: typed bindings and native views
//! - [`special`]: comparison, arithmetic and iteration slots
//! - [`collector`]: cycle sweep
//! - [`introspection`]: read-only registry queries
//!
//! # Thread Safety
//!
//! A [`Runtime`] and everything it creates belong to one thread. Handles
//! are `Rc`-based and the type is `!Send`. Only the symbol table is shared
//! process-wide.

pub mod cast;
pub mod collector;
pub mod dispatch;
mod inherit;
pub mod introspection;
pub mod layout;
pub mod lifecycle;
pub mod method;
pub mod object;
pub mod special;
pub mod symbol;
pub mod types;
pub mod value;

pub use cast::{Binding, NativeView, cast_unchecked};
pub use collector::SweepStats;
pub use dispatch::{CallSite, DynamicSite, StaticSite};
pub use introspection::{MethodProvider, SubclassInfo};
pub use layout::{Access, FieldDescriptor, NativeBuffer, NativeKind, Visibility};
pub use lifecycle::{FinalizeContext, InitContext};
pub use method::{MethodDef, ParamKind, Signature, Tier};
pub use object::{Object, WeakObject};
pub use special::{CompareOp, HostIter, Step};
pub use symbol::Symbol;
pub use types::{Type, TypeBuilder, TypeDescriptor, TypeKind};
pub use value::Value;

use crate::config::RuntimeConfig;
use crate::error::Result;
use collector::Heap;
use std::cell::RefCell;
use std::rc::Rc;
use strata_log::{debug, warn};
use types::TypeRegistry;

/// One interpreter instance: owns the type registry and the tracked heap.
///
/// # Example
///
/// ```rust
/// use strata::{Runtime, RuntimeConfig};
///
/// let rt = Runtime::new(RuntimeConfig::new().with_sweep_threshold(0));
/// assert!(rt.all_types().is_empty());
/// ```
pub struct Runtime {
    config: RuntimeConfig,
    registry: RefCell<TypeRegistry>,
    heap: RefCell<Heap>,
}

impl Runtime {
    /// Creates a runtime. A configured log level is applied globally.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        if let Some(level) = config.log_level {
            strata_log::set_level(level);
        }
        debug!(
            "runtime created (sweep threshold {}, buffer limit {})",
            config.sweep_threshold, config.max_buffer_len
        );
        Runtime {
            config,
            registry: RefCell::new(TypeRegistry::default()),
            heap: RefCell::new(Heap::default()),
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Validates and registers a type.
    ///
    /// # Arguments
    ///
    /// * `builder` - The type declaration
    ///
    /// # Returns
    ///
    /// The shared handle of the new type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Definition`](crate::Error::Definition) if the
    /// declaration breaks a layout, tier or inheritance rule. The registry
    /// is unchanged in that case.
    pub fn register(&self, builder: TypeBuilder) -> Result<Type> {
        let name = builder.name;
        let resolved = inherit::resolve(&self.registry.borrow(), builder);

        match resolved {
            Ok(descriptor) => {
                let ty = Rc::new(descriptor);
                debug!(
                    "registered {:?} type {} (depth {}, {} native bytes, {} slots)",
                    ty.kind,
                    ty.name,
                    ty.depth,
                    ty.layout.size(),
                    ty.methods.slot_count()
                );
                self.registry.borrow_mut().insert(Rc::clone(&ty));
                Ok(ty)
            }
            Err(err) => {
                warn!("rejected type {name}: {err}");
                Err(err)
            }
        }
    }

    /// Looks up a registered type by name.
    #[must_use]
    pub fn lookup_type(&self, name: &str) -> Option<Type> {
        let sym = Symbol::lookup(name)?;
        self.registry.borrow().get(sym).cloned()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::new(RuntimeConfig::default())
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("types", &self.registry.borrow().len())
            .finish_non_exhaustive()
    }
}
