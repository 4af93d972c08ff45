//! Two-phase construction and teardown.
//!
//! # Phases
//!
//! 1. **Native initialization.** Each level of the chain that declares a
//!    native initializer runs it, root first, against the bare record. The
//!    instance is not yet visible to host code, so a phase-1 hook can only
//!    touch the record and acquire native buffers.
//! 2. **General initialization.** The most-derived `init` hook on the chain
//!    runs against the fully built instance.
//!
//! If a phase-1 hook fails, construction is abandoned: phase 2 never runs,
//! the failing level's finalizer never runs, and only the levels that
//! completed are torn down, most-derived first.
//!
//! # Teardown
//!
//! Finalizers run exactly once per instance, most-derived first, either
//! when the last handle is dropped or when a cycle sweep reclaims it.

use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::runtime::layout::{FieldSlot, NativeBuffer, NativeRecord};
use crate::runtime::object::{Object, Storage};
use crate::runtime::symbol::Symbol;
use crate::runtime::types::{Type, TypeDescriptor};
use crate::runtime::value::Value;
use std::rc::Rc;
use strata_log::{debug, trace};

/// Phase-1 hook of one level.
pub type NativeInit = Rc<dyn Fn(&mut InitContext<'_>, &[Value]) -> Result<()>>;

/// Phase-2 hook.
pub type GeneralInit = Rc<dyn Fn(&Runtime, &Object, &[Value]) -> Result<()>>;

/// Teardown hook of one level.
pub type Finalizer = Rc<dyn Fn(&mut FinalizeContext<'_>)>;

/// Lifecycle hooks declared at one level.
#[derive(Clone, Default)]
pub struct Lifecycle {
    pub(crate) native_init: Option<NativeInit>,
    pub(crate) init: Option<GeneralInit>,
    pub(crate) finalizer: Option<Finalizer>,
}

fn slot_of<'t>(level: &'t TypeDescriptor, field: &str) -> Result<&'t FieldSlot> {
    Symbol::lookup(field)
        .and_then(|sym| level.layout.slot(sym))
        .ok_or_else(|| Error::NoSuchAttribute {
            type_name: level.name.to_string(),
            name: field.to_string(),
        })
}

/// Record access handed to a phase-1 hook.
///
/// Field names resolve through the layout of the level being initialized,
/// so a level sees its own fields and those of its ancestors.
pub struct InitContext<'a> {
    runtime: &'a Runtime,
    level: &'a TypeDescriptor,
    record: &'a mut NativeRecord,
}

impl InitContext<'_> {
    /// The constructing runtime.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        self.runtime
    }

    /// Name of the level being initialized.
    #[must_use]
    pub fn type_name(&self) -> Symbol {
        self.level.name
    }

    /// Reads a native field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchAttribute`] for unknown fields, or a slot
    /// error from [`NativeRecord::read`].
    pub fn get(&self, field: &str) -> Result<Value> {
        self.record.read(slot_of(self.level, field)?)
    }

    /// Writes a native field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchAttribute`] for unknown fields, or a slot
    /// error from [`NativeRecord::write`].
    pub fn set(&mut self, field: &str, value: Value) -> Result<()> {
        self.record.write(slot_of(self.level, field)?, value)
    }

    /// Allocates a zeroed native buffer of `len` elements into `field`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if `len` exceeds the runtime's
    /// configured buffer limit, or a slot error if `field` is not a buffer.
    pub fn allocate_buffer(&mut self, field: &str, len: usize) -> Result<()> {
        let slot = slot_of(self.level, field)?;
        let limit = self.runtime.config().max_buffer_len;
        if len > limit {
            return Err(self.allocation_failure(format!(
                "buffer '{field}' of {len} elements exceeds the limit of {limit}"
            )));
        }
        trace!("{}: allocated buffer '{field}' ({len} elements)", self.level.name);
        self.record.install_buffer(slot, NativeBuffer::zeroed(len))
    }

    /// Mutable access to a buffer allocated earlier in phase 1.
    ///
    /// # Errors
    ///
    /// Returns a slot error if `field` is unknown or not a buffer.
    pub fn buffer_mut(&mut self, field: &str) -> Result<Option<&mut NativeBuffer>> {
        let slot = slot_of(self.level, field)?;
        self.record.buffer_mut(slot)
    }

    /// Builds an [`Error::AllocationFailure`] attributed to this level.
    #[must_use]
    pub fn allocation_failure(&self, reason: impl Into<String>) -> Error {
        Error::AllocationFailure {
            type_name: self.level.name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Record access handed to a finalizer.
pub struct FinalizeContext<'a> {
    level: &'a TypeDescriptor,
    record: &'a mut NativeRecord,
}

impl FinalizeContext<'_> {
    /// Name of the level being torn down.
    #[must_use]
    pub fn type_name(&self) -> Symbol {
        self.level.name
    }

    /// Reads a native field.
    ///
    /// # Errors
    ///
    /// Same as [`InitContext::get`].
    pub fn get(&self, field: &str) -> Result<Value> {
        self.record.read(slot_of(self.level, field)?)
    }

    /// Writes a native field.
    ///
    /// # Errors
    ///
    /// Same as [`InitContext::set`].
    pub fn set(&mut self, field: &str, value: Value) -> Result<()> {
        self.record.write(slot_of(self.level, field)?, value)
    }

    /// Read access to a buffer, `None` if it was never allocated.
    ///
    /// # Errors
    ///
    /// Returns a slot error if `field` is unknown or not a buffer.
    pub fn buffer(&self, field: &str) -> Result<Option<&NativeBuffer>> {
        self.record.buffer(slot_of(self.level, field)?)
    }

    /// Releases a buffer. Returns `false` if it was never allocated, which
    /// is not an error.
    ///
    /// # Errors
    ///
    /// Returns a slot error if `field` is unknown or not a buffer.
    pub fn release_buffer(&mut self, field: &str) -> Result<bool> {
        let released = self.record.take_buffer(slot_of(self.level, field)?)?;
        Ok(released.is_some())
    }
}

/// Runs the finalizers of the first `completed` levels of `ty`'s chain,
/// most-derived first.
pub(crate) fn finalize_levels(ty: &TypeDescriptor, record: &mut NativeRecord, completed: usize) {
    let chain = ty.chain();
    for level in chain.into_iter().take(completed).rev() {
        if let Some(hook) = &level.hooks.finalizer {
            trace!("finalizing {} level of {}", level.name, ty.name);
            hook(&mut FinalizeContext {
                level,
                record: &mut *record,
            });
        }
    }
}

impl Runtime {
    /// Creates an instance: phase 1 for every level, then phase 2.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a phase-1 hook (after tearing down
    /// the completed levels) or by the phase-2 hook (after which the
    /// instance is dropped and fully finalized).
    ///
    /// # Example
    ///
    /// ```rust
    /// use strata::{NativeKind, Runtime, TypeBuilder, Value};
    /// use strata::runtime::layout::FieldDescriptor;
    ///
    /// let rt = Runtime::default();
    /// let counter = rt
    ///     .register(
    ///         TypeBuilder::native("Counter")
    ///             .field(FieldDescriptor::native("count", NativeKind::I64).read_only())
    ///             .native_init(|ctx, args| {
    ///                 let start = args.first().cloned().unwrap_or(Value::Int(0));
    ///                 ctx.set("count", start)
    ///             }),
    ///     )
    ///     .unwrap();
    ///
    /// let c = rt.instantiate(&counter, &[Value::Int(5)]).unwrap();
    /// assert_eq!(c.get_attr("count").unwrap(), Value::Int(5));
    /// ```
    pub fn instantiate(&self, ty: &Type, args: &[Value]) -> Result<Object> {
        let obj = self.allocate(ty, args)?;
        self.reinitialize(&obj, args)?;
        Ok(obj)
    }

    /// Creates an instance running phase 1 only.
    ///
    /// Used where the general initializer must not run, e.g. when an
    /// instance is rebuilt from serialized state.
    ///
    /// # Errors
    ///
    /// Returns the first phase-1 error; completed levels are torn down.
    pub fn allocate(&self, ty: &Type, args: &[Value]) -> Result<Object> {
        let record = self.run_native_init(ty, args)?;

        let storage = if ty.has_dict {
            Storage::Extended {
                record,
                dict: ty.dict_fields.iter().map(|&f| (f, Value::Null)).collect(),
            }
        } else {
            Storage::Fixed(record)
        };

        let obj = Object::from_parts(Rc::clone(ty), storage);
        self.track(&obj);
        Ok(obj)
    }

    /// Runs phase 2 on a live instance. A type chain without an `init`
    /// hook is a no-op.
    ///
    /// # Errors
    ///
    /// Returns whatever the hook returns.
    pub fn reinitialize(&self, obj: &Object, args: &[Value]) -> Result<()> {
        let Some(init) = obj.ty().resolved_init().cloned() else {
            return Ok(());
        };
        trace!("phase 2 for {}", obj.type_name());
        init(self, obj, args)
    }

    fn run_native_init(&self, ty: &Type, args: &[Value]) -> Result<NativeRecord> {
        let mut record = ty.layout.allocate();

        for (completed, level) in ty.chain().into_iter().enumerate() {
            let Some(hook) = &level.hooks.native_init else {
                continue;
            };
            trace!("phase 1 for {} level of {}", level.name, ty.name);

            let mut ctx = InitContext {
                runtime: self,
                level,
                record: &mut record,
            };
            if let Err(err) = hook(&mut ctx, args) {
                debug!(
                    "construction of {} abandoned at {} level: {err}",
                    ty.name, level.name
                );
                finalize_levels(ty, &mut record, completed);
                return Err(err);
            }
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::RuntimeConfig;
    use crate::runtime::layout::{FieldDescriptor, NativeKind};
    use crate::runtime::types::TypeBuilder;
    use crate::{Error, Runtime, Value};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_buffer_limit_is_enforced() {
        let rt = Runtime::new(RuntimeConfig::new().with_max_buffer_len(8));
        let ty = rt
            .register(
                TypeBuilder::native("LcBig")
                    .field(FieldDescriptor::native("data", NativeKind::Buffer))
                    .native_init(|ctx, _| ctx.allocate_buffer("data", 9)),
            )
            .unwrap();

        let err = rt.instantiate(&ty, &[]).unwrap_err();
        assert!(matches!(err, Error::AllocationFailure { ref type_name, .. } if type_name == "LcBig"));
    }

    #[test]
    fn test_allocate_skips_phase_two() {
        let rt = Runtime::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (l1, l2) = (Rc::clone(&log), Rc::clone(&log));

        let ty = rt
            .register(
                TypeBuilder::native("LcPhases")
                    .native_init(move |_, _| {
                        l1.borrow_mut().push("native");
                        Ok(())
                    })
                    .init(move |_, _, _| {
                        l2.borrow_mut().push("init");
                        Ok(())
                    }),
            )
            .unwrap();

        let obj = rt.allocate(&ty, &[]).unwrap();
        assert_eq!(*log.borrow(), vec!["native"]);

        rt.reinitialize(&obj, &[]).unwrap();
        rt.reinitialize(&obj, &[]).unwrap();
        assert_eq!(*log.borrow(), vec!["native", "init", "init"]);
    }

    #[test]
    fn test_release_of_unallocated_buffer() {
        let rt = Runtime::default();
        let released = Rc::new(RefCell::new(None));
        let seen = Rc::clone(&released);

        let ty = rt
            .register(
                TypeBuilder::native("LcLazy")
                    .field(FieldDescriptor::native("data", NativeKind::Buffer))
                    .finalizer(move |ctx| {
                        *seen.borrow_mut() = Some(ctx.release_buffer("data"));
                    }),
            )
            .unwrap();

        drop(rt.instantiate(&ty, &[]).unwrap());
        assert_eq!(*released.borrow(), Some(Ok(false)));
    }

    #[test]
    fn test_dict_fields_start_null() {
        let rt = Runtime::default();
        rt.register(TypeBuilder::native("LcRoot")).unwrap();
        let ty = rt
            .register(
                TypeBuilder::dynamic("LcDyn")
                    .base("LcRoot")
                    .field(FieldDescriptor::dynamic("tag")),
            )
            .unwrap();

        let obj = rt.instantiate(&ty, &[]).unwrap();
        assert_eq!(obj.get_attr("tag").unwrap(), Value::Null);
        assert!(obj.has_dict());
    }
}
