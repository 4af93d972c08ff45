//! Typed bindings and native views.
//!
//! Native code holds instances through a [`NativeView`]: a handle typed by a
//! static type that gives direct access to every field of that type's
//! layout, private ones included. Views are produced by a checked cast
//! against a [`Binding`], or by the unchecked cast when the caller already
//! knows the concrete type.
//!
//! The null sentinel converts to a null view only through a nullable
//! binding. Any field access or call through a null view fails with
//! [`Error::NullReference`] and touches no state.

use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::runtime::dispatch::StaticSite;
use crate::runtime::layout::{FieldSlot, NativeBuffer};
use crate::runtime::object::Object;
use crate::runtime::symbol::Symbol;
use crate::runtime::types::Type;
use crate::runtime::value::Value;
use std::rc::Rc;

/// Declared type of a native variable, parameter or field.
#[derive(Debug, Clone)]
pub struct Binding {
    ty: Type,
    nullable: bool,
}

impl Binding {
    /// Binding that rejects the null sentinel.
    #[must_use]
    pub fn new(ty: &Type) -> Self {
        Binding {
            ty: Rc::clone(ty),
            nullable: false,
        }
    }

    /// Binding that admits the null sentinel.
    #[must_use]
    pub fn nullable(ty: &Type) -> Self {
        Binding {
            ty: Rc::clone(ty),
            nullable: true,
        }
    }

    /// Declared type.
    #[must_use]
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// Whether null is admissible.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Checked conversion of `value` to a view of the bound type.
    ///
    /// # Errors
    ///
    /// - [`Error::TypeMismatch`] if `value` is not an instance of the bound
    ///   type or one of its descendants.
    /// - [`Error::NullReference`] if `value` is null and the binding is not
    ///   nullable.
    /// - [`DefinitionError::DynamicStaticType`](crate::DefinitionError) if
    ///   the bound type is dynamic-only.
    pub fn bind(&self, value: &Value) -> Result<NativeView> {
        self.ty.require_static()?;
        match value {
            Value::Object(obj) if obj.is_instance_of(&self.ty) => Ok(NativeView {
                ty: Rc::clone(&self.ty),
                object: Some(obj.clone()),
            }),
            Value::Null if self.nullable => Ok(NativeView::null(&self.ty)),
            Value::Null => Err(Error::null_reference(format!(
                "assign null to non-null {} binding",
                self.ty.name
            ))),
            other => Err(Error::type_mismatch(self.ty.name.as_str(), other.type_name())),
        }
    }
}

/// Statically typed handle with direct record access.
#[derive(Debug, Clone)]
pub struct NativeView {
    ty: Type,
    object: Option<Object>,
}

impl NativeView {
    /// The null view of `ty`.
    #[must_use]
    pub fn null(ty: &Type) -> Self {
        NativeView {
            ty: Rc::clone(ty),
            object: None,
        }
    }

    /// Static type of the view.
    #[must_use]
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// Returns `true` for the null view.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.object.is_none()
    }

    /// Referenced instance, `None` for the null view.
    #[must_use]
    pub fn object(&self) -> Option<&Object> {
        self.object.as_ref()
    }

    /// Converts back to a host value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        self.object.clone().into()
    }

    fn target(&self, operation: impl FnOnce() -> String) -> Result<&Object> {
        self.object
            .as_ref()
            .ok_or_else(|| Error::null_reference(operation()))
    }

    /// Resolves `name` in the view's layout once, for repeated
    /// [`NativeView::read`]/[`NativeView::write`] calls.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchAttribute`] if the static type has no such
    /// native field.
    pub fn field(&self, name: &str) -> Result<FieldSlot> {
        Symbol::lookup(name)
            .and_then(|sym| self.ty.layout.slot(sym))
            .cloned()
            .ok_or_else(|| Error::NoSuchAttribute {
                type_name: self.ty.name.to_string(),
                name: name.to_string(),
            })
    }

    /// Reads a resolved slot.
    ///
    /// # Errors
    ///
    /// [`Error::NullReference`] through the null view, otherwise as
    /// [`NativeRecord::read`](crate::runtime::layout::NativeRecord::read).
    pub fn read(&self, slot: &FieldSlot) -> Result<Value> {
        let obj = self.target(|| format!("read field '{}' of null", slot.name))?;
        obj.storage("read field")?.record().read(slot)
    }

    /// Writes a resolved slot.
    ///
    /// # Errors
    ///
    /// [`Error::NullReference`] through the null view, otherwise as
    /// [`NativeRecord::write`](crate::runtime::layout::NativeRecord::write).
    pub fn write(&self, slot: &FieldSlot, value: Value) -> Result<()> {
        let obj = self.target(|| format!("write field '{}' of null", slot.name))?;
        obj.storage_mut("write field")?.record_mut().write(slot, value)
    }

    /// Reads a native field by name, regardless of visibility.
    ///
    /// # Errors
    ///
    /// [`Error::NullReference`] through the null view (checked before name
    /// resolution), [`Error::NoSuchAttribute`] for unknown fields.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.target(|| format!("read field '{name}' of null"))?;
        self.read(&self.field(name)?)
    }

    /// Writes a native field by name, regardless of visibility.
    ///
    /// # Errors
    ///
    /// As [`NativeView::get`], plus slot write errors.
    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        self.target(|| format!("write field '{name}' of null"))?;
        self.write(&self.field(name)?, value)
    }

    /// Runs `f` with mutable access to a native buffer.
    ///
    /// # Errors
    ///
    /// - [`Error::NullReference`] through the null view, or if the buffer
    ///   was never allocated.
    /// - [`Error::AlreadyBorrowed`] if the instance is borrowed elsewhere.
    pub fn with_buffer<R>(&self, name: &str, f: impl FnOnce(&mut NativeBuffer) -> R) -> Result<R> {
        let obj = self.target(|| format!("access buffer '{name}' of null"))?;
        let slot = self.field(name)?;
        let mut storage = obj.storage_mut("access buffer")?;
        let buffer = storage
            .record_mut()
            .buffer_mut(&slot)?
            .ok_or_else(|| Error::null_reference(format!("access unallocated buffer '{name}'")))?;
        Ok(f(buffer))
    }

    /// Invokes a static call site on this view.
    ///
    /// # Errors
    ///
    /// See [`StaticSite::invoke`].
    pub fn call(&self, runtime: &Runtime, site: &StaticSite, args: &[Value]) -> Result<Value> {
        site.invoke(runtime, self, args)
    }

    /// Re-types the view as an ancestor of its static type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if `ty` is not an ancestor.
    pub fn upcast(&self, ty: &Type) -> Result<NativeView> {
        ty.require_static()?;
        if !self.ty.is_subtype_of(ty) {
            return Err(Error::type_mismatch(ty.name.as_str(), self.ty.name.as_str()));
        }
        Ok(NativeView {
            ty: Rc::clone(ty),
            object: self.object.clone(),
        })
    }
}

impl Object {
    /// View of this instance typed by the most-derived native-backed type
    /// on its chain.
    ///
    /// Method bodies use this to reach their own record without naming a
    /// type, whatever dynamic-only wrapper the receiver was created as.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the chain has no native-backed
    /// level, which registration never allows.
    pub fn native_view(&self) -> Result<NativeView> {
        let ty = std::iter::successors(Some(self.ty()), |t| t.base.as_ref())
            .find(|t| t.is_native())
            .ok_or_else(|| Error::type_mismatch("native-backed type", self.type_name()))?;
        Ok(NativeView {
            ty: Rc::clone(ty),
            object: Some(self.clone()),
        })
    }
}

impl Runtime {
    /// Checked cast of `value` to `binding`.
    ///
    /// # Errors
    ///
    /// See [`Binding::bind`].
    pub fn cast(&self, value: &Value, binding: &Binding) -> Result<NativeView> {
        binding.bind(value)
    }
}

/// Unchecked cast of `value` to a view of `ty`.
///
/// Non-object values become the null view.
///
/// # Safety
///
/// The caller guarantees that `ty` is native-backed and that `value` is
/// null or an instance of `ty` (or a descendant). Violating this lets field slots of `ty` address a record
/// with a different layout. Debug builds assert the guarantee.
#[must_use]
pub unsafe fn cast_unchecked(value: &Value, ty: &Type) -> NativeView {
    let object = value.as_object().cloned();
    debug_assert!(ty.is_native(), "unchecked cast to dynamic-only {}", ty.name);
    debug_assert!(
        object.as_ref().is_none_or(|obj| obj.is_instance_of(ty)),
        "unchecked cast to {} of a {} value",
        ty.name,
        value.type_name()
    );
    NativeView {
        ty: Rc::clone(ty),
        object,
    }
}
