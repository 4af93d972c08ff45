//! Type descriptors, the type builder and the per-runtime registry.
//!
//! A type is declared with a [`TypeBuilder`] and becomes a shared,
//! immutable [`Type`] once [`Runtime::register`](crate::Runtime::register)
//! accepts it. Registration flattens everything a descendant needs to know:
//! the merged [`Layout`], the [`MethodTable`] with overrides in place, and
//! the inherited special protocol slots.
//!
//! # Example
//!
//! ```rust
//! use strata::{NativeKind, Runtime, TypeBuilder, Value};
//! use strata::runtime::layout::FieldDescriptor;
//!
//! let rt = Runtime::default();
//! let point = rt
//!     .register(
//!         TypeBuilder::native("Point")
//!             .field(FieldDescriptor::native("x", NativeKind::F64).public())
//!             .field(FieldDescriptor::native("y", NativeKind::F64).public()),
//!     )
//!     .unwrap();
//!
//! let p = rt.instantiate(&point, &[]).unwrap();
//! p.set_attr("x", Value::Float(1.5)).unwrap();
//! assert_eq!(p.get_attr("x").unwrap(), Value::Float(1.5));
//! ```

use crate::error::{DefinitionError, Result};
use crate::runtime::Runtime;
use crate::runtime::layout::{FieldDescriptor, Layout, StorageKind};
use crate::runtime::lifecycle::{FinalizeContext, InitContext, Lifecycle};
use crate::runtime::method::{MethodDef, MethodTable, Signature, Tier};
use crate::runtime::object::Object;
use crate::runtime::special::{CompareOp, SpecialSlots, Step};
use crate::runtime::symbol::Symbol;
use crate::runtime::value::Value;
use fxhash::FxHashMap;
use std::fmt;
use std::rc::Rc;

/// Whether a type owns native-record storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Native-backed: may declare native fields, hooks and any method tier.
    Native,
    /// Dynamic-only wrapper over a native-backed base.
    Dynamic,
}

/// Shared handle to a registered type.
pub type Type = Rc<TypeDescriptor>;

/// A registered, immutable type.
pub struct TypeDescriptor {
    pub(crate) name: Symbol,
    pub(crate) base: Option<Type>,
    pub(crate) kind: TypeKind,
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) dict_fields: Vec<Symbol>,
    pub(crate) layout: Layout,
    pub(crate) methods: MethodTable,
    pub(crate) hooks: Lifecycle,
    pub(crate) slots: SpecialSlots,
    pub(crate) depth: usize,
    pub(crate) has_dict: bool,
}

impl TypeDescriptor {
    /// Type name.
    #[must_use]
    pub fn name(&self) -> Symbol {
        self.name
    }

    /// Direct base, if any.
    #[must_use]
    pub fn base(&self) -> Option<&Type> {
        self.base.as_ref()
    }

    /// Native-backed or dynamic-only.
    #[must_use]
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Returns `true` for native-backed types.
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.kind == TypeKind::Native
    }

    /// Fields declared at this level only.
    #[must_use]
    pub fn own_fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Merged native layout, base slots first.
    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Flattened method table.
    #[must_use]
    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }

    /// Distance from the root of the chain (0 for a root type).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns `true` if instances carry an auxiliary attribute store.
    #[must_use]
    pub fn has_dict(&self) -> bool {
        self.has_dict
    }

    /// Declared dictionary attributes along the whole chain.
    #[must_use]
    pub fn dict_fields(&self) -> &[Symbol] {
        &self.dict_fields
    }

    /// Iterates from this type up to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = &TypeDescriptor> {
        std::iter::successors(Some(self), |t| t.base.as_deref())
    }

    /// Chain from the root down to this type.
    #[must_use]
    pub fn chain(&self) -> Vec<&TypeDescriptor> {
        let mut chain: Vec<_> = self.ancestors().collect();
        chain.reverse();
        chain
    }

    /// Returns `true` if `self` is `other` or one of its descendants.
    #[must_use]
    pub fn is_subtype_of(&self, other: &TypeDescriptor) -> bool {
        self.ancestors().any(|t| std::ptr::eq(t, other))
    }

    /// Name-based variant of [`TypeDescriptor::is_subtype_of`].
    #[must_use]
    pub fn is_subtype_named(&self, name: Symbol) -> bool {
        self.ancestors().any(|t| t.name == name)
    }

    /// Nearest native-backed type on the chain (itself for native types).
    #[must_use]
    pub fn native_base(&self) -> Option<&TypeDescriptor> {
        self.ancestors().find(|t| t.is_native())
    }

    /// Checks that this type can be the static type of a native view or a
    /// direct call site. Dynamic-only types cannot: their ancestors' private
    /// fields and native-only methods stay out of reach.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::DynamicStaticType`] naming the nearest
    /// native-backed ancestor.
    pub(crate) fn require_static(&self) -> Result<()> {
        if self.is_native() {
            return Ok(());
        }
        Err(DefinitionError::DynamicStaticType {
            type_name: self.name.to_string(),
            native_base: self
                .native_base()
                .map_or_else(String::new, |b| b.name.to_string()),
        }
        .into())
    }

    /// Most-derived general initializer on the chain.
    pub(crate) fn resolved_init(&self) -> Option<&crate::runtime::lifecycle::GeneralInit> {
        self.ancestors().find_map(|t| t.hooks.init.as_ref())
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("base", &self.base.as_ref().map(|b| b.name))
            .field("kind", &self.kind)
            .field("depth", &self.depth)
            .field("has_dict", &self.has_dict)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Declarative description of a type, consumed by registration.
///
/// Builder methods take `self` by value so declarations chain.
pub struct TypeBuilder {
    pub(crate) name: Symbol,
    pub(crate) kind: TypeKind,
    pub(crate) bases: Vec<Symbol>,
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) methods: Vec<MethodDef>,
    pub(crate) hooks: Lifecycle,
    pub(crate) slots: SpecialSlots,
}

impl TypeBuilder {
    fn new(name: &str, kind: TypeKind) -> Self {
        TypeBuilder {
            name: Symbol::intern(name),
            kind,
            bases: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            hooks: Lifecycle::default(),
            slots: SpecialSlots::default(),
        }
    }

    /// Starts a native-backed type.
    #[must_use]
    pub fn native(name: &str) -> Self {
        Self::new(name, TypeKind::Native)
    }

    /// Starts a dynamic-only type. A base must be given before registration.
    #[must_use]
    pub fn dynamic(name: &str) -> Self {
        Self::new(name, TypeKind::Dynamic)
    }

    /// Declares a base by name. More than one base is rejected at
    /// registration.
    #[must_use]
    pub fn base(mut self, name: &str) -> Self {
        self.bases.push(Symbol::intern(name));
        self
    }

    /// Declares a field.
    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Declares a method.
    #[must_use]
    pub fn method(mut self, def: MethodDef) -> Self {
        self.methods.push(def);
        self
    }

    /// Declares a host-visible method.
    #[must_use]
    pub fn host_method<F>(self, name: &str, signature: Signature, imp: F) -> Self
    where
        F: Fn(&Runtime, &Object, &[Value]) -> Result<Value> + 'static,
    {
        self.method(MethodDef::new(name, Tier::HostVisible, signature, imp))
    }

    /// Declares a hybrid method.
    #[must_use]
    pub fn hybrid_method<F>(self, name: &str, signature: Signature, imp: F) -> Self
    where
        F: Fn(&Runtime, &Object, &[Value]) -> Result<Value> + 'static,
    {
        self.method(MethodDef::new(name, Tier::Hybrid, signature, imp))
    }

    /// Declares a native-only method.
    #[must_use]
    pub fn native_method<F>(self, name: &str, signature: Signature, imp: F) -> Self
    where
        F: Fn(&Runtime, &Object, &[Value]) -> Result<Value> + 'static,
    {
        self.method(MethodDef::new(name, Tier::NativeOnly, signature, imp))
    }

    /// Sets the phase-1 native initializer of this level.
    #[must_use]
    pub fn native_init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut InitContext<'_>, &[Value]) -> Result<()> + 'static,
    {
        self.hooks.native_init = Some(Rc::new(hook));
        self
    }

    /// Sets the phase-2 general initializer.
    #[must_use]
    pub fn init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Runtime, &Object, &[Value]) -> Result<()> + 'static,
    {
        self.hooks.init = Some(Rc::new(hook));
        self
    }

    /// Sets the native finalizer of this level.
    #[must_use]
    pub fn finalizer<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut FinalizeContext<'_>) + 'static,
    {
        self.hooks.finalizer = Some(Rc::new(hook));
        self
    }

    /// Sets the rich comparison slot.
    #[must_use]
    pub fn compare<F>(mut self, slot: F) -> Self
    where
        F: Fn(&Runtime, &Value, &Value, CompareOp) -> Result<Value> + 'static,
    {
        self.slots.compare = Some(Rc::new(slot));
        self
    }

    /// Sets the addition slot.
    #[must_use]
    pub fn add<F>(mut self, slot: F) -> Self
    where
        F: Fn(&Runtime, &Value, &Value) -> Result<Value> + 'static,
    {
        self.slots.add = Some(Rc::new(slot));
        self
    }

    /// Sets the multiplication slot.
    #[must_use]
    pub fn multiply<F>(mut self, slot: F) -> Self
    where
        F: Fn(&Runtime, &Value, &Value) -> Result<Value> + 'static,
    {
        self.slots.multiply = Some(Rc::new(slot));
        self
    }

    /// Sets the iterator-producing slot.
    #[must_use]
    pub fn iter<F>(mut self, slot: F) -> Self
    where
        F: Fn(&Runtime, &Object) -> Result<Value> + 'static,
    {
        self.slots.iter = Some(Rc::new(slot));
        self
    }

    /// Sets the next-item slot.
    #[must_use]
    pub fn next<F>(mut self, slot: F) -> Self
    where
        F: Fn(&Runtime, &Object) -> Result<Step> + 'static,
    {
        self.slots.next = Some(Rc::new(slot));
        self
    }

    pub(crate) fn native_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields
            .iter()
            .filter(|f| f.storage == StorageKind::NativeRecord)
    }
}

impl fmt::Debug for TypeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeBuilder")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("bases", &self.bases)
            .field("fields", &self.fields.len())
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Registered types of one runtime.
#[derive(Default)]
pub struct TypeRegistry {
    types: FxHashMap<Symbol, Type>,
    order: Vec<Type>,
    subclasses: FxHashMap<Symbol, Vec<Type>>,
}

impl TypeRegistry {
    /// Looks up a type by name.
    #[must_use]
    pub fn get(&self, name: Symbol) -> Option<&Type> {
        self.types.get(&name)
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: Symbol) -> bool {
        self.types.contains_key(&name)
    }

    pub(crate) fn insert(&mut self, ty: Type) {
        if let Some(base) = &ty.base {
            self.subclasses
                .entry(base.name)
                .or_default()
                .push(Rc::clone(&ty));
        }
        self.types.insert(ty.name, Rc::clone(&ty));
        self.order.push(ty);
    }

    /// Direct subclasses of `name`, in registration order.
    #[must_use]
    pub fn subclasses(&self, name: Symbol) -> &[Type] {
        self.subclasses.get(&name).map_or(&[], Vec::as_slice)
    }

    /// All types in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Type> {
        self.order.iter()
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.order.iter().map(|t| t.name))
            .finish()
    }
}
