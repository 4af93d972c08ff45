//! Reference-counted instances.
//!
//! An [`Object`] is a cheap, clonable handle. Cloning increments the
//! reference count and dropping decrements it; when the last handle goes
//! away the native finalizers of every level run, most-derived first.
//!
//! # Storage
//!
//! Every instance owns exactly one [`NativeRecord`] laid out by its type.
//! Instances of types whose chain includes a dynamic-only level (or that
//! declare dictionary attributes) additionally carry an auxiliary attribute
//! store. The choice is made once, at construction.
//!
//! # Host attribute protocol
//!
//! [`Object::get_attr`] and [`Object::set_attr`] model generic host
//! attribute access:
//!
//! 1. a generated accessor (public or read-only native field) wins;
//! 2. otherwise the auxiliary store is consulted, if present;
//! 3. otherwise the lookup fails with [`Error::NoSuchAttribute`].
//!
//! Private native fields are never reachable this way.

use crate::error::{Error, Result};
use crate::runtime::layout::{Access, NativeRecord};
use crate::runtime::lifecycle;
use crate::runtime::symbol::Symbol;
use crate::runtime::types::{Type, TypeDescriptor};
use crate::runtime::value::Value;
use fxhash::FxHashMap;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

pub(crate) enum Storage {
    Fixed(NativeRecord),
    Extended {
        record: NativeRecord,
        dict: FxHashMap<Symbol, Value>,
    },
}

impl Storage {
    pub(crate) fn record(&self) -> &NativeRecord {
        match self {
            Storage::Fixed(record) | Storage::Extended { record, .. } => record,
        }
    }

    pub(crate) fn record_mut(&mut self) -> &mut NativeRecord {
        match self {
            Storage::Fixed(record) | Storage::Extended { record, .. } => record,
        }
    }

    pub(crate) fn dict(&self) -> Option<&FxHashMap<Symbol, Value>> {
        match self {
            Storage::Fixed(_) => None,
            Storage::Extended { dict, .. } => Some(dict),
        }
    }

    pub(crate) fn dict_mut(&mut self) -> Option<&mut FxHashMap<Symbol, Value>> {
        match self {
            Storage::Fixed(_) => None,
            Storage::Extended { dict, .. } => Some(dict),
        }
    }
}

pub(crate) struct ObjectInner {
    pub(crate) ty: Type,
    pub(crate) storage: RefCell<Storage>,
    pub(crate) finalized: Cell<bool>,
}

impl ObjectInner {
    /// Runs the finalizers of every level once.
    pub(crate) fn finalize(&self, storage: &mut Storage) -> bool {
        if self.finalized.replace(true) {
            return false;
        }
        let levels = self.ty.depth + 1;
        lifecycle::finalize_levels(&self.ty, storage.record_mut(), levels);
        true
    }
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        if self.finalized.replace(true) {
            return;
        }
        let levels = self.ty.depth + 1;
        lifecycle::finalize_levels(&self.ty, self.storage.get_mut().record_mut(), levels);
    }
}

/// Handle to a runtime instance.
#[derive(Clone)]
pub struct Object(pub(crate) Rc<ObjectInner>);

impl Object {
    pub(crate) fn from_parts(ty: Type, storage: Storage) -> Self {
        Object(Rc::new(ObjectInner {
            ty,
            storage: RefCell::new(storage),
            finalized: Cell::new(false),
        }))
    }

    /// Concrete type of the instance.
    #[must_use]
    pub fn ty(&self) -> &Type {
        &self.0.ty
    }

    /// Name of the concrete type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.0.ty.name.as_str()
    }

    /// Current number of strong handles.
    #[must_use]
    pub fn refcount(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Stable identity of the instance for its lifetime.
    #[must_use]
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Identity comparison.
    #[must_use]
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Returns `true` if the instance's type is `ty` or a descendant.
    #[must_use]
    pub fn is_instance_of(&self, ty: &TypeDescriptor) -> bool {
        self.0.ty.is_subtype_of(ty)
    }

    /// Returns `true` if the instance carries an auxiliary attribute store.
    #[must_use]
    pub fn has_dict(&self) -> bool {
        self.0.ty.has_dict
    }

    /// Creates a non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakObject {
        WeakObject(Rc::downgrade(&self.0))
    }

    pub(crate) fn storage(&self, operation: &'static str) -> Result<Ref<'_, Storage>> {
        self.0
            .storage
            .try_borrow()
            .map_err(|_| self.already_borrowed(operation))
    }

    pub(crate) fn storage_mut(&self, operation: &'static str) -> Result<RefMut<'_, Storage>> {
        self.0
            .storage
            .try_borrow_mut()
            .map_err(|_| self.already_borrowed(operation))
    }

    fn already_borrowed(&self, operation: &'static str) -> Error {
        Error::AlreadyBorrowed {
            type_name: self.type_name().to_string(),
            operation,
        }
    }

    fn no_such_attribute(&self, name: &str) -> Error {
        Error::NoSuchAttribute {
            type_name: self.type_name().to_string(),
            name: name.to_string(),
        }
    }

    /// Generic host attribute read.
    ///
    /// # Errors
    ///
    /// - [`Error::NoSuchAttribute`] if neither an accessor nor the auxiliary
    ///   store provides `name` (private native fields included).
    /// - [`Error::TypeMismatch`] if the accessor targets a buffer field.
    pub fn get_attr(&self, name: &str) -> Result<Value> {
        let storage = self.storage("get attribute")?;
        let Some(sym) = Symbol::lookup(name) else {
            return Err(self.no_such_attribute(name));
        };

        if let Some((slot, _)) = self.0.ty.layout.accessor(sym) {
            return storage.record().read(slot);
        }
        storage
            .dict()
            .and_then(|dict| dict.get(&sym))
            .cloned()
            .ok_or_else(|| self.no_such_attribute(name))
    }

    /// Generic host attribute write.
    ///
    /// # Errors
    ///
    /// - [`Error::ReadOnlyAttribute`] for read-only accessors.
    /// - [`Error::NoSuchAttribute`] if the type has neither an accessor nor
    ///   an auxiliary store.
    /// - Any slot error from [`NativeRecord::write`].
    pub fn set_attr(&self, name: &str, value: Value) -> Result<()> {
        let mut storage = self.storage_mut("set attribute")?;
        let accessor = Symbol::lookup(name).and_then(|sym| self.0.ty.layout.accessor(sym));

        if let Some((slot, access)) = accessor {
            return match access {
                Access::ReadWrite => storage.record_mut().write(slot, value),
                Access::ReadOnly => Err(Error::ReadOnlyAttribute {
                    type_name: self.type_name().to_string(),
                    name: name.to_string(),
                }),
            };
        }

        let dict = storage.dict_mut().ok_or_else(|| self.no_such_attribute(name))?;
        // Release the displaced value after the borrow ends; its finalizers
        // may run.
        let old = dict.insert(Symbol::intern(name), value);
        drop(storage);
        drop(old);
        Ok(())
    }

    /// Names held in the auxiliary store, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyBorrowed`] while a native borrow is live.
    pub fn dict_keys(&self) -> Result<Vec<Symbol>> {
        let storage = self.storage("list attributes")?;
        let mut keys: Vec<Symbol> = storage
            .dict()
            .map(|d| d.keys().copied().collect())
            .unwrap_or_default();
        keys.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(keys)
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} object at {:#x}>", self.type_name(), self.id())
    }
}

/// Non-owning instance handle.
#[derive(Clone)]
pub struct WeakObject(pub(crate) Weak<ObjectInner>);

impl WeakObject {
    /// Returns a strong handle if the instance is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Object> {
        self.0.upgrade().map(Object)
    }

    /// Returns `true` if the instance has not been reclaimed.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakObject(alive: {})", self.is_alive())
    }
}
