//! Call-site binding and method dispatch.
//!
//! Two call-site kinds exist:
//!
//! - [`StaticSite`]: bound against a known static type. If the name has a
//!   direct slot (`Hybrid` or `NativeOnly`), the site records the slot index
//!   and every call indexes the receiver's slot table; no name lookup and
//!   no reflective argument validation happen.
//! - [`DynamicSite`]: bound by name only. Every call looks the name up in
//!   the receiver type's host table and validates the arguments against the
//!   entry's signature. `NativeOnly` entries are never found this way.
//!
//! Host code binds through [`Runtime::bind_host`], which rejects names that
//! only exist natively at bind time.
//!
//! # Performance
//!
//! A direct call is one bounds-checked vector index plus the argument count
//! and null checks. A generic call adds an interned-name hash lookup and a
//! full signature check.

use crate::error::{DefinitionError, Error, Result};
use crate::runtime::Runtime;
use crate::runtime::cast::NativeView;
use crate::runtime::method::{MethodEntry, Tier};
use crate::runtime::object::Object;
use crate::runtime::symbol::Symbol;
use crate::runtime::types::Type;
use crate::runtime::value::Value;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Direct { slot: usize, tier: Tier },
    Generic,
}

/// Call site bound against a static type.
#[derive(Debug, Clone)]
pub struct StaticSite {
    ty: Type,
    name: Symbol,
    target: Target,
}

impl StaticSite {
    /// Static type the site was bound against.
    #[must_use]
    pub fn static_type(&self) -> &Type {
        &self.ty
    }

    /// Method name.
    #[must_use]
    pub fn name(&self) -> Symbol {
        self.name
    }

    /// Slot index if the site dispatches directly.
    #[must_use]
    pub fn direct_slot(&self) -> Option<usize> {
        match self.target {
            Target::Direct { slot, .. } => Some(slot),
            Target::Generic => None,
        }
    }

    /// Tier of the bound entry if the site dispatches directly.
    #[must_use]
    pub fn tier(&self) -> Option<Tier> {
        match self.target {
            Target::Direct { tier, .. } => Some(tier),
            Target::Generic => None,
        }
    }

    /// Invokes the method on `receiver`.
    ///
    /// # Errors
    ///
    /// - [`Error::NullReference`] if `receiver` is the null view.
    /// - [`Error::TypeMismatch`] if the receiver is not an instance of the
    ///   site's static type.
    /// - [`Error::ArgumentCount`], [`Error::NullReference`] for argument
    ///   problems, plus anything the method itself returns.
    pub fn invoke(&self, runtime: &Runtime, receiver: &NativeView, args: &[Value]) -> Result<Value> {
        let obj = receiver.object().ok_or_else(|| {
            Error::null_reference(format!("call method '{}' on null", self.name))
        })?;
        self.invoke_object(runtime, obj, args)
    }

    pub(crate) fn invoke_object(&self, runtime: &Runtime, obj: &Object, args: &[Value]) -> Result<Value> {
        let ty = obj.ty();
        if !ty.is_subtype_of(&self.ty) {
            return Err(Error::type_mismatch(self.ty.name.as_str(), obj.type_name()));
        }

        match self.target {
            Target::Direct { slot, .. } => {
                let entry = ty.methods.slot(slot).ok_or_else(|| self.no_such_method(obj))?;
                entry.invoke_direct(runtime, obj, args)
            }
            Target::Generic => generic_entry(obj, self.name)?.invoke_generic(runtime, obj, args),
        }
    }

    fn no_such_method(&self, obj: &Object) -> Error {
        Error::NoSuchMethod {
            type_name: obj.type_name().to_string(),
            name: self.name.to_string(),
        }
    }
}

/// Call site bound by name only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicSite {
    name: Symbol,
}

impl DynamicSite {
    /// Method name.
    #[must_use]
    pub fn name(&self) -> Symbol {
        self.name
    }

    /// Invokes the method on `receiver` through the generic path.
    ///
    /// # Errors
    ///
    /// See [`Runtime::call_method`].
    pub fn invoke(&self, runtime: &Runtime, receiver: &Value, args: &[Value]) -> Result<Value> {
        runtime.call_symbol(receiver, self.name, args)
    }
}

/// Either call-site kind.
#[derive(Debug, Clone)]
pub enum CallSite {
    /// Bound against a static type.
    Static(StaticSite),
    /// Bound by name.
    Dynamic(DynamicSite),
}

impl CallSite {
    /// Invokes the site on a host value.
    ///
    /// # Errors
    ///
    /// As for the underlying site; a non-object receiver of a static site
    /// is a [`Error::TypeMismatch`].
    pub fn invoke(&self, runtime: &Runtime, receiver: &Value, args: &[Value]) -> Result<Value> {
        match self {
            CallSite::Static(site) => match receiver {
                Value::Object(obj) => site.invoke_object(runtime, obj, args),
                Value::Null => Err(Error::null_reference(format!(
                    "call method '{}' on null",
                    site.name
                ))),
                other => Err(Error::type_mismatch(site.ty.name.as_str(), other.type_name())),
            },
            CallSite::Dynamic(site) => site.invoke(runtime, receiver, args),
        }
    }
}

impl From<StaticSite> for CallSite {
    fn from(site: StaticSite) -> Self {
        CallSite::Static(site)
    }
}

impl From<DynamicSite> for CallSite {
    fn from(site: DynamicSite) -> Self {
        CallSite::Dynamic(site)
    }
}

fn generic_entry(obj: &Object, name: Symbol) -> Result<Rc<MethodEntry>> {
    obj.ty()
        .methods
        .host_entry(name)
        .cloned()
        .ok_or_else(|| Error::NoSuchMethod {
            type_name: obj.type_name().to_string(),
            name: name.to_string(),
        })
}

impl Runtime {
    /// Binds a call site against a known static type.
    ///
    /// Names with a direct slot bind directly; host-visible names bind to
    /// the generic path.
    ///
    /// # Errors
    ///
    /// - [`DefinitionError::DynamicStaticType`] if `ty` is dynamic-only;
    ///   bind against its native base instead.
    /// - [`Error::NoSuchMethod`] if `ty` has no entry for `name`.
    pub fn bind_static(&self, ty: &Type, name: &str) -> Result<StaticSite> {
        ty.require_static()?;
        let sym = Symbol::intern(name);
        let target = if let Some(slot) = ty.methods.direct_slot(sym) {
            let tier = ty
                .methods
                .slot(slot)
                .map_or(Tier::NativeOnly, |entry| entry.tier());
            Target::Direct { slot, tier }
        } else if ty.methods.host_entry(sym).is_some() {
            Target::Generic
        } else {
            return Err(Error::NoSuchMethod {
                type_name: ty.name.to_string(),
                name: name.to_string(),
            });
        };

        Ok(StaticSite {
            ty: Rc::clone(ty),
            name: sym,
            target,
        })
    }

    /// Binds a generic call site.
    #[must_use]
    pub fn bind_dynamic(&self, name: &str) -> DynamicSite {
        DynamicSite {
            name: Symbol::intern(name),
        }
    }

    /// Binds a host call site against a static type, validating that the
    /// target is reachable from host code.
    ///
    /// # Errors
    ///
    /// - [`DefinitionError::NativeOnlyFromHost`] if `name` resolves only to
    ///   a native-only entry.
    /// - [`Error::NoSuchMethod`] if `ty` has no entry for `name`.
    pub fn bind_host(&self, ty: &Type, name: &str) -> Result<DynamicSite> {
        let sym = Symbol::intern(name);
        if ty.methods.host_entry(sym).is_some() {
            return Ok(DynamicSite { name: sym });
        }
        if ty.methods.direct_slot(sym).is_some() {
            return Err(DefinitionError::NativeOnlyFromHost {
                type_name: ty.name.to_string(),
                method: name.to_string(),
            }
            .into());
        }
        Err(Error::NoSuchMethod {
            type_name: ty.name.to_string(),
            name: name.to_string(),
        })
    }

    /// Generic host method call.
    ///
    /// # Errors
    ///
    /// - [`Error::NullReference`] if `receiver` is the null sentinel.
    /// - [`Error::NoSuchMethod`] if no host-visible entry exists (native-only
    ///   methods are invisible here).
    /// - Signature errors and anything the method returns.
    pub fn call_method(&self, receiver: &Value, name: &str, args: &[Value]) -> Result<Value> {
        match Symbol::lookup(name) {
            Some(sym) => self.call_symbol(receiver, sym, args),
            None if receiver.is_null() => {
                Err(Error::null_reference(format!("call method '{name}' on null")))
            }
            // A name nobody ever interned has no method anywhere.
            None => Err(Error::NoSuchMethod {
                type_name: receiver.type_name().to_string(),
                name: name.to_string(),
            }),
        }
    }

    pub(crate) fn call_symbol(&self, receiver: &Value, name: Symbol, args: &[Value]) -> Result<Value> {
        match receiver {
            Value::Object(obj) => generic_entry(obj, name)?.invoke_generic(self, obj, args),
            Value::Null => Err(Error::null_reference(format!("call method '{name}' on null"))),
            other => Err(Error::NoSuchMethod {
                type_name: other.type_name().to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// Generic host attribute read on any value.
    ///
    /// # Errors
    ///
    /// [`Error::NullReference`] for the null sentinel,
    /// [`Error::NoSuchAttribute`] for scalars, otherwise as
    /// [`Object::get_attr`].
    pub fn get_attr(&self, target: &Value, name: &str) -> Result<Value> {
        match target {
            Value::Object(obj) => obj.get_attr(name),
            Value::Null => Err(Error::null_reference(format!("read attribute '{name}' of null"))),
            other => Err(Error::NoSuchAttribute {
                type_name: other.type_name().to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// Generic host attribute write on any value.
    ///
    /// # Errors
    ///
    /// As [`Runtime::get_attr`], plus the errors of [`Object::set_attr`].
    pub fn set_attr(&self, target: &Value, name: &str, value: Value) -> Result<()> {
        match target {
            Value::Object(obj) => obj.set_attr(name, value),
            Value::Null => Err(Error::null_reference(format!("write attribute '{name}' of null"))),
            other => Err(Error::NoSuchAttribute {
                type_name: other.type_name().to_string(),
                name: name.to_string(),
            }),
        }
    }
}
