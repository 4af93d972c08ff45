//! Runtime introspection APIs.
//!
//! Read-only queries over the types registered with a [`Runtime`]:
//!
//! - **Type enumeration** - list all types, find by name
//! - **Hierarchy** - inheritance chains, direct subclasses with their kind
//! - **Method enumeration** - flattened entries and which type provides one
//! - **Layout** - human-readable native layout dumps
//!
//! # Example
//!
//! ```rust
//! use strata::{Runtime, TypeBuilder};
//!
//! let rt = Runtime::default();
//! let shape = rt.register(TypeBuilder::native("Shape")).unwrap();
//! let square = rt
//!     .register(TypeBuilder::dynamic("Square").base("Shape"))
//!     .unwrap();
//!
//! assert!(rt.is_subclass(&square, &shape));
//! let subs = rt.subclasses(&shape);
//! assert_eq!(subs.len(), 1);
//! assert!(!subs[0].native_backed);
//! ```

use crate::runtime::Runtime;
use crate::runtime::method::{MethodEntry, Tier};
use crate::runtime::symbol::Symbol;
use crate::runtime::types::Type;
use std::rc::Rc;

/// A direct subclass as recorded by the registry.
#[derive(Debug, Clone)]
pub struct SubclassInfo {
    /// The subclass.
    pub ty: Type,
    /// `true` for native-backed subclasses, `false` for dynamic-only
    /// wrappers.
    pub native_backed: bool,
}

/// Where a method name resolves for a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodProvider {
    /// Type whose implementation answers host calls, if any.
    pub host: Option<Symbol>,
    /// Type whose implementation answers direct calls, if any.
    pub direct: Option<Symbol>,
}

// ============================================================================
// Type Enumeration
// ============================================================================

impl Runtime {
    /// Enumerate all registered types, in registration order.
    ///
    /// # Returns
    ///
    /// A vector of shared type handles.
    #[must_use]
    pub fn all_types(&self) -> Vec<Type> {
        self.registry.borrow().iter().cloned().collect()
    }

    /// Get the inheritance chain of a type.
    ///
    /// # Arguments
    ///
    /// * `ty` - The type to walk from
    ///
    /// # Returns
    ///
    /// Types from `ty` up to its root, `ty` first.
    #[must_use]
    pub fn class_hierarchy(&self, ty: &Type) -> Vec<Type> {
        std::iter::successors(Some(Rc::clone(ty)), |t| t.base.clone()).collect()
    }

    /// Check if `child` is `parent` or derives from it.
    ///
    /// # Arguments
    ///
    /// * `child` - The potential subclass
    /// * `parent` - The potential ancestor
    #[must_use]
    pub fn is_subclass(&self, child: &Type, parent: &Type) -> bool {
        child.is_subtype_of(parent)
    }

    /// List the direct subclasses of `parent`.
    ///
    /// # Returns
    ///
    /// One entry per direct subclass, in registration order, flagged as
    /// native-backed or dynamic-only.
    #[must_use]
    pub fn subclasses(&self, parent: &Type) -> Vec<SubclassInfo> {
        self.registry
            .borrow()
            .subclasses(parent.name)
            .iter()
            .map(|ty| SubclassInfo {
                ty: Rc::clone(ty),
                native_backed: ty.is_native(),
            })
            .collect()
    }
}

// ============================================================================
// Method Introspection
// ============================================================================

impl Runtime {
    /// Enumerate the methods of a type, inherited ones included.
    ///
    /// Direct-slot entries come first in slot order, followed by host-only
    /// entries sorted by name. Each name appears once per table it lives in:
    /// a host method shadowing a native-only one is listed alongside it.
    #[must_use]
    pub fn instance_methods(&self, ty: &Type) -> Vec<Rc<MethodEntry>> {
        ty.methods.entries()
    }

    /// Host-visible method names of a type, sorted.
    #[must_use]
    pub fn host_method_names(&self, ty: &Type) -> Vec<Symbol> {
        let mut names: Vec<Symbol> = ty
            .methods
            .entries()
            .iter()
            .filter(|e| e.tier().is_host_visible())
            .map(|e| e.name())
            .collect();
        names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        names.dedup();
        names
    }

    /// Find which types provide the implementations of `name` for `ty`.
    ///
    /// # Returns
    ///
    /// `None` if the name resolves in neither table.
    #[must_use]
    pub fn method_provider(&self, ty: &Type, name: &str) -> Option<MethodProvider> {
        let sym = Symbol::lookup(name)?;
        let host = ty.methods.host_entry(sym).map(|e| e.owner());
        let direct = ty
            .methods
            .direct_slot(sym)
            .and_then(|i| ty.methods.slot(i))
            .map(|e| e.owner());

        (host.is_some() || direct.is_some()).then_some(MethodProvider { host, direct })
    }

    /// Tier under which `name` is visible to host code, if at all.
    #[must_use]
    pub fn host_tier(&self, ty: &Type, name: &str) -> Option<Tier> {
        ty.methods.host_entry(Symbol::lookup(name)?).map(|e| e.tier())
    }

    /// Render the native layout of a type for diagnostics.
    #[must_use]
    pub fn describe_layout(&self, ty: &Type) -> String {
        format!("{} {}", ty.name, ty.layout.describe())
    }
}
