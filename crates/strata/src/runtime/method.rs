//! Method entries and the three dispatch tiers.
//!
//! Every type owns a [`MethodTable`] with two parts:
//!
//! - a **direct table**: a vector of slots holding `Hybrid` and `NativeOnly`
//!   entries. Slot indices are inherited unchanged, so a static call site
//!   that bound to slot `n` of type `T` can index the slot table of any
//!   descendant of `T` without a name lookup.
//! - a **host table**: a name map holding `HostVisible` and `Hybrid` entries,
//!   used by the generic, reflection-capable call path.
//!
//! # Tiers
//!
//! | Tier          | Direct slot | Host table | Overridable by          |
//! |---------------|-------------|------------|-------------------------|
//! | `HostVisible` | no          | yes        | native and dynamic      |
//! | `Hybrid`      | yes         | yes        | native and dynamic      |
//! | `NativeOnly`  | yes         | no         | native subclasses only  |
//!
//! Tables are flattened at registration: a type's table already contains
//! every inherited entry, with overrides in place. The host entry for a
//! `Hybrid` name is therefore always the most-derived override.

use crate::error::{DefinitionError, Error, Result};
use crate::runtime::Runtime;
use crate::runtime::object::Object;
use crate::runtime::symbol::Symbol;
use crate::runtime::types::TypeKind;
use crate::runtime::value::Value;
use fxhash::{FxHashMap, FxHashSet};
use std::fmt;
use std::rc::Rc;

/// Dispatch tier of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Generic path only; reachable from host and native call sites.
    HostVisible,
    /// Direct slot plus a generic wrapper.
    Hybrid,
    /// Direct slot only; invisible to host code.
    NativeOnly,
}

impl Tier {
    /// Returns `true` if entries of this tier occupy a direct slot.
    #[must_use]
    pub const fn has_direct_entry(self) -> bool {
        matches!(self, Tier::Hybrid | Tier::NativeOnly)
    }

    /// Returns `true` if entries of this tier are reachable from host code.
    #[must_use]
    pub const fn is_host_visible(self) -> bool {
        matches!(self, Tier::HostVisible | Tier::Hybrid)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::HostVisible => "host-visible",
            Tier::Hybrid => "hybrid",
            Tier::NativeOnly => "native-only",
        })
    }
}

/// Declared kind of a method parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Any host value.
    Any,
    /// `Bool` only.
    Bool,
    /// `Int` only.
    Int,
    /// `Int` or `Float`.
    Float,
    /// `Str` only.
    Str,
    /// Instance of `class` or a descendant; `nullable` admits the sentinel.
    Object {
        /// Declared type name.
        class: Symbol,
        /// Whether the null sentinel is admissible.
        nullable: bool,
    },
}

impl ParamKind {
    /// Non-null object parameter of the named type.
    #[must_use]
    pub fn object(class: &str) -> Self {
        ParamKind::Object {
            class: Symbol::intern(class),
            nullable: false,
        }
    }

    /// Object parameter of the named type that admits the null sentinel.
    #[must_use]
    pub fn nullable_object(class: &str) -> Self {
        ParamKind::Object {
            class: Symbol::intern(class),
            nullable: true,
        }
    }
}

/// Parameter list of a method (the receiver is implicit).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    params: Vec<ParamKind>,
}

impl Signature {
    /// Signature with the given parameter kinds.
    #[must_use]
    pub fn new(params: Vec<ParamKind>) -> Self {
        Signature { params }
    }

    /// Signature with `n` untyped parameters.
    #[must_use]
    pub fn any(n: usize) -> Self {
        Signature {
            params: vec![ParamKind::Any; n],
        }
    }

    /// Number of parameters.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Declared parameter kinds.
    #[must_use]
    pub fn params(&self) -> &[ParamKind] {
        &self.params
    }

    fn check_count(&self, method: Symbol, args: &[Value]) -> Result<()> {
        if args.len() == self.params.len() {
            Ok(())
        } else {
            Err(Error::ArgumentCount {
                method: method.to_string(),
                expected: self.params.len(),
                got: args.len(),
            })
        }
    }

    fn check_null(method: Symbol, index: usize, nullable: bool) -> Result<()> {
        if nullable {
            Ok(())
        } else {
            Err(Error::null_reference(format!(
                "pass null as non-null argument {index} of {method}()"
            )))
        }
    }

    /// Checks performed by the direct path: argument count and null
    /// admissibility of object parameters. Other kinds are trusted to the
    /// static types at the call site.
    pub(crate) fn check_direct(&self, method: Symbol, args: &[Value]) -> Result<()> {
        self.check_count(method, args)?;
        for (index, (param, arg)) in self.params.iter().zip(args).enumerate() {
            if let (ParamKind::Object { nullable, .. }, Value::Null) = (param, arg) {
                Self::check_null(method, index, *nullable)?;
            }
        }
        Ok(())
    }

    /// Full reflective check used by the generic path.
    pub(crate) fn check(&self, method: Symbol, args: &[Value]) -> Result<()> {
        self.check_count(method, args)?;

        for (index, (param, arg)) in self.params.iter().zip(args).enumerate() {
            let ok = match (param, arg) {
                (ParamKind::Any, _)
                | (ParamKind::Bool, Value::Bool(_))
                | (ParamKind::Int, Value::Int(_))
                | (ParamKind::Float, Value::Int(_) | Value::Float(_))
                | (ParamKind::Str, Value::Str(_)) => true,
                (ParamKind::Object { nullable, .. }, Value::Null) => {
                    Self::check_null(method, index, *nullable)?;
                    true
                }
                (ParamKind::Object { class, .. }, Value::Object(obj)) => {
                    obj.ty().is_subtype_named(*class)
                }
                _ => false,
            };

            if !ok {
                return Err(Error::type_mismatch(
                    format!("{} for argument {index} of {method}()", describe(param)),
                    arg.type_name(),
                ));
            }
        }
        Ok(())
    }
}

fn describe(param: &ParamKind) -> String {
    match param {
        ParamKind::Any => "any".to_string(),
        ParamKind::Bool => "bool".to_string(),
        ParamKind::Int => "int".to_string(),
        ParamKind::Float => "float".to_string(),
        ParamKind::Str => "str".to_string(),
        ParamKind::Object { class, .. } => class.to_string(),
    }
}

/// Method implementation.
///
/// Receives the runtime, the receiver and the (already checked) arguments.
pub type MethodImp = Rc<dyn Fn(&Runtime, &Object, &[Value]) -> Result<Value>>;

/// A method as declared on a type, before registration.
#[derive(Clone)]
pub struct MethodDef {
    pub(crate) name: Symbol,
    pub(crate) tier: Tier,
    pub(crate) signature: Signature,
    pub(crate) imp: MethodImp,
}

impl MethodDef {
    /// Declares a method.
    pub fn new<F>(name: &str, tier: Tier, signature: Signature, imp: F) -> Self
    where
        F: Fn(&Runtime, &Object, &[Value]) -> Result<Value> + 'static,
    {
        MethodDef {
            name: Symbol::intern(name),
            tier,
            signature,
            imp: Rc::new(imp),
        }
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("tier", &self.tier)
            .field("arity", &self.signature.arity())
            .finish_non_exhaustive()
    }
}

/// A registered method entry.
pub struct MethodEntry {
    name: Symbol,
    tier: Tier,
    signature: Signature,
    owner: Symbol,
    slot: Option<usize>,
    imp: MethodImp,
}

impl MethodEntry {
    /// Method name.
    #[must_use]
    pub fn name(&self) -> Symbol {
        self.name
    }

    /// Dispatch tier.
    #[must_use]
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Parameter list.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Type that provided this implementation.
    #[must_use]
    pub fn owner(&self) -> Symbol {
        self.owner
    }

    /// Direct slot index, if the entry has one.
    #[must_use]
    pub fn slot(&self) -> Option<usize> {
        self.slot
    }

    /// Direct invocation: count and null checks only.
    pub(crate) fn invoke_direct(
        &self,
        runtime: &Runtime,
        receiver: &Object,
        args: &[Value],
    ) -> Result<Value> {
        self.signature.check_direct(self.name, args)?;
        (self.imp)(runtime, receiver, args)
    }

    /// Generic invocation: full signature validation.
    pub(crate) fn invoke_generic(
        &self,
        runtime: &Runtime,
        receiver: &Object,
        args: &[Value],
    ) -> Result<Value> {
        self.signature.check(self.name, args)?;
        (self.imp)(runtime, receiver, args)
    }
}

impl fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodEntry")
            .field("name", &self.name)
            .field("tier", &self.tier)
            .field("owner", &self.owner)
            .field("slot", &self.slot)
            .field("arity", &self.signature.arity())
            .finish()
    }
}

/// Flattened method table of one type.
#[derive(Clone, Default)]
pub struct MethodTable {
    slots: Vec<Rc<MethodEntry>>,
    direct: FxHashMap<Symbol, usize>,
    host: FxHashMap<Symbol, Rc<MethodEntry>>,
}

impl MethodTable {
    /// Builds the table of `owner` from its base's table and its own
    /// declarations.
    ///
    /// # Errors
    ///
    /// - [`DefinitionError::DuplicateMethod`] for repeated names.
    /// - [`DefinitionError::InvalidTier`] for non-host-visible declarations
    ///   on a dynamic-only type.
    /// - [`DefinitionError::InvalidTierOverride`] for overrides that change
    ///   the tier in a way that would break existing call sites.
    /// - [`DefinitionError::SignatureMismatch`] for overrides with a
    ///   different parameter count.
    pub fn derive(
        base: Option<&MethodTable>,
        owner: Symbol,
        kind: TypeKind,
        defs: &[MethodDef],
    ) -> Result<MethodTable> {
        let mut table = base.cloned().unwrap_or_default();
        let mut seen = FxHashSet::default();

        for def in defs {
            if !seen.insert(def.name) {
                return Err(DefinitionError::DuplicateMethod {
                    type_name: owner.to_string(),
                    method: def.name.to_string(),
                }
                .into());
            }
            if kind == TypeKind::Dynamic && def.tier != Tier::HostVisible {
                return Err(DefinitionError::InvalidTier {
                    type_name: owner.to_string(),
                    method: def.name.to_string(),
                    tier: def.tier,
                }
                .into());
            }

            table.declare(owner, kind, def)?;
        }

        Ok(table)
    }

    fn declare(&mut self, owner: Symbol, kind: TypeKind, def: &MethodDef) -> Result<()> {
        let inherited_slot = self.direct.get(&def.name).copied();
        let inherited = inherited_slot
            .map(|i| Rc::clone(&self.slots[i]))
            .or_else(|| self.host.get(&def.name).cloned());

        if let Some(prev) = &inherited {
            let expected = prev.signature.arity();
            let declared = def.signature.arity();
            // A host method shadowing a native-only entry is a new entry, not
            // an override, so its parameter list is free.
            let shadows_native = kind == TypeKind::Dynamic && prev.tier == Tier::NativeOnly;
            if expected != declared && !shadows_native {
                return Err(DefinitionError::SignatureMismatch {
                    type_name: owner.to_string(),
                    method: def.name.to_string(),
                    expected,
                    declared,
                }
                .into());
            }
        }

        let invalid = |inherited: Tier| -> Error {
            DefinitionError::InvalidTierOverride {
                type_name: owner.to_string(),
                method: def.name.to_string(),
                inherited,
                declared: def.tier,
            }
            .into()
        };

        let entry = |tier: Tier, slot: Option<usize>| {
            Rc::new(MethodEntry {
                name: def.name,
                tier,
                signature: def.signature.clone(),
                owner,
                slot,
                imp: Rc::clone(&def.imp),
            })
        };

        match (kind, def.tier, inherited.as_ref().map(|e| e.tier)) {
            // Fresh declarations.
            (_, Tier::HostVisible, None) => {
                self.host.insert(def.name, entry(Tier::HostVisible, None));
            }
            (TypeKind::Native, tier, None) => {
                let slot = self.slots.len();
                let new = entry(tier, Some(slot));
                self.slots.push(Rc::clone(&new));
                self.direct.insert(def.name, slot);
                if tier.is_host_visible() {
                    self.host.insert(def.name, new);
                }
            }

            // Host-visible overrides.
            (_, Tier::HostVisible, Some(Tier::HostVisible)) => {
                self.host.insert(def.name, entry(Tier::HostVisible, None));
            }
            (TypeKind::Dynamic, Tier::HostVisible, Some(Tier::Hybrid)) => {
                // The override takes over both the slot and the wrapper.
                let slot = inherited_slot;
                let new = entry(Tier::Hybrid, slot);
                if let Some(i) = slot {
                    self.slots[i] = Rc::clone(&new);
                }
                self.host.insert(def.name, new);
            }
            (TypeKind::Dynamic, Tier::HostVisible, Some(Tier::NativeOnly)) => {
                // Native callers keep the native entry; host code sees this one.
                self.host.insert(def.name, entry(Tier::HostVisible, None));
            }

            // Native overrides keep the inherited slot index.
            (TypeKind::Native, Tier::NativeOnly, Some(Tier::NativeOnly))
            | (TypeKind::Native, Tier::Hybrid, Some(Tier::Hybrid | Tier::NativeOnly)) => {
                let slot = inherited_slot;
                let new = entry(def.tier, slot);
                if let Some(i) = slot {
                    self.slots[i] = Rc::clone(&new);
                }
                if def.tier.is_host_visible() {
                    self.host.insert(def.name, new);
                }
            }

            (_, _, Some(prev)) => return Err(invalid(prev)),
            (TypeKind::Dynamic, _, None) => {
                // Rejected by `derive` before reaching here.
                return Err(DefinitionError::InvalidTier {
                    type_name: owner.to_string(),
                    method: def.name.to_string(),
                    tier: def.tier,
                }
                .into());
            }
        }

        Ok(())
    }

    /// Direct slot index for `name`.
    #[must_use]
    pub fn direct_slot(&self, name: Symbol) -> Option<usize> {
        self.direct.get(&name).copied()
    }

    /// Entry at direct slot `index`.
    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&Rc<MethodEntry>> {
        self.slots.get(index)
    }

    /// Host-visible entry for `name`.
    #[must_use]
    pub fn host_entry(&self, name: Symbol) -> Option<&Rc<MethodEntry>> {
        self.host.get(&name)
    }

    /// Number of direct slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// All distinct entries: direct slots in slot order, then host-only
    /// entries sorted by name.
    #[must_use]
    pub fn entries(&self) -> Vec<Rc<MethodEntry>> {
        let mut out: Vec<Rc<MethodEntry>> = self.slots.clone();
        let mut host_only: Vec<_> = self
            .host
            .values()
            .filter(|e| !out.iter().any(|d| Rc::ptr_eq(d, e)))
            .cloned()
            .collect();
        host_only.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
        out.extend(host_only);
        out
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("slots", &self.slots.len())
            .field("host", &self.host.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, tier: Tier, arity: usize) -> MethodDef {
        MethodDef::new(name, tier, Signature::any(arity), |_, _, _| Ok(Value::Null))
    }

    fn sym(s: &str) -> Symbol {
        Symbol::intern(s)
    }

    fn base_table() -> MethodTable {
        MethodTable::derive(
            None,
            sym("MtBase"),
            TypeKind::Native,
            &[
                def("describe", Tier::HostVisible, 0),
                def("area", Tier::Hybrid, 0),
                def("scale", Tier::NativeOnly, 1),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_tier_placement() {
        let table = base_table();

        assert!(table.direct_slot(sym("describe")).is_none());
        assert_eq!(table.direct_slot(sym("area")), Some(0));
        assert_eq!(table.direct_slot(sym("scale")), Some(1));

        assert!(table.host_entry(sym("describe")).is_some());
        assert!(table.host_entry(sym("area")).is_some());
        assert!(table.host_entry(sym("scale")).is_none());
        assert_eq!(table.slot_count(), 2);
        assert_eq!(table.entries().len(), 3);
    }

    #[test]
    fn test_native_override_keeps_slot() {
        let base = base_table();
        let child = MethodTable::derive(
            Some(&base),
            sym("MtChild"),
            TypeKind::Native,
            &[def("area", Tier::Hybrid, 0), def("scale", Tier::NativeOnly, 1)],
        )
        .unwrap();

        assert_eq!(child.direct_slot(sym("area")), Some(0));
        assert_eq!(child.slot(0).unwrap().owner(), sym("MtChild"));
        assert_eq!(child.slot(1).unwrap().owner(), sym("MtChild"));
        assert!(Rc::ptr_eq(
            child.slot(0).unwrap(),
            child.host_entry(sym("area")).unwrap()
        ));
        // Base table is untouched.
        assert_eq!(base.slot(0).unwrap().owner(), sym("MtBase"));
    }

    #[test]
    fn test_native_only_may_become_hybrid() {
        let child = MethodTable::derive(
            Some(&base_table()),
            sym("MtUpgrade"),
            TypeKind::Native,
            &[def("scale", Tier::Hybrid, 1)],
        )
        .unwrap();

        assert_eq!(child.direct_slot(sym("scale")), Some(1));
        assert_eq!(child.host_entry(sym("scale")).unwrap().tier(), Tier::Hybrid);
    }

    #[test]
    fn test_invalid_tier_overrides() {
        let base = base_table();

        let err = MethodTable::derive(
            Some(&base),
            sym("MtBad1"),
            TypeKind::Native,
            &[def("area", Tier::NativeOnly, 0)],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Definition(DefinitionError::InvalidTierOverride {
                inherited: Tier::Hybrid,
                declared: Tier::NativeOnly,
                ..
            })
        ));

        let err = MethodTable::derive(
            Some(&base),
            sym("MtBad2"),
            TypeKind::Native,
            &[def("describe", Tier::Hybrid, 0)],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Definition(DefinitionError::InvalidTierOverride { .. })
        ));
    }

    #[test]
    fn test_dynamic_subclass_rules() {
        let base = base_table();

        let err = MethodTable::derive(
            Some(&base),
            sym("MtDyn1"),
            TypeKind::Dynamic,
            &[def("helper", Tier::NativeOnly, 0)],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Definition(DefinitionError::InvalidTier { .. })
        ));

        let dynamic = MethodTable::derive(
            Some(&base),
            sym("MtDyn2"),
            TypeKind::Dynamic,
            &[
                def("area", Tier::HostVisible, 0),
                def("scale", Tier::HostVisible, 2),
            ],
        )
        .unwrap();

        // Hybrid override replaces the slot and the wrapper.
        let area = dynamic.slot(0).unwrap();
        assert_eq!(area.owner(), sym("MtDyn2"));
        assert_eq!(area.tier(), Tier::Hybrid);

        // Native-only slot is untouched; host code sees a separate entry.
        assert_eq!(dynamic.slot(1).unwrap().owner(), sym("MtBase"));
        let host_scale = dynamic.host_entry(sym("scale")).unwrap();
        assert_eq!(host_scale.owner(), sym("MtDyn2"));
        assert_eq!(host_scale.slot(), None);
    }

    #[test]
    fn test_duplicate_and_signature_errors() {
        let err = MethodTable::derive(
            None,
            sym("MtDup"),
            TypeKind::Native,
            &[def("f", Tier::Hybrid, 0), def("f", Tier::Hybrid, 0)],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Definition(DefinitionError::DuplicateMethod { .. })
        ));

        let err = MethodTable::derive(
            Some(&base_table()),
            sym("MtSig"),
            TypeKind::Native,
            &[def("area", Tier::Hybrid, 2)],
        )
        .unwrap_err();
        assert_eq!(
            err,
            Error::Definition(DefinitionError::SignatureMismatch {
                type_name: "MtSig".into(),
                method: "area".into(),
                expected: 0,
                declared: 2,
            })
        );
    }

    #[test]
    fn test_signature_checks() {
        let sig = Signature::new(vec![
            ParamKind::Int,
            ParamKind::Float,
            ParamKind::nullable_object("Anything"),
        ]);
        let name = sym("sig_check");

        assert!(sig.check(name, &[Value::Int(1), Value::Int(2), Value::Null]).is_ok());
        assert!(matches!(
            sig.check(name, &[Value::Int(1)]),
            Err(Error::ArgumentCount { expected: 3, got: 1, .. })
        ));
        assert!(matches!(
            sig.check(name, &[Value::Float(1.0), Value::Int(2), Value::Null]),
            Err(Error::TypeMismatch { .. })
        ));

        let strict = Signature::new(vec![ParamKind::object("Anything")]);
        assert!(matches!(
            strict.check_direct(name, &[Value::Null]),
            Err(Error::NullReference { .. })
        ));
        assert!(matches!(
            strict.check(name, &[Value::Null]),
            Err(Error::NullReference { .. })
        ));
        // Direct path trusts static types for non-null arguments.
        assert!(strict.check_direct(name, &[Value::Int(3)]).is_ok());
    }
}
