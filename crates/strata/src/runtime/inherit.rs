//! Single-native-base inheritance resolution.
//!
//! Turns a [`TypeBuilder`] into a [`TypeDescriptor`] against the types
//! already registered. All structural rules are enforced here, before the
//! type becomes visible:
//!
//! - at most one base, looked up by name;
//! - a native-backed type derives only from native-backed types and keeps
//!   no attribute dictionary;
//! - a dynamic-only type has a base and declares neither native fields nor
//!   native hooks;
//! - every type named by a `Ref` field or an object parameter exists (or is
//!   the type being defined).

use crate::error::{DefinitionError, Result};
use crate::runtime::layout::{Layout, NativeKind, StorageKind};
use crate::runtime::method::{MethodTable, ParamKind};
use crate::runtime::symbol::Symbol;
use crate::runtime::types::{TypeBuilder, TypeDescriptor, TypeKind, TypeRegistry};
use std::rc::Rc;

/// Resolves `builder` against `registry`.
///
/// # Errors
///
/// Returns a [`DefinitionError`] describing the first violated rule.
pub(crate) fn resolve(registry: &TypeRegistry, builder: TypeBuilder) -> Result<TypeDescriptor> {
    let name = builder.name;
    let type_name = || name.to_string();

    if registry.contains(name) {
        return Err(DefinitionError::TypeAlreadyExists {
            type_name: type_name(),
        }
        .into());
    }

    if builder.bases.len() > 1 {
        return Err(DefinitionError::MultipleNativeBases {
            type_name: type_name(),
            count: builder.bases.len(),
        }
        .into());
    }

    let base = match builder.bases.first() {
        Some(&base_name) => Some(Rc::clone(registry.get(base_name).ok_or_else(|| {
            DefinitionError::UnknownType {
                type_name: base_name.to_string(),
            }
        })?)),
        None => None,
    };

    match builder.kind {
        TypeKind::Native => {
            if let Some(base) = base.as_ref().filter(|b| !b.is_native()) {
                return Err(DefinitionError::DynamicNativeBase {
                    type_name: type_name(),
                    base: base.name.to_string(),
                }
                .into());
            }
            if let Some(field) = builder
                .fields
                .iter()
                .find(|f| f.storage == StorageKind::DynamicDict)
            {
                return Err(DefinitionError::DynamicFieldInNativeType {
                    type_name: type_name(),
                    field: field.name.to_string(),
                }
                .into());
            }
        }
        TypeKind::Dynamic => {
            if base.is_none() {
                return Err(DefinitionError::MissingBase {
                    type_name: type_name(),
                }
                .into());
            }
            if let Some(field) = builder.native_fields().next() {
                return Err(DefinitionError::NativeFieldInDynamicType {
                    type_name: type_name(),
                    field: field.name.to_string(),
                }
                .into());
            }
            let hook = if builder.hooks.native_init.is_some() {
                Some("initializer")
            } else if builder.hooks.finalizer.is_some() {
                Some("finalizer")
            } else {
                None
            };
            if let Some(hook) = hook {
                return Err(DefinitionError::NativeHookInDynamicType {
                    type_name: type_name(),
                    hook,
                }
                .into());
            }
        }
    }

    check_references(registry, &builder)?;

    let depth = base.as_ref().map_or(0, |b| b.depth + 1);
    let layout = Layout::extend(
        base.as_ref().map(|b| &b.layout),
        name,
        depth,
        &builder.fields,
    )?;
    let methods = MethodTable::derive(
        base.as_ref().map(|b| &b.methods),
        name,
        builder.kind,
        &builder.methods,
    )?;

    let mut dict_fields = base
        .as_ref()
        .map(|b| b.dict_fields.clone())
        .unwrap_or_default();
    dict_fields.extend(
        builder
            .fields
            .iter()
            .filter(|f| f.storage == StorageKind::DynamicDict)
            .map(|f| f.name),
    );

    // Only a chain with a dynamic-only level carries the open-ended store.
    let has_dict = builder.kind == TypeKind::Dynamic || base.as_ref().is_some_and(|b| b.has_dict);

    let slots = match &base {
        Some(b) => builder.slots.inherit(&b.slots),
        None => builder.slots,
    };

    Ok(TypeDescriptor {
        name,
        base,
        kind: builder.kind,
        fields: builder.fields,
        dict_fields,
        layout,
        methods,
        hooks: builder.hooks,
        slots,
        depth,
        has_dict,
    })
}

fn check_references(registry: &TypeRegistry, builder: &TypeBuilder) -> Result<()> {
    let known = |class: Symbol| class == builder.name || registry.contains(class);

    let field_refs = builder.fields.iter().filter_map(|f| match f.kind {
        NativeKind::Ref(class) => Some(class),
        _ => None,
    });
    let param_refs = builder.methods.iter().flat_map(|m| {
        m.signature.params().iter().filter_map(|p| match p {
            ParamKind::Object { class, .. } => Some(*class),
            _ => None,
        })
    });

    for class in field_refs.chain(param_refs) {
        if !known(class) {
            return Err(DefinitionError::UnknownType {
                type_name: class.to_string(),
            }
            .into());
        }
    }
    Ok(())
}
