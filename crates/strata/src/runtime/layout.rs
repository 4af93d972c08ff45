//! Fixed-offset native records and attribute visibility.
//!
//! A native-backed type declares fields with a [`NativeKind`] and a
//! [`Visibility`]. [`Layout::extend`] turns the base layout plus the type's
//! own declarations into a fixed layout:
//!
//! - Base slots come first and keep their exact offsets, so a record of a
//!   subclass can be read through any ancestor's layout without relocation.
//! - Scalar kinds live in a packed byte area at naturally aligned offsets.
//! - Reference kinds (`Any`, `Ref`, `Buffer`) live in a parallel handle area,
//!   also indexed base-first.
//!
//! # Visibility
//!
//! Visibility only decides which accessors the host protocol gets:
//!
//! | Visibility | Host accessor | Native view |
//! |------------|---------------|-------------|
//! | `Public`   | read/write    | read/write  |
//! | `ReadOnly` | read          | read/write  |
//! | `Private`  | none          | read/write  |

use crate::error::{DefinitionError, Error, Result};
use crate::runtime::symbol::Symbol;
use crate::runtime::value::Value;
use fxhash::FxHashSet;
use std::fmt;

/// Storage kind of a native field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeKind {
    /// One byte, `0` or `1`.
    Bool,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 64-bit float.
    F64,
    /// Untyped host value reference.
    Any,
    /// Reference to an instance of the named type (or a descendant), or null.
    Ref(Symbol),
    /// Native-only backing storage acquired during phase-1 initialization.
    Buffer,
}

impl NativeKind {
    /// Byte size in the scalar area, or `None` for handle kinds.
    #[must_use]
    pub const fn scalar_size(self) -> Option<usize> {
        match self {
            NativeKind::Bool => Some(1),
            NativeKind::I32 => Some(4),
            NativeKind::I64 | NativeKind::F64 => Some(8),
            NativeKind::Any | NativeKind::Ref(_) | NativeKind::Buffer => None,
        }
    }

    /// Returns `true` if this kind occupies the scalar area.
    #[must_use]
    pub const fn is_scalar(self) -> bool {
        self.scalar_size().is_some()
    }
}

impl fmt::Display for NativeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeKind::Bool => f.write_str("bool"),
            NativeKind::I32 => f.write_str("i32"),
            NativeKind::I64 => f.write_str("i64"),
            NativeKind::F64 => f.write_str("f64"),
            NativeKind::Any => f.write_str("object"),
            NativeKind::Ref(name) => write!(f, "{name}"),
            NativeKind::Buffer => f.write_str("buffer"),
        }
    }
}

/// Where a declared field is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// Inside the fixed-offset native record.
    NativeRecord,
    /// Inside the auxiliary dictionary of a dynamic-only subclass.
    DynamicDict,
}

/// Accessor visibility of a native field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    /// No host accessor.
    #[default]
    Private,
    /// Read/write host accessor.
    Public,
    /// Read-only host accessor.
    ReadOnly,
}

/// Host accessor granted by a visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Get and set.
    ReadWrite,
    /// Get only.
    ReadOnly,
}

impl Visibility {
    /// Returns the host accessor emitted for this visibility.
    #[must_use]
    pub const fn access(self) -> Option<Access> {
        match self {
            Visibility::Private => None,
            Visibility::Public => Some(Access::ReadWrite),
            Visibility::ReadOnly => Some(Access::ReadOnly),
        }
    }
}

/// A field as declared on a type.
///
/// # Example
///
/// ```rust
/// use strata::runtime::layout::{FieldDescriptor, NativeKind, Visibility};
///
/// let x = FieldDescriptor::native("x", NativeKind::F64).public();
/// assert_eq!(x.visibility, Visibility::Public);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name.
    pub name: Symbol,
    /// Native kind (`Any` for dictionary fields).
    pub kind: NativeKind,
    /// Record or dictionary storage.
    pub storage: StorageKind,
    /// Host accessor visibility.
    pub visibility: Visibility,
}

impl FieldDescriptor {
    /// Declares a private native-record field.
    #[must_use]
    pub fn native(name: &str, kind: NativeKind) -> Self {
        FieldDescriptor {
            name: Symbol::intern(name),
            kind,
            storage: StorageKind::NativeRecord,
            visibility: Visibility::Private,
        }
    }

    /// Declares an attribute stored in the auxiliary dictionary.
    #[must_use]
    pub fn dynamic(name: &str) -> Self {
        FieldDescriptor {
            name: Symbol::intern(name),
            kind: NativeKind::Any,
            storage: StorageKind::DynamicDict,
            visibility: Visibility::Public,
        }
    }

    /// Marks the field public.
    #[must_use]
    pub fn public(mut self) -> Self {
        self.visibility = Visibility::Public;
        self
    }

    /// Marks the field read-only.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.visibility = Visibility::ReadOnly;
        self
    }

    /// Marks the field private.
    #[must_use]
    pub fn private(mut self) -> Self {
        self.visibility = Visibility::Private;
        self
    }
}

/// Location of a slot inside a [`NativeRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    /// Byte offset into the scalar area.
    Scalar {
        /// Offset in bytes.
        offset: usize,
    },
    /// Index into the handle area.
    Handle {
        /// Handle index.
        index: usize,
    },
}

/// A resolved field slot in a layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSlot {
    /// Field name.
    pub name: Symbol,
    /// Native kind.
    pub kind: NativeKind,
    /// Declared visibility.
    pub visibility: Visibility,
    /// Fixed location in the record.
    pub location: Location,
    /// Type that declared the field.
    pub owner: Symbol,
    /// Inheritance depth of the owner (0 for a root type).
    pub depth: usize,
}

/// Fixed-offset layout of a native-backed type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    slots: Vec<FieldSlot>,
    size: usize,
    align: usize,
    handles: usize,
}

const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

impl Layout {
    /// Layout with no fields.
    #[must_use]
    pub fn empty() -> Self {
        Layout {
            slots: Vec::new(),
            size: 0,
            align: 1,
            handles: 0,
        }
    }

    /// Appends `fields` declared by `owner` at `depth` to `base`.
    ///
    /// Dictionary fields take part in the duplicate check but do not enter
    /// the layout.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::DuplicateField`] if two fields of `fields`
    /// share a name.
    pub fn extend(
        base: Option<&Layout>,
        owner: Symbol,
        depth: usize,
        fields: &[FieldDescriptor],
    ) -> Result<Layout> {
        let mut seen = FxHashSet::default();
        for field in fields {
            if !seen.insert(field.name) {
                return Err(DefinitionError::DuplicateField {
                    type_name: owner.to_string(),
                    field: field.name.to_string(),
                }
                .into());
            }
        }

        let mut layout = base.cloned().unwrap_or_else(Layout::empty);

        for field in fields
            .iter()
            .filter(|f| f.storage == StorageKind::NativeRecord)
        {
            let location = match field.kind.scalar_size() {
                Some(size) => {
                    let offset = align_up(layout.size, size);
                    layout.size = offset + size;
                    layout.align = layout.align.max(size);
                    Location::Scalar { offset }
                }
                None => {
                    let index = layout.handles;
                    layout.handles += 1;
                    Location::Handle { index }
                }
            };

            layout.slots.push(FieldSlot {
                name: field.name,
                kind: field.kind,
                visibility: field.visibility,
                location,
                owner,
                depth,
            });
        }

        // Pad like a C struct so a subclass appends after the whole base.
        layout.size = align_up(layout.size, layout.align);
        Ok(layout)
    }

    /// Resolves a field by name, most-derived declaration first.
    #[must_use]
    pub fn slot(&self, name: Symbol) -> Option<&FieldSlot> {
        self.slots.iter().rev().find(|slot| slot.name == name)
    }

    /// Returns the host accessor for `name`, if one is emitted.
    #[must_use]
    pub fn accessor(&self, name: Symbol) -> Option<(&FieldSlot, Access)> {
        let slot = self.slot(name)?;
        slot.visibility.access().map(|access| (slot, access))
    }

    /// All slots in layout order.
    #[must_use]
    pub fn slots(&self) -> &[FieldSlot] {
        &self.slots
    }

    /// Size of the scalar area in bytes, padded to [`Layout::align`].
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Alignment of the scalar area.
    #[must_use]
    pub const fn align(&self) -> usize {
        self.align
    }

    /// Number of handle slots.
    #[must_use]
    pub const fn handle_count(&self) -> usize {
        self.handles
    }

    /// Returns `true` if every slot of `self` appears unchanged at the start
    /// of `other`, i.e. `other` records can be viewed through `self`.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Layout) -> bool {
        self.slots.len() <= other.slots.len()
            && self.size <= other.size
            && self.handles <= other.handles
            && self.slots.iter().zip(&other.slots).all(|(a, b)| a == b)
    }

    /// Allocates a zeroed record for this layout.
    pub(crate) fn allocate(&self) -> NativeRecord {
        NativeRecord {
            scalars: vec![0; self.size].into_boxed_slice(),
            handles: std::iter::repeat_with(|| Handle::Empty)
                .take(self.handles)
                .collect(),
        }
    }

    /// Renders the layout as one line per slot, for diagnostics.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = format!(
            "size={} align={} handles={}\n",
            self.size, self.align, self.handles
        );
        for slot in &self.slots {
            let at = match slot.location {
                Location::Scalar { offset } => format!("+{offset}"),
                Location::Handle { index } => format!("h{index}"),
            };
            out.push_str(&format!(
                "  {at:>5} {}: {} ({:?}, from {})\n",
                slot.name, slot.kind, slot.visibility, slot.owner
            ));
        }
        out
    }
}

/// Backing storage owned by a `Buffer` field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NativeBuffer {
    data: Vec<f64>,
}

impl NativeBuffer {
    pub(crate) fn zeroed(len: usize) -> Self {
        NativeBuffer {
            data: vec![0.0; len],
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the buffer has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Element view.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Mutable element view.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) enum Handle {
    #[default]
    Empty,
    Value(Value),
    Buffer(NativeBuffer),
}

/// The fixed-offset storage of one instance.
#[derive(Debug)]
pub struct NativeRecord {
    scalars: Box<[u8]>,
    handles: Box<[Handle]>,
}

impl NativeRecord {
    fn bytes<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0; N];
        out.copy_from_slice(&self.scalars[offset..offset + N]);
        out
    }

    fn put(&mut self, offset: usize, bytes: &[u8]) {
        self.scalars[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Reads `slot` directly, regardless of visibility.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] for `Buffer` slots, which have no
    /// value representation.
    pub fn read(&self, slot: &FieldSlot) -> Result<Value> {
        match (slot.kind, slot.location) {
            (NativeKind::Bool, Location::Scalar { offset }) => {
                Ok(Value::Bool(self.scalars[offset] != 0))
            }
            (NativeKind::I32, Location::Scalar { offset }) => {
                Ok(Value::Int(i64::from(i32::from_le_bytes(self.bytes(offset)))))
            }
            (NativeKind::I64, Location::Scalar { offset }) => {
                Ok(Value::Int(i64::from_le_bytes(self.bytes(offset))))
            }
            (NativeKind::F64, Location::Scalar { offset }) => {
                Ok(Value::Float(f64::from_le_bytes(self.bytes(offset))))
            }
            (_, Location::Handle { index }) => match &self.handles[index] {
                Handle::Empty => Ok(Value::Null),
                Handle::Value(value) => Ok(value.clone()),
                Handle::Buffer(_) => Err(Error::type_mismatch(
                    "value field",
                    format!("native buffer '{}'", slot.name),
                )),
            },
            (kind, Location::Scalar { .. }) => Err(Error::type_mismatch(
                "scalar field",
                format!("{kind} field '{}'", slot.name),
            )),
        }
    }

    /// Writes `value` into `slot` directly, regardless of visibility.
    ///
    /// # Errors
    ///
    /// - [`Error::TypeMismatch`] if `value` does not fit the slot kind, or the
    ///   slot is a `Buffer`.
    /// - [`Error::ValueOutOfRange`] if an integer does not fit an `I32` slot.
    pub fn write(&mut self, slot: &FieldSlot, value: Value) -> Result<()> {
        let mismatch = |value: &Value| {
            Error::type_mismatch(
                format!("{} for field '{}'", slot.kind, slot.name),
                value.type_name(),
            )
        };

        match (slot.kind, slot.location) {
            (NativeKind::Bool, Location::Scalar { offset }) => match value {
                Value::Bool(b) => {
                    self.scalars[offset] = u8::from(b);
                    Ok(())
                }
                other => Err(mismatch(&other)),
            },
            (NativeKind::I32, Location::Scalar { offset }) => {
                let wide = value.as_int().ok_or_else(|| mismatch(&value))?;
                let narrow = i32::try_from(wide).map_err(|_| Error::ValueOutOfRange {
                    target: format!("i32 field '{}'", slot.name),
                    value: wide.to_string(),
                })?;
                self.put(offset, &narrow.to_le_bytes());
                Ok(())
            }
            (NativeKind::I64, Location::Scalar { offset }) => {
                let v = value.as_int().ok_or_else(|| mismatch(&value))?;
                self.put(offset, &v.to_le_bytes());
                Ok(())
            }
            (NativeKind::F64, Location::Scalar { offset }) => {
                let v = value.as_float().ok_or_else(|| mismatch(&value))?;
                self.put(offset, &v.to_le_bytes());
                Ok(())
            }
            (NativeKind::Any, Location::Handle { index }) => {
                self.handles[index] = match value {
                    Value::Null => Handle::Empty,
                    other => Handle::Value(other),
                };
                Ok(())
            }
            (NativeKind::Ref(class), Location::Handle { index }) => match value {
                Value::Null => {
                    self.handles[index] = Handle::Empty;
                    Ok(())
                }
                Value::Object(obj) if obj.ty().is_subtype_named(class) => {
                    self.handles[index] = Handle::Value(Value::Object(obj));
                    Ok(())
                }
                other => Err(mismatch(&other)),
            },
            _ => Err(mismatch(&value)),
        }
    }

    /// Returns the buffer in `slot`, or `None` if it was never allocated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if `slot` is not a `Buffer` slot.
    pub fn buffer(&self, slot: &FieldSlot) -> Result<Option<&NativeBuffer>> {
        match self.buffer_handle(slot)? {
            Handle::Buffer(buf) => Ok(Some(buf)),
            _ => Ok(None),
        }
    }

    /// Mutable variant of [`NativeRecord::buffer`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if `slot` is not a `Buffer` slot.
    pub fn buffer_mut(&mut self, slot: &FieldSlot) -> Result<Option<&mut NativeBuffer>> {
        let index = Self::buffer_index(slot)?;
        match &mut self.handles[index] {
            Handle::Buffer(buf) => Ok(Some(buf)),
            _ => Ok(None),
        }
    }

    pub(crate) fn install_buffer(&mut self, slot: &FieldSlot, buffer: NativeBuffer) -> Result<()> {
        let index = Self::buffer_index(slot)?;
        self.handles[index] = Handle::Buffer(buffer);
        Ok(())
    }

    pub(crate) fn take_buffer(&mut self, slot: &FieldSlot) -> Result<Option<NativeBuffer>> {
        let index = Self::buffer_index(slot)?;
        match std::mem::take(&mut self.handles[index]) {
            Handle::Buffer(buf) => Ok(Some(buf)),
            other => {
                self.handles[index] = other;
                Ok(None)
            }
        }
    }

    fn buffer_index(slot: &FieldSlot) -> Result<usize> {
        match (slot.kind, slot.location) {
            (NativeKind::Buffer, Location::Handle { index }) => Ok(index),
            (kind, _) => Err(Error::type_mismatch(
                "buffer field",
                format!("{kind} field '{}'", slot.name),
            )),
        }
    }

    fn buffer_handle(&self, slot: &FieldSlot) -> Result<&Handle> {
        Ok(&self.handles[Self::buffer_index(slot)?])
    }

    /// Values held in the handle area (objects and untyped references).
    pub(crate) fn referenced_values(&self) -> impl Iterator<Item = &Value> {
        self.handles.iter().filter_map(|h| match h {
            Handle::Value(v) => Some(v),
            _ => None,
        })
    }

    /// Clears every value handle, returning the removed values.
    pub(crate) fn clear_references(&mut self) -> Vec<Value> {
        let mut out = Vec::new();
        for handle in self.handles.iter_mut() {
            if matches!(handle, Handle::Value(_)) {
                if let Handle::Value(v) = std::mem::take(handle) {
                    out.push(v);
                }
            }
        }
        out
    }

    /// Raw scalar bytes.
    #[must_use]
    pub fn scalar_bytes(&self) -> &[u8] {
        &self.scalars
    }
}
