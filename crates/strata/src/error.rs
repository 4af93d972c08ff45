//! Error types for the `Strata` runtime.
//!
//! Definition-time problems (bad layouts, tier violations, inheritance
//! violations) are grouped under [`DefinitionError`] and surface once, when a
//! type is registered. Everything else is an ordinary recoverable condition
//! returned through [`Result`].

use crate::runtime::method::Tier;
use thiserror::Error;

/// Errors detected while registering a type.
///
/// These are fatal for the type being defined: the registry is left
/// unchanged and the type never becomes visible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// Two fields with the same name at one inheritance level.
    #[error("type '{type_name}' declares field '{field}' more than once")]
    DuplicateField {
        /// Type being defined.
        type_name: String,
        /// Repeated field name.
        field: String,
    },

    /// Two methods with the same name at one inheritance level.
    #[error("type '{type_name}' declares method '{method}' more than once")]
    DuplicateMethod {
        /// Type being defined.
        type_name: String,
        /// Repeated method name.
        method: String,
    },

    /// More than one base was declared.
    #[error("type '{type_name}' declares {count} bases; at most one native base is supported")]
    MultipleNativeBases {
        /// Type being defined.
        type_name: String,
        /// Number of bases declared.
        count: usize,
    },

    /// A native-backed type named a dynamic-only type as its base.
    #[error("native type '{type_name}' cannot derive from dynamic-only type '{base}'")]
    DynamicNativeBase {
        /// Type being defined.
        type_name: String,
        /// The offending base.
        base: String,
    },

    /// A dynamic-only type was declared without a base.
    #[error("dynamic-only type '{type_name}' must derive from a native-backed type")]
    MissingBase {
        /// Type being defined.
        type_name: String,
    },

    /// A dynamic-only type declared a native-record field.
    #[error("dynamic-only type '{type_name}' cannot declare native field '{field}'")]
    NativeFieldInDynamicType {
        /// Type being defined.
        type_name: String,
        /// Offending field.
        field: String,
    },

    /// A native-backed type declared a dictionary attribute.
    #[error("native type '{type_name}' cannot declare dictionary attribute '{field}'")]
    DynamicFieldInNativeType {
        /// Type being defined.
        type_name: String,
        /// Offending field.
        field: String,
    },

    /// A dynamic-only type was used where a static native type is required.
    #[error("dynamic-only type '{type_name}' has no native view; bind against '{native_base}'")]
    DynamicStaticType {
        /// The dynamic-only type.
        type_name: String,
        /// Nearest native-backed ancestor.
        native_base: String,
    },

    /// A dynamic-only type declared a native lifecycle hook.
    #[error("dynamic-only type '{type_name}' cannot declare a native {hook}")]
    NativeHookInDynamicType {
        /// Type being defined.
        type_name: String,
        /// Hook kind ("initializer" or "finalizer").
        hook: &'static str,
    },

    /// A method was declared with a tier the defining type cannot carry.
    #[error("type '{type_name}' cannot declare {tier} method '{method}'")]
    InvalidTier {
        /// Type being defined.
        type_name: String,
        /// Method name.
        method: String,
        /// Declared tier.
        tier: Tier,
    },

    /// An override changed the tier of an inherited entry.
    #[error("method '{method}' in '{type_name}' cannot override a {inherited} entry as {declared}")]
    InvalidTierOverride {
        /// Type being defined.
        type_name: String,
        /// Method name.
        method: String,
        /// Tier of the inherited entry.
        inherited: Tier,
        /// Tier of the new declaration.
        declared: Tier,
    },

    /// An override changed the number of parameters.
    #[error("method '{method}' in '{type_name}' takes {declared} parameters but overrides one taking {expected}")]
    SignatureMismatch {
        /// Type being defined.
        type_name: String,
        /// Method name.
        method: String,
        /// Parameter count of the inherited entry.
        expected: usize,
        /// Parameter count of the new declaration.
        declared: usize,
    },

    /// A type with this name is already registered.
    #[error("type '{type_name}' is already registered")]
    TypeAlreadyExists {
        /// Repeated type name.
        type_name: String,
    },

    /// A field or parameter refers to a type that is not registered.
    #[error("unknown type '{type_name}'")]
    UnknownType {
        /// Missing type name.
        type_name: String,
    },

    /// A host call site targets a method that only exists natively.
    #[error("method '{method}' of '{type_name}' is native-only and cannot be called from host code")]
    NativeOnlyFromHost {
        /// Static type at the call site.
        type_name: String,
        /// Method name.
        method: String,
    },
}

/// Errors that can occur in the `Strata` runtime.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A type definition was rejected.
    #[error("definition error: {0}")]
    Definition(#[from] DefinitionError),

    /// Phase-1 initialization could not acquire a native resource.
    #[error("allocation failure in '{type_name}': {reason}")]
    AllocationFailure {
        /// Type whose native initializer failed.
        type_name: String,
        /// Human-readable cause.
        reason: String,
    },

    /// A checked conversion or typed assignment saw the wrong type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// What the binding or slot accepts.
        expected: String,
        /// What was supplied.
        found: String,
    },

    /// Native access or a direct call went through the null sentinel.
    #[error("null reference: cannot {operation}")]
    NullReference {
        /// The attempted operation.
        operation: String,
    },

    /// A protocol slot could not handle the operand combination.
    ///
    /// Returned by slot implementations; the protocol adapter consumes it and
    /// tries the next candidate.
    #[error("operation '{operator}' is not supported by this handler")]
    UnsupportedOperation {
        /// Operator symbol.
        operator: &'static str,
    },

    /// No handler accepted a binary operation or comparison.
    #[error("unsupported operand types for {operator}: '{left}' and '{right}'")]
    NoOperandHandler {
        /// Operator symbol.
        operator: &'static str,
        /// Type name of the left operand.
        left: String,
        /// Type name of the right operand.
        right: String,
    },

    /// Generic attribute lookup found nothing visible.
    #[error("'{type_name}' object has no attribute '{name}'")]
    NoSuchAttribute {
        /// Receiver type name.
        type_name: String,
        /// Attribute name.
        name: String,
    },

    /// A read-only accessor was written.
    #[error("attribute '{name}' of '{type_name}' objects is read-only")]
    ReadOnlyAttribute {
        /// Receiver type name.
        type_name: String,
        /// Attribute name.
        name: String,
    },

    /// No method entry resolves for the call.
    #[error("'{type_name}' object has no method '{name}'")]
    NoSuchMethod {
        /// Receiver type name.
        type_name: String,
        /// Method name.
        name: String,
    },

    /// Wrong number of call arguments.
    #[error("{method}() takes {expected} arguments ({got} given)")]
    ArgumentCount {
        /// Method name.
        method: String,
        /// Declared parameter count.
        expected: usize,
        /// Supplied argument count.
        got: usize,
    },

    /// A value does not fit the native slot it is stored into.
    #[error("value {value} is out of range for {target}")]
    ValueOutOfRange {
        /// Slot or operation description.
        target: String,
        /// Rendered value.
        value: String,
    },

    /// Iteration was requested from a value without an iterator entry.
    #[error("'{type_name}' object is not iterable")]
    NotIterable {
        /// Receiver type name.
        type_name: String,
    },

    /// An object's storage was re-entered while a native borrow was live.
    #[error("'{type_name}' object is already borrowed for {operation}")]
    AlreadyBorrowed {
        /// Receiver type name.
        type_name: String,
        /// The attempted operation.
        operation: &'static str,
    },

    /// A configuration value could not be parsed.
    #[error("invalid configuration value {key}={value}")]
    InvalidConfig {
        /// Configuration key.
        key: String,
        /// Raw value.
        value: String,
    },

    /// An error raised by user code inside a method or hook.
    #[error("{0}")]
    Raised(String),
}

impl Error {
    /// Builds a [`Error::TypeMismatch`].
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Error::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Builds a [`Error::NullReference`] for the given operation.
    pub fn null_reference(operation: impl Into<String>) -> Self {
        Error::NullReference {
            operation: operation.into(),
        }
    }

    /// Builds a [`Error::Raised`] from user code.
    pub fn raised(message: impl Into<String>) -> Self {
        Error::Raised(message.into())
    }

    /// Signals that a protocol slot cannot handle its operands.
    #[must_use]
    pub const fn unsupported(operator: &'static str) -> Self {
        Error::UnsupportedOperation { operator }
    }

    /// Returns `true` for [`Error::UnsupportedOperation`].
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Error::UnsupportedOperation { .. })
    }
}

/// Result type for `Strata` runtime operations.
pub type Result<T> = std::result::Result<T, Error>;
