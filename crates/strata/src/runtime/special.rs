//! Special protocol slots: comparison, arithmetic and iteration.
//!
//! A type exposes one unified slot per protocol instead of one method per
//! operator. The adapters here turn host-level operations into slot calls
//! and implement the fallback chain:
//!
//! | Protocol   | Order tried                                                    |
//! |------------|----------------------------------------------------------------|
//! | comparison | left slot, right slot (reflected op), builtin, identity (==/!=) |
//! | add / mul  | left slot, right slot (operands in original order), builtin     |
//!
//! A slot signals "not mine" by returning [`Error::UnsupportedOperation`]
//! (see [`Error::unsupported`]). The adapter consumes that and moves on; a
//! caller only ever sees [`Error::NoOperandHandler`].

use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::runtime::object::Object;
use crate::runtime::value::Value;
use std::cmp::Ordering;
use std::rc::Rc;

/// Rich comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// Operator to use when the operands are swapped.
    #[must_use]
    pub const fn reflected(self) -> CompareOp {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::Ne => CompareOp::Ne,
        }
    }

    /// Evaluates the operator against an ordering.
    #[must_use]
    pub const fn matches(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Lt => ordering.is_lt(),
            CompareOp::Le => ordering.is_le(),
            CompareOp::Eq => ordering.is_eq(),
            CompareOp::Ne => ordering.is_ne(),
            CompareOp::Gt => ordering.is_gt(),
            CompareOp::Ge => ordering.is_ge(),
        }
    }

    /// Operator symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Result of one iteration step.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The next item.
    Item(Value),
    /// No more items.
    Exhausted,
}

/// Unified comparison slot: `(self_operand, other, op)`.
pub type CompareSlot = Rc<dyn Fn(&Runtime, &Value, &Value, CompareOp) -> Result<Value>>;

/// Binary arithmetic slot: `(left, right)` in original order.
pub type BinarySlot = Rc<dyn Fn(&Runtime, &Value, &Value) -> Result<Value>>;

/// Produces an iterator value.
pub type IterSlot = Rc<dyn Fn(&Runtime, &Object) -> Result<Value>>;

/// Advances an iterator.
pub type NextSlot = Rc<dyn Fn(&Runtime, &Object) -> Result<Step>>;

/// Special protocol slots of a type, already merged with its base's.
#[derive(Clone, Default)]
pub struct SpecialSlots {
    pub(crate) compare: Option<CompareSlot>,
    pub(crate) add: Option<BinarySlot>,
    pub(crate) multiply: Option<BinarySlot>,
    pub(crate) iter: Option<IterSlot>,
    pub(crate) next: Option<NextSlot>,
}

impl SpecialSlots {
    /// Fills every slot this level left empty from `base`.
    #[must_use]
    pub(crate) fn inherit(self, base: &SpecialSlots) -> SpecialSlots {
        SpecialSlots {
            compare: self.compare.or_else(|| base.compare.clone()),
            add: self.add.or_else(|| base.add.clone()),
            multiply: self.multiply.or_else(|| base.multiply.clone()),
            iter: self.iter.or_else(|| base.iter.clone()),
            next: self.next.or_else(|| base.next.clone()),
        }
    }
}

fn slots_of(value: &Value) -> Option<&SpecialSlots> {
    value.as_object().map(|obj| &obj.ty().slots)
}

/// Turns `Err(UnsupportedOperation)` into `Ok(None)`.
fn handled(result: Result<Value>) -> Result<Option<Value>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_unsupported() => Ok(None),
        Err(err) => Err(err),
    }
}

fn no_handler(operator: &'static str, left: &Value, right: &Value) -> Error {
    Error::NoOperandHandler {
        operator,
        left: left.type_name().to_string(),
        right: right.type_name().to_string(),
    }
}

enum Number {
    Int(i64),
    Float(f64),
}

fn number(value: &Value) -> Option<Number> {
    match value {
        Value::Int(i) => Some(Number::Int(*i)),
        Value::Bool(b) => Some(Number::Int(i64::from(*b))),
        Value::Float(f) => Some(Number::Float(*f)),
        _ => None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(n: &Number) -> f64 {
    match n {
        Number::Int(i) => *i as f64,
        Number::Float(f) => *f,
    }
}

fn builtin_compare(left: &Value, right: &Value, op: CompareOp) -> Option<bool> {
    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => match (number(left)?, number(right)?) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => as_f64(&a).partial_cmp(&as_f64(&b)),
        },
    };
    // Unordered floats (NaN) are only "not equal".
    Some(ordering.map_or(op == CompareOp::Ne, |o| op.matches(o)))
}

fn overflow(operator: &str, left: i64, right: i64) -> Error {
    Error::ValueOutOfRange {
        target: "int".to_string(),
        value: format!("{left} {operator} {right}"),
    }
}

fn builtin_add(left: &Value, right: &Value) -> Option<Result<Value>> {
    if let (Value::Str(a), Value::Str(b)) = (left, right) {
        return Some(Ok(Value::Str(format!("{a}{b}").into())));
    }
    Some(match (number(left)?, number(right)?) {
        (Number::Int(a), Number::Int(b)) => a
            .checked_add(b)
            .map(Value::Int)
            .ok_or_else(|| overflow("+", a, b)),
        (a, b) => Ok(Value::Float(as_f64(&a) + as_f64(&b))),
    })
}

fn builtin_multiply(left: &Value, right: &Value) -> Option<Result<Value>> {
    match (left, right) {
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
            let count = usize::try_from(*n).unwrap_or(0);
            return Some(Ok(Value::Str(s.repeat(count).into())));
        }
        _ => {}
    }
    Some(match (number(left)?, number(right)?) {
        (Number::Int(a), Number::Int(b)) => a
            .checked_mul(b)
            .map(Value::Int)
            .ok_or_else(|| overflow("*", a, b)),
        (a, b) => Ok(Value::Float(as_f64(&a) * as_f64(&b))),
    })
}

impl Runtime {
    /// Rich comparison through the unified comparison slots.
    ///
    /// # Errors
    ///
    /// - [`Error::NoOperandHandler`] if no slot, builtin or identity rule
    ///   handles the operands.
    /// - Any other error raised by a slot.
    pub fn rich_compare(&self, left: &Value, right: &Value, op: CompareOp) -> Result<Value> {
        if let Some(slot) = slots_of(left).and_then(|s| s.compare.clone()) {
            if let Some(v) = handled(slot(self, left, right, op))? {
                return Ok(v);
            }
        }
        if let Some(slot) = slots_of(right).and_then(|s| s.compare.clone()) {
            if let Some(v) = handled(slot(self, right, left, op.reflected()))? {
                return Ok(v);
            }
        }
        if let Some(b) = builtin_compare(left, right, op) {
            return Ok(Value::Bool(b));
        }
        match op {
            CompareOp::Eq => Ok(Value::Bool(left.is(right))),
            CompareOp::Ne => Ok(Value::Bool(!left.is(right))),
            _ => Err(no_handler(op.symbol(), left, right)),
        }
    }

    /// [`Runtime::rich_compare`] reduced to host truthiness.
    ///
    /// # Errors
    ///
    /// Same as [`Runtime::rich_compare`].
    pub fn compare(&self, left: &Value, right: &Value, op: CompareOp) -> Result<bool> {
        self.rich_compare(left, right, op).map(|v| v.is_truthy())
    }

    fn binary(
        &self,
        operator: &'static str,
        select: fn(&SpecialSlots) -> Option<&BinarySlot>,
        builtin: fn(&Value, &Value) -> Option<Result<Value>>,
        left: &Value,
        right: &Value,
    ) -> Result<Value> {
        let left_slot = slots_of(left).and_then(select).cloned();
        let right_slot = slots_of(right).and_then(select).cloned();

        if let Some(slot) = &left_slot {
            if let Some(v) = handled(slot(self, left, right))? {
                return Ok(v);
            }
        }
        if let Some(slot) = &right_slot {
            let same = left_slot.as_ref().is_some_and(|l| Rc::ptr_eq(l, slot));
            if !same {
                if let Some(v) = handled(slot(self, left, right))? {
                    return Ok(v);
                }
            }
        }
        builtin(left, right).unwrap_or_else(|| Err(no_handler(operator, left, right)))
    }

    /// `left + right`.
    ///
    /// # Errors
    ///
    /// [`Error::NoOperandHandler`] if nothing handles the operands,
    /// [`Error::ValueOutOfRange`] on integer overflow, or a slot error.
    pub fn add(&self, left: &Value, right: &Value) -> Result<Value> {
        self.binary("+", |s| s.add.as_ref(), builtin_add, left, right)
    }

    /// `left * right`.
    ///
    /// # Errors
    ///
    /// Same as [`Runtime::add`].
    pub fn multiply(&self, left: &Value, right: &Value) -> Result<Value> {
        self.binary("*", |s| s.multiply.as_ref(), builtin_multiply, left, right)
    }

    /// Produces an iterator for `value`.
    ///
    /// # Errors
    ///
    /// - [`Error::NullReference`] for the null sentinel.
    /// - [`Error::NotIterable`] if the type has no iterator slot.
    pub fn iter(&self, value: &Value) -> Result<Value> {
        let obj = iterable(value, "iterate")?;
        let slot = obj.ty().slots.iter.clone().ok_or_else(|| Error::NotIterable {
            type_name: value.type_name().to_string(),
        })?;
        slot(self, obj)
    }

    /// Advances an iterator value.
    ///
    /// # Errors
    ///
    /// - [`Error::NullReference`] for the null sentinel.
    /// - [`Error::NotIterable`] if the type has no next slot.
    pub fn next(&self, iterator: &Value) -> Result<Step> {
        let obj = iterable(iterator, "advance")?;
        let slot = obj.ty().slots.next.clone().ok_or_else(|| Error::NotIterable {
            type_name: iterator.type_name().to_string(),
        })?;
        slot(self, obj)
    }

    /// Adapts the iteration protocol of `value` to a Rust iterator.
    ///
    /// # Errors
    ///
    /// Same as [`Runtime::iter`].
    pub fn host_iter(&self, value: &Value) -> Result<HostIter<'_>> {
        Ok(HostIter {
            runtime: self,
            iterator: self.iter(value)?,
            done: false,
        })
    }
}

fn iterable<'v>(value: &'v Value, operation: &str) -> Result<&'v Object> {
    match value {
        Value::Object(obj) => Ok(obj),
        Value::Null => Err(Error::null_reference(format!("{operation} null"))),
        other => Err(Error::NotIterable {
            type_name: other.type_name().to_string(),
        }),
    }
}

/// Rust iterator over a host iterator value.
///
/// Yields `Err` at most once; iteration stops after an error or after
/// [`Step::Exhausted`].
pub struct HostIter<'rt> {
    runtime: &'rt Runtime,
    iterator: Value,
    done: bool,
}

impl HostIter<'_> {
    /// The underlying iterator value.
    #[must_use]
    pub fn iterator(&self) -> &Value {
        &self.iterator
    }
}

impl Iterator for HostIter<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.runtime.next(&self.iterator) {
            Ok(Step::Item(value)) => Some(Ok(value)),
            Ok(Step::Exhausted) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflection_is_an_involution() {
        for op in [
            CompareOp::Lt,
            CompareOp::Le,
            CompareOp::Eq,
            CompareOp::Ne,
            CompareOp::Gt,
            CompareOp::Ge,
        ] {
            assert_eq!(op.reflected().reflected(), op);
            assert_eq!(op.matches(Ordering::Less), op.reflected().matches(Ordering::Greater));
        }
    }

    #[test]
    fn test_builtin_scalars() {
        let rt = Runtime::default();

        assert!(rt.compare(&Value::Float(5.0), &Value::Float(3.0), CompareOp::Gt).unwrap());
        assert!(!rt.compare(&Value::Float(5.0), &Value::Float(3.0), CompareOp::Eq).unwrap());
        assert!(rt.compare(&Value::Int(2), &Value::Float(2.0), CompareOp::Eq).unwrap());
        assert!(rt.compare(&Value::from("a"), &Value::from("b"), CompareOp::Lt).unwrap());
        assert!(!rt.compare(&Value::Float(f64::NAN), &Value::Float(f64::NAN), CompareOp::Eq).unwrap());
        assert!(rt.compare(&Value::Null, &Value::Null, CompareOp::Eq).unwrap());

        assert!(matches!(
            rt.compare(&Value::Null, &Value::Int(1), CompareOp::Lt),
            Err(Error::NoOperandHandler { operator: "<", .. })
        ));
    }

    #[test]
    fn test_builtin_arithmetic() {
        let rt = Runtime::default();

        assert_eq!(rt.add(&Value::Int(2), &Value::Int(3)).unwrap(), Value::Int(5));
        assert_eq!(rt.add(&Value::Int(2), &Value::Float(0.5)).unwrap(), Value::Float(2.5));
        assert_eq!(rt.add(&Value::from("ab"), &Value::from("c")).unwrap(), Value::from("abc"));
        assert_eq!(rt.multiply(&Value::from("ab"), &Value::Int(2)).unwrap(), Value::from("abab"));
        assert!(matches!(
            rt.add(&Value::Int(i64::MAX), &Value::Int(1)),
            Err(Error::ValueOutOfRange { .. })
        ));
        assert!(matches!(
            rt.add(&Value::from("a"), &Value::Int(1)),
            Err(Error::NoOperandHandler { operator: "+", .. })
        ));
    }

    #[test]
    fn test_iteration_of_scalars_and_null() {
        let rt = Runtime::default();

        assert!(matches!(rt.iter(&Value::Int(3)), Err(Error::NotIterable { .. })));
        assert!(matches!(rt.iter(&Value::Null), Err(Error::NullReference { .. })));
        assert!(matches!(rt.next(&Value::Null), Err(Error::NullReference { .. })));
    }
}
