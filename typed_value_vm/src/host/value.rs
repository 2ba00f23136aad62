//! Dynamic host values and owned typed storage.
//!
//! `HostValue` is what call sites hand the dispatcher: native scalars,
//! tuples, shared mutable cells, untyped host functions, typed function
//! instances, and `Typed` values (register values already tagged with an
//! internal type). `TypedValue` is the owned typed storage representation
//! used for compiled-specialization argument and return slots.
//!
//! Ownership is `Rc`-based throughout: cloning a value is cheap and never
//! copies shared storage, and a cell clone shares identity with the
//! original (mutation is visible through every handle).

use std::cell::RefCell;
use std::rc::Rc;

use crate::function::convert::HostFunction;
use crate::function::FunctionInstance;
use crate::types::TypeTag;

/// A shared mutable storage cell.
///
/// The cell's *identity* is what a closure captures: every clone of a
/// `SharedCell` refers to the same slot, so a write through one handle is
/// visible through all of them. A cell may be empty (the captured variable
/// was never assigned).
#[derive(Clone, Default)]
pub struct SharedCell {
    slot: Rc<RefCell<Option<HostValue>>>,
}

impl SharedCell {
    /// A new, unassigned cell.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A new cell holding `value`.
    pub fn new(value: HostValue) -> Self {
        Self {
            slot: Rc::new(RefCell::new(Some(value))),
        }
    }

    /// The current contents, cloned out. `None` if the cell is empty.
    pub fn get(&self) -> Option<HostValue> {
        self.slot.borrow().clone()
    }

    pub fn set(&self, value: HostValue) {
        *self.slot.borrow_mut() = Some(value);
    }

    pub fn clear(&self) {
        *self.slot.borrow_mut() = None;
    }

    pub fn is_empty(&self) -> bool {
        self.slot.borrow().is_none()
    }

    /// Identity comparison: do two handles name the same storage?
    pub fn shares_storage_with(&self, other: &SharedCell) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot)
    }
}

impl std::fmt::Debug for SharedCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.slot.try_borrow() {
            Ok(inner) => write!(f, "SharedCell({:?})", *inner),
            Err(_) => write!(f, "SharedCell(<borrowed>)"),
        }
    }
}

impl PartialEq for SharedCell {
    fn eq(&self, other: &Self) -> bool {
        self.shares_storage_with(other)
    }
}

/// Owned typed storage: one value in its exact-width representation.
///
/// This is the slot format compiled specializations read and write. The
/// variant is the type: `tag()` recovers the corresponding [`TypeTag`].
#[derive(Debug, Clone)]
pub enum TypedValue {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    Tuple(Vec<TypedValue>),
    Record(Vec<(String, TypedValue)>),
    Cell(SharedCell),
    Function(FunctionInstance),
    None,
}

impl TypedValue {
    pub fn tag(&self) -> TypeTag {
        match self {
            TypedValue::Bool(_) => TypeTag::Bool,
            TypedValue::I8(_) => TypeTag::I8,
            TypedValue::I16(_) => TypeTag::I16,
            TypedValue::I32(_) => TypeTag::I32,
            TypedValue::I64(_) => TypeTag::I64,
            TypedValue::U8(_) => TypeTag::U8,
            TypedValue::U16(_) => TypeTag::U16,
            TypedValue::U32(_) => TypeTag::U32,
            TypedValue::U64(_) => TypeTag::U64,
            TypedValue::F32(_) => TypeTag::F32,
            TypedValue::F64(_) => TypeTag::F64,
            TypedValue::Str(_) => TypeTag::Str,
            TypedValue::Tuple(elts) => TypeTag::TupleOf(elts.iter().map(TypedValue::tag).collect()),
            TypedValue::Record(fields) => TypeTag::RecordOf(
                fields
                    .iter()
                    .map(|(name, v)| (name.clone(), v.tag()))
                    .collect(),
            ),
            TypedValue::Cell(_) => TypeTag::Cell,
            TypedValue::Function(_) => TypeTag::Function,
            TypedValue::None => TypeTag::None,
        }
    }

    /// Widen a numeric register value to `i64`. `None` for non-numerics.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TypedValue::Bool(b) => Some(i64::from(*b)),
            TypedValue::I8(v) => Some(i64::from(*v)),
            TypedValue::I16(v) => Some(i64::from(*v)),
            TypedValue::I32(v) => Some(i64::from(*v)),
            TypedValue::I64(v) => Some(*v),
            TypedValue::U8(v) => Some(i64::from(*v)),
            TypedValue::U16(v) => Some(i64::from(*v)),
            TypedValue::U32(v) => Some(i64::from(*v)),
            TypedValue::U64(v) => Some(*v as i64),
            TypedValue::F32(v) => Some(*v as i64),
            TypedValue::F64(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Widen a numeric register value to `f64`. `None` for non-numerics.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TypedValue::F32(v) => Some(f64::from(*v)),
            TypedValue::F64(v) => Some(*v),
            other => other.as_i64().map(|i| i as f64),
        }
    }
}

impl PartialEq for TypedValue {
    fn eq(&self, other: &Self) -> bool {
        use TypedValue::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a == b,
            (I8(a), I8(b)) => a == b,
            (I16(a), I16(b)) => a == b,
            (I32(a), I32(b)) => a == b,
            (I64(a), I64(b)) => a == b,
            (U8(a), U8(b)) => a == b,
            (U16(a), U16(b)) => a == b,
            (U32(a), U32(b)) => a == b,
            (U64(a), U64(b)) => a == b,
            (F32(a), F32(b)) => a == b,
            (F64(a), F64(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Tuple(a), Tuple(b)) => a == b,
            (Record(a), Record(b)) => a == b,
            (Cell(a), Cell(b)) => a == b,
            (Function(a), Function(b)) => a == b,
            (None, None) => true,
            _ => false,
        }
    }
}

/// A dynamic host value.
#[derive(Debug, Clone)]
pub enum HostValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    None,
    Tuple(Rc<Vec<HostValue>>),
    Record(Rc<Vec<(String, HostValue)>>),
    Cell(SharedCell),
    HostFn(Rc<HostFunction>),
    Function(FunctionInstance),
    Typed(TypedValue),
}

impl HostValue {
    pub fn tuple(elts: Vec<HostValue>) -> Self {
        HostValue::Tuple(Rc::new(elts))
    }

    pub fn record(fields: Vec<(String, HostValue)>) -> Self {
        HostValue::Record(Rc::new(fields))
    }

    /// The name rendered into call-shape descriptions and error text.
    /// Host natives use the host's lowercase spellings; typed values use
    /// their tag's display name.
    pub fn type_name(&self) -> String {
        match self {
            HostValue::Bool(_) => "bool".to_string(),
            HostValue::Int(_) => "int".to_string(),
            HostValue::Float(_) => "float".to_string(),
            HostValue::Str(_) => "str".to_string(),
            HostValue::None => "NoneType".to_string(),
            HostValue::Tuple(_) => "tuple".to_string(),
            HostValue::Record(_) => "record".to_string(),
            HostValue::Cell(_) => "cell".to_string(),
            HostValue::HostFn(_) => "function".to_string(),
            HostValue::Function(inst) => inst.ty().name().to_string(),
            HostValue::Typed(tv) => tv.tag().display_name(),
        }
    }

    /// Does this value expose an integer conversion hook?  Mirrors the
    /// host's "has `__int__`" notion: native numerics and register-typed
    /// numerics do, everything else does not.
    pub fn has_int_hook(&self) -> bool {
        match self {
            HostValue::Bool(_) | HostValue::Int(_) | HostValue::Float(_) => true,
            HostValue::Typed(tv) => tv.tag().category().is_numeric(),
            _ => false,
        }
    }

    /// Does this value expose a float conversion hook?
    pub fn has_float_hook(&self) -> bool {
        self.has_int_hook()
    }

    /// Host truthiness, used by explicit boolean conversion.
    pub fn truthy(&self) -> bool {
        match self {
            HostValue::Bool(b) => *b,
            HostValue::Int(i) => *i != 0,
            HostValue::Float(f) => *f != 0.0,
            HostValue::Str(s) => !s.is_empty(),
            HostValue::None => false,
            HostValue::Tuple(elts) => !elts.is_empty(),
            HostValue::Record(fields) => !fields.is_empty(),
            HostValue::Cell(_) | HostValue::HostFn(_) | HostValue::Function(_) => true,
            HostValue::Typed(tv) => match tv {
                TypedValue::Str(s) => !s.is_empty(),
                TypedValue::Tuple(elts) => !elts.is_empty(),
                TypedValue::Record(fields) => !fields.is_empty(),
                TypedValue::None => false,
                other => other.as_f64().map(|f| f != 0.0).unwrap_or(true),
            },
        }
    }

    /// Integer view that sees through the typed wrapper. `None` when the
    /// value has no integer representation.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HostValue::Bool(b) => Some(i64::from(*b)),
            HostValue::Int(i) => Some(*i),
            HostValue::Typed(tv) => tv.as_i64(),
            _ => None,
        }
    }

    /// Float view that sees through the typed wrapper.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Float(f) => Some(*f),
            HostValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            HostValue::Int(i) => Some(*i as f64),
            HostValue::Typed(tv) => tv.as_f64(),
            _ => None,
        }
    }

    /// String view that sees through the typed wrapper.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Str(s) => Some(s),
            HostValue::Typed(TypedValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// The shared cell inside this value, if it is one.
    pub fn as_cell(&self) -> Option<&SharedCell> {
        match self {
            HostValue::Cell(cell) => Some(cell),
            HostValue::Typed(TypedValue::Cell(cell)) => Some(cell),
            _ => None,
        }
    }

    /// Convert into owned typed storage without any type-directed
    /// conversion: each representation maps to its exact typed form.
    /// Untyped host functions have no typed form.
    pub fn to_typed(&self) -> Option<TypedValue> {
        match self {
            HostValue::Bool(b) => Some(TypedValue::Bool(*b)),
            HostValue::Int(i) => Some(TypedValue::I64(*i)),
            HostValue::Float(f) => Some(TypedValue::F64(*f)),
            HostValue::Str(s) => Some(TypedValue::Str(s.clone())),
            HostValue::None => Some(TypedValue::None),
            HostValue::Tuple(elts) => elts
                .iter()
                .map(HostValue::to_typed)
                .collect::<Option<Vec<_>>>()
                .map(TypedValue::Tuple),
            HostValue::Record(fields) => fields
                .iter()
                .map(|(name, v)| v.to_typed().map(|tv| (name.clone(), tv)))
                .collect::<Option<Vec<_>>>()
                .map(TypedValue::Record),
            HostValue::Cell(cell) => Some(TypedValue::Cell(cell.clone())),
            HostValue::HostFn(_) => None,
            HostValue::Function(inst) => Some(TypedValue::Function(inst.clone())),
            HostValue::Typed(tv) => Some(tv.clone()),
        }
    }

    /// Rebuild a host value from typed storage, unwrapping the register
    /// types that have a canonical host-native representation (Int64,
    /// Float64, Bool, String, NoneType). Narrower widths stay typed.
    pub fn from_typed(tv: TypedValue) -> HostValue {
        match tv {
            TypedValue::Bool(b) => HostValue::Bool(b),
            TypedValue::I64(i) => HostValue::Int(i),
            TypedValue::F64(f) => HostValue::Float(f),
            TypedValue::Str(s) => HostValue::Str(s),
            TypedValue::None => HostValue::None,
            TypedValue::Cell(cell) => HostValue::Cell(cell),
            TypedValue::Function(inst) => HostValue::Function(inst),
            other => HostValue::Typed(other),
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        use HostValue::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (None, None) => true,
            (Tuple(a), Tuple(b)) => a == b,
            (Record(a), Record(b)) => a == b,
            (Cell(a), Cell(b)) => a == b,
            (HostFn(a), HostFn(b)) => Rc::ptr_eq(a, b),
            (Function(a), Function(b)) => a == b,
            (Typed(a), Typed(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for HostValue {
    fn from(v: bool) -> Self {
        HostValue::Bool(v)
    }
}

impl From<i64> for HostValue {
    fn from(v: i64) -> Self {
        HostValue::Int(v)
    }
}

impl From<f64> for HostValue {
    fn from(v: f64) -> Self {
        HostValue::Float(v)
    }
}

impl From<&str> for HostValue {
    fn from(v: &str) -> Self {
        HostValue::Str(v.to_string())
    }
}

impl From<String> for HostValue {
    fn from(v: String) -> Self {
        HostValue::Str(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_cell_identity() {
        let a = SharedCell::new(HostValue::Int(1));
        let b = a.clone();
        let c = SharedCell::new(HostValue::Int(1));

        assert!(a.shares_storage_with(&b));
        assert!(!a.shares_storage_with(&c));

        b.set(HostValue::Int(2));
        assert_eq!(a.get(), Some(HostValue::Int(2)));
    }

    #[test]
    fn test_shared_cell_empty() {
        let cell = SharedCell::empty();
        assert!(cell.is_empty());
        assert_eq!(cell.get(), None);
        cell.set(HostValue::Bool(true));
        assert!(!cell.is_empty());
    }

    #[test]
    fn test_typed_value_tags() {
        assert_eq!(TypedValue::I32(0).tag(), TypeTag::I32);
        assert_eq!(
            TypedValue::Tuple(vec![TypedValue::I64(1), TypedValue::Str("x".into())]).tag(),
            TypeTag::TupleOf(vec![TypeTag::I64, TypeTag::Str])
        );
    }

    #[test]
    fn test_from_typed_unwraps_canonical_registers() {
        assert_eq!(HostValue::from_typed(TypedValue::I64(7)), HostValue::Int(7));
        assert_eq!(
            HostValue::from_typed(TypedValue::F64(1.5)),
            HostValue::Float(1.5)
        );
        assert_eq!(
            HostValue::from_typed(TypedValue::Bool(true)),
            HostValue::Bool(true)
        );
        // Narrower widths keep their typed wrapper.
        assert_eq!(
            HostValue::from_typed(TypedValue::I32(7)),
            HostValue::Typed(TypedValue::I32(7))
        );
    }

    #[test]
    fn test_conversion_hooks() {
        assert!(HostValue::Int(3).has_int_hook());
        assert!(HostValue::Float(3.5).has_int_hook());
        assert!(HostValue::Bool(true).has_float_hook());
        assert!(HostValue::Typed(TypedValue::I16(2)).has_int_hook());
        assert!(!HostValue::Str("3".into()).has_int_hook());
        assert!(!HostValue::None.has_float_hook());
    }

    #[test]
    fn test_truthiness() {
        assert!(!HostValue::Int(0).truthy());
        assert!(HostValue::Int(-1).truthy());
        assert!(!HostValue::Str(String::new()).truthy());
        assert!(HostValue::Str("x".into()).truthy());
        assert!(!HostValue::None.truthy());
        assert!(HostValue::tuple(vec![HostValue::None]).truthy());
        assert!(!HostValue::tuple(vec![]).truthy());
    }
}
