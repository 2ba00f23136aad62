//! Value-to-type matching and conversion.
//!
//! Two entry points, used at different moments of a dispatch:
//!
//! - [`could_match`] is the pure predicate ("could this value be, or be
//!   converted to, this type?"). It never mutates and never allocates
//!   typed storage; the resolver uses it as a cheap short-circuit before
//!   committing to conversion, and the native dispatcher uses it again to
//!   validate a specialization's exact argument types.
//! - [`coerce`] performs the conversion, producing the canonical host
//!   representation of the target type (native Int64/Float64/Bool/String,
//!   typed wrappers for the narrower register widths).
//!
//! The `explicit` flag selects the conversion mode. Implicit accepts only
//! naturally compatible representations: the host's native bool for a
//! boolean filter, a native integer literal for integer filters, an exact
//! float for float filters, or a value already tagged with the identical
//! internal type. Explicit additionally accepts any value exposing a
//! conversion hook appropriate to the filter's category: integer-like and
//! float-like hooks for the numeric registers, truthiness for booleans.

use crate::host::{HostValue, TypedValue};
use crate::types::TypeTag;

/// Failure to convert a value to a target type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionError {
    pub target: TypeTag,
    pub value_type: String,
}

impl ConversionError {
    fn new(target: &TypeTag, value: &HostValue) -> Self {
        Self {
            target: target.clone(),
            value_type: value.type_name(),
        }
    }
}

impl std::fmt::Display for ConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cannot convert value of type {} to {}",
            self.value_type, self.target
        )
    }
}

impl std::error::Error for ConversionError {}

/// Could `value` be (or be converted to) `filter`?
pub fn could_match(filter: &TypeTag, value: &HostValue, explicit: bool) -> bool {
    // A value already tagged with the identical internal type always
    // matches, on either pass.
    if let HostValue::Typed(tv) = value {
        if tv.tag() == *filter {
            return true;
        }
    }

    match filter {
        t if t.is_integer() => match value {
            HostValue::Int(_) => true,
            _ if !explicit => false,
            other => other.has_int_hook(),
        },
        t if t.is_float() => match value {
            HostValue::Float(_) => true,
            _ if !explicit => false,
            other => other.has_float_hook(),
        },
        TypeTag::Bool => explicit || matches!(value, HostValue::Bool(_)),
        TypeTag::Str => matches!(value, HostValue::Str(_)),
        TypeTag::None => matches!(value, HostValue::None),
        TypeTag::Cell => value.as_cell().is_some(),
        TypeTag::Function => {
            matches!(value, HostValue::Function(_) | HostValue::HostFn(_))
        }
        TypeTag::TupleOf(elts) => match value {
            HostValue::Tuple(xs) => {
                xs.len() == elts.len()
                    && elts
                        .iter()
                        .zip(xs.iter())
                        .all(|(e, x)| could_match(e, x, explicit))
            }
            _ => false,
        },
        TypeTag::RecordOf(fields) => match value {
            HostValue::Record(entries) => {
                entries.len() == fields.len()
                    && fields.iter().zip(entries.iter()).all(|((fname, fty), (ename, ev))| {
                        fname == ename && could_match(fty, ev, explicit)
                    })
            }
            _ => false,
        },
        _ => false,
    }
}

/// Convert `value` to `filter`, producing the canonical host
/// representation of the target type.
pub fn coerce(
    filter: &TypeTag,
    value: &HostValue,
    explicit: bool,
) -> Result<HostValue, ConversionError> {
    // Identity: already tagged with the target type.
    if let HostValue::Typed(tv) = value {
        if tv.tag() == *filter {
            return Ok(value.clone());
        }
    }

    match filter {
        t if t.is_integer() => int_source(value, explicit)
            .map(|i| make_int(t, i))
            .ok_or_else(|| ConversionError::new(filter, value)),
        t if t.is_float() => float_source(value, explicit)
            .map(|f| make_float(t, f))
            .ok_or_else(|| ConversionError::new(filter, value)),
        TypeTag::Bool => match value {
            HostValue::Bool(b) => Ok(HostValue::Bool(*b)),
            other if explicit => Ok(HostValue::Bool(other.truthy())),
            _ => Err(ConversionError::new(filter, value)),
        },
        TypeTag::Str => match value {
            HostValue::Str(_) => Ok(value.clone()),
            _ => Err(ConversionError::new(filter, value)),
        },
        TypeTag::None => match value {
            HostValue::None => Ok(HostValue::None),
            _ => Err(ConversionError::new(filter, value)),
        },
        TypeTag::Cell => value
            .as_cell()
            .map(|cell| HostValue::Cell(cell.clone()))
            .ok_or_else(|| ConversionError::new(filter, value)),
        TypeTag::Function => match value {
            HostValue::Function(_) => Ok(value.clone()),
            _ => Err(ConversionError::new(filter, value)),
        },
        TypeTag::TupleOf(elts) => match value {
            HostValue::Tuple(xs) if xs.len() == elts.len() => {
                let converted: Result<Vec<HostValue>, ConversionError> = elts
                    .iter()
                    .zip(xs.iter())
                    .map(|(e, x)| coerce(e, x, explicit))
                    .collect();
                Ok(HostValue::tuple(converted?))
            }
            _ => Err(ConversionError::new(filter, value)),
        },
        TypeTag::RecordOf(fields) => match value {
            HostValue::Record(entries) if entries.len() == fields.len() => {
                let converted: Result<Vec<(String, HostValue)>, ConversionError> = fields
                    .iter()
                    .zip(entries.iter())
                    .map(|((fname, fty), (ename, ev))| {
                        if fname != ename {
                            return Err(ConversionError::new(filter, value));
                        }
                        Ok((fname.clone(), coerce(fty, ev, explicit)?))
                    })
                    .collect();
                Ok(HostValue::record(converted?))
            }
            _ => Err(ConversionError::new(filter, value)),
        },
        _ => Err(ConversionError::new(filter, value)),
    }
}

/// Convert `value` into owned typed storage of exactly `filter`, using
/// implicit conversion only. Used for specialization argument extraction.
pub fn typed_storage(filter: &TypeTag, value: &HostValue) -> Option<TypedValue> {
    coerce(filter, value, false).ok()?.to_typed()
}

/// An integer source for the target, under the given conversion mode.
/// Identity conversions were handled before this is called, so a typed
/// source here is a cross-width or cross-category conversion and needs
/// the explicit mode.
fn int_source(value: &HostValue, explicit: bool) -> Option<i64> {
    match value {
        HostValue::Int(i) => Some(*i),
        HostValue::Bool(b) if explicit => Some(i64::from(*b)),
        HostValue::Float(f) if explicit => finite_trunc(*f),
        HostValue::Typed(tv) if explicit && tv.tag().category().is_numeric() => match tv {
            TypedValue::F32(f) => finite_trunc(f64::from(*f)),
            TypedValue::F64(f) => finite_trunc(*f),
            other => other.as_i64(),
        },
        _ => None,
    }
}

/// A float source for the target, under the given conversion mode.
fn float_source(value: &HostValue, explicit: bool) -> Option<f64> {
    match value {
        HostValue::Float(f) => Some(*f),
        HostValue::Int(i) if explicit => Some(*i as f64),
        HostValue::Bool(b) if explicit => Some(if *b { 1.0 } else { 0.0 }),
        HostValue::Typed(tv) if explicit && tv.tag().category().is_numeric() => tv.as_f64(),
        _ => None,
    }
}

/// There is no integer representation for a non-finite float.
fn finite_trunc(f: f64) -> Option<i64> {
    if f.is_finite() {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

fn make_int(target: &TypeTag, i: i64) -> HostValue {
    match target {
        TypeTag::I64 => HostValue::Int(i),
        TypeTag::I8 => HostValue::Typed(TypedValue::I8(i as i8)),
        TypeTag::I16 => HostValue::Typed(TypedValue::I16(i as i16)),
        TypeTag::I32 => HostValue::Typed(TypedValue::I32(i as i32)),
        TypeTag::U8 => HostValue::Typed(TypedValue::U8(i as u8)),
        TypeTag::U16 => HostValue::Typed(TypedValue::U16(i as u16)),
        TypeTag::U32 => HostValue::Typed(TypedValue::U32(i as u32)),
        TypeTag::U64 => HostValue::Typed(TypedValue::U64(i as u64)),
        // Callers only pass integer tags here.
        _ => HostValue::Int(i),
    }
}

fn make_float(target: &TypeTag, f: f64) -> HostValue {
    match target {
        TypeTag::F32 => HostValue::Typed(TypedValue::F32(f as f32)),
        // Callers only pass float tags here.
        _ => HostValue::Float(f),
    }
}
