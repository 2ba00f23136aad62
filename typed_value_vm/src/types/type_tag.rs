//! Type descriptors for dispatch-time matching.
//!
//! `TypeTag` is the declared-type vocabulary the dispatcher works with:
//! the fixed-width register types, strings, structural tuple/record
//! shapes, shared cells, and function values. A tag is what a parameter's
//! type filter names, what a compiled specialization's exact argument
//! types are expressed in, and what a closure layout is described with.
//!
//! Tags are plain data: matching and conversion live in [`super::coerce`].

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Broad category of a type tag, used by the match/coerce predicates.
///
/// The register categories (`Bool`, `Integer`, `Float`) are the ones with
/// conversion-hook semantics on the explicit pass; everything else matches
/// structurally or by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    Bool,
    Integer,
    Float,
    Str,
    None,
    Tuple,
    Record,
    Cell,
    Function,
}

impl TypeCategory {
    /// True for the categories stored in fixed-width register slots.
    pub fn is_register(self) -> bool {
        matches!(
            self,
            TypeCategory::Bool | TypeCategory::Integer | TypeCategory::Float
        )
    }

    /// True for categories that participate in numeric conversion
    /// (a bool is an integer of width one for conversion purposes).
    pub fn is_numeric(self) -> bool {
        self.is_register()
    }
}

/// A type descriptor.
///
/// `TupleOf`/`RecordOf` are structural: two tags are the same type exactly
/// when they are equal. `Cell` is the shared-mutable-cell storage type used
/// in closure layouts. `Function` is the opaque function-value tag (the
/// full descriptor for a specific function lives on the value itself).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Str,
    None,
    TupleOf(Vec<TypeTag>),
    RecordOf(Vec<(String, TypeTag)>),
    Cell,
    Function,
}

impl TypeTag {
    pub fn category(&self) -> TypeCategory {
        match self {
            TypeTag::Bool => TypeCategory::Bool,
            TypeTag::I8
            | TypeTag::I16
            | TypeTag::I32
            | TypeTag::I64
            | TypeTag::U8
            | TypeTag::U16
            | TypeTag::U32
            | TypeTag::U64 => TypeCategory::Integer,
            TypeTag::F32 | TypeTag::F64 => TypeCategory::Float,
            TypeTag::Str => TypeCategory::Str,
            TypeTag::None => TypeCategory::None,
            TypeTag::TupleOf(_) => TypeCategory::Tuple,
            TypeTag::RecordOf(_) => TypeCategory::Record,
            TypeTag::Cell => TypeCategory::Cell,
            TypeTag::Function => TypeCategory::Function,
        }
    }

    pub fn is_integer(&self) -> bool {
        self.category() == TypeCategory::Integer
    }

    pub fn is_float(&self) -> bool {
        self.category() == TypeCategory::Float
    }

    /// Look up a scalar tag by its display name (`"Int64"`, `"Float32"`, ...).
    /// Structural tags (`Tuple{...}`, `Record{...}`) are not parsed here.
    pub fn from_name(name: &str) -> Option<TypeTag> {
        SCALAR_TAGS_BY_NAME.get(name).cloned()
    }

    /// The display name used in rendered call shapes and error text.
    pub fn display_name(&self) -> String {
        match self {
            TypeTag::Bool => "Bool".to_string(),
            TypeTag::I8 => "Int8".to_string(),
            TypeTag::I16 => "Int16".to_string(),
            TypeTag::I32 => "Int32".to_string(),
            TypeTag::I64 => "Int64".to_string(),
            TypeTag::U8 => "UInt8".to_string(),
            TypeTag::U16 => "UInt16".to_string(),
            TypeTag::U32 => "UInt32".to_string(),
            TypeTag::U64 => "UInt64".to_string(),
            TypeTag::F32 => "Float32".to_string(),
            TypeTag::F64 => "Float64".to_string(),
            TypeTag::Str => "String".to_string(),
            TypeTag::None => "NoneType".to_string(),
            TypeTag::TupleOf(elts) => {
                let inner: Vec<String> = elts.iter().map(TypeTag::display_name).collect();
                format!("Tuple{{{}}}", inner.join(","))
            }
            TypeTag::RecordOf(fields) => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|(name, ty)| format!("{}:{}", name, ty.display_name()))
                    .collect();
                format!("Record{{{}}}", inner.join(","))
            }
            TypeTag::Cell => "Cell".to_string(),
            TypeTag::Function => "Function".to_string(),
        }
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Static name table for the scalar tags. Read-only after first use.
static SCALAR_TAGS_BY_NAME: Lazy<HashMap<&'static str, TypeTag>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("Bool", TypeTag::Bool);
    m.insert("Int8", TypeTag::I8);
    m.insert("Int16", TypeTag::I16);
    m.insert("Int32", TypeTag::I32);
    m.insert("Int64", TypeTag::I64);
    m.insert("UInt8", TypeTag::U8);
    m.insert("UInt16", TypeTag::U16);
    m.insert("UInt32", TypeTag::U32);
    m.insert("UInt64", TypeTag::U64);
    m.insert("Float32", TypeTag::F32);
    m.insert("Float64", TypeTag::F64);
    m.insert("String", TypeTag::Str);
    m.insert("NoneType", TypeTag::None);
    m.insert("Cell", TypeTag::Cell);
    m.insert("Function", TypeTag::Function);
    m
});
