//! Converting ordinary host functions into typed function values.
//!
//! An untyped host function carries its parameters, an optional return
//! annotation, and its captured cells. Conversion builds the typed
//! descriptor (one overload, an all-cell closure layout, one binding per
//! capture) and packs the closure storage. Descriptor construction is
//! memoized in the process-scoped cache, keyed by (code identity, flags):
//! converting the same function twice yields the same descriptor, so
//! specializations compiled through one conversion are visible through
//! the other.
//!
//! Packing inspects each capture against the declared slot type: a
//! cell-typed slot stores a reference to the *same* cell (later mutation
//! is visible both ways); any other slot copy-constructs the captured
//! value into typed storage, and an empty cell is a conversion error.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::host::{HostValue, SharedCell};
use crate::runtime::{log_dispatch, RuntimeCaches};
use crate::types::{coerce, CallError, TypeTag};

use super::closure::{BindingStep, ClosureBinding};
use super::{FunctionInstance, FunctionValue, InterpretedBody, Overload, Param};

/// An ordinary (untyped) host function: the raw material conversion
/// starts from.
#[derive(Debug, Clone)]
pub struct HostFunction {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeTag>,
    captures: Vec<(String, SharedCell)>,
    pub body: InterpretedBody,
}

impl HostFunction {
    pub fn new(name: impl Into<String>, params: Vec<Param>, body: InterpretedBody) -> Self {
        Self {
            name: name.into(),
            params,
            return_type: None,
            captures: Vec::new(),
            body,
        }
    }

    pub fn with_return_type(mut self, return_type: TypeTag) -> Self {
        self.return_type = Some(return_type);
        self
    }

    /// Declare a captured variable backed by `cell`.
    pub fn with_capture(mut self, name: impl Into<String>, cell: SharedCell) -> Self {
        self.captures.push((name.into(), cell));
        self
    }

    pub fn captures(&self) -> &[(String, SharedCell)] {
        &self.captures
    }

    pub fn capture_cell(&self, name: &str) -> Option<&SharedCell> {
        self.captures
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, cell)| cell)
    }

    /// Identity of the syntactic body; the conversion memo key.
    pub fn code_id(&self) -> u64 {
        self.body.code_id()
    }
}

/// Conversion options, part of the memo key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConvertFlags {
    /// Drop the function's type annotations (parameter filters and the
    /// return type) from the produced descriptor.
    pub ignore_annotations: bool,
}

/// Process-scoped memo: (code identity, flags) → descriptor. Append-only;
/// entries are immutable once inserted.
#[derive(Debug, Default)]
pub struct FunctionTypeCache {
    entries: RefCell<HashMap<(u64, ConvertFlags), Rc<FunctionValue>>>,
}

impl FunctionTypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    fn get_or_insert_with(
        &self,
        key: (u64, ConvertFlags),
        build: impl FnOnce() -> Rc<FunctionValue>,
    ) -> Rc<FunctionValue> {
        if let Some(found) = self.entries.borrow().get(&key) {
            return found.clone();
        }
        // Build without holding the borrow: descriptor construction may
        // re-enter the cache for nested functions.
        let built = build();
        self.entries
            .borrow_mut()
            .entry(key)
            .or_insert(built)
            .clone()
    }
}

/// The typed descriptor for a host function, memoized by (code, flags).
pub fn function_type_for(
    host: &HostFunction,
    flags: ConvertFlags,
    caches: &RuntimeCaches,
) -> Rc<FunctionValue> {
    caches
        .function_types()
        .get_or_insert_with((host.code_id(), flags), || {
            log_dispatch(&format!(
                "[convert] building function type for '{}' (code {})",
                host.name,
                host.code_id()
            ));

            let mut params = host.params.clone();
            let mut return_type = host.return_type.clone();
            if flags.ignore_annotations {
                for param in &mut params {
                    param.type_filter = None;
                }
                return_type = None;
            }

            let (closure_type, bindings) = if host.captures.is_empty() {
                (TypeTag::TupleOf(vec![]), Default::default())
            } else {
                let fields: Vec<(String, TypeTag)> = host
                    .captures
                    .iter()
                    .map(|(name, _)| (name.clone(), TypeTag::Cell))
                    .collect();
                let mut bindings = std::collections::BTreeMap::new();
                for (name, _) in &host.captures {
                    bindings.insert(
                        name.clone(),
                        ClosureBinding::new(vec![
                            BindingStep::IndexedField(0),
                            BindingStep::NamedField(name.clone()),
                            BindingStep::CellAccess,
                        ]),
                    );
                }
                (
                    TypeTag::TupleOf(vec![TypeTag::RecordOf(fields)]),
                    bindings,
                )
            };

            let overload =
                Overload::new(params, return_type, host.body.clone()).with_closure_bindings(bindings);

            FunctionValue::new(host.name.clone(), vec![overload], closure_type, false)
        })
}

/// Convert a host function into a callable typed instance, using the
/// memoized descriptor (all-cell closure layout).
pub fn convert_host_function(
    host: &Rc<HostFunction>,
    flags: ConvertFlags,
    caches: &RuntimeCaches,
) -> Result<FunctionInstance, CallError> {
    let ty = function_type_for(host, flags, caches);
    let closure = pack_closure_storage(host, ty.closure_type())?;
    Ok(FunctionInstance::new(ty, closure))
}

/// Convert a host function against an explicit target descriptor, whose
/// closure layout may declare typed (non-cell) slots. Typed slots
/// copy-construct the captured value; an empty cell is a conversion
/// error.
pub fn convert_host_function_as(
    host: &Rc<HostFunction>,
    target: &Rc<FunctionValue>,
) -> Result<FunctionInstance, CallError> {
    let closure = pack_closure_storage(host, target.closure_type())?;
    Ok(FunctionInstance::new(target.clone(), closure))
}

/// When handing arguments to an entrypoint call, ordinary host functions
/// are converted to their typed form first, so the compiler sees proper
/// closures rather than raw cells. Everything else passes through.
pub fn prepare_argument_for_compiler(
    value: &HostValue,
    caches: &RuntimeCaches,
) -> Result<HostValue, CallError> {
    match value {
        HostValue::HostFn(host) => Ok(HostValue::Function(convert_host_function(
            host,
            ConvertFlags::default(),
            caches,
        )?)),
        other => Ok(other.clone()),
    }
}

fn pack_closure_storage(
    host: &HostFunction,
    closure_type: &TypeTag,
) -> Result<HostValue, CallError> {
    let TypeTag::TupleOf(slots) = closure_type else {
        return Err(CallError::FunctionConversion(format!(
            "unsupported closure layout {} for host-function conversion",
            closure_type
        )));
    };

    if slots.is_empty() {
        return Ok(HostValue::tuple(vec![]));
    }

    let [TypeTag::RecordOf(fields)] = slots.as_slice() else {
        return Err(CallError::FunctionConversion(
            "expected a single record of captures in the closure layout".to_string(),
        ));
    };

    let mut entries = Vec::with_capacity(fields.len());
    for (name, slot_type) in fields {
        let Some(cell) = host.capture_cell(name) else {
            return Err(CallError::FunctionConversion(format!(
                "function '{}' has no capture named '{}'",
                host.name, name
            )));
        };

        let value = if *slot_type == TypeTag::Cell {
            // The slot is itself a shared cell: store a reference to the
            // same cell object, so later mutation is visible both ways.
            HostValue::Cell(cell.clone())
        } else {
            let Some(current) = cell.get() else {
                return Err(CallError::FunctionConversion(format!(
                    "captured variable '{}' was never assigned",
                    name
                )));
            };
            coerce(slot_type, &current, true)
                .map_err(|err| CallError::FunctionConversion(err.to_string()))?
        };
        entries.push((name.clone(), value));
    }

    Ok(HostValue::tuple(vec![HostValue::record(entries)]))
}
