//! The function data model: immutable descriptors, overloads, parameters,
//! compiled specializations, and function instances.
//!
//! A [`FunctionValue`] is the immutable descriptor of a typed function:
//! its ordered overload list, its closure storage layout, its entrypoint
//! flag, and its display name. Structural transformations (merging,
//! retargeting closures, toggling the entrypoint flag) always produce a
//! new value. The one piece of interior state is each overload's
//! append-only specialization slot, shared across clones so a compilation
//! triggered through one handle is visible through all of them.
//!
//! A [`FunctionInstance`] pairs a descriptor with concrete closure
//! storage; it is what actually gets called.
//!
//! # Module Organization
//!
//! - `closure.rs`: closure-binding steps and their resolution
//! - `convert.rs`: converting ordinary host functions into typed form

pub mod closure;
pub mod convert;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::host::{HostError, HostValue, SharedCell, TypedValue};
use crate::types::{CallError, InternalFault, TypeTag};

use closure::ClosureBinding;

/// What kind of formal parameter this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    /// A plain positional-or-keyword parameter.
    Normal,
    /// A `*args`-style parameter collecting excess positional values.
    StarArgs,
    /// A `**kwargs`-style parameter collecting excess named values.
    KwArgs,
}

/// One formal parameter of an overload.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub type_filter: Option<TypeTag>,
    pub default: Option<HostValue>,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Normal,
            type_filter: None,
            default: None,
        }
    }

    pub fn with_filter(name: impl Into<String>, filter: TypeTag) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Normal,
            type_filter: Some(filter),
            default: None,
        }
    }

    pub fn star(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::StarArgs,
            type_filter: None,
            default: None,
        }
    }

    pub fn kwargs(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::KwArgs,
            type_filter: None,
            default: None,
        }
    }

    pub fn with_default(mut self, value: HostValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn is_normal(&self) -> bool {
        self.kind == ParamKind::Normal
    }
}

/// The environment an interpreted body runs against: the mapped call
/// arguments plus the materialized closure environment (cell captures
/// appear as the cells themselves, so writes are visible both ways).
#[derive(Debug, Clone)]
pub struct CallEnv {
    pub args: Vec<HostValue>,
    pub kwargs: Vec<(String, HostValue)>,
    pub closure: Vec<(String, HostValue)>,
}

impl CallEnv {
    pub fn arg(&self, index: usize) -> Option<&HostValue> {
        self.args.get(index)
    }

    pub fn kwarg(&self, name: &str) -> Option<&HostValue> {
        self.kwargs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn captured(&self, name: &str) -> Option<&HostValue> {
        self.closure
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// The shared cell behind a captured variable, when the capture is a
    /// cell binding.
    pub fn captured_cell(&self, name: &str) -> Option<&SharedCell> {
        self.captured(name).and_then(HostValue::as_cell)
    }
}

static NEXT_CODE_ID: AtomicU64 = AtomicU64::new(1);

/// The interpreted body of one overload.
///
/// `code_id` is the identity of the syntactic body: two values built from
/// the same source share it, and it keys the host-function conversion
/// memo.
#[derive(Clone)]
pub struct InterpretedBody {
    code_id: u64,
    func: Rc<dyn Fn(&CallEnv) -> Result<HostValue, HostError>>,
}

impl InterpretedBody {
    pub fn new(func: impl Fn(&CallEnv) -> Result<HostValue, HostError> + 'static) -> Self {
        Self {
            code_id: NEXT_CODE_ID.fetch_add(1, Ordering::Relaxed),
            func: Rc::new(func),
        }
    }

    pub fn code_id(&self) -> u64 {
        self.code_id
    }

    pub fn invoke(&self, env: &CallEnv) -> Result<HostValue, HostError> {
        (self.func)(env)
    }
}

impl std::fmt::Debug for InterpretedBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InterpretedBody(code_id={})", self.code_id)
    }
}

/// A compiled entry point: writes its result into the return slot, reads
/// its inputs from the closure-first argument vector.
#[derive(Clone)]
pub struct EntryPoint {
    func: Rc<dyn Fn(&mut TypedValue, &[TypedValue]) -> Result<(), HostError>>,
}

impl EntryPoint {
    pub fn new(
        func: impl Fn(&mut TypedValue, &[TypedValue]) -> Result<(), HostError> + 'static,
    ) -> Self {
        Self {
            func: Rc::new(func),
        }
    }

    pub fn invoke(
        &self,
        return_slot: &mut TypedValue,
        argv: &[TypedValue],
    ) -> Result<(), HostError> {
        (self.func)(return_slot, argv)
    }
}

impl std::fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EntryPoint(..)")
    }
}

/// One compiled, exact-argument-typed implementation of an overload.
///
/// `arg_types` are exact types, not filters, one per formal parameter.
/// The argument vector passed to `entry` is the overload's closure
/// variables (lexical order) followed by the call arguments (formal
/// order).
#[derive(Clone)]
pub struct CompiledSpecialization {
    entry: EntryPoint,
    return_type: Option<TypeTag>,
    arg_types: Vec<TypeTag>,
}

impl CompiledSpecialization {
    pub fn new(entry: EntryPoint, return_type: TypeTag, arg_types: Vec<TypeTag>) -> Self {
        Self {
            entry,
            return_type: Some(return_type),
            arg_types,
        }
    }

    /// Construct from raw parts. The dispatcher treats a missing return
    /// type as a fatal internal fault; this constructor exists so that
    /// invariant can be exercised.
    pub fn from_parts(
        entry: EntryPoint,
        return_type: Option<TypeTag>,
        arg_types: Vec<TypeTag>,
    ) -> Self {
        Self {
            entry,
            return_type,
            arg_types,
        }
    }

    pub fn entry(&self) -> &EntryPoint {
        &self.entry
    }

    pub fn return_type(&self) -> Option<&TypeTag> {
        self.return_type.as_ref()
    }

    pub fn arg_types(&self) -> &[TypeTag] {
        &self.arg_types
    }
}

impl std::fmt::Debug for CompiledSpecialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSpecialization")
            .field("return_type", &self.return_type)
            .field("arg_types", &self.arg_types)
            .finish()
    }
}

/// One candidate implementation of a multi-overload function.
#[derive(Clone)]
pub struct Overload {
    params: Vec<Param>,
    return_type: Option<TypeTag>,
    closure_bindings: BTreeMap<String, ClosureBinding>,
    body: InterpretedBody,
    /// Append-only; shared across clones so compilations attached through
    /// one handle are visible through all of them.
    specializations: Rc<RefCell<Vec<CompiledSpecialization>>>,
    has_star_arg: bool,
    has_kwarg: bool,
    min_positional: usize,
    /// `None` when a star parameter makes the count unbounded.
    max_positional: Option<usize>,
}

impl Overload {
    pub fn new(params: Vec<Param>, return_type: Option<TypeTag>, body: InterpretedBody) -> Self {
        let mut has_star_arg = false;
        let mut has_kwarg = false;
        let mut with_defaults = 0usize;
        let mut definitely_consuming = 0usize;

        for param in &params {
            match param.kind {
                ParamKind::StarArgs => has_star_arg = true,
                ParamKind::KwArgs => has_kwarg = true,
                ParamKind::Normal => {
                    if param.default.is_some() {
                        with_defaults += 1;
                    } else {
                        definitely_consuming += 1;
                    }
                }
            }
        }

        let max_positional = if has_star_arg {
            None
        } else {
            Some(definitely_consuming + with_defaults)
        };

        Self {
            params,
            return_type,
            closure_bindings: BTreeMap::new(),
            body,
            specializations: Rc::new(RefCell::new(Vec::new())),
            has_star_arg,
            has_kwarg,
            min_positional: definitely_consuming,
            max_positional,
        }
    }

    /// Replace the free-variable bindings. Produces an overload with a
    /// fresh (empty) specialization slot: compiled code bakes in the old
    /// closure layout, so retargeted bindings invalidate it.
    pub fn with_closure_bindings(mut self, bindings: BTreeMap<String, ClosureBinding>) -> Self {
        self.closure_bindings = bindings;
        self.specializations = Rc::new(RefCell::new(Vec::new()));
        self
    }

    /// Shift every binding's leading tuple index by `amount`. Used when
    /// merging: the second function's closure data lands after the
    /// first's, so its bindings move over by the first's slot count.
    pub(crate) fn with_shifted_front_bindings(
        &self,
        amount: usize,
    ) -> Result<Overload, InternalFault> {
        let mut bindings = BTreeMap::new();
        for (name, binding) in &self.closure_bindings {
            bindings.insert(name.clone(), binding.with_shifted_front(amount)?);
        }
        Ok(self.clone().with_closure_bindings(bindings))
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn return_type(&self) -> Option<&TypeTag> {
        self.return_type.as_ref()
    }

    pub fn closure_bindings(&self) -> &BTreeMap<String, ClosureBinding> {
        &self.closure_bindings
    }

    pub fn body(&self) -> &InterpretedBody {
        &self.body
    }

    pub fn has_star_arg(&self) -> bool {
        self.has_star_arg
    }

    pub fn has_kwarg(&self) -> bool {
        self.has_kwarg
    }

    /// Snapshot of the attached specializations. Cloned out so callers
    /// never hold the interior borrow across a re-entrant call.
    pub fn specializations(&self) -> Vec<CompiledSpecialization> {
        self.specializations.borrow().clone()
    }

    pub fn specialization_count(&self) -> usize {
        self.specializations.borrow().len()
    }

    /// Append a compiled specialization. Append-only: existing entries are
    /// never replaced, and dispatch picks the first valid one.
    pub fn attach_specialization(&self, spec: CompiledSpecialization) {
        self.specializations.borrow_mut().push(spec);
    }

    /// The parameter a positional argument at `index` would bind to.
    pub fn arg_for_positional(&self, index: usize) -> Option<&Param> {
        match self.params.get(index) {
            Some(p) if p.is_normal() => Some(p),
            _ => None,
        }
    }

    /// Could a call with `count` positional arguments possibly bind?
    pub fn could_match_positional_count(&self, count: usize) -> bool {
        count >= self.min_positional && self.max_positional.map_or(true, |max| count <= max)
    }

    /// Conservative: true only when no call signature could route to both
    /// this overload and `other`. Keyword-driven calls are ignored.
    pub fn disjoint_from(&self, other: &Overload) -> bool {
        if let (Some(self_max), Some(other_max)) = (self.max_positional, other.max_positional) {
            if self_max < other.min_positional || other_max < self.min_positional {
                return true;
            }
        }

        let shared = self.params.len().min(other.params.len());
        for k in 0..shared {
            let (Some(a), Some(b)) = (self.arg_for_positional(k), other.arg_for_positional(k))
            else {
                continue;
            };
            if a.default.is_none() && b.default.is_none() {
                if let (Some(fa), Some(fb)) = (&a.type_filter, &b.type_filter) {
                    if filters_definitely_disjoint(fa, fb) {
                        return true;
                    }
                }
            }
        }

        false
    }

    /// Human-readable signature, e.g. `(x: Int64, *rest) -> Bool`.
    pub fn signature_string(&self) -> String {
        let mut out = String::from("(");
        for (k, param) in self.params.iter().enumerate() {
            if k > 0 {
                out.push_str(", ");
            }
            match param.kind {
                ParamKind::StarArgs => out.push('*'),
                ParamKind::KwArgs => out.push_str("**"),
                ParamKind::Normal => {}
            }
            out.push_str(&param.name);
            if param.default.is_some() {
                out.push_str("=...");
            }
            if let Some(filter) = &param.type_filter {
                out.push_str(": ");
                out.push_str(&filter.display_name());
            }
        }
        out.push(')');
        if let Some(ret) = &self.return_type {
            out.push_str(" -> ");
            out.push_str(&ret.display_name());
        }
        out
    }
}

impl std::fmt::Debug for Overload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overload")
            .field("signature", &self.signature_string())
            .field("closure_bindings", &self.closure_bindings)
            .field("specializations", &self.specialization_count())
            .finish()
    }
}

/// No value could match both filters, under either conversion mode.
fn filters_definitely_disjoint(a: &TypeTag, b: &TypeTag) -> bool {
    if a == b {
        return false;
    }
    // Everything converts to Bool explicitly (truthiness).
    if matches!(a, TypeTag::Bool) || matches!(b, TypeTag::Bool) {
        return false;
    }
    // The numeric registers convert among themselves explicitly.
    if a.category().is_numeric() && b.category().is_numeric() {
        return false;
    }
    match (a, b) {
        (TypeTag::TupleOf(xs), TypeTag::TupleOf(ys)) => {
            xs.len() != ys.len()
                || xs
                    .iter()
                    .zip(ys.iter())
                    .any(|(x, y)| filters_definitely_disjoint(x, y))
        }
        (TypeTag::RecordOf(xs), TypeTag::RecordOf(ys)) => {
            xs.len() != ys.len()
                || xs.iter().zip(ys.iter()).any(|((xn, xt), (yn, yt))| {
                    xn != yn || filters_definitely_disjoint(xt, yt)
                })
        }
        _ => true,
    }
}

/// The immutable descriptor of a typed, multi-overload function.
#[derive(Debug, Clone)]
pub struct FunctionValue {
    name: String,
    overloads: Vec<Overload>,
    closure_type: TypeTag,
    is_entrypoint: bool,
}

impl FunctionValue {
    pub fn new(
        name: impl Into<String>,
        overloads: Vec<Overload>,
        closure_type: TypeTag,
        is_entrypoint: bool,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            overloads,
            closure_type,
            is_entrypoint,
        })
    }

    /// A function with no captured variables (empty tuple closure).
    pub fn simple(name: impl Into<String>, overloads: Vec<Overload>) -> Rc<Self> {
        Self::new(name, overloads, TypeTag::TupleOf(vec![]), false)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn overloads(&self) -> &[Overload] {
        &self.overloads
    }

    pub fn overload(&self, index: usize) -> Result<&Overload, InternalFault> {
        self.overloads
            .get(index)
            .ok_or(InternalFault::InvalidOverloadIndex {
                index,
                count: self.overloads.len(),
            })
    }

    pub fn closure_type(&self) -> &TypeTag {
        &self.closure_type
    }

    pub fn is_entrypoint(&self) -> bool {
        self.is_entrypoint
    }

    /// True when the closure layout holds no values.
    pub fn is_empty_closure(&self) -> bool {
        matches!(&self.closure_type, TypeTag::TupleOf(elts) if elts.is_empty())
    }

    pub fn with_entrypoint(&self, is_entrypoint: bool) -> Rc<FunctionValue> {
        Rc::new(Self {
            name: self.name.clone(),
            overloads: self.overloads.clone(),
            closure_type: self.closure_type.clone(),
            is_entrypoint,
        })
    }

    pub fn replace_closure_type(&self, closure_type: TypeTag) -> Rc<FunctionValue> {
        Rc::new(Self {
            name: self.name.clone(),
            overloads: self.overloads.clone(),
            closure_type,
            is_entrypoint: self.is_entrypoint,
        })
    }

    /// Replace one overload's free-variable bindings.
    pub fn replace_overload_bindings(
        &self,
        index: usize,
        bindings: BTreeMap<String, ClosureBinding>,
    ) -> Result<Rc<FunctionValue>, InternalFault> {
        if index >= self.overloads.len() {
            return Err(InternalFault::InvalidOverloadIndex {
                index,
                count: self.overloads.len(),
            });
        }
        let mut overloads = self.overloads.clone();
        overloads[index] = overloads[index].clone().with_closure_bindings(bindings);
        Ok(Rc::new(Self {
            name: self.name.clone(),
            overloads,
            closure_type: self.closure_type.clone(),
            is_entrypoint: self.is_entrypoint,
        }))
    }

    /// Merge two descriptors: the result's overload list is `a ++ b` and
    /// its closure tuple is `a ++ b`, with b's bindings shifted past a's
    /// slots. Only tuple-shaped closures can be merged.
    pub fn merge(a: &FunctionValue, b: &FunctionValue) -> Result<Rc<FunctionValue>, CallError> {
        let (TypeTag::TupleOf(a_slots), TypeTag::TupleOf(b_slots)) =
            (&a.closure_type, &b.closure_type)
        else {
            return Err(CallError::FunctionConversion(
                "cannot merge function values whose closures are not tuples".to_string(),
            ));
        };

        let mut slots = a_slots.clone();
        slots.extend(b_slots.iter().cloned());

        let mut overloads = a.overloads.clone();
        for overload in &b.overloads {
            overloads.push(
                overload
                    .with_shifted_front_bindings(a_slots.len())
                    .map_err(CallError::Internal)?,
            );
        }

        Ok(Rc::new(Self {
            name: a.name.clone(),
            overloads,
            closure_type: TypeTag::TupleOf(slots),
            is_entrypoint: a.is_entrypoint || b.is_entrypoint,
        }))
    }

    /// The tooling-facing description of this function.
    pub fn describe(&self) -> FunctionDescriptor {
        FunctionDescriptor {
            name: self.name.clone(),
            is_entrypoint: self.is_entrypoint,
            closure_type: self.closure_type.clone(),
            overloads: self
                .overloads
                .iter()
                .map(|o| OverloadDescriptor {
                    params: o
                        .params
                        .iter()
                        .map(|p| ParamDescriptor {
                            name: p.name.clone(),
                            kind: p.kind,
                            type_filter: p.type_filter.clone(),
                            has_default: p.default.is_some(),
                        })
                        .collect(),
                    return_type: o.return_type.clone(),
                    compiled_specializations: o.specialization_count(),
                })
                .collect(),
        }
    }
}

/// A callable value: a descriptor plus its concrete closure storage.
///
/// The closure storage sits behind an `Rc`: instances embed in host
/// values (and host values embed in closure storage), so the indirection
/// both breaks that recursion and makes instance clones cheap.
#[derive(Debug, Clone)]
pub struct FunctionInstance {
    ty: Rc<FunctionValue>,
    closure: Rc<HostValue>,
}

impl FunctionInstance {
    pub fn new(ty: Rc<FunctionValue>, closure: HostValue) -> Self {
        Self {
            ty,
            closure: Rc::new(closure),
        }
    }

    /// An instance of a function with no captures.
    pub fn without_closure(ty: Rc<FunctionValue>) -> Self {
        Self::new(ty, HostValue::tuple(vec![]))
    }

    pub fn ty(&self) -> &Rc<FunctionValue> {
        &self.ty
    }

    pub fn closure(&self) -> &HostValue {
        &self.closure
    }

    pub fn with_entrypoint(&self, is_entrypoint: bool) -> FunctionInstance {
        Self {
            ty: self.ty.with_entrypoint(is_entrypoint),
            closure: self.closure.clone(),
        }
    }

    /// Merge with another instance: descriptors merge, and the closures
    /// are packed one after the other.
    pub fn merged_with(&self, other: &FunctionInstance) -> Result<FunctionInstance, CallError> {
        let ty = FunctionValue::merge(&self.ty, &other.ty)?;
        let (HostValue::Tuple(a), HostValue::Tuple(b)) =
            (self.closure.as_ref(), other.closure.as_ref())
        else {
            return Err(CallError::FunctionConversion(
                "cannot merge function instances whose closures are not tuples".to_string(),
            ));
        };
        let mut data: Vec<HostValue> = a.as_ref().clone();
        data.extend(b.iter().cloned());
        Ok(Self::new(ty, HostValue::tuple(data)))
    }
}

impl PartialEq for FunctionInstance {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.ty, &other.ty) && self.closure == other.closure
    }
}

/// Serializable introspection descriptors (the tooling surface).
#[derive(Debug, Clone, Serialize)]
pub struct ParamDescriptor {
    pub name: String,
    pub kind: ParamKind,
    pub type_filter: Option<TypeTag>,
    pub has_default: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverloadDescriptor {
    pub params: Vec<ParamDescriptor>,
    pub return_type: Option<TypeTag>,
    pub compiled_specializations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub is_entrypoint: bool,
    pub closure_type: TypeTag,
    pub overloads: Vec<OverloadDescriptor>,
}
