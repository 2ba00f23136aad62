//! Closure capture, binding resolution, conversion, and merge tests.

use std::collections::BTreeMap;
use std::rc::Rc;

use typed_value_vm::{
    BindingStep, CallError, ClosureBinding, ConvertFlags, FunctionInstance, FunctionValue,
    HostFunction, HostValue, InternalFault, InterpretedBody, Overload, Param, Runtime, SharedCell,
    TypeTag,
};

/// A function capturing one value in a typed tuple slot, returning the
/// capture when called with a matching argument.
fn captured_fn(
    name: &str,
    filter: TypeTag,
    slot_type: TypeTag,
    slot_value: HostValue,
) -> FunctionInstance {
    let body = InterpretedBody::new(|env| {
        Ok(env.captured("cap").cloned().unwrap_or(HostValue::None))
    });
    let mut bindings = BTreeMap::new();
    bindings.insert(
        "cap".to_string(),
        ClosureBinding::new(vec![BindingStep::IndexedField(0)]),
    );
    let overload =
        Overload::new(vec![Param::with_filter("x", filter)], None, body).with_closure_bindings(bindings);
    let ty = FunctionValue::new(name, vec![overload], TypeTag::TupleOf(vec![slot_type]), false);
    FunctionInstance::new(ty, HostValue::tuple(vec![slot_value]))
}

// ==================== Shared Mutable Cells ====================

#[test]
fn test_shared_cell_mutation_is_visible_through_every_conversion() {
    let runtime = Runtime::without_backend();
    let cell = SharedCell::new(HostValue::Int(0));

    let body = InterpretedBody::new(|env| {
        let cell = env
            .captured_cell("v")
            .ok_or_else(|| typed_value_vm::HostError::exception("no capture"))?;
        let current = cell
            .get()
            .and_then(|v| v.as_i64())
            .ok_or_else(|| typed_value_vm::HostError::exception("empty cell"))?;
        cell.set(HostValue::Int(current + 1));
        Ok(HostValue::Int(current + 1))
    });
    let host = Rc::new(HostFunction::new("counter", vec![], body).with_capture("v", cell.clone()));

    // Two function values built from the same source closure.
    let a = runtime.convert_function(&host, ConvertFlags::default()).unwrap();
    let b = runtime.convert_function(&host, ConvertFlags::default()).unwrap();
    assert!(Rc::ptr_eq(a.ty(), b.ty()), "conversion should be memoized");

    // A mutation made through either one is observed by the other.
    assert_eq!(runtime.call(&a, &[], &[]).unwrap(), HostValue::Int(1));
    assert_eq!(runtime.call(&b, &[], &[]).unwrap(), HostValue::Int(2));
    assert_eq!(runtime.call(&a, &[], &[]).unwrap(), HostValue::Int(3));

    // And a write through the original cell is visible to both.
    cell.set(HostValue::Int(100));
    assert_eq!(runtime.call(&b, &[], &[]).unwrap(), HostValue::Int(101));
}

// ==================== Merge ====================

#[test]
fn test_merge_concatenates_overloads_and_closures() {
    let runtime = Runtime::without_backend();
    let f = captured_fn("f", TypeTag::I64, TypeTag::I64, HostValue::Int(7));
    let g = captured_fn(
        "g",
        TypeTag::Str,
        TypeTag::Str,
        HostValue::Str("g-cap".to_string()),
    );

    let merged = f.merged_with(&g).unwrap();

    // Overload list is f ++ g and the closure tuple holds both halves.
    assert_eq!(merged.ty().overloads().len(), 2);
    assert_eq!(
        merged.ty().closure_type(),
        &TypeTag::TupleOf(vec![TypeTag::I64, TypeTag::Str])
    );
    assert_eq!(
        merged.closure(),
        &HostValue::tuple(vec![HostValue::Int(7), HostValue::Str("g-cap".to_string())])
    );

    // Each half reads back its own capture unchanged.
    let first = merged.ty().overloads()[0]
        .closure_bindings()
        .get("cap")
        .unwrap()
        .resolve(merged.closure())
        .unwrap();
    assert_eq!(first, HostValue::Int(7));
    let second = merged.ty().overloads()[1]
        .closure_bindings()
        .get("cap")
        .unwrap()
        .resolve(merged.closure())
        .unwrap();
    assert_eq!(second, HostValue::Str("g-cap".to_string()));

    // Dispatch routes to the right half and the shifted binding still
    // reaches the right slot.
    assert_eq!(
        runtime.call(&merged, &[HostValue::Int(1)], &[]).unwrap(),
        HostValue::Int(7)
    );
    assert_eq!(
        runtime
            .call(&merged, &[HostValue::Str("x".to_string())], &[])
            .unwrap(),
        HostValue::Str("g-cap".to_string())
    );

    // The inputs are untouched.
    assert_eq!(f.ty().overloads().len(), 1);
    assert_eq!(g.ty().overloads().len(), 1);
}

#[test]
fn test_merge_keeps_entrypoint_if_either_half_has_it() {
    let f = captured_fn("f", TypeTag::I64, TypeTag::I64, HostValue::Int(1));
    let g = captured_fn("g", TypeTag::Str, TypeTag::Str, HostValue::Str("s".to_string()));

    assert!(!f.merged_with(&g).unwrap().ty().is_entrypoint());

    let g_entry = g.with_entrypoint(true);
    assert!(f.merged_with(&g_entry).unwrap().ty().is_entrypoint());
}

#[test]
fn test_merge_requires_tuple_closures() {
    let f = captured_fn("f", TypeTag::I64, TypeTag::I64, HostValue::Int(1));
    let odd_ty = f.ty().replace_closure_type(TypeTag::Cell);
    let odd = FunctionInstance::new(odd_ty, HostValue::Cell(SharedCell::empty()));

    assert!(matches!(
        f.merged_with(&odd),
        Err(CallError::FunctionConversion(_))
    ));
}

// ==================== Descriptor Transformations ====================

#[test]
fn test_with_entrypoint_produces_a_new_value() {
    let f = captured_fn("f", TypeTag::I64, TypeTag::I64, HostValue::Int(1));
    let flagged = f.with_entrypoint(true);

    assert!(flagged.ty().is_entrypoint());
    assert!(!f.ty().is_entrypoint());
    assert!(!Rc::ptr_eq(f.ty(), flagged.ty()));
}

#[test]
fn test_replace_overload_bindings_validates_the_index() {
    let f = captured_fn("f", TypeTag::I64, TypeTag::I64, HostValue::Int(1));
    let err = f
        .ty()
        .replace_overload_bindings(5, BTreeMap::new())
        .unwrap_err();
    assert_eq!(
        err,
        InternalFault::InvalidOverloadIndex { index: 5, count: 1 }
    );
}

#[test]
fn test_replace_overload_bindings_retargets_resolution() {
    let f = captured_fn("f", TypeTag::I64, TypeTag::I64, HostValue::Int(1));

    // Point the capture at slot 1 of a two-slot closure instead.
    let mut bindings = BTreeMap::new();
    bindings.insert(
        "cap".to_string(),
        ClosureBinding::new(vec![BindingStep::IndexedField(1)]),
    );
    let retargeted_ty = f.ty().replace_overload_bindings(0, bindings).unwrap();
    let retargeted_ty =
        retargeted_ty.replace_closure_type(TypeTag::TupleOf(vec![TypeTag::I64, TypeTag::I64]));
    let retargeted = FunctionInstance::new(
        retargeted_ty,
        HostValue::tuple(vec![HostValue::Int(1), HostValue::Int(2)]),
    );

    let runtime = Runtime::without_backend();
    assert_eq!(
        runtime.call(&retargeted, &[HostValue::Int(0)], &[]).unwrap(),
        HostValue::Int(2)
    );
}

// ==================== Nested Function References ====================

#[test]
fn test_function_binding_step_wraps_the_containing_closure() {
    let runtime = Runtime::without_backend();

    // `inner` reads slot 0 of whatever closure it is handed.
    let inner = captured_fn("inner", TypeTag::I64, TypeTag::I64, HostValue::Int(0));
    let inner_ty = inner.ty().clone();

    let root = HostValue::tuple(vec![HostValue::Int(5)]);
    let binding = ClosureBinding::new(vec![BindingStep::Function(inner_ty.clone())]);

    let resolved = binding.resolve(&root).unwrap();
    let HostValue::Function(instance) = resolved else {
        panic!("expected a function value, got {:?}", resolved);
    };
    assert!(Rc::ptr_eq(instance.ty(), &inner_ty));

    // The wrapped instance resolves its own capture against the same
    // storage node.
    assert_eq!(
        runtime.call(&instance, &[HostValue::Int(0)], &[]).unwrap(),
        HostValue::Int(5)
    );
}

// ==================== Host-Function Conversion ====================

#[test]
fn test_converted_function_respects_annotations() {
    let runtime = Runtime::without_backend();
    let body = InterpretedBody::new(|env| Ok(env.arg(0).cloned().unwrap_or(HostValue::None)));
    let host = Rc::new(
        HostFunction::new("typed", vec![Param::with_filter("x", TypeTag::Str)], body)
            .with_return_type(TypeTag::Str),
    );

    let typed = runtime.convert_function(&host, ConvertFlags::default()).unwrap();
    assert!(runtime.call(&typed, &[HostValue::Int(1)], &[]).is_err());
    assert_eq!(
        runtime
            .call(&typed, &[HostValue::Str("ok".to_string())], &[])
            .unwrap(),
        HostValue::Str("ok".to_string())
    );

    // With annotations ignored, the same source accepts anything.
    let loose = runtime
        .convert_function(
            &host,
            ConvertFlags {
                ignore_annotations: true,
            },
        )
        .unwrap();
    assert_eq!(
        runtime.call(&loose, &[HostValue::Int(1)], &[]).unwrap(),
        HostValue::Int(1)
    );
}

#[test]
fn test_empty_capture_cell_fails_typed_conversion_only() {
    let runtime = Runtime::without_backend();
    let cell = SharedCell::empty();
    let body = InterpretedBody::new(|_| Ok(HostValue::None));
    let host = Rc::new(HostFunction::new("f", vec![], body).with_capture("v", cell.clone()));

    // The default all-cell layout stores identity, so the empty cell is
    // fine...
    assert!(runtime.convert_function(&host, ConvertFlags::default()).is_ok());

    // ...but a typed slot must copy-construct the contents, and there are
    // none.
    let target = FunctionValue::new(
        "f",
        vec![Overload::new(vec![], None, host.body.clone())],
        TypeTag::TupleOf(vec![TypeTag::RecordOf(vec![(
            "v".to_string(),
            TypeTag::I64,
        )])]),
        false,
    );
    let err = typed_value_vm::convert_host_function_as(&host, &target).unwrap_err();
    assert_eq!(
        err.to_string(),
        "TypeError: captured variable 'v' was never assigned"
    );
}

#[test]
fn test_introspection_descriptor_reflects_the_function() {
    let f = captured_fn("f", TypeTag::I64, TypeTag::I64, HostValue::Int(1));
    let desc = f.ty().describe();

    assert_eq!(desc.name, "f");
    assert!(!desc.is_entrypoint);
    assert_eq!(desc.closure_type, TypeTag::TupleOf(vec![TypeTag::I64]));
    assert_eq!(desc.overloads.len(), 1);
    assert_eq!(desc.overloads[0].params[0].name, "x");
    assert_eq!(
        desc.overloads[0].params[0].type_filter,
        Some(TypeTag::I64)
    );

    let json = serde_json::to_value(&desc).unwrap();
    assert_eq!(json["overloads"][0]["compiled_specializations"], 0);
}
