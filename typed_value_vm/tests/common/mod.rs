//! Shared test backends and helpers.
#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;

use typed_value_vm::{
    CallEnv, CompileError, CompiledSpecialization, EntryPoint, FunctionValue, HostError,
    HostValue, OverloadCompiler, TypeTag,
};

/// The exact runtime type of a host value, as a specialization would pin
/// it.
pub fn exact_tag(value: &HostValue) -> TypeTag {
    match value {
        HostValue::Bool(_) => TypeTag::Bool,
        HostValue::Int(_) => TypeTag::I64,
        HostValue::Float(_) => TypeTag::F64,
        HostValue::Str(_) => TypeTag::Str,
        HostValue::None => TypeTag::None,
        HostValue::Tuple(elts) => TypeTag::TupleOf(elts.iter().map(exact_tag).collect()),
        HostValue::Record(fields) => TypeTag::RecordOf(
            fields
                .iter()
                .map(|(name, v)| (name.clone(), exact_tag(v)))
                .collect(),
        ),
        HostValue::Cell(_) => TypeTag::Cell,
        HostValue::HostFn(_) | HostValue::Function(_) => TypeTag::Function,
        HostValue::Typed(tv) => tv.tag(),
    }
}

/// A backend that "compiles" an overload by wrapping its interpreted body
/// behind a compiled entry point with exact argument types. Idempotent:
/// re-submitting a signature that already has a specialization is a
/// no-op. Counts every request it receives.
#[derive(Debug, Clone, Default)]
pub struct InterpretingBackend {
    requests: Rc<Cell<usize>>,
}

impl InterpretingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> usize {
        self.requests.get()
    }
}

impl OverloadCompiler for InterpretingBackend {
    fn compile_overload(
        &self,
        function: &Rc<FunctionValue>,
        overload_index: usize,
        example_args: &[HostValue],
    ) -> Result<(), CompileError> {
        self.requests.set(self.requests.get() + 1);

        let overload = function
            .overload(overload_index)
            .map_err(|_| CompileError::OverloadOutOfBounds {
                function: function.name().to_string(),
                index: overload_index,
            })?;

        let arg_types: Vec<TypeTag> = example_args.iter().map(exact_tag).collect();

        // Idempotent: an already-compiled signature is a no-op.
        if overload
            .specializations()
            .iter()
            .any(|spec| spec.arg_types() == arg_types.as_slice())
        {
            return Ok(());
        }

        let Some(return_type) = overload.return_type().cloned() else {
            return Err(CompileError::Rejected {
                function: function.name().to_string(),
                index: overload_index,
                reason: "overload has no declared return type".to_string(),
            });
        };

        let body = overload.body().clone();
        let closure_names: Vec<String> = overload.closure_bindings().keys().cloned().collect();

        let entry = EntryPoint::new(move |return_slot, argv| {
            let closure_count = closure_names.len();
            let closure: Vec<(String, HostValue)> = closure_names
                .iter()
                .cloned()
                .zip(argv[..closure_count].iter().cloned().map(HostValue::from_typed))
                .collect();
            let args: Vec<HostValue> = argv[closure_count..]
                .iter()
                .cloned()
                .map(HostValue::from_typed)
                .collect();
            let env = CallEnv {
                args,
                kwargs: Vec::new(),
                closure,
            };
            let result = body.invoke(&env)?;
            *return_slot = result
                .to_typed()
                .ok_or_else(|| HostError::type_error("result has no typed representation"))?;
            Ok(())
        });

        overload.attach_specialization(CompiledSpecialization::new(entry, return_type, arg_types));
        Ok(())
    }
}

/// A backend that refuses every request.
#[derive(Debug, Clone, Default)]
pub struct RejectingBackend {
    requests: Rc<Cell<usize>>,
}

impl RejectingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> usize {
        self.requests.get()
    }
}

impl OverloadCompiler for RejectingBackend {
    fn compile_overload(
        &self,
        function: &Rc<FunctionValue>,
        overload_index: usize,
        _example_args: &[HostValue],
    ) -> Result<(), CompileError> {
        self.requests.set(self.requests.get() + 1);
        Err(CompileError::Rejected {
            function: function.name().to_string(),
            index: overload_index,
            reason: "backend offline".to_string(),
        })
    }
}

/// A backend that reports success without attaching anything; used to
/// exercise the compiled-but-failed-to-dispatch fault.
#[derive(Debug, Clone, Copy, Default)]
pub struct VacuousBackend;

impl OverloadCompiler for VacuousBackend {
    fn compile_overload(
        &self,
        _function: &Rc<FunctionValue>,
        _overload_index: usize,
        _example_args: &[HostValue],
    ) -> Result<(), CompileError> {
        Ok(())
    }
}
