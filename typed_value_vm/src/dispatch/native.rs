//! The native dispatcher: compiled-specialization seek, on-demand
//! compilation, and the generic-fallback signal.
//!
//! For a resolved overload the dispatcher walks the attached
//! specializations in order and takes the first one whose exact argument
//! types accept the call. On a miss, an entrypoint function is converted
//! to its compiler-facing form and submitted to the compilation service,
//! then the specializations are sought again; compilation reporting
//! success without a dispatchable specialization is a fatal internal
//! fault. A non-entrypoint miss returns `Ok(None)`: the caller falls back
//! to the interpreted body.

use crate::function::convert::prepare_argument_for_compiler;
use crate::function::{CompiledSpecialization, FunctionInstance, Overload};
use crate::host::{HostValue, TypedValue};
use crate::runtime::{log_dispatch, Runtime, RuntimeCaches};
use crate::types::{could_match, CallError, InternalFault};

use super::arg_mapping::CallArgMapping;

/// Try to run `overload_index` natively. `Ok(None)` means no
/// specialization took the call and compilation was not permitted; the
/// caller should invoke the interpreted body.
pub(crate) fn dispatch_to_native(
    runtime: &Runtime,
    instance: &FunctionInstance,
    overload_index: usize,
    mapping: &CallArgMapping<'_>,
) -> Result<Option<HostValue>, CallError> {
    let overload = instance.ty().overload(overload_index)?;

    for spec in overload.specializations() {
        if let Some(result) =
            dispatch_to_specialization(runtime, overload, instance.closure(), &spec, mapping)?
        {
            return Ok(Some(result));
        }
    }

    if instance.ty().is_entrypoint() {
        // Repackage the function so its closures look like ordinary
        // nested-function captures to the compiler.
        let converted = prepare_function_for_compiler(instance, runtime.caches())?;

        log_dispatch(&format!(
            "[dispatch] requesting compilation of '{}' overload {}",
            converted.ty().name(),
            overload_index
        ));

        runtime
            .compiler()
            .compile_overload(
                converted.ty(),
                overload_index,
                &mapping.extract_argument_values(),
            )
            .map_err(CallError::Compilation)?;

        let converted_overload = converted.ty().overload(overload_index)?;
        for spec in converted_overload.specializations() {
            if let Some(result) = dispatch_to_specialization(
                runtime,
                converted_overload,
                converted.closure(),
                &spec,
                mapping,
            )? {
                return Ok(Some(result));
            }
        }

        return Err(CallError::Internal(
            InternalFault::CompiledButFailedToDispatch,
        ));
    }

    Ok(None)
}

/// Try one specialization. `Ok(None)` means its exact argument types do
/// not take this call; the caller moves on.
fn dispatch_to_specialization(
    runtime: &Runtime,
    overload: &Overload,
    closure_root: &HostValue,
    spec: &CompiledSpecialization,
    mapping: &CallArgMapping<'_>,
) -> Result<Option<HostValue>, CallError> {
    if spec.return_type().is_none() {
        return Err(CallError::Internal(
            InternalFault::SpecializationMissingReturnType,
        ));
    }

    let values = mapping.single_value_args();

    // Short-circuit against the specialization's exact argument types.
    // The pre-check is never escalated to explicit here: only resolution
    // coercion is, and it already ran.
    for (index, param) in overload.params().iter().enumerate() {
        if !param.is_normal() {
            continue;
        }
        let Some(arg_type) = spec.arg_types().get(index) else {
            return Ok(None);
        };
        let Some(value) = values.get(index).and_then(Option::as_ref) else {
            return Ok(None);
        };
        if !could_match(arg_type, value, false) {
            return Ok(None);
        }
    }

    // Extract every argument into owned typed storage.
    let mut call_args: Vec<TypedValue> = Vec::with_capacity(overload.params().len());
    for index in 0..overload.params().len() {
        let Some(arg_type) = spec.arg_types().get(index) else {
            return Ok(None);
        };
        match mapping.extract_arg_with_type(index, arg_type) {
            Some(storage) => call_args.push(storage),
            None => return Ok(None),
        }
    }

    // Closure variables first, in lexical order, then the call arguments.
    let mut argv: Vec<TypedValue> =
        Vec::with_capacity(overload.closure_bindings().len() + call_args.len());
    for (name, binding) in overload.closure_bindings() {
        let resolved = binding
            .resolve(closure_root)
            .map_err(CallError::Internal)?;
        let storage = resolved.to_typed().ok_or_else(|| {
            CallError::Internal(InternalFault::CorruptClosureBinding(format!(
                "captured variable '{}' has no typed representation",
                name
            )))
        })?;
        argv.push(storage);
    }
    argv.extend(call_args);

    let mut return_slot = TypedValue::None;

    // The compiled body does not need the interpreter lock and may run
    // arbitrarily long or call back in; release it for the duration of
    // the call. The guard reacquires on every exit path.
    let call_result = {
        let _released = runtime.lock().release_for_native();
        spec.entry().invoke(&mut return_slot, &argv)
    };

    // Errors crossing out of compiled code are normalized into the host
    // exception channel.
    call_result.map_err(CallError::Raised)?;

    Ok(Some(HostValue::from_typed(return_slot)))
}

/// Convert a function instance into the form the compilation service
/// expects. Typed functions are already in that form; the conversion is
/// routed through the same preparation step arguments take, and the
/// result is required to still be a function.
fn prepare_function_for_compiler(
    instance: &FunctionInstance,
    caches: &RuntimeCaches,
) -> Result<FunctionInstance, CallError> {
    let prepared =
        prepare_argument_for_compiler(&HostValue::Function(instance.clone()), caches)?;
    match prepared {
        HostValue::Function(converted) => Ok(converted),
        _ => Err(CallError::Internal(InternalFault::PreparedNonFunction)),
    }
}
