//! The overload resolver: a deterministic, two-pass, first-match-wins
//! search over the declared overloads.
//!
//! Pass one tries every overload with implicit matching only, in
//! declaration order; pass two repeats the walk with explicit conversion
//! enabled. Trying all overloads purely before converting anything gives
//! precise-match preference (an exact-integer overload beats a
//! float-accepting one declared earlier), while overload order, not
//! conversion cost, stays the tie-break within a pass.
//!
//! Resolution failure reports the rendered call shape
//! `(argtype1,argtype2,name=argtype3,...)` against the function's
//! declared name.

use crate::dispatch::arg_mapping::CallArgMapping;
use crate::dispatch::native;
use crate::function::convert::prepare_argument_for_compiler;
use crate::function::{CallEnv, FunctionInstance};
use crate::function::closure::materialize_environment;
use crate::host::HostValue;
use crate::runtime::Runtime;
use crate::types::{coerce, could_match, CallError};

/// The outcome of one overload attempt: either the overload did not take
/// the call (keep searching) or the call completed with a result or a
/// hard error (stop searching either way).
enum Attempt {
    NotMatched,
    Completed(Result<HostValue, CallError>),
}

/// Resolve and execute a call against `instance`.
///
/// `self_value`, when present, is the bound-method receiver: it is
/// prepended to the positional arguments before mapping and appears
/// first in the rendered call shape.
pub(crate) fn call_any_overload(
    runtime: &Runtime,
    instance: &FunctionInstance,
    self_value: Option<&HostValue>,
    args: &[HostValue],
    kwargs: &[(HostValue, HostValue)],
) -> Result<HostValue, CallError> {
    let _held = runtime.lock().acquire();

    // For an entrypoint call, untyped host functions among the arguments
    // are converted to typed functions up front, so the compiler never
    // sees raw cells.
    let mapped_args: Vec<HostValue>;
    let mapped_kwargs: Vec<(HostValue, HostValue)>;
    if instance.ty().is_entrypoint() {
        mapped_args = args
            .iter()
            .map(|value| prepare_argument_for_compiler(value, runtime.caches()))
            .collect::<Result<_, _>>()?;
        mapped_kwargs = kwargs
            .iter()
            .map(|(key, value)| {
                Ok((
                    key.clone(),
                    prepare_argument_for_compiler(value, runtime.caches())?,
                ))
            })
            .collect::<Result<_, CallError>>()?;
    } else {
        mapped_args = args.to_vec();
        mapped_kwargs = kwargs.to_vec();
    }

    // First try to match arguments with no explicit conversion; only if
    // that fails for every overload is explicit conversion attempted.
    for explicit in [false, true] {
        for index in 0..instance.ty().overloads().len() {
            match try_call_overload(
                runtime,
                instance,
                index,
                self_value,
                &mapped_args,
                &mapped_kwargs,
                explicit,
            ) {
                Attempt::NotMatched => continue,
                Attempt::Completed(result) => return result,
            }
        }
    }

    Err(CallError::NoMatchingOverload {
        name: instance.ty().name().to_string(),
        signature: describe_call_shape(self_value, args, kwargs),
    })
}

fn try_call_overload(
    runtime: &Runtime,
    instance: &FunctionInstance,
    overload_index: usize,
    self_value: Option<&HostValue>,
    args: &[HostValue],
    kwargs: &[(HostValue, HostValue)],
    explicit: bool,
) -> Attempt {
    let overload = match instance.ty().overload(overload_index) {
        Ok(overload) => overload,
        Err(fault) => return Attempt::Completed(Err(CallError::Internal(fault))),
    };

    let mut mapping = CallArgMapping::new(overload);

    if let Some(receiver) = self_value {
        mapping.push_positional_arg(receiver.clone());
    }
    for value in args {
        mapping.push_positional_arg(value.clone());
    }
    for (key, value) in kwargs {
        match key {
            HostValue::Str(name) => mapping.push_keyword_arg(name, value.clone()),
            other => {
                // Malformed call site: abort resolution entirely.
                return Attempt::Completed(Err(CallError::KeywordKeysMustBeStrings {
                    key_type: other.type_name(),
                }));
            }
        }
    }

    mapping.finished_pushing();
    if !mapping.is_valid() {
        return Attempt::NotMatched;
    }

    // Cheap short-circuit before committing to conversions.
    for (index, param) in overload.params().iter().enumerate() {
        if !param.is_normal() {
            continue;
        }
        let Some(filter) = &param.type_filter else {
            continue;
        };
        let Some(value) = mapping.single_value_args()[index].as_ref() else {
            return Attempt::NotMatched;
        };
        if !could_match(filter, value, explicit) {
            return Attempt::NotMatched;
        }
    }

    mapping.apply_type_coercion(explicit);
    if !mapping.is_valid() {
        return Attempt::NotMatched;
    }

    let mut result: Option<HostValue> = None;

    if runtime.native_dispatch_enabled() {
        match native::dispatch_to_native(runtime, instance, overload_index, &mapping) {
            Ok(Some(value)) => result = Some(value),
            Ok(None) => {}
            Err(err) => return Attempt::Completed(Err(err)),
        }
    }

    let value = match result {
        Some(value) => value,
        None => {
            // Generic fallback: a plain call against the interpreted
            // body, closure cells materialized as the host's native
            // closure environment.
            let closure = match materialize_environment(
                overload.closure_bindings(),
                instance.closure(),
            ) {
                Ok(env) => env,
                Err(fault) => return Attempt::Completed(Err(CallError::Internal(fault))),
            };
            let env = CallEnv {
                args: mapping.build_positional_args(),
                kwargs: mapping.build_keyword_args(),
                closure,
            };
            match overload.body().invoke(&env) {
                Ok(value) => value,
                Err(raised) => return Attempt::Completed(Err(CallError::Raised(raised))),
            }
        }
    };

    // Force the result through the declared return type, if any. A
    // failure here names the target type, not the raw result.
    if let Some(return_type) = overload.return_type() {
        match coerce(return_type, &value, true) {
            Ok(converted) => Attempt::Completed(Ok(converted)),
            Err(_) => Attempt::Completed(Err(CallError::ReturnConversion {
                function: instance.ty().name().to_string(),
                target: return_type.display_name(),
            })),
        }
    } else {
        Attempt::Completed(Ok(value))
    }
}

/// Render the call shape `(argtype1,argtype2,name=argtype3,...)` used in
/// no-matching-overload errors. The receiver, when present, renders
/// first.
pub fn describe_call_shape(
    self_value: Option<&HostValue>,
    args: &[HostValue],
    kwargs: &[(HostValue, HostValue)],
) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(receiver) = self_value {
        parts.push(receiver.type_name());
    }
    for value in args {
        parts.push(value.type_name());
    }
    for (key, value) in kwargs {
        let name = match key {
            HostValue::Str(name) => name.clone(),
            other => other.type_name(),
        };
        parts.push(format!("{}={}", name, value.type_name()));
    }
    format!("({})", parts.join(","))
}
