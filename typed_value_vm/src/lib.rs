//! Overload resolution and call dispatch for typed, polymorphic functions
//! embedded in a dynamically-typed host.
//!
//! The engine matches a raw call site (positional values, keyword values,
//! star parameters, defaults, type filters) against an ordered list of
//! overload candidates in two passes: implicit matching first, explicit
//! conversion second, first full match wins. The winning overload then
//! executes either through a compiled specialization (triggering
//! on-demand compilation for entrypoint functions) or through the
//! generic interpreted body.
//!
//! # Example
//!
//! ```
//! use typed_value_vm::{
//!     FunctionInstance, FunctionValue, HostValue, InterpretedBody, Overload, Param, Runtime,
//!     TypeTag,
//! };
//!
//! let double = Overload::new(
//!     vec![Param::with_filter("x", TypeTag::I64)],
//!     Some(TypeTag::I64),
//!     InterpretedBody::new(|env| {
//!         let x = env.arg(0).and_then(HostValue::as_i64).unwrap_or(0);
//!         Ok(HostValue::Int(x * 2))
//!     }),
//! );
//! let f = FunctionInstance::without_closure(FunctionValue::simple("double", vec![double]));
//!
//! let runtime = Runtime::without_backend();
//! let result = runtime.call(&f, &[HostValue::Int(21)], &[]).unwrap();
//! assert_eq!(result, HostValue::Int(42));
//! ```

// Prevent accidental debug output in library code. Diagnostic logging is
// env-var gated and writes through std::io::stderr directly.
#![deny(clippy::print_stderr)]

pub mod compiler;
pub mod dispatch;
pub mod function;
pub mod host;
pub mod runtime;
pub mod types;

pub use compiler::{CompileError, NullCompiler, OverloadCompiler};
pub use dispatch::{describe_call_shape, CallArgMapping};
pub use function::closure::{materialize_environment, BindingStep, ClosureBinding};
pub use function::convert::{
    convert_host_function, convert_host_function_as, function_type_for,
    prepare_argument_for_compiler, ConvertFlags, FunctionTypeCache, HostFunction,
};
pub use function::{
    CallEnv, CompiledSpecialization, EntryPoint, FunctionDescriptor, FunctionInstance,
    FunctionValue, InterpretedBody, Overload, OverloadDescriptor, Param, ParamDescriptor,
    ParamKind,
};
pub use host::{HostError, HostValue, InterpreterLock, SharedCell, TypedValue};
pub use runtime::{Runtime, RuntimeCaches};
pub use types::{
    coerce, could_match, typed_storage, CallError, ConversionError, InternalFault, TypeCategory,
    TypeTag,
};
