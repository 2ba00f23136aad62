//! Error types for overload resolution and call dispatch.

use crate::compiler::CompileError;
use crate::host::HostError;

/// The outcome taxonomy of a failed call.
///
/// `NoMatchingOverload` is the only variant the resolver produces itself
/// after exhausting both passes; everything else aborts the call the
/// moment it occurs.
#[derive(Debug, Clone, PartialEq)]
pub enum CallError {
    /// No overload accepted the call. `signature` is the rendered
    /// call-shape description `(argtype1,argtype2,name=argtype3,...)`.
    NoMatchingOverload { name: String, signature: String },
    /// A keyword argument key was not a string. This is a malformed call
    /// site: resolution is aborted entirely, later overloads are not tried.
    KeywordKeysMustBeStrings { key_type: String },
    /// The overload's declared return type rejected the raw result.
    ReturnConversion { function: String, target: String },
    /// Converting a host function (or one of its captures) into its typed
    /// representation failed.
    FunctionConversion(String),
    /// Propagated verbatim from the compilation service.
    Compilation(CompileError),
    /// A broken internal invariant. Never silently retried.
    Internal(InternalFault),
    /// An error raised by the overload body, interpreted or compiled
    /// (compiled-code errors are normalized into the host channel first).
    Raised(HostError),
}

/// Broken-invariant faults, distinguishable from user errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalFault {
    /// Compilation reported success but no specialization dispatched.
    CompiledButFailedToDispatch,
    /// A specialization was attached without a return type.
    SpecializationMissingReturnType,
    /// A closure-binding step did not fit the closure storage it walked.
    CorruptClosureBinding(String),
    /// Preparing a function for the compiler produced a non-function.
    PreparedNonFunction,
    /// An overload index outside the function's overload list.
    InvalidOverloadIndex { index: usize, count: usize },
}

impl std::fmt::Display for InternalFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CompiledButFailedToDispatch => {
                write!(f, "compiled but then failed to dispatch")
            }
            Self::SpecializationMissingReturnType => {
                write!(f, "malformed specialization: missing a return type")
            }
            Self::CorruptClosureBinding(msg) => {
                write!(f, "corrupt closure binding: {}", msg)
            }
            Self::PreparedNonFunction => {
                write!(f, "preparing a function for the compiler produced a non-function")
            }
            Self::InvalidOverloadIndex { index, count } => {
                write!(f, "overload index {} out of bounds ({} overloads)", index, count)
            }
        }
    }
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoMatchingOverload { name, signature } => {
                write!(
                    f,
                    "TypeError: cannot find a valid overload of '{}' with arguments of type {}",
                    name, signature
                )
            }
            Self::KeywordKeysMustBeStrings { key_type } => {
                write!(
                    f,
                    "TypeError: keyword argument keys must be strings, got {}",
                    key_type
                )
            }
            Self::ReturnConversion { function, target } => {
                write!(
                    f,
                    "TypeError: cannot convert result of '{}' to {}",
                    function, target
                )
            }
            Self::FunctionConversion(msg) => write!(f, "TypeError: {}", msg),
            Self::Compilation(err) => write!(f, "CompilationError: {}", err),
            Self::Internal(fault) => write!(f, "InternalError: {}", fault),
            Self::Raised(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for CallError {}

impl From<HostError> for CallError {
    fn from(err: HostError) -> Self {
        Self::Raised(err)
    }
}

impl From<CompileError> for CallError {
    fn from(err: CompileError) -> Self {
        Self::Compilation(err)
    }
}

impl From<InternalFault> for CallError {
    fn from(fault: InternalFault) -> Self {
        Self::Internal(fault)
    }
}
