//! The injected compilation capability.
//!
//! The dispatcher never talks to a real backend directly: it submits
//! (function-type descriptor, overload index, example argument values) to
//! whatever [`OverloadCompiler`] the runtime was constructed with and
//! blocks until the service answers. Success means the service attached a
//! specialization to the overload (via
//! [`Overload::attach_specialization`]); failure propagates to the caller
//! verbatim.
//!
//! The call-out is idempotent on the service side: re-submitting an
//! already-compiled signature must be a no-op, and the dispatcher
//! tolerates being invoked again for the same signature.
//!
//! [`Overload::attach_specialization`]: crate::function::Overload::attach_specialization

use std::rc::Rc;

use thiserror::Error;

use crate::function::FunctionValue;
use crate::host::HostValue;

/// A compilation failure, propagated verbatim to the failing call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The runtime has no backend attached.
    #[error("no compilation backend is attached to this runtime")]
    NoBackend,

    /// The requested overload does not exist on the submitted function.
    #[error("overload index {index} out of bounds for '{function}'")]
    OverloadOutOfBounds { function: String, index: usize },

    /// The backend refused or failed to compile the overload.
    #[error("backend rejected '{function}' overload {index}: {reason}")]
    Rejected {
        function: String,
        index: usize,
        reason: String,
    },
}

/// The compile-this-overload service consumed by the dispatcher.
pub trait OverloadCompiler {
    /// Compile `overload_index` of `function` for the given example
    /// argument values, attaching the resulting specialization to the
    /// overload. Must be safe to call when a matching specialization
    /// already exists (no-op), and blocks until done.
    fn compile_overload(
        &self,
        function: &Rc<FunctionValue>,
        overload_index: usize,
        example_args: &[HostValue],
    ) -> Result<(), CompileError>;
}

/// The backend used when none is attached: every request fails, so
/// entrypoint calls surface a compilation error instead of silently
/// interpreting. Runtimes that want interpretation only should leave the
/// entrypoint flag off instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCompiler;

impl OverloadCompiler for NullCompiler {
    fn compile_overload(
        &self,
        _function: &Rc<FunctionValue>,
        _overload_index: usize,
        _example_args: &[HostValue],
    ) -> Result<(), CompileError> {
        Err(CompileError::NoBackend)
    }
}
