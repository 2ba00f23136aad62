//! The process-scoped runtime: the compiler handle, the explicit caches,
//! the interpreter lock, and the public call surface.
//!
//! A `Runtime` is constructed once at startup and passed by reference to
//! everything that dispatches. There are no hidden static memo tables:
//! the conversion cache lives in [`RuntimeCaches`], owned here.
//!
//! Diagnostic logging is env-var gated (`TYPED_VALUE_VM_DISPATCH_DEBUG`)
//! and goes to stderr; native dispatch can be disabled wholesale with
//! `TYPED_VALUE_VM_DISABLE_NATIVE` or per-runtime with
//! [`Runtime::with_native_dispatch`].

use std::env;
use std::rc::Rc;

use crate::compiler::{NullCompiler, OverloadCompiler};
use crate::dispatch;
use crate::function::convert::{
    convert_host_function, ConvertFlags, FunctionTypeCache, HostFunction,
};
use crate::function::FunctionInstance;
use crate::host::{HostValue, InterpreterLock};
use crate::types::CallError;

/// Check if dispatch debug logging is enabled via environment variable.
fn should_log_dispatch() -> bool {
    env::var("TYPED_VALUE_VM_DISPATCH_DEBUG").is_ok()
}

/// Log a dispatch message only if debug logging is enabled.
#[inline]
pub(crate) fn log_dispatch(msg: &str) {
    if should_log_dispatch() {
        use std::io::Write;
        let _ = writeln!(std::io::stderr(), "{msg}");
    }
}

/// The explicit process-scoped caches. Append-only; entries are immutable
/// once inserted.
#[derive(Debug, Default)]
pub struct RuntimeCaches {
    function_types: FunctionTypeCache,
}

impl RuntimeCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// The (code identity, flags) → function-type memo.
    pub fn function_types(&self) -> &FunctionTypeCache {
        &self.function_types
    }
}

/// The runtime object owning everything a dispatch needs.
pub struct Runtime {
    compiler: Box<dyn OverloadCompiler>,
    caches: RuntimeCaches,
    lock: Rc<InterpreterLock>,
    native_dispatch: bool,
}

impl Runtime {
    pub fn new(compiler: Box<dyn OverloadCompiler>) -> Self {
        Self {
            compiler,
            caches: RuntimeCaches::new(),
            lock: Rc::new(InterpreterLock::new()),
            native_dispatch: env::var("TYPED_VALUE_VM_DISABLE_NATIVE").is_err(),
        }
    }

    /// A runtime with no compilation backend. Entrypoint calls that reach
    /// a compile request will fail; everything else interprets.
    pub fn without_backend() -> Self {
        Self::new(Box::new(NullCompiler))
    }

    /// Toggle native dispatch for this runtime.
    pub fn with_native_dispatch(mut self, enabled: bool) -> Self {
        self.native_dispatch = enabled;
        self
    }

    pub fn native_dispatch_enabled(&self) -> bool {
        self.native_dispatch
    }

    pub fn lock(&self) -> &InterpreterLock {
        &self.lock
    }

    /// A shared handle to the lock, for code (like compiled entry points)
    /// that needs to observe it without borrowing the runtime.
    pub fn lock_handle(&self) -> Rc<InterpreterLock> {
        self.lock.clone()
    }

    pub(crate) fn compiler(&self) -> &dyn OverloadCompiler {
        self.compiler.as_ref()
    }

    pub fn caches(&self) -> &RuntimeCaches {
        &self.caches
    }

    /// Call a function value with positional and keyword arguments.
    /// Keyword keys must be strings; anything else is a hard call-site
    /// error rather than a mapping failure.
    pub fn call(
        &self,
        instance: &FunctionInstance,
        args: &[HostValue],
        kwargs: &[(HostValue, HostValue)],
    ) -> Result<HostValue, CallError> {
        dispatch::call_any_overload(self, instance, None, args, kwargs)
    }

    /// Call with only positional arguments.
    pub fn call_positional(
        &self,
        instance: &FunctionInstance,
        args: &[HostValue],
    ) -> Result<HostValue, CallError> {
        self.call(instance, args, &[])
    }

    /// Call as a bound method: `receiver` is pushed as the first
    /// positional argument before mapping.
    pub fn call_method(
        &self,
        instance: &FunctionInstance,
        receiver: &HostValue,
        args: &[HostValue],
        kwargs: &[(HostValue, HostValue)],
    ) -> Result<HostValue, CallError> {
        dispatch::call_any_overload(self, instance, Some(receiver), args, kwargs)
    }

    /// Convert an ordinary host function into a typed function instance,
    /// through this runtime's conversion memo.
    pub fn convert_function(
        &self,
        host: &Rc<HostFunction>,
        flags: ConvertFlags,
    ) -> Result<FunctionInstance, CallError> {
        convert_host_function(host, flags, &self.caches)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::without_backend()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("native_dispatch", &self.native_dispatch)
            .field("cached_function_types", &self.caches.function_types.len())
            .field("lock_held", &self.lock.is_held())
            .finish()
    }
}
