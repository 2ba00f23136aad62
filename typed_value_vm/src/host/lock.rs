//! The host interpreter's exclusivity lock.
//!
//! All mapping, matching, and resolution work (and the whole generic
//! interpreted path) runs with the lock held. A compiled specialization
//! does not need it, so the dispatcher releases it for the duration of the
//! native call and reacquires it on every exit path, including unwinds.
//! That release is the single suspension point in a dispatch.
//!
//! The lock is a depth counter, not an OS lock: the core is single-call-
//! stack and re-entrant, so "held" means "some frame on this stack holds
//! it". Compiled code that calls back into the runtime simply acquires it
//! again at depth zero.

use std::cell::Cell;

/// Depth-counted model of the host's global execution lock.
#[derive(Debug, Default)]
pub struct InterpreterLock {
    depth: Cell<usize>,
}

impl InterpreterLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Is the lock held by any frame on the current call stack?
    pub fn is_held(&self) -> bool {
        self.depth.get() > 0
    }

    /// Acquire for the scope of the returned guard.
    pub fn acquire(&self) -> LockHold<'_> {
        self.depth.set(self.depth.get() + 1);
        LockHold { lock: self }
    }

    /// Release for the scope of the returned guard: the full depth is
    /// saved and restored on drop, so the release covers every frame the
    /// current stack holds and survives error returns.
    pub fn release_for_native(&self) -> LockRelease<'_> {
        let saved = self.depth.get();
        self.depth.set(0);
        LockRelease { lock: self, saved }
    }
}

/// RAII hold on the interpreter lock.
#[derive(Debug)]
pub struct LockHold<'a> {
    lock: &'a InterpreterLock,
}

impl Drop for LockHold<'_> {
    fn drop(&mut self) {
        let depth = self.lock.depth.get();
        self.lock.depth.set(depth.saturating_sub(1));
    }
}

/// RAII release of the interpreter lock around a native call.
#[derive(Debug)]
pub struct LockRelease<'a> {
    lock: &'a InterpreterLock,
    saved: usize,
}

impl Drop for LockRelease<'_> {
    fn drop(&mut self) {
        self.lock.depth.set(self.saved);
    }
}
