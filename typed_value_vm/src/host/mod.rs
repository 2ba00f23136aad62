//! Host-side model: dynamic values, the exception channel, and the
//! interpreter exclusivity lock.
//!
//! # Module Organization
//!
//! - `value.rs`: `HostValue`, `TypedValue`, `SharedCell`
//! - `error.rs`: `HostError` (the host-exception channel)
//! - `lock.rs`: `InterpreterLock` and its RAII guards

mod error;
mod lock;
mod value;

pub use error::HostError;
pub use lock::{InterpreterLock, LockHold, LockRelease};
pub use value::{HostValue, SharedCell, TypedValue};
