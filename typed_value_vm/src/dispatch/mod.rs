//! The call-dispatch engine.
//!
//! # Module Organization
//!
//! - `arg_mapping.rs`: `CallArgMapping`, binding a call site onto one
//!   overload's formal parameters
//! - `resolver.rs`: the two-pass first-match-wins overload search and the
//!   call-shape rendering
//! - `native.rs`: compiled-specialization seek, on-demand compilation,
//!   and the generic-fallback signal

mod arg_mapping;
mod native;
mod resolver;

pub use arg_mapping::CallArgMapping;
pub use resolver::describe_call_shape;

pub(crate) use resolver::call_any_overload;
