//! Shared types for the Hark runtime.
//!
//! This crate holds everything the compiler and the virtual machine agree on:
//! - **Values** ([`value::Value`]): the tagged, immutable runtime value model
//! - **Identifiers** ([`ids::ThreadId`], [`ids::FutureId`]): opaque handles
//!   into the data controller, valid across suspension and remote transport
//! - **Faults** ([`fault::Fault`], [`fault::ErrorSignal`]): user-level errors
//!   and the distinguished error value that flows through `await`
//! - **Program tree** ([`ast::Module`]): the checked tree handed over by the
//!   parser/checker collaborator
//!
//! Everything here is `serde`-serializable: thread and future state must
//! round-trip through an external store in distributed mode.

pub mod ast;
pub mod fault;
pub mod ids;
pub mod value;

pub use ast::{Expr, FnDef, Import, Module, PrimOp};
pub use fault::{ErrorSignal, Fault};
pub use ids::{FutureId, ThreadId};
pub use value::{ForeignRef, FunctionRef, Value};
