//! Contract execution.
//!
//! The ledger treats contract execution as an opaque, deterministic state
//! transition behind the [`ExecutionEngine`] trait. [`ScriptEngine`] is the
//! engine nodes run: contracts are JSON programs over a tiny typed
//! instruction set with a hard step budget and no access to anything but
//! their own storage and the invocation context.

pub mod engine;
pub mod error;
pub mod program;

pub use engine::{ExecutionEngine, Invocation, InvocationKind, ScriptEngine, MAX_STEPS};
pub use error::ExecutionError;
pub use program::{Op, Program};
