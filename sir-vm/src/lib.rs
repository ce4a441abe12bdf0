//! SIR stack-machine runtime: textual IR loader, bytecode interpreter and
//! mark-sweep managed heap.
//!
//! A module flows through [`loader::parse_module`] into an [`IrModule`],
//! then into an [`Interpreter`] parameterized over a [`Host`] for every
//! effectful operation. Execution is single-threaded and synchronous;
//! traps surface as [`InterpreterError`] with a
//! [`TrapReason`](sir_asm::TrapReason) and the faulting location.

#![warn(missing_docs)]

pub mod consts;
mod error;
pub mod heap;
mod host;
pub mod loader;
mod module;

mod interpreter;

pub use error::{InterpreterError, IrParseError};
pub use host::{DlOutcome, DlReturn, Host, StdHost};
pub use interpreter::Interpreter;
pub use module::{
    ConstDef, ConstValue, FieldDef, GlobalDef, ImportDef, IrFunction, IrModule,
    Signature, TypeDef, TypeKind,
};

#[cfg(any(test, feature = "test-helpers"))]
pub use host::RecordingHost;

/// Parse IR text and run it on the standard host.
pub fn run_text(text: &str, args: Vec<String>) -> Result<Option<u64>, RunError> {
    let module = loader::parse_module(text)?;
    let mut vm = Interpreter::new(module, StdHost::new(args))?;
    Ok(vm.run()?)
}

/// Failure of the combined parse-and-run entry point.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The IR text did not parse.
    #[error(transparent)]
    Parse(#[from] IrParseError),
    /// The module parsed but execution failed.
    #[error(transparent)]
    Execute(#[from] InterpreterError),
}
