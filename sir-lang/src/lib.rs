//! Front half of the Simple toolchain's back end: the validated program
//! tree, the structural validator and the SIR emitter.
//!
//! The lexer and parser live outside this crate; they produce the
//! [`ast::Program`] consumed here. [`validate_program`] accepts or rejects
//! a tree, and [`emit_sir`] lowers an accepted tree into the textual SIR
//! module executed by the `sir-vm` crate.

#![warn(missing_docs)]

pub mod ast;
mod emit;
mod validate;

pub use emit::{emit_program, emit_sir, parse_integer_literal, EmitError};
pub use validate::{validate_program, ValidateError};
