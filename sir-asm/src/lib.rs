//! Instruction set, encoder and shared catalogs of the SIR stack machine.
//!
//! This crate is the single source of truth shared by the compiler back end
//! and the interpreter: the opcode catalog and its textual mnemonics, the
//! bytecode encoder, the intrinsic id space, the canonical signature type
//! tokens, the trap-reason taxonomy and the reserved host-module registry.

#![warn(missing_docs)]

mod builder;
mod intrinsic;
mod macros;
mod opcode;
mod trap;
mod ty;

pub mod reserved;

pub use builder::{CodeBuilder, EncodeError, Label};
pub use intrinsic::{print_tag, IntrinsicId};
pub use opcode::{InvalidOpcode, Layout, Opcode};
pub use reserved::ImportFlags;
pub use trap::TrapReason;
pub use ty::{type_id, ElemKind, InvalidTypeToken, SirType, FIRST_USER_TYPE_ID};

/// The null reference handle.
pub const NULL_HANDLE: u32 = 0xFFFF_FFFF;
