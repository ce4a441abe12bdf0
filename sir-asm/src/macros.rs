//! # The `impl_opcodes!` macro
//!
//! Single source of truth for the instruction set. Each row carries a short
//! docstring, the opcode byte, the variant identifier, the textual mnemonic
//! used by the IR format, and the immediate layout:
//!
//! ```rust,ignore
//! impl_opcodes! {
//!     "Push a 32-bit signed constant."
//!     0x12 ConstI32 "const.i32" I32
//!     "Integer addition."
//!     0x30 AddI32 "add.i32" None
//!     // ...
//! }
//! ```
//!
//! From this table the macro derives the [`Opcode`] enum with explicit
//! discriminants, `TryFrom<u8>`, the mnemonic lookup in both directions and
//! the per-opcode immediate [`Layout`].
//!
//! [`Opcode`]: crate::Opcode
//! [`Layout`]: crate::Layout

macro_rules! impl_opcodes {
    ($($doc:literal $value:literal $Variant:ident $mnemonic:literal $layout:ident)*) => {
        /// Solely the opcode portion of an instruction, represented as a
        /// single byte.
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::EnumIter)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(u8)]
        pub enum Opcode {
            $(
                #[doc = $doc]
                $Variant = $value,
            )*
        }

        impl Opcode {
            /// The textual mnemonic as it appears in IR text.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$Variant => $mnemonic,)*
                }
            }

            /// The immediate layout that follows the opcode byte.
            pub const fn layout(self) -> Layout {
                match self {
                    $(Self::$Variant => Layout::$layout,)*
                }
            }

            /// Resolve a canonical mnemonic back to its opcode.
            pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
                match mnemonic {
                    $($mnemonic => Some(Self::$Variant),)*
                    _ => None,
                }
            }
        }

        impl core::convert::TryFrom<u8> for Opcode {
            type Error = $crate::InvalidOpcode;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Self::$Variant),)*
                    _ => Err($crate::InvalidOpcode),
                }
            }
        }
    };
}

pub(crate) use impl_opcodes;
