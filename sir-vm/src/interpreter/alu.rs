//! Checked integer division and remainder.
//!
//! `checked_div`/`checked_rem` return `None` both for a zero divisor and
//! for the signed-minimum-by-negative-one overflow; the divisor
//! disambiguates the trap reason. Floats never come through here.

use sir_asm::TrapReason;

use super::Interpreter;
use crate::host::Host;

macro_rules! impl_div_mod {
    ($($ty:ident),*) => {
        paste::paste! {
            impl<H: Host> Interpreter<H> {
                $(
                    pub(super) fn [<div_ $ty>](&mut self) -> Result<(), TrapReason> {
                        let b = self.[<pop_ $ty>]()?;
                        let a = self.[<pop_ $ty>]()?;
                        let q = a.checked_div(b).ok_or(if b == 0 {
                            TrapReason::DivisionByZero
                        } else {
                            TrapReason::IntegerOverflow
                        })?;
                        self.[<push_ $ty>](q);
                        Ok(())
                    }

                    pub(super) fn [<mod_ $ty>](&mut self) -> Result<(), TrapReason> {
                        let b = self.[<pop_ $ty>]()?;
                        let a = self.[<pop_ $ty>]()?;
                        let r = a.checked_rem(b).ok_or(if b == 0 {
                            TrapReason::DivisionByZero
                        } else {
                            TrapReason::IntegerOverflow
                        })?;
                        self.[<push_ $ty>](r);
                        Ok(())
                    }
                )*
            }
        }
    };
}

impl_div_mod!(i32, i64, u32, u64);
