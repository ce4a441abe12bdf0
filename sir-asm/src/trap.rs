use core::fmt;

/// Trap reason representation for the interpreter.
///
/// Discriminants are part of the exit-status surface and are never
/// renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
#[non_exhaustive]
pub enum TrapReason {
    /// The byte can't be mapped to any known `TrapReason`.
    UnknownTrapReason = 0x00,
    /// Explicit `intrinsic 0x0000`.
    Explicit = 0x01,
    /// Integer division or remainder by zero.
    DivisionByZero = 0x02,
    /// Signed minimum divided by negative one.
    IntegerOverflow = 0x03,
    /// Null reference dereference.
    NullReference = 0x04,
    /// Array or list index outside the valid range.
    IndexOutOfBounds = 0x05,
    /// Operand stack underflow; unreachable for emitter-produced code.
    StackUnderflow = 0x06,
    /// Signature mismatch on an indirect call.
    SignatureMismatch = 0x07,
    /// `callcheck` found something other than a live closure.
    NotCallable = 0x08,
    /// Call or jump target outside the module.
    InvalidTarget = 0x09,
    /// The byte at the instruction pointer is not a defined opcode.
    InvalidInstruction = 0x0a,
    /// A `syscall` referenced an import no host implementation serves.
    UnresolvedImport = 0x0b,
    /// Heap handle did not resolve to a live object of the expected kind.
    InvalidHandle = 0x0c,
    /// Intrinsic id outside the catalog.
    UnknownIntrinsic = 0x0d,
    /// String index not on a character boundary or past the end.
    InvalidStringIndex = 0x0e,
    /// Locals index outside the frame reservation.
    InvalidLocal = 0x0f,
    /// Global index outside the module's global table.
    InvalidGlobal = 0x10,
    /// Upvalue index outside the bound closure.
    InvalidUpvalue = 0x11,
}

impl fmt::Display for TrapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for TrapReason {}

impl From<u8> for TrapReason {
    fn from(b: u8) -> Self {
        use TrapReason::*;
        match b {
            0x01 => Explicit,
            0x02 => DivisionByZero,
            0x03 => IntegerOverflow,
            0x04 => NullReference,
            0x05 => IndexOutOfBounds,
            0x06 => StackUnderflow,
            0x07 => SignatureMismatch,
            0x08 => NotCallable,
            0x09 => InvalidTarget,
            0x0a => InvalidInstruction,
            0x0b => UnresolvedImport,
            0x0c => InvalidHandle,
            0x0d => UnknownIntrinsic,
            0x0e => InvalidStringIndex,
            0x0f => InvalidLocal,
            0x10 => InvalidGlobal,
            0x11 => InvalidUpvalue,
            _ => UnknownTrapReason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn u8_trap_reason_round_trip() {
        let last_known: u8 = TrapReason::iter().last().unwrap() as u8 + 1;
        assert_eq!(TrapReason::from(0), TrapReason::UnknownTrapReason);

        for i in 1..last_known {
            let reason = TrapReason::from(i);
            assert_eq!(i, reason as u8);
        }
        for i in last_known..=255 {
            let reason = TrapReason::from(i);
            assert_eq!(reason, TrapReason::UnknownTrapReason);
        }
    }
}
