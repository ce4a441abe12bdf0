//! The intrinsic id catalog.
//!
//! Ids are stable across versions and are never renumbered. The dynamic-call
//! family (`DlCall*`) has one member per return-ABI type; each pops an
//! argument count, that many scalar arguments, then the target address.

/// A VM-provided operation addressed by numeric id rather than through the
/// call/import mechanism.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum IntrinsicId {
    /// Abort execution with [`TrapReason::Explicit`](crate::TrapReason::Explicit).
    Trap = 0x0000,
    /// Debugger breakpoint; a no-op without an attached debugger.
    Breakpoint = 0x0001,
    /// Debug-log the popped i32.
    LogI32 = 0x0010,
    /// Debug-log the popped i64.
    LogI64 = 0x0011,
    /// Debug-log the popped f32.
    LogF32 = 0x0012,
    /// Debug-log the popped f64.
    LogF64 = 0x0013,
    /// Debug-log the popped reference handle.
    LogRef = 0x0014,
    /// Absolute value of the popped i32.
    AbsI32 = 0x0020,
    /// Absolute value of the popped i64.
    AbsI64 = 0x0021,
    /// Minimum of the top two i32 slots.
    MinI32 = 0x0022,
    /// Maximum of the top two i32 slots.
    MaxI32 = 0x0023,
    /// Minimum of the top two i64 slots.
    MinI64 = 0x0024,
    /// Maximum of the top two i64 slots.
    MaxI64 = 0x0025,
    /// Minimum of the top two f32 slots.
    MinF32 = 0x0026,
    /// Maximum of the top two f32 slots.
    MaxF32 = 0x0027,
    /// Minimum of the top two f64 slots.
    MinF64 = 0x0028,
    /// Maximum of the top two f64 slots.
    MaxF64 = 0x0029,
    /// Square root of the popped f32.
    SqrtF32 = 0x002A,
    /// Square root of the popped f64.
    SqrtF64 = 0x002B,
    /// Monotonic clock, nanoseconds, pushed as i64.
    MonoNs = 0x0030,
    /// Wall clock, nanoseconds since the epoch, pushed as i64.
    WallNs = 0x0031,
    /// Random u32.
    RandU32 = 0x0040,
    /// Random u64.
    RandU64 = 0x0041,
    /// Write the popped string to standard output.
    WriteStdout = 0x0050,
    /// Write the popped string to standard error.
    WriteStderr = 0x0051,
    /// Pop a type tag, then a value encoded by that tag, and print it.
    PrintAny = 0x0060,
    /// Dynamic call returning i8.
    DlCallI8 = 0x0070,
    /// Dynamic call returning i16.
    DlCallI16 = 0x0071,
    /// Dynamic call returning i32.
    DlCallI32 = 0x0072,
    /// Dynamic call returning i64.
    DlCallI64 = 0x0073,
    /// Dynamic call returning u8.
    DlCallU8 = 0x0074,
    /// Dynamic call returning u16.
    DlCallU16 = 0x0075,
    /// Dynamic call returning u32.
    DlCallU32 = 0x0076,
    /// Dynamic call returning u64.
    DlCallU64 = 0x0077,
    /// Dynamic call returning f32.
    DlCallF32 = 0x0078,
    /// Dynamic call returning f64.
    DlCallF64 = 0x0079,
    /// Dynamic call returning bool.
    DlCallBool = 0x007A,
    /// Dynamic call returning char.
    DlCallChar = 0x007B,
    /// Dynamic call returning a NUL-terminated string.
    DlCallStr0 = 0x007C,
}

impl IntrinsicId {
    /// Resolve a raw id against the catalog.
    pub fn from_id(id: u32) -> Option<Self> {
        use strum::IntoEnumIterator;
        Self::iter().find(|intrinsic| *intrinsic as u32 == id)
    }
}

/// `print_any` tag values. Tags 1..=13 select the value encoding popped
/// beneath the tag.
pub mod print_tag {
    /// i8, widened on the stack.
    pub const I8: u32 = 1;
    /// i16, widened on the stack.
    pub const I16: u32 = 2;
    /// i32.
    pub const I32: u32 = 3;
    /// i64.
    pub const I64: u32 = 4;
    /// u8, widened on the stack.
    pub const U8: u32 = 5;
    /// u16, widened on the stack.
    pub const U16: u32 = 6;
    /// u32.
    pub const U32: u32 = 7;
    /// u64.
    pub const U64: u32 = 8;
    /// f32, by bit pattern.
    pub const F32: u32 = 9;
    /// f64, by bit pattern.
    pub const F64: u32 = 10;
    /// bool.
    pub const BOOL: u32 = 11;
    /// char.
    pub const CHAR: u32 = 12;
    /// string handle.
    pub const STRING: u32 = 13;
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn id_round_trip() {
        for intrinsic in IntrinsicId::iter() {
            assert_eq!(IntrinsicId::from_id(intrinsic as u32), Some(intrinsic));
        }
    }

    #[test]
    fn unknown_ids_rejected() {
        assert_eq!(IntrinsicId::from_id(0x0002), None);
        assert_eq!(IntrinsicId::from_id(0x1000), None);
    }

    #[test]
    fn dl_call_family_is_contiguous() {
        assert_eq!(IntrinsicId::DlCallI8 as u32, 0x0070);
        assert_eq!(IntrinsicId::DlCallStr0 as u32, 0x007C);
    }
}
