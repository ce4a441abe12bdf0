use crate::macros::impl_opcodes;

/// Immediate layout of an instruction. Immediates are encoded
/// little-endian directly after the opcode byte.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Layout {
    /// No immediate.
    None,
    /// One signed byte.
    I8,
    /// Signed 16-bit.
    I16,
    /// Signed 32-bit.
    I32,
    /// Signed 64-bit.
    I64,
    /// One unsigned byte.
    U8,
    /// Unsigned 16-bit.
    U16,
    /// Unsigned 32-bit.
    U32,
    /// Unsigned 64-bit.
    U64,
    /// IEEE-754 single, by bit pattern.
    F32,
    /// IEEE-754 double, by bit pattern.
    F64,
    /// Unsigned 32-bit id followed by an unsigned byte count
    /// (`call`, `call.indirect`, `tailcall`, `newclosure`).
    U32U8,
    /// Two unsigned 32-bit words (`newarray`, `newlist`).
    U32U32,
    /// Signed 32-bit offset relative to the byte after the offset slot.
    Jump,
    /// Unsigned 16-bit case count, a default offset, then that many case
    /// offsets, each encoded like [`Layout::Jump`].
    Table,
}

impl Layout {
    /// Encoded immediate length in bytes, or `None` for the
    /// variable-length [`Layout::Table`].
    pub const fn imm_len(self) -> Option<usize> {
        match self {
            Layout::None => Some(0),
            Layout::I8 | Layout::U8 => Some(1),
            Layout::I16 | Layout::U16 => Some(2),
            Layout::I32 | Layout::U32 | Layout::F32 | Layout::Jump => Some(4),
            Layout::I64 | Layout::U64 | Layout::F64 => Some(8),
            Layout::U32U8 => Some(5),
            Layout::U32U32 => Some(8),
            Layout::Table => None,
        }
    }
}

/// Failed to map a byte onto a defined opcode.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, thiserror::Error)]
#[error("invalid opcode")]
pub struct InvalidOpcode;

impl_opcodes! {
    "No operation."
    0x00 Nop "nop" None
    "Discard the top of the stack."
    0x01 Pop "pop" None
    "Duplicate the top of the stack."
    0x02 Dup "dup" None
    "Duplicate the top two stack slots, preserving their order."
    0x03 Dup2 "dup2" None
    "Exchange the top two stack slots."
    0x04 Swap "swap" None
    "Rotate the top three stack slots, bringing the third to the top."
    0x05 Rot "rot" None
    "Reserve and zero the frame's local slots; must open every function."
    0x08 Enter "enter" U16
    "Return to the caller, leaving any return value on the stack."
    0x09 Ret "ret" None
    "Call the function with the given id, passing the top `argc` slots."
    0x0A Call "call" U32U8
    "Call through a closure handle after checking its signature id."
    0x0B CallIndirect "call.indirect" U32U8
    "Call reusing the current frame instead of pushing a new one."
    0x0C TailCall "tailcall" U32U8
    "Verify the top of the stack is a live callable before an indirect call."
    0x0D CallCheck "callcheck" None
    "Invoke a VM-provided operation by numeric id."
    0x0E Intrinsic "intrinsic" U32
    "Invoke an imported host symbol by import-table index."
    0x0F Syscall "syscall" U32

    "Push a signed 8-bit constant, widened on the stack."
    0x10 ConstI8 "const.i8" I8
    "Push a signed 16-bit constant, widened on the stack."
    0x11 ConstI16 "const.i16" I16
    "Push a signed 32-bit constant."
    0x12 ConstI32 "const.i32" I32
    "Push a signed 64-bit constant."
    0x13 ConstI64 "const.i64" I64
    "Push an unsigned 8-bit constant, widened on the stack."
    0x14 ConstU8 "const.u8" U8
    "Push an unsigned 16-bit constant, widened on the stack."
    0x15 ConstU16 "const.u16" U16
    "Push an unsigned 32-bit constant."
    0x16 ConstU32 "const.u32" U32
    "Push an unsigned 64-bit constant."
    0x17 ConstU64 "const.u64" U64
    "Push a single-precision float constant."
    0x18 ConstF32 "const.f32" F32
    "Push a double-precision float constant."
    0x19 ConstF64 "const.f64" F64
    "Push a boolean constant (0 or 1)."
    0x1A ConstBool "const.bool" U8
    "Push a character constant."
    0x1B ConstChar "const.char" U16
    "Push the interned string with the given const id."
    0x1C ConstString "const.string" U32
    "Push the null reference."
    0x1D ConstNull "const.null" None

    "Unconditional relative jump."
    0x20 Jmp "jmp" Jump
    "Jump if the popped boolean is true."
    0x21 JmpTrue "jmp.true" Jump
    "Jump if the popped boolean is false."
    0x22 JmpFalse "jmp.false" Jump
    "Dispatch on the popped i32 selector through a case table."
    0x23 JmpTable "jmptable" Table

    "Push the local slot with the given index."
    0x28 LdLoc "ldloc" U16
    "Pop into the local slot with the given index."
    0x29 StLoc "stloc" U16
    "Push the global slot with the given index."
    0x2A LdGlob "ldglob" U16
    "Pop into the global slot with the given index."
    0x2B StGlob "stglob" U16
    "Push the bound closure's upvalue with the given index."
    0x2C LdUpv "ldupv" U16
    "Pop into the bound closure's upvalue with the given index."
    0x2D StUpv "stupv" U16

    "i32 addition, wrapping."
    0x30 AddI32 "add.i32" None
    "i32 subtraction, wrapping."
    0x31 SubI32 "sub.i32" None
    "i32 multiplication, wrapping."
    0x32 MulI32 "mul.i32" None
    "i32 division; zero divisor or MIN / -1 traps."
    0x33 DivI32 "div.i32" None
    "i32 remainder; zero divisor or MIN % -1 traps."
    0x34 ModI32 "mod.i32" None
    "i64 addition, wrapping."
    0x35 AddI64 "add.i64" None
    "i64 subtraction, wrapping."
    0x36 SubI64 "sub.i64" None
    "i64 multiplication, wrapping."
    0x37 MulI64 "mul.i64" None
    "i64 division; zero divisor or MIN / -1 traps."
    0x38 DivI64 "div.i64" None
    "i64 remainder; zero divisor or MIN % -1 traps."
    0x39 ModI64 "mod.i64" None
    "u32 addition, wrapping."
    0x3A AddU32 "add.u32" None
    "u32 subtraction, wrapping."
    0x3B SubU32 "sub.u32" None
    "u32 multiplication, wrapping."
    0x3C MulU32 "mul.u32" None
    "u32 division; zero divisor traps."
    0x3D DivU32 "div.u32" None
    "u32 remainder; zero divisor traps."
    0x3E ModU32 "mod.u32" None
    "u64 addition, wrapping."
    0x3F AddU64 "add.u64" None
    "u64 subtraction, wrapping."
    0x40 SubU64 "sub.u64" None
    "u64 multiplication, wrapping."
    0x41 MulU64 "mul.u64" None
    "u64 division; zero divisor traps."
    0x42 DivU64 "div.u64" None
    "u64 remainder; zero divisor traps."
    0x43 ModU64 "mod.u64" None
    "f32 addition."
    0x44 AddF32 "add.f32" None
    "f32 subtraction."
    0x45 SubF32 "sub.f32" None
    "f32 multiplication."
    0x46 MulF32 "mul.f32" None
    "f32 division; IEEE-754, never traps."
    0x47 DivF32 "div.f32" None
    "f64 addition."
    0x48 AddF64 "add.f64" None
    "f64 subtraction."
    0x49 SubF64 "sub.f64" None
    "f64 multiplication."
    0x4A MulF64 "mul.f64" None
    "f64 division; IEEE-754, never traps."
    0x4B DivF64 "div.f64" None

    "i32 bitwise and."
    0x4C AndI32 "and.i32" None
    "i32 bitwise or."
    0x4D OrI32 "or.i32" None
    "i32 bitwise xor."
    0x4E XorI32 "xor.i32" None
    "i32 shift left; count taken modulo 32."
    0x4F ShlI32 "shl.i32" None
    "i32 arithmetic shift right; count taken modulo 32."
    0x50 ShrI32 "shr.i32" None
    "i64 bitwise and."
    0x51 AndI64 "and.i64" None
    "i64 bitwise or."
    0x52 OrI64 "or.i64" None
    "i64 bitwise xor."
    0x53 XorI64 "xor.i64" None
    "i64 shift left; count taken modulo 64."
    0x54 ShlI64 "shl.i64" None
    "i64 arithmetic shift right; count taken modulo 64."
    0x55 ShrI64 "shr.i64" None

    "i32 negation, wrapping."
    0x56 NegI32 "neg.i32" None
    "i64 negation, wrapping."
    0x57 NegI64 "neg.i64" None
    "i32 increment, wrapping."
    0x58 IncI32 "inc.i32" None
    "i32 decrement, wrapping."
    0x59 DecI32 "dec.i32" None
    "i64 increment, wrapping."
    0x5A IncI64 "inc.i64" None
    "i64 decrement, wrapping."
    0x5B DecI64 "dec.i64" None

    "Boolean negation."
    0x5C BoolNot "bool.not" None
    "Boolean conjunction of the top two slots."
    0x5D BoolAnd "bool.and" None
    "Boolean disjunction of the top two slots."
    0x5E BoolOr "bool.or" None

    "i32 equality comparison."
    0x60 CmpEqI32 "cmp.eq.i32" None
    "i32 inequality comparison."
    0x61 CmpNeI32 "cmp.ne.i32" None
    "i32 less-than comparison."
    0x62 CmpLtI32 "cmp.lt.i32" None
    "i32 less-or-equal comparison."
    0x63 CmpLeI32 "cmp.le.i32" None
    "i32 greater-than comparison."
    0x64 CmpGtI32 "cmp.gt.i32" None
    "i32 greater-or-equal comparison."
    0x65 CmpGeI32 "cmp.ge.i32" None
    "i64 equality comparison."
    0x66 CmpEqI64 "cmp.eq.i64" None
    "i64 inequality comparison."
    0x67 CmpNeI64 "cmp.ne.i64" None
    "i64 less-than comparison."
    0x68 CmpLtI64 "cmp.lt.i64" None
    "i64 less-or-equal comparison."
    0x69 CmpLeI64 "cmp.le.i64" None
    "i64 greater-than comparison."
    0x6A CmpGtI64 "cmp.gt.i64" None
    "i64 greater-or-equal comparison."
    0x6B CmpGeI64 "cmp.ge.i64" None
    "u32 equality comparison."
    0x6C CmpEqU32 "cmp.eq.u32" None
    "u32 inequality comparison."
    0x6D CmpNeU32 "cmp.ne.u32" None
    "u32 less-than comparison."
    0x6E CmpLtU32 "cmp.lt.u32" None
    "u32 less-or-equal comparison."
    0x6F CmpLeU32 "cmp.le.u32" None
    "u32 greater-than comparison."
    0x70 CmpGtU32 "cmp.gt.u32" None
    "u32 greater-or-equal comparison."
    0x71 CmpGeU32 "cmp.ge.u32" None
    "u64 equality comparison."
    0x72 CmpEqU64 "cmp.eq.u64" None
    "u64 inequality comparison."
    0x73 CmpNeU64 "cmp.ne.u64" None
    "u64 less-than comparison."
    0x74 CmpLtU64 "cmp.lt.u64" None
    "u64 less-or-equal comparison."
    0x75 CmpLeU64 "cmp.le.u64" None
    "u64 greater-than comparison."
    0x76 CmpGtU64 "cmp.gt.u64" None
    "u64 greater-or-equal comparison."
    0x77 CmpGeU64 "cmp.ge.u64" None
    "f32 equality comparison."
    0x78 CmpEqF32 "cmp.eq.f32" None
    "f32 inequality comparison."
    0x79 CmpNeF32 "cmp.ne.f32" None
    "f32 less-than comparison."
    0x7A CmpLtF32 "cmp.lt.f32" None
    "f32 less-or-equal comparison."
    0x7B CmpLeF32 "cmp.le.f32" None
    "f32 greater-than comparison."
    0x7C CmpGtF32 "cmp.gt.f32" None
    "f32 greater-or-equal comparison."
    0x7D CmpGeF32 "cmp.ge.f32" None
    "f64 equality comparison."
    0x7E CmpEqF64 "cmp.eq.f64" None
    "f64 inequality comparison."
    0x7F CmpNeF64 "cmp.ne.f64" None
    "f64 less-than comparison."
    0x80 CmpLtF64 "cmp.lt.f64" None
    "f64 less-or-equal comparison."
    0x81 CmpLeF64 "cmp.le.f64" None
    "f64 greater-than comparison."
    0x82 CmpGtF64 "cmp.gt.f64" None
    "f64 greater-or-equal comparison."
    0x83 CmpGeF64 "cmp.ge.f64" None

    "Sign-extend i32 to i64."
    0x88 ConvI32I64 "conv.i32.i64" None
    "Truncate i64 to i32."
    0x89 ConvI64I32 "conv.i64.i32" None
    "Convert i32 to f32."
    0x8A ConvI32F32 "conv.i32.f32" None
    "Convert i32 to f64."
    0x8B ConvI32F64 "conv.i32.f64" None
    "Convert f32 to i32, saturating."
    0x8C ConvF32I32 "conv.f32.i32" None
    "Convert f64 to i32, saturating."
    0x8D ConvF64I32 "conv.f64.i32" None
    "Widen f32 to f64."
    0x8E ConvF32F64 "conv.f32.f64" None
    "Narrow f64 to f32."
    0x8F ConvF64F32 "conv.f64.f32" None

    "Allocate a zeroed artifact of the given type id."
    0x90 NewObj "newobj" U32
    "Load the field with the given field id from the popped reference."
    0x91 LdFld "ldfld" U32
    "Store the popped value into a field of the popped reference."
    0x92 StFld "stfld" U32
    "Push the heap type id of the popped reference."
    0x93 TypeOf "typeof" None
    "Push whether the popped reference is null."
    0x94 IsNull "isnull" None
    "Reference identity comparison."
    0x95 RefEq "ref.eq" None
    "Reference non-identity comparison."
    0x96 RefNe "ref.ne" None
    "Build a closure over a method id, popping the upvalue handles."
    0x97 NewClosure "newclosure" U32U8

    "Allocate a zeroed fixed-length array."
    0xA0 NewArray "newarray" U32U32
    "Push the length of the popped array."
    0xA1 ArrayLen "array.len" None
    "Load an i32 element."
    0xA2 ArrayGetI32 "array.get.i32" None
    "Store an i32 element."
    0xA3 ArraySetI32 "array.set.i32" None
    "Load an i64 element."
    0xA4 ArrayGetI64 "array.get.i64" None
    "Store an i64 element."
    0xA5 ArraySetI64 "array.set.i64" None
    "Load an f32 element."
    0xA6 ArrayGetF32 "array.get.f32" None
    "Store an f32 element."
    0xA7 ArraySetF32 "array.set.f32" None
    "Load an f64 element."
    0xA8 ArrayGetF64 "array.get.f64" None
    "Store an f64 element."
    0xA9 ArraySetF64 "array.set.f64" None
    "Load a reference element."
    0xAA ArrayGetRef "array.get.ref" None
    "Store a reference element."
    0xAB ArraySetRef "array.set.ref" None

    "Allocate an empty list with the given capacity."
    0xB0 NewList "newlist" U32U32
    "Push the length of the popped list."
    0xB1 ListLen "list.len" None
    "Load an i32 element."
    0xB2 ListGetI32 "list.get.i32" None
    "Store an i32 element."
    0xB3 ListSetI32 "list.set.i32" None
    "Append an i32 element, growing the list."
    0xB4 ListPushI32 "list.push.i32" None
    "Remove and push the last i32 element."
    0xB5 ListPopI32 "list.pop.i32" None
    "Load an i64 element."
    0xB6 ListGetI64 "list.get.i64" None
    "Store an i64 element."
    0xB7 ListSetI64 "list.set.i64" None
    "Append an i64 element, growing the list."
    0xB8 ListPushI64 "list.push.i64" None
    "Remove and push the last i64 element."
    0xB9 ListPopI64 "list.pop.i64" None
    "Load an f32 element."
    0xBA ListGetF32 "list.get.f32" None
    "Store an f32 element."
    0xBB ListSetF32 "list.set.f32" None
    "Append an f32 element, growing the list."
    0xBC ListPushF32 "list.push.f32" None
    "Remove and push the last f32 element."
    0xBD ListPopF32 "list.pop.f32" None
    "Load an f64 element."
    0xBE ListGetF64 "list.get.f64" None
    "Store an f64 element."
    0xBF ListSetF64 "list.set.f64" None
    "Append an f64 element, growing the list."
    0xC0 ListPushF64 "list.push.f64" None
    "Remove and push the last f64 element."
    0xC1 ListPopF64 "list.pop.f64" None
    "Load a reference element."
    0xC2 ListGetRef "list.get.ref" None
    "Store a reference element."
    0xC3 ListSetRef "list.set.ref" None
    "Append a reference element, growing the list."
    0xC4 ListPushRef "list.push.ref" None
    "Remove and push the last reference element."
    0xC5 ListPopRef "list.pop.ref" None
    "Insert an i32 element at the popped index, shifting the tail."
    0xC6 ListInsertI32 "list.insert.i32" None
    "Remove and push the i32 element at the popped index."
    0xC7 ListRemoveI32 "list.remove.i32" None
    "Reset the popped list to length zero."
    0xC8 ListClear "list.clear" None

    "Push the number of characters in the popped string."
    0xD0 StringLen "string.len" None
    "Concatenate the top two strings into a new string."
    0xD1 StringConcat "string.concat" None
    "Push the character at the popped index."
    0xD2 StringGetChar "string.get.char" None
    "Push the substring at the popped start and length."
    0xD3 StringSlice "string.slice" None
}

static_assertions::assert_eq_size!(Opcode, u8);

impl core::fmt::Display for Opcode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> Self {
        op as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn opcode_byte_round_trip() {
        for op in Opcode::iter() {
            assert_eq!(Opcode::try_from(op as u8), Ok(op));
        }
    }

    #[test]
    fn mnemonic_round_trip() {
        for op in Opcode::iter() {
            assert_eq!(Opcode::from_mnemonic(op.mnemonic()), Some(op));
        }
    }

    #[test]
    fn undefined_bytes_rejected() {
        assert_eq!(Opcode::try_from(0x06), Err(InvalidOpcode));
        assert_eq!(Opcode::try_from(0xFF), Err(InvalidOpcode));
    }

    #[test]
    fn mnemonics_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for op in Opcode::iter() {
            assert!(seen.insert(op.mnemonic()), "duplicate {}", op.mnemonic());
        }
    }
}
