//! Canonical signature type tokens and the primitive type-id space.

use core::fmt;
use std::str::FromStr;

/// Primitive type ids. User-declared heap types are numbered from
/// [`FIRST_USER_TYPE_ID`] in declaration order.
pub mod type_id {
    /// `void`
    pub const VOID: u32 = 0;
    /// `bool`
    pub const BOOL: u32 = 1;
    /// `char`
    pub const CHAR: u32 = 2;
    /// `i8`
    pub const I8: u32 = 3;
    /// `i16`
    pub const I16: u32 = 4;
    /// `i32`
    pub const I32: u32 = 5;
    /// `i64`
    pub const I64: u32 = 6;
    /// `u8`
    pub const U8: u32 = 7;
    /// `u16`
    pub const U16: u32 = 8;
    /// `u32`
    pub const U32: u32 = 9;
    /// `u64`
    pub const U64: u32 = 10;
    /// `f32`
    pub const F32: u32 = 11;
    /// `f64`
    pub const F64: u32 = 12;
    /// `string`
    pub const STRING: u32 = 13;
    /// Generic heap handle; element id for containers of containers.
    pub const HANDLE: u32 = 14;
    /// First id available to user-declared types.
    pub const FIRST_USER_TYPE_ID: u32 = 16;
}

pub use type_id::FIRST_USER_TYPE_ID;

/// A canonical signature type token as it appears in `sigs:` lines and
/// field declarations: `void, bool, char, i8..u64, f32, f64, string,
/// ref<T>, list<T>, array<T>`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SirType {
    /// No value.
    Void,
    /// Boolean.
    Bool,
    /// Character (BMP scalar).
    Char,
    /// Signed 8-bit.
    I8,
    /// Signed 16-bit.
    I16,
    /// Signed 32-bit.
    I32,
    /// Signed 64-bit.
    I64,
    /// Unsigned 8-bit.
    U8,
    /// Unsigned 16-bit.
    U16,
    /// Unsigned 32-bit.
    U32,
    /// Unsigned 64-bit.
    U64,
    /// IEEE-754 single.
    F32,
    /// IEEE-754 double.
    F64,
    /// Heap string.
    String,
    /// Reference to the named heap type.
    Ref(std::string::String),
    /// Resizable list of the element type.
    List(Box<SirType>),
    /// Fixed-length array of the element type.
    Array(Box<SirType>),
}

/// Stack/storage class of an element type; selects the typed opcode
/// family and the element stride.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ElemKind {
    /// 32-bit integer class (all integers up to 32 bits, bool, char).
    I32,
    /// 64-bit integer class.
    I64,
    /// Single-precision float.
    F32,
    /// Double-precision float.
    F64,
    /// Heap handle.
    Ref,
}

impl ElemKind {
    /// Element stride in bytes within array and list payloads.
    pub const fn stride(self) -> u32 {
        match self {
            ElemKind::I32 | ElemKind::F32 | ElemKind::Ref => 4,
            ElemKind::I64 | ElemKind::F64 => 8,
        }
    }

    /// Typed opcode suffix (`array.get.<suffix>` and friends).
    pub const fn suffix(self) -> &'static str {
        match self {
            ElemKind::I32 => "i32",
            ElemKind::I64 => "i64",
            ElemKind::F32 => "f32",
            ElemKind::F64 => "f64",
            ElemKind::Ref => "ref",
        }
    }
}

impl SirType {
    /// Whether this is a heap reference at runtime.
    pub fn is_ref(&self) -> bool {
        matches!(
            self,
            SirType::String | SirType::Ref(_) | SirType::List(_) | SirType::Array(_)
        )
    }

    /// Whether this is a scalar supported by the dynamic-call ABI.
    pub fn is_dl_scalar(&self) -> bool {
        matches!(
            self,
            SirType::Bool
                | SirType::Char
                | SirType::I8
                | SirType::I16
                | SirType::I32
                | SirType::I64
                | SirType::U8
                | SirType::U16
                | SirType::U32
                | SirType::U64
                | SirType::F32
                | SirType::F64
        )
    }

    /// Storage class of a value of this type. `void` has no class.
    pub fn elem_kind(&self) -> Option<ElemKind> {
        let kind = match self {
            SirType::Void => return None,
            SirType::Bool
            | SirType::Char
            | SirType::I8
            | SirType::I16
            | SirType::I32
            | SirType::U8
            | SirType::U16
            | SirType::U32 => ElemKind::I32,
            SirType::I64 | SirType::U64 => ElemKind::I64,
            SirType::F32 => ElemKind::F32,
            SirType::F64 => ElemKind::F64,
            SirType::String | SirType::Ref(_) | SirType::List(_) | SirType::Array(_) => {
                ElemKind::Ref
            }
        };
        Some(kind)
    }

    /// Byte size of the type as an artifact field.
    pub fn field_size(&self) -> u32 {
        match self {
            SirType::Void => 0,
            SirType::Bool | SirType::I8 | SirType::U8 => 1,
            SirType::Char | SirType::I16 | SirType::U16 => 2,
            SirType::I32 | SirType::U32 | SirType::F32 => 4,
            SirType::I64 | SirType::U64 | SirType::F64 => 8,
            SirType::String | SirType::Ref(_) | SirType::List(_) | SirType::Array(_) => 4,
        }
    }

    /// Natural alignment of the type as an artifact field. References
    /// align to their 4-byte handle.
    pub fn field_align(&self) -> u32 {
        self.field_size().max(1)
    }

    /// The primitive type id, or `None` for named references.
    pub fn primitive_id(&self) -> Option<u32> {
        let id = match self {
            SirType::Void => type_id::VOID,
            SirType::Bool => type_id::BOOL,
            SirType::Char => type_id::CHAR,
            SirType::I8 => type_id::I8,
            SirType::I16 => type_id::I16,
            SirType::I32 => type_id::I32,
            SirType::I64 => type_id::I64,
            SirType::U8 => type_id::U8,
            SirType::U16 => type_id::U16,
            SirType::U32 => type_id::U32,
            SirType::U64 => type_id::U64,
            SirType::F32 => type_id::F32,
            SirType::F64 => type_id::F64,
            SirType::String => type_id::STRING,
            SirType::Ref(_) | SirType::List(_) | SirType::Array(_) => return None,
        };
        Some(id)
    }
}

impl fmt::Display for SirType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SirType::Void => f.write_str("void"),
            SirType::Bool => f.write_str("bool"),
            SirType::Char => f.write_str("char"),
            SirType::I8 => f.write_str("i8"),
            SirType::I16 => f.write_str("i16"),
            SirType::I32 => f.write_str("i32"),
            SirType::I64 => f.write_str("i64"),
            SirType::U8 => f.write_str("u8"),
            SirType::U16 => f.write_str("u16"),
            SirType::U32 => f.write_str("u32"),
            SirType::U64 => f.write_str("u64"),
            SirType::F32 => f.write_str("f32"),
            SirType::F64 => f.write_str("f64"),
            SirType::String => f.write_str("string"),
            SirType::Ref(name) => write!(f, "ref<{name}>"),
            SirType::List(elem) => write!(f, "list<{elem}>"),
            SirType::Array(elem) => write!(f, "array<{elem}>"),
        }
    }
}

/// Failed to parse a signature type token.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("invalid type token: {0}")]
pub struct InvalidTypeToken(pub std::string::String);

impl FromStr for SirType {
    type Err = InvalidTypeToken;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        let simple = match token {
            "void" => Some(SirType::Void),
            "bool" => Some(SirType::Bool),
            "char" => Some(SirType::Char),
            "i8" => Some(SirType::I8),
            "i16" => Some(SirType::I16),
            "i32" => Some(SirType::I32),
            "i64" => Some(SirType::I64),
            "u8" => Some(SirType::U8),
            "u16" => Some(SirType::U16),
            "u32" => Some(SirType::U32),
            "u64" => Some(SirType::U64),
            "f32" => Some(SirType::F32),
            "f64" => Some(SirType::F64),
            "string" => Some(SirType::String),
            _ => None,
        };
        if let Some(ty) = simple {
            return Ok(ty);
        }
        let (head, rest) = token
            .split_once('<')
            .ok_or_else(|| InvalidTypeToken(token.into()))?;
        let inner = rest
            .strip_suffix('>')
            .ok_or_else(|| InvalidTypeToken(token.into()))?;
        match head {
            "ref" => {
                if inner.is_empty() || inner.contains(['<', '>']) {
                    return Err(InvalidTypeToken(token.into()));
                }
                Ok(SirType::Ref(inner.into()))
            }
            "list" => Ok(SirType::List(Box::new(inner.parse()?))),
            "array" => Ok(SirType::Array(Box::new(inner.parse()?))),
            _ => Err(InvalidTypeToken(token.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("i32", SirType::I32)]
    #[test_case("string", SirType::String)]
    #[test_case("ref<Point>", SirType::Ref("Point".into()))]
    #[test_case("list<i32>", SirType::List(Box::new(SirType::I32)))]
    #[test_case("array<f64>", SirType::Array(Box::new(SirType::F64)))]
    #[test_case(
        "list<list<i64>>",
        SirType::List(Box::new(SirType::List(Box::new(SirType::I64))))
    )]
    fn token_round_trip(token: &str, expected: SirType) {
        let parsed: SirType = token.parse().unwrap();
        assert_eq!(parsed, expected);
        assert_eq!(parsed.to_string(), token);
    }

    #[test]
    fn malformed_tokens_rejected() {
        assert!("ref<".parse::<SirType>().is_err());
        assert!("tuple<i32>".parse::<SirType>().is_err());
        assert!("int".parse::<SirType>().is_err());
    }

    #[test]
    fn strides_match_payload_layout() {
        assert_eq!(ElemKind::I32.stride(), 4);
        assert_eq!(ElemKind::I64.stride(), 8);
        assert_eq!(ElemKind::Ref.stride(), 4);
        assert_eq!(SirType::Char.elem_kind(), Some(ElemKind::I32));
        assert_eq!(SirType::String.elem_kind(), Some(ElemKind::Ref));
    }
}
