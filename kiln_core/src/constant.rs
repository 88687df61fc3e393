//! Tagged constants and their self-describing binary codec.
//!
//! A constant is `tag: u8 | payload`, where the payload shape is uniquely
//! determined by the tag. Scalars are little-endian at their natural width,
//! floats are IEEE-754 bit patterns, strings/data are `len: u32 | bytes`,
//! and functions carry a [`CompiledFn`] encoding.

use crate::codec::{read_u32, take, take_slice, Decode, Encode};
use crate::error::{DecodeError, EncodeError};
use crate::function::{CompiledFn, Function};
use std::fmt;

/// Constant tag bytes. Part of the archive format; do not reorder.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstTag {
    Str = 1,
    True = 2,
    False = 3,
    U8 = 4,
    U16 = 5,
    U32 = 6,
    U64 = 7,
    I8 = 8,
    I16 = 9,
    I32 = 10,
    I64 = 11,
    F32 = 12,
    F64 = 13,
    Ref = 14,
    Data = 15,
    Fn = 16,
}

impl ConstTag {
    /// Decode a tag byte. Unknown tags are decode errors.
    pub fn from_u8(byte: u8) -> Result<ConstTag, DecodeError> {
        match byte {
            1 => Ok(ConstTag::Str),
            2 => Ok(ConstTag::True),
            3 => Ok(ConstTag::False),
            4 => Ok(ConstTag::U8),
            5 => Ok(ConstTag::U16),
            6 => Ok(ConstTag::U32),
            7 => Ok(ConstTag::U64),
            8 => Ok(ConstTag::I8),
            9 => Ok(ConstTag::I16),
            10 => Ok(ConstTag::I32),
            11 => Ok(ConstTag::I64),
            12 => Ok(ConstTag::F32),
            13 => Ok(ConstTag::F64),
            14 => Ok(ConstTag::Ref),
            15 => Ok(ConstTag::Data),
            16 => Ok(ConstTag::Fn),
            _ => Err(DecodeError::UnknownConstTag(byte)),
        }
    }

    /// IR-level type name. `True` and `False` share the `bool` spelling.
    pub fn name(self) -> &'static str {
        match self {
            ConstTag::Str => "str",
            ConstTag::True | ConstTag::False => "bool",
            ConstTag::U8 => "u8",
            ConstTag::U16 => "u16",
            ConstTag::U32 => "u32",
            ConstTag::U64 => "u64",
            ConstTag::I8 => "i8",
            ConstTag::I16 => "i16",
            ConstTag::I32 => "i32",
            ConstTag::I64 => "i64",
            ConstTag::F32 => "f32",
            ConstTag::F64 => "f64",
            ConstTag::Ref => "ref",
            ConstTag::Data => "data",
            ConstTag::Fn => "fn",
        }
    }

    /// Look up a tag by IR type name. `bool` maps to `True`; the compiler
    /// picks the final tag from the literal.
    pub fn from_name(name: &str) -> Option<ConstTag> {
        match name {
            "str" => Some(ConstTag::Str),
            "bool" => Some(ConstTag::True),
            "u8" => Some(ConstTag::U8),
            "u16" => Some(ConstTag::U16),
            "u32" => Some(ConstTag::U32),
            "u64" => Some(ConstTag::U64),
            "i8" => Some(ConstTag::I8),
            "i16" => Some(ConstTag::I16),
            "i32" => Some(ConstTag::I32),
            "i64" => Some(ConstTag::I64),
            "f32" => Some(ConstTag::F32),
            "f64" => Some(ConstTag::F64),
            "ref" => Some(ConstTag::Ref),
            "data" => Some(ConstTag::Data),
            "fn" => Some(ConstTag::Fn),
            _ => None,
        }
    }
}

impl fmt::Display for ConstTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A tagged constant value.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Str(String),
    True,
    False,
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// A 32-bit heap handle.
    Ref(u32),
    /// An opaque byte blob.
    Data(Vec<u8>),
    Fn(Function),
}

impl Const {
    #[inline]
    pub fn tag(&self) -> ConstTag {
        match self {
            Const::Str(_) => ConstTag::Str,
            Const::True => ConstTag::True,
            Const::False => ConstTag::False,
            Const::U8(_) => ConstTag::U8,
            Const::U16(_) => ConstTag::U16,
            Const::U32(_) => ConstTag::U32,
            Const::U64(_) => ConstTag::U64,
            Const::I8(_) => ConstTag::I8,
            Const::I16(_) => ConstTag::I16,
            Const::I32(_) => ConstTag::I32,
            Const::I64(_) => ConstTag::I64,
            Const::F32(_) => ConstTag::F32,
            Const::F64(_) => ConstTag::F64,
            Const::Ref(_) => ConstTag::Ref,
            Const::Data(_) => ConstTag::Data,
            Const::Fn(_) => ConstTag::Fn,
        }
    }

    /// Construct a boolean constant from a native value.
    #[inline]
    pub fn bool(value: bool) -> Const {
        if value {
            Const::True
        } else {
            Const::False
        }
    }
}

impl Encode for Const {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        buf.push(self.tag() as u8);
        match self {
            Const::True | Const::False => {}
            Const::U8(v) => buf.push(*v),
            Const::I8(v) => buf.push(*v as u8),
            Const::U16(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Const::I16(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Const::U32(v) | Const::Ref(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Const::I32(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Const::F32(v) => buf.extend_from_slice(&v.to_bits().to_le_bytes()),
            Const::U64(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Const::I64(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Const::F64(v) => buf.extend_from_slice(&v.to_bits().to_le_bytes()),
            Const::Str(s) => {
                buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
            Const::Data(data) => {
                buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
                buf.extend_from_slice(data);
            }
            Const::Fn(Function::Compiled(func)) => func.encode(buf)?,
            Const::Fn(Function::Builtin(_)) => return Err(EncodeError::HostFn),
        }
        Ok(())
    }
}

impl Decode for Const {
    fn decode(bytes: &[u8]) -> Result<(Self, usize), DecodeError> {
        let tag = ConstTag::from_u8(take::<1>(bytes)?[0])?;
        let payload = &bytes[1..];

        let (value, used) = match tag {
            ConstTag::True => (Const::True, 0),
            ConstTag::False => (Const::False, 0),
            ConstTag::U8 => (Const::U8(take::<1>(payload)?[0]), 1),
            ConstTag::I8 => (Const::I8(take::<1>(payload)?[0] as i8), 1),
            ConstTag::U16 => (Const::U16(u16::from_le_bytes(take::<2>(payload)?)), 2),
            ConstTag::I16 => (Const::I16(i16::from_le_bytes(take::<2>(payload)?)), 2),
            ConstTag::U32 => (Const::U32(u32::from_le_bytes(take::<4>(payload)?)), 4),
            ConstTag::I32 => (Const::I32(i32::from_le_bytes(take::<4>(payload)?)), 4),
            ConstTag::Ref => (Const::Ref(u32::from_le_bytes(take::<4>(payload)?)), 4),
            ConstTag::F32 => (
                Const::F32(f32::from_bits(u32::from_le_bytes(take::<4>(payload)?))),
                4,
            ),
            ConstTag::U64 => (Const::U64(u64::from_le_bytes(take::<8>(payload)?)), 8),
            ConstTag::I64 => (Const::I64(i64::from_le_bytes(take::<8>(payload)?)), 8),
            ConstTag::F64 => (
                Const::F64(f64::from_bits(u64::from_le_bytes(take::<8>(payload)?))),
                8,
            ),
            ConstTag::Str => {
                let len = read_u32(payload)? as usize;
                let text = String::from_utf8_lossy(take_slice(&payload[4..], len)?).into_owned();
                (Const::Str(text), 4 + len)
            }
            ConstTag::Data => {
                let len = read_u32(payload)? as usize;
                let data = take_slice(&payload[4..], len)?.to_vec();
                (Const::Data(data), 4 + len)
            }
            ConstTag::Fn => {
                let (func, used) = CompiledFn::decode(payload)?;
                (Const::Fn(func.into()), used)
            }
        };

        Ok((value, 1 + used))
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Str(s) => write!(f, "<str {}>", s),
            Const::True => write!(f, "<bool true>"),
            Const::False => write!(f, "<bool false>"),
            Const::U8(v) => write!(f, "<u8 {}>", v),
            Const::U16(v) => write!(f, "<u16 {}>", v),
            Const::U32(v) => write!(f, "<u32 {}>", v),
            Const::U64(v) => write!(f, "<u64 {}>", v),
            Const::I8(v) => write!(f, "<i8 {}>", v),
            Const::I16(v) => write!(f, "<i16 {}>", v),
            Const::I32(v) => write!(f, "<i32 {}>", v),
            Const::I64(v) => write!(f, "<i64 {}>", v),
            Const::F32(v) => write!(f, "<f32 {}>", v),
            Const::F64(v) => write!(f, "<f64 {}>", v),
            Const::Ref(handle) => write!(f, "<ref {}>", handle),
            Const::Data(data) => write!(f, "<data {} bytes>", data.len()),
            Const::Fn(func) => write!(f, "<fn {}>", func.name()),
        }
    }
}
