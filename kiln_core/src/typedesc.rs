//! Type descriptors stored in a module's types pool.
//!
//! Field layouts do not serialize yet; the wire entry is a single marker
//! byte and decoding yields an anonymous, fieldless descriptor. The
//! executor only needs a size hint from these to back the `new` family of
//! opcodes.

use crate::codec::{take, Decode, Encode};
use crate::error::{DecodeError, EncodeError};

/// Marker byte for a type entry.
const TYPE_MARKER: u8 = 42;

/// A named field of a composite type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeField {
    pub name: String,
    pub ty: u32,
}

/// A composite type descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeDesc {
    pub name: String,
    pub fields: Vec<TypeField>,
}

impl TypeDesc {
    pub fn new() -> TypeDesc {
        TypeDesc::default()
    }

    /// Bytes an instance of this type occupies on the heap: one slot per
    /// field, minimum one slot.
    pub fn size_hint(&self) -> u32 {
        8 * (self.fields.len().max(1) as u32)
    }
}

impl Encode for TypeDesc {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        buf.push(TYPE_MARKER);
        Ok(())
    }
}

impl Decode for TypeDesc {
    fn decode(bytes: &[u8]) -> Result<(Self, usize), DecodeError> {
        take::<1>(bytes)?;
        Ok((TypeDesc::new(), 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_entry() {
        let desc = TypeDesc::new();
        let bytes = desc.encode_to_vec().unwrap();
        assert_eq!(bytes, [TYPE_MARKER]);

        let (decoded, consumed) = TypeDesc::decode(&bytes).unwrap();
        assert_eq!(consumed, 1);
        assert_eq!(decoded, desc);
        assert_eq!(decoded.size_hint(), 8);
    }
}
