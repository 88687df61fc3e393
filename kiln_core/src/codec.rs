//! Self-delimiting binary codec traits and primitive readers.
//!
//! Pool entries carry no length prefix between them; every value knows how
//! to decode itself and report how many bytes it consumed. Writers and
//! readers are therefore coupled to the same schema version; the module
//! version field is the discriminator.

use crate::error::{DecodeError, EncodeError};

/// A value with a binary encoding.
pub trait Encode {
    /// Append the encoded form of `self` to `buf`.
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError>;

    /// Encode into a fresh buffer.
    fn encode_to_vec(&self) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }
}

/// A value that can reconstruct itself from bytes.
///
/// Decoders return the number of bytes consumed so that callers can walk
/// packed sequences without an external framing layer.
pub trait Decode: Sized {
    /// Decode a value from the front of `bytes`, returning it together
    /// with the number of bytes consumed.
    fn decode(bytes: &[u8]) -> Result<(Self, usize), DecodeError>;
}

/// Take `N` bytes from the front of `bytes` or fail with `Truncated`.
#[inline]
pub fn take<const N: usize>(bytes: &[u8]) -> Result<[u8; N], DecodeError> {
    if bytes.len() < N {
        return Err(DecodeError::Truncated {
            needed: N,
            available: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    Ok(out)
}

/// Take a run of `len` bytes or fail with `Truncated`.
#[inline]
pub fn take_slice(bytes: &[u8], len: usize) -> Result<&[u8], DecodeError> {
    if bytes.len() < len {
        return Err(DecodeError::Truncated {
            needed: len,
            available: bytes.len(),
        });
    }
    Ok(&bytes[..len])
}

#[inline]
pub fn read_u16(bytes: &[u8]) -> Result<u16, DecodeError> {
    Ok(u16::from_le_bytes(take::<2>(bytes)?))
}

#[inline]
pub fn read_u32(bytes: &[u8]) -> Result<u32, DecodeError> {
    Ok(u32::from_le_bytes(take::<4>(bytes)?))
}

#[inline]
pub fn read_u64(bytes: &[u8]) -> Result<u64, DecodeError> {
    Ok(u64::from_le_bytes(take::<8>(bytes)?))
}
