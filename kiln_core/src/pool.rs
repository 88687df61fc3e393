//! Packed byte arena with a key→offset index.
//!
//! The compiler chooses small dense keys; the pool packs entries into a
//! contiguous byte region and hands back the offset of each write. Keys are
//! write-once and the write pointer only moves forward, so offsets stay
//! valid for the lifetime of the pool.
//!
//! The index is *not* serialized. After a round-trip through bytes, entries
//! are located by offset alone; the compiler has already rewritten every
//! `load.const` operand from key space to offset space.

use crate::codec::{read_u32, take_slice, Decode, Encode};
use crate::error::{DecodeError, EncodeError, PoolError};
use rustc_hash::FxHashMap;

/// Nominal pool capacity in bytes.
pub const POOL_SIZE: usize = 4096;

/// A write-once byte arena.
#[derive(Debug, Clone, Default)]
pub struct Pool {
    data: Vec<u8>,
    index: FxHashMap<u64, u32>,
}

impl Pool {
    pub fn new() -> Self {
        Pool {
            data: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    /// Write `value` under `key`, returning the offset it landed at.
    ///
    /// Fails if the key is already present or the encoded value does not
    /// fit in the remaining capacity. Failed writes leave the pool intact.
    pub fn set(&mut self, key: u64, value: &impl Encode) -> Result<u32, PoolError> {
        if self.has(key) {
            return Err(PoolError::KeyExists(key));
        }

        let encoded = value.encode_to_vec()?;
        let available = POOL_SIZE - self.data.len();
        if encoded.len() > available {
            return Err(PoolError::Overflow {
                needed: encoded.len(),
                available,
            });
        }

        let offset = self.data.len() as u32;
        self.data.extend_from_slice(&encoded);
        self.index.insert(key, offset);
        Ok(offset)
    }

    /// Decode the entry starting at `offset`.
    pub fn get<T: Decode>(&self, offset: u32) -> Result<T, DecodeError> {
        let offset = offset as usize;
        if offset > self.data.len() {
            return Err(DecodeError::Truncated {
                needed: offset,
                available: self.data.len(),
            });
        }
        T::decode(&self.data[offset..]).map(|(value, _)| value)
    }

    /// Whether `key` has been written.
    #[inline]
    pub fn has(&self, key: u64) -> bool {
        self.index.contains_key(&key)
    }

    /// Offset recorded for `key` at write time.
    #[inline]
    pub fn lookup(&self, key: u64) -> Option<u32> {
        self.index.get(&key).copied()
    }

    /// Bytes written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// View of the packed bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Wire form: `len: u32 | bytes[len]`. The index is rebuilt from offsets
/// by callers and never crosses the wire.
impl Encode for Pool {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        buf.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.data);
        Ok(())
    }
}

impl Decode for Pool {
    fn decode(bytes: &[u8]) -> Result<(Self, usize), DecodeError> {
        let len = read_u32(bytes)? as usize;
        let data = take_slice(&bytes[4..], len)?.to_vec();
        Ok((
            Pool {
                data,
                index: FxHashMap::default(),
            },
            4 + len,
        ))
    }
}
