//! Error types for the wire format.
//!
//! Encoding is total over serializable values; decoding is strict and
//! rejects anything it does not recognize. Pool writes fail atomically.

use std::fmt;

/// Error produced while encoding a value into its binary form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A host-provided builtin function has no serialized form.
    HostFn,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::HostFn => {
                write!(f, "builtin function constants cannot be serialized")
            }
        }
    }
}

impl std::error::Error for EncodeError {}

/// Error produced while decoding a value from bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The constant tag byte is not part of the tag set.
    UnknownConstTag(u8),
    /// The opcode byte is not part of the instruction set.
    UnknownOpcode(u8),
    /// The input ended before the value was complete.
    Truncated {
        /// Bytes required to finish the current field.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnknownConstTag(tag) => {
                write!(f, "failed to decode const: invalid tag {}", tag)
            }
            DecodeError::UnknownOpcode(code) => write!(f, "undefined opcode {}", code),
            DecodeError::Truncated { needed, available } => write!(
                f,
                "truncated input: needed {} bytes, found {}",
                needed, available
            ),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Error produced by [`Pool`](crate::Pool) writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The key was already written; pool entries are write-once.
    KeyExists(u64),
    /// The encoded value does not fit in the remaining capacity.
    Overflow {
        /// Bytes the value would occupy.
        needed: usize,
        /// Bytes left in the pool.
        available: usize,
    },
    /// The value itself failed to encode.
    Encode(EncodeError),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::KeyExists(key) => {
                write!(f, "failed to add to pool: key {} already exists", key)
            }
            PoolError::Overflow { needed, available } => write!(
                f,
                "failed to add to pool: value needs {} bytes, {} available",
                needed, available
            ),
            PoolError::Encode(err) => write!(f, "failed to add to pool: {}", err),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PoolError::Encode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EncodeError> for PoolError {
    fn from(err: EncodeError) -> Self {
        PoolError::Encode(err)
    }
}
