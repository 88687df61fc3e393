//! Runtime error taxonomy.
//!
//! Every variant here is converted into a trap by the run loop; the host
//! never sees these directly, only `halted() && paniced()` plus the
//! rendered message.

use crate::heap::HeapError;
use crate::stack::StackError;
use kiln_core::{ConstTag, DecodeError};
use std::fmt;

/// An error raised while dispatching an opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Instruction or constant bytes failed to decode.
    Decode(DecodeError),
    /// The instruction pointer left the function's code.
    FetchOutOfBounds { ip: usize, len: usize },
    /// A constant had the wrong tag for the operation.
    ConstTypeInvalid {
        expected: &'static str,
        found: ConstTag,
    },
    /// Integer or float division/modulo by zero.
    DivideByZero,
    /// `call` argc does not match the function's local count.
    IncorrectArgCount { expected: u32, found: u32 },
    /// Operand or frame stack over/underflow.
    Stack(StackError),
    /// `load.builtin`/`new.builtin` id beyond the registered table.
    MissingBuiltin(u16),
    /// A linked module could not be decoded from the archive.
    LinkLoadFailed { offset: u32, source: DecodeError },
    /// Heap allocator failure.
    Heap(HeapError),
    /// A host builtin reported an error.
    Builtin(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Decode(err) => write!(f, "op fetch failed: {}", err),
            RuntimeError::FetchOutOfBounds { .. } => {
                write!(
                    f,
                    "op fetch failed: pointer is reading outside of function instructions"
                )
            }
            RuntimeError::ConstTypeInvalid { expected, found } => write!(
                f,
                "constant type is invalid: expected {} found {}",
                expected, found
            ),
            RuntimeError::DivideByZero => write!(f, "divide by zero"),
            RuntimeError::IncorrectArgCount { expected, found } => write!(
                f,
                "function is called with incorrect number of arguments: expected {} got {}",
                expected, found
            ),
            RuntimeError::Stack(err) => write!(f, "{}", err),
            RuntimeError::MissingBuiltin(id) => write!(f, "no such builtin {}", id),
            RuntimeError::LinkLoadFailed { offset, source } => {
                write!(f, "failed to load link at offset {}: {}", offset, source)
            }
            RuntimeError::Heap(err) => write!(f, "{}", err),
            RuntimeError::Builtin(msg) => write!(f, "builtin call failed: {}", msg),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RuntimeError::Decode(err) => Some(err),
            RuntimeError::LinkLoadFailed { source, .. } => Some(source),
            RuntimeError::Stack(err) => Some(err),
            RuntimeError::Heap(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DecodeError> for RuntimeError {
    fn from(err: DecodeError) -> Self {
        RuntimeError::Decode(err)
    }
}

impl From<StackError> for RuntimeError {
    fn from(err: StackError) -> Self {
        RuntimeError::Stack(err)
    }
}

impl From<HeapError> for RuntimeError {
    fn from(err: HeapError) -> Self {
        RuntimeError::Heap(err)
    }
}

pub type VmResult<T> = Result<T, RuntimeError>;
