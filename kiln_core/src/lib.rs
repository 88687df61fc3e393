//! Core data model for the Kiln virtual machine toolchain.
//!
//! This crate defines the binary module format shared by the compiler and
//! the execution engine:
//!
//! - **Pool**: a packed byte arena with a key→offset index
//! - **Const**: the tagged constant model and its self-describing codec
//! - **Module / Archive**: named bundles of pools and their wire formats
//! - **Bytecode**: the opcode table, operand widths and instruction codec
//!
//! Everything here is plain data. Compilation lives in `kiln_compiler`,
//! execution in `kiln_vm`.
//!
//! # Wire format
//!
//! ```text
//! archive  := entry_mod: u32 | entry_const: u32 | modules: pool
//! pool     := len: u32 | bytes[len]
//! module   := version: u32 | module_len: u32 | name_len: u16 | name
//!             | links: pool | types: pool | consts: pool
//! const    := tag: u8 | payload
//! ```
//!
//! All multi-byte integers are little-endian. Modules are keyed in the
//! archive by the FNV-1a/64 hash of their name.

pub mod archive;
pub mod bytecode;
pub mod codec;
pub mod constant;
pub mod error;
pub mod function;
pub mod module;
pub mod pool;
pub mod typedesc;
pub mod version;

pub use archive::{hash_name, Archive};
pub use bytecode::{encode_op, read_operands, Instructions, OpInfo, Opcode, Operands};
pub use codec::{Decode, Encode};
pub use constant::{Const, ConstTag};
pub use error::{DecodeError, EncodeError, PoolError};
pub use function::{BuiltinFn, BuiltinHandler, CompiledFn, Function, HostResult};
pub use module::{Link, Module};
pub use pool::{Pool, POOL_SIZE};
pub use typedesc::{TypeDesc, TypeField};
pub use version::Version;
