//! IR-to-bytecode compiler for the Kiln VM.
//!
//! Consumes a parsed [`ast::Program`], resolves its links through a
//! resolver map, interns constants into module pools and produces a
//! serialized [`Archive`](kiln_core::Archive) ready for execution.
//!
//! ```ignore
//! use kiln_compiler::{ast, compile, BuiltinIndex, Resolver};
//! use kiln_core::Version;
//!
//! let mut program = ast::Program::new("main");
//! // ... push link/type/const statements ...
//! let archive = compile(Version::new(0, 0, 1), &program, &Resolver::default(),
//!     &BuiltinIndex::default())?;
//! let bytes = archive.to_bytes();
//! ```

pub mod ast;
pub mod compiler;

pub use compiler::{
    compile, BuiltinIndex, CompileError, CompileResult, Compiler, Resolver, ENTRY_KEY,
    RESERVED_KEY_BASE,
};
