//! Builtin registry and the default builtin set.
//!
//! Builtins are constants surfaced to bytecode under dense integer ids;
//! `load.builtin` pushes them like any other constant. Most are function
//! constants, but the registry deliberately accepts any constant so
//! embedders can expose host values too.
//!
//! The default set:
//!
//! - `panic`: a *compiled* function whose body is a single `trap`; the
//!   executor's self-trap path calls it with the message string already
//!   on the stack.
//! - `syscall`: a host builtin performing descriptor I/O through the
//!   [`Process`] table: `syscall(op, fd, data) -> i64`.

use crate::process::Process;
use crate::value::{get_data, get_i64};
use kiln_core::{BuiltinFn, CompiledFn, Const, ConstTag, Instructions, Opcode};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// `syscall` op selector: read from a descriptor.
pub const SYSCALL_READ: i64 = 0;
/// `syscall` op selector: write to a descriptor.
pub const SYSCALL_WRITE: i64 = 1;

/// Dense id table of builtin constants with a name index.
#[derive(Debug, Default)]
pub struct Builtins {
    entries: Vec<Const>,
    names: FxHashMap<String, u16>,
}

impl Builtins {
    pub fn new() -> Builtins {
        Builtins::default()
    }

    /// The default set backed by `process`.
    pub fn defaults(process: Arc<Process>) -> Builtins {
        let mut builtins = Builtins::new();
        builtins.register("panic", panic_fn());
        builtins.register("syscall", syscall_fn(process));
        builtins
    }

    /// Register a constant under `name`, returning its id.
    pub fn register(&mut self, name: impl Into<String>, constant: Const) -> u16 {
        let id = self.entries.len() as u16;
        self.entries.push(constant);
        self.names.insert(name.into(), id);
        id
    }

    /// Id registered for `name`.
    pub fn id(&self, name: &str) -> Option<u16> {
        self.names.get(name).copied()
    }

    /// Constant registered under `id`.
    pub fn get(&self, id: u16) -> Option<&Const> {
        self.entries.get(id as usize)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identity map over the registered ids, in the shape the compiler
    /// takes as its builtin index.
    pub fn index_map(&self) -> FxHashMap<u64, u16> {
        (0..self.entries.len() as u16)
            .map(|id| (id as u64, id))
            .collect()
    }
}

/// The `panic` builtin: a compiled one-op body so the trap executes
/// through the ordinary fetch path, message argument in local 0.
pub fn panic_fn() -> Const {
    let mut code = Instructions::new();
    code.push_op(Opcode::Trap, &[]);
    Const::Fn(CompiledFn::new("panic", 1, code).into())
}

/// The `syscall` builtin: `(op, fd, data) -> i64`.
///
/// `read` fills no buffer yet and reports 0 bytes; `write` pushes `data`
/// into the process write descriptor and reports the byte count.
pub fn syscall_fn(process: Arc<Process>) -> Const {
    let handler: kiln_core::BuiltinHandler = Arc::new(move |args: &[Const]| {
        let op = get_i64(&args[0])?;
        let fd = get_i64(&args[1])?;
        let data = get_data(&args[2])?;

        match op {
            SYSCALL_READ => Ok(Some(Const::I64(0))),
            SYSCALL_WRITE => {
                let written = process.write(fd as usize, data)?;
                Ok(Some(Const::I64(written as i64)))
            }
            _ => Err(format!("invalid op argument for syscall {}", op).into()),
        }
    });

    Const::Fn(BuiltinFn::new("syscall", 3, Some(ConstTag::I64), handler).into())
}
