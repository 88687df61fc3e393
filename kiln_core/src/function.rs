//! Function values: compiled bytecode bodies and host builtins.
//!
//! Both shapes satisfy the same capability (a name, a local count and an
//! instruction stream), so the executor can push a frame for either. The
//! two are kept as an explicit sum rather than trait objects; the executor
//! special-cases builtins to run them synchronously without a fetch loop.

use crate::bytecode::{Instructions, Opcode};
use crate::codec::{read_u32, take_slice, Decode, Encode};
use crate::constant::{Const, ConstTag};
use crate::error::{DecodeError, EncodeError};
use std::fmt;
use std::sync::Arc;

/// Result of a host builtin call. `None` means the builtin returns nothing
/// and the synthesized `return` drops straight to the caller.
pub type HostResult = Result<Option<Const>, Box<dyn std::error::Error + Send + Sync>>;

/// Host callback backing a builtin function.
pub type BuiltinHandler = Arc<dyn Fn(&[Const]) -> HostResult + Send + Sync>;

/// A function compiled from IR: the payload of a `fn` constant.
///
/// Wire layout: `name_len: u32 | name | locals: u32 | code_len: u32 | code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFn {
    name: String,
    locals: u32,
    code: Instructions,
}

impl CompiledFn {
    pub fn new(name: impl Into<String>, locals: u32, code: Instructions) -> Self {
        CompiledFn {
            name: name.into(),
            locals,
            code,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn locals(&self) -> u32 {
        self.locals
    }

    #[inline]
    pub fn code(&self) -> &Instructions {
        &self.code
    }
}

impl Encode for CompiledFn {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        buf.extend_from_slice(&(self.name.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.name.as_bytes());
        buf.extend_from_slice(&self.locals.to_le_bytes());
        buf.extend_from_slice(&(self.code.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.code);
        Ok(())
    }
}

impl Decode for CompiledFn {
    fn decode(bytes: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut off = 0;

        let name_len = read_u32(&bytes[off..])? as usize;
        off += 4;
        let name = String::from_utf8_lossy(take_slice(&bytes[off..], name_len)?).into_owned();
        off += name_len;

        let locals = read_u32(&bytes[off..])?;
        off += 4;

        let code_len = read_u32(&bytes[off..])? as usize;
        off += 4;
        let code = Instructions(take_slice(&bytes[off..], code_len)?.to_vec());
        off += code_len;

        Ok((CompiledFn { name, locals, code }, off))
    }
}

/// A host-provided function surfaced to bytecode under an integer id.
///
/// Builtins have no serialized form; they exist only inside a live VM.
pub struct BuiltinFn {
    name: String,
    locals: u32,
    returns: Option<ConstTag>,
    handler: BuiltinHandler,
}

impl BuiltinFn {
    pub fn new(
        name: impl Into<String>,
        locals: u32,
        returns: Option<ConstTag>,
        handler: BuiltinHandler,
    ) -> Self {
        BuiltinFn {
            name: name.into(),
            locals,
            returns,
            handler,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn locals(&self) -> u32 {
        self.locals
    }

    /// Tag of the returned constant, if the builtin produces one.
    #[inline]
    pub fn returns(&self) -> Option<ConstTag> {
        self.returns
    }

    /// Invoke the host callback.
    pub fn call(&self, args: &[Const]) -> HostResult {
        (self.handler)(args)
    }
}

impl fmt::Debug for BuiltinFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinFn")
            .field("name", &self.name)
            .field("locals", &self.locals)
            .field("returns", &self.returns)
            .finish()
    }
}

/// The common function capability: compiled or builtin.
#[derive(Debug, Clone)]
pub enum Function {
    Compiled(Arc<CompiledFn>),
    Builtin(Arc<BuiltinFn>),
}

impl Function {
    #[inline]
    pub fn name(&self) -> &str {
        match self {
            Function::Compiled(func) => func.name(),
            Function::Builtin(func) => func.name(),
        }
    }

    #[inline]
    pub fn locals(&self) -> u32 {
        match self {
            Function::Compiled(func) => func.locals(),
            Function::Builtin(func) => func.locals(),
        }
    }

    /// The function body. Builtins synthesize a single return op so their
    /// frames unwind through the ordinary return path after the host call.
    pub fn instructions(&self) -> Instructions {
        match self {
            Function::Compiled(func) => func.code().clone(),
            Function::Builtin(func) => {
                let mut set = Instructions::new();
                if func.returns().is_some() {
                    set.push_op(Opcode::ReturnValue, &[]);
                } else {
                    set.push_op(Opcode::Return, &[]);
                }
                set
            }
        }
    }

    #[inline]
    pub fn as_builtin(&self) -> Option<&Arc<BuiltinFn>> {
        match self {
            Function::Builtin(func) => Some(func),
            _ => None,
        }
    }
}

impl From<CompiledFn> for Function {
    fn from(func: CompiledFn) -> Self {
        Function::Compiled(Arc::new(func))
    }
}

impl From<BuiltinFn> for Function {
    fn from(func: BuiltinFn) -> Self {
        Function::Builtin(Arc::new(func))
    }
}

/// Compiled functions compare structurally; builtins by identity.
impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Function::Compiled(a), Function::Compiled(b)) => a == b,
            (Function::Builtin(a), Function::Builtin(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
