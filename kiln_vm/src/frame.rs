//! Call frames.
//!
//! A frame is one function activation: the function value, the module it
//! runs against, an instruction pointer and a base pointer into the
//! operand stack. Locals `0..locals` live at `[bp, bp + locals)`; `bp`
//! points at the first argument.

use crate::error::{RuntimeError, VmResult};
use kiln_core::{read_operands, Function, Module, Opcode, Operands};
use std::fmt;
use std::sync::Arc;

/// Synthesized bodies for builtin frames, so they unwind through the
/// ordinary return path after the host call.
const BUILTIN_RETURN: [u8; 1] = [Opcode::Return as u8];
const BUILTIN_RETURN_VALUE: [u8; 1] = [Opcode::ReturnValue as u8];

/// A function activation record.
#[derive(Debug, Clone)]
pub struct Frame {
    pub function: Function,
    /// Module whose pools `load.const` resolves against. Calls inherit the
    /// caller's module; only the entry frame binds the main module itself.
    pub module: Arc<Module>,
    /// Byte index of the next instruction.
    pub ip: usize,
    /// Base pointer: absolute operand-stack index of local slot 0.
    pub bp: usize,
}

impl Frame {
    pub fn new(function: Function, module: Arc<Module>, bp: usize) -> Frame {
        Frame {
            function,
            module,
            ip: 0,
            bp,
        }
    }

    /// The code this frame is executing.
    #[inline]
    fn code(&self) -> &[u8] {
        match &self.function {
            Function::Compiled(func) => func.code(),
            Function::Builtin(func) => {
                if func.returns().is_some() {
                    &BUILTIN_RETURN_VALUE
                } else {
                    &BUILTIN_RETURN
                }
            }
        }
    }

    /// Decode the instruction at `ip` and advance past it.
    ///
    /// The opcode byte and the full operand width are bounds-checked
    /// before any operand is read; a truncated tail never partially
    /// advances the pointer.
    pub fn fetch(&mut self) -> VmResult<(Opcode, Operands)> {
        let code = self.code();
        if self.ip >= code.len() {
            return Err(RuntimeError::FetchOutOfBounds {
                ip: self.ip,
                len: code.len(),
            });
        }

        let opcode = Opcode::from_u8(code[self.ip])?;
        if self.ip + opcode.width() > code.len() {
            return Err(RuntimeError::FetchOutOfBounds {
                ip: self.ip,
                len: code.len(),
            });
        }

        let (operands, used) = read_operands(opcode.info(), &code[self.ip + 1..]);
        self.ip += 1 + used;
        Ok((opcode, operands))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.function.name())
    }
}
