//! Call and return handlers.
//!
//! Calls pop the function constant from the top of stack; the arguments
//! are already beneath it and become the callee's locals in place. A new
//! frame's base pointer is the stack length minus argc, so local slot 0
//! is the first argument.
//!
//! Builtin callees run synchronously: the host callback sees a view of
//! the argument slots and its frame never produces a fetch beyond its
//! synthesized return.

use crate::error::{RuntimeError, VmResult};
use crate::frame::Frame;
use crate::value::get_fn;
use crate::vm::Vm;
use kiln_core::Function;

/// `call argc`.
pub fn call(vm: &mut Vm, argc: u64) -> VmResult<()> {
    let constant = vm.stack.pop()?;
    let function = get_fn(&constant)?;

    let argc = argc as u32;
    if function.locals() != argc {
        return Err(RuntimeError::IncorrectArgCount {
            expected: function.locals(),
            found: argc,
        });
    }

    let module = vm.frames.top()?.module.clone();
    if vm.stack.len() < argc as usize {
        return Err(crate::stack::StackError::Underflow.into());
    }
    let bp = vm.stack.len() - argc as usize;
    vm.frames.push(Frame::new(function.clone(), module, bp))?;

    if let Function::Builtin(builtin) = &function {
        let result = {
            let args = vm.stack.slice(bp, argc as usize)?;
            builtin.call(args)
        };
        let value = result.map_err(|err| RuntimeError::Builtin(err.to_string()))?;
        if let Some(value) = value {
            vm.stack.push(value)?;
        }
    }

    Ok(())
}

/// `return` / `return.value`.
///
/// Pops the frame; when this was the last frame the executor is done and
/// the stack is left untouched for the host to inspect. Otherwise the
/// callee's argument/local slots are cleaned off the stack and the saved
/// return value, if any, is pushed back.
pub fn ret(vm: &mut Vm, with_value: bool) -> VmResult<()> {
    let frame = vm.frames.pop()?;

    if vm.frames.is_empty() {
        vm.done = true;
        return Ok(());
    }

    let value = if with_value {
        Some(vm.stack.pop()?)
    } else {
        None
    };

    for _ in 0..frame.function.locals() {
        vm.stack.pop()?;
    }

    if let Some(value) = value {
        vm.stack.push(value)?;
    }
    Ok(())
}
