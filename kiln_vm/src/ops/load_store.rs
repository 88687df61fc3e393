//! Load and store opcode handlers.
//!
//! `load.const` operands are byte offsets into the current module's consts
//! pool; the compiler rewrote them from key space at compile time, so
//! decoding here is a straight pool read.

use crate::error::{RuntimeError, VmResult};
use crate::vm::Vm;
use kiln_core::{Const, Opcode};

/// `load.const offset`: decode a constant from the current module.
pub fn load_const(vm: &mut Vm, offset: u64) -> VmResult<()> {
    let module = vm.frames.top()?.module.clone();
    let constant: Const = module.consts.get(offset as u32)?;
    vm.stack.push(constant)?;
    Ok(())
}

/// `load.modconst mod_offset const_offset`: decode a constant from a
/// linked module through the decode cache.
pub fn load_mod_const(vm: &mut Vm, mod_offset: u64, const_offset: u64) -> VmResult<()> {
    let module = vm.load_link(mod_offset as u32)?;
    let constant: Const = module.consts.get(const_offset as u32)?;
    vm.stack.push(constant)?;
    Ok(())
}

/// `load.builtin id`: push the pre-registered builtin constant.
pub fn load_builtin(vm: &mut Vm, id: u64) -> VmResult<()> {
    let constant = vm
        .builtins
        .get(id as u16)
        .cloned()
        .ok_or(RuntimeError::MissingBuiltin(id as u16))?;
    vm.stack.push(constant)?;
    Ok(())
}

/// `load.local slot`: push a copy of `stack[bp + slot]`.
pub fn load_local(vm: &mut Vm, slot: u64) -> VmResult<()> {
    let bp = vm.frames.top()?.bp;
    let constant = vm.stack.get(bp + slot as usize)?.clone();
    vm.stack.push(constant)?;
    Ok(())
}

/// `set.local slot`: pop the top of stack into `stack[bp + slot]`.
pub fn set_local(vm: &mut Vm, slot: u64) -> VmResult<()> {
    let bp = vm.frames.top()?.bp;
    let value = vm.stack.pop()?;
    vm.stack.set(bp + slot as usize, value)?;
    Ok(())
}

/// `load.{i32,i64,u32,u64} imm`: push a freshly constructed scalar.
pub fn load_immediate(vm: &mut Vm, code: Opcode, operand: u64) -> VmResult<()> {
    let constant = match code {
        Opcode::LoadI32 => Const::I32(operand as u32 as i32),
        Opcode::LoadI64 => Const::I64(operand as i64),
        Opcode::LoadU32 => Const::U32(operand as u32),
        Opcode::LoadU64 => Const::U64(operand),
        _ => unreachable!("load_immediate dispatched with {}", code),
    };
    vm.stack.push(constant)?;
    Ok(())
}
