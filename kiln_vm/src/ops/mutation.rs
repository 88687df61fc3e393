//! Stack hygiene and unary mutation handlers.

use crate::error::VmResult;
use crate::value::get_i64;
use crate::vm::Vm;
use kiln_core::Const;

/// `pop`: drop the top of stack.
pub fn pop(vm: &mut Vm) -> VmResult<()> {
    vm.stack.pop()?;
    Ok(())
}

/// `swap`: exchange the two topmost values.
pub fn swap(vm: &mut Vm) -> VmResult<()> {
    let right = vm.stack.pop()?;
    let left = vm.stack.pop()?;
    vm.stack.push(right)?;
    vm.stack.push(left)?;
    Ok(())
}

/// `mask.not`: bitwise complement of an `i64`.
pub fn mask_not(vm: &mut Vm) -> VmResult<()> {
    let constant = vm.stack.pop()?;
    let value = get_i64(&constant)?;
    vm.stack.push(Const::I64(!value))?;
    Ok(())
}
