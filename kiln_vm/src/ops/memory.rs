//! Heap and object construction handlers.
//!
//! `alloc`/`realloc`/`free` route straight through the first-fit heap;
//! successful allocations push a `ref` constant holding the handle. The
//! `new` family resolves a type descriptor for its size, allocates and
//! pushes a `ref`. Descriptors come from the current module, a linked
//! module, or the builtin table.

use crate::error::{RuntimeError, VmResult};
use crate::vm::Vm;
use kiln_core::{Const, TypeDesc};

/// `alloc size`.
pub fn alloc(vm: &mut Vm, size: u64) -> VmResult<()> {
    let handle = vm.heap.alloc(size as u32)?;
    vm.stack.push(Const::Ref(handle))?;
    Ok(())
}

/// `realloc handle size`: the old handle dies, the new one is pushed.
pub fn realloc(vm: &mut Vm, handle: u64, size: u64) -> VmResult<()> {
    let moved = vm.heap.realloc(handle as u32, size as u32)?;
    vm.stack.push(Const::Ref(moved))?;
    Ok(())
}

/// `free handle`.
pub fn free(vm: &mut Vm, handle: u64) -> VmResult<()> {
    vm.heap.free(handle as u32)?;
    Ok(())
}

/// `new type_offset`: allocate an instance of a local type.
pub fn new_object(vm: &mut Vm, type_offset: u64) -> VmResult<()> {
    let module = vm.frames.top()?.module.clone();
    let desc: TypeDesc = module.types.get(type_offset as u32)?;
    alloc_instance(vm, &desc)
}

/// `new.mod mod_offset type_offset`: allocate an instance of a linked
/// module's type.
pub fn new_mod_object(vm: &mut Vm, mod_offset: u64, type_offset: u64) -> VmResult<()> {
    let module = vm.load_link(mod_offset as u32)?;
    let desc: TypeDesc = module.types.get(type_offset as u32)?;
    alloc_instance(vm, &desc)
}

/// `new.builtin id`: allocate an instance backed by a builtin.
///
/// Builtin-defined types carry no field layout, so instances get a single
/// slot; the id is still validated against the registry.
pub fn new_builtin_object(vm: &mut Vm, id: u64) -> VmResult<()> {
    if vm.builtins.get(id as u16).is_none() {
        return Err(RuntimeError::MissingBuiltin(id as u16));
    }
    alloc_instance(vm, &TypeDesc::new())
}

fn alloc_instance(vm: &mut Vm, desc: &TypeDesc) -> VmResult<()> {
    let handle = vm.heap.alloc(desc.size_hint())?;
    vm.stack.push(Const::Ref(handle))?;
    Ok(())
}
