//! Arithmetic, logic and bitwise opcode handlers.
//!
//! Every binary op pops right then left, checks both against the opcode's
//! expected tag and pushes a result with the same tag. Signed overflow
//! wraps two's-complement; shift counts are masked to 0–63; division and
//! modulo by zero are runtime errors.

use crate::error::{RuntimeError, VmResult};
use crate::value::{get_bool, get_f64, get_i64, get_u64, pop_binary};
use crate::vm::Vm;
use kiln_core::{Const, Opcode};

/// Dispatch one of the binary arithmetic/logic opcodes.
pub fn execute_binary(vm: &mut Vm, code: Opcode) -> VmResult<()> {
    match code {
        Opcode::AddI64
        | Opcode::SubI64
        | Opcode::MulI64
        | Opcode::DivI64
        | Opcode::ModI64
        | Opcode::MaskAnd
        | Opcode::MaskOr
        | Opcode::MaskXor
        | Opcode::ShiftLeft
        | Opcode::ShiftRight => {
            let (left, right) = pop_binary(&mut vm.stack, get_i64)?;
            let value = match code {
                Opcode::AddI64 => left.wrapping_add(right),
                Opcode::SubI64 => left.wrapping_sub(right),
                Opcode::MulI64 => left.wrapping_mul(right),
                Opcode::DivI64 => {
                    if right == 0 {
                        return Err(RuntimeError::DivideByZero);
                    }
                    left.wrapping_div(right)
                }
                Opcode::ModI64 => {
                    if right == 0 {
                        return Err(RuntimeError::DivideByZero);
                    }
                    left.wrapping_rem(right)
                }
                Opcode::MaskAnd => left & right,
                Opcode::MaskOr => left | right,
                Opcode::MaskXor => left ^ right,
                Opcode::ShiftLeft => left.wrapping_shl(right as u32),
                Opcode::ShiftRight => left.wrapping_shr(right as u32),
                _ => unreachable!(),
            };
            vm.stack.push(Const::I64(value))?;
        }

        Opcode::AddU64 | Opcode::SubU64 | Opcode::MulU64 | Opcode::DivU64 | Opcode::ModU64 => {
            let (left, right) = pop_binary(&mut vm.stack, get_u64)?;
            let value = match code {
                Opcode::AddU64 => left.wrapping_add(right),
                Opcode::SubU64 => left.wrapping_sub(right),
                Opcode::MulU64 => left.wrapping_mul(right),
                Opcode::DivU64 => {
                    if right == 0 {
                        return Err(RuntimeError::DivideByZero);
                    }
                    left / right
                }
                Opcode::ModU64 => {
                    if right == 0 {
                        return Err(RuntimeError::DivideByZero);
                    }
                    left % right
                }
                _ => unreachable!(),
            };
            vm.stack.push(Const::U64(value))?;
        }

        Opcode::DivF64 => {
            let (left, right) = pop_binary(&mut vm.stack, get_f64)?;
            if right == 0.0 {
                return Err(RuntimeError::DivideByZero);
            }
            vm.stack.push(Const::F64(left / right))?;
        }

        Opcode::And | Opcode::Or => {
            let (left, right) = pop_binary(&mut vm.stack, get_bool)?;
            let value = match code {
                Opcode::And => left && right,
                _ => left || right,
            };
            vm.stack.push(Const::bool(value))?;
        }

        _ => unreachable!("execute_binary dispatched with {}", code),
    }
    Ok(())
}
