//! The fetch–decode–dispatch loop and the trap discipline.
//!
//! [`Vm::run`] loops while the machine is neither halted, done nor
//! paused: fetch from the top frame, dispatch, and convert any error into
//! a trap. Trapping pushes the rendered error string and invokes the
//! `panic` builtin (a compiled `[trap]` body), so the abort travels
//! through the ordinary call path and the user frame chain stays intact.

use crate::error::VmResult;
use crate::ops;
use crate::vm::Vm;
use kiln_core::{Const, Opcode};

impl Vm {
    /// Execute until the machine halts, finishes or yields.
    ///
    /// Returns with exactly one of `halted()`, `done()` or `paused()`
    /// set. Calling `run` on a paused machine resumes it at the
    /// instruction after the `yield`; calling it on a halted or done
    /// machine is a no-op.
    pub fn run(&mut self) {
        self.paused = false;

        while self.running() {
            let fetched = match self.frames.top_mut() {
                Ok(frame) => frame.fetch(),
                Err(err) => {
                    self.trap(format!("failed to get frame: {}", err));
                    continue;
                }
            };

            let (code, operands) = match fetched {
                Ok(fetched) => fetched,
                Err(err) => {
                    self.trap(err.to_string());
                    continue;
                }
            };

            if let Err(err) = self.execute(code, &operands) {
                self.trap(format!("failed to execute op {}: {}", code, err));
            }
        }
    }

    #[inline]
    fn running(&self) -> bool {
        !self.halted && !self.done && !self.paused
    }

    /// Dispatch a single decoded instruction.
    pub(crate) fn execute(&mut self, code: Opcode, operands: &[u64]) -> VmResult<()> {
        match code {
            Opcode::Noop => Ok(()),

            Opcode::LoadConst => ops::load_store::load_const(self, operands[0]),
            Opcode::LoadModConst => {
                ops::load_store::load_mod_const(self, operands[0], operands[1])
            }
            Opcode::LoadBuiltin => ops::load_store::load_builtin(self, operands[0]),
            Opcode::LoadLocal => ops::load_store::load_local(self, operands[0]),
            Opcode::LoadI32 | Opcode::LoadI64 | Opcode::LoadU32 | Opcode::LoadU64 => {
                ops::load_store::load_immediate(self, code, operands[0])
            }
            Opcode::SetLocal => ops::load_store::set_local(self, operands[0]),

            Opcode::Alloc => ops::memory::alloc(self, operands[0]),
            Opcode::Realloc => ops::memory::realloc(self, operands[0], operands[1]),
            Opcode::Free => ops::memory::free(self, operands[0]),
            Opcode::New => ops::memory::new_object(self, operands[0]),
            Opcode::NewMod => ops::memory::new_mod_object(self, operands[0], operands[1]),
            Opcode::NewBuiltin => ops::memory::new_builtin_object(self, operands[0]),

            Opcode::Pop => ops::mutation::pop(self),
            Opcode::Swap => ops::mutation::swap(self),
            Opcode::MaskNot => ops::mutation::mask_not(self),

            Opcode::Call => ops::calls::call(self, operands[0]),
            Opcode::Return => ops::calls::ret(self, false),
            Opcode::ReturnValue => ops::calls::ret(self, true),

            Opcode::AddU64
            | Opcode::AddI64
            | Opcode::SubU64
            | Opcode::SubI64
            | Opcode::MulU64
            | Opcode::MulI64
            | Opcode::DivU64
            | Opcode::DivI64
            | Opcode::DivF64
            | Opcode::ModU64
            | Opcode::ModI64
            | Opcode::And
            | Opcode::Or
            | Opcode::MaskAnd
            | Opcode::MaskOr
            | Opcode::MaskXor
            | Opcode::ShiftRight
            | Opcode::ShiftLeft => ops::arithmetic::execute_binary(self, code),

            Opcode::Jmp | Opcode::Jmpz | Opcode::Jmpt | Opcode::Jmpn | Opcode::Jmpp => {
                ops::control::jump(self, code, operands[0])
            }

            Opcode::Yield => ops::control::yield_(self),
            Opcode::Trap => ops::control::trap(self),
            Opcode::Halt => ops::control::halt(self),
        }
    }

    /// Convert a dispatch error into a panic.
    ///
    /// Pushes `reason` and calls the `panic` builtin; its `trap` body then
    /// records the message and halts. When the builtin is unregistered or
    /// the call itself cannot proceed, the message is recorded directly;
    /// the VM never unwinds into the host.
    pub(crate) fn trap(&mut self, reason: String) {
        let id = match self.builtins.id("panic") {
            Some(id) => id,
            None => return self.abort(reason),
        };

        let invoked = (|| -> VmResult<()> {
            self.stack.push(Const::Str(reason.clone()))?;
            self.execute(Opcode::LoadBuiltin, &[id as u64])?;
            self.execute(Opcode::Call, &[1])
        })();

        if invoked.is_err() {
            self.abort(reason);
        }
    }

    /// Last-resort panic when the trap path itself is unavailable.
    fn abort(&mut self, reason: String) {
        self.paniced = true;
        self.panic_message = Some(reason);
        self.halted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::Builtins;
    use crate::error::RuntimeError;
    use crate::frame::Frame;
    use crate::process::Process;
    use kiln_core::{CompiledFn, ConstTag, Instructions, Module, Version};
    use std::sync::Arc;

    /// A VM with one builtin (`"0"` → i64 1), a frame over a module with
    /// one i64 const at offset 0, and no archive.
    fn test_vm() -> Vm {
        let mut builtins = Builtins::new();
        builtins.register("0", Const::I64(1));

        let mut vm = Vm::new(builtins, Arc::new(Process::detached()));

        let mut module = Module::new("main", Version::new(0, 0, 1));
        module.consts.set(0, &Const::I64(1)).unwrap();

        vm.frames
            .push(Frame::new(
                CompiledFn::new("main", 0, Instructions::new()).into(),
                Arc::new(module),
                0,
            ))
            .unwrap();
        vm
    }

    fn add_fn() -> Const {
        let mut code = Instructions::new();
        code.push_op(Opcode::LoadLocal, &[0]);
        code.push_op(Opcode::LoadLocal, &[1]);
        code.push_op(Opcode::AddI64, &[]);
        code.push_op(Opcode::ReturnValue, &[]);
        Const::Fn(CompiledFn::new("add", 2, code).into())
    }

    #[test]
    fn test_load_ops() {
        let mut vm = test_vm();

        vm.execute(Opcode::LoadConst, &[0]).unwrap();
        assert_eq!(vm.stack.top().unwrap(), &Const::I64(1));

        vm.execute(Opcode::LoadBuiltin, &[0]).unwrap();
        assert_eq!(vm.stack.top().unwrap(), &Const::I64(1));
        assert_eq!(
            vm.execute(Opcode::LoadBuiltin, &[1]).unwrap_err(),
            RuntimeError::MissingBuiltin(1)
        );

        vm.execute(Opcode::LoadI32, &[256]).unwrap();
        assert_eq!(vm.stack.top().unwrap(), &Const::I32(256));
        vm.execute(Opcode::LoadI64, &[256]).unwrap();
        assert_eq!(vm.stack.top().unwrap(), &Const::I64(256));
        vm.execute(Opcode::LoadU32, &[256]).unwrap();
        assert_eq!(vm.stack.top().unwrap(), &Const::U32(256));
        vm.execute(Opcode::LoadU64, &[256]).unwrap();
        assert_eq!(vm.stack.top().unwrap(), &Const::U64(256));

        // Negative immediates arrive as two's-complement bit patterns.
        vm.execute(Opcode::LoadI64, &[(-5i64) as u64]).unwrap();
        assert_eq!(vm.stack.top().unwrap(), &Const::I64(-5));
    }

    #[test]
    fn test_local_ops() {
        let mut vm = test_vm();
        vm.execute(Opcode::LoadI64, &[10]).unwrap();
        vm.execute(Opcode::LoadI64, &[20]).unwrap();

        vm.execute(Opcode::LoadLocal, &[0]).unwrap();
        assert_eq!(vm.stack.top().unwrap(), &Const::I64(10));

        // set.local 1 pops the copy into slot 1.
        vm.execute(Opcode::SetLocal, &[1]).unwrap();
        assert_eq!(vm.stack.get(1).unwrap(), &Const::I64(10));
        assert_eq!(vm.stack.len(), 2);
    }

    #[test]
    fn test_binary_ops() {
        let cases: Vec<(Const, Const, Opcode, Result<Const, RuntimeError>)> = vec![
            (
                Const::I32(5),
                Const::I32(7),
                Opcode::AddI64,
                Err(RuntimeError::ConstTypeInvalid {
                    expected: "i64",
                    found: ConstTag::I32,
                }),
            ),
            (Const::I64(5), Const::I64(7), Opcode::AddI64, Ok(Const::I64(12))),
            (Const::I64(5), Const::I64(7), Opcode::SubI64, Ok(Const::I64(-2))),
            (Const::I64(5), Const::I64(7), Opcode::MulI64, Ok(Const::I64(35))),
            (Const::I64(35), Const::I64(7), Opcode::DivI64, Ok(Const::I64(5))),
            (
                Const::I64(35),
                Const::I64(0),
                Opcode::DivI64,
                Err(RuntimeError::DivideByZero),
            ),
            (Const::I64(37), Const::I64(7), Opcode::ModI64, Ok(Const::I64(2))),
            (
                Const::I64(37),
                Const::I64(0),
                Opcode::ModI64,
                Err(RuntimeError::DivideByZero),
            ),
            (
                Const::I64(i64::MAX),
                Const::I64(1),
                Opcode::AddI64,
                Ok(Const::I64(i64::MIN)),
            ),
            (Const::U64(5), Const::U64(7), Opcode::AddU64, Ok(Const::U64(12))),
            (
                Const::U64(5),
                Const::U64(7),
                Opcode::SubU64,
                Ok(Const::U64(5u64.wrapping_sub(7))),
            ),
            (Const::U64(35), Const::U64(7), Opcode::DivU64, Ok(Const::U64(5))),
            (
                Const::F64(1.0),
                Const::F64(0.0),
                Opcode::DivF64,
                Err(RuntimeError::DivideByZero),
            ),
            (Const::F64(7.0), Const::F64(2.0), Opcode::DivF64, Ok(Const::F64(3.5))),
            (Const::True, Const::False, Opcode::And, Ok(Const::False)),
            (Const::True, Const::False, Opcode::Or, Ok(Const::True)),
            (Const::I64(0b1100), Const::I64(0b1010), Opcode::MaskAnd, Ok(Const::I64(0b1000))),
            (Const::I64(0b1100), Const::I64(0b1010), Opcode::MaskOr, Ok(Const::I64(0b1110))),
            (Const::I64(0b1100), Const::I64(0b1010), Opcode::MaskXor, Ok(Const::I64(0b0110))),
            (Const::I64(1), Const::I64(4), Opcode::ShiftLeft, Ok(Const::I64(16))),
            (Const::I64(-16), Const::I64(2), Opcode::ShiftRight, Ok(Const::I64(-4))),
        ];

        for (left, right, code, expected) in cases {
            let mut vm = test_vm();
            vm.stack.push(left.clone()).unwrap();
            vm.stack.push(right.clone()).unwrap();

            let result = vm.execute(code, &[]);
            match expected {
                Ok(value) => {
                    result.unwrap_or_else(|err| panic!("{} on {} {}: {}", code, left, right, err));
                    assert_eq!(vm.stack.pop().unwrap(), value, "{} result", code);
                }
                Err(err) => {
                    assert_eq!(result.unwrap_err(), err, "{} error", code);
                }
            }
        }
    }

    #[test]
    fn test_mask_not() {
        let mut vm = test_vm();
        vm.stack.push(Const::I64(0)).unwrap();
        vm.execute(Opcode::MaskNot, &[]).unwrap();
        assert_eq!(vm.stack.pop().unwrap(), Const::I64(-1));
    }

    #[test]
    fn test_pop_and_swap() {
        let mut vm = test_vm();
        vm.stack.push(Const::I64(1)).unwrap();
        vm.stack.push(Const::I64(2)).unwrap();

        vm.execute(Opcode::Swap, &[]).unwrap();
        assert_eq!(vm.stack.pop().unwrap(), Const::I64(1));
        assert_eq!(vm.stack.pop().unwrap(), Const::I64(2));

        vm.stack.push(Const::I64(3)).unwrap();
        vm.execute(Opcode::Pop, &[]).unwrap();
        assert!(vm.stack.is_empty());
    }

    #[test]
    fn test_call_checks() {
        // Calling a non-function.
        let mut vm = test_vm();
        vm.stack.push(Const::I64(0)).unwrap();
        assert!(matches!(
            vm.execute(Opcode::Call, &[0]).unwrap_err(),
            RuntimeError::ConstTypeInvalid { expected: "fn", .. }
        ));

        // Arity mismatch.
        let mut vm = test_vm();
        vm.stack.push(add_fn()).unwrap();
        assert_eq!(
            vm.execute(Opcode::Call, &[0]).unwrap_err(),
            RuntimeError::IncorrectArgCount {
                expected: 2,
                found: 0,
            }
        );

        // A well-formed call pushes a frame named after the callee.
        let mut vm = test_vm();
        vm.stack.push(Const::I64(5)).unwrap();
        vm.stack.push(Const::I64(10)).unwrap();
        vm.stack.push(add_fn()).unwrap();
        vm.execute(Opcode::Call, &[2]).unwrap();
        assert_eq!(vm.frames.top().unwrap().to_string(), "add");
        assert_eq!(vm.frames.top().unwrap().bp, 0);
    }

    #[test]
    fn test_builtin_call_runs_synchronously() {
        let mut builtins = Builtins::new();
        let double = kiln_core::BuiltinFn::new(
            "double",
            1,
            Some(ConstTag::I64),
            Arc::new(|args: &[Const]| {
                let n = crate::value::get_i64(&args[0])?;
                Ok(Some(Const::I64(n * 2)))
            }),
        );
        builtins.register("double", Const::Fn(double.into()));

        let mut vm = Vm::new(builtins, Arc::new(Process::detached()));
        let module = Arc::new(Module::new("main", Version::new(0, 0, 1)));
        vm.frames
            .push(Frame::new(
                CompiledFn::new("main", 0, Instructions::new()).into(),
                module,
                0,
            ))
            .unwrap();

        vm.stack.push(Const::I64(21)).unwrap();
        vm.execute(Opcode::LoadBuiltin, &[0]).unwrap();
        vm.execute(Opcode::Call, &[1]).unwrap();

        // The builtin already pushed its result; its frame unwinds through
        // the synthesized return.value on the next dispatch round.
        assert_eq!(vm.frames.top().unwrap().to_string(), "double");
        let (code, _) = vm.frames.top_mut().unwrap().fetch().unwrap();
        assert_eq!(code, Opcode::ReturnValue);
        vm.execute(code, &[]).unwrap();

        assert_eq!(vm.stack.pop().unwrap(), Const::I64(42));
        assert!(vm.stack.is_empty());
    }

    #[test]
    fn test_jumps() {
        // jmp forward over one instruction.
        let mut code = Instructions::new();
        code.push_op(Opcode::Jmp, &[9]); // skip the load.i64 (9 bytes)
        code.push_op(Opcode::LoadI64, &[1]);
        code.push_op(Opcode::Halt, &[]);

        let mut vm = test_vm();
        vm.frames.pop().unwrap();
        let module = Arc::new(Module::new("main", Version::new(0, 0, 1)));
        vm.frames
            .push(Frame::new(
                CompiledFn::new("main", 0, code).into(),
                module,
                0,
            ))
            .unwrap();
        vm.run();

        assert!(vm.halted());
        assert!(!vm.paniced());
        assert!(vm.stack.is_empty());
    }

    #[test]
    fn test_conditional_jump_predicates() {
        let cases: Vec<(Opcode, Const, bool)> = vec![
            (Opcode::Jmpz, Const::I64(0), true),
            (Opcode::Jmpz, Const::False, true),
            (Opcode::Jmpz, Const::I64(3), false),
            (Opcode::Jmpt, Const::True, true),
            (Opcode::Jmpt, Const::U32(0), false),
            (Opcode::Jmpn, Const::I64(-1), true),
            (Opcode::Jmpn, Const::U64(5), false),
            (Opcode::Jmpp, Const::I64(5), true),
            (Opcode::Jmpp, Const::F64(-0.5), false),
        ];

        for (code, operand, taken) in cases {
            let mut vm = test_vm();
            vm.stack.push(operand.clone()).unwrap();
            vm.execute(code, &[8]).unwrap();
            let ip = vm.frames.top().unwrap().ip;
            assert_eq!(ip, if taken { 8 } else { 0 }, "{} on {}", code, operand);
            assert!(vm.stack.is_empty(), "{} must pop its operand", code);
        }
    }

    #[test]
    fn test_trap_without_panic_builtin_aborts() {
        let mut vm = test_vm();
        vm.trap("boom".into());
        assert!(vm.halted());
        assert!(vm.paniced());
        assert_eq!(vm.panic_message(), Some("boom"));
    }

    #[test]
    fn test_trap_through_panic_builtin() {
        let mut builtins = Builtins::new();
        builtins.register("panic", crate::builtins::panic_fn());

        let mut vm = Vm::new(builtins, Arc::new(Process::detached()));
        let module = Arc::new(Module::new("main", Version::new(0, 0, 1)));
        vm.frames
            .push(Frame::new(
                CompiledFn::new("main", 0, Instructions::new()).into(),
                module,
                0,
            ))
            .unwrap();

        vm.trap("invariant violated".into());
        // The panic frame is staged; the loop executes its trap body.
        vm.run();

        assert!(vm.halted());
        assert!(vm.paniced());
        assert_eq!(vm.panic_message(), Some("invariant violated"));
    }
}
