//! Stack-based bytecode execution engine for Kiln archives.
//!
//! The VM decodes instructions from compiled function constants, manages
//! call frames over a shared operand stack, dispatches arithmetic and
//! control flow, invokes host builtins synchronously and maintains
//! cooperative pause/halt/trap semantics.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │                        Vm                          │
//! ├────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌───────────────────────────┐  │
//! │  │ Stack<Frame> │   │ Stack<Const>              │  │
//! │  │ fn·mod·ip·bp │ → │ operands, args == locals  │  │
//! │  └──────────────┘   └───────────────────────────┘  │
//! │                                                    │
//! │  ┌──────────────┐   ┌───────────────────────────┐  │
//! │  │ Archive      │   │ Builtins                  │  │
//! │  │ + link cache │   │ (panic, syscall, ...)     │  │
//! │  └──────────────┘   └───────────────────────────┘  │
//! │                                                    │
//! │  ┌──────────────┐   ┌───────────────────────────┐  │
//! │  │ Heap         │   │ Process                   │  │
//! │  │ first-fit    │   │ (descriptor tables)       │  │
//! │  └──────────────┘   └───────────────────────────┘  │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! # State machine
//!
//! ```text
//! Running --halt--> Halted (terminal)
//! Running --yield--> Paused --run()--> Running
//! Running --return from last frame--> Done (terminal)
//! Running --trap--> Halted + Paniced (terminal)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use kiln_core::Archive;
//! use kiln_vm::Vm;
//!
//! let archive = Archive::from_bytes(&bytes)?;
//! let mut vm = Vm::with_defaults();
//! vm.init(archive)?;
//! vm.run();
//! assert!(vm.halted() && !vm.paniced());
//! ```

pub mod builtins;
pub mod config;
pub mod error;
pub mod executor;
pub mod frame;
pub mod heap;
pub mod ops;
pub mod process;
pub mod stack;
pub mod value;
pub mod vm;

pub use builtins::{Builtins, SYSCALL_READ, SYSCALL_WRITE};
pub use config::VmConfig;
pub use error::{RuntimeError, VmResult};
pub use frame::Frame;
pub use heap::{Heap, HeapBlock, HeapError, HeapHandle};
pub use process::{Process, FD_STDERR, FD_STDIN, FD_STDOUT};
pub use stack::{Stack, StackError};
pub use vm::Vm;
