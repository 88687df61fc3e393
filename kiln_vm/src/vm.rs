//! The virtual machine: owned state and the host-facing API.

use crate::builtins::Builtins;
use crate::config::VmConfig;
use crate::error::{RuntimeError, VmResult};
use crate::frame::Frame;
use crate::heap::Heap;
use crate::process::Process;
use crate::stack::Stack;
use crate::value::get_fn;
use kiln_core::{Archive, Const, Module};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A single-threaded, cooperatively scheduled bytecode machine.
///
/// Lifecycle: construct with a builtin table, [`init`](Vm::init) with an
/// archive, then call [`run`](Vm::run) zero or more times. Between runs
/// the host may inspect [`halted`](Vm::halted), [`paniced`](Vm::paniced)
/// and [`panic_message`](Vm::panic_message); it can never observe a
/// runtime error directly: every dispatch failure becomes a trap.
pub struct Vm {
    pub(crate) archive: Archive,
    pub(crate) builtins: Builtins,
    pub(crate) process: Arc<Process>,
    pub(crate) heap: Heap,
    /// Operand stack.
    pub(crate) stack: Stack<Const>,
    /// Call frames; the top frame drives the fetch loop.
    pub(crate) frames: Stack<Frame>,
    /// Module decode cache keyed by archive offset. Append-only.
    pub(crate) links: FxHashMap<u32, Arc<Module>>,
    pub(crate) paused: bool,
    pub(crate) done: bool,
    pub(crate) halted: bool,
    pub(crate) paniced: bool,
    pub(crate) panic_message: Option<String>,
}

impl Vm {
    /// A VM with default capacities.
    pub fn new(builtins: Builtins, process: Arc<Process>) -> Vm {
        Vm::with_config(builtins, process, VmConfig::default())
    }

    /// A VM with explicit capacities.
    pub fn with_config(builtins: Builtins, process: Arc<Process>, config: VmConfig) -> Vm {
        Vm {
            archive: Archive::new(),
            builtins,
            process,
            heap: Heap::new(config.heap_capacity),
            stack: Stack::new(config.stack_capacity),
            frames: Stack::new(config.frame_capacity),
            links: FxHashMap::default(),
            paused: false,
            done: false,
            halted: false,
            paniced: false,
            panic_message: None,
        }
    }

    /// A VM wired to the host's standard streams with the default
    /// builtin set.
    pub fn with_defaults() -> Vm {
        let process = Process::stdio();
        let builtins = Builtins::defaults(process.clone());
        Vm::new(builtins, process)
    }

    /// Load an archive and push the entry frame.
    ///
    /// Fails to the caller, not as a trap, when the archive has no
    /// decodable main module or its entry constant is not a function.
    pub fn init(&mut self, archive: Archive) -> VmResult<()> {
        self.archive = archive;

        let main = Arc::new(self.archive.main_module()?);
        let entry = self.archive.main_fn()?;
        let function = get_fn(&entry)?;

        // Seed the decode cache so self-references hit the same module.
        let (entry_mod, _) = self.archive.entry();
        self.links.insert(entry_mod, main.clone());

        self.frames.push(Frame::new(function, main, 0))?;
        Ok(())
    }

    /// Decode a module at an archive offset through the append-only cache.
    pub(crate) fn load_link(&mut self, offset: u32) -> VmResult<Arc<Module>> {
        if let Some(module) = self.links.get(&offset) {
            return Ok(module.clone());
        }

        let module: Module = self
            .archive
            .modules
            .get(offset)
            .map_err(|source| RuntimeError::LinkLoadFailed { offset, source })?;
        let module = Arc::new(module);
        self.links.insert(offset, module.clone());
        Ok(module)
    }

    // =========================================================================
    // Host-observable state
    // =========================================================================

    #[inline]
    pub fn halted(&self) -> bool {
        self.halted
    }

    #[inline]
    pub fn paniced(&self) -> bool {
        self.paniced
    }

    pub fn panic_message(&self) -> Option<&str> {
        self.panic_message.as_deref()
    }

    /// Whether the last frame returned.
    #[inline]
    pub fn done(&self) -> bool {
        self.done
    }

    /// Whether the VM is suspended at a `yield`.
    #[inline]
    pub fn paused(&self) -> bool {
        self.paused
    }

    /// The operand stack, for host inspection after a run.
    #[inline]
    pub fn stack(&self) -> &Stack<Const> {
        &self.stack
    }

    #[inline]
    pub fn process(&self) -> &Arc<Process> {
        &self.process
    }

    #[inline]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    #[inline]
    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }
}
