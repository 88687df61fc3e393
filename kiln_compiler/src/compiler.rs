//! AST → module archive compilation.
//!
//! The compiler walks a [`Program`] in statement order: links first (each
//! one recursively compiled through the resolver), then types, then
//! constants. Function bodies are compiled in two passes (emission with a
//! jump list, then label patching) and every pool-index operand is
//! rewritten to its byte offset so the executor never pays an index hop.

use crate::ast::{ConstStmt, Literal, OpStmt, Program};
use kiln_core::bytecode::JUMP_WIDTH;
use kiln_core::{
    encode_op, hash_name, Archive, CompiledFn, Const, ConstTag, Instructions, Link, Module,
    Opcode, PoolError, TypeDesc, Version,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;

/// Maps module names to their parsed programs for link resolution.
pub type Resolver = FxHashMap<String, Program>;

/// Maps IR-level builtin indices to the ids registered with the VM.
pub type BuiltinIndex = FxHashMap<u64, u16>;

/// Pool keys at or above this value are reserved for the toolchain.
pub const RESERVED_KEY_BASE: u64 = 0xFFFF_FF00;

/// Reserved consts-pool key of the entry function.
pub const ENTRY_KEY: u64 = RESERVED_KEY_BASE;

// =============================================================================
// Errors
// =============================================================================

/// Compilation failure. The archive under construction is discarded.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// A link names a module the resolver does not know.
    UnresolvedLink(String),
    /// The link graph revisits a module already being compiled.
    CyclicLink(String),
    /// An op statement names an unknown mnemonic.
    UnknownOp(String),
    /// An op statement has the wrong number of operands.
    OperandCount {
        op: String,
        expected: usize,
        found: usize,
    },
    /// A const statement names an unknown type.
    UnknownConstType(String),
    /// A const literal does not fit its declared type.
    LiteralMismatch { ty: String, found: &'static str },
    /// `load.const` refers to a const index that was never declared.
    UndefinedConst(u64),
    /// `load.modconst`/`new.mod` refers to an unknown links-pool index.
    UndefinedMod(u64),
    /// `load.modconst` refers to a const missing from the linked module.
    UndefinedModConst { module: u64, index: u64 },
    /// `new` refers to a type index that was never declared.
    UndefinedType(u64),
    /// `new.mod` refers to a type missing from the linked module.
    UndefinedModType { module: u64, index: u64 },
    /// `load.builtin`/`new.builtin` refers to an unregistered builtin.
    UndefinedBuiltin(u64),
    /// A jump targets a label that was never declared in its block.
    UndefinedLabel(u64),
    /// The same label index was declared twice in one block.
    DuplicateLabel(u64),
    /// A patched displacement does not fit the signed 16-bit operand.
    JumpOutOfRange { label: u64, displacement: i64 },
    /// A statement uses a pool key from the reserved range.
    ReservedIndex(u64),
    /// The program declares no function constant at the entry key.
    MissingEntryFn,
    /// A pool write failed.
    Pool(PoolError),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UnresolvedLink(name) => {
                write!(f, "failed to write link: cannot resolve link module {}", name)
            }
            CompileError::CyclicLink(name) => {
                write!(f, "failed to write link: cyclic import of module {}", name)
            }
            CompileError::UnknownOp(name) => write!(f, "undefined op {}", name),
            CompileError::OperandCount { op, expected, found } => write!(
                f,
                "invalid number of operands for op {}: expected {} found {}",
                op, expected, found
            ),
            CompileError::UnknownConstType(name) => write!(f, "invalid const type {}", name),
            CompileError::LiteralMismatch { ty, found } => {
                write!(f, "const type {} cannot hold a {} literal", ty, found)
            }
            CompileError::UndefinedConst(index) => write!(f, "undefined const index {}", index),
            CompileError::UndefinedMod(index) => write!(f, "undefined mod index {}", index),
            CompileError::UndefinedModConst { module, index } => {
                write!(f, "undefined const index {} in mod {}", index, module)
            }
            CompileError::UndefinedType(index) => write!(f, "undefined type index {}", index),
            CompileError::UndefinedModType { module, index } => {
                write!(f, "undefined type index {} in mod {}", index, module)
            }
            CompileError::UndefinedBuiltin(index) => {
                write!(f, "undefined builtin index {}", index)
            }
            CompileError::UndefinedLabel(index) => write!(f, "undefined label index {}", index),
            CompileError::DuplicateLabel(index) => write!(f, "duplicate label index {}", index),
            CompileError::JumpOutOfRange { label, displacement } => write!(
                f,
                "jump to label {} needs displacement {} outside the signed 16-bit range",
                label, displacement
            ),
            CompileError::ReservedIndex(index) => {
                write!(f, "index {} is inside the reserved key space", index)
            }
            CompileError::MissingEntryFn => {
                write!(f, "program declares no entry function constant")
            }
            CompileError::Pool(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Pool(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PoolError> for CompileError {
    fn from(err: PoolError) -> Self {
        CompileError::Pool(err)
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

// =============================================================================
// Compiler
// =============================================================================

/// A pending forward jump awaiting its label offset.
struct PendingJump {
    code: Opcode,
    label: u64,
    offset: usize,
}

/// Compiles programs into archives.
///
/// The compiler itself is stateless between runs; per-module state lives on
/// the call stack so link compilation can recurse through the resolver.
pub struct Compiler<'a> {
    version: Version,
    resolver: &'a Resolver,
    builtins: &'a BuiltinIndex,
}

impl<'a> Compiler<'a> {
    pub fn new(version: Version, resolver: &'a Resolver, builtins: &'a BuiltinIndex) -> Self {
        Compiler {
            version,
            resolver,
            builtins,
        }
    }

    /// Compile `program` and everything it links into an archive.
    ///
    /// The entry pointer is set to the program's function constant at
    /// [`ENTRY_KEY`]. Errors leave no observable state: the partially
    /// written archive is dropped with the error.
    pub fn compile(&self, program: &Program) -> CompileResult<Archive> {
        let mut archive = Archive::new();
        let mut active = FxHashSet::default();

        let module = self.compile_module(program, &mut archive, &mut active)?;

        let entry_const = module.consts.lookup(ENTRY_KEY).ok_or(CompileError::MissingEntryFn)?;
        let entry_mod = archive.modules.set(hash_name(&module.name), &module)?;
        archive.set_entry(entry_mod, entry_const);
        Ok(archive)
    }

    /// Compile one module, recursing into its links.
    ///
    /// `active` holds the names currently on the compilation stack; seeing
    /// one again means the link graph has a cycle.
    fn compile_module(
        &self,
        program: &Program,
        archive: &mut Archive,
        active: &mut FxHashSet<String>,
    ) -> CompileResult<Module> {
        if !active.insert(program.module.clone()) {
            return Err(CompileError::CyclicLink(program.module.clone()));
        }

        let mut module = Module::new(&program.module, self.version);
        let mut links: FxHashMap<u64, Module> = FxHashMap::default();

        for stmt in &program.links {
            if stmt.index >= RESERVED_KEY_BASE {
                return Err(CompileError::ReservedIndex(stmt.index));
            }
            let dep_program = self
                .resolver
                .get(&stmt.module)
                .ok_or_else(|| CompileError::UnresolvedLink(stmt.module.clone()))?;

            let dep = self.compile_module(dep_program, archive, active)?;

            module.links.set(stmt.index, &Link::new(&stmt.module))?;

            let hash = hash_name(&stmt.module);
            // A diamond in the link graph may have written it already.
            if !archive.modules.has(hash) {
                archive.modules.set(hash, &dep)?;
            }
            links.insert(hash, dep);
        }

        for stmt in &program.types {
            if stmt.index >= RESERVED_KEY_BASE {
                return Err(CompileError::ReservedIndex(stmt.index));
            }
            // TODO: serialize field layouts once the type grammar settles.
            let desc = TypeDesc::new();
            module.types.set(stmt.index, &desc)?;
        }

        for stmt in &program.consts {
            if stmt.index >= RESERVED_KEY_BASE
                && !(stmt.index == ENTRY_KEY && stmt.ty == "fn")
            {
                return Err(CompileError::ReservedIndex(stmt.index));
            }
            let constant = self.materialize(stmt, &module, &links, archive)?;
            module.consts.set(stmt.index, &constant)?;
        }

        active.remove(&program.module);
        Ok(module)
    }

    /// Turn a const statement into its typed constant value.
    fn materialize(
        &self,
        stmt: &ConstStmt,
        module: &Module,
        links: &FxHashMap<u64, Module>,
        archive: &Archive,
    ) -> CompileResult<Const> {
        let tag = ConstTag::from_name(&stmt.ty)
            .ok_or_else(|| CompileError::UnknownConstType(stmt.ty.clone()))?;

        let mismatch = || CompileError::LiteralMismatch {
            ty: stmt.ty.clone(),
            found: stmt.literal.kind(),
        };

        match (tag, &stmt.literal) {
            (ConstTag::Str, Literal::Str(text)) => Ok(Const::Str(text.clone())),
            (ConstTag::True, Literal::Bool(value)) => Ok(Const::bool(*value)),
            (ConstTag::U8, Literal::Int(value)) => Ok(Const::U8(*value as u8)),
            (ConstTag::U16, Literal::Int(value)) => Ok(Const::U16(*value as u16)),
            (ConstTag::U32, Literal::Int(value)) => Ok(Const::U32(*value as u32)),
            (ConstTag::U64, Literal::Int(value)) => Ok(Const::U64(*value as u64)),
            (ConstTag::I8, Literal::Int(value)) => Ok(Const::I8(*value as i8)),
            (ConstTag::I16, Literal::Int(value)) => Ok(Const::I16(*value as i16)),
            (ConstTag::I32, Literal::Int(value)) => Ok(Const::I32(*value as i32)),
            (ConstTag::I64, Literal::Int(value)) => Ok(Const::I64(*value)),
            (ConstTag::F32, Literal::Float(value)) => Ok(Const::F32(*value as f32)),
            (ConstTag::F64, Literal::Float(value)) => Ok(Const::F64(*value)),
            (ConstTag::Ref, Literal::Int(value)) => Ok(Const::Ref(*value as u32)),
            (ConstTag::Data, Literal::Data(items)) => {
                let mut data = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Literal::Int(byte) if (0..=255).contains(byte) => {
                            data.push(*byte as u8);
                        }
                        _ => return Err(mismatch()),
                    }
                }
                Ok(Const::Data(data))
            }
            (ConstTag::Fn, Literal::Fn(ops)) => {
                let code = self.compile_block(ops, module, links, archive)?;
                let name = match &stmt.name {
                    Some(name) => format!("{}.{}", module.name, name),
                    None => format!("{}.anonymous", module.name),
                };
                Ok(Const::Fn(CompiledFn::new(name, stmt.locals, code).into()))
            }
            _ => Err(mismatch()),
        }
    }

    /// Compile a flat list of op statements into an instruction stream.
    ///
    /// Pass one emits instructions in order, rewriting pool-index operands
    /// to offsets and recording jumps; declaring a label records its offset
    /// and inlines its (recursively compiled) body. Pass two patches every
    /// pending jump with a displacement relative to the end of the jump
    /// instruction. Jumps resolve against labels of their own block level.
    pub fn compile_block(
        &self,
        ops: &[OpStmt],
        module: &Module,
        links: &FxHashMap<u64, Module>,
        archive: &Archive,
    ) -> CompileResult<Instructions> {
        let mut set = Instructions::new();
        let mut blocks: FxHashMap<u64, usize> = FxHashMap::default();
        let mut jumps: Vec<PendingJump> = Vec::new();

        for stmt in ops {
            match stmt {
                OpStmt::Op(op) => {
                    let code = Opcode::from_name(&op.name)
                        .ok_or_else(|| CompileError::UnknownOp(op.name.clone()))?;
                    let widths = code.info().widths;
                    if op.operands.len() != widths.len() {
                        return Err(CompileError::OperandCount {
                            op: op.name.clone(),
                            expected: widths.len(),
                            found: op.operands.len(),
                        });
                    }

                    let mut operands: Vec<u64> =
                        op.operands.iter().map(|value| *value as u64).collect();

                    match code {
                        Opcode::LoadConst => {
                            operands[0] = module
                                .consts
                                .lookup(operands[0])
                                .ok_or(CompileError::UndefinedConst(operands[0]))?
                                as u64;
                        }
                        Opcode::LoadModConst => {
                            let (mod_offset, const_offset) = self.resolve_mod_const(
                                operands[0], operands[1], module, links, archive,
                            )?;
                            operands[0] = mod_offset;
                            operands[1] = const_offset;
                        }
                        Opcode::LoadBuiltin | Opcode::NewBuiltin => {
                            operands[0] = *self
                                .builtins
                                .get(&operands[0])
                                .ok_or(CompileError::UndefinedBuiltin(operands[0]))?
                                as u64;
                        }
                        Opcode::New => {
                            operands[0] = module
                                .types
                                .lookup(operands[0])
                                .ok_or(CompileError::UndefinedType(operands[0]))?
                                as u64;
                        }
                        Opcode::NewMod => {
                            let (hash, dep) = resolve_link(operands[0], module, links)?;
                            let type_offset = dep.types.lookup(operands[1]).ok_or(
                                CompileError::UndefinedModType {
                                    module: operands[0],
                                    index: operands[1],
                                },
                            )?;
                            let mod_offset = archive
                                .modules
                                .lookup(hash)
                                .ok_or(CompileError::UndefinedMod(operands[0]))?;
                            operands[0] = mod_offset as u64;
                            operands[1] = type_offset as u64;
                        }
                        code if code.is_jump() => {
                            jumps.push(PendingJump {
                                code,
                                label: operands[0],
                                offset: set.len(),
                            });
                        }
                        _ => {}
                    }

                    set.extend(&encode_op(code, &operands));
                }
                OpStmt::Label(decl) => {
                    let block = self.compile_block(&decl.ops, module, links, archive)?;
                    if blocks.insert(decl.index, set.len()).is_some() {
                        return Err(CompileError::DuplicateLabel(decl.index));
                    }
                    set.extend(&block);
                }
            }
        }

        for jump in jumps {
            let target = *blocks
                .get(&jump.label)
                .ok_or(CompileError::UndefinedLabel(jump.label))?;

            let displacement = target as i64 - (jump.offset + JUMP_WIDTH) as i64;
            if displacement < i16::MIN as i64 || displacement > i16::MAX as i64 {
                return Err(CompileError::JumpOutOfRange {
                    label: jump.label,
                    displacement,
                });
            }

            let patched = encode_op(jump.code, &[displacement as i16 as u16 as u64]);
            set.0[jump.offset..jump.offset + JUMP_WIDTH].copy_from_slice(&patched);
        }

        Ok(set)
    }

    /// Resolve a `(link index, const index)` pair to archive offsets.
    fn resolve_mod_const(
        &self,
        mod_index: u64,
        const_index: u64,
        module: &Module,
        links: &FxHashMap<u64, Module>,
        archive: &Archive,
    ) -> CompileResult<(u64, u64)> {
        let (hash, dep) = resolve_link(mod_index, module, links)?;

        let const_offset =
            dep.consts
                .lookup(const_index)
                .ok_or(CompileError::UndefinedModConst {
                    module: mod_index,
                    index: const_index,
                })?;
        let mod_offset = archive
            .modules
            .lookup(hash)
            .ok_or(CompileError::UndefinedMod(mod_index))?;

        Ok((mod_offset as u64, const_offset as u64))
    }
}

/// Follow a links-pool index to its compiled module.
fn resolve_link<'m>(
    mod_index: u64,
    module: &Module,
    links: &'m FxHashMap<u64, Module>,
) -> CompileResult<(u64, &'m Module)> {
    let link_offset = module
        .links
        .lookup(mod_index)
        .ok_or(CompileError::UndefinedMod(mod_index))?;
    let link: Link = module
        .links
        .get(link_offset)
        .map_err(|_| CompileError::UndefinedMod(mod_index))?;

    let hash = hash_name(link.name());
    let dep = links
        .get(&hash)
        .ok_or(CompileError::UndefinedMod(mod_index))?;
    Ok((hash, dep))
}

/// Convenience wrapper compiling a program with empty pools of context.
pub fn compile(
    version: Version,
    program: &Program,
    resolver: &Resolver,
    builtins: &BuiltinIndex,
) -> CompileResult<Archive> {
    Compiler::new(version, resolver, builtins).compile(program)
}
