//! Whole-program compilation tests.

use kiln_compiler::ast::{op, ConstStmt, LinkStmt, Literal, Program};
use kiln_compiler::{compile, BuiltinIndex, CompileError, Resolver, ENTRY_KEY};
use kiln_core::{hash_name, Archive, Const, ConstTag, Function, Link, Module, Version};

fn fixture_resolver() -> Resolver {
    let mut io = Program::new("io");
    io.consts.push(ConstStmt::new(0, "u32", Literal::Int(0)));
    io.consts.push(ConstStmt::new(1, "bool", Literal::Bool(true)));

    let mut std = Program::new("std");
    std.consts.push(ConstStmt::new(0, "i64", Literal::Int(1)));

    let mut resolver = Resolver::default();
    resolver.insert("io".into(), io);
    resolver.insert("std".into(), std);
    resolver
}

fn fixture_program() -> Program {
    let mut program = Program::new("main");
    program.links.push(LinkStmt::new(0, "io"));
    program.links.push(LinkStmt::new(1, "std"));
    program.consts.push(ConstStmt::new(0, "i64", Literal::Int(0)));
    program.consts.push(ConstStmt::new(1, "u32", Literal::Int(0)));
    program
        .consts
        .push(ConstStmt::new(2, "str", Literal::Str("Hello".into())));
    program.consts.push(ConstStmt::function(
        "main",
        ENTRY_KEY,
        0,
        vec![
            op("load.const", &[2]),
            op("load.const", &[1]),
            op("load.const", &[0]),
            op("load.modconst", &[0, 1]),
            op("load.modconst", &[0, 0]),
            op("load.modconst", &[1, 0]),
            op("load.i32", &[256]),
            op("load.i64", &[256]),
            op("load.u32", &[256]),
            op("load.u64", &[256]),
            op("load.builtin", &[0]),
        ],
    ));
    program
}

fn fixture_builtins() -> BuiltinIndex {
    let mut builtins = BuiltinIndex::default();
    builtins.insert(0, 0);
    builtins
}

#[test]
fn test_compile_produces_linked_archive() {
    let archive = compile(
        Version::new(0, 0, 1),
        &fixture_program(),
        &fixture_resolver(),
        &fixture_builtins(),
    )
    .unwrap();

    // All three modules land in the archive under their name hashes.
    for name in ["main", "io", "std"] {
        assert!(
            archive.modules.has(hash_name(name)),
            "archive is missing module {}",
            name
        );
    }

    let main = archive.main_module().unwrap();
    assert_eq!(main.name, "main");
    assert_eq!(main.version, Version::new(0, 0, 1));

    // Links decode back to their module names. The decoded module has no
    // key index, so entries are read at their known offsets: "io" is a
    // 4-byte entry starting at 0, "std" follows it.
    let io_link: Link = main.links.get(0).unwrap();
    assert_eq!(io_link.name(), "io");
    let std_link: Link = main.links.get(4).unwrap();
    assert_eq!(std_link.name(), "std");

    // The entry constant is the compiled main function.
    let entry = archive.main_fn().unwrap();
    assert_eq!(entry.tag(), ConstTag::Fn);
    match entry {
        Const::Fn(Function::Compiled(func)) => {
            assert_eq!(func.name(), "main.main");
            assert_eq!(func.locals(), 0);
            assert!(!func.code().is_empty());
        }
        other => panic!("entry is not a compiled fn: {}", other),
    }
}

#[test]
fn test_compiled_archive_survives_serialization() {
    let archive = compile(
        Version::new(0, 0, 1),
        &fixture_program(),
        &fixture_resolver(),
        &fixture_builtins(),
    )
    .unwrap();

    let bytes = archive.to_bytes();
    assert!(!bytes.is_empty());

    let reloaded = Archive::from_bytes(&bytes).unwrap();
    assert_eq!(reloaded.entry(), archive.entry());
    assert_eq!(reloaded.modules.bytes(), archive.modules.bytes());

    // The reloaded main module matches field for field.
    let original = archive.main_module().unwrap();
    let decoded = reloaded.main_module().unwrap();
    assert_eq!(decoded.name, original.name);
    assert_eq!(decoded.version, original.version);
    assert_eq!(decoded.links.bytes(), original.links.bytes());
    assert_eq!(decoded.types.bytes(), original.types.bytes());
    assert_eq!(decoded.consts.bytes(), original.consts.bytes());
}

#[test]
fn test_shared_link_written_once() {
    // Both `a` and `main` link `std`; the archive must contain a single
    // copy under the hash key.
    let mut a = Program::new("a");
    a.links.push(LinkStmt::new(0, "std"));

    let mut resolver = fixture_resolver();
    resolver.insert("a".into(), a);

    let mut program = Program::new("main");
    program.links.push(LinkStmt::new(0, "a"));
    program.links.push(LinkStmt::new(1, "std"));
    program.consts.push(ConstStmt::function(
        "main",
        ENTRY_KEY,
        0,
        vec![op("halt", &[])],
    ));

    let archive = compile(
        Version::new(0, 0, 1),
        &program,
        &resolver,
        &BuiltinIndex::default(),
    )
    .unwrap();

    let std_offset = archive.modules.lookup(hash_name("std")).unwrap();
    let module: Module = archive.modules.get(std_offset).unwrap();
    assert_eq!(module.name, "std");
}

#[test]
fn test_undefined_builtin_fails() {
    let mut program = Program::new("main");
    program.consts.push(ConstStmt::function(
        "main",
        ENTRY_KEY,
        0,
        vec![op("load.builtin", &[7])],
    ));

    let err = compile(
        Version::new(0, 0, 1),
        &program,
        &Resolver::default(),
        &BuiltinIndex::default(),
    )
    .unwrap_err();
    assert_eq!(err, CompileError::UndefinedBuiltin(7));
}

#[test]
fn test_undefined_modconst_fails() {
    let mut program = Program::new("main");
    program.links.push(LinkStmt::new(0, "io"));
    program.consts.push(ConstStmt::function(
        "main",
        ENTRY_KEY,
        0,
        vec![op("load.modconst", &[0, 9])],
    ));

    let err = compile(
        Version::new(0, 0, 1),
        &program,
        &fixture_resolver(),
        &BuiltinIndex::default(),
    )
    .unwrap_err();
    assert_eq!(err, CompileError::UndefinedModConst { module: 0, index: 9 });
}
