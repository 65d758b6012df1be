#![allow(dead_code)]

use std::process::Command;

pub use monoc::bytecode::{Assembler, CompareOp, Opcode};
pub use monoc::diagnostics::CompileError;
pub use monoc::program::{CodeObject, FunctionId, Object, Program, ProgramBuilder};

pub fn monoc() -> Command {
    Command::new(env!("CARGO_BIN_EXE_monoc"))
}

/// A program whose functions all live in module `test`.
pub fn program(functions: Vec<CodeObject>) -> Program {
    let mut b = ProgramBuilder::new();
    let m = b.module("test");
    for code in functions {
        b.function(m, code);
    }
    b.build()
}

pub fn entry(program: &Program, name: &str) -> FunctionId {
    program
        .find_function(name)
        .unwrap_or_else(|| panic!("no function `{name}` in program"))
}

pub fn run(program: &Program, name: &str, args: &[Object]) -> Object {
    let id = entry(program, name);
    monoc::compile_and_run(program, id, args)
        .unwrap_or_else(|e| panic!("{}", monoc::diagnostics::render_error(&e)))
}

pub fn run_int(program: &Program, name: &str, args: &[i64]) -> i64 {
    let args: Vec<Object> = args.iter().map(|&a| Object::Int(a)).collect();
    match run(program, name, &args) {
        Object::Int(v) => v,
        other => panic!("expected an int result, got {other:?}"),
    }
}

pub fn compile_error(program: &Program, name: &str, args: &[Object]) -> CompileError {
    let id = entry(program, name);
    match monoc::compile(program, id, args, &Default::default()) {
        Ok(compiled) => panic!("compile should have failed, got:\n{}", compiled.module),
        Err(err) => err,
    }
}

/// `def name(a, b): return a <op> b`
pub fn binary(name: &str, op: Opcode) -> CodeObject {
    let mut asm = Assembler::new(name, &["a", "b"]);
    asm.load_fast("a").load_fast("b").emit(op).emit(Opcode::ReturnValue);
    asm.finish().unwrap()
}

/// `def name(a, b): return a <cmp> b`
pub fn comparison(name: &str, op: CompareOp) -> CodeObject {
    let mut asm = Assembler::new(name, &["a", "b"]);
    asm.load_fast("a").load_fast("b").compare(op).emit(Opcode::ReturnValue);
    asm.finish().unwrap()
}

/// `x += step` for a local `x`.
pub fn increment(asm: &mut Assembler, local: &str, step: i64) {
    asm.load_fast(local).load_const(step).emit(Opcode::InplaceAdd).store_fast(local);
}
