mod common;
use common::*;

fn caller(name: &str, callee: &str, args: &[i64]) -> CodeObject {
    let mut asm = Assembler::new(name, &[]);
    asm.load_global(callee);
    for &a in args {
        asm.load_const(a);
    }
    asm.call(args.len() as u8, 0).emit(Opcode::ReturnValue);
    asm.finish().unwrap()
}

#[test]
fn call_global_function() {
    let p = program(vec![
        binary("mul2i", Opcode::BinaryMultiply),
        caller("main", "mul2i", &[6, 2]),
    ]);
    assert_eq!(run_int(&p, "main", &[]), 12);
}

#[test]
fn keyword_arguments_bind_by_name() {
    // return sub(b=1, a=5)
    let mut asm = Assembler::new("main", &[]);
    asm.load_global("sub");
    asm.load_const("b").load_const(1i64);
    asm.load_const("a").load_const(5i64);
    asm.call(0, 2).emit(Opcode::ReturnValue);
    let p = program(vec![binary("sub", Opcode::BinarySubtract), asm.finish().unwrap()]);
    assert_eq!(run_int(&p, "main", &[]), 4);
}

#[test]
fn mixed_positional_and_keyword() {
    // return sub(1, b=5)
    let mut asm = Assembler::new("main", &[]);
    asm.load_global("sub").load_const(1i64);
    asm.load_const("b").load_const(5i64);
    asm.call(1, 1).emit(Opcode::ReturnValue);
    let p = program(vec![binary("sub", Opcode::BinarySubtract), asm.finish().unwrap()]);
    assert_eq!(run_int(&p, "main", &[]), -4);
}

#[test]
fn callee_params_widen_over_all_call_sites() {
    // def half(x): return x / 2
    // def main(): return half(3) + half(2.5)
    let mut half = Assembler::new("half", &["x"]);
    half.load_fast("x").load_const(2i64).emit(Opcode::BinaryTrueDivide).emit(Opcode::ReturnValue);
    let mut main = Assembler::new("main", &[]);
    main.load_global("half").load_const(3i64).call(1, 0);
    main.load_global("half").load_const(2.5f64).call(1, 0);
    main.emit(Opcode::BinaryAdd).emit(Opcode::ReturnValue);
    let p = program(vec![half.finish().unwrap(), main.finish().unwrap()]);
    assert_eq!(run(&p, "main", &[]), Object::Float(2.75));
}

#[test]
fn recursion() {
    // def fact(n):
    //     if n <= 1: return 1
    //     return n * fact(n - 1)
    let mut asm = Assembler::new("fact", &["n"]);
    let recurse = asm.new_label();
    asm.load_fast("n").load_const(1i64).compare(CompareOp::Le);
    asm.jump(Opcode::PopJumpIfFalse, recurse);
    asm.load_const(1i64).emit(Opcode::ReturnValue);
    asm.bind(recurse);
    asm.load_fast("n");
    asm.load_global("fact").load_fast("n").load_const(1i64).emit(Opcode::BinarySubtract).call(1, 0);
    asm.emit(Opcode::BinaryMultiply).emit(Opcode::ReturnValue);
    let p = program(vec![asm.finish().unwrap()]);
    assert_eq!(run_int(&p, "fact", &[5]), 120);
}

#[test]
fn void_function_returns_none() {
    // def noop(x): return None
    // def main(): noop(1); return 7
    let mut noop = Assembler::new("noop", &["x"]);
    noop.load_const(Object::None).emit(Opcode::ReturnValue);
    let mut main = Assembler::new("main", &[]);
    main.load_global("noop").load_const(1i64).call(1, 0).emit(Opcode::PopTop);
    main.load_const(7i64).emit(Opcode::ReturnValue);
    let p = program(vec![noop.finish().unwrap(), main.finish().unwrap()]);
    assert_eq!(run_int(&p, "main", &[]), 7);
    assert_eq!(run(&p, "noop", &[Object::Int(3)]), Object::None);
}

#[test]
fn too_many_arguments_is_unsupported() {
    let p = program(vec![
        binary("mul2i", Opcode::BinaryMultiply),
        caller("main", "mul2i", &[1, 2, 3]),
    ]);
    let err = compile_error(&p, "main", &[]);
    assert!(matches!(err, CompileError::Unsupported { .. }), "{err:?}");
    assert!(err.to_string().contains("takes 2 argument(s)"), "{err}");
}

#[test]
fn undefined_global_is_unsupported() {
    let p = program(vec![caller("main", "missing", &[])]);
    let err = compile_error(&p, "main", &[]);
    assert!(err.to_string().contains("`missing` is not defined"), "{err}");
}

#[test]
fn native_global_has_no_type() {
    let mut b = ProgramBuilder::new();
    let m = b.module("test");
    b.global(m, "open", Object::Native("builtin_function_or_method".into()));
    b.function(m, caller("main", "open", &[]));
    let p = b.build();
    let err = compile_error(&p, "main", &[]);
    assert!(matches!(err, CompileError::Unsupported { .. }), "{err:?}");
}
