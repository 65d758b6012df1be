mod common;
use common::*;

use monoc::config::CompileOptions;
use monoc::infer::Kind;
use monoc::session::Session;

fn report(p: &Program, name: &str, args: &[Object]) -> monoc::infer::TypeReport {
    let mut session = Session::new(p, CompileOptions::default());
    session.add_entry_point(entry(p, name), args).unwrap();
    session.infer().unwrap();
    session.type_report().unwrap()
}

#[test]
fn integer_arithmetic_infers_int_everywhere() {
    let p = program(vec![
        binary("add", Opcode::BinaryAdd),
        binary("mod", Opcode::BinaryModulo),
        binary("fdiv", Opcode::BinaryFloorDivide),
    ]);
    for name in ["add", "mod", "fdiv"] {
        let types = report(&p, name, &[Object::Int(1), Object::Int(2)]);
        let f = types.function(name).unwrap();
        assert_eq!(f.returns, "int", "{name}");
        assert!(f.params.iter().all(|(_, t)| t == "int"), "{name}: {:?}", f.params);
    }
}

#[test]
fn true_division_infers_float() {
    let p = program(vec![binary("div", Opcode::BinaryTrueDivide)]);
    let types = report(&p, "div", &[Object::Int(1), Object::Int(2)]);
    assert_eq!(types.to_string(), "def div(a: int, b: int) -> float\n");
}

#[test]
fn locals_are_reported() {
    let mut asm = Assembler::new("scale", &["x"]);
    asm.load_fast("x").load_const(2.0f64).emit(Opcode::BinaryMultiply).store_fast("y");
    asm.load_fast("y").emit(Opcode::ReturnValue);
    let p = program(vec![asm.finish().unwrap()]);
    let types = report(&p, "scale", &[Object::Int(3)]);
    assert_eq!(types.to_string(), "def scale(x: int) -> float\n    y: float\n");
}

#[test]
fn report_covers_every_reachable_function() {
    let mut main = Assembler::new("main", &[]);
    main.load_global("add").load_const(1i64).load_const(true).call(2, 0).emit(Opcode::ReturnValue);
    let p = program(vec![binary("add", Opcode::BinaryAdd), main.finish().unwrap()]);
    let types = report(&p, "main", &[]);
    let names: Vec<&str> = types.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["main", "add"]);
    let add = types.function("add").unwrap();
    assert_eq!(add.params, vec![("a".to_string(), "int".to_string()), ("b".to_string(), "bool".to_string())]);
    assert_eq!(add.returns, "int");
}

#[test]
fn loop_carried_local_resolves() {
    // n = 0
    // while n < 10: n = n + 1
    // return n
    let mut asm = Assembler::new("count", &[]);
    let head = asm.new_label();
    let pop = asm.new_label();
    let exit = asm.new_label();
    asm.load_const(0i64).store_fast("n");
    asm.jump(Opcode::SetupLoop, exit);
    asm.bind(head);
    asm.load_fast("n").load_const(10i64).compare(CompareOp::Lt);
    asm.jump(Opcode::PopJumpIfFalse, pop);
    asm.load_fast("n").load_const(1i64).emit(Opcode::BinaryAdd).store_fast("n");
    asm.jump(Opcode::JumpAbsolute, head);
    asm.bind(pop);
    asm.emit(Opcode::PopBlock);
    asm.bind(exit);
    asm.load_fast("n").emit(Opcode::ReturnValue);
    let p = program(vec![asm.finish().unwrap()]);

    let mut session = Session::new(&p, CompileOptions::default());
    session.add_entry_point(entry(&p, "count"), &[]).unwrap();
    let stats = session.infer().unwrap();
    assert!(stats.relaxed >= 1);
    let graph = session.registry().graph();
    let n = session.scans()[0].locals[0].unwrap();
    assert_eq!(graph.resolved_kind(n), Some(Kind::Integer));
    assert_eq!(run_int(&p, "count", &[]), 10);
}

#[test]
fn string_and_int_in_one_local_is_ambiguous() {
    // if flag: v = "text"
    // else: v = 3
    // return v
    let mut asm = Assembler::new("pick", &["flag"]);
    let other = asm.new_label();
    let done = asm.new_label();
    asm.load_fast("flag").jump(Opcode::PopJumpIfFalse, other);
    asm.load_const("text").store_fast("v");
    asm.jump(Opcode::JumpForward, done);
    asm.bind(other);
    asm.load_const(3i64).store_fast("v");
    asm.bind(done);
    asm.load_fast("v").emit(Opcode::ReturnValue);
    let p = program(vec![asm.finish().unwrap()]);

    let err = compile_error(&p, "pick", &[Object::Bool(true)]);
    let CompileError::AmbiguousType { trail, .. } = &err else {
        panic!("expected an ambiguous type, got {err:?}");
    };
    assert_eq!(trail.len(), 2);
    let rendered = monoc::diagnostics::render_error(&err);
    assert!(rendered.contains("error[ambiguous-type]"), "{rendered}");
}

#[test]
fn instances_of_different_classes_are_ambiguous() {
    let mut b = ProgramBuilder::new();
    let m = b.module("test");
    b.class(m, "A");
    b.class(m, "B");
    let mut asm = Assembler::new("pick", &["flag"]);
    let other = asm.new_label();
    let done = asm.new_label();
    asm.load_fast("flag").jump(Opcode::PopJumpIfFalse, other);
    asm.load_global("A").call(0, 0).store_fast("v");
    asm.jump(Opcode::JumpForward, done);
    asm.bind(other);
    asm.load_global("B").call(0, 0).store_fast("v");
    asm.bind(done);
    asm.load_const(Object::None).emit(Opcode::ReturnValue);
    b.function(m, asm.finish().unwrap());
    let p = b.build();

    let err = compile_error(&p, "pick", &[Object::Bool(false)]);
    assert!(matches!(err, CompileError::AmbiguousType { .. }), "{err:?}");
}

#[test]
fn instance_and_string_passed_to_one_parameter_are_ambiguous() {
    // def consume(v): return None
    // def main():
    //     consume(A())
    //     consume("s")
    //     return None
    let mut b = ProgramBuilder::new();
    let m = b.module("test");
    b.class(m, "A");
    let mut consume = Assembler::new("consume", &["v"]);
    consume.load_const(Object::None).emit(Opcode::ReturnValue);
    b.function(m, consume.finish().unwrap());
    let mut main = Assembler::new("main", &[]);
    main.load_global("consume").load_global("A").call(0, 0).call(1, 0).emit(Opcode::PopTop);
    main.load_global("consume").load_const("s").call(1, 0).emit(Opcode::PopTop);
    main.load_const(Object::None).emit(Opcode::ReturnValue);
    b.function(m, main.finish().unwrap());
    let p = b.build();

    let err = compile_error(&p, "main", &[]);
    let CompileError::AmbiguousType { trail, .. } = &err else {
        panic!("expected an ambiguous type, got {err:?}");
    };
    assert_eq!(trail.len(), 2);
}

#[test]
fn local_read_before_any_store_cannot_be_inferred() {
    let mut asm = Assembler::new("ghost", &[]);
    asm.load_fast("never").emit(Opcode::ReturnValue);
    let p = program(vec![asm.finish().unwrap()]);
    let err = compile_error(&p, "ghost", &[]);
    assert!(matches!(err, CompileError::Unsupported { .. }), "{err:?}");
    assert!(err.to_string().contains("cannot infer"), "{err}");
}

#[test]
fn string_return_has_no_compiled_representation() {
    let mut asm = Assembler::new("greet", &[]);
    asm.load_const("hello").emit(Opcode::ReturnValue);
    let p = program(vec![asm.finish().unwrap()]);

    // Inference succeeds; only code generation rejects the type.
    let types = report(&p, "greet", &[]);
    assert_eq!(types.function("greet").unwrap().returns, "str");
    let err = compile_error(&p, "greet", &[]);
    assert!(err.to_string().contains("str"), "{err}");
}

#[test]
fn module_globals_fold_to_constants() {
    let mut b = ProgramBuilder::new();
    let m = b.module("test");
    b.global(m, "LIMIT", Object::Int(40));
    let mut asm = Assembler::new("limit_plus", &["x"]);
    asm.load_global("LIMIT").load_fast("x").emit(Opcode::BinaryAdd).emit(Opcode::ReturnValue);
    b.function(m, asm.finish().unwrap());
    let p = b.build();
    assert_eq!(run_int(&p, "limit_plus", &[2]), 42);
}
