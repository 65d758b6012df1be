mod common;
use common::*;

/// class Point:
///     def __init__(self, x, y):
///         self.x = x
///         self.y = y
fn point(b: &mut ProgramBuilder, m: monoc::program::ModuleId) -> monoc::program::ClassId {
    let class = b.class(m, "Point");
    let mut init = Assembler::new("__init__", &["self", "x", "y"]);
    init.load_fast("x").load_fast("self").store_attr("x");
    init.load_fast("y").load_fast("self").store_attr("y");
    init.load_const(Object::None).emit(Opcode::ReturnValue);
    b.method(class, init.finish().unwrap());
    class
}

#[test]
fn construct_and_read_fields() {
    // p = Point(2, 3)
    // return p.x + p.y
    let mut b = ProgramBuilder::new();
    let m = b.module("test");
    point(&mut b, m);
    let mut main = Assembler::new("main", &[]);
    main.load_global("Point").load_const(2i64).load_const(3i64).call(2, 0).store_fast("p");
    main.load_fast("p").load_attr("x").load_fast("p").load_attr("y");
    main.emit(Opcode::BinaryAdd).emit(Opcode::ReturnValue);
    b.function(m, main.finish().unwrap());
    let p = b.build();

    assert_eq!(run_int(&p, "main", &[]), 5);
}

#[test]
fn constructor_keywords() {
    // p = Point(y=10, x=1)
    // return p.x - p.y
    let mut b = ProgramBuilder::new();
    let m = b.module("test");
    point(&mut b, m);
    let mut main = Assembler::new("main", &[]);
    main.load_global("Point");
    main.load_const("y").load_const(10i64).load_const("x").load_const(1i64);
    main.call(0, 2).store_fast("p");
    main.load_fast("p").load_attr("x").load_fast("p").load_attr("y");
    main.emit(Opcode::BinarySubtract).emit(Opcode::ReturnValue);
    b.function(m, main.finish().unwrap());
    let p = b.build();

    assert_eq!(run_int(&p, "main", &[]), -9);
}

#[test]
fn methods_update_fields() {
    // class Counter:
    //     def __init__(self, start): self.n = start
    //     def bump(self, k):
    //         self.n = self.n + k
    //         return self.n
    // def main():
    //     c = Counter(1)
    //     c.bump(2)
    //     return c.bump(3)
    let mut b = ProgramBuilder::new();
    let m = b.module("test");
    let counter = b.class(m, "Counter");
    let mut init = Assembler::new("__init__", &["self", "start"]);
    init.load_fast("start").load_fast("self").store_attr("n");
    init.load_const(Object::None).emit(Opcode::ReturnValue);
    b.method(counter, init.finish().unwrap());
    let mut bump = Assembler::new("bump", &["self", "k"]);
    bump.load_fast("self").load_attr("n").load_fast("k").emit(Opcode::BinaryAdd);
    bump.load_fast("self").store_attr("n");
    bump.load_fast("self").load_attr("n").emit(Opcode::ReturnValue);
    b.method(counter, bump.finish().unwrap());

    let mut main = Assembler::new("main", &[]);
    main.load_global("Counter").load_const(1i64).call(1, 0).store_fast("c");
    main.load_fast("c").load_attr("bump").load_const(2i64).call(1, 0).emit(Opcode::PopTop);
    main.load_fast("c").load_attr("bump").load_const(3i64).call(1, 0);
    main.emit(Opcode::ReturnValue);
    b.function(m, main.finish().unwrap());
    let p = b.build();

    assert_eq!(run_int(&p, "main", &[]), 6);
}

#[test]
fn class_attributes_are_constants() {
    // class Box:
    //     factor = 10
    //     def __init__(self, w): self.w = w
    // def main():
    //     b = Box(4)
    //     return b.w * b.factor
    let mut b = ProgramBuilder::new();
    let m = b.module("test");
    let class = b.class(m, "Box");
    b.class_attribute(class, "factor", Object::Int(10));
    let mut init = Assembler::new("__init__", &["self", "w"]);
    init.load_fast("w").load_fast("self").store_attr("w");
    init.load_const(Object::None).emit(Opcode::ReturnValue);
    b.method(class, init.finish().unwrap());
    let mut main = Assembler::new("main", &[]);
    main.load_global("Box").load_const(4i64).call(1, 0).store_fast("b");
    main.load_fast("b").load_attr("w").load_fast("b").load_attr("factor");
    main.emit(Opcode::BinaryMultiply).emit(Opcode::ReturnValue);
    b.function(m, main.finish().unwrap());
    let p = b.build();

    assert_eq!(run_int(&p, "main", &[]), 40);
}

#[test]
fn mixed_field_types_are_laid_out() {
    // class Sample:
    //     def __init__(self, flag, ratio, count):
    //         self.flag = flag; self.ratio = ratio; self.count = count
    // def main():
    //     s = Sample(True, 0.5, 3)
    //     return s.ratio * s.count + s.flag
    let mut b = ProgramBuilder::new();
    let m = b.module("test");
    let class = b.class(m, "Sample");
    let mut init = Assembler::new("__init__", &["self", "flag", "ratio", "count"]);
    for field in ["flag", "ratio", "count"] {
        init.load_fast(field).load_fast("self").store_attr(field);
    }
    init.load_const(Object::None).emit(Opcode::ReturnValue);
    b.method(class, init.finish().unwrap());
    let mut main = Assembler::new("main", &[]);
    main.load_global("Sample").load_const(true).load_const(0.5f64).load_const(3i64);
    main.call(3, 0).store_fast("s");
    main.load_fast("s").load_attr("ratio").load_fast("s").load_attr("count");
    main.emit(Opcode::BinaryMultiply);
    main.load_fast("s").load_attr("flag").emit(Opcode::BinaryAdd);
    main.emit(Opcode::ReturnValue);
    b.function(m, main.finish().unwrap());
    let p = b.build();

    assert_eq!(run(&p, "main", &[]), Object::Float(2.5));
}

#[test]
fn returning_an_instance_is_unsupported() {
    // def make(): return Point(1, 2)
    let mut b = ProgramBuilder::new();
    let m = b.module("test");
    point(&mut b, m);
    let mut make = Assembler::new("make", &[]);
    make.load_global("Point").load_const(1i64).load_const(2i64).call(2, 0);
    make.emit(Opcode::ReturnValue);
    b.function(m, make.finish().unwrap());
    let p = b.build();

    let err = compile_error(&p, "make", &[]);
    assert!(matches!(err, CompileError::Unsupported { .. }), "{err:?}");
}

#[test]
fn string_field_cannot_be_stored() {
    let mut b = ProgramBuilder::new();
    let m = b.module("test");
    point(&mut b, m);
    let mut main = Assembler::new("main", &[]);
    main.load_global("Point").load_const("a").load_const(2i64).call(2, 0).store_fast("p");
    main.load_fast("p").load_attr("y").emit(Opcode::ReturnValue);
    b.function(m, main.finish().unwrap());
    let p = b.build();

    let err = compile_error(&p, "main", &[]);
    assert!(matches!(err, CompileError::Unsupported { .. }), "{err:?}");
}

#[test]
fn keyword_to_class_without_initializer_is_rejected() {
    // class Empty: pass
    // def main():
    //     e = Empty(x=1)
    //     return 0
    let mut b = ProgramBuilder::new();
    let m = b.module("test");
    b.class(m, "Empty");
    let mut main = Assembler::new("main", &[]);
    main.load_global("Empty").load_const("x").load_const(1i64).call(0, 1).store_fast("e");
    main.load_const(0i64).emit(Opcode::ReturnValue);
    b.function(m, main.finish().unwrap());
    let p = b.build();

    let err = compile_error(&p, "main", &[]);
    assert!(matches!(err, CompileError::Unsupported { .. }), "{err:?}");
    assert!(err.to_string().contains("no parameter named `x`"), "{err}");
}

/// class Cell:
///     def __init__(self, v):
///         self.v = v
///         return <result>
fn cell_returning(result: Object) -> Program {
    let mut b = ProgramBuilder::new();
    let m = b.module("test");
    let class = b.class(m, "Cell");
    let mut init = Assembler::new("__init__", &["self", "v"]);
    init.load_fast("v").load_fast("self").store_attr("v");
    init.load_const(result).emit(Opcode::ReturnValue);
    b.method(class, init.finish().unwrap());
    let mut main = Assembler::new("main", &[]);
    main.load_global("Cell").load_const(4i64).call(1, 0).store_fast("c");
    main.load_fast("c").load_attr("v").emit(Opcode::ReturnValue);
    b.function(m, main.finish().unwrap());
    b.build()
}

#[test]
fn initializer_result_is_discarded() {
    let p = cell_returning(Object::Int(7));
    assert_eq!(run_int(&p, "main", &[]), 4);

    let compiled = monoc::compile(&p, entry(&p, "main"), &[], &Default::default()).unwrap();
    let text = compiled.module.to_string();
    assert!(text.contains("function test__Cell____init__(%0: ptr, %1: i32) -> void {"), "{text}");
}

#[test]
fn initializer_may_return_a_string() {
    let p = cell_returning(Object::Str("done".to_string()));
    assert_eq!(run_int(&p, "main", &[]), 4);
}

#[test]
fn constructor_in_a_loop_reuses_its_slot() {
    // i = 0
    // while i < 2:
    //     p = Point(i, 10)
    //     if i == 0: first = p
    //     i += 1
    // return first.x
    let mut b = ProgramBuilder::new();
    let m = b.module("test");
    point(&mut b, m);
    let mut main = Assembler::new("main", &[]);
    let (head, skip, pop, exit) = (main.new_label(), main.new_label(), main.new_label(), main.new_label());
    main.load_const(0i64).store_fast("i");
    main.jump(Opcode::SetupLoop, exit);
    main.bind(head);
    main.load_fast("i").load_const(2i64).compare(CompareOp::Lt);
    main.jump(Opcode::PopJumpIfFalse, pop);
    main.load_global("Point").load_fast("i").load_const(10i64).call(2, 0).store_fast("p");
    main.load_fast("i").load_const(0i64).compare(CompareOp::Eq);
    main.jump(Opcode::PopJumpIfFalse, skip);
    main.load_fast("p").store_fast("first");
    main.bind(skip);
    increment(&mut main, "i", 1);
    main.jump(Opcode::JumpAbsolute, head);
    main.bind(pop);
    main.emit(Opcode::PopBlock);
    main.bind(exit);
    main.load_fast("first").load_attr("x").emit(Opcode::ReturnValue);
    b.function(m, main.finish().unwrap());
    let p = b.build();

    // `first` shares storage with the instance built on the last iteration.
    assert_eq!(run_int(&p, "main", &[]), 1);
}
