use proptest::prelude::*;

use monoc::backend::jit::JitModule;
use monoc::bytecode::{Assembler, Opcode};
use monoc::config::CompileOptions;
use monoc::program::{Object, Program, ProgramBuilder};

/// `def f(a, b): return a <op> b`, compiled for the given argument samples
/// and loaded into memory.
fn jit(op: Opcode, sample: [Object; 2]) -> JitModule {
    let mut asm = Assembler::new("f", &["a", "b"]);
    asm.load_fast("a").load_fast("b").emit(op).emit(Opcode::ReturnValue);
    let mut b = ProgramBuilder::new();
    let m = b.module("prop");
    b.function(m, asm.finish().unwrap());
    let program: Program = b.build();
    let entry = program.find_function("f").unwrap();
    let options = CompileOptions::default();
    let compiled = monoc::compile(&program, entry, &sample, &options).unwrap();
    JitModule::compile(&compiled.module, &compiled.entry, &options).unwrap()
}

fn int_jit(op: Opcode) -> JitModule {
    jit(op, [Object::Int(1), Object::Int(1)])
}

fn floor_div(a: i32, b: i32) -> i32 {
    let q = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q }
}

fn modulo(a: i32, b: i32) -> i32 {
    let r = a % b;
    if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }
}

/// Divisor pairs the hardware can divide without trapping.
fn divisible() -> impl Strategy<Value = (i32, i32)> {
    (any::<i32>(), any::<i32>()).prop_filter("division traps", |&(a, b)| b != 0 && !(a == i32::MIN && b == -1))
}

#[test]
fn prop_floor_division_matches_model() {
    let f = int_jit(Opcode::BinaryFloorDivide);
    proptest!(|((a, b) in divisible())| {
        let got = f.call(&[a as i64, b as i64]).unwrap();
        prop_assert_eq!(got, floor_div(a, b) as i64, "{} // {}", a, b);
    });
    f.free();
}

#[test]
fn prop_modulo_takes_divisor_sign() {
    let f = int_jit(Opcode::BinaryModulo);
    proptest!(|((a, b) in divisible())| {
        let got = f.call(&[a as i64, b as i64]).unwrap() as i32;
        prop_assert_eq!(got, modulo(a, b), "{} % {}", a, b);
        prop_assert!(got == 0 || (got < 0) == (b < 0));
        prop_assert_eq!(floor_div(a, b).wrapping_mul(b).wrapping_add(got), a);
    });
    f.free();
}

#[test]
fn prop_integer_arithmetic_wraps_at_32_bits() {
    let add = int_jit(Opcode::BinaryAdd);
    let sub = int_jit(Opcode::BinarySubtract);
    let mul = int_jit(Opcode::BinaryMultiply);
    proptest!(|(a in any::<i32>(), b in any::<i32>())| {
        let args = [a as i64, b as i64];
        prop_assert_eq!(add.call(&args).unwrap(), a.wrapping_add(b) as i64);
        prop_assert_eq!(sub.call(&args).unwrap(), a.wrapping_sub(b) as i64);
        prop_assert_eq!(mul.call(&args).unwrap(), a.wrapping_mul(b) as i64);
    });
    add.free();
    sub.free();
    mul.free();
}

#[test]
fn prop_float_floor_division_floors() {
    let f = jit(Opcode::BinaryFloorDivide, [Object::Float(1.0), Object::Float(1.0)]);
    proptest!(|(a in -1.0e6f64..1.0e6, b in prop_oneof![-1.0e3f64..-1.0e-3, 1.0e-3f64..1.0e3])| {
        let bits = f.call(&[a.to_bits() as i64, b.to_bits() as i64]).unwrap();
        prop_assert_eq!(f64::from_bits(bits as u64), (a / b).floor());
    });
    f.free();
}
