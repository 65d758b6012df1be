mod common;
use common::*;

const MIN: i64 = i32::MIN as i64;
const MAX: i64 = i32::MAX as i64;

fn all() -> Program {
    program(vec![
        comparison("lt", CompareOp::Lt),
        comparison("le", CompareOp::Le),
        comparison("eq", CompareOp::Eq),
        comparison("ne", CompareOp::Ne),
        comparison("gt", CompareOp::Gt),
        comparison("ge", CompareOp::Ge),
    ])
}

fn check(p: &Program, name: &str, a: i64, b: i64) -> bool {
    match run(p, name, &[Object::Int(a), Object::Int(b)]) {
        Object::Bool(v) => v,
        other => panic!("expected a bool, got {other:?}"),
    }
}

#[test]
fn signed_comparisons_at_the_extremes() {
    let p = all();
    assert!(check(&p, "lt", MIN, MAX));
    assert!(check(&p, "le", MIN, MIN));
    assert!(!check(&p, "gt", MIN, MAX));
    assert!(check(&p, "ge", MAX, MIN));
    assert!(check(&p, "ne", MIN, MAX));
    assert!(!check(&p, "eq", MIN, MAX));
    assert!(check(&p, "lt", -1, 0));
}

#[test]
fn every_comparator_on_equal_maxima() {
    let p = all();
    let expected = [("lt", false), ("le", true), ("eq", true), ("ne", false), ("gt", false), ("ge", true)];
    for (name, want) in expected {
        assert_eq!(check(&p, name, MAX, MAX), want, "{name}");
    }
}

#[test]
fn int_and_float_compare_as_float() {
    let p = all();
    assert_eq!(run(&p, "lt", &[Object::Float(1.5), Object::Int(2)]), Object::Bool(true));
    assert_eq!(run(&p, "eq", &[Object::Int(2), Object::Float(2.0)]), Object::Bool(true));
}

#[test]
fn booleans_compare_with_ints() {
    let p = all();
    assert_eq!(run(&p, "eq", &[Object::Bool(true), Object::Int(1)]), Object::Bool(true));
    assert_eq!(run(&p, "gt", &[Object::Bool(false), Object::Int(-1)]), Object::Bool(true));
}

#[test]
fn identity_comparison_is_unsupported() {
    let p = program(vec![comparison("same", CompareOp::Is)]);
    let err = compile_error(&p, "same", &[Object::Int(1), Object::Int(1)]);
    assert!(matches!(err, CompileError::Unsupported { .. }), "{err:?}");
}
