//! Arithmetic with the source language's rounding rules: floor division and
//! modulo round toward negative infinity, so the remainder takes the sign of
//! the divisor.

use crate::bytecode::{ArithOp, CompareOp};
use crate::ir::{BinaryOp, Cond, FunctionBuilder, Type, UnaryOp, Value};

/// `lhs op rhs`, both operands already converted to `ty`.
pub fn binary(b: &mut FunctionBuilder, op: ArithOp, lhs: Value, rhs: Value, ty: Type) -> Value {
    let float = ty == Type::F64;
    match op {
        ArithOp::Add if float => b.binary(BinaryOp::FAdd, lhs, rhs),
        ArithOp::Add => b.binary(BinaryOp::IAdd, lhs, rhs),
        ArithOp::Sub if float => b.binary(BinaryOp::FSub, lhs, rhs),
        ArithOp::Sub => b.binary(BinaryOp::ISub, lhs, rhs),
        ArithOp::Mul if float => b.binary(BinaryOp::FMul, lhs, rhs),
        ArithOp::Mul => b.binary(BinaryOp::IMul, lhs, rhs),
        ArithOp::TrueDiv => b.binary(BinaryOp::FDiv, lhs, rhs),
        ArithOp::FloorDiv if float => {
            let q = b.binary(BinaryOp::FDiv, lhs, rhs);
            b.unary(UnaryOp::Floor, q)
        }
        ArithOp::FloorDiv => {
            let q = b.binary(BinaryOp::SDiv, lhs, rhs);
            let r = b.binary(BinaryOp::SRem, lhs, rhs);
            let adjust = needs_adjust(b, r, rhs);
            let one = b.iconst(Type::I32, 1);
            let zero = b.iconst(Type::I32, 0);
            let delta = b.select(adjust, one, zero);
            b.binary(BinaryOp::ISub, q, delta)
        }
        ArithOp::Mod if float => {
            let q = b.binary(BinaryOp::FDiv, lhs, rhs);
            let q = b.unary(UnaryOp::Floor, q);
            let prod = b.binary(BinaryOp::FMul, q, rhs);
            b.binary(BinaryOp::FSub, lhs, prod)
        }
        ArithOp::Mod => {
            let r = b.binary(BinaryOp::SRem, lhs, rhs);
            let adjust = needs_adjust(b, r, rhs);
            let zero = b.iconst(Type::I32, 0);
            let delta = b.select(adjust, rhs, zero);
            b.binary(BinaryOp::IAdd, r, delta)
        }
    }
}

/// True when a truncating remainder `r` of a division by `d` is non-zero and
/// has the opposite sign of `d`.
fn needs_adjust(b: &mut FunctionBuilder, r: Value, d: Value) -> Value {
    let zero = b.iconst(Type::I32, 0);
    let nonzero = b.cmp(Cond::Ne, r, zero);
    let r_neg = b.cmp(Cond::Lt, r, zero);
    let d_neg = b.cmp(Cond::Lt, d, zero);
    let differ = b.cmp(Cond::Ne, r_neg, d_neg);
    let no = b.iconst(Type::I1, 0);
    b.select(nonzero, differ, no)
}

pub fn compare_cond(op: CompareOp) -> Option<Cond> {
    Some(match op {
        CompareOp::Lt => Cond::Lt,
        CompareOp::Le => Cond::Le,
        CompareOp::Eq => Cond::Eq,
        CompareOp::Ne => Cond::Ne,
        CompareOp::Gt => Cond::Gt,
        CompareOp::Ge => Cond::Ge,
        _ => return None,
    })
}

/// Common operand type of a comparison, if the pair is comparable.
pub fn compare_type(lhs: Type, rhs: Type) -> Option<Type> {
    match (lhs, rhs) {
        (Type::F64, t) | (t, Type::F64) if t != Type::Ptr => Some(Type::F64),
        (Type::I32, Type::I32 | Type::I1) | (Type::I1, Type::I32) => Some(Type::I32),
        (Type::I1, Type::I1) => Some(Type::I1),
        _ => None,
    }
}
