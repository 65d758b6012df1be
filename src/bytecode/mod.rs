//! Stack-machine bytecode: opcode table, variable-width decoder and the
//! branch-target pre-scan.
//!
//! Encoding: one opcode byte; opcodes at or above [`HAVE_ARGUMENT`] carry a
//! 16-bit little-endian immediate. `EXTENDED_ARG` prefixes widen the
//! immediate of the instruction that follows them.

pub mod assembler;
pub mod walk;

use std::collections::BTreeSet;
use std::fmt;

use crate::diagnostics::CompileError;

pub use assembler::{Assembler, Label};

pub const HAVE_ARGUMENT: u8 = 90;

macro_rules! opcodes {
    ($($name:ident = $byte:literal => $text:literal,)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum Opcode {
            $($name = $byte,)*
        }

        impl Opcode {
            pub fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $($byte => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(Opcode::$name => $text,)*
                }
            }
        }
    };
}

opcodes! {
    PopTop = 1 => "POP_TOP",
    RotTwo = 2 => "ROT_TWO",
    DupTop = 4 => "DUP_TOP",
    Nop = 9 => "NOP",
    UnaryNegative = 11 => "UNARY_NEGATIVE",
    UnaryNot = 12 => "UNARY_NOT",
    UnaryInvert = 15 => "UNARY_INVERT",
    BinaryPower = 19 => "BINARY_POWER",
    BinaryMultiply = 20 => "BINARY_MULTIPLY",
    BinaryModulo = 22 => "BINARY_MODULO",
    BinaryAdd = 23 => "BINARY_ADD",
    BinarySubtract = 24 => "BINARY_SUBTRACT",
    BinaryFloorDivide = 26 => "BINARY_FLOOR_DIVIDE",
    BinaryTrueDivide = 27 => "BINARY_TRUE_DIVIDE",
    InplaceFloorDivide = 28 => "INPLACE_FLOOR_DIVIDE",
    InplaceTrueDivide = 29 => "INPLACE_TRUE_DIVIDE",
    InplaceAdd = 55 => "INPLACE_ADD",
    InplaceSubtract = 56 => "INPLACE_SUBTRACT",
    InplaceMultiply = 57 => "INPLACE_MULTIPLY",
    InplaceModulo = 59 => "INPLACE_MODULO",
    GetIter = 68 => "GET_ITER",
    BreakLoop = 80 => "BREAK_LOOP",
    ReturnValue = 83 => "RETURN_VALUE",
    PopBlock = 87 => "POP_BLOCK",
    ForIter = 93 => "FOR_ITER",
    StoreAttr = 95 => "STORE_ATTR",
    LoadConst = 100 => "LOAD_CONST",
    BuildTuple = 102 => "BUILD_TUPLE",
    BuildList = 103 => "BUILD_LIST",
    LoadAttr = 106 => "LOAD_ATTR",
    CompareOp = 107 => "COMPARE_OP",
    JumpForward = 110 => "JUMP_FORWARD",
    JumpAbsolute = 113 => "JUMP_ABSOLUTE",
    PopJumpIfFalse = 114 => "POP_JUMP_IF_FALSE",
    PopJumpIfTrue = 115 => "POP_JUMP_IF_TRUE",
    LoadGlobal = 116 => "LOAD_GLOBAL",
    ContinueLoop = 119 => "CONTINUE_LOOP",
    SetupLoop = 120 => "SETUP_LOOP",
    LoadFast = 124 => "LOAD_FAST",
    StoreFast = 125 => "STORE_FAST",
    CallFunction = 131 => "CALL_FUNCTION",
    ExtendedArg = 144 => "EXTENDED_ARG",
}

/// How an opcode's immediate names a jump destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    /// Target is `next_offset + arg`.
    Relative,
    /// Target is `arg`.
    Absolute,
}

impl Opcode {
    pub fn has_argument(self) -> bool {
        self as u8 >= HAVE_ARGUMENT
    }

    pub fn jump_kind(self) -> Option<JumpKind> {
        match self {
            Opcode::JumpForward | Opcode::SetupLoop | Opcode::ForIter => Some(JumpKind::Relative),
            Opcode::JumpAbsolute
            | Opcode::PopJumpIfFalse
            | Opcode::PopJumpIfTrue
            | Opcode::ContinueLoop => Some(JumpKind::Absolute),
            _ => None,
        }
    }

    /// Arithmetic operator for binary and in-place opcodes.
    pub fn arith_op(self) -> Option<ArithOp> {
        Some(match self {
            Opcode::BinaryAdd | Opcode::InplaceAdd => ArithOp::Add,
            Opcode::BinarySubtract | Opcode::InplaceSubtract => ArithOp::Sub,
            Opcode::BinaryMultiply | Opcode::InplaceMultiply => ArithOp::Mul,
            Opcode::BinaryFloorDivide | Opcode::InplaceFloorDivide => ArithOp::FloorDiv,
            Opcode::BinaryTrueDivide | Opcode::InplaceTrueDivide => ArithOp::TrueDiv,
            Opcode::BinaryModulo | Opcode::InplaceModulo => ArithOp::Mod,
            _ => return None,
        })
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    FloorDiv,
    TrueDiv,
    Mod,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::FloorDiv => "//",
            ArithOp::TrueDiv => "/",
            ArithOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnaryOp {
    Negative,
    Not,
    Invert,
}

/// `COMPARE_OP` immediates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Lt = 0,
    Le = 1,
    Eq = 2,
    Ne = 3,
    Gt = 4,
    Ge = 5,
    In = 6,
    NotIn = 7,
    Is = 8,
    IsNot = 9,
    ExceptionMatch = 10,
}

impl CompareOp {
    pub fn from_arg(arg: u32) -> Option<Self> {
        Some(match arg {
            0 => CompareOp::Lt,
            1 => CompareOp::Le,
            2 => CompareOp::Eq,
            3 => CompareOp::Ne,
            4 => CompareOp::Gt,
            5 => CompareOp::Ge,
            6 => CompareOp::In,
            7 => CompareOp::NotIn,
            8 => CompareOp::Is,
            9 => CompareOp::IsNot,
            10 => CompareOp::ExceptionMatch,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
            CompareOp::ExceptionMatch => "exception match",
        }
    }
}

/// One decoded instruction. `offset` is the first byte, including any
/// `EXTENDED_ARG` prefixes; `arg` is the fully accumulated immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: u32,
    pub next: u32,
    pub opcode: Opcode,
    pub arg: u32,
}

impl Instruction {
    pub fn jump_target(&self) -> Option<u32> {
        match self.opcode.jump_kind()? {
            JumpKind::Relative => Some(self.next.wrapping_add(self.arg)),
            JumpKind::Absolute => Some(self.arg),
        }
    }

    /// `CALL_FUNCTION` immediate split into (positional, keyword) counts.
    pub fn call_counts(&self) -> (usize, usize) {
        ((self.arg & 0xff) as usize, ((self.arg >> 8) & 0xff) as usize)
    }
}

/// Decode the instruction starting at `offset`.
pub fn decode(code: &[u8], offset: u32) -> Result<Instruction, CompileError> {
    let start = offset;
    let mut pos = offset as usize;
    let mut arg: u32 = 0;
    loop {
        let Some(&byte) = code.get(pos) else {
            return Err(CompileError::logic(format!(
                "decoding past end of code at offset {pos} (length {})",
                code.len()
            )));
        };
        let opcode = Opcode::from_byte(byte).ok_or_else(|| {
            CompileError::logic(format!("unknown opcode byte {byte} at offset {pos}"))
        })?;
        pos += 1;
        if !opcode.has_argument() {
            if pos - 1 != start as usize {
                return Err(CompileError::logic(format!(
                    "EXTENDED_ARG at offset {start} prefixes {opcode}, which takes no argument"
                )));
            }
            return Ok(Instruction { offset: start, next: pos as u32, opcode, arg: 0 });
        }
        let bytes = code.get(pos..pos + 2).ok_or_else(|| {
            CompileError::logic(format!("truncated immediate for {opcode} at offset {}", pos - 1))
        })?;
        let imm = u16::from_le_bytes([bytes[0], bytes[1]]) as u32;
        pos += 2;
        arg = (arg << 16) | imm;
        if opcode != Opcode::ExtendedArg {
            return Ok(Instruction { offset: start, next: pos as u32, opcode, arg });
        }
    }
}

/// Iterator over every instruction of a body, in offset order.
pub struct Instructions<'a> {
    code: &'a [u8],
    offset: u32,
}

impl<'a> Instructions<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Self { code, offset: 0 }
    }
}

impl Iterator for Instructions<'_> {
    type Item = Result<Instruction, CompileError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset as usize >= self.code.len() {
            return None;
        }
        match decode(self.code, self.offset) {
            Ok(ins) => {
                self.offset = ins.next;
                Some(Ok(ins))
            }
            Err(e) => {
                self.offset = self.code.len() as u32;
                Some(Err(e))
            }
        }
    }
}

/// Every offset some instruction can jump to.
pub fn find_branch_targets(code: &[u8]) -> Result<BTreeSet<u32>, CompileError> {
    let mut targets = BTreeSet::new();
    for ins in Instructions::new(code) {
        if let Some(target) = ins?.jump_target() {
            targets.insert(target);
        }
    }
    Ok(targets)
}

/// Human-readable listing, one instruction per line.
pub fn disassemble(code: &[u8]) -> Result<String, CompileError> {
    let mut out = String::new();
    for ins in Instructions::new(code) {
        let ins = ins?;
        if ins.opcode.has_argument() {
            out.push_str(&format!("{:>6} {:<20} {}", ins.offset, ins.opcode.name(), ins.arg));
            if let Some(target) = ins.jump_target() {
                out.push_str(&format!(" (to {target})"));
            }
        } else {
            out.push_str(&format!("{:>6} {}", ins.offset, ins.opcode.name()));
        }
        out.push('\n');
    }
    Ok(out)
}
