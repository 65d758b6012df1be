//! Target-neutral IR produced by the code generator.
//!
//! Functions are lists of basic blocks over virtual values. Locals live in
//! stack slots (load/store), so values never cross block boundaries except
//! for the function parameters, which are only read in the entry block.

pub mod builder;

use std::fmt;

pub use builder::FunctionBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    I1,
    I32,
    I64,
    F64,
    Ptr,
    Void,
}

impl Type {
    /// Bytes occupied in memory; `i1` is stored as one byte.
    pub fn size(self) -> u32 {
        match self {
            Type::I1 => 1,
            Type::I32 => 4,
            Type::I64 | Type::F64 | Type::Ptr => 8,
            Type::Void => 0,
        }
    }

    pub fn align(self) -> u32 {
        self.size().max(1)
    }

    pub fn is_int(self) -> bool {
        matches!(self, Type::I1 | Type::I32 | Type::I64)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Type::I1 => "i1",
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::F64 => "f64",
            Type::Ptr => "ptr",
            Type::Void => "void",
        })
    }
}

macro_rules! entity {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

entity!(Value, "%");
entity!(Block, "block");
entity!(Slot, "slot");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    IAdd,
    ISub,
    IMul,
    SDiv,
    SRem,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    INeg,
    FNeg,
    /// Bitwise complement.
    BNot,
    /// Round toward negative infinity.
    Floor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// `i1 -> i32`
    Zext,
    /// signed integer to `f64`
    SIToF,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    IConst { dst: Value, ty: Type, value: i64 },
    FConst { dst: Value, value: f64 },
    Binary { dst: Value, op: BinaryOp, lhs: Value, rhs: Value },
    Unary { dst: Value, op: UnaryOp, arg: Value },
    /// Signed compare for integers, ordered compare for floats; result is `i1`.
    Cmp { dst: Value, cond: Cond, lhs: Value, rhs: Value },
    Select { dst: Value, cond: Value, then: Value, otherwise: Value },
    Convert { dst: Value, op: Conversion, arg: Value },
    LoadSlot { dst: Value, slot: Slot },
    StoreSlot { slot: Slot, value: Value },
    SlotAddr { dst: Value, slot: Slot },
    Load { dst: Value, addr: Value, offset: u32 },
    Store { addr: Value, offset: u32, value: Value },
    Call { dst: Option<Value>, callee: String, args: Vec<Value> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Jump(Block),
    Branch { cond: Value, then: Block, otherwise: Block },
    Return(Option<Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotData {
    pub size: u32,
    pub align: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockData {
    pub name: String,
    pub insts: Vec<Inst>,
    pub terminator: Option<Terminator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
    pub slots: Vec<SlotData>,
    /// Type of every value; values `0..params.len()` are the parameters.
    pub values: Vec<Type>,
    /// `blocks[0]` is the entry block.
    pub blocks: Vec<BlockData>,
}

impl Function {
    pub fn value_type(&self, value: Value) -> Type {
        self.values[value.index()]
    }

    pub fn block(&self, block: Block) -> &BlockData {
        &self.blocks[block.index()]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

fn args(values: &[Value]) -> String {
    values.iter().map(Value::to_string).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::IConst { dst, ty, value } => write!(f, "{dst} = iconst.{ty} {value}"),
            Inst::FConst { dst, value } => write!(f, "{dst} = fconst {value:?}"),
            Inst::Binary { dst, op, lhs, rhs } => {
                write!(f, "{dst} = {} {lhs}, {rhs}", format!("{op:?}").to_lowercase())
            }
            Inst::Unary { dst, op, arg } => {
                write!(f, "{dst} = {} {arg}", format!("{op:?}").to_lowercase())
            }
            Inst::Cmp { dst, cond, lhs, rhs } => {
                write!(f, "{dst} = cmp {} {lhs}, {rhs}", format!("{cond:?}").to_lowercase())
            }
            Inst::Select { dst, cond, then, otherwise } => {
                write!(f, "{dst} = select {cond}, {then}, {otherwise}")
            }
            Inst::Convert { dst, op, arg } => {
                write!(f, "{dst} = {} {arg}", format!("{op:?}").to_lowercase())
            }
            Inst::LoadSlot { dst, slot } => write!(f, "{dst} = load {slot}"),
            Inst::StoreSlot { slot, value } => write!(f, "store {value}, {slot}"),
            Inst::SlotAddr { dst, slot } => write!(f, "{dst} = addr {slot}"),
            Inst::Load { dst, addr, offset } => write!(f, "{dst} = load {addr}+{offset}"),
            Inst::Store { addr, offset, value } => write!(f, "store {value}, {addr}+{offset}"),
            Inst::Call { dst: Some(dst), callee, args: a } => {
                write!(f, "{dst} = call {callee}({})", args(a))
            }
            Inst::Call { dst: None, callee, args: a } => write!(f, "call {callee}({})", args(a)),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .enumerate()
            .map(|(i, ty)| format!("%{i}: {ty}"))
            .collect();
        writeln!(f, "function {}({}) -> {} {{", self.name, params.join(", "), self.ret)?;
        for (i, slot) in self.slots.iter().enumerate() {
            writeln!(f, "  slot{i} = {} bytes, align {}", slot.size, slot.align)?;
        }
        for block in &self.blocks {
            writeln!(f, "{}:", block.name)?;
            for inst in &block.insts {
                writeln!(f, "  {inst}")?;
            }
            let name = |b: Block| self.block(b).name.as_str();
            match &block.terminator {
                Some(Terminator::Jump(target)) => writeln!(f, "  jump {}", name(*target))?,
                Some(Terminator::Branch { cond, then, otherwise }) => {
                    writeln!(f, "  br {cond}, {}, {}", name(*then), name(*otherwise))?
                }
                Some(Terminator::Return(Some(v))) => writeln!(f, "  ret {v}")?,
                Some(Terminator::Return(None)) => writeln!(f, "  ret")?,
                None => writeln!(f, "  <unterminated>")?,
            }
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {}", self.name)?;
        for func in &self.functions {
            writeln!(f)?;
            write!(f, "{func}")?;
        }
        Ok(())
    }
}
