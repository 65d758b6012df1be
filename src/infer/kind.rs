use std::fmt;

use serde::Serialize;

/// The category of a type node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Kind {
    Unknown,
    Boolean,
    Integer,
    Float,
    Complex,
    None,
    String,
    Bytes,
    List,
    Dict,
    Function,
    Method,
    Class,
    Instance,
    Module,
}

impl Kind {
    pub fn is_numeric(self) -> bool {
        matches!(self, Kind::Boolean | Kind::Integer | Kind::Float | Kind::Complex)
    }

    /// Kinds whose nodes are interchangeable: equality is by kind alone.
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            Kind::Boolean
                | Kind::Integer
                | Kind::Float
                | Kind::Complex
                | Kind::None
                | Kind::String
                | Kind::Bytes
                | Kind::List
                | Kind::Dict
        )
    }

    /// Kinds that only exist at compile time; they carry no runtime value.
    pub fn is_static(self) -> bool {
        matches!(self, Kind::Function | Kind::Method | Kind::Class | Kind::Module)
    }

    fn numeric_rank(self) -> Option<u8> {
        match self {
            Kind::Boolean => Some(0),
            Kind::Integer => Some(1),
            Kind::Float => Some(2),
            Kind::Complex => Some(3),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Kind::Unknown => "unknown",
            Kind::Boolean => "bool",
            Kind::Integer => "int",
            Kind::Float => "float",
            Kind::Complex => "complex",
            Kind::None => "None",
            Kind::String => "str",
            Kind::Bytes => "bytes",
            Kind::List => "list",
            Kind::Dict => "dict",
            Kind::Function => "function",
            Kind::Method => "method",
            Kind::Class => "class",
            Kind::Instance => "instance",
            Kind::Module => "module",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Join two numeric kinds on `Boolean < Integer < Float < Complex`.
/// `None` when either side is not numeric.
pub fn promote(a: Kind, b: Kind) -> Option<Kind> {
    let ra = a.numeric_rank()?;
    let rb = b.numeric_rank()?;
    Some(if ra >= rb { a } else { b })
}
