//! The source program as the compiler sees it: code objects, classes,
//! modules and heap objects, addressed by identity.

pub mod builder;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::diagnostics::CompileError;

pub use builder::ProgramBuilder;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);
    };
}

id_type!(FunctionId);
id_type!(ClassId);
id_type!(ModuleId);
id_type!(HeapId);

/// A source-level value: constant pool entries, globals and class attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Object {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex { re: f64, im: f64 },
    Str(String),
    Bytes(Vec<u8>),
    Function(FunctionId),
    Class(ClassId),
    Module(ModuleId),
    /// Mutable object, compared by identity.
    Ref(HeapId),
    /// A host object with no compilable category (builtin function, file handle...).
    Native(String),
}

impl Object {
    /// Equality as a constant pool sees it: `1`, `1.0` and `True` stay distinct
    /// and floats compare by bit pattern.
    pub fn same_constant(&self, other: &Object) -> bool {
        match (self, other) {
            (Object::Float(a), Object::Float(b)) => a.to_bits() == b.to_bits(),
            (Object::Complex { re: a, im: b }, Object::Complex { re: c, im: d }) => {
                a.to_bits() == c.to_bits() && b.to_bits() == d.to_bits()
            }
            _ => self == other,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Object::None => "NoneType",
            Object::Bool(_) => "bool",
            Object::Int(_) => "int",
            Object::Float(_) => "float",
            Object::Complex { .. } => "complex",
            Object::Str(_) => "str",
            Object::Bytes(_) => "bytes",
            Object::Function(_) => "function",
            Object::Class(_) => "type",
            Object::Module(_) => "module",
            Object::Ref(_) => "object",
            Object::Native(_) => "native",
        }
    }
}

impl From<i64> for Object {
    fn from(v: i64) -> Self {
        Object::Int(v)
    }
}

impl From<i32> for Object {
    fn from(v: i32) -> Self {
        Object::Int(v as i64)
    }
}

impl From<bool> for Object {
    fn from(v: bool) -> Self {
        Object::Bool(v)
    }
}

impl From<f64> for Object {
    fn from(v: f64) -> Self {
        Object::Float(v)
    }
}

impl From<&str> for Object {
    fn from(v: &str) -> Self {
        Object::Str(v.to_string())
    }
}

/// Compiled body of one function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeObject {
    pub name: String,
    pub filename: String,
    pub first_line: u32,
    /// Parameters occupy the first `arg_count` entries of `varnames`.
    pub arg_count: u32,
    pub varnames: Vec<String>,
    pub consts: Vec<Object>,
    pub names: Vec<String>,
    pub code: Vec<u8>,
    /// `(offset, line)` pairs in ascending offset order.
    pub lines: Vec<(u32, u32)>,
}

impl CodeObject {
    pub fn params(&self) -> &[String] {
        &self.varnames[..(self.arg_count as usize).min(self.varnames.len())]
    }

    /// Source line of the instruction at `offset`.
    pub fn line_for(&self, offset: u32) -> u32 {
        self.lines
            .iter()
            .take_while(|(start, _)| *start <= offset)
            .last()
            .map(|(_, line)| *line)
            .unwrap_or(self.first_line)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub module: ModuleId,
    pub code: CodeObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    pub module: ModuleId,
    /// Class body namespace in declaration order; methods are `Object::Function`.
    pub attributes: Vec<(String, Object)>,
}

impl ClassDef {
    pub fn attribute(&self, name: &str) -> Option<&Object> {
        self.attributes.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn initializer(&self) -> Option<FunctionId> {
        match self.attribute("__init__") {
            Some(Object::Function(id)) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDef {
    pub name: String,
    pub globals: BTreeMap<String, Object>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HeapObject {
    List(Vec<Object>),
    Dict(Vec<(Object, Object)>),
    Instance { class: ClassId, fields: Vec<(String, Object)> },
}

/// Read-only view of the program, keyed by identity.
pub trait Metadata {
    fn function(&self, id: FunctionId) -> Result<&FunctionDef, CompileError>;
    fn class(&self, id: ClassId) -> Result<&ClassDef, CompileError>;
    fn module(&self, id: ModuleId) -> Result<&ModuleDef, CompileError>;
    fn heap(&self, id: HeapId) -> Result<&HeapObject, CompileError>;

    /// Names visible in every module when the module's globals miss.
    fn builtin(&self, name: &str) -> Option<Object> {
        match name {
            "True" => Some(Object::Bool(true)),
            "False" => Some(Object::Bool(false)),
            "None" => Some(Object::None),
            _ => None,
        }
    }
}

/// In-memory program image. Serializes to the JSON format the CLI reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub modules: Vec<ModuleDef>,
    pub functions: Vec<FunctionDef>,
    pub classes: Vec<ClassDef>,
    #[serde(default)]
    pub heap: Vec<HeapObject>,
}

impl Program {
    pub fn from_json(text: &str) -> Result<Self, CompileError> {
        serde_json::from_str(text).map_err(|e| CompileError::io(format!("invalid program image: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self, CompileError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CompileError::io(format!("could not read {}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String, CompileError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CompileError::io(format!("could not serialize program: {e}")))
    }

    /// Look up a function by `name` or `module.name`.
    pub fn find_function(&self, path: &str) -> Option<FunctionId> {
        let (module, name) = match path.rsplit_once('.') {
            Some((m, n)) => (Some(m), n),
            None => (None, path),
        };
        self.modules.iter().find_map(|m| {
            if module.is_some_and(|wanted| wanted != m.name) {
                return None;
            }
            match m.globals.get(name) {
                Some(Object::Function(id)) => Some(*id),
                _ => None,
            }
        })
    }
}

fn lookup<'a, T>(items: &'a [T], idx: u32, what: &str) -> Result<&'a T, CompileError> {
    items
        .get(idx as usize)
        .ok_or_else(|| CompileError::logic(format!("dangling {what} id {idx}")))
}

impl Metadata for Program {
    fn function(&self, id: FunctionId) -> Result<&FunctionDef, CompileError> {
        lookup(&self.functions, id.0, "function")
    }

    fn class(&self, id: ClassId) -> Result<&ClassDef, CompileError> {
        lookup(&self.classes, id.0, "class")
    }

    fn module(&self, id: ModuleId) -> Result<&ModuleDef, CompileError> {
        lookup(&self.modules, id.0, "module")
    }

    fn heap(&self, id: HeapId) -> Result<&HeapObject, CompileError> {
        lookup(&self.heap, id.0, "heap object")
    }
}
