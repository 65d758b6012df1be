//! Arena of type nodes. Nodes are addressed by [`NodeId`] and never freed;
//! candidate and dependent edges are index lists in both directions.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::bytecode::{ArithOp, UnaryOp};
use crate::diagnostics::CompileError;
use crate::infer::kind::Kind;
use crate::location::SourceLocation;
use crate::program::{ClassId, FunctionId, ModuleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The program entity a node types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Param(u32),
    Local(u32),
    Return,
    Constant,
    Global,
    Builtin,
    Attribute,
    BinaryOp(ArithOp),
    UnaryOp(UnaryOp),
    CallResult,
    Primitive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallableSource {
    Function(FunctionId),
    Class(ClassId),
}

#[derive(Debug, Clone)]
pub struct Callable {
    pub source: CallableSource,
    pub name: String,
    /// One node per declared parameter, shared by every call site.
    pub params: Vec<NodeId>,
    pub param_names: Vec<String>,
    /// What `return` statements in the body flow into.
    pub body_return: NodeId,
    /// What a call expression evaluates to. For classes, the instance node.
    pub call_result: NodeId,
    /// Initializer function node, for classes that declare one.
    pub init: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct InstanceInfo {
    pub class: ClassId,
    pub class_name: String,
    /// Data attributes in first-seen order; this is the struct field order.
    pub attributes: Vec<(String, NodeId)>,
}

impl InstanceInfo {
    pub fn attribute(&self, name: &str) -> Option<NodeId> {
        self.attributes.iter().find(|(n, _)| n == name).map(|(_, id)| *id)
    }
}

#[derive(Debug, Clone)]
pub enum Payload {
    Plain,
    Length(usize),
    Callable(Callable),
    Instance(InstanceInfo),
    Method { function: NodeId, instance: NodeId },
    Module(ModuleId),
}

#[derive(Debug, Clone)]
pub struct TypeNode {
    pub kind: Kind,
    pub origin: Origin,
    pub location: SourceLocation,
    pub payload: Payload,
    candidates: Vec<NodeId>,
    dependents: Vec<NodeId>,
    resolved: Option<NodeId>,
}

impl TypeNode {
    pub fn candidates(&self) -> &[NodeId] {
        &self.candidates
    }

    pub fn dependents(&self) -> &[NodeId] {
        &self.dependents
    }

    pub fn resolved(&self) -> Option<NodeId> {
        self.resolved
    }

    pub fn is_unknown(&self) -> bool {
        self.kind == Kind::Unknown
    }
}

/// Identity used when comparing resolved types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKey {
    Primitive(Kind),
    Node(NodeId),
}

#[derive(Debug, Default)]
pub struct TypeGraph {
    nodes: Vec<TypeNode>,
}

impl TypeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + use<> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn add(
        &mut self,
        kind: Kind,
        origin: Origin,
        location: SourceLocation,
        payload: Payload,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(TypeNode {
            kind,
            origin,
            location,
            payload,
            candidates: Vec::new(),
            dependents: Vec::new(),
            resolved: None,
        });
        id
    }

    pub fn unknown(&mut self, origin: Origin, location: SourceLocation) -> NodeId {
        self.add(Kind::Unknown, origin, location, Payload::Plain)
    }

    pub fn node(&self, id: NodeId) -> &TypeNode {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut TypeNode {
        &mut self.nodes[id.0 as usize]
    }

    /// Record that `candidate` flows into the Unknown node `target`.
    pub fn add_candidate(&mut self, target: NodeId, candidate: NodeId) -> Result<(), CompileError> {
        let node = self.node(target);
        if !node.is_unknown() {
            return Err(CompileError::logic(format!(
                "cannot add a candidate to {target}, a concrete {} node",
                node.kind
            )));
        }
        if node.resolved.is_some() {
            return Err(CompileError::logic(format!(
                "candidate {candidate} reached {target} ({}) after it was resolved",
                node.location
            )));
        }
        if target == candidate || node.candidates.contains(&candidate) {
            return Ok(());
        }
        self.node_mut(target).candidates.push(candidate);
        self.node_mut(candidate).dependents.push(target);
        Ok(())
    }

    /// One-time resolution of an Unknown node to the concrete node `to`.
    pub fn set_resolved(&mut self, id: NodeId, to: NodeId) -> Result<(), CompileError> {
        if self.node(to).is_unknown() {
            return Err(CompileError::logic(format!("{id} cannot resolve to unknown node {to}")));
        }
        let node = self.node_mut(id);
        if !node.is_unknown() {
            return Err(CompileError::logic(format!("{id} is concrete and cannot be resolved")));
        }
        if let Some(prev) = node.resolved {
            return Err(CompileError::logic(format!(
                "{id} ({}) resolved twice: {prev} then {to}",
                node.location
            )));
        }
        node.resolved = Some(to);
        Ok(())
    }

    /// The concrete node standing for `id`, if known yet.
    pub fn concrete(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        if node.is_unknown() { node.resolved } else { Some(id) }
    }

    pub fn require_concrete(&self, id: NodeId) -> Result<NodeId, CompileError> {
        self.concrete(id).ok_or_else(|| {
            CompileError::logic(format!("{id} ({}) used before resolution", self.node(id).location))
        })
    }

    pub fn resolved_kind(&self, id: NodeId) -> Option<Kind> {
        self.concrete(id).map(|c| self.node(c).kind)
    }

    pub fn type_key(&self, concrete: NodeId) -> TypeKey {
        let kind = self.node(concrete).kind;
        if kind.is_primitive() { TypeKey::Primitive(kind) } else { TypeKey::Node(concrete) }
    }

    /// Best concrete guess for `id` before resolution: follows the resolved
    /// link or the first candidate until a concrete node appears.
    pub fn peek(&self, id: NodeId) -> Option<NodeId> {
        let mut seen = HashSet::new();
        let mut cur = id;
        loop {
            if let Some(c) = self.concrete(cur) {
                return Some(c);
            }
            if !seen.insert(cur) {
                return None;
            }
            cur = *self.node(cur).candidates.first()?;
        }
    }

    pub fn callable(&self, id: NodeId) -> Option<&Callable> {
        match &self.node(id).payload {
            Payload::Callable(c) => Some(c),
            _ => None,
        }
    }

    pub fn instance(&self, id: NodeId) -> Option<&InstanceInfo> {
        match &self.node(id).payload {
            Payload::Instance(info) => Some(info),
            _ => None,
        }
    }

    pub fn instance_mut(&mut self, id: NodeId) -> Option<&mut InstanceInfo> {
        match &mut self.node_mut(id).payload {
            Payload::Instance(info) => Some(info),
            _ => None,
        }
    }

    /// Human-readable type of a node, e.g. `int`, `Point`, `function add`.
    pub fn describe(&self, id: NodeId) -> String {
        let Some(c) = self.concrete(id) else {
            return Kind::Unknown.to_string();
        };
        let node = self.node(c);
        match &node.payload {
            Payload::Instance(info) => info.class_name.clone(),
            Payload::Callable(callable) => match callable.source {
                CallableSource::Function(_) => format!("function {}", callable.name),
                CallableSource::Class(_) => format!("class {}", callable.name),
            },
            Payload::Method { function, .. } => {
                let name = self.callable(*function).map(|f| f.name.as_str()).unwrap_or("?");
                format!("method {name}")
            }
            _ => node.kind.to_string(),
        }
    }
}
