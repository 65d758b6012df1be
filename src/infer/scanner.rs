//! Call-graph scanner: one walk over a function body that builds the type
//! graph for every value site and discovers the callables it references.

use std::collections::HashMap;

use crate::bytecode::walk::{walk_code, Action, OpcodeVisitor, Walk};
use crate::bytecode::{Instruction, Opcode, UnaryOp};
use crate::diagnostics::CompileError;
use crate::infer::graph::{CallableSource, NodeId, Origin, Payload};
use crate::infer::kind::Kind;
use crate::infer::registry::TypeRegistry;
use crate::location::SourceLocation;
use crate::program::{ClassId, CodeObject, FunctionId, Metadata, ModuleId, Object};

/// How a call site reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    Function(NodeId),
    /// Constructor call on a class node; the instance pointer is argument 0.
    Constructor(NodeId),
    /// Bound method: the instance pointer is argument 0.
    Method { function: NodeId, instance: NodeId },
}

#[derive(Debug, Clone)]
pub struct CallSite {
    pub target: CallTarget,
    /// Parameter index of each popped argument, in stack order
    /// (positional first, then keyword values).
    pub bindings: Vec<usize>,
    pub keywords: usize,
    pub result: NodeId,
}

#[derive(Debug, Clone)]
pub enum AttrSite {
    /// Runtime field of an instance struct.
    Field { instance: NodeId, name: String, node: NodeId },
    /// Value known at compile time (method, module member, class attribute).
    Static { node: NodeId, value: Object },
}

/// Everything the code generator needs to know about one scanned function.
#[derive(Debug, Clone)]
pub struct FunctionScan {
    pub node: NodeId,
    pub id: FunctionId,
    /// Node per local slot; `None` for slots the body never touches.
    pub locals: Vec<Option<NodeId>>,
    /// Node pushed by each value-producing instruction, keyed by offset.
    pub sites: HashMap<u32, NodeId>,
    pub calls: HashMap<u32, CallSite>,
    pub attributes: HashMap<u32, AttrSite>,
}

enum Owner {
    Instance { class: ClassId, class_name: String },
    Class(ClassId),
    Module(ModuleId),
    Other(String),
}

#[derive(Debug, Clone)]
struct Entry {
    node: NodeId,
    /// Set when the value is a string constant (keyword names).
    literal: Option<String>,
}

struct Scanner<'a> {
    meta: &'a dyn Metadata,
    registry: &'a mut TypeRegistry,
    code: &'a CodeObject,
    module: ModuleId,
    body_return: NodeId,
    stack: Vec<Entry>,
    globals: HashMap<u32, NodeId>,
    consts: HashMap<u32, NodeId>,
    scan: FunctionScan,
}

/// Scan the function behind `node`, a Function node created by the registry.
pub fn scan_function(
    meta: &dyn Metadata,
    registry: &mut TypeRegistry,
    node: NodeId,
) -> Result<FunctionScan, CompileError> {
    let callable = registry
        .graph()
        .callable(node)
        .cloned()
        .ok_or_else(|| CompileError::logic(format!("{node} is not callable")))?;
    let CallableSource::Function(id) = callable.source else {
        return Err(CompileError::logic(format!("{node} is a class; scan its initializer")));
    };
    let def = meta.function(id)?;
    let code = &def.code;
    tracing::info!(function = %code.name, "scanning");

    let mut locals = vec![None; code.varnames.len()];
    for (slot, param) in locals.iter_mut().zip(&callable.params) {
        *slot = Some(*param);
    }

    let mut scanner = Scanner {
        meta,
        registry,
        code,
        module: def.module,
        body_return: callable.body_return,
        stack: Vec::new(),
        globals: HashMap::new(),
        consts: HashMap::new(),
        scan: FunctionScan {
            node,
            id,
            locals,
            sites: HashMap::new(),
            calls: HashMap::new(),
            attributes: HashMap::new(),
        },
    };
    walk_code(&code.code, &mut scanner)?;
    Ok(scanner.scan)
}

impl Scanner<'_> {
    fn location(&self, offset: u32, detail: impl Into<String>) -> SourceLocation {
        SourceLocation::new(
            &self.code.name,
            &self.code.filename,
            self.code.line_for(offset),
            detail,
        )
    }

    fn push(&mut self, node: NodeId) {
        self.stack.push(Entry { node, literal: None });
    }

    fn push_site(&mut self, offset: u32, node: NodeId) {
        self.scan.sites.insert(offset, node);
        self.push(node);
    }

    fn pop(&mut self, ins: &Instruction) -> Result<Entry, CompileError> {
        self.stack.pop().ok_or_else(|| {
            CompileError::logic(format!(
                "value stack underflow at {} offset {} in `{}`",
                ins.opcode, ins.offset, self.code.name
            ))
        })
    }

    fn ensure_empty_stack(&self, offset: u32) -> Result<(), CompileError> {
        if self.stack.is_empty() {
            Ok(())
        } else {
            Err(CompileError::unsupported(
                format!("{} value(s) live across a block boundary", self.stack.len()),
                self.location(offset, "block exit"),
            ))
        }
    }

    fn local(&mut self, index: u32, offset: u32) -> Result<NodeId, CompileError> {
        let name = self.code.varnames.get(index as usize).cloned().ok_or_else(|| {
            CompileError::logic(format!("local index {index} out of range in `{}`", self.code.name))
        })?;
        let slot = &mut self.scan.locals[index as usize];
        if let Some(node) = *slot {
            return Ok(node);
        }
        let loc = SourceLocation::new(
            &self.code.name,
            &self.code.filename,
            self.code.line_for(offset),
            format!("local `{name}`"),
        );
        let node = self.registry.graph_mut().unknown(Origin::Local(index), loc);
        self.scan.locals[index as usize] = Some(node);
        Ok(node)
    }

    fn name(&self, index: u32) -> Result<&str, CompileError> {
        self.code.names.get(index as usize).map(String::as_str).ok_or_else(|| {
            CompileError::logic(format!("name index {index} out of range in `{}`", self.code.name))
        })
    }

    fn load_const(&mut self, ins: &Instruction) -> Result<(), CompileError> {
        let object = self.code.consts.get(ins.arg as usize).cloned().ok_or_else(|| {
            CompileError::logic(format!("constant index {} out of range in `{}`", ins.arg, self.code.name))
        })?;
        let node = match self.consts.get(&ins.arg) {
            Some(&node) => node,
            None => {
                let loc = self.location(ins.offset, format!("constant #{}", ins.arg));
                let node = self.registry.intern(self.meta, &object, loc)?;
                self.consts.insert(ins.arg, node);
                node
            }
        };
        self.scan.sites.insert(ins.offset, node);
        let literal = match object {
            Object::Str(s) => Some(s),
            _ => None,
        };
        self.stack.push(Entry { node, literal });
        Ok(())
    }

    fn load_global(&mut self, ins: &Instruction) -> Result<(), CompileError> {
        if let Some(&node) = self.globals.get(&ins.arg) {
            self.push_site(ins.offset, node);
            return Ok(());
        }
        let name = self.name(ins.arg)?.to_string();
        let loc = self.location(ins.offset, format!("global `{name}`"));
        let object = lookup_global(self.meta, self.module, &name)?
            .ok_or_else(|| CompileError::unsupported(format!("name `{name}` is not defined"), loc.clone()))?;
        let node = self.registry.intern(self.meta, &object, loc)?;
        self.globals.insert(ins.arg, node);
        self.push_site(ins.offset, node);
        Ok(())
    }

    fn binary(&mut self, ins: &Instruction) -> Result<(), CompileError> {
        let op = ins
            .opcode
            .arith_op()
            .ok_or_else(|| CompileError::logic(format!("{} is not arithmetic", ins.opcode)))?;
        let rhs = self.pop(ins)?.node;
        let lhs = self.pop(ins)?.node;
        let loc = self.location(ins.offset, format!("result of `{}`", op.symbol()));
        let graph = self.registry.graph_mut();
        let node = graph.unknown(Origin::BinaryOp(op), loc);
        graph.add_candidate(node, lhs)?;
        graph.add_candidate(node, rhs)?;
        self.push_site(ins.offset, node);
        Ok(())
    }

    fn unary(&mut self, ins: &Instruction, op: UnaryOp) -> Result<(), CompileError> {
        let operand = self.pop(ins)?.node;
        let node = if op == UnaryOp::Not {
            self.registry.primitive(Kind::Boolean)?
        } else {
            let loc = self.location(ins.offset, "unary result");
            let graph = self.registry.graph_mut();
            let node = graph.unknown(Origin::UnaryOp(op), loc);
            graph.add_candidate(node, operand)?;
            node
        };
        self.push_site(ins.offset, node);
        Ok(())
    }

    fn load_attr(&mut self, ins: &Instruction) -> Result<(), CompileError> {
        let owner = self.pop(ins)?.node;
        let name = self.name(ins.arg)?.to_string();
        let site = self.attribute(owner, &name, ins.offset, false)?;
        let node = match &site {
            AttrSite::Field { node, .. } | AttrSite::Static { node, .. } => *node,
        };
        self.scan.attributes.insert(ins.offset, site);
        self.push_site(ins.offset, node);
        Ok(())
    }

    fn store_attr(&mut self, ins: &Instruction) -> Result<(), CompileError> {
        let owner = self.pop(ins)?.node;
        let value = self.pop(ins)?.node;
        let name = self.name(ins.arg)?.to_string();
        let site = self.attribute(owner, &name, ins.offset, true)?;
        let AttrSite::Field { node, .. } = &site else {
            return Err(CompileError::unsupported(
                format!("assignment to attribute `{name}` outside an instance"),
                self.location(ins.offset, format!("attribute `{name}`")),
            ));
        };
        self.registry.graph_mut().add_candidate(*node, value)?;
        self.scan.attributes.insert(ins.offset, site);
        Ok(())
    }

    /// Find or create the node for `owner.name`.
    fn attribute(
        &mut self,
        owner: NodeId,
        name: &str,
        offset: u32,
        storing: bool,
    ) -> Result<AttrSite, CompileError> {
        let loc = self.location(offset, format!("attribute `{name}`"));
        let target = self.registry.graph().peek(owner).ok_or_else(|| {
            CompileError::unsupported(format!("cannot determine the owner of attribute `{name}`"), loc.clone())
        })?;
        let graph = self.registry.graph();
        let owner_kind = match &graph.node(target).payload {
            Payload::Instance(info) => match info.attribute(name) {
                Some(node) => {
                    return Ok(AttrSite::Field { instance: target, name: name.to_string(), node });
                }
                None => Owner::Instance { class: info.class, class_name: info.class_name.clone() },
            },
            Payload::Callable(callable) if !storing => match callable.source {
                CallableSource::Class(class) => Owner::Class(class),
                CallableSource::Function(_) => Owner::Other(graph.describe(target)),
            },
            Payload::Module(module) if !storing => Owner::Module(*module),
            _ => Owner::Other(graph.describe(target)),
        };

        match owner_kind {
            Owner::Instance { class, class_name } => {
                if !storing {
                    if let Some(value) = self.meta.class(class)?.attribute(name).cloned() {
                        let node = self.registry.intern(self.meta, &value, loc.clone())?;
                        let node = match value {
                            Object::Function(_) => self.registry.method(node, target, loc)?,
                            _ => node,
                        };
                        return Ok(AttrSite::Static { node, value });
                    }
                }
                let graph = self.registry.graph_mut();
                let node = graph.unknown(
                    Origin::Attribute,
                    loc.with_detail(format!("attribute `{class_name}.{name}`")),
                );
                if let Some(info) = graph.instance_mut(target) {
                    info.attributes.push((name.to_string(), node));
                }
                Ok(AttrSite::Field { instance: target, name: name.to_string(), node })
            }
            Owner::Class(class) => {
                let value = self.meta.class(class)?.attribute(name).cloned().ok_or_else(|| {
                    CompileError::unsupported(format!("class has no attribute `{name}`"), loc.clone())
                })?;
                let node = self.registry.intern(self.meta, &value, loc)?;
                Ok(AttrSite::Static { node, value })
            }
            Owner::Module(module) => {
                let module_def = self.meta.module(module)?;
                let value = module_def.globals.get(name).cloned().ok_or_else(|| {
                    CompileError::unsupported(
                        format!("module `{}` has no attribute `{name}`", module_def.name),
                        loc.clone(),
                    )
                })?;
                let node = self.registry.intern(self.meta, &value, loc)?;
                Ok(AttrSite::Static { node, value })
            }
            Owner::Other(described) => Err(CompileError::unsupported(
                format!("attribute `{name}` on a value of type {described}"),
                loc,
            )),
        }
    }

    fn call(&mut self, ins: &Instruction) -> Result<(), CompileError> {
        let (positional, keywords) = ins.call_counts();
        let mut kw_args = Vec::with_capacity(keywords);
        for _ in 0..keywords {
            let value = self.pop(ins)?.node;
            let name = self.pop(ins)?.literal.ok_or_else(|| {
                CompileError::logic(format!("keyword name at offset {} is not a string constant", ins.offset))
            })?;
            kw_args.push((name, value));
        }
        kw_args.reverse();
        let mut pos_args = Vec::with_capacity(positional);
        for _ in 0..positional {
            pos_args.push(self.pop(ins)?.node);
        }
        pos_args.reverse();
        let callee = self.pop(ins)?.node;

        let loc = self.location(ins.offset, "call");
        let graph = self.registry.graph();
        let resolved = graph.peek(callee).ok_or_else(|| {
            CompileError::unsupported("cannot determine the called object", loc.clone())
        })?;
        let (target, callable, offset) = match &graph.node(resolved).payload {
            Payload::Callable(c) if matches!(c.source, CallableSource::Class(_)) => {
                (CallTarget::Constructor(resolved), c.clone(), 1)
            }
            Payload::Callable(c) => (CallTarget::Function(resolved), c.clone(), 0),
            Payload::Method { function, instance } => {
                let c = graph
                    .callable(*function)
                    .cloned()
                    .ok_or_else(|| CompileError::logic("method without function"))?;
                (CallTarget::Method { function: *function, instance: *instance }, c, 1)
            }
            _ => {
                return Err(CompileError::unsupported(
                    format!("{} is not callable", graph.describe(resolved)),
                    loc,
                ));
            }
        };

        let slots = callable.params.len().saturating_sub(offset);
        if pos_args.len() > slots {
            return Err(CompileError::unsupported(
                format!(
                    "`{}` takes {slots} argument(s) but {} were given",
                    callable.name,
                    pos_args.len()
                ),
                loc,
            ));
        }
        let mut bound: Vec<Option<NodeId>> = vec![None; slots];
        let mut bindings = Vec::with_capacity(pos_args.len() + kw_args.len());
        for (i, arg) in pos_args.into_iter().enumerate() {
            bound[i] = Some(arg);
            bindings.push(offset + i);
        }
        for (name, value) in kw_args {
            let idx = callable
                .param_names
                .get(offset..)
                .unwrap_or_default()
                .iter()
                .position(|p| *p == name)
                .ok_or_else(|| {
                    CompileError::unsupported(
                        format!("`{}` has no parameter named `{name}`", callable.name),
                        loc.clone(),
                    )
                })?;
            if bound[idx].is_some() {
                return Err(CompileError::unsupported(
                    format!("argument `{name}` of `{}` given more than once", callable.name),
                    loc,
                ));
            }
            bound[idx] = Some(value);
            bindings.push(offset + idx);
        }
        if let Some(missing) = bound.iter().position(Option::is_none) {
            return Err(CompileError::unsupported(
                format!(
                    "call to `{}` is missing argument `{}`",
                    callable.name,
                    callable.param_names[offset + missing]
                ),
                loc,
            ));
        }

        let graph = self.registry.graph_mut();
        for (i, arg) in bound.into_iter().enumerate() {
            if let Some(arg) = arg {
                graph.add_candidate(callable.params[offset + i], arg)?;
            }
        }
        let result = callable.call_result;
        self.scan.calls.insert(
            ins.offset,
            CallSite { target, bindings, keywords, result },
        );
        self.push_site(ins.offset, result);
        Ok(())
    }
}

/// Resolve a global name: module namespace first, then the builtin table.
pub fn lookup_global(
    meta: &dyn Metadata,
    module: ModuleId,
    name: &str,
) -> Result<Option<Object>, CompileError> {
    let module = meta.module(module)?;
    Ok(module.globals.get(name).cloned().or_else(|| meta.builtin(name)))
}

impl OpcodeVisitor for Scanner<'_> {
    fn enter_block(&mut self, _offset: u32) -> Result<(), CompileError> {
        Ok(())
    }

    fn visit(&mut self, ins: &Instruction, walk: &mut Walk) -> Result<Action, CompileError> {
        tracing::trace!(offset = ins.offset, opcode = %ins.opcode, arg = ins.arg, "scan");
        match ins.opcode {
            Opcode::Nop | Opcode::PopBlock => {}
            Opcode::PopTop => {
                self.pop(ins)?;
            }
            Opcode::DupTop => {
                let top = self.pop(ins)?;
                self.stack.push(top.clone());
                self.stack.push(top);
            }
            Opcode::RotTwo => {
                let a = self.pop(ins)?;
                let b = self.pop(ins)?;
                self.stack.push(a);
                self.stack.push(b);
            }
            Opcode::LoadFast => {
                let node = self.local(ins.arg, ins.offset)?;
                self.push(node);
            }
            Opcode::StoreFast => {
                let value = self.pop(ins)?.node;
                let node = self.local(ins.arg, ins.offset)?;
                self.registry.graph_mut().add_candidate(node, value)?;
            }
            Opcode::LoadConst => self.load_const(ins)?,
            Opcode::LoadGlobal => self.load_global(ins)?,
            Opcode::LoadAttr => self.load_attr(ins)?,
            Opcode::StoreAttr => self.store_attr(ins)?,
            Opcode::CallFunction => self.call(ins)?,
            Opcode::UnaryNegative => self.unary(ins, UnaryOp::Negative)?,
            Opcode::UnaryNot => self.unary(ins, UnaryOp::Not)?,
            Opcode::UnaryInvert => self.unary(ins, UnaryOp::Invert)?,
            Opcode::CompareOp => {
                self.pop(ins)?;
                self.pop(ins)?;
                let node = self.registry.primitive(Kind::Boolean)?;
                self.push_site(ins.offset, node);
            }
            op if op.arith_op().is_some() => self.binary(ins)?,
            Opcode::ReturnValue => {
                let value = self.pop(ins)?.node;
                self.registry.graph_mut().add_candidate(self.body_return, value)?;
                self.ensure_empty_stack(ins.offset)?;
                return Ok(Action::Terminate);
            }
            Opcode::PopJumpIfFalse | Opcode::PopJumpIfTrue => {
                self.pop(ins)?;
                self.ensure_empty_stack(ins.offset)?;
                walk.branch_to(ins.next);
                walk.branch_to(ins.arg);
                return Ok(Action::Terminate);
            }
            Opcode::JumpForward | Opcode::JumpAbsolute | Opcode::ContinueLoop => {
                self.ensure_empty_stack(ins.offset)?;
                if let Some(target) = ins.jump_target() {
                    walk.branch_to(target);
                }
                return Ok(Action::Terminate);
            }
            Opcode::SetupLoop => {
                if let Some(exit) = ins.jump_target() {
                    walk.branch_to(exit);
                }
            }
            Opcode::BreakLoop => {
                self.ensure_empty_stack(ins.offset)?;
                return Ok(Action::Terminate);
            }
            other => {
                tracing::warn!(
                    function = %self.code.name,
                    offset = ins.offset,
                    "skipped opcode {other}"
                );
            }
        }
        Ok(Action::Continue)
    }

    fn fall_through(&mut self, last: &Instruction, _next: u32) -> Result<(), CompileError> {
        self.ensure_empty_stack(last.offset)
    }
}
