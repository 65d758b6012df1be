//! Per-function IR generation, driven by the shared bytecode walker.

mod arith;

use crate::bytecode::walk::{walk_code, Action, OpcodeVisitor, Walk};
use crate::bytecode::{CompareOp, Instruction, Opcode, UnaryOp};
use crate::codegen::blocks::{BlockMap, LoopEvent};
use crate::codegen::layout::Layouts;
use crate::codegen::{runtime_type, Signature, Symbols};
use crate::diagnostics::CompileError;
use crate::infer::graph::NodeId;
use crate::infer::scanner::{lookup_global, AttrSite, CallTarget, CallSite};
use crate::infer::{FunctionScan, Kind, TypeRegistry};
use crate::ir::{self, Conversion, Cond, FunctionBuilder, Slot, Type};
use crate::location::SourceLocation;
use crate::program::{CodeObject, Metadata, ModuleId, Object};

/// One operand-stack value: its resolved type node and, for values that
/// exist at run time, the IR value holding it.
#[derive(Debug, Clone, Copy)]
struct Entry {
    node: NodeId,
    value: Option<ir::Value>,
    /// Instance pointer a bound method was loaded from.
    receiver: Option<ir::Value>,
}

pub struct FunctionLowering<'a> {
    meta: &'a dyn Metadata,
    registry: &'a TypeRegistry,
    symbols: &'a Symbols,
    layouts: &'a mut Layouts,
    scan: &'a FunctionScan,
    code: &'a CodeObject,
    module: ModuleId,
    signature: &'a Signature,
    builder: FunctionBuilder,
    blocks: BlockMap,
    current: u32,
    stack: Vec<Entry>,
    locals: Vec<Option<(Slot, Type)>>,
}

impl<'a> FunctionLowering<'a> {
    /// Sets up the `entry` block: one stack slot per runtime local, parameter
    /// spills, then a jump to the block at offset 0.
    pub fn new(
        meta: &'a dyn Metadata,
        registry: &'a TypeRegistry,
        symbols: &'a Symbols,
        layouts: &'a mut Layouts,
        scan: &'a FunctionScan,
        code: &'a CodeObject,
    ) -> Result<Self, CompileError> {
        let signature = symbols.signature(scan.node)?;
        let mut builder =
            FunctionBuilder::new(symbols.name(scan.node)?, &signature.ir_params(), signature.ret);
        let graph = registry.graph();

        let mut locals = Vec::with_capacity(scan.locals.len());
        for node in &scan.locals {
            let local = match node {
                Some(node) => runtime_type(graph, *node)?
                    .map(|ty| (builder.alloc_slot(ty.size(), ty.align()), ty)),
                None => None,
            };
            locals.push(local);
        }

        let mut ir_index = 0;
        for (i, param) in signature.params.iter().enumerate() {
            if param.is_none() {
                continue;
            }
            let value = builder.param(ir_index);
            ir_index += 1;
            if let Some(Some((slot, _))) = locals.get(i) {
                builder.store_slot(*slot, value);
            }
        }

        let mut blocks = BlockMap::new();
        let body = blocks.block_at(&mut builder, 0);
        builder.jump(body)?;

        Ok(Self {
            meta,
            registry,
            symbols,
            layouts,
            scan,
            code,
            module: meta.function(scan.id)?.module,
            signature,
            builder,
            blocks,
            current: 0,
            stack: Vec::new(),
            locals,
        })
    }

    pub fn lower(mut self) -> Result<ir::Function, CompileError> {
        tracing::info!(function = %self.builder.name(), "generating");
        let code = self.code;
        walk_code(&code.code, &mut self)?;
        for (from, exit) in self.blocks.resolve_breaks()? {
            let source = self
                .blocks
                .get(from)
                .map(|b| b.block)
                .ok_or_else(|| CompileError::logic(format!("break block {from} vanished")))?;
            let target = self.blocks.block_at(&mut self.builder, exit);
            self.builder.switch_to(source);
            self.builder.jump(target)?;
        }
        self.builder.finish()
    }

    fn location(&self, offset: u32, detail: impl Into<String>) -> SourceLocation {
        SourceLocation::new(
            &self.code.name,
            &self.code.filename,
            self.code.line_for(offset),
            detail,
        )
    }

    fn push(&mut self, node: NodeId, value: Option<ir::Value>) {
        self.stack.push(Entry { node, value, receiver: None });
    }

    fn pop(&mut self, ins: &Instruction) -> Result<Entry, CompileError> {
        self.stack.pop().ok_or_else(|| {
            CompileError::logic(format!(
                "value stack underflow at {} offset {} in `{}`",
                ins.opcode, ins.offset, self.code.name
            ))
        })
    }

    fn site(&self, offset: u32) -> Result<NodeId, CompileError> {
        let node = self.scan.sites.get(&offset).copied().ok_or_else(|| {
            CompileError::logic(format!("no scanned value at offset {offset} in `{}`", self.code.name))
        })?;
        self.registry.graph().require_concrete(node)
    }

    fn value_type(&self, node: NodeId) -> Result<Type, CompileError> {
        runtime_type(self.registry.graph(), node)?.ok_or_else(|| {
            CompileError::logic(format!("{node} has no runtime type in `{}`", self.code.name))
        })
    }

    fn value_of(&self, entry: &Entry, offset: u32) -> Result<ir::Value, CompileError> {
        entry.value.ok_or_else(|| {
            let graph = self.registry.graph();
            CompileError::unsupported(
                format!("a {} cannot be used as a runtime value", graph.describe(entry.node)),
                self.location(offset, "operand"),
            )
        })
    }

    /// Widen `value` to `to` (`i1 -> i32 -> f64`).
    fn coerce(&mut self, value: ir::Value, to: Type) -> Result<ir::Value, CompileError> {
        let from = self.builder.value_type(value);
        Ok(match (from, to) {
            _ if from == to => value,
            (Type::I1, Type::I32) => self.builder.convert(Conversion::Zext, value),
            (Type::I1, Type::F64) => {
                let wide = self.builder.convert(Conversion::Zext, value);
                self.builder.convert(Conversion::SIToF, wide)
            }
            (Type::I32, Type::F64) => self.builder.convert(Conversion::SIToF, value),
            _ => {
                return Err(CompileError::logic(format!(
                    "cannot convert {from} to {to} in `{}`",
                    self.code.name
                )));
            }
        })
    }

    /// `i1` truth value of a condition.
    fn truth(&mut self, value: ir::Value) -> ir::Value {
        match self.builder.value_type(value) {
            Type::I1 => value,
            Type::F64 => {
                let zero = self.builder.fconst(0.0);
                self.builder.cmp(Cond::Ne, value, zero)
            }
            Type::Ptr => self.builder.iconst(Type::I1, 1),
            ty => {
                let zero = self.builder.iconst(ty, 0);
                self.builder.cmp(Cond::Ne, value, zero)
            }
        }
    }

    fn constant(&mut self, object: &Object, offset: u32) -> Result<Option<ir::Value>, CompileError> {
        Ok(match object {
            Object::Int(i) => {
                let narrow = i32::try_from(*i).map_err(|_| {
                    CompileError::unsupported(
                        format!("integer constant {i} does not fit in 32 bits"),
                        self.location(offset, "constant"),
                    )
                })?;
                Some(self.builder.iconst(Type::I32, i64::from(narrow)))
            }
            Object::Bool(b) => Some(self.builder.iconst(Type::I1, i64::from(*b))),
            Object::Float(f) => Some(self.builder.fconst(*f)),
            _ => None,
        })
    }

    fn load_fast(&mut self, ins: &Instruction) -> Result<(), CompileError> {
        let node = self
            .scan
            .locals
            .get(ins.arg as usize)
            .copied()
            .flatten()
            .ok_or_else(|| CompileError::logic(format!("local {} was never scanned", ins.arg)))?;
        let node = self.registry.graph().require_concrete(node)?;
        let value = match self.locals[ins.arg as usize] {
            Some((slot, ty)) => Some(self.builder.load_slot(ty, slot)),
            None => None,
        };
        self.push(node, value);
        Ok(())
    }

    fn store_fast(&mut self, ins: &Instruction) -> Result<(), CompileError> {
        let entry = self.pop(ins)?;
        if let Some(Some((slot, ty))) = self.locals.get(ins.arg as usize).copied() {
            let value = self.value_of(&entry, ins.offset)?;
            let value = self.coerce(value, ty)?;
            self.builder.store_slot(slot, value);
        }
        Ok(())
    }

    fn load_const(&mut self, ins: &Instruction) -> Result<(), CompileError> {
        let node = self.site(ins.offset)?;
        let object = self.code.consts.get(ins.arg as usize).ok_or_else(|| {
            CompileError::logic(format!("constant index {} out of range", ins.arg))
        })?;
        let value = self.constant(object, ins.offset)?;
        self.push(node, value);
        Ok(())
    }

    fn load_global(&mut self, ins: &Instruction) -> Result<(), CompileError> {
        let node = self.site(ins.offset)?;
        let name = self.code.names.get(ins.arg as usize).ok_or_else(|| {
            CompileError::logic(format!("name index {} out of range", ins.arg))
        })?;
        let object = lookup_global(self.meta, self.module, name)?
            .ok_or_else(|| CompileError::logic(format!("global `{name}` disappeared")))?;
        let value = self.constant(&object, ins.offset)?;
        self.push(node, value);
        Ok(())
    }

    fn binary(&mut self, ins: &Instruction) -> Result<(), CompileError> {
        let op = ins
            .opcode
            .arith_op()
            .ok_or_else(|| CompileError::logic(format!("{} is not arithmetic", ins.opcode)))?;
        let rhs = self.pop(ins)?;
        let lhs = self.pop(ins)?;
        let node = self.site(ins.offset)?;
        let ty = self.value_type(node)?;
        let l = self.value_of(&lhs, ins.offset)?;
        let l = self.coerce(l, ty)?;
        let r = self.value_of(&rhs, ins.offset)?;
        let r = self.coerce(r, ty)?;
        let value = arith::binary(&mut self.builder, op, l, r, ty);
        self.push(node, Some(value));
        Ok(())
    }

    fn unary(&mut self, ins: &Instruction, op: UnaryOp) -> Result<(), CompileError> {
        let operand = self.pop(ins)?;
        let node = self.site(ins.offset)?;
        let value = self.value_of(&operand, ins.offset)?;
        let result = match op {
            UnaryOp::Not => {
                let truth = self.truth(value);
                let no = self.builder.iconst(Type::I1, 0);
                self.builder.cmp(Cond::Eq, truth, no)
            }
            UnaryOp::Negative => {
                let ty = self.value_type(node)?;
                let value = self.coerce(value, ty)?;
                let neg = if ty == Type::F64 { ir::UnaryOp::FNeg } else { ir::UnaryOp::INeg };
                self.builder.unary(neg, value)
            }
            UnaryOp::Invert => {
                let value = self.coerce(value, Type::I32)?;
                self.builder.unary(ir::UnaryOp::BNot, value)
            }
        };
        self.push(node, Some(result));
        Ok(())
    }

    fn compare(&mut self, ins: &Instruction) -> Result<(), CompileError> {
        let op = CompareOp::from_arg(ins.arg)
            .ok_or_else(|| CompileError::logic(format!("invalid comparison {}", ins.arg)))?;
        let cond = arith::compare_cond(op).ok_or_else(|| {
            CompileError::unsupported(
                format!("comparison `{}`", op.symbol()),
                self.location(ins.offset, "comparison"),
            )
        })?;
        let rhs = self.pop(ins)?;
        let lhs = self.pop(ins)?;
        let l = self.value_of(&lhs, ins.offset)?;
        let r = self.value_of(&rhs, ins.offset)?;
        let (lt, rt) = (self.builder.value_type(l), self.builder.value_type(r));
        let ty = arith::compare_type(lt, rt).ok_or_else(|| {
            CompileError::unsupported(
                format!("`{}` between {lt} and {rt}", op.symbol()),
                self.location(ins.offset, "comparison"),
            )
        })?;
        let l = self.coerce(l, ty)?;
        let r = self.coerce(r, ty)?;
        let value = self.builder.cmp(cond, l, r);
        let node = self.site(ins.offset)?;
        self.push(node, Some(value));
        Ok(())
    }

    fn jump_target(&self, ins: &Instruction) -> Result<u32, CompileError> {
        ins.jump_target()
            .ok_or_else(|| CompileError::logic(format!("{} has no jump target", ins.opcode)))
    }

    fn conditional_jump(
        &mut self,
        ins: &Instruction,
        walk: &mut Walk,
        jump_if: bool,
    ) -> Result<Action, CompileError> {
        let cond = self.pop(ins)?;
        let value = self.value_of(&cond, ins.offset)?;
        let truth = self.truth(value);
        let target_offset = self.jump_target(ins)?;
        let target = self.blocks.block_at(&mut self.builder, target_offset);
        let next = self.blocks.block_at(&mut self.builder, ins.next);
        self.blocks.add_edge(self.current, target_offset)?;
        self.blocks.add_edge(self.current, ins.next)?;
        if jump_if {
            self.builder.branch(truth, target, next)?;
        } else {
            self.builder.branch(truth, next, target)?;
        }
        walk.branch_to(ins.next);
        walk.branch_to(target_offset);
        Ok(Action::Terminate)
    }

    fn jump(&mut self, ins: &Instruction, walk: &mut Walk) -> Result<Action, CompileError> {
        let target_offset = self.jump_target(ins)?;
        let target = self.blocks.block_at(&mut self.builder, target_offset);
        self.blocks.add_edge(self.current, target_offset)?;
        self.builder.jump(target)?;
        walk.branch_to(target_offset);
        Ok(Action::Terminate)
    }

    fn ret(&mut self, ins: &Instruction) -> Result<Action, CompileError> {
        let entry = self.pop(ins)?;
        let ret = self.signature.ret;
        if ret == Type::Void {
            self.builder.ret(None)?;
        } else {
            let value = self.value_of(&entry, ins.offset)?;
            let value = self.coerce(value, ret)?;
            self.builder.ret(Some(value))?;
        }
        Ok(Action::Terminate)
    }

    fn load_attr(&mut self, ins: &Instruction) -> Result<(), CompileError> {
        let owner = self.pop(ins)?;
        let scan = self.scan;
        let site = scan.attributes.get(&ins.offset).ok_or_else(|| {
            CompileError::logic(format!("no attribute site at offset {}", ins.offset))
        })?;
        let registry = self.registry;
        let graph = registry.graph();
        match site {
            AttrSite::Field { instance, name, node } => {
                let (ty, offset) = self.field(*instance, name)?;
                let addr = self.value_of(&owner, ins.offset)?;
                let value = self.builder.load(ty, addr, offset);
                let node = graph.require_concrete(*node)?;
                self.push(node, Some(value));
            }
            AttrSite::Static { node, value } => {
                let node = graph.require_concrete(*node)?;
                let receiver = if graph.node(node).kind == Kind::Method { owner.value } else { None };
                let value = self.constant(value, ins.offset)?;
                self.stack.push(Entry { node, value, receiver });
            }
        }
        Ok(())
    }

    fn store_attr(&mut self, ins: &Instruction) -> Result<(), CompileError> {
        let owner = self.pop(ins)?;
        let entry = self.pop(ins)?;
        let scan = self.scan;
        let Some(AttrSite::Field { instance, name, .. }) = scan.attributes.get(&ins.offset) else {
            return Err(CompileError::logic(format!("no field site at offset {}", ins.offset)));
        };
        let (ty, offset) = self.field(*instance, name)?;
        let addr = self.value_of(&owner, ins.offset)?;
        let value = self.value_of(&entry, ins.offset)?;
        let value = self.coerce(value, ty)?;
        self.builder.store(addr, offset, value);
        Ok(())
    }

    fn field(&mut self, instance: NodeId, name: &str) -> Result<(Type, u32), CompileError> {
        let layout = self.layouts.get(self.registry.graph(), instance)?;
        let field = layout.field(name).ok_or_else(|| {
            CompileError::logic(format!("`{}` has no field `{name}`", layout.class_name))
        })?;
        Ok((field.ty, field.offset))
    }

    /// Arguments for `signature`, in parameter order. `first` fills
    /// parameter 0 for constructors and bound methods.
    fn call_args(
        &mut self,
        signature: &Signature,
        by_param: &[Option<Entry>],
        first: Option<ir::Value>,
        offset: u32,
    ) -> Result<Vec<ir::Value>, CompileError> {
        let mut args = Vec::with_capacity(signature.params.len());
        for (i, ty) in signature.params.iter().enumerate() {
            let Some(ty) = *ty else { continue };
            let value = match (i, first) {
                (0, Some(first)) => first,
                _ => {
                    let entry = by_param.get(i).copied().flatten().ok_or_else(|| {
                        CompileError::logic(format!("argument {i} unbound at offset {offset}"))
                    })?;
                    self.value_of(&entry, offset)?
                }
            };
            args.push(self.coerce(value, ty)?);
        }
        Ok(args)
    }

    fn call(&mut self, ins: &Instruction) -> Result<(), CompileError> {
        let scan = self.scan;
        let site: &CallSite = scan.calls.get(&ins.offset).ok_or_else(|| {
            CompileError::logic(format!("no call site at offset {}", ins.offset))
        })?;
        let (positional, keywords) = ins.call_counts();
        let depth = positional + 2 * keywords;
        if self.stack.len() < depth + 1 {
            return Err(CompileError::logic(format!(
                "value stack underflow at call offset {} in `{}`",
                ins.offset, self.code.name
            )));
        }
        let items = self.stack.split_off(self.stack.len() - depth);
        let callee = self.pop(ins)?;
        let args = items[..positional]
            .iter()
            .chain(items[positional..].chunks(2).filter_map(|pair| pair.get(1)));

        let registry = self.registry;
        let graph = registry.graph();
        let callable_node = match site.target {
            CallTarget::Function(node) | CallTarget::Constructor(node) => node,
            CallTarget::Method { function, .. } => function,
        };
        let callable = graph
            .callable(callable_node)
            .ok_or_else(|| CompileError::logic(format!("{callable_node} is not callable")))?;
        let mut by_param = vec![None; callable.params.len()];
        for (entry, &param) in args.zip(&site.bindings) {
            if let Some(slot) = by_param.get_mut(param) {
                *slot = Some(*entry);
            }
        }
        let symbols = self.symbols;

        match site.target {
            CallTarget::Function(function) => {
                let signature = symbols.signature(function)?;
                let args = self.call_args(signature, &by_param, None, ins.offset)?;
                let value = self.builder.call(symbols.name(function)?, args, signature.ret);
                let node = graph.require_concrete(site.result)?;
                self.push(node, value);
            }
            CallTarget::Method { function, .. } => {
                let receiver = callee.receiver.ok_or_else(|| {
                    CompileError::logic(format!("method call at offset {} has no receiver", ins.offset))
                })?;
                let signature = symbols.signature(function)?;
                let args = self.call_args(signature, &by_param, Some(receiver), ins.offset)?;
                let value = self.builder.call(symbols.name(function)?, args, signature.ret);
                let node = graph.require_concrete(site.result)?;
                self.push(node, value);
            }
            CallTarget::Constructor(_) => {
                let instance = callable.call_result;
                let (size, align) = {
                    let layout = self.layouts.get(graph, instance)?;
                    (layout.size, layout.align)
                };
                let slot = self.builder.alloc_slot(size, align);
                let ptr = self.builder.slot_addr(slot);
                if let Some(init) = callable.init {
                    let signature = symbols.signature(init)?;
                    let args = self.call_args(signature, &by_param, Some(ptr), ins.offset)?;
                    self.builder.call(symbols.name(init)?, args, Type::Void);
                }
                self.push(instance, Some(ptr));
            }
        }
        Ok(())
    }
}

impl OpcodeVisitor for FunctionLowering<'_> {
    fn enter_block(&mut self, offset: u32) -> Result<(), CompileError> {
        if !self.stack.is_empty() {
            return Err(CompileError::logic(format!(
                "{} value(s) left on the stack entering block {offset}",
                self.stack.len()
            )));
        }
        let block = self.blocks.block_at(&mut self.builder, offset);
        tracing::debug!(function = %self.code.name, offset, "switch to block");
        self.builder.switch_to(block);
        self.current = offset;
        Ok(())
    }

    fn visit(&mut self, ins: &Instruction, walk: &mut Walk) -> Result<Action, CompileError> {
        tracing::trace!(offset = ins.offset, opcode = %ins.opcode, arg = ins.arg, "lower");
        match ins.opcode {
            Opcode::Nop => {}
            Opcode::PopTop => {
                self.pop(ins)?;
            }
            Opcode::DupTop => {
                let top = self.pop(ins)?;
                self.stack.push(top);
                self.stack.push(top);
            }
            Opcode::RotTwo => {
                let a = self.pop(ins)?;
                let b = self.pop(ins)?;
                self.stack.push(a);
                self.stack.push(b);
            }
            Opcode::LoadFast => self.load_fast(ins)?,
            Opcode::StoreFast => self.store_fast(ins)?,
            Opcode::LoadConst => self.load_const(ins)?,
            Opcode::LoadGlobal => self.load_global(ins)?,
            Opcode::LoadAttr => self.load_attr(ins)?,
            Opcode::StoreAttr => self.store_attr(ins)?,
            Opcode::CallFunction => self.call(ins)?,
            Opcode::UnaryNegative => self.unary(ins, UnaryOp::Negative)?,
            Opcode::UnaryNot => self.unary(ins, UnaryOp::Not)?,
            Opcode::UnaryInvert => self.unary(ins, UnaryOp::Invert)?,
            Opcode::CompareOp => self.compare(ins)?,
            op if op.arith_op().is_some() => self.binary(ins)?,
            Opcode::ReturnValue => return self.ret(ins),
            Opcode::PopJumpIfFalse => return self.conditional_jump(ins, walk, false),
            Opcode::PopJumpIfTrue => return self.conditional_jump(ins, walk, true),
            Opcode::JumpForward | Opcode::JumpAbsolute | Opcode::ContinueLoop => {
                return self.jump(ins, walk);
            }
            Opcode::SetupLoop => {
                let exit = self.jump_target(ins)?;
                self.blocks.block_at(&mut self.builder, exit);
                self.blocks.record(self.current, LoopEvent::Setup { exit })?;
                walk.branch_to(exit);
            }
            Opcode::PopBlock => self.blocks.record(self.current, LoopEvent::PopBlock)?,
            Opcode::BreakLoop => {
                self.blocks.mark_break(self.current)?;
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

    fn fall_through(&mut self, _last: &Instruction, next: u32) -> Result<(), CompileError> {
        let target = self.blocks.block_at(&mut self.builder, next);
        self.blocks.add_edge(self.current, next)?;
        self.builder.jump(target)
    }
}
