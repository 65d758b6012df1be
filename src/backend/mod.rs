//! Cranelift backend: translates `ir::Module` into machine code, either in
//! memory ([`jit`]) or as a relocatable object file ([`object`]).

pub mod jit;
pub mod object;

use std::collections::HashMap;

use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{
    types, AbiParam, InstBuilder, MemFlags, Signature, StackSlotData, StackSlotKind,
};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_module::{FuncId, Linkage, Module};

use crate::config::CompileOptions;
use crate::diagnostics::CompileError;
use crate::ir::{self, BinaryOp, Cond, Conversion, Inst, Terminator, Type, UnaryOp};

/// Cranelift flag pairs derived from the compile options.
pub fn flag_pairs(options: &CompileOptions) -> Vec<(&'static str, &'static str)> {
    vec![
        ("opt_level", options.opt_level.as_cranelift()),
        ("enable_verifier", if options.verify { "true" } else { "false" }),
    ]
}

pub fn flags(options: &CompileOptions, pic: bool) -> Result<settings::Flags, CompileError> {
    let mut builder = settings::builder();
    for (name, value) in flag_pairs(options) {
        builder
            .set(name, value)
            .map_err(|e| CompileError::codegen(format!("invalid setting {name}={value}: {e}")))?;
    }
    builder
        .set("is_pic", if pic { "true" } else { "false" })
        .map_err(|e| CompileError::codegen(format!("invalid setting is_pic: {e}")))?;
    Ok(settings::Flags::new(builder))
}

fn clif_type(ty: Type, pointer: types::Type) -> Option<types::Type> {
    match ty {
        Type::I1 => Some(types::I8),
        Type::I32 => Some(types::I32),
        Type::I64 => Some(types::I64),
        Type::F64 => Some(types::F64),
        Type::Ptr => Some(pointer),
        Type::Void => None,
    }
}

pub fn signature(module: &impl Module, func: &ir::Function) -> Signature {
    let pointer = module.target_config().pointer_type();
    let mut sig = module.make_signature();
    for ty in &func.params {
        if let Some(t) = clif_type(*ty, pointer) {
            sig.params.push(AbiParam::new(t));
        }
    }
    if let Some(t) = clif_type(func.ret, pointer) {
        sig.returns.push(AbiParam::new(t));
    }
    sig
}

/// Declare and define every function of `ir`. Returns symbol -> id.
pub fn define_module<M: Module>(
    module: &mut M,
    ir: &ir::Module,
) -> Result<HashMap<String, FuncId>, CompileError> {
    let mut ids = HashMap::with_capacity(ir.functions.len());
    for func in &ir.functions {
        let sig = signature(module, func);
        let id = module
            .declare_function(&func.name, Linkage::Export, &sig)
            .map_err(|e| CompileError::codegen(format!("declare function `{}` error: {e}", func.name)))?;
        ids.insert(func.name.clone(), id);
    }

    let mut ctx = module.make_context();
    let mut builder_ctx = FunctionBuilderContext::new();
    for func in &ir.functions {
        ctx.func.signature = signature(module, func);
        {
            let builder = FunctionBuilder::new(&mut ctx.func, &mut builder_ctx);
            lower_function(func, builder, module, &ids)?;
        }
        let id = ids[&func.name];
        module.define_function(id, &mut ctx).map_err(|e| {
            CompileError::codegen(format!("define function `{}` error: {e:?}", func.name))
        })?;
        module.clear_context(&mut ctx);
    }
    Ok(ids)
}

/// Immediate for `iconst` of a narrow type: Cranelift wants the bit pattern
/// zero-extended, not sign-extended.
fn narrow_imm(ty: types::Type, value: i64) -> i64 {
    match ty.bits() {
        8 => value & 0xff,
        32 => i64::from(value as i32 as u32),
        _ => value,
    }
}

fn int_cc(cond: Cond) -> IntCC {
    match cond {
        Cond::Eq => IntCC::Equal,
        Cond::Ne => IntCC::NotEqual,
        Cond::Lt => IntCC::SignedLessThan,
        Cond::Le => IntCC::SignedLessThanOrEqual,
        Cond::Gt => IntCC::SignedGreaterThan,
        Cond::Ge => IntCC::SignedGreaterThanOrEqual,
    }
}

fn float_cc(cond: Cond) -> FloatCC {
    match cond {
        Cond::Eq => FloatCC::Equal,
        Cond::Ne => FloatCC::NotEqual,
        Cond::Lt => FloatCC::LessThan,
        Cond::Le => FloatCC::LessThanOrEqual,
        Cond::Gt => FloatCC::GreaterThan,
        Cond::Ge => FloatCC::GreaterThanOrEqual,
    }
}

fn lower_function<M: Module>(
    func: &ir::Function,
    mut builder: FunctionBuilder<'_>,
    module: &mut M,
    ids: &HashMap<String, FuncId>,
) -> Result<(), CompileError> {
    let pointer = module.target_config().pointer_type();
    let blocks: Vec<_> = func.blocks.iter().map(|_| builder.create_block()).collect();
    let slots: Vec<_> = func
        .slots
        .iter()
        .map(|slot| {
            let shift = slot.align.trailing_zeros() as u8;
            builder.create_sized_stack_slot(StackSlotData::new(StackSlotKind::ExplicitSlot, slot.size, shift))
        })
        .collect();

    let mut values = vec![None; func.values.len()];
    let entry = blocks[0];
    builder.append_block_params_for_function_params(entry);
    let params = builder.block_params(entry).to_vec();
    for (slot, param) in values.iter_mut().zip(params) {
        *slot = Some(param);
    }

    let get = |values: &[Option<cranelift_codegen::ir::Value>], v: ir::Value| {
        values[v.index()].ok_or_else(|| {
            CompileError::logic(format!("{v} used before definition in `{}`", func.name))
        })
    };
    let ty_of = |v: ir::Value| clif_type(func.value_type(v), pointer);

    for (index, data) in func.blocks.iter().enumerate() {
        builder.switch_to_block(blocks[index]);
        for inst in &data.insts {
            match inst {
                Inst::IConst { dst, ty, value } => {
                    let t = clif_type(*ty, pointer)
                        .ok_or_else(|| CompileError::logic("void constant"))?;
                    values[dst.index()] = Some(builder.ins().iconst(t, narrow_imm(t, *value)));
                }
                Inst::FConst { dst, value } => {
                    values[dst.index()] = Some(builder.ins().f64const(*value));
                }
                Inst::Binary { dst, op, lhs, rhs } => {
                    let (l, r) = (get(&values, *lhs)?, get(&values, *rhs)?);
                    let ins = builder.ins();
                    let v = match op {
                        BinaryOp::IAdd => ins.iadd(l, r),
                        BinaryOp::ISub => ins.isub(l, r),
                        BinaryOp::IMul => ins.imul(l, r),
                        BinaryOp::SDiv => ins.sdiv(l, r),
                        BinaryOp::SRem => ins.srem(l, r),
                        BinaryOp::FAdd => ins.fadd(l, r),
                        BinaryOp::FSub => ins.fsub(l, r),
                        BinaryOp::FMul => ins.fmul(l, r),
                        BinaryOp::FDiv => ins.fdiv(l, r),
                    };
                    values[dst.index()] = Some(v);
                }
                Inst::Unary { dst, op, arg } => {
                    let a = get(&values, *arg)?;
                    let ins = builder.ins();
                    let v = match op {
                        UnaryOp::INeg => ins.ineg(a),
                        UnaryOp::FNeg => ins.fneg(a),
                        UnaryOp::BNot => ins.bnot(a),
                        UnaryOp::Floor => ins.floor(a),
                    };
                    values[dst.index()] = Some(v);
                }
                Inst::Cmp { dst, cond, lhs, rhs } => {
                    let (l, r) = (get(&values, *lhs)?, get(&values, *rhs)?);
                    let v = if func.value_type(*lhs) == Type::F64 {
                        builder.ins().fcmp(float_cc(*cond), l, r)
                    } else {
                        builder.ins().icmp(int_cc(*cond), l, r)
                    };
                    values[dst.index()] = Some(v);
                }
                Inst::Select { dst, cond, then, otherwise } => {
                    let c = get(&values, *cond)?;
                    let (t, o) = (get(&values, *then)?, get(&values, *otherwise)?);
                    values[dst.index()] = Some(builder.ins().select(c, t, o));
                }
                Inst::Convert { dst, op, arg } => {
                    let a = get(&values, *arg)?;
                    let v = match op {
                        Conversion::Zext => builder.ins().uextend(types::I32, a),
                        Conversion::SIToF => builder.ins().fcvt_from_sint(types::F64, a),
                    };
                    values[dst.index()] = Some(v);
                }
                Inst::LoadSlot { dst, slot } => {
                    let t = ty_of(*dst).ok_or_else(|| CompileError::logic("void load"))?;
                    values[dst.index()] = Some(builder.ins().stack_load(t, slots[slot.index()], 0));
                }
                Inst::StoreSlot { slot, value } => {
                    let v = get(&values, *value)?;
                    builder.ins().stack_store(v, slots[slot.index()], 0);
                }
                Inst::SlotAddr { dst, slot } => {
                    values[dst.index()] = Some(builder.ins().stack_addr(pointer, slots[slot.index()], 0));
                }
                Inst::Load { dst, addr, offset } => {
                    let t = ty_of(*dst).ok_or_else(|| CompileError::logic("void load"))?;
                    let a = get(&values, *addr)?;
                    values[dst.index()] =
                        Some(builder.ins().load(t, MemFlags::trusted(), a, *offset as i32));
                }
                Inst::Store { addr, offset, value } => {
                    let (a, v) = (get(&values, *addr)?, get(&values, *value)?);
                    builder.ins().store(MemFlags::trusted(), v, a, *offset as i32);
                }
                Inst::Call { dst, callee, args } => {
                    let id = ids.get(callee).ok_or_else(|| {
                        CompileError::logic(format!("call to undeclared function `{callee}`"))
                    })?;
                    let func_ref = module.declare_func_in_func(*id, builder.func);
                    let args = args
                        .iter()
                        .map(|a| get(&values, *a))
                        .collect::<Result<Vec<_>, _>>()?;
                    let call = builder.ins().call(func_ref, &args);
                    if let Some(dst) = dst {
                        let result = builder.inst_results(call).first().copied().ok_or_else(|| {
                            CompileError::logic(format!("`{callee}` returns no value"))
                        })?;
                        values[dst.index()] = Some(result);
                    }
                }
            }
        }
        match &data.terminator {
            Some(Terminator::Jump(target)) => {
                builder.ins().jump(blocks[target.index()], &[]);
            }
            Some(Terminator::Branch { cond, then, otherwise }) => {
                let c = get(&values, *cond)?;
                builder.ins().brif(c, blocks[then.index()], &[], blocks[otherwise.index()], &[]);
            }
            Some(Terminator::Return(Some(v))) => {
                let v = get(&values, *v)?;
                builder.ins().return_(&[v]);
            }
            Some(Terminator::Return(None)) => {
                builder.ins().return_(&[]);
            }
            None => {
                return Err(CompileError::logic(format!(
                    "block `{}` of `{}` has no terminator",
                    data.name, func.name
                )));
            }
        }
    }
    builder.seal_all_blocks();
    builder.finalize();
    Ok(())
}
