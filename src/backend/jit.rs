//! In-memory execution. Each entry point gets a trampoline with the uniform
//! signature `fn(*const i64) -> i64` so callers never need to know the
//! native signature: arguments and the result travel as raw 64-bit words.

use cranelift_codegen::ir::{types, AbiParam, InstBuilder, MemFlags};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, Linkage, Module};

use crate::config::CompileOptions;
use crate::diagnostics::CompileError;
use crate::ir::{self, Type};

const TRAMPOLINE: &str = "__monoc_trampoline";

pub struct JitModule {
    module: JITModule,
    trampoline: *const u8,
    arity: usize,
}

impl JitModule {
    /// Compile every function of `module_ir` and a trampoline for `entry`.
    pub fn compile(
        module_ir: &ir::Module,
        entry: &str,
        options: &CompileOptions,
    ) -> Result<Self, CompileError> {
        let entry_fn = module_ir
            .function(entry)
            .ok_or_else(|| CompileError::logic(format!("entry `{entry}` not in module")))?;
        if entry_fn.params.contains(&Type::Ptr) {
            return Err(CompileError::codegen(format!(
                "`{entry}` takes an instance and cannot be called from the host"
            )));
        }

        let builder = JITBuilder::with_flags(&super::flag_pairs(options), default_libcall_names())
            .map_err(|e| CompileError::codegen(format!("JIT setup error: {e}")))?;
        let mut module = JITModule::new(builder);
        let ids = super::define_module(&mut module, module_ir)?;
        let entry_id = ids[entry];

        let pointer = module.target_config().pointer_type();
        let mut sig = module.make_signature();
        sig.params.push(AbiParam::new(pointer));
        sig.returns.push(AbiParam::new(types::I64));
        let tramp_id = module
            .declare_function(TRAMPOLINE, Linkage::Local, &sig)
            .map_err(|e| CompileError::codegen(format!("declare trampoline error: {e}")))?;

        let mut ctx = module.make_context();
        ctx.func.signature = sig;
        let mut fctx = FunctionBuilderContext::new();
        {
            let mut b = FunctionBuilder::new(&mut ctx.func, &mut fctx);
            let block = b.create_block();
            b.append_block_params_for_function_params(block);
            b.switch_to_block(block);
            let argv = b.block_params(block)[0];

            let mut args = Vec::with_capacity(entry_fn.params.len());
            for (i, ty) in entry_fn.params.iter().enumerate() {
                let word = b.ins().load(types::I64, MemFlags::trusted(), argv, (i * 8) as i32);
                let arg = match ty {
                    Type::I1 => b.ins().ireduce(types::I8, word),
                    Type::I32 => b.ins().ireduce(types::I32, word),
                    Type::F64 => b.ins().bitcast(types::F64, MemFlags::new(), word),
                    Type::I64 => word,
                    Type::Ptr | Type::Void => {
                        return Err(CompileError::logic(format!("unmarshalable parameter type {ty}")));
                    }
                };
                args.push(arg);
            }

            let callee = module.declare_func_in_func(entry_id, b.func);
            let call = b.ins().call(callee, &args);
            let result = b.inst_results(call).first().copied();
            let word = match (entry_fn.ret, result) {
                (Type::Void, _) | (_, None) => b.ins().iconst(types::I64, 0),
                (Type::I1, Some(v)) => b.ins().uextend(types::I64, v),
                (Type::I32, Some(v)) => b.ins().sextend(types::I64, v),
                (Type::F64, Some(v)) => b.ins().bitcast(types::I64, MemFlags::new(), v),
                (_, Some(v)) => v,
            };
            b.ins().return_(&[word]);
            b.seal_all_blocks();
            b.finalize();
        }
        module
            .define_function(tramp_id, &mut ctx)
            .map_err(|e| CompileError::codegen(format!("define trampoline error: {e:?}")))?;
        module.clear_context(&mut ctx);

        module
            .finalize_definitions()
            .map_err(|e| CompileError::codegen(format!("JIT finalize error: {e}")))?;
        let trampoline = module.get_finalized_function(tramp_id);
        tracing::debug!(entry, functions = module_ir.functions.len(), "jit ready");
        Ok(Self { module, trampoline, arity: entry_fn.params.len() })
    }

    /// Invoke the entry point with raw argument words.
    pub fn call(&self, args: &[i64]) -> Result<i64, CompileError> {
        if args.len() != self.arity {
            return Err(CompileError::codegen(format!(
                "entry point takes {} argument(s), got {}",
                self.arity,
                args.len()
            )));
        }
        // SAFETY: the trampoline was finalized with exactly this signature and
        // reads `arity` words from `args`.
        let f: extern "C" fn(*const i64) -> i64 = unsafe { std::mem::transmute(self.trampoline) };
        Ok(f(args.as_ptr()))
    }

    /// Release the executable memory. No function pointer obtained from this
    /// module may be used afterwards.
    pub fn free(self) {
        // SAFETY: `self` is consumed, so `call` can no longer reach the code.
        unsafe { self.module.free_memory() };
    }
}
