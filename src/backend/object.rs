use cranelift_module::default_libcall_names;
use cranelift_object::{ObjectBuilder, ObjectModule};

use crate::config::CompileOptions;
use crate::diagnostics::CompileError;
use crate::ir;

/// Emit a relocatable object for `options.target`. Every function is exported
/// under its mangled symbol name.
pub fn emit_object(module_ir: &ir::Module, options: &CompileOptions) -> Result<Vec<u8>, CompileError> {
    let flags = super::flags(options, true)?;
    let isa_builder = cranelift_codegen::isa::lookup_by_name(&options.target)
        .map_err(|e| CompileError::codegen(format!("unsupported target `{}`: {e}", options.target)))?;
    let isa = isa_builder
        .finish(flags)
        .map_err(|e| CompileError::codegen(format!("ISA error: {e}")))?;

    let builder = ObjectBuilder::new(isa, module_ir.name.as_str(), default_libcall_names())
        .map_err(|e| CompileError::codegen(format!("object builder error: {e}")))?;
    let mut module = ObjectModule::new(builder);
    super::define_module(&mut module, module_ir)?;

    let object = module.finish();
    let bytes = object.emit().map_err(|e| CompileError::codegen(format!("emit error: {e}")))?;
    tracing::debug!(target = %options.target, bytes = bytes.len(), "emitted object");
    Ok(bytes)
}
