pub mod backend;
pub mod bytecode;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod infer;
pub mod ir;
pub mod location;
pub mod program;
pub mod session;

use codegen::Signature;
use config::CompileOptions;
use diagnostics::CompileError;
use infer::TypeReport;
use ir::Type;
use program::{FunctionId, Metadata, Object};
use session::Session;

/// Output of a successful compile: the IR module plus what a host needs to
/// call its entry point.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub module: ir::Module,
    pub entry: String,
    pub signature: Signature,
    pub types: TypeReport,
}

/// Infer types for everything reachable from `entry` called with `args`, and
/// generate IR. Nothing is executed.
pub fn compile(
    meta: &dyn Metadata,
    entry: FunctionId,
    args: &[Object],
    options: &CompileOptions,
) -> Result<Compiled, CompileError> {
    let mut session = Session::new(meta, options.clone());
    session.add_entry_point(entry, args)?;
    session.infer()?;
    let types = session.type_report()?;
    let assembled = session.assemble()?;
    Ok(Compiled {
        module: assembled.module,
        entry: assembled.entry,
        signature: assembled.signature,
        types,
    })
}

/// Compile `entry` with default options, run it in memory and return its result.
pub fn compile_and_run(meta: &dyn Metadata, entry: FunctionId, args: &[Object]) -> Result<Object, CompileError> {
    let options = CompileOptions::default();
    let compiled = compile(meta, entry, args, &options)?;
    run(&compiled, args, &options)
}

/// JIT-compile an already compiled module and call its entry point.
pub fn run(compiled: &Compiled, args: &[Object], options: &CompileOptions) -> Result<Object, CompileError> {
    let words = marshal_args(&compiled.signature, args)?;
    let jit = backend::jit::JitModule::compile(&compiled.module, &compiled.entry, options)?;
    let word = jit.call(&words);
    jit.free();
    Ok(unmarshal(compiled.signature.ret, word?))
}

fn marshal_args(signature: &Signature, args: &[Object]) -> Result<Vec<i64>, CompileError> {
    if signature.params.len() != args.len() {
        return Err(CompileError::codegen(format!(
            "entry point takes {} argument(s), got {}",
            signature.params.len(),
            args.len()
        )));
    }
    let mut words = Vec::with_capacity(args.len());
    for (i, (ty, arg)) in signature.params.iter().zip(args).enumerate() {
        let Some(ty) = ty else { continue };
        let word = match (ty, arg) {
            (Type::I32, Object::Int(v)) => i64::from(*v as i32),
            (Type::I32 | Type::I1, Object::Bool(b)) => i64::from(*b),
            (Type::F64, Object::Float(v)) => v.to_bits() as i64,
            (Type::F64, Object::Int(v)) => (*v as f64).to_bits() as i64,
            (Type::F64, Object::Bool(b)) => (f64::from(u8::from(*b))).to_bits() as i64,
            (ty, arg) => {
                return Err(CompileError::codegen(format!(
                    "argument {i} of type {} cannot be passed as {ty}",
                    arg.type_name()
                )));
            }
        };
        words.push(word);
    }
    Ok(words)
}

fn unmarshal(ret: Type, word: i64) -> Object {
    match ret {
        Type::I1 => Object::Bool(word != 0),
        Type::F64 => Object::Float(f64::from_bits(word as u64)),
        Type::Void => Object::None,
        Type::I32 | Type::I64 | Type::Ptr => Object::Int(word),
    }
}
