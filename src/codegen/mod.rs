//! IR generation for a fully inferred program.

pub mod blocks;
pub mod layout;
pub mod lower;

use std::collections::{HashMap, HashSet};

use crate::diagnostics::CompileError;
use crate::infer::graph::{CallableSource, NodeId, Payload};
use crate::infer::{FunctionScan, Kind, TypeGraph, TypeRegistry};
use crate::ir::{self, Type};
use crate::program::Metadata;
use layout::Layouts;
use lower::FunctionLowering;

/// Machine type of a resolved node. `None` for values that exist only at
/// compile time (functions, classes, methods, modules) and for `None` itself.
pub fn runtime_type(graph: &TypeGraph, node: NodeId) -> Result<Option<Type>, CompileError> {
    let concrete = graph.require_concrete(node)?;
    match graph.node(concrete).kind {
        Kind::Boolean => Ok(Some(Type::I1)),
        Kind::Integer => Ok(Some(Type::I32)),
        Kind::Float => Ok(Some(Type::F64)),
        Kind::Instance => Ok(Some(Type::Ptr)),
        Kind::None => Ok(None),
        kind if kind.is_static() => Ok(None),
        kind => {
            let location = graph.node(node).location.clone();
            Err(CompileError::unsupported(
                format!("{} has type {kind}, which has no compiled representation", location.detail),
                location,
            ))
        }
    }
}

/// Lowered signature of a function. Parameters without a runtime type are
/// not passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<Option<Type>>,
    pub ret: Type,
}

impl Signature {
    pub fn ir_params(&self) -> Vec<Type> {
        self.params.iter().flatten().copied().collect()
    }
}

/// Symbol name and signature of every scanned function.
#[derive(Debug, Default)]
pub struct Symbols {
    names: HashMap<NodeId, String>,
    signatures: HashMap<NodeId, Signature>,
}

fn sanitize(name: &str) -> String {
    name.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect()
}

impl Symbols {
    pub fn build(
        meta: &dyn Metadata,
        registry: &TypeRegistry,
        scans: &[FunctionScan],
    ) -> Result<Self, CompileError> {
        let graph = registry.graph();
        let mut initializers = HashMap::new();
        for id in graph.ids() {
            if let Payload::Callable(callable) = &graph.node(id).payload
                && let (CallableSource::Class(_), Some(init)) = (callable.source, callable.init)
            {
                initializers.insert(init, callable.name.clone());
            }
        }

        let mut symbols = Symbols::default();
        let mut taken = HashSet::new();
        for scan in scans {
            let def = meta.function(scan.id)?;
            let module = sanitize(&meta.module(def.module)?.name);
            let base = match initializers.get(&scan.node) {
                Some(class) => format!("{module}__{}____init__", sanitize(class)),
                None => format!("{module}__{}", sanitize(&def.code.name)),
            };
            let mut name = base.clone();
            let mut n = 1;
            while !taken.insert(name.clone()) {
                n += 1;
                name = format!("{base}_{n}");
            }
            let is_init = initializers.contains_key(&scan.node);
            symbols.signatures.insert(scan.node, signature(graph, scan.node, is_init)?);
            symbols.names.insert(scan.node, name);
        }
        Ok(symbols)
    }

    pub fn name(&self, function: NodeId) -> Result<&str, CompileError> {
        self.names
            .get(&function)
            .map(String::as_str)
            .ok_or_else(|| CompileError::logic(format!("function {function} was never scanned")))
    }

    pub fn signature(&self, function: NodeId) -> Result<&Signature, CompileError> {
        self.signatures
            .get(&function)
            .ok_or_else(|| CompileError::logic(format!("function {function} has no signature")))
    }
}

/// Initializers always return void, whatever their body returns.
fn signature(graph: &TypeGraph, function: NodeId, initializer: bool) -> Result<Signature, CompileError> {
    let callable = graph
        .callable(function)
        .ok_or_else(|| CompileError::logic(format!("{function} is not callable")))?;
    let params = callable
        .params
        .iter()
        .map(|&p| runtime_type(graph, p))
        .collect::<Result<Vec<_>, _>>()?;
    if initializer {
        return Ok(Signature { params, ret: Type::Void });
    }
    let ret = runtime_type(graph, callable.body_return)?.unwrap_or(Type::Void);
    if ret == Type::Ptr {
        // Instances live in the frame of the function that constructs them.
        return Err(CompileError::unsupported(
            format!("`{}` returns an instance", callable.name),
            graph.node(callable.body_return).location.clone(),
        ));
    }
    Ok(Signature { params, ret })
}

/// The generated module plus what a caller needs to invoke its entry point.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub module: ir::Module,
    pub entry: String,
    pub signature: Signature,
}

/// Generate IR for every scanned function; `scans[0]` is the entry point.
pub fn assemble(
    meta: &dyn Metadata,
    registry: &TypeRegistry,
    scans: &[FunctionScan],
) -> Result<Assembled, CompileError> {
    let entry_scan = scans.first().ok_or_else(|| CompileError::logic("no entry point scanned"))?;
    let symbols = Symbols::build(meta, registry, scans)?;
    let mut layouts = Layouts::new();
    let entry_def = meta.function(entry_scan.id)?;
    let mut module = ir::Module {
        name: meta.module(entry_def.module)?.name.clone(),
        functions: Vec::with_capacity(scans.len()),
    };
    for scan in scans {
        let code = &meta.function(scan.id)?.code;
        let lowering = FunctionLowering::new(meta, registry, &symbols, &mut layouts, scan, code)?;
        module.functions.push(lowering.lower()?);
    }
    Ok(Assembled {
        module,
        entry: symbols.name(entry_scan.node)?.to_string(),
        signature: symbols.signature(entry_scan.node)?.clone(),
    })
}
