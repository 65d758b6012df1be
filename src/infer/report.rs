use std::fmt;

use serde::Serialize;

use crate::diagnostics::CompileError;
use crate::infer::registry::TypeRegistry;
use crate::infer::scanner::FunctionScan;
use crate::program::Metadata;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionTypes {
    pub name: String,
    pub params: Vec<(String, String)>,
    pub returns: String,
    pub locals: Vec<(String, String)>,
}

/// Inferred parameter, return and local types of every scanned function.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TypeReport {
    pub functions: Vec<FunctionTypes>,
}

impl TypeReport {
    pub fn build(
        meta: &dyn Metadata,
        registry: &TypeRegistry,
        scans: &[FunctionScan],
    ) -> Result<Self, CompileError> {
        let graph = registry.graph();
        let mut functions = Vec::with_capacity(scans.len());
        for scan in scans {
            let code = &meta.function(scan.id)?.code;
            let callable = graph
                .callable(scan.node)
                .ok_or_else(|| CompileError::logic(format!("{} is not callable", scan.node)))?;
            let params = callable
                .param_names
                .iter()
                .zip(&callable.params)
                .map(|(name, &node)| (name.clone(), graph.describe(node)))
                .collect();
            let locals = scan
                .locals
                .iter()
                .enumerate()
                .skip(callable.params.len())
                .filter_map(|(i, node)| Some((code.varnames.get(i)?.clone(), graph.describe((*node)?))))
                .collect();
            functions.push(FunctionTypes {
                name: code.name.clone(),
                params,
                returns: graph.describe(callable.body_return),
                locals,
            });
        }
        Ok(Self { functions })
    }

    pub fn function(&self, name: &str) -> Option<&FunctionTypes> {
        self.functions.iter().find(|f| f.name == name)
    }
}

impl fmt::Display for TypeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for func in &self.functions {
            let params: Vec<String> = func.params.iter().map(|(n, t)| format!("{n}: {t}")).collect();
            writeln!(f, "def {}({}) -> {}", func.name, params.join(", "), func.returns)?;
            for (name, ty) in &func.locals {
                writeln!(f, "    {name}: {ty}")?;
            }
        }
        Ok(())
    }
}
