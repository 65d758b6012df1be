//! One compile: owns the type registry and every scan result, and drives the
//! phases in order (scan to closure, resolve, assemble).

use std::collections::HashSet;

use crate::codegen::{self, Assembled};
use crate::config::CompileOptions;
use crate::diagnostics::CompileError;
use crate::infer::graph::CallableSource;
use crate::infer::resolve::{self, ResolveStats};
use crate::infer::scanner::scan_function;
use crate::infer::{FunctionScan, NodeId, TypeRegistry, TypeReport};
use crate::location::SourceLocation;
use crate::program::{FunctionId, Metadata, Object};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Collecting,
    Inferred,
}

pub struct Session<'a> {
    meta: &'a dyn Metadata,
    options: CompileOptions,
    registry: TypeRegistry,
    scans: Vec<FunctionScan>,
    scanned: HashSet<NodeId>,
    entry: Option<NodeId>,
    phase: Phase,
}

impl<'a> Session<'a> {
    pub fn new(meta: &'a dyn Metadata, options: CompileOptions) -> Self {
        Self {
            meta,
            options,
            registry: TypeRegistry::new(),
            scans: Vec::new(),
            scanned: HashSet::new(),
            entry: None,
            phase: Phase::Collecting,
        }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Register `function` as the entry point, with the types of `args` as
    /// the only candidates its parameters get from outside the program.
    pub fn add_entry_point(&mut self, function: FunctionId, args: &[Object]) -> Result<NodeId, CompileError> {
        if self.phase != Phase::Collecting {
            return Err(CompileError::logic("entry point added after inference"));
        }
        if self.entry.is_some() {
            return Err(CompileError::logic("session already has an entry point"));
        }
        let code = &self.meta.function(function)?.code;
        let here = SourceLocation::new(&code.name, &code.filename, code.first_line, "entry point");
        let node = self.registry.intern(self.meta, &Object::Function(function), here.clone())?;
        let params = self
            .registry
            .graph()
            .callable(node)
            .map(|c| c.params.clone())
            .ok_or_else(|| CompileError::logic(format!("{node} is not callable")))?;
        if params.len() != args.len() {
            return Err(CompileError::unsupported(
                format!("`{}` takes {} argument(s) but {} were given", code.name, params.len(), args.len()),
                here,
            ));
        }
        for (i, (param, arg)) in params.iter().zip(args).enumerate() {
            let value = self.registry.intern(self.meta, arg, here.with_detail(format!("entry argument {i}")))?;
            self.registry.graph_mut().add_candidate(*param, value)?;
        }
        tracing::info!(function = %code.name, args = args.len(), "entry point");
        self.entry = Some(node);
        Ok(node)
    }

    /// Scan every reachable function, then resolve the whole graph.
    pub fn infer(&mut self) -> Result<ResolveStats, CompileError> {
        let entry = self.entry.ok_or_else(|| CompileError::logic("no entry point"))?;
        if self.phase != Phase::Collecting {
            return Err(CompileError::logic("inference already ran"));
        }
        while let Some(node) = self.registry.take_observed() {
            let is_function = matches!(
                self.registry.graph().callable(node).map(|c| c.source),
                Some(CallableSource::Function(_))
            );
            if !is_function || !self.scanned.insert(node) {
                continue;
            }
            let scan = scan_function(self.meta, &mut self.registry, node)?;
            self.scans.push(scan);
        }
        if let Some(pos) = self.scans.iter().position(|s| s.node == entry)
            && pos != 0
        {
            let scan = self.scans.remove(pos);
            self.scans.insert(0, scan);
        }

        let stats = resolve::resolve_all(&mut self.registry)?;
        tracing::info!(
            functions = self.scans.len(),
            nodes = self.registry.graph().len(),
            passes = stats.passes,
            relaxed = stats.relaxed,
            "inference complete"
        );
        self.phase = Phase::Inferred;
        Ok(stats)
    }

    pub fn scans(&self) -> &[FunctionScan] {
        &self.scans
    }

    fn require_inferred(&self) -> Result<(), CompileError> {
        match self.phase {
            Phase::Inferred => Ok(()),
            Phase::Collecting => Err(CompileError::logic("types have not been inferred yet")),
        }
    }

    /// Generate IR for every scanned function; the entry point comes first.
    pub fn assemble(&self) -> Result<Assembled, CompileError> {
        self.require_inferred()?;
        let assembled = codegen::assemble(self.meta, &self.registry, &self.scans)?;
        if self.options.dump_ir {
            tracing::info!("\n{}", assembled.module);
        }
        Ok(assembled)
    }

    pub fn type_report(&self) -> Result<TypeReport, CompileError> {
        self.require_inferred()?;
        TypeReport::build(self.meta, &self.registry, &self.scans)
    }
}
