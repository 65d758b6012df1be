//! Fixpoint resolution of Unknown nodes.
//!
//! Strict passes resolve every node whose candidates are all resolved, until a
//! pass makes no progress. Loop-carried values (`n = n + 1`) form cycles that
//! no strict pass can break; for those, the lowest-id node with at least one
//! resolved candidate is resolved from those candidates alone, and strict
//! passes resume. Every node resolved that way is re-checked against its full
//! candidate set once the fixpoint is reached.

use std::collections::BTreeSet;

use crate::bytecode::{ArithOp, UnaryOp};
use crate::diagnostics::CompileError;
use crate::infer::graph::{NodeId, Origin, TypeGraph};
use crate::infer::kind::{promote, Kind};
use crate::infer::registry::TypeRegistry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub passes: usize,
    pub resolved: usize,
    pub relaxed: usize,
}

/// True when every candidate of `id` already has a concrete type.
pub fn can_refine(graph: &TypeGraph, id: NodeId) -> bool {
    let node = graph.node(id);
    node.is_unknown()
        && node.resolved().is_none()
        && !node.candidates().is_empty()
        && node.candidates().iter().all(|&c| graph.concrete(c).is_some())
}

/// Resolve `id` if it is refinable. Returns the concrete node, or `None`
/// while inputs are still pending. Calling it again on a resolved node
/// returns the same answer without recomputing it.
pub fn resolve_node(registry: &mut TypeRegistry, id: NodeId) -> Result<Option<NodeId>, CompileError> {
    if let Some(done) = registry.graph().concrete(id) {
        return Ok(Some(done));
    }
    if !can_refine(registry.graph(), id) {
        return Ok(None);
    }
    let candidates = registry.graph().node(id).candidates().to_vec();
    let to = join(registry, id, &candidates)?;
    registry.graph_mut().set_resolved(id, to)?;
    Ok(Some(to))
}

/// Resolve every Unknown node in the graph, or fail on the first node that
/// cannot be given a single type.
pub fn resolve_all(registry: &mut TypeRegistry) -> Result<ResolveStats, CompileError> {
    let graph = registry.graph();
    let mut pending: BTreeSet<NodeId> = graph
        .ids()
        .filter(|&id| graph.node(id).is_unknown() && graph.node(id).resolved().is_none())
        .collect();
    let mut stats = ResolveStats::default();
    let mut relaxed = Vec::new();

    loop {
        loop {
            stats.passes += 1;
            let mut progress = 0;
            let snapshot: Vec<NodeId> = pending.iter().copied().collect();
            for id in snapshot {
                if resolve_node(registry, id)?.is_some() {
                    pending.remove(&id);
                    progress += 1;
                }
            }
            tracing::debug!(pass = stats.passes, progress, remaining = pending.len(), "resolve pass");
            stats.resolved += progress;
            if progress == 0 {
                break;
            }
        }
        if pending.is_empty() {
            break;
        }

        let graph = registry.graph();
        let pick = pending.iter().copied().find(|&id| {
            graph.node(id).candidates().iter().any(|&c| graph.concrete(c).is_some())
        });
        let Some(id) = pick else { break };
        let known: Vec<NodeId> = graph
            .node(id)
            .candidates()
            .iter()
            .copied()
            .filter(|&c| graph.concrete(c).is_some())
            .collect();
        let to = join(registry, id, &known)?;
        tracing::debug!(node = %id, to = %registry.graph().describe(to), "relaxed resolution");
        registry.graph_mut().set_resolved(id, to)?;
        pending.remove(&id);
        relaxed.push(id);
        stats.resolved += 1;
        stats.relaxed += 1;
    }

    if let Some(&id) = pending.first() {
        let node = registry.graph().node(id);
        let reason = if node.candidates().is_empty() {
            "no value ever flows into it"
        } else {
            "its inputs form a cycle with no known type"
        };
        return Err(CompileError::unsupported(
            format!(
                "cannot infer a type for {} ({reason}; {} node(s) unresolved)",
                node.location.detail,
                pending.len()
            ),
            node.location.clone(),
        ));
    }

    for id in relaxed {
        let candidates = registry.graph().node(id).candidates().to_vec();
        let expected = join(registry, id, &candidates)?;
        let graph = registry.graph();
        let actual = graph.require_concrete(id)?;
        if graph.type_key(expected) != graph.type_key(actual) {
            let node = graph.node(id);
            return Err(CompileError::ambiguous(
                format!(
                    "{} was first inferred as {} but later also receives {}",
                    node.location.detail,
                    graph.describe(actual),
                    graph.describe(expected)
                ),
                node.location.clone(),
                candidates.iter().map(|&c| graph.node(c).location.clone()).collect(),
            ));
        }
    }

    Ok(stats)
}

/// The concrete node `id` takes given concrete `candidates`.
fn join(registry: &TypeRegistry, id: NodeId, candidates: &[NodeId]) -> Result<NodeId, CompileError> {
    let graph = registry.graph();
    let node = graph.node(id);
    let concretes = candidates
        .iter()
        .map(|&c| graph.require_concrete(c))
        .collect::<Result<Vec<_>, _>>()?;

    match node.origin {
        Origin::BinaryOp(op) => {
            let kind = numeric_join(graph, id, &concretes, op.symbol())?;
            let floor = if op == ArithOp::TrueDiv { Kind::Float } else { Kind::Integer };
            registry.primitive(promote(kind, floor).unwrap_or(kind))
        }
        Origin::UnaryOp(op) => {
            let kind = numeric_join(graph, id, &concretes, "unary operator")?;
            match op {
                UnaryOp::Invert if !matches!(kind, Kind::Boolean | Kind::Integer) => {
                    Err(CompileError::unsupported(
                        format!("`~` on {kind}"),
                        node.location.clone(),
                    ))
                }
                UnaryOp::Not => registry.primitive(Kind::Boolean),
                _ => registry.primitive(promote(kind, Kind::Integer).unwrap_or(kind)),
            }
        }
        _ => {
            let first = concretes
                .first()
                .copied()
                .ok_or_else(|| CompileError::logic(format!("{id} joined with no candidates")))?;
            let key = graph.type_key(first);
            if concretes.iter().all(|&c| graph.type_key(c) == key) {
                return Ok(first);
            }
            let kinds: Vec<Kind> = concretes.iter().map(|&c| graph.node(c).kind).collect();
            if kinds.iter().all(|k| k.is_numeric()) {
                let kind = kinds.iter().skip(1).try_fold(kinds[0], |acc, &k| promote(acc, k));
                return match kind {
                    Some(kind) => registry.primitive(kind),
                    None => Err(CompileError::logic("numeric promotion failed")),
                };
            }
            let mut names: Vec<String> = concretes.iter().map(|&c| graph.describe(c)).collect();
            names.dedup();
            Err(CompileError::ambiguous(
                format!("{} has conflicting types: {}", node.location.detail, names.join(", ")),
                node.location.clone(),
                candidates.iter().map(|&c| graph.node(c).location.clone()).collect(),
            ))
        }
    }
}

fn numeric_join(
    graph: &TypeGraph,
    id: NodeId,
    concretes: &[NodeId],
    op: &str,
) -> Result<Kind, CompileError> {
    let mut acc: Option<Kind> = None;
    for &c in concretes {
        let kind = graph.node(c).kind;
        if !kind.is_numeric() {
            return Err(CompileError::unsupported(
                format!("operator `{op}` applied to {}", graph.describe(c)),
                graph.node(id).location.clone(),
            ));
        }
        acc = Some(match acc {
            Some(prev) => promote(prev, kind).unwrap_or(kind),
            None => kind,
        });
    }
    acc.ok_or_else(|| CompileError::logic(format!("{id} has no operands")))
}
