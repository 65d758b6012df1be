use std::collections::HashMap;

use crate::codegen::runtime_type;
use crate::diagnostics::CompileError;
use crate::infer::graph::NodeId;
use crate::infer::TypeGraph;
use crate::ir::Type;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub offset: u32,
}

/// In-memory layout of an instance: attributes in first-seen order, each at
/// its natural alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub class_name: String,
    pub fields: Vec<Field>,
    pub size: u32,
    pub align: u32,
}

impl StructLayout {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn align_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

/// Layouts computed on first use, keyed by Instance node.
#[derive(Debug, Default)]
pub struct Layouts {
    cache: HashMap<NodeId, StructLayout>,
}

impl Layouts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, graph: &TypeGraph, instance: NodeId) -> Result<&StructLayout, CompileError> {
        if !self.cache.contains_key(&instance) {
            let layout = compute(graph, instance)?;
            tracing::debug!(class = %layout.class_name, size = layout.size, "struct layout");
            self.cache.insert(instance, layout);
        }
        self.cache
            .get(&instance)
            .ok_or_else(|| CompileError::logic(format!("layout for {instance} vanished")))
    }
}

fn compute(graph: &TypeGraph, instance: NodeId) -> Result<StructLayout, CompileError> {
    let info = graph
        .instance(instance)
        .ok_or_else(|| CompileError::logic(format!("{instance} is not an instance node")))?;
    let mut fields = Vec::with_capacity(info.attributes.len());
    let mut offset = 0;
    let mut align = 1;
    for (name, node) in &info.attributes {
        let ty = runtime_type(graph, *node)?.ok_or_else(|| {
            CompileError::unsupported(
                format!(
                    "attribute `{}.{name}` of type {} cannot be stored in an instance",
                    info.class_name,
                    graph.describe(*node)
                ),
                graph.node(*node).location.clone(),
            )
        })?;
        offset = align_up(offset, ty.align());
        fields.push(Field { name: name.clone(), ty, offset });
        offset += ty.size();
        align = align.max(ty.align());
    }
    Ok(StructLayout {
        class_name: info.class_name.clone(),
        fields,
        size: align_up(offset, align),
        align,
    })
}
