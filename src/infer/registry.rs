use std::collections::{HashMap, VecDeque};

use crate::diagnostics::CompileError;
use crate::infer::graph::{
    Callable, CallableSource, InstanceInfo, NodeId, Origin, Payload, TypeGraph,
};
use crate::infer::kind::Kind;
use crate::location::SourceLocation;
use crate::program::{ClassId, FunctionId, HeapId, HeapObject, Metadata, ModuleId, Object};

/// Value-equality key for hashable objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    None,
    Bool(bool),
    Int(i64),
    Float(u64),
    Complex(u64, u64),
    Str(String),
    Bytes(Vec<u8>),
    Function(FunctionId),
    Class(ClassId),
    Module(ModuleId),
}

const CANONICAL: [Kind; 9] = [
    Kind::Boolean,
    Kind::Integer,
    Kind::Float,
    Kind::Complex,
    Kind::None,
    Kind::String,
    Kind::Bytes,
    Kind::List,
    Kind::Dict,
];

/// Maps source objects to type nodes and owns the graph for one session.
///
/// Every newly created function or class node is queued on the observed
/// list; the session drains it to grow the scan work-list.
pub struct TypeRegistry {
    graph: TypeGraph,
    constants: HashMap<ConstKey, NodeId>,
    heap: HashMap<HeapId, NodeId>,
    methods: HashMap<(NodeId, NodeId), NodeId>,
    canonical: Vec<(Kind, NodeId)>,
    observed: VecDeque<NodeId>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut graph = TypeGraph::new();
        let canonical = CANONICAL
            .iter()
            .map(|&kind| {
                let loc = SourceLocation::synthetic(kind.name());
                (kind, graph.add(kind, Origin::Primitive, loc, Payload::Plain))
            })
            .collect();
        Self {
            graph,
            constants: HashMap::new(),
            heap: HashMap::new(),
            methods: HashMap::new(),
            canonical,
            observed: VecDeque::new(),
        }
    }

    pub fn graph(&self) -> &TypeGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut TypeGraph {
        &mut self.graph
    }

    /// The shared node for a primitive kind.
    pub fn primitive(&self, kind: Kind) -> Result<NodeId, CompileError> {
        self.canonical
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, id)| *id)
            .ok_or_else(|| CompileError::logic(format!("no canonical node for {kind}")))
    }

    /// Next callable created since the last call.
    pub fn take_observed(&mut self) -> Option<NodeId> {
        self.observed.pop_front()
    }

    pub fn function_node(&self, id: FunctionId) -> Option<NodeId> {
        self.constants.get(&ConstKey::Function(id)).copied()
    }

    pub fn class_node(&self, id: ClassId) -> Option<NodeId> {
        self.constants.get(&ConstKey::Class(id)).copied()
    }

    pub fn intern(
        &mut self,
        meta: &dyn Metadata,
        object: &Object,
        location: SourceLocation,
    ) -> Result<NodeId, CompileError> {
        if let Object::Ref(heap_id) = object {
            return self.intern_heap(meta, *heap_id, location);
        }
        let key = const_key(object).ok_or_else(|| {
            let name = match object {
                Object::Native(name) => name.as_str(),
                _ => object.type_name(),
            };
            CompileError::unsupported(format!("object `{name}` has no compilable type"), location.clone())
        })?;
        if let Some(&id) = self.constants.get(&key) {
            return Ok(id);
        }
        let id = match object {
            Object::None => self.graph.add(Kind::None, Origin::Constant, location, Payload::Plain),
            Object::Bool(_) => self.graph.add(Kind::Boolean, Origin::Constant, location, Payload::Plain),
            Object::Int(_) => self.graph.add(Kind::Integer, Origin::Constant, location, Payload::Plain),
            Object::Float(_) => self.graph.add(Kind::Float, Origin::Constant, location, Payload::Plain),
            Object::Complex { .. } => {
                self.graph.add(Kind::Complex, Origin::Constant, location, Payload::Plain)
            }
            Object::Str(s) => self.graph.add(
                Kind::String,
                Origin::Constant,
                location,
                Payload::Length(s.chars().count()),
            ),
            Object::Bytes(b) => {
                self.graph.add(Kind::Bytes, Origin::Constant, location, Payload::Length(b.len()))
            }
            Object::Function(fid) => self.create_function(meta, *fid)?,
            Object::Class(cid) => self.create_class(meta, *cid)?,
            Object::Module(mid) => {
                let name = meta.module(*mid)?.name.clone();
                self.graph.add(
                    Kind::Module,
                    Origin::Constant,
                    location.with_detail(format!("module `{name}`")),
                    Payload::Module(*mid),
                )
            }
            Object::Ref(_) | Object::Native(_) => {
                return Err(CompileError::logic("heap and native objects have no value key"));
            }
        };
        self.constants.insert(key, id);
        Ok(id)
    }

    fn intern_heap(
        &mut self,
        meta: &dyn Metadata,
        heap_id: HeapId,
        location: SourceLocation,
    ) -> Result<NodeId, CompileError> {
        if let Some(&id) = self.heap.get(&heap_id) {
            return Ok(id);
        }
        let id = match meta.heap(heap_id)? {
            HeapObject::List(_) => self.graph.add(Kind::List, Origin::Constant, location, Payload::Plain),
            HeapObject::Dict(_) => self.graph.add(Kind::Dict, Origin::Constant, location, Payload::Plain),
            HeapObject::Instance { class, .. } => {
                let class_node = self.intern(meta, &Object::Class(*class), location)?;
                self.graph
                    .callable(class_node)
                    .map(|c| c.call_result)
                    .ok_or_else(|| CompileError::logic(format!("class node {class_node} has no instance")))?
            }
        };
        self.heap.insert(heap_id, id);
        Ok(id)
    }

    fn create_function(&mut self, meta: &dyn Metadata, fid: FunctionId) -> Result<NodeId, CompileError> {
        let code = &meta.function(fid)?.code;
        let at = |detail: String| SourceLocation::new(&code.name, &code.filename, code.first_line, detail);

        let param_names: Vec<String> = code.params().to_vec();
        let params = param_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                self.graph.unknown(Origin::Param(i as u32), at(format!("arg {i} type (`{name}`)")))
            })
            .collect();
        let ret = self.graph.unknown(Origin::Return, at("return type".to_string()));
        let id = self.graph.add(
            Kind::Function,
            Origin::Constant,
            at(format!("function `{}`", code.name)),
            Payload::Callable(Callable {
                source: CallableSource::Function(fid),
                name: code.name.clone(),
                params,
                param_names,
                body_return: ret,
                call_result: ret,
                init: None,
            }),
        );
        tracing::debug!(function = %code.name, node = %id, "observed function");
        self.observed.push_back(id);
        Ok(id)
    }

    fn create_class(&mut self, meta: &dyn Metadata, cid: ClassId) -> Result<NodeId, CompileError> {
        let class = meta.class(cid)?;
        let module = meta.module(class.module)?;
        let at = |detail: String| SourceLocation::new(&class.name, &module.name, 0, detail);

        let instance = self.graph.add(
            Kind::Instance,
            Origin::Constant,
            at(format!("instance of `{}`", class.name)),
            Payload::Instance(InstanceInfo {
                class: cid,
                class_name: class.name.clone(),
                attributes: Vec::new(),
            }),
        );

        let (init, params, param_names, body_return) = match class.initializer() {
            Some(init_id) => {
                let init = self.intern(meta, &Object::Function(init_id), at("__init__".to_string()))?;
                let callable = self
                    .graph
                    .callable(init)
                    .cloned()
                    .ok_or_else(|| CompileError::logic("initializer is not callable"))?;
                let Some(&self_param) = callable.params.first() else {
                    return Err(CompileError::unsupported(
                        format!("`{}.__init__` takes no `self` parameter", class.name),
                        self.graph.node(init).location.clone(),
                    ));
                };
                self.graph.add_candidate(self_param, instance)?;
                (Some(init), callable.params, callable.param_names, callable.body_return)
            }
            None => (None, Vec::new(), Vec::new(), self.primitive(Kind::None)?),
        };

        let id = self.graph.add(
            Kind::Class,
            Origin::Constant,
            at(format!("class `{}`", class.name)),
            Payload::Callable(Callable {
                source: CallableSource::Class(cid),
                name: class.name.clone(),
                params,
                param_names,
                body_return,
                call_result: instance,
                init,
            }),
        );
        tracing::debug!(class = %class.name, node = %id, "observed class");
        self.observed.push_back(id);
        Ok(id)
    }

    /// Bound method node for (`function`, `instance`), created once per pair.
    /// Creation records the instance as a candidate of the function's `self`.
    pub fn method(
        &mut self,
        function: NodeId,
        instance: NodeId,
        location: SourceLocation,
    ) -> Result<NodeId, CompileError> {
        if let Some(&id) = self.methods.get(&(function, instance)) {
            return Ok(id);
        }
        let self_param = self
            .graph
            .callable(function)
            .ok_or_else(|| CompileError::logic(format!("{function} is not a function")))?
            .params
            .first()
            .copied()
            .ok_or_else(|| {
                CompileError::unsupported("method takes no `self` parameter", location.clone())
            })?;
        self.graph.add_candidate(self_param, instance)?;
        let id = self.graph.add(
            Kind::Method,
            Origin::Attribute,
            location,
            Payload::Method { function, instance },
        );
        self.methods.insert((function, instance), id);
        Ok(id)
    }
}

fn const_key(object: &Object) -> Option<ConstKey> {
    Some(match object {
        Object::None => ConstKey::None,
        Object::Bool(b) => ConstKey::Bool(*b),
        Object::Int(i) => ConstKey::Int(*i),
        Object::Float(f) => ConstKey::Float(f.to_bits()),
        Object::Complex { re, im } => ConstKey::Complex(re.to_bits(), im.to_bits()),
        Object::Str(s) => ConstKey::Str(s.clone()),
        Object::Bytes(b) => ConstKey::Bytes(b.clone()),
        Object::Function(id) => ConstKey::Function(*id),
        Object::Class(id) => ConstKey::Class(*id),
        Object::Module(id) => ConstKey::Module(*id),
        Object::Ref(_) | Object::Native(_) => return None,
    })
}
