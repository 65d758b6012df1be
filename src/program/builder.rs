use crate::program::{
    ClassDef, ClassId, CodeObject, FunctionDef, FunctionId, HeapId, HeapObject, ModuleDef,
    ModuleId, Object, Program,
};

/// Wires modules, functions and classes into a [`Program`].
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    program: Program,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(&mut self, name: &str) -> ModuleId {
        self.program.modules.push(ModuleDef { name: name.to_string(), globals: Default::default() });
        ModuleId((self.program.modules.len() - 1) as u32)
    }

    /// Add a module-level function, bound as a global under its code name.
    pub fn function(&mut self, module: ModuleId, code: CodeObject) -> FunctionId {
        let name = code.name.clone();
        let id = self.add_function(module, code);
        self.global(module, &name, Object::Function(id));
        id
    }

    /// Add a class, bound as a global under `name`.
    pub fn class(&mut self, module: ModuleId, name: &str) -> ClassId {
        self.program.classes.push(ClassDef {
            name: name.to_string(),
            module,
            attributes: Vec::new(),
        });
        let id = ClassId((self.program.classes.len() - 1) as u32);
        self.global(module, name, Object::Class(id));
        id
    }

    /// Add a method to `class` under its code name.
    pub fn method(&mut self, class: ClassId, code: CodeObject) -> FunctionId {
        let module = self.program.classes[class.0 as usize].module;
        let name = code.name.clone();
        let id = self.add_function(module, code);
        self.class_attribute(class, &name, Object::Function(id));
        id
    }

    pub fn class_attribute(&mut self, class: ClassId, name: &str, value: Object) {
        let attrs = &mut self.program.classes[class.0 as usize].attributes;
        match attrs.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => attrs.push((name.to_string(), value)),
        }
    }

    pub fn global(&mut self, module: ModuleId, name: &str, value: Object) {
        self.program.modules[module.0 as usize].globals.insert(name.to_string(), value);
    }

    pub fn heap(&mut self, object: HeapObject) -> HeapId {
        self.program.heap.push(object);
        HeapId((self.program.heap.len() - 1) as u32)
    }

    pub fn build(self) -> Program {
        self.program
    }

    fn add_function(&mut self, module: ModuleId, code: CodeObject) -> FunctionId {
        self.program.functions.push(FunctionDef { module, code });
        FunctionId((self.program.functions.len() - 1) as u32)
    }
}
