use crate::diagnostics::CompileError;
use crate::ir::{
    BinaryOp, Block, BlockData, Cond, Conversion, Function, Inst, Slot, SlotData, Terminator, Type,
    UnaryOp, Value,
};

/// Appends instructions to one function, one block at a time.
pub struct FunctionBuilder {
    func: Function,
    current: Block,
}

impl FunctionBuilder {
    /// Starts a function with an `entry` block holding the parameter values.
    pub fn new(name: impl Into<String>, params: &[Type], ret: Type) -> Self {
        let func = Function {
            name: name.into(),
            params: params.to_vec(),
            ret,
            slots: Vec::new(),
            values: params.to_vec(),
            blocks: vec![BlockData { name: "entry".into(), insts: Vec::new(), terminator: None }],
        };
        Self { func, current: Block(0) }
    }

    pub fn name(&self) -> &str {
        &self.func.name
    }

    pub fn ret_type(&self) -> Type {
        self.func.ret
    }

    pub fn param(&self, index: usize) -> Value {
        Value(index as u32)
    }

    pub fn entry_block(&self) -> Block {
        Block(0)
    }

    pub fn create_block(&mut self, name: impl Into<String>) -> Block {
        let block = Block(self.func.blocks.len() as u32);
        self.func.blocks.push(BlockData { name: name.into(), insts: Vec::new(), terminator: None });
        block
    }

    pub fn switch_to(&mut self, block: Block) {
        self.current = block;
    }

    pub fn current_block(&self) -> Block {
        self.current
    }

    pub fn is_terminated(&self, block: Block) -> bool {
        self.func.blocks[block.index()].terminator.is_some()
    }

    pub fn value_type(&self, value: Value) -> Type {
        self.func.value_type(value)
    }

    pub fn alloc_slot(&mut self, size: u32, align: u32) -> Slot {
        let slot = Slot(self.func.slots.len() as u32);
        self.func.slots.push(SlotData { size: size.max(1), align: align.max(1) });
        slot
    }

    fn value(&mut self, ty: Type) -> Value {
        let v = Value(self.func.values.len() as u32);
        self.func.values.push(ty);
        v
    }

    fn push(&mut self, inst: Inst) {
        self.func.blocks[self.current.index()].insts.push(inst);
    }

    pub fn iconst(&mut self, ty: Type, value: i64) -> Value {
        let dst = self.value(ty);
        self.push(Inst::IConst { dst, ty, value });
        dst
    }

    pub fn fconst(&mut self, value: f64) -> Value {
        let dst = self.value(Type::F64);
        self.push(Inst::FConst { dst, value });
        dst
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> Value {
        let dst = self.value(self.value_type(lhs));
        self.push(Inst::Binary { dst, op, lhs, rhs });
        dst
    }

    pub fn unary(&mut self, op: UnaryOp, arg: Value) -> Value {
        let dst = self.value(self.value_type(arg));
        self.push(Inst::Unary { dst, op, arg });
        dst
    }

    pub fn cmp(&mut self, cond: Cond, lhs: Value, rhs: Value) -> Value {
        let dst = self.value(Type::I1);
        self.push(Inst::Cmp { dst, cond, lhs, rhs });
        dst
    }

    pub fn select(&mut self, cond: Value, then: Value, otherwise: Value) -> Value {
        let dst = self.value(self.value_type(then));
        self.push(Inst::Select { dst, cond, then, otherwise });
        dst
    }

    pub fn convert(&mut self, op: Conversion, arg: Value) -> Value {
        let ty = match op {
            Conversion::Zext => Type::I32,
            Conversion::SIToF => Type::F64,
        };
        let dst = self.value(ty);
        self.push(Inst::Convert { dst, op, arg });
        dst
    }

    pub fn load_slot(&mut self, ty: Type, slot: Slot) -> Value {
        let dst = self.value(ty);
        self.push(Inst::LoadSlot { dst, slot });
        dst
    }

    pub fn store_slot(&mut self, slot: Slot, value: Value) {
        self.push(Inst::StoreSlot { slot, value });
    }

    pub fn slot_addr(&mut self, slot: Slot) -> Value {
        let dst = self.value(Type::Ptr);
        self.push(Inst::SlotAddr { dst, slot });
        dst
    }

    pub fn load(&mut self, ty: Type, addr: Value, offset: u32) -> Value {
        let dst = self.value(ty);
        self.push(Inst::Load { dst, addr, offset });
        dst
    }

    pub fn store(&mut self, addr: Value, offset: u32, value: Value) {
        self.push(Inst::Store { addr, offset, value });
    }

    pub fn call(&mut self, callee: impl Into<String>, args: Vec<Value>, ret: Type) -> Option<Value> {
        let dst = (ret != Type::Void).then(|| self.value(ret));
        self.push(Inst::Call { dst, callee: callee.into(), args });
        dst
    }

    fn terminate(&mut self, term: Terminator) -> Result<(), CompileError> {
        let block = &mut self.func.blocks[self.current.index()];
        if let Some(prev) = &block.terminator {
            return Err(CompileError::logic(format!(
                "block `{}` of `{}` already ends with {prev:?}",
                block.name, self.func.name
            )));
        }
        block.terminator = Some(term);
        Ok(())
    }

    pub fn jump(&mut self, target: Block) -> Result<(), CompileError> {
        self.terminate(Terminator::Jump(target))
    }

    pub fn branch(&mut self, cond: Value, then: Block, otherwise: Block) -> Result<(), CompileError> {
        self.terminate(Terminator::Branch { cond, then, otherwise })
    }

    pub fn ret(&mut self, value: Option<Value>) -> Result<(), CompileError> {
        self.terminate(Terminator::Return(value))
    }

    /// Every block must end in a terminator.
    pub fn finish(self) -> Result<Function, CompileError> {
        if let Some(open) = self.func.blocks.iter().find(|b| b.terminator.is_none()) {
            return Err(CompileError::logic(format!(
                "block `{}` of `{}` has no terminator",
                open.name, self.func.name
            )));
        }
        Ok(self.func)
    }
}
