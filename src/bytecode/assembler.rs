use std::collections::HashMap;

use crate::bytecode::{CompareOp, JumpKind, Opcode};
use crate::diagnostics::CompileError;
use crate::program::{CodeObject, Object};

/// A position in the instruction stream, bound with [`Assembler::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

#[derive(Debug, Clone, Copy)]
enum Operand {
    None,
    Imm(u32),
    Label(Label),
}

#[derive(Debug, Clone)]
struct Item {
    opcode: Opcode,
    operand: Operand,
    line: u32,
}

/// Builds a [`CodeObject`]: interns pool entries, resolves labels and
/// inserts `EXTENDED_ARG` prefixes where an immediate outgrows 16 bits.
pub struct Assembler {
    name: String,
    filename: String,
    first_line: u32,
    arg_count: u32,
    varnames: Vec<String>,
    names: Vec<String>,
    consts: Vec<Object>,
    items: Vec<Item>,
    labels: Vec<Option<usize>>,
    line: u32,
}

impl Assembler {
    pub fn new(name: &str, params: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            filename: "<memory>".to_string(),
            first_line: 1,
            arg_count: params.len() as u32,
            varnames: params.iter().map(|p| p.to_string()).collect(),
            names: Vec::new(),
            consts: Vec::new(),
            items: Vec::new(),
            labels: Vec::new(),
            line: 1,
        }
    }

    pub fn filename(mut self, filename: &str) -> Self {
        self.filename = filename.to_string();
        self
    }

    pub fn first_line(mut self, line: u32) -> Self {
        self.first_line = line;
        self.line = line;
        self
    }

    /// Source line attributed to instructions emitted from now on.
    pub fn line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    pub fn emit(&mut self, opcode: Opcode) -> &mut Self {
        self.push(opcode, Operand::None)
    }

    pub fn emit_arg(&mut self, opcode: Opcode, arg: u32) -> &mut Self {
        self.push(opcode, Operand::Imm(arg))
    }

    fn push(&mut self, opcode: Opcode, operand: Operand) -> &mut Self {
        self.items.push(Item { opcode, operand, line: self.line });
        self
    }

    pub fn local(&mut self, name: &str) -> u32 {
        intern_name(&mut self.varnames, name)
    }

    pub fn name_index(&mut self, name: &str) -> u32 {
        intern_name(&mut self.names, name)
    }

    pub fn const_index(&mut self, value: Object) -> u32 {
        if let Some(idx) = self.consts.iter().position(|c| c.same_constant(&value)) {
            return idx as u32;
        }
        self.consts.push(value);
        (self.consts.len() - 1) as u32
    }

    pub fn load_fast(&mut self, name: &str) -> &mut Self {
        let idx = self.local(name);
        self.emit_arg(Opcode::LoadFast, idx)
    }

    pub fn store_fast(&mut self, name: &str) -> &mut Self {
        let idx = self.local(name);
        self.emit_arg(Opcode::StoreFast, idx)
    }

    pub fn load_const(&mut self, value: impl Into<Object>) -> &mut Self {
        let idx = self.const_index(value.into());
        self.emit_arg(Opcode::LoadConst, idx)
    }

    pub fn load_global(&mut self, name: &str) -> &mut Self {
        let idx = self.name_index(name);
        self.emit_arg(Opcode::LoadGlobal, idx)
    }

    pub fn load_attr(&mut self, name: &str) -> &mut Self {
        let idx = self.name_index(name);
        self.emit_arg(Opcode::LoadAttr, idx)
    }

    pub fn store_attr(&mut self, name: &str) -> &mut Self {
        let idx = self.name_index(name);
        self.emit_arg(Opcode::StoreAttr, idx)
    }

    pub fn compare(&mut self, op: CompareOp) -> &mut Self {
        self.emit_arg(Opcode::CompareOp, op as u32)
    }

    /// `CALL_FUNCTION` with `positional` arguments and `keywords` (name, value) pairs.
    pub fn call(&mut self, positional: u8, keywords: u8) -> &mut Self {
        self.emit_arg(Opcode::CallFunction, ((keywords as u32) << 8) | positional as u32)
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the next emitted instruction.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.items.len());
        self
    }

    /// Emit a jump-family opcode whose target is `label`.
    pub fn jump(&mut self, opcode: Opcode, label: Label) -> &mut Self {
        self.push(opcode, Operand::Label(label))
    }

    pub fn finish(self) -> Result<CodeObject, CompileError> {
        for item in &self.items {
            if item.opcode == Opcode::ExtendedArg {
                return Err(CompileError::logic("EXTENDED_ARG is inserted by the assembler"));
            }
            match item.operand {
                Operand::None if item.opcode.has_argument() => {
                    return Err(CompileError::logic(format!("{} requires an argument", item.opcode)));
                }
                Operand::Imm(_) | Operand::Label(_) if !item.opcode.has_argument() => {
                    return Err(CompileError::logic(format!("{} takes no argument", item.opcode)));
                }
                Operand::Label(_) if item.opcode.jump_kind().is_none() => {
                    return Err(CompileError::logic(format!("{} is not a jump", item.opcode)));
                }
                _ => {}
            }
        }

        // Prefix counts only grow, so this settles in a few rounds.
        let mut prefixes = vec![0usize; self.items.len()];
        let (offsets, args) = loop {
            let offsets = self.layout(&prefixes);
            let args = self.resolve_args(&offsets)?;
            let mut changed = false;
            for (i, arg) in args.iter().enumerate() {
                let needed = if *arg > 0xffff { 1 } else { 0 };
                if needed > prefixes[i] {
                    prefixes[i] = needed;
                    changed = true;
                }
            }
            if !changed {
                break (offsets, args);
            }
        };

        let mut code = Vec::new();
        let mut lines: Vec<(u32, u32)> = Vec::new();
        for (i, item) in self.items.iter().enumerate() {
            debug_assert_eq!(code.len() as u32, offsets[i]);
            if lines.last().is_none_or(|&(_, line)| line != item.line) {
                lines.push((offsets[i], item.line));
            }
            if !item.opcode.has_argument() {
                code.push(item.opcode as u8);
                continue;
            }
            let arg = args[i];
            if prefixes[i] > 0 {
                code.push(Opcode::ExtendedArg as u8);
                code.extend_from_slice(&((arg >> 16) as u16).to_le_bytes());
            }
            code.push(item.opcode as u8);
            code.extend_from_slice(&((arg & 0xffff) as u16).to_le_bytes());
        }

        Ok(CodeObject {
            name: self.name,
            filename: self.filename,
            first_line: self.first_line,
            arg_count: self.arg_count,
            varnames: self.varnames,
            consts: self.consts,
            names: self.names,
            code,
            lines,
        })
    }

    /// Offsets of every item plus the end offset.
    fn layout(&self, prefixes: &[usize]) -> Vec<u32> {
        let mut offsets = Vec::with_capacity(self.items.len() + 1);
        let mut pos = 0u32;
        for (item, &prefix) in self.items.iter().zip(prefixes) {
            offsets.push(pos);
            pos += if item.opcode.has_argument() { 3 + 3 * prefix as u32 } else { 1 };
        }
        offsets.push(pos);
        offsets
    }

    fn resolve_args(&self, offsets: &[u32]) -> Result<Vec<u32>, CompileError> {
        let mut label_offsets: HashMap<usize, u32> = HashMap::new();
        for (idx, bound) in self.labels.iter().enumerate() {
            if let Some(item) = bound {
                label_offsets.insert(idx, offsets[*item]);
            }
        }
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| match item.operand {
                Operand::None => Ok(0),
                Operand::Imm(arg) => Ok(arg),
                Operand::Label(label) => {
                    let target = *label_offsets.get(&label.0).ok_or_else(|| {
                        CompileError::logic(format!("label {} used by {} was never bound", label.0, item.opcode))
                    })?;
                    match item.opcode.jump_kind() {
                        Some(JumpKind::Relative) => {
                            let next = offsets[i + 1];
                            target.checked_sub(next).ok_or_else(|| {
                                CompileError::logic(format!(
                                    "{} at offset {} cannot jump backwards to {target}",
                                    item.opcode, offsets[i]
                                ))
                            })
                        }
                        _ => Ok(target),
                    }
                }
            })
            .collect()
    }
}

fn intern_name(pool: &mut Vec<String>, name: &str) -> u32 {
    if let Some(idx) = pool.iter().position(|n| n == name) {
        return idx as u32;
    }
    pool.push(name.to_string());
    (pool.len() - 1) as u32
}
