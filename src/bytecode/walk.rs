//! Block-by-block traversal shared by the scanner and the code generator.
//!
//! Every handler answers with an [`Action`]. `Continue` falls through to the
//! next instruction (or into the next block, if that offset starts one);
//! `Terminate` ends the block and the walk resumes at the smallest pending
//! block offset. Each offset is visited at most once.

use std::collections::BTreeSet;

use crate::bytecode::{decode, find_branch_targets, Instruction};
use crate::diagnostics::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    Terminate,
}

/// Traversal state handed to visitors so they can register branch targets.
#[derive(Debug, Default)]
pub struct Walk {
    starts: BTreeSet<u32>,
    pending: BTreeSet<u32>,
    visited: BTreeSet<u32>,
}

impl Walk {
    /// Mark `offset` as a block start reachable from the current block.
    pub fn branch_to(&mut self, offset: u32) {
        self.starts.insert(offset);
        if !self.visited.contains(&offset) {
            self.pending.insert(offset);
        }
    }

    pub fn is_block_start(&self, offset: u32) -> bool {
        self.starts.contains(&offset)
    }

    pub fn was_visited(&self, offset: u32) -> bool {
        self.visited.contains(&offset)
    }
}

pub trait OpcodeVisitor {
    /// Traversal is positioned at the first instruction of the block at `offset`.
    fn enter_block(&mut self, offset: u32) -> Result<(), CompileError>;

    fn visit(&mut self, ins: &Instruction, walk: &mut Walk) -> Result<Action, CompileError>;

    /// The block ending with `last` continues straight into the block at `next`.
    fn fall_through(&mut self, last: &Instruction, next: u32) -> Result<(), CompileError>;
}

/// Drive `visitor` over every block reachable from offset 0.
pub fn walk_code(code: &[u8], visitor: &mut impl OpcodeVisitor) -> Result<(), CompileError> {
    let mut walk = Walk { starts: find_branch_targets(code)?, ..Walk::default() };
    walk.starts.insert(0);
    walk.pending.insert(0);

    while let Some(start) = walk.pending.pop_first() {
        if walk.visited.contains(&start) {
            continue;
        }
        tracing::trace!(offset = start, "entering block");
        visitor.enter_block(start)?;
        let mut pos = start;
        loop {
            if !walk.visited.insert(pos) {
                return Err(CompileError::logic(format!("offset {pos} visited twice")));
            }
            let ins = decode(code, pos)?;
            match visitor.visit(&ins, &mut walk)? {
                Action::Terminate => break,
                Action::Continue => {
                    if ins.next as usize >= code.len() {
                        return Err(CompileError::logic(format!(
                            "{} at offset {} falls off the end of the code",
                            ins.opcode, ins.offset
                        )));
                    }
                    if walk.is_block_start(ins.next) {
                        visitor.fall_through(&ins, ins.next)?;
                        walk.branch_to(ins.next);
                        break;
                    }
                    pos = ins.next;
                }
            }
        }
    }
    Ok(())
}
