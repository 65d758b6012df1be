//! Basic blocks of one function being lowered, keyed by bytecode offset.
//!
//! `BREAK_LOOP` does not name its target. While walking, a breaking block is
//! only marked; once every block and predecessor edge is known,
//! [`BlockMap::resolve_breaks`] finds each break's loop by walking backwards
//! through predecessors and replaying loop events with a nesting counter.

use std::collections::BTreeMap;

use crate::diagnostics::CompileError;
use crate::ir::{self, FunctionBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    Setup { exit: u32 },
    PopBlock,
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub offset: u32,
    pub block: ir::Block,
    /// Offsets of blocks that transfer control here, in discovery order.
    pub preds: Vec<u32>,
    /// Loop events in instruction order.
    pub events: Vec<LoopEvent>,
    pub pending_break: bool,
}

#[derive(Debug, Default)]
pub struct BlockMap {
    blocks: BTreeMap<u32, BasicBlock>,
}

impl BlockMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, offset: u32) -> Option<&BasicBlock> {
        self.blocks.get(&offset)
    }

    /// IR block for `offset`, created as `bb<offset>` on first request.
    pub fn block_at(&mut self, builder: &mut FunctionBuilder, offset: u32) -> ir::Block {
        self.blocks
            .entry(offset)
            .or_insert_with(|| BasicBlock {
                offset,
                block: builder.create_block(format!("bb{offset}")),
                preds: Vec::new(),
                events: Vec::new(),
                pending_break: false,
            })
            .block
    }

    fn require(&self, offset: u32) -> Result<&BasicBlock, CompileError> {
        self.blocks
            .get(&offset)
            .ok_or_else(|| CompileError::logic(format!("no block at offset {offset}")))
    }

    fn require_mut(&mut self, offset: u32) -> Result<&mut BasicBlock, CompileError> {
        self.blocks
            .get_mut(&offset)
            .ok_or_else(|| CompileError::logic(format!("no block at offset {offset}")))
    }

    pub fn add_edge(&mut self, from: u32, to: u32) -> Result<(), CompileError> {
        let target = self.require_mut(to)?;
        if !target.preds.contains(&from) {
            target.preds.push(from);
        }
        Ok(())
    }

    pub fn record(&mut self, offset: u32, event: LoopEvent) -> Result<(), CompileError> {
        self.require_mut(offset)?.events.push(event);
        Ok(())
    }

    pub fn mark_break(&mut self, offset: u32) -> Result<(), CompileError> {
        self.require_mut(offset)?.pending_break = true;
        Ok(())
    }

    /// Exit offset for every breaking block, as `(block offset, exit offset)`.
    /// All targets are computed before any edge is added, so break edges
    /// never influence another break's search.
    pub fn resolve_breaks(&self) -> Result<Vec<(u32, u32)>, CompileError> {
        let mut resolved = Vec::new();
        for block in self.blocks.values().filter(|b| b.pending_break) {
            let exit = self.find_loop_exit(block.offset)?;
            tracing::debug!(block = block.offset, exit, "resolved break");
            resolved.push((block.offset, exit));
        }
        Ok(resolved)
    }

    /// Block whose `SETUP_LOOP` names `exit`, with the index of that event.
    fn setup_of(&self, exit: u32) -> Option<(u32, usize)> {
        self.blocks.values().find_map(|b| {
            b.events
                .iter()
                .position(|e| *e == LoopEvent::Setup { exit })
                .map(|i| (b.offset, i))
        })
    }

    fn find_loop_exit(&self, from: u32) -> Result<u32, CompileError> {
        let mut depth = 0usize;
        let mut cur = from;
        let mut events = self.require(cur)?.events.len();
        for _ in 0..=self.blocks.len() {
            let block = self.require(cur)?;
            for event in block.events[..events].iter().rev() {
                match *event {
                    LoopEvent::PopBlock => depth += 1,
                    LoopEvent::Setup { exit } if depth == 0 => return Ok(exit),
                    LoopEvent::Setup { .. } => depth -= 1,
                }
            }
            if let Some(pred) = block.preds.iter().copied().find(|&p| p < cur) {
                cur = pred;
                events = self.require(cur)?.events.len();
            } else if let Some((setup, index)) = self.setup_of(cur) {
                // A loop exit reached only by breaks: leaving that loop
                // pops its block, which its own setup then cancels.
                cur = setup;
                events = index;
            } else {
                break;
            }
        }
        Err(CompileError::logic(format!("break at block {from} is not inside a loop")))
    }
}
