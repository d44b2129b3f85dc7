//! Kernel control-flow graph and its builder.
//!
//! A [`KernelGraph`] owns three arenas (blocks, ops, register types) plus the
//! entry block id. The dominator tree and loop descriptors are produced by the
//! front end and recorded here; the structurer consumes them read-only except
//! for op-to-block moves.

use serde::{Deserialize, Serialize};

use crate::ir::op::Op;
use crate::ir::types::KernelType;
use crate::ir::{BlockId, OpId, VarId};

// =============================================================================
// Blocks
// =============================================================================

/// Loop descriptors attached to a loop-header block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopInfo {
    /// Blocks through which control leaves the loop.
    pub exits: Vec<BlockId>,

    /// Every block belonging to the loop, header included.
    pub blocks: Vec<BlockId>,

    /// Blocks whose edge back to the header closes the loop.
    pub back_edges: Vec<BlockId>,
}

/// A basic block in the CFG.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Block {
    /// Immediate dominator, `None` only for the entry block.
    pub dominator: Option<BlockId>,

    /// Children in the dominator tree. Order is meaningful: for a
    /// conditional the true child comes before the false child, and for a
    /// loop header the children are some arrangement of body and exit.
    pub dominated: Vec<BlockId>,

    /// CFG successors.
    pub successors: Vec<BlockId>,

    /// Ops in execution order.
    pub ops: Vec<OpId>,

    /// Block closes a loop (carries the back edge).
    pub is_loop_end: bool,

    /// Block starts a loop and carries a [`LoopInfo`].
    pub is_loop_header: bool,

    /// Block joins two or more forward control-flow paths.
    pub is_merge: bool,

    /// Present exactly when `is_loop_header` is set.
    pub loop_info: Option<LoopInfo>,
}

// =============================================================================
// Graph
// =============================================================================

/// A kernel body: blocks forming a CFG over a shared op arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelGraph {
    /// Basic blocks. `BlockId(0)` is the entry block.
    pub blocks: Vec<Block>,

    /// Op arena. Indexed by `OpId`.
    pub ops: Vec<Op>,

    /// Type of each register. Indexed by `VarId`.
    pub var_types: Vec<KernelType>,
}

impl KernelGraph {
    /// Entry block of the kernel.
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    /// Get a block by ID.
    pub fn get_block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    /// Get a mutable reference to a block.
    pub fn get_block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    /// Get an op by ID.
    pub fn get_op(&self, id: OpId) -> &Op {
        &self.ops[id.index()]
    }

    /// Get the type of a register.
    pub fn get_var_type(&self, var: VarId) -> KernelType {
        self.var_types[var.index()]
    }

    /// Number of blocks in this graph.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Number of ops in this graph.
    pub fn num_ops(&self) -> usize {
        self.ops.len()
    }

    /// Number of registers in this graph.
    pub fn num_vars(&self) -> usize {
        self.var_types.len()
    }

    /// All block ids in arena order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    /// Allocate a new op without placing it in a block.
    ///
    /// The caller must insert the returned id into exactly one block's
    /// sequence; the verifier rejects unplaced ops.
    pub fn alloc_op(&mut self, op: Op) -> OpId {
        let id = OpId(self.ops.len() as u32);
        self.ops.push(op);
        id
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Error during graph building.
#[derive(Debug, Clone)]
pub enum BuilderError {
    /// Referenced a block that was never created.
    UnknownBlock(BlockId),
    /// Graph has no blocks.
    NoBlocks,
}

impl std::fmt::Display for BuilderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuilderError::UnknownBlock(id) => write!(f, "Block {} does not exist", id),
            BuilderError::NoBlocks => write!(f, "Graph has no blocks"),
        }
    }
}

impl std::error::Error for BuilderError {}

/// Builder for constructing kernel graphs.
///
/// # Example
///
/// ```ignore
/// let mut builder = GraphBuilder::new();
/// let b0 = builder.entry();
/// let i = builder.add_var(KernelType::INT);
/// builder.push_op(b0, Op::Assign { dst: i, src: ConstValue::Int(0).into() })?;
/// let graph = builder.finish()?;
/// ```
pub struct GraphBuilder {
    graph: KernelGraph,
}

impl GraphBuilder {
    /// Create a new builder. The entry block (`BlockId(0)`) is created
    /// automatically.
    pub fn new() -> Self {
        GraphBuilder {
            graph: KernelGraph {
                blocks: vec![Block::default()],
                ops: Vec::new(),
                var_types: Vec::new(),
            },
        }
    }

    /// The entry block.
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    /// Allocate a new register with the given type.
    pub fn add_var(&mut self, ty: KernelType) -> VarId {
        let id = VarId(self.graph.var_types.len() as u32);
        self.graph.var_types.push(ty);
        id
    }

    /// Create a new empty block.
    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.graph.blocks.len() as u32);
        self.graph.blocks.push(Block::default());
        id
    }

    /// Append an op to the given block.
    pub fn push_op(&mut self, block: BlockId, op: Op) -> Result<OpId, BuilderError> {
        self.check(block)?;
        let id = self.graph.alloc_op(op);
        self.graph.get_block_mut(block).ops.push(id);
        Ok(id)
    }

    /// Record `dominator` as the immediate dominator of `block`.
    ///
    /// Also appends `block` to the dominator's `dominated` list, so calls for
    /// siblings must happen in the order the structurer expects (true child
    /// before false child, and so on).
    pub fn set_dominator(&mut self, block: BlockId, dominator: BlockId) -> Result<(), BuilderError> {
        self.check(block)?;
        self.check(dominator)?;
        self.graph.get_block_mut(block).dominator = Some(dominator);
        self.graph.get_block_mut(dominator).dominated.push(block);
        Ok(())
    }

    /// Add a CFG edge from `block` to `succ`.
    pub fn add_successor(&mut self, block: BlockId, succ: BlockId) -> Result<(), BuilderError> {
        self.check(block)?;
        self.check(succ)?;
        self.graph.get_block_mut(block).successors.push(succ);
        Ok(())
    }

    /// Mark `block` as a loop header and attach its loop descriptors.
    pub fn mark_loop_header(&mut self, block: BlockId, info: LoopInfo) -> Result<(), BuilderError> {
        self.check(block)?;
        let b = self.graph.get_block_mut(block);
        b.is_loop_header = true;
        b.loop_info = Some(info);
        Ok(())
    }

    /// Mark `block` as a loop end.
    pub fn mark_loop_end(&mut self, block: BlockId) -> Result<(), BuilderError> {
        self.check(block)?;
        self.graph.get_block_mut(block).is_loop_end = true;
        Ok(())
    }

    /// Mark `block` as a merge of forward control flow.
    pub fn mark_merge(&mut self, block: BlockId) -> Result<(), BuilderError> {
        self.check(block)?;
        self.graph.get_block_mut(block).is_merge = true;
        Ok(())
    }

    /// Finish building and return the graph.
    pub fn finish(self) -> Result<KernelGraph, BuilderError> {
        if self.graph.blocks.is_empty() {
            return Err(BuilderError::NoBlocks);
        }
        Ok(self.graph)
    }

    fn check(&self, block: BlockId) -> Result<(), BuilderError> {
        if block.index() >= self.graph.blocks.len() {
            return Err(BuilderError::UnknownBlock(block));
        }
        Ok(())
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::op::Value;
    use crate::ir::types::ConstValue;

    #[test]
    fn test_builder_diamond() {
        let mut b = GraphBuilder::new();
        let b0 = b.entry();
        let b1 = b.create_block();
        let b2 = b.create_block();
        let b3 = b.create_block();
        b.set_dominator(b1, b0).unwrap();
        b.set_dominator(b2, b0).unwrap();
        b.set_dominator(b3, b0).unwrap();
        b.add_successor(b0, b1).unwrap();
        b.add_successor(b0, b2).unwrap();
        b.add_successor(b1, b3).unwrap();
        b.add_successor(b2, b3).unwrap();

        let g = b.finish().unwrap();
        assert_eq!(g.num_blocks(), 4);
        assert_eq!(g.get_block(b0).dominated, vec![b1, b2, b3]);
        assert_eq!(g.get_block(b3).dominator, Some(b0));
        assert!(g.get_block(b0).dominator.is_none());
    }

    #[test]
    fn test_push_op_places_in_block() {
        let mut b = GraphBuilder::new();
        let b0 = b.entry();
        let v0 = b.add_var(KernelType::INT);
        let op = b
            .push_op(b0, Op::Assign { dst: v0, src: Value::Const(ConstValue::Int(7)) })
            .unwrap();

        let g = b.finish().unwrap();
        assert_eq!(g.get_block(b0).ops, vec![op]);
        assert_eq!(g.get_op(op).definition(), Some(v0));
        assert_eq!(g.get_var_type(v0), KernelType::INT);
    }

    #[test]
    fn test_unknown_block_rejected() {
        let mut b = GraphBuilder::new();
        let bogus = BlockId(99);
        let err = b.push_op(bogus, Op::LoopBreak).unwrap_err();
        assert!(matches!(err, BuilderError::UnknownBlock(id) if id == bogus));
    }
}
