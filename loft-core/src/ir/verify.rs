//! Graph verification pass.
//!
//! Verifies that a kernel graph satisfies the invariants the structurer
//! leans on:
//! - Every op id is in range and placed in exactly one block
//! - The dominator tree is rooted at the entry, acyclic, and covers every
//!   block, and parent/child records agree
//! - Loop descriptors sit exactly on loop headers and reference real blocks
//! - A switch op terminates its block and targets real blocks

use std::collections::HashSet;

use crate::ir::graph::KernelGraph;
use crate::ir::op::Op;
use crate::ir::{BlockId, OpId};

/// Verification error.
#[derive(Debug, Clone)]
pub enum VerifyError {
    /// A block sequence references an op id outside the arena.
    DanglingOpId { block: BlockId, op: OpId },

    /// An op id appears in more than one block sequence.
    OpInMultipleBlocks { op: OpId },

    /// An op was allocated but never placed in a block.
    UnplacedOp { op: OpId },

    /// The entry block records a dominator.
    EntryHasDominator,

    /// A block's `dominator` field disagrees with the parent whose
    /// `dominated` list contains it.
    DominatorMismatch { block: BlockId },

    /// Walking the dominator tree reaches a block twice.
    DominatorCycle { block: BlockId },

    /// A block is not reachable from the entry via the dominator tree.
    UnreachableFromEntry { block: BlockId },

    /// A dominated or successor entry points outside the graph.
    EdgeOutOfRange { block: BlockId, target: BlockId },

    /// A loop header carries no loop descriptors.
    MissingLoopInfo { block: BlockId },

    /// Loop descriptors attached to a block that is not a loop header.
    LoopInfoOnNonHeader { block: BlockId },

    /// Loop descriptors reference a block outside the graph.
    LoopIdOutOfRange { block: BlockId },

    /// A switch op is not the last op of its block.
    SwitchNotLast { block: BlockId },

    /// A switch target points outside the graph.
    SwitchTargetOutOfRange { block: BlockId, target: BlockId },
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::DanglingOpId { block, op } => {
                write!(f, "Block {} references op {} outside the arena", block, op)
            }
            VerifyError::OpInMultipleBlocks { op } => {
                write!(f, "Op {} is placed in more than one block", op)
            }
            VerifyError::UnplacedOp { op } => {
                write!(f, "Op {} is not placed in any block", op)
            }
            VerifyError::EntryHasDominator => {
                write!(f, "Entry block has a dominator")
            }
            VerifyError::DominatorMismatch { block } => {
                write!(f, "Block {} disagrees with its dominator's child list", block)
            }
            VerifyError::DominatorCycle { block } => {
                write!(f, "Dominator tree reaches block {} twice", block)
            }
            VerifyError::UnreachableFromEntry { block } => {
                write!(f, "Block {} is not reachable from the entry", block)
            }
            VerifyError::EdgeOutOfRange { block, target } => {
                write!(f, "Block {} has an edge to {} which does not exist", block, target)
            }
            VerifyError::MissingLoopInfo { block } => {
                write!(f, "Loop header {} has no loop descriptors", block)
            }
            VerifyError::LoopInfoOnNonHeader { block } => {
                write!(f, "Block {} carries loop descriptors but is not a loop header", block)
            }
            VerifyError::LoopIdOutOfRange { block } => {
                write!(f, "Loop descriptors of {} reference a block outside the graph", block)
            }
            VerifyError::SwitchNotLast { block } => {
                write!(f, "Switch in block {} is not the last op", block)
            }
            VerifyError::SwitchTargetOutOfRange { block, target } => {
                write!(f, "Switch in block {} targets {} which does not exist", block, target)
            }
        }
    }
}

impl std::error::Error for VerifyError {}

/// Verify that a kernel graph satisfies the structural invariants.
pub fn verify_graph(graph: &KernelGraph) -> Result<(), Vec<VerifyError>> {
    let mut verifier = Verifier::new(graph);
    verifier.verify();

    if verifier.errors.is_empty() { Ok(()) } else { Err(verifier.errors) }
}

struct Verifier<'a> {
    graph: &'a KernelGraph,
    /// Collected errors.
    errors: Vec<VerifyError>,
}

impl<'a> Verifier<'a> {
    fn new(graph: &'a KernelGraph) -> Self {
        Verifier { graph, errors: Vec::new() }
    }

    fn verify(&mut self) {
        self.verify_op_placement();
        self.verify_dominator_tree();

        for block_id in self.graph.block_ids() {
            self.verify_edges(block_id);
            self.verify_loop_info(block_id);
            self.verify_switch(block_id);
        }
    }

    /// Every op must live in exactly one block sequence.
    fn verify_op_placement(&mut self) {
        let mut owners = vec![0u32; self.graph.num_ops()];

        for block_id in self.graph.block_ids() {
            for &op in &self.graph.get_block(block_id).ops {
                match owners.get_mut(op.index()) {
                    Some(count) => *count += 1,
                    None => self.errors.push(VerifyError::DanglingOpId { block: block_id, op }),
                }
            }
        }

        for (index, count) in owners.iter().enumerate() {
            let op = OpId(index as u32);
            match count {
                0 => self.errors.push(VerifyError::UnplacedOp { op }),
                1 => {}
                _ => self.errors.push(VerifyError::OpInMultipleBlocks { op }),
            }
        }
    }

    /// The `dominated` lists must form a tree rooted at the entry whose
    /// parent pointers match.
    fn verify_dominator_tree(&mut self) {
        let entry = self.graph.entry();
        if self.graph.get_block(entry).dominator.is_some() {
            self.errors.push(VerifyError::EntryHasDominator);
        }

        let mut visited = HashSet::new();
        visited.insert(entry);
        let mut stack = vec![entry];

        while let Some(parent) = stack.pop() {
            for &child in &self.graph.get_block(parent).dominated {
                if child.index() >= self.graph.num_blocks() {
                    // Reported by verify_edges; skip so we do not index out
                    // of range here.
                    continue;
                }
                if !visited.insert(child) {
                    self.errors.push(VerifyError::DominatorCycle { block: child });
                    continue;
                }
                if self.graph.get_block(child).dominator != Some(parent) {
                    self.errors.push(VerifyError::DominatorMismatch { block: child });
                }
                stack.push(child);
            }
        }

        for block_id in self.graph.block_ids() {
            if !visited.contains(&block_id) {
                self.errors.push(VerifyError::UnreachableFromEntry { block: block_id });
            }
        }
    }

    fn verify_edges(&mut self, block_id: BlockId) {
        let block = self.graph.get_block(block_id);
        for &target in block.dominated.iter().chain(block.successors.iter()) {
            if target.index() >= self.graph.num_blocks() {
                self.errors.push(VerifyError::EdgeOutOfRange { block: block_id, target });
            }
        }
    }

    fn verify_loop_info(&mut self, block_id: BlockId) {
        let block = self.graph.get_block(block_id);
        match (&block.loop_info, block.is_loop_header) {
            (None, true) => {
                self.errors.push(VerifyError::MissingLoopInfo { block: block_id });
            }
            (Some(_), false) => {
                self.errors.push(VerifyError::LoopInfoOnNonHeader { block: block_id });
            }
            (Some(info), true) => {
                let in_range = info
                    .exits
                    .iter()
                    .chain(info.blocks.iter())
                    .chain(info.back_edges.iter())
                    .all(|id| id.index() < self.graph.num_blocks());
                if !in_range {
                    self.errors.push(VerifyError::LoopIdOutOfRange { block: block_id });
                }
            }
            (None, false) => {}
        }
    }

    fn verify_switch(&mut self, block_id: BlockId) {
        let ops = &self.graph.get_block(block_id).ops;
        for (index, &op_id) in ops.iter().enumerate() {
            if op_id.index() >= self.graph.num_ops() {
                continue;
            }
            if let Op::Switch { case_targets, default_target, .. } = self.graph.get_op(op_id) {
                if index + 1 != ops.len() {
                    self.errors.push(VerifyError::SwitchNotLast { block: block_id });
                }
                for &target in case_targets.iter().chain(default_target.iter()) {
                    if target.index() >= self.graph.num_blocks() {
                        self.errors.push(VerifyError::SwitchTargetOutOfRange {
                            block: block_id,
                            target,
                        });
                    }
                }
            }
        }
    }
}
