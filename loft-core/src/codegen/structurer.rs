//! Structured control-flow reconstruction.
//!
//! Walks the dominator tree from the entry block and reconstitutes loops,
//! conditionals, and switches as nested scopes in the emitted source. Two
//! rewrites run against the op arena along the way:
//!
//! - Loop headers are reshaped for `for (; cond; )` emission: the condition
//!   op moves next to the init marker together with the assignments feeding
//!   it, and the rest of the header tail is relocated into the back-edge
//!   block so it re-executes at the end of every iteration.
//! - Switch case blocks receive `case`/`default` labels and closing breaks
//!   before the traversal starts.
//!
//! The walk assumes a verified graph. On malformed shape it returns a
//! structural error naming the offending block instead of panicking.

use std::collections::HashSet;

use log::trace;

use crate::codegen::render::{render_op, NameTable};
use crate::codegen::writer::SourceWriter;
use crate::error::Result;
use crate::ir::graph::KernelGraph;
use crate::ir::op::Op;
use crate::ir::types::ConstValue;
use crate::ir::{BlockId, OpId};
use crate::{bail_structure, err_structure};

// =============================================================================
// Rewrites
// =============================================================================

/// Reshape a loop header so its tail reads `init, feeders, condition, post`.
///
/// The condition op is pulled back next to the init marker together with the
/// assignments that feed it. Every other op between the init marker and the
/// condition is relocated into the back-edge block, in front of its final op,
/// where it re-executes each iteration. Running the rewrite on an already
/// shaped header changes nothing.
pub(crate) fn patch_loop_stms(
    graph: &mut KernelGraph,
    header: BlockId,
    backedge: BlockId,
) -> Result<()> {
    let (cond_pos, init_pos) = {
        let ops = &graph.get_block(header).ops;
        let cond_pos = ops
            .iter()
            .rposition(|&id| graph.get_op(id).is_loop_condition())
            .ok_or_else(|| err_structure!("loop header {} has no loop condition", header))?;
        let init_pos = ops[..cond_pos]
            .iter()
            .rposition(|&id| graph.get_op(id).is_loop_init())
            .ok_or_else(|| err_structure!("loop header {} has no loop init marker", header))?;
        (cond_pos, init_pos)
    };

    let mut seq = std::mem::take(&mut graph.get_block_mut(header).ops);
    let cond_id = seq.remove(cond_pos);
    let deps = graph.get_op(cond_id).input_vars();

    // Walk backwards from the condition to the init marker. Assignments that
    // feed the condition stay in the header; everything else (bar the post
    // marker) moves to the back edge.
    let mut prep: Vec<OpId> = Vec::new();
    let mut to_body: Vec<OpId> = Vec::new();
    let mut saw_post = false;
    let mut i = cond_pos;
    while i > init_pos + 1 {
        i -= 1;
        let op = graph.get_op(seq[i]);
        if op.is_loop_post() {
            saw_post = true;
            continue;
        }
        let feeds_condition = !saw_post
            && op.is_assign()
            && op.definition().map_or(false, |dst| deps.contains(&dst));
        if feeds_condition {
            prep.insert(0, seq.remove(i));
        } else {
            to_body.insert(0, seq.remove(i));
        }
    }

    let mut insert_at = init_pos + 1;
    for id in prep {
        seq.insert(insert_at, id);
        insert_at += 1;
    }
    seq.insert(insert_at, cond_id);
    graph.get_block_mut(header).ops = seq;

    if !to_body.is_empty() {
        let back = &mut graph.get_block_mut(backedge).ops;
        let at = back.len().saturating_sub(1);
        for (offset, id) in to_body.into_iter().enumerate() {
            back.insert(at + offset, id);
        }
    }
    Ok(())
}

/// Label switch case blocks before traversal.
///
/// Each case target gains a `case <key>:` marker at its head and a closing
/// `break;`; the default target gains a `default:` marker (replacing a case
/// label when the block serves as both, in which case the key falls through
/// to the default). Targets already carrying their labels are left alone, so
/// the pass can run repeatedly.
pub(crate) fn insert_case_markers(graph: &mut KernelGraph) -> Result<()> {
    let mut case_patches: Vec<(BlockId, ConstValue)> = Vec::new();
    let mut default_patches: Vec<BlockId> = Vec::new();

    for block_id in graph.block_ids() {
        let last = match graph.get_block(block_id).ops.last() {
            Some(&id) => id,
            None => continue,
        };
        if let Op::Switch { case_keys, case_targets, default_target, .. } = graph.get_op(last) {
            if case_keys.len() != case_targets.len() {
                bail_structure!(
                    "switch in block {} has {} keys for {} targets",
                    block_id,
                    case_keys.len(),
                    case_targets.len()
                );
            }
            for (&key, &target) in case_keys.iter().zip(case_targets.iter()) {
                case_patches.push((target, key));
            }
            if let Some(target) = default_target {
                default_patches.push(*target);
            }
        }
    }

    for (target, key) in case_patches {
        let labeled = leading_markers(graph, target)
            .any(|op| matches!(op, Op::Case { key: k } if *k == key));
        if !labeled {
            let label = graph.alloc_op(Op::Case { key });
            graph.get_block_mut(target).ops.insert(0, label);
        }
        let closed = graph
            .get_block(target)
            .ops
            .last()
            .map_or(false, |&id| matches!(graph.get_op(id), Op::CaseBreak));
        if !closed {
            let brk = graph.alloc_op(Op::CaseBreak);
            graph.get_block_mut(target).ops.push(brk);
        }
    }

    for target in default_patches {
        if leading_markers(graph, target).any(|op| matches!(op, Op::DefaultCase)) {
            continue;
        }
        let starts_with_case = graph
            .get_block(target)
            .ops
            .first()
            .map_or(false, |&id| matches!(graph.get_op(id), Op::Case { .. }));
        if starts_with_case {
            graph.get_block_mut(target).ops.remove(0);
            let trailing_break = graph
                .get_block(target)
                .ops
                .last()
                .map_or(false, |&id| matches!(graph.get_op(id), Op::CaseBreak));
            if trailing_break {
                graph.get_block_mut(target).ops.pop();
            }
        }
        let label = graph.alloc_op(Op::DefaultCase);
        graph.get_block_mut(target).ops.insert(0, label);
    }
    Ok(())
}

/// Case and default markers at the head of a block's sequence.
fn leading_markers<'g>(
    graph: &'g KernelGraph,
    block: BlockId,
) -> impl Iterator<Item = &'g Op> + 'g {
    graph
        .get_block(block)
        .ops
        .iter()
        .map(move |&id| graph.get_op(id))
        .take_while(|op| op.is_case_marker())
}

// =============================================================================
// Traversal
// =============================================================================

/// Emits structured source for a kernel graph by walking its dominator tree.
pub struct Structurer<'a> {
    graph: &'a mut KernelGraph,
    names: &'a NameTable,
    writer: &'a mut SourceWriter,
    /// Merge blocks held back until both branches of their conditional have
    /// been emitted.
    merges: HashSet<BlockId>,
}

impl<'a> Structurer<'a> {
    pub fn new(
        graph: &'a mut KernelGraph,
        names: &'a NameTable,
        writer: &'a mut SourceWriter,
    ) -> Self {
        Structurer { graph, names, writer, merges: HashSet::new() }
    }

    /// Walk the dominator tree from the entry and emit every region.
    pub fn emit(mut self) -> Result<()> {
        let entry = self.graph.entry();
        self.traverse(entry)
    }

    fn traverse(&mut self, block: BlockId) -> Result<()> {
        trace!("structuring {}", block);

        if self.graph.get_block(block).is_loop_end {
            self.patch_loop_end(block);
        }
        if !self.graph.get_block(block).is_loop_header {
            self.emit_block(block)?;
        }

        let dominated = self.graph.get_block(block).dominated.clone();
        let is_loop_header = self.graph.get_block(block).is_loop_header;

        if dominated.len() == 1 {
            if is_loop_header {
                bail_structure!("loop header {} dominates a single block", block);
            }
            return self.traverse(dominated[0]);
        }

        if is_loop_header {
            return self.traverse_loop(block, &dominated);
        }
        if self.is_if_block(block) {
            return self.traverse_if(block, &dominated);
        }
        if let Some(successor) = self.fallthrough_successor(block) {
            // A loop-end merge reached straight through a branch arm gets its
            // statements inlined here; the phi updates must run on this path
            // before the back edge.
            let succ = self.graph.get_block(successor);
            if succ.is_merge && succ.is_loop_end {
                self.emit_block(successor)?;
            }
            return Ok(());
        }
        if self.is_switch_block(block) {
            return self.traverse_switch(block, &dominated);
        }
        Ok(())
    }

    fn traverse_loop(&mut self, block: BlockId, dominated: &[BlockId]) -> Result<()> {
        if dominated.len() < 2 {
            bail_structure!("loop header {} must dominate its body and exit", block);
        }
        let info = self
            .graph
            .get_block(block)
            .loop_info
            .clone()
            .ok_or_else(|| err_structure!("loop header {} has no loop descriptors", block))?;

        let exit = if info.exits.len() > 1 {
            // More than one exit means break statements inside the loop body;
            // the exits must converge on a single merge block.
            let mut exit = info.exits[0];
            let outside: Vec<BlockId> = dominated
                .iter()
                .copied()
                .filter(|id| !info.exits.contains(id) && !info.blocks.contains(id))
                .collect();
            if outside.len() == 1 {
                exit = outside[0];
            }
            if !self.graph.get_block(exit).is_merge {
                bail_structure!("loop exits do not converge: block {}", block);
            }
            exit
        } else {
            match info.exits.first() {
                Some(&exit) => exit,
                None => bail_structure!("loop at {} has no exits", block),
            }
        };

        let inverted = dominated[0] == exit;
        let body = if inverted { dominated[1] } else { dominated[0] };

        if info.back_edges.len() != 1 {
            bail_structure!("loop at {} has {} back edges", block, info.back_edges.len());
        }
        let backedge = info.back_edges[0];

        patch_loop_stms(self.graph, block, backedge)?;
        self.emit_block(block)?;

        self.writer.begin_scope();
        self.traverse(body)?;
        self.writer.end_scope();

        self.traverse(exit)
    }

    fn traverse_if(&mut self, block: BlockId, dominated: &[BlockId]) -> Result<()> {
        if dominated.len() < 2 || dominated.len() > 3 {
            bail_structure!(
                "conditional block {} dominates {} blocks, expected 2 or 3",
                block,
                dominated.len()
            );
        }
        let true_branch = dominated[0];
        let false_branch = dominated[1];

        let mut deferred_merge = None;
        if dominated.len() == 3 {
            let merge = dominated[2];
            if self.merges.insert(merge) {
                deferred_merge = Some(merge);
            }
        }

        self.writer.begin_scope();
        self.traverse(true_branch)?;
        self.writer.end_scope();
        self.writer.line("else");
        self.writer.begin_scope();
        self.traverse(false_branch)?;
        self.writer.end_scope();

        if let Some(merge) = deferred_merge {
            self.merges.remove(&merge);
            self.traverse(merge)?;
        }
        Ok(())
    }

    fn traverse_switch(&mut self, block: BlockId, dominated: &[BlockId]) -> Result<()> {
        let last = match self.graph.get_block(block).ops.last() {
            Some(&id) => id,
            None => bail_structure!("switch block {} is empty", block),
        };
        let (case_targets, default_target) = match self.graph.get_op(last) {
            Op::Switch { case_targets, default_target, .. } => {
                (case_targets.clone(), *default_target)
            }
            _ => bail_structure!("block {} does not end in a switch", block),
        };

        self.writer.begin_scope();

        let mut emitted: HashSet<BlockId> = HashSet::new();
        for target in case_targets {
            if Some(target) == default_target || !emitted.insert(target) {
                continue;
            }
            self.require_case_label(target)?;
            self.emit_block(target)?;
        }
        if let Some(target) = default_target {
            self.require_case_label(target)?;
            self.emit_block(target)?;
        }

        self.writer.end_scope();

        // The switch exit is the lone successor, or the lone successor that is
        // not one of the dominated case bodies.
        let successors: HashSet<BlockId> =
            self.graph.get_block(block).successors.iter().copied().collect();
        let remaining: Vec<BlockId> = if successors.len() == 1 {
            successors.into_iter().collect()
        } else {
            successors.into_iter().filter(|id| !dominated.contains(id)).collect()
        };
        let exit = match remaining.as_slice() {
            [exit] => *exit,
            _ => bail_structure!("switch at {} does not have a unique exit", block),
        };

        self.traverse(exit)
    }

    /// Emit a block's ops as statements, tagged with a block comment.
    ///
    /// A loop break is held back and emitted last: the front end places the
    /// merge bookkeeping after the branch op, so emitting in sequence order
    /// would leave statements behind the break.
    fn emit_block(&mut self, block: BlockId) -> Result<()> {
        self.writer.line(&format!("// BLOCK {}", block.index()));

        let ops = self.graph.get_block(block).ops.clone();
        let mut deferred_break = None;
        for op_id in ops {
            if self.graph.get_op(op_id).is_loop_break() {
                deferred_break = Some(op_id);
                continue;
            }
            self.emit_op(block, op_id)?;
        }
        if let Some(op_id) = deferred_break {
            self.emit_op(block, op_id)?;
        }
        Ok(())
    }

    fn emit_op(&mut self, block: BlockId, op_id: OpId) -> Result<()> {
        let op = self.graph.get_op(op_id);
        trace!("emitting {} {:?}", op_id, op);
        let text = render_op(op, self.names)
            .map_err(|e| e.with_context(format!("{}@{} {:?}", block, op_id, op)))?;
        if !text.is_empty() {
            self.writer.line(&text);
        }
        Ok(())
    }

    fn require_case_label(&self, block: BlockId) -> Result<()> {
        let labeled = self
            .graph
            .get_block(block)
            .ops
            .first()
            .map_or(false, |&id| self.graph.get_op(id).is_case_marker());
        if labeled {
            Ok(())
        } else {
            Err(err_structure!("switch case block {} reached without a case label", block))
        }
    }

    /// Hook for reordering a loop-end block before emission; nothing needs
    /// it at present.
    fn patch_loop_end(&mut self, _block: BlockId) {}

    fn is_if_block(&self, block: BlockId) -> bool {
        self.ends_with(block, |op| matches!(op, Op::If { .. }))
    }

    fn is_switch_block(&self, block: BlockId) -> bool {
        self.ends_with(block, |op| matches!(op, Op::Switch { .. }))
    }

    fn ends_with(&self, block: BlockId, pred: impl Fn(&Op) -> bool) -> bool {
        self.graph
            .get_block(block)
            .ops
            .last()
            .map_or(false, |&id| pred(self.graph.get_op(id)))
    }

    /// The single CFG successor, when it is not a merge the walk is holding
    /// back.
    fn fallthrough_successor(&self, block: BlockId) -> Option<BlockId> {
        match self.graph.get_block(block).successors.as_slice() {
            [succ] if !self.merges.contains(succ) => Some(*succ),
            _ => None,
        }
    }
}
