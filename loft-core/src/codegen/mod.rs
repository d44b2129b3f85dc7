//! Kernel source emission.
//!
//! [`emit_kernel`] turns a verified [`KernelGraph`] plus a prototype into
//! kernel source text: the prototype line, register declarations grouped by
//! type, then the structured body.

pub mod render;
pub mod structurer;
pub mod writer;

#[cfg(test)]
mod structurer_tests;

use std::collections::HashSet;

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::bail_structure;
use crate::codegen::render::NameTable;
use crate::codegen::structurer::{insert_case_markers, Structurer};
use crate::codegen::writer::{KernelPrototype, SourceWriter};
use crate::error::Result;
use crate::ir::graph::KernelGraph;
use crate::ir::types::KernelType;
use crate::ir::verify::verify_graph;
use crate::ir::VarId;

/// A kernel ready for emission: prototype plus body graph.
///
/// This is also the on-disk envelope the command-line driver consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelModule {
    pub prototype: KernelPrototype,
    pub graph: KernelGraph,
}

impl KernelModule {
    /// Emit kernel source for this module.
    pub fn emit(&mut self) -> Result<String> {
        emit_kernel(&mut self.graph, &self.prototype)
    }
}

/// Emit kernel source text for a graph.
///
/// Verifies the graph, labels switch case blocks, then walks the dominator
/// tree emitting the structured body. The graph is left in its patched
/// shape; emitting twice produces the same text.
pub fn emit_kernel(graph: &mut KernelGraph, prototype: &KernelPrototype) -> Result<String> {
    emit(graph, prototype).map_err(|e| e.with_context(format!("kernel {}", prototype.name)))
}

fn emit(graph: &mut KernelGraph, prototype: &KernelPrototype) -> Result<String> {
    debug!(
        "emitting kernel {} ({} blocks, {} ops)",
        prototype.name,
        graph.num_blocks(),
        graph.num_ops()
    );

    if let Err(errors) = verify_graph(graph) {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        bail_structure!("invalid kernel graph: {}", messages.join("; "));
    }
    insert_case_markers(graph)?;

    let mut names = NameTable::from_graph(graph);
    for param in &prototype.params {
        names.set_name(param.var, param.name.clone());
    }

    let mut writer = SourceWriter::new();
    writer.line(&prototype.render());
    writer.begin_scope();
    for line in declaration_lines(graph, prototype, &names) {
        writer.line(&line);
    }
    Structurer::new(graph, &names, &mut writer).emit()?;
    writer.end_scope();

    Ok(writer.finish())
}

/// One declaration line per register type, covering every register the body
/// touches that is not bound by a parameter: `float f_1, f_4;`.
fn declaration_lines(
    graph: &KernelGraph,
    prototype: &KernelPrototype,
    names: &NameTable,
) -> Vec<String> {
    let params: HashSet<VarId> = prototype.params.iter().map(|p| p.var).collect();

    let mut used = vec![false; graph.num_vars()];
    for block_id in graph.block_ids() {
        for &op_id in &graph.get_block(block_id).ops {
            let op = graph.get_op(op_id);
            if let Some(dst) = op.definition() {
                used[dst.index()] = true;
            }
            for var in op.input_vars() {
                used[var.index()] = true;
            }
        }
    }

    let mut groups: IndexMap<KernelType, Vec<String>> = IndexMap::new();
    for (index, &used) in used.iter().enumerate() {
        let var = VarId(index as u32);
        if !used || params.contains(&var) {
            continue;
        }
        groups.entry(graph.get_var_type(var)).or_default().push(names.name(var).to_string());
    }

    groups
        .into_iter()
        .map(|(ty, group)| format!("{} {};", ty, group.join(", ")))
        .collect()
}
