#![cfg(test)]

use crate::codegen::render::NameTable;
use crate::codegen::structurer::{insert_case_markers, patch_loop_stms, Structurer};
use crate::codegen::writer::SourceWriter;
use crate::error::ErrorKind;
use crate::ir::graph::{GraphBuilder, KernelGraph, LoopInfo};
use crate::ir::op::{BinaryOp, Expr, Op, Value};
use crate::ir::types::{ConstValue, KernelType};
use crate::ir::{BlockId, VarId};

fn assign(dst: VarId, src: impl Into<Value>) -> Op {
    Op::Assign { dst, src: src.into() }
}

fn binary(op: BinaryOp, lhs: VarId, rhs: impl Into<Value>) -> Value {
    Expr::Binary { op, lhs: Value::Var(lhs), rhs: rhs.into() }.into()
}

fn emit_text(graph: &mut KernelGraph) -> crate::error::Result<String> {
    let names = NameTable::from_graph(graph);
    let mut writer = SourceWriter::new();
    Structurer::new(graph, &names, &mut writer).emit()?;
    Ok(writer.finish())
}

/// Entry b0, loop header b1 with body/back-edge b2, exit b3.
///
/// The header starts in front-end shape:
///   [init, i = i + 1, post, t = i * 2, u = 7, cond(t < n)]
/// so patching must keep `t = i * 2` with the condition and push the phi
/// update and the stray assignment into b2.
fn loop_fixture() -> KernelGraph {
    let mut b = GraphBuilder::new();
    let b0 = b.entry();
    let b1 = b.create_block();
    let b2 = b.create_block();
    let b3 = b.create_block();

    b.set_dominator(b1, b0).unwrap();
    b.set_dominator(b2, b1).unwrap();
    b.set_dominator(b3, b1).unwrap();
    b.add_successor(b0, b1).unwrap();
    b.add_successor(b1, b2).unwrap();
    b.add_successor(b1, b3).unwrap();
    b.add_successor(b2, b1).unwrap();

    let i = b.add_var(KernelType::INT); // i_0
    let n = b.add_var(KernelType::INT); // i_1
    let t = b.add_var(KernelType::INT); // i_2
    let u = b.add_var(KernelType::INT); // i_3
    let acc = b.add_var(KernelType::FLOAT); // f_4

    b.push_op(b0, assign(i, ConstValue::Int(0))).unwrap();
    b.push_op(b0, assign(acc, ConstValue::F32(0.0))).unwrap();

    b.push_op(b1, Op::LoopInit).unwrap();
    b.push_op(b1, assign(i, binary(BinaryOp::Add, i, ConstValue::Int(1)))).unwrap();
    b.push_op(b1, Op::LoopPost).unwrap();
    b.push_op(b1, assign(t, binary(BinaryOp::Mul, i, ConstValue::Int(2)))).unwrap();
    b.push_op(b1, assign(u, ConstValue::Int(7))).unwrap();
    b.push_op(b1, Op::LoopCondition { cond: binary(BinaryOp::Lt, t, n) }).unwrap();

    b.push_op(b2, assign(acc, binary(BinaryOp::Add, acc, i))).unwrap();
    b.push_op(
        b2,
        Op::Expr {
            expr: Expr::Call {
                intrinsic: "barrier".to_string(),
                args: vec![Value::Const(ConstValue::Int(1))],
            },
        },
    )
    .unwrap();

    b.push_op(b3, assign(u, ConstValue::Int(0))).unwrap();

    b.mark_loop_header(
        b1,
        LoopInfo { exits: vec![b3], blocks: vec![b1, b2], back_edges: vec![b2] },
    )
    .unwrap();
    b.mark_loop_end(b2).unwrap();
    b.mark_merge(b1).unwrap();

    b.finish().unwrap()
}

#[test]
fn test_patch_loop_header_shape() {
    let mut graph = loop_fixture();
    patch_loop_stms(&mut graph, BlockId(1), BlockId(2)).unwrap();

    let header: Vec<&Op> =
        graph.get_block(BlockId(1)).ops.iter().map(|&id| graph.get_op(id)).collect();
    assert_eq!(header.len(), 4);
    assert!(header[0].is_loop_init());
    assert_eq!(header[1].definition(), Some(VarId(2)), "t = i * 2 stays with the condition");
    assert!(header[2].is_loop_condition());
    assert!(header[3].is_loop_post());

    let body: Vec<&Op> =
        graph.get_block(BlockId(2)).ops.iter().map(|&id| graph.get_op(id)).collect();
    assert_eq!(body.len(), 4);
    assert_eq!(body[0].definition(), Some(VarId(4)));
    assert_eq!(body[1].definition(), Some(VarId(0)), "phi update lands in the back edge");
    assert_eq!(body[2].definition(), Some(VarId(3)));
    assert!(matches!(body[3], Op::Expr { .. }), "relocated ops stay in front of the final op");
}

#[test]
fn test_patch_is_idempotent() {
    let mut graph = loop_fixture();
    patch_loop_stms(&mut graph, BlockId(1), BlockId(2)).unwrap();
    let header = graph.get_block(BlockId(1)).ops.clone();
    let body = graph.get_block(BlockId(2)).ops.clone();

    patch_loop_stms(&mut graph, BlockId(1), BlockId(2)).unwrap();
    assert_eq!(graph.get_block(BlockId(1)).ops, header);
    assert_eq!(graph.get_block(BlockId(2)).ops, body);
}

#[test]
fn test_patch_requires_condition() {
    let mut b = GraphBuilder::new();
    let b0 = b.entry();
    b.push_op(b0, Op::LoopInit).unwrap();
    let mut graph = b.finish().unwrap();

    let err = patch_loop_stms(&mut graph, BlockId(0), BlockId(0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Structure);
    assert!(err.message().contains("no loop condition"));
}

#[test]
fn test_loop_emission() {
    let mut graph = loop_fixture();
    let text = emit_text(&mut graph).unwrap();
    let expected = "\
// BLOCK 0
i_0 = 0;
f_4 = 0.0F;
// BLOCK 1
i_2 = i_0 * 2;
for (; i_2 < i_1; )
{
    // BLOCK 2
    f_4 = f_4 + i_0;
    i_0 = i_0 + 1;
    i_3 = 7;
    barrier(1);
}
// BLOCK 3
i_3 = 0;
";
    assert_eq!(text, expected);
}

#[test]
fn test_emission_is_repeatable() {
    let mut graph = loop_fixture();
    let first = emit_text(&mut graph).unwrap();
    let second = emit_text(&mut graph).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_if_else_with_merge() {
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

    let a = b.add_var(KernelType::INT); // i_0
    let n = b.add_var(KernelType::INT); // i_1
    let x = b.add_var(KernelType::INT); // i_2
    let y = b.add_var(KernelType::INT); // i_3

    b.push_op(b0, Op::If { cond: binary(BinaryOp::Lt, a, n) }).unwrap();
    b.push_op(b1, assign(x, ConstValue::Int(1))).unwrap();
    b.push_op(b2, assign(x, ConstValue::Int(2))).unwrap();
    b.push_op(b3, assign(y, ConstValue::Int(3))).unwrap();
    b.mark_merge(b3).unwrap();

    let mut graph = b.finish().unwrap();
    let text = emit_text(&mut graph).unwrap();
    let expected = "\
// BLOCK 0
if (i_0 < i_1)
{
    // BLOCK 1
    i_2 = 1;
}
else
{
    // BLOCK 2
    i_2 = 2;
}
// BLOCK 3
i_3 = 3;
";
    assert_eq!(text, expected);
    assert_eq!(text.matches("// BLOCK 3").count(), 1, "merge is emitted exactly once");
}

/// Loop whose exit comes first in the dominated list; the body must still be
/// found on the other side.
#[test]
fn test_inverted_loop_children() {
    let mut b = GraphBuilder::new();
    let b0 = b.entry();
    let b1 = b.create_block();
    let b2 = b.create_block();
    let b3 = b.create_block();

    b.set_dominator(b1, b0).unwrap();
    b.set_dominator(b3, b1).unwrap(); // exit first
    b.set_dominator(b2, b1).unwrap(); // body second
    b.add_successor(b0, b1).unwrap();
    b.add_successor(b1, b2).unwrap();
    b.add_successor(b1, b3).unwrap();
    b.add_successor(b2, b1).unwrap();

    let i = b.add_var(KernelType::INT);
    let n = b.add_var(KernelType::INT);
    let x = b.add_var(KernelType::INT);

    b.push_op(b1, Op::LoopInit).unwrap();
    b.push_op(b1, Op::LoopCondition { cond: binary(BinaryOp::Lt, i, n) }).unwrap();
    b.push_op(b1, Op::LoopPost).unwrap();
    b.push_op(b2, assign(i, binary(BinaryOp::Add, i, ConstValue::Int(1)))).unwrap();
    b.push_op(b3, assign(x, ConstValue::Int(0))).unwrap();

    b.mark_loop_header(
        b1,
        LoopInfo { exits: vec![b3], blocks: vec![b1, b2], back_edges: vec![b2] },
    )
    .unwrap();
    b.mark_loop_end(b2).unwrap();

    let mut graph = b.finish().unwrap();
    let text = emit_text(&mut graph).unwrap();

    let body_at = text.find("// BLOCK 2").unwrap();
    let close_at = text.find("\n}").unwrap();
    let exit_at = text.find("// BLOCK 3").unwrap();
    assert!(body_at < close_at, "body is inside the loop scope");
    assert!(close_at < exit_at, "exit follows the loop scope");
}

fn multi_exit_loop(candidate_is_merge: bool) -> KernelGraph {
    let mut b = GraphBuilder::new();
    let b0 = b.entry();
    let b1 = b.create_block();
    let b2 = b.create_block();
    let b3 = b.create_block();
    let b4 = b.create_block();
    let b5 = b.create_block();

    b.set_dominator(b1, b0).unwrap();
    b.set_dominator(b2, b1).unwrap();
    b.set_dominator(b5, b1).unwrap();
    b.add_successor(b0, b1).unwrap();
    b.add_successor(b1, b2).unwrap();
    b.add_successor(b2, b1).unwrap();
    b.add_successor(b3, b5).unwrap();
    b.add_successor(b4, b5).unwrap();

    let i = b.add_var(KernelType::INT);
    let n = b.add_var(KernelType::INT);
    let x = b.add_var(KernelType::INT);

    b.push_op(b1, Op::LoopInit).unwrap();
    b.push_op(b1, Op::LoopCondition { cond: binary(BinaryOp::Lt, i, n) }).unwrap();
    b.push_op(b1, Op::LoopPost).unwrap();
    b.push_op(b2, assign(i, binary(BinaryOp::Add, i, ConstValue::Int(1)))).unwrap();
    b.push_op(b5, assign(x, ConstValue::Int(0))).unwrap();

    b.mark_loop_header(
        b1,
        LoopInfo { exits: vec![b3, b4], blocks: vec![b1, b2], back_edges: vec![b2] },
    )
    .unwrap();
    b.mark_loop_end(b2).unwrap();
    if candidate_is_merge {
        b.mark_merge(b5).unwrap();
    }

    b.finish().unwrap()
}

#[test]
fn test_multi_exit_loop_converges_on_merge() {
    let mut graph = multi_exit_loop(true);
    let text = emit_text(&mut graph).unwrap();
    assert!(text.contains("// BLOCK 5"), "converged exit is traversed");
}

#[test]
fn test_multi_exit_loop_without_merge_is_error() {
    let mut graph = multi_exit_loop(false);
    let err = emit_text(&mut graph).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Structure);
    assert!(err.message().contains("loop exits do not converge: block b1"));
}

#[test]
fn test_loop_with_two_back_edges_is_error() {
    let mut graph = loop_fixture();
    if let Some(info) = &mut graph.get_block_mut(BlockId(1)).loop_info {
        info.back_edges.push(BlockId(3));
    }
    let err = emit_text(&mut graph).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Structure);
    assert!(err.message().contains("loop at b1 has 2 back edges"));
}

fn switch_fixture() -> KernelGraph {
    let mut b = GraphBuilder::new();
    let b0 = b.entry();
    let b1 = b.create_block();
    let b2 = b.create_block();
    let b3 = b.create_block();
    let b4 = b.create_block();

    b.set_dominator(b1, b0).unwrap();
    b.set_dominator(b2, b0).unwrap();
    b.set_dominator(b3, b0).unwrap();
    b.add_successor(b0, b1).unwrap();
    b.add_successor(b0, b2).unwrap();
    b.add_successor(b0, b3).unwrap();
    b.add_successor(b0, b4).unwrap();

    let sel = b.add_var(KernelType::INT); // i_0
    let x = b.add_var(KernelType::INT); // i_1
    let y = b.add_var(KernelType::INT); // i_2

    b.push_op(b0, assign(sel, ConstValue::Int(7))).unwrap();
    b.push_op(
        b0,
        Op::Switch {
            selector: Value::Var(sel),
            case_keys: vec![ConstValue::Int(0), ConstValue::Int(1)],
            case_targets: vec![b1, b2],
            default_target: Some(b3),
        },
    )
    .unwrap();
    b.push_op(b1, assign(x, ConstValue::Int(1))).unwrap();
    b.push_op(b2, assign(x, ConstValue::Int(2))).unwrap();
    b.push_op(b3, assign(x, ConstValue::Int(3))).unwrap();
    b.push_op(b4, assign(y, ConstValue::Int(9))).unwrap();

    b.finish().unwrap()
}

#[test]
fn test_switch_emission() {
    let mut graph = switch_fixture();
    insert_case_markers(&mut graph).unwrap();
    let text = emit_text(&mut graph).unwrap();
    let expected = "\
// BLOCK 0
i_0 = 7;
switch (i_0)
{
    // BLOCK 1
    case 0:
    i_1 = 1;
    break;
    // BLOCK 2
    case 1:
    i_1 = 2;
    break;
    // BLOCK 3
    default:
    i_1 = 3;
}
// BLOCK 4
i_2 = 9;
";
    assert_eq!(text, expected);
}

#[test]
fn test_case_target_without_label_is_error() {
    let mut graph = switch_fixture();
    let err = emit_text(&mut graph).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Structure);
    assert!(err.message().contains("without a case label"));
}

#[test]
fn test_insert_case_markers_is_idempotent() {
    let mut graph = switch_fixture();
    insert_case_markers(&mut graph).unwrap();
    let snapshot: Vec<_> = graph.block_ids().map(|id| graph.get_block(id).ops.clone()).collect();

    insert_case_markers(&mut graph).unwrap();
    let again: Vec<_> = graph.block_ids().map(|id| graph.get_block(id).ops.clone()).collect();
    assert_eq!(snapshot, again);
}

/// A branch arm whose successor is the loop-end merge gets that block's
/// statements inlined, so the phi updates run on both paths to the back
/// edge.
#[test]
fn test_loop_end_merge_inlined_in_branch() {
    let mut b = GraphBuilder::new();
    let b0 = b.entry();
    let b1 = b.create_block(); // loop header
    let b2 = b.create_block(); // body, if block
    let b3 = b.create_block(); // true arm
    let b4 = b.create_block(); // loop-end merge, back edge
    let b5 = b.create_block(); // exit

    b.set_dominator(b1, b0).unwrap();
    b.set_dominator(b2, b1).unwrap();
    b.set_dominator(b5, b1).unwrap();
    b.set_dominator(b3, b2).unwrap();
    b.set_dominator(b4, b2).unwrap();
    b.add_successor(b0, b1).unwrap();
    b.add_successor(b1, b2).unwrap();
    b.add_successor(b1, b5).unwrap();
    b.add_successor(b2, b3).unwrap();
    b.add_successor(b2, b4).unwrap();
    b.add_successor(b3, b4).unwrap();
    b.add_successor(b4, b1).unwrap();

    let i = b.add_var(KernelType::INT); // i_0
    let n = b.add_var(KernelType::INT); // i_1
    let flag = b.add_var(KernelType::BOOL); // b_2
    let x = b.add_var(KernelType::INT); // i_3
    let y = b.add_var(KernelType::INT); // i_4

    b.push_op(b0, assign(i, ConstValue::Int(0))).unwrap();
    b.push_op(b1, Op::LoopInit).unwrap();
    b.push_op(b1, Op::LoopCondition { cond: binary(BinaryOp::Lt, i, n) }).unwrap();
    b.push_op(b1, Op::LoopPost).unwrap();
    b.push_op(b2, Op::If { cond: Value::Var(flag) }).unwrap();
    b.push_op(b3, assign(x, ConstValue::Int(1))).unwrap();
    b.push_op(b4, assign(i, binary(BinaryOp::Add, i, ConstValue::Int(1)))).unwrap();
    b.push_op(b5, assign(y, ConstValue::Int(9))).unwrap();

    b.mark_loop_header(
        b1,
        LoopInfo { exits: vec![b5], blocks: vec![b1, b2, b3, b4], back_edges: vec![b4] },
    )
    .unwrap();
    b.mark_merge(b1).unwrap();
    b.mark_merge(b4).unwrap();
    b.mark_loop_end(b4).unwrap();

    let mut graph = b.finish().unwrap();
    let text = emit_text(&mut graph).unwrap();

    assert_eq!(text.matches("// BLOCK 4").count(), 2, "phi update emitted on both paths");
    assert_eq!(text.matches("i_0 = i_0 + 1;").count(), 2);
    assert!(text.contains("if (b_2)"));
}

#[test]
fn test_loop_header_with_single_child_is_error() {
    let mut b = GraphBuilder::new();
    let b0 = b.entry();
    let b1 = b.create_block();
    let b2 = b.create_block();
    b.set_dominator(b1, b0).unwrap();
    b.set_dominator(b2, b1).unwrap();
    b.add_successor(b0, b1).unwrap();
    b.add_successor(b1, b2).unwrap();

    let i = b.add_var(KernelType::INT);
    b.push_op(b1, Op::LoopInit).unwrap();
    b.push_op(b1, Op::LoopCondition { cond: binary(BinaryOp::Lt, i, ConstValue::Int(4)) })
        .unwrap();
    b.push_op(b1, Op::LoopPost).unwrap();
    b.push_op(b2, assign(i, ConstValue::Int(0))).unwrap();
    b.mark_loop_header(
        b1,
        LoopInfo { exits: vec![b2], blocks: vec![b1], back_edges: vec![b1] },
    )
    .unwrap();

    let mut graph = b.finish().unwrap();
    let err = emit_text(&mut graph).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Structure);
    assert!(err.message().contains("dominates a single block"));
}
