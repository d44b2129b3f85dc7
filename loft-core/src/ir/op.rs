//! Kernel operations and their operands.
//!
//! Every op is a single statement in the emitted kernel. Ops name at most one
//! defined register via [`Op::definition`] and expose their read operands in
//! rendering order via [`Op::uses`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::ir::types::{AddressSpace, ConstValue, KernelType};
use crate::ir::{BlockId, VarId};

// =============================================================================
// Values and expressions
// =============================================================================

/// Operand of an op: a register, a literal, or a nested expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Var(VarId),
    Const(ConstValue),
    Expr(Box<Expr>),
}

impl Value {
    /// Collects every register read anywhere inside this value.
    pub fn collect_vars(&self, out: &mut HashSet<VarId>) {
        match self {
            Value::Var(v) => {
                out.insert(*v);
            }
            Value::Const(_) => {}
            Value::Expr(e) => {
                for operand in e.operands() {
                    operand.collect_vars(out);
                }
            }
        }
    }
}

impl From<VarId> for Value {
    fn from(v: VarId) -> Self {
        Value::Var(v)
    }
}

impl From<ConstValue> for Value {
    fn from(c: ConstValue) -> Self {
        Value::Const(c)
    }
}

impl From<Expr> for Value {
    fn from(e: Expr) -> Self {
        Value::Expr(Box::new(e))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Binary { op: BinaryOp, lhs: Value, rhs: Value },
    Unary { op: UnaryOp, operand: Value },
    Call { intrinsic: String, args: Vec<Value> },
}

impl Expr {
    /// Direct operands, left to right.
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Expr::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Expr::Unary { operand, .. } => vec![operand],
            Expr::Call { args, .. } => args.iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    And,
    Or,
    Xor,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

// =============================================================================
// Memory operands
// =============================================================================

/// Base pointer plus an optional element offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryAccess {
    pub base: Value,
    pub offset: Option<Value>,
}

impl MemoryAccess {
    pub fn new(base: impl Into<Value>) -> Self {
        MemoryAccess { base: base.into(), offset: None }
    }

    pub fn with_offset(base: impl Into<Value>, offset: impl Into<Value>) -> Self {
        MemoryAccess { base: base.into(), offset: Some(offset.into()) }
    }
}

/// Pointer reinterpretation applied before a load or store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressCast {
    pub space: AddressSpace,
    pub ty: KernelType,
}

impl AddressCast {
    pub fn new(space: AddressSpace, ty: KernelType) -> Self {
        AddressCast { space, ty }
    }
}

/// Lane count of a vector load or store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorWidth {
    V2,
    V3,
    V4,
    V8,
    V16,
}

impl VectorWidth {
    pub fn lanes(self) -> u8 {
        match self {
            VectorWidth::V2 => 2,
            VectorWidth::V3 => 3,
            VectorWidth::V4 => 4,
            VectorWidth::V8 => 8,
            VectorWidth::V16 => 16,
        }
    }
}

// =============================================================================
// Ops
// =============================================================================

/// A single kernel statement.
///
/// The data ops (`Assign` through `Expr`) carry the kernel's arithmetic and
/// memory traffic. The remaining variants are control-flow markers consumed
/// by the structurer; some render as text (`LoopCondition`, `If`, `Switch`,
/// the breaks and case labels) and some render as nothing (`LoopInit`,
/// `LoopPost`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// `dst = src;` where `src` may be an expression tree.
    Assign { dst: VarId, src: Value },
    /// Register-to-register copy. `src` must not be an expression.
    Move { dst: VarId, src: Value },
    /// `dst = *((<space> <ty> *) base + offset);`
    Load { dst: VarId, cast: AddressCast, access: MemoryAccess },
    /// `dst = vloadN(index, (<space> <ty> *) base + offset);`
    VectorLoad {
        dst: VarId,
        width: VectorWidth,
        cast: AddressCast,
        index: Value,
        access: MemoryAccess,
    },
    /// `*((<space> <ty> *) base + offset) = src;`
    Store { cast: AddressCast, access: MemoryAccess, src: Value },
    /// `vstoreN(src, index, (<space> <ty> *) base + offset);`
    VectorStore {
        width: VectorWidth,
        cast: AddressCast,
        index: Value,
        access: MemoryAccess,
        src: Value,
    },
    /// Expression evaluated for effect, e.g. a barrier call.
    Expr { expr: Expr },

    /// `if (cond)`; the structurer supplies the braces and the else branch.
    If { cond: Value },
    /// Start-of-loop marker. Renders as nothing.
    LoopInit,
    /// `for (; cond; )`
    LoopCondition { cond: Value },
    /// End-of-loop-bookkeeping marker. Renders as nothing.
    LoopPost,
    /// `break;` out of the enclosing loop. Deferred to the end of its block.
    LoopBreak,
    /// `case key:` label. Inserted by the case-marker pass.
    Case { key: ConstValue },
    /// `default:` label. Inserted by the case-marker pass.
    DefaultCase,
    /// `break;` terminating a switch case.
    CaseBreak,
    /// `switch (selector)`; targets index blocks in the owning graph.
    Switch {
        selector: Value,
        case_keys: Vec<ConstValue>,
        case_targets: Vec<BlockId>,
        default_target: Option<BlockId>,
    },
}

impl Op {
    /// The register this op defines, if any.
    pub fn definition(&self) -> Option<VarId> {
        match self {
            Op::Assign { dst, .. }
            | Op::Move { dst, .. }
            | Op::Load { dst, .. }
            | Op::VectorLoad { dst, .. } => Some(*dst),
            _ => None,
        }
    }

    /// Read operands in rendering order.
    pub fn uses(&self) -> Vec<&Value> {
        match self {
            Op::Assign { src, .. } | Op::Move { src, .. } => vec![src],
            Op::Load { access, .. } => {
                let mut out = vec![&access.base];
                out.extend(access.offset.as_ref());
                out
            }
            Op::VectorLoad { index, access, .. } => {
                let mut out = vec![index, &access.base];
                out.extend(access.offset.as_ref());
                out
            }
            Op::Store { access, src, .. } => {
                let mut out = vec![&access.base];
                out.extend(access.offset.as_ref());
                out.push(src);
                out
            }
            Op::VectorStore { src, index, access, .. } => {
                let mut out = vec![src, index, &access.base];
                out.extend(access.offset.as_ref());
                out
            }
            Op::Expr { expr } => expr.operands(),
            Op::If { cond } | Op::LoopCondition { cond } => vec![cond],
            Op::Switch { selector, .. } => vec![selector],
            Op::LoopInit
            | Op::LoopPost
            | Op::LoopBreak
            | Op::Case { .. }
            | Op::DefaultCase
            | Op::CaseBreak => Vec::new(),
        }
    }

    /// Every register read anywhere in this op's operands.
    pub fn input_vars(&self) -> HashSet<VarId> {
        let mut out = HashSet::new();
        for value in self.uses() {
            value.collect_vars(&mut out);
        }
        out
    }

    pub fn is_assign(&self) -> bool {
        matches!(self, Op::Assign { .. })
    }

    pub fn is_loop_init(&self) -> bool {
        matches!(self, Op::LoopInit)
    }

    pub fn is_loop_condition(&self) -> bool {
        matches!(self, Op::LoopCondition { .. })
    }

    pub fn is_loop_post(&self) -> bool {
        matches!(self, Op::LoopPost)
    }

    pub fn is_loop_break(&self) -> bool {
        matches!(self, Op::LoopBreak)
    }

    /// True for the labels the case-marker pass inserts at a case head.
    pub fn is_case_marker(&self) -> bool {
        matches!(self, Op::Case { .. } | Op::DefaultCase)
    }
}
