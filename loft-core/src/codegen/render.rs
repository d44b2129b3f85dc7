//! Rendering of single ops into kernel-language statements.
//!
//! Each op renders to exactly one line of text. Control markers that carry
//! no text (`LoopInit`, `LoopPost`) render to the empty string and are
//! dropped by the structurer's line emission.

use crate::bail_render;
use crate::error::Result;
use crate::ir::graph::KernelGraph;
use crate::ir::op::{AddressCast, Expr, MemoryAccess, Op, Value};
use crate::ir::VarId;

// =============================================================================
// Names
// =============================================================================

/// Register spellings used in emitted source.
///
/// Derived names are kind-prefixed (`i_3`, `f_7`, `ul_0`, `f4_2`); kernel
/// parameters overwrite their register's entry with the parameter name.
pub struct NameTable {
    names: Vec<String>,
}

impl NameTable {
    pub fn from_graph(graph: &KernelGraph) -> Self {
        let names = graph
            .var_types
            .iter()
            .enumerate()
            .map(|(index, ty)| format!("{}_{}", ty.name_prefix(), index))
            .collect();
        NameTable { names }
    }

    pub fn set_name(&mut self, var: VarId, name: impl Into<String>) {
        self.names[var.index()] = name.into();
    }

    pub fn name(&self, var: VarId) -> &str {
        &self.names[var.index()]
    }
}

// =============================================================================
// Values and expressions
// =============================================================================

/// Render a value in statement position. A bare binary expression needs no
/// parentheses here.
pub fn render_value(value: &Value, names: &NameTable) -> String {
    match value {
        Value::Var(var) => names.name(*var).to_string(),
        Value::Const(c) => c.to_string(),
        Value::Expr(e) => render_expr(e, names),
    }
}

/// Render an expression without outer parentheses.
pub fn render_expr(expr: &Expr, names: &NameTable) -> String {
    match expr {
        Expr::Binary { op, lhs, rhs } => {
            format!(
                "{} {} {}",
                render_operand(lhs, names),
                op.symbol(),
                render_operand(rhs, names)
            )
        }
        Expr::Unary { op, operand } => {
            format!("{}{}", op.symbol(), render_operand(operand, names))
        }
        Expr::Call { intrinsic, args } => {
            let args: Vec<String> = args.iter().map(|a| render_value(a, names)).collect();
            format!("{}({})", intrinsic, args.join(", "))
        }
    }
}

/// Render a value in operand position: nested binary expressions get
/// parenthesized, calls and unaries do not.
fn render_operand(value: &Value, names: &NameTable) -> String {
    match value {
        Value::Expr(e) if matches!(**e, Expr::Binary { .. }) => {
            format!("({})", render_expr(e, names))
        }
        other => render_value(other, names),
    }
}

// =============================================================================
// Ops
// =============================================================================

fn render_cast(cast: &AddressCast) -> String {
    format!("({} {} *)", cast.space, cast.ty)
}

fn render_access(access: &MemoryAccess, names: &NameTable) -> String {
    match &access.offset {
        Some(offset) => {
            format!("{} + {}", render_operand(&access.base, names), render_operand(offset, names))
        }
        None => render_operand(&access.base, names),
    }
}

/// Render one op as a single statement (or structural fragment).
///
/// Returns the empty string for markers that carry no text.
pub fn render_op(op: &Op, names: &NameTable) -> Result<String> {
    let text = match op {
        Op::Assign { dst, src } => {
            format!("{} = {};", names.name(*dst), render_value(src, names))
        }
        Op::Move { dst, src } => {
            if matches!(src, Value::Expr(_)) {
                bail_render!("move source must be a register or literal");
            }
            format!("{} = {};", names.name(*dst), render_value(src, names))
        }
        Op::Load { dst, cast, access } => {
            format!(
                "{} = *({} {});",
                names.name(*dst),
                render_cast(cast),
                render_access(access, names)
            )
        }
        Op::VectorLoad { dst, width, cast, index, access } => {
            format!(
                "{} = vload{}({}, {} {});",
                names.name(*dst),
                width.lanes(),
                render_value(index, names),
                render_cast(cast),
                render_access(access, names)
            )
        }
        Op::Store { cast, access, src } => {
            format!(
                "*({} {}) = {};",
                render_cast(cast),
                render_access(access, names),
                render_value(src, names)
            )
        }
        Op::VectorStore { width, cast, index, access, src } => {
            format!(
                "vstore{}({}, {}, {} {});",
                width.lanes(),
                render_value(src, names),
                render_value(index, names),
                render_cast(cast),
                render_access(access, names)
            )
        }
        Op::Expr { expr } => format!("{};", render_expr(expr, names)),
        Op::If { cond } => format!("if ({})", render_value(cond, names)),
        Op::LoopCondition { cond } => format!("for (; {}; )", render_value(cond, names)),
        Op::LoopInit | Op::LoopPost => String::new(),
        Op::LoopBreak | Op::CaseBreak => "break;".to_string(),
        Op::Case { key } => format!("case {}:", key),
        Op::DefaultCase => "default:".to_string(),
        Op::Switch { selector, .. } => format!("switch ({})", render_value(selector, names)),
    };
    Ok(text)
}
