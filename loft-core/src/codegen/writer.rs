//! Indented source accumulation and the kernel prototype line.

use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::ir::types::{AddressSpace, KernelType};
use crate::ir::VarId;

/// Accumulates emitted kernel source, one statement per line.
pub struct SourceWriter {
    output: String,
    /// Current indentation level
    indent: usize,
}

impl SourceWriter {
    pub fn new() -> Self {
        SourceWriter { output: String::new(), indent: 0 }
    }

    /// Emit one line at the current indentation.
    pub fn line(&mut self, text: &str) {
        writeln!(self.output, "{}{}", self.indent_str(), text).unwrap();
    }

    /// Open a brace-delimited scope and indent.
    pub fn begin_scope(&mut self) {
        self.line("{");
        self.indent += 1;
    }

    /// Dedent and close the scope.
    pub fn end_scope(&mut self) {
        self.indent -= 1;
        self.line("}");
    }

    pub fn finish(self) -> String {
        self.output
    }

    fn indent_str(&self) -> String {
        "    ".repeat(self.indent)
    }
}

impl Default for SourceWriter {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Prototype
// =============================================================================

/// A kernel parameter. Pointer parameters carry an address space; value
/// parameters do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelParam {
    /// Spelling in the parameter list and in the body.
    pub name: String,
    /// Register the parameter binds inside the body.
    pub var: VarId,
    pub ty: KernelType,
    pub space: Option<AddressSpace>,
}

impl KernelParam {
    pub fn pointer(name: impl Into<String>, var: VarId, ty: KernelType, space: AddressSpace) -> Self {
        KernelParam { name: name.into(), var, ty, space: Some(space) }
    }

    pub fn value(name: impl Into<String>, var: VarId, ty: KernelType) -> Self {
        KernelParam { name: name.into(), var, ty, space: None }
    }
}

/// Name and parameter list of an emitted kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelPrototype {
    pub name: String,
    pub params: Vec<KernelParam>,
}

impl KernelPrototype {
    pub fn new(name: impl Into<String>, params: Vec<KernelParam>) -> Self {
        KernelPrototype { name: name.into(), params }
    }

    /// The prototype line, without a trailing brace:
    /// `__kernel void name(__global float *a, int n)`.
    pub fn render(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| match p.space {
                Some(space) => format!("{} {} *{}", space, p.ty, p.name),
                None => format!("{} {}", p.ty, p.name),
            })
            .collect();
        format!("__kernel void {}({})", self.name, params.join(", "))
    }
}
