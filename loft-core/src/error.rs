//! Error type shared by the compile-side passes.
//!
//! Every invariant violation in the backend is an [`InternalError`]: a class
//! tag, a message, and a trail of breadcrumbs appended as the error unwinds
//! through the structurer. Callers construct them through the crate-root
//! macros ([`err_structure!`](crate::err_structure),
//! [`bail_structure!`](crate::bail_structure),
//! [`err_render!`](crate::err_render), [`bail_render!`](crate::bail_render)).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, InternalError>;

/// Which class of invariant was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The control-flow graph breaks a structural rule (back-edge counts,
    /// non-converging exits, missing markers, malformed dominance).
    Structure,
    /// An op's operands do not fit its statement shape.
    Render,
}

impl ErrorKind {
    fn label(self) -> &'static str {
        match self {
            ErrorKind::Structure => "structural error",
            ErrorKind::Render => "render error",
        }
    }
}

/// Invariant violation inside the backend. Fatal for the current kernel;
/// never recovered from.
///
/// Breadcrumbs are attached innermost-first while the error unwinds, so the
/// display shows the failing op, then the block, then the kernel, without a
/// stack trace into compiler internals.
#[derive(Debug, Clone, Error)]
#[error("{}: {}{}", .kind.label(), .message, format_context(.context))]
pub struct InternalError {
    kind: ErrorKind,
    message: String,
    context: Vec<String>,
}

fn format_context(context: &[String]) -> String {
    let mut out = String::new();
    for frame in context {
        out.push_str("\n    in ");
        out.push_str(frame);
    }
    out
}

impl InternalError {
    pub fn structure(message: impl Into<String>) -> Self {
        InternalError {
            kind: ErrorKind::Structure,
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn render(message: impl Into<String>) -> Self {
        InternalError {
            kind: ErrorKind::Render,
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// Appends one breadcrumb frame; call sites add these as the error
    /// propagates outward.
    #[must_use]
    pub fn with_context(mut self, frame: impl Into<String>) -> Self {
        self.context.push(frame.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Breadcrumb frames, innermost first.
    pub fn context(&self) -> &[String] {
        &self.context
    }
}

/// Constructs a [`InternalError`](crate::error::InternalError) for a broken
/// structural invariant. Accepts `format!` arguments.
#[macro_export]
macro_rules! err_structure {
    ($($arg:tt)*) => {
        $crate::error::InternalError::structure(format!($($arg)*))
    };
}

/// Returns early with a structural [`InternalError`](crate::error::InternalError).
#[macro_export]
macro_rules! bail_structure {
    ($($arg:tt)*) => {
        return Err($crate::err_structure!($($arg)*))
    };
}

/// Constructs a [`InternalError`](crate::error::InternalError) for an operand
/// shape that does not fit its statement. Accepts `format!` arguments.
#[macro_export]
macro_rules! err_render {
    ($($arg:tt)*) => {
        $crate::error::InternalError::render(format!($($arg)*))
    };
}

/// Returns early with a render [`InternalError`](crate::error::InternalError).
#[macro_export]
macro_rules! bail_render {
    ($($arg:tt)*) => {
        return Err($crate::err_render!($($arg)*))
    };
}
