pub mod codegen;
pub mod config;
pub mod error;
pub mod ir;
pub mod runtime;


// Re-export the entry points most embedders need
pub use codegen::{emit_kernel, KernelModule};
pub use error::{InternalError, Result};
pub use runtime::Runtime;
