//! Kernel-language types, address spaces, and literal constants.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Scalar and vector types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl ScalarKind {
    /// Kernel-language spelling of the scalar type.
    pub fn type_name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::I8 => "char",
            ScalarKind::U8 => "uchar",
            ScalarKind::I16 => "short",
            ScalarKind::U16 => "ushort",
            ScalarKind::I32 => "int",
            ScalarKind::U32 => "uint",
            ScalarKind::I64 => "long",
            ScalarKind::U64 => "ulong",
            ScalarKind::F32 => "float",
            ScalarKind::F64 => "double",
        }
    }

    /// Prefix used when deriving register names (`i_3`, `ul_0`, ...).
    pub fn name_prefix(self) -> &'static str {
        match self {
            ScalarKind::Bool => "b",
            ScalarKind::I8 => "c",
            ScalarKind::U8 => "uc",
            ScalarKind::I16 => "s",
            ScalarKind::U16 => "us",
            ScalarKind::I32 => "i",
            ScalarKind::U32 => "ui",
            ScalarKind::I64 => "l",
            ScalarKind::U64 => "ul",
            ScalarKind::F32 => "f",
            ScalarKind::F64 => "d",
        }
    }
}

/// A scalar or short-vector kernel type. `lanes == 1` means scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KernelType {
    pub scalar: ScalarKind,
    pub lanes: u8,
}

impl KernelType {
    pub const BOOL: KernelType = KernelType::new(ScalarKind::Bool);
    pub const INT: KernelType = KernelType::new(ScalarKind::I32);
    pub const UINT: KernelType = KernelType::new(ScalarKind::U32);
    pub const LONG: KernelType = KernelType::new(ScalarKind::I64);
    pub const ULONG: KernelType = KernelType::new(ScalarKind::U64);
    pub const FLOAT: KernelType = KernelType::new(ScalarKind::F32);
    pub const DOUBLE: KernelType = KernelType::new(ScalarKind::F64);

    pub const fn new(scalar: ScalarKind) -> Self {
        KernelType { scalar, lanes: 1 }
    }

    pub const fn with_lanes(self, lanes: u8) -> Self {
        KernelType { scalar: self.scalar, lanes }
    }

    pub fn is_vector(self) -> bool {
        self.lanes > 1
    }

    /// Register-name prefix: scalar prefix plus the lane count for vectors.
    pub fn name_prefix(self) -> String {
        if self.is_vector() {
            format!("{}{}", self.scalar.name_prefix(), self.lanes)
        } else {
            self.scalar.name_prefix().to_string()
        }
    }
}

impl fmt::Display for KernelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_vector() {
            write!(f, "{}{}", self.scalar.type_name(), self.lanes)
        } else {
            f.write_str(self.scalar.type_name())
        }
    }
}

// =============================================================================
// Address spaces
// =============================================================================

/// Memory region qualifier carried by pointer casts and kernel parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressSpace {
    Global,
    Local,
    Constant,
    Private,
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AddressSpace::Global => "__global",
            AddressSpace::Local => "__local",
            AddressSpace::Constant => "__constant",
            AddressSpace::Private => "__private",
        })
    }
}

// =============================================================================
// Constants
// =============================================================================

/// Literal operand, rendered as a kernel-language constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    F32(f32),
    F64(f64),
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Bool(v) => write!(f, "{}", v),
            ConstValue::Int(v) => write!(f, "{}", v),
            ConstValue::Uint(v) => write!(f, "{}", v),
            // {:?} keeps a decimal point on round floats (1.0, not 1)
            ConstValue::F32(v) => write!(f, "{:?}F", v),
            ConstValue::F64(v) => write!(f, "{:?}", v),
        }
    }
}
