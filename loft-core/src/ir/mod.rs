//! Arena-indexed kernel IR.
//!
//! This representation uses a flat-arena approach where:
//! - Ops are stored in a single arena indexed by `OpId`
//! - Blocks hold sequences of `OpId`, so moving an op between blocks is an
//!   index move, never a pointer-graph mutation
//! - Register types live in a parallel table indexed by `VarId`
//!
//! Assumptions:
//! - The front end has already selected ops (including address casts and
//!   vector intrinsics) and computed the dominator tree and loop descriptors
//! - Block/edge topology is frozen once a graph is built; only op-to-block
//!   membership changes during structuring

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod graph;
pub mod op;
pub mod types;
pub mod verify;


// =============================================================================
// ID Types
// =============================================================================

/// Index into a graph's block arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for BlockId {
    fn from(raw: u32) -> Self {
        BlockId(raw)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Index into a graph's op arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpId(pub u32);

impl OpId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for OpId {
    fn from(raw: u32) -> Self {
        OpId(raw)
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op{}", self.0)
    }
}

/// Virtual register index into a graph's type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarId(pub u32);

impl VarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for VarId {
    fn from(raw: u32) -> Self {
        VarId(raw)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}
