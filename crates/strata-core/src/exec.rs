//! Per-call execution knobs.
//!
//! An [`ExecPolicy`] selects between variants of the same algorithm; `Auto`
//! settings defer to heuristics over the input's cut and width metadata.

use serde::{Deserialize, Serialize};

/// Where the auxiliary data structures of a sweep may live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MemoryMode {
    #[default]
    Auto,
    Internal,
    External,
}

/// How a sweep obtains the children of its second per-level visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccessMode {
    #[default]
    Auto,
    PriorityQueue,
    RandomAccess,
}

/// Which multi-variable quantification algorithm to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuantifyAlgorithm {
    /// Repeat a single-variable sweep per level.
    Singleton,
    /// One outer sweep driving nested inner sweeps.
    #[default]
    Nested,
}

/// Execution policy handed down with each operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecPolicy {
    pub memory: MemoryMode,
    pub access: AccessMode,
    pub quantify: QuantifyAlgorithm,
}

impl ExecPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memory(mut self, memory: MemoryMode) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_access(mut self, access: AccessMode) -> Self {
        self.access = access;
        self
    }

    pub fn with_quantify(mut self, quantify: QuantifyAlgorithm) -> Self {
        self.quantify = quantify;
        self
    }
}
