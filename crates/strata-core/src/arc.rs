//! The arc record produced by top-down sweeps and consumed by Reduce.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ptr::Ptr;

/// A half-edge `source -> target`. The source's out-index bit records which
/// outgoing slot of the source node the arc leaves through; a nil source
/// marks the root arc.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arc {
    pub source: Ptr,
    pub target: Ptr,
}

impl Arc {
    pub fn new(source: Ptr, target: Ptr) -> Self {
        Arc { source, target }
    }

    /// Which out-slot of the source this arc leaves through.
    pub fn out_idx(&self) -> bool {
        self.source.out_idx()
    }

    /// Whether the arc ends in a terminal.
    pub fn is_terminal_arc(&self) -> bool {
        self.target.is_terminal()
    }
}

impl fmt::Debug for Arc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Arc({:?} -> {:?})", self.source, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_comes_from_source() {
        let a = Arc::new(Ptr::internal(0, 0, true), Ptr::terminal(true));
        assert!(a.out_idx());
        assert!(a.is_terminal_arc());

        let b = Arc::new(Ptr::internal(0, 0, false), Ptr::internal(1, 0, false));
        assert!(!b.out_idx());
        assert!(!b.is_terminal_arc());
    }
}
