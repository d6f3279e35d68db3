//! The node record streamed to disk.
//!
//! A [`Node`] is a uid plus its two children. Children always sit on a
//! strictly deeper level than the node itself. A terminal diagram is stored
//! as a single node whose uid is a terminal and whose children are nil.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ptr::Ptr;
use crate::uid::Uid;

/// The two children of a node, low slot first.
pub type Children = [Ptr; 2];

/// A decision-diagram node: `(uid, low, high)`.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub uid: Uid,
    pub low: Ptr,
    pub high: Ptr,
}

impl Node {
    pub fn new(uid: Uid, low: Ptr, high: Ptr) -> Self {
        debug_assert!(uid.is_terminal() || low.level() > uid.level(), "low child must be deeper");
        debug_assert!(uid.is_terminal() || high.level() > uid.level(), "high child must be deeper");
        Node { uid, low, high }
    }

    /// The single-node representation of a terminal diagram.
    pub fn terminal(value: bool) -> Self {
        Node { uid: Uid::terminal(value), low: Ptr::nil(), high: Ptr::nil() }
    }

    pub fn is_terminal(&self) -> bool {
        self.uid.is_terminal()
    }

    pub fn children(&self) -> Children {
        [self.low, self.high]
    }

    pub fn child(&self, high: bool) -> Ptr {
        if high {
            self.high
        } else {
            self.low
        }
    }

    /// Negates terminal values throughout (the O(1) complement applied on
    /// the fly while streaming).
    pub fn cnot(&self, negate: bool) -> Self {
        Node {
            uid: self.uid.cnot(negate),
            low: self.low.cnot(negate),
            high: self.high.cnot(negate),
        }
    }

    /// Moves the node and its internal children by `delta` levels.
    pub fn shifted(&self, delta: i64) -> Self {
        Node {
            uid: self.uid.shifted(delta),
            low: self.low.shifted(delta),
            high: self.high.shifted(delta),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({:?} -> {:?}, {:?})", self.uid, self.low, self.high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_by_slot() {
        let n = Node::new(Uid::new(0, 0), Ptr::terminal(false), Ptr::terminal(true));
        assert_eq!(n.child(false), Ptr::terminal(false));
        assert_eq!(n.child(true), Ptr::terminal(true));
        assert_eq!(n.children(), [n.low, n.high]);
    }

    #[test]
    fn cnot_flips_terminal_children_and_uid() {
        let n = Node::new(Uid::new(1, 0), Ptr::internal(2, 0, false), Ptr::terminal(true));
        let m = n.cnot(true);
        assert_eq!(m.uid, n.uid);
        assert_eq!(m.low, n.low);
        assert_eq!(m.high, Ptr::terminal(false));

        let t = Node::terminal(true).cnot(true);
        assert_eq!(t.uid, Uid::terminal(false));
    }

    #[test]
    fn shifted_moves_everything() {
        let n = Node::new(Uid::new(1, 3), Ptr::internal(4, 0, false), Ptr::terminal(true));
        let m = n.shifted(2);
        assert_eq!(m.uid, Uid::new(3, 3));
        assert_eq!(m.low.level(), 6);
        assert_eq!(m.high, Ptr::terminal(true));
    }

    #[test]
    fn terminal_node_shape() {
        let t = Node::terminal(false);
        assert!(t.is_terminal());
        assert!(!t.uid.value());
        assert!(t.low.is_nil() && t.high.is_nil());
    }
}
