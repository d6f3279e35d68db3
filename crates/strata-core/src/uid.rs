//! Unique node identifiers.
//!
//! A [`Uid`] is a [`Ptr`] that is guaranteed to identify a node: never nil,
//! out-index 0 and flag 0. Sweeps convert between the two with
//! [`Uid::as_ptr`] / [`Uid::with_out_idx`] and [`Ptr::essential`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ptr::{Id, Level, Ptr};

/// A pointer stripped down to pure node identity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Uid(Ptr);

impl Uid {
    /// Uid of the internal node `(level, id)`.
    pub fn new(level: Level, id: Id) -> Self {
        Uid(Ptr::internal(level, id, false))
    }

    /// Uid of a terminal node.
    pub const fn terminal(value: bool) -> Self {
        Uid(Ptr::terminal(value))
    }

    /// Strips auxiliary bits off a non-nil pointer.
    pub fn from_ptr(p: Ptr) -> Self {
        debug_assert!(!p.is_nil(), "a uid cannot be nil");
        Uid(p.essential())
    }

    pub fn as_ptr(self) -> Ptr {
        self.0
    }

    /// The `ptr` for this node with the given out-slot attached.
    ///
    /// Exploits the layout: a uid already has zeroes where the out-index
    /// goes, so this is a single bit-or.
    pub fn with_out_idx(self, high: bool) -> Ptr {
        debug_assert!(self.0.is_internal(), "terminals have no out-slots");
        Ptr::from_raw(self.0.raw() | ((high as u64) << 1))
    }

    pub fn is_terminal(self) -> bool {
        self.0.is_terminal()
    }

    pub fn is_internal(self) -> bool {
        self.0.is_internal()
    }

    pub fn level(self) -> Level {
        self.0.level()
    }

    pub fn id(self) -> Id {
        self.0.id()
    }

    pub fn value(self) -> bool {
        self.0.value()
    }

    /// Negates the value if this identifies a terminal.
    pub fn cnot(self, negate: bool) -> Self {
        Uid(self.0.cnot(negate))
    }

    /// Moves an internal uid by `delta` levels.
    pub fn shifted(self, delta: i64) -> Self {
        Uid(self.0.shifted(delta))
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({:?})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_idx_attachment() {
        let u = Uid::new(3, 5);
        assert_eq!(u.with_out_idx(false), Ptr::internal(3, 5, false));
        assert_eq!(u.with_out_idx(true), Ptr::internal(3, 5, true));
    }

    #[test]
    fn from_ptr_strips_auxiliary_bits() {
        let p = Ptr::internal(2, 9, true).with_flag(true);
        let u = Uid::from_ptr(p);
        assert_eq!(u, Uid::new(2, 9));
    }

    #[test]
    fn terminal_uid() {
        let u = Uid::terminal(true);
        assert!(u.is_terminal());
        assert!(u.value());
        assert_eq!(u.cnot(true), Uid::terminal(false));
    }

    #[test]
    fn order_matches_ptr_order() {
        assert!(Uid::new(1, 0) < Uid::new(1, 1));
        assert!(Uid::new(1, 1) < Uid::new(2, 0));
        assert!(Uid::new(2, 0) < Uid::terminal(false));
    }
}
