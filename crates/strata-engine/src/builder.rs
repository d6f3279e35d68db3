//! Bottom-up construction of a diagram without going through an operation.
//!
//! Nodes are added deepest level first; within the current level the builder
//! applies the kind's reduction rule and deduplicates on `(low, high)` on
//! the fly, so well-formed input yields a reduced diagram directly. Level
//! order violations and references to pointers the builder never issued are
//! rejected without disturbing the builder's state.

use std::collections::HashMap;

use indexmap::IndexMap;

use strata_core::{Error, Id, Level, LevelInfo, Node, Ptr, Result, Uid};
use strata_io::NodeWriter;

use crate::diagram::{BddKind, Diagram, DiagramKind, ZddKind};

pub struct Builder<K: DiagramKind> {
    writer: NodeWriter,
    current_level: Option<Level>,
    /// Uniqueness map of the level being built: `(low, high)` to id.
    current: IndexMap<(Ptr, Ptr), Id>,
    /// Highest id issued per sealed or in-progress level.
    issued: HashMap<Level, Id>,
    /// Pointers without a referencing parent yet.
    unreferenced: indexmap::IndexSet<Ptr>,
    /// The most recently returned pointer; the root at `build`.
    latest: Option<Ptr>,
    _kind: std::marker::PhantomData<K>,
}

pub type BddBuilder = Builder<BddKind>;
pub type ZddBuilder = Builder<ZddKind>;

impl<K: DiagramKind> Builder<K> {
    pub fn new() -> Result<Self> {
        Ok(Builder {
            writer: NodeWriter::new()?,
            current_level: None,
            current: IndexMap::new(),
            issued: HashMap::new(),
            unreferenced: indexmap::IndexSet::new(),
            latest: None,
            _kind: std::marker::PhantomData,
        })
    }

    /// A terminal pointer.
    pub fn add_terminal(&mut self, value: bool) -> Ptr {
        let p = Ptr::terminal(value);
        self.latest = Some(p);
        p
    }

    /// Adds (or finds) the node `(level, low, high)` and returns its
    /// pointer.
    ///
    /// Children must be terminals or pointers issued by this builder on a
    /// strictly deeper level; `level` must not be deeper than any earlier
    /// `add_node` call.
    pub fn add_node(&mut self, level: Level, low: Ptr, high: Ptr) -> Result<Ptr> {
        self.check_child(level, low)?;
        self.check_child(level, high)?;
        if let Some(cur) = self.current_level {
            if level > cur {
                return Err(Error::InvalidLevel { level });
            }
            if level < cur {
                self.flush_level()?;
                self.current_level = Some(level);
            }
        } else {
            self.current_level = Some(level);
        }

        // Reduction rule 1 on the fly.
        if let Some(child) = K::reduction_rule(&Node::new(Uid::new(level, 0), low, high)) {
            self.latest = Some(child);
            return Ok(child);
        }

        // Uniqueness within the level.
        let next_id = self.current.len() as Id;
        let id = *self.current.entry((low, high)).or_insert(next_id);
        let p = Uid::new(level, id).as_ptr();
        if id == next_id {
            self.issued.insert(level, id);
            self.unreferenced.insert(p);
            self.unreferenced.swap_remove(&low.essential());
            self.unreferenced.swap_remove(&high.essential());
        }
        self.latest = Some(p);
        Ok(p)
    }

    fn check_child(&self, level: Level, child: Ptr) -> Result<()> {
        if child.is_terminal() {
            return Ok(());
        }
        if child.is_nil() {
            return Err(Error::UnknownChild { child });
        }
        if child.level() <= level {
            return Err(Error::InvalidLevel { level });
        }
        match self.issued.get(&child.level()) {
            Some(&max) if child.id() <= max => Ok(()),
            _ => Err(Error::UnknownChild { child }),
        }
    }

    fn flush_level(&mut self) -> Result<()> {
        let Some(level) = self.current_level else {
            return Ok(());
        };
        let width = self.current.len() as u64;
        if width == 0 {
            return Ok(());
        }
        // Ids were issued ascending; the file wants them descending.
        for (idx, (&(low, high), &id)) in self.current.iter().enumerate().rev() {
            debug_assert_eq!(id, idx as Id);
            self.writer.push_node(Node::new(Uid::new(level, id), low, high))?;
        }
        self.writer.push_level(LevelInfo::new(level, width))?;
        self.current.clear();
        Ok(())
    }

    /// Seals the builder into a diagram rooted at the most recent pointer.
    ///
    /// Fails if any other node was left without a parent.
    pub fn build(mut self) -> Result<Diagram<K>> {
        self.flush_level()?;
        let root = self
            .latest
            .ok_or_else(|| Error::invalid_argument("cannot build an empty diagram"))?;

        if root.is_terminal() {
            if !self.unreferenced.is_empty() {
                return Err(Error::invalid_argument("a built node is unreachable from the root"));
            }
            return Diagram::terminal(root.value());
        }

        if self.unreferenced.len() > 1
            || (self.unreferenced.len() == 1 && !self.unreferenced.contains(&root))
        {
            return Err(Error::invalid_argument("a built node is unreachable from the root"));
        }
        Ok(Diagram::from_file(self.writer.seal()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_example_metrics() {
        // p2 = (2, false, true), p1 = (1, p2, true), p0 = (0, p2, p1).
        let mut b = BddBuilder::new().unwrap();
        let p2 = b.add_node(2, Ptr::terminal(false), Ptr::terminal(true)).unwrap();
        let p1 = b.add_node(1, p2, Ptr::terminal(true)).unwrap();
        let p0 = b.add_node(0, p2, p1).unwrap();
        assert_eq!(p0, Uid::new(0, 0).as_ptr());

        let f = b.build().unwrap();
        assert_eq!(f.node_count(), 3);
        assert_eq!(f.level_count(), 3);
        assert_eq!(f.top_level(), Some(0));
    }

    #[test]
    fn rule_one_returns_the_child() {
        let mut b = BddBuilder::new().unwrap();
        let t = Ptr::terminal(true);
        assert_eq!(b.add_node(3, t, t).unwrap(), t);

        let mut z = ZddBuilder::new().unwrap();
        let lo = Ptr::terminal(true);
        assert_eq!(z.add_node(3, lo, Ptr::terminal(false)).unwrap(), lo);
    }

    #[test]
    fn duplicate_children_share_a_node() {
        let mut b = BddBuilder::new().unwrap();
        let a = b.add_node(1, Ptr::terminal(false), Ptr::terminal(true)).unwrap();
        let c = b.add_node(1, Ptr::terminal(false), Ptr::terminal(true)).unwrap();
        assert_eq!(a, c);
        let root = b.add_node(0, a, Ptr::terminal(true)).unwrap();
        let f = b.build().unwrap();
        assert_eq!(root, Uid::new(0, 0).as_ptr());
        assert_eq!(f.node_count(), 2);
    }

    #[test]
    fn level_order_violation_is_rejected_without_side_effects() {
        let mut b = BddBuilder::new().unwrap();
        let a = b.add_node(2, Ptr::terminal(false), Ptr::terminal(true)).unwrap();
        assert!(matches!(
            b.add_node(3, Ptr::terminal(false), Ptr::terminal(true)),
            Err(Error::InvalidLevel { level: 3 })
        ));
        // The builder still works afterwards.
        let root = b.add_node(0, a, Ptr::terminal(true)).unwrap();
        assert_eq!(root, Uid::new(0, 0).as_ptr());
        assert!(b.build().is_ok());
    }

    #[test]
    fn unknown_children_are_rejected() {
        let mut b = BddBuilder::new().unwrap();
        let foreign = Uid::new(5, 3).as_ptr();
        assert!(matches!(
            b.add_node(1, foreign, Ptr::terminal(true)),
            Err(Error::UnknownChild { .. })
        ));
        assert!(matches!(
            b.add_node(1, Ptr::nil(), Ptr::terminal(true)),
            Err(Error::UnknownChild { .. })
        ));
    }

    #[test]
    fn children_on_the_same_level_are_invalid() {
        let mut b = BddBuilder::new().unwrap();
        let a = b.add_node(2, Ptr::terminal(false), Ptr::terminal(true)).unwrap();
        assert!(matches!(
            b.add_node(2, a, Ptr::terminal(true)),
            Err(Error::InvalidLevel { level: 2 })
        ));
    }

    #[test]
    fn terminal_only_builders_build_constants() {
        let mut b = BddBuilder::new().unwrap();
        b.add_terminal(true);
        let f = b.build().unwrap();
        assert_eq!(f.terminal_value(), Some(true));
    }

    #[test]
    fn unreachable_nodes_fail_the_build() {
        let mut b = BddBuilder::new().unwrap();
        let _orphan = b.add_node(2, Ptr::terminal(false), Ptr::terminal(true)).unwrap();
        let _root = b.add_node(1, Ptr::terminal(true), Ptr::terminal(false)).unwrap();
        assert!(b.build().is_err());
    }
}
