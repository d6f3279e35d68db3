//! Diagram handles and the two diagram kinds.
//!
//! A [`Diagram`] is a cheap handle: a shared node file plus an optional
//! level shift and, for BDDs, a negation flag. Both are applied on the fly
//! while streaming, never materialized. The kind (BDD or ZDD) is a
//! zero-sized type parameter carrying the reduction rule.

use std::marker::PhantomData;

use strata_core::{Children, CutType, Level, Node, Ptr, Result, Uid};
use strata_io::node_file::{NodeFile, SharedNodeFile};
use strata_io::stream::{RecordStream, ReverseRecordReader};

/// Kind-specific behavior: what "reduced" means and what a skipped level
/// stands for.
pub trait DiagramKind: Copy + Default + 'static {
    /// Applies reduction rule 1: the surviving child of a suppressible node.
    fn reduction_rule(node: &Node) -> Option<Ptr>;

    /// Children of the implicit node a skipped level represents.
    fn reduction_rule_inv(p: Ptr) -> Children;

    /// Whether the terminal with `value` denotes a constant function over
    /// any set of remaining variables.
    fn terminal_is_constant(value: bool) -> bool;
}

/// Reduced Ordered Binary Decision Diagrams.
#[derive(Debug, Clone, Copy, Default)]
pub struct BddKind;

impl DiagramKind for BddKind {
    fn reduction_rule(node: &Node) -> Option<Ptr> {
        (node.low == node.high).then_some(node.low)
    }

    fn reduction_rule_inv(p: Ptr) -> Children {
        [p, p]
    }

    fn terminal_is_constant(_value: bool) -> bool {
        true
    }
}

/// Zero-suppressed Decision Diagrams.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZddKind;

impl DiagramKind for ZddKind {
    fn reduction_rule(node: &Node) -> Option<Ptr> {
        (node.high == Ptr::terminal(false)).then_some(node.low)
    }

    fn reduction_rule_inv(p: Ptr) -> Children {
        [p, Ptr::terminal(false)]
    }

    fn terminal_is_constant(value: bool) -> bool {
        // The true terminal accepts only the all-absent assignment below it,
        // so it is not a constant once variables remain.
        !value
    }
}

/// A decision-diagram value: shared file, on-the-fly shift and negation.
pub struct Diagram<K: DiagramKind> {
    pub(crate) file: SharedNodeFile,
    pub(crate) negate: bool,
    pub(crate) shift: i64,
    _kind: PhantomData<K>,
}

pub type Bdd = Diagram<BddKind>;
pub type Zdd = Diagram<ZddKind>;

impl<K: DiagramKind> Clone for Diagram<K> {
    fn clone(&self) -> Self {
        Diagram { file: self.file.clone(), negate: self.negate, shift: self.shift, _kind: PhantomData }
    }
}

impl<K: DiagramKind> Diagram<K> {
    pub(crate) fn from_file(file: SharedNodeFile) -> Self {
        Diagram { file, negate: false, shift: 0, _kind: PhantomData }
    }

    pub(crate) fn terminal(value: bool) -> Result<Self> {
        Ok(Self::from_file(NodeFile::terminal(value)?))
    }

    /// Flips the negation flag; O(1).
    pub(crate) fn negated(&self) -> Self {
        let mut out = self.clone();
        out.negate = !out.negate;
        out
    }

    /// The same handle with the negation flag forced.
    pub(crate) fn with_negate(&self, negate: bool) -> Self {
        let mut out = self.clone();
        out.negate = negate;
        out
    }

    /// Adds a constant to every level; O(1).
    pub fn shifted(&self, delta: i64) -> Self {
        let mut out = self.clone();
        out.shift += delta;
        out
    }

    pub fn is_terminal(&self) -> bool {
        self.file.is_terminal()
    }

    pub fn terminal_value(&self) -> Option<bool> {
        self.file.terminal_value().map(|v| v != self.negate)
    }

    pub fn root_ptr(&self) -> Ptr {
        self.file.root().cnot(self.negate).shifted(self.shift).as_ptr()
    }

    /// Internal nodes in the diagram; 0 for a terminal.
    pub fn node_count(&self) -> u64 {
        if self.is_terminal() {
            0
        } else {
            self.file.meta.node_count
        }
    }

    /// Levels (variables) present in the diagram.
    pub fn level_count(&self) -> u64 {
        self.file.meta.level_count
    }

    pub fn width(&self) -> u64 {
        self.file.meta.width
    }

    /// Shallowest level, if any.
    pub fn top_level(&self) -> Option<Level> {
        if self.is_terminal() {
            None
        } else {
            Some((self.file.root().level() as i64 + self.shift) as Level)
        }
    }

    pub(crate) fn indexable(&self) -> bool {
        self.file.meta.indexable
    }

    fn cut_type(&self, ct: CutType) -> CutType {
        // Negation swaps which terminal the arcs reach.
        if self.negate {
            match ct {
                CutType::IncludeFalse => CutType::IncludeTrue,
                CutType::IncludeTrue => CutType::IncludeFalse,
                other => other,
            }
        } else {
            ct
        }
    }

    pub(crate) fn max_1level_cut(&self, ct: CutType) -> u64 {
        self.file.meta.max_1level_cut.get(self.cut_type(ct))
    }

    pub(crate) fn max_2level_cut(&self, ct: CutType) -> u64 {
        self.file.meta.max_2level_cut.get(self.cut_type(ct))
    }

    /// Node stream, root first, negation and shift applied.
    pub(crate) fn nodes(&self) -> Result<DiagramNodes> {
        Ok(DiagramNodes { inner: self.file.nodes()?, negate: self.negate, shift: self.shift })
    }

    /// Ascending level stream with the shift applied.
    pub(crate) fn level_stream(&self) -> Result<Box<dyn strata_io::LevelStream>> {
        Ok(Box::new(strata_io::level_merger::FileLevels::new(self.file.levels()?, self.shift)))
    }

    /// Levels in ascending order, as plain values.
    pub(crate) fn level_list(&self) -> Result<Vec<Level>> {
        let mut out = Vec::with_capacity(self.file.meta.level_count as usize);
        let mut r = self.file.levels()?;
        while let Some(li) = r.pull()? {
            out.push((li.level as i64 + self.shift) as Level);
        }
        Ok(out)
    }

    /// Whether two handles denote the same underlying file and view.
    pub(crate) fn same_handle(&self, other: &Self) -> bool {
        std::sync::Arc::ptr_eq(&self.file, &other.file) && self.shift == other.shift
    }

    /// Structural (and by canonicity, semantic) equality.
    pub fn equals(&self, other: &Self) -> Result<bool> {
        if self.same_handle(other) {
            return Ok(self.negate == other.negate);
        }
        if self.file.meta.node_count != other.file.meta.node_count
            || self.file.meta.level_count != other.file.meta.level_count
            || self.file.meta.width != other.file.meta.width
        {
            return Ok(false);
        }
        // Stream comparison with each side's negation and shift applied;
        // canonical form makes this a record-by-record equality.
        let mut a = self.nodes()?;
        let mut b = other.nodes()?;
        loop {
            match (a.pull()?, b.pull()?) {
                (None, None) => return Ok(true),
                (Some(x), Some(y)) if x == y => continue,
                _ => return Ok(false),
            }
        }
    }
}

impl<K: DiagramKind> std::fmt::Debug for Diagram<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagram")
            .field("nodes", &self.file.meta.node_count)
            .field("levels", &self.file.meta.level_count)
            .field("negate", &self.negate)
            .field("shift", &self.shift)
            .finish()
    }
}

/// A diagram's node stream with negation and shift applied on the fly.
pub(crate) struct DiagramNodes {
    inner: ReverseRecordReader<Node>,
    negate: bool,
    shift: i64,
}

impl DiagramNodes {
    fn transform(&self, n: Node) -> Node {
        n.cnot(self.negate).shifted(self.shift)
    }
}

impl RecordStream<Node> for DiagramNodes {
    fn peek(&mut self) -> Result<Option<Node>> {
        Ok(self.inner.peek()?.map(|n| self.transform(n)))
    }

    fn pull(&mut self) -> Result<Option<Node>> {
        Ok(self.inner.pull()?.map(|n| self.transform(n)))
    }
}

/// Random access over a diagram, negation and shift applied.
pub(crate) struct DiagramRandomAccess {
    inner: strata_io::NodeRandomAccess,
    negate: bool,
    shift: i64,
}

impl DiagramRandomAccess {
    pub(crate) fn open<K: DiagramKind>(dd: &Diagram<K>) -> Result<Self> {
        Ok(DiagramRandomAccess {
            inner: strata_io::NodeRandomAccess::open(&dd.file)?,
            negate: dd.negate,
            shift: dd.shift,
        })
    }

    pub(crate) fn setup_next_level(&mut self, level: Level) -> Result<()> {
        self.inner.setup_next_level((level as i64 - self.shift) as Level)
    }

    pub(crate) fn at(&self, uid: Uid) -> Node {
        self.inner.at(uid.shifted(-self.shift)).cnot(self.negate).shifted(self.shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::LevelInfo;
    use strata_io::NodeWriter;

    fn ithvar_file(level: Level) -> SharedNodeFile {
        let mut w = NodeWriter::new().unwrap();
        w.push_node(Node::new(Uid::new(level, 0), Ptr::terminal(false), Ptr::terminal(true))).unwrap();
        w.push_level(LevelInfo::new(level, 1)).unwrap();
        w.seal().unwrap()
    }

    #[test]
    fn zdd_rule_suppresses_high_to_false() {
        let n = Node::new(Uid::new(0, 0), Ptr::terminal(true), Ptr::terminal(false));
        assert_eq!(ZddKind::reduction_rule(&n), Some(Ptr::terminal(true)));
        assert_eq!(BddKind::reduction_rule(&n), None);
    }

    #[test]
    fn bdd_rule_suppresses_equal_children() {
        let n = Node::new(Uid::new(0, 0), Ptr::terminal(true), Ptr::terminal(true));
        assert_eq!(BddKind::reduction_rule(&n), Some(Ptr::terminal(true)));
        assert_eq!(ZddKind::reduction_rule(&n), None);
    }

    #[test]
    fn negation_is_a_flag_flip() {
        let f: Bdd = Diagram::from_file(ithvar_file(0));
        let g = f.negated();
        assert!(!f.equals(&g).unwrap());
        assert!(f.equals(&g.negated()).unwrap());

        let mut nodes = g.nodes().unwrap();
        let root = nodes.pull().unwrap().unwrap();
        assert_eq!(root.low, Ptr::terminal(true));
        assert_eq!(root.high, Ptr::terminal(false));
    }

    #[test]
    fn shift_moves_levels_in_streams() {
        let f: Bdd = Diagram::from_file(ithvar_file(1));
        let g = f.shifted(2);
        assert_eq!(g.top_level(), Some(3));
        let mut nodes = g.nodes().unwrap();
        assert_eq!(nodes.pull().unwrap().unwrap().uid, Uid::new(3, 0));
    }

    #[test]
    fn equality_is_structural_across_files() {
        let f: Bdd = Diagram::from_file(ithvar_file(4));
        let g: Bdd = Diagram::from_file(ithvar_file(4));
        let h: Bdd = Diagram::from_file(ithvar_file(5));
        assert!(f.equals(&g).unwrap());
        assert!(!f.equals(&h).unwrap());
        assert!(f.shifted(1).equals(&h).unwrap());
    }

    #[test]
    fn negation_swaps_terminal_cut_types() {
        let f: Bdd = Diagram::from_file(ithvar_file(0));
        let g = f.negated();
        assert_eq!(
            f.max_1level_cut(CutType::IncludeTrue),
            g.max_1level_cut(CutType::IncludeFalse)
        );
    }
}
