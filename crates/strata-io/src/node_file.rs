//! Levelized node files: the on-disk form of a reduced diagram.
//!
//! Physically two record streams plus a sidecar metadata header: nodes in
//! descending uid order (deepest level first, as Reduce and the builder emit
//! them) and one level-info record per level in the same order. Top-down
//! consumers read both streams reversed, so the root comes first.
//!
//! Files are reference counted through [`SharedNodeFile`]; the scratch files
//! unlink when the last handle drops.

use std::sync::Arc as StdArc;

use serde::{Deserialize, Serialize};
use tempfile::TempPath;

use strata_core::{Cuts, Error, Id, Level, LevelInfo, Node, Ptr, Result, Uid};

use crate::stream::{RecordReader, RecordStream, RecordWriter, ReverseRecordReader};

/// Sidecar metadata of a node file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeFileMeta {
    /// Records in the node stream (1 for a terminal diagram).
    pub node_count: u64,
    pub level_count: u64,
    /// Maximum per-level node count.
    pub width: u64,
    /// Arcs into the false/true terminal (the root arc, for a terminal
    /// diagram).
    pub terminal_arcs: [u64; 2],
    pub max_1level_cut: Cuts,
    pub max_2level_cut: Cuts,
    /// True iff every level's ids are contiguous from 0, enabling
    /// `(level, id)` random access.
    pub indexable: bool,
    /// The root uid (terminal uid for a terminal diagram).
    pub root: Uid,
}

/// A sealed levelized node file.
pub struct NodeFile {
    pub meta: NodeFileMeta,
    nodes: TempPath,
    levels: TempPath,
    _meta_sidecar: Option<TempPath>,
}

/// Cheap-to-copy shared handle; the file is unlinked when the last one
/// drops.
pub type SharedNodeFile = StdArc<NodeFile>;

impl NodeFile {
    /// The single-node file of a terminal diagram.
    pub fn terminal(value: bool) -> Result<SharedNodeFile> {
        let mut w = NodeWriter::new()?;
        w.push_node(Node::terminal(value))?;
        w.seal()
    }

    pub fn is_terminal(&self) -> bool {
        self.meta.level_count == 0
    }

    /// Value of a terminal diagram.
    pub fn terminal_value(&self) -> Option<bool> {
        if self.is_terminal() {
            Some(self.meta.root.value())
        } else {
            None
        }
    }

    pub fn root(&self) -> Uid {
        self.meta.root
    }

    /// Node stream, root first.
    pub fn nodes(&self) -> Result<ReverseRecordReader<Node>> {
        ReverseRecordReader::open(&self.nodes, self.meta.node_count)
    }

    /// Node stream in physical order, deepest level first.
    pub fn nodes_bottomup(&self) -> Result<RecordReader<Node>> {
        RecordReader::open(&self.nodes, self.meta.node_count)
    }

    /// Level stream in ascending level order.
    pub fn levels(&self) -> Result<ReverseRecordReader<LevelInfo>> {
        ReverseRecordReader::open(&self.levels, self.meta.level_count)
    }

    /// Level stream in descending level order (physical order).
    pub fn levels_bottomup(&self) -> Result<RecordReader<LevelInfo>> {
        RecordReader::open(&self.levels, self.meta.level_count)
    }

    /// Raw byte-stream comparison of two node files' record streams.
    ///
    /// Canonicity makes this the whole equality test: equivalent reduced
    /// diagrams are bit-identical.
    pub fn stream_equal(a: &NodeFile, b: &NodeFile) -> Result<bool> {
        if a.meta.node_count != b.meta.node_count || a.meta.level_count != b.meta.level_count {
            return Ok(false);
        }
        let mut ra = a.nodes_bottomup()?;
        let mut rb = b.nodes_bottomup()?;
        while let (Some(na), Some(nb)) = (ra.pull()?, rb.pull()?) {
            if na != nb {
                return Ok(false);
            }
        }
        let mut la = a.levels_bottomup()?;
        let mut lb = b.levels_bottomup()?;
        while let (Some(ia), Some(ib)) = (la.pull()?, lb.pull()?) {
            if ia != ib {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Tears the file open for appending shallower levels; used by the outer
    /// sweep of nested sweeping. Fails if other handles are still alive.
    pub fn resume(shared: SharedNodeFile) -> Result<NodeWriter> {
        let file = StdArc::try_unwrap(shared)
            .map_err(|_| Error::unreachable("resuming a node file with live handles"))?;
        NodeWriter::resume(file)
    }
}

impl std::fmt::Debug for NodeFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeFile").field("meta", &self.meta).finish()
    }
}

/// Streams nodes (strictly descending by uid) and level infos (descending by
/// level) into a fresh node file, accumulating the metadata.
pub struct NodeWriter {
    nodes: RecordWriter<Node>,
    levels: RecordWriter<LevelInfo>,
    width: u64,
    terminal_arcs: [u64; 2],
    indexable: bool,
    last_uid: Option<Uid>,
    last_level: Option<Level>,
    // id contiguity tracking within the level currently being written
    level_first_id: Option<Id>,
    level_nodes: u64,
    cuts: Option<(Cuts, Cuts)>,
}

impl NodeWriter {
    pub fn new() -> Result<Self> {
        Ok(NodeWriter {
            nodes: RecordWriter::create()?,
            levels: RecordWriter::create()?,
            width: 0,
            terminal_arcs: [0, 0],
            indexable: true,
            last_uid: None,
            last_level: None,
            level_first_id: None,
            level_nodes: 0,
            cuts: None,
        })
    }

    fn resume(file: NodeFile) -> Result<Self> {
        let meta = file.meta;
        Ok(NodeWriter {
            nodes: RecordWriter::append(file.nodes, meta.node_count)?,
            levels: RecordWriter::append(file.levels, meta.level_count)?,
            width: meta.width,
            terminal_arcs: meta.terminal_arcs,
            indexable: meta.indexable,
            last_uid: Some(meta.root),
            last_level: if meta.level_count == 0 { None } else { Some(meta.root.level()) },
            level_first_id: None,
            level_nodes: 0,
            cuts: None,
        })
    }

    pub fn push_node(&mut self, node: Node) -> Result<()> {
        debug_assert!(
            self.last_uid.map_or(true, |last| node.uid < last),
            "nodes must arrive in strictly descending uid order"
        );
        self.last_uid = Some(node.uid);
        if node.uid.is_internal() {
            if self.level_first_id.is_none() {
                self.level_first_id = Some(node.uid.id());
                self.level_nodes = 0;
            }
            self.level_nodes += 1;
            for child in node.children() {
                if child.is_terminal() {
                    self.terminal_arcs[child.value() as usize] += 1;
                }
            }
        } else {
            self.terminal_arcs[node.uid.value() as usize] += 1;
        }
        self.nodes.push(&node)
    }

    pub fn push_level(&mut self, info: LevelInfo) -> Result<()> {
        debug_assert!(
            self.last_level.map_or(true, |last| info.level < last),
            "levels must arrive in strictly descending order"
        );
        self.last_level = Some(info.level);
        self.width = self.width.max(info.width);
        // A level is indexable when its ids run contiguously down to 0.
        let contiguous = self.level_first_id == Some(info.width.saturating_sub(1))
            && self.level_nodes == info.width;
        self.indexable &= contiguous;
        self.level_first_id = None;
        self.level_nodes = 0;
        self.levels.push(&info)
    }

    /// Records the exact cuts computed by the producing sweep. Without this,
    /// sealing falls back to conservative size-based bounds.
    pub fn set_cuts(&mut self, one_level: Cuts, two_level: Cuts) {
        self.cuts = Some((one_level, two_level));
    }

    pub fn node_count(&self) -> u64 {
        self.nodes.len()
    }

    pub fn seal(self) -> Result<SharedNodeFile> {
        let root = self
            .last_uid
            .ok_or_else(|| Error::unreachable("sealing an empty node file"))?;
        let (one, two) = self.cuts.unwrap_or_else(|| {
            // Any 1-level cut is at most all arcs; the root arc keeps the
            // bound positive for terminal diagrams.
            let arcs = self.nodes.len().saturating_mul(2).saturating_add(1);
            (Cuts::uniform(arcs), Cuts::uniform(arcs.saturating_add(self.nodes.len())))
        });
        let meta = NodeFileMeta {
            node_count: self.nodes.len(),
            level_count: self.levels.len(),
            width: self.width,
            terminal_arcs: self.terminal_arcs,
            max_1level_cut: one,
            max_2level_cut: two,
            indexable: self.indexable,
            root,
        };
        let (nodes, _) = self.nodes.finish()?;
        let (levels, _) = self.levels.finish()?;
        let sidecar = write_sidecar(&meta)?;
        tracing::debug!(
            nodes = meta.node_count,
            levels = meta.level_count,
            width = meta.width,
            indexable = meta.indexable,
            "sealed node file"
        );
        Ok(StdArc::new(NodeFile { meta, nodes, levels, _meta_sidecar: Some(sidecar) }))
    }
}

fn write_sidecar(meta: &NodeFileMeta) -> Result<TempPath> {
    let (file, path) = crate::scratch::scratch_file()?;
    serde_json::to_writer(file, meta)
        .map_err(|e| Error::invalid_argument(format!("metadata serialization failed: {e}")))?;
    Ok(path)
}

/// Top-down node access by `(level, id)` for indexable files: one level of
/// nodes held in memory at a time.
pub struct NodeRandomAccess {
    inner: ReverseRecordReader<Node>,
    current_level: Option<Level>,
    current: Vec<Node>,
    root: Uid,
}

impl NodeRandomAccess {
    /// Memory footprint of holding a level of `width` nodes.
    pub fn memory_usage(width: u64) -> u64 {
        width.saturating_mul(std::mem::size_of::<Node>() as u64)
    }

    pub fn open(file: &NodeFile) -> Result<Self> {
        debug_assert!(file.meta.indexable, "random access needs an indexable file");
        Ok(NodeRandomAccess {
            inner: file.nodes()?,
            current_level: None,
            current: Vec::new(),
            root: file.root(),
        })
    }

    pub fn root(&self) -> Uid {
        self.root
    }

    /// Advances to `level`, loading its nodes.
    pub fn setup_next_level(&mut self, level: Level) -> Result<()> {
        debug_assert!(self.current_level.map_or(true, |cur| cur < level));
        self.current.clear();
        self.current_level = Some(level);
        // Skip levels nothing requested.
        while matches!(self.inner.peek()?, Some(n) if n.uid.level() < level) {
            self.inner.pull()?;
        }
        while matches!(self.inner.peek()?, Some(n) if n.uid.level() == level) {
            self.current.push(self.inner.pull()?.expect("peeked node"));
        }
        Ok(())
    }

    /// The node `uid` on the current level.
    pub fn at(&self, uid: Uid) -> Node {
        debug_assert_eq!(Some(uid.level()), self.current_level);
        self.current[uid.id() as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_file() -> SharedNodeFile {
        // x2 at the bottom, then x1, then the root at x0.
        let mut w = NodeWriter::new().unwrap();
        w.push_node(Node::new(Uid::new(2, 0), Ptr::terminal(false), Ptr::terminal(true))).unwrap();
        w.push_level(LevelInfo::new(2, 1)).unwrap();
        w.push_node(Node::new(Uid::new(1, 0), Ptr::internal(2, 0, false), Ptr::terminal(true))).unwrap();
        w.push_level(LevelInfo::new(1, 1)).unwrap();
        w.push_node(Node::new(Uid::new(0, 0), Ptr::internal(2, 0, false), Ptr::internal(1, 0, false))).unwrap();
        w.push_level(LevelInfo::new(0, 1)).unwrap();
        w.seal().unwrap()
    }

    #[test]
    fn reads_root_first() {
        let f = chain_file();
        assert_eq!(f.meta.node_count, 3);
        assert_eq!(f.meta.level_count, 3);
        assert_eq!(f.meta.width, 1);
        assert_eq!(f.root(), Uid::new(0, 0));
        assert!(f.meta.indexable);

        let mut r = f.nodes().unwrap();
        assert_eq!(r.pull().unwrap().unwrap().uid, Uid::new(0, 0));
        assert_eq!(r.pull().unwrap().unwrap().uid, Uid::new(1, 0));
        assert_eq!(r.pull().unwrap().unwrap().uid, Uid::new(2, 0));
    }

    #[test]
    fn levels_read_ascending_topdown() {
        let f = chain_file();
        let mut l = f.levels().unwrap();
        assert_eq!(l.pull().unwrap().unwrap().level, 0);
        assert_eq!(l.pull().unwrap().unwrap().level, 1);
        assert_eq!(l.pull().unwrap().unwrap().level, 2);
    }

    #[test]
    fn terminal_arc_counts() {
        let f = chain_file();
        assert_eq!(f.meta.terminal_arcs, [1, 2]);
    }

    #[test]
    fn terminal_file_shape() {
        let t = NodeFile::terminal(true).unwrap();
        assert!(t.is_terminal());
        assert_eq!(t.terminal_value(), Some(true));
        assert_eq!(t.meta.node_count, 1);
        assert_eq!(t.meta.level_count, 0);
        assert_eq!(t.meta.terminal_arcs, [0, 1]);
    }

    #[test]
    fn stream_equality_is_structural() {
        let a = chain_file();
        let b = chain_file();
        assert!(NodeFile::stream_equal(&a, &b).unwrap());

        let t = NodeFile::terminal(false).unwrap();
        assert!(!NodeFile::stream_equal(&a, &t).unwrap());
    }

    #[test]
    fn random_access_by_level_and_id() {
        let f = chain_file();
        let mut ra = NodeRandomAccess::open(&f).unwrap();
        ra.setup_next_level(0).unwrap();
        assert_eq!(ra.at(Uid::new(0, 0)).high, Ptr::internal(1, 0, false));
        ra.setup_next_level(2).unwrap();
        assert_eq!(ra.at(Uid::new(2, 0)).high, Ptr::terminal(true));
    }

    #[test]
    fn resume_appends_shallower_levels() {
        let mut w = NodeWriter::new().unwrap();
        w.push_node(Node::new(Uid::new(3, 0), Ptr::terminal(false), Ptr::terminal(true))).unwrap();
        w.push_level(LevelInfo::new(3, 1)).unwrap();
        let file = w.seal().unwrap();

        let mut w = NodeFile::resume(file).unwrap();
        w.push_node(Node::new(Uid::new(1, 0), Ptr::internal(3, 0, false), Ptr::terminal(true))).unwrap();
        w.push_level(LevelInfo::new(1, 1)).unwrap();
        let file = w.seal().unwrap();

        assert_eq!(file.meta.node_count, 2);
        assert_eq!(file.root(), Uid::new(1, 0));
        let mut r = f_nodes(&file);
        assert_eq!(r.remove(0).uid, Uid::new(1, 0));
        assert_eq!(r.remove(0).uid, Uid::new(3, 0));
    }

    fn f_nodes(f: &NodeFile) -> Vec<Node> {
        let mut out = Vec::new();
        let mut r = f.nodes().unwrap();
        while let Some(n) = r.pull().unwrap() {
            out.push(n);
        }
        out
    }

    #[test]
    fn non_contiguous_ids_clear_indexable() {
        let mut w = NodeWriter::new().unwrap();
        w.push_node(Node::new(Uid::new(2, 5), Ptr::terminal(false), Ptr::terminal(true))).unwrap();
        w.push_level(LevelInfo::new(2, 1)).unwrap();
        let f = w.seal().unwrap();
        assert!(!f.meta.indexable);
    }
}
