//! The Reduce sweep: from a levelized arc file to a canonical node file.
//!
//! Bottom-up over the input's levels. A levelized priority queue carries
//! incoming arcs whose targets have already been rewritten to their final
//! pointers, keyed by source level; at each level those arcs merge with the
//! reversed terminal-arc stream and pair into `(uid, low, high)` records.
//! Rule 1 folds suppressible nodes into a forwarding map; the survivors sort
//! by `(low, high)` for rule 2's fresh contiguous ids and deduplication; the
//! combined old-to-new mapping then rewrites the internal arcs entering the
//! level.
//!
//! The nested-sweeping outer sweep reuses the per-level core through
//! [`ArcSink`], which intercepts rewritten arcs leaving the region being
//! reduced.

use std::cmp::Ordering;
use std::io::{Read, Write};

use strata_core::{
    Cuts, Direction, Error, ExecPolicy, Id, ItemCmp, Level, LevelInfo, Leveled, MemoryMode, Node,
    Ptr, Result, Uid,
};
use strata_io::levelized_pq::no_lookahead_bound;
use strata_io::node_file::SharedNodeFile;
use strata_io::record::Record;
use strata_io::stream::RecordStream;
use strata_io::{ArcFile, LevelMerger, LevelizedPq, NodeWriter, Sorter};

use crate::diagram::DiagramKind;

/// An incoming arc whose target is already final, waiting at its source's
/// level to pair into a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReduceArc {
    pub source: Ptr,
    pub target: Ptr,
}

impl Leveled for ReduceArc {
    fn level(&self) -> Level {
        self.source.level()
    }
}

impl Record for ReduceArc {
    const BYTES: usize = 16;

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        strata_core::Arc::new(self.source, self.target).encode(w)
    }

    fn decode<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let a = strata_core::Arc::decode(r)?;
        Ok(ReduceArc { source: a.source, target: a.target })
    }
}

/// Within a level, arcs pair in descending source order: the high slot of a
/// node arrives right before its low slot.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ReduceArcOrder;

impl ItemCmp<ReduceArc> for ReduceArcOrder {
    fn cmp(a: &ReduceArc, b: &ReduceArc) -> Ordering {
        (b.source, b.target).cmp(&(a.source, a.target))
    }
}

/// Rule-2 grouping: survivors sorted by `(low, high)`.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ByChildren;

impl ItemCmp<Node> for ByChildren {
    fn cmp(a: &Node, b: &Node) -> Ordering {
        (a.low, a.high, a.uid).cmp(&(b.low, b.high, b.uid))
    }
}

/// Output buffering: nodes of one level in descending uid order.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ByUidDesc;

impl ItemCmp<Node> for ByUidDesc {
    fn cmp(a: &Node, b: &Node) -> Ordering {
        b.uid.cmp(&a.uid)
    }
}

/// One entry of the old-to-new rewrite map, drained in descending old order
/// alongside the reversed internal-arc stream.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MapEntry {
    pub(crate) old: Ptr,
    pub(crate) new: Ptr,
}

impl Record for MapEntry {
    const BYTES: usize = 16;

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        strata_core::Arc::new(self.old, self.new).encode(w)
    }

    fn decode<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let a = strata_core::Arc::decode(r)?;
        Ok(MapEntry { old: a.source, new: a.target })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ByOldDesc;

impl ItemCmp<MapEntry> for ByOldDesc {
    fn cmp(a: &MapEntry, b: &MapEntry) -> Ordering {
        b.old.cmp(&a.old)
    }
}

/// Receives rewritten arcs whose sources lie outside the region a reduce
/// call owns.
pub(crate) trait ArcSink {
    /// Whether a source on `level` belongs to this reduce.
    fn in_region(&self, level: Level) -> bool;

    /// Takes an arc leaving the region.
    fn take(&mut self, arc: ReduceArc) -> Result<()>;
}

/// The sink of a stand-alone reduce: everything is in-region.
struct WholeFile;

impl ArcSink for WholeFile {
    fn in_region(&self, _level: Level) -> bool {
        true
    }

    fn take(&mut self, _arc: ReduceArc) -> Result<()> {
        Err(Error::unreachable("whole-file reduce has no region boundary"))
    }
}

/// Outcome of a reduce over (part of) an arc file.
pub(crate) struct ReduceResult {
    /// The canonical node file; `None` when every node was suppressed.
    pub file: Option<SharedNodeFile>,
    /// Final target of the nil-sourced root arc, when one was seen.
    pub nil_target: Option<Ptr>,
}

/// Reduces a complete arc file into a canonical diagram file.
pub(crate) fn reduce<K: DiagramKind>(ep: &ExecPolicy, arcs: ArcFile) -> Result<SharedNodeFile> {
    let mut sink = WholeFile;
    let result = reduce_core::<K, _>(ep, &arcs, &mut sink)?;
    match result.file {
        Some(file) => Ok(file),
        None => {
            let value = result
                .nil_target
                .filter(|t| t.is_terminal())
                .ok_or_else(|| Error::unreachable("empty reduce without a root terminal"))?;
            Ok(strata_io::node_file::NodeFile::terminal(value.value())?)
        }
    }
}

/// The shared bottom-up engine. Arcs whose rewritten source leaves the
/// sink's region are handed to the sink instead of the internal queue;
/// nil-sourced arcs record the root target.
pub(crate) fn reduce_core<K: DiagramKind, S: ArcSink>(
    ep: &ExecPolicy,
    arcs: &ArcFile,
    sink: &mut S,
) -> Result<ReduceResult> {
    let mut tarcs = arcs.terminal_bottomup()?;
    let mut iarcs = arcs.internal_bottomup()?;
    let mut levels = arcs.levels_bottomup()?;

    // The queue never holds more than the internal arcs of the input.
    let bound = arcs.meta.internal_count.saturating_add(1);
    let memory = strata_io::memory::aux_available(4);
    let fits = LevelizedPq::<ReduceArc, ReduceArcOrder>::memory_fits(memory);
    let external = match ep.memory {
        MemoryMode::Internal => false,
        MemoryMode::External => true,
        MemoryMode::Auto => bound > fits,
    };
    let max_size = if ep.memory == MemoryMode::Internal { bound.min(fits) } else { bound };
    let lookahead = if bound <= no_lookahead_bound() { 0 } else { 1 };
    tracing::debug!(bound, external, lookahead, "reduce sweep starting");

    let pq_levels = LevelMerger::new(Direction::Up).with(Box::new(
        strata_io::level_merger::FileLevels::new(arcs.levels_bottomup()?, 0),
    ));
    let mut pq: LevelizedPq<ReduceArc, ReduceArcOrder> =
        LevelizedPq::new(external, Direction::Up, lookahead, pq_levels, memory, max_size);

    let mut out = NodeWriter::new()?;
    let mut nil_target: Option<Ptr> = None;

    // Crossing counters for the output's cut metadata.
    let mut pq_internal: u64 = 0;
    let mut pq_terminal: [u64; 2] = [0, 0];
    let mut consumed_terminal: [u64; 2] = [0, 0];
    let mut one_cut = Cuts::zero();
    let mut two_cut = Cuts::zero();
    let mut prev_crossing: (u64, u64, u64) = (0, 0, 0);

    while let Some(level_info) = levels.pull()? {
        let level = level_info.level;
        pq.setup_level(level)?;

        let mut kept: Sorter<Node, ByChildren> = Sorter::new();
        let mut mapping: Sorter<MapEntry, ByOldDesc> = Sorter::new();

        // -----------------------------------------------------------------
        // Pair this level's arcs into unreduced nodes, high slot first.
        loop {
            let high = match pull_paired_arc(&mut pq, &mut tarcs, level, &mut pq_internal, &mut pq_terminal, &mut consumed_terminal)? {
                Some(a) => a,
                None => break,
            };
            let low = pull_paired_arc(&mut pq, &mut tarcs, level, &mut pq_internal, &mut pq_terminal, &mut consumed_terminal)?
                .ok_or_else(|| Error::unreachable("an arc arrived without its partner"))?;

            if !high.source.out_idx() || low.source.out_idx() {
                return Err(Error::unreachable("arc pair slots are inconsistent"));
            }
            let uid = Uid::from_ptr(high.source);
            if Uid::from_ptr(low.source) != uid {
                return Err(Error::unreachable("arc pair sources disagree"));
            }

            let node = Node { uid, low: low.target, high: high.target };
            match K::reduction_rule(&node) {
                Some(child) => mapping.push(MapEntry { old: uid.as_ptr(), new: child })?,
                None => kept.push(node)?,
            }
        }

        // -----------------------------------------------------------------
        // Rule 2: sort by children, assign fresh ids, deduplicate.
        let mut out_nodes: Sorter<Node, ByUidDesc> = Sorter::new();
        let mut survivors = kept.into_stream()?;
        let mut next_id: Id = 0;
        let mut prev: Option<Node> = None;
        while let Some(n) = survivors.pull()? {
            match prev {
                Some(p) if p.low == n.low && p.high == n.high => {
                    mapping.push(MapEntry { old: n.uid.as_ptr(), new: p.uid.as_ptr() })?;
                }
                _ => {
                    let new_uid = Uid::new(level, next_id);
                    next_id += 1;
                    let fresh = Node { uid: new_uid, low: n.low, high: n.high };
                    out_nodes.push(fresh)?;
                    mapping.push(MapEntry { old: n.uid.as_ptr(), new: new_uid.as_ptr() })?;
                    prev = Some(fresh);
                }
            }
        }

        if next_id > 0 {
            let mut stream = out_nodes.into_stream()?;
            while let Some(n) = stream.pull()? {
                out.push_node(n)?;
            }
            out.push_level(LevelInfo::new(level, next_id))?;
        }

        // -----------------------------------------------------------------
        // Rewrite the internal arcs entering this level.
        let mut map_stream = mapping.into_stream()?;
        let mut current = map_stream.pull()?;
        let mut current_referenced = false;
        while matches!(iarcs.peek()?, Some(a) if a.target.level() == level) {
            let arc = iarcs.pull()?.expect("peeked arc");
            // An entry no arc ever referenced is the root; only the
            // shallowest level legitimately holds one.
            while matches!(current, Some(m) if m.old > arc.target) {
                if !current_referenced {
                    nil_target = current.map(|m| m.new);
                }
                current = map_stream.pull()?;
                current_referenced = false;
            }
            let m = current
                .filter(|m| m.old == arc.target)
                .ok_or_else(|| Error::unreachable("arc targets a node that was never paired"))?;
            current_referenced = true;

            if arc.source.is_nil() {
                nil_target = Some(m.new);
                continue;
            }
            let rewritten = ReduceArc { source: arc.source, target: m.new };
            if sink.in_region(arc.source.level()) {
                if rewritten.target.is_terminal() {
                    pq_terminal[rewritten.target.value() as usize] += 1;
                } else {
                    pq_internal += 1;
                }
                pq.push(rewritten)?;
            } else {
                sink.take(rewritten)?;
            }
        }
        while let Some(m) = current {
            if !current_referenced {
                nil_target = Some(m.new);
            }
            current = map_stream.pull()?;
            current_referenced = false;
        }

        // -----------------------------------------------------------------
        // Account the crossing just above this level for the output's cuts.
        let remaining = [
            arcs.meta.terminal_counts[0] - consumed_terminal[0],
            arcs.meta.terminal_counts[1] - consumed_terminal[1],
        ];
        let crossing = (
            pq_internal,
            pq_terminal[0] + remaining[0],
            pq_terminal[1] + remaining[1],
        );
        one_cut.observe(crossing.0, crossing.1, crossing.2);
        two_cut.observe(
            prev_crossing.0.saturating_add(crossing.0),
            prev_crossing.1.saturating_add(crossing.1),
            prev_crossing.2.saturating_add(crossing.2),
        );
        prev_crossing = crossing;
    }

    if !pq.is_empty() {
        return Err(Error::unreachable("arcs left unpaired after the last level"));
    }

    if out.node_count() == 0 {
        return Ok(ReduceResult { file: None, nil_target });
    }
    // Every cut is at least the root arc.
    one_cut.observe(1, 0, 0);
    two_cut.observe(1, 0, 0);
    out.set_cuts(one_cut, two_cut);
    Ok(ReduceResult { file: Some(out.seal()?), nil_target })
}

/// Pulls the next arc pairing at `level`, merging the queue with the
/// reversed terminal-arc stream in descending source order.
fn pull_paired_arc(
    pq: &mut LevelizedPq<ReduceArc, ReduceArcOrder>,
    tarcs: &mut strata_io::ReverseRecordReader<strata_core::Arc>,
    level: Level,
    pq_internal: &mut u64,
    pq_terminal: &mut [u64; 2],
    consumed_terminal: &mut [u64; 2],
) -> Result<Option<ReduceArc>> {
    let from_tarc = match tarcs.peek()? {
        Some(a) if !a.source.is_nil() && a.source.level() == level => Some(a),
        _ => None,
    };
    let from_pq = pq.peek();

    let use_tarc = match (from_tarc, from_pq) {
        (None, None) => return Ok(None),
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (Some(t), Some(q)) => t.source > q.source,
    };

    if use_tarc {
        let a = tarcs.pull()?.expect("peeked terminal arc");
        consumed_terminal[a.target.value() as usize] += 1;
        Ok(Some(ReduceArc { source: a.source, target: a.target }))
    } else {
        let a = pq.pull().expect("peeked queue arc");
        if a.target.is_terminal() {
            pq_terminal[a.target.value() as usize] -= 1;
        } else {
            *pq_internal -= 1;
        }
        Ok(Some(a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::{BddKind, ZddKind};
    use strata_core::Arc;
    use strata_io::ArcWriter;

    fn internal(sl: Level, sid: Id, hi: bool, tl: Level, tid: Id) -> Arc {
        Arc::new(Uid::new(sl, sid).with_out_idx(hi), Uid::new(tl, tid).as_ptr())
    }

    fn terminal(sl: Level, sid: Id, hi: bool, v: bool) -> Arc {
        Arc::new(Uid::new(sl, sid).with_out_idx(hi), Ptr::terminal(v))
    }

    fn ep() -> ExecPolicy {
        ExecPolicy::new()
    }

    #[test]
    fn single_node_roundtrip() {
        // One node: (0, false, true).
        let mut w = ArcWriter::new().unwrap();
        w.push_level(LevelInfo::new(0, 1)).unwrap();
        w.push_terminal(terminal(0, 0, false, false)).unwrap();
        w.push_terminal(terminal(0, 0, true, true)).unwrap();
        let file = reduce::<BddKind>(&ep(), w.seal().unwrap()).unwrap();

        assert_eq!(file.meta.node_count, 1);
        assert_eq!(file.root(), Uid::new(0, 0));
        let mut nodes = file.nodes().unwrap();
        let n = nodes.pull().unwrap().unwrap();
        assert_eq!(n.low, Ptr::terminal(false));
        assert_eq!(n.high, Ptr::terminal(true));
    }

    #[test]
    fn rule_one_suppresses_redundant_nodes() {
        // Root at level 0 with both arcs into a level-1 node whose children
        // are equal; the level-1 node vanishes and so does the root.
        let mut w = ArcWriter::new().unwrap();
        w.push_level(LevelInfo::new(0, 1)).unwrap();
        w.push_internal(internal(0, 0, false, 1, 0)).unwrap();
        w.push_internal(internal(0, 0, true, 1, 0)).unwrap();
        w.push_level(LevelInfo::new(1, 1)).unwrap();
        w.push_terminal(terminal(1, 0, false, true)).unwrap();
        w.push_terminal(terminal(1, 0, true, true)).unwrap();

        let result = {
            let arcs = w.seal().unwrap();
            let mut sink = WholeFile;
            reduce_core::<BddKind, _>(&ep(), &arcs, &mut sink).unwrap()
        };
        assert!(result.file.is_none());
        assert_eq!(result.nil_target, Some(Ptr::terminal(true)));
    }

    #[test]
    fn rule_two_merges_duplicates() {
        // Two level-1 nodes with identical children; the root must end up
        // with both arcs on the single survivor and then vanish (BDD).
        let mut w = ArcWriter::new().unwrap();
        w.push_level(LevelInfo::new(0, 1)).unwrap();
        w.push_internal(internal(0, 0, false, 1, 0)).unwrap();
        w.push_internal(internal(0, 0, true, 1, 1)).unwrap();
        w.push_level(LevelInfo::new(1, 2)).unwrap();
        w.push_terminal(terminal(1, 0, false, false)).unwrap();
        w.push_terminal(terminal(1, 0, true, true)).unwrap();
        w.push_terminal(terminal(1, 1, false, false)).unwrap();
        w.push_terminal(terminal(1, 1, true, true)).unwrap();

        let file = reduce::<BddKind>(&ep(), w.seal().unwrap()).unwrap();
        // Only the merged level-1 node survives; the root became redundant.
        assert_eq!(file.meta.node_count, 1);
        assert_eq!(file.root(), Uid::new(1, 0));
    }

    #[test]
    fn zdd_rule_suppresses_high_false() {
        let mut w = ArcWriter::new().unwrap();
        w.push_level(LevelInfo::new(0, 1)).unwrap();
        w.push_internal(internal(0, 0, false, 1, 0)).unwrap();
        w.push_terminal(terminal(0, 0, true, true)).unwrap();
        w.push_level(LevelInfo::new(1, 1)).unwrap();
        w.push_terminal(terminal(1, 0, false, true)).unwrap();
        w.push_terminal(terminal(1, 0, true, false)).unwrap();

        let file = reduce::<ZddKind>(&ep(), w.seal().unwrap()).unwrap();
        assert_eq!(file.meta.node_count, 1);
        let n = file.nodes().unwrap().pull().unwrap().unwrap();
        // The level-1 node (true, false) reduced to its low child.
        assert_eq!(n.uid, Uid::new(0, 0));
        assert_eq!(n.low, Ptr::terminal(true));
        assert_eq!(n.high, Ptr::terminal(true));
    }

    #[test]
    fn reduce_is_idempotent_on_its_output() {
        // Build x0 XOR x1 as arcs, reduce, re-emit as arcs, reduce again:
        // byte-identical node files.
        fn xor_arcs() -> ArcFile {
            let mut w = ArcWriter::new().unwrap();
            w.push_level(LevelInfo::new(0, 1)).unwrap();
            w.push_internal(internal(0, 0, false, 1, 0)).unwrap();
            w.push_internal(internal(0, 0, true, 1, 1)).unwrap();
            w.push_level(LevelInfo::new(1, 2)).unwrap();
            w.push_terminal(terminal(1, 0, false, false)).unwrap();
            w.push_terminal(terminal(1, 0, true, true)).unwrap();
            w.push_terminal(terminal(1, 1, false, true)).unwrap();
            w.push_terminal(terminal(1, 1, true, false)).unwrap();
            w.seal().unwrap()
        }

        let once = reduce::<BddKind>(&ep(), xor_arcs()).unwrap();
        let twice = reduce::<BddKind>(&ep(), xor_arcs()).unwrap();
        assert!(strata_io::node_file::NodeFile::stream_equal(&once, &twice).unwrap());
        assert_eq!(once.meta.node_count, 3);
        assert!(once.meta.indexable);
    }
}
