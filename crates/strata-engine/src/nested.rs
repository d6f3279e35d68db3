//! Nested sweeping: multi-level quantification in one outer pass.
//!
//! The Outer Sweep is a bottom-up, Reduce-shaped replay of an unreduced arc
//! file. Everything strictly below the current frontier is kept as a
//! canonical node file. Arcs whose rewritten source lies above the next
//! to-be-swept level divert into a root buffer instead of the outer queue,
//! since their targets will not survive the coming rebuild. When the frontier
//! meets a swept level, the level's nodes dissolve per incoming arc into
//! product requests; together with the diverted crossing arcs they seed an
//! Inner down-sweep (a single-input product over the canonical below-part),
//! whose Inner up-sweep is a Reduce feeding boundary-crossing arcs back
//! into the outer structures. The below-part is then the Inner result, and
//! the outer pass continues upward.

use strata_core::{
    Direction, Error, ExecPolicy, Id, Level, LevelInfo, MemoryMode, Node, Ptr, Request, Result,
    Target, Uid,
};
use strata_io::node_file::{NodeFile, SharedNodeFile};
use strata_io::stream::RecordStream;
use strata_io::{ArcFile, LevelMerger, LevelizedPq, NodeWriter, ReverseRecordReader, Sorter};

use crate::diagram::{Diagram, DiagramKind};
use crate::policy::{BoolOp, QuantifyPolicy};
use crate::prod2u::{prod2u_seeded, resolve_request, SweepOutput};
use crate::reduce::{
    reduce_core, ArcSink, ByChildren, ByOldDesc, ByUidDesc, MapEntry, ReduceArc, ReduceArcOrder,
};

/// Final result of a nested sweep.
pub(crate) enum NestedOutcome {
    File(SharedNodeFile),
    Terminal(bool),
}

type OuterPq = LevelizedPq<ReduceArc, ReduceArcOrder>;

/// Routes an arc leaving the processed frontier: internal targets crossing
/// the next swept level become that sweep's roots, everything else waits in
/// the outer queue.
fn route(
    arc: ReduceArc,
    pending_sweep: Option<Level>,
    outer_pq: &mut OuterPq,
    roots: &mut Vec<Request>,
) -> Result<()> {
    if arc.target.is_internal()
        && pending_sweep.map_or(false, |x| arc.source.level() < x)
    {
        roots.push(Request::new(Target::single(arc.target), arc.source));
        Ok(())
    } else {
        outer_pq.push(arc)
    }
}

/// The inner up-sweep's boundary: arcs with sources at or above the swept
/// level flow back into the outer structures.
struct InnerSink<'a> {
    boundary: Level,
    pending_sweep: Option<Level>,
    outer_pq: &'a mut OuterPq,
    roots: &'a mut Vec<Request>,
}

impl ArcSink for InnerSink<'_> {
    fn in_region(&self, level: Level) -> bool {
        level > self.boundary
    }

    fn take(&mut self, arc: ReduceArc) -> Result<()> {
        route(arc, self.pending_sweep, self.outer_pq, self.roots)
    }
}

/// Pulls the next arc pairing at `level` from the outer queue and the
/// reversed terminal-arc stream, in descending source order.
fn next_arc(
    pq: &mut OuterPq,
    tarcs: &mut ReverseRecordReader<strata_core::Arc>,
    level: Level,
) -> Result<Option<ReduceArc>> {
    let from_tarc = match tarcs.peek()? {
        Some(a) if a.source.level() == level => Some(a),
        _ => None,
    };
    let use_tarc = match (from_tarc, pq.peek()) {
        (None, None) => return Ok(None),
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (Some(t), Some(q)) => t.source > q.source,
    };
    if use_tarc {
        let a = tarcs.pull()?.expect("peeked terminal arc");
        Ok(Some(ReduceArc { source: a.source, target: a.target }))
    } else {
        Ok(pq.pull())
    }
}

fn pair_node(
    pq: &mut OuterPq,
    tarcs: &mut ReverseRecordReader<strata_core::Arc>,
    level: Level,
) -> Result<Option<Node>> {
    let high = match next_arc(pq, tarcs, level)? {
        Some(a) => a,
        None => return Ok(None),
    };
    let low = next_arc(pq, tarcs, level)?
        .ok_or_else(|| Error::unreachable("an arc arrived without its partner"))?;
    if !high.source.out_idx() || low.source.out_idx() {
        return Err(Error::unreachable("arc pair slots are inconsistent"));
    }
    let uid = Uid::from_ptr(high.source);
    if Uid::from_ptr(low.source) != uid {
        return Err(Error::unreachable("arc pair sources disagree"));
    }
    Ok(Some(Node { uid, low: low.target, high: high.target }))
}

/// Multi-level quantification by one outer sweep with nested inner sweeps.
/// `has_sweep` is queried once per input level, in descending order.
pub(crate) fn nested_sweep<K: DiagramKind, O: BoolOp>(
    ep: &ExecPolicy,
    arcs: ArcFile,
    mut has_sweep: impl FnMut(Level) -> bool,
) -> Result<NestedOutcome> {
    type P<K, O> = QuantifyPolicy<K, O>;

    let mut levels_desc = Vec::new();
    {
        let mut r = arcs.levels_bottomup()?;
        while let Some(li) = r.pull()? {
            levels_desc.push(li.level);
        }
    }
    let sweep_flags: Vec<bool> = levels_desc.iter().map(|&l| has_sweep(l)).collect();
    let next_sweep_after = |idx: usize| -> Option<Level> {
        (idx + 1..levels_desc.len()).find(|&j| sweep_flags[j]).map(|j| levels_desc[j])
    };
    tracing::debug!(
        levels = levels_desc.len(),
        swept = sweep_flags.iter().filter(|&&s| s).count(),
        "nested sweep starting"
    );

    let mut tarcs = arcs.terminal_bottomup()?;
    let mut iarcs = arcs.internal_bottomup()?;

    let memory = strata_io::memory::aux_available(4);
    let fits = OuterPq::memory_fits(memory);
    let external = match ep.memory {
        MemoryMode::Internal => false,
        MemoryMode::External => true,
        MemoryMode::Auto => arcs.meta.arc_count() > fits,
    };
    let pq_levels = LevelMerger::new(Direction::Up).with(Box::new(
        strata_io::level_merger::FileLevels::new(arcs.levels_bottomup()?, 0),
    ));
    // Inner sweeps may grow the diagram, so the outer queue is not bounded
    // by the input's cuts.
    let mut outer_pq: OuterPq =
        LevelizedPq::new(external, Direction::Up, 1, pq_levels, memory, u64::MAX);

    let mut writer: Option<NodeWriter> = None;
    let mut nil_target: Option<Ptr> = None;
    let mut roots: Vec<Request> = Vec::new();

    for idx in 0..levels_desc.len() {
        let level = levels_desc[idx];
        outer_pq.setup_level(level)?;
        let pending = next_sweep_after(idx);

        if sweep_flags[idx] {
            // -------------------------------------------------------------
            // Swept level: dissolve nodes into per-parent product requests.
            // Reusing the node record: uid = the old uid, children = the
            // resolved target pair (the second slot may be nil).
            let mut targets: Sorter<Node, ByUidDesc> = Sorter::new();
            while let Some(n) = pair_node(&mut outer_pq, &mut tarcs, level)? {
                let t = resolve_request::<K, P<K, O>>(n.low, n.high);
                targets.push(Node { uid: n.uid, low: t.0, high: t.1 })?;
            }

            let mut dispatch = |target: Target, source: Ptr,
                                outer_pq: &mut OuterPq,
                                roots: &mut Vec<Request>|
             -> Result<()> {
                if target.fst().is_terminal() {
                    if source.is_nil() {
                        nil_target = Some(target.fst());
                    } else {
                        outer_pq.push(ReduceArc { source, target: target.fst() })?;
                    }
                } else {
                    roots.push(Request::new(target, source));
                }
                Ok(())
            };

            let mut entries = targets.into_stream()?;
            let mut current = entries.pull()?;
            let mut current_referenced = false;
            while matches!(iarcs.peek()?, Some(a) if a.target.level() == level) {
                let arc = iarcs.pull()?.expect("peeked arc");
                // A node no arc references is the root of the whole sweep.
                while matches!(current, Some(t) if t.uid.as_ptr() > arc.target) {
                    let t = current.expect("matched entry");
                    if !current_referenced {
                        dispatch(Target(t.low, t.high), Ptr::nil(), &mut outer_pq, &mut roots)?;
                    }
                    current = entries.pull()?;
                    current_referenced = false;
                }
                let t = current
                    .filter(|t| t.uid.as_ptr() == arc.target)
                    .ok_or_else(|| Error::unreachable("arc targets a node that was never paired"))?;
                current_referenced = true;
                dispatch(Target(t.low, t.high), arc.source, &mut outer_pq, &mut roots)?;
            }
            while let Some(t) = current {
                if !current_referenced {
                    dispatch(Target(t.low, t.high), Ptr::nil(), &mut outer_pq, &mut roots)?;
                }
                current = entries.pull()?;
                current_referenced = false;
            }

            // -------------------------------------------------------------
            // Run the inner sweep over the canonical below-part.
            if !roots.is_empty() {
                let below = writer
                    .take()
                    .ok_or_else(|| Error::unreachable("inner roots without an inner region"))?
                    .seal()?;
                let below_dd: Diagram<K> = Diagram::from_file(below);

                let mut root_levels: Vec<Level> =
                    roots.iter().map(|r| r.target.level()).collect();
                root_levels.sort_unstable();
                root_levels.dedup();

                let seeds = std::mem::take(&mut roots);
                tracing::debug!(level, seeds = seeds.len(), "inner sweep starting");
                let inner = prod2u_seeded(ep, &below_dd, &P::<K, O>::never(), seeds, Some(root_levels))?;
                let inner_arcs = match inner {
                    SweepOutput::Arcs(a) => a,
                    SweepOutput::Terminal(_) => {
                        return Err(Error::unreachable("inner sweep collapsed without splitting"))
                    }
                };
                drop(below_dd);

                let mut sink = InnerSink {
                    boundary: level,
                    pending_sweep: pending,
                    outer_pq: &mut outer_pq,
                    roots: &mut roots,
                };
                let result = reduce_core::<K, _>(ep, &inner_arcs, &mut sink)?;
                if let Some(t) = result.nil_target {
                    nil_target = Some(t);
                }
                writer = match result.file {
                    Some(f) => Some(NodeFile::resume(f)?),
                    None => None,
                };
            }
        } else {
            // -------------------------------------------------------------
            // Plain level: one step of Reduce, diverting crossing arcs.
            let mut kept: Sorter<Node, ByChildren> = Sorter::new();
            let mut mapping: Sorter<MapEntry, ByOldDesc> = Sorter::new();
            while let Some(n) = pair_node(&mut outer_pq, &mut tarcs, level)? {
                match K::reduction_rule(&n) {
                    Some(child) => mapping.push(MapEntry { old: n.uid.as_ptr(), new: child })?,
                    None => kept.push(n)?,
                }
            }

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
                if writer.is_none() {
                    writer = Some(NodeWriter::new()?);
                }
                let w = writer.as_mut().expect("created above");
                let mut stream = out_nodes.into_stream()?;
                while let Some(n) = stream.pull()? {
                    w.push_node(n)?;
                }
                w.push_level(LevelInfo::new(level, next_id))?;
            }

            let mut map_stream = mapping.into_stream()?;
            let mut current = map_stream.pull()?;
            let mut current_referenced = false;
            while matches!(iarcs.peek()?, Some(a) if a.target.level() == level) {
                let arc = iarcs.pull()?.expect("peeked arc");
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
                route(
                    ReduceArc { source: arc.source, target: m.new },
                    pending,
                    &mut outer_pq,
                    &mut roots,
                )?;
            }
            while let Some(m) = current {
                if !current_referenced {
                    nil_target = Some(m.new);
                }
                current = map_stream.pull()?;
                current_referenced = false;
            }
        }
    }

    if !outer_pq.is_empty() {
        return Err(Error::unreachable("arcs left unpaired after the outer sweep"));
    }
    if !roots.is_empty() {
        return Err(Error::unreachable("roots left after the last swept level"));
    }

    if let Some(w) = writer {
        if w.node_count() > 0 {
            return Ok(NestedOutcome::File(w.seal()?));
        }
    }
    let value = nil_target
        .filter(|t| t.is_terminal())
        .ok_or_else(|| Error::unreachable("nested sweep ended without a root"))?;
    Ok(NestedOutcome::Terminal(value.value()))
}
