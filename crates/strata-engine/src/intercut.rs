//! The intercut sweep: insert fresh nodes on arcs crossing given levels.
//!
//! A single top-down pass with one levelized queue and no pairing. Each
//! request remembers the nearer of its target's level and the next cut
//! level; a request surfacing at a cut level before reaching its target
//! gets a fresh node shaped by the policy, while requests reaching an
//! existing node pass through the hit/miss hooks.

use strata_core::{
    Direction, ExecPolicy, Id, IntercutOrder, IntercutRequest, Level, LevelInfo, MemoryMode, Node,
    Ptr, Result, Uid, MAX_LEVEL,
};
use strata_io::levelized_pq::no_lookahead_bound;
use strata_io::stream::RecordStream;
use strata_io::{ArcWriter, GeneratorLevels, LevelMerger, LevelizedPq};

use crate::diagram::{Diagram, DiagramKind};
use crate::prod2u::SweepOutput;

/// What to do with a request that reached an existing node or a cut.
pub(crate) enum IntercutRec {
    /// Emit a node with these children.
    Output { low: Ptr, high: Ptr },
    /// Rewrite the waiting requests towards this pointer.
    SkipTo(Ptr),
}

pub(crate) trait IntercutPolicy<K: DiagramKind> {
    /// Whether arcs into the false terminal are subject to being cut.
    const CUT_FALSE: bool;
    /// Whether arcs into the true terminal are subject to being cut.
    const CUT_TRUE: bool;
    /// Whether `miss_existing` may answer `SkipTo`.
    const MAY_SKIP: bool;
    /// Output growth factor for the queue bound.
    const MULT_FACTOR: u64;

    /// A request reached an existing node on a cut level.
    fn hit_existing(node: &Node) -> Result<IntercutRec>;

    /// A request reached an existing node between cut levels.
    fn miss_existing(node: &Node) -> Result<IntercutRec>;

    /// A request crossed a cut level short of its target: the children of
    /// the freshly inserted node.
    fn hit_cut(target: Ptr) -> (Ptr, Ptr);
}

/// Whether an arc into a terminal crosses the upcoming cut.
fn cut_terminal<K: DiagramKind, P: IntercutPolicy<K>>(
    current: Level,
    next_cut: Level,
    value: bool,
) -> bool {
    current < next_cut
        && next_cut <= MAX_LEVEL
        && (!value || P::CUT_TRUE)
        && (value || P::CUT_FALSE)
}

type Pq = LevelizedPq<IntercutRequest, IntercutOrder>;

/// Forwards a pointer downwards: a terminal arc when no cut intercepts it,
/// a queued request otherwise.
fn forward<K: DiagramKind, P: IntercutPolicy<K>>(
    aw: &mut ArcWriter,
    pq: &mut Pq,
    source: Ptr,
    target: Ptr,
    current: Level,
    next_cut: Level,
) -> Result<()> {
    if target.is_terminal() && !cut_terminal::<K, P>(current, next_cut, target.value()) {
        return aw.push_terminal(strata_core::Arc::new(source, target));
    }
    pq.push(IntercutRequest::new(source, target, target.level().min(next_cut)))
}

/// The intercut over a non-terminal diagram and a non-empty ascending list
/// of cut levels.
pub(crate) fn intercut<K: DiagramKind, P: IntercutPolicy<K>>(
    ep: &ExecPolicy,
    input: &Diagram<K>,
    cut_levels: &[Level],
) -> Result<SweepOutput> {
    debug_assert!(!input.is_terminal());
    debug_assert!(!cut_levels.is_empty());
    debug_assert!(cut_levels.windows(2).all(|w| w[0] < w[1]));

    let cut1 = input.max_1level_cut(strata_core::CutType::with_terminals(P::CUT_FALSE, P::CUT_TRUE));
    let bound = (3 * P::MULT_FACTOR).saturating_mul(cut1) / 2 + 2;
    let memory = strata_io::memory::aux_available(2);
    let fits = Pq::memory_fits(memory);
    let external = match ep.memory {
        MemoryMode::Internal => false,
        MemoryMode::External => true,
        MemoryMode::Auto => bound > fits,
    };
    let max_size = if ep.memory == MemoryMode::Internal { bound.min(fits) } else { bound };
    let lookahead = if bound <= no_lookahead_bound() { 0 } else { 1 };
    tracing::debug!(bound, external, cuts = cut_levels.len(), "intercut sweep starting");

    let levels = LevelMerger::new(Direction::Down)
        .with(input.level_stream()?)
        .with(Box::new(GeneratorLevels::new(strata_core::gen_from_iter(
            cut_levels.to_vec(),
        ))));
    let mut pq: Pq = LevelizedPq::new(external, Direction::Down, lookahead, levels, memory, max_size);

    let mut nodes = input.nodes()?;
    let mut v = nodes
        .pull()?
        .ok_or_else(|| strata_core::Error::unreachable("intercut over an empty stream"))?;
    let mut aw = ArcWriter::new()?;

    let root = input.root_ptr();
    let mut ls = 0usize;
    pq.push(IntercutRequest::new(Ptr::nil(), root, cut_levels[0].min(root.level())))?;

    while !pq.is_empty() {
        let level = pq.setup_next_level()?;
        let mut out_id: Id = 0;

        let hit_level = cut_levels.get(ls) == Some(&level);
        while ls < cut_levels.len() && cut_levels[ls] <= level {
            ls += 1;
        }
        // The next level to cut on after this one.
        let next_cut = cut_levels.get(ls).copied().unwrap_or(MAX_LEVEL + 1);

        aw.observe_cut(pq.size());

        // Requests that reach an existing node on this level.
        while matches!(pq.peek(), Some(r) if r.target.level() == r.level) {
            let target = pq.peek().expect("checked above").target;
            while v.uid.as_ptr() < target {
                v = nodes.pull()?.ok_or_else(|| {
                    strata_core::Error::unreachable("sought past the end of the node stream")
                })?;
            }
            if v.uid.as_ptr() != target {
                return Err(strata_core::Error::unreachable("request targets a missing node"));
            }

            let rec = if hit_level { P::hit_existing(&v)? } else { P::miss_existing(&v)? };
            match rec {
                IntercutRec::SkipTo(t) if P::MAY_SKIP => {
                    if t.is_terminal()
                        && pq.peek().expect("checked above").source.is_nil()
                        && !cut_terminal::<K, P>(level, next_cut, t.value())
                    {
                        return Ok(SweepOutput::Terminal(t.value()));
                    }
                    while matches!(pq.peek(), Some(r) if r.level == level && r.target == target) {
                        let r = pq.pull().expect("peeked request");
                        forward::<K, P>(&mut aw, &mut pq, r.source, t, level, next_cut)?;
                    }
                }
                IntercutRec::SkipTo(_) => {
                    return Err(strata_core::Error::unreachable("policy skipped without may_skip"));
                }
                IntercutRec::Output { low, high } => {
                    let out_uid = Uid::new(level, out_id);
                    out_id += 1;
                    forward::<K, P>(&mut aw, &mut pq, out_uid.with_out_idx(false), low, level, next_cut)?;
                    forward::<K, P>(&mut aw, &mut pq, out_uid.with_out_idx(true), high, level, next_cut)?;
                    while matches!(pq.peek(), Some(r) if r.level == level && r.target == target) {
                        let r = pq.pull().expect("peeked request");
                        if !r.source.is_nil() {
                            aw.push_internal(strata_core::Arc::new(r.source, out_uid.as_ptr()))?;
                        }
                    }
                }
            }
        }

        // Requests crossing the cut short of their target.
        while pq.can_pull() {
            let target = pq.peek().expect("non-empty level").target;
            let (low, high) = P::hit_cut(target);
            let out_uid = Uid::new(level, out_id);
            out_id += 1;
            forward::<K, P>(&mut aw, &mut pq, out_uid.with_out_idx(false), low, level, next_cut)?;
            forward::<K, P>(&mut aw, &mut pq, out_uid.with_out_idx(true), high, level, next_cut)?;
            while matches!(pq.peek(), Some(r) if r.target == target) {
                let r = pq.pull().expect("peeked request");
                if !r.source.is_nil() {
                    aw.push_internal(strata_core::Arc::new(r.source, out_uid.as_ptr()))?;
                }
            }
        }

        if out_id > 0 {
            aw.push_level(LevelInfo::new(level, out_id))?;
        }
    }

    Ok(SweepOutput::Arcs(aw.seal()?))
}

/// The expansion policy: don't-care nodes on every cut level.
pub(crate) struct ExpandPolicy;

impl<K: DiagramKind> IntercutPolicy<K> for ExpandPolicy {
    const CUT_FALSE: bool = false;
    const CUT_TRUE: bool = true;
    const MAY_SKIP: bool = false;
    const MULT_FACTOR: u64 = 2;

    fn hit_existing(_node: &Node) -> Result<IntercutRec> {
        // Expansion requires the cut levels to be disjoint from the input's.
        Err(strata_core::Error::unreachable("expansion cut levels overlap the diagram"))
    }

    fn miss_existing(node: &Node) -> Result<IntercutRec> {
        Ok(IntercutRec::Output { low: node.low, high: node.high })
    }

    fn hit_cut(target: Ptr) -> (Ptr, Ptr) {
        (target, target)
    }
}
