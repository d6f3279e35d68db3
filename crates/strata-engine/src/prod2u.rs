//! Single-input product construction.
//!
//! Runs a top-down sweep over one diagram, rebuilding it level by level. At
//! levels the policy marks for splitting, a node dissolves into the product
//! of its own children (this is how a quantified variable disappears);
//! everywhere else the node is replicated with its resolved children. The
//! output is an unreduced arc file.
//!
//! Requests over a single diagram keep their target pair sorted, so equal
//! survivors collapse to one-armed requests and pruned terminals vanish:
//! pointer equality means node identity here.

use smallvec::SmallVec;

use strata_core::{
    AccessMode, Children, Direction, ExecPolicy, Id, Level, LevelInfo, MemoryMode, Node, Ptr,
    Request, RequestFstOrder, RequestSndOrder, Result, Target, Uid, CarriedRequest,
};
use strata_io::levelized_pq::no_lookahead_bound;
use strata_io::stream::RecordStream;
use strata_io::{ArcFile, ArcWriter, LevelMerger, LevelizedPq, SecondaryPq};

use crate::diagram::{Diagram, DiagramKind, DiagramNodes, DiagramRandomAccess};
use crate::policy::ProductPolicy;

/// Outcome of a product sweep: arcs for Reduce, or an early collapse.
pub(crate) enum SweepOutput {
    Arcs(ArcFile),
    Terminal(bool),
}

impl SweepOutput {
    /// Runs Reduce if needed and wraps the canonical result. This is the
    /// point where an unreduced intermediate becomes a diagram value.
    pub(crate) fn finish<K: DiagramKind>(self, ep: &ExecPolicy) -> Result<Diagram<K>> {
        match self {
            SweepOutput::Terminal(v) => Diagram::terminal(v),
            SweepOutput::Arcs(arcs) => {
                Ok(Diagram::from_file(crate::reduce::reduce::<K>(ep, arcs)?))
            }
        }
    }
}

type Pq1 = LevelizedPq<Request, RequestFstOrder>;
type Pq2 = SecondaryPq<CarriedRequest, RequestSndOrder>;

/// Canonical form of a request over one diagram: sorted, collapsed,
/// terminal-pruned.
pub(crate) fn resolve_request<K: DiagramKind, P: ProductPolicy<K>>(t1: Ptr, t2: Ptr) -> Target {
    if t1 == t2 {
        return Target::single(t1);
    }
    let (a, b) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
    if b.is_nil() {
        return Target::single(a);
    }
    if a.is_terminal() && !P::keep_terminal(a) {
        return Target::single(b);
    }
    if b.is_terminal() && !P::keep_terminal(b) {
        return Target::single(a);
    }
    if b.is_terminal() && P::collapse_to_terminal(b) {
        return Target::single(b);
    }
    if a.is_terminal() && b.is_terminal() {
        return Target::single(P::resolve_terminals(a, b));
    }
    Target::new(a, b)
}

/// Emits a resolved request downwards: terminal arcs straight to the
/// output, internal targets back into the queue.
fn recurse_out(pq: &mut Pq1, aw: &mut ArcWriter, source: Ptr, rec: Target) -> Result<()> {
    debug_assert!(!rec.fst().is_nil());
    if rec.fst().is_terminal() {
        debug_assert!(rec.snd().is_nil());
        aw.push_terminal(strata_core::Arc::new(source, rec.fst()))
    } else {
        pq.push(Request::new(rec, source))
    }
}

/// Runs `f` over every queued request for `target` on the current level.
fn for_each_request(
    pq1: &mut Pq1,
    pq2: &mut Pq2,
    target: Target,
    mut f: impl FnMut(Ptr) -> Result<()>,
) -> Result<()> {
    while matches!(pq1.peek(), Some(r) if r.target == target) {
        let r = pq1.pull().expect("peeked request");
        f(r.source)?;
    }
    while matches!(pq2.peek()?, Some(r) if r.target == target) {
        let r = pq2.pop()?.expect("peeked request");
        f(r.source)?;
    }
    Ok(())
}

/// The sweep with a secondary priority queue over a node stream.
fn sweep_pq<K: DiagramKind, P: ProductPolicy<K>>(
    policy: &P,
    mut nodes: DiagramNodes,
    mut pq1: Pq1,
    mut pq2: Pq2,
) -> Result<SweepOutput> {
    let mut aw = ArcWriter::new()?;
    let mut v = match nodes.pull()? {
        Some(n) => n,
        None => return Err(strata_core::Error::unreachable("product sweep over an empty stream")),
    };

    while !pq1.is_empty() {
        let level = pq1.setup_next_level()?;
        let mut out_id: Id = 0;
        let split = policy.split(level);

        while pq1.can_pull() || !pq2.is_empty() {
            // Merge the two queues on the pointer each would seek next.
            let (req, empty_carry) = {
                let take_pq1 = match (pq1.peek(), pq2.peek()?) {
                    (Some(a), Some(b)) => a.target.fst() < b.target.snd(),
                    (Some(_), None) => true,
                    (None, Some(_)) => false,
                    (None, None) => unreachable!("loop condition"),
                };
                if take_pq1 {
                    let r = pq1.peek().expect("checked above");
                    (CarriedRequest::new(r.target, [Ptr::nil(), Ptr::nil()], r.source), true)
                } else {
                    (pq2.peek()?.expect("checked above"), false)
                }
            };

            let t_seek = if empty_carry { req.target.fst() } else { req.target.snd() };
            while v.uid.as_ptr() < t_seek {
                v = nodes.pull()?.ok_or_else(|| {
                    strata_core::Error::unreachable("sought past the end of the node stream")
                })?;
            }

            // Both targets on this level: forward the first visit's children
            // across the level and fetch the second on its own turn.
            if empty_carry
                && req.target.snd().is_internal()
                && req.target.fst().level() == req.target.snd().level()
            {
                while matches!(pq1.peek(), Some(r) if r.target == req.target) {
                    let r = pq1.pull().expect("peeked request");
                    pq2.push(CarriedRequest::new(r.target, v.children(), r.source))?;
                }
                continue;
            }

            let children_fst = if empty_carry { v.children() } else { req.carry };
            let children_snd = second_children::<K>(&req.target, level, &v);

            if split {
                // Dissolve the node: its own two children pair up.
                let rec = resolve_request::<K, P>(children_fst[0], children_fst[1]);
                if req.source.is_nil() && rec.fst().is_terminal() {
                    return Ok(SweepOutput::Terminal(rec.fst().value()));
                }
                if rec.fst().is_terminal() {
                    for_each_request(&mut pq1, &mut pq2, req.target, |source| {
                        aw.push_terminal(strata_core::Arc::new(source, rec.fst()))
                    })?;
                } else {
                    forward_group(&mut pq1, &mut pq2, req.target, rec)?;
                }
                continue;
            }

            let out_uid = Uid::new(level, out_id);
            out_id += 1;

            let rec0 = resolve_request::<K, P>(children_fst[0], children_snd[0]);
            recurse_out(&mut pq1, &mut aw, out_uid.with_out_idx(false), rec0)?;
            let rec1 = resolve_request::<K, P>(children_fst[1], children_snd[1]);
            recurse_out(&mut pq1, &mut aw, out_uid.with_out_idx(true), rec1)?;

            for_each_request(&mut pq1, &mut pq2, req.target, |source| {
                if source.is_nil() {
                    return Ok(());
                }
                aw.push_internal(strata_core::Arc::new(source, out_uid.as_ptr()))
            })?;
        }

        if out_id > 0 {
            aw.push_level(LevelInfo::new(level, out_id))?;
        }
        aw.observe_cut(pq1.size());
    }

    Ok(SweepOutput::Arcs(aw.seal()?))
}

/// Re-queues a whole request group under a new resolved target.
fn forward_group(pq1: &mut Pq1, pq2: &mut Pq2, old: Target, rec: Target) -> Result<()> {
    debug_assert!(rec.fst().is_internal());
    let mut pending: SmallVec<[Ptr; 4]> = SmallVec::new();
    while matches!(pq1.peek(), Some(r) if r.target == old) {
        pending.push(pq1.pull().expect("peeked request").source);
    }
    while matches!(pq2.peek()?, Some(r) if r.target == old) {
        pending.push(pq2.pop()?.expect("peeked request").source);
    }
    for source in pending {
        pq1.push(Request::new(rec, source))?;
    }
    Ok(())
}

/// The sweep with random access instead of a secondary queue.
fn sweep_ra<K: DiagramKind, P: ProductPolicy<K>>(
    policy: &P,
    mut ra: DiagramRandomAccess,
    mut pq1: Pq1,
) -> Result<SweepOutput> {
    let mut aw = ArcWriter::new()?;
    let mut pq2 = SecondaryPq::new(false, 0, 0); // never used; for_each_request wants one

    while !pq1.is_empty() {
        let level = pq1.setup_next_level()?;
        ra.setup_next_level(level)?;
        let mut out_id: Id = 0;
        let split = policy.split(level);

        while pq1.can_pull() {
            let req = pq1.peek().expect("non-empty level");

            let children_fst = ra.at(Uid::from_ptr(req.target.fst())).children();
            let children_snd = if req.target.snd().is_internal() && req.target.snd().level() == level {
                ra.at(Uid::from_ptr(req.target.snd())).children()
            } else {
                second_expansion::<K>(req.target.snd())
            };

            if split {
                let rec = resolve_request::<K, P>(children_fst[0], children_fst[1]);
                if req.source.is_nil() && rec.fst().is_terminal() {
                    return Ok(SweepOutput::Terminal(rec.fst().value()));
                }
                if rec.fst().is_terminal() {
                    for_each_request(&mut pq1, &mut pq2, req.target, |source| {
                        aw.push_terminal(strata_core::Arc::new(source, rec.fst()))
                    })?;
                } else {
                    forward_group(&mut pq1, &mut pq2, req.target, rec)?;
                }
                continue;
            }

            let out_uid = Uid::new(level, out_id);
            out_id += 1;

            let rec0 = resolve_request::<K, P>(children_fst[0], children_snd[0]);
            recurse_out(&mut pq1, &mut aw, out_uid.with_out_idx(false), rec0)?;
            let rec1 = resolve_request::<K, P>(children_fst[1], children_snd[1]);
            recurse_out(&mut pq1, &mut aw, out_uid.with_out_idx(true), rec1)?;

            for_each_request(&mut pq1, &mut pq2, req.target, |source| {
                if source.is_nil() {
                    return Ok(());
                }
                aw.push_internal(strata_core::Arc::new(source, out_uid.as_ptr()))
            })?;
        }

        if out_id > 0 {
            aw.push_level(LevelInfo::new(level, out_id))?;
        }
        aw.observe_cut(pq1.size());
    }

    Ok(SweepOutput::Arcs(aw.seal()?))
}

/// Children the second target contributes when it does not sit on the
/// current level.
fn second_children<K: DiagramKind>(target: &Target, level: Level, v: &Node) -> Children {
    let snd = target.snd();
    if snd.is_internal() && snd.level() == level {
        v.children()
    } else {
        second_expansion::<K>(snd)
    }
}

fn second_expansion<K: DiagramKind>(snd: Ptr) -> Children {
    if snd.is_nil() {
        // One-armed request: nil rides through resolution untouched.
        [Ptr::nil(), Ptr::nil()]
    } else {
        K::reduction_rule_inv(snd)
    }
}

/// Upper bound on the queue population from the input's 2-level cuts.
fn ilevel_bound_2<K: DiagramKind, P: ProductPolicy<K>>(input: &Diagram<K>) -> u64 {
    let internal = input.max_2level_cut(strata_core::CutType::Internal);
    let with_terminals = input.max_2level_cut(P::cut_type());
    let by_cut = internal.saturating_mul(with_terminals).saturating_add(2);
    let n = input.node_count().max(1);
    let by_size = n.saturating_mul(n).saturating_add(3);
    by_cut.min(by_size)
}

fn ilevel_bound_1<K: DiagramKind, P: ProductPolicy<K>>(input: &Diagram<K>) -> u64 {
    let internal = input.max_1level_cut(strata_core::CutType::Internal);
    let with_terminals = input.max_1level_cut(P::cut_type());
    internal.saturating_mul(with_terminals).saturating_add(2)
}

/// Entry point: a single-input product sweep over a non-terminal diagram,
/// seeded at its root.
pub(crate) fn prod2u<K: DiagramKind, P: ProductPolicy<K>>(
    ep: &ExecPolicy,
    input: &Diagram<K>,
    policy: &P,
) -> Result<SweepOutput> {
    debug_assert!(!input.is_terminal());
    let seed = Request::new(Target::single(input.root_ptr()), Ptr::nil());
    prod2u_seeded(ep, input, policy, vec![seed], None)
}

/// A sweep seeded with explicit root requests (nested sweeping's inner
/// entry). `extra_levels`, when given, joins the look-ahead level stream.
pub(crate) fn prod2u_seeded<K: DiagramKind, P: ProductPolicy<K>>(
    ep: &ExecPolicy,
    input: &Diagram<K>,
    policy: &P,
    seeds: Vec<Request>,
    extra_levels: Option<Vec<Level>>,
) -> Result<SweepOutput> {
    let pq1_bound = ilevel_bound_2::<K, P>(input).saturating_add(seeds.len() as u64);
    let pq2_bound = ilevel_bound_1::<K, P>(input).saturating_add(seeds.len() as u64);

    let aux = strata_io::memory::aux_available(2);
    let (m1, m2) = strata_io::memory::split_weighted(aux, Pq1::DATA_STRUCTURES, Pq2::DATA_STRUCTURES);
    let fits1 = Pq1::memory_fits(m1);
    let fits2 = Pq2::memory_fits(m2);

    let external = match ep.memory {
        MemoryMode::Internal => false,
        MemoryMode::External => true,
        MemoryMode::Auto => pq1_bound > fits1 || pq2_bound > fits2,
    };
    let (max1, max2) = if ep.memory == MemoryMode::Internal {
        (pq1_bound.min(fits1), pq2_bound.min(fits2))
    } else {
        (pq1_bound, pq2_bound)
    };
    let lookahead = if pq1_bound <= no_lookahead_bound() { 0 } else { 1 };

    let mut levels = LevelMerger::new(Direction::Down).with(input.level_stream()?);
    if let Some(extra) = extra_levels {
        levels.add(Box::new(strata_io::GeneratorLevels::new(strata_core::gen_from_iter(extra))));
    }

    let mut pq1: Pq1 = LevelizedPq::new(external, Direction::Down, lookahead, levels, m1, max1);
    for seed in seeds {
        pq1.push(seed)?;
    }

    let use_ra = match ep.access {
        AccessMode::RandomAccess => true,
        AccessMode::PriorityQueue => false,
        AccessMode::Auto => {
            input.indexable()
                && strata_io::NodeRandomAccess::memory_usage(input.width()) <= m2 / 2
        }
    };
    tracing::debug!(pq1_bound, pq2_bound, external, lookahead, use_ra, "product sweep starting");

    if use_ra {
        let ra = DiagramRandomAccess::open(input)?;
        sweep_ra::<K, P>(policy, ra, pq1)
    } else {
        let pq2: Pq2 = SecondaryPq::new(external, m2, max2);
        sweep_pq::<K, P>(policy, input.nodes()?, pq1, pq2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::BddKind;
    use crate::policy::{Or, QuantifyPolicy};

    type P = QuantifyPolicy<BddKind, Or>;

    #[test]
    fn resolve_collapses_equal_targets() {
        let a = Ptr::internal(2, 1, false);
        assert_eq!(resolve_request::<BddKind, P>(a, a), Target::single(a));
    }

    #[test]
    fn resolve_sorts_internal_pairs() {
        let a = Ptr::internal(2, 1, false);
        let b = Ptr::internal(1, 0, false);
        assert_eq!(resolve_request::<BddKind, P>(a, b), Target::new(b, a));
    }

    #[test]
    fn resolve_prunes_identity_terminal() {
        let a = Ptr::internal(2, 1, false);
        assert_eq!(resolve_request::<BddKind, P>(a, Ptr::terminal(false)), Target::single(a));
    }

    #[test]
    fn resolve_collapses_absorbing_terminal() {
        let a = Ptr::internal(2, 1, false);
        assert_eq!(
            resolve_request::<BddKind, P>(a, Ptr::terminal(true)),
            Target::single(Ptr::terminal(true))
        );
    }

    #[test]
    fn resolve_combines_terminal_pairs() {
        assert_eq!(
            resolve_request::<BddKind, QuantifyPolicy<BddKind, crate::policy::And>>(
                Ptr::terminal(true),
                Ptr::terminal(true)
            ),
            Target::single(Ptr::terminal(true))
        );
    }

    #[test]
    fn resolve_keeps_nil_second_slot() {
        let a = Ptr::internal(0, 0, false);
        assert_eq!(resolve_request::<BddKind, P>(a, Ptr::nil()), Target::single(a));
    }
}
