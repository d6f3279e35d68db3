//! Two-input product construction.
//!
//! Simulates both inputs in lock-step from their roots downwards, one
//! output node per reachable pair of positions. Unlike the single-input
//! sweep, the target pair stays positional: the two pointers index into
//! different files, so sorting or collapsing them would conflate unrelated
//! nodes. Terminals that neither absorb nor combine simply ride along in
//! their slot until the other side bottoms out.
//!
//! When a request needs nodes from both inputs on the same level, the first
//! visit's children are carried across the level in the secondary queue
//! (or fetched directly in the random-access variant).

use strata_core::{
    AccessMode, CarriedRequest, Children, Direction, ExecPolicy, Id, LevelInfo, MemoryMode, Node,
    Ptr, Request, RequestFstOrder, RequestPositionalOrder, RequestSndOrder, Result, Target, Uid,
};
use strata_io::levelized_pq::no_lookahead_bound;
use strata_io::stream::RecordStream;
use strata_io::{ArcWriter, LevelMerger, LevelizedPq, SecondaryPq};

use crate::diagram::{Diagram, DiagramKind, DiagramNodes, DiagramRandomAccess};
use crate::policy::{cut_with_terminals, left_collapse, right_collapse, BoolOp};
use crate::prod2u::SweepOutput;

type Pq1 = LevelizedPq<Request, RequestFstOrder>;
type Pq1Ra = LevelizedPq<Request, RequestPositionalOrder>;
type Pq2 = SecondaryPq<CarriedRequest, RequestSndOrder>;

/// Resolution of one positional child pair.
pub(crate) fn resolve_pair<K: DiagramKind, O: BoolOp>(a: Ptr, b: Ptr) -> Target {
    if a.is_terminal() {
        if let Some(r) = left_collapse::<K, O>(a.value()) {
            return Target::single(Ptr::terminal(r));
        }
    }
    if b.is_terminal() {
        if let Some(r) = right_collapse::<K, O>(b.value()) {
            return Target::single(Ptr::terminal(r));
        }
    }
    if a.is_terminal() && b.is_terminal() {
        return Target::single(Ptr::terminal(O::eval(a.value(), b.value())));
    }
    Target::new(a, b)
}

/// One input's positional children at the current level: its node's, or the
/// expansion of the skipped / terminal pointer.
fn side_children<K: DiagramKind>(t: Ptr, level: strata_core::Level, v: &Node) -> Children {
    if t.is_internal() && t.level() == level {
        debug_assert_eq!(v.uid.as_ptr(), t);
        v.children()
    } else {
        K::reduction_rule_inv(t)
    }
}

struct Emitter {
    aw: ArcWriter,
    out_id: Id,
    level: strata_core::Level,
}

impl Emitter {
    fn next_uid(&mut self) -> Uid {
        let uid = Uid::new(self.level, self.out_id);
        self.out_id += 1;
        uid
    }
}

/// The sweep with two node streams and a secondary queue.
fn sweep_pq<K: DiagramKind, O: BoolOp>(
    mut f_nodes: DiagramNodes,
    mut g_nodes: DiagramNodes,
    mut pq1: Pq1,
    mut pq2: Pq2,
) -> Result<SweepOutput> {
    let mut aw = ArcWriter::new()?;
    let mut v1 = f_nodes.pull()?;
    let mut v2 = g_nodes.pull()?;

    while !pq1.is_empty() {
        let level = pq1.setup_next_level()?;
        let mut out_id: Id = 0;

        while pq1.can_pull() || !pq2.is_empty() {
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
            while matches!(v1, Some(n) if n.uid.as_ptr() < t_seek) {
                v1 = f_nodes.pull()?;
            }
            while matches!(v2, Some(n) if n.uid.as_ptr() < t_seek) {
                v2 = g_nodes.pull()?;
            }

            let (t1, t2) = (req.target.0, req.target.1);
            let both_here = t1.is_internal()
                && t2.is_internal()
                && t1.level() == level
                && t2.level() == level;

            if empty_carry && both_here {
                // Carry the first visit's children; the second visit pulls
                // its own on the later seek.
                let fst_is_first = t1 <= t2;
                let carry = if fst_is_first {
                    v1.as_ref().expect("sought node").children()
                } else {
                    v2.as_ref().expect("sought node").children()
                };
                while matches!(pq1.peek(), Some(r) if r.target == req.target) {
                    let r = pq1.pull().expect("peeked request");
                    pq2.push(CarriedRequest::new(r.target, carry, r.source))?;
                }
                continue;
            }

            let (children_1, children_2) = if empty_carry {
                let c1 = side_children::<K>(t1, level, v1.as_ref().unwrap_or(&Node::terminal(false)));
                let c2 = side_children::<K>(t2, level, v2.as_ref().unwrap_or(&Node::terminal(false)));
                (c1, c2)
            } else {
                let fst_is_first = t1 <= t2;
                if fst_is_first {
                    (req.carry, v2.as_ref().expect("sought node").children())
                } else {
                    (v1.as_ref().expect("sought node").children(), req.carry)
                }
            };

            let mut em = Emitter { aw, out_id, level };
            emit_node::<K, O, _>(&mut em, &mut pq1, &mut pq2, req.target, children_1, children_2)?;
            aw = em.aw;
            out_id = em.out_id;
        }

        if out_id > 0 {
            aw.push_level(LevelInfo::new(level, out_id))?;
        }
        aw.observe_cut(pq1.size());
    }

    Ok(SweepOutput::Arcs(aw.seal()?))
}

/// Emits the output node for a request group and its outgoing recursions.
fn emit_node<K: DiagramKind, O: BoolOp, Q>(
    em: &mut Emitter,
    pq1: &mut LevelizedPq<Request, Q>,
    pq2: &mut Pq2,
    target: Target,
    children_1: Children,
    children_2: Children,
) -> Result<()>
where
    Q: strata_core::ItemCmp<Request>,
{
    let out_uid = em.next_uid();

    for slot in [false, true] {
        let rec = resolve_pair::<K, O>(children_1[slot as usize], children_2[slot as usize]);
        let source = out_uid.with_out_idx(slot);
        if rec.fst().is_terminal() {
            debug_assert!(rec.snd().is_nil());
            em.aw.push_terminal(strata_core::Arc::new(source, rec.fst()))?;
        } else {
            pq1.push(Request::new(rec, source))?;
        }
    }

    while matches!(pq1.peek(), Some(r) if r.target == target) {
        let r = pq1.pull().expect("peeked request");
        if !r.source.is_nil() {
            em.aw.push_internal(strata_core::Arc::new(r.source, out_uid.as_ptr()))?;
        }
    }
    while matches!(pq2.peek()?, Some(r) if r.target == target) {
        let r = pq2.pop()?.expect("peeked request");
        if !r.source.is_nil() {
            em.aw.push_internal(strata_core::Arc::new(r.source, out_uid.as_ptr()))?;
        }
    }
    Ok(())
}

/// The sweep streaming `f` and random-accessing `g`.
fn sweep_ra<K: DiagramKind, O: BoolOp>(
    mut f_nodes: DiagramNodes,
    mut g_ra: DiagramRandomAccess,
    mut pq1: Pq1Ra,
) -> Result<SweepOutput> {
    let mut aw = ArcWriter::new()?;
    let mut v1 = f_nodes.pull()?;
    let mut pq2: Pq2 = SecondaryPq::new(false, 0, 0);

    while !pq1.is_empty() {
        let level = pq1.setup_next_level()?;
        g_ra.setup_next_level(level)?;
        let mut out_id: Id = 0;

        while pq1.can_pull() {
            let req = pq1.peek().expect("non-empty level");
            let (t1, t2) = (req.target.0, req.target.1);

            if t1.is_internal() && t1.level() == level {
                while matches!(v1, Some(n) if n.uid.as_ptr() < t1) {
                    v1 = f_nodes.pull()?;
                }
            }
            let children_1 = side_children::<K>(t1, level, v1.as_ref().unwrap_or(&Node::terminal(false)));
            let children_2 = if t2.is_internal() && t2.level() == level {
                g_ra.at(Uid::from_ptr(t2)).children()
            } else {
                K::reduction_rule_inv(t2)
            };

            let mut em = Emitter { aw, out_id, level };
            emit_node::<K, O, _>(&mut em, &mut pq1, &mut pq2, req.target, children_1, children_2)?;
            aw = em.aw;
            out_id = em.out_id;
        }

        if out_id > 0 {
            aw.push_level(LevelInfo::new(level, out_id))?;
        }
        aw.observe_cut(pq1.size());
    }

    Ok(SweepOutput::Arcs(aw.seal()?))
}

fn cut2_bound<K: DiagramKind, O: BoolOp>(f: &Diagram<K>, g: &Diagram<K>) -> u64 {
    let ct = cut_with_terminals::<K, O>();
    let by_cut = f
        .max_2level_cut(ct)
        .max(1)
        .saturating_mul(g.max_2level_cut(ct).max(1))
        .saturating_add(2);
    let by_size = f
        .node_count()
        .max(1)
        .saturating_mul(g.node_count().max(1))
        .saturating_add(3);
    by_cut.min(by_size)
}

fn cut1_bound<K: DiagramKind, O: BoolOp>(f: &Diagram<K>, g: &Diagram<K>) -> u64 {
    let ct = cut_with_terminals::<K, O>();
    f.max_1level_cut(ct)
        .max(1)
        .saturating_mul(g.max_1level_cut(ct).max(1))
        .saturating_add(2)
}

/// Entry point: `op(f, g)` as an unreduced arc file (or an immediate
/// terminal when the root pair collapses).
pub(crate) fn apply<K: DiagramKind, O: BoolOp>(
    ep: &ExecPolicy,
    f: &Diagram<K>,
    g: &Diagram<K>,
) -> Result<SweepOutput> {
    let seed_target = resolve_pair::<K, O>(f.root_ptr(), g.root_ptr());
    if seed_target.fst().is_terminal() {
        return Ok(SweepOutput::Terminal(seed_target.fst().value()));
    }

    let pq1_bound = cut2_bound::<K, O>(f, g);
    let pq2_bound = cut1_bound::<K, O>(f, g);

    let aux = strata_io::memory::aux_available(3);
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

    let use_ra = match ep.access {
        AccessMode::RandomAccess => true,
        AccessMode::PriorityQueue => false,
        AccessMode::Auto => {
            g.indexable() && strata_io::NodeRandomAccess::memory_usage(g.width()) <= m2 / 2
        }
    };
    tracing::debug!(pq1_bound, pq2_bound, external, lookahead, use_ra, "apply sweep starting");

    let seed = Request::new(seed_target, Ptr::nil());
    let levels = || -> Result<LevelMerger> {
        let mut m = LevelMerger::new(Direction::Down);
        if !f.is_terminal() {
            m.add(f.level_stream()?);
        }
        if !g.is_terminal() {
            m.add(g.level_stream()?);
        }
        Ok(m)
    };

    if use_ra {
        let mut pq1: Pq1Ra = LevelizedPq::new(external, Direction::Down, lookahead, levels()?, m1, max1);
        pq1.push(seed)?;
        sweep_ra::<K, O>(f.nodes()?, DiagramRandomAccess::open(g)?, pq1)
    } else {
        let mut pq1: Pq1 = LevelizedPq::new(external, Direction::Down, lookahead, levels()?, m1, max1);
        pq1.push(seed)?;
        let pq2: Pq2 = SecondaryPq::new(external, m2, max2);
        sweep_pq::<K, O>(f.nodes()?, g.nodes()?, pq1, pq2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::{BddKind, ZddKind};
    use crate::policy::{And, Or, Xor};

    #[test]
    fn absorbing_terminal_collapses_the_pair() {
        let x = Ptr::internal(3, 1, false);
        assert_eq!(
            resolve_pair::<BddKind, And>(Ptr::terminal(false), x),
            Target::single(Ptr::terminal(false))
        );
        assert_eq!(
            resolve_pair::<BddKind, Or>(x, Ptr::terminal(true)),
            Target::single(Ptr::terminal(true))
        );
    }

    #[test]
    fn identity_terminal_rides_along() {
        let x = Ptr::internal(3, 1, false);
        assert_eq!(resolve_pair::<BddKind, And>(Ptr::terminal(true), x), Target::new(Ptr::terminal(true), x));
        assert_eq!(resolve_pair::<BddKind, Xor>(x, Ptr::terminal(false)), Target::new(x, Ptr::terminal(false)));
    }

    #[test]
    fn terminal_pairs_resolve_by_the_operator() {
        assert_eq!(
            resolve_pair::<BddKind, Xor>(Ptr::terminal(true), Ptr::terminal(true)),
            Target::single(Ptr::terminal(false))
        );
    }

    #[test]
    fn zdd_true_terminal_never_absorbs_union() {
        let x = Ptr::internal(3, 1, false);
        assert_eq!(
            resolve_pair::<ZddKind, Or>(Ptr::terminal(true), x),
            Target::new(Ptr::terminal(true), x)
        );
        // The empty family is still the union identity, but collapse only
        // fires for intersect.
        assert_eq!(
            resolve_pair::<ZddKind, And>(Ptr::terminal(false), x),
            Target::single(Ptr::terminal(false))
        );
    }
}
