//! The select sweep: a top-down pass that keeps or redirects each node.
//!
//! The cheapest of the sweeps: one levelized queue of one-armed requests, no
//! pairing. Per node the policy answers Keep (replicate with its children)
//! or SkipTo (reroute every waiting parent to some pointer, typically a
//! child). Restriction is a select; so is the pruning transposition that
//! precedes a nested quantification.

use strata_core::{
    Direction, ExecPolicy, Id, Level, LevelInfo, MemoryMode, Node, Ptr, Request, RequestFstOrder,
    Result, Target, Uid,
};
use strata_io::levelized_pq::no_lookahead_bound;
use strata_io::stream::RecordStream;
use strata_io::{ArcWriter, LevelMerger, LevelizedPq};

use crate::diagram::{Diagram, DiagramKind};
use crate::policy::{BoolOp, ProductPolicy, QuantifyPolicy};
use crate::prod2u::SweepOutput;

/// What to do with one visited node.
pub(crate) enum SelectRec {
    /// Replicate the node with its children.
    Keep,
    /// Reroute every request for this node to the pointer.
    SkipTo(Ptr),
}

pub(crate) trait SelectPolicy<K: DiagramKind> {
    fn setup_level(&mut self, level: Level);
    fn process(&mut self, node: &Node) -> SelectRec;
}

type Pq = LevelizedPq<Request, RequestFstOrder>;

pub(crate) fn select<K: DiagramKind, P: SelectPolicy<K>>(
    ep: &ExecPolicy,
    input: &Diagram<K>,
    policy: &mut P,
) -> Result<SweepOutput> {
    debug_assert!(!input.is_terminal());

    let bound = input.node_count().saturating_mul(2).saturating_add(2);
    let memory = strata_io::memory::aux_available(2);
    let fits = Pq::memory_fits(memory);
    let external = match ep.memory {
        MemoryMode::Internal => false,
        MemoryMode::External => true,
        MemoryMode::Auto => bound > fits,
    };
    let max_size = if ep.memory == MemoryMode::Internal { bound.min(fits) } else { bound };
    let lookahead = if bound <= no_lookahead_bound() { 0 } else { 1 };
    tracing::debug!(bound, external, "select sweep starting");

    let levels = LevelMerger::new(Direction::Down).with(input.level_stream()?);
    let mut pq: Pq = LevelizedPq::new(external, Direction::Down, lookahead, levels, memory, max_size);
    pq.push(Request::new(Target::single(input.root_ptr()), Ptr::nil()))?;

    let mut nodes = input.nodes()?;
    let mut v = nodes
        .pull()?
        .ok_or_else(|| strata_core::Error::unreachable("select over an empty stream"))?;
    let mut aw = ArcWriter::new()?;

    while !pq.is_empty() {
        let level = pq.setup_next_level()?;
        policy.setup_level(level);
        let mut out_id: Id = 0;

        while pq.can_pull() {
            let req = pq.peek().expect("non-empty level");
            let target = req.target;
            while v.uid.as_ptr() < target.fst() {
                v = nodes.pull()?.ok_or_else(|| {
                    strata_core::Error::unreachable("sought past the end of the node stream")
                })?;
            }

            match policy.process(&v) {
                SelectRec::SkipTo(t) => {
                    if t.is_terminal() && req.source.is_nil() {
                        return Ok(SweepOutput::Terminal(t.value()));
                    }
                    while matches!(pq.peek(), Some(r) if r.target == target) {
                        let r = pq.pull().expect("peeked request");
                        if t.is_terminal() {
                            aw.push_terminal(strata_core::Arc::new(r.source, t))?;
                        } else {
                            pq.push(Request::new(Target::single(t), r.source))?;
                        }
                    }
                }
                SelectRec::Keep => {
                    let out_uid = Uid::new(level, out_id);
                    out_id += 1;
                    for slot in [false, true] {
                        let child = v.child(slot);
                        let source = out_uid.with_out_idx(slot);
                        if child.is_terminal() {
                            aw.push_terminal(strata_core::Arc::new(source, child))?;
                        } else {
                            pq.push(Request::new(Target::single(child), source))?;
                        }
                    }
                    while matches!(pq.peek(), Some(r) if r.target == target) {
                        let r = pq.pull().expect("peeked request");
                        if !r.source.is_nil() {
                            aw.push_internal(strata_core::Arc::new(r.source, out_uid.as_ptr()))?;
                        }
                    }
                }
            }
        }

        if out_id > 0 {
            aw.push_level(LevelInfo::new(level, out_id))?;
        }
        aw.observe_cut(pq.size());
    }

    Ok(SweepOutput::Arcs(aw.seal()?))
}

/// Restriction: fix some variables to constants.
pub(crate) struct RestrictPolicy {
    /// `(level, value)` pairs in ascending level order.
    assignment: Vec<(Level, bool)>,
    index: usize,
    current: Option<bool>,
}

impl RestrictPolicy {
    pub(crate) fn new(mut assignment: Vec<(Level, bool)>) -> Self {
        assignment.sort_unstable_by_key(|&(l, _)| l);
        RestrictPolicy { assignment, index: 0, current: None }
    }
}

impl<K: DiagramKind> SelectPolicy<K> for RestrictPolicy {
    fn setup_level(&mut self, level: Level) {
        while self.index < self.assignment.len() && self.assignment[self.index].0 < level {
            self.index += 1;
        }
        self.current = match self.assignment.get(self.index) {
            Some(&(l, v)) if l == level => Some(v),
            _ => None,
        };
    }

    fn process(&mut self, node: &Node) -> SelectRec {
        match self.current {
            Some(v) => SelectRec::SkipTo(node.child(v)),
            None => SelectRec::Keep,
        }
    }
}

/// The pruning transposition before a nested quantification: cheap
/// terminal shortcuts on the to-be-swept levels, everything else kept.
pub(crate) struct PruningPolicy<K, O, F> {
    pred: F,
    active: bool,
    _k: std::marker::PhantomData<K>,
    _o: std::marker::PhantomData<O>,
}

impl<K: DiagramKind, O: BoolOp, F: FnMut(Level) -> bool> PruningPolicy<K, O, F> {
    pub(crate) fn new(pred: F) -> Self {
        PruningPolicy { pred, active: false, _k: std::marker::PhantomData, _o: std::marker::PhantomData }
    }
}

impl<K: DiagramKind, O: BoolOp, F: FnMut(Level) -> bool> SelectPolicy<K> for PruningPolicy<K, O, F> {
    fn setup_level(&mut self, level: Level) {
        self.active = (self.pred)(level);
    }

    fn process(&mut self, node: &Node) -> SelectRec {
        if !self.active {
            return SelectRec::Keep;
        }
        type P<K, O> = QuantifyPolicy<K, O>;
        if node.low.is_terminal() {
            if P::<K, O>::collapse_to_terminal(node.low) {
                return SelectRec::SkipTo(node.low);
            }
            if !P::<K, O>::keep_terminal(node.low) {
                return SelectRec::SkipTo(node.high);
            }
        }
        if node.high.is_terminal() {
            if P::<K, O>::collapse_to_terminal(node.high) {
                return SelectRec::SkipTo(node.high);
            }
            if !P::<K, O>::keep_terminal(node.high) {
                return SelectRec::SkipTo(node.low);
            }
        }
        SelectRec::Keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::BddKind;
    use crate::policy::Or;

    #[test]
    fn restrict_policy_tracks_levels() {
        let mut p = RestrictPolicy::new(vec![(2, true), (0, false)]);
        <RestrictPolicy as SelectPolicy<BddKind>>::setup_level(&mut p, 0);
        assert_eq!(p.current, Some(false));
        <RestrictPolicy as SelectPolicy<BddKind>>::setup_level(&mut p, 1);
        assert_eq!(p.current, None);
        <RestrictPolicy as SelectPolicy<BddKind>>::setup_level(&mut p, 2);
        assert_eq!(p.current, Some(true));
    }

    #[test]
    fn pruning_policy_shortcuts_on_active_levels() {
        let mut p = PruningPolicy::<BddKind, Or, _>::new(|l| l == 1);
        let n = Node::new(Uid::new(1, 0), Ptr::terminal(true), Ptr::internal(2, 0, false));

        <_ as SelectPolicy<BddKind>>::setup_level(&mut p, 0);
        assert!(matches!(<_ as SelectPolicy<BddKind>>::process(&mut p, &n), SelectRec::Keep));

        <_ as SelectPolicy<BddKind>>::setup_level(&mut p, 1);
        match <_ as SelectPolicy<BddKind>>::process(&mut p, &n) {
            SelectRec::SkipTo(t) => assert_eq!(t, Ptr::terminal(true)),
            SelectRec::Keep => panic!("expected a shortcut"),
        }
    }
}
