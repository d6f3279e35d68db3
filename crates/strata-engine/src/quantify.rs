//! Quantification: single variable, predicate and generator forms.
//!
//! A single variable is one product sweep splitting at its level. Multiple
//! variables either repeat that sweep per level (`Singleton`) or run the
//! nested-sweeping framework (`Nested`), preceded by a transposition pass
//! that turns the reduced input back into an arc stream (pruning cheap
//! terminal shortcuts along the way).

use strata_core::{Error, ExecPolicy, Level, Node, QuantifyAlgorithm, Result};

use crate::diagram::{Diagram, DiagramKind};
use crate::nested::{nested_sweep, NestedOutcome};
use crate::policy::{BoolOp, QuantifyPolicy};
use crate::prod2u::{prod2u, SweepOutput};
use crate::select::{select, PruningPolicy, SelectPolicy, SelectRec};

fn nested_finish<K: DiagramKind>(outcome: NestedOutcome) -> Result<Diagram<K>> {
    match outcome {
        NestedOutcome::File(f) => Ok(Diagram::from_file(f)),
        NestedOutcome::Terminal(v) => Diagram::terminal(v),
    }
}

fn has_level<K: DiagramKind>(dd: &Diagram<K>, level: Level) -> Result<bool> {
    Ok(dd.level_list()?.binary_search(&level).is_ok())
}

/// Quantifies a single variable.
pub(crate) fn quantify_level<K: DiagramKind, O: BoolOp>(
    ep: &ExecPolicy,
    dd: &Diagram<K>,
    level: Level,
) -> Result<Diagram<K>> {
    if dd.is_terminal() || !has_level(dd, level)? {
        return Ok(dd.clone());
    }
    let policy = QuantifyPolicy::<K, O>::at_level(level);
    prod2u(ep, dd, &policy)?.finish(ep)
}

/// Quantifies every level satisfying the predicate.
pub(crate) fn quantify_pred<K: DiagramKind, O: BoolOp>(
    ep: &ExecPolicy,
    dd: Diagram<K>,
    pred: impl Fn(Level) -> bool,
) -> Result<Diagram<K>> {
    if dd.is_terminal() {
        return Ok(dd);
    }
    if !dd.level_list()?.iter().any(|&l| pred(l)) {
        return Ok(dd);
    }

    match ep.quantify {
        QuantifyAlgorithm::Singleton => {
            let mut dd = dd;
            loop {
                let Some(label) = dd.level_list()?.into_iter().rev().find(|&l| pred(l)) else {
                    return Ok(dd);
                };
                dd = quantify_level::<K, O>(ep, &dd, label)?;
                if dd.is_terminal() {
                    return Ok(dd);
                }
            }
        }
        QuantifyAlgorithm::Nested => {
            let mut pruning = PruningPolicy::<K, O, _>::new(&pred);
            match select(ep, &dd, &mut pruning)? {
                SweepOutput::Terminal(v) => Diagram::terminal(v),
                SweepOutput::Arcs(arcs) => {
                    nested_finish(nested_sweep::<K, O>(ep, arcs, |l| pred(l))?)
                }
            }
        }
    }
}

/// Quantifies the generated levels (onset) or everything but them (offset).
///
/// The generator must produce levels in descending order. The offset
/// schedule is only defined for a disjunction-shaped operator (it is the
/// engine behind ZDD projection); anything else is rejected loudly.
pub(crate) fn quantify_generator<K: DiagramKind, O: BoolOp>(
    ep: &ExecPolicy,
    dd: Diagram<K>,
    mut gen: impl FnMut() -> Option<Level>,
    onset: bool,
) -> Result<Diagram<K>> {
    let mut lvls = Vec::new();
    while let Some(l) = gen() {
        lvls.push(l);
    }
    lvls.sort_unstable_by(|a, b| b.cmp(a));
    lvls.dedup();

    if onset {
        quantify_onset::<K, O>(ep, dd, lvls)
    } else {
        quantify_offset::<K, O>(ep, dd, lvls)
    }
}

fn quantify_onset<K: DiagramKind, O: BoolOp>(
    ep: &ExecPolicy,
    dd: Diagram<K>,
    lvls: Vec<Level>,
) -> Result<Diagram<K>> {
    if lvls.is_empty() || dd.is_terminal() {
        return Ok(dd);
    }

    match ep.quantify {
        QuantifyAlgorithm::Singleton => {
            let mut dd = dd;
            for &l in &lvls {
                dd = quantify_level::<K, O>(ep, &dd, l)?;
                if dd.is_terminal() {
                    break;
                }
            }
            Ok(dd)
        }
        QuantifyAlgorithm::Nested => {
            // Transpose by quantifying the deepest generated level that is
            // present; the nested sweep handles the rest.
            let present = dd.level_list()?;
            let Some(pos) = lvls.iter().position(|l| present.binary_search(l).is_ok()) else {
                return Ok(dd);
            };
            let policy = QuantifyPolicy::<K, O>::at_level(lvls[pos]);
            match prod2u(ep, &dd, &policy)? {
                SweepOutput::Terminal(v) => Diagram::terminal(v),
                SweepOutput::Arcs(arcs) => {
                    let remaining: Vec<Level> = lvls[pos + 1..].to_vec();
                    let mut i = 0usize;
                    let has_sweep = move |x: Level| {
                        while i < remaining.len() && remaining[i] > x {
                            i += 1;
                        }
                        i < remaining.len() && remaining[i] == x
                    };
                    nested_finish(nested_sweep::<K, O>(ep, arcs, has_sweep)?)
                }
            }
        }
    }
}

fn is_disjunction<O: BoolOp>() -> bool {
    !O::eval(false, false) && O::eval(false, true) && O::eval(true, false) && O::eval(true, true)
}

fn quantify_offset<K: DiagramKind, O: BoolOp>(
    ep: &ExecPolicy,
    dd: Diagram<K>,
    keep: Vec<Level>,
) -> Result<Diagram<K>> {
    if !is_disjunction::<O>() {
        return Err(Error::invalid_argument(
            "the offset quantification schedule requires a disjunctive operator",
        ));
    }
    if dd.is_terminal() {
        return Ok(dd);
    }
    if keep.is_empty() {
        // Everything is quantified away; only reachability of true remains.
        let has_true = dd.file.meta.terminal_arcs[1] > 0;
        return Diagram::terminal(has_true);
    }
    let in_keep = |l: Level| keep.binary_search_by(|k| k.cmp(&l).reverse()).is_ok();

    match ep.quantify {
        QuantifyAlgorithm::Singleton => {
            let mut dd = dd;
            loop {
                let Some(label) = dd.level_list()?.into_iter().rev().find(|&l| !in_keep(l)) else {
                    return Ok(dd);
                };
                dd = quantify_level::<K, O>(ep, &dd, label)?;
                if dd.is_terminal() {
                    return Ok(dd);
                }
            }
        }
        QuantifyAlgorithm::Nested => {
            let mut keep_all = KeepAll;
            match select(ep, &dd, &mut keep_all)? {
                SweepOutput::Terminal(v) => Diagram::terminal(v),
                SweepOutput::Arcs(arcs) => {
                    nested_finish(nested_sweep::<K, O>(ep, arcs, |l| !in_keep(l))?)
                }
            }
        }
    }
}

/// Identity transposition: replays a reduced diagram as an arc stream.
struct KeepAll;

impl<K: DiagramKind> SelectPolicy<K> for KeepAll {
    fn setup_level(&mut self, _level: Level) {}

    fn process(&mut self, _node: &Node) -> SelectRec {
        SelectRec::Keep
    }
}
