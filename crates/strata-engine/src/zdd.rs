//! The ZDD operator façade.
//!
//! Terminals read differently here: false is the empty family and true the
//! family holding only the empty set, so only the false terminal ever
//! behaves as a constant during a sweep.

use strata_core::{Error, ExecPolicy, Level, Ptr, Result};
use strata_io::RecordStream;

use crate::apply;
use crate::builder::ZddBuilder;
use crate::count;
use crate::diagram::{Zdd, ZddKind};
use crate::intercut::{intercut, ExpandPolicy};
use crate::policy::{self, BoolOp};
use crate::quantify;

/// The empty family.
pub fn zdd_empty() -> Result<Zdd> {
    Zdd::terminal(false)
}

/// The family holding only the empty set.
pub fn zdd_null() -> Result<Zdd> {
    Zdd::terminal(true)
}

/// The family of the single set `{x_level}`.
pub fn zdd_ithvar(level: Level) -> Result<Zdd> {
    let mut b = ZddBuilder::new()?;
    b.add_node(level, Ptr::terminal(false), Ptr::terminal(true))?;
    b.build()
}

fn zdd_apply<O: BoolOp>(ep: &ExecPolicy, f: &Zdd, g: &Zdd) -> Result<Zdd> {
    if f.same_handle(g) {
        return match (O::eval(false, false), O::eval(true, true)) {
            (false, true) => Ok(f.clone()),
            (false, false) => zdd_empty(),
            _ => Err(Error::invalid_argument("operator is not meaningful on ZDD handles")),
        };
    }
    apply::apply::<ZddKind, O>(ep, f, g)?.finish(ep)
}

/// Family union.
pub fn zdd_union(ep: &ExecPolicy, f: &Zdd, g: &Zdd) -> Result<Zdd> {
    zdd_apply::<policy::Or>(ep, f, g)
}

/// Family intersection.
pub fn zdd_intsec(ep: &ExecPolicy, f: &Zdd, g: &Zdd) -> Result<Zdd> {
    zdd_apply::<policy::And>(ep, f, g)
}

/// Family difference.
pub fn zdd_diff(ep: &ExecPolicy, f: &Zdd, g: &Zdd) -> Result<Zdd> {
    zdd_apply::<policy::Diff>(ep, f, g)
}

/// Widens the family to a larger variable scope: every set may or may not
/// include each of `vars` (which must be absent from `f`'s support).
pub fn zdd_expand(
    ep: &ExecPolicy,
    f: &Zdd,
    vars: impl IntoIterator<Item = Level>,
) -> Result<Zdd> {
    let mut levels: Vec<Level> = vars.into_iter().collect();
    levels.sort_unstable();
    levels.dedup();
    if levels.is_empty() {
        return Ok(f.clone());
    }
    if let Some(v) = f.terminal_value() {
        if !v {
            return zdd_empty();
        }
        // The powerset chain over the new variables.
        let mut b = ZddBuilder::new()?;
        let mut next = Ptr::terminal(true);
        for &l in levels.iter().rev() {
            next = b.add_node(l, next, next)?;
        }
        return b.build();
    }
    let support = f.level_list()?;
    if levels.iter().any(|l| support.binary_search(l).is_ok()) {
        return Err(Error::invalid_argument("expansion variables overlap the family's support"));
    }

    intercut::<ZddKind, ExpandPolicy>(ep, f, &levels)?.finish(ep)
}

/// Projects the family onto the generated variables (descending order):
/// every other variable is removed from every set.
pub fn zdd_project(
    ep: &ExecPolicy,
    f: &Zdd,
    keep: impl FnMut() -> Option<Level>,
) -> Result<Zdd> {
    quantify::quantify_generator::<ZddKind, policy::Or>(ep, f.clone(), keep, false)
}

/// Whether the set (ascending levels) belongs to the family.
pub fn zdd_contains(f: &Zdd, set: impl IntoIterator<Item = Level>) -> Result<bool> {
    let mut set: Vec<Level> = set.into_iter().collect();
    set.sort_unstable();
    set.dedup();

    let mut cur = f.root_ptr();
    let mut idx = 0usize;
    if cur.is_terminal() {
        return Ok(cur.value() && set.is_empty());
    }
    let mut nodes = f.nodes()?;
    loop {
        let n = loop {
            let n = nodes.pull()?.ok_or_else(|| {
                strata_core::Error::unreachable("walk ran past the node stream")
            })?;
            if n.uid.as_ptr() == cur {
                break n;
            }
        };
        let level = n.uid.level();
        // Any set member above this node would have needed a high edge.
        if idx < set.len() && set[idx] < level {
            return Ok(false);
        }
        let take_high = set.get(idx) == Some(&level);
        if take_high {
            idx += 1;
        }
        cur = n.child(take_high);
        if cur.is_terminal() {
            return Ok(cur.value() && idx == set.len());
        }
    }
}

/// Number of sets in the family.
pub fn zdd_size(f: &Zdd) -> Result<u64> {
    count::pathcount(f)
}

pub fn zdd_nodecount(f: &Zdd) -> u64 {
    f.node_count()
}

pub fn zdd_varcount(f: &Zdd) -> u64 {
    f.level_count()
}

pub fn zdd_equal(f: &Zdd, g: &Zdd) -> Result<bool> {
    f.equals(g)
}
