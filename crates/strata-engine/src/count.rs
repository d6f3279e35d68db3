//! Counting, evaluation and satisfying-assignment walks.
//!
//! All of these are single top-down passes over the node stream. Pending
//! per-node accumulators live in an ordered map keyed by uid; the stream
//! arrives in uid order, so the map never holds more than a level cut's
//! worth of entries.

use std::collections::BTreeMap;

use strata_core::{Level, Ptr, Result, Uid};
use strata_io::stream::RecordStream;

use crate::diagram::{Diagram, DiagramKind};

/// Evaluates the Boolean function under `assignment`.
pub(crate) fn eval<K: DiagramKind>(
    dd: &Diagram<K>,
    assignment: impl Fn(Level) -> bool,
) -> Result<bool> {
    let mut cur = dd.root_ptr();
    if cur.is_terminal() {
        return Ok(cur.value());
    }
    let mut nodes = dd.nodes()?;
    loop {
        let n = loop {
            let n = nodes.pull()?.ok_or_else(|| {
                strata_core::Error::unreachable("evaluation ran past the node stream")
            })?;
            if n.uid.as_ptr() == cur {
                break n;
            }
        };
        cur = n.child(assignment(n.uid.level()));
        if cur.is_terminal() {
            return Ok(cur.value());
        }
    }
}

/// Number of satisfying assignments over `varcount` variables.
///
/// Internally each path to a node carries the weight `2^(varcount - len)`;
/// passing a node halves it, so the per-node accumulator stays integral as
/// long as `varcount` covers every level on a path.
pub(crate) fn satcount<K: DiagramKind>(dd: &Diagram<K>, varcount: u64) -> Result<u128> {
    debug_assert!(varcount >= dd.level_count());
    if let Some(v) = dd.terminal_value() {
        return Ok(if v { 1u128 << varcount.min(127) } else { 0 });
    }

    let mut pending: BTreeMap<Uid, u128> = BTreeMap::new();
    pending.insert(Uid::from_ptr(dd.root_ptr()), 1u128 << varcount.min(127));
    let mut total: u128 = 0;

    let mut nodes = dd.nodes()?;
    while let Some(n) = nodes.pull()? {
        let Some(weight) = pending.remove(&n.uid) else {
            continue;
        };
        let share = weight / 2;
        for child in n.children() {
            if child.is_terminal() {
                if child.value() {
                    total += share;
                }
            } else {
                *pending.entry(Uid::from_ptr(child)).or_insert(0) += share;
            }
        }
    }
    Ok(total)
}

/// Number of distinct root-to-true paths.
pub(crate) fn pathcount<K: DiagramKind>(dd: &Diagram<K>) -> Result<u64> {
    if let Some(v) = dd.terminal_value() {
        return Ok(v as u64);
    }
    let mut pending: BTreeMap<Uid, u64> = BTreeMap::new();
    pending.insert(Uid::from_ptr(dd.root_ptr()), 1);
    let mut total: u64 = 0;

    let mut nodes = dd.nodes()?;
    while let Some(n) = nodes.pull()? {
        let Some(count) = pending.remove(&n.uid) else {
            continue;
        };
        for child in n.children() {
            if child.is_terminal() {
                if child.value() {
                    total += count;
                }
            } else {
                *pending.entry(Uid::from_ptr(child)).or_insert(0) += count;
            }
        }
    }
    Ok(total)
}

/// The lexicographically smallest (`max = false`) or largest satisfying
/// assignment, fed to the consumer ascending by level over the visited
/// variables.
pub(crate) fn satextreme<K: DiagramKind>(
    dd: &Diagram<K>,
    max: bool,
    mut consumer: impl FnMut(Level, bool),
) -> Result<bool> {
    let mut cur = dd.root_ptr();
    if cur.is_terminal() {
        return Ok(cur.value());
    }
    let mut nodes = dd.nodes()?;
    loop {
        let n = loop {
            let n = nodes.pull()?.ok_or_else(|| {
                strata_core::Error::unreachable("walk ran past the node stream")
            })?;
            if n.uid.as_ptr() == cur {
                break n;
            }
        };
        // A canonical internal node always reaches true; prefer the wanted
        // branch unless it dead-ends in false.
        let preferred = n.child(max);
        let take_high = if preferred == Ptr::terminal(false) { !max } else { max };
        consumer(n.uid.level(), take_high);
        cur = n.child(take_high);
        if cur.is_terminal() {
            debug_assert!(cur.value());
            return Ok(true);
        }
    }
}

/// Feeds every level of the diagram's support to the consumer, ascending.
pub(crate) fn support<K: DiagramKind>(
    dd: &Diagram<K>,
    mut consumer: impl FnMut(Level),
) -> Result<()> {
    for l in dd.level_list()? {
        consumer(l);
    }
    Ok(())
}

/// Whether the diagram is a cube: one node per level, each with exactly one
/// false child, chaining down to true.
pub(crate) fn is_cube<K: DiagramKind>(dd: &Diagram<K>) -> Result<bool> {
    if let Some(v) = dd.terminal_value() {
        return Ok(v);
    }
    if dd.node_count() != dd.level_count() {
        return Ok(false);
    }
    let mut nodes = dd.nodes()?;
    while let Some(n) = nodes.pull()? {
        let falses =
            (n.low == Ptr::terminal(false)) as u8 + (n.high == Ptr::terminal(false)) as u8;
        if falses != 1 {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{LevelInfo, Node};
    use strata_io::NodeWriter;

    use crate::diagram::Bdd;

    fn xor01() -> Bdd {
        // x0 XOR x1.
        let mut w = NodeWriter::new().unwrap();
        w.push_node(Node::new(Uid::new(1, 1), Ptr::terminal(true), Ptr::terminal(false))).unwrap();
        w.push_node(Node::new(Uid::new(1, 0), Ptr::terminal(false), Ptr::terminal(true))).unwrap();
        w.push_level(LevelInfo::new(1, 2)).unwrap();
        w.push_node(Node::new(Uid::new(0, 0), Ptr::internal(1, 0, false), Ptr::internal(1, 1, false)))
            .unwrap();
        w.push_level(LevelInfo::new(0, 1)).unwrap();
        Diagram::from_file(w.seal().unwrap())
    }

    #[test]
    fn eval_follows_the_assignment() {
        let f = xor01();
        assert!(!eval(&f, |_| false).unwrap());
        assert!(!eval(&f, |_| true).unwrap());
        assert!(eval(&f, |l| l == 0).unwrap());
        assert!(eval(&f, |l| l == 1).unwrap());
    }

    #[test]
    fn counts_on_xor() {
        let f = xor01();
        assert_eq!(pathcount(&f).unwrap(), 2);
        assert_eq!(satcount(&f, 2).unwrap(), 2);
        assert_eq!(satcount(&f, 3).unwrap(), 4);
    }

    #[test]
    fn satmin_and_satmax_on_xor() {
        let f = xor01();
        let mut min = Vec::new();
        assert!(satextreme(&f, false, |l, v| min.push((l, v))).unwrap());
        assert_eq!(min, vec![(0, false), (1, true)]);

        let mut max = Vec::new();
        assert!(satextreme(&f, true, |l, v| max.push((l, v))).unwrap());
        assert_eq!(max, vec![(0, true), (1, false)]);
    }

    #[test]
    fn xor_is_not_a_cube() {
        assert!(!is_cube(&xor01()).unwrap());
    }

    #[test]
    fn counting_terminals() {
        let t: Bdd = Diagram::terminal(true).unwrap();
        assert_eq!(satcount(&t, 3).unwrap(), 8);
        assert_eq!(pathcount(&t).unwrap(), 1);
        assert!(is_cube(&t).unwrap());
    }
}
