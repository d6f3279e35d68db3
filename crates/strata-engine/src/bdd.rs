//! The BDD operator façade: thin wrappers picking a policy and calling the
//! core sweeps.

use strata_core::{ExecPolicy, Level, Ptr, Result};
use strata_io::RecordStream;

use crate::apply;
use crate::builder::BddBuilder;
use crate::count;
use crate::diagram::{Bdd, BddKind};
use crate::policy::{self, BoolOp};
use crate::quantify;
use crate::select::{select, RestrictPolicy};

pub fn bdd_const(value: bool) -> Result<Bdd> {
    Bdd::terminal(value)
}

pub fn bdd_true() -> Result<Bdd> {
    bdd_const(true)
}

pub fn bdd_false() -> Result<Bdd> {
    bdd_const(false)
}

/// The single-variable function `x_level`.
pub fn bdd_ithvar(level: Level) -> Result<Bdd> {
    let mut b = BddBuilder::new()?;
    b.add_node(level, Ptr::terminal(false), Ptr::terminal(true))?;
    b.build()
}

/// The negated single-variable function `!x_level`.
pub fn bdd_nithvar(level: Level) -> Result<Bdd> {
    Ok(bdd_ithvar(level)?.negated())
}

/// Complement; O(1) on the handle.
pub fn bdd_not(f: &Bdd) -> Bdd {
    f.negated()
}

/// Generic two-input apply.
pub fn bdd_apply<O: BoolOp>(ep: &ExecPolicy, f: &Bdd, g: &Bdd) -> Result<Bdd> {
    // Constant operands shortcut to a flag flip or a constant.
    if let Some(v) = f.terminal_value() {
        if let Some(r) = policy::left_collapse::<BddKind, O>(v) {
            return bdd_const(r);
        }
        return Ok(if O::eval(v, true) { g.clone() } else { g.negated() });
    }
    if let Some(v) = g.terminal_value() {
        if let Some(r) = policy::right_collapse::<BddKind, O>(v) {
            return bdd_const(r);
        }
        return Ok(if O::eval(true, v) { f.clone() } else { f.negated() });
    }
    // Identical files shortcut on the operator's diagonal.
    if f.same_handle(g) {
        let diag = |a: bool| O::eval(a != f.negate, a != g.negate);
        return match (diag(false), diag(true)) {
            (false, true) => Ok(f.with_negate(false)),
            (true, false) => Ok(f.with_negate(true)),
            (v0, v1) => {
                debug_assert_eq!(v0, v1);
                bdd_const(v0)
            }
        };
    }

    apply::apply::<BddKind, O>(ep, f, g)?.finish(ep)
}

pub fn bdd_and(ep: &ExecPolicy, f: &Bdd, g: &Bdd) -> Result<Bdd> {
    bdd_apply::<policy::And>(ep, f, g)
}

pub fn bdd_or(ep: &ExecPolicy, f: &Bdd, g: &Bdd) -> Result<Bdd> {
    bdd_apply::<policy::Or>(ep, f, g)
}

pub fn bdd_xor(ep: &ExecPolicy, f: &Bdd, g: &Bdd) -> Result<Bdd> {
    bdd_apply::<policy::Xor>(ep, f, g)
}

pub fn bdd_nand(ep: &ExecPolicy, f: &Bdd, g: &Bdd) -> Result<Bdd> {
    bdd_apply::<policy::Nand>(ep, f, g)
}

pub fn bdd_nor(ep: &ExecPolicy, f: &Bdd, g: &Bdd) -> Result<Bdd> {
    bdd_apply::<policy::Nor>(ep, f, g)
}

pub fn bdd_xnor(ep: &ExecPolicy, f: &Bdd, g: &Bdd) -> Result<Bdd> {
    bdd_apply::<policy::Xnor>(ep, f, g)
}

pub fn bdd_imp(ep: &ExecPolicy, f: &Bdd, g: &Bdd) -> Result<Bdd> {
    bdd_apply::<policy::Imp>(ep, f, g)
}

pub fn bdd_invimp(ep: &ExecPolicy, f: &Bdd, g: &Bdd) -> Result<Bdd> {
    bdd_apply::<policy::InvImp>(ep, f, g)
}

/// `f AND NOT g`.
pub fn bdd_diff(ep: &ExecPolicy, f: &Bdd, g: &Bdd) -> Result<Bdd> {
    bdd_apply::<policy::Diff>(ep, f, g)
}

/// If-then-else as `(f AND g) OR (NOT f AND h)`.
pub fn bdd_ite(ep: &ExecPolicy, f: &Bdd, g: &Bdd, h: &Bdd) -> Result<Bdd> {
    let then_part = bdd_and(ep, f, g)?;
    let else_part = bdd_and(ep, &bdd_not(f), h)?;
    bdd_or(ep, &then_part, &else_part)
}

/// Fixes the given variables to constants.
pub fn bdd_restrict(
    ep: &ExecPolicy,
    f: &Bdd,
    assignment: impl IntoIterator<Item = (Level, bool)>,
) -> Result<Bdd> {
    let assignment: Vec<(Level, bool)> = assignment.into_iter().collect();
    if f.is_terminal() || assignment.is_empty() {
        return Ok(f.clone());
    }
    let mut policy = RestrictPolicy::new(assignment);
    select(ep, f, &mut policy)?.finish(ep)
}

/// Existential quantification of one variable.
pub fn bdd_exists(ep: &ExecPolicy, f: &Bdd, level: Level) -> Result<Bdd> {
    quantify::quantify_level::<BddKind, policy::Or>(ep, f, level)
}

/// Universal quantification of one variable.
pub fn bdd_forall(ep: &ExecPolicy, f: &Bdd, level: Level) -> Result<Bdd> {
    quantify::quantify_level::<BddKind, policy::And>(ep, f, level)
}

/// Existential quantification of every level satisfying the predicate.
pub fn bdd_exists_pred(ep: &ExecPolicy, f: &Bdd, pred: impl Fn(Level) -> bool) -> Result<Bdd> {
    quantify::quantify_pred::<BddKind, policy::Or>(ep, f.clone(), pred)
}

/// Universal quantification of every level satisfying the predicate.
pub fn bdd_forall_pred(ep: &ExecPolicy, f: &Bdd, pred: impl Fn(Level) -> bool) -> Result<Bdd> {
    quantify::quantify_pred::<BddKind, policy::And>(ep, f.clone(), pred)
}

/// Existential quantification of generated levels (descending order).
pub fn bdd_exists_gen(
    ep: &ExecPolicy,
    f: &Bdd,
    gen: impl FnMut() -> Option<Level>,
) -> Result<Bdd> {
    quantify::quantify_generator::<BddKind, policy::Or>(ep, f.clone(), gen, true)
}

/// Universal quantification of generated levels (descending order).
pub fn bdd_forall_gen(
    ep: &ExecPolicy,
    f: &Bdd,
    gen: impl FnMut() -> Option<Level>,
) -> Result<Bdd> {
    quantify::quantify_generator::<BddKind, policy::And>(ep, f.clone(), gen, true)
}

/// Canonical equality: a stream comparison.
pub fn bdd_equal(f: &Bdd, g: &Bdd) -> Result<bool> {
    f.equals(g)
}

pub fn bdd_isconst(f: &Bdd) -> bool {
    f.is_terminal()
}

pub fn bdd_istrue(f: &Bdd) -> bool {
    f.terminal_value() == Some(true)
}

pub fn bdd_isfalse(f: &Bdd) -> bool {
    f.terminal_value() == Some(false)
}

/// Whether `f` is exactly `x_i` or `!x_i` for some variable.
pub fn bdd_isvar(f: &Bdd) -> Result<bool> {
    Ok(bdd_isithvar(f)? || bdd_isnithvar(f)?)
}

pub fn bdd_isithvar(f: &Bdd) -> Result<bool> {
    single_node_shape(f, false)
}

pub fn bdd_isnithvar(f: &Bdd) -> Result<bool> {
    single_node_shape(f, true)
}

fn single_node_shape(f: &Bdd, negated: bool) -> Result<bool> {
    if f.node_count() != 1 {
        return Ok(false);
    }
    let mut nodes = f.nodes()?;
    let n = nodes.pull()?.expect("one node");
    Ok(n.low == Ptr::terminal(negated) && n.high == Ptr::terminal(!negated))
}

pub fn bdd_iscube(f: &Bdd) -> Result<bool> {
    count::is_cube(f)
}

pub fn bdd_topvar(f: &Bdd) -> Option<Level> {
    f.top_level()
}

pub fn bdd_minvar(f: &Bdd) -> Option<Level> {
    f.top_level()
}

pub fn bdd_maxvar(f: &Bdd) -> Result<Option<Level>> {
    Ok(f.level_list()?.last().copied())
}

pub fn bdd_nodecount(f: &Bdd) -> u64 {
    f.node_count()
}

pub fn bdd_varcount(f: &Bdd) -> u64 {
    f.level_count()
}

pub fn bdd_eval(f: &Bdd, assignment: impl Fn(Level) -> bool) -> Result<bool> {
    count::eval(f, assignment)
}

/// Satisfying assignments over the diagram's own variable count.
pub fn bdd_satcount(f: &Bdd) -> Result<u128> {
    count::satcount(f, f.level_count())
}

/// Satisfying assignments over `varcount` variables.
pub fn bdd_satcount_n(f: &Bdd, varcount: u64) -> Result<u128> {
    count::satcount(f, varcount)
}

pub fn bdd_pathcount(f: &Bdd) -> Result<u64> {
    count::pathcount(f)
}

/// Feeds the lexicographically smallest satisfying assignment to the
/// consumer, ascending by level.
pub fn bdd_satmin(f: &Bdd, consumer: impl FnMut(Level, bool)) -> Result<bool> {
    count::satextreme(f, false, consumer)
}

/// Feeds the lexicographically largest satisfying assignment to the
/// consumer, ascending by level.
pub fn bdd_satmax(f: &Bdd, consumer: impl FnMut(Level, bool)) -> Result<bool> {
    count::satextreme(f, true, consumer)
}

/// Feeds the support (levels in use) to the consumer, ascending.
pub fn bdd_support(f: &Bdd, consumer: impl FnMut(Level)) -> Result<()> {
    count::support(f, consumer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep() -> ExecPolicy {
        ExecPolicy::new()
    }

    #[test]
    fn ithvar_metrics() {
        let f = bdd_ithvar(0).unwrap();
        assert_eq!(bdd_topvar(&f), Some(0));
        assert_eq!(bdd_varcount(&f), 1);
        assert_eq!(bdd_nodecount(&f), 1);
        assert_eq!(bdd_pathcount(&f).unwrap(), 1);
        assert_eq!(bdd_satcount_n(&f, 3).unwrap(), 4);
        assert!(bdd_isithvar(&f).unwrap());
        assert!(!bdd_isnithvar(&f).unwrap());
        assert!(bdd_isvar(&bdd_not(&f)).unwrap());
    }

    #[test]
    fn double_negation_is_identity() {
        let f = bdd_ithvar(3).unwrap();
        assert!(bdd_equal(&f, &bdd_not(&bdd_not(&f))).unwrap());
    }

    #[test]
    fn and_with_true_is_identity() {
        let f = bdd_ithvar(1).unwrap();
        let g = bdd_and(&ep(), &f, &bdd_true().unwrap()).unwrap();
        assert!(bdd_equal(&f, &g).unwrap());
        let h = bdd_or(&ep(), &f, &bdd_false().unwrap()).unwrap();
        assert!(bdd_equal(&f, &h).unwrap());
    }

    #[test]
    fn xor_with_itself_is_false() {
        let f = bdd_ithvar(2).unwrap();
        let z = bdd_xor(&ep(), &f, &f).unwrap();
        assert!(bdd_isfalse(&z));
    }

    #[test]
    fn xor_metrics() {
        let ep = ep();
        let f = bdd_xor(&ep, &bdd_ithvar(0).unwrap(), &bdd_ithvar(1).unwrap()).unwrap();
        assert_eq!(bdd_nodecount(&f), 3);
        assert_eq!(bdd_varcount(&f), 2);
        assert_eq!(bdd_pathcount(&f).unwrap(), 2);
        assert_eq!(bdd_satcount_n(&f, 3).unwrap(), 4);

        let mut support = Vec::new();
        bdd_support(&f, |l| support.push(l)).unwrap();
        assert_eq!(support, vec![0, 1]);

        let mut min = Vec::new();
        assert!(bdd_satmin(&f, |l, v| min.push((l, v))).unwrap());
        assert_eq!(min, vec![(0, false), (1, true)]);

        let mut max = Vec::new();
        assert!(bdd_satmax(&f, |l, v| max.push((l, v))).unwrap());
        assert_eq!(max, vec![(0, true), (1, false)]);
    }

    #[test]
    fn ite_matches_composition() {
        let ep = ep();
        let f = bdd_ithvar(0).unwrap();
        let g = bdd_ithvar(1).unwrap();
        let h = bdd_ithvar(2).unwrap();
        let ite = bdd_ite(&ep, &f, &g, &h).unwrap();
        for bits in 0..8u32 {
            let a = |l: Level| bits & (1 << l) != 0;
            let expect = if a(0) { a(1) } else { a(2) };
            assert_eq!(bdd_eval(&ite, a).unwrap(), expect);
        }
    }

    #[test]
    fn restrict_fixes_variables() {
        let ep = ep();
        let f = bdd_xor(&ep, &bdd_ithvar(0).unwrap(), &bdd_ithvar(1).unwrap()).unwrap();
        let r = bdd_restrict(&ep, &f, [(0, true)]).unwrap();
        // x0 := true turns xor into !x1.
        assert!(bdd_isnithvar(&r).unwrap());
    }

    #[test]
    fn exists_is_or_of_cofactors() {
        let ep = ep();
        let f = bdd_and(&ep, &bdd_ithvar(0).unwrap(), &bdd_ithvar(1).unwrap()).unwrap();
        let q = bdd_exists(&ep, &f, 0).unwrap();
        let lo = bdd_restrict(&ep, &f, [(0, false)]).unwrap();
        let hi = bdd_restrict(&ep, &f, [(0, true)]).unwrap();
        let or = bdd_or(&ep, &lo, &hi).unwrap();
        assert!(bdd_equal(&q, &or).unwrap());
    }

    #[test]
    fn forall_is_and_of_cofactors() {
        let ep = ep();
        let f = bdd_imp(&ep, &bdd_ithvar(0).unwrap(), &bdd_ithvar(1).unwrap()).unwrap();
        let q = bdd_forall(&ep, &f, 0).unwrap();
        let lo = bdd_restrict(&ep, &f, [(0, false)]).unwrap();
        let hi = bdd_restrict(&ep, &f, [(0, true)]).unwrap();
        let and = bdd_and(&ep, &lo, &hi).unwrap();
        assert!(bdd_equal(&q, &and).unwrap());
    }
}
