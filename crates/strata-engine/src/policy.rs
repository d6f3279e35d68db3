//! Operator policies.
//!
//! A binary operator is a zero-sized type with a truth table; everything a
//! sweep needs (absorbing terminals, identity terminals, which cut variant
//! bounds its queues) derives from that table and the diagram kind, so each
//! instantiation folds to constants.

use strata_core::{CutType, Node, Ptr};

use crate::diagram::DiagramKind;

/// A binary Boolean operator.
pub trait BoolOp: Copy + Default + 'static {
    fn eval(a: bool, b: bool) -> bool;
}

macro_rules! bool_op {
    ($name:ident, $a:ident, $b:ident, $expr:expr) => {
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl BoolOp for $name {
            fn eval($a: bool, $b: bool) -> bool {
                $expr
            }
        }
    };
}

bool_op!(And, a, b, a && b);
bool_op!(Or, a, b, a || b);
bool_op!(Xor, a, b, a ^ b);
bool_op!(Nand, a, b, !(a && b));
bool_op!(Nor, a, b, !(a || b));
bool_op!(Xnor, a, b, a == b);
bool_op!(Imp, a, b, !a || b);
bool_op!(InvImp, a, b, a || !b);
bool_op!(Diff, a, b, a && !b);

/// If the left operand is the terminal `v`, the constant the whole result
/// collapses to (when one exists and is representable in kind `K`).
pub fn left_collapse<K: DiagramKind, O: BoolOp>(v: bool) -> Option<bool> {
    if !K::terminal_is_constant(v) {
        return None;
    }
    let r = O::eval(v, false);
    (r == O::eval(v, true) && K::terminal_is_constant(r)).then_some(r)
}

/// Mirror of [`left_collapse`] for the right operand.
pub fn right_collapse<K: DiagramKind, O: BoolOp>(v: bool) -> Option<bool> {
    if !K::terminal_is_constant(v) {
        return None;
    }
    let r = O::eval(false, v);
    (r == O::eval(true, v) && K::terminal_is_constant(r)).then_some(r)
}

/// The cut variant bounding a two-input sweep: a terminal survives as a
/// pending request unless both sides shortcut on it.
pub fn cut_with_terminals<K: DiagramKind, O: BoolOp>() -> CutType {
    let dead = |v: bool| left_collapse::<K, O>(v).is_some() && right_collapse::<K, O>(v).is_some();
    CutType::with_terminals(!dead(false), !dead(true))
}

/// Policy of a single-input product sweep: which levels split into a binary
/// recursion, and how child pairs over one diagram resolve.
pub trait ProductPolicy<K: DiagramKind> {
    /// Whether the sweep dissolves the node at `level` into the product of
    /// its own children.
    fn split(&self, level: strata_core::Level) -> bool;

    /// Whether a terminal survives a pruning step (false for the operator's
    /// identity element).
    fn keep_terminal(p: Ptr) -> bool;

    /// Whether a terminal absorbs the whole pair.
    fn collapse_to_terminal(p: Ptr) -> bool;

    /// Scalar operator on a terminal/terminal pair.
    fn resolve_terminals(a: Ptr, b: Ptr) -> Ptr;

    /// Cheap shortcut check on a to-be-dissolved node: its own uid when no
    /// shortcut applies, otherwise the surviving pointer.
    fn resolve_root(n: &Node) -> Ptr;

    /// Which cut variant bounds the queues.
    fn cut_type() -> CutType;
}

/// The quantification policy for kind `K` under operator `O` (`Or` for
/// existential, `And` for universal sweeps; `Or` also drives ZDD project).
pub struct QuantifyPolicy<K, O> {
    split_level: Option<strata_core::Level>,
    _k: std::marker::PhantomData<K>,
    _o: std::marker::PhantomData<O>,
}

impl<K: DiagramKind, O: BoolOp> QuantifyPolicy<K, O> {
    /// A sweep splitting at exactly one level.
    pub fn at_level(level: strata_core::Level) -> Self {
        QuantifyPolicy { split_level: Some(level), _k: std::marker::PhantomData, _o: std::marker::PhantomData }
    }

    /// A sweep that never splits (the inner sweeps of nested sweeping).
    pub fn never() -> Self {
        QuantifyPolicy { split_level: None, _k: std::marker::PhantomData, _o: std::marker::PhantomData }
    }
}

impl<K: DiagramKind, O: BoolOp> ProductPolicy<K> for QuantifyPolicy<K, O> {
    fn split(&self, level: strata_core::Level) -> bool {
        self.split_level == Some(level)
    }

    fn keep_terminal(p: Ptr) -> bool {
        let v = p.value();
        // The identity element vanishes against the other operand.
        let identity = K::terminal_is_constant(v) && !O::eval(v, false) && O::eval(v, true);
        !identity
    }

    fn collapse_to_terminal(p: Ptr) -> bool {
        left_collapse::<K, O>(p.value()).is_some()
    }

    fn resolve_terminals(a: Ptr, b: Ptr) -> Ptr {
        Ptr::terminal(O::eval(a.value(), b.value()))
    }

    fn resolve_root(n: &Node) -> Ptr {
        if n.low.is_terminal() {
            if Self::collapse_to_terminal(n.low) {
                return n.low;
            }
            if !Self::keep_terminal(n.low) {
                return n.high;
            }
        }
        if n.high.is_terminal() {
            if Self::collapse_to_terminal(n.high) {
                return n.high;
            }
            if !Self::keep_terminal(n.high) {
                return n.low;
            }
        }
        n.uid.as_ptr()
    }

    fn cut_type() -> CutType {
        cut_with_terminals::<K, O>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::{BddKind, ZddKind};
    use strata_core::Uid;

    #[test]
    fn truth_tables() {
        assert!(And::eval(true, true) && !And::eval(true, false));
        assert!(Or::eval(false, true) && !Or::eval(false, false));
        assert!(Xor::eval(true, false) && !Xor::eval(true, true));
        assert!(Imp::eval(false, false) && !Imp::eval(true, false));
        assert!(Diff::eval(true, false) && !Diff::eval(true, true));
    }

    #[test]
    fn bdd_and_absorbs_false() {
        assert_eq!(left_collapse::<BddKind, And>(false), Some(false));
        assert_eq!(left_collapse::<BddKind, And>(true), None);
        assert_eq!(right_collapse::<BddKind, Or>(true), Some(true));
    }

    #[test]
    fn xor_never_collapses() {
        assert_eq!(left_collapse::<BddKind, Xor>(false), None);
        assert_eq!(left_collapse::<BddKind, Xor>(true), None);
        assert_eq!(cut_with_terminals::<BddKind, Xor>(), CutType::All);
    }

    #[test]
    fn and_bound_excludes_false_arcs() {
        assert_eq!(cut_with_terminals::<BddKind, And>(), CutType::IncludeTrue);
        assert_eq!(cut_with_terminals::<BddKind, Or>(), CutType::IncludeFalse);
    }

    #[test]
    fn zdd_true_terminal_is_not_constant() {
        // {empty-set} is not a tautology over remaining variables, so a true
        // terminal never collapses a ZDD union.
        assert_eq!(left_collapse::<ZddKind, Or>(true), None);
        assert_eq!(left_collapse::<ZddKind, And>(false), Some(false));
    }

    #[test]
    fn exists_policy_prunes_identity_keeps_absorbing() {
        type P = QuantifyPolicy<BddKind, Or>;
        assert!(!P::keep_terminal(Ptr::terminal(false)));
        assert!(P::keep_terminal(Ptr::terminal(true)));
        assert!(P::collapse_to_terminal(Ptr::terminal(true)));
        assert!(!P::collapse_to_terminal(Ptr::terminal(false)));
    }

    #[test]
    fn forall_policy_mirrors_exists() {
        type P = QuantifyPolicy<BddKind, And>;
        assert!(!P::keep_terminal(Ptr::terminal(true)));
        assert!(P::collapse_to_terminal(Ptr::terminal(false)));
    }

    #[test]
    fn zdd_project_keeps_true_prunes_false() {
        type P = QuantifyPolicy<ZddKind, Or>;
        assert!(!P::keep_terminal(Ptr::terminal(false)));
        assert!(P::keep_terminal(Ptr::terminal(true)));
        assert!(!P::collapse_to_terminal(Ptr::terminal(true)));
    }

    #[test]
    fn resolve_root_shortcuts() {
        type P = QuantifyPolicy<BddKind, Or>;
        // A node with a true child collapses under exists.
        let n = Node::new(Uid::new(0, 0), Ptr::terminal(true), Ptr::internal(1, 0, false));
        assert_eq!(P::resolve_root(&n), Ptr::terminal(true));
        // A false child vanishes in favor of the other.
        let n = Node::new(Uid::new(0, 0), Ptr::terminal(false), Ptr::internal(1, 0, false));
        assert_eq!(P::resolve_root(&n), Ptr::internal(1, 0, false));
        // No shortcut: the node itself.
        let n = Node::new(Uid::new(0, 0), Ptr::internal(1, 0, false), Ptr::internal(1, 1, false));
        assert_eq!(P::resolve_root(&n), n.uid.as_ptr());
    }
}
