//! Work items of the top-down sweeps and their secondary orders.
//!
//! A product-construction request targets a pair of pointers; the second is
//! nil for one-armed requests. Carried requests additionally hold the
//! children read on the first visit of a level. The intercut sweep uses its
//! own request carrying an explicit level (the nearer of its target and the
//! next cut).

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::node::Children;
use crate::order::{ItemCmp, Leveled};
use crate::ptr::{Level, Ptr};

/// The pair of pointers a product request recurses on.
///
/// Two-input sweeps keep the pair positional (first from `f`, second from
/// `g`); single-input sweeps store it sorted with nil padding the second
/// slot. [`Target::fst`]/[`Target::snd`] give the seek order either way,
/// since nil and terminals compare above every internal pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target(pub Ptr, pub Ptr);

impl Target {
    pub fn new(a: Ptr, b: Ptr) -> Self {
        Target(a, b)
    }

    /// One-armed target.
    pub fn single(a: Ptr) -> Self {
        Target(a, Ptr::nil())
    }

    /// The earlier of the two pointers in sweep order.
    pub fn fst(&self) -> Ptr {
        self.0.min(self.1)
    }

    /// The later of the two pointers in sweep order.
    pub fn snd(&self) -> Ptr {
        self.0.max(self.1)
    }

    /// The level this target is first touched on.
    pub fn level(&self) -> Level {
        self.fst().level()
    }

    pub fn is_terminal(&self) -> bool {
        self.0.is_terminal() && self.1.is_nil()
    }
}

/// A unit of work in the primary priority queue: recurse to `target`,
/// back-patch `source` once the output node is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub target: Target,
    pub source: Ptr,
}

impl Request {
    pub fn new(target: Target, source: Ptr) -> Self {
        Request { target, source }
    }
}

impl Leveled for Request {
    fn level(&self) -> Level {
        self.target.level()
    }
}

/// A request forwarded across a level with the first target's children in
/// tow, waiting for the second target to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarriedRequest {
    pub target: Target,
    pub carry: Children,
    pub source: Ptr,
}

impl CarriedRequest {
    pub fn new(target: Target, carry: Children, source: Ptr) -> Self {
        CarriedRequest { target, carry, source }
    }
}

impl Leveled for CarriedRequest {
    fn level(&self) -> Level {
        self.target.level()
    }
}

/// Requests ordered by `(fst, snd)`: the pull order of the primary queue,
/// which keeps the input-stream seeks monotone and identical targets
/// adjacent.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestFstOrder;

impl ItemCmp<Request> for RequestFstOrder {
    fn cmp(a: &Request, b: &Request) -> Ordering {
        (a.target.fst(), a.target.snd(), a.source).cmp(&(b.target.fst(), b.target.snd(), b.source))
    }
}

/// Requests ordered positionally by `(first, second)`: the pull order of the
/// random-access variant, which seeks only the streamed input.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestPositionalOrder;

impl ItemCmp<Request> for RequestPositionalOrder {
    fn cmp(a: &Request, b: &Request) -> Ordering {
        (a.target.0, a.target.1, a.source).cmp(&(b.target.0, b.target.1, b.source))
    }
}

/// Carried requests ordered by `(snd, fst)`: the pull order of the secondary
/// queue, whose seek is the second visit of the level.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestSndOrder;

impl ItemCmp<CarriedRequest> for RequestSndOrder {
    fn cmp(a: &CarriedRequest, b: &CarriedRequest) -> Ordering {
        (a.target.snd(), a.target.fst(), a.source).cmp(&(b.target.snd(), b.target.fst(), b.source))
    }
}

/// A unit of work in the intercut sweep: the arc `source -> target`, queued
/// at the nearer of the target's level and the next cut level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntercutRequest {
    pub source: Ptr,
    pub target: Ptr,
    pub level: Level,
}

impl IntercutRequest {
    pub fn new(source: Ptr, target: Ptr, level: Level) -> Self {
        IntercutRequest { source, target, level }
    }
}

impl Leveled for IntercutRequest {
    fn level(&self) -> Level {
        self.level
    }
}

/// Intercut requests ordered by target, with the source as a deterministic
/// tie-breaker.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntercutOrder;

impl ItemCmp<IntercutRequest> for IntercutOrder {
    fn cmp(a: &IntercutRequest, b: &IntercutRequest) -> Ordering {
        (a.target, a.source).cmp(&(b.target, b.source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fst_snd_sort_the_pair() {
        let a = Ptr::internal(1, 0, false);
        let b = Ptr::internal(2, 0, false);
        let t = Target::new(b, a);
        assert_eq!(t.fst(), a);
        assert_eq!(t.snd(), b);
        assert_eq!(t.level(), 1);
    }

    #[test]
    fn single_targets_put_nil_second() {
        let a = Ptr::internal(4, 2, false);
        let t = Target::single(a);
        assert_eq!(t.fst(), a);
        assert!(t.snd().is_nil());
    }

    #[test]
    fn terminal_target_shape() {
        assert!(Target::single(Ptr::terminal(true)).is_terminal());
        assert!(!Target::new(Ptr::internal(0, 0, false), Ptr::terminal(true)).is_terminal());
    }

    #[test]
    fn fst_order_groups_identical_targets() {
        let t = Target::new(Ptr::internal(1, 0, false), Ptr::internal(1, 1, false));
        let r1 = Request::new(t, Ptr::internal(0, 0, false));
        let r2 = Request::new(t, Ptr::internal(0, 0, true));
        let other = Request::new(Target::new(Ptr::internal(1, 1, false), Ptr::internal(1, 2, false)), Ptr::nil());
        assert_eq!(RequestFstOrder::cmp(&r1, &r2), Ordering::Less);
        assert_eq!(RequestFstOrder::cmp(&r2, &other), Ordering::Less);
    }

    #[test]
    fn snd_order_keys_on_second_visit() {
        let early = CarriedRequest::new(
            Target::new(Ptr::internal(1, 5, false), Ptr::internal(1, 0, false)),
            [Ptr::terminal(false), Ptr::terminal(true)],
            Ptr::nil(),
        );
        let late = CarriedRequest::new(
            Target::new(Ptr::internal(1, 1, false), Ptr::internal(1, 6, false)),
            [Ptr::terminal(false), Ptr::terminal(true)],
            Ptr::nil(),
        );
        // early.snd() = (1,5) < late.snd() = (1,6)
        assert_eq!(RequestSndOrder::cmp(&early, &late), Ordering::Less);
    }
}
