//! Signed equivalence classes over columns.
//!
//! Records facts `x = y` and `x = -y` learned from linear constraints and
//! answers which columns share a class, with what relative sign, and which
//! constraints justify it.
//!
//! ## Algorithm Overview
//!
//! - Union-by-rank over `(parent, negated)` links. There is no path
//!   compression, so every union changes exactly one parent pointer and can
//!   be undone from a trail.
//! - Each merge also records a justification edge between the two columns.
//!   Explanations walk these edges breadth-first, so the returned constraint
//!   set follows a shortest path rather than the union tree.
//! - `push` remembers the trail length; `pop(n)` undoes entries back to the
//!   mark `n` scopes down.

use crate::lemma::Explanation;
use num_rational::BigRational;
use num_traits::One;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::fmt;
use z4_core::{ConstraintId, LpVar};

/// A column with a polarity: `negated` stands for `-value(var)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignedVar {
    /// The column.
    pub var: LpVar,
    /// True for `-var`.
    pub negated: bool,
}

impl SignedVar {
    /// Build a signed column.
    #[must_use]
    pub fn new(var: LpVar, negated: bool) -> Self {
        Self { var, negated }
    }

    /// `+var`
    #[must_use]
    pub fn plus(var: LpVar) -> Self {
        Self::new(var, false)
    }

    /// `-var`
    #[must_use]
    pub fn minus(var: LpVar) -> Self {
        Self::new(var, true)
    }

    /// The opposite polarity.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::new(self.var, !self.negated)
    }

    /// `1` or `-1`.
    #[must_use]
    pub fn rsign(self) -> BigRational {
        if self.negated {
            -BigRational::one()
        } else {
            BigRational::one()
        }
    }
}

impl fmt::Display for SignedVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "-{}", self.var)
        } else {
            write!(f, "{}", self.var)
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    parent: LpVar,
    /// Sign of this node relative to its parent.
    negated: bool,
    rank: u32,
}

#[derive(Debug, Clone)]
struct Edge {
    to: LpVar,
    justification: usize,
}

#[derive(Debug, Clone)]
enum TrailEntry {
    Union {
        child: LpVar,
        root: LpVar,
        rank_bumped: bool,
    },
    Edge {
        a: LpVar,
        b: LpVar,
    },
}

/// Scoped signed union-find with justification edges.
#[derive(Debug, Clone, Default)]
pub struct Evars {
    nodes: Vec<Node>,
    edges: FxHashMap<LpVar, Vec<Edge>>,
    justifications: Vec<Vec<ConstraintId>>,
    trail: Vec<TrailEntry>,
    scopes: Vec<usize>,
}

impl Evars {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure(&mut self, v: LpVar) {
        while self.nodes.len() <= v.index() {
            let parent = LpVar::from(self.nodes.len());
            self.nodes.push(Node {
                parent,
                negated: false,
                rank: 0,
            });
        }
    }

    /// Root of the class of `v` and the sign of `v` relative to it.
    #[must_use]
    pub fn find(&self, v: LpVar) -> SignedVar {
        self.find_signed(SignedVar::plus(v))
    }

    /// Root of the class of `sv`, carrying the sign of `sv` relative to it.
    #[must_use]
    pub fn find_signed(&self, sv: SignedVar) -> SignedVar {
        let mut var = sv.var;
        let mut negated = sv.negated;
        while let Some(node) = self.nodes.get(var.index()) {
            if node.parent == var {
                break;
            }
            negated ^= node.negated;
            var = node.parent;
        }
        SignedVar::new(var, negated)
    }

    /// True when `v` is the root of its class.
    #[must_use]
    pub fn is_root(&self, v: LpVar) -> bool {
        self.find(v).var == v
    }

    /// True when `a` and `b` share a class, with either relative sign.
    #[must_use]
    pub fn vars_are_equiv(&self, a: LpVar, b: LpVar) -> bool {
        self.find(a).var == self.find(b).var
    }

    /// True when `a = b` is entailed, signs included.
    #[must_use]
    pub fn signed_eq(&self, a: SignedVar, b: SignedVar) -> bool {
        self.find_signed(a) == self.find_signed(b)
    }

    /// Record `a = b` justified by `justification`.
    pub fn merge_plus(&mut self, a: LpVar, b: LpVar, justification: Vec<ConstraintId>) {
        self.merge(SignedVar::plus(a), SignedVar::plus(b), justification);
    }

    /// Record `a = -b` justified by `justification`.
    pub fn merge_minus(&mut self, a: LpVar, b: LpVar, justification: Vec<ConstraintId>) {
        self.merge(SignedVar::plus(a), SignedVar::minus(b), justification);
    }

    /// Record `a = b` for signed columns.
    ///
    /// Merging two members of the same class is ignored. A merge that would
    /// identify a column with its own negation only holds for zero and is
    /// ignored as well.
    pub fn merge(&mut self, a: SignedVar, b: SignedVar, justification: Vec<ConstraintId>) {
        self.ensure(a.var.max(b.var));
        let ra = self.find_signed(a);
        let rb = self.find_signed(b);
        if ra.var == rb.var {
            if ra.negated != rb.negated {
                log::trace!("nla evars: ignoring {a} = {b}, class would contain x = -x");
            }
            return;
        }
        let negated = ra.negated ^ rb.negated;
        let rank_a = self.nodes[ra.var.index()].rank;
        let rank_b = self.nodes[rb.var.index()].rank;
        // The lower-ranked root goes under the other; ties keep the smaller index as root.
        let (child, root) = if rank_a < rank_b || (rank_a == rank_b && rb.var < ra.var) {
            (ra.var, rb.var)
        } else {
            (rb.var, ra.var)
        };
        let rank_bumped = rank_a == rank_b;
        {
            let node = &mut self.nodes[child.index()];
            node.parent = root;
            node.negated = negated;
        }
        if rank_bumped {
            self.nodes[root.index()].rank += 1;
        }
        self.trail.push(TrailEntry::Union {
            child,
            root,
            rank_bumped,
        });

        let justification_index = self.justifications.len();
        self.justifications.push(justification);
        self.edges.entry(a.var).or_default().push(Edge {
            to: b.var,
            justification: justification_index,
        });
        self.edges.entry(b.var).or_default().push(Edge {
            to: a.var,
            justification: justification_index,
        });
        self.trail.push(TrailEntry::Edge { a: a.var, b: b.var });
    }

    /// Add to `exp` the constraints justifying that `a` and `b` share a class.
    ///
    /// Walks the justification edges breadth-first from `a.var` to `b.var`.
    pub fn explain(&self, a: SignedVar, b: SignedVar, exp: &mut Explanation) {
        debug_assert!(self.vars_are_equiv(a.var, b.var));
        if a.var == b.var {
            return;
        }
        let mut prev: FxHashMap<LpVar, (LpVar, usize)> = FxHashMap::default();
        let mut queue = VecDeque::new();
        queue.push_back(a.var);
        prev.insert(a.var, (a.var, usize::MAX));
        while let Some(v) = queue.pop_front() {
            if v == b.var {
                break;
            }
            let Some(edges) = self.edges.get(&v) else {
                continue;
            };
            for edge in edges {
                if !prev.contains_key(&edge.to) {
                    prev.insert(edge.to, (v, edge.justification));
                    queue.push_back(edge.to);
                }
            }
        }
        let mut v = b.var;
        while v != a.var {
            let Some(&(p, j)) = prev.get(&v) else {
                debug_assert!(false, "no justification path from {} to {}", a.var, b.var);
                return;
            };
            for c in &self.justifications[j] {
                exp.add(*c);
            }
            v = p;
        }
    }

    /// Add to `exp` the constraints linking `v` to the root of its class.
    pub fn explain_var(&self, v: LpVar, exp: &mut Explanation) {
        let root = self.find(v);
        self.explain(SignedVar::plus(v), root, exp);
    }

    /// Open a scope.
    pub fn push(&mut self) {
        self.scopes.push(self.trail.len());
    }

    /// Close `n` scopes, undoing every merge made inside them.
    pub fn pop(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        debug_assert!(n <= self.scopes.len(), "popping {n} of {} scopes", self.scopes.len());
        let keep = self.scopes.len().saturating_sub(n);
        let target = self.scopes.get(keep).copied().unwrap_or(0);
        self.scopes.truncate(keep);
        while self.trail.len() > target {
            match self.trail.pop() {
                Some(TrailEntry::Union {
                    child,
                    root,
                    rank_bumped,
                }) => {
                    let node = &mut self.nodes[child.index()];
                    node.parent = child;
                    node.negated = false;
                    if rank_bumped {
                        self.nodes[root.index()].rank -= 1;
                    }
                }
                Some(TrailEntry::Edge { a, b }) => {
                    for v in [a, b] {
                        if let Some(list) = self.edges.get_mut(&v) {
                            list.pop();
                            if list.is_empty() {
                                self.edges.remove(&v);
                            }
                        }
                    }
                    self.justifications.pop();
                }
                None => break,
            }
        }
    }

    /// Number of open scopes.
    #[must_use]
    pub fn num_scopes(&self) -> usize {
        self.scopes.len()
    }

    /// `find` for every column below `n`; equal snapshots mean equal partitions.
    #[must_use]
    pub fn snapshot(&self, n: usize) -> Vec<SignedVar> {
        (0..n).map(|i| self.find(LpVar::from(i))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(i: u32) -> LpVar {
        LpVar(i)
    }

    #[test]
    fn test_singletons_are_roots() {
        let e = Evars::new();
        assert_eq!(e.find(v(7)), SignedVar::plus(v(7)));
        assert!(e.is_root(v(7)));
    }

    #[test]
    fn test_signed_merge() {
        let mut e = Evars::new();
        e.merge_plus(v(0), v(1), vec![ConstraintId(10)]);
        e.merge_minus(v(1), v(2), vec![ConstraintId(11)]);
        assert!(e.vars_are_equiv(v(0), v(2)));
        assert!(e.signed_eq(SignedVar::plus(v(0)), SignedVar::minus(v(2))));
        assert!(!e.signed_eq(SignedVar::plus(v(0)), SignedVar::plus(v(2))));
        let r0 = e.find(v(0));
        let r2 = e.find(v(2));
        assert_eq!(r0.var, r2.var);
        assert_ne!(r0.negated, r2.negated);
    }

    #[test]
    fn test_explain_collects_path_constraints() {
        let mut e = Evars::new();
        e.merge_plus(v(0), v(1), vec![ConstraintId(1)]);
        e.merge_plus(v(1), v(2), vec![ConstraintId(2)]);
        e.merge_plus(v(3), v(4), vec![ConstraintId(3)]);
        let mut exp = Explanation::new();
        e.explain(SignedVar::plus(v(0)), SignedVar::plus(v(2)), &mut exp);
        let got: Vec<_> = exp.iter().collect();
        assert_eq!(got, vec![ConstraintId(1), ConstraintId(2)]);
    }

    #[test]
    fn test_explain_prefers_short_path() {
        let mut e = Evars::new();
        e.merge_plus(v(0), v(1), vec![ConstraintId(1)]);
        e.merge_plus(v(1), v(2), vec![ConstraintId(2)]);
        e.merge_plus(v(2), v(3), vec![ConstraintId(3)]);
        // Already equivalent; ignored without adding an edge.
        e.merge_plus(v(0), v(3), vec![ConstraintId(4)]);
        let mut exp = Explanation::new();
        e.explain(SignedVar::plus(v(0)), SignedVar::plus(v(3)), &mut exp);
        assert_eq!(exp.len(), 3);
    }

    #[test]
    fn test_pop_restores_partition() {
        let mut e = Evars::new();
        e.merge_plus(v(0), v(1), vec![ConstraintId(1)]);
        let before = e.snapshot(4);
        e.push();
        e.merge_minus(v(2), v(3), vec![ConstraintId(2)]);
        e.merge_plus(v(1), v(3), vec![ConstraintId(3)]);
        assert!(e.vars_are_equiv(v(0), v(2)));
        e.pop(1);
        assert_eq!(e.snapshot(4), before);
        assert!(!e.vars_are_equiv(v(0), v(2)));
        assert_eq!(e.num_scopes(), 0);
    }

    #[test]
    fn test_nested_pop() {
        let mut e = Evars::new();
        let base = e.snapshot(3);
        e.push();
        e.merge_plus(v(0), v(1), vec![]);
        e.push();
        e.merge_plus(v(1), v(2), vec![]);
        e.pop(2);
        assert_eq!(e.snapshot(3), base);
    }

    #[test]
    fn test_self_negation_is_ignored() {
        let mut e = Evars::new();
        e.merge_plus(v(0), v(1), vec![]);
        e.merge_minus(v(0), v(1), vec![]);
        assert!(e.signed_eq(SignedVar::plus(v(0)), SignedVar::plus(v(1))));
    }
}
