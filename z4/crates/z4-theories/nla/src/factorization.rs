//! Binary factorizations of rooted monomials.
//!
//! A rooted monomial over roots `v1..vn` splits into two parts in
//! `2^(n-1) - 1` ways. A split is usable when each part is a single column
//! or the rooted form of some registered monomial. For binary monomials
//! the monomial itself is offered first, with its raw factors, so
//! strategies can reason without going through the equivalence classes.

use crate::monomial::MonomialTable;
use crate::rooted::RootedTable;
use rustc_hash::FxHashSet;
use std::fmt;
use std::ops::Index;
use z4_core::LpVar;

/// A factor: a column or a rooted monomial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Factor {
    /// A column.
    Var(LpVar),
    /// A rooted monomial by index.
    Rooted(usize),
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Factor::Var(v) => write!(f, "{v}"),
            Factor::Rooted(i) => write!(f, "rm#{i}"),
        }
    }
}

/// Factors whose product equals a rooted monomial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Factorization {
    factors: Vec<Factor>,
    monomial: Option<usize>,
}

impl Factorization {
    /// The monomial `mon` itself, its raw factors as columns.
    #[must_use]
    pub fn of_monomial(mon: usize, vars: &[LpVar]) -> Self {
        Self {
            factors: vars.iter().map(|v| Factor::Var(*v)).collect(),
            monomial: Some(mon),
        }
    }

    /// A split into two factors.
    #[must_use]
    pub fn binary(a: Factor, b: Factor) -> Self {
        Self {
            factors: vec![a, b],
            monomial: None,
        }
    }

    /// The monomial index when this is the monomial itself.
    #[must_use]
    pub fn monomial(&self) -> Option<usize> {
        self.monomial
    }

    /// True when this is the monomial itself.
    #[must_use]
    pub fn is_monomial(&self) -> bool {
        self.monomial.is_some()
    }

    /// The factors.
    #[must_use]
    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    /// Number of factors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factors.len()
    }

    /// Factorizations always have factors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

impl Index<usize> for Factorization {
    type Output = Factor;

    fn index(&self, k: usize) -> &Factor {
        &self.factors[k]
    }
}

/// Lazily enumerates the factorizations of one rooted monomial.
pub struct Factorizations<'a> {
    rooted: &'a RootedTable,
    vars: &'a [LpVar],
    full: Option<Factorization>,
    mask: u64,
    limit: u64,
    seen: FxHashSet<Vec<LpVar>>,
}

/// Widest monomial whose binary splits are enumerated.
const MAX_SPLIT_ARITY: usize = 20;

impl<'a> Factorizations<'a> {
    /// Factorizations of rooted monomial `rm`.
    pub fn new(rooted: &'a RootedTable, monomials: &MonomialTable, rm: usize) -> Self {
        let r = rooted.get(rm);
        let vars = r.vars();
        let orig = monomials.get(r.orig_index());
        let literal = !r.orig().negated && {
            let mut raw = orig.vars().to_vec();
            raw.sort_unstable();
            raw == vars
        };
        let full = (vars.len() <= 2 && literal)
            .then(|| Factorization::of_monomial(r.orig_index(), orig.vars()));
        let limit = if (2..=MAX_SPLIT_ARITY).contains(&vars.len()) {
            1u64 << (vars.len() - 1)
        } else {
            1
        };
        Self {
            rooted,
            vars,
            full,
            mask: 0,
            limit,
            seen: FxHashSet::default(),
        }
    }

    fn factor_of(&self, vars: &[LpVar]) -> Option<Factor> {
        match vars.len() {
            0 => None,
            1 => Some(Factor::Var(vars[0])),
            _ => self.rooted.find(vars).map(Factor::Rooted),
        }
    }
}

impl Iterator for Factorizations<'_> {
    type Item = Factorization;

    fn next(&mut self) -> Option<Factorization> {
        if let Some(f) = self.full.take() {
            return Some(f);
        }
        let n = self.vars.len();
        while self.mask + 1 < self.limit {
            self.mask += 1;
            let mut left = Vec::new();
            let mut right = Vec::new();
            for (k, v) in self.vars.iter().enumerate() {
                if k + 1 < n && self.mask & (1 << k) != 0 {
                    left.push(*v);
                } else {
                    right.push(*v);
                }
            }
            let key = if left <= right { left.clone() } else { right.clone() };
            if !self.seen.insert(key) {
                continue;
            }
            let (Some(a), Some(b)) = (self.factor_of(&left), self.factor_of(&right)) else {
                continue;
            };
            return Some(Factorization::binary(a, b));
        }
        None
    }
}
