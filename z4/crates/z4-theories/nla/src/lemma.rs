//! Lemmas and the builder that assembles them against the current model.
//!
//! A lemma is a disjunction of linear inequalities that holds under a set
//! of constraints (its explanation). When the builder adds a disjunct that
//! the current bounds already refute, it records the refuting bound
//! witnesses in the explanation and drops the disjunct.

use crate::evars::{Evars, SignedVar};
use num_rational::BigRational;
use num_traits::{One, Zero};
use std::collections::BTreeSet;
use std::fmt;
use z4_core::{Comparator, ConstraintId, LinearSolver, LinearTerm, LpVar};

/// A set of constraint identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Explanation {
    constraints: BTreeSet<ConstraintId>,
}

impl Explanation {
    /// Empty explanation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one constraint.
    pub fn add(&mut self, c: ConstraintId) {
        self.constraints.insert(c);
    }

    /// Add every constraint of `other`.
    pub fn extend(&mut self, other: &Explanation) {
        self.constraints.extend(other.constraints.iter().copied());
    }

    /// Remove all constraints.
    pub fn clear(&mut self) {
        self.constraints.clear();
    }

    /// True when `c` is part of the explanation.
    #[must_use]
    pub fn contains(&self, c: ConstraintId) -> bool {
        self.constraints.contains(&c)
    }

    /// Number of constraints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// True when no constraint is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Constraints in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ConstraintId> + '_ {
        self.constraints.iter().copied()
    }
}

/// A linear atom `term <cmp> rhs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ineq {
    /// Left-hand side.
    pub term: LinearTerm,
    /// Relation.
    pub cmp: Comparator,
    /// Right-hand side constant.
    pub rhs: BigRational,
}

impl Ineq {
    /// Build an atom.
    #[must_use]
    pub fn new(term: LinearTerm, cmp: Comparator, rhs: BigRational) -> Self {
        Self { term, cmp, rhs }
    }

    /// Truth value of the atom in the current model of `lar`.
    pub fn holds<S: LinearSolver + ?Sized>(&self, lar: &S) -> bool {
        self.cmp.holds(&lar.term_value(&self.term), &self.rhs)
    }

    /// Display adaptor resolving column names through `lar`.
    pub fn display<'a, S: LinearSolver + ?Sized>(&'a self, lar: &'a S) -> IneqDisplay<'a, S> {
        IneqDisplay { ineq: self, lar }
    }
}

impl fmt::Display for Ineq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.term, self.cmp, self.rhs)
    }
}

/// Formats an [`Ineq`] with column names from a linear core.
pub struct IneqDisplay<'a, S: ?Sized> {
    ineq: &'a Ineq,
    lar: &'a S,
}

impl<S: LinearSolver + ?Sized> fmt::Display for IneqDisplay<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.ineq.term.fmt_with(f, |v| self.lar.var_name(v))?;
        write!(f, " {} {}", self.ineq.cmp, self.ineq.rhs)
    }
}

/// The strategy that produced a lemma.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LemmaKind {
    /// Sign agreement between a product and its factors.
    Sign,
    /// A product is zero iff a factor is zero.
    Zero,
    /// Multiplying by `1` or `-1`.
    Neutral,
    /// `|m| >= |x|` when the other factors are non-zero integers.
    Proportion,
    /// Order between products sharing a factor.
    Order,
    /// Monotonicity of products in the absolute values of factors.
    Monotonicity,
    /// Tangent planes of a binary product.
    Tangent,
}

impl fmt::Display for LemmaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LemmaKind::Sign => "sign",
            LemmaKind::Zero => "zero",
            LemmaKind::Neutral => "neutral",
            LemmaKind::Proportion => "proportion",
            LemmaKind::Order => "order",
            LemmaKind::Monotonicity => "monotonicity",
            LemmaKind::Tangent => "tangent",
        };
        f.write_str(name)
    }
}

/// A disjunction of atoms valid under its explanation.
///
/// A lemma without atoms is a conflict: its explanation alone is
/// inconsistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lemma {
    ineqs: Vec<Ineq>,
    expl: Explanation,
    kind: LemmaKind,
}

impl Lemma {
    /// The disjuncts.
    #[must_use]
    pub fn ineqs(&self) -> &[Ineq] {
        &self.ineqs
    }

    /// The constraints under which the disjunction holds.
    #[must_use]
    pub fn explanation(&self) -> &Explanation {
        &self.expl
    }

    /// The producing strategy.
    #[must_use]
    pub fn kind(&self) -> LemmaKind {
        self.kind
    }

    /// True for a lemma without disjuncts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.ineqs.is_empty()
    }

    /// True when some disjunct holds in the current model.
    pub fn holds<S: LinearSolver + ?Sized>(&self, lar: &S) -> bool {
        self.ineqs.iter().any(|ineq| ineq.holds(lar))
    }

    /// Display adaptor resolving column names through `lar`.
    pub fn display<'a, S: LinearSolver + ?Sized>(&'a self, lar: &'a S) -> LemmaDisplay<'a, S> {
        LemmaDisplay { lemma: self, lar }
    }
}

/// Formats a [`Lemma`] with column names from a linear core.
pub struct LemmaDisplay<'a, S: ?Sized> {
    lemma: &'a Lemma,
    lar: &'a S,
}

impl<S: LinearSolver + ?Sized> fmt::Display for LemmaDisplay<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} lemma: ", self.lemma.kind)?;
        if self.lemma.ineqs.is_empty() {
            f.write_str("false")?;
        }
        for (i, ineq) in self.lemma.ineqs.iter().enumerate() {
            if i > 0 {
                f.write_str(" or ")?;
            }
            write!(f, "{}", ineq.display(self.lar))?;
        }
        f.write_str(" expl: {")?;
        for (i, c) in self.lemma.expl.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{c}")?;
        }
        f.write_str("}")
    }
}

/// Assembles one lemma against the current model.
pub struct LemmaBuilder<'a, S: LinearSolver + ?Sized> {
    lar: &'a S,
    evars: &'a Evars,
    ineqs: Vec<Ineq>,
    expl: Explanation,
    kind: LemmaKind,
    tautology: bool,
}

impl<'a, S: LinearSolver + ?Sized> LemmaBuilder<'a, S> {
    /// Start an empty lemma.
    pub fn new(lar: &'a S, evars: &'a Evars, kind: LemmaKind) -> Self {
        Self {
            lar,
            evars,
            ineqs: Vec::new(),
            expl: Explanation::new(),
            kind,
            tautology: false,
        }
    }

    /// The explanation being collected.
    pub fn explanation_mut(&mut self) -> &mut Explanation {
        &mut self.expl
    }

    /// Finish the lemma. Returns `None` if some disjunct is trivially true.
    #[must_use]
    pub fn finish(self) -> Option<Lemma> {
        if self.tautology {
            return None;
        }
        Some(Lemma {
            ineqs: self.ineqs,
            expl: self.expl,
            kind: self.kind,
        })
    }

    /// Add the disjunct `term <cmp> rhs`.
    ///
    /// If the bounds refute the disjunct, their witnesses join the
    /// explanation instead. Term variables are replaced by their columns.
    pub fn mk_ineq(&mut self, term: LinearTerm, cmp: Comparator, rhs: BigRational) {
        if self.explain_ineq(&term, cmp, &rhs) {
            return;
        }
        let term = self.lar.subs_terms_to_columns(&term);
        if term.is_empty() {
            if cmp.holds(&BigRational::zero(), &rhs) {
                self.tautology = true;
            }
            return;
        }
        let ineq = Ineq::new(term, cmp, rhs);
        if ineq.holds(self.lar) {
            debug_assert!(
                false,
                "lemma disjunct holds in the current model: {}",
                ineq.display(self.lar)
            );
            self.tautology = true;
            return;
        }
        self.ineqs.push(ineq);
    }

    /// Add `a*j <cmp> rhs`.
    pub fn mk_ineq_var(&mut self, a: BigRational, j: LpVar, cmp: Comparator, rhs: BigRational) {
        let mut t = LinearTerm::new();
        t.add_coeff_var(a, j);
        self.mk_ineq(t, cmp, rhs);
    }

    /// Add `a*j + b*k <cmp> rhs`.
    pub fn mk_ineq_vars(
        &mut self,
        a: BigRational,
        j: LpVar,
        b: BigRational,
        k: LpVar,
        cmp: Comparator,
        rhs: BigRational,
    ) {
        let mut t = LinearTerm::new();
        t.add_coeff_var(a, j);
        t.add_coeff_var(b, k);
        self.mk_ineq(t, cmp, rhs);
    }

    /// Add the lower bound witness of `j`.
    pub fn explain_existing_lower_bound(&mut self, j: LpVar) {
        if let Some(b) = self.lar.lower_bound(j) {
            self.expl.add(b.witness);
        }
    }

    /// Add the upper bound witness of `j`.
    pub fn explain_existing_upper_bound(&mut self, j: LpVar) {
        if let Some(b) = self.lar.upper_bound(j) {
            self.expl.add(b.witness);
        }
    }

    /// Add both bound witnesses of a fixed column.
    pub fn explain_fixed_var(&mut self, j: LpVar) {
        debug_assert!(self.lar.var_is_fixed(j));
        self.explain_existing_lower_bound(j);
        self.explain_existing_upper_bound(j);
    }

    /// Add the witness of the bound separating `j` from zero.
    pub fn explain_separation_from_zero(&mut self, j: LpVar) {
        debug_assert!(self.lar.var_is_separated_from_zero(j));
        if self.lar.var_has_positive_lower_bound(j) {
            self.explain_existing_lower_bound(j);
        } else {
            self.explain_existing_upper_bound(j);
        }
    }

    fn explain_coeff_lower_bound(
        &self,
        var: LpVar,
        a: &BigRational,
        e: &mut Explanation,
    ) -> Option<BigRational> {
        let b = if a > &BigRational::zero() {
            self.lar.lower_bound(var)?
        } else {
            self.lar.upper_bound(var)?
        };
        e.add(b.witness);
        Some(a * &b.value)
    }

    fn explain_coeff_upper_bound(
        &self,
        var: LpVar,
        a: &BigRational,
        e: &mut Explanation,
    ) -> Option<BigRational> {
        let b = if a < &BigRational::zero() {
            self.lar.lower_bound(var)?
        } else {
            self.lar.upper_bound(var)?
        };
        e.add(b.witness);
        Some(a * &b.value)
    }

    /// Explain `t <= rs` from the bounds of its columns.
    fn explain_upper_bound(&self, t: &LinearTerm, rs: &BigRational, e: &mut Explanation) -> bool {
        let mut bound = BigRational::zero();
        for (var, a) in t.iter() {
            match self.explain_coeff_upper_bound(var, a, e) {
                Some(b) => bound += b,
                None => {
                    e.clear();
                    return false;
                }
            }
        }
        if &bound > rs {
            e.clear();
            return false;
        }
        true
    }

    /// Explain `t >= rs` from the bounds of its columns.
    fn explain_lower_bound(&self, t: &LinearTerm, rs: &BigRational, e: &mut Explanation) -> bool {
        let mut bound = BigRational::zero();
        for (var, a) in t.iter() {
            match self.explain_coeff_lower_bound(var, a, e) {
                Some(b) => bound += b,
                None => {
                    e.clear();
                    return false;
                }
            }
        }
        if &bound < rs {
            e.clear();
            return false;
        }
        true
    }

    /// If `t` is `+-x +- y` and the classes entail `t = 0`, explain it.
    fn explain_by_equiv(&self, t: &LinearTerm, e: &mut Explanation) -> bool {
        let Some((i, j, same_sign)) = octagon_term(t) else {
            return false;
        };
        // x + y = 0 means x = -y; x - y = 0 means x = y.
        let a = SignedVar::plus(i);
        let b = SignedVar::new(j, same_sign);
        if !self.evars.signed_eq(a, b) {
            return false;
        }
        self.evars.explain(a, b, e);
        true
    }

    /// Try to refute `t <cmp> rs` from bounds and equivalences.
    ///
    /// On success the refuting constraints join the explanation. The
    /// integer-style slack of one on strict negations is conservative: it
    /// only ever refutes a disjunct that the bounds truly exclude.
    fn explain_ineq(&mut self, t: &LinearTerm, cmp: Comparator, rs: &BigRational) -> bool {
        if t.is_empty()
            && rs.is_zero()
            && matches!(cmp, Comparator::Lt | Comparator::Gt | Comparator::Ne)
        {
            return true;
        }
        let one = BigRational::one();
        let mut exp = Explanation::new();
        let refuted = match cmp.negate() {
            Comparator::Le => self.explain_upper_bound(t, rs, &mut exp),
            Comparator::Lt => self.explain_upper_bound(t, &(rs - &one), &mut exp),
            Comparator::Ge => self.explain_lower_bound(t, rs, &mut exp),
            Comparator::Gt => self.explain_lower_bound(t, &(rs + &one), &mut exp),
            Comparator::Eq => {
                (self.explain_lower_bound(t, rs, &mut exp)
                    && self.explain_upper_bound(t, rs, &mut exp))
                    || (rs.is_zero() && self.explain_by_equiv(t, &mut exp))
            }
            Comparator::Ne => {
                self.explain_lower_bound(t, &(rs + &one), &mut exp)
                    || self.explain_upper_bound(t, &(rs - &one), &mut exp)
            }
        };
        if refuted {
            self.expl.extend(&exp);
        }
        refuted
    }
}

/// Recognize `+-x +- y`. Returns the two columns and whether the
/// coefficients have the same sign.
#[must_use]
pub fn octagon_term(t: &LinearTerm) -> Option<(LpVar, LpVar, bool)> {
    if t.len() != 2 {
        return None;
    }
    let one = BigRational::one();
    let minus_one = -BigRational::one();
    let mut vars = [LpVar(0); 2];
    let mut seen_plus = false;
    let mut seen_minus = false;
    for (k, (var, c)) in t.iter().enumerate() {
        if *c == one {
            seen_plus = true;
        } else if *c == minus_one {
            seen_minus = true;
        } else {
            return None;
        }
        vars[k] = var;
    }
    Some((vars[0], vars[1], !(seen_plus && seen_minus)))
}
