//! Level 0: lemmas from the basic algebra of products.
//!
//! - **Sign**: the sign of a product is the product of the factor signs.
//! - **Zero**: a product is zero iff some factor is zero.
//! - **Neutral**: `|x * r| = |x|` with `x != 0` forces `|r| = 1`, and
//!   factors equal to `1` or `-1` only flip signs.
//! - **Proportion**: `|x * y| >= |x|` when `y` is a non-zero integer.
//!
//! Every strategy has a model-based variant, which reads the current values,
//! and some have a derived variant, which only fires on facts entailed by
//! bounds and equivalences.

use crate::factorization::{Factor, Factorization, Factorizations};
use crate::lemma::{LemmaBuilder, LemmaKind};
use crate::solver::{rat_sign, Search};
use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use rustc_hash::FxHashSet;
use z4_core::{Comparator, LinearSolver, LpVar};

impl<'a, S: LinearSolver + ?Sized> Search<'a, S> {
    /// Run the level 0 strategies.
    pub(crate) fn basic_lemma(&mut self, derived: bool) {
        if self.basic_sign_lemma(derived) {
            return;
        }
        let rooted = self.rooted;
        let to_refine = rooted.to_refine();
        if to_refine.is_empty() {
            return;
        }
        if derived {
            for &rm in to_refine {
                if self.basic_lemma_for_rm_derived(rm) && self.done() {
                    return;
                }
            }
            return;
        }
        let start = self.random_start(to_refine.len());
        for k in 0..to_refine.len() {
            if self.done() {
                return;
            }
            let rm = to_refine[(start + k) % to_refine.len()];
            self.basic_lemma_for_rm_model_based(rm);
        }
    }

    // ---------------------------------------------------------------------
    // Sign lemmas
    // ---------------------------------------------------------------------

    fn basic_sign_lemma(&mut self, derived: bool) -> bool {
        if derived {
            let mut explored = FxHashSet::default();
            for &mon in self.violated {
                if self.basic_sign_lemma_on_mon(mon, &mut explored) && self.done() {
                    return true;
                }
            }
            !self.lemmas.is_empty()
        } else {
            self.basic_sign_lemma_model_based()
        }
    }

    /// Monomials sharing a rooted form have equal values up to their signs.
    fn basic_sign_lemma_on_mon(&mut self, mon: usize, explored: &mut FxHashSet<usize>) -> bool {
        let Some(rm_of_mon) = self.rooted.rooted_of(mon) else {
            return false;
        };
        if !explored.insert(rm_of_mon.index) {
            return false;
        }
        let rooted = self.rooted;
        let mut found = false;
        for other in rooted.get(rm_of_mon.index).mons() {
            if other.index == mon {
                continue;
            }
            let sign = rm_of_mon.rsign() * other.rsign();
            let m = self.monomials.get(mon).var();
            let n = self.monomials.get(other.index).var();
            if *self.val(m) == &sign * self.val(n) {
                continue;
            }
            let mut b = self.builder(LemmaKind::Sign);
            self.explain_monomial(mon, b.explanation_mut());
            self.explain_monomial(other.index, b.explanation_mut());
            b.mk_ineq_vars(BigRational::one(), m, -sign, n, Comparator::Eq, BigRational::zero());
            found |= self.push_lemma(b);
            if self.done() {
                break;
            }
        }
        found
    }

    fn basic_sign_lemma_model_based(&mut self) -> bool {
        let violated = self.violated;
        let monomials = self.monomials;
        if violated.is_empty() {
            return false;
        }
        let start = self.random_start(violated.len());
        for k in 0..violated.len() {
            let mon = violated[(start + k) % violated.len()];
            let m = monomials.get(mon);
            let product_sign = m.vars().iter().map(|v| rat_sign(self.val(*v))).product::<i32>();
            if rat_sign(self.val(m.var())) == product_sign {
                continue;
            }
            if product_sign == 0 {
                self.generate_zero_lemmas(mon);
            } else {
                let mut b = self.builder(LemmaKind::Sign);
                for v in m.vars() {
                    negate_strict_sign(&mut b, self.lar, *v);
                }
                let cmp = if product_sign > 0 {
                    Comparator::Gt
                } else {
                    Comparator::Lt
                };
                b.mk_ineq_var(BigRational::one(), m.var(), cmp, BigRational::zero());
                self.push_lemma(b);
            }
            if self.done() {
                break;
            }
        }
        !self.lemmas.is_empty()
    }

    // ---------------------------------------------------------------------
    // Zero lemmas on a monomial with a zero factor and a non-zero value
    // ---------------------------------------------------------------------

    fn generate_zero_lemmas(&mut self, mon: usize) {
        let monomials = self.monomials;
        let m = monomials.get(mon);
        debug_assert!(!self.val(m.var()).is_zero());
        let mut fixed_zeros: Vec<LpVar> = Vec::new();
        let Some(zero_j) = self.find_best_zero(m.vars(), &mut fixed_zeros) else {
            return;
        };
        let mut sign = rat_sign(self.val(m.var()));
        let mut zero_power = 0usize;
        for v in m.vars() {
            if *v == zero_j {
                zero_power += 1;
                continue;
            }
            sign = non_strict_sign(self.lar, *v, sign);
            if sign == 0 {
                break;
            }
        }
        if zero_power.is_even() {
            sign = 0;
        }
        let mut b = self.builder(LemmaKind::Zero);
        if sign == 0 {
            // zero_j != 0 or m = 0
            b.mk_ineq_var(BigRational::one(), zero_j, Comparator::Ne, BigRational::zero());
            b.mk_ineq_var(BigRational::one(), m.var(), Comparator::Eq, BigRational::zero());
        } else {
            let cmp = if sign > 0 {
                Comparator::Gt
            } else {
                Comparator::Lt
            };
            b.mk_ineq_var(BigRational::one(), zero_j, cmp, BigRational::zero());
            for v in m.vars() {
                if *v != zero_j {
                    negate_strict_sign(&mut b, self.lar, *v);
                }
            }
            negate_strict_sign(&mut b, self.lar, m.var());
        }
        self.push_lemma(b);
        for j in fixed_zeros {
            if self.done() {
                return;
            }
            let mut b = self.builder(LemmaKind::Zero);
            b.explain_fixed_var(j);
            b.mk_ineq_var(BigRational::one(), m.var(), Comparator::Eq, BigRational::zero());
            self.push_lemma(b);
        }
    }

    /// A zero-valued factor, preferring one whose bounds leave zero inside.
    /// Factors fixed to zero are collected into `fixed_zeros`.
    fn find_best_zero(&self, vars: &[LpVar], fixed_zeros: &mut Vec<LpVar>) -> Option<LpVar> {
        let mut first = None;
        let mut inner = None;
        for v in vars {
            if !self.val(*v).is_zero() {
                continue;
            }
            if self.lar.var_is_fixed_to_zero(*v) && !fixed_zeros.contains(v) {
                fixed_zeros.push(*v);
            }
            first.get_or_insert(*v);
            if inner.is_none() && self.lar.zero_is_an_inner_point_of_bounds(*v) {
                inner = Some(*v);
            }
        }
        inner.or(first)
    }

    // ---------------------------------------------------------------------
    // Per rooted monomial, model based
    // ---------------------------------------------------------------------

    fn basic_lemma_for_rm_model_based(&mut self, rm: usize) {
        let zero = self.rm_value(rm).is_zero();
        for f in Factorizations::new(self.rooted, self.monomials, rm) {
            if self.done() {
                return;
            }
            if zero {
                self.zero_lemma_model_based(rm, &f);
                self.neutral_monomial_to_factor(rm, &f);
                self.neutral_factors_to_monomial(rm, &f);
            } else {
                self.non_zero_lemma_model_based(rm, &f);
                self.neutral_monomial_to_factor(rm, &f);
                self.neutral_factors_to_monomial(rm, &f);
                self.proportion_lemma(rm, &f);
            }
        }
    }

    /// `m = 0` while no factor is zero: `m != 0` or some factor is zero.
    fn zero_lemma_model_based(&mut self, rm: usize, f: &Factorization) {
        if f.factors().iter().any(|x| self.val(self.factor_var(*x)).is_zero()) {
            return;
        }
        let mut b = self.builder(LemmaKind::Zero);
        b.mk_ineq_var(BigRational::one(), self.rm_var(rm), Comparator::Ne, BigRational::zero());
        for x in f.factors() {
            let j = self.factor_var(*x);
            if self.lar.var_is_separated_from_zero(j) {
                b.explain_separation_from_zero(j);
            } else {
                b.mk_ineq_var(BigRational::one(), j, Comparator::Eq, BigRational::zero());
            }
        }
        self.explain_rm(rm, b.explanation_mut());
        self.explain_factors(f.factors(), b.explanation_mut());
        self.push_lemma(b);
    }

    /// `m != 0` while a factor is zero: the factor is non-zero or `m = 0`.
    fn non_zero_lemma_model_based(&mut self, rm: usize, f: &Factorization) {
        let Some(zero) = f
            .factors()
            .iter()
            .map(|x| self.factor_var(*x))
            .find(|j| self.val(*j).is_zero())
        else {
            return;
        };
        let mut b = self.builder(LemmaKind::Zero);
        b.mk_ineq_var(BigRational::one(), zero, Comparator::Ne, BigRational::zero());
        b.mk_ineq_var(BigRational::one(), self.rm_var(rm), Comparator::Eq, BigRational::zero());
        self.explain_rm(rm, b.explanation_mut());
        self.explain_factors(f.factors(), b.explanation_mut());
        self.push_lemma(b);
    }

    /// `|m| = |x|` with `m != 0` forces the other factor to be `1` or `-1`.
    fn neutral_monomial_to_factor(&mut self, rm: usize, f: &Factorization) {
        let m = self.rm_var(rm);
        let mv = self.val(m);
        if mv.is_zero() {
            return;
        }
        let Some(jl) = f
            .factors()
            .iter()
            .map(|x| self.factor_var(*x))
            .find(|j| self.val(*j).abs() == mv.abs())
        else {
            return;
        };
        let Some(not_one) = f
            .factors()
            .iter()
            .map(|x| self.factor_var(*x))
            .find(|j| *j != jl && !self.val(*j).abs().is_one())
        else {
            return;
        };
        let one = BigRational::one();
        let mut b = self.builder(LemmaKind::Neutral);
        b.mk_ineq_var(one.clone(), m, Comparator::Eq, BigRational::zero());
        if *self.val(jl) == -mv {
            b.mk_ineq_vars(one.clone(), jl, one.clone(), m, Comparator::Ne, BigRational::zero());
        } else {
            b.mk_ineq_vars(one.clone(), jl, -one.clone(), m, Comparator::Ne, BigRational::zero());
        }
        b.mk_ineq_var(one.clone(), not_one, Comparator::Eq, one.clone());
        b.mk_ineq_var(one.clone(), not_one, Comparator::Eq, -one);
        self.explain_rm(rm, b.explanation_mut());
        self.explain_factors(f.factors(), b.explanation_mut());
        self.push_lemma(b);
    }

    /// Factors equal to `1` or `-1` do not change the magnitude:
    /// `1 * ... * x * ... * -1 = -x`.
    fn neutral_factors_to_monomial(&mut self, rm: usize, f: &Factorization) {
        let mut sign = self.rooted.get(rm).orig_sign();
        let mut not_one: Option<Factor> = None;
        for x in f.factors() {
            let v = self.factor_value(*x);
            if v.is_one() {
                continue;
            }
            if (-&v).is_one() {
                sign = -sign;
                continue;
            }
            if not_one.is_some() {
                return;
            }
            not_one = Some(*x);
        }
        let m = self.rm_var(rm);
        let one = BigRational::one();
        match not_one {
            Some(no) => {
                sign *= self.factor_sign(no);
                if *self.val(m) == &sign * self.val(self.factor_var(no)) {
                    return;
                }
            }
            None => {
                if *self.val(m) == sign {
                    return;
                }
            }
        }
        let not_one_var = not_one.map(|no| self.factor_var(no));
        let mut b = self.builder(LemmaKind::Neutral);
        for x in f.factors() {
            let j = self.factor_var(*x);
            if Some(j) == not_one_var {
                continue;
            }
            b.mk_ineq_var(one.clone(), j, Comparator::Ne, self.val(j).clone());
        }
        match not_one_var {
            Some(no) => b.mk_ineq_vars(one, m, -sign, no, Comparator::Eq, BigRational::zero()),
            None => b.mk_ineq_var(one, m, Comparator::Eq, sign),
        }
        self.explain_rm(rm, b.explanation_mut());
        self.explain_factors(f.factors(), b.explanation_mut());
        self.push_lemma(b);
    }

    /// `|m| >= |x|` when the other factor is a non-zero integer.
    fn proportion_lemma(&mut self, rm: usize, f: &Factorization) {
        if f.len() != 2 {
            return;
        }
        let rmv = self.rm_value(rm).abs();
        if rmv.is_zero() || f.factors().iter().any(|x| self.factor_value(*x).is_zero()) {
            return;
        }
        for k in 0..2 {
            if self.factor_value(f[k]).abs() > rmv {
                self.generate_pl(rm, f, k);
                return;
            }
        }
    }

    fn generate_pl(&mut self, rm: usize, f: &Factorization, k: usize) {
        let other = self.factor_var(f[1 - k]);
        if !self.lar.var_is_int(other) {
            return;
        }
        let m = self.rm_var(rm);
        let j = self.factor_var(f[k]);
        let sm = BigRational::from_integer(BigInt::from(rat_sign(self.val(m))));
        let sj = BigRational::from_integer(BigInt::from(rat_sign(self.val(j))));
        let zero = BigRational::zero();
        let mut b = self.builder(LemmaKind::Proportion);
        b.mk_ineq_var(sm.clone(), m, Comparator::Le, zero.clone());
        b.mk_ineq_var(sj.clone(), j, Comparator::Le, zero.clone());
        b.mk_ineq_var(BigRational::one(), other, Comparator::Eq, zero.clone());
        b.mk_ineq_vars(sm, m, -sj, j, Comparator::Ge, zero);
        self.explain_rm(rm, b.explanation_mut());
        self.explain_factors(f.factors(), b.explanation_mut());
        self.push_lemma(b);
    }

    // ---------------------------------------------------------------------
    // Per rooted monomial, derived from bounds and equivalences
    // ---------------------------------------------------------------------

    fn basic_lemma_for_rm_derived(&mut self, rm: usize) -> bool {
        let m = self.rm_var(rm);
        let fixed_to_zero = self.lar.var_is_fixed_to_zero(m);
        for f in Factorizations::new(self.rooted, self.monomials, rm) {
            let found = if fixed_to_zero {
                self.zero_lemma_derived(rm, &f) || self.neutral_lemma_derived(rm, &f)
            } else {
                self.non_zero_lemma_derived(rm, &f) || self.neutral_lemma_derived(rm, &f)
            };
            if found {
                return true;
            }
        }
        false
    }

    /// `m` fixed to zero: some factor is zero.
    fn zero_lemma_derived(&mut self, rm: usize, f: &Factorization) -> bool {
        if f.factors().iter().any(|x| self.val(self.factor_var(*x)).is_zero()) {
            return false;
        }
        let mut b = self.builder(LemmaKind::Zero);
        b.explain_fixed_var(self.rm_var(rm));
        for x in f.factors() {
            b.mk_ineq_var(
                BigRational::one(),
                self.factor_var(*x),
                Comparator::Eq,
                BigRational::zero(),
            );
        }
        self.explain_rm(rm, b.explanation_mut());
        self.explain_factors(f.factors(), b.explanation_mut());
        self.push_lemma(b)
    }

    /// `m` separated from zero while a factor is fixed to zero: conflict.
    fn non_zero_lemma_derived(&mut self, rm: usize, f: &Factorization) -> bool {
        let m = self.rm_var(rm);
        if !self.lar.var_is_separated_from_zero(m) {
            return false;
        }
        let Some(zero) = f
            .factors()
            .iter()
            .map(|x| self.factor_var(*x))
            .find(|j| self.lar.var_is_fixed_to_zero(*j))
        else {
            return false;
        };
        let mut b = self.builder(LemmaKind::Zero);
        b.explain_fixed_var(zero);
        b.explain_separation_from_zero(m);
        self.explain_rm(rm, b.explanation_mut());
        self.explain_factors(f.factors(), b.explanation_mut());
        self.push_lemma(b)
    }

    /// A factor equivalent to `m`, with one of them separated from zero,
    /// forces the other factor to be `1` or `-1`.
    fn neutral_lemma_derived(&mut self, rm: usize, f: &Factorization) -> bool {
        let m = self.rm_var(rm);
        let mv = self.val(m).abs();
        if mv.is_zero() {
            return false;
        }
        let m_separated = self.lar.var_is_separated_from_zero(m);
        let Some(jl) = f.factors().iter().map(|x| self.factor_var(*x)).find(|j| {
            self.val(*j).abs() == mv
                && self.evars.vars_are_equiv(*j, m)
                && (m_separated || self.lar.var_is_separated_from_zero(*j))
        }) else {
            return false;
        };
        let Some(not_one) = f
            .factors()
            .iter()
            .map(|x| self.factor_var(*x))
            .find(|j| *j != jl && !self.val(*j).abs().is_one())
        else {
            return false;
        };
        let one = BigRational::one();
        let mut b = self.builder(LemmaKind::Neutral);
        b.explain_separation_from_zero(if m_separated { m } else { jl });
        self.evars.explain_var(m, b.explanation_mut());
        self.evars.explain_var(jl, b.explanation_mut());
        b.mk_ineq_var(one.clone(), not_one, Comparator::Eq, one.clone());
        b.mk_ineq_var(one.clone(), not_one, Comparator::Eq, -one);
        self.explain_rm(rm, b.explanation_mut());
        self.explain_factors(f.factors(), b.explanation_mut());
        self.push_lemma(b)
    }
}

/// Add the disjunct contradicting the strict sign of `j`.
///
/// For a non-zero value that is `j <= 0` or `j >= 0`. For a zero value the
/// non-strict bound on the sign of `j` joins the explanation and the
/// disjunct excludes zero.
pub(crate) fn negate_strict_sign<S: LinearSolver + ?Sized>(
    b: &mut LemmaBuilder<'_, S>,
    lar: &S,
    j: LpVar,
) {
    let one = BigRational::one();
    let zero = BigRational::zero();
    match rat_sign(lar.value(j)) {
        1 => b.mk_ineq_var(one, j, Comparator::Le, zero),
        -1 => b.mk_ineq_var(one, j, Comparator::Ge, zero),
        _ => {
            if lar.lower_bound(j).is_some_and(|lb| !lb.value.is_negative()) {
                b.explain_existing_lower_bound(j);
                b.mk_ineq_var(one, j, Comparator::Gt, zero);
            } else {
                debug_assert!(lar.upper_bound(j).is_some_and(|ub| !ub.value.is_positive()));
                b.explain_existing_upper_bound(j);
                b.mk_ineq_var(one, j, Comparator::Lt, zero);
            }
        }
    }
}

/// Multiply `sign` by the non-strict sign of `j`: its model sign, or for a
/// zero value the sign its bounds allow. Returns 0 when unknown.
fn non_strict_sign<S: LinearSolver + ?Sized>(lar: &S, j: LpVar, sign: i32) -> i32 {
    let v = lar.value(j);
    if !v.is_zero() {
        return sign * rat_sign(v);
    }
    if lar.lower_bound(j).is_some_and(|lb| !lb.value.is_negative()) {
        sign
    } else if lar.upper_bound(j).is_some_and(|ub| !ub.value.is_positive()) {
        -sign
    } else {
        0
    }
}
