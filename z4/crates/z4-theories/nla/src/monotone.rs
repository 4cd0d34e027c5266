//! Level 2: monotonicity of the absolute value of a product.
//!
//! Growing every factor in absolute value grows the product:
//!
//! ```text
//! /\_i |x_i| >= |v_i|  =>  |m| >= |prod_i v_i|
//! /\_i |x_i| <= |v_i|  =>  |m| <= |prod_i v_i|
//! ```
//!
//! The pairwise variant compares rooted monomials of the same arity. Their
//! roots are sorted by absolute value; when each root of `a` is at most the
//! matching root of `b`, then `|a| <= |b|`, strictly so if one pair is strict
//! and `a` has no zero root.

use crate::lemma::{LemmaBuilder, LemmaKind};
use crate::solver::{rat_sign, sign_or_one, Search};
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use std::collections::BTreeMap;
use z4_core::{Comparator, LinearSolver, LpVar};

impl<'a, S: LinearSolver + ?Sized> Search<'a, S> {
    /// Run monotonicity lemmas.
    pub(crate) fn monotonicity_lemma(&mut self) {
        let rooted = self.rooted;
        let to_refine = rooted.to_refine();
        if to_refine.is_empty() {
            return;
        }
        let start = self.random_start(to_refine.len());
        for k in 0..to_refine.len() {
            if self.done() {
                return;
            }
            let rm = to_refine[(start + k) % to_refine.len()];
            self.abs_product_lemma(rooted.get(rm).orig_index(), LemmaKind::Monotonicity);
        }
        if !self.done() {
            self.monotonicity_lemma_on_rms_by_arity();
        }
    }

    /// Bound `|m|` by `|prod|` for monomial `mon`, from the factor magnitudes.
    /// Returns true when a lemma was kept.
    pub(crate) fn abs_product_lemma(&mut self, mon: usize, kind: LemmaKind) -> bool {
        let monomials = self.monomials;
        let m = monomials.get(mon);
        if m.vars().iter().any(|v| self.val(*v).is_zero()) {
            return false;
        }
        let prod_val = m.product_value(self.lar).abs();
        let m_val = self.val(m.var()).abs();
        let mut b = self.builder(kind);
        if m_val < prod_val {
            for v in m.vars() {
                add_abs_bound(&mut b, self.lar, *v, Comparator::Lt, &self.val(*v).abs());
            }
            if m_val.is_zero() {
                // |m| >= p with m = 0 in the model: m >= p or -m >= p.
                b.mk_ineq_var(BigRational::one(), m.var(), Comparator::Ge, prod_val.clone());
                b.mk_ineq_var(-BigRational::one(), m.var(), Comparator::Ge, prod_val);
            } else {
                add_abs_bound(&mut b, self.lar, m.var(), Comparator::Ge, &prod_val);
            }
        } else if m_val > prod_val {
            for v in m.vars() {
                add_abs_bound(&mut b, self.lar, *v, Comparator::Gt, &self.val(*v).abs());
            }
            add_abs_bound(&mut b, self.lar, m.var(), Comparator::Le, &prod_val);
        } else {
            return false;
        }
        self.push_lemma(b)
    }

    fn monotonicity_lemma_on_rms_by_arity(&mut self) {
        let mut by_arity: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, rm) in self.rooted.rms().iter().enumerate() {
            by_arity.entry(rm.len()).or_default().push(i);
        }
        for rms in by_arity.values() {
            if self.monotonicity_lemma_on_rms_of_same_arity(rms) {
                return;
            }
        }
    }

    fn monotonicity_lemma_on_rms_of_same_arity(&mut self, rms: &[usize]) -> bool {
        let mut lex_sorted: Vec<(Vec<BigRational>, usize)> =
            rms.iter().map(|&i| (self.sorted_key(i), i)).collect();
        lex_sorted.sort();
        for i in 0..lex_sorted.len() {
            let rm = lex_sorted[i].1;
            let orig = self.monomials.get(self.rooted.get(rm).orig_index());
            if orig.holds(self.lar) {
                continue;
            }
            if self.monotonicity_upper(&lex_sorted, i) || self.monotonicity_lower(&lex_sorted, i) {
                return true;
            }
        }
        false
    }

    /// Compare `lex_sorted[i]` with the keys after it.
    fn monotonicity_upper(&mut self, lex_sorted: &[(Vec<BigRational>, usize)], i: usize) -> bool {
        let (key, rm) = (&lex_sorted[i].0, lex_sorted[i].1);
        let v = self.rm_value(rm).abs();
        for (kkey, rmk) in &lex_sorted[i + 1..] {
            let vk = self.rm_value(*rmk).abs();
            if vk > v {
                continue;
            }
            let Some(strict) = uniform_le(key, kkey) else {
                continue;
            };
            if let Some(s) = strict.filter(|_| !has_zero(key)) {
                self.generate_monl_strict(rm, *rmk, s);
                return true;
            }
            if vk < v {
                self.generate_monl(rm, *rmk);
                return true;
            }
        }
        false
    }

    /// Compare `lex_sorted[i]` with the keys before it.
    fn monotonicity_lower(&mut self, lex_sorted: &[(Vec<BigRational>, usize)], i: usize) -> bool {
        let (key, rm) = (&lex_sorted[i].0, lex_sorted[i].1);
        let v = self.rm_value(rm).abs();
        for (kkey, rmk) in lex_sorted[..i].iter().rev() {
            let vk = self.rm_value(*rmk).abs();
            if vk < v {
                continue;
            }
            let Some(strict) = uniform_le(kkey, key) else {
                continue;
            };
            if let Some(s) = strict.filter(|_| !has_zero(kkey)) {
                self.generate_monl_strict(*rmk, rm, s);
                return true;
            }
            if vk > v {
                self.generate_monl(*rmk, rm);
                return true;
            }
        }
        false
    }

    /// Absolute values of the roots of `rm`, ascending.
    fn sorted_key(&self, rm: usize) -> Vec<BigRational> {
        let mut key: Vec<BigRational> =
            self.rooted.get(rm).vars().iter().map(|v| self.val(*v).abs()).collect();
        key.sort();
        key
    }

    /// Roots of `rm` paired with their absolute values, ascending.
    fn sorted_key_with_vars(&self, rm: usize) -> Vec<(BigRational, LpVar)> {
        let mut key: Vec<(BigRational, LpVar)> = self
            .rooted
            .get(rm)
            .vars()
            .iter()
            .map(|v| (self.val(*v).abs(), *v))
            .collect();
        key.sort();
        key
    }

    /// `|a| <= |b|` from the root-wise comparison.
    fn generate_monl(&mut self, a: usize, b: usize) {
        let akey = self.sorted_key_with_vars(a);
        let bkey = self.sorted_key_with_vars(b);
        debug_assert_eq!(akey.len(), bkey.len());
        let mut lemma = self.builder(LemmaKind::Monotonicity);
        for ((_, x), (_, y)) in akey.iter().zip(&bkey) {
            self.negate_abs_a_le_abs_b(&mut lemma, *x, *y, false);
        }
        self.assert_abs_a_le_abs_b(&mut lemma, a, b, false);
        self.explain_rm(a, lemma.explanation_mut());
        self.explain_rm(b, lemma.explanation_mut());
        self.push_lemma(lemma);
    }

    /// `|a| < |b|` from the root-wise comparison, strict at `strict`.
    fn generate_monl_strict(&mut self, a: usize, b: usize, strict: usize) {
        let akey = self.sorted_key_with_vars(a);
        let bkey = self.sorted_key_with_vars(b);
        debug_assert_eq!(akey.len(), bkey.len());
        let mut lemma = self.builder(LemmaKind::Monotonicity);
        for (i, ((_, x), (_, y))) in akey.iter().zip(&bkey).enumerate() {
            if i == strict {
                self.negate_abs_a_lt_abs_b(&mut lemma, *x, *y);
            } else {
                self.negate_abs_a_le_abs_b(&mut lemma, *x, *y, true);
            }
        }
        self.assert_abs_a_le_abs_b(&mut lemma, a, b, true);
        self.explain_rm(a, lemma.explanation_mut());
        self.explain_rm(b, lemma.explanation_mut());
        self.push_lemma(lemma);
    }

    /// Negate `0 < |x| <= |y|` (strict) or `|x| <= |y|`.
    fn negate_abs_a_le_abs_b(&self, lemma: &mut LemmaBuilder<'a, S>, x: LpVar, y: LpVar, strict: bool) {
        let xs = sign_or_one(self.val(x));
        let ys = sign_or_one(self.val(y));
        let cmp = if strict { Comparator::Le } else { Comparator::Lt };
        let zero = BigRational::zero();
        lemma.mk_ineq_var(xs.clone(), x, cmp, zero.clone());
        if x != y {
            lemma.mk_ineq_var(ys.clone(), y, cmp, zero.clone());
            lemma.mk_ineq_vars(xs, x, -ys, y, Comparator::Gt, zero);
        }
    }

    /// Negate `|x| < |y|`.
    fn negate_abs_a_lt_abs_b(&self, lemma: &mut LemmaBuilder<'a, S>, x: LpVar, y: LpVar) {
        let xs = sign_or_one(self.val(x));
        let ys = sign_or_one(self.val(y));
        let zero = BigRational::zero();
        lemma.mk_ineq_var(xs.clone(), x, Comparator::Lt, zero.clone());
        lemma.mk_ineq_var(ys.clone(), y, Comparator::Lt, zero.clone());
        lemma.mk_ineq_vars(xs, x, -ys, y, Comparator::Ge, zero);
    }

    /// Conclude `|a| <= |b|` (or `<`) over the product columns.
    fn assert_abs_a_le_abs_b(&self, lemma: &mut LemmaBuilder<'a, S>, a: usize, b: usize, strict: bool) {
        let aj = self.rm_var(a);
        let bj = self.rm_var(b);
        let a_s = sign_or_one(self.val(aj));
        let b_s = sign_or_one(self.val(bj));
        let zero = BigRational::zero();
        lemma.mk_ineq_var(a_s.clone(), aj, Comparator::Lt, zero.clone());
        lemma.mk_ineq_var(b_s.clone(), bj, Comparator::Lt, zero.clone());
        let cmp = if strict { Comparator::Lt } else { Comparator::Le };
        lemma.mk_ineq_vars(a_s, aj, -b_s, bj, cmp, zero);
    }
}

/// Add the disjunct `|v| <cmp> bound` for a column with a non-zero value.
///
/// With `s` the sign of the value, `|v| > bound` becomes `s*v < 0` or
/// `s*v > bound`, and `|v| < bound` becomes `s*v < bound`.
pub(crate) fn add_abs_bound<S: LinearSolver + ?Sized>(
    b: &mut LemmaBuilder<'_, S>,
    lar: &S,
    v: LpVar,
    cmp: Comparator,
    bound: &BigRational,
) {
    debug_assert!(!lar.value(v).is_zero());
    let s = BigRational::from_integer(rat_sign(lar.value(v)).into());
    if matches!(cmp, Comparator::Gt | Comparator::Ge) {
        b.mk_ineq_var(s.clone(), v, Comparator::Lt, BigRational::zero());
    }
    b.mk_ineq_var(s, v, cmp, bound.abs());
}

/// True when `a[i] <= b[i]` for every `i`. The inner option is the last
/// strict position, absent when a shared zero makes strictness unusable.
fn uniform_le(a: &[BigRational], b: &[BigRational]) -> Option<Option<usize>> {
    debug_assert_eq!(a.len(), b.len());
    let mut strict = None;
    let mut zero_b = false;
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        match x.cmp(y) {
            std::cmp::Ordering::Greater => return None,
            std::cmp::Ordering::Less => strict = Some(i),
            std::cmp::Ordering::Equal => zero_b |= y.is_zero(),
        }
    }
    Some(if zero_b { None } else { strict })
}

fn has_zero(key: &[BigRational]) -> bool {
    key.iter().any(Zero::is_zero)
}
