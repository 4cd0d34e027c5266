//! Level 1: order lemmas.
//!
//! Multiplication by a factor of known sign preserves or reverses order:
//!
//! - For a split `m = a * b` with `a > 0`, `b <= vb` implies `m <= vb * a`;
//!   the other sign cases follow by symmetry. A model where `m` lies on the
//!   wrong side of `vb * a` yields a three-disjunct lemma.
//! - For two rooted monomials `a*c` and `b*c` sharing the factor `c`,
//!   `c > 0` and `a < b` imply `a*c < b*c`. A model ordering the products
//!   against the order of `a` and `b` yields a lemma.
//!
//! All comparisons are on root products: for a factor `f`, the term
//! `sign(f) * column(f)` and the value `factor_value(f)`.

use crate::factorization::{Factor, Factorization, Factorizations};
use crate::lemma::LemmaKind;
use crate::solver::{rat_sign, Search};
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use std::cmp::Ordering;
use z4_core::{Comparator, LinearSolver, LinearTerm};

impl<'a, S: LinearSolver + ?Sized> Search<'a, S> {
    /// Run order lemmas on the rooted monomials to refine.
    pub(crate) fn order_lemma(&mut self) {
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
            self.order_lemma_on_rm(to_refine[(start + k) % to_refine.len()]);
        }
    }

    fn order_lemma_on_rm(&mut self, rm: usize) {
        // The literal binomial and its split into two columns coincide.
        let mut binomial_seen = false;
        for f in Factorizations::new(self.rooted, self.monomials, rm) {
            if self.done() {
                return;
            }
            if f.is_monomial() {
                binomial_seen = true;
            } else if binomial_seen && f.factors().iter().all(|x| matches!(x, Factor::Var(_))) {
                continue;
            }
            if f.len() != 2 {
                continue;
            }
            self.order_lemma_on_factorization(rm, &f);
            for k in 0..2 {
                if self.done() {
                    return;
                }
                self.order_lemma_on_ac_explore(rm, f[1 - k], f[k]);
            }
        }
    }

    /// Lemmas for `m = a * b` comparing `m` with `vb * a` and `va * b`.
    fn order_lemma_on_factorization(&mut self, rm: usize, f: &Factorization) {
        let m = self.rm_var(rm);
        // sign * m is the product of the two factor columns.
        let sign =
            self.rooted.get(rm).orig_sign() * self.factor_sign(f[0]) * self.factor_sign(f[1]);
        let mv = &sign * self.val(m);
        let fv = self.val(self.factor_var(f[0])) * self.val(self.factor_var(f[1]));
        let gt = match mv.cmp(&fv) {
            Ordering::Equal => return,
            Ordering::Greater => true,
            Ordering::Less => false,
        };
        for k in 0..2 {
            if self.done() {
                return;
            }
            let a = self.factor_var(f[k]);
            let b = self.factor_var(f[1 - k]);
            let av = self.val(a);
            if av.is_zero() {
                continue;
            }
            let vb = self.val(b).clone();
            let a_pos = av.is_positive();
            let zero = BigRational::zero();
            let one = BigRational::one();
            let mut lemma = self.builder(LemmaKind::Order);
            // a has the opposite sign, or b is on the other side of vb
            lemma.mk_ineq_var(
                one.clone(),
                a,
                if a_pos { Comparator::Le } else { Comparator::Ge },
                zero.clone(),
            );
            let b_cmp = if gt == a_pos { Comparator::Gt } else { Comparator::Lt };
            lemma.mk_ineq_var(one, b, b_cmp, vb.clone());
            // or sign*m - vb*a is on the side the product forces
            lemma.mk_ineq_vars(
                sign.clone(),
                m,
                -vb,
                a,
                if gt { Comparator::Le } else { Comparator::Ge },
                zero,
            );
            self.explain_rm(rm, lemma.explanation_mut());
            self.explain_factors(f.factors(), lemma.explanation_mut());
            self.push_lemma(lemma);
        }
    }

    /// Compare `ac = a * c` against every rooted monomial `bc` sharing `c`.
    fn order_lemma_on_ac_explore(&mut self, ac: usize, a: Factor, c: Factor) {
        let c_sign = rat_sign(&self.factor_value(c));
        if c_sign == 0 {
            return;
        }
        let rooted = self.rooted;
        let candidates = match c {
            Factor::Var(v) => rooted.containing_var(v),
            Factor::Rooted(i) => rooted.proper_multiples(i),
        };
        let c_vars = rooted.factor_vars(c);
        for &bc in candidates {
            if bc == ac {
                continue;
            }
            let Some(b) = rooted.divide(bc, &c_vars) else {
                continue;
            };
            if self.order_lemma_on_ac_and_bc(ac, a, c, c_sign, bc, b) && self.done() {
                return;
            }
        }
    }

    fn order_lemma_on_ac_and_bc(
        &mut self,
        ac: usize,
        a: Factor,
        c: Factor,
        c_sign: i32,
        bc: usize,
        b: Factor,
    ) -> bool {
        let cs = BigRational::from_integer(c_sign.into());
        let av = &cs * self.factor_value(a);
        let bv = &cs * self.factor_value(b);
        let acv = self.rm_value(ac);
        let bcv = self.rm_value(bc);
        // c_sign * a < c_sign * b forces ac < bc, and symmetrically.
        let (products, factors) = if av < bv && acv >= bcv {
            (Comparator::Lt, Comparator::Ge)
        } else if av > bv && acv <= bcv {
            (Comparator::Gt, Comparator::Le)
        } else {
            return false;
        };
        let zero = BigRational::zero();
        let mut lemma = self.builder(LemmaKind::Order);
        lemma.mk_ineq_var(
            &cs * self.factor_sign(c),
            self.factor_var(c),
            Comparator::Le,
            zero.clone(),
        );
        lemma.mk_ineq_vars(
            self.rooted.get(ac).orig_sign(),
            self.rm_var(ac),
            -self.rooted.get(bc).orig_sign(),
            self.rm_var(bc),
            products,
            zero.clone(),
        );
        let mut t = LinearTerm::new();
        t.add_coeff_var(&cs * self.factor_sign(a), self.factor_var(a));
        t.add_coeff_var(-(&cs * self.factor_sign(b)), self.factor_var(b));
        lemma.mk_ineq(t, factors, zero);
        self.explain_rm(ac, lemma.explanation_mut());
        self.explain_rm(bc, lemma.explanation_mut());
        self.explain_factors(&[a, b, c], lemma.explanation_mut());
        self.push_lemma(lemma)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::NlaConfig;
    use crate::lemma::LemmaKind;
    use crate::solver::{NlaCheckResult, NlaSolver};
    use z4_core::{rat, FixedModel};

    fn order_config() -> NlaConfig {
        NlaConfig {
            derived_pass: false,
            monotonicity_lemmas: false,
            tangent_lemmas: false,
            debug: false,
            ..NlaConfig::default()
        }
    }

    #[test]
    fn test_order_lemma_on_binary_split() {
        // m = x*y with x = 2, y = 3 and m = 7 > 6.
        let mut lar = FixedModel::default();
        let x = lar.new_var(rat(2));
        let y = lar.new_var(rat(3));
        let m = lar.new_var(rat(7));
        let mut nla = NlaSolver::with_config(order_config());
        nla.add(m, &[x, y]).unwrap();
        let mut lemmas = Vec::new();
        assert_eq!(nla.check(&lar, &mut lemmas), NlaCheckResult::Refuted);
        let order: Vec<_> = lemmas
            .iter()
            .filter(|l| l.kind() == LemmaKind::Order)
            .collect();
        assert_eq!(order.len(), 2);
        for l in &lemmas {
            assert!(!l.holds(&lar), "lemma holds: {}", l.display(&lar));
        }
    }

    #[test]
    fn test_order_conflict_ends_the_split() {
        // With x = 2 and y = 3 fixed and m >= 7, the first split lemma
        // x <= 0 or y > 3 or m <= 3x is refuted by bounds.
        let mut lar = FixedModel::default();
        let x = lar.new_var(rat(2));
        let y = lar.new_var(rat(3));
        let m = lar.new_var(rat(7));
        lar.fix(x, rat(2));
        lar.fix(y, rat(3));
        lar.set_lower(m, rat(7), false);
        let mut nla = NlaSolver::with_config(order_config());
        nla.add(m, &[x, y]).unwrap();
        let mut lemmas = Vec::new();
        assert_eq!(nla.check(&lar, &mut lemmas), NlaCheckResult::Refuted);
        assert_eq!(lemmas.len(), 1);
        assert!(lemmas[0].is_conflict());
        assert_eq!(lemmas[0].kind(), LemmaKind::Order);
    }

    #[test]
    fn test_order_lemma_on_shared_factor() {
        // ac = a*c, bc = b*c with c = 2 and a = 2 < b = 3, but ac = 7 >= bc = 6.
        let mut lar = FixedModel::default();
        let a = lar.new_var(rat(2));
        let b = lar.new_var(rat(3));
        let c = lar.new_var(rat(2));
        let ac = lar.new_var(rat(7));
        let bc = lar.new_var(rat(6));
        let mut nla = NlaSolver::with_config(order_config());
        nla.add(ac, &[a, c]).unwrap();
        nla.add(bc, &[b, c]).unwrap();
        let mut lemmas = Vec::new();
        assert_eq!(nla.check(&lar, &mut lemmas), NlaCheckResult::Refuted);
        // c <= 0 or ac - bc < 0 or a - b >= 0
        let shared = lemmas
            .iter()
            .find(|l| {
                l.ineqs()
                    .iter()
                    .any(|i| i.term.coeff(ac) == rat(1) && i.term.coeff(bc) == rat(-1))
            })
            .expect("lemma relating ac and bc");
        assert_eq!(shared.kind(), LemmaKind::Order);
        assert_eq!(shared.ineqs().len(), 3);
        for l in &lemmas {
            assert!(!l.holds(&lar), "lemma holds: {}", l.display(&lar));
        }
    }
}
