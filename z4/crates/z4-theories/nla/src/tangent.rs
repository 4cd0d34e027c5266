//! Level 2: tangent planes.
//!
//! For `Z = X * Y` and any point `(a, b)`:
//!
//! ```text
//! Z - (b*X + a*Y - a*b) = (X - a) * (Y - b)
//! ```
//!
//! so on each quadrant around `(a, b)` the product lies on a fixed side of
//! the plane `T(X, Y) = b*X + a*Y - a*b`. When the model point `(xv, yv, zv)`
//! is off the surface, two points are chosen so that their planes separate
//! the model from the surface, and four lemmas are emitted: the tangent lines
//! through `(xv, yv)` and one plane lemma per point.
//!
//! ## Algorithm Overview
//!
//! 1. Find a rooted monomial to refine with a binary split `a * b` whose value
//!    disagrees with the model.
//! 2. Start from points at distance `delta = 1` along the diagonals, halving
//!    `delta` until both planes cut off the model.
//! 3. Push each point outward by doubling its offset while the cut stays
//!    valid, up to `tangent_push_steps` times.
//! 4. Without any such split, fall back to sign and magnitude lemmas on the
//!    monomial itself.

use crate::factorization::{Factor, Factorizations};
use crate::lemma::{Explanation, LemmaKind};
use crate::solver::{rat_sign, Search};
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Zero};
use z4_core::{Comparator, LinearSolver, LinearTerm, LpVar};

/// A binary product `sign * j = (sx * x) * (sy * y)`.
#[derive(Debug, Clone)]
struct Bfc {
    x: LpVar,
    sx: BigRational,
    y: LpVar,
    sy: BigRational,
    j: LpVar,
    sign: BigRational,
    /// Rooted monomial and factors whose equivalences justify the product.
    explain: Option<(usize, Factor, Factor)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Point {
    x: BigRational,
    y: BigRational,
}

/// Model values of `X`, `Y` and `Z` for one product.
struct Frame {
    xv: BigRational,
    yv: BigRational,
    zv: BigRational,
    correct: BigRational,
    below: bool,
}

impl Frame {
    /// Value of the plane at `p` on the model point.
    fn plane_value(&self, p: &Point) -> BigRational {
        &p.x * &self.yv + &p.y * &self.xv - &p.x * &p.y
    }

    /// The plane at `p` lies between the model value and the surface.
    fn plane_is_correct_cut(&self, p: &Point) -> bool {
        let t = self.plane_value(p);
        if self.below {
            t < self.correct && t >= self.zv
        } else {
            t > self.correct && t <= self.zv
        }
    }

    fn initial_points(&self) -> (Point, Point) {
        let mut delta = BigRational::one();
        loop {
            let (a, b) = if self.below {
                (
                    Point { x: &self.xv - &delta, y: &self.yv - &delta },
                    Point { x: &self.xv + &delta, y: &self.yv + &delta },
                )
            } else {
                (
                    Point { x: &self.xv - &delta, y: &self.yv + &delta },
                    Point { x: &self.xv + &delta, y: &self.yv - &delta },
                )
            };
            if self.plane_is_correct_cut(&a) && self.plane_is_correct_cut(&b) {
                return (a, b);
            }
            delta /= BigRational::from_integer(BigInt::from(2));
        }
    }

    /// Move `p` away from the model point while the cut stays valid.
    fn push_point(&self, p: &mut Point, steps: u32) {
        let mut dx = &p.x - &self.xv;
        let mut dy = &p.y - &self.yv;
        for _ in 0..steps {
            dx = &dx + &dx;
            dy = &dy + &dy;
            let q = Point { x: &self.xv + &dx, y: &self.yv + &dy };
            if !self.plane_is_correct_cut(&q) {
                break;
            }
            *p = q;
        }
    }
}

impl<'a, S: LinearSolver + ?Sized> Search<'a, S> {
    /// Run tangent lemmas on one product that disagrees with the model.
    pub(crate) fn tangent_lemma(&mut self) {
        let rooted = self.rooted;
        let to_refine = rooted.to_refine();
        if to_refine.is_empty() {
            return;
        }
        let n = to_refine.len();
        let start = self.random_start(n);
        for k in 0..n {
            if let Some(bfc) = self.find_bfc(to_refine[(start + k) % n]) {
                self.tangent_lemma_on_bfc(&bfc);
                return;
            }
        }
        for k in 0..n {
            if self.done() {
                return;
            }
            let mon = rooted.get(to_refine[(start + k) % n]).orig_index();
            if self.tangent_fallback(mon) {
                return;
            }
        }
    }

    fn find_bfc(&self, rm: usize) -> Option<Bfc> {
        let rooted = self.rooted;
        let monomials = self.monomials;
        let r = rooted.get(rm);
        let m = monomials.get(r.orig_index());
        if m.len() == 2 && !m.holds(self.lar) {
            return Some(Bfc {
                x: m.vars()[0],
                sx: BigRational::one(),
                y: m.vars()[1],
                sy: BigRational::one(),
                j: m.var(),
                sign: BigRational::one(),
                explain: None,
            });
        }
        let value = self.rm_value(rm);
        Factorizations::new(rooted, monomials, rm)
            .filter(|f| !f.is_monomial() && f.len() == 2)
            .find(|f| self.factor_value(f[0]) * self.factor_value(f[1]) != value)
            .map(|f| Bfc {
                x: self.factor_var(f[0]),
                sx: self.factor_sign(f[0]),
                y: self.factor_var(f[1]),
                sy: self.factor_sign(f[1]),
                j: self.rm_var(rm),
                sign: r.orig_sign(),
                explain: Some((rm, f[0], f[1])),
            })
    }

    fn tangent_lemma_on_bfc(&mut self, bfc: &Bfc) {
        let xv = &bfc.sx * self.val(bfc.x);
        let yv = &bfc.sy * self.val(bfc.y);
        let zv = &bfc.sign * self.val(bfc.j);
        let correct = &xv * &yv;
        if zv == correct {
            return;
        }
        let below = zv < correct;
        let frame = Frame { xv, yv, zv, correct, below };
        if self.config.debug {
            eprintln!(
                "[NLA] tangent on {} * {} = {}: model {} {} product {}",
                self.lar.var_name(bfc.x),
                self.lar.var_name(bfc.y),
                self.lar.var_name(bfc.j),
                frame.zv,
                if below { "<" } else { ">" },
                frame.correct
            );
        }
        let (mut a, mut b) = frame.initial_points();
        frame.push_point(&mut a, self.config.tangent_push_steps);
        frame.push_point(&mut b, self.config.tangent_push_steps);

        for fix_x in [true, false] {
            if self.done() {
                return;
            }
            self.tangent_line(bfc, &frame, fix_x);
        }
        for p in [&a, &b] {
            if self.done() {
                return;
            }
            self.tangent_plane(bfc, &frame, p);
        }
    }

    /// `X != xv or Z = xv * Y`, or the same with the roles swapped.
    fn tangent_line(&mut self, bfc: &Bfc, frame: &Frame, fix_x: bool) {
        let (u, su, uv, w, sw) = if fix_x {
            (bfc.x, &bfc.sx, &frame.xv, bfc.y, &bfc.sy)
        } else {
            (bfc.y, &bfc.sy, &frame.yv, bfc.x, &bfc.sx)
        };
        let mut lemma = self.builder(LemmaKind::Tangent);
        lemma.mk_ineq_var(su.clone(), u, Comparator::Ne, uv.clone());
        lemma.mk_ineq_vars(
            bfc.sign.clone(),
            bfc.j,
            -(uv * sw),
            w,
            Comparator::Eq,
            BigRational::zero(),
        );
        self.explain_bfc(bfc, lemma.explanation_mut());
        self.push_lemma(lemma);
    }

    /// `X` or `Y` leaves the model's quadrant around `p`, or `Z` is on the
    /// side of the plane at `p` that the quadrant forces.
    fn tangent_plane(&mut self, bfc: &Bfc, frame: &Frame, p: &Point) {
        let mut lemma = self.builder(LemmaKind::Tangent);
        let x_cmp = if frame.xv < p.x { Comparator::Ge } else { Comparator::Le };
        let y_cmp = if frame.yv < p.y { Comparator::Ge } else { Comparator::Le };
        lemma.mk_ineq_var(bfc.sx.clone(), bfc.x, x_cmp, p.x.clone());
        lemma.mk_ineq_var(bfc.sy.clone(), bfc.y, y_cmp, p.y.clone());
        let same_quadrant = (&frame.xv - &p.x) * (&frame.yv - &p.y);
        let cmp = if same_quadrant > BigRational::zero() {
            Comparator::Gt
        } else {
            Comparator::Lt
        };
        let mut t = LinearTerm::new();
        t.add_coeff_var(bfc.sign.clone(), bfc.j);
        t.add_coeff_var(-(&p.y * &bfc.sx), bfc.x);
        t.add_coeff_var(-(&p.x * &bfc.sy), bfc.y);
        lemma.mk_ineq(t, cmp, -(&p.x * &p.y));
        self.explain_bfc(bfc, lemma.explanation_mut());
        self.push_lemma(lemma);
    }

    fn explain_bfc(&self, bfc: &Bfc, exp: &mut Explanation) {
        if let Some((rm, a, b)) = bfc.explain {
            self.explain_rm(rm, exp);
            self.explain_factors(&[a, b], exp);
        }
    }

    /// Sign and magnitude lemmas on monomial `mon` when no binary split
    /// disagrees with the model.
    fn tangent_fallback(&mut self, mon: usize) -> bool {
        let monomials = self.monomials;
        let m = monomials.get(mon);
        let mv = self.val(m.var());
        if mv.is_zero() || m.vars().iter().any(|v| self.val(*v).is_zero()) {
            return false;
        }
        let prod_sign = rat_sign(&m.product_value(self.lar));
        if rat_sign(mv) == prod_sign {
            return self.abs_product_lemma(mon, LemmaKind::Tangent);
        }
        let mut lemma = self.builder(LemmaKind::Tangent);
        for v in m.vars() {
            let cmp = if self.val(*v) > &BigRational::zero() {
                Comparator::Le
            } else {
                Comparator::Ge
            };
            lemma.mk_ineq_var(BigRational::one(), *v, cmp, BigRational::zero());
        }
        let cmp = if prod_sign > 0 { Comparator::Gt } else { Comparator::Lt };
        lemma.mk_ineq_var(BigRational::one(), m.var(), cmp, BigRational::zero());
        self.push_lemma(lemma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NlaConfig;
    use crate::lemma::Lemma;
    use crate::solver::{NlaCheckResult, NlaSolver};
    use z4_core::{rat, FixedModel};

    fn tangent_config() -> NlaConfig {
        NlaConfig {
            derived_pass: false,
            order_lemmas: false,
            monotonicity_lemmas: false,
            debug: false,
            ..NlaConfig::default()
        }
    }

    fn tangent_lemmas(nla: &mut NlaSolver, lar: &FixedModel) -> Vec<Lemma> {
        let mut lemmas = Vec::new();
        assert_eq!(nla.check(lar, &mut lemmas), NlaCheckResult::Refuted);
        for l in &lemmas {
            assert!(!l.holds(lar), "lemma holds: {}", l.display(lar));
        }
        lemmas.retain(|l| l.kind() == LemmaKind::Tangent);
        lemmas
    }

    fn frame(xv: i64, yv: i64, zv: i64) -> Frame {
        let (xv, yv, zv) = (rat(xv), rat(yv), rat(zv));
        let correct = &xv * &yv;
        let below = zv < correct;
        Frame { xv, yv, zv, correct, below }
    }

    #[test]
    fn test_tangent_line_conflict_ends_the_lemmas() {
        let mut lar = FixedModel::default();
        let x = lar.new_var(rat(2));
        let y = lar.new_var(rat(3));
        let m = lar.new_var(rat(7));
        lar.fix(x, rat(2));
        lar.fix(y, rat(3));
        let w = lar.set_lower(m, rat(7), false);
        let mut nla = NlaSolver::with_config(tangent_config());
        nla.add(m, &[x, y]).unwrap();
        let lemmas = tangent_lemmas(&mut nla, &lar);
        // The first line, x != 2 or m = 2y, is refuted by bounds alone.
        assert_eq!(lemmas.len(), 1);
        assert!(lemmas[0].is_conflict());
        assert!(lemmas[0].explanation().contains(w));
    }

    #[test]
    fn test_initial_points_are_cuts() {
        for (x, y, z) in [(2, 3, 5), (2, 3, 7), (-2, 3, 0), (1, 1, 2), (0, 0, 1)] {
            let f = frame(x, y, z);
            let (mut a, mut b) = f.initial_points();
            assert!(f.plane_is_correct_cut(&a));
            assert!(f.plane_is_correct_cut(&b));
            f.push_point(&mut a, 10);
            f.push_point(&mut b, 10);
            assert!(f.plane_is_correct_cut(&a));
            assert!(f.plane_is_correct_cut(&b));
        }
    }

    #[test]
    fn test_small_gap_halves_delta() {
        // zv is 1/4 below the surface, so delta = 1 cuts too deep.
        let mut f = frame(2, 3, 6);
        f.zv = BigRational::new(23.into(), 4.into());
        f.below = true;
        let (a, _) = f.initial_points();
        assert!(&f.xv - &a.x < BigRational::one());
    }

    #[test]
    fn test_tangent_lemmas_below_surface() {
        let mut lar = FixedModel::default();
        let x = lar.new_var(rat(2));
        let y = lar.new_var(rat(3));
        let m = lar.new_var(rat(5));
        let mut nla = NlaSolver::with_config(tangent_config());
        nla.add(m, &[x, y]).unwrap();
        let lemmas = tangent_lemmas(&mut nla, &lar);
        assert_eq!(lemmas.len(), 4);

        // Every lemma holds wherever m = x * y.
        for xv in -4..=4 {
            for yv in -4..=4 {
                lar.set_value(x, rat(xv));
                lar.set_value(y, rat(yv));
                lar.set_value(m, rat(xv * yv));
                for l in &lemmas {
                    assert!(l.holds(&lar), "{} fails at x={xv} y={yv}", l.display(&lar));
                }
            }
        }
    }

    #[test]
    fn test_tangent_lemmas_above_surface() {
        let mut lar = FixedModel::default();
        // |m| stays above both factors, so no proportion lemma fires first.
        let x = lar.new_var(rat(-2));
        let y = lar.new_var(rat(3));
        let m = lar.new_var(rat(-4));
        let mut nla = NlaSolver::with_config(tangent_config());
        nla.add(m, &[x, y]).unwrap();
        let lemmas = tangent_lemmas(&mut nla, &lar);
        assert_eq!(lemmas.len(), 4);
        for xv in -3..=3 {
            for yv in -3..=3 {
                lar.set_value(x, rat(xv));
                lar.set_value(y, rat(yv));
                lar.set_value(m, rat(xv * yv));
                assert!(lemmas.iter().all(|l| l.holds(&lar)));
            }
        }
    }

    #[test]
    fn test_tangent_on_split_of_ternary_product() {
        // xyz = (x*y) * z is off by one, x*y itself is right.
        let mut lar = FixedModel::default();
        let x = lar.new_var(rat(2));
        let y = lar.new_var(rat(3));
        let z = lar.new_var(rat(2));
        let xy = lar.new_var(rat(6));
        let xyz = lar.new_var(rat(13));
        let mut nla = NlaSolver::with_config(tangent_config());
        nla.add(xy, &[x, y]).unwrap();
        nla.add(xyz, &[x, y, z]).unwrap();
        let lemmas = tangent_lemmas(&mut nla, &lar);
        assert_eq!(lemmas.len(), 4);
        assert!(lemmas
            .iter()
            .all(|l| l.ineqs().iter().any(|i| !i.term.coeff(xyz).is_zero())));
        for xv in -2..=2 {
            for yv in -2..=2 {
                for zv in -2..=2 {
                    lar.set_value(x, rat(xv));
                    lar.set_value(y, rat(yv));
                    lar.set_value(z, rat(zv));
                    lar.set_value(xy, rat(xv * yv));
                    lar.set_value(xyz, rat(xv * yv * zv));
                    assert!(lemmas.iter().all(|l| l.holds(&lar)));
                }
            }
        }
    }
}
