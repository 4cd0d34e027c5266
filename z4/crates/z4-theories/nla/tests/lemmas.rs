//! End-to-end lemma scenarios through the public `NlaSolver` API.
//!
//! Every test checks that no returned lemma holds in the model it refutes.
//! Tests without bounds also check that every lemma holds on points where
//! the products are computed correctly, since their explanations are empty.

use z4_core::{rat, FixedModel, LpVar};
use z4_nla::{Lemma, LemmaKind, NlaCheckResult, NlaConfig, NlaSolver};

fn quiet(config: NlaConfig) -> NlaConfig {
    NlaConfig {
        debug: false,
        ..config
    }
}

fn refute(nla: &mut NlaSolver, lar: &FixedModel) -> Vec<Lemma> {
    let mut lemmas = Vec::new();
    assert_eq!(nla.check(lar, &mut lemmas), NlaCheckResult::Refuted);
    assert!(!lemmas.is_empty());
    assert!(lemmas.len() <= nla.config().max_lemmas);
    for l in &lemmas {
        assert!(!l.holds(lar), "lemma holds in the model: {}", l.display(lar));
    }
    lemmas
}

/// Every lemma holds wherever `m = x * y`.
fn assert_valid_for_product(lemmas: &[Lemma], lar: &mut FixedModel, x: LpVar, y: LpVar, m: LpVar) {
    for xv in -4..=4 {
        for yv in -4..=4 {
            lar.set_value(x, rat(xv));
            lar.set_value(y, rat(yv));
            lar.set_value(m, rat(xv * yv));
            for l in lemmas {
                assert!(l.holds(lar), "{} fails at x = {xv}, y = {yv}", l.display(lar));
            }
        }
    }
}

fn product(values: (i64, i64, i64)) -> (FixedModel, LpVar, LpVar, LpVar) {
    let mut lar = FixedModel::default();
    let x = lar.new_var(rat(values.0));
    let y = lar.new_var(rat(values.1));
    let m = lar.new_var(rat(values.2));
    lar.set_name(x, "x");
    lar.set_name(y, "y");
    lar.set_name(m, "m");
    (lar, x, y, m)
}

#[test]
fn test_product_off_by_one_is_refuted() {
    let (mut lar, x, y, m) = product((2, 3, 5));
    let mut nla = NlaSolver::with_config(quiet(NlaConfig::default()));
    nla.add(m, &[x, y]).unwrap();
    let lemmas = refute(&mut nla, &lar);
    assert!(lemmas.iter().any(|l| l.kind() == LemmaKind::Tangent));
    assert_valid_for_product(&lemmas, &mut lar, x, y, m);
}

#[test]
fn test_sign_lemma() {
    let (mut lar, x, y, m) = product((2, -3, 6));
    let mut nla = NlaSolver::with_config(quiet(NlaConfig::basics_only()));
    nla.add(m, &[x, y]).unwrap();
    let lemmas = refute(&mut nla, &lar);
    assert!(lemmas.iter().all(|l| l.kind() == LemmaKind::Sign));
    assert_valid_for_product(&lemmas, &mut lar, x, y, m);
}

#[test]
fn test_zero_lemma() {
    let (mut lar, x, y, m) = product((0, 3, 5));
    let mut nla = NlaSolver::with_config(quiet(NlaConfig::basics_only()));
    nla.add(m, &[x, y]).unwrap();
    let lemmas = refute(&mut nla, &lar);
    assert!(lemmas.iter().any(|l| l.kind() == LemmaKind::Zero));
    assert_valid_for_product(&lemmas, &mut lar, x, y, m);
}

#[test]
fn test_neutral_lemma() {
    let (mut lar, x, y, m) = product((4, 3, 4));
    let mut nla = NlaSolver::with_config(quiet(NlaConfig::basics_only()));
    nla.add(m, &[x, y]).unwrap();
    let lemmas = refute(&mut nla, &lar);
    assert!(lemmas.iter().any(|l| l.kind() == LemmaKind::Neutral));
    assert_valid_for_product(&lemmas, &mut lar, x, y, m);
}

#[test]
fn test_proportion_lemma() {
    let (mut lar, x, y, m) = product((5, 3, 2));
    let mut nla = NlaSolver::with_config(quiet(NlaConfig::basics_only()));
    nla.add(m, &[x, y]).unwrap();
    let lemmas = refute(&mut nla, &lar);
    assert!(lemmas.iter().any(|l| l.kind() == LemmaKind::Proportion));
    assert_valid_for_product(&lemmas, &mut lar, x, y, m);
}

#[test]
fn test_order_lemma() {
    let (mut lar, x, y, m) = product((2, 3, 7));
    let mut nla = NlaSolver::with_config(quiet(NlaConfig {
        derived_pass: false,
        monotonicity_lemmas: false,
        tangent_lemmas: false,
        ..NlaConfig::default()
    }));
    nla.add(m, &[x, y]).unwrap();
    let lemmas = refute(&mut nla, &lar);
    assert!(lemmas.iter().all(|l| l.kind() == LemmaKind::Order));
    assert_valid_for_product(&lemmas, &mut lar, x, y, m);
}

#[test]
fn test_monotonicity_lemma() {
    let (mut lar, x, y, m) = product((2, -3, -7));
    let mut nla = NlaSolver::with_config(quiet(NlaConfig {
        derived_pass: false,
        order_lemmas: false,
        tangent_lemmas: false,
        ..NlaConfig::default()
    }));
    nla.add(m, &[x, y]).unwrap();
    let lemmas = refute(&mut nla, &lar);
    assert!(lemmas.iter().any(|l| l.kind() == LemmaKind::Monotonicity));
    assert_valid_for_product(&lemmas, &mut lar, x, y, m);
}

#[test]
fn test_tangent_planes_separate_model_from_surface() {
    let (mut lar, x, y, m) = product((2, 3, 5));
    let mut nla = NlaSolver::with_config(quiet(NlaConfig {
        derived_pass: false,
        order_lemmas: false,
        monotonicity_lemmas: false,
        ..NlaConfig::default()
    }));
    nla.add(m, &[x, y]).unwrap();
    let lemmas = refute(&mut nla, &lar);
    assert_eq!(lemmas.len(), 4);
    // Two tangent lines through (2, 3), then one plane per point.
    let planes: Vec<&Lemma> = lemmas.iter().filter(|l| l.ineqs().len() == 3).collect();
    assert_eq!(planes.len(), 2);
    for plane in &planes {
        // The model lies below the surface, so each plane bounds m from below.
        let cut = &plane.ineqs()[2];
        assert_eq!(cut.term.coeff(m), rat(1));
        assert_eq!(cut.cmp, z4_core::Comparator::Gt);
    }
    // At the true product the same lemmas hold.
    lar.set_value(m, rat(6));
    assert!(lemmas.iter().all(|l| l.holds(&lar)));
    assert_valid_for_product(&lemmas, &mut lar, x, y, m);
}

#[test]
fn test_conflict_from_bounds() {
    // x is fixed to 0 and m >= 1, so m = x*y is contradicted by bounds alone.
    let (mut lar, x, y, m) = product((0, 3, 5));
    let (xlo, xhi) = lar.fix(x, rat(0));
    let w = lar.set_lower(m, rat(1), false);
    let mut nla = NlaSolver::with_config(quiet(NlaConfig::default()));
    nla.add(m, &[x, y]).unwrap();
    let lemmas = refute(&mut nla, &lar);
    let conflict = lemmas.iter().find(|l| l.is_conflict()).expect("conflict lemma");
    let exp = conflict.explanation();
    assert!(exp.contains(w));
    assert!(exp.contains(xlo) || exp.contains(xhi));
    assert!(nla.stats().conflicts >= 1);
}

#[test]
fn test_lemma_count_is_capped() {
    let mut lar = FixedModel::default();
    let y = lar.new_var(rat(3));
    let mut nla = NlaSolver::with_config(quiet(NlaConfig::default()));
    for k in 0..20 {
        let x = lar.new_var(rat(k + 2));
        let m = lar.new_var(rat(3 * (k + 2) - 1));
        nla.add(m, &[x, y]).unwrap();
    }
    let lemmas = refute(&mut nla, &lar);
    assert_eq!(lemmas.len(), 10);
    assert_eq!(nla.stats().lemmas, 10);
}

#[test]
fn test_scoped_monomial_is_forgotten() {
    let (mut lar, x, y, m) = product((2, 3, 6));
    let mut nla = NlaSolver::with_config(quiet(NlaConfig::default()));
    nla.add(m, &[x, y]).unwrap();

    let n = lar.new_var(rat(5));
    nla.push();
    nla.add(n, &[x, y, x]).unwrap();
    let mut lemmas = Vec::new();
    assert_eq!(nla.check(&lar, &mut lemmas), NlaCheckResult::Refuted);

    nla.pop(1);
    lemmas.clear();
    assert_eq!(nla.check(&lar, &mut lemmas), NlaCheckResult::Consistent);
    assert!(lemmas.is_empty());
    assert_eq!(nla.stats().checks, 2);
}
