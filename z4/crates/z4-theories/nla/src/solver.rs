//! The NLA check driver.
//!
//! [`NlaSolver`] owns the monomial registry, the equivalence tracker and the
//! rooted table across calls. Each [`NlaSolver::check`] opens a `Search`
//! over a borrowed model: it collects the equivalences the model's bounds
//! entail, canonizes every monomial under them, and then runs the lemma
//! strategies level by level until enough lemmas are found.
//!
//! ## Search levels
//!
//! 0. Sign, zero, neutral-element and proportion lemmas (`basics`)
//! 1. Order lemmas (`order`)
//! 2. Monotonicity (`monotone`) and tangent plane (`tangent`) lemmas
//!
//! A bound-derived pass over level 0 runs first. Any lemma from level 0 ends
//! the check; later levels run until `max_lemmas` lemmas are collected or a
//! conflict lemma appears.

use crate::config::NlaConfig;
use crate::error::NlaResult;
use crate::evars::Evars;
use crate::factorization::Factor;
use crate::lemma::{octagon_term, Explanation, Lemma, LemmaBuilder, LemmaKind};
use crate::monomial::MonomialTable;
use crate::rooted::{canonize, RootedTable};
use crate::stats::NlaStats;
use hashbrown::HashMap;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use std::fmt;
use z4_core::{ConstraintId, LinearSolver, LpVar};

/// Outcome of one [`NlaSolver::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NlaCheckResult {
    /// Every monomial agrees with the model.
    Consistent,
    /// Some monomial disagrees and at least one lemma was produced.
    Refuted,
    /// No verdict: the model is unusable or no lemma was found.
    Unknown,
}

impl fmt::Display for NlaCheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NlaCheckResult::Consistent => f.write_str("consistent"),
            NlaCheckResult::Refuted => f.write_str("refuted"),
            NlaCheckResult::Unknown => f.write_str("unknown"),
        }
    }
}

/// Incremental nonlinear arithmetic plugin.
#[derive(Debug, Clone, Default)]
pub struct NlaSolver {
    monomials: MonomialTable,
    evars: Evars,
    rooted: RootedTable,
    config: NlaConfig,
    stats: NlaStats,
}

impl NlaSolver {
    /// Create a solver with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a solver with the given configuration.
    #[must_use]
    pub fn with_config(config: NlaConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Register the monomial `var = vars[0] * ... * vars[k-1]`.
    pub fn add(&mut self, var: LpVar, vars: &[LpVar]) -> NlaResult<usize> {
        let index = self.monomials.add(var, vars)?;
        let (roots, negated) = canonize(vars, &self.evars);
        self.rooted.register(index, roots, negated);
        log::trace!("nla: registered {}", self.monomials.get(index));
        Ok(index)
    }

    /// Open a scope.
    pub fn push(&mut self) {
        self.monomials.push();
        self.evars.push();
    }

    /// Close `n` scopes, forgetting the monomials registered inside them.
    pub fn pop(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let keep = self.monomials.len_after_pop(n);
        for i in (keep..self.monomials.len()).rev() {
            self.rooted.deregister(i);
        }
        self.monomials.pop(n);
        self.evars.pop(n);
    }

    /// Number of open scopes.
    #[must_use]
    pub fn num_scopes(&self) -> usize {
        self.monomials.num_scopes()
    }

    /// The monomial registry.
    #[must_use]
    pub fn monomials(&self) -> &MonomialTable {
        &self.monomials
    }

    /// The rooted table, canonized under the equivalences that outlive a
    /// check. Merges found from bounds during a check are not reflected.
    #[must_use]
    pub fn rooted(&self) -> &RootedTable {
        &self.rooted
    }

    /// The equivalence tracker. It holds no merges between checks.
    #[must_use]
    pub fn evars(&self) -> &Evars {
        &self.evars
    }

    /// Indices of the monomials having `v` as a factor.
    #[must_use]
    pub fn monomials_containing(&self, v: LpVar) -> &[usize] {
        self.monomials.monomials_containing(v)
    }

    /// Index of the monomial whose product column is `v`.
    #[must_use]
    pub fn monomial_of_var(&self, v: LpVar) -> Option<usize> {
        self.monomials.monomial_of_var(v)
    }

    /// Consistency of the registry and the rooted table.
    #[must_use]
    pub fn tables_are_ok(&self) -> bool {
        self.monomials.tables_are_ok() && self.rooted.tables_are_ok()
    }

    /// Accumulated statistics.
    #[must_use]
    pub fn stats(&self) -> &NlaStats {
        &self.stats
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &NlaConfig {
        &self.config
    }

    /// Mutable access to the configuration.
    pub fn config_mut(&mut self) -> &mut NlaConfig {
        &mut self.config
    }

    /// Check the monomials against the model of `lar`.
    ///
    /// Lemmas are appended to `out`. Each of them is violated by the current
    /// model and is a valid consequence of the monomial definitions and the
    /// constraints in its explanation.
    pub fn check<S: LinearSolver + ?Sized>(
        &mut self,
        lar: &S,
        out: &mut Vec<Lemma>,
    ) -> NlaCheckResult {
        let before = out.len();
        let result = self.check_inner(lar, out);
        let added = &out[before..];
        self.stats.record(result, added);
        log::debug!("nla: check #{} -> {} with {} lemmas", self.stats.checks, result, added.len());
        if self.config.debug {
            eprintln!(
                "[NLA] check #{}: {} ({} lemmas, {} monomials)",
                self.stats.checks,
                result,
                added.len(),
                self.monomials.len()
            );
            for lemma in added {
                eprintln!("[NLA]   {}", lemma.display(lar));
            }
        }
        result
    }

    fn check_inner<S: LinearSolver + ?Sized>(
        &mut self,
        lar: &S,
        out: &mut Vec<Lemma>,
    ) -> NlaCheckResult {
        if !lar.status().has_model() {
            log::debug!("nla: linear status {:?} has no model", lar.status());
            return NlaCheckResult::Unknown;
        }
        let violated = self.monomials.violated(lar);
        if violated.is_empty() {
            return NlaCheckResult::Consistent;
        }
        log::debug!("nla: {} monomials to refine", violated.len());

        // Equivalences collected here live for this check only.
        self.evars.push();
        self.collect_equivs(lar);
        self.rooted.rebuild(&self.monomials, &self.evars);
        self.rooted.mark_to_refine(&violated);

        let mut search = Search {
            lar,
            evars: &self.evars,
            monomials: &self.monomials,
            rooted: &self.rooted,
            config: &self.config,
            violated: &violated,
            lemmas: Vec::new(),
        };
        if self.config.derived_pass {
            search.inner_check(true);
        }
        if search.lemmas.is_empty() {
            search.inner_check(false);
        }
        let lemmas = search.lemmas;
        self.evars.pop(1);
        self.rooted.rebuild(&self.monomials, &self.evars);

        if lemmas.is_empty() {
            NlaCheckResult::Unknown
        } else {
            out.extend(lemmas);
            NlaCheckResult::Refuted
        }
    }

    /// Merge the columns of rows `+-x +- y` whose column is fixed to zero,
    /// and optionally columns fixed to values of equal magnitude.
    fn collect_equivs<S: LinearSolver + ?Sized>(&mut self, lar: &S) {
        for i in 0..lar.row_count() {
            let Some((col, term)) = lar.row(i) else {
                continue;
            };
            if !lar.var_is_fixed_to_zero(col) {
                continue;
            }
            let term = lar.subs_terms_to_columns(term);
            let Some((x, y, same_sign)) = octagon_term(&term) else {
                continue;
            };
            let just = fixed_witnesses(lar, col);
            if same_sign {
                self.evars.merge_minus(x, y, just);
            } else {
                self.evars.merge_plus(x, y, just);
            }
        }
        if self.config.equivs_from_fixed_vars {
            self.collect_equivs_of_fixed_vars(lar);
        }
    }

    fn collect_equivs_of_fixed_vars<S: LinearSolver + ?Sized>(&mut self, lar: &S) {
        let mut by_magnitude: HashMap<BigRational, LpVar> = HashMap::new();
        for k in 0..lar.num_vars() {
            let v = LpVar::from(k);
            if !lar.var_is_fixed(v) || lar.value(v).is_zero() {
                continue;
            }
            let value = lar.value(v);
            match by_magnitude.get(&value.abs()) {
                Some(&first) => {
                    let mut just = fixed_witnesses(lar, first);
                    just.extend(fixed_witnesses(lar, v));
                    if lar.value(first) == value {
                        self.evars.merge_plus(first, v, just);
                    } else {
                        self.evars.merge_minus(first, v, just);
                    }
                }
                None => {
                    by_magnitude.insert(value.abs(), v);
                }
            }
        }
    }
}

fn fixed_witnesses<S: LinearSolver + ?Sized>(lar: &S, v: LpVar) -> Vec<ConstraintId> {
    lar.lower_bound(v)
        .into_iter()
        .chain(lar.upper_bound(v))
        .map(|b| b.witness)
        .collect()
}

/// One check in progress: shared views of the tables plus collected lemmas.
///
/// The lemma strategies extend this type with their own `impl` blocks.
pub(crate) struct Search<'a, S: LinearSolver + ?Sized> {
    pub(crate) lar: &'a S,
    pub(crate) evars: &'a Evars,
    pub(crate) monomials: &'a MonomialTable,
    pub(crate) rooted: &'a RootedTable,
    pub(crate) config: &'a NlaConfig,
    /// Monomials whose product disagrees with the model.
    pub(crate) violated: &'a [usize],
    pub(crate) lemmas: Vec<Lemma>,
}

impl<'a, S: LinearSolver + ?Sized> Search<'a, S> {
    /// Run the search levels. `derived` restricts it to bound-derived lemmas.
    pub(crate) fn inner_check(&mut self, derived: bool) {
        for level in 0..3 {
            if self.done() {
                break;
            }
            log::trace!("nla: derived = {derived}, search level {level}");
            match level {
                0 => {
                    self.basic_lemma(derived);
                    if !self.lemmas.is_empty() {
                        return;
                    }
                }
                _ if derived => {}
                1 => {
                    if self.config.order_lemmas {
                        self.order_lemma();
                    }
                }
                _ => {
                    if self.config.monotonicity_lemmas {
                        self.monotonicity_lemma();
                    }
                    if self.config.tangent_lemmas && !self.done() {
                        self.tangent_lemma();
                    }
                }
            }
        }
    }

    /// True once enough lemmas are collected or a conflict was found.
    pub(crate) fn done(&self) -> bool {
        self.lemmas.len() >= self.config.max_lemmas || self.lemmas.iter().any(Lemma::is_conflict)
    }

    pub(crate) fn builder(&self, kind: LemmaKind) -> LemmaBuilder<'a, S> {
        LemmaBuilder::new(self.lar, self.evars, kind)
    }

    /// Finish `b` and keep the lemma unless it is a tautology or the cap is
    /// reached. Returns true when a lemma was kept.
    pub(crate) fn push_lemma(&mut self, b: LemmaBuilder<'a, S>) -> bool {
        if self.lemmas.len() >= self.config.max_lemmas {
            return false;
        }
        let Some(lemma) = b.finish() else {
            return false;
        };
        log::trace!("nla: {}", lemma.display(self.lar));
        self.lemmas.push(lemma);
        true
    }

    /// A random index below `n`, which must be positive.
    pub(crate) fn random_start(&self, n: usize) -> usize {
        (self.lar.random_next() % n as u64) as usize
    }

    pub(crate) fn val(&self, v: LpVar) -> &'a BigRational {
        self.lar.value(v)
    }

    /// Product column of rooted monomial `rm`.
    pub(crate) fn rm_var(&self, rm: usize) -> LpVar {
        self.monomials.get(self.rooted.get(rm).orig_index()).var()
    }

    /// Model value of the product of the roots of `rm`.
    pub(crate) fn rm_value(&self, rm: usize) -> BigRational {
        self.rooted.get(rm).orig_sign() * self.val(self.rm_var(rm))
    }

    /// Column standing for a factor.
    pub(crate) fn factor_var(&self, f: Factor) -> LpVar {
        match f {
            Factor::Var(v) => v,
            Factor::Rooted(i) => self.rm_var(i),
        }
    }

    /// Sign relating the factor's column to the product of its roots.
    pub(crate) fn factor_sign(&self, f: Factor) -> BigRational {
        match f {
            Factor::Var(_) => BigRational::one(),
            Factor::Rooted(i) => self.rooted.get(i).orig_sign(),
        }
    }

    /// Model value of the product of the roots of a factor.
    pub(crate) fn factor_value(&self, f: Factor) -> BigRational {
        match f {
            Factor::Var(v) => self.val(v).clone(),
            Factor::Rooted(i) => self.rm_value(i),
        }
    }

    /// Explain why the factors of the representative of `rm` equal its roots.
    pub(crate) fn explain_rm(&self, rm: usize, exp: &mut Explanation) {
        for v in self.monomials.get(self.rooted.get(rm).orig_index()).vars() {
            self.evars.explain_var(*v, exp);
        }
    }

    /// Explain a monomial's factors against their roots.
    pub(crate) fn explain_monomial(&self, mon: usize, exp: &mut Explanation) {
        for v in self.monomials.get(mon).vars() {
            self.evars.explain_var(*v, exp);
        }
    }

    pub(crate) fn explain_factor(&self, f: Factor, exp: &mut Explanation) {
        match f {
            Factor::Var(v) => self.evars.explain_var(v, exp),
            Factor::Rooted(i) => self.explain_rm(i, exp),
        }
    }

    pub(crate) fn explain_factors(&self, fs: &[Factor], exp: &mut Explanation) {
        for f in fs {
            self.explain_factor(*f, exp);
        }
    }
}

/// `-1`, `0` or `1`.
pub(crate) fn rat_sign(v: &BigRational) -> i32 {
    if v.is_positive() {
        1
    } else if v.is_negative() {
        -1
    } else {
        0
    }
}

/// `1` for non-negative values, `-1` otherwise.
pub(crate) fn sign_or_one(v: &BigRational) -> BigRational {
    if v.is_negative() {
        -BigRational::one()
    } else {
        BigRational::one()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NlaError;
    use z4_core::{rat, FixedModel, LinearTerm, LpStatus};

    #[test]
    fn test_consistent_model() {
        let mut lar = FixedModel::default();
        let x = lar.new_var(rat(2));
        let y = lar.new_var(rat(3));
        let m = lar.new_var(rat(6));
        let mut nla = NlaSolver::new();
        nla.add(m, &[x, y]).unwrap();
        let mut lemmas = Vec::new();
        assert_eq!(nla.check(&lar, &mut lemmas), NlaCheckResult::Consistent);
        assert!(lemmas.is_empty());
        assert_eq!(nla.stats().consistent, 1);
    }

    #[test]
    fn test_unusable_status_is_unknown() {
        let mut lar = FixedModel::default();
        let x = lar.new_var(rat(2));
        let m = lar.new_var(rat(5));
        lar.set_status(LpStatus::Infeasible);
        let mut nla = NlaSolver::new();
        nla.add(m, &[x, x]).unwrap();
        let mut lemmas = Vec::new();
        assert_eq!(nla.check(&lar, &mut lemmas), NlaCheckResult::Unknown);
        assert!(lemmas.is_empty());
    }

    #[test]
    fn test_add_reports_duplicates() {
        let mut nla = NlaSolver::new();
        nla.add(LpVar(10), &[LpVar(1), LpVar(2)]).unwrap();
        assert_eq!(
            nla.add(LpVar(11), &[LpVar(2), LpVar(1)]),
            Err(NlaError::DuplicateMonomial {
                existing: LpVar(10)
            })
        );
    }

    #[test]
    fn test_push_pop_restores_tables() {
        let mut nla = NlaSolver::new();
        nla.add(LpVar(10), &[LpVar(1), LpVar(2)]).unwrap();
        nla.push();
        nla.add(LpVar(11), &[LpVar(1), LpVar(3)]).unwrap();
        nla.add(LpVar(12), &[LpVar(2), LpVar(3)]).unwrap();
        assert_eq!(nla.monomials_containing(LpVar(1)), &[0, 1]);
        nla.pop(1);
        assert_eq!(nla.num_scopes(), 0);
        assert_eq!(nla.monomials().len(), 1);
        assert_eq!(nla.monomial_of_var(LpVar(11)), None);
        assert_eq!(nla.rooted().len(), 1);
        assert!(nla.tables_are_ok());
    }

    #[test]
    fn test_octagon_rows_merge_columns() {
        let mut lar = FixedModel::default();
        let x = lar.new_var(rat(2));
        let y = lar.new_var(rat(-2));
        let z = lar.new_var(rat(3));
        let m = lar.new_var(rat(7));
        let n = lar.new_var(rat(-6));
        // x + y = 0 holds through a row fixed to zero.
        let row = lar.new_row(LinearTerm::from_pairs([(rat(1), x), (rat(1), y)]));
        let (lo, hi) = lar.fix(row, rat(0));
        let mut nla = NlaSolver::new();
        nla.add(m, &[x, z]).unwrap();
        nla.add(n, &[y, z]).unwrap();
        let mut lemmas = Vec::new();
        assert_eq!(nla.check(&lar, &mut lemmas), NlaCheckResult::Refuted);
        // m = x*z and n = -x*z share a rooted form, so m = -n.
        let sign = lemmas
            .iter()
            .find(|l| l.kind() == LemmaKind::Sign)
            .expect("derived sign lemma");
        assert!(sign.explanation().contains(lo) && sign.explanation().contains(hi));
        assert!(lemmas.iter().all(|l| !l.holds(&lar)));
        // Outside the check x and y are separate roots again.
        assert_eq!(nla.rooted().len(), 2);
        assert!(!nla.evars().vars_are_equiv(x, y));
        assert!(nla.tables_are_ok());
    }

    #[test]
    fn test_check_merges_do_not_outlive_the_check() {
        let mut lar = FixedModel::default();
        let x = lar.new_var(rat(2));
        let y = lar.new_var(rat(-2));
        let z = lar.new_var(rat(3));
        let w = lar.new_var(rat(3));
        let m = lar.new_var(rat(7));
        let n = lar.new_var(rat(-6));
        let p = lar.new_var(rat(10));
        let row = lar.new_row(LinearTerm::from_pairs([(rat(1), x), (rat(1), y)]));
        lar.fix(row, rat(0));
        let row = lar.new_row(LinearTerm::from_pairs([(rat(1), z), (rat(-1), w)]));
        lar.fix(row, rat(0));
        let cols = lar.num_vars();

        let mut nla = NlaSolver::new();
        nla.add(m, &[x, z]).unwrap();
        nla.add(n, &[y, w]).unwrap();
        let before = nla.evars().snapshot(cols);
        let rooted_before = nla.rooted().len();

        let mut lemmas = Vec::new();
        assert_eq!(nla.check(&lar, &mut lemmas), NlaCheckResult::Refuted);
        assert_eq!(nla.evars().snapshot(cols), before);
        assert_eq!(nla.evars().num_scopes(), 0);

        nla.push();
        nla.add(p, &[x, w]).unwrap();
        lemmas.clear();
        assert_eq!(nla.check(&lar, &mut lemmas), NlaCheckResult::Refuted);
        assert_eq!(nla.evars().snapshot(cols), before);
        assert_eq!(nla.evars().num_scopes(), 1);
        nla.pop(1);

        assert_eq!(nla.evars().snapshot(cols), before);
        assert_eq!(nla.evars().num_scopes(), 0);
        assert_eq!(nla.rooted().len(), rooted_before);
        assert!(nla.tables_are_ok());
    }

    #[test]
    fn test_stats_count_only_new_lemmas() {
        let mut lar = FixedModel::default();
        let x = lar.new_var(rat(2));
        let y = lar.new_var(rat(3));
        let m = lar.new_var(rat(7));
        let mut nla = NlaSolver::new();
        nla.add(m, &[x, y]).unwrap();

        let mut lemmas = Vec::new();
        assert_eq!(nla.check(&lar, &mut lemmas), NlaCheckResult::Refuted);
        let first = lemmas.len() as u64;
        assert_eq!(nla.stats().lemmas, first);
        let stats = nla.stats().clone();

        // The same accumulator is reused for a consistent model.
        lar.set_value(m, rat(6));
        assert_eq!(nla.check(&lar, &mut lemmas), NlaCheckResult::Consistent);
        assert_eq!(lemmas.len() as u64, first);
        assert_eq!(nla.stats().lemmas, first);
        assert_eq!(nla.stats().conflicts, stats.conflicts);
        assert_eq!(nla.stats().tangent_lemmas, stats.tangent_lemmas);
        assert_eq!(nla.stats().checks, 2);
        assert_eq!(nla.stats().consistent, 1);
    }

    #[test]
    fn test_lemma_cap() {
        let mut lar = FixedModel::default();
        let mut nla = NlaSolver::with_config(NlaConfig {
            max_lemmas: 2,
            derived_pass: false,
            ..NlaConfig::default()
        });
        for k in 0..6 {
            let x = lar.new_var(rat(k + 2));
            let m = lar.new_var(rat(-(k + 2) * (k + 2)));
            nla.add(m, &[x, x]).unwrap();
        }
        let mut lemmas = Vec::new();
        assert_eq!(nla.check(&lar, &mut lemmas), NlaCheckResult::Refuted);
        assert!(!lemmas.is_empty() && lemmas.len() <= 2);
    }

    #[test]
    fn test_signs() {
        assert_eq!(rat_sign(&rat(-3)), -1);
        assert_eq!(rat_sign(&rat(0)), 0);
        assert_eq!(sign_or_one(&rat(0)), rat(1));
        assert_eq!(sign_or_one(&rat(-2)), rat(-1));
    }
}
