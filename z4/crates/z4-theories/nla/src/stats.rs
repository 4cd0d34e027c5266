//! Check statistics.

use crate::lemma::{Lemma, LemmaKind};
use crate::solver::NlaCheckResult;
use std::fmt;

/// Counters accumulated over the lifetime of an [`crate::NlaSolver`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NlaStats {
    /// Number of calls to `check`
    pub checks: u64,
    /// Checks that found every monomial consistent
    pub consistent: u64,
    /// Checks that returned at least one lemma
    pub refuted: u64,
    /// Checks that found a violation but no lemma
    pub unknown: u64,
    /// Total lemmas returned
    pub lemmas: u64,
    /// Lemmas with no disjuncts
    pub conflicts: u64,
    /// Sign lemmas
    pub sign_lemmas: u64,
    /// Zero lemmas
    pub zero_lemmas: u64,
    /// Neutral lemmas
    pub neutral_lemmas: u64,
    /// Proportion lemmas
    pub proportion_lemmas: u64,
    /// Order lemmas
    pub order_lemmas: u64,
    /// Monotonicity lemmas
    pub monotonicity_lemmas: u64,
    /// Tangent plane lemmas
    pub tangent_lemmas: u64,
}

impl NlaStats {
    /// Account for one finished check.
    pub fn record(&mut self, result: NlaCheckResult, lemmas: &[Lemma]) {
        self.checks += 1;
        match result {
            NlaCheckResult::Consistent => self.consistent += 1,
            NlaCheckResult::Refuted => self.refuted += 1,
            NlaCheckResult::Unknown => self.unknown += 1,
        }
        for lemma in lemmas {
            self.lemmas += 1;
            if lemma.is_conflict() {
                self.conflicts += 1;
            }
            *self.kind_counter(lemma.kind()) += 1;
        }
    }

    fn kind_counter(&mut self, kind: LemmaKind) -> &mut u64 {
        match kind {
            LemmaKind::Sign => &mut self.sign_lemmas,
            LemmaKind::Zero => &mut self.zero_lemmas,
            LemmaKind::Neutral => &mut self.neutral_lemmas,
            LemmaKind::Proportion => &mut self.proportion_lemmas,
            LemmaKind::Order => &mut self.order_lemmas,
            LemmaKind::Monotonicity => &mut self.monotonicity_lemmas,
            LemmaKind::Tangent => &mut self.tangent_lemmas,
        }
    }
}

impl fmt::Display for NlaStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "nla checks: {} (consistent {}, refuted {}, unknown {})",
            self.checks, self.consistent, self.refuted, self.unknown
        )?;
        writeln!(f, "nla lemmas: {} (conflicts {})", self.lemmas, self.conflicts)?;
        write!(
            f,
            "  sign {} zero {} neutral {} proportion {} order {} monotonicity {} tangent {}",
            self.sign_lemmas,
            self.zero_lemmas,
            self.neutral_lemmas,
            self.proportion_lemmas,
            self.order_lemmas,
            self.monotonicity_lemmas,
            self.tangent_lemmas
        )
    }
}
