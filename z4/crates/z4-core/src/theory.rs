//! Interface between theory plugins and the linear arithmetic core.
//!
//! A theory plugin never owns the linear core. It reads the current model,
//! the bounds with their witnessing constraints, and the term rows through
//! [`LinearSolver`], and answers with lemmas that the core asserts later.

use crate::term::{ConstraintId, LinearTerm, LpVar};
use num_rational::BigRational;
use num_traits::{Signed, Zero};

/// Status of the most recent linear check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LpStatus {
    /// An optimal model was found.
    Optimal,
    /// A feasible model was found.
    Feasible,
    /// The linear constraints are infeasible.
    Infeasible,
    /// The core gave up or was interrupted.
    Unknown,
}

impl LpStatus {
    /// True when the current model is a valid assignment that plugins may inspect.
    #[must_use]
    pub fn has_model(self) -> bool {
        matches!(self, LpStatus::Optimal | LpStatus::Feasible)
    }
}

/// A bound on a column together with the constraint that established it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    /// Bound value.
    pub value: BigRational,
    /// True for `<` / `>`, false for `<=` / `>=`.
    pub strict: bool,
    /// Constraint witnessing the bound.
    pub witness: ConstraintId,
}

impl Bound {
    /// Read as a lower bound, does it force the column above zero?
    #[must_use]
    pub fn lower_is_positive(&self) -> bool {
        self.value.is_positive() || (self.strict && self.value.is_zero())
    }

    /// Read as an upper bound, does it force the column below zero?
    #[must_use]
    pub fn upper_is_negative(&self) -> bool {
        self.value.is_negative() || (self.strict && self.value.is_zero())
    }
}

/// Read-only view of the linear arithmetic core.
///
/// Columns are dense indices `0..num_vars()`. A column may be a *term
/// column*, standing for a linear combination of other columns; rows expose
/// these definitions so plugins can rewrite lemmas over base columns.
///
/// `random_next` takes `&self`; implementors keep their generator state in a
/// `Cell` so plugins can draw randomness while holding shared borrows.
pub trait LinearSolver {
    /// Status of the last linear check.
    fn status(&self) -> LpStatus;

    /// Number of columns.
    fn num_vars(&self) -> usize;

    /// Current value of a column.
    fn value(&self, v: LpVar) -> &BigRational;

    /// Lower bound of a column, if any.
    fn lower_bound(&self, v: LpVar) -> Option<&Bound>;

    /// Upper bound of a column, if any.
    fn upper_bound(&self, v: LpVar) -> Option<&Bound>;

    /// True for integer columns.
    fn var_is_int(&self, v: LpVar) -> bool;

    /// The column standing for a term variable, if `v` denotes a term.
    fn term_column(&self, _v: LpVar) -> Option<LpVar> {
        None
    }

    /// Number of term rows.
    fn row_count(&self) -> usize {
        0
    }

    /// Row `i`: the defined column and its defining term.
    fn row(&self, _i: usize) -> Option<(LpVar, &LinearTerm)> {
        None
    }

    /// Next pseudo-random number.
    fn random_next(&self) -> u64;

    /// Human readable column name for tracing.
    fn var_name(&self, v: LpVar) -> String {
        v.to_string()
    }

    /// True when `v` has a lower bound.
    fn has_lower_bound(&self, v: LpVar) -> bool {
        self.lower_bound(v).is_some()
    }

    /// True when `v` has an upper bound.
    fn has_upper_bound(&self, v: LpVar) -> bool {
        self.upper_bound(v).is_some()
    }

    /// True when both bounds are non-strict and equal.
    fn var_is_fixed(&self, v: LpVar) -> bool {
        match (self.lower_bound(v), self.upper_bound(v)) {
            (Some(lo), Some(hi)) => !lo.strict && !hi.strict && lo.value == hi.value,
            _ => false,
        }
    }

    /// True when `v` is fixed to zero by its bounds.
    fn var_is_fixed_to_zero(&self, v: LpVar) -> bool {
        self.var_is_fixed(v) && self.lower_bound(v).is_some_and(|b| b.value.is_zero())
    }

    /// True when the lower bound of `v` forces it above zero.
    fn var_has_positive_lower_bound(&self, v: LpVar) -> bool {
        self.lower_bound(v).is_some_and(Bound::lower_is_positive)
    }

    /// True when the upper bound of `v` forces it below zero.
    fn var_has_negative_upper_bound(&self, v: LpVar) -> bool {
        self.upper_bound(v).is_some_and(Bound::upper_is_negative)
    }

    /// True when the bounds of `v` exclude zero.
    fn var_is_separated_from_zero(&self, v: LpVar) -> bool {
        self.var_has_positive_lower_bound(v) || self.var_has_negative_upper_bound(v)
    }

    /// True when zero lies strictly inside the bounds of `v`.
    fn zero_is_an_inner_point_of_bounds(&self, v: LpVar) -> bool {
        let below = self.lower_bound(v).map_or(true, |b| b.value.is_negative());
        let above = self.upper_bound(v).map_or(true, |b| b.value.is_positive());
        below && above
    }

    /// Replace every term variable of `t` by its column.
    fn subs_terms_to_columns(&self, t: &LinearTerm) -> LinearTerm {
        let mut out = LinearTerm::new();
        for (var, coeff) in t.iter() {
            let col = self.term_column(var).unwrap_or(var);
            out.add_coeff_var(coeff.clone(), col);
        }
        out
    }

    /// Value of `t` in the current model.
    fn term_value(&self, t: &LinearTerm) -> BigRational {
        t.evaluate(|var| {
            let col = self.term_column(var).unwrap_or(var);
            self.value(col).clone()
        })
    }
}
