//! An in-memory linear core with a fixed model.
//!
//! [`FixedModel`] stores values, bounds and term rows explicitly. It is the
//! reference [`LinearSolver`] for plugin tests and benchmarks: callers set up
//! a model by hand, run a plugin, and inspect the lemmas against it.

use crate::term::{ConstraintId, LinearTerm, LpVar};
use crate::theory::{Bound, LinearSolver, LpStatus};
use num_rational::BigRational;
use rustc_hash::FxHashMap;
use std::cell::Cell;

#[derive(Debug, Clone)]
struct Column {
    value: BigRational,
    lower: Option<Bound>,
    upper: Option<Bound>,
    is_int: bool,
    name: Option<String>,
}

/// A linear core whose model is set explicitly.
#[derive(Debug, Clone)]
pub struct FixedModel {
    columns: Vec<Column>,
    rows: Vec<(LpVar, LinearTerm)>,
    term_columns: FxHashMap<LpVar, LpVar>,
    status: LpStatus,
    next_witness: u32,
    rng_state: Cell<u64>,
}

impl Default for FixedModel {
    fn default() -> Self {
        Self::new(0)
    }
}

impl FixedModel {
    /// Create an empty model with the given random seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            term_columns: FxHashMap::default(),
            status: LpStatus::Feasible,
            next_witness: 0,
            rng_state: Cell::new(seed),
        }
    }

    fn push_column(&mut self, value: BigRational, is_int: bool) -> LpVar {
        let v = LpVar::from(self.columns.len());
        self.columns.push(Column {
            value,
            lower: None,
            upper: None,
            is_int,
            name: None,
        });
        v
    }

    /// Add an integer column with the given value.
    pub fn new_var(&mut self, value: BigRational) -> LpVar {
        self.push_column(value, true)
    }

    /// Add a real column with the given value.
    pub fn new_real_var(&mut self, value: BigRational) -> LpVar {
        self.push_column(value, false)
    }

    /// Add a column defined by `term`; its value is the value of `term`.
    ///
    /// The column is real unless every column of `term` is integer and every
    /// coefficient is integral.
    pub fn new_row(&mut self, term: LinearTerm) -> LpVar {
        let value = self.term_value(&term);
        let is_int = term
            .iter()
            .all(|(v, c)| c.is_integer() && self.columns[v.index()].is_int);
        let v = self.push_column(value, is_int);
        self.rows.push((v, term));
        v
    }

    /// Declare that term variable `term_var` is represented by `column`.
    pub fn map_term(&mut self, term_var: LpVar, column: LpVar) {
        self.term_columns.insert(term_var, column);
    }

    /// Overwrite the value of a column.
    pub fn set_value(&mut self, v: LpVar, value: BigRational) {
        self.columns[v.index()].value = value;
    }

    /// Give a column a display name.
    pub fn set_name(&mut self, v: LpVar, name: impl Into<String>) {
        self.columns[v.index()].name = Some(name.into());
    }

    /// Set the status reported by [`LinearSolver::status`].
    pub fn set_status(&mut self, status: LpStatus) {
        self.status = status;
    }

    fn fresh_witness(&mut self) -> ConstraintId {
        let id = ConstraintId(self.next_witness);
        self.next_witness += 1;
        id
    }

    /// Assert a lower bound and return its witness.
    pub fn set_lower(&mut self, v: LpVar, value: BigRational, strict: bool) -> ConstraintId {
        let witness = self.fresh_witness();
        self.columns[v.index()].lower = Some(Bound {
            value,
            strict,
            witness,
        });
        witness
    }

    /// Assert an upper bound and return its witness.
    pub fn set_upper(&mut self, v: LpVar, value: BigRational, strict: bool) -> ConstraintId {
        let witness = self.fresh_witness();
        self.columns[v.index()].upper = Some(Bound {
            value,
            strict,
            witness,
        });
        witness
    }

    /// Fix a column to `value` with two non-strict bounds.
    pub fn fix(&mut self, v: LpVar, value: BigRational) -> (ConstraintId, ConstraintId) {
        let lo = self.set_lower(v, value.clone(), false);
        let hi = self.set_upper(v, value.clone(), false);
        self.set_value(v, value);
        (lo, hi)
    }

    /// Drop both bounds of a column.
    pub fn clear_bounds(&mut self, v: LpVar) {
        let col = &mut self.columns[v.index()];
        col.lower = None;
        col.upper = None;
    }
}

impl LinearSolver for FixedModel {
    fn status(&self) -> LpStatus {
        self.status
    }

    fn num_vars(&self) -> usize {
        self.columns.len()
    }

    fn value(&self, v: LpVar) -> &BigRational {
        &self.columns[v.index()].value
    }

    fn lower_bound(&self, v: LpVar) -> Option<&Bound> {
        self.columns.get(v.index()).and_then(|c| c.lower.as_ref())
    }

    fn upper_bound(&self, v: LpVar) -> Option<&Bound> {
        self.columns.get(v.index()).and_then(|c| c.upper.as_ref())
    }

    fn var_is_int(&self, v: LpVar) -> bool {
        self.columns.get(v.index()).is_some_and(|c| c.is_int)
    }

    fn term_column(&self, v: LpVar) -> Option<LpVar> {
        self.term_columns.get(&v).copied()
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn row(&self, i: usize) -> Option<(LpVar, &LinearTerm)> {
        self.rows.get(i).map(|(v, t)| (*v, t))
    }

    fn random_next(&self) -> u64 {
        // Same LCG constants as the SAT walker.
        let state = self
            .rng_state
            .get()
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.rng_state.set(state);
        state >> 33
    }

    fn var_name(&self, v: LpVar) -> String {
        self.columns
            .get(v.index())
            .and_then(|c| c.name.clone())
            .unwrap_or_else(|| v.to_string())
    }
}
