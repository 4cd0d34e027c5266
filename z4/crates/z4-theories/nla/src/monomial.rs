//! Registry of monomial definitions `m = x1 * ... * xk`.

use crate::error::{NlaError, NlaResult};
use num_rational::BigRational;
use num_traits::One;
use rustc_hash::FxHashMap;
use std::fmt;
use z4_core::{LinearSolver, LpVar};

/// A product column together with its factor columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monomial {
    var: LpVar,
    vars: Vec<LpVar>,
}

impl Monomial {
    /// The product column.
    #[must_use]
    pub fn var(&self) -> LpVar {
        self.var
    }

    /// Factors in registration order; repeats allowed.
    #[must_use]
    pub fn vars(&self) -> &[LpVar] {
        &self.vars
    }

    /// Number of factors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Always false for registered monomials.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Product of the factor values in the current model.
    pub fn product_value<S: LinearSolver + ?Sized>(&self, lar: &S) -> BigRational {
        let mut r = BigRational::one();
        for v in &self.vars {
            r *= lar.value(*v);
        }
        r
    }

    /// True when the model satisfies `value(var) = product of factor values`.
    pub fn holds<S: LinearSolver + ?Sized>(&self, lar: &S) -> bool {
        *lar.value(self.var) == self.product_value(lar)
    }
}

impl fmt::Display for Monomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = ", self.var)?;
        for (i, v) in self.vars.iter().enumerate() {
            if i > 0 {
                f.write_str("*")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

fn sorted(vars: &[LpVar]) -> Vec<LpVar> {
    let mut key = vars.to_vec();
    key.sort_unstable();
    key
}

/// All registered monomials with their lookup indices.
#[derive(Debug, Clone, Default)]
pub struct MonomialTable {
    monomials: Vec<Monomial>,
    /// Sorted factor multiset to monomial index.
    keys: FxHashMap<Vec<LpVar>, usize>,
    var_to_monomial: FxHashMap<LpVar, usize>,
    /// Factor column to the monomials containing it, ascending.
    containing: FxHashMap<LpVar, Vec<usize>>,
    scopes: Vec<usize>,
}

impl MonomialTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `var = product(vars)` and return its index.
    pub fn add(&mut self, var: LpVar, vars: &[LpVar]) -> NlaResult<usize> {
        if vars.is_empty() {
            return Err(NlaError::EmptyProduct { var });
        }
        if vars.contains(&var) {
            return Err(NlaError::ProductVarInFactors { var });
        }
        if let Some(&existing) = self.var_to_monomial.get(&var) {
            return Err(NlaError::ProductVarAlreadyDefined { var, existing });
        }
        let key = sorted(vars);
        if let Some(&i) = self.keys.get(&key) {
            return Err(NlaError::DuplicateMonomial {
                existing: self.monomials[i].var,
            });
        }
        let index = self.monomials.len();
        self.keys.insert(key, index);
        self.var_to_monomial.insert(var, index);
        let mut seen: Vec<LpVar> = Vec::with_capacity(vars.len());
        for v in vars {
            if !seen.contains(v) {
                seen.push(*v);
                self.containing.entry(*v).or_default().push(index);
            }
        }
        self.monomials.push(Monomial {
            var,
            vars: vars.to_vec(),
        });
        Ok(index)
    }

    /// Open a scope.
    pub fn push(&mut self) {
        self.scopes.push(self.monomials.len());
    }

    /// Number of monomials that survive `pop(n)`.
    #[must_use]
    pub fn len_after_pop(&self, n: usize) -> usize {
        if n == 0 {
            return self.monomials.len();
        }
        let keep = self.scopes.len().saturating_sub(n);
        self.scopes.get(keep).copied().unwrap_or(0)
    }

    /// Close `n` scopes, dropping the monomials registered inside them.
    pub fn pop(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        debug_assert!(n <= self.scopes.len(), "popping {n} of {} scopes", self.scopes.len());
        let new_len = self.len_after_pop(n);
        self.scopes.truncate(self.scopes.len().saturating_sub(n));
        while self.monomials.len() > new_len {
            let Some(m) = self.monomials.pop() else {
                break;
            };
            let index = self.monomials.len();
            self.keys.remove(&sorted(&m.vars));
            self.var_to_monomial.remove(&m.var);
            for v in &m.vars {
                if let Some(list) = self.containing.get_mut(v) {
                    if list.last() == Some(&index) {
                        list.pop();
                    }
                    if list.is_empty() {
                        self.containing.remove(v);
                    }
                }
            }
        }
    }

    /// Number of registered monomials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.monomials.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.monomials.is_empty()
    }

    /// Monomial by index.
    #[must_use]
    pub fn get(&self, i: usize) -> &Monomial {
        &self.monomials[i]
    }

    /// All monomials in registration order.
    #[must_use]
    pub fn monomials(&self) -> &[Monomial] {
        &self.monomials
    }

    /// Index of the monomial whose product column is `v`.
    #[must_use]
    pub fn monomial_of_var(&self, v: LpVar) -> Option<usize> {
        self.var_to_monomial.get(&v).copied()
    }

    /// Index of the monomial over exactly this factor multiset.
    #[must_use]
    pub fn find_by_factors(&self, vars: &[LpVar]) -> Option<usize> {
        self.keys.get(&sorted(vars)).copied()
    }

    /// Indices of the monomials having `v` as a factor.
    #[must_use]
    pub fn monomials_containing(&self, v: LpVar) -> &[usize] {
        self.containing.get(&v).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of open scopes.
    #[must_use]
    pub fn num_scopes(&self) -> usize {
        self.scopes.len()
    }

    /// Indices of the monomials whose product disagrees with the model.
    pub fn violated<S: LinearSolver + ?Sized>(&self, lar: &S) -> Vec<usize> {
        (0..self.monomials.len())
            .filter(|&i| !self.monomials[i].holds(lar))
            .collect()
    }

    /// Consistency of the lookup indices with the monomial list.
    #[must_use]
    pub fn tables_are_ok(&self) -> bool {
        if self.var_to_monomial.len() != self.monomials.len()
            || self.keys.len() != self.monomials.len()
        {
            return false;
        }
        self.monomials.iter().enumerate().all(|(i, m)| {
            self.var_to_monomial.get(&m.var) == Some(&i)
                && self.keys.get(&sorted(&m.vars)) == Some(&i)
                && m.vars.iter().all(|v| self.monomials_containing(*v).contains(&i))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use z4_core::{rat, FixedModel};

    fn v(i: u32) -> LpVar {
        LpVar(i)
    }

    #[test]
    fn test_add_and_lookup() {
        let mut t = MonomialTable::new();
        let i = t.add(v(10), &[v(1), v(2), v(1)]).unwrap();
        assert_eq!(i, 0);
        assert_eq!(t.monomial_of_var(v(10)), Some(0));
        assert_eq!(t.find_by_factors(&[v(2), v(1), v(1)]), Some(0));
        assert_eq!(t.monomials_containing(v(1)), &[0]);
        assert!(t.tables_are_ok());
    }

    #[test]
    fn test_add_rejects_bad_definitions() {
        let mut t = MonomialTable::new();
        t.add(v(10), &[v(1), v(2)]).unwrap();
        assert_eq!(
            t.add(v(11), &[v(2), v(1)]),
            Err(NlaError::DuplicateMonomial { existing: v(10) })
        );
        assert_eq!(
            t.add(v(12), &[v(12), v(1)]),
            Err(NlaError::ProductVarInFactors { var: v(12) })
        );
        assert_eq!(t.add(v(13), &[]), Err(NlaError::EmptyProduct { var: v(13) }));
        assert_eq!(
            t.add(v(10), &[v(3)]),
            Err(NlaError::ProductVarAlreadyDefined {
                var: v(10),
                existing: 0
            })
        );
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_pop_unregisters() {
        let mut t = MonomialTable::new();
        t.add(v(10), &[v(1), v(2)]).unwrap();
        t.push();
        t.add(v(11), &[v(1), v(3)]).unwrap();
        assert_eq!(t.monomials_containing(v(1)), &[0, 1]);
        assert_eq!(t.len_after_pop(1), 1);
        t.pop(1);
        assert_eq!(t.len(), 1);
        assert_eq!(t.monomial_of_var(v(11)), None);
        assert_eq!(t.monomials_containing(v(1)), &[0]);
        assert!(t.monomials_containing(v(3)).is_empty());
        assert!(t.tables_are_ok());
        // The same definition can be registered again after the pop.
        assert_eq!(t.add(v(11), &[v(1), v(3)]), Ok(1));
    }

    #[test]
    fn test_violated() {
        let mut lar = FixedModel::default();
        let x = lar.new_var(rat(2));
        let y = lar.new_var(rat(3));
        let m = lar.new_var(rat(6));
        let n = lar.new_var(rat(5));
        let mut t = MonomialTable::new();
        t.add(m, &[x, y]).unwrap();
        t.add(n, &[x, x]).unwrap();
        assert_eq!(t.violated(&lar), vec![1]);
        assert_eq!(t.get(1).product_value(&lar), rat(4));
    }
}
