//! Canonical monomials modulo signed column equivalence.
//!
//! Replacing every factor by the root of its class and sorting gives the
//! *rooted* form of a monomial, plus a sign collecting the negations picked
//! up on the way. Monomials with equal rooted forms have equal products up
//! to that sign, so they share one [`RootedMonomial`].
//!
//! For a rooted monomial with representative `orig` and sign `s`,
//! `s * value(orig.var)` is the value the model assigns to the product of
//! its roots.

use crate::evars::Evars;
use crate::factorization::Factor;
use crate::monomial::MonomialTable;
use num_rational::BigRational;
use num_traits::One;
use rustc_hash::FxHashMap;
use z4_core::LpVar;

/// A monomial index with the sign relating it to its rooted form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexWithSign {
    /// Monomial index.
    pub index: usize,
    /// True when the monomial equals minus the product of the roots.
    pub negated: bool,
}

impl IndexWithSign {
    /// `1` or `-1`.
    #[must_use]
    pub fn rsign(self) -> BigRational {
        if self.negated {
            -BigRational::one()
        } else {
            BigRational::one()
        }
    }
}

/// A canonical monomial and the registered monomials mapping to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootedMonomial {
    vars: Vec<LpVar>,
    orig: IndexWithSign,
    mons: Vec<IndexWithSign>,
}

impl RootedMonomial {
    /// Sorted root columns.
    #[must_use]
    pub fn vars(&self) -> &[LpVar] {
        &self.vars
    }

    /// Arity.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Rooted monomials always have factors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// The representative monomial.
    #[must_use]
    pub fn orig(&self) -> IndexWithSign {
        self.orig
    }

    /// Index of the representative monomial.
    #[must_use]
    pub fn orig_index(&self) -> usize {
        self.orig.index
    }

    /// Sign of the representative relative to the product of the roots.
    #[must_use]
    pub fn orig_sign(&self) -> BigRational {
        self.orig.rsign()
    }

    /// Every registered monomial with this rooted form.
    #[must_use]
    pub fn mons(&self) -> &[IndexWithSign] {
        &self.mons
    }
}

/// Rooted form of a factor list: sorted roots and the accumulated sign.
#[must_use]
pub fn canonize(vars: &[LpVar], evars: &Evars) -> (Vec<LpVar>, bool) {
    let mut negated = false;
    let mut roots: Vec<LpVar> = vars
        .iter()
        .map(|v| {
            let r = evars.find(*v);
            negated ^= r.negated;
            r.var
        })
        .collect();
    roots.sort_unstable();
    (roots, negated)
}

/// Multiset difference `whole \ part`, if `part` is contained in `whole`.
/// Both slices must be sorted.
#[must_use]
pub fn divide_sorted(whole: &[LpVar], part: &[LpVar]) -> Option<Vec<LpVar>> {
    let mut rest = Vec::with_capacity(whole.len().saturating_sub(part.len()));
    let mut k = 0;
    for v in whole {
        if k < part.len() && part[k] == *v {
            k += 1;
        } else {
            if k < part.len() && part[k] < *v {
                return None;
            }
            rest.push(*v);
        }
    }
    (k == part.len()).then_some(rest)
}

/// All rooted monomials with the indices the lemma strategies consult.
#[derive(Debug, Clone, Default)]
pub struct RootedTable {
    rms: Vec<RootedMonomial>,
    keys: FxHashMap<Vec<LpVar>, usize>,
    mon_to_rooted: FxHashMap<usize, usize>,
    /// Root column to the rooted monomials containing it.
    var_map: FxHashMap<LpVar, Vec<usize>>,
    /// Per rooted monomial, the rooted monomials whose vars strictly contain its vars.
    proper_multiples: Vec<Vec<usize>>,
    to_refine: Vec<usize>,
}

impl RootedTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.rms.clear();
        self.keys.clear();
        self.mon_to_rooted.clear();
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.var_map.clear();
        self.proper_multiples.clear();
        self.to_refine.clear();
    }

    /// Attach monomial `mon` with rooted form `vars` and sign `negated`.
    pub fn register(&mut self, mon: usize, vars: Vec<LpVar>, negated: bool) {
        let iws = IndexWithSign {
            index: mon,
            negated,
        };
        let rm_index = match self.keys.get(&vars) {
            Some(&i) => {
                self.rms[i].mons.push(iws);
                i
            }
            None => {
                let i = self.rms.len();
                self.keys.insert(vars.clone(), i);
                self.rms.push(RootedMonomial {
                    vars,
                    orig: iws,
                    mons: vec![iws],
                });
                i
            }
        };
        self.mon_to_rooted.insert(mon, rm_index);
        self.invalidate();
    }

    /// Detach monomial `mon`. A rooted monomial losing its last contributor
    /// is removed.
    pub fn deregister(&mut self, mon: usize) {
        let Some(i) = self.mon_to_rooted.remove(&mon) else {
            return;
        };
        let rm = &mut self.rms[i];
        rm.mons.retain(|m| m.index != mon);
        if rm.mons.is_empty() {
            let removed = self.rms.swap_remove(i);
            self.keys.remove(&removed.vars);
            if i < self.rms.len() {
                self.keys.insert(self.rms[i].vars.clone(), i);
                for m in &self.rms[i].mons {
                    self.mon_to_rooted.insert(m.index, i);
                }
            }
        } else if rm.orig.index == mon {
            rm.orig = rm.mons[0];
        }
        self.invalidate();
    }

    /// Recompute every rooted form from scratch under `evars`, then
    /// rebuild the derived indices.
    pub fn rebuild(&mut self, monomials: &MonomialTable, evars: &Evars) {
        self.clear();
        for (i, m) in monomials.monomials().iter().enumerate() {
            let (vars, negated) = canonize(m.vars(), evars);
            self.register(i, vars, negated);
        }
        self.build_indices();
    }

    /// Fill `var_map` and `proper_multiples`.
    pub fn build_indices(&mut self) {
        self.var_map.clear();
        for (i, rm) in self.rms.iter().enumerate() {
            for (k, v) in rm.vars.iter().enumerate() {
                if k > 0 && rm.vars[k - 1] == *v {
                    continue;
                }
                self.var_map.entry(*v).or_default().push(i);
            }
        }
        self.proper_multiples = vec![Vec::new(); self.rms.len()];
        for (i, rm) in self.rms.iter().enumerate() {
            let Some(candidates) = rm.vars.first().and_then(|v| self.var_map.get(v)) else {
                continue;
            };
            for &j in candidates {
                let other = &self.rms[j];
                if other.vars.len() > rm.vars.len()
                    && divide_sorted(&other.vars, &rm.vars).is_some()
                {
                    self.proper_multiples[i].push(j);
                }
            }
        }
    }

    /// Mark the rooted monomials of the violated monomials for refinement.
    ///
    /// A marked rooted monomial takes its first violated contributor as its
    /// representative, so its value disagrees with the product of its roots.
    pub fn mark_to_refine(&mut self, violated: &[usize]) {
        self.to_refine.clear();
        for &mon in violated {
            let Some(&i) = self.mon_to_rooted.get(&mon) else {
                continue;
            };
            if self.to_refine.contains(&i) {
                continue;
            }
            let rm = &mut self.rms[i];
            if let Some(iws) = rm.mons.iter().find(|m| m.index == mon) {
                rm.orig = *iws;
            }
            self.to_refine.push(i);
        }
    }

    /// Number of rooted monomials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rms.len()
    }

    /// True when the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rms.is_empty()
    }

    /// Rooted monomial by index.
    #[must_use]
    pub fn get(&self, i: usize) -> &RootedMonomial {
        &self.rms[i]
    }

    /// All rooted monomials.
    #[must_use]
    pub fn rms(&self) -> &[RootedMonomial] {
        &self.rms
    }

    /// The rooted monomial over exactly these sorted roots.
    #[must_use]
    pub fn find(&self, vars: &[LpVar]) -> Option<usize> {
        self.keys.get(vars).copied()
    }

    /// Rooted monomial of `mon` and the sign relating them.
    #[must_use]
    pub fn rooted_of(&self, mon: usize) -> Option<IndexWithSign> {
        let i = *self.mon_to_rooted.get(&mon)?;
        let negated = self.rms[i].mons.iter().find(|m| m.index == mon)?.negated;
        Some(IndexWithSign { index: i, negated })
    }

    /// Rooted monomials containing root column `v`.
    #[must_use]
    pub fn containing_var(&self, v: LpVar) -> &[usize] {
        self.var_map.get(&v).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rooted monomials whose vars strictly contain those of `i`.
    #[must_use]
    pub fn proper_multiples(&self, i: usize) -> &[usize] {
        self.proper_multiples.get(i).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rooted monomials marked by the last [`Self::mark_to_refine`].
    #[must_use]
    pub fn to_refine(&self) -> &[usize] {
        &self.to_refine
    }

    /// The factor `whole / part`, when `part` divides rooted monomial `whole`
    /// and the quotient is a column or a known rooted monomial.
    #[must_use]
    pub fn divide(&self, whole: usize, part: &[LpVar]) -> Option<Factor> {
        let rest = divide_sorted(&self.rms[whole].vars, part)?;
        match rest.len() {
            0 => None,
            1 => Some(Factor::Var(rest[0])),
            _ => self.find(&rest).map(Factor::Rooted),
        }
    }

    /// Sorted root columns of a factor.
    #[must_use]
    pub fn factor_vars(&self, f: Factor) -> Vec<LpVar> {
        match f {
            Factor::Var(v) => vec![v],
            Factor::Rooted(i) => self.rms[i].vars.clone(),
        }
    }

    /// Consistency of keys and contributor maps.
    #[must_use]
    pub fn tables_are_ok(&self) -> bool {
        self.keys.len() == self.rms.len()
            && self.rms.iter().enumerate().all(|(i, rm)| {
                self.keys.get(&rm.vars) == Some(&i)
                    && !rm.mons.is_empty()
                    && rm.mons.contains(&rm.orig)
                    && rm
                        .mons
                        .iter()
                        .all(|m| self.mon_to_rooted.get(&m.index) == Some(&i))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use z4_core::ConstraintId;

    fn v(i: u32) -> LpVar {
        LpVar(i)
    }

    #[test]
    fn test_canonize_uses_roots_and_signs() {
        let mut e = Evars::new();
        e.merge_minus(v(0), v(3), vec![ConstraintId(1)]);
        let (vars, negated) = canonize(&[v(3), v(1)], &e);
        assert_eq!(vars, vec![v(0), v(1)]);
        assert!(negated);
        // Canonizing roots again changes nothing.
        let (again, negated_again) = canonize(&vars, &e);
        assert_eq!(again, vars);
        assert!(!negated_again);
    }

    #[test]
    fn test_divide_sorted() {
        let whole = [v(1), v(1), v(2), v(5)];
        assert_eq!(divide_sorted(&whole, &[v(1), v(5)]), Some(vec![v(1), v(2)]));
        assert_eq!(divide_sorted(&whole, &[v(3)]), None);
        assert_eq!(divide_sorted(&whole, &[v(1), v(1), v(1)]), None);
        assert_eq!(divide_sorted(&whole, &[]), Some(whole.to_vec()));
    }

    #[test]
    fn test_equivalent_monomials_share_rooted() {
        let mut e = Evars::new();
        e.merge_minus(v(0), v(3), vec![ConstraintId(1)]);
        let mut mons = MonomialTable::new();
        mons.add(v(10), &[v(0), v(1)]).unwrap();
        mons.add(v(11), &[v(3), v(1)]).unwrap();
        let mut t = RootedTable::new();
        t.rebuild(&mons, &e);
        assert_eq!(t.len(), 1);
        let a = t.rooted_of(0).unwrap();
        let b = t.rooted_of(1).unwrap();
        assert_eq!(a.index, b.index);
        assert!(!a.negated);
        assert!(b.negated);
        assert!(t.tables_are_ok());
    }

    #[test]
    fn test_indices_and_divide() {
        let e = Evars::new();
        let mut mons = MonomialTable::new();
        mons.add(v(10), &[v(0), v(1)]).unwrap();
        mons.add(v(11), &[v(0), v(1), v(2)]).unwrap();
        mons.add(v(12), &[v(2), v(3)]).unwrap();
        let mut t = RootedTable::new();
        t.rebuild(&mons, &e);
        let ab = t.find(&[v(0), v(1)]).unwrap();
        let abc = t.find(&[v(0), v(1), v(2)]).unwrap();
        assert_eq!(t.proper_multiples(ab), &[abc]);
        assert_eq!(t.containing_var(v(2)).len(), 2);
        assert_eq!(t.divide(abc, &[v(2)]), Some(Factor::Rooted(ab)));
        assert_eq!(t.divide(abc, &[v(0), v(1)]), Some(Factor::Var(v(2))));
        assert_eq!(t.divide(abc, &[v(0)]), None);
    }

    #[test]
    fn test_deregister_removes_empty_entry() {
        let e = Evars::new();
        let mut mons = MonomialTable::new();
        mons.add(v(10), &[v(0), v(1)]).unwrap();
        mons.add(v(11), &[v(1), v(2)]).unwrap();
        mons.add(v(12), &[v(2), v(3)]).unwrap();
        let mut t = RootedTable::new();
        t.rebuild(&mons, &e);
        t.deregister(0);
        assert_eq!(t.len(), 2);
        assert_eq!(t.find(&[v(0), v(1)]), None);
        assert_eq!(t.rooted_of(2).map(|r| t.get(r.index).vars().to_vec()), Some(vec![v(2), v(3)]));
        assert!(t.tables_are_ok());
    }

    #[test]
    fn test_mark_to_refine_repoints_orig() {
        let mut e = Evars::new();
        e.merge_plus(v(0), v(3), vec![ConstraintId(1)]);
        let mut mons = MonomialTable::new();
        mons.add(v(10), &[v(0), v(1)]).unwrap();
        mons.add(v(11), &[v(3), v(1)]).unwrap();
        let mut t = RootedTable::new();
        t.rebuild(&mons, &e);
        t.mark_to_refine(&[1]);
        assert_eq!(t.to_refine(), &[0]);
        assert_eq!(t.get(0).orig_index(), 1);
    }
}
