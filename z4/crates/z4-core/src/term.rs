//! Arithmetic vocabulary shared by the linear core and its theory plugins.
//!
//! Columns of the linear core are identified by [`LpVar`]. Linear
//! combinations over columns are [`LinearTerm`]s, and atoms compare a term
//! against a rational constant with a [`Comparator`].

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use std::fmt;

/// A column of the linear arithmetic core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LpVar(pub u32);

impl LpVar {
    /// Column index as `usize`, for table lookups.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for LpVar {
    fn from(index: usize) -> Self {
        LpVar(index as u32)
    }
}

impl fmt::Display for LpVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "j{}", self.0)
    }
}

/// Identifier of a constraint of the linear core.
///
/// Every bound carries the constraint that established it; explanations of
/// lemmas are sets of these identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstraintId(pub u32);

impl fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Relation between a linear term and its right-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    /// `<=`
    Le,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `>`
    Gt,
    /// `=`
    Eq,
    /// `!=`
    Ne,
}

impl Comparator {
    /// The comparator of the negated atom: `not (t <= c)` is `t > c`.
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Comparator::Le => Comparator::Gt,
            Comparator::Lt => Comparator::Ge,
            Comparator::Ge => Comparator::Lt,
            Comparator::Gt => Comparator::Le,
            Comparator::Eq => Comparator::Ne,
            Comparator::Ne => Comparator::Eq,
        }
    }

    /// Evaluate `lhs <cmp> rhs`.
    #[must_use]
    pub fn holds(self, lhs: &BigRational, rhs: &BigRational) -> bool {
        match self {
            Comparator::Le => lhs <= rhs,
            Comparator::Lt => lhs < rhs,
            Comparator::Ge => lhs >= rhs,
            Comparator::Gt => lhs > rhs,
            Comparator::Eq => lhs == rhs,
            Comparator::Ne => lhs != rhs,
        }
    }

    /// SMT-LIB style operator text.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Comparator::Le => "<=",
            Comparator::Lt => "<",
            Comparator::Ge => ">=",
            Comparator::Gt => ">",
            Comparator::Eq => "=",
            Comparator::Ne => "!=",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sparse linear combination `sum(coeff * var)`.
///
/// Coefficients are merged per column and zero coefficients are dropped,
/// so two terms denoting the same combination compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearTerm {
    coeffs: Vec<(LpVar, BigRational)>,
}

impl LinearTerm {
    /// Create an empty term.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a term from `(coefficient, column)` pairs.
    #[must_use]
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (BigRational, LpVar)>,
    {
        let mut term = Self::new();
        for (coeff, var) in pairs {
            term.add_coeff_var(coeff, var);
        }
        term
    }

    /// Shorthand for `1 * var`.
    #[must_use]
    pub fn var(var: LpVar) -> Self {
        let mut term = Self::new();
        term.add_coeff_var(BigRational::one(), var);
        term
    }

    /// Add `coeff * var`, merging with an existing entry for `var`.
    pub fn add_coeff_var(&mut self, coeff: BigRational, var: LpVar) {
        if coeff.is_zero() {
            return;
        }
        if let Some(pos) = self.coeffs.iter().position(|(v, _)| *v == var) {
            let merged = &self.coeffs[pos].1 + &coeff;
            if merged.is_zero() {
                self.coeffs.remove(pos);
            } else {
                self.coeffs[pos].1 = merged;
            }
        } else {
            self.coeffs.push((var, coeff));
        }
    }

    /// True when no column has a non-zero coefficient.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// Number of columns with a non-zero coefficient.
    #[must_use]
    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    /// Iterate over `(column, coefficient)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (LpVar, &BigRational)> + '_ {
        self.coeffs.iter().map(|(v, c)| (*v, c))
    }

    /// Coefficient of `var`, zero if absent.
    #[must_use]
    pub fn coeff(&self, var: LpVar) -> BigRational {
        self.coeffs
            .iter()
            .find(|(v, _)| *v == var)
            .map_or_else(BigRational::zero, |(_, c)| c.clone())
    }

    /// Evaluate the term under a column valuation.
    pub fn evaluate<F>(&self, mut value: F) -> BigRational
    where
        F: FnMut(LpVar) -> BigRational,
    {
        let mut sum = BigRational::zero();
        for (var, coeff) in &self.coeffs {
            sum += coeff * value(*var);
        }
        sum
    }

    /// Render the term using a column naming function.
    pub fn fmt_with<F>(&self, f: &mut fmt::Formatter<'_>, name: F) -> fmt::Result
    where
        F: Fn(LpVar) -> String,
    {
        if self.coeffs.is_empty() {
            return f.write_str("0");
        }
        for (i, (var, coeff)) in self.coeffs.iter().enumerate() {
            let negative = coeff.is_negative();
            if i == 0 {
                if negative {
                    f.write_str("-")?;
                }
            } else if negative {
                f.write_str(" - ")?;
            } else {
                f.write_str(" + ")?;
            }
            let magnitude = coeff.abs();
            if !magnitude.is_one() {
                write!(f, "{}*", magnitude)?;
            }
            f.write_str(&name(*var))?;
        }
        Ok(())
    }
}

impl fmt::Display for LinearTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_with(f, |v| v.to_string())
    }
}

/// Rational constant from an integer.
#[must_use]
pub fn rat(value: i64) -> BigRational {
    BigRational::from_integer(BigInt::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparator_negate_is_involution() {
        for cmp in [
            Comparator::Le,
            Comparator::Lt,
            Comparator::Ge,
            Comparator::Gt,
            Comparator::Eq,
            Comparator::Ne,
        ] {
            assert_eq!(cmp.negate().negate(), cmp);
        }
    }

    #[test]
    fn test_comparator_holds() {
        let two = rat(2);
        let three = rat(3);
        assert!(Comparator::Lt.holds(&two, &three));
        assert!(!Comparator::Gt.holds(&two, &three));
        assert!(Comparator::Ne.holds(&two, &three));
        assert!(Comparator::Le.holds(&two, &two));
        assert!(!Comparator::Lt.negate().holds(&two, &three));
    }

    #[test]
    fn test_linear_term_merges_and_drops_zero() {
        let x = LpVar(0);
        let y = LpVar(1);
        let mut t = LinearTerm::new();
        t.add_coeff_var(rat(2), x);
        t.add_coeff_var(rat(1), y);
        t.add_coeff_var(rat(-2), x);
        assert_eq!(t.len(), 1);
        assert_eq!(t.coeff(y), rat(1));
        assert!(t.coeff(x).is_zero());
    }

    #[test]
    fn test_linear_term_evaluate() {
        let x = LpVar(0);
        let y = LpVar(1);
        let t = LinearTerm::from_pairs([(rat(3), x), (rat(-1), y)]);
        let v = t.evaluate(|var| if var == x { rat(2) } else { rat(5) });
        assert_eq!(v, rat(1));
    }

    #[test]
    fn test_linear_term_display() {
        let t = LinearTerm::from_pairs([(rat(-1), LpVar(2)), (rat(3), LpVar(4))]);
        assert_eq!(t.to_string(), "-j2 + 3*j4");
        assert_eq!(LinearTerm::new().to_string(), "0");
    }
}
