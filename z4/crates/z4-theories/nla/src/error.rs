//! Error types for monomial registration

use thiserror::Error;
use z4_core::LpVar;

/// Errors raised when registering a monomial definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NlaError {
    /// The factor multiset is already defined by another column.
    #[error("monomial over the same factors is already defined by {existing}")]
    DuplicateMonomial {
        /// Column of the existing definition.
        existing: LpVar,
    },

    /// The product column occurs among its own factors.
    #[error("product column {var} occurs among its own factors")]
    ProductVarInFactors {
        /// The offending column.
        var: LpVar,
    },

    /// A monomial needs at least one factor.
    #[error("monomial {var} has no factors")]
    EmptyProduct {
        /// The product column.
        var: LpVar,
    },

    /// The product column already defines another monomial.
    #[error("column {var} already defines monomial #{existing}")]
    ProductVarAlreadyDefined {
        /// The product column.
        var: LpVar,
        /// Index of the existing monomial.
        existing: usize,
    },
}

/// Result type for NLA operations
pub type NlaResult<T> = Result<T, NlaError>;
