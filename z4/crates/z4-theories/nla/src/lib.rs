//! Z4 NLA - Nonlinear arithmetic lemmas over a linear core
//!
//! Monomials `m = x1 * x2 * ... * xk` are registered against columns of a
//! linear solver. The linear core treats every product column as a free
//! variable; this crate checks its model against the product definitions and
//! answers with lemmas, disjunctions of linear atoms that the model violates
//! and that are valid consequences of the definitions.
//!
//! ## Algorithm Overview
//!
//! Each check:
//!
//! 1. Collects the monomials whose column value differs from the product of
//!    its factor values. Without any, the model is consistent.
//! 2. Merges columns that the bounds force to be equal or opposite (rows
//!    `x - y` or `x + y` fixed to zero) and canonizes every monomial to a
//!    sorted product of class representatives, its *rooted monomial*.
//! 3. Searches for lemmas in increasing cost:
//!    - level 0: sign, zero, neutral-element and proportion lemmas
//!    - level 1: order lemmas between products with a shared factor
//!    - level 2: monotonicity and tangent plane lemmas
//!
//! Every lemma carries an explanation, the set of bound constraints under
//! which it holds. Atoms refuted by existing bounds are dropped and their
//! witnesses added to the explanation, so a lemma may shrink to a conflict.
//!
//! ## Incrementality
//!
//! Registration follows the linear core's scopes: [`NlaSolver::push`] and
//! [`NlaSolver::pop`] undo monomial registrations, index updates and
//! equivalences together.
//!
//! ## Example
//!
//! ```
//! use z4_core::{rat, FixedModel};
//! use z4_nla::{NlaCheckResult, NlaSolver};
//!
//! let mut lar = FixedModel::default();
//! let x = lar.new_var(rat(2));
//! let y = lar.new_var(rat(3));
//! let m = lar.new_var(rat(5));
//!
//! let mut nla = NlaSolver::new();
//! nla.add(m, &[x, y]).unwrap();
//!
//! let mut lemmas = Vec::new();
//! assert_eq!(nla.check(&lar, &mut lemmas), NlaCheckResult::Refuted);
//! assert!(lemmas.iter().all(|l| !l.holds(&lar)));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)]

pub mod config;
pub mod error;
pub mod evars;
pub mod factorization;
pub mod lemma;
pub mod monomial;
pub mod rooted;
pub mod solver;
pub mod stats;

mod basics;
mod monotone;
mod order;
mod tangent;

pub use config::NlaConfig;
pub use error::{NlaError, NlaResult};
pub use evars::{Evars, SignedVar};
pub use factorization::{Factor, Factorization, Factorizations};
pub use lemma::{Explanation, Ineq, Lemma, LemmaBuilder, LemmaKind};
pub use monomial::{Monomial, MonomialTable};
pub use rooted::{RootedMonomial, RootedTable};
pub use solver::{NlaCheckResult, NlaSolver};
pub use stats::NlaStats;
