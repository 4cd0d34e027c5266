//! Z4 Core - Common types and traits for Z4 arithmetic theory plugins
//!
//! This crate provides the foundational types shared by the linear core and
//! the plugins layered on top of it:
//! - Arithmetic vocabulary (columns, linear terms, comparators)
//! - The linear-core interface consumed by theory plugins
//! - An in-memory linear core with an explicit model

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod model;
pub mod term;
pub mod theory;

pub use model::FixedModel;
pub use term::{rat, Comparator, ConstraintId, LinearTerm, LpVar};
pub use theory::{Bound, LinearSolver, LpStatus};
