//! Data model for multibody constraint problems.
//!
//! This crate holds everything a solver needs to see of a mechanical system
//! at one time step:
//!
//! - [`Variables`]: DOF blocks with an inverse mass operator
//! - [`Constraint`]: Jacobian rows, bias and a feasible set for the multipliers
//! - [`SystemDescriptor`]: the global assembly and write-back interface
//! - [`ConstraintSystem`]: the arena-backed descriptor used in practice
//!
//! The solvers themselves live in `rbdx-solver`.

pub mod constraint;
pub mod descriptor;
pub mod error;
pub mod system;
pub mod variables;

pub use constraint::{Constraint, ConstraintHandle, FeasibleSet, LinearConstraint};
pub use descriptor::{constraint_offsets, dof_offsets, SystemDescriptor};
pub use error::{ModelError, Result};
pub use system::ConstraintSystem;
pub use variables::{BodyVariables, Variables, VariablesHandle};
