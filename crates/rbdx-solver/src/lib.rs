//! Iterative solvers for multibody constraint problems.
//!
//! The solver layer is a small trait stack over a [`SystemDescriptor`]:
//!
//! - [`Solver`]: category, verbosity and `solve`
//! - [`IterativeSolver`]: iteration cap, tolerance, warm start
//! - [`IterativeSolverVI`]: relaxation factors and violation histories
//!
//! [`SolverApgd`] is the concrete algorithm; [`create_solver`] builds one
//! from a serializable [`SolverConfig`].
//!
//! # Example
//! ```no_run
//! use nalgebra::{DMatrix, DVector};
//! use rbdx_model::{BodyVariables, ConstraintSystem, LinearConstraint};
//! use rbdx_solver::{create_solver, SolverConfig};
//!
//! let mut sys = ConstraintSystem::new();
//! let body = sys.add_body(BodyVariables::point_mass(2.0, 1));
//! sys.add_linear(
//!     LinearConstraint::bilateral(body, DMatrix::from_element(1, 1, 1.0), DVector::from_vec(vec![-4.0]))
//!         .unwrap(),
//! )
//! .unwrap();
//!
//! let mut solver = create_solver(&SolverConfig::apgd_with(100, 1e-6)).unwrap();
//! let residual = solver.solve(&mut sys).unwrap();
//! assert!(residual < 1e-6);
//! ```
//!
//! [`SystemDescriptor`]: rbdx_model::SystemDescriptor

pub mod apgd;
pub mod config;
pub mod error;
pub mod iterative;
pub mod iterative_vi;
pub mod logger;
pub mod solver;

pub use apgd::SolverApgd;
pub use config::{create_solver, SolverConfig};
pub use error::{Result, SolverError};
pub use iterative::{check_solution, IterativeSettings, IterativeSolver};
pub use iterative_vi::{IterativeSolverVI, ViSettings, ViolationHistory};
pub use logger::{init_logger, init_logger_with_level};
pub use solver::{Solver, SolverType};
