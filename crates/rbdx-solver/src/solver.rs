//! Solver trait and solver type catalogue.
//!
//! Every solver consumes a [`SystemDescriptor`] and writes its result back
//! through [`SystemDescriptor::set_unknowns`]. Only the descriptor's variable
//! states and multipliers are mutated; membership never changes.

use crate::error::Result;
use crate::iterative::IterativeSolver;
use crate::iterative_vi::IterativeSolverVI;
use rbdx_model::SystemDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Available solver algorithms.
///
/// Only [`SolverType::Apgd`] has an implementation; the other variants name
/// extension points and are rejected by the factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolverType {
    /// Projected successive over-relaxation
    Psor,
    /// Projected symmetric SOR
    Pssor,
    /// Projected Jacobi
    Pjacobi,
    /// Projected MINRES
    Pminres,
    /// Projected Barzilai-Borwein
    #[serde(rename = "BARZILAIBORWEIN")]
    BarzilaiBorwein,
    /// Accelerated projected gradient descent
    Apgd,
    /// Alternating direction method of multipliers
    Admm,
    /// Sparse LU factorization
    SparseLu,
    /// Sparse QR factorization
    SparseQr,
    /// Intel MKL PARDISO
    PardisoMkl,
    /// MUMPS multifrontal direct solver
    Mumps,
    /// Generalized minimal residual
    Gmres,
    /// Minimal residual
    Minres,
    /// Biconjugate gradient stabilized
    Bicgstab,
    /// User-provided solver
    Custom,
}

impl SolverType {
    /// Canonical upper-case name of this solver type.
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverType::Psor => "PSOR",
            SolverType::Pssor => "PSSOR",
            SolverType::Pjacobi => "PJACOBI",
            SolverType::Pminres => "PMINRES",
            SolverType::BarzilaiBorwein => "BARZILAIBORWEIN",
            SolverType::Apgd => "APGD",
            SolverType::Admm => "ADMM",
            SolverType::SparseLu => "SPARSE_LU",
            SolverType::SparseQr => "SPARSE_QR",
            SolverType::PardisoMkl => "PARDISO_MKL",
            SolverType::Mumps => "MUMPS",
            SolverType::Gmres => "GMRES",
            SolverType::Minres => "MINRES",
            SolverType::Bicgstab => "BICGSTAB",
            SolverType::Custom => "CUSTOM",
        }
    }

    /// Iterative solvers for variational inequalities.
    pub fn is_vi(&self) -> bool {
        matches!(
            self,
            SolverType::Psor
                | SolverType::Pssor
                | SolverType::Pjacobi
                | SolverType::Pminres
                | SolverType::BarzilaiBorwein
                | SolverType::Apgd
                | SolverType::Admm
        )
    }

    /// Direct factorization solvers.
    pub fn is_direct(&self) -> bool {
        matches!(
            self,
            SolverType::SparseLu | SolverType::SparseQr | SolverType::PardisoMkl | SolverType::Mumps
        )
    }
}

impl Default for SolverType {
    fn default() -> Self {
        SolverType::Apgd
    }
}

impl fmt::Display for SolverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common interface of all solvers.
///
/// A solver instance owns mutable scratch buffers and must not be shared
/// between concurrent solves; give each thread its own instance.
pub trait Solver: Send {
    /// Algorithm implemented by this solver.
    fn solver_type(&self) -> SolverType;

    /// Name of [`solver_type`](Solver::solver_type).
    fn type_as_str(&self) -> &'static str {
        self.solver_type().as_str()
    }

    /// True for solvers that iterate towards a tolerance.
    fn is_iterative(&self) -> bool;

    /// True for solvers based on a factorization.
    fn is_direct(&self) -> bool;

    /// Iterative view of this solver, if it is one.
    fn as_iterative(&self) -> Option<&dyn IterativeSolver> {
        None
    }

    /// Mutable iterative view of this solver, if it is one.
    fn as_iterative_mut(&mut self) -> Option<&mut dyn IterativeSolver> {
        None
    }

    /// VI view of this solver, if it is one.
    fn as_vi(&self) -> Option<&dyn IterativeSolverVI> {
        None
    }

    /// Mutable VI view of this solver, if it is one.
    fn as_vi_mut(&mut self) -> Option<&mut dyn IterativeSolverVI> {
        None
    }

    /// Whether the solve phase needs matrix-vector products with the
    /// system matrix.
    fn solve_requires_matrix(&self) -> bool;

    /// Optional pre-pass run once per matrix change (factorization for
    /// direct solvers).
    ///
    /// # Returns
    /// `true` on success.
    fn setup(&mut self, _sysd: &mut dyn SystemDescriptor) -> Result<bool> {
        Ok(true)
    }

    /// Solve the problem held by `sysd` and write the result back into it.
    ///
    /// # Returns
    /// The final error metric of the solve. Running out of iterations is
    /// not an error.
    ///
    /// # Errors
    /// Propagates descriptor errors (dimension mismatches).
    fn solve(&mut self, sysd: &mut dyn SystemDescriptor) -> Result<f64>;

    /// Enable per-iteration progress output.
    fn set_verbose(&mut self, verbose: bool);

    /// Whether per-iteration progress output is enabled.
    fn verbose(&self) -> bool;
}
