//! System descriptor: the global view of all variables and constraints.
//!
//! The descriptor owns the registered [`Variables`] and [`Constraint`]
//! objects in two arenas; constraints refer to variables through
//! [`VariablesHandle`]s, and callers get handles back to read results after
//! a solve. Registration order fixes the global layout:
//!
//! - variables order defines the DOF offsets of the stacked state vector
//! - constraints order defines the indexing of the multiplier vector, of
//!   total length `n = Σ constraint_dim`
//!
//! Membership cannot change while a solver holds the descriptor, since
//! solving borrows it mutably for the whole call.

use crate::constraint::{Constraint, ConstraintHandle};
use crate::error::Result;
use crate::variables::{Variables, VariablesHandle};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

/// Assembly and write-back interface consumed by the solvers.
///
/// All methods agree on `n` and on the ordering of the multiplier vector.
/// `n` is recomputed from the current constraint set on every call.
pub trait SystemDescriptor {
    /// Register a DOF block (append-only).
    fn add_variables(&mut self, variables: Box<dyn Variables>) -> VariablesHandle;

    /// Register a constraint (append-only).
    ///
    /// # Errors
    /// Fails if the constraint references unknown handles or its Jacobian
    /// blocks do not match the referenced DOF counts.
    fn add_constraint(&mut self, constraint: Box<dyn Constraint>) -> Result<ConstraintHandle>;

    /// All registered DOF blocks, in registration order.
    fn variables(&self) -> &[Box<dyn Variables>];

    /// All registered constraints, in registration order.
    fn constraints(&self) -> &[Box<dyn Constraint>];

    /// Problem size `n = Σ constraint_dim`.
    fn num_constraints(&self) -> usize {
        self.constraints().iter().map(|c| c.constraint_dim()).sum()
    }

    /// Total number of DOFs over all variables.
    fn num_dofs(&self) -> usize {
        self.variables().iter().map(|v| v.dof()).sum()
    }

    /// Assemble the `n × n` system matrix `Z` and the right-hand side `d`,
    /// such that `Z x = d` at the solution of a purely bilateral problem.
    fn build_system_matrix(&self) -> Result<(CsrMatrix<f64>, DVector<f64>)>;

    /// Right-hand side `d` alone.
    fn build_rhs(&self) -> Result<DVector<f64>>;

    /// Matrix-free product `y = Z x`.
    ///
    /// # Errors
    /// `DimensionMismatch` if `x.len() != n`.
    fn system_product(&self, x: &DVector<f64>) -> Result<DVector<f64>>;

    /// Bias-only component of `d`.
    fn build_di_vector(&self) -> DVector<f64>;

    /// Current multiplier values, used as the warm-start guess.
    fn multipliers(&self) -> DVector<f64>;

    /// Write a solution vector of length `n` back into the constraints and
    /// variables.
    ///
    /// # Errors
    /// `DimensionMismatch` if `x.len() != n`; nothing is written in that case.
    fn set_unknowns(&mut self, x: &DVector<f64>) -> Result<()>;
}

/// Start offset of each constraint's block inside the multiplier vector.
pub fn constraint_offsets(constraints: &[Box<dyn Constraint>]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(constraints.len());
    let mut offset = 0;
    for c in constraints {
        offsets.push(offset);
        offset += c.constraint_dim();
    }
    offsets
}

/// Start offset of each DOF block inside the stacked state vector.
pub fn dof_offsets(variables: &[Box<dyn Variables>]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(variables.len());
    let mut offset = 0;
    for v in variables {
        offsets.push(offset);
        offset += v.dof();
    }
    offsets
}
