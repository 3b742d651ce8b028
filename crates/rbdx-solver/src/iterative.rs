//! Shared configuration of iterative solvers.

use crate::error::Result;
use crate::solver::Solver;
use nalgebra::DVector;
use rbdx_model::{ModelError, SystemDescriptor};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Knobs shared by all iterative solvers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterativeSettings {
    /// Iteration cap
    pub max_iterations: usize,
    /// Stop once the error metric drops below this value; `0.0` always runs
    /// to `max_iterations`
    pub tolerance: f64,
    /// Diagonal preconditioning, honored only by solvers that implement it
    pub use_precond: bool,
    /// Seed the first iterate with the descriptor's current multipliers
    pub warm_start: bool,
}

impl Default for IterativeSettings {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 0.0,
            use_precond: true,
            warm_start: false,
        }
    }
}

/// Solvers that iterate towards a tolerance.
///
/// Setters only store values; they take effect on the next solve.
pub trait IterativeSolver: Solver {
    /// Stored settings.
    fn settings(&self) -> &IterativeSettings;

    /// Mutable stored settings.
    fn settings_mut(&mut self) -> &mut IterativeSettings;

    /// Number of iterations performed by the last solve.
    fn iterations(&self) -> usize;

    /// Error metric reached by the last solve.
    fn error(&self) -> f64;

    fn set_max_iterations(&mut self, max_iterations: usize) {
        self.settings_mut().max_iterations = max_iterations;
    }

    fn set_tolerance(&mut self, tolerance: f64) {
        self.settings_mut().tolerance = tolerance;
    }

    fn enable_diagonal_preconditioner(&mut self, enable: bool) {
        self.settings_mut().use_precond = enable;
    }

    fn enable_warm_start(&mut self, enable: bool) {
        self.settings_mut().warm_start = enable;
    }

    fn max_iterations(&self) -> usize {
        self.settings().max_iterations
    }

    fn tolerance(&self) -> f64 {
        self.settings().tolerance
    }

    fn diagonal_preconditioner(&self) -> bool {
        self.settings().use_precond
    }

    fn warm_start(&self) -> bool {
        self.settings().warm_start
    }
}

/// Residual `‖Z x − d‖` of a candidate solution against the assembled
/// system.
///
/// The matrix-free residual `‖SystemProduct(x) − d‖` is computed as well and
/// both are logged, which exposes inconsistencies between the two assembly
/// paths of a descriptor.
///
/// # Errors
/// `DimensionMismatch` if `x.len() != n`.
pub fn check_solution(sysd: &dyn SystemDescriptor, x: &DVector<f64>) -> Result<f64> {
    let n = sysd.num_constraints();
    if x.len() != n {
        return Err(ModelError::mismatch("check_solution", n, x.len()).into());
    }

    let (z, d) = sysd.build_system_matrix()?;
    let mut zx = DVector::zeros(n);
    for (i, row) in z.row_iter().enumerate() {
        zx[i] = row
            .col_indices()
            .iter()
            .zip(row.values())
            .map(|(&j, &v)| v * x[j])
            .sum();
    }
    let residual = (zx - &d).norm();

    let free = (sysd.system_product(x)? - &d).norm();
    debug!(
        assembled = residual,
        matrix_free = free,
        "solution residual ‖Zx - d‖"
    );

    Ok(residual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use rbdx_model::{BodyVariables, ConstraintSystem, LinearConstraint};

    #[test]
    fn test_default_settings() {
        let s = IterativeSettings::default();
        assert_eq!(s.max_iterations, 50);
        assert_eq!(s.tolerance, 0.0);
        assert!(s.use_precond);
        assert!(!s.warm_start);
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let s: IterativeSettings = serde_json::from_str(r#"{"tolerance": 1e-6}"#).unwrap();
        assert_eq!(s.tolerance, 1e-6);
        assert_eq!(s.max_iterations, 50);
    }

    #[test]
    fn test_check_solution() {
        let mut sys = ConstraintSystem::new();
        let h = sys.add_body(BodyVariables::point_mass(2.0, 1));
        sys.add_linear(
            LinearConstraint::bilateral(h, DMatrix::from_element(1, 1, 1.0), DVector::from_vec(vec![-4.0]))
                .unwrap(),
        )
        .unwrap();

        // Z = 0.5, d = 4: exact solution 8
        let exact = check_solution(&sys, &DVector::from_vec(vec![8.0])).unwrap();
        assert!(exact < 1e-12);
        let off = check_solution(&sys, &DVector::from_vec(vec![6.0])).unwrap();
        assert!((off - 1.0).abs() < 1e-12);

        assert!(check_solution(&sys, &DVector::zeros(2)).is_err());
    }
}
