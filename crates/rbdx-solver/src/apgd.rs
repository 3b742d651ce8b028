//! Accelerated Projected Gradient Descent (APGD).
//!
//! Solves the cone complementarity problem
//!
//! ```text
//! find γ ∈ K  such that  (N γ + r)ᵀ (γ' − γ) ≥ 0  for all γ' ∈ K
//! ```
//!
//! with `N = C M⁻¹ Cᵀ` applied matrix-free through
//! [`SystemDescriptor::system_product`], `r = −d` from
//! [`SystemDescriptor::build_rhs`], and `K` the product of the constraints'
//! feasible sets. This is the first-order optimality condition of
//! `min ½ γᵀNγ + rᵀγ` over `K`, which APGD minimizes with Nesterov
//! momentum and a backtracked Lipschitz estimate.
//!
//! The objective is not monotone along the accelerated iterates, so the
//! solver keeps the iterate with the lowest residual and writes that one
//! back.

use crate::error::Result;
use crate::iterative::{IterativeSettings, IterativeSolver};
use crate::iterative_vi::{IterativeSolverVI, ViSettings, ViolationHistory};
use crate::solver::{Solver, SolverType};
use nalgebra::DVector;
use rayon::prelude::*;
use rbdx_model::{Constraint, SystemDescriptor};
use tracing::{debug, info, trace, warn};

/// Cap on Lipschitz doublings within one iteration.
pub const MAX_BACKTRACKS: usize = 50;

/// APGD solver state. Buffers are resized to the descriptor's `n` at the
/// start of every solve.
#[derive(Debug, Clone)]
pub struct SolverApgd {
    settings: IterativeSettings,
    vi: ViSettings,
    history: ViolationHistory,
    verbose: bool,

    iterations: usize,
    residual: f64,

    gamma: DVector<f64>,
    gamma_new: DVector<f64>,
    gamma_hat: DVector<f64>,
    y: DVector<f64>,
    y_new: DVector<f64>,
    g: DVector<f64>,
    r: DVector<f64>,
    tmp: DVector<f64>,
}

impl Default for SolverApgd {
    fn default() -> Self {
        Self {
            settings: IterativeSettings::default(),
            vi: ViSettings::default(),
            history: ViolationHistory::default(),
            verbose: false,
            iterations: 0,
            residual: 0.0,
            gamma: DVector::zeros(0),
            gamma_new: DVector::zeros(0),
            gamma_hat: DVector::zeros(0),
            y: DVector::zeros(0),
            y_new: DVector::zeros(0),
            g: DVector::zeros(0),
            r: DVector::zeros(0),
            tmp: DVector::zeros(0),
        }
    }
}

impl SolverApgd {
    pub fn new() -> Self {
        Self::default()
    }

    /// Solver with the given iteration cap and tolerance.
    pub fn with_limits(max_iterations: usize, tolerance: f64) -> Self {
        let mut solver = Self::default();
        solver.settings.max_iterations = max_iterations;
        solver.settings.tolerance = tolerance;
        solver
    }

    /// Schur right-hand side `r` of the last solve.
    pub fn dump_rhs(&self) -> Vec<f64> {
        self.r.as_slice().to_vec()
    }

    /// Multipliers written back by the last solve.
    pub fn dump_lambda(&self) -> Vec<f64> {
        self.gamma_hat.as_slice().to_vec()
    }

    fn resize(&mut self, n: usize) {
        for buffer in [
            &mut self.gamma,
            &mut self.gamma_new,
            &mut self.gamma_hat,
            &mut self.y,
            &mut self.y_new,
            &mut self.g,
            &mut self.r,
            &mut self.tmp,
        ] {
            *buffer = DVector::zeros(n);
        }
    }

    /// Zero, or the descriptor's multipliers when warm starting.
    fn initial_guess(&mut self, sysd: &dyn SystemDescriptor, n: usize) {
        if !self.settings.warm_start {
            self.gamma.fill(0.0);
            return;
        }

        let guess = sysd.multipliers();
        if guess.len() == n {
            self.gamma.copy_from(&guess);
        } else {
            warn!(
                expected = n,
                found = guess.len(),
                "warm start multipliers have the wrong length, starting from zero"
            );
            self.gamma.fill(0.0);
        }
    }

    fn log_iteration(&self, iter: usize, residual: f64, lipschitz: f64) {
        if self.verbose {
            info!(iter, residual, lipschitz, "APGD iteration");
        } else {
            trace!(iter, residual, lipschitz, "APGD iteration");
        }
    }
}

/// `½ xᵀNx + rᵀx` given `Nx`.
fn objective(r: &DVector<f64>, x: &DVector<f64>, nx: &DVector<f64>) -> f64 {
    0.5 * x.dot(nx) + r.dot(x)
}

/// Project every constraint's sub-block of `x` onto its own feasible set.
fn project_blocks(constraints: &[Box<dyn Constraint>], x: &mut DVector<f64>) {
    let mut rest = x.as_mut_slice();
    let mut blocks = Vec::with_capacity(constraints.len());
    for c in constraints {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(c.constraint_dim());
        blocks.push(head);
        rest = tail;
    }

    blocks
        .into_par_iter()
        .zip(constraints.par_iter())
        .for_each(|(block, c)| c.project(block));
}

impl Solver for SolverApgd {
    fn solver_type(&self) -> SolverType {
        SolverType::Apgd
    }

    fn is_iterative(&self) -> bool {
        true
    }

    fn is_direct(&self) -> bool {
        false
    }

    fn as_iterative(&self) -> Option<&dyn IterativeSolver> {
        Some(self)
    }

    fn as_iterative_mut(&mut self) -> Option<&mut dyn IterativeSolver> {
        Some(self)
    }

    fn as_vi(&self) -> Option<&dyn IterativeSolverVI> {
        Some(self)
    }

    fn as_vi_mut(&mut self) -> Option<&mut dyn IterativeSolverVI> {
        Some(self)
    }

    fn solve_requires_matrix(&self) -> bool {
        true
    }

    fn solve(&mut self, sysd: &mut dyn SystemDescriptor) -> Result<f64> {
        let n = sysd.num_constraints();
        let max_iterations = self.settings.max_iterations;
        let tolerance = self.settings.tolerance;

        self.history.rearm(max_iterations);
        self.iterations = 0;
        self.resize(n);

        if n == 0 {
            self.residual = 0.0;
            debug!("APGD: no constraints, nothing to solve");
            return Ok(0.0);
        }

        self.r = -sysd.build_rhs()?;
        self.initial_guess(sysd, n);
        self.y.copy_from(&self.gamma);
        self.gamma_hat.copy_from(&self.gamma);

        let delta = 1.0 / (n * n) as f64;
        let mut lipschitz = 1.0;
        let mut theta = 1.0_f64;
        self.residual = f64::INFINITY;

        for iter in 0..max_iterations {
            // Gradient at the search point
            let ny = sysd.system_product(&self.y)?;
            self.g = &ny + &self.r;
            let f_y = objective(&self.r, &self.y, &ny);

            // Projected step, backtracking until sufficient decrease
            let mut backtracks = 0;
            let n_gamma_new = loop {
                let t = 1.0 / lipschitz;
                self.gamma_new = &self.y - &self.g * t;
                project_blocks(sysd.constraints(), &mut self.gamma_new);

                let ngn = sysd.system_product(&self.gamma_new)?;
                let step = &self.gamma_new - &self.y;
                let bound = f_y + self.g.dot(&step) + 0.5 * lipschitz * step.norm_squared();
                if objective(&self.r, &self.gamma_new, &ngn) <= bound
                    || backtracks == MAX_BACKTRACKS
                {
                    break ngn;
                }
                lipschitz *= 2.0;
                backtracks += 1;
            };

            // Nesterov momentum
            let theta_new = ((theta * theta + 4.0).sqrt() - theta) / 2.0;
            let beta = theta * (1.0 - theta) / (theta * theta + theta_new);
            self.y_new = &self.gamma_new + (&self.gamma_new - &self.gamma) * beta;

            // Projected-gradient residual at gamma_new
            self.tmp = &self.gamma_new - (n_gamma_new + &self.r) * delta;
            project_blocks(sysd.constraints(), &mut self.tmp);
            let res = (&self.gamma_new - &self.tmp).norm() / delta;

            if res < self.residual {
                self.residual = res;
                self.gamma_hat.copy_from(&self.gamma_new);
            }

            let dlambda = (&self.gamma_new - &self.gamma).norm();
            self.at_iteration_end(res, dlambda, iter);
            self.iterations = iter + 1;
            self.log_iteration(iter, res, lipschitz);

            if res < tolerance {
                break;
            }

            std::mem::swap(&mut self.gamma, &mut self.gamma_new);
            std::mem::swap(&mut self.y, &mut self.y_new);
            theta = theta_new;
            lipschitz *= 0.9;
        }

        sysd.set_unknowns(&self.gamma_hat)?;

        debug!(
            n,
            iterations = self.iterations,
            residual = self.residual,
            "APGD solve finished"
        );
        Ok(self.residual)
    }

    fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    fn verbose(&self) -> bool {
        self.verbose
    }
}

impl IterativeSolver for SolverApgd {
    fn settings(&self) -> &IterativeSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut IterativeSettings {
        &mut self.settings
    }

    fn iterations(&self) -> usize {
        self.iterations
    }

    fn error(&self) -> f64 {
        self.residual
    }
}

impl IterativeSolverVI for SolverApgd {
    fn vi_settings(&self) -> &ViSettings {
        &self.vi
    }

    fn vi_settings_mut(&mut self) -> &mut ViSettings {
        &mut self.vi
    }

    fn history(&self) -> &ViolationHistory {
        &self.history
    }

    fn history_mut(&mut self) -> &mut ViolationHistory {
        &mut self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use rbdx_model::{BodyVariables, ConstraintSystem, FeasibleSet, LinearConstraint};

    fn boxed(set: FeasibleSet, dim: usize) -> Box<dyn Constraint> {
        // Handle validity is irrelevant to projection
        let h = ConstraintSystem::new().add_body(BodyVariables::fixed(dim));
        Box::new(
            LinearConstraint::new(vec![h], vec![DMatrix::zeros(dim, dim)], DVector::zeros(dim), set)
                .unwrap(),
        )
    }

    #[test]
    fn test_project_blocks_uses_each_constraint_set() {
        let constraints = vec![
            boxed(FeasibleSet::Bilateral, 1),
            boxed(FeasibleSet::Unilateral, 2),
            boxed(FeasibleSet::FrictionCone { mu: 0.5 }, 3),
        ];
        let mut x = DVector::from_vec(vec![-1.0, -2.0, 3.0, -10.0, 1.0, 0.0]);
        project_blocks(&constraints, &mut x);
        assert_eq!(x.as_slice(), &[-1.0, 0.0, 3.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_objective() {
        let r = DVector::from_vec(vec![-4.0]);
        let x = DVector::from_vec(vec![8.0]);
        let nx = DVector::from_vec(vec![4.0]);
        assert!((objective(&r, &x, &nx) + 16.0).abs() < 1e-12);
    }

    #[test]
    fn test_defaults_and_setters() {
        let mut s = SolverApgd::new();
        assert_eq!(s.max_iterations(), 50);
        assert_eq!(s.tolerance(), 0.0);
        assert!(s.diagonal_preconditioner());
        assert!(!s.warm_start());
        assert!(s.solve_requires_matrix());
        assert!(s.is_iterative() && !s.is_direct());
        assert_eq!(s.type_as_str(), "APGD");

        s.set_omega(-1.0);
        s.set_sharpness_lambda(0.0);
        assert_eq!(s.omega(), 1.0);
        assert_eq!(s.sharpness_lambda(), 1.0);
        s.set_omega(0.8);
        assert_eq!(s.omega(), 0.8);
    }
}
