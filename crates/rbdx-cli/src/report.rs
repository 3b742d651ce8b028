//! Solve a scene and summarize the outcome.

use crate::error::Result;
use crate::scene::Scene;
use chrono::Utc;
use rbdx_model::SystemDescriptor;
use rbdx_solver::{create_solver, IterativeSolver, Solver};
use serde::Serialize;
use tracing::info;

/// Outcome of one solve, printed as JSON by the runner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolveReport {
    pub solver: String,
    pub iterations: usize,
    /// Final error metric; `null` in JSON when no iteration ran
    pub residual: f64,
    /// Tolerance reached, or nothing to solve
    pub converged: bool,
    pub multipliers: Vec<f64>,
    /// Body states after write-back, in scene order
    pub states: Vec<Vec<f64>>,
    /// Constraint velocity `C v + b` after write-back
    pub violation: Vec<f64>,
    /// RFC 3339 timestamp
    pub solved_at: String,
}

/// Build, solve and report on a scene.
///
/// # Errors
/// Scene construction errors and solver errors.
pub fn solve_scene(scene: &Scene) -> Result<SolveReport> {
    let (mut sys, handles) = scene.build()?;
    let mut solver = create_solver(&scene.solver)?;

    info!(
        solver = %solver.solver_type(),
        bodies = handles.len(),
        constraints = sys.num_constraints(),
        "solving scene"
    );
    let residual = solver.solve(&mut sys)?;

    let iterations = solver.as_iterative().map_or(0, |s| s.iterations());
    let converged = sys.num_constraints() == 0 || residual < scene.solver.iterative.tolerance;

    let mut states = Vec::with_capacity(handles.len());
    for &h in &handles {
        states.push(sys.state(h)?.as_slice().to_vec());
    }

    Ok(SolveReport {
        solver: solver.type_as_str().to_string(),
        iterations,
        residual,
        converged,
        multipliers: sys.multipliers().as_slice().to_vec(),
        states,
        violation: sys.constraint_violation().as_slice().to_vec(),
        solved_at: Utc::now().to_rfc3339(),
    })
}
