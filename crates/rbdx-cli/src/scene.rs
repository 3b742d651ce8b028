//! JSON scene description.
//!
//! ```json
//! {
//!   "bodies": [{ "masses": [2.0], "force": [0.0] }],
//!   "constraints": [{
//!     "set": { "kind": "bilateral" },
//!     "blocks": [{ "body": 0, "rows": [[1.0]] }],
//!     "bias": [-4.0]
//!   }],
//!   "solver": { "iterative": { "max_iterations": 100, "tolerance": 1e-6 } }
//! }
//! ```
//!
//! Bodies are referenced by their position in `bodies`. Every Jacobian block
//! is given row-major, one inner array per constraint row.

use crate::error::{CliError, Result};
use nalgebra::{DMatrix, DVector};
use rbdx_model::{BodyVariables, ConstraintSystem, FeasibleSet, LinearConstraint, VariablesHandle};
use rbdx_solver::SolverConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A DOF block with a diagonal mass matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodySpec {
    pub masses: Vec<f64>,
    #[serde(default)]
    pub force: Option<Vec<f64>>,
    #[serde(default)]
    pub state: Option<Vec<f64>>,
}

/// Jacobian block acting on one body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JacobianBlockSpec {
    pub body: usize,
    pub rows: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSpec {
    pub set: FeasibleSet,
    pub blocks: Vec<JacobianBlockSpec>,
    pub bias: Vec<f64>,
}

/// Bodies, constraints and solver settings of one solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub bodies: Vec<BodySpec>,
    #[serde(default)]
    pub constraints: Vec<ConstraintSpec>,
    #[serde(default)]
    pub solver: SolverConfig,
}

impl Scene {
    /// Load a scene from a JSON file.
    ///
    /// # Errors
    /// I/O errors and malformed JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Build the constraint system described by this scene.
    ///
    /// # Returns
    /// The system and the handles of the bodies, in scene order.
    ///
    /// # Errors
    /// - `Scene` for ragged Jacobian rows
    /// - `Model` for unknown bodies or mismatched dimensions
    pub fn build(&self) -> Result<(ConstraintSystem, Vec<VariablesHandle>)> {
        let mut sys = ConstraintSystem::new();

        let mut handles = Vec::with_capacity(self.bodies.len());
        for body in &self.bodies {
            let mut variables = BodyVariables::new(DVector::from_vec(body.masses.clone()));
            if let Some(force) = &body.force {
                variables = variables.with_force(DVector::from_vec(force.clone()))?;
            }
            if let Some(state) = &body.state {
                variables = variables.with_state(DVector::from_vec(state.clone()))?;
            }
            handles.push(sys.add_body(variables));
        }

        for (index, spec) in self.constraints.iter().enumerate() {
            let mut variables = Vec::with_capacity(spec.blocks.len());
            let mut jacobian = Vec::with_capacity(spec.blocks.len());
            for block in &spec.blocks {
                let handle = handles
                    .get(block.body)
                    .copied()
                    .ok_or(rbdx_model::ModelError::UnknownVariables(block.body))?;
                variables.push(handle);
                jacobian.push(rows_to_matrix(&block.rows).map_err(|msg| {
                    CliError::Scene(format!("constraint {index}: {msg}"))
                })?);
            }

            let constraint = LinearConstraint::new(
                variables,
                jacobian,
                DVector::from_vec(spec.bias.clone()),
                spec.set,
            )?;
            sys.add_linear(constraint)?;
        }

        Ok((sys, handles))
    }
}

/// Row-major nested arrays to a matrix; all rows must have equal length.
fn rows_to_matrix(rows: &[Vec<f64>]) -> std::result::Result<DMatrix<f64>, String> {
    let ncols = rows.first().map_or(0, |r| r.len());
    if let Some(bad) = rows.iter().position(|r| r.len() != ncols) {
        return Err(format!(
            "jacobian row {bad} has {} entries, expected {ncols}",
            rows[bad].len()
        ));
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Ok(DMatrix::from_row_slice(rows.len(), ncols, &flat))
}
