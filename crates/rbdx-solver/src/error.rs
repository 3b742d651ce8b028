//! Error types for rbdx-solver

use crate::solver::SolverType;
use rbdx_model::ModelError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SolverError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Unsupported solver type: {0}")]
    Unsupported(SolverType),
}
