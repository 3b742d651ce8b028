//! Scene loading and solving for the `rbdx-cli` runner.

pub mod error;
pub mod report;
pub mod scene;

pub use error::{CliError, Result};
pub use report::{solve_scene, SolveReport};
pub use scene::{BodySpec, ConstraintSpec, JacobianBlockSpec, Scene};
