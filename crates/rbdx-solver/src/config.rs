//! Solver configuration and factory.
//!
//! A [`SolverConfig`] bundles the solver type with the iterative and VI
//! knobs. It deserializes with defaults for every missing field, so a
//! scene file may give only what it wants to change.

use crate::apgd::SolverApgd;
use crate::error::{Result, SolverError};
use crate::iterative::{IterativeSettings, IterativeSolver};
use crate::iterative_vi::{IterativeSolverVI, ViSettings};
use crate::solver::{Solver, SolverType};
use serde::{Deserialize, Serialize};

/// Complete solver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Algorithm
    pub solver_type: SolverType,
    /// Iteration cap, tolerance, preconditioning and warm start
    pub iterative: IterativeSettings,
    /// Relaxation factors
    pub vi: ViSettings,
    /// Record per-iteration violation and multiplier change
    pub record_violation: bool,
    /// Per-iteration progress at info level
    pub verbose: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            solver_type: SolverType::Apgd,
            iterative: IterativeSettings::default(),
            vi: ViSettings::default(),
            record_violation: false,
            verbose: false,
        }
    }
}

impl SolverConfig {
    /// APGD with default settings.
    pub fn apgd() -> Self {
        Self::default()
    }

    /// APGD with the given iteration cap and tolerance.
    pub fn apgd_with(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            iterative: IterativeSettings {
                max_iterations,
                tolerance,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Same configuration with history recording turned on.
    pub fn recording(mut self) -> Self {
        self.record_violation = true;
        self
    }
}

/// Build a configured solver.
///
/// # Errors
/// `Unsupported` for solver types without an implementation.
pub fn create_solver(config: &SolverConfig) -> Result<Box<dyn Solver>> {
    match config.solver_type {
        SolverType::Apgd => {
            let mut solver = SolverApgd::new();
            *solver.settings_mut() = config.iterative.clone();
            solver.set_omega(config.vi.omega);
            solver.set_sharpness_lambda(config.vi.sharpness_lambda);
            solver.set_record_violation(config.record_violation);
            solver.set_verbose(config.verbose);
            Ok(Box::new(solver))
        }
        other => Err(SolverError::Unsupported(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SolverConfig::default();
        assert_eq!(config.solver_type, SolverType::Apgd);
        assert_eq!(config.iterative.max_iterations, 50);
        assert_eq!(config.vi.omega, 1.0);
        assert!(!config.record_violation);
    }

    #[test]
    fn test_presets() {
        let config = SolverConfig::apgd_with(100, 1e-6);
        assert_eq!(config.iterative.max_iterations, 100);
        assert_eq!(config.iterative.tolerance, 1e-6);
        assert!(config.iterative.use_precond);
        assert!(SolverConfig::apgd().recording().record_violation);
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: SolverConfig = serde_json::from_str(
            r#"{"iterative": {"max_iterations": 200, "warm_start": true}, "record_violation": true}"#,
        )
        .unwrap();
        assert_eq!(config.solver_type, SolverType::Apgd);
        assert_eq!(config.iterative.max_iterations, 200);
        assert!(config.iterative.warm_start);
        assert_eq!(config.iterative.tolerance, 0.0);
        assert_eq!(config.vi.sharpness_lambda, 1.0);
    }

    #[test]
    fn test_factory_applies_settings() {
        let mut config = SolverConfig::apgd_with(75, 1e-4).recording();
        config.vi.omega = 0.7;
        config.vi.sharpness_lambda = -2.0;
        config.verbose = true;

        let solver = create_solver(&config).unwrap();
        assert_eq!(solver.solver_type(), SolverType::Apgd);
        assert!(solver.verbose());

        let vi = solver.as_vi().unwrap();
        assert_eq!(vi.max_iterations(), 75);
        assert_eq!(vi.tolerance(), 1e-4);
        assert_eq!(vi.omega(), 0.7);
        // Non-positive sharpness keeps the default
        assert_eq!(vi.sharpness_lambda(), 1.0);
        assert!(vi.record_violation());
    }

    #[test]
    fn test_factory_rejects_unimplemented() {
        let config = SolverConfig {
            solver_type: SolverType::Psor,
            ..Default::default()
        };
        assert_eq!(
            create_solver(&config).err(),
            Some(SolverError::Unsupported(SolverType::Psor))
        );
    }
}
