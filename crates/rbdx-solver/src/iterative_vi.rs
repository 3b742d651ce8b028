//! Iterative solvers for variational inequalities.
//!
//! Adds the over-relaxation and sharpness factors of projected fixed-point
//! schemes, and optional per-iteration recording of the constraint
//! violation and of the multiplier change.

use crate::iterative::IterativeSolver;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Relaxation knobs of VI solvers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViSettings {
    /// Over-relaxation factor, > 0
    pub omega: f64,
    /// Sharpness factor, > 0
    pub sharpness_lambda: f64,
}

impl Default for ViSettings {
    fn default() -> Self {
        Self {
            omega: 1.0,
            sharpness_lambda: 1.0,
        }
    }
}

/// Per-iteration violation and multiplier-change histories.
///
/// Both histories are indexed by iteration number, starting at 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViolationHistory {
    record: bool,
    violation: Vec<f64>,
    dlambda: Vec<f64>,
}

impl ViolationHistory {
    /// Turn recording on or off; both histories are cleared either way.
    pub fn set_record(&mut self, record: bool) {
        self.record = record;
        self.violation.clear();
        self.dlambda.clear();
    }

    pub fn is_recording(&self) -> bool {
        self.record
    }

    /// Prepare for a new solve: clear and zero-fill both histories to
    /// `max_iterations` entries. No-op when not recording.
    pub fn rearm(&mut self, max_iterations: usize) {
        if !self.record {
            return;
        }
        self.violation.clear();
        self.violation.resize(max_iterations, 0.0);
        self.dlambda.clear();
        self.dlambda.resize(max_iterations, 0.0);
    }

    /// Store the values of iteration `iter`.
    ///
    /// On first use after enabling, both histories are sized to
    /// `max_iterations`.
    ///
    /// # Panics
    /// If `iter` lies beyond the sized histories.
    pub fn at_iteration_end(
        &mut self,
        max_violation: f64,
        delta_lambda: f64,
        iter: usize,
        max_iterations: usize,
    ) {
        if !self.record {
            return;
        }
        if self.violation.is_empty() {
            self.violation.resize(max_iterations, 0.0);
            self.dlambda.resize(max_iterations, 0.0);
        }
        assert!(
            iter < self.violation.len(),
            "history index {iter} out of range for {} iterations",
            self.violation.len()
        );
        self.violation[iter] = max_violation;
        self.dlambda[iter] = delta_lambda;
    }

    pub fn violation(&self) -> &[f64] {
        &self.violation
    }

    pub fn dlambda(&self) -> &[f64] {
        &self.dlambda
    }
}

/// Iterative solver for variational inequality / complementarity problems.
pub trait IterativeSolverVI: IterativeSolver {
    /// Stored relaxation knobs.
    fn vi_settings(&self) -> &ViSettings;

    /// Mutable stored relaxation knobs.
    fn vi_settings_mut(&mut self) -> &mut ViSettings;

    /// Recorded histories.
    fn history(&self) -> &ViolationHistory;

    /// Mutable recorded histories.
    fn history_mut(&mut self) -> &mut ViolationHistory;

    /// Set the over-relaxation factor. Non-positive values are ignored.
    fn set_omega(&mut self, omega: f64) {
        if omega > 0.0 {
            self.vi_settings_mut().omega = omega;
        } else {
            warn!(omega, "ignoring non-positive over-relaxation factor");
        }
    }

    /// Set the sharpness factor. Non-positive values are ignored.
    fn set_sharpness_lambda(&mut self, sharpness: f64) {
        if sharpness > 0.0 {
            self.vi_settings_mut().sharpness_lambda = sharpness;
        } else {
            warn!(sharpness, "ignoring non-positive sharpness factor");
        }
    }

    fn omega(&self) -> f64 {
        self.vi_settings().omega
    }

    fn sharpness_lambda(&self) -> f64 {
        self.vi_settings().sharpness_lambda
    }

    /// Enable or disable history recording, clearing both histories.
    fn set_record_violation(&mut self, record: bool) {
        self.history_mut().set_record(record);
    }

    fn record_violation(&self) -> bool {
        self.history().is_recording()
    }

    /// Recorded error metric per iteration.
    fn violation_history(&self) -> &[f64] {
        self.history().violation()
    }

    /// Recorded multiplier change `‖γ_new − γ‖` per iteration.
    fn deltalambda_history(&self) -> &[f64] {
        self.history().dlambda()
    }

    /// End-of-iteration recording hook.
    ///
    /// # Panics
    /// If `iter >= max_iterations` while recording.
    fn at_iteration_end(&mut self, max_violation: f64, delta_lambda: f64, iter: usize) {
        let max_iterations = self.max_iterations();
        self.history_mut()
            .at_iteration_end(max_violation, delta_lambda, iter, max_iterations);
    }
}
