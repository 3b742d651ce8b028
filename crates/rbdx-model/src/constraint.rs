//! Constraints coupling one or more DOF blocks.
//!
//! A constraint contributes `constraint_dim` rows to the stacked Jacobian
//! `C` and the same number of Lagrange multipliers. Its Jacobian is stored
//! block-sparse: one `constraint_dim × dof_k` block per referenced
//! [`Variables`](crate::Variables) object, so columns outside the referenced
//! DOF ranges are zero by construction.
//!
//! The feasible set of the multipliers decides the kind of coupling:
//!
//! | Set | Coupling | Projection |
//! |-----|----------|------------|
//! | `Bilateral` | joints, equality | identity |
//! | `Unilateral` | frictionless contact | `λ ≥ 0` per component |
//! | `FrictionCone` | Coulomb contact | second-order cone |

use crate::error::{check_len, ModelError, Result};
use crate::variables::VariablesHandle;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Index of a [`Constraint`] inside a system descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstraintHandle(pub(crate) usize);

impl ConstraintHandle {
    /// Position in the descriptor's constraint sequence.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Capability contract for one constraint.
pub trait Constraint: Send + Sync {
    /// Referenced DOF blocks (non-owning).
    fn variables(&self) -> &[VariablesHandle];

    /// Number of scalar rows / multipliers, at least 1.
    fn constraint_dim(&self) -> usize;

    /// Jacobian blocks, one per entry of [`variables`](Constraint::variables),
    /// each of shape `constraint_dim × dof` of the matching block.
    fn jacobian_blocks(&self) -> &[DMatrix<f64>];

    /// Bias term `b` (length `constraint_dim`).
    fn bias(&self) -> DVector<f64>;

    /// Project `lambda` (length `constraint_dim`) onto the feasible set in
    /// place. Must be idempotent.
    fn project(&self, lambda: &mut [f64]);
}

/// Feasible set of a constraint's multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeasibleSet {
    /// Unconstrained multipliers.
    Bilateral,
    /// Non-negative half-line for each component.
    Unilateral,
    /// Coulomb cone `‖λ_t‖ ≤ mu λ_n`; component 0 is the normal impulse.
    FrictionCone { mu: f64 },
}

impl FeasibleSet {
    /// Project `lambda` onto this set in place.
    pub fn project(&self, lambda: &mut [f64]) {
        match *self {
            FeasibleSet::Bilateral => {}
            FeasibleSet::Unilateral => {
                for l in lambda.iter_mut() {
                    if *l < 0.0 {
                        *l = 0.0;
                    }
                }
            }
            FeasibleSet::FrictionCone { mu } => project_friction_cone(lambda, mu),
        }
    }
}

/// Projection onto the second-order cone `{(n, t) : ‖t‖ ≤ mu n}`.
fn project_friction_cone(lambda: &mut [f64], mu: f64) {
    let Some((normal, tangent)) = lambda.split_first_mut() else {
        return;
    };
    let n = *normal;
    let t_norm = tangent.iter().map(|t| t * t).sum::<f64>().sqrt();

    // Inside the cone
    if n >= 0.0 && t_norm <= mu * n {
        return;
    }

    // Inside the polar cone
    if mu * t_norm <= -n {
        *normal = 0.0;
        tangent.iter_mut().for_each(|t| *t = 0.0);
        return;
    }

    let n_proj = (n + mu * t_norm) / (mu * mu + 1.0);
    *normal = n_proj;
    let scale = mu * n_proj / t_norm;
    tangent.iter_mut().for_each(|t| *t *= scale);
}

/// Constraint `C v + b` with a fixed Jacobian and a [`FeasibleSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    variables: Vec<VariablesHandle>,
    jacobian: Vec<DMatrix<f64>>,
    bias: DVector<f64>,
    set: FeasibleSet,
}

impl LinearConstraint {
    /// Build a constraint, validating the block structure.
    ///
    /// # Errors
    /// - `InvalidData` if no block is given, the block count differs from
    ///   the handle count, or the data for the set is invalid
    /// - `DimensionMismatch` if a block's row count or the bias length
    ///   differs from the constraint dimension
    pub fn new(
        variables: Vec<VariablesHandle>,
        jacobian: Vec<DMatrix<f64>>,
        bias: DVector<f64>,
        set: FeasibleSet,
    ) -> Result<Self> {
        if jacobian.is_empty() {
            return Err(ModelError::InvalidData(
                "constraint needs at least one Jacobian block".into(),
            ));
        }
        if variables.len() != jacobian.len() {
            return Err(ModelError::InvalidData(format!(
                "{} Jacobian blocks for {} variables",
                jacobian.len(),
                variables.len()
            )));
        }

        let dim = bias.len();
        if dim == 0 {
            return Err(ModelError::InvalidData(
                "constraint dimension must be at least 1".into(),
            ));
        }
        for block in &jacobian {
            check_len("jacobian block rows", dim, block.nrows())?;
        }

        if let FeasibleSet::FrictionCone { mu } = set {
            if !mu.is_finite() || mu < 0.0 {
                return Err(ModelError::InvalidData(format!(
                    "friction coefficient must be finite and non-negative, got {mu}"
                )));
            }
            if dim < 2 {
                return Err(ModelError::InvalidData(
                    "friction cone needs a normal and at least one tangent row".into(),
                ));
            }
        }

        Ok(Self {
            variables,
            jacobian,
            bias,
            set,
        })
    }

    /// Equality constraint on a single DOF block.
    pub fn bilateral(
        variables: VariablesHandle,
        jacobian: DMatrix<f64>,
        bias: DVector<f64>,
    ) -> Result<Self> {
        Self::new(vec![variables], vec![jacobian], bias, FeasibleSet::Bilateral)
    }

    /// Non-penetration constraint on a single DOF block.
    pub fn unilateral(
        variables: VariablesHandle,
        jacobian: DMatrix<f64>,
        bias: DVector<f64>,
    ) -> Result<Self> {
        Self::new(vec![variables], vec![jacobian], bias, FeasibleSet::Unilateral)
    }

    /// Frictional contact between blocks; rows are `[normal, tangent...]`.
    pub fn friction_contact(
        variables: Vec<VariablesHandle>,
        jacobian: Vec<DMatrix<f64>>,
        bias: DVector<f64>,
        mu: f64,
    ) -> Result<Self> {
        Self::new(variables, jacobian, bias, FeasibleSet::FrictionCone { mu })
    }

    /// Feasible set of the multipliers.
    pub fn feasible_set(&self) -> FeasibleSet {
        self.set
    }
}

impl Constraint for LinearConstraint {
    fn variables(&self) -> &[VariablesHandle] {
        &self.variables
    }

    fn constraint_dim(&self) -> usize {
        self.bias.len()
    }

    fn jacobian_blocks(&self) -> &[DMatrix<f64>] {
        &self.jacobian
    }

    fn bias(&self) -> DVector<f64> {
        self.bias.clone()
    }

    fn project(&self, lambda: &mut [f64]) {
        self.set.project(lambda);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Vec<f64>> {
        vec![
            vec![1.0, 0.0, 0.0],
            vec![-1.0, 0.0, 0.0],
            vec![1.0, 5.0, -2.0],
            vec![-3.0, 0.1, 0.1],
            vec![-0.2, 3.0, 4.0],
            vec![2.0, 0.3, -0.4],
            vec![0.0, 0.0, 0.0],
            vec![1e-9, -1e3, 2e3],
        ]
    }

    fn assert_idempotent(set: FeasibleSet) {
        for sample in samples() {
            let mut once = sample.clone();
            set.project(&mut once);
            let mut twice = once.clone();
            set.project(&mut twice);
            for (a, b) in once.iter().zip(&twice) {
                assert!(
                    (a - b).abs() <= 1e-12 * (1.0 + a.abs()),
                    "{set:?} not idempotent on {sample:?}: {once:?} vs {twice:?}"
                );
            }
        }
    }

    #[test]
    fn test_projection_idempotent_for_every_set() {
        assert_idempotent(FeasibleSet::Bilateral);
        assert_idempotent(FeasibleSet::Unilateral);
        assert_idempotent(FeasibleSet::FrictionCone { mu: 0.5 });
        assert_idempotent(FeasibleSet::FrictionCone { mu: 0.0 });
        assert_idempotent(FeasibleSet::FrictionCone { mu: 3.0 });
    }

    #[test]
    fn test_unilateral_clamps_negative() {
        let mut l = [-2.0, 3.0];
        FeasibleSet::Unilateral.project(&mut l);
        assert_eq!(l, [0.0, 3.0]);
    }

    #[test]
    fn test_friction_cone_cases() {
        let cone = FeasibleSet::FrictionCone { mu: 0.5 };

        // Inside: untouched
        let mut inside = [2.0, 0.6, -0.8];
        cone.project(&mut inside);
        assert_eq!(inside, [2.0, 0.6, -0.8]);

        // Polar cone: zeroed
        let mut polar = [-10.0, 1.0, 0.0];
        cone.project(&mut polar);
        assert_eq!(polar, [0.0, 0.0, 0.0]);

        // Outside: lands on the surface
        let mut outside = [1.0, 3.0, 4.0];
        cone.project(&mut outside);
        let t = (outside[1] * outside[1] + outside[2] * outside[2]).sqrt();
        assert!((t - 0.5 * outside[0]).abs() < 1e-12);
        let expected_n = (1.0 + 0.5 * 5.0) / 1.25;
        assert!((outside[0] - expected_n).abs() < 1e-12);
    }

    #[test]
    fn test_frictionless_cone_keeps_normal_only() {
        let cone = FeasibleSet::FrictionCone { mu: 0.0 };
        let mut l = [2.0, 1.0, 1.0];
        cone.project(&mut l);
        assert_eq!(l, [2.0, 0.0, 0.0]);

        let mut pulling = [-1.0, 0.0, 0.0];
        cone.project(&mut pulling);
        assert_eq!(pulling, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_constraint_validation() {
        let h = VariablesHandle(0);

        let ok = LinearConstraint::bilateral(
            h,
            DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
            DVector::from_vec(vec![-4.0]),
        )
        .unwrap();
        assert_eq!(ok.constraint_dim(), 1);
        assert_eq!(ok.variables(), &[h]);

        let bad_rows = LinearConstraint::bilateral(
            h,
            DMatrix::zeros(2, 2),
            DVector::from_vec(vec![0.0]),
        );
        assert!(matches!(bad_rows, Err(ModelError::DimensionMismatch { .. })));

        let bad_count = LinearConstraint::new(
            vec![h, VariablesHandle(1)],
            vec![DMatrix::zeros(1, 1)],
            DVector::zeros(1),
            FeasibleSet::Bilateral,
        );
        assert!(matches!(bad_count, Err(ModelError::InvalidData(_))));

        let bad_mu =
            LinearConstraint::friction_contact(vec![h], vec![DMatrix::zeros(3, 3)], DVector::zeros(3), -0.1);
        assert!(matches!(bad_mu, Err(ModelError::InvalidData(_))));

        let too_small =
            LinearConstraint::friction_contact(vec![h], vec![DMatrix::zeros(1, 3)], DVector::zeros(1), 0.3);
        assert!(matches!(too_small, Err(ModelError::InvalidData(_))));
    }
}
