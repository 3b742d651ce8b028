//! Concrete system descriptor built from DOF blocks and constraints.
//!
//! # Formulation
//!
//! ```text
//! v = M⁻¹ (f + Cᵀ γ)             primal update
//! C v + b                        constraint velocity
//! N = C M⁻¹ Cᵀ                   Schur complement
//! r = C M⁻¹ f + b                Schur right-hand side
//! ```
//!
//! so that the natural map of the variational inequality is
//! `N γ + r = C v + b`. The descriptor reports `Z = N` and
//! `d = di - C M⁻¹ f = -r`, with `di = -b` the bias-only part.
//!
//! The matrix-free product scatters `Cᵀ x` per variable, applies `M⁻¹` to
//! every block in parallel and gathers `C u` per constraint in parallel. The
//! assembled matrix is built block-wise in COO format and converted to CSR.

use crate::constraint::{Constraint, ConstraintHandle, LinearConstraint};
use crate::descriptor::{constraint_offsets, dof_offsets, SystemDescriptor};
use crate::error::{check_len, ModelError, Result};
use crate::variables::{BodyVariables, Variables, VariablesHandle};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;

/// Arena-backed [`SystemDescriptor`].
#[derive(Default)]
pub struct ConstraintSystem {
    variables: Vec<Box<dyn Variables>>,
    constraints: Vec<Box<dyn Constraint>>,
    /// Last written multipliers, one block per constraint
    multipliers: Vec<DVector<f64>>,
}

impl ConstraintSystem {
    /// Create an empty system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a [`BodyVariables`].
    pub fn add_body(&mut self, body: BodyVariables) -> VariablesHandle {
        self.add_variables(Box::new(body))
    }

    /// Register a [`LinearConstraint`].
    pub fn add_linear(&mut self, constraint: LinearConstraint) -> Result<ConstraintHandle> {
        self.add_constraint(Box::new(constraint))
    }

    /// Look up a DOF block.
    pub fn variables_at(&self, handle: VariablesHandle) -> Result<&dyn Variables> {
        self.variables
            .get(handle.0)
            .map(|v| v.as_ref())
            .ok_or(ModelError::UnknownVariables(handle.0))
    }

    /// Look up a constraint.
    pub fn constraint_at(&self, handle: ConstraintHandle) -> Result<&dyn Constraint> {
        self.constraints
            .get(handle.0)
            .map(|c| c.as_ref())
            .ok_or(ModelError::UnknownConstraint(handle.0))
    }

    /// Current state of a DOF block.
    pub fn state(&self, handle: VariablesHandle) -> Result<DVector<f64>> {
        Ok(self.variables_at(handle)?.state())
    }

    /// Last written multiplier block of a constraint.
    pub fn multiplier(&self, handle: ConstraintHandle) -> Result<&DVector<f64>> {
        self.multipliers
            .get(handle.0)
            .ok_or(ModelError::UnknownConstraint(handle.0))
    }

    /// Full-width Jacobian rows of one constraint (`dim × num_dofs`).
    ///
    /// Columns outside the referenced variables' DOF ranges are zero.
    pub fn constraint_jacobian(&self, handle: ConstraintHandle) -> Result<DMatrix<f64>> {
        let constraint = self.constraint_at(handle)?;
        let offsets = dof_offsets(&self.variables);

        let mut jac = DMatrix::zeros(constraint.constraint_dim(), self.num_dofs());
        for (h, block) in constraint.variables().iter().zip(constraint.jacobian_blocks()) {
            let mut cols = jac.columns_mut(offsets[h.0], block.ncols());
            cols += block;
        }
        Ok(jac)
    }

    /// Stacked sparse Jacobian `C` (`n × num_dofs`).
    pub fn build_jacobian(&self) -> CsrMatrix<f64> {
        let dof_off = dof_offsets(&self.variables);
        let con_off = constraint_offsets(&self.constraints);
        let mut coo = CooMatrix::new(self.num_constraints(), self.num_dofs());

        for (c, &row0) in self.constraints.iter().zip(&con_off) {
            for (h, block) in c.variables().iter().zip(c.jacobian_blocks()) {
                let col0 = dof_off[h.0];
                for j in 0..block.ncols() {
                    for i in 0..block.nrows() {
                        let value = block[(i, j)];
                        if value != 0.0 {
                            coo.push(row0 + i, col0 + j, value);
                        }
                    }
                }
            }
        }

        CsrMatrix::from(&coo)
    }

    /// Constraint velocity `C v + b` at the current states.
    pub fn constraint_violation(&self) -> DVector<f64> {
        let states: Vec<DVector<f64>> = self.variables.iter().map(|v| v.state()).collect();
        self.gather(&states) - self.build_di_vector()
    }

    /// `w_k = Σ_i J_ikᵀ x_i` for every variable `k`.
    fn scatter_transpose(&self, x: &DVector<f64>) -> Vec<DVector<f64>> {
        let mut w: Vec<DVector<f64>> = self
            .variables
            .iter()
            .map(|v| DVector::zeros(v.dof()))
            .collect();

        let mut offset = 0;
        for c in &self.constraints {
            let dim = c.constraint_dim();
            let xi = x.rows(offset, dim);
            for (h, block) in c.variables().iter().zip(c.jacobian_blocks()) {
                w[h.0] += block.tr_mul(&xi);
            }
            offset += dim;
        }
        w
    }

    /// `u_k = M_k⁻¹ w_k` for every variable, in parallel.
    fn apply_mass_inverse(&self, w: &[DVector<f64>]) -> Result<Vec<DVector<f64>>> {
        self.variables
            .par_iter()
            .zip(w.par_iter())
            .map(|(v, wk)| v.mass_inverse_times(wk))
            .collect()
    }

    /// `y_i = Σ_k J_ik u_k` for every constraint, in parallel, stacked.
    fn gather(&self, u: &[DVector<f64>]) -> DVector<f64> {
        let blocks: Vec<DVector<f64>> = self
            .constraints
            .par_iter()
            .map(|c| {
                let mut yi = DVector::zeros(c.constraint_dim());
                for (h, block) in c.variables().iter().zip(c.jacobian_blocks()) {
                    yi += block * &u[h.0];
                }
                yi
            })
            .collect();

        let mut y = DVector::zeros(self.num_constraints());
        let mut offset = 0;
        for block in &blocks {
            y.rows_mut(offset, block.len()).copy_from(block);
            offset += block.len();
        }
        y
    }

    /// `M_k⁻¹ A` column by column.
    fn mass_inverse_times_columns(variables: &dyn Variables, a: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let mut out = DMatrix::zeros(a.nrows(), a.ncols());
        for j in 0..a.ncols() {
            let col = variables.mass_inverse_times(&a.column(j).into_owned())?;
            out.set_column(j, &col);
        }
        Ok(out)
    }

    /// Assemble `N = C M⁻¹ Cᵀ` block-wise: `N_ij += J_ik M_k⁻¹ J_jkᵀ`.
    fn assemble_schur(&self) -> Result<CsrMatrix<f64>> {
        let n = self.num_constraints();
        let con_off = constraint_offsets(&self.constraints);

        // Per variable: (row offset, Jacobian block) of every touching constraint
        let mut touching: Vec<Vec<(usize, &DMatrix<f64>)>> = vec![Vec::new(); self.variables.len()];
        for (c, &row0) in self.constraints.iter().zip(&con_off) {
            for (h, block) in c.variables().iter().zip(c.jacobian_blocks()) {
                touching[h.0].push((row0, block));
            }
        }

        let mut coo = CooMatrix::new(n, n);
        for (variables, blocks) in self.variables.iter().zip(&touching) {
            for &(col0, jac_j) in blocks {
                let minv_jt = Self::mass_inverse_times_columns(variables.as_ref(), &jac_j.transpose())?;
                for &(row0, jac_i) in blocks {
                    let nij = jac_i * &minv_jt;
                    for c in 0..nij.ncols() {
                        for r in 0..nij.nrows() {
                            let value = nij[(r, c)];
                            if value != 0.0 {
                                coo.push(row0 + r, col0 + c, value);
                            }
                        }
                    }
                }
            }
        }

        Ok(CsrMatrix::from(&coo))
    }
}

impl SystemDescriptor for ConstraintSystem {
    fn add_variables(&mut self, variables: Box<dyn Variables>) -> VariablesHandle {
        self.variables.push(variables);
        VariablesHandle(self.variables.len() - 1)
    }

    fn add_constraint(&mut self, constraint: Box<dyn Constraint>) -> Result<ConstraintHandle> {
        let dim = constraint.constraint_dim();
        if dim == 0 {
            return Err(ModelError::InvalidData(
                "constraint dimension must be at least 1".into(),
            ));
        }
        check_len(
            "jacobian block count",
            constraint.variables().len(),
            constraint.jacobian_blocks().len(),
        )?;

        for (h, block) in constraint.variables().iter().zip(constraint.jacobian_blocks()) {
            let variables = self
                .variables
                .get(h.0)
                .ok_or(ModelError::UnknownVariables(h.0))?;
            check_len("jacobian block rows", dim, block.nrows())?;
            check_len("jacobian block columns", variables.dof(), block.ncols())?;
        }
        check_len("bias length", dim, constraint.bias().len())?;

        self.constraints.push(constraint);
        self.multipliers.push(DVector::zeros(dim));
        Ok(ConstraintHandle(self.constraints.len() - 1))
    }

    fn variables(&self) -> &[Box<dyn Variables>] {
        &self.variables
    }

    fn constraints(&self) -> &[Box<dyn Constraint>] {
        &self.constraints
    }

    fn build_system_matrix(&self) -> Result<(CsrMatrix<f64>, DVector<f64>)> {
        Ok((self.assemble_schur()?, self.build_rhs()?))
    }

    fn build_rhs(&self) -> Result<DVector<f64>> {
        let forces: Vec<DVector<f64>> = self.variables.iter().map(|v| v.applied_force()).collect();
        let free_motion = self.apply_mass_inverse(&forces)?;
        Ok(self.build_di_vector() - self.gather(&free_motion))
    }

    fn system_product(&self, x: &DVector<f64>) -> Result<DVector<f64>> {
        check_len("system_product", self.num_constraints(), x.len())?;
        let w = self.scatter_transpose(x);
        let u = self.apply_mass_inverse(&w)?;
        Ok(self.gather(&u))
    }

    fn build_di_vector(&self) -> DVector<f64> {
        let mut di = DVector::zeros(self.num_constraints());
        let mut offset = 0;
        for c in &self.constraints {
            let b = c.bias();
            di.rows_mut(offset, b.len()).copy_from(&(-b));
            offset += c.constraint_dim();
        }
        di
    }

    fn multipliers(&self) -> DVector<f64> {
        let mut x = DVector::zeros(self.num_constraints());
        let mut offset = 0;
        for block in &self.multipliers {
            x.rows_mut(offset, block.len()).copy_from(block);
            offset += block.len();
        }
        x
    }

    fn set_unknowns(&mut self, x: &DVector<f64>) -> Result<()> {
        check_len("set_unknowns", self.num_constraints(), x.len())?;

        // v = M⁻¹ (f + Cᵀ γ), computed before anything is written
        let mut w = self.scatter_transpose(x);
        for (wk, v) in w.iter_mut().zip(&self.variables) {
            *wk += v.applied_force();
        }
        let states = self.apply_mass_inverse(&w)?;

        for (v, s) in self.variables.iter_mut().zip(&states) {
            v.set_state(s)?;
        }

        let mut offset = 0;
        for (block, c) in self.multipliers.iter_mut().zip(&self.constraints) {
            let dim = c.constraint_dim();
            block.copy_from(&x.rows(offset, dim));
            offset += dim;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::FeasibleSet;

    /// Dense copy of a CSR matrix for comparisons.
    fn to_dense(m: &CsrMatrix<f64>) -> DMatrix<f64> {
        let mut out = DMatrix::zeros(m.nrows(), m.ncols());
        for (i, row) in m.row_iter().enumerate() {
            for (&j, &v) in row.col_indices().iter().zip(row.values()) {
                out[(i, j)] += v;
            }
        }
        out
    }

    /// Two bodies (2 DOF each) and three constraints of mixed kind.
    fn two_body_system() -> (ConstraintSystem, VariablesHandle, VariablesHandle) {
        let mut sys = ConstraintSystem::new();
        let a = sys.add_body(
            BodyVariables::new(DVector::from_vec(vec![1.0, 2.0]))
                .with_force(DVector::from_vec(vec![0.0, -9.81]))
                .unwrap(),
        );
        let b = sys.add_body(
            BodyVariables::with_mass_matrix(DMatrix::from_row_slice(2, 2, &[3.0, 0.5, 0.5, 1.0]))
                .unwrap()
                .with_force(DVector::from_vec(vec![1.0, -3.0]))
                .unwrap(),
        );

        sys.add_linear(
            LinearConstraint::bilateral(
                a,
                DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
                DVector::from_vec(vec![0.1]),
            )
            .unwrap(),
        )
        .unwrap();
        sys.add_linear(
            LinearConstraint::new(
                vec![a, b],
                vec![
                    DMatrix::from_row_slice(1, 2, &[0.0, -1.0]),
                    DMatrix::from_row_slice(1, 2, &[0.0, 1.0]),
                ],
                DVector::from_vec(vec![-0.2]),
                FeasibleSet::Unilateral,
            )
            .unwrap(),
        )
        .unwrap();
        sys.add_linear(
            LinearConstraint::friction_contact(
                vec![b],
                vec![DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0])],
                DVector::from_vec(vec![0.0, 0.3]),
                0.4,
            )
            .unwrap(),
        )
        .unwrap();

        (sys, a, b)
    }

    #[test]
    fn test_sizes_follow_membership() {
        let (mut sys, a, _) = two_body_system();
        assert_eq!(sys.num_constraints(), 4);
        assert_eq!(sys.num_dofs(), 4);

        sys.add_linear(
            LinearConstraint::bilateral(a, DMatrix::from_row_slice(1, 2, &[0.0, 1.0]), DVector::zeros(1))
                .unwrap(),
        )
        .unwrap();
        assert_eq!(sys.num_constraints(), 5);
        assert_eq!(sys.multipliers().len(), 5);
    }

    #[test]
    fn test_product_matches_assembled_matrix() {
        let (sys, _, _) = two_body_system();
        let (z, _) = sys.build_system_matrix().unwrap();
        let z = to_dense(&z);

        let x = DVector::from_vec(vec![0.3, -1.2, 2.0, 0.7]);
        let y_free = sys.system_product(&x).unwrap();
        let y_mat = &z * &x;
        assert!((y_free - y_mat).norm() < 1e-12);

        // Schur complement is symmetric
        assert!((&z - z.transpose()).norm() < 1e-12);
    }

    #[test]
    fn test_schur_matches_jacobian_definition() {
        let (sys, _, _) = two_body_system();
        let c = to_dense(&sys.build_jacobian());

        // M⁻¹ assembled column by column from the blocks
        let mut minv = DMatrix::zeros(4, 4);
        let offsets = dof_offsets(sys.variables());
        for (v, &off) in sys.variables().iter().zip(&offsets) {
            for j in 0..v.dof() {
                let mut e = DVector::zeros(v.dof());
                e[j] = 1.0;
                let col = v.mass_inverse_times(&e).unwrap();
                minv.view_mut((off, off + j), (v.dof(), 1)).copy_from(&col);
            }
        }

        let expected = &c * &minv * c.transpose();
        let (z, _) = sys.build_system_matrix().unwrap();
        assert!((to_dense(&z) - expected).norm() < 1e-12);
    }

    #[test]
    fn test_rhs_split_into_force_and_bias_terms() {
        let (sys, _, _) = two_body_system();
        let d = sys.build_rhs().unwrap();
        let di = sys.build_di_vector();
        assert_eq!(di, DVector::from_vec(vec![-0.1, 0.2, -0.0, -0.3]));

        // d - di is the pure force term -C M⁻¹ f
        let f_term = &d - &di;
        // Constraint 0 sees body a's x-DOF, which has zero applied force
        assert!(f_term[0].abs() < 1e-15);
        assert!(f_term.norm() > 0.0);
    }

    #[test]
    fn test_full_width_jacobian_is_zero_outside_blocks() {
        let (sys, _, _) = two_body_system();
        let jac = sys.constraint_jacobian(ConstraintHandle(2)).unwrap();
        assert_eq!(jac.shape(), (2, 4));
        // Body a occupies columns 0..2
        assert_eq!(jac.columns(0, 2).norm(), 0.0);
        assert_eq!(jac[(0, 3)], 1.0);
        assert_eq!(jac[(1, 2)], 1.0);
    }

    #[test]
    fn test_set_unknowns_writes_states_and_multipliers() {
        let (mut sys, a, b) = two_body_system();
        let gamma = DVector::from_vec(vec![1.0, 2.0, 0.5, -0.5]);
        sys.set_unknowns(&gamma).unwrap();

        assert_eq!(sys.multipliers(), gamma);
        assert_eq!(sys.multiplier(ConstraintHandle(2)).unwrap().len(), 2);

        // Body a: v = M⁻¹ (f + Cᵀγ) with Cᵀγ restricted to its columns
        let va = sys.state(a).unwrap();
        assert!((va[0] - 1.0).abs() < 1e-12);
        assert!((va[1] - (-9.81 - 2.0) / 2.0).abs() < 1e-12);

        // violation equals N γ + r
        let n_gamma = sys.system_product(&gamma).unwrap();
        let r = -sys.build_rhs().unwrap();
        let violation = sys.constraint_violation();
        assert!((violation - (n_gamma + r)).norm() < 1e-12);
        assert_eq!(sys.state(b).unwrap().len(), 2);
    }

    #[test]
    fn test_set_unknowns_rejects_wrong_length() {
        let (mut sys, a, _) = two_body_system();
        let before = sys.state(a).unwrap();
        let err = sys.set_unknowns(&DVector::zeros(3)).unwrap_err();
        assert_eq!(err, ModelError::mismatch("set_unknowns", 4, 3));
        assert_eq!(sys.state(a).unwrap(), before);
    }

    #[test]
    fn test_add_constraint_validates_handles_and_widths() {
        let mut sys = ConstraintSystem::new();
        let a = sys.add_body(BodyVariables::point_mass(1.0, 2));

        let stranger = LinearConstraint::bilateral(
            VariablesHandle(7),
            DMatrix::zeros(1, 2),
            DVector::zeros(1),
        )
        .unwrap();
        assert_eq!(
            sys.add_linear(stranger).unwrap_err(),
            ModelError::UnknownVariables(7)
        );

        let too_wide =
            LinearConstraint::bilateral(a, DMatrix::zeros(1, 3), DVector::zeros(1)).unwrap();
        assert_eq!(
            sys.add_linear(too_wide).unwrap_err(),
            ModelError::mismatch("jacobian block columns", 2, 3)
        );
        assert_eq!(sys.num_constraints(), 0);
    }

    #[test]
    fn test_empty_system() {
        let sys = ConstraintSystem::new();
        assert_eq!(sys.num_constraints(), 0);
        assert_eq!(sys.build_rhs().unwrap().len(), 0);
        assert_eq!(sys.system_product(&DVector::zeros(0)).unwrap().len(), 0);
        let (z, d) = sys.build_system_matrix().unwrap();
        assert_eq!(z.nrows(), 0);
        assert_eq!(d.len(), 0);
    }
}
