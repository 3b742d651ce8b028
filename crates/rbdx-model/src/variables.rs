//! Degree-of-freedom blocks.
//!
//! A [`Variables`] object is one group of unknowns of the dynamical system,
//! typically the velocity of one rigid body or one sub-body of a flexible
//! body. The solver only ever talks to it through four operations: DOF
//! count, state read/write, and the application of the inverse mass
//! operator `M⁻¹ * f`.

use crate::error::{check_len, Result};
use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector};
use tracing::warn;

/// Index of a [`Variables`] object inside a system descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariablesHandle(pub(crate) usize);

impl VariablesHandle {
    /// Position in the descriptor's variables sequence.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Capability contract for one DOF block.
///
/// `dof()` must stay constant for the lifetime of the object.
pub trait Variables: Send + Sync {
    /// Number of degrees of freedom.
    fn dof(&self) -> usize;

    /// Current state vector (length `dof()`).
    fn state(&self) -> DVector<f64>;

    /// Overwrite the state vector.
    ///
    /// # Errors
    /// `DimensionMismatch` if `x.len() != dof()`; the state is left untouched.
    fn set_state(&mut self, x: &DVector<f64>) -> Result<()>;

    /// Compute `M⁻¹ * f`.
    ///
    /// Must be well defined for degenerate (zero) mass; each implementation
    /// picks a policy for that case.
    ///
    /// # Errors
    /// `DimensionMismatch` if `f.len() != dof()`.
    fn mass_inverse_times(&self, f: &DVector<f64>) -> Result<DVector<f64>>;

    /// External and inertial force term `f` entering the Schur right-hand side.
    fn applied_force(&self) -> DVector<f64> {
        DVector::zeros(self.dof())
    }
}

/// Inverse mass operator of a [`BodyVariables`].
#[derive(Debug, Clone, PartialEq)]
enum InverseMass {
    Diagonal(DVector<f64>),
    Dense(DMatrix<f64>),
}

/// A DOF block with either a diagonal or a dense symmetric mass matrix.
///
/// Zero or negative diagonal masses invert to zero, which makes the
/// corresponding DOF immovable. A dense mass matrix that is not positive
/// definite is treated the same way for the whole block.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyVariables {
    inv_mass: InverseMass,
    state: DVector<f64>,
    force: DVector<f64>,
}

impl BodyVariables {
    /// Body with a diagonal mass matrix; one entry per DOF.
    pub fn new(masses: DVector<f64>) -> Self {
        let dof = masses.len();
        let inv = masses.map(|m| if m > 0.0 { 1.0 / m } else { 0.0 });
        Self {
            inv_mass: InverseMass::Diagonal(inv),
            state: DVector::zeros(dof),
            force: DVector::zeros(dof),
        }
    }

    /// Point mass with `dof` translational DOFs sharing the same mass.
    pub fn point_mass(mass: f64, dof: usize) -> Self {
        Self::new(DVector::from_element(dof, mass))
    }

    /// Body that never moves: `M⁻¹ = 0`.
    pub fn fixed(dof: usize) -> Self {
        Self::new(DVector::zeros(dof))
    }

    /// Body with a dense symmetric mass matrix.
    ///
    /// # Errors
    /// `DimensionMismatch` if the matrix is not square.
    pub fn with_mass_matrix(mass: DMatrix<f64>) -> Result<Self> {
        check_len("mass matrix columns", mass.nrows(), mass.ncols())?;
        let dof = mass.nrows();

        let inv = match Cholesky::new(mass) {
            Some(chol) => chol.inverse(),
            None => {
                warn!(dof, "mass matrix is not positive definite, treating body as fixed");
                DMatrix::zeros(dof, dof)
            }
        };

        Ok(Self {
            inv_mass: InverseMass::Dense(inv),
            state: DVector::zeros(dof),
            force: DVector::zeros(dof),
        })
    }

    /// Set the applied force (builder form).
    ///
    /// # Errors
    /// `DimensionMismatch` if `force.len() != dof`.
    pub fn with_force(mut self, force: DVector<f64>) -> Result<Self> {
        self.set_force(force)?;
        Ok(self)
    }

    /// Set the initial state (builder form).
    ///
    /// # Errors
    /// `DimensionMismatch` if `state.len() != dof`.
    pub fn with_state(mut self, state: DVector<f64>) -> Result<Self> {
        self.set_state(&state)?;
        Ok(self)
    }

    /// Replace the applied force.
    ///
    /// # Errors
    /// `DimensionMismatch` if `force.len() != dof`.
    pub fn set_force(&mut self, force: DVector<f64>) -> Result<()> {
        check_len("set_force", self.state.len(), force.len())?;
        self.force = force;
        Ok(())
    }

    /// True when every DOF has zero inverse mass.
    pub fn is_fixed(&self) -> bool {
        match &self.inv_mass {
            InverseMass::Diagonal(d) => d.iter().all(|&v| v == 0.0),
            InverseMass::Dense(m) => m.iter().all(|&v| v == 0.0),
        }
    }
}

impl Variables for BodyVariables {
    fn dof(&self) -> usize {
        self.state.len()
    }

    fn state(&self) -> DVector<f64> {
        self.state.clone()
    }

    fn set_state(&mut self, x: &DVector<f64>) -> Result<()> {
        check_len("set_state", self.state.len(), x.len())?;
        self.state.copy_from(x);
        Ok(())
    }

    fn mass_inverse_times(&self, f: &DVector<f64>) -> Result<DVector<f64>> {
        check_len("mass_inverse_times", self.state.len(), f.len())?;
        Ok(match &self.inv_mass {
            InverseMass::Diagonal(d) => d.component_mul(f),
            InverseMass::Dense(m) => m * f,
        })
    }

    fn applied_force(&self) -> DVector<f64> {
        self.force.clone()
    }
}
