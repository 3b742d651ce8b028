//! Error types for rbdx-model

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Unknown variables handle: {0}")]
    UnknownVariables(usize),

    #[error("Unknown constraint handle: {0}")]
    UnknownConstraint(usize),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl ModelError {
    /// Shorthand for a [`ModelError::DimensionMismatch`].
    pub fn mismatch(context: &'static str, expected: usize, found: usize) -> Self {
        ModelError::DimensionMismatch {
            context,
            expected,
            found,
        }
    }
}

/// Fails with `DimensionMismatch` unless `found == expected`.
pub(crate) fn check_len(context: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(ModelError::mismatch(context, expected, found))
    }
}
