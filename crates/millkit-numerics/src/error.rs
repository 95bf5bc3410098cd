//! Error types for numeric primitives.

/// Failures of the dense linear-algebra routines.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NumericsError {
    /// Operand shapes do not agree.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A pivot vanished during elimination.
    #[error("matrix is singular or ill-conditioned")]
    Singular,

    /// Cholesky found a non-positive diagonal.
    #[error("matrix is not positive definite")]
    NotPositiveDefinite,

    /// Ragged or empty row data.
    #[error("invalid matrix data: {0}")]
    InvalidData(String),
}
