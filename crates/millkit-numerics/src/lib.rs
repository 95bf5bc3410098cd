//! # Millkit numerics
//!
//! The small set of numeric primitives every Millkit algorithm shares.
//! Algorithms depend on this crate instead of re-deriving a dot product,
//! a matrix inverse or a random draw per file.
//!
//! ## Modules
//!
//! - [`vector`]: slice arithmetic, distances, clamping
//! - [`matrix`]: row-major dense matrices, Gauss-Jordan inverse, Cholesky
//! - [`stats`]: summary statistics and fit metrics
//! - [`complex`]: a minimal complex value for FRFs and spectra
//! - [`rng`]: the explicit, caller-seeded random stream
//!
//! Every function returns finite values for finite input. Degenerate input
//! (empty slices, singular systems) is reported through [`NumericsError`] or
//! documented fallbacks, never through `NaN`.

pub mod complex;
pub mod error;
pub mod matrix;
pub mod rng;
pub mod stats;
pub mod vector;

pub use complex::Complex;
pub use error::NumericsError;
pub use matrix::Matrix;
pub use rng::SeededRng;
pub use stats::Summary;

/// Smallest magnitude treated as non-zero by pivoting and guarded divisions.
pub const EPSILON: f64 = 1e-12;

/// Divide, returning `fallback` when the denominator is too small to be safe.
pub fn safe_div(numerator: f64, denominator: f64, fallback: f64) -> f64 {
    if denominator.abs() < EPSILON {
        fallback
    } else {
        let q = numerator / denominator;
        if q.is_finite() { q } else { fallback }
    }
}

/// Map a possibly non-finite value onto `fallback`.
pub fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_div_guards_zero_denominator() {
        assert_eq!(safe_div(1.0, 0.0, 7.0), 7.0);
        assert_eq!(safe_div(6.0, 3.0, 0.0), 2.0);
        assert_eq!(safe_div(1.0, 1e-300, -1.0), -1.0);
    }

    #[test]
    fn finite_or_replaces_nan_and_infinity() {
        assert_eq!(finite_or(f64::NAN, 0.0), 0.0);
        assert_eq!(finite_or(f64::INFINITY, 1.0), 1.0);
        assert_eq!(finite_or(2.5, 1.0), 2.5);
    }
}
