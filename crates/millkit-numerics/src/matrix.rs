//! Small dense matrices.
//!
//! Row-major storage sized for the problems Millkit solves: Kalman
//! covariances, Gaussian-process kernels, truss stiffness systems and
//! least-squares normal equations. Nothing here is blocked or vectorised.

use crate::EPSILON;
use crate::error::NumericsError;
use std::ops::{Index, IndexMut};

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m[(i, i)] = 1.0;
        }
        m
    }

    /// Build from row vectors. Every row must have the same, non-zero length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, NumericsError> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        if n_rows == 0 || n_cols == 0 {
            return Err(NumericsError::InvalidData("matrix has no entries".into()));
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_cols) {
            return Err(NumericsError::InvalidData(format!(
                "row {i} has {} columns, expected {n_cols}",
                row.len()
            )));
        }
        Ok(Self {
            rows: n_rows,
            cols: n_cols,
            data: rows.iter().flatten().copied().collect(),
        })
    }

    pub fn diagonal(values: &[f64]) -> Self {
        let mut m = Self::zeros(values.len(), values.len());
        for (i, v) in values.iter().enumerate() {
            m[(i, i)] = *v;
        }
        m
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.rows).map(|i| self.row(i).to_vec()).collect()
    }

    pub fn transpose(&self) -> Self {
        let mut t = Self::zeros(self.cols, self.rows);
        for i in 0..self.rows {
            for j in 0..self.cols {
                t[(j, i)] = self[(i, j)];
            }
        }
        t
    }

    pub fn matmul(&self, other: &Self) -> Result<Self, NumericsError> {
        if self.cols != other.rows {
            return Err(NumericsError::DimensionMismatch(format!(
                "{}x{} * {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut out = Self::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a = self[(i, k)];
                if a == 0.0 {
                    continue;
                }
                for j in 0..other.cols {
                    out[(i, j)] += a * other[(k, j)];
                }
            }
        }
        Ok(out)
    }

    pub fn mul_vec(&self, v: &[f64]) -> Result<Vec<f64>, NumericsError> {
        if self.cols != v.len() {
            return Err(NumericsError::DimensionMismatch(format!(
                "{}x{} * vector of length {}",
                self.rows,
                self.cols,
                v.len()
            )));
        }
        Ok((0..self.rows)
            .map(|i| crate::vector::dot(self.row(i), v))
            .collect())
    }

    pub fn add(&self, other: &Self) -> Result<Self, NumericsError> {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Self) -> Result<Self, NumericsError> {
        self.zip_with(other, |a, b| a - b)
    }

    pub fn scale(&self, factor: f64) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|v| v * factor).collect(),
        }
    }

    fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Result<Self, NumericsError> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(NumericsError::DimensionMismatch(format!(
                "{}x{} vs {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        Ok(Self {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| f(*a, *b))
                .collect(),
        })
    }

    /// Gauss-Jordan inverse with partial pivoting.
    pub fn inverse(&self) -> Result<Self, NumericsError> {
        if !self.is_square() {
            return Err(NumericsError::DimensionMismatch(
                "inverse of a non-square matrix".into(),
            ));
        }
        let n = self.rows;
        let mut a = self.clone();
        let mut inv = Self::identity(n);
        for col in 0..n {
            let pivot = (col..n)
                .max_by(|&x, &y| a[(x, col)].abs().total_cmp(&a[(y, col)].abs()))
                .unwrap_or(col);
            if a[(pivot, col)].abs() < EPSILON {
                return Err(NumericsError::Singular);
            }
            a.swap_rows(col, pivot);
            inv.swap_rows(col, pivot);

            let p = a[(col, col)];
            for j in 0..n {
                a[(col, j)] /= p;
                inv[(col, j)] /= p;
            }
            for r in 0..n {
                if r == col {
                    continue;
                }
                let factor = a[(r, col)];
                if factor == 0.0 {
                    continue;
                }
                for j in 0..n {
                    a[(r, j)] -= factor * a[(col, j)];
                    inv[(r, j)] -= factor * inv[(col, j)];
                }
            }
        }
        Ok(inv)
    }

    /// Solve `A x = b` by Gaussian elimination with partial pivoting.
    pub fn solve(&self, b: &[f64]) -> Result<Vec<f64>, NumericsError> {
        if !self.is_square() || self.rows != b.len() {
            return Err(NumericsError::DimensionMismatch(format!(
                "{}x{} system with rhs of length {}",
                self.rows,
                self.cols,
                b.len()
            )));
        }
        let n = self.rows;
        let mut a = self.clone();
        let mut x = b.to_vec();
        for col in 0..n {
            let pivot = (col..n)
                .max_by(|&p, &q| a[(p, col)].abs().total_cmp(&a[(q, col)].abs()))
                .unwrap_or(col);
            if a[(pivot, col)].abs() < EPSILON {
                return Err(NumericsError::Singular);
            }
            a.swap_rows(col, pivot);
            x.swap(col, pivot);
            for r in col + 1..n {
                let factor = a[(r, col)] / a[(col, col)];
                if factor == 0.0 {
                    continue;
                }
                for j in col..n {
                    a[(r, j)] -= factor * a[(col, j)];
                }
                x[r] -= factor * x[col];
            }
        }
        for i in (0..n).rev() {
            let tail: f64 = (i + 1..n).map(|j| a[(i, j)] * x[j]).sum();
            x[i] = (x[i] - tail) / a[(i, i)];
        }
        Ok(x)
    }

    /// Lower-triangular Cholesky factor `L` with `A = L Lᵀ`.
    pub fn cholesky(&self) -> Result<Self, NumericsError> {
        if !self.is_square() {
            return Err(NumericsError::DimensionMismatch(
                "cholesky of a non-square matrix".into(),
            ));
        }
        let n = self.rows;
        let mut l = Self::zeros(n, n);
        for i in 0..n {
            for j in 0..=i {
                let s: f64 = (0..j).map(|k| l[(i, k)] * l[(j, k)]).sum();
                if i == j {
                    let d = self[(i, i)] - s;
                    if d <= EPSILON {
                        return Err(NumericsError::NotPositiveDefinite);
                    }
                    l[(i, j)] = d.sqrt();
                } else {
                    l[(i, j)] = (self[(i, j)] - s) / l[(j, j)];
                }
            }
        }
        Ok(l)
    }

    /// Solve `A x = b` given the Cholesky factor `L` of `A`.
    pub fn cholesky_solve(l: &Self, b: &[f64]) -> Result<Vec<f64>, NumericsError> {
        let n = l.rows;
        if b.len() != n {
            return Err(NumericsError::DimensionMismatch(format!(
                "factor of order {n} with rhs of length {}",
                b.len()
            )));
        }
        let mut y = vec![0.0; n];
        for i in 0..n {
            let s: f64 = (0..i).map(|k| l[(i, k)] * y[k]).sum();
            y[i] = (b[i] - s) / l[(i, i)];
        }
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let s: f64 = (i + 1..n).map(|k| l[(k, i)] * x[k]).sum();
            x[i] = (y[i] - s) / l[(i, i)];
        }
        Ok(x)
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for j in 0..self.cols {
            self.data.swap(a * self.cols + j, b * self.cols + j);
        }
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (i, j): (usize, usize)) -> &f64 {
        &self.data[i * self.cols + j]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut f64 {
        &mut self.data[i * self.cols + j]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn from_rows_rejects_ragged_input() {
        let err = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, NumericsError::InvalidData(_)));
    }

    #[test]
    fn inverse_of_known_matrix() {
        let m = Matrix::from_rows(&[vec![4.0, 7.0], vec![2.0, 6.0]]).unwrap();
        let inv = m.inverse().unwrap();
        assert!(approx(inv[(0, 0)], 0.6));
        assert!(approx(inv[(0, 1)], -0.7));
        assert!(approx(inv[(1, 0)], -0.2));
        assert!(approx(inv[(1, 1)], 0.4));
    }

    #[test]
    fn singular_matrix_is_reported() {
        let m = Matrix::from_rows(&[vec![1.0, 2.0], vec![2.0, 4.0]]).unwrap();
        assert_eq!(m.inverse().unwrap_err(), NumericsError::Singular);
        assert_eq!(m.solve(&[1.0, 1.0]).unwrap_err(), NumericsError::Singular);
    }

    #[test]
    fn solve_matches_hand_computation() {
        let m = Matrix::from_rows(&[
            vec![2.0, 1.0, -1.0],
            vec![-3.0, -1.0, 2.0],
            vec![-2.0, 1.0, 2.0],
        ])
        .unwrap();
        let x = m.solve(&[8.0, -11.0, -3.0]).unwrap();
        assert!(approx(x[0], 2.0));
        assert!(approx(x[1], 3.0));
        assert!(approx(x[2], -1.0));
    }

    #[test]
    fn cholesky_round_trips_through_solve() {
        let m = Matrix::from_rows(&[vec![4.0, 2.0], vec![2.0, 3.0]]).unwrap();
        let l = m.cholesky().unwrap();
        assert!(approx(l[(0, 0)], 2.0));
        assert!(approx(l[(1, 0)], 1.0));
        assert!(approx(l[(1, 1)], 2.0_f64.sqrt()));
        let x = Matrix::cholesky_solve(&l, &[2.0, 1.0]).unwrap();
        let back = m.mul_vec(&x).unwrap();
        assert!(approx(back[0], 2.0));
        assert!(approx(back[1], 1.0));
    }

    #[test]
    fn matmul_shape_mismatch_is_an_error() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(2, 3);
        assert!(a.matmul(&b).is_err());
        assert_eq!(a.matmul(&b.transpose()).unwrap().rows(), 2);
    }
}
