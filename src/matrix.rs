//! Dense row-major matrices handed to the multiply pipeline.

use crate::error::{Error, Result};
use std::fmt;

/// Shape and element access the multiply pipeline needs from a matrix.
///
/// `width` is the number of columns and `height` the number of rows.
pub trait MatrixLike: Sized {
    fn width(&self) -> usize;

    fn height(&self) -> usize;

    fn value(&self, row: usize, col: usize) -> f32;

    /// Build a `rows` x `cols` matrix from row-major data.
    fn from_row_major(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self>;
}

/// Row-major `f32` matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self> {
        let cols = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(Error::invalid_argument(format!(
                    "row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    cols
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    /// Returns false when the position is outside the matrix.
    pub fn set(&mut self, row: usize, col: usize, value: f32) -> bool {
        if row < self.rows && col < self.cols {
            self.data[row * self.cols + col] = value;
            true
        } else {
            false
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Naive host-side product, used as the reference for device results.
    pub fn multiply_naive(&self, other: &Matrix) -> Result<Matrix> {
        if self.cols != other.rows {
            return Err(Error::dimension_mismatch(format!(
                "cannot multiply {}x{} by {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut out = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for j in 0..other.cols {
                let mut acc = 0.0f32;
                for k in 0..self.cols {
                    acc += self.data[i * self.cols + k] * other.data[k * other.cols + j];
                }
                out.data[i * other.cols + j] = acc;
            }
        }
        Ok(out)
    }
}

impl MatrixLike for Matrix {
    fn width(&self) -> usize {
        self.cols
    }

    fn height(&self) -> usize {
        self.rows
    }

    fn value(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    fn from_row_major(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::dimension_mismatch(format!(
                "{} elements cannot form a {}x{} matrix",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self { rows, cols, data })
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.data.chunks(self.cols.max(1)).take(self.rows) {
            let cells: Vec<String> = row.iter().map(|v| format!("{:>10.4}", v)).collect();
            writeln!(f, "[{}]", cells.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_rejects_ragged_input() {
        let rows: Vec<Vec<f32>> = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(matches!(Matrix::from_rows(&rows), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_get_set_bounds() {
        let mut m = Matrix::zeros(2, 3);
        assert!(m.set(1, 2, 5.0));
        assert!(!m.set(2, 0, 1.0));
        assert_eq!(m.get(1, 2), Some(5.0));
        assert_eq!(m.get(0, 3), None);
        assert_eq!(m.width(), 3);
        assert_eq!(m.height(), 2);
    }

    #[test]
    fn test_naive_product() {
        let a = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let b = Matrix::from_rows(&[[5.0, 6.0], [7.0, 8.0]]).unwrap();
        let c = a.multiply_naive(&b).unwrap();
        assert_eq!(c.as_slice(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_from_row_major_checks_length() {
        assert!(Matrix::from_row_major(2, 2, vec![1.0; 3]).is_err());
        let m = Matrix::from_row_major(1, 3, vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(m.value(0, 2), 3.0);
    }
}
