use crate::backend::MatrixMultiplyBackend;
use crate::error::{GemmError, Result};
use crate::layout::{Gemm, MatrixLayout};

/// A dense row-major `f32` matrix that owns its storage.
///
/// Rows are packed, so the leading dimension equals `cols`. Sub-views into a
/// larger buffer are expressed at call sites as a slice plus a leading
/// dimension rather than through this type.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl Matrix {
    /// Create a matrix from row-major data.
    ///
    /// # Panics
    /// Panics if `data.len() != rows * cols`.
    pub fn new(data: Vec<f32>, rows: usize, cols: usize) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "data length {} does not match {}x{} matrix",
            data.len(),
            rows,
            cols
        );
        Matrix { data, rows, cols }
    }

    /// Create a zero-filled matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Leading dimension (row stride in elements).
    pub fn ld(&self) -> usize {
        self.cols
    }

    pub fn layout(&self) -> MatrixLayout {
        MatrixLayout::new(self.rows, self.cols)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Element at row `i`, column `j`.
    ///
    /// # Panics
    /// Panics if the index is out of range.
    pub fn get(&self, i: usize, j: usize) -> f32 {
        assert!(i < self.rows && j < self.cols, "index ({i}, {j}) out of range");
        self.data[i * self.cols + j]
    }

    /// Physically transposed copy.
    pub fn transpose(&self) -> Matrix {
        let mut out = vec![0.0; self.data.len()];
        for i in 0..self.rows {
            for j in 0..self.cols {
                out[j * self.rows + i] = self.data[i * self.cols + j];
            }
        }
        Matrix::new(out, self.cols, self.rows)
    }

    /// Matrix product `self @ other` computed on `backend`.
    pub fn matmul(&self, other: &Matrix, backend: &dyn MatrixMultiplyBackend) -> Result<Matrix> {
        if self.cols != other.rows {
            return Err(GemmError::MatmulMismatch {
                m: self.rows,
                k: self.cols,
                k2: other.rows,
                n: other.cols,
            });
        }

        let op = Gemm::new(self.rows, other.cols, self.cols);
        let mut out = Matrix::zeros(self.rows, other.cols);
        backend.gemm(
            &op,
            &self.data,
            self.ld(),
            &other.data,
            other.ld(),
            &mut out.data,
            out.cols,
        )?;
        Ok(out)
    }
}
