use std::fmt;

use crate::error::{GemmError, Operand, Result};

/// Whether an operand is used as stored or logically transposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Transpose {
    #[default]
    NoTrans,
    Trans,
}

impl Transpose {
    /// Maps the C int-as-bool convention: zero is `NoTrans`, anything else `Trans`.
    pub fn from_flag(flag: i32) -> Self {
        if flag == 0 {
            Transpose::NoTrans
        } else {
            Transpose::Trans
        }
    }

    pub fn is_trans(self) -> bool {
        self == Transpose::Trans
    }
}

/// One of the four (op(A), op(B)) kernel combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GemmVariant {
    NN,
    NT,
    TN,
    TT,
}

impl GemmVariant {
    pub fn select(trans_a: Transpose, trans_b: Transpose) -> Self {
        match (trans_a, trans_b) {
            (Transpose::NoTrans, Transpose::NoTrans) => GemmVariant::NN,
            (Transpose::NoTrans, Transpose::Trans) => GemmVariant::NT,
            (Transpose::Trans, Transpose::NoTrans) => GemmVariant::TN,
            (Transpose::Trans, Transpose::Trans) => GemmVariant::TT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GemmVariant::NN => "nn",
            GemmVariant::NT => "nt",
            GemmVariant::TN => "tn",
            GemmVariant::TT => "tt",
        }
    }
}

impl fmt::Display for GemmVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation descriptor for C <- alpha * op(A) * op(B) + beta * C.
///
/// `A` is `m x k` (or `k x m` when transposed), `B` is `k x n` (or `n x k`),
/// and `C` is always `m x n`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gemm {
    pub trans_a: Transpose,
    pub trans_b: Transpose,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub alpha: f32,
    pub beta: f32,
}

impl Gemm {
    /// Plain product `C = A @ B`: no transposes, alpha 1, beta 0.
    pub fn new(m: usize, n: usize, k: usize) -> Self {
        Gemm {
            trans_a: Transpose::NoTrans,
            trans_b: Transpose::NoTrans,
            m,
            n,
            k,
            alpha: 1.0,
            beta: 0.0,
        }
    }

    pub fn with_transpose(mut self, trans_a: Transpose, trans_b: Transpose) -> Self {
        self.trans_a = trans_a;
        self.trans_b = trans_b;
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_beta(mut self, beta: f32) -> Self {
        self.beta = beta;
        self
    }

    pub fn variant(&self) -> GemmVariant {
        GemmVariant::select(self.trans_a, self.trans_b)
    }

    /// Stored layout of A.
    pub fn layout_a(&self) -> MatrixLayout {
        match self.trans_a {
            Transpose::NoTrans => MatrixLayout::new(self.m, self.k),
            Transpose::Trans => MatrixLayout::new(self.k, self.m),
        }
    }

    /// Stored layout of B.
    pub fn layout_b(&self) -> MatrixLayout {
        match self.trans_b {
            Transpose::NoTrans => MatrixLayout::new(self.k, self.n),
            Transpose::Trans => MatrixLayout::new(self.n, self.k),
        }
    }

    /// Stored layout of C.
    pub fn layout_c(&self) -> MatrixLayout {
        MatrixLayout::new(self.m, self.n)
    }

    /// Elements spanned by A, B and C for the given leading dimensions.
    pub fn extents(&self, lda: usize, ldb: usize, ldc: usize) -> Result<[usize; 3]> {
        Ok([
            self.layout_a().required_len(Operand::A, lda)?,
            self.layout_b().required_len(Operand::B, ldb)?,
            self.layout_c().required_len(Operand::C, ldc)?,
        ])
    }

    /// Checks leading dimensions and buffer lengths for all three operands
    /// and returns their extents.
    ///
    /// `*_len` is the number of elements available starting at the operand's
    /// first element (after any offset has been applied).
    pub fn check(
        &self,
        a_len: usize,
        lda: usize,
        b_len: usize,
        ldb: usize,
        c_len: usize,
        ldc: usize,
    ) -> Result<[usize; 3]> {
        Ok([
            self.layout_a().check(Operand::A, a_len, lda)?,
            self.layout_b().check(Operand::B, b_len, ldb)?,
            self.layout_c().check(Operand::C, c_len, ldc)?,
        ])
    }
}

/// Stored (physical) shape of a row-major matrix, independent of its stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatrixLayout {
    pub rows: usize,
    pub cols: usize,
}

impl MatrixLayout {
    pub fn new(rows: usize, cols: usize) -> Self {
        MatrixLayout { rows, cols }
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Smallest legal leading dimension.
    pub fn min_ld(&self) -> usize {
        self.cols
    }

    /// Number of elements spanned from the first to the last element when
    /// rows are `ld` apart. The trailing row is not padded out to `ld`.
    ///
    /// `None` when the span does not fit in `usize`.
    pub fn extent(&self, ld: usize) -> Option<usize> {
        if self.is_empty() {
            return Some(0);
        }
        (self.rows - 1).checked_mul(ld)?.checked_add(self.cols)
    }

    /// Validates `ld` and returns the extent it implies.
    pub fn required_len(&self, operand: Operand, ld: usize) -> Result<usize> {
        if ld < self.min_ld() {
            return Err(GemmError::LeadingDimension {
                operand,
                ld,
                min: self.min_ld(),
            });
        }
        self.extent(ld).ok_or(GemmError::ExtentOverflow { operand, ld })
    }

    /// Validates `ld` against a buffer of `len` elements and returns the extent.
    pub fn check(&self, operand: Operand, len: usize, ld: usize) -> Result<usize> {
        let needed = self.required_len(operand, ld)?;
        if len < needed {
            return Err(GemmError::BufferTooSmall {
                operand,
                needed,
                got: len,
            });
        }
        Ok(needed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flag() {
        assert_eq!(Transpose::from_flag(0), Transpose::NoTrans);
        assert_eq!(Transpose::from_flag(1), Transpose::Trans);
        assert_eq!(Transpose::from_flag(-3), Transpose::Trans);
    }

    #[test]
    fn test_variant_select() {
        use Transpose::*;
        assert_eq!(GemmVariant::select(NoTrans, NoTrans), GemmVariant::NN);
        assert_eq!(GemmVariant::select(NoTrans, Trans), GemmVariant::NT);
        assert_eq!(GemmVariant::select(Trans, NoTrans), GemmVariant::TN);
        assert_eq!(GemmVariant::select(Trans, Trans), GemmVariant::TT);
    }

    #[test]
    fn test_transposed_layouts() {
        let op = Gemm::new(3, 4, 5).with_transpose(Transpose::Trans, Transpose::Trans);
        assert_eq!(op.layout_a(), MatrixLayout::new(5, 3));
        assert_eq!(op.layout_b(), MatrixLayout::new(4, 5));
        assert_eq!(op.layout_c(), MatrixLayout::new(3, 4));
    }

    #[test]
    fn test_extent_with_padding() {
        // 3 rows of 4 inside rows of 10: last row is not padded.
        let l = MatrixLayout::new(3, 4);
        assert_eq!(l.extent(10), Some(24));
        assert_eq!(l.extent(4), Some(12));
        assert_eq!(MatrixLayout::new(0, 4).extent(10), Some(0));
        assert_eq!(MatrixLayout::new(4, 0).extent(10), Some(0));
        assert_eq!(MatrixLayout::new(1, 4).extent(usize::MAX), Some(4));
        assert_eq!(l.extent(usize::MAX / 2), None);
    }

    #[test]
    fn test_check_leading_dimension() {
        let op = Gemm::new(2, 2, 3);
        let err = op.check(6, 2, 6, 2, 4, 2).unwrap_err();
        assert!(matches!(
            err,
            GemmError::LeadingDimension {
                operand: Operand::A,
                ld: 2,
                min: 3
            }
        ));
    }

    #[test]
    fn test_check_buffer_too_small() {
        let op = Gemm::new(2, 2, 2);
        let err = op.check(4, 2, 4, 2, 3, 2).unwrap_err();
        assert!(matches!(
            err,
            GemmError::BufferTooSmall {
                operand: Operand::C,
                needed: 4,
                got: 3
            }
        ));
        assert_eq!(op.check(4, 2, 4, 2, 4, 2).unwrap(), [4, 4, 4]);
    }

    #[test]
    fn test_check_huge_leading_dimension() {
        let op = Gemm::new(3, 2, 2);
        let err = op.check(4, usize::MAX / 2, 4, 2, 6, 2).unwrap_err();
        assert!(matches!(
            err,
            GemmError::ExtentOverflow {
                operand: Operand::A,
                ..
            }
        ));

        // A single row never multiplies by ld.
        let op = Gemm::new(1, 2, 2);
        assert_eq!(op.check(2, usize::MAX, 4, 2, 2, 2).unwrap(), [2, 4, 2]);
    }

    #[test]
    fn test_extents_with_padding() {
        let op = Gemm::new(3, 4, 5).with_transpose(Transpose::Trans, Transpose::NoTrans);
        // A stored 5x3, B 5x4, C 3x4.
        assert_eq!(op.extents(8, 6, 4).unwrap(), [4 * 8 + 3, 4 * 6 + 4, 12]);
        assert!(op.extents(2, 6, 4).is_err());
    }

    #[test]
    fn test_check_zero_extent_accepts_empty_buffers() {
        let op = Gemm::new(0, 5, 0);
        assert!(op.check(0, 0, 0, 5, 0, 5).is_ok());
    }
}
