//! Transpose-variant host kernels.
//!
//! Every kernel accumulates `alpha * op(A) * op(B)` into `C`; none of them
//! touches `beta`. Loop order keeps the innermost loop stride-1 for the
//! operands it streams, and fixes the floating-point summation order.

#![allow(clippy::too_many_arguments)]

/// `C += alpha * A * B`, loop order i -> k -> j.
pub fn gemm_nn(
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: &[f32],
    lda: usize,
    b: &[f32],
    ldb: usize,
    c: &mut [f32],
    ldc: usize,
) {
    for i in 0..m {
        let c_row = &mut c[i * ldc..i * ldc + n];
        for p in 0..k {
            let a_part = alpha * a[i * lda + p];
            let b_row = &b[p * ldb..p * ldb + n];
            for (cv, &bv) in c_row.iter_mut().zip(b_row) {
                *cv += a_part * bv;
            }
        }
    }
}

/// `C += alpha * A * B^T`, loop order i -> j -> k with a scalar sum.
pub fn gemm_nt(
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: &[f32],
    lda: usize,
    b: &[f32],
    ldb: usize,
    c: &mut [f32],
    ldc: usize,
) {
    for i in 0..m {
        let a_row = &a[i * lda..i * lda + k];
        for j in 0..n {
            let b_row = &b[j * ldb..j * ldb + k];
            let mut sum = 0.0f32;
            for (&av, &bv) in a_row.iter().zip(b_row) {
                sum += alpha * av * bv;
            }
            c[i * ldc + j] += sum;
        }
    }
}

/// `C += alpha * A^T * B`, loop order i -> k -> j with A read column-wise.
pub fn gemm_tn(
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: &[f32],
    lda: usize,
    b: &[f32],
    ldb: usize,
    c: &mut [f32],
    ldc: usize,
) {
    for i in 0..m {
        let c_row = &mut c[i * ldc..i * ldc + n];
        for p in 0..k {
            let a_part = alpha * a[p * lda + i];
            let b_row = &b[p * ldb..p * ldb + n];
            for (cv, &bv) in c_row.iter_mut().zip(b_row) {
                *cv += a_part * bv;
            }
        }
    }
}

/// `C += alpha * A^T * B^T`, loop order i -> j -> k with a scalar sum.
pub fn gemm_tt(
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: &[f32],
    lda: usize,
    b: &[f32],
    ldb: usize,
    c: &mut [f32],
    ldc: usize,
) {
    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0f32;
            for p in 0..k {
                sum += alpha * a[i + p * lda] * b[p + j * ldb];
            }
            c[i * ldc + j] += sum;
        }
    }
}
