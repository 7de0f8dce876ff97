//! Metal backend checked against the host backend.
//!
//! Every test returns early on machines without a Metal device.

#![cfg(feature = "metal")]

use mm_gemm::metal::DeviceKernel;
use mm_gemm::{
    CpuBackend, DeviceBuffer, DeviceConfig, DeviceStrides, Gemm, GemmError,
    MatrixMultiplyBackend, MetalBackend, Transpose,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const VARIANTS: [(Transpose, Transpose); 4] = [
    (Transpose::NoTrans, Transpose::NoTrans),
    (Transpose::NoTrans, Transpose::Trans),
    (Transpose::Trans, Transpose::NoTrans),
    (Transpose::Trans, Transpose::Trans),
];

fn device() -> Option<MetalBackend> {
    match MetalBackend::new() {
        Ok(backend) => Some(backend),
        Err(e) => {
            eprintln!("skipping: {e}");
            None
        }
    }
}

fn random_vec(rng: &mut StdRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}

fn assert_close(got: &[f32], want: &[f32], tol: f32) {
    assert_eq!(got.len(), want.len());
    for (idx, (g, w)) in got.iter().zip(want).enumerate() {
        let scale = w.abs().max(1.0);
        assert!((g - w).abs() <= tol * scale, "element {idx}: got {g}, want {w}");
    }
}

#[test]
fn device_matches_host_across_sizes() {
    let Some(metal) = device() else { return };
    let cpu = CpuBackend::new();
    let mut rng = StdRng::seed_from_u64(42);

    let sizes = [
        (17, 10, 10),
        (64, 64, 64),
        (100, 10, 100),
        (333, 17, 29),
        (1000, 10, 100),
    ];
    for (m, n, k) in sizes {
        for (ta, tb) in VARIANTS {
            let op = Gemm::new(m, n, k)
                .with_transpose(ta, tb)
                .with_alpha(1.0)
                .with_beta(1.0);
            let lda = op.layout_a().cols;
            let ldb = op.layout_b().cols;
            let a = random_vec(&mut rng, m * k);
            let b = random_vec(&mut rng, k * n);
            let c = random_vec(&mut rng, m * n);

            let mut want = c.clone();
            cpu.gemm(&op, &a, lda, &b, ldb, &mut want, n).unwrap();
            let mut got = c;
            metal.gemm(&op, &a, lda, &b, ldb, &mut got, n).unwrap();
            assert_close(&got, &want, 1e-4);
        }
    }
}

#[test]
fn default_geometry_fits_the_device() {
    let Some(metal) = device() else { return };
    let limit = metal.context().max_threads_per_group();
    let block = metal.config().block;
    assert!(block * block <= limit, "block {block} exceeds {limit} threads");
    assert_eq!(*metal.config(), DeviceConfig::fitted(limit).unwrap());
}

#[test]
fn beta_zero_overwrites_nan_on_device() {
    let Some(metal) = device() else { return };
    let a = [1.0, 2.0, 3.0, 4.0];
    let b = [5.0, 6.0, 7.0, 8.0];
    let mut c = [f32::NAN; 4];
    metal.gemm(&Gemm::new(2, 2, 2), &a, 2, &b, 2, &mut c, 2).unwrap();
    assert_eq!(c, [19.0, 22.0, 43.0, 50.0]);
}

#[test]
fn zero_k_scales_on_device() {
    let Some(metal) = device() else { return };
    let mut c = [1.0, 2.0, 3.0, 4.0];
    let op = Gemm::new(2, 2, 0).with_beta(2.0);
    metal.gemm(&op, &[], 0, &[], 2, &mut c, 2).unwrap();
    assert_eq!(c, [2.0, 4.0, 6.0, 8.0]);
}

#[test]
fn offsets_into_shared_buffers() {
    let Some(metal) = device() else { return };
    let cpu = CpuBackend::new();
    let mut rng = StdRng::seed_from_u64(5);

    // One device tensor holds A, B and C back to back.
    let (m, n, k) = (31, 23, 19);
    let op = Gemm::new(m, n, k).with_alpha(0.5).with_beta(2.0);
    let (a_off, b_off, c_off) = (7, 7 + m * k + 3, 7 + m * k + 3 + k * n + 11);
    let host = random_vec(&mut rng, c_off + m * n + 5);

    let mut want = host.clone();
    {
        let (front, c_part) = want.split_at_mut(c_off);
        cpu.gemm(&op, &front[a_off..], k, &front[b_off..], n, c_part, n)
            .unwrap();
    }

    let lhs = metal.upload(&host).unwrap();
    let rhs = metal.upload(&host).unwrap();
    let out = metal.upload(&host).unwrap();
    let strides = DeviceStrides {
        a_off,
        lda: k,
        b_off,
        ldb: n,
        c_off,
        ldc: n,
    };
    metal.gemm_on_device(&op, &lhs, &rhs, &out, &strides).unwrap();

    let got = out.to_vec();
    assert_eq!(got[..c_off], host[..c_off]);
    assert_eq!(got[c_off + m * n..], host[c_off + m * n..]);
    assert_close(&got[c_off..c_off + m * n], &want[c_off..c_off + m * n], 1e-4);
}

#[test]
fn kernels_compile_once() {
    let Some(metal) = device() else { return };
    assert!(!metal.registry().is_compiled(DeviceKernel::Nt));
    let op = Gemm::new(3, 3, 3).with_transpose(Transpose::NoTrans, Transpose::Trans);
    let mut c = [0.0; 9];
    for _ in 0..3 {
        metal.gemm(&op, &[1.0; 9], 3, &[1.0; 9], 3, &mut c, 3).unwrap();
    }
    assert!(metal.registry().is_compiled(DeviceKernel::Nt));
    assert!(!metal.registry().is_compiled(DeviceKernel::Tt));
    assert_eq!(c, [3.0; 9]);
}

#[test]
fn fast_kernel_rejects_transposes() {
    let Some(metal) = device() else { return };
    let op = Gemm::new(2, 2, 2).with_transpose(Transpose::Trans, Transpose::NoTrans);
    let mut c = [0.0; 4];
    let err = metal
        .gemm_fast(&op, &[1.0; 4], 2, &[1.0; 4], 2, &mut c, 2)
        .unwrap_err();
    assert!(matches!(err, GemmError::UnsupportedVariant { .. }));
}

#[test]
fn fast_kernel_matches_host_on_ragged_sizes() {
    let Some(metal) = device() else { return };
    let cpu = CpuBackend::new();
    let mut rng = StdRng::seed_from_u64(9);
    for (m, n, k) in [(1, 1, 1), (65, 130, 17), (200, 70, 33)] {
        let op = Gemm::new(m, n, k).with_alpha(1.25).with_beta(-0.5);
        let a = random_vec(&mut rng, m * k);
        let b = random_vec(&mut rng, k * n);
        let c = random_vec(&mut rng, m * n);

        let mut want = c.clone();
        cpu.gemm(&op, &a, k, &b, n, &mut want, n).unwrap();
        let mut got = c;
        metal.gemm_fast(&op, &a, k, &b, n, &mut got, n).unwrap();
        assert_close(&got, &want, 1e-4);
    }
}

#[test]
fn fast_kernel_matches_general_kernel_large() {
    let Some(metal) = device() else { return };
    let mut rng = StdRng::seed_from_u64(2048);
    let size = 2048;
    let op = Gemm::new(size, size, size);
    let a = metal.upload(&random_vec(&mut rng, size * size)).unwrap();
    let b = metal.upload(&random_vec(&mut rng, size * size)).unwrap();
    let general = metal.upload(&vec![0.0; size * size]).unwrap();
    let fast = metal.upload(&vec![0.0; size * size]).unwrap();
    let strides = DeviceStrides::packed(size, size, size);

    metal.gemm_on_device(&op, &a, &b, &general, &strides).unwrap();
    metal.gemm_on_device_fast(&op, &a, &b, &fast, &strides).unwrap();
    assert_close(&fast.to_vec(), &general.to_vec(), 1e-3);
}

#[test]
fn device_buffers_are_reusable() {
    let Some(metal) = device() else { return };
    let ctx = metal.context();
    let a = metal.upload(&[1.0, 2.0, 3.0, 4.0]).unwrap();
    let mut b = DeviceBuffer::zeroed(ctx, 4).unwrap();
    let c = DeviceBuffer::zeroed(ctx, 4).unwrap();
    let strides = DeviceStrides::packed(2, 2, 2);
    let op = Gemm::new(2, 2, 2);

    metal.gemm_on_device(&op, &a, &b, &c, &strides).unwrap();
    assert_eq!(c.to_vec(), vec![0.0; 4]);

    b.write_from(0, &[5.0, 6.0, 7.0, 8.0]).unwrap();
    metal.gemm_on_device(&op, &a, &b, &c, &strides).unwrap();
    let mut out = [0.0; 4];
    c.read_into(&mut out).unwrap();
    assert_eq!(out, [19.0, 22.0, 43.0, 50.0]);

    assert!(matches!(
        b.write_from(3, &[1.0, 2.0]),
        Err(GemmError::OutOfRange { start: 3, end: 5, len: 4 })
    ));
    assert!(matches!(
        c.read_into(&mut [0.0; 5]),
        Err(GemmError::OutOfRange { .. })
    ));
}
