//! Kernel flattening: reshapes the weight tensor into GEMM-B, once per
//! `conv2d` call, entirely in DRAM (no scratchpad involvement, spec §4.D).

use crate::tensor::KernelTensor;

/// Builds `b_flat`, a `[k, n] = [cin*kh*kw, cout]` row-major matrix with
/// `b_flat[k_flat * n + n_idx] == kernel[n_idx, c, r, w]` where `(c, r, w)`
/// is the mixed-radix decomposition of `k_flat` in `(cin, kh, kw)` (spec
/// invariant 5).
pub fn flatten_kernel(kernel: &KernelTensor) -> Vec<f32> {
    let (cin, kh, kw) = (kernel.cin(), kernel.kh(), kernel.kw());
    let k_flat_size = kh * kw;
    let k = cin * k_flat_size;
    let n = kernel.cout();

    let mut b_flat = vec![0.0f32; k * n];
    for n_idx in 0..n {
        for k_idx in 0..k {
            let c = k_idx / k_flat_size;
            let r = (k_idx % k_flat_size) / kw;
            let w = k_idx % kw;
            b_flat[k_idx * n + n_idx] = kernel.at(n_idx, c, r, w);
        }
    }
    b_flat
}
