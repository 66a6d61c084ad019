//! The systolic-array GEMM intrinsic boundary.
//!
//! The accelerator's GEMM is a capability the orchestrator is polymorphic
//! over (spec §9): it never matches on a kernel-kind tag, it just calls
//! `compute` through a `&dyn GemmKernel`. The scalar implementation here is
//! the one the test harness and `harness` binary supply; a hardware-backed
//! target would supply another behind the same trait, the way
//! `burn-compute`'s `ComputeServer` treats execution as an associated
//! capability rather than a fixed function.

/// `sc_C[m,n] += sum_k sc_A[m,k] * sc_B[k,n]` over a `tm x tn x tk` cube.
///
/// All three buffers are row-major and sized exactly `tm*tk`, `tk*tn`,
/// `tm*tn`. Implementations may accept tile sizes smaller than 32; the
/// orchestrator always calls with `tm = tn = tk = 32`.
pub trait GemmKernel {
    /// Performs the accumulate. `sc_c` is read-modify-write.
    fn compute(&self, sc_c: &mut [f32], sc_a: &[f32], sc_b: &[f32], tm: usize, tn: usize, tk: usize);
}

/// A bit-correct scalar reference GEMM, assumed correct per spec §1's
/// out-of-scope list ("the GEMM intrinsic itself, assumed bit-correct").
#[derive(Debug, Default, Clone, Copy)]
pub struct ScalarGemm;

impl GemmKernel for ScalarGemm {
    fn compute(&self, sc_c: &mut [f32], sc_a: &[f32], sc_b: &[f32], tm: usize, tn: usize, tk: usize) {
        debug_assert_eq!(sc_a.len(), tm * tk);
        debug_assert_eq!(sc_b.len(), tk * tn);
        debug_assert_eq!(sc_c.len(), tm * tn);

        for m in 0..tm {
            for n in 0..tn {
                let mut acc = sc_c[m * tn + n];
                for k in 0..tk {
                    acc += sc_a[m * tk + k] * sc_b[k * tn + n];
                }
                sc_c[m * tn + n] = acc;
            }
        }
    }
}
