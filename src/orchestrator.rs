//! The tiling orchestrator: computes output shape, picks the spatial
//! block size the scratchpad can hold, and walks every (output-block,
//! output-channel-tile, reduction) triple, driving the DMA, im2col and
//! GEMM components (spec §4.G).

use crate::dma::{load_b_tile, load_spatial_tile, store_c_tile, OutputBlock};
use crate::error::ConvError;
use crate::gemm::GemmKernel;
use crate::im2col::{build_row, Im2colGeometry};
use crate::kernel_flatten::flatten_kernel;
use crate::tensor::{calculate_conv_output_size, ConvParams, KernelTensor, Tensor};

/// Systolic-array tile constants. Fixed per spec invariant 1; the
/// orchestrator never picks smaller ones.
pub const T_M: usize = 32;
pub const T_N: usize = 32;
pub const T_K: usize = 32;

/// Cap on the spatial tile's height/width (spec invariant 2).
pub const MAX_SPATIAL_TILE_DIM: usize = 64;

/// Runs a tiled direct convolution via im2col-in-scratchpad + GEMM.
///
/// `output` is resized to the derived `(1, c_out, o_h, o_w)` shape and
/// fully written; `gemm` supplies the systolic-array intrinsic (spec §9:
/// the orchestrator is polymorphic over any `GemmKernel`, it never
/// hardcodes one).
pub fn conv2d(
    output: &mut Tensor,
    input: &Tensor,
    kernel: &KernelTensor,
    params: &ConvParams,
    gemm: &dyn GemmKernel,
) -> Result<(), ConvError> {
    if input.n() > 1 {
        return Err(ConvError::BatchUnsupported { n: input.n() });
    }

    let k_eff_h = (kernel.kh() - 1) * params.dilation + 1;
    let k_eff_w = (kernel.kw() - 1) * params.dilation + 1;
    let padded_h = input.h() + 2 * params.padding;
    let padded_w = input.w() + 2 * params.padding;
    if k_eff_h > padded_h || k_eff_w > padded_w {
        return Err(ConvError::InvalidParams(format!(
            "kernel receptive field {k_eff_h}x{k_eff_w} does not fit the padded input {padded_h}x{padded_w}"
        )));
    }

    let o_h = calculate_conv_output_size(input.h(), kernel.kh(), params.stride, params.padding, params.dilation);
    let o_w = calculate_conv_output_size(input.w(), kernel.kw(), params.stride, params.padding, params.dilation);

    let m = o_h * o_w;
    let n = kernel.cout();
    let k = kernel.cin() * kernel.kh() * kernel.kw();

    if k_eff_h > T_M || k_eff_w > T_M {
        return Err(ConvError::SpatialTileTooLarge {
            t_h: k_eff_h,
            t_w: k_eff_w,
            max: MAX_SPATIAL_TILE_DIM,
        });
    }

    // Largest output block (BLK_H, BLK_W) whose receptive field still fits
    // a 32x32 spatial tile (spec §4.G step 3).
    let blk_h = ((T_M - k_eff_h) / params.stride + 1).max(1);
    let blk_w = ((T_M - k_eff_w) / params.stride + 1).max(1);
    let t_h_req = (blk_h - 1) * params.stride + k_eff_h;
    let t_w_req = (blk_w - 1) * params.stride + k_eff_w;
    if t_h_req > MAX_SPATIAL_TILE_DIM || t_w_req > MAX_SPATIAL_TILE_DIM {
        return Err(ConvError::SpatialTileTooLarge {
            t_h: t_h_req,
            t_w: t_w_req,
            max: MAX_SPATIAL_TILE_DIM,
        });
    }
    let t_h = t_h_req.max(T_M);
    let t_w = t_w_req.max(T_M);

    output.resize_to(1, n, o_h, o_w);

    log::debug!(
        "conv2d: M={m} N={n} K={k}, output block {blk_h}x{blk_w}, spatial tile {t_h}x{t_w}"
    );

    let b_flat = flatten_kernel(kernel);

    let mut sc_raw = vec![0.0f32; kernel.cin() * t_h * t_w];
    let mut sc_a = vec![0.0f32; T_M * T_K];
    let mut sc_b = vec![0.0f32; T_K * T_N];
    let mut sc_c = vec![0.0f32; T_M * T_N];

    // 2D output-block walk (spec §4.G step 5): each block's receptive field
    // fits exactly one `t_h x t_w` spatial tile, so every patch inside it
    // can be im2col'd against that single load.
    let mut h_blk = 0usize;
    while h_blk < o_h {
        let block_h = blk_h.min(o_h - h_blk);
        let in_h_start = (h_blk * params.stride) as isize - params.padding as isize;

        let mut w_blk = 0usize;
        while w_blk < o_w {
            let block_w = blk_w.min(o_w - w_blk);
            let in_w_start = (w_blk * params.stride) as isize - params.padding as isize;

            load_spatial_tile(&mut sc_raw, input, kernel.cin(), t_h, t_w, in_h_start, in_w_start);
            log::trace!("loaded spatial tile at global ({in_h_start}, {in_w_start}) for block ({h_blk}, {w_blk})");

            let block = OutputBlock::new(h_blk, w_blk, block_w, block_h * block_w);
            let geom = Im2colGeometry::new(
                kernel.kh(),
                kernel.kw(),
                kernel.cin(),
                o_h,
                o_w,
                t_h,
                t_w,
                in_h_start,
                in_w_start,
            );

            let mut j = 0usize;
            while j < n {
                let mut local_start = 0usize;
                while local_start < block.patch_count {
                    sc_c.iter_mut().for_each(|x| *x = 0.0);

                    let mut k_start = 0usize;
                    while k_start < k.max(T_K) {
                        load_b_tile(&mut sc_b, &b_flat, k, n, k_start, j, T_K, T_N);

                        for m_local in 0..T_M {
                            let local_patch = local_start + m_local;
                            let row = &mut sc_a[m_local * T_K..(m_local + 1) * T_K];
                            // Patches past this block's patch count have no
                            // corresponding output coordinate at all.
                            if local_patch >= block.patch_count {
                                row.iter_mut().for_each(|x| *x = 0.0);
                            } else {
                                let local_row = local_patch / block.block_w;
                                let local_col = local_patch % block.block_w;
                                let global_patch = (h_blk + local_row) * o_w + (w_blk + local_col);
                                build_row(row, &sc_raw, params, &geom, global_patch, k_start);
                            }
                        }

                        gemm.compute(&mut sc_c, &sc_a, &sc_b, T_M, T_N, T_K);
                        k_start += T_K;
                    }

                    store_c_tile(output, &sc_c, &block, local_start, j, T_M, T_N);
                    local_start += T_M;
                }
                j += T_N;
            }

            w_blk += blk_w;
        }

        h_blk += blk_h;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemm::ScalarGemm;
    use crate::reference::conv2d_direct;
    use float_cmp::approx_eq;
    use pretty_assertions::assert_eq;

    fn assert_tensors_close(a: &Tensor, b: &Tensor, tol: f32) {
        assert_eq!((a.n(), a.c(), a.h(), a.w()), (b.n(), b.c(), b.h(), b.w()));
        for (idx, (&x, &y)) in a.data().iter().zip(b.data()).enumerate() {
            assert!(
                approx_eq!(f32, x, y, epsilon = tol),
                "mismatch at {idx}: {x} vs {y}"
            );
        }
    }

    #[test]
    fn rejects_batch_greater_than_one() {
        let input = Tensor::zeros(2, 1, 4, 4);
        let kernel = KernelTensor::new(vec![1.0], 1, 1, 1, 1);
        let params = ConvParams::default();
        let mut output = Tensor::zeros(1, 1, 1, 1);
        let err = conv2d(&mut output, &input, &kernel, &params, &ScalarGemm).unwrap_err();
        assert_eq!(err, ConvError::BatchUnsupported { n: 2 });
    }

    #[test]
    fn rejects_kernel_larger_than_padded_input() {
        let input = Tensor::zeros(1, 1, 5, 5);
        let kernel = KernelTensor::new(vec![0.0; 16], 1, 1, 4, 4);
        let params = ConvParams::new(1, 0, 2).unwrap(); // k_eff = 7 > 5
        let mut output = Tensor::zeros(1, 1, 1, 1);
        let err = conv2d(&mut output, &input, &kernel, &params, &ScalarGemm).unwrap_err();
        assert!(matches!(err, ConvError::InvalidParams(_)));
    }

    #[test]
    fn tiny_identity_kernel() {
        // Spec §8 scenario 1.
        let mut ch0: Vec<f32> = (0..25).map(|x| x as f32).collect();
        let mut ch1: Vec<f32> = (100..125).map(|x| x as f32).collect();
        let mut data = Vec::new();
        data.append(&mut ch0);
        data.append(&mut ch1);
        let input = Tensor::new(data, 1, 2, 5, 5);

        let mut kdata = vec![0.0; 2 * 2 * 3 * 3];
        // K[0,0,1,1] = 1
        kdata[0 * (2 * 9) + 0 * 9 + 1 * 3 + 1] = 1.0;
        // K[1,1,1,1] = 1
        kdata[1 * (2 * 9) + 1 * 9 + 1 * 3 + 1] = 1.0;
        let kernel = KernelTensor::new(kdata, 2, 2, 3, 3);

        let params = ConvParams::new(1, 0, 1).unwrap();
        let mut output = Tensor::zeros(1, 1, 1, 1);
        conv2d(&mut output, &input, &kernel, &params, &ScalarGemm).unwrap();

        assert_eq!((output.h(), output.w()), (3, 3));
        let expect_ch0 = [6., 7., 8., 11., 12., 13., 16., 17., 18.];
        let expect_ch1 = [106., 107., 108., 111., 112., 113., 116., 117., 118.];
        for h in 0..3 {
            for w in 0..3 {
                assert_eq!(output.get(0, h, w).unwrap(), expect_ch0[(h * 3 + w) as usize]);
                assert_eq!(output.get(1, h, w).unwrap(), expect_ch1[(h * 3 + w) as usize]);
            }
        }
    }

    #[test]
    fn stride_two() {
        // Spec §8 scenario 2.
        let mut ch0: Vec<f32> = (0..25).map(|x| x as f32).collect();
        let mut ch1: Vec<f32> = (100..125).map(|x| x as f32).collect();
        let mut data = Vec::new();
        data.append(&mut ch0);
        data.append(&mut ch1);
        let input = Tensor::new(data, 1, 2, 5, 5);

        let mut kdata = vec![0.0; 2 * 2 * 3 * 3];
        kdata[0 * (2 * 9) + 0 * 9 + 1 * 3 + 1] = 1.0;
        kdata[1 * (2 * 9) + 1 * 9 + 1 * 3 + 1] = 1.0;
        let kernel = KernelTensor::new(kdata, 2, 2, 3, 3);

        let params = ConvParams::new(2, 0, 1).unwrap();
        let mut output = Tensor::zeros(1, 1, 1, 1);
        conv2d(&mut output, &input, &kernel, &params, &ScalarGemm).unwrap();

        assert_eq!((output.h(), output.w()), (2, 2));
        assert_eq!(output.get(0, 0, 0), Some(6.0));
        assert_eq!(output.get(0, 0, 1), Some(8.0));
        assert_eq!(output.get(0, 1, 0), Some(16.0));
        assert_eq!(output.get(0, 1, 1), Some(18.0));
    }

    #[test]
    fn same_padding_corner_is_sum_of_top_left_block() {
        // Spec §8 scenario 3.
        let input = Tensor::new(vec![1.0; 64], 1, 1, 8, 8);
        let kernel = KernelTensor::new(vec![1.0; 9], 1, 1, 3, 3);
        let params = ConvParams::new(1, 1, 1).unwrap();
        let mut output = Tensor::zeros(1, 1, 1, 1);
        conv2d(&mut output, &input, &kernel, &params, &ScalarGemm).unwrap();
        assert_eq!((output.h(), output.w()), (8, 8));
        assert_eq!(output.get(0, 0, 0), Some(4.0)); // top-left 2x2 block of ones
    }

    #[test]
    fn matches_reference_on_multi_block_tile_boundary() {
        // Spec §8 scenario 5: forces >=2 output blocks in each dimension.
        let size = 64 * 64 * 3;
        let input = Tensor::new((0..size).map(|x| (x % 7) as f32 - 3.0).collect(), 1, 3, 64, 64);
        let kdata: Vec<f32> = (0..(8 * 3 * 3 * 3)).map(|x| ((x % 5) as f32 - 2.0) * 0.1).collect();
        let kernel = KernelTensor::new(kdata, 8, 3, 3, 3);
        let params = ConvParams::new(1, 0, 1).unwrap();

        let mut output = Tensor::zeros(1, 1, 1, 1);
        conv2d(&mut output, &input, &kernel, &params, &ScalarGemm).unwrap();
        let reference = conv2d_direct(&input, &kernel, &params).unwrap();
        assert_tensors_close(&output, &reference, 1e-4);
    }

    #[test]
    fn matches_reference_with_dilation() {
        // Spec §8 scenario 6.
        let size = 16 * 16 * 2;
        let input = Tensor::new((0..size).map(|x| (x % 11) as f32 * 0.05 - 0.25).collect(), 1, 2, 16, 16);
        let kdata: Vec<f32> = (0..(2 * 2 * 3 * 3)).map(|x| ((x % 4) as f32 - 1.5) * 0.2).collect();
        let kernel = KernelTensor::new(kdata, 2, 2, 3, 3);
        let params = ConvParams::new(1, 2, 2).unwrap();

        let mut output = Tensor::zeros(1, 1, 1, 1);
        conv2d(&mut output, &input, &kernel, &params, &ScalarGemm).unwrap();
        let reference = conv2d_direct(&input, &kernel, &params).unwrap();
        assert_tensors_close(&output, &reference, 1e-4);
    }

    #[test]
    fn matches_reference_on_large_random_like_problem() {
        // Spec §8 scenario 4 (deterministic pseudo-random in place of a seeded RNG).
        let size = 128 * 128 * 5;
        let input = Tensor::new(
            (0..size).map(|x| ((x * 2654435761u32 as usize) % 2000) as f32 / 1000.0 - 1.0).collect(),
            1,
            5,
            128,
            128,
        );
        let ksize = 4 * 5 * 4 * 4;
        let kdata: Vec<f32> = (0..ksize)
            .map(|x| ((x * 40503usize) % 2000) as f32 / 1000.0 - 1.0)
            .collect();
        let kernel = KernelTensor::new(kdata, 4, 5, 4, 4);
        let params = ConvParams::new(3, 1, 1).unwrap();

        let mut output = Tensor::zeros(1, 1, 1, 1);
        conv2d(&mut output, &input, &kernel, &params, &ScalarGemm).unwrap();
        let reference = conv2d_direct(&input, &kernel, &params).unwrap();
        assert_tensors_close(&output, &reference, 1e-4);
    }

    #[test]
    fn zero_input_and_kernel_produce_zero_output() {
        let input = Tensor::zeros(1, 2, 6, 6);
        let kernel = KernelTensor::new(vec![0.0; 2 * 2 * 3 * 3], 2, 2, 3, 3);
        let params = ConvParams::default();
        let mut output = Tensor::zeros(1, 1, 1, 1);
        conv2d(&mut output, &input, &kernel, &params, &ScalarGemm).unwrap();
        assert!(output.data().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn linearity_holds_within_tolerance() {
        let size = 20 * 20 * 2;
        let x: Vec<f32> = (0..size).map(|i| ((i % 13) as f32 - 6.0) * 0.1).collect();
        let y: Vec<f32> = (0..size).map(|i| ((i % 17) as f32 - 8.0) * 0.1).collect();
        let (a, b) = (1.7f32, -0.4f32);
        let combined: Vec<f32> = x.iter().zip(&y).map(|(&xv, &yv)| a * xv + b * yv).collect();

        let kdata: Vec<f32> = (0..(3 * 2 * 3 * 3)).map(|i| ((i % 5) as f32 - 2.0) * 0.1).collect();
        let kernel = KernelTensor::new(kdata, 3, 2, 3, 3);
        let params = ConvParams::new(1, 1, 1).unwrap();

        let conv = |data: Vec<f32>| -> Tensor {
            let input = Tensor::new(data, 1, 2, 20, 20);
            let mut out = Tensor::zeros(1, 1, 1, 1);
            conv2d(&mut out, &input, &kernel, &params, &ScalarGemm).unwrap();
            out
        };

        let out_x = conv(x);
        let out_y = conv(y);
        let out_combined = conv(combined);

        for ((&cx, &cy), &cc) in out_x.data().iter().zip(out_y.data()).zip(out_combined.data()) {
            assert!(approx_eq!(f32, a * cx + b * cy, cc, epsilon = 1e-3));
        }
    }
}
