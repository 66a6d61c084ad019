//! The golden model: a direct seven-nested-loop convolution used only to
//! check the tiled orchestrator against, never on any hot path (spec §6).

use crate::error::ConvError;
use crate::tensor::{calculate_conv_output_size, ConvParams, KernelTensor, Tensor};

/// Computes the same convolution as [`crate::orchestrator::conv2d`] by
/// direct summation, with no scratchpad, tiling, or im2col involved.
///
/// Kept deliberately naive: its only job is to be obviously correct by
/// inspection, per the seven-loop reference in the accelerator's C model.
pub fn conv2d_direct(input: &Tensor, kernel: &KernelTensor, params: &ConvParams) -> Result<Tensor, ConvError> {
    if input.n() > 1 {
        return Err(ConvError::BatchUnsupported { n: input.n() });
    }
    if input.c() != kernel.cin() {
        return Err(ConvError::InvalidParams(format!(
            "input channels ({}) do not match kernel cin ({})",
            input.c(),
            kernel.cin()
        )));
    }

    let o_h = calculate_conv_output_size(input.h(), kernel.kh(), params.stride, params.padding, params.dilation);
    let o_w = calculate_conv_output_size(input.w(), kernel.kw(), params.stride, params.padding, params.dilation);

    let mut output = Tensor::zeros(1, kernel.cout(), o_h, o_w);

    for cout in 0..kernel.cout() {
        for oy in 0..o_h {
            for ox in 0..o_w {
                let mut acc = 0.0f32;
                for cin in 0..input.c() {
                    for ky in 0..kernel.kh() {
                        for kx in 0..kernel.kw() {
                            let iy = (oy * params.stride) as isize - params.padding as isize + (ky * params.dilation) as isize;
                            let ix = (ox * params.stride) as isize - params.padding as isize + (kx * params.dilation) as isize;
                            if let Some(v) = input.get(cin, iy, ix) {
                                acc += v * kernel.at(cout, cin, ky, kx);
                            }
                        }
                    }
                }
                output.set(cout, oy, ox, acc);
            }
        }
    }

    Ok(output)
}
