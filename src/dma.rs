//! The DMA model: bulk copies between DRAM (the caller's tensors) and the
//! on-chip scratchpad buffers. Every function here simulates one `SDMA`
//! instruction (spec §4.C, §4.F); none of them fail — out-of-range source
//! coordinates zero-fill the destination and out-of-range destination
//! coordinates are simply skipped.

use crate::tensor::Tensor;
use derive_new::new;

/// Copies a `(c_in, t_h, t_w)` block starting at global coordinate
/// `(h0, w0)` (which may be negative due to padding) from `input` into
/// `sc_raw`, zero-filling wherever the global coordinate lands outside the
/// input tensor. Channel 0 of the tile always maps to channel 0 of the
/// input; Atallax only ever loads the full channel range in one shot
/// (spec §4.C).
pub fn load_spatial_tile(sc_raw: &mut [f32], input: &Tensor, c_in: usize, t_h: usize, t_w: usize, h0: isize, w0: isize) {
    debug_assert_eq!(sc_raw.len(), c_in * t_h * t_w);
    for c in 0..c_in {
        for h in 0..t_h {
            for w in 0..t_w {
                let global_h = h0 + h as isize;
                let global_w = w0 + w as isize;
                let idx = c * (t_h * t_w) + h * t_w + w;
                sc_raw[idx] = input.get(c, global_h, global_w).unwrap_or(0.0);
            }
        }
    }
}

/// Loads a `(tk, tn)` sub-block of the flattened kernel matrix `b_flat`
/// (shape `[k, n]`, row-major) starting at `(k_start, j_start)`, zero-
/// filling lanes that fall past `k` or `n` (spec §4.F).
pub fn load_b_tile(sc_b: &mut [f32], b_flat: &[f32], k: usize, n: usize, k_start: usize, j_start: usize, tk: usize, tn: usize) {
    debug_assert_eq!(sc_b.len(), tk * tn);
    for r in 0..tk {
        for c in 0..tn {
            let global_r = k_start + r;
            let global_c = j_start + c;
            sc_b[r * tn + c] = if global_r < k && global_c < n {
                b_flat[global_r * n + global_c]
            } else {
                0.0
            };
        }
    }
}

/// Identifies one output block: the top-left output coordinate the block
/// starts at, how many output columns the block spans, and how many
/// patches of it are actually valid (the block may run past `o_h`/`o_w`
/// at the image's bottom/right edge, spec §4.G step 5).
#[derive(Debug, Clone, Copy, new)]
pub struct OutputBlock {
    pub h_start: usize,
    pub w_start: usize,
    pub block_w: usize,
    pub patch_count: usize,
}

/// Writes `sc_c`'s `(tm, tn)` block back to `output`. Row `r` maps to the
/// block-local patch `local_start + r`, unravelled via `block.block_w` and
/// offset by `(block.h_start, block.w_start)`; column `c` maps to output
/// channel `j_start + c`. Entries whose patch or channel falls outside the
/// block or the output tensor are dropped, never written (spec §4.F).
pub fn store_c_tile(output: &mut Tensor, sc_c: &[f32], block: &OutputBlock, local_start: usize, j_start: usize, tm: usize, tn: usize) {
    debug_assert_eq!(sc_c.len(), tm * tn);
    for r in 0..tm {
        let local_patch = local_start + r;
        if local_patch >= block.patch_count {
            continue;
        }
        let local_row = local_patch / block.block_w;
        let local_col = local_patch % block.block_w;
        let o_h = block.h_start + local_row;
        let o_w_idx = block.w_start + local_col;
        for c in 0..tn {
            let out_ch = j_start + c;
            if out_ch < output.c() {
                output.set(out_ch, o_h, o_w_idx, sc_c[r * tn + c]);
            }
        }
    }
}
