//! im2col-in-scratchpad: the vectorised mask-shift-add routine that builds
//! one row of GEMM-A for one output patch, one `T_K`-wide reduction slice
//! at a time (spec §4.E). This is the component the rest of the design
//! exists to support.

use crate::tensor::ConvParams;
use crate::vector;
use derive_new::new;

/// Geometry needed to map a flat-kernel index back to a scratchpad
/// coordinate. Bundled so `build_row`'s signature doesn't grow a dozen
/// loose `usize` parameters as the spec's own C model does.
#[derive(Debug, Clone, Copy, new)]
pub struct Im2colGeometry {
    pub kh: usize,
    pub kw: usize,
    pub cin: usize,
    pub o_h: usize,
    pub o_w: usize,
    pub t_h: usize,
    pub t_w: usize,
    /// Global (h, w) origin of the currently-loaded `sc_raw` tile.
    pub raw_tile_start_h: isize,
    pub raw_tile_start_w: isize,
}

/// Fills `row` (length `t_k`) with `im2col[global_patch_idx, k_start..k_start+t_k)`.
///
/// `row` is zeroed for patches past the last valid one in the block
/// (invariant 4) and dispatches to the dilation=1 mask-shift-add scheme or
/// a scalar gather when `params.dilation > 1` (spec §4.E edge-case policy).
pub fn build_row(
    row: &mut [f32],
    sc_raw: &[f32],
    params: &ConvParams,
    geom: &Im2colGeometry,
    global_patch_idx: usize,
    k_start: usize,
) {
    let t_k = row.len();
    row.iter_mut().for_each(|x| *x = 0.0);

    let m_total_patches = geom.o_h * geom.o_w;
    if global_patch_idx >= m_total_patches {
        return;
    }

    let o_h = global_patch_idx / geom.o_w;
    let o_w = global_patch_idx % geom.o_w;
    let global_in_h_start = (o_h * params.stride) as isize - params.padding as isize;
    let global_in_w_start = (o_w * params.stride) as isize - params.padding as isize;
    let local_h_start = global_in_h_start - geom.raw_tile_start_h;
    let local_w_start = global_in_w_start - geom.raw_tile_start_w;

    if params.dilation == 1 {
        build_row_mask_shift_add(row, sc_raw, geom, k_start, local_h_start, local_w_start);
    } else {
        build_row_scalar_gather(row, sc_raw, params, geom, k_start, local_h_start, local_w_start);
    }
}

fn channel_range(geom: &Im2colGeometry, k_start: usize, t_k: usize) -> (usize, usize) {
    let k_flat_per_channel = geom.kh * geom.kw;
    let start_channel = k_start / k_flat_per_channel;
    // Conservative overshoot (spec §9 open question 2): may visit one
    // channel that contributes nothing, which is harmless.
    let end_channel = (k_start + t_k + geom.kw) / k_flat_per_channel;
    (start_channel, end_channel.min(geom.cin.saturating_sub(1)))
}

/// The dilation = 1 path: for every `(channel, kernel row)` pair that
/// overlaps this reduction slice, load the scratchpad row, mask to the
/// kernel's `K_w`-wide window, and shift it into place (or, for a
/// straddling row, shift its tail into place), per spec §4.E steps 4-5.
fn build_row_mask_shift_add(
    row: &mut [f32],
    sc_raw: &[f32],
    geom: &Im2colGeometry,
    k_start: usize,
    local_h_start: isize,
    local_w_start: isize,
) {
    let t_k = row.len();
    let (start_channel, end_channel) = channel_range(geom, k_start, t_k);
    let k_flat_per_channel = geom.kh * geom.kw;

    let mut v_row = vec![0.0f32; t_k];
    let mut mask = vec![false; t_k];

    for c in start_channel..=end_channel.max(start_channel) {
        if c >= geom.cin {
            break;
        }
        for kh in 0..geom.kh {
            let local_h = local_h_start + kh as isize;
            let row_base = c as isize * (geom.t_h * geom.t_w) as isize + local_h * geom.t_w as isize;

            // The row-load's `valid` guard covers the right edge of the
            // tile; if the row itself is above/below the tile, `row_base`
            // is out of range and every element must read as zero — the
            // guard can't express that, so skip the load in that case and
            // leave v_row zeroed by masking against a zero window below.
            let row_in_tile = local_h >= 0 && (local_h as usize) < geom.t_h;
            let valid = (geom.t_w as isize - local_w_start).max(0);

            if row_in_tile && local_w_start < geom.t_w as isize {
                let load_addr = (row_base + local_w_start).max(0) as usize;
                let load_addr = load_addr.min(sc_raw.len());
                let clamped_valid = valid.min((sc_raw.len() - load_addr) as isize);
                vector::load_row_safe(&mut v_row, sc_raw, load_addr, clamped_valid);
            } else {
                v_row.iter_mut().for_each(|x| *x = 0.0);
            }

            vector::create_window_mask(&mut mask, geom.kw);
            vector::apply_mask(&mut v_row, &mask);

            let global_k_index = c * k_flat_per_channel + kh * geom.kw;
            let place = global_k_index as isize - k_start as isize;

            if place >= 0 && (place as usize) < t_k {
                vector::shift(&mut v_row, place as usize, false);
                vector::add(row, &v_row);
            } else if place < 0 && place > -(geom.kw as isize) {
                vector::shift(&mut v_row, (-place) as usize, true);
                vector::add(row, &v_row);
            }
            // otherwise this row's window lies entirely outside the slice
        }
    }
}

/// The dilation > 1 fallback: each kernel tap is addressed individually
/// rather than through a contiguous row load, since a dilated window is no
/// longer a contiguous run of scratchpad lanes (spec §4.E).
fn build_row_scalar_gather(
    row: &mut [f32],
    sc_raw: &[f32],
    params: &ConvParams,
    geom: &Im2colGeometry,
    k_start: usize,
    local_h_start: isize,
    local_w_start: isize,
) {
    let t_k = row.len();
    let k_flat_per_channel = geom.kh * geom.kw;
    let (start_channel, end_channel) = channel_range(geom, k_start, t_k);

    for c in start_channel..=end_channel.max(start_channel) {
        if c >= geom.cin {
            break;
        }
        for kh in 0..geom.kh {
            for kw in 0..geom.kw {
                let global_k_index = c * k_flat_per_channel + kh * geom.kw + kw;
                if global_k_index < k_start || global_k_index - k_start >= t_k {
                    continue;
                }
                let local_h = local_h_start + (kh * params.dilation) as isize;
                let local_w = local_w_start + (kw * params.dilation) as isize;

                let value = if local_h >= 0
                    && (local_h as usize) < geom.t_h
                    && local_w >= 0
                    && (local_w as usize) < geom.t_w
                {
                    let idx = c * (geom.t_h * geom.t_w) + local_h as usize * geom.t_w + local_w as usize;
                    sc_raw[idx]
                } else {
                    0.0
                };

                row[global_k_index - k_start] = value;
            }
        }
    }
}
