use thiserror::Error;

/// Failure modes the core recognises before touching `output`.
///
/// Every variant here corresponds to a condition the original accelerator
/// model handled by silently leaving the output zero-filled; this crate
/// promotes them to explicit returns instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvError {
    /// Only `n == 1` is supported.
    #[error("batch size {n} is unsupported, only n = 1 is implemented")]
    BatchUnsupported {
        /// The batch size that was rejected.
        n: usize,
    },

    /// The spatial tile required to cover one systolic-array-sized output
    /// block exceeds `MAX_SPATIAL_TILE_DIM`.
    #[error(
        "spatial tile {t_h}x{t_w} exceeds the scratchpad cap of {max}x{max}"
    )]
    SpatialTileTooLarge {
        /// Required tile height.
        t_h: usize,
        /// Required tile width.
        t_w: usize,
        /// The configured cap.
        max: usize,
    },

    /// A scratchpad or flattened-kernel buffer could not be allocated.
    #[error("scratchpad allocation failed")]
    Allocation,

    /// Stride, padding or a tensor dimension was ill-formed.
    #[error("invalid convolution parameters: {0}")]
    InvalidParams(String),
}
