//! Tiled im2col/GEMM simulator for the Atallax direct-convolution
//! accelerator: scratchpad-sized tiling, a vectorised mask-shift-add im2col,
//! and a pluggable systolic-array GEMM intrinsic, checked against a direct
//! reference implementation.

pub mod dma;
pub mod error;
pub mod gemm;
pub mod im2col;
pub mod kernel_flatten;
pub mod orchestrator;
pub mod reference;
pub mod tensor;
pub mod vector;

pub use error::ConvError;
pub use gemm::{GemmKernel, ScalarGemm};
pub use orchestrator::conv2d;
pub use reference::conv2d_direct;
pub use tensor::{calculate_conv_output_size, ConvParams, KernelTensor, Tensor};
