use crate::error::ConvError;

/// A 4D tensor in NCHW layout with row-major strides `(c*h*w, h*w, w, 1)`.
///
/// Only `n == 1` is exercised by the orchestrator (spec §3); the field is
/// kept so callers can express the rejected shape instead of the crate
/// silently assuming it away.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Vec<f32>,
    n: usize,
    c: usize,
    h: usize,
    w: usize,
}

impl Tensor {
    /// Builds a tensor from caller-owned data, zero-filling nothing.
    ///
    /// Panics if `data.len() != n * c * h * w`; this is a programmer error
    /// at construction time, not a recoverable `ConvError`.
    pub fn new(data: Vec<f32>, n: usize, c: usize, h: usize, w: usize) -> Self {
        assert_eq!(
            data.len(),
            n * c * h * w,
            "tensor buffer length does not match n*c*h*w"
        );
        Self { data, n, c, h, w }
    }

    /// Allocates a zero-filled tensor of the given shape.
    pub fn zeros(n: usize, c: usize, h: usize, w: usize) -> Self {
        Self::new(vec![0.0; n * c * h * w], n, c, h, w)
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn c(&self) -> usize {
        self.c
    }

    pub fn h(&self) -> usize {
        self.h
    }

    pub fn w(&self) -> usize {
        self.w
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Reshapes in place to a new logical shape; the caller is responsible
    /// for the buffer already holding (or being resized to) the right
    /// number of elements. Used by the orchestrator to size the output
    /// tensor to the derived `(O_h, O_w)` before writing into it.
    pub fn resize_to(&mut self, n: usize, c: usize, h: usize, w: usize) {
        self.data.clear();
        self.data.resize(n * c * h * w, 0.0);
        self.n = n;
        self.c = c;
        self.h = h;
        self.w = w;
    }

    /// Reads `data[c, h, w]` for batch 0, or `None` if the coordinate falls
    /// outside the tensor (including negative `h`/`w` from padding).
    #[inline]
    pub fn get(&self, c: usize, h: isize, w: isize) -> Option<f32> {
        if c >= self.c || h < 0 || w < 0 {
            return None;
        }
        let (h, w) = (h as usize, w as usize);
        if h >= self.h || w >= self.w {
            return None;
        }
        let idx = c * (self.h * self.w) + h * self.w + w;
        Some(self.data[idx])
    }

    /// Writes `value` at `[c, h, w]` for batch 0 if the coordinate is
    /// in-bounds; out-of-range writes are ignored (spec §4.F store policy).
    #[inline]
    pub fn set(&mut self, c: usize, h: usize, w: usize, value: f32) {
        if c < self.c && h < self.h && w < self.w {
            let idx = c * (self.h * self.w) + h * self.w + w;
            self.data[idx] = value;
        }
    }
}

/// A 4D kernel tensor, layout `[c_out, c_in, k_h, k_w]` row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelTensor {
    data: Vec<f32>,
    cout: usize,
    cin: usize,
    kh: usize,
    kw: usize,
}

impl KernelTensor {
    pub fn new(data: Vec<f32>, cout: usize, cin: usize, kh: usize, kw: usize) -> Self {
        assert_eq!(
            data.len(),
            cout * cin * kh * kw,
            "kernel buffer length does not match cout*cin*kh*kw"
        );
        Self {
            data,
            cout,
            cin,
            kh,
            kw,
        }
    }

    pub fn cout(&self) -> usize {
        self.cout
    }

    pub fn cin(&self) -> usize {
        self.cin
    }

    pub fn kh(&self) -> usize {
        self.kh
    }

    pub fn kw(&self) -> usize {
        self.kw
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// `kernel[cout, cin, kh, kw]`, no bounds checking beyond a debug assert
    /// since every caller in this crate derives indices from the shape.
    #[inline]
    pub fn at(&self, n: usize, c: usize, r: usize, w: usize) -> f32 {
        debug_assert!(n < self.cout && c < self.cin && r < self.kh && w < self.kw);
        let idx = n * (self.cin * self.kh * self.kw) + c * (self.kh * self.kw) + r * self.kw + w;
        self.data[idx]
    }
}

/// Convolution parameters: stride, padding, dilation.
///
/// Mirrors the teacher's `ConvOptions` constructor in shape (stride /
/// padding / dilation bundled and validated once per call) but drops the
/// `groups` field the spec puts out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvParams {
    pub stride: usize,
    pub padding: usize,
    pub dilation: usize,
}

impl ConvParams {
    /// Builds validated parameters, normalising a zero or negative
    /// dilation input to 1 (spec §3, §9 open question 3). `stride` must be
    /// at least 1.
    pub fn new(stride: usize, padding: usize, dilation: i64) -> Result<Self, ConvError> {
        if stride == 0 {
            return Err(ConvError::InvalidParams("stride must be >= 1".into()));
        }
        let dilation = if dilation < 1 { 1 } else { dilation as usize };
        Ok(Self {
            stride,
            padding,
            dilation,
        })
    }
}

impl Default for ConvParams {
    fn default() -> Self {
        Self {
            stride: 1,
            padding: 0,
            dilation: 1,
        }
    }
}

/// Computes `O = floor((dim + 2*padding - (k - 1)*dilation - 1) / stride) + 1`
/// (spec §3 derived output dimensions).
pub fn calculate_conv_output_size(
    dim: usize,
    k: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> usize {
    let k_eff = (k - 1) * dilation + 1;
    (dim + 2 * padding - k_eff) / stride + 1
}
