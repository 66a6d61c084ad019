//! Command-line harness: builds a seeded random problem, runs the tiled
//! orchestrator and the direct reference implementation, and reports any
//! mismatch above tolerance. Mirrors the accelerator's own C driver
//! (`main()` + `verify_results`), minus the printf formatting.

use atallax_conv::{conv2d, conv2d_direct, ConvParams, KernelTensor, ScalarGemm, Tensor};
use clap::Parser;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Uniform};

/// Runs a single randomized convolution problem through both the tiled
/// accelerator model and the direct reference, and checks they agree.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input height.
    #[arg(long, default_value_t = 128)]
    height: usize,

    /// Input width.
    #[arg(long, default_value_t = 128)]
    width: usize,

    /// Input channel count.
    #[arg(long = "in-channels", default_value_t = 5)]
    in_channels: usize,

    /// Output channel count.
    #[arg(long = "out-channels", default_value_t = 4)]
    out_channels: usize,

    /// Square kernel size.
    #[arg(long = "kernel-size", default_value_t = 4)]
    kernel_size: usize,

    /// Convolution stride.
    #[arg(long, default_value_t = 3)]
    stride: usize,

    /// Zero-padding amount.
    #[arg(long, default_value_t = 1)]
    padding: usize,

    /// Dilation factor (values below 1 are normalised to 1).
    #[arg(long, default_value_t = 1)]
    dilation: i64,

    /// RNG seed for the random input and kernel tensors.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Absolute-difference tolerance for the pass/fail comparison.
    #[arg(long, default_value_t = 1e-4)]
    tolerance: f32,

    /// Maximum number of mismatches to print before stopping.
    #[arg(long, default_value_t = 5)]
    max_mismatches: usize,
}

fn random_tensor(rng: &mut StdRng, n: usize, c: usize, h: usize, w: usize) -> Tensor {
    let dist = Uniform::new_inclusive(-1.0f32, 1.0f32);
    let data: Vec<f32> = (0..n * c * h * w).map(|_| dist.sample(rng)).collect();
    Tensor::new(data, n, c, h, w)
}

fn random_kernel(rng: &mut StdRng, cout: usize, cin: usize, kh: usize, kw: usize) -> KernelTensor {
    let dist = Uniform::new_inclusive(-1.0f32, 1.0f32);
    let data: Vec<f32> = (0..cout * cin * kh * kw).map(|_| dist.sample(rng)).collect();
    KernelTensor::new(data, cout, cin, kh, kw)
}

fn main() {
    let args = Args::parse();

    let params = match ConvParams::new(args.stride, args.padding, args.dilation) {
        Ok(p) => p,
        Err(e) => {
            log::error!("invalid parameters: {e}");
            std::process::exit(2);
        }
    };

    log::info!(
        "problem: in[{}x{}x{}] kernel[{}x{}x{}x{}] stride={} padding={} dilation={}",
        args.in_channels,
        args.height,
        args.width,
        args.out_channels,
        args.in_channels,
        args.kernel_size,
        args.kernel_size,
        params.stride,
        params.padding,
        params.dilation,
    );

    let mut rng = StdRng::seed_from_u64(args.seed);
    let input = random_tensor(&mut rng, 1, args.in_channels, args.height, args.width);
    let kernel = random_kernel(&mut rng, args.out_channels, args.in_channels, args.kernel_size, args.kernel_size);

    let mut output = Tensor::zeros(1, 1, 1, 1);
    if let Err(e) = conv2d(&mut output, &input, &kernel, &params, &ScalarGemm) {
        log::error!("tiled orchestrator failed: {e}");
        std::process::exit(1);
    }

    let reference = match conv2d_direct(&input, &kernel, &params) {
        Ok(r) => r,
        Err(e) => {
            log::error!("reference model failed: {e}");
            std::process::exit(1);
        }
    };

    let mut mismatches = 0usize;
    for (idx, (&got, &want)) in output.data().iter().zip(reference.data()).enumerate() {
        let diff = (got - want).abs();
        if diff > args.tolerance {
            mismatches += 1;
            if mismatches <= args.max_mismatches {
                log::warn!("mismatch at index {idx}: tiled={got} reference={want} diff={diff}");
            }
        }
    }

    if mismatches == 0 {
        log::info!("PASS: {} outputs match within {}", output.data().len(), args.tolerance);
    } else {
        log::error!("FAIL: {mismatches} of {} outputs exceeded tolerance", output.data().len());
        std::process::exit(1);
    }
}
