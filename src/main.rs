// gauss-gpu — smooth a grayscale image with the 3×3 Gaussian kernel on the GPU.
//
// Usage:
//   gauss-gpu input.png                       # writes out.bmp
//   gauss-gpu input.png -o blurred.png --verify
//   RUST_LOG=gauss_gpu=debug gauss-gpu input.png --backend vulkan

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gauss_gpu::config::parse_backends;
use gauss_gpu::convert::{narrow, widen};
use gauss_gpu::gpu::program::ENTRY_POINT;
use gauss_gpu::convolution::{convolve_2d, max_abs_diff, mean_abs_diff};
use gauss_gpu::{codec, DeviceKind, GaussianPipeline, PipelineConfig, WorkgroupSize, GAUSSIAN_3X3};

#[derive(Parser, Debug)]
#[command(name = "gauss-gpu")]
#[command(about = "3×3 Gaussian smoothing of a grayscale image on the GPU", long_about = None)]
#[command(version)]
struct Cli {
    /// Input image (any format the image crate reads; converted to grayscale)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output image; format follows the extension
    #[arg(short, long, value_name = "FILE", default_value = "out.bmp")]
    output: PathBuf,

    /// Device kind: gpu, discrete, integrated, cpu [env: GAUSS_GPU_DEVICE]
    #[arg(long)]
    device: Option<DeviceKind>,

    /// Platforms to search: all, vulkan, metal, dx12, gl [env: GAUSS_GPU_BACKEND]
    #[arg(long)]
    backend: Option<String>,

    /// Workgroup size, e.g. 16x16 [env: GAUSS_GPU_WORKGROUP]
    #[arg(long)]
    workgroup: Option<WorkgroupSize>,

    /// Replacement WGSL kernel file (same four-slot binding interface)
    #[arg(long, value_name = "WGSL")]
    kernel: Option<PathBuf>,

    /// Entry point of --kernel [default: gaussian_filter_kernel]
    #[arg(long, requires = "kernel")]
    entry_point: Option<String>,

    /// Also run the CPU reference and report the difference
    #[arg(long)]
    verify: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> gauss_gpu::Result<()> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(kind) = cli.device {
        config = config.with_device_kind(kind);
    }
    if let Some(b) = &cli.backend {
        config = config.with_backends(parse_backends(b)?);
    }
    if let Some(wg) = cli.workgroup {
        config = config.with_workgroup(wg);
    }
    if let Some(path) = &cli.kernel {
        let source = std::fs::read_to_string(path).map_err(|e| {
            gauss_gpu::FilterError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let entry_point = cli.entry_point.clone().unwrap_or_else(|| ENTRY_POINT.to_string());
        config = config.with_kernel_source(source, entry_point);
    }

    let input = codec::load(&cli.input)?;
    println!("Loaded {} ({}×{})", cli.input.display(), input.width(), input.height());

    let pipeline = GaussianPipeline::new(config);
    let (output, report) = pipeline.run_with_report(&input, &GAUSSIAN_3X3)?;
    tracing::debug!("\n{report}");

    println!("Device: {:#}", report.adapter);
    println!(
        "GPU execution time is.......... {:.3} (ms)",
        report.timings.gpu().as_secs_f64() * 1e3
    );

    if cli.verify {
        let cpu = convolve_2d(&widen(&input), &GAUSSIAN_3X3);
        let gpu = widen(&output);
        let reference = widen(&narrow(&cpu));
        println!(
            "Verify vs CPU reference: max abs error {:.3}, mean abs error {:.5}",
            max_abs_diff(&gpu, &reference),
            mean_abs_diff(&gpu, &reference)
        );
    }

    codec::save(&output, &cli.output)?;
    println!("Saved {}", cli.output.display());
    Ok(())
}
