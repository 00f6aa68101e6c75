// pipeline.rs — End-to-end filter run.
//
// One `run` is one full device lifetime:
//
//   validate → acquire device → build program → upload input + coefficients
//   → allocate output → dispatch → download → narrow to u8
//
// Every device object is a local borrowing the context, declared after it,
// so on any early `?` return they are dropped first and the context last.
// Nothing is cached between runs and nothing is retried.

use std::fmt;
use std::time::Duration;

use crate::convert::{narrow, widen};
use crate::config::PipelineConfig;
use crate::error::{FilterError, Result};
use crate::gpu::device::{acquire_device, AdapterInfo};
use crate::gpu::dispatch::{dispatch, WorkPartition};
use crate::gpu::memory::{
    allocate_output_image, download, upload_coefficients, upload_image, ImageAccess,
};
use crate::gpu::program::build_program;
use crate::image::{FloatPlane, RasterImage};
use crate::kernel::ConvolutionKernel;
use crate::timer::Stopwatch;

/// Wall-clock time spent in each stage of a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimings {
    pub acquire: Duration,
    pub build: Duration,
    pub upload: Duration,
    /// Kernel launch until the queue has drained.
    pub execute: Duration,
    pub download: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.acquire + self.build + self.upload + self.execute + self.download
    }

    /// Device-side work only: upload, kernel and download. Acquisition and
    /// compilation are excluded.
    pub fn gpu(&self) -> Duration {
        self.upload + self.execute + self.download
    }
}

/// What a run did and where.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub adapter: AdapterInfo,
    pub partition: WorkPartition,
    pub timings: StageTimings,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = |d: Duration| d.as_secs_f64() * 1e3;
        let t = &self.timings;
        writeln!(f, "adapter:   {}", self.adapter)?;
        writeln!(f, "partition: {}", self.partition)?;
        write!(
            f,
            "timings:   acquire {:.3} ms, build {:.3} ms, upload {:.3} ms, \
             execute {:.3} ms, download {:.3} ms",
            ms(t.acquire),
            ms(t.build),
            ms(t.upload),
            ms(t.execute),
            ms(t.download)
        )
    }
}

/// Runs an N×N convolution on the configured device.
#[derive(Debug, Clone, Default)]
pub struct GaussianPipeline {
    config: PipelineConfig,
}

impl GaussianPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        GaussianPipeline { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Filter `image` and return the result at the same size.
    pub fn run<const N: usize>(
        &self,
        image: &RasterImage,
        kernel: &ConvolutionKernel<N>,
    ) -> Result<RasterImage> {
        self.run_with_report(image, kernel).map(|(out, _)| out)
    }

    /// As [`run`](Self::run), also returning adapter and stage timings.
    pub fn run_with_report<const N: usize>(
        &self,
        image: &RasterImage,
        kernel: &ConvolutionKernel<N>,
    ) -> Result<(RasterImage, RunReport)> {
        let (plane, report) = self.run_plane(&widen(image), kernel)?;
        Ok((narrow(&plane), report))
    }

    /// Filter a float plane without the final narrowing to u8.
    pub fn run_plane<const N: usize>(
        &self,
        plane: &FloatPlane,
        kernel: &ConvolutionKernel<N>,
    ) -> Result<(FloatPlane, RunReport)> {
        let (width, height) = plane.dimensions();
        if plane.is_empty() {
            return Err(FilterError::InvalidDimensions {
                width,
                height,
                reason: "image must have at least one pixel".to_string(),
            });
        }

        let mut timings = StageTimings::default();
        let mut sw = Stopwatch::started();

        let ctx = acquire_device(&self.config.device_request())?;
        timings.acquire = sw.stop();

        sw.start();
        let program = self.config.program_source()?;
        let compiled = build_program(&ctx, &program, &self.config.entry_point)?;
        timings.build = sw.stop();

        sw.start();
        let input = upload_image(&ctx, plane, ImageAccess::ReadOnly)?;
        let coefficients = upload_coefficients(&ctx, kernel)?;
        let output = allocate_output_image(&ctx, width, height)?;
        timings.upload = sw.stop();

        sw.start();
        let partition = dispatch(&ctx, &compiled, &input, &output, &coefficients, kernel.side())?;
        timings.execute = sw.stop();

        sw.start();
        let result = download(&ctx, &output)?;
        timings.download = sw.stop();

        let report = RunReport {
            adapter: ctx.adapter_info().clone(),
            partition,
            timings,
        };
        tracing::info!(
            width,
            height,
            adapter = %report.adapter.name,
            gpu_ms = report.timings.gpu().as_secs_f64() * 1e3,
            "filter run complete"
        );
        Ok((result, report))
    }
}
