// gauss-gpu: 3×3 Gaussian smoothing of grayscale images on the GPU
//
// Host side: image model, kernel, CPU reference convolution, file codec.
// Device side (gpu/): device context, program builder, memory objects,
// kernel dispatcher. `pipeline` ties the two together for one run.

pub mod error;
pub mod image;
pub mod convert;
pub mod kernel;
pub mod convolution;
pub mod codec;
pub mod timer;
pub mod config;
pub mod gpu;
pub mod pipeline;

pub use config::PipelineConfig;
pub use error::{FilterError, Result};
pub use gpu::device::{DeviceKind, WorkgroupSize};
pub use image::{FloatPlane, Image, RasterImage};
pub use kernel::{ConvolutionKernel, GAUSSIAN_3X3};
pub use pipeline::{GaussianPipeline, RunReport, StageTimings};
