// gpu/mod.rs — wgpu compute layer.
//
// The four device-side stages of a filter run, in the order the pipeline
// uses them:
//
//   device    platform/device discovery, ExecutionContext (device + queue)
//   program   WGSL front end and compute pipeline creation
//   memory    device images, coefficient buffer, blocking transfers
//   dispatch  argument binding, work partition, kernel launch
//
// The CPU convolution in `crate::convolution` stays the authoritative
// reference; every GPU test compares against it.

pub mod device;
pub mod dispatch;
pub mod memory;
pub mod program;

pub use device::{acquire_device, DeviceKind, DeviceRequest, ExecutionContext, WorkgroupSize};
pub use dispatch::{bind, dispatch, BoundKernel, KernelArgs, WorkPartition};
pub use memory::{
    allocate_output_image, download, upload_coefficients, upload_image, CoefficientBuffer,
    DeviceImage, ImageAccess,
};
pub use program::{build, build_program, kernel_source, CompiledKernel, ProgramSource};
