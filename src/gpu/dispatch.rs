// gpu/dispatch.rs — Argument binding and 2D dispatch of a compiled kernel.
//
// Binding checks every argument against the kernel's fixed interface before
// anything is handed to wgpu, so a mismatch is reported with the slot it
// concerns rather than as an opaque validation error:
//
//   slot 0  input image     ReadOnly, same context
//   slot 1  output image    WriteOnly, same context, same size as input
//   slot 2  coefficients    same context
//   slot 3  window size     odd, positive, window² == coefficient count
//
// WORK PARTITION:
// One invocation per pixel. Workgroup counts are rounded up, so images whose
// sides are not multiples of the workgroup size are still fully covered; the
// kernel returns early for invocations past the right/bottom edge.

use crate::error::{FilterError, Result};
use crate::gpu::device::{ExecutionContext, WorkgroupSize};
use crate::gpu::memory::{CoefficientBuffer, DeviceImage, ImageAccess};
use crate::gpu::program::{
    CompiledKernel, COEFFICIENTS_BINDING, INPUT_BINDING, OUTPUT_BINDING, WINDOW_SIZE_BINDING,
};

use wgpu::util::DeviceExt;

// ---------------------------------------------------------------------------
// Uniform layout
// ---------------------------------------------------------------------------

/// Uniform block at slot 3. Layout must match `Params` in
/// gaussian_filter.wgsl (16 bytes, the minimum uniform binding size).
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct KernelParams {
    pub window_size: i32,
    pub _pad: [u32; 3],
}

impl KernelParams {
    pub fn new(window_size: i32) -> Self {
        KernelParams {
            window_size,
            _pad: [0; 3],
        }
    }
}

/// Validate the window size against the number of coefficients bound.
fn check_window(window_size: usize, coefficient_count: usize) -> Result<i32> {
    let slot = WINDOW_SIZE_BINDING;
    if window_size == 0 || window_size % 2 == 0 {
        return Err(FilterError::binding(
            slot,
            format!("window size must be odd and positive, got {window_size}"),
        ));
    }
    let needed = window_size.checked_mul(window_size).ok_or_else(|| {
        FilterError::binding(slot, format!("window size {window_size} is too large"))
    })?;
    if needed != coefficient_count {
        return Err(FilterError::binding(
            slot,
            format!(
                "window size {window_size} needs {needed} coefficients, buffer holds {coefficient_count}"
            ),
        ));
    }
    i32::try_from(window_size)
        .map_err(|_| FilterError::binding(slot, format!("window size {window_size} overflows i32")))
}

// ---------------------------------------------------------------------------
// WorkPartition
// ---------------------------------------------------------------------------

/// Global and local sizes of a 2D dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkPartition {
    /// One invocation per pixel: (width, height).
    pub global: (u32, u32),
    pub local: WorkgroupSize,
    /// Workgroup counts, rounded up.
    pub groups: (u32, u32),
}

impl WorkPartition {
    pub fn new(width: u32, height: u32, local: WorkgroupSize) -> Self {
        WorkPartition {
            global: (width, height),
            local,
            groups: (width.div_ceil(local.x), height.div_ceil(local.y)),
        }
    }

    /// True when the workgroups tile the image with no partial groups.
    pub fn is_exact(&self) -> bool {
        self.global.0 % self.local.x == 0 && self.global.1 % self.local.y == 0
    }

    /// Invocations launched, including the idle ones past the image edge.
    pub fn invocations(&self) -> u64 {
        self.groups.0 as u64 * self.groups.1 as u64 * self.local.total()
    }
}

impl std::fmt::Display for WorkPartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "global {}×{}, local {}×{}, groups {}×{}",
            self.global.0, self.global.1, self.local.x, self.local.y, self.groups.0, self.groups.1
        )
    }
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// The four arguments of the filter kernel, in slot order.
#[derive(Debug, Clone, Copy)]
pub struct KernelArgs<'a, 'ctx> {
    pub input: &'a DeviceImage<'ctx>,
    pub output: &'a DeviceImage<'ctx>,
    pub coefficients: &'a CoefficientBuffer<'ctx>,
    pub window_size: usize,
}

/// A kernel with its arguments bound, ready to be encoded.
pub struct BoundKernel<'k, 'ctx> {
    kernel: &'k CompiledKernel<'ctx>,
    bind_group: wgpu::BindGroup,
    params: wgpu::Buffer,
    partition: WorkPartition,
}

impl BoundKernel<'_, '_> {
    pub fn partition(&self) -> WorkPartition {
        self.partition
    }

    /// Record one compute pass running the kernel over the whole image.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(self.kernel.entry_point()),
            timestamp_writes: None,
        });
        pass.set_pipeline(self.kernel.pipeline());
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.dispatch_workgroups(self.partition.groups.0, self.partition.groups.1, 1);
    }
}

impl Drop for BoundKernel<'_, '_> {
    fn drop(&mut self) {
        self.params.destroy();
    }
}

/// Validate `args` against the kernel interface and create the bind group.
///
/// # Errors
/// `KernelArgumentBindingFailed` naming the first offending slot.
/// `KernelExecutionFailed` if `kernel` was built on another context.
pub fn bind<'k, 'ctx>(
    ctx: &'ctx ExecutionContext,
    kernel: &'k CompiledKernel<'ctx>,
    args: &KernelArgs<'_, 'ctx>,
) -> Result<BoundKernel<'k, 'ctx>> {
    let id = ctx.id();
    if kernel.context().id() != id {
        return Err(FilterError::KernelExecutionFailed {
            reason: format!("kernel was built on {}, dispatched on {id}", kernel.context().id()),
        });
    }

    if args.input.context_id() != id {
        return Err(FilterError::binding(INPUT_BINDING, format!("input image belongs to {}", args.input.context_id())));
    }
    if args.input.access() != ImageAccess::ReadOnly {
        return Err(FilterError::binding(INPUT_BINDING, "input image must be read-only"));
    }

    if args.output.context_id() != id {
        return Err(FilterError::binding(OUTPUT_BINDING, format!("output image belongs to {}", args.output.context_id())));
    }
    if args.output.access() != ImageAccess::WriteOnly {
        return Err(FilterError::binding(OUTPUT_BINDING, "output image must be write-only"));
    }
    if args.output.dimensions() != args.input.dimensions() {
        let (iw, ih) = args.input.dimensions();
        let (ow, oh) = args.output.dimensions();
        return Err(FilterError::binding(
            OUTPUT_BINDING,
            format!("output is {ow}×{oh}, input is {iw}×{ih}"),
        ));
    }

    if args.coefficients.context_id() != id {
        return Err(FilterError::binding(
            COEFFICIENTS_BINDING,
            format!("coefficient buffer belongs to {}", args.coefficients.context_id()),
        ));
    }

    let window_size = check_window(args.window_size, args.coefficients.len())?;

    let ((bind_group, params), error) = ctx.capture(|device| {
        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("KernelParams"),
            contents: bytemuck::bytes_of(&KernelParams::new(window_size)),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("filter kernel bind group"),
            layout: kernel.bind_group_layout(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: INPUT_BINDING,
                    resource: wgpu::BindingResource::TextureView(args.input.view()),
                },
                wgpu::BindGroupEntry {
                    binding: OUTPUT_BINDING,
                    resource: wgpu::BindingResource::TextureView(args.output.view()),
                },
                wgpu::BindGroupEntry {
                    binding: COEFFICIENTS_BINDING,
                    resource: args.coefficients.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: WINDOW_SIZE_BINDING,
                    resource: params.as_entire_binding(),
                },
            ],
        });
        (bind_group, params)
    });
    if let Some(e) = error {
        params.destroy();
        // wgpu rejects the bind group as a whole; its message names the entry.
        return Err(FilterError::binding(INPUT_BINDING, e.to_string()));
    }

    let (width, height) = args.input.dimensions();
    Ok(BoundKernel {
        kernel,
        bind_group,
        params,
        partition: WorkPartition::new(width, height, kernel.workgroup()),
    })
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Bind the arguments, run the kernel once over the whole image and wait for
/// it to finish. Returns the partition that was launched.
///
/// # Errors
/// - `KernelArgumentBindingFailed` from [`bind`].
/// - `KernelExecutionFailed` if the partition exceeds the device's workgroup
///   count limit, or the device rejects the pass or the submission.
pub fn dispatch<'ctx>(
    ctx: &'ctx ExecutionContext,
    kernel: &CompiledKernel<'ctx>,
    input: &DeviceImage<'ctx>,
    output: &DeviceImage<'ctx>,
    coefficients: &CoefficientBuffer<'ctx>,
    window_size: usize,
) -> Result<WorkPartition> {
    let bound = bind(
        ctx,
        kernel,
        &KernelArgs {
            input,
            output,
            coefficients,
            window_size,
        },
    )?;
    let partition = bound.partition();

    let max_groups = ctx.limits().max_compute_workgroups_per_dimension;
    if partition.groups.0 > max_groups || partition.groups.1 > max_groups {
        return Err(FilterError::KernelExecutionFailed {
            reason: format!("{partition} exceeds {max_groups} workgroups per dimension"),
        });
    }
    if !partition.is_exact() {
        tracing::debug!(%partition, "image does not tile the workgroup; edge groups are partial");
    }

    let ((), error) = ctx.capture(|device| {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("dispatch"),
        });
        bound.encode(&mut encoder);
        ctx.submit_and_wait(encoder.finish());
    });
    if let Some(e) = error {
        return Err(FilterError::KernelExecutionFailed {
            reason: e.to_string(),
        });
    }

    tracing::debug!(entry_point = kernel.entry_point(), %partition, "kernel executed");
    Ok(partition)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
