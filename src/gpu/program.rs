// gpu/program.rs — Kernel source → compiled compute pipeline.
//
// Compilation is split in two stages:
//
//   1. `ProgramSource::parse` runs the WGSL front end (naga parse + full
//      validation) on the host. It needs no device, so malformed kernels are
//      reported with naga's rendered diagnostic (source line, caret, message)
//      even on machines without a GPU.
//
//   2. `build_program` resolves the entry point among the module's compute
//      entry points and creates the shader module, bind-group layout and
//      compute pipeline on the device, inside an error scope. Anything the
//      backend still rejects comes back as `KernelCompilationError` with
//      wgpu's message as the log.
//
// WORKGROUP SIZE:
// naga does not accept `override` expressions in @workgroup_size(), so the
// shipped kernel carries {{WG_X}}/{{WG_Y}} placeholder tokens that
// `kernel_source` replaces with literal numbers before parsing.
//
// BINDING INTERFACE:
// Every kernel built here is bound through the same four-slot layout
// (`KERNEL_BINDINGS`), in the argument order of the filter kernel:
// input image, output image, coefficients, window size.

use crate::error::{FilterError, Result};
use crate::gpu::device::{ExecutionContext, WorkgroupSize};

/// Entry point of the shipped filter kernel.
pub const ENTRY_POINT: &str = "gaussian_filter_kernel";

const KERNEL_TEMPLATE: &str = include_str!("../shaders/gaussian_filter.wgsl");

/// The shipped filter kernel with its workgroup size baked in.
pub fn kernel_source(workgroup: WorkgroupSize) -> String {
    KERNEL_TEMPLATE
        .replace("{{WG_X}}", &workgroup.x.to_string())
        .replace("{{WG_Y}}", &workgroup.y.to_string())
}

// ---------------------------------------------------------------------------
// Binding interface
// ---------------------------------------------------------------------------

/// One slot of the kernel's argument list.
#[derive(Debug, Clone, Copy)]
pub struct KernelBinding {
    pub index: u32,
    pub name: &'static str,
    pub ty: wgpu::BindingType,
}

pub const INPUT_BINDING: u32 = 0;
pub const OUTPUT_BINDING: u32 = 1;
pub const COEFFICIENTS_BINDING: u32 = 2;
pub const WINDOW_SIZE_BINDING: u32 = 3;

pub const KERNEL_BINDINGS: [KernelBinding; 4] = [
    KernelBinding {
        index: INPUT_BINDING,
        name: "input image",
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
        },
    },
    KernelBinding {
        index: OUTPUT_BINDING,
        name: "output image",
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: wgpu::TextureFormat::R32Float,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
    },
    KernelBinding {
        index: COEFFICIENTS_BINDING,
        name: "coefficients",
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
    },
    KernelBinding {
        index: WINDOW_SIZE_BINDING,
        name: "window size",
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
    },
];

fn layout_entries() -> [wgpu::BindGroupLayoutEntry; 4] {
    KERNEL_BINDINGS.map(|b| wgpu::BindGroupLayoutEntry {
        binding: b.index,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: b.ty,
        count: None,
    })
}

// ---------------------------------------------------------------------------
// ProgramSource
// ---------------------------------------------------------------------------

/// WGSL text that has passed the host-side front end.
#[derive(Debug)]
pub struct ProgramSource {
    label: String,
    source: String,
    module: naga::Module,
}

impl ProgramSource {
    /// Parse and validate WGSL.
    ///
    /// # Errors
    /// `KernelCompilationError` carrying naga's diagnostic, rendered against
    /// `source` so it points at the offending line.
    pub fn parse(label: impl Into<String>, source: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let source = source.into();

        let module = naga::front::wgsl::parse_str(&source).map_err(|e| {
            FilterError::KernelCompilationError {
                log: e.emit_to_string(&source),
            }
        })?;

        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .map_err(|e| FilterError::KernelCompilationError {
            log: e.emit_to_string(&source),
        })?;

        tracing::debug!(program = %label, "kernel source validated");
        Ok(ProgramSource { label, source, module })
    }

    /// The shipped filter kernel for a given workgroup size.
    pub fn gaussian_filter(workgroup: WorkgroupSize) -> Result<Self> {
        Self::parse("gaussian_filter.wgsl", kernel_source(workgroup))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn module(&self) -> &naga::Module {
        &self.module
    }

    /// Names of every compute entry point, in declaration order.
    pub fn compute_entry_points(&self) -> Vec<&str> {
        self.module
            .entry_points
            .iter()
            .filter(|ep| ep.stage == naga::ShaderStage::Compute)
            .map(|ep| ep.name.as_str())
            .collect()
    }

    /// Workgroup size declared by compute entry point `name`.
    pub fn entry_point(&self, name: &str) -> Result<WorkgroupSize> {
        self.module
            .entry_points
            .iter()
            .find(|ep| ep.stage == naga::ShaderStage::Compute && ep.name == name)
            .map(|ep| WorkgroupSize {
                x: ep.workgroup_size[0],
                y: ep.workgroup_size[1],
            })
            .ok_or_else(|| FilterError::EntryPointNotFound {
                name: name.to_string(),
                available: self
                    .compute_entry_points()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            })
    }
}

// ---------------------------------------------------------------------------
// CompiledKernel
// ---------------------------------------------------------------------------

/// A compute pipeline ready to be bound and dispatched on the context that
/// built it.
pub struct CompiledKernel<'ctx> {
    ctx: &'ctx ExecutionContext,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    entry_point: String,
    workgroup: WorkgroupSize,
}

impl<'ctx> CompiledKernel<'ctx> {
    pub fn context(&self) -> &'ctx ExecutionContext {
        self.ctx
    }

    pub fn pipeline(&self) -> &wgpu::ComputePipeline {
        &self.pipeline
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Workgroup size declared by the entry point.
    pub fn workgroup(&self) -> WorkgroupSize {
        self.workgroup
    }
}

impl std::fmt::Debug for CompiledKernel<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledKernel")
            .field("context", &self.ctx.id())
            .field("entry_point", &self.entry_point)
            .field("workgroup", &self.workgroup)
            .finish_non_exhaustive()
    }
}

/// Compile WGSL text and create a compute pipeline for `entry_point`.
pub fn build<'ctx>(
    ctx: &'ctx ExecutionContext,
    source_text: &str,
    entry_point: &str,
) -> Result<CompiledKernel<'ctx>> {
    let program = ProgramSource::parse(entry_point, source_text)?;
    build_program(ctx, &program, entry_point)
}

/// Create a compute pipeline for `entry_point` from already-parsed source.
///
/// # Errors
/// - `EntryPointNotFound` if `entry_point` is not a compute entry point.
/// - `KernelCompilationError` if the workgroup size exceeds the device's
///   limits or the backend rejects the module or pipeline.
pub fn build_program<'ctx>(
    ctx: &'ctx ExecutionContext,
    program: &ProgramSource,
    entry_point: &str,
) -> Result<CompiledKernel<'ctx>> {
    let workgroup = program.entry_point(entry_point)?;
    workgroup
        .validate(&ctx.limits())
        .map_err(|e| FilterError::KernelCompilationError { log: e.to_string() })?;

    let ((pipeline, bind_group_layout), error) = ctx.capture(|device| {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(program.label()),
            source: wgpu::ShaderSource::Wgsl(program.source().into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("filter kernel BGL"),
            entries: &layout_entries(),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("filter kernel pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(entry_point),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        (pipeline, bind_group_layout)
    });

    if let Some(e) = error {
        return Err(FilterError::KernelCompilationError { log: e.to_string() });
    }

    tracing::debug!(
        program = %program.label(),
        entry_point,
        workgroup = %workgroup,
        "compute pipeline created"
    );

    Ok(CompiledKernel {
        ctx,
        pipeline,
        bind_group_layout,
        entry_point: entry_point.to_string(),
        workgroup,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
