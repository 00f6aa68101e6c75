// gpu/memory.rs — Device image and coefficient buffer objects, and the
// host↔device transfers that fill and drain them.
//
// RESPONSIBILITIES
// ─────────────────
// 1. `DeviceImage` — a single-channel R32Float 2D texture, tagged at creation
//    as read-only (sampled by the kernel) or write-only (storage-written by
//    the kernel).
//
// 2. `CoefficientBuffer` — the N² convolution coefficients in a storage
//    buffer, initialised from host memory at creation.
//
// 3. Blocking upload / download. Every transfer is submitted on its own and
//    the host waits for that submission before returning, so no object is
//    ever read before its upload has landed.
//
//
// ROW ALIGNMENT
// ──────────────
// `copy_buffer_to_texture` / `copy_texture_to_buffer` require
// `bytes_per_row` to be a multiple of 256. A FloatPlane row is
// `width * 4` bytes with no padding, so uploads pack each row into a staging
// buffer whose rows are padded up to the next 256-byte boundary, and
// downloads strip that padding again:
//
//   staging row (width = 3):
//     [f0 f1 f2 | zero padding up to 256 bytes ]
//
//
// OWNERSHIP
// ──────────
// Both object types borrow the `ExecutionContext` that created them. They
// cannot outlive it, and dropping one destroys its texture or buffer right
// away instead of waiting for the context to go.

use wgpu::util::DeviceExt;

use crate::error::{FilterError, Result};
use crate::gpu::device::{ContextId, ExecutionContext};
use crate::image::FloatPlane;
use crate::kernel::ConvolutionKernel;

const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
const TEXEL_BYTES: u32 = std::mem::size_of::<f32>() as u32;
const IMAGE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

// ---------------------------------------------------------------------------
// Access tags
// ---------------------------------------------------------------------------

/// How the kernel will use an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAccess {
    /// Sampled by the kernel; host may upload into it and read it back.
    ReadOnly,
    /// Written by the kernel; host may read it back.
    WriteOnly,
}

impl ImageAccess {
    /// Texture usages for an image of this access, with `COPY_DST` when the
    /// host uploads into it.
    pub fn usages(self, uploaded: bool) -> wgpu::TextureUsages {
        let base = match self {
            ImageAccess::ReadOnly => {
                wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::COPY_SRC
            }
            ImageAccess::WriteOnly => {
                wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC
            }
        };
        if uploaded {
            base | wgpu::TextureUsages::COPY_DST
        } else {
            base
        }
    }
}

// ---------------------------------------------------------------------------
// DeviceImage
// ---------------------------------------------------------------------------

/// A single-channel f32 image resident on the device.
pub struct DeviceImage<'ctx> {
    ctx: &'ctx ExecutionContext,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    access: ImageAccess,
}

impl<'ctx> DeviceImage<'ctx> {
    #[inline]
    pub fn context(&self) -> &'ctx ExecutionContext {
        self.ctx
    }

    #[inline]
    pub fn context_id(&self) -> ContextId {
        self.ctx.id()
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn access(&self) -> ImageAccess {
        self.access
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// Full-texture view, as bound to the kernel.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

impl std::fmt::Debug for DeviceImage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceImage")
            .field("context", &self.ctx.id())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("access", &self.access)
            .finish()
    }
}

impl Drop for DeviceImage<'_> {
    fn drop(&mut self) {
        self.texture.destroy();
    }
}

// ---------------------------------------------------------------------------
// CoefficientBuffer
// ---------------------------------------------------------------------------

/// N² convolution coefficients in a device storage buffer.
pub struct CoefficientBuffer<'ctx> {
    ctx: &'ctx ExecutionContext,
    buffer: wgpu::Buffer,
    side: usize,
}

impl<'ctx> CoefficientBuffer<'ctx> {
    #[inline]
    pub fn context(&self) -> &'ctx ExecutionContext {
        self.ctx
    }

    #[inline]
    pub fn context_id(&self) -> ContextId {
        self.ctx.id()
    }

    /// Kernel side length N.
    #[inline]
    pub fn side(&self) -> usize {
        self.side
    }

    /// Number of coefficients, N².
    #[inline]
    pub fn len(&self) -> usize {
        self.side * self.side
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.side == 0
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

impl std::fmt::Debug for CoefficientBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoefficientBuffer")
            .field("context", &self.ctx.id())
            .field("side", &self.side)
            .finish()
    }
}

impl Drop for CoefficientBuffer<'_> {
    fn drop(&mut self) {
        self.buffer.destroy();
    }
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

fn check_dimensions(ctx: &ExecutionContext, width: usize, height: usize) -> Result<(u32, u32)> {
    if width == 0 || height == 0 {
        return Err(FilterError::InvalidDimensions {
            width,
            height,
            reason: "image must have at least one pixel".to_string(),
        });
    }
    let max = ctx.limits().max_texture_dimension_2d;
    match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) if w <= max && h <= max => Ok((w, h)),
        _ => Err(FilterError::AllocationFailed {
            what: format!("{width}×{height} image"),
            reason: format!("exceeds the device's maximum 2D texture size of {max}"),
        }),
    }
}

fn create_image<'ctx>(
    ctx: &'ctx ExecutionContext,
    width: u32,
    height: u32,
    access: ImageAccess,
    uploaded: bool,
) -> Result<DeviceImage<'ctx>> {
    let (texture, error) = ctx.capture(|device| {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some(match access {
                ImageAccess::ReadOnly => "raw image",
                ImageAccess::WriteOnly => "filtered image",
            }),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: IMAGE_FORMAT,
            usage: access.usages(uploaded),
            view_formats: &[],
        })
    });
    if let Some(e) = error {
        texture.destroy();
        return Err(FilterError::AllocationFailed {
            what: format!("{width}×{height} {access:?} image"),
            reason: e.to_string(),
        });
    }

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Ok(DeviceImage {
        ctx,
        texture,
        view,
        width,
        height,
        access,
    })
}

/// Allocate an image the kernel writes into. Nothing is transferred.
pub fn allocate_output_image(
    ctx: &ExecutionContext,
    width: usize,
    height: usize,
) -> Result<DeviceImage<'_>> {
    let (w, h) = check_dimensions(ctx, width, height)?;
    create_image(ctx, w, h, ImageAccess::WriteOnly, false)
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// Allocate a device image sized to `plane` and copy the plane into it.
/// Returns once the copy has executed on the device.
///
/// # Errors
/// - `InvalidDimensions` for an empty plane.
/// - `AllocationFailed` if the device cannot hold the image.
/// - `TransferFailed` if the copy is rejected.
pub fn upload_image<'ctx>(
    ctx: &'ctx ExecutionContext,
    plane: &FloatPlane,
    access: ImageAccess,
) -> Result<DeviceImage<'ctx>> {
    let (width, height) = check_dimensions(ctx, plane.width(), plane.height())?;
    let image = create_image(ctx, width, height, access, true)?;

    let (staging, bytes_per_row) = pack_rows(plane);

    let ((), error) = ctx.capture(|device| {
        let staging_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("upload staging"),
            contents: &staging,
            usage: wgpu::BufferUsages::COPY_SRC,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("upload_image"),
        });
        encoder.copy_buffer_to_texture(
            wgpu::ImageCopyBuffer {
                buffer: &staging_buf,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::ImageCopyTexture {
                texture: image.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.extent(),
        );
        ctx.submit_and_wait(encoder.finish());
        staging_buf.destroy();
    });

    if let Some(e) = error {
        return Err(FilterError::TransferFailed {
            what: format!("{width}×{height} image upload"),
            reason: e.to_string(),
        });
    }

    tracing::trace!(width, height, access = ?access, "image uploaded");
    Ok(image)
}

/// Create the coefficient buffer, initialised with `kernel`'s row-major
/// coefficients at creation (no separate transfer).
pub fn upload_coefficients<'ctx, const N: usize>(
    ctx: &'ctx ExecutionContext,
    kernel: &ConvolutionKernel<N>,
) -> Result<CoefficientBuffer<'ctx>> {
    let (buffer, error) = ctx.capture(|device| {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("filter coefficients"),
            contents: bytemuck::cast_slice(kernel.as_flat()),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        })
    });
    if let Some(e) = error {
        buffer.destroy();
        return Err(FilterError::AllocationFailed {
            what: format!("{N}×{N} coefficient buffer"),
            reason: e.to_string(),
        });
    }

    Ok(CoefficientBuffer {
        ctx,
        buffer,
        side: N,
    })
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

/// Read a device image back into a host plane. Blocks until the copy has
/// executed and the readback buffer is mapped.
///
/// # Errors
/// `TransferFailed` if the image belongs to another context, the copy is
/// rejected, or the readback buffer cannot be mapped.
pub fn download(ctx: &ExecutionContext, image: &DeviceImage<'_>) -> Result<FloatPlane> {
    let (width, height) = image.dimensions();
    let what = || format!("{width}×{height} image download");

    if image.context_id() != ctx.id() {
        return Err(FilterError::TransferFailed {
            what: what(),
            reason: format!("image belongs to {}, not {}", image.context_id(), ctx.id()),
        });
    }

    let bytes_per_row = padded_bytes_per_row(width);
    let (readback, error) = ctx.capture(|device| {
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("download readback"),
            size: bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("download"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: image.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            image.extent(),
        );
        ctx.submit_and_wait(encoder.finish());
        readback
    });

    if let Some(e) = error {
        readback.destroy();
        return Err(FilterError::TransferFailed {
            what: what(),
            reason: e.to_string(),
        });
    }

    let bytes = map_read(ctx, &readback).map_err(|reason| FilterError::TransferFailed {
        what: what(),
        reason,
    })?;
    readback.destroy();

    Ok(unpack_rows(&bytes, bytes_per_row, width, height))
}

/// Read the coefficient buffer back to the host, row-major.
pub fn download_coefficients(
    ctx: &ExecutionContext,
    coefficients: &CoefficientBuffer<'_>,
) -> Result<Vec<f32>> {
    let size = coefficients.buffer().size();
    let what = || format!("{}-coefficient download", coefficients.len());

    let (readback, error) = ctx.capture(|device| {
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("coefficient readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("download_coefficients"),
        });
        encoder.copy_buffer_to_buffer(coefficients.buffer(), 0, &readback, 0, size);
        ctx.submit_and_wait(encoder.finish());
        readback
    });
    if let Some(e) = error {
        readback.destroy();
        return Err(FilterError::TransferFailed {
            what: what(),
            reason: e.to_string(),
        });
    }

    let bytes = map_read(ctx, &readback).map_err(|reason| FilterError::TransferFailed {
        what: what(),
        reason,
    })?;
    readback.destroy();
    Ok(bytemuck::pod_collect_to_vec(&bytes[..]))
}

/// Map `buffer` for reading, block until the map completes, and copy its
/// contents out.
fn map_read(ctx: &ExecutionContext, buffer: &wgpu::Buffer) -> std::result::Result<Vec<u8>, String> {
    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    ctx.device().poll(wgpu::Maintain::Wait);

    match rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e.to_string()),
        Err(_) => return Err("map callback never fired".to_string()),
    }

    let bytes = slice.get_mapped_range().to_vec();
    buffer.unmap();
    Ok(bytes)
}

// ---------------------------------------------------------------------------
// Row packing
// ---------------------------------------------------------------------------

/// Row pitch of a `width`-texel R32Float copy, padded for wgpu.
fn padded_bytes_per_row(width: u32) -> u32 {
    align_to(width * TEXEL_BYTES, COPY_ALIGNMENT)
}

/// Lay out `plane` with each row padded to `COPY_BYTES_PER_ROW_ALIGNMENT`.
/// Returns the bytes and the padded row pitch.
fn pack_rows(plane: &FloatPlane) -> (Vec<u8>, u32) {
    let bytes_per_row = padded_bytes_per_row(plane.width() as u32);
    let pitch = bytes_per_row as usize;
    let row_bytes = plane.width() * TEXEL_BYTES as usize;

    let mut staging = vec![0u8; pitch * plane.height()];
    for y in 0..plane.height() {
        let dst = y * pitch;
        staging[dst..dst + row_bytes].copy_from_slice(bytemuck::cast_slice(plane.row(y)));
    }
    (staging, bytes_per_row)
}

/// Inverse of `pack_rows`: drop the padding at the end of every row.
fn unpack_rows(bytes: &[u8], bytes_per_row: u32, width: u32, height: u32) -> FloatPlane {
    let pitch = bytes_per_row as usize;
    let row_bytes = (width * TEXEL_BYTES) as usize;

    let mut data = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height as usize {
        let row = &bytes[y * pitch..y * pitch + row_bytes];
        data.extend(bytemuck::pod_collect_to_vec::<u8, f32>(row));
    }
    FloatPlane::from_vec(width as usize, height as usize, data)
}

/// Round `value` up to the next multiple of `alignment`.
///
///   align_to(100, 256) = 256
///   align_to(256, 256) = 256
///   align_to(257, 256) = 512
#[inline]
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
