// gpu/device.rs — Platform/device discovery and the execution context.
//
// Responsibilities:
//   - Enumerate platforms (wgpu backends) and their adapters, and pick the
//     first adapter of the requested `DeviceKind`.
//   - Open a device and its queue on that adapter, bundled into an
//     `ExecutionContext` that owns every native handle of one run.
//   - Tear everything down on drop, on success and failure paths alike.
//
// PLATFORM / DEVICE MAPPING:
//   platform        → wgpu::Backend (Vulkan, Metal, DX12, GL)
//   device          → wgpu::Adapter
//   compute context → wgpu::Device
//   command queue   → wgpu::Queue (always in-order)
//
// ADAPTER SELECTION:
// Platforms are visited in a fixed order and the first one with a matching
// adapter wins. `DeviceKind::Gpu` accepts anything that is not a software
// rasterizer. There is deliberately no CPU fallback: if only llvmpipe /
// SwiftShader / WARP are visible, a `Gpu` request fails with
// `DeviceUnavailable`. dzn (D3D12-to-Vulkan on WSL2) reports itself as
// `DeviceType::Other`, which is why `Other` counts as a GPU.
//
// ERROR CAPTURE:
// wgpu reports most failures (allocation, validation) asynchronously through
// error scopes rather than return values. `ExecutionContext::capture` wraps a
// closure in an out-of-memory scope and a validation scope and returns
// whatever error the closure provoked, so callers can turn it into a typed
// `FilterError`. Anything that escapes a scope lands in the uncaptured-error
// handler installed at creation, which logs it.
//
// DROP ORDER:
// Rust drops struct fields in declaration order. `_instance` is declared
// last so the instance outlives `device` and `queue`; some Vulkan layers
// crash if the instance goes first.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::error::{FilterError, Result};

/// Platforms in the order they are searched.
const PLATFORM_ORDER: [(wgpu::Backend, wgpu::Backends); 4] = [
    (wgpu::Backend::Vulkan, wgpu::Backends::VULKAN),
    (wgpu::Backend::Metal, wgpu::Backends::METAL),
    (wgpu::Backend::Dx12, wgpu::Backends::DX12),
    (wgpu::Backend::Gl, wgpu::Backends::GL),
];

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);
static LIVE_CONTEXTS: AtomicUsize = AtomicUsize::new(0);

// ============================================================
// DeviceKind
// ============================================================

/// The kind of compute device a run asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceKind {
    /// Any hardware (or pass-through) GPU. Software rasterizers are rejected.
    #[default]
    Gpu,
    DiscreteGpu,
    IntegratedGpu,
    /// Software adapters only (llvmpipe, SwiftShader, WARP).
    Cpu,
}

impl DeviceKind {
    /// Whether an adapter of type `ty` satisfies this request.
    pub fn accepts(self, ty: wgpu::DeviceType) -> bool {
        use wgpu::DeviceType as T;
        match self {
            DeviceKind::Gpu => matches!(
                ty,
                T::DiscreteGpu | T::IntegratedGpu | T::VirtualGpu | T::Other
            ),
            DeviceKind::DiscreteGpu => ty == T::DiscreteGpu,
            DeviceKind::IntegratedGpu => ty == T::IntegratedGpu,
            DeviceKind::Cpu => ty == T::Cpu,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceKind::Gpu => "gpu",
            DeviceKind::DiscreteGpu => "discrete",
            DeviceKind::IntegratedGpu => "integrated",
            DeviceKind::Cpu => "cpu",
        })
    }
}

impl FromStr for DeviceKind {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gpu" => Ok(DeviceKind::Gpu),
            "discrete" | "discrete-gpu" => Ok(DeviceKind::DiscreteGpu),
            "integrated" | "integrated-gpu" => Ok(DeviceKind::IntegratedGpu),
            "cpu" => Ok(DeviceKind::Cpu),
            other => Err(FilterError::config(format!(
                "unknown device kind `{other}` (expected gpu, discrete, integrated or cpu)"
            ))),
        }
    }
}

// ============================================================
// WorkgroupSize
// ============================================================

/// Local work-group size of a 2D dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl WorkgroupSize {
    /// 16×16 = 256 invocations, the tile the filter kernel is written for.
    pub const DEFAULT: WorkgroupSize = WorkgroupSize { x: 16, y: 16 };

    /// Total invocations per workgroup (x * y).
    pub fn total(&self) -> u64 {
        u64::from(self.x) * u64::from(self.y)
    }

    /// Check the size against a device's compute limits.
    pub fn validate(&self, limits: &wgpu::Limits) -> Result<()> {
        if self.x == 0 || self.y == 0 {
            return Err(FilterError::config(format!(
                "workgroup size {}×{} has a zero dimension",
                self.x, self.y
            )));
        }
        if self.x > limits.max_compute_workgroup_size_x
            || self.y > limits.max_compute_workgroup_size_y
        {
            return Err(FilterError::config(format!(
                "workgroup size {}×{} exceeds per-dimension limit {}×{}",
                self.x,
                self.y,
                limits.max_compute_workgroup_size_x,
                limits.max_compute_workgroup_size_y
            )));
        }
        let max = limits.max_compute_invocations_per_workgroup;
        if self.total() > u64::from(max) {
            return Err(FilterError::config(format!(
                "workgroup size {self} exceeds device limit of {max} invocations"
            )));
        }
        Ok(())
    }
}

impl Default for WorkgroupSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{} ({} invocations)", self.x, self.y, self.total())
    }
}

/// Parses `16x16` (also `16×16` and `16,16`).
impl FromStr for WorkgroupSize {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || FilterError::config(format!("invalid workgroup size `{s}` (expected e.g. 16x16)"));
        let (x, y) = s
            .trim()
            .split_once(['x', 'X', '×', ','])
            .ok_or_else(bad)?;
        let x: u32 = x.trim().parse().map_err(|_| bad())?;
        let y: u32 = y.trim().parse().map_err(|_| bad())?;
        if x == 0 || y == 0 {
            return Err(bad());
        }
        Ok(WorkgroupSize { x, y })
    }
}

// ============================================================
// Adapter info
// ============================================================

/// Cached adapter information for logging and reports.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
    pub driver: String,
}

impl From<wgpu::AdapterInfo> for AdapterInfo {
    fn from(raw: wgpu::AdapterInfo) -> Self {
        AdapterInfo {
            name: raw.name,
            vendor: raw.vendor,
            device: raw.device,
            device_type: raw.device_type,
            backend: raw.backend,
            driver: raw.driver,
        }
    }
}

/// `{}` gives name, platform and type. `{:#}` adds PCI ids and driver.
impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}, {:?})",
            self.name, self.backend, self.device_type
        )?;
        if f.alternate() {
            write!(f, " [{:04x}:{:04x}]", self.vendor, self.device)?;
            if !self.driver.is_empty() {
                write!(f, " driver {}", self.driver)?;
            }
        }
        Ok(())
    }
}

// ============================================================
// Device request
// ============================================================

/// What `acquire_device` should look for.
#[derive(Debug, Clone)]
pub struct DeviceRequest {
    pub kind: DeviceKind,
    /// Platforms allowed to be searched.
    pub backends: wgpu::Backends,
    /// Debug label attached to the device.
    pub label: String,
}

impl Default for DeviceRequest {
    fn default() -> Self {
        DeviceRequest {
            kind: DeviceKind::Gpu,
            backends: wgpu::Backends::all(),
            label: "gauss-gpu".to_string(),
        }
    }
}

impl DeviceRequest {
    pub fn new(kind: DeviceKind) -> Self {
        DeviceRequest { kind, ..Default::default() }
    }

    pub fn with_backends(mut self, backends: wgpu::Backends) -> Self {
        self.backends = backends;
        self
    }
}

// ============================================================
// ExecutionContext
// ============================================================

/// Process-unique identity of one `ExecutionContext`. Every device object
/// records the id of the context that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// One platform, one device, one compute context and one in-order queue,
/// valid for the lifetime of a run.
///
/// Device objects (`DeviceImage`, `CoefficientBuffer`, `CompiledKernel`)
/// borrow the context, so the borrow checker guarantees none of them is
/// used after the context is dropped.
pub struct ExecutionContext {
    id: ContextId,
    adapter_info: AdapterInfo,
    device: wgpu::Device,
    queue: wgpu::Queue,
    /// Keeps the `wgpu::Instance` alive until `device` and `queue` are
    /// dropped. Never accessed; its sole purpose is drop order.
    _instance: wgpu::Instance,
}

impl ExecutionContext {
    #[inline]
    pub fn id(&self) -> ContextId {
        self.id
    }

    #[inline]
    pub fn adapter_info(&self) -> &AdapterInfo {
        &self.adapter_info
    }

    #[inline]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    /// Number of contexts currently alive in this process.
    pub fn live_count() -> usize {
        LIVE_CONTEXTS.load(Ordering::SeqCst)
    }

    /// Run `f` inside out-of-memory and validation error scopes and return
    /// its value together with the first error it provoked, if any.
    pub(crate) fn capture<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        (value, validation.or(oom))
    }

    /// Submit one command buffer and block until the queue has executed it.
    pub(crate) fn submit_and_wait(&self, commands: wgpu::CommandBuffer) {
        let index = self.queue.submit(std::iter::once(commands));
        self.device.poll(wgpu::Maintain::wait_for(index));
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExecutionContext {{ {}, adapter: {} }}", self.id, self.adapter_info)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("adapter_info", &self.adapter_info)
            .finish_non_exhaustive()
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        // Let queued work retire before the device goes away.
        self.device.poll(wgpu::Maintain::Wait);
        self.device.destroy();
        LIVE_CONTEXTS.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(context = %self.id, "execution context released");
    }
}

// ============================================================
// Acquisition
// ============================================================

/// Discover a platform and device of the requested kind and open an
/// execution context with a single in-order queue on it.
///
/// Every call creates its own instance, adapter, device and queue; nothing
/// is shared between acquisitions.
///
/// # Errors
/// - `DeviceUnavailable` if no enabled platform exposes a matching adapter.
/// - `ContextCreationFailed` if the backend rejects the device request.
pub fn acquire_device(request: &DeviceRequest) -> Result<ExecutionContext> {
    pollster::block_on(acquire_device_async(request))
}

async fn acquire_device_async(request: &DeviceRequest) -> Result<ExecutionContext> {
    if request.backends.is_empty() {
        return Err(FilterError::DeviceUnavailable {
            requested: request.kind,
            platforms_seen: 0,
            adapters_seen: 0,
        });
    }

    let flags = if cfg!(debug_assertions) {
        wgpu::InstanceFlags::VALIDATION
    } else {
        wgpu::InstanceFlags::empty()
    };
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: request.backends,
        flags,
        ..Default::default()
    });

    let mut platforms_seen = 0;
    let mut adapters_seen = 0;
    let mut selected = None;

    for (backend, bits) in PLATFORM_ORDER {
        if !request.backends.contains(bits) {
            continue;
        }
        let adapters = instance.enumerate_adapters(bits);
        if adapters.is_empty() {
            continue;
        }
        platforms_seen += 1;

        for adapter in &adapters {
            let info = adapter.get_info();
            tracing::debug!(
                platform = ?backend,
                adapter = %info.name,
                device_type = ?info.device_type,
                "enumerated adapter"
            );
        }

        let count = adapters.len();
        match adapters
            .into_iter()
            .find(|a| request.kind.accepts(a.get_info().device_type))
        {
            Some(adapter) => {
                selected = Some(adapter);
                break;
            }
            None => adapters_seen += count,
        }
    }

    let adapter = selected.ok_or(FilterError::DeviceUnavailable {
        requested: request.kind,
        platforms_seen,
        adapters_seen,
    })?;

    let adapter_info = AdapterInfo::from(adapter.get_info());
    tracing::info!(
        adapter = %adapter_info,
        vendor = adapter_info.vendor,
        device = adapter_info.device,
        driver = %adapter_info.driver,
        kind = %request.kind,
        "selected compute device"
    );

    let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some(&request.label),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        )
        .await
        .map_err(|e| FilterError::ContextCreationFailed {
            adapter: adapter_info.name.clone(),
            reason: e.to_string(),
        })?;

    device.on_uncaptured_error(Box::new(|error| {
        tracing::error!(%error, "uncaptured device error");
    }));

    let id = ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed));
    LIVE_CONTEXTS.fetch_add(1, Ordering::SeqCst);
    tracing::debug!(context = %id, "execution context created");

    Ok(ExecutionContext {
        id,
        adapter_info,
        device,
        queue,
        _instance: instance,
    })
}

// ============================================================
// Tests
// ============================================================
