// config.rs — Run configuration.
//
// Precedence, lowest to highest: built-in defaults, GAUSS_GPU_* environment
// variables (`PipelineConfig::from_env`), explicit `with_*` calls (the CLI
// applies its flags this way).

use crate::error::{FilterError, Result};
use crate::gpu::device::{DeviceKind, DeviceRequest, WorkgroupSize};
use crate::gpu::program::{ProgramSource, ENTRY_POINT};

/// Device kind: gpu, discrete, integrated or cpu.
pub const ENV_DEVICE: &str = "GAUSS_GPU_DEVICE";
/// Platforms to search: all, or a comma-separated list of vulkan, metal, dx12, gl.
pub const ENV_BACKEND: &str = "GAUSS_GPU_BACKEND";
/// Workgroup size, e.g. 16x16.
pub const ENV_WORKGROUP: &str = "GAUSS_GPU_WORKGROUP";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub device_kind: DeviceKind,
    pub backends: wgpu::Backends,
    /// Substituted into the shipped kernel. Ignored when `kernel_source` is set.
    pub workgroup: WorkgroupSize,
    /// Replacement WGSL kernel. Must follow the four-slot binding interface.
    pub kernel_source: Option<String>,
    pub entry_point: String,
    /// Debug label for the device.
    pub label: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            device_kind: DeviceKind::Gpu,
            backends: wgpu::Backends::all(),
            workgroup: WorkgroupSize::DEFAULT,
            kernel_source: None,
            entry_point: ENTRY_POINT.to_string(),
            label: "gauss-gpu".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by the GAUSS_GPU_* environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_vars(|name| std::env::var(name).ok())
    }

    /// Apply overrides from a variable lookup. Unset or empty variables are
    /// skipped.
    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_DEVICE) {
            self.device_kind = v
                .parse()
                .map_err(|e| env_error(ENV_DEVICE, e))?;
        }
        if let Some(v) = get(ENV_BACKEND) {
            self.backends =
                parse_backends(&v).map_err(|e| env_error(ENV_BACKEND, e))?;
        }
        if let Some(v) = get(ENV_WORKGROUP) {
            self.workgroup = v
                .parse()
                .map_err(|e| env_error(ENV_WORKGROUP, e))?;
        }
        Ok(self)
    }

    pub fn with_device_kind(mut self, kind: DeviceKind) -> Self {
        self.device_kind = kind;
        self
    }

    pub fn with_backends(mut self, backends: wgpu::Backends) -> Self {
        self.backends = backends;
        self
    }

    pub fn with_workgroup(mut self, workgroup: WorkgroupSize) -> Self {
        self.workgroup = workgroup;
        self
    }

    pub fn with_kernel_source(mut self, source: impl Into<String>, entry_point: impl Into<String>) -> Self {
        self.kernel_source = Some(source.into());
        self.entry_point = entry_point.into();
        self
    }

    pub fn device_request(&self) -> DeviceRequest {
        DeviceRequest {
            kind: self.device_kind,
            backends: self.backends,
            label: self.label.clone(),
        }
    }

    /// The kernel to compile: the override if set, else the shipped kernel
    /// at the configured workgroup size.
    pub fn program_source(&self) -> Result<ProgramSource> {
        match &self.kernel_source {
            Some(src) => ProgramSource::parse(self.entry_point.clone(), src.clone()),
            None => ProgramSource::gaussian_filter(self.workgroup),
        }
    }
}

fn env_error(var: &str, err: FilterError) -> FilterError {
    match err {
        FilterError::Config(msg) => FilterError::config(format!("{var}: {msg}")),
        other => other,
    }
}

/// Parse `all` or a comma-separated list of platform names.
pub fn parse_backends(s: &str) -> Result<wgpu::Backends> {
    let mut backends = wgpu::Backends::empty();
    for name in s.split(',').map(|n| n.trim().to_ascii_lowercase()) {
        backends |= match name.as_str() {
            "all" => wgpu::Backends::all(),
            "vulkan" | "vk" => wgpu::Backends::VULKAN,
            "metal" => wgpu::Backends::METAL,
            "dx12" | "d3d12" => wgpu::Backends::DX12,
            "gl" | "gles" | "opengl" => wgpu::Backends::GL,
            "primary" => wgpu::Backends::PRIMARY,
            other => {
                return Err(FilterError::config(format!(
                    "unknown backend `{other}` (expected all, vulkan, metal, dx12 or gl)"
                )))
            }
        };
    }
    Ok(backends)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.device_kind, DeviceKind::Gpu);
        assert_eq!(cfg.backends, wgpu::Backends::all());
        assert_eq!(cfg.workgroup, WorkgroupSize::DEFAULT);
        assert_eq!(cfg.entry_point, ENTRY_POINT);
        assert!(cfg.kernel_source.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let cfg = PipelineConfig::default()
            .with_vars(vars(&[
                (ENV_DEVICE, "discrete"),
                (ENV_BACKEND, "vulkan, gl"),
                (ENV_WORKGROUP, "8x8"),
            ]))
            .unwrap();
        assert_eq!(cfg.device_kind, DeviceKind::DiscreteGpu);
        assert_eq!(cfg.backends, wgpu::Backends::VULKAN | wgpu::Backends::GL);
        assert_eq!(cfg.workgroup, WorkgroupSize { x: 8, y: 8 });
    }

    #[test]
    fn test_empty_vars_are_ignored() {
        let cfg = PipelineConfig::default()
            .with_vars(vars(&[(ENV_DEVICE, ""), (ENV_BACKEND, "  ")]))
            .unwrap();
        assert_eq!(cfg.device_kind, DeviceKind::Gpu);
        assert_eq!(cfg.backends, wgpu::Backends::all());
    }

    #[test]
    fn test_bad_env_value_names_variable() {
        let err = PipelineConfig::default()
            .with_vars(vars(&[(ENV_WORKGROUP, "sixteen")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_WORKGROUP), "{err}");
    }

    #[test]
    fn test_parse_backends() {
        assert_eq!(parse_backends("all").unwrap(), wgpu::Backends::all());
        assert_eq!(parse_backends("Metal").unwrap(), wgpu::Backends::METAL);
        assert!(parse_backends("cuda").is_err());
    }

    #[test]
    fn test_shipped_program_uses_configured_workgroup() {
        let cfg = PipelineConfig::default().with_workgroup(WorkgroupSize { x: 8, y: 4 });
        let program = cfg.program_source().unwrap();
        assert_eq!(
            program.entry_point(&cfg.entry_point).unwrap(),
            WorkgroupSize { x: 8, y: 4 }
        );
    }

    #[test]
    fn test_kernel_override_is_compiled_instead() {
        let cfg = PipelineConfig::default().with_kernel_source("fn oops(", "oops");
        assert!(matches!(
            cfg.program_source(),
            Err(FilterError::KernelCompilationError { .. })
        ));
    }
}
