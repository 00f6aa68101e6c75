// error.rs — Error taxonomy for the filter pipeline.
//
// Every variant is fatal to the current run. Variants that originate in the
// compute backend carry the backend's own diagnostic text (wgpu error
// message, naga build log, image codec error) so a failure can be diagnosed
// without re-running.

use std::path::PathBuf;

use crate::gpu::device::DeviceKind;

pub type Result<T> = std::result::Result<T, FilterError>;

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// No platform exposes an adapter of the requested kind.
    #[error(
        "no {requested} device available ({platforms_seen} platform(s) enumerated, \
         {adapters_seen} adapter(s) rejected)"
    )]
    DeviceUnavailable {
        requested: DeviceKind,
        platforms_seen: usize,
        adapters_seen: usize,
    },

    /// The adapter was found but the backend refused to open a device/queue on it.
    #[error("context creation failed on {adapter}: {reason}")]
    ContextCreationFailed { adapter: String, reason: String },

    /// Kernel source failed to compile. `log` is the compiler's build log.
    #[error("kernel compilation failed:\n{log}")]
    KernelCompilationError { log: String },

    #[error("entry point `{name}` not found (compute entry points: [{}])", .available.join(", "))]
    EntryPointNotFound { name: String, available: Vec<String> },

    #[error("allocation of {what} failed: {reason}")]
    AllocationFailed { what: String, reason: String },

    #[error("transfer of {what} failed: {reason}")]
    TransferFailed { what: String, reason: String },

    /// `index` is the kernel argument slot (0 = input image … 3 = window size).
    #[error("kernel argument {index} rejected: {reason}")]
    KernelArgumentBindingFailed { index: u32, reason: String },

    #[error("kernel execution failed: {reason}")]
    KernelExecutionFailed { reason: String },

    #[error("cannot decode {}: {reason}", .path.display())]
    DecodeError { path: PathBuf, reason: String },

    #[error("cannot encode {}: {reason}", .path.display())]
    EncodeError { path: PathBuf, reason: String },

    #[error("invalid convolution kernel: {0}")]
    InvalidKernel(String),

    #[error("invalid image dimensions {width}×{height}: {reason}")]
    InvalidDimensions {
        width: usize,
        height: usize,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl FilterError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        FilterError::Config(msg.into())
    }

    pub(crate) fn binding<S: Into<String>>(index: u32, reason: S) -> Self {
        FilterError::KernelArgumentBindingFailed {
            index,
            reason: reason.into(),
        }
    }

    /// True for errors raised by the compute backend, as opposed to host-side
    /// validation or file I/O.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            FilterError::DeviceUnavailable { .. }
                | FilterError::ContextCreationFailed { .. }
                | FilterError::KernelCompilationError { .. }
                | FilterError::EntryPointNotFound { .. }
                | FilterError::AllocationFailed { .. }
                | FilterError::TransferFailed { .. }
                | FilterError::KernelArgumentBindingFailed { .. }
                | FilterError::KernelExecutionFailed { .. }
        )
    }
}
