//! DPU error types

use thiserror::Error;

/// Coarse error kind reported back to the requester of a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// Capability the request needs is not advertised by the device
    Unsupported,
    /// A coordinate or size is not a multiple of the required alignment
    BadAlignment,
    /// A size or ratio is outside the allowed range
    BadRange,
    /// Pixel format / compression combination cannot be described
    UnsupportedFormat,
    /// A previous job is still outstanding
    Busy,
    /// A bounded resource pool had nothing to hand out
    ResourceExhausted,
    /// Bad property name, value or immutable property write
    InvalidArgument,
    /// Hardware reported an error
    Hardware,
    /// Programming failed after a successful validation
    ProgramFailed,
    /// Waiting on hardware timed out
    Timeout,
    /// No device with the requested id
    NotFound,
    /// Configuration could not be loaded
    Config,
}

/// DPU errors
#[derive(Debug, Error)]
pub enum DpuError {
    #[error("{feature} not supported by {device}")]
    Unsupported {
        device: String,
        feature: &'static str,
    },

    #[error("{field} = {value} is not aligned to {align}")]
    BadAlignment {
        field: &'static str,
        value: u32,
        align: u32,
    },

    #[error("{field} = {value} is out of range [{min}, {max}]")]
    BadRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("{field} scale ratio {ratio:#x} is out of range [{min:#x}, {max:#x}]")]
    BadScale {
        field: &'static str,
        ratio: u32,
        min: u32,
        max: u32,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Device busy: {0}")]
    Busy(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Hardware error on {device}: {reason}")]
    Hardware { device: String, reason: String },

    #[error("Programming {device} failed: {reason}")]
    ProgramFailed { device: String, reason: String },

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("No such device: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Blob encoding error: {0}")]
    Blob(#[from] bincode::Error),
}

impl DpuError {
    /// Get the coarse kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::BadAlignment { .. } => ErrorKind::BadAlignment,
            Self::BadRange { .. } | Self::BadScale { .. } => ErrorKind::BadRange,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::Busy(_) => ErrorKind::Busy,
            Self::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            Self::InvalidArgument(_) | Self::Blob(_) => ErrorKind::InvalidArgument,
            Self::Hardware { .. } => ErrorKind::Hardware,
            Self::ProgramFailed { .. } => ErrorKind::ProgramFailed,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Name of the violated constraint, when the error carries one
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::BadAlignment { field, .. }
            | Self::BadRange { field, .. }
            | Self::BadScale { field, .. } => Some(field),
            Self::Unsupported { feature, .. } => Some(feature),
            _ => None,
        }
    }
}

/// Result type for DPU operations
pub type DpuResult<T> = Result<T, DpuError>;
