//! Device topology configuration - TOML to DpuConfig conversion
//!
//! Describes which layer processors, outputs and capture sinks exist and how
//! they are wired together. The registry is built from a [`DpuConfig`].
//!
//! # Format
//!
//! ```toml
//! [runtime]
//! commit_queue_depth = 4
//! frame_done_timeout_ms = 100
//!
//! [diagnostics]
//! ring_capacity = 64
//!
//! [[layers]]
//! id = 0
//! class = "gf"
//!
//! [[layers]]
//! id = 1
//! class = "vgrfs"
//!
//! [[outputs]]
//! id = 0
//! width = 1080
//! height = 2400
//! refresh_hz = 60
//! operation_mode = "command"
//! layers = [0, 1]
//! capture = 0
//! partial_align = [4, 4]
//!
//! [[captures]]
//! id = 0
//! repeater_buffers = 3
//! repeater_buffer_size = 0x0100_0000
//! repeater_base = 0xa000_0000
//! ```

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use dpu_hw::{DeviceClass, DpuError};

use crate::capture::CaptureId;
use crate::layer_processor::DppId;
use crate::output::{OutputId, DEFAULT_CHECKSUM_CAPACITY};
use crate::state::OperationMode;

/// Errors from configuration parsing
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid device class: {0}")]
    InvalidDeviceClass(String),

    #[error("Invalid operation mode: {0}")]
    InvalidOperationMode(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

impl From<ConfigError> for DpuError {
    fn from(err: ConfigError) -> Self {
        DpuError::Config(err.to_string())
    }
}

/// A layer processor to register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerConfig {
    pub id: DppId,
    pub class: DeviceClass,
}

/// An output and what is wired to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    pub id: OutputId,
    pub width: u32,
    pub height: u32,
    pub refresh_hz: u32,
    pub operation_mode: OperationMode,
    /// Attached layer processors
    pub layers: Vec<DppId>,
    pub capture: Option<CaptureId>,
    /// Partial-update granularity (width, height)
    pub partial_align: (u32, u32),
    pub bus_clock_khz: Option<u32>,
}

/// A capture sink and its repeater buffers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDeviceConfig {
    pub id: CaptureId,
    pub repeater_buffers: usize,
    pub repeater_buffer_size: u64,
    pub repeater_base: u64,
    /// Frames the pass-through link can hold before the oldest is recycled
    pub link_depth: usize,
}

/// Worker tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Commits that may wait on one output's worker
    pub commit_queue_depth: usize,
    /// Bound on waits for a previous frame
    pub frame_done_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            commit_queue_depth: 4,
            frame_done_timeout: Duration::from_millis(100),
        }
    }
}

/// Whole DPU topology
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DpuConfig {
    pub layers: Vec<LayerConfig>,
    pub outputs: Vec<OutputConfig>,
    pub captures: Vec<CaptureDeviceConfig>,
    /// Entries each output's checksum ring keeps
    pub diag_ring_capacity: usize,
    pub runtime: RuntimeConfig,
}

impl Default for DpuConfig {
    /// Phone-style topology: one command-mode panel, four layers and a
    /// capture sink with three repeater buffers
    fn default() -> Self {
        Self {
            layers: vec![
                LayerConfig { id: 0, class: DeviceClass::Gf },
                LayerConfig { id: 1, class: DeviceClass::Gf },
                LayerConfig { id: 2, class: DeviceClass::Vg },
                LayerConfig { id: 3, class: DeviceClass::Vgrfs },
            ],
            outputs: vec![OutputConfig {
                id: 0,
                width: 1080,
                height: 2400,
                refresh_hz: 60,
                operation_mode: OperationMode::Command,
                layers: vec![0, 1, 2, 3],
                capture: Some(0),
                partial_align: (4, 4),
                bus_clock_khz: None,
            }],
            captures: vec![CaptureDeviceConfig {
                id: 0,
                repeater_buffers: 3,
                repeater_buffer_size: 0x0100_0000,
                repeater_base: 0xa000_0000,
                link_depth: 3,
            }],
            diag_ring_capacity: DEFAULT_CHECKSUM_CAPACITY,
            runtime: RuntimeConfig::default(),
        }
    }
}

/// Raw TOML structure for runtime section
#[derive(Debug, Deserialize, Default)]
struct RuntimeToml {
    commit_queue_depth: Option<usize>,
    frame_done_timeout_ms: Option<u64>,
}

/// Raw TOML structure for diagnostics section
#[derive(Debug, Deserialize, Default)]
struct DiagnosticsToml {
    ring_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct LayerToml {
    id: DppId,
    class: String,
}

#[derive(Debug, Deserialize)]
struct OutputToml {
    id: OutputId,
    width: u32,
    height: u32,
    #[serde(default = "default_refresh")]
    refresh_hz: u32,
    operation_mode: Option<String>,
    #[serde(default)]
    layers: Vec<DppId>,
    capture: Option<CaptureId>,
    partial_align: Option<(u32, u32)>,
    bus_clock_khz: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CaptureToml {
    id: CaptureId,
    #[serde(default)]
    repeater_buffers: usize,
    #[serde(default)]
    repeater_buffer_size: u64,
    #[serde(default)]
    repeater_base: u64,
    link_depth: Option<usize>,
}

/// Root TOML structure
#[derive(Debug, Deserialize)]
struct ConfigToml {
    #[serde(default)]
    runtime: Option<RuntimeToml>,
    #[serde(default)]
    diagnostics: Option<DiagnosticsToml>,
    #[serde(default)]
    layers: Vec<LayerToml>,
    #[serde(default)]
    outputs: Vec<OutputToml>,
    #[serde(default)]
    captures: Vec<CaptureToml>,
}

fn default_refresh() -> u32 {
    60
}

/// Parse a layer device class name
fn parse_device_class(s: &str) -> ConfigResult<DeviceClass> {
    match s.to_lowercase().as_str() {
        "gf" => Ok(DeviceClass::Gf),
        "vg" => Ok(DeviceClass::Vg),
        "vgs" => Ok(DeviceClass::Vgs),
        "vgrfs" => Ok(DeviceClass::Vgrfs),
        _ => Err(ConfigError::InvalidDeviceClass(s.to_string())),
    }
}

fn parse_operation_mode(s: &str) -> ConfigResult<OperationMode> {
    match s.to_lowercase().as_str() {
        "video" => Ok(OperationMode::Video),
        "command" => Ok(OperationMode::Command),
        _ => Err(ConfigError::InvalidOperationMode(s.to_string())),
    }
}

impl DpuConfig {
    /// Parse a configuration from TOML
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let raw: ConfigToml = toml::from_str(content)?;

        let layers = raw
            .layers
            .iter()
            .map(|l| {
                Ok(LayerConfig {
                    id: l.id,
                    class: parse_device_class(&l.class)?,
                })
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        let outputs = raw
            .outputs
            .into_iter()
            .map(|o| {
                let operation_mode = match &o.operation_mode {
                    Some(mode) => parse_operation_mode(mode)?,
                    None => OperationMode::default(),
                };
                Ok(OutputConfig {
                    id: o.id,
                    width: o.width,
                    height: o.height,
                    refresh_hz: o.refresh_hz,
                    operation_mode,
                    layers: o.layers,
                    capture: o.capture,
                    partial_align: o.partial_align.unwrap_or((1, 1)),
                    bus_clock_khz: o.bus_clock_khz,
                })
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        let captures = raw
            .captures
            .into_iter()
            .map(|c| CaptureDeviceConfig {
                id: c.id,
                repeater_buffers: c.repeater_buffers,
                repeater_buffer_size: c.repeater_buffer_size,
                repeater_base: c.repeater_base,
                link_depth: c.link_depth.unwrap_or(c.repeater_buffers.max(1)),
            })
            .collect();

        let runtime = raw.runtime.unwrap_or_default();
        let defaults = RuntimeConfig::default();
        let runtime = RuntimeConfig {
            commit_queue_depth: runtime.commit_queue_depth.unwrap_or(defaults.commit_queue_depth),
            frame_done_timeout: runtime
                .frame_done_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.frame_done_timeout),
        };

        let config = Self {
            layers,
            outputs,
            captures,
            diag_ring_capacity: raw
                .diagnostics
                .and_then(|d| d.ring_capacity)
                .unwrap_or(DEFAULT_CHECKSUM_CAPACITY),
            runtime,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and parse a configuration file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check ids are unique and every reference resolves
    pub fn validate(&self) -> ConfigResult<()> {
        let mut layer_ids = HashSet::new();
        for layer in &self.layers {
            if !layer_ids.insert(layer.id) {
                return Err(ConfigError::Validation(format!("duplicate layer id {}", layer.id)));
            }
        }

        let mut capture_ids = HashSet::new();
        for capture in &self.captures {
            if !capture_ids.insert(capture.id) {
                return Err(ConfigError::Validation(format!("duplicate capture id {}", capture.id)));
            }
            if capture.repeater_buffers > 0 && capture.repeater_buffer_size == 0 {
                return Err(ConfigError::Validation(format!(
                    "capture {} has repeater buffers of size 0",
                    capture.id
                )));
            }
        }

        let mut output_ids = HashSet::new();
        let mut bound_layers = HashSet::new();
        let mut bound_captures = HashSet::new();
        for output in &self.outputs {
            if !output_ids.insert(output.id) {
                return Err(ConfigError::Validation(format!("duplicate output id {}", output.id)));
            }
            if output.width == 0 || output.height == 0 || output.refresh_hz == 0 {
                return Err(ConfigError::Validation(format!(
                    "output {} has an empty mode",
                    output.id
                )));
            }
            for layer in &output.layers {
                if !layer_ids.contains(layer) {
                    return Err(ConfigError::Validation(format!(
                        "output {} references unknown layer {}",
                        output.id, layer
                    )));
                }
                if !bound_layers.insert(*layer) {
                    return Err(ConfigError::Validation(format!(
                        "layer {} attached to more than one output",
                        layer
                    )));
                }
            }
            if let Some(capture) = output.capture {
                if !capture_ids.contains(&capture) {
                    return Err(ConfigError::Validation(format!(
                        "output {} references unknown capture {}",
                        output.id, capture
                    )));
                }
                if !bound_captures.insert(capture) {
                    return Err(ConfigError::Validation(format!(
                        "capture {} attached to more than one output",
                        capture
                    )));
                }
            }
        }

        if self.diag_ring_capacity == 0 {
            return Err(ConfigError::Validation("diagnostic ring capacity is 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let content = r#"
[[layers]]
id = 0
class = "gf"

[[outputs]]
id = 0
width = 1920
height = 1080
layers = [0]
"#;

        let config = DpuConfig::from_toml_str(content).unwrap();
        assert_eq!(config.layers, vec![LayerConfig { id: 0, class: DeviceClass::Gf }]);
        assert_eq!(config.outputs[0].refresh_hz, 60);
        assert_eq!(config.outputs[0].operation_mode, OperationMode::Video);
        assert_eq!(config.outputs[0].partial_align, (1, 1));
        assert_eq!(config.runtime, RuntimeConfig::default());
        assert_eq!(config.diag_ring_capacity, DEFAULT_CHECKSUM_CAPACITY);
    }

    #[test]
    fn test_parse_full_config() {
        let content = r#"
[runtime]
commit_queue_depth = 2
frame_done_timeout_ms = 50

[diagnostics]
ring_capacity = 16

[[layers]]
id = 0
class = "GF"

[[layers]]
id = 3
class = "vgrfs"

[[outputs]]
id = 0
width = 1080
height = 2400
refresh_hz = 120
operation_mode = "command"
layers = [0, 3]
capture = 0
partial_align = [4, 8]

[[captures]]
id = 0
repeater_buffers = 3
repeater_buffer_size = 0x0100_0000
repeater_base = 0xa000_0000
"#;

        let config = DpuConfig::from_toml_str(content).unwrap();
        assert_eq!(config.runtime.commit_queue_depth, 2);
        assert_eq!(config.runtime.frame_done_timeout, Duration::from_millis(50));
        assert_eq!(config.diag_ring_capacity, 16);
        assert_eq!(config.layers[1].class, DeviceClass::Vgrfs);

        let output = &config.outputs[0];
        assert_eq!(output.operation_mode, OperationMode::Command);
        assert_eq!(output.partial_align, (4, 8));
        assert_eq!(output.capture, Some(0));

        let capture = &config.captures[0];
        assert_eq!(capture.repeater_base, 0xa000_0000);
        assert_eq!(capture.link_depth, 3);
    }

    #[test]
    fn test_invalid_names() {
        let bad_class = "[[layers]]\nid = 0\nclass = \"wb\"\n";
        assert!(matches!(
            DpuConfig::from_toml_str(bad_class),
            Err(ConfigError::InvalidDeviceClass(_))
        ));

        let bad_mode = "[[outputs]]\nid = 0\nwidth = 8\nheight = 8\noperation_mode = \"burst\"\n";
        assert!(matches!(
            DpuConfig::from_toml_str(bad_mode),
            Err(ConfigError::InvalidOperationMode(_))
        ));

        assert!(matches!(DpuConfig::from_toml_str("layers = 3"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_reference_validation() {
        let shared_layer = r#"
[[layers]]
id = 0
class = "gf"

[[outputs]]
id = 0
width = 64
height = 64
layers = [0]

[[outputs]]
id = 1
width = 64
height = 64
layers = [0]
"#;
        assert!(matches!(
            DpuConfig::from_toml_str(shared_layer),
            Err(ConfigError::Validation(_))
        ));

        let unknown_capture = "[[outputs]]\nid = 0\nwidth = 64\nheight = 64\ncapture = 7\n";
        assert!(matches!(
            DpuConfig::from_toml_str(unknown_capture),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_default_topology_is_valid() {
        let config = DpuConfig::default();
        config.validate().unwrap();
        assert_eq!(config.outputs[0].layers.len(), 4);
    }

    #[test]
    fn test_config_error_maps_to_dpu_error() {
        let err: DpuError = ConfigError::Validation("x".into()).into();
        assert_eq!(err.kind(), dpu_hw::ErrorKind::Config);
    }
}
