//! Named configuration properties
//!
//! Requesters address properties by name. Names are resolved once into a
//! typed id; unknown names, wrong value types and writes to immutable
//! properties are all rejected with `InvalidArgument`.

use serde::{Deserialize, Serialize};

use dpu_hw::{DpuError, DpuResult, Rect};

/// Value carried by a property write or read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    /// Enum ids, signed ranges, timestamps and rates
    Int(i64),
    /// Rectangle property, `None` clears it
    Region(Option<Rect>),
    /// Opaque immutable blob
    Blob(Vec<u8>),
}

impl PropertyValue {
    pub fn as_bool(&self, name: &str) -> DpuResult<bool> {
        match self {
            Self::Bool(value) => Ok(*value),
            other => Err(type_mismatch(name, "bool", other)),
        }
    }

    pub fn as_int(&self, name: &str) -> DpuResult<i64> {
        match self {
            Self::Int(value) => Ok(*value),
            other => Err(type_mismatch(name, "int", other)),
        }
    }

    pub fn as_region(&self, name: &str) -> DpuResult<Option<Rect>> {
        match self {
            Self::Region(value) => Ok(*value),
            other => Err(type_mismatch(name, "region", other)),
        }
    }
}

fn type_mismatch(name: &str, expected: &str, got: &PropertyValue) -> DpuError {
    DpuError::InvalidArgument(format!("{} expects a {} value, got {:?}", name, expected, got))
}

/// Partial-region rectangle from the `x1, y1, x2, y2` corner form
pub fn region_from_corners(x1: u32, y1: u32, x2: u32, y2: u32) -> DpuResult<Rect> {
    if x2 <= x1 || y2 <= y1 {
        return Err(DpuError::InvalidArgument(format!(
            "empty region ({}, {}) - ({}, {})",
            x1, y1, x2, y2
        )));
    }
    Ok(Rect::new(x1, y1, x2 - x1, y2 - y1))
}

/// Properties of an output pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputProperty {
    ColorMode,
    RenderIntent,
    SelfRefresh,
    ModesetOnly,
    PartialRegion,
    ColorPipelineHandle,
    FrameRateHint,
    OperationMode,
}

impl OutputProperty {
    pub const ALL: [OutputProperty; 8] = [
        Self::ColorMode,
        Self::RenderIntent,
        Self::SelfRefresh,
        Self::ModesetOnly,
        Self::PartialRegion,
        Self::ColorPipelineHandle,
        Self::FrameRateHint,
        Self::OperationMode,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ColorMode => "color_mode",
            Self::RenderIntent => "render_intent",
            Self::SelfRefresh => "self_refresh",
            Self::ModesetOnly => "modeset_only",
            Self::PartialRegion => "partial_region",
            Self::ColorPipelineHandle => "color_pipeline_handle",
            Self::FrameRateHint => "frame_rate_hint",
            Self::OperationMode => "operation_mode",
        }
    }

    /// Resolve a property name
    pub fn from_name(name: &str) -> DpuResult<Self> {
        Self::ALL
            .into_iter()
            .find(|prop| prop.name() == name)
            .ok_or_else(|| DpuError::InvalidArgument(format!("unknown output property '{}'", name)))
    }

    pub fn is_immutable(&self) -> bool {
        matches!(self, Self::OperationMode)
    }
}

/// Properties of a capture output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureProperty {
    ColorStandard,
    ColorRange,
    UseSharedBuffer,
    HardwareRestrictions,
}

impl CaptureProperty {
    pub const ALL: [CaptureProperty; 4] = [
        Self::ColorStandard,
        Self::ColorRange,
        Self::UseSharedBuffer,
        Self::HardwareRestrictions,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ColorStandard => "color_standard",
            Self::ColorRange => "color_range",
            Self::UseSharedBuffer => "use_shared_buffer",
            Self::HardwareRestrictions => "hardware_restrictions",
        }
    }

    pub fn from_name(name: &str) -> DpuResult<Self> {
        Self::ALL
            .into_iter()
            .find(|prop| prop.name() == name)
            .ok_or_else(|| DpuError::InvalidArgument(format!("unknown capture property '{}'", name)))
    }

    pub fn is_immutable(&self) -> bool {
        matches!(self, Self::HardwareRestrictions)
    }
}
