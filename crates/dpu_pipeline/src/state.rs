//! Per-commit output pipeline state
//!
//! The active state is shared behind an `Arc` and never mutated; every commit
//! starts from [`OutputPipelineState::duplicate`], which copies the persistent
//! fields and takes the one-shot fields from the constructor defaults.

use serde::{Deserialize, Serialize};

use dpu_hw::{BitDepth, ColorMode, DpuError, DpuResult, Rect, RenderIntent};

use crate::properties::{OutputProperty, PropertyValue};

/// Highest color pipeline handle; `-1` disables the pipeline
pub const MAX_COLOR_PIPELINE: i64 = 15;

/// Capture requested for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CaptureType {
    #[default]
    None,
    /// Alongside the live display, reading the same composed frame
    Concurrent,
    /// Capture is the only consumer of the composed frame
    Standalone,
}

/// Panel interface mode, fixed at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    #[default]
    Video,
    Command,
}

impl OperationMode {
    pub fn id(&self) -> i64 {
        match self {
            Self::Video => 0,
            Self::Command => 1,
        }
    }
}

/// Options of one output for one frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPipelineState {
    pub color_mode: ColorMode,
    pub render_intent: RenderIntent,
    pub self_refresh: bool,
    pub partial_region: Option<Rect>,
    /// Color pipeline in use, `None` when disabled
    pub color_pipeline: Option<u8>,
    /// Bit depth the blender is fed with this frame
    pub input_bpc: BitDepth,

    // One-shot fields, valid for a single commit
    pub modeset_only: bool,
    /// Requested refresh rate in Hz
    pub frame_rate_hint: Option<u32>,
    pub capture_type: CaptureType,
}

impl Default for OutputPipelineState {
    fn default() -> Self {
        Self {
            color_mode: ColorMode::Native,
            render_intent: RenderIntent::Colorimetric,
            self_refresh: false,
            partial_region: None,
            color_pipeline: None,
            input_bpc: BitDepth::Bit8,
            modeset_only: false,
            frame_rate_hint: None,
            capture_type: CaptureType::None,
        }
    }
}

impl OutputPipelineState {
    /// Start a new pending state from this one with one-shot fields reset
    pub fn duplicate(&self) -> Self {
        Self {
            color_mode: self.color_mode,
            render_intent: self.render_intent,
            self_refresh: self.self_refresh,
            partial_region: self.partial_region,
            color_pipeline: self.color_pipeline,
            input_bpc: self.input_bpc,
            ..Self::default()
        }
    }

    /// Apply one property write
    pub fn set_property(&mut self, prop: OutputProperty, value: &PropertyValue) -> DpuResult<()> {
        let name = prop.name();
        match prop {
            OutputProperty::ColorMode => {
                let id = value.as_int(name)?;
                self.color_mode = ColorMode::from_id(id).ok_or_else(|| out_of_range(name, id))?;
            }
            OutputProperty::RenderIntent => {
                let id = value.as_int(name)?;
                self.render_intent = RenderIntent::from_id(id).ok_or_else(|| out_of_range(name, id))?;
            }
            OutputProperty::SelfRefresh => self.self_refresh = value.as_bool(name)?,
            OutputProperty::ModesetOnly => self.modeset_only = value.as_bool(name)?,
            OutputProperty::PartialRegion => {
                let region = value.as_region(name)?;
                if region.map_or(false, |r| r.is_empty()) {
                    return Err(DpuError::InvalidArgument("empty partial region".into()));
                }
                self.partial_region = region;
            }
            OutputProperty::ColorPipelineHandle => {
                let handle = value.as_int(name)?;
                self.color_pipeline = match handle {
                    -1 => None,
                    0..=MAX_COLOR_PIPELINE => Some(handle as u8),
                    _ => return Err(out_of_range(name, handle)),
                };
            }
            OutputProperty::FrameRateHint => {
                let hz = value.as_int(name)?;
                if hz <= 0 || hz > u32::MAX as i64 {
                    return Err(out_of_range(name, hz));
                }
                self.frame_rate_hint = Some(hz as u32);
            }
            OutputProperty::OperationMode => {
                return Err(DpuError::InvalidArgument(format!("{} is immutable", name)));
            }
        }
        Ok(())
    }
}

fn out_of_range(name: &str, value: i64) -> DpuError {
    DpuError::InvalidArgument(format!("{} value {} out of range", name, value))
}
