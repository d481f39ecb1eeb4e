//! Register-level collaborators
//!
//! The register bus itself is outside this crate. Each hardware block is
//! reached through a trait so the pipeline only depends on the interface,
//! with one implementation per hardware variant (see [`crate::sim`] for the
//! software model used in tests).

use serde::{Deserialize, Serialize};

use crate::builder::HardwareConfig;
use crate::color::{ColorMode, ColorRange, ColorStandard, RenderIntent};
use crate::error::DpuResult;
use crate::format::{BitDepth, PixelFormat};
use crate::geometry::Rect;
use crate::layer::MAX_PLANES;
use crate::restriction::DeviceClass;

/// Snapshot of a block's registers, for error reports
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegisterDump {
    pub device: String,
    /// `(offset, value)` pairs
    pub registers: Vec<(u32, u32)>,
}

impl RegisterDump {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            registers: Vec::new(),
        }
    }

    pub fn push(&mut self, offset: u32, value: u32) {
        self.registers.push((offset, value));
    }
}

/// Interrupt lines of a layer processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DppIrqLine {
    /// Input DMA (data move) events: frame done, read errors
    DataMove,
    /// Processing errors: config errors, deadlock
    Processing,
}

/// Layer processor register block
pub trait DppOps: Send {
    /// Write a full layer configuration into the shadow registers
    fn program(&mut self, config: &HardwareConfig) -> DpuResult<()>;

    /// Start fetching
    fn enable(&mut self);

    /// Stop fetching and reset
    fn disable(&mut self);

    fn set_irq_enabled(&mut self, line: DppIrqLine, enabled: bool);

    /// Switch the secure (protected content) path
    fn set_protection(&mut self, enabled: bool);

    fn dump_registers(&self) -> RegisterDump;
}

/// Everything the output block needs to latch one frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameUpdate {
    pub sequence: u64,
    pub input_bpc: BitDepth,
    pub color_mode: ColorMode,
    pub render_intent: RenderIntent,
    pub color_pipeline: Option<u8>,
    pub self_refresh: bool,
    /// Redraw area when only part of the panel is updated
    pub partial: Option<Rect>,
    /// Layer processors blended this frame, by id
    pub layers: Vec<u32>,
    /// Composed frame is also read back into a capture sink
    pub readback: bool,
}

/// Output (blender + timing) register block
pub trait DeconOps: Send {
    fn enable(&mut self) -> DpuResult<()>;

    fn disable(&mut self) -> DpuResult<()>;

    fn set_frame_sync_irq(&mut self, enabled: bool);

    /// Latch the frame and trigger the shadow update
    fn update(&mut self, frame: &FrameUpdate) -> DpuResult<()>;

    /// Route or unroute the composed frame to the capture sink
    fn set_readback(&mut self, enabled: bool);

    /// Read the checksum of the last composed frame
    fn read_checksum(&mut self) -> [u32; 3];

    fn dump_registers(&self) -> RegisterDump;
}

/// Programming of the capture sink for one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Composed area written out
    pub area: Rect,
    pub full_width: u32,
    pub full_height: u32,
    pub format: PixelFormat,
    pub planes: [u64; MAX_PLANES],
    pub plane_count: usize,
    pub color_standard: ColorStandard,
    pub color_range: ColorRange,
}

/// Capture (writeback) register block
pub trait WritebackOps: Send {
    fn program(&mut self, config: &CaptureConfig) -> DpuResult<()>;

    fn start(&mut self);

    fn stop(&mut self);

    fn set_irq_enabled(&mut self, enabled: bool);

    /// Gate the bus clock
    fn set_clock(&mut self, enabled: bool);

    fn dump_registers(&self) -> RegisterDump;
}

/// Creates the register collaborators at device registration
pub trait HwFactory {
    fn dpp(&self, id: u32, class: DeviceClass) -> Box<dyn DppOps>;

    fn decon(&self, id: u32) -> Box<dyn DeconOps>;

    fn writeback(&self, id: u32) -> Box<dyn WritebackOps>;
}
