//! # DPU Hardware Model
//!
//! Static description of a SoC display processing unit and the pure
//! functions that turn a declarative layer into hardware parameters.
//!
//! This crate provides:
//! - Pixel format and framebuffer compression metadata
//! - Per device class restriction tables and capability bitsets
//! - The layer configuration builder (scale ratios, rotation, plane addressing)
//! - Register-level collaborator traits and a simulated implementation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  dpu_pipeline (commit state machine, capture, workers)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  dpu_hw (this crate)                                        │
//! │  ├─ LayerDescriptor ──► builder::build ──► HardwareConfig   │
//! │  ├─ RestrictionTable / Capabilities                         │
//! │  └─ DppOps / DeconOps / WritebackOps (register bus)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Register bus / interrupt controller                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod geometry;
pub mod format;
pub mod compression;
pub mod rotation;
pub mod color;
pub mod restriction;
pub mod layer;
pub mod builder;
pub mod hal;
pub mod sim;

pub use error::{DpuError, DpuResult, ErrorKind};
pub use geometry::{Rect, SubpixelRect};
pub use format::{BitDepth, PixelFormat};
pub use compression::{AfbcBlock, CompressionKind, LossyRate, SbwcPlaneSizes};
pub use rotation::{HwRotation, Rotation};
pub use color::{ColorInfo, ColorMode, ColorRange, ColorStandard, ColorTransfer, RenderIntent};
pub use restriction::{Capabilities, DeviceClass, RestrictionTable, SizeRange};
pub use layer::{DestinationMode, LayerDescriptor, MAX_PLANES};
pub use builder::{build, CompressedPlane, HardwareConfig, PlaneLayout, RATIO_SHIFT, RATIO_UNITY};
pub use hal::{
    CaptureConfig, DeconOps, DppIrqLine, DppOps, FrameUpdate, HwFactory, RegisterDump, WritebackOps,
};
pub use sim::{SimEvent, SimHw};
