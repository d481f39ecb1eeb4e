//! # DPU Pipeline
//!
//! Transactional commit protocol of a SoC display pipeline. It orchestrates:
//! - Layer processor lifecycle and per-layer validation
//! - Output commits (begin, validate, flush, frame-sync completion)
//! - Capture to memory with a one-deep job queue and shared repeater buffers
//! - Per-frame checksum capture for diagnostics
//!
//! ## Architecture
//!
//! ```text
//! Requester ──► CommitWorker ──► OutputController ──► LayerProcessor ──► DppOps
//!                                       │        └──► CaptureOutput  ──► WritebackOps
//!                                       ▼
//!                                   DeconOps
//!
//! Interrupts ──► OutputIrq / DppIrqHandle / CaptureOutput::on_complete
//!                         │
//!                         ▼
//!                  DeferredWorker (dump logging, buffer release)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **No partial commits** - validation finishes before any register write
//! 2. **One commit per output at a time** - the commit worker serializes them
//! 3. **Interrupt paths never block** - longer work goes to the deferred worker
//! 4. **At most one capture job** - a second request is rejected with `Busy`
//! 5. **Hardware errors lose a frame, not the pipeline**

pub mod completion;
pub mod properties;
pub mod state;
pub mod partial;
pub mod frame_sync;
pub mod repeater;
pub mod diag;
pub mod layer_processor;
pub mod capture;
pub mod output;
pub mod worker;
pub mod config;
pub mod registry;

pub use completion::{Completion, CompletionStatus};
pub use properties::{region_from_corners, CaptureProperty, OutputProperty, PropertyValue};
pub use state::{CaptureType, OperationMode, OutputPipelineState, MAX_COLOR_PIPELINE};
pub use partial::PartialUpdate;
pub use frame_sync::FrameSync;
pub use repeater::{contiguous_buffers, RepeaterBuffer, RepeaterFrame, RepeaterPool};
pub use diag::{ChecksumEntry, ChecksumFeed, DiagnosticRing, CHECKSUM_SOURCE, CHECKSUM_VALUES};
pub use layer_processor::{DppId, DppIrq, DppIrqHandle, LayerProcessor, LayerState};
pub use capture::{
    CaptureBuffer, CaptureCheck, CaptureId, CaptureJob, CaptureOutput, CaptureRequest, CaptureState, ReadbackPath,
};
pub use output::{CommitPhase, CommitRequest, OutputController, OutputFault, OutputId, OutputIrq};
pub use worker::{CommitWorker, DeferredHandle, DeferredWork, DeferredWorker};
pub use config::{
    CaptureDeviceConfig, ConfigError, ConfigResult, DpuConfig, LayerConfig, OutputConfig, RuntimeConfig,
};
pub use registry::DeviceRegistry;
