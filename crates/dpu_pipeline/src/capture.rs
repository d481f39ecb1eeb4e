//! Capture output (writeback)
//!
//! A sink that writes the composed frame to memory. It runs either
//! concurrently with the live display or as the only consumer of the frame,
//! and keeps a one-deep job queue: a second request while a job is
//! outstanding is rejected with `Busy` before anything is allocated.
//!
//! ## Device states
//!
//! ```text
//!        enable            hibernate
//!  Off ─────────► On ◄─────────────────► Hibernating
//!   ▲              │        resume            │
//!   └── disable ───┴──────── disable ─────────┘
//! ```
//!
//! Hibernating keeps the programmed addressing and format, only the interrupt
//! line and bus clock are off.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dpu_hw::{
    CaptureConfig, ColorRange, ColorStandard, DeconOps, DeviceClass, DpuError, DpuResult, PixelFormat,
    Rect, RegisterDump, RestrictionTable, WritebackOps, MAX_PLANES,
};

use crate::completion::{Completion, CompletionStatus};
use crate::properties::{CaptureProperty, PropertyValue};
use crate::repeater::RepeaterPool;
use crate::state::CaptureType;
use crate::worker::{DeferredHandle, DeferredWork};

/// Capture device id
pub type CaptureId = u32;

/// Device-level state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureState {
    Off,
    On,
    Hibernating,
}

/// Memory the composed frame is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureBuffer {
    pub format: PixelFormat,
    pub full_width: u32,
    pub full_height: u32,
    pub planes: [u64; MAX_PLANES],
    pub plane_count: usize,
}

impl CaptureBuffer {
    /// Buffer with contiguous planes starting at `base`
    pub fn new(format: PixelFormat, full_width: u32, full_height: u32, base: u64) -> Self {
        let mut planes = [0u64; MAX_PLANES];
        let plane_count = format.num_planes();
        let mut offset = 0u64;
        for (index, plane) in planes.iter_mut().enumerate().take(plane_count) {
            *plane = base + offset;
            offset += format.plane_stride(index, full_width) as u64
                * format.plane_lines(index, full_height) as u64;
        }
        Self {
            format,
            full_width,
            full_height,
            planes,
            plane_count,
        }
    }

    /// Same buffer relocated so its first plane starts at `base`
    fn rebased(&self, base: u64) -> Self {
        let mut buffer = *self;
        let origin = self.planes[0];
        for plane in buffer.planes.iter_mut().take(self.plane_count) {
            *plane = base + (*plane - origin);
        }
        buffer
    }
}

/// Capture requested with a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub submode: CaptureType,
    /// `None` asks for a mode change without pixels
    pub buffer: Option<CaptureBuffer>,
}

impl CaptureRequest {
    pub fn concurrent(buffer: CaptureBuffer) -> Self {
        Self {
            submode: CaptureType::Concurrent,
            buffer: Some(buffer),
        }
    }

    pub fn standalone(buffer: CaptureBuffer) -> Self {
        Self {
            submode: CaptureType::Standalone,
            buffer: Some(buffer),
        }
    }

    /// Request with no destination
    pub fn mode_change(submode: CaptureType) -> Self {
        Self { submode, buffer: None }
    }
}

/// Outcome of a successful [`CaptureOutput::check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureCheck {
    /// Accepted without a destination: no pixels will be written
    pub mode_change_only: bool,
}

/// Output-side read-back route of the composed frame into the capture sink
pub struct ReadbackPath {
    decon: Arc<Mutex<Box<dyn DeconOps>>>,
    enabled: AtomicBool,
}

impl ReadbackPath {
    pub fn new(decon: Arc<Mutex<Box<dyn DeconOps>>>) -> Self {
        Self {
            decon,
            enabled: AtomicBool::new(false),
        }
    }

    pub fn enable(&self) {
        if !self.enabled.swap(true, Ordering::AcqRel) {
            self.decon.lock().set_readback(true);
        }
    }

    pub fn disable(&self) {
        if self.enabled.swap(false, Ordering::AcqRel) {
            self.decon.lock().set_readback(false);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

/// One capture request in flight
pub struct CaptureJob {
    id: u64,
    submode: CaptureType,
    buffer: Option<CaptureBuffer>,
    mode_change_only: bool,
    use_shared_buffer: bool,
    repeater: Option<usize>,
    readback: Option<Arc<ReadbackPath>>,
    completion: Completion,
}

impl CaptureJob {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn submode(&self) -> CaptureType {
        self.submode
    }

    pub fn is_mode_change_only(&self) -> bool {
        self.mode_change_only
    }

    /// Repeater index owned by this job
    pub fn repeater(&self) -> Option<usize> {
        self.repeater
    }

    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    /// Route used to stop reading back into the sink once a concurrent job ends
    pub fn set_readback(&mut self, path: Arc<ReadbackPath>) {
        self.readback = Some(path);
    }

    #[cfg(test)]
    pub(crate) fn for_test(id: u64, repeater: Option<usize>) -> Self {
        Self {
            id,
            submode: CaptureType::Standalone,
            buffer: None,
            mode_change_only: false,
            use_shared_buffer: repeater.is_some(),
            repeater,
            readback: None,
            completion: Completion::new(),
        }
    }
}

struct CaptureInner {
    state: CaptureState,
    ops: Box<dyn WritebackOps>,
    queue: Option<CaptureJob>,
    last_config: Option<CaptureConfig>,
    color_standard: ColorStandard,
    color_range: ColorRange,
    use_shared_buffer: bool,
    next_job: u64,
}

/// Capture output device
pub struct CaptureOutput {
    id: CaptureId,
    restriction: RestrictionTable,
    pool: Arc<RepeaterPool>,
    deferred: DeferredHandle,
    inner: Mutex<CaptureInner>,
}

impl std::fmt::Debug for CaptureOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureOutput").field("id", &self.id).finish_non_exhaustive()
    }
}

impl CaptureOutput {
    /// Create a new capture output, initially off
    pub fn new(id: CaptureId, ops: Box<dyn WritebackOps>, pool: Arc<RepeaterPool>, deferred: DeferredHandle) -> Self {
        Self {
            id,
            restriction: RestrictionTable::for_class(DeviceClass::Wb),
            pool,
            deferred,
            inner: Mutex::new(CaptureInner {
                state: CaptureState::Off,
                ops,
                queue: None,
                last_config: None,
                color_standard: ColorStandard::Bt709,
                color_range: ColorRange::Limited,
                use_shared_buffer: false,
                next_job: 1,
            }),
        }
    }

    pub fn id(&self) -> CaptureId {
        self.id
    }

    pub fn state(&self) -> CaptureState {
        self.inner.lock().state
    }

    pub fn pool(&self) -> &Arc<RepeaterPool> {
        &self.pool
    }

    pub fn restriction(&self) -> &RestrictionTable {
        &self.restriction
    }

    /// A job is queued and not yet signalled
    pub fn is_busy(&self) -> bool {
        self.inner.lock().queue.is_some()
    }

    /// Largest destination a standalone capture can write
    pub fn max_size(&self) -> (u32, u32) {
        (self.restriction.dst_f_w.max, self.restriction.dst_f_h.max)
    }

    fn device(&self) -> String {
        format!("WB{}", self.id)
    }

    /// Power on; resumes when hibernating
    pub fn enable(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CaptureState::On => {}
            CaptureState::Off | CaptureState::Hibernating => {
                inner.ops.set_clock(true);
                inner.ops.set_irq_enabled(true);
                inner.state = CaptureState::On;
                log::debug!("{} on", self.device());
            }
        }
    }

    /// Power off, force-completing an outstanding job
    pub fn disable(&self) {
        let job = {
            let mut inner = self.inner.lock();
            if inner.state == CaptureState::Off {
                return;
            }
            inner.ops.stop();
            inner.ops.set_irq_enabled(false);
            inner.ops.set_clock(false);
            inner.last_config = None;
            inner.state = CaptureState::Off;
            inner.queue.take()
        };
        log::debug!("{} off", self.device());

        if let Some(job) = job {
            self.finish(job, CompletionStatus::Forced);
        }
    }

    /// Keep addressing state, drop the interrupt line and bus clock
    pub fn hibernate(&self) -> DpuResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            CaptureState::On => {
                if inner.queue.is_some() {
                    return Err(DpuError::Busy(format!("{} has a job in flight", self.device())));
                }
                inner.ops.set_irq_enabled(false);
                inner.ops.set_clock(false);
                inner.state = CaptureState::Hibernating;
                Ok(())
            }
            CaptureState::Hibernating => Ok(()),
            CaptureState::Off => Err(DpuError::InvalidArgument(format!("{} is off", self.device()))),
        }
    }

    /// Leave hibernation without reprogramming addresses
    pub fn resume(&self) -> DpuResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            CaptureState::Hibernating => {
                inner.ops.set_clock(true);
                inner.ops.set_irq_enabled(true);
                inner.state = CaptureState::On;
                Ok(())
            }
            CaptureState::On => Ok(()),
            CaptureState::Off => Err(DpuError::InvalidArgument(format!("{} is off", self.device()))),
        }
    }

    /// Configuration programmed by the last job, kept across hibernation
    pub fn last_config(&self) -> Option<CaptureConfig> {
        self.inner.lock().last_config.clone()
    }

    /// Check a request against the queue and the destination limits
    pub fn check(&self, request: &CaptureRequest, display: (u32, u32), output_active: bool) -> DpuResult<CaptureCheck> {
        if self.is_busy() {
            return Err(DpuError::Busy(format!("{} has a job in flight", self.device())));
        }
        if self.state() == CaptureState::Off {
            return Err(DpuError::InvalidArgument(format!("{} is off", self.device())));
        }

        let Some(buffer) = request.buffer else {
            if output_active {
                return Ok(CaptureCheck { mode_change_only: true });
            }
            return Err(DpuError::InvalidArgument(
                "capture without destination on an inactive output".into(),
            ));
        };

        if buffer.plane_count == 0 || buffer.plane_count < buffer.format.num_planes() {
            return Err(DpuError::InvalidArgument(format!(
                "{} capture needs {} planes, got {}",
                buffer.format,
                buffer.format.num_planes(),
                buffer.plane_count
            )));
        }

        let (mult_w, mult_h) = if buffer.format.is_yuv() {
            buffer.format.chroma_subsampling()
        } else {
            (1, 1)
        };

        match request.submode {
            CaptureType::Concurrent => {
                if !output_active {
                    return Err(DpuError::InvalidArgument(
                        "concurrent capture needs an active output".into(),
                    ));
                }
                let (w, h) = display;
                if buffer.full_width < w {
                    return Err(DpuError::BadRange {
                        field: "dst_f_w",
                        value: buffer.full_width,
                        min: w,
                        max: u32::MAX,
                    });
                }
                if buffer.full_height < h {
                    return Err(DpuError::BadRange {
                        field: "dst_f_h",
                        value: buffer.full_height,
                        min: h,
                        max: u32::MAX,
                    });
                }
            }
            CaptureType::Standalone => {
                self.restriction.dst_f_w.check("dst_f_w", buffer.full_width, mult_w)?;
                self.restriction.dst_f_h.check("dst_f_h", buffer.full_height, mult_h)?;
            }
            CaptureType::None => {
                return Err(DpuError::InvalidArgument("capture request without a submode".into()));
            }
        }

        Ok(CaptureCheck { mode_change_only: false })
    }

    /// Build the job for a checked request
    pub fn new_job(&self, request: &CaptureRequest, check: CaptureCheck) -> CaptureJob {
        let mut inner = self.inner.lock();
        let id = inner.next_job;
        inner.next_job += 1;
        CaptureJob {
            id,
            submode: request.submode,
            buffer: request.buffer,
            mode_change_only: check.mode_change_only,
            use_shared_buffer: inner.use_shared_buffer,
            repeater: None,
            readback: None,
            completion: Completion::new(),
        }
    }

    /// Reserve resources for a job; takes a repeater index when the job
    /// opted into shared buffers and the pool is active
    pub fn prepare(&self, job: &mut CaptureJob) -> DpuResult<()> {
        if job.mode_change_only || !job.use_shared_buffer || !self.pool.is_active() {
            return Ok(());
        }
        match self.pool.acquire() {
            Some(index) => {
                job.repeater = Some(index);
                Ok(())
            }
            None => Err(DpuError::ResourceExhausted(format!(
                "{}: no free repeater buffer",
                self.device()
            ))),
        }
    }

    /// Start writing `composed` into the job's destination and queue the job
    pub fn commit(&self, job: CaptureJob, composed: Rect) -> DpuResult<Completion> {
        let completion = job.completion();
        if job.mode_change_only {
            job.completion.complete(CompletionStatus::Done);
            return Ok(completion);
        }

        let Some(buffer) = job.buffer else {
            return Err(DpuError::InvalidArgument("capture job without destination".into()));
        };
        let buffer = match job.repeater.and_then(|index| self.pool.buffer(index)) {
            Some(repeater) => buffer.rebased(repeater.addr),
            None => buffer,
        };

        let mut inner = self.inner.lock();
        if inner.queue.is_some() {
            drop(inner);
            self.abandon(job);
            return Err(DpuError::Busy(format!("{} has a job in flight", self.device())));
        }
        if inner.state == CaptureState::Hibernating {
            inner.ops.set_clock(true);
            inner.ops.set_irq_enabled(true);
            inner.state = CaptureState::On;
        }

        let config = CaptureConfig {
            area: composed,
            full_width: buffer.full_width,
            full_height: buffer.full_height,
            format: buffer.format,
            planes: buffer.planes,
            plane_count: buffer.plane_count,
            color_standard: inner.color_standard,
            color_range: inner.color_range,
        };
        if let Err(err) = inner.ops.program(&config) {
            drop(inner);
            self.abandon(job);
            return Err(err);
        }
        inner.ops.start();
        inner.last_config = Some(config);

        if let Some(readback) = &job.readback {
            readback.enable();
        }
        log::trace!("{} job {} queued", self.device(), job.id);
        inner.queue = Some(job);
        Ok(completion)
    }

    /// Hardware completion of the queued job; called from interrupt context
    pub fn on_complete(&self, status: CompletionStatus) {
        let job = {
            let mut inner = self.inner.lock();
            let job = inner.queue.take();
            if job.is_some() {
                inner.ops.stop();
            }
            job
        };
        match job {
            Some(job) => self.finish(job, status),
            None => log::warn!("{} completion without a queued job", self.device()),
        }
    }

    fn finish(&self, job: CaptureJob, status: CompletionStatus) {
        match job.submode {
            CaptureType::Concurrent => {
                if let Some(readback) = &job.readback {
                    readback.disable();
                }
                job.completion.complete(status);
            }
            _ => {
                job.completion.complete(status);
            }
        }
        self.deferred.post(DeferredWork::ReleaseCapture {
            job,
            status,
            pool: Arc::clone(&self.pool),
        });
    }

    /// Drop a prepared job that will never reach the hardware
    pub fn abandon(&self, job: CaptureJob) {
        if let Some(index) = job.repeater {
            self.pool.release(index);
        }
        job.completion.complete(CompletionStatus::Forced);
        log::debug!("{} job {} abandoned", self.device(), job.id);
    }

    /// Hardware error: the queued job is dropped with a failure status
    pub fn on_error(&self) {
        let dump = self.dump_registers();
        self.deferred.post(DeferredWork::LogDump {
            reason: format!("{} error", self.device()),
            dump,
        });
        self.on_complete(CompletionStatus::Failed(dpu_hw::ErrorKind::Hardware));
    }

    pub fn dump_registers(&self) -> RegisterDump {
        self.inner.lock().ops.dump_registers()
    }

    pub fn set_property(&self, name: &str, value: &PropertyValue) -> DpuResult<()> {
        let prop = CaptureProperty::from_name(name)?;
        let mut inner = self.inner.lock();
        match prop {
            CaptureProperty::ColorStandard => {
                let id = value.as_int(name)?;
                inner.color_standard = color_standard_from_id(id)
                    .ok_or_else(|| DpuError::InvalidArgument(format!("{} value {} out of range", name, id)))?;
            }
            CaptureProperty::ColorRange => {
                let id = value.as_int(name)?;
                inner.color_range = color_range_from_id(id)
                    .ok_or_else(|| DpuError::InvalidArgument(format!("{} value {} out of range", name, id)))?;
            }
            CaptureProperty::UseSharedBuffer => inner.use_shared_buffer = value.as_bool(name)?,
            CaptureProperty::HardwareRestrictions => {
                return Err(DpuError::InvalidArgument(format!("{} is immutable", name)));
            }
        }
        Ok(())
    }

    pub fn property(&self, name: &str) -> DpuResult<PropertyValue> {
        let prop = CaptureProperty::from_name(name)?;
        let inner = self.inner.lock();
        Ok(match prop {
            CaptureProperty::ColorStandard => PropertyValue::Int(color_standard_id(inner.color_standard)),
            CaptureProperty::ColorRange => PropertyValue::Int(color_range_id(inner.color_range)),
            CaptureProperty::UseSharedBuffer => PropertyValue::Bool(inner.use_shared_buffer),
            CaptureProperty::HardwareRestrictions => PropertyValue::Blob(self.restriction.to_blob()?),
        })
    }
}

const COLOR_STANDARDS: [ColorStandard; 5] = [
    ColorStandard::Unspecified,
    ColorStandard::Bt601,
    ColorStandard::Bt709,
    ColorStandard::Bt2020,
    ColorStandard::DciP3,
];

const COLOR_RANGES: [ColorRange; 3] = [ColorRange::Unspecified, ColorRange::Limited, ColorRange::Full];

fn color_standard_id(standard: ColorStandard) -> i64 {
    COLOR_STANDARDS.iter().position(|s| *s == standard).unwrap_or(0) as i64
}

fn color_standard_from_id(id: i64) -> Option<ColorStandard> {
    usize::try_from(id).ok().and_then(|i| COLOR_STANDARDS.get(i).copied())
}

fn color_range_id(range: ColorRange) -> i64 {
    COLOR_RANGES.iter().position(|r| *r == range).unwrap_or(0) as i64
}

fn color_range_from_id(id: i64) -> Option<ColorRange> {
    usize::try_from(id).ok().and_then(|i| COLOR_RANGES.get(i).copied())
}
