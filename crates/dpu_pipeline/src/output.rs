//! Output controller (DECON)
//!
//! Owns the commit protocol of one display pipeline. A commit runs through
//!
//! ```text
//!  Idle ─► BeginRequested ─► Validating ─► Programmed ─► Flushed ─► Enabled | Disabled
//!   ▲                           │ error        │ error                    │
//!   └───────────────────────────┴──────────────┴──── completion signal ───┘
//! ```
//!
//! Nothing is written to the hardware before every participating layer and the
//! capture request have passed validation, so a rejected commit leaves the
//! device exactly as it was. The active pipeline state is replaced only after
//! programming succeeded.
//!
//! Interrupts reach the controller through [`OutputIrq`], which shares the
//! frame-sync bookkeeping with the commit path but never touches layer state.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dpu_hw::{
    BitDepth, DeconOps, DestinationMode, DpuError, DpuResult, ErrorKind, FrameUpdate, HardwareConfig,
    LayerDescriptor, Rect, RegisterDump,
};

use crate::capture::{CaptureJob, CaptureOutput, CaptureRequest, ReadbackPath};
use crate::completion::{Completion, CompletionStatus};
use crate::diag::ChecksumFeed;
use crate::frame_sync::FrameSync;
use crate::layer_processor::{DppId, LayerProcessor};
use crate::partial::PartialUpdate;
use crate::properties::{OutputProperty, PropertyValue};
use crate::state::{CaptureType, OperationMode, OutputPipelineState};
use crate::worker::{DeferredHandle, DeferredWork};

/// Output controller id
pub type OutputId = u32;

/// Default number of checksum entries kept for the diagnostic reader
pub const DEFAULT_CHECKSUM_CAPACITY: usize = 64;

const DEFAULT_REFRESH_HZ: u32 = 60;
const DEFAULT_FRAME_DONE_TIMEOUT: Duration = Duration::from_millis(100);

/// Step of the commit protocol the controller is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitPhase {
    Idle,
    BeginRequested,
    Validating,
    Programmed,
    Flushed,
    /// Frame handed to an active output, waiting for frame sync
    Enabled,
    /// Frame committed while the output is off
    Disabled,
}

/// Error interrupts of the output block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFault {
    /// Bus slave error on the blender read path
    BusError,
    /// Processing deadlock detected by the recovery watchdog
    Deadlock,
    /// Pixel FIFO ran dry while scanning out
    Underrun,
}

/// One frame's worth of changes to an output
#[derive(Debug, Clone, Default)]
pub struct CommitRequest {
    /// Participating layers and their descriptors
    pub layers: Vec<(DppId, LayerDescriptor)>,
    /// Property writes applied on top of the active state
    pub properties: Vec<(String, PropertyValue)>,
    pub capture: Option<CaptureRequest>,
    /// Power transition; `None` keeps the current power state
    pub active: Option<bool>,
}

impl CommitRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, id: DppId, desc: LayerDescriptor) -> Self {
        self.layers.push((id, desc));
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.push((name.into(), value));
        self
    }

    pub fn with_capture(mut self, capture: CaptureRequest) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }
}

/// Commit that passed `begin`
struct PendingCommit {
    state: OutputPipelineState,
    request: CommitRequest,
    active_after: bool,
}

/// Commit that passed `validate`
struct ValidatedCommit {
    state: OutputPipelineState,
    layers: Vec<(Arc<Mutex<LayerProcessor>>, HardwareConfig)>,
    capture: Option<(Arc<CaptureOutput>, CaptureJob)>,
    active_after: bool,
}

#[derive(Debug)]
struct SyncState {
    frame_sync: FrameSync,
    /// Completion of the frame waiting for the next frame sync
    pending: Option<Completion>,
    /// Sequence of the frame the hardware is still fetching
    in_flight: Option<u64>,
    last_status: Option<CompletionStatus>,
}

/// State shared between the commit path and the interrupt handlers
struct Shared {
    id: OutputId,
    sync: Mutex<SyncState>,
    idle: Condvar,
    decon: Arc<Mutex<Box<dyn DeconOps>>>,
    checksum: ChecksumFeed,
    deferred: DeferredHandle,
    epoch: Instant,
}

impl Shared {
    fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

/// Interrupt entry points of one output; cheap to clone
#[derive(Clone)]
pub struct OutputIrq {
    shared: Arc<Shared>,
}

impl OutputIrq {
    /// Monotonic clock frame-sync timestamps are expressed in
    pub fn now_ns(&self) -> u64 {
        self.shared.now_ns()
    }

    /// Frame-sync edge: the latched frame is now on screen
    pub fn on_frame_sync(&self, timestamp_ns: u64) {
        let mut sync = self.shared.sync.lock();
        sync.frame_sync.record(timestamp_ns);

        let Some(completion) = sync.pending.take() else {
            return;
        };

        // Keep frame sync armed until the waiter has been released
        if sync.frame_sync.acquire() {
            self.set_frame_sync_irq(true);
        }
        completion.complete(CompletionStatus::Done);
        sync.last_status = Some(CompletionStatus::Done);
        if sync.frame_sync.release() {
            self.set_frame_sync_irq(false);
        }
        log::trace!("Output {} frame sync at {}", self.shared.id, timestamp_ns);
    }

    /// The hardware finished fetching the in-flight frame
    pub fn on_frame_done(&self) {
        let frame = {
            let mut sync = self.shared.sync.lock();
            let frame = sync.in_flight.take();
            self.shared.idle.notify_all();
            frame
        };

        if !self.shared.checksum.is_running() {
            return;
        }
        match self.shared.decon.try_lock() {
            Some(mut decon) => {
                let values = decon.read_checksum();
                drop(decon);
                self.shared.checksum.record(frame, values);
            }
            None => log::warn!(
                "Output {} busy, checksum of frame {:?} skipped",
                self.shared.id,
                frame
            ),
        }
    }

    /// Error interrupt: the current frame is lost, the output keeps serving
    pub fn on_error_irq(&self, fault: OutputFault) {
        let reason = format!("Output {} {:?}", self.shared.id, fault);
        let dump = match self.shared.decon.try_lock() {
            Some(decon) => decon.dump_registers(),
            None => RegisterDump::new(format!("DECON{} (busy)", self.shared.id)),
        };
        self.shared.deferred.post(DeferredWork::LogDump { reason, dump });
        self.abandon_frame();
    }

    /// Drop the in-flight frame after a hardware error anywhere in the
    /// pipeline; its waiter sees `Failed(Hardware)`
    pub fn abandon_frame(&self) {
        let status = CompletionStatus::Failed(ErrorKind::Hardware);
        let mut sync = self.shared.sync.lock();
        if let Some(completion) = sync.pending.take() {
            completion.complete(status);
            sync.last_status = Some(status);
            log::warn!("Output {} frame abandoned after a hardware error", self.shared.id);
        }
        sync.in_flight = None;
        self.shared.idle.notify_all();
    }

    /// Interrupt-side arming; never waits for the commit path
    fn set_frame_sync_irq(&self, enabled: bool) {
        match self.shared.decon.try_lock() {
            Some(mut decon) => decon.set_frame_sync_irq(enabled),
            None => log::warn!(
                "Output {} busy, frame sync irq {} skipped",
                self.shared.id,
                if enabled { "arm" } else { "disarm" }
            ),
        }
    }
}

/// Commit protocol driver of one display output
pub struct OutputController {
    id: OutputId,
    mode: DestinationMode,
    operation_mode: OperationMode,
    layers: Vec<Arc<Mutex<LayerProcessor>>>,
    capture: Option<Arc<CaptureOutput>>,
    readback: Arc<ReadbackPath>,
    shared: Arc<Shared>,
    active: Arc<OutputPipelineState>,
    phase: CommitPhase,
    partial: PartialUpdate,
    enabled: bool,
    dimming: bool,
    sequence: u64,
    last_completion: Option<Completion>,
    capture_completion: Option<Completion>,
    frame_done_timeout: Duration,
}

impl std::fmt::Debug for OutputController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputController").field("id", &self.id).finish_non_exhaustive()
    }
}

impl OutputController {
    /// Create a new output, initially off with no layers attached
    pub fn new(id: OutputId, mode: DestinationMode, decon: Box<dyn DeconOps>, deferred: DeferredHandle) -> Self {
        let decon = Arc::new(Mutex::new(decon));
        let shared = Arc::new(Shared {
            id,
            sync: Mutex::new(SyncState {
                frame_sync: FrameSync::new(DEFAULT_REFRESH_HZ),
                pending: None,
                in_flight: None,
                last_status: None,
            }),
            idle: Condvar::new(),
            decon: Arc::clone(&decon),
            checksum: ChecksumFeed::new(DEFAULT_CHECKSUM_CAPACITY),
            deferred,
            epoch: Instant::now(),
        });

        log::debug!("Registered output {} ({}x{})", id, mode.width, mode.height);
        Self {
            id,
            mode,
            operation_mode: OperationMode::default(),
            layers: Vec::new(),
            capture: None,
            readback: Arc::new(ReadbackPath::new(decon)),
            shared,
            active: Arc::new(OutputPipelineState::default()),
            phase: CommitPhase::Idle,
            partial: PartialUpdate::default(),
            enabled: false,
            dimming: false,
            sequence: 0,
            last_completion: None,
            capture_completion: None,
            frame_done_timeout: DEFAULT_FRAME_DONE_TIMEOUT,
        }
    }

    pub fn with_refresh(self, refresh_hz: u32) -> Self {
        self.shared.sync.lock().frame_sync = FrameSync::new(refresh_hz);
        self
    }

    pub fn with_operation_mode(mut self, operation_mode: OperationMode) -> Self {
        self.operation_mode = operation_mode;
        self
    }

    /// Granularity the panel accepts partial updates at
    pub fn with_partial_alignment(mut self, align_w: u32, align_h: u32) -> Self {
        self.partial = PartialUpdate::new(align_w, align_h);
        self
    }

    /// Bound on waits for the previous frame
    pub fn with_frame_done_timeout(mut self, timeout: Duration) -> Self {
        self.frame_done_timeout = timeout;
        self
    }

    /// Number of entries the checksum ring keeps
    pub fn with_checksum_capacity(mut self, capacity: usize) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.checksum = ChecksumFeed::new(capacity);
        } else {
            log::warn!("Output {} checksum capacity fixed once interrupts are attached", self.id);
        }
        self
    }

    pub fn id(&self) -> OutputId {
        self.id
    }

    pub fn mode(&self) -> &DestinationMode {
        &self.mode
    }

    pub fn operation_mode(&self) -> OperationMode {
        self.operation_mode
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Where the commit protocol stands; back to `Idle` once the last frame
    /// has been signalled
    pub fn phase(&self) -> CommitPhase {
        match self.phase {
            CommitPhase::Enabled | CommitPhase::Disabled
                if self.last_completion.as_ref().map_or(true, Completion::is_complete) =>
            {
                CommitPhase::Idle
            }
            phase => phase,
        }
    }

    /// State programmed by the last successful commit
    pub fn active_state(&self) -> Arc<OutputPipelineState> {
        Arc::clone(&self.active)
    }

    /// Outcome of the last frame that completed, if any
    pub fn last_frame_status(&self) -> Option<CompletionStatus> {
        self.shared.sync.lock().last_status
    }

    /// Completion of the capture job queued by the last commit
    pub fn capture_completion(&self) -> Option<Completion> {
        self.capture_completion.clone()
    }

    pub fn checksum(&self) -> &ChecksumFeed {
        &self.shared.checksum
    }

    pub fn capture(&self) -> Option<&Arc<CaptureOutput>> {
        self.capture.as_ref()
    }

    pub fn readback(&self) -> &Arc<ReadbackPath> {
        &self.readback
    }

    /// Times the frame-sync interrupt was armed
    pub fn frame_sync_arm_count(&self) -> u64 {
        self.shared.sync.lock().frame_sync.arm_count()
    }

    pub fn frame_sync_armed(&self) -> bool {
        self.shared.sync.lock().frame_sync.is_armed()
    }

    /// Interrupt entry points
    pub fn irq_handle(&self) -> OutputIrq {
        OutputIrq {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn dump_registers(&self) -> RegisterDump {
        self.shared.decon.lock().dump_registers()
    }

    /// Attach a layer processor to this output
    pub fn attach_layer(&mut self, layer: Arc<Mutex<LayerProcessor>>) -> DpuResult<()> {
        let id = {
            let mut guard = layer.lock();
            guard.bind(self.id)?;
            guard.route_faults(self.irq_handle());
            guard.id()
        };
        if self.layers.iter().any(|existing| existing.lock().id() == id) {
            return Ok(());
        }
        self.layers.push(layer);
        Ok(())
    }

    pub fn attach_capture(&mut self, capture: Arc<CaptureOutput>) {
        self.capture = Some(capture);
    }

    /// Tone-mapping dimming; widens the blender input while active
    pub fn set_dimming(&mut self, dimming: bool) {
        self.dimming = dimming;
    }

    fn layer(&self, id: DppId) -> DpuResult<Arc<Mutex<LayerProcessor>>> {
        self.layers
            .iter()
            .find(|layer| layer.lock().id() == id)
            .cloned()
            .ok_or_else(|| DpuError::NotFound(format!("DPP{} is not attached to output {}", id, self.id)))
    }

    /// Run one full commit; on error nothing visible has changed
    pub fn commit(&mut self, request: CommitRequest) -> DpuResult<Completion> {
        let result = self
            .begin(request)
            .and_then(|pending| self.validate(pending))
            .and_then(|validated| self.flush(validated));

        if let Err(err) = &result {
            log::debug!("Output {} commit aborted: {}", self.id, err);
            self.phase = CommitPhase::Idle;
        }
        result
    }

    fn begin(&mut self, request: CommitRequest) -> DpuResult<PendingCommit> {
        if let Some(previous) = &self.last_completion {
            if previous.wait_timeout(self.frame_done_timeout).is_none() {
                return Err(DpuError::Timeout(format!(
                    "output {}: previous frame not signalled within {:?}",
                    self.id, self.frame_done_timeout
                )));
            }
        }
        self.phase = CommitPhase::BeginRequested;

        let mut state = self.active.duplicate();
        for (name, value) in &request.properties {
            let prop = OutputProperty::from_name(name)?;
            state.set_property(prop, value)?;
        }

        state.input_bpc = self.input_bpc(&request.layers);
        state.capture_type = request.capture.as_ref().map(|capture| capture.submode).unwrap_or_default();

        let active_after = request.active.unwrap_or(self.enabled);
        Ok(PendingCommit {
            state,
            request,
            active_after,
        })
    }

    /// Smallest depth that carries every layer without truncation
    fn input_bpc(&self, layers: &[(DppId, LayerDescriptor)]) -> BitDepth {
        let depth = layers
            .iter()
            .map(|(_, desc)| desc.format.bit_depth())
            .max()
            .unwrap_or(BitDepth::Bit8);
        if self.dimming {
            depth.max(BitDepth::Bit10)
        } else {
            depth
        }
    }

    fn validate(&mut self, pending: PendingCommit) -> DpuResult<ValidatedCommit> {
        self.phase = CommitPhase::Validating;
        let PendingCommit {
            state,
            request,
            active_after,
        } = pending;

        let mut layers: Vec<(Arc<Mutex<LayerProcessor>>, HardwareConfig)> = Vec::with_capacity(request.layers.len());
        if !state.modeset_only {
            for (id, desc) in &request.layers {
                let layer = self.layer(*id)?;
                if layers.iter().any(|(existing, _)| Arc::ptr_eq(existing, &layer)) {
                    return Err(DpuError::InvalidArgument(format!("DPP{} appears twice in one commit", id)));
                }
                let config = layer.lock().validate(desc, &self.mode)?;
                layers.push((layer, config));
            }
        }

        let capture = match request.capture {
            Some(capture_request) => {
                if state.modeset_only {
                    return Err(DpuError::InvalidArgument("capture on a modeset-only commit".into()));
                }
                let capture = self
                    .capture
                    .clone()
                    .ok_or_else(|| DpuError::NotFound(format!("output {} has no capture device", self.id)))?;
                let check = capture.check(&capture_request, (self.mode.width, self.mode.height), active_after)?;
                let mut job = capture.new_job(&capture_request, check);
                if capture_request.submode == CaptureType::Concurrent {
                    job.set_readback(Arc::clone(&self.readback));
                }
                capture.prepare(&mut job)?;
                Some((capture, job))
            }
            None => None,
        };

        Ok(ValidatedCommit {
            state,
            layers,
            capture,
            active_after,
        })
    }

    fn flush(&mut self, validated: ValidatedCommit) -> DpuResult<Completion> {
        let ValidatedCommit {
            state,
            layers,
            capture,
            active_after,
        } = validated;

        let powered_on = active_after && !self.enabled;
        if active_after != self.enabled {
            let power = if active_after { self.enable() } else { self.disable() };
            if let Err(err) = power {
                if let Some((capture, job)) = capture {
                    capture.abandon(job);
                }
                return Err(err);
            }
        }

        let standalone = capture
            .as_ref()
            .map_or(false, |(_, job)| job.submode() == CaptureType::Standalone && !job.is_mode_change_only());
        let compose = !state.modeset_only && (self.enabled || standalone);

        self.sequence += 1;
        let completion = Completion::new();

        let programmed = if compose {
            let partial = self.partial.redraw_rect(state.partial_region, self.mode.rect());
            self.program_frame(&state, &layers, partial, capture)
        } else {
            capture.map_or(Ok(None), |(capture, job)| self.commit_capture(&capture, job).map(Some))
        };
        let capture_completion = match programmed {
            Ok(capture_completion) => capture_completion,
            Err(err) => {
                self.partial.reset();
                if powered_on {
                    if let Err(power_err) = self.disable() {
                        log::warn!("Output {} failed to power back down: {}", self.id, power_err);
                    }
                }
                let status = CompletionStatus::Failed(err.kind());
                completion.complete(status);
                self.shared.sync.lock().last_status = Some(status);
                return Err(err);
            }
        };
        self.capture_completion = capture_completion;
        self.phase = CommitPhase::Programmed;

        self.active = Arc::new(state);
        self.phase = CommitPhase::Flushed;

        if self.enabled && compose {
            let mut sync = self.shared.sync.lock();
            if let Some(stale) = sync.pending.replace(completion.clone()) {
                stale.complete(CompletionStatus::Forced);
            }
            sync.in_flight = Some(self.sequence);
            self.phase = CommitPhase::Enabled;
        } else {
            completion.complete(CompletionStatus::Done);
            self.shared.sync.lock().last_status = Some(CompletionStatus::Done);
            self.phase = if self.enabled {
                CommitPhase::Enabled
            } else {
                CommitPhase::Disabled
            };
        }

        self.last_completion = Some(completion.clone());
        log::trace!("Output {} frame {} flushed", self.id, self.sequence);
        Ok(completion)
    }

    /// Program participating layers, switch the others off, start the
    /// capture and latch the frame. The frame is latched last so a failure
    /// anywhere before leaves the previous frame on screen.
    fn program_frame(
        &self,
        state: &OutputPipelineState,
        layers: &[(Arc<Mutex<LayerProcessor>>, HardwareConfig)],
        partial: Option<Rect>,
        capture: Option<(Arc<CaptureOutput>, CaptureJob)>,
    ) -> DpuResult<Option<Completion>> {
        for attached in &self.layers {
            if !layers.iter().any(|(layer, _)| Arc::ptr_eq(layer, attached)) {
                attached.lock().disable();
            }
        }

        let mut ids = Vec::with_capacity(layers.len());
        for (layer, config) in layers {
            let mut layer = layer.lock();
            if let Err(err) = layer.program(config) {
                self.report_failure(format!("DPP{} program failed", layer.id()), layer.dump_registers());
                if let Some((capture, job)) = capture {
                    capture.abandon(job);
                }
                return Err(err);
            }
            layer.enable();
            ids.push(layer.id());
        }

        let readback = capture.as_ref().map_or(false, |(_, job)| {
            job.submode() == CaptureType::Concurrent && !job.is_mode_change_only()
        });
        let queued = match capture {
            Some((capture, job)) => {
                let capture_completion = self.commit_capture(&capture, job)?;
                Some((capture, capture_completion))
            }
            None => None,
        };

        let frame = FrameUpdate {
            sequence: self.sequence,
            input_bpc: state.input_bpc,
            color_mode: state.color_mode,
            render_intent: state.render_intent,
            color_pipeline: state.color_pipeline,
            self_refresh: state.self_refresh,
            partial,
            layers: ids,
            readback,
        };

        let result = self.shared.decon.lock().update(&frame);
        if let Err(err) = result {
            self.report_failure(format!("Output {} update failed", self.id), self.dump_registers());
            let err = match err {
                err @ DpuError::ProgramFailed { .. } => err,
                other => DpuError::ProgramFailed {
                    device: format!("DECON{}", self.id),
                    reason: other.to_string(),
                },
            };
            if let Some((capture, _)) = &queued {
                capture.on_complete(CompletionStatus::Failed(err.kind()));
            }
            return Err(err);
        }
        Ok(queued.map(|(_, capture_completion)| capture_completion))
    }

    /// Queue a capture job; the device abandons the job itself on failure
    fn commit_capture(&self, capture: &Arc<CaptureOutput>, job: CaptureJob) -> DpuResult<Completion> {
        capture.commit(job, self.mode.rect()).map_err(|err| {
            self.report_failure(format!("WB{} program failed", capture.id()), capture.dump_registers());
            match err {
                err @ (DpuError::ProgramFailed { .. } | DpuError::Busy(_)) => err,
                other => DpuError::ProgramFailed {
                    device: format!("WB{}", capture.id()),
                    reason: other.to_string(),
                },
            }
        })
    }

    fn report_failure(&self, reason: String, dump: RegisterDump) {
        self.shared.deferred.post(DeferredWork::LogDump { reason, dump });
    }

    /// Power the output on and arm frame sync
    pub fn enable(&mut self) -> DpuResult<()> {
        if self.enabled {
            return Ok(());
        }
        self.shared.decon.lock().enable()?;
        {
            let mut sync = self.shared.sync.lock();
            sync.frame_sync.get(self.shared.decon.lock().as_mut());
        }
        self.partial.reset();
        self.enabled = true;
        log::info!("Output {} enabled", self.id);
        Ok(())
    }

    /// Power the output off; releases any waiter of the outgoing frame
    pub fn disable(&mut self) -> DpuResult<()> {
        if !self.enabled {
            return Ok(());
        }

        {
            let mut sync = self.shared.sync.lock();
            let deadline = Instant::now() + self.frame_done_timeout;
            while sync.in_flight.is_some() {
                if self.shared.idle.wait_until(&mut sync, deadline).timed_out() {
                    log::warn!("Output {} disabled with a frame still in flight", self.id);
                    sync.in_flight = None;
                    break;
                }
            }
            if let Some(completion) = sync.pending.take() {
                completion.complete(CompletionStatus::Forced);
                sync.last_status = Some(CompletionStatus::Forced);
            }
        }

        for layer in &self.layers {
            layer.lock().disable();
        }
        if self.readback.is_enabled() {
            if let Some(capture) = &self.capture {
                if capture.is_busy() {
                    capture.on_complete(CompletionStatus::Forced);
                }
            }
            self.readback.disable();
        }

        {
            let mut sync = self.shared.sync.lock();
            sync.frame_sync.put(self.shared.decon.lock().as_mut());
        }
        self.shared.decon.lock().disable()?;
        self.partial.reset();
        self.enabled = false;
        log::info!("Output {} disabled", self.id);
        Ok(())
    }

    /// Read a property of the active state
    pub fn property(&self, name: &str) -> DpuResult<PropertyValue> {
        let prop = OutputProperty::from_name(name)?;
        let state = &self.active;
        Ok(match prop {
            OutputProperty::ColorMode => PropertyValue::Int(state.color_mode.id()),
            OutputProperty::RenderIntent => PropertyValue::Int(state.render_intent.id()),
            OutputProperty::SelfRefresh => PropertyValue::Bool(state.self_refresh),
            OutputProperty::ModesetOnly => PropertyValue::Bool(state.modeset_only),
            OutputProperty::PartialRegion => PropertyValue::Region(state.partial_region),
            OutputProperty::ColorPipelineHandle => {
                PropertyValue::Int(state.color_pipeline.map_or(-1, i64::from))
            }
            OutputProperty::FrameRateHint => {
                let now = self.shared.now_ns();
                let next = self
                    .shared
                    .sync
                    .lock()
                    .frame_sync
                    .predict_next(now, state.frame_rate_hint);
                PropertyValue::Int(next as i64)
            }
            OutputProperty::OperationMode => PropertyValue::Int(self.operation_mode.id()),
        })
    }
}
