//! Layer processor (DPP) lifecycle
//!
//! Owns one input-layer device: validates layer configurations against the
//! device's restriction table, programs the registers and moves the device
//! between `Off` and `On`. State transitions only happen on the owning
//! output's commit path; the interrupt side is reached through
//! [`DppIrqHandle`], which never blocks.
//!
//! ## Validation order
//!
//! ```text
//! build ─► scale ─► size / alignment ─► compression ─► other capabilities
//! ```
//!
//! The first failing step wins.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dpu_hw::geometry::is_aligned;
use dpu_hw::{
    build, Capabilities, CompressionKind, DestinationMode, DeviceClass, DpuError, DpuResult, DppIrqLine,
    DppOps, HardwareConfig, LayerDescriptor, RegisterDump, RestrictionTable,
};

use crate::output::{OutputId, OutputIrq};
use crate::worker::{DeferredHandle, DeferredWork};

/// Layer processor id
pub type DppId = u32;

/// Power state of a layer processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerState {
    Off,
    On,
}

/// Interrupt causes reported by a layer processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DppIrq {
    /// Input DMA finished fetching the frame
    FrameDone,
    /// Bus slave error while fetching
    ReadError,
    /// Invalid register configuration latched
    ConfigError,
    /// Processing deadlock detected by the recovery watchdog
    Deadlock,
}

impl DppIrq {
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::FrameDone)
    }
}

/// Interrupt-side counters
#[derive(Debug, Default)]
struct IrqCounters {
    frames_done: AtomicU64,
    errors: AtomicU64,
    last_error: Mutex<Option<DppIrq>>,
}

/// Handle the interrupt dispatcher uses for one layer processor
#[derive(Clone)]
pub struct DppIrqHandle {
    id: DppId,
    counters: Arc<IrqCounters>,
    ops: Arc<Mutex<Box<dyn DppOps>>>,
    /// Bound output; its in-flight frame is lost on a layer fault
    output: Arc<Mutex<Option<OutputIrq>>>,
    deferred: DeferredHandle,
}

impl DppIrqHandle {
    /// Handle one interrupt; never blocks
    pub fn handle_irq(&self, irq: DppIrq) {
        if !irq.is_error() {
            self.counters.frames_done.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        *self.counters.last_error.lock() = Some(irq);

        let reason = format!("DPP{} {:?}", self.id, irq);
        match self.ops.try_lock() {
            Some(ops) => {
                let dump = ops.dump_registers();
                self.deferred.post(DeferredWork::LogDump { reason, dump });
            }
            None => {
                self.deferred.post(DeferredWork::LogDump {
                    reason,
                    dump: RegisterDump::new(format!("DPP{} (busy)", self.id)),
                });
            }
        }

        let output = self.output.lock().clone();
        if let Some(output) = output {
            output.abandon_frame();
        }
    }

    pub fn frames_done(&self) -> u64 {
        self.counters.frames_done.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.counters.errors.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<DppIrq> {
        *self.counters.last_error.lock()
    }
}

/// One layer processor device
pub struct LayerProcessor {
    id: DppId,
    class: DeviceClass,
    restriction: RestrictionTable,
    ops: Arc<Mutex<Box<dyn DppOps>>>,
    state: LayerState,
    protected: bool,
    bound: Option<OutputId>,
    last_config: Option<HardwareConfig>,
    irq_arms: u64,
    irq_disarms: u64,
    counters: Arc<IrqCounters>,
    output_irq: Arc<Mutex<Option<OutputIrq>>>,
    deferred: DeferredHandle,
}

impl std::fmt::Debug for LayerProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerProcessor").field("id", &self.id).finish_non_exhaustive()
    }
}

impl LayerProcessor {
    /// Create a new layer processor with the built-in table of its class
    pub fn new(id: DppId, class: DeviceClass, ops: Box<dyn DppOps>, deferred: DeferredHandle) -> Self {
        Self::with_restriction(id, RestrictionTable::for_class(class), ops, deferred)
    }

    /// Create a new layer processor with an explicit restriction table
    pub fn with_restriction(
        id: DppId,
        restriction: RestrictionTable,
        ops: Box<dyn DppOps>,
        deferred: DeferredHandle,
    ) -> Self {
        log::debug!("Registered DPP{} as {}", id, restriction.class);
        Self {
            id,
            class: restriction.class,
            restriction,
            ops: Arc::new(Mutex::new(ops)),
            state: LayerState::Off,
            protected: false,
            bound: None,
            last_config: None,
            irq_arms: 0,
            irq_disarms: 0,
            counters: Arc::new(IrqCounters::default()),
            output_irq: Arc::new(Mutex::new(None)),
            deferred,
        }
    }

    pub fn id(&self) -> DppId {
        self.id
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    pub fn capabilities(&self) -> Capabilities {
        self.class.capabilities()
    }

    pub fn restriction(&self) -> &RestrictionTable {
        &self.restriction
    }

    pub fn state(&self) -> LayerState {
        self.state
    }

    pub fn is_on(&self) -> bool {
        self.state == LayerState::On
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }

    pub fn bound_output(&self) -> Option<OutputId> {
        self.bound
    }

    /// Configuration programmed by the last successful commit
    pub fn last_config(&self) -> Option<&HardwareConfig> {
        self.last_config.as_ref()
    }

    /// Number of times the interrupt lines were armed
    pub fn irq_arm_count(&self) -> u64 {
        self.irq_arms
    }

    pub fn irq_disarm_count(&self) -> u64 {
        self.irq_disarms
    }

    fn device(&self) -> String {
        format!("DPP{} ({})", self.id, self.class)
    }

    /// Attach to an output
    pub fn bind(&mut self, output: OutputId) -> DpuResult<()> {
        match self.bound {
            Some(current) if current != output => Err(DpuError::Busy(format!(
                "{} already bound to output {}",
                self.device(),
                current
            ))),
            _ => {
                self.bound = Some(output);
                Ok(())
            }
        }
    }

    /// Report error interrupts of this device to the bound output
    pub fn route_faults(&mut self, output: OutputIrq) {
        *self.output_irq.lock() = Some(output);
    }

    pub fn unbind(&mut self) {
        if self.is_on() {
            self.disable();
        }
        self.bound = None;
        *self.output_irq.lock() = None;
    }

    /// Derive and check the hardware configuration of one layer
    pub fn validate(&self, desc: &LayerDescriptor, mode: &DestinationMode) -> DpuResult<HardwareConfig> {
        let config = build(desc, mode)?;
        self.check_scale(&config)?;
        self.check_size(&config)?;
        self.check_compression(desc.compression)?;
        self.check_capabilities(desc, &config)?;
        Ok(config)
    }

    fn check_scale(&self, config: &HardwareConfig) -> DpuResult<()> {
        if !config.is_scaled {
            return Ok(());
        }
        if !self.capabilities().contains(Capabilities::SCALE) {
            return Err(DpuError::Unsupported {
                device: self.device(),
                feature: "scale",
            });
        }

        let min = self.restriction.min_ratio();
        let max = self.restriction.max_ratio();
        for (field, ratio) in [("h_ratio", config.h_ratio), ("v_ratio", config.v_ratio)] {
            if ratio < min || ratio > max {
                return Err(DpuError::BadScale { field, ratio, min, max });
            }
        }
        Ok(())
    }

    fn check_size(&self, config: &HardwareConfig) -> DpuResult<()> {
        let t = &self.restriction;
        let (mult_w, mult_h) = if config.format.is_yuv() {
            config.format.chroma_subsampling()
        } else {
            (1, 1)
        };

        let src = config.src;
        t.src_f_w.check("src_f_w", config.src_full_width, mult_w)?;
        t.src_f_h.check("src_f_h", config.src_full_height, mult_h)?;
        check_align("src_x", src.x, t.src_x_align * mult_w)?;
        check_align("src_y", src.y, t.src_y_align * mult_h)?;

        let (max_w, max_h) = if config.rotation.is_rotated() {
            (t.src_w_rot_max, t.src_h_rot_max)
        } else {
            (t.src_w.max, t.src_h.max)
        };
        t.src_w.check_with_max("src_w", src.w, mult_w, max_w)?;
        t.src_h.check_with_max("src_h", src.h, mult_h, max_h)?;
        check_inside("src_x", src.right(), config.src_full_width)?;
        check_inside("src_y", src.bottom(), config.src_full_height)?;

        let dst = config.dst;
        t.dst_f_w.check("dst_f_w", config.dst_full_width, 1)?;
        t.dst_f_h.check("dst_f_h", config.dst_full_height, 1)?;
        check_align("dst_x", dst.x, t.dst_x_align)?;
        check_align("dst_y", dst.y, t.dst_y_align)?;
        t.dst_w.check("dst_w", dst.w, 1)?;
        t.dst_h.check("dst_h", dst.h, 1)?;
        check_inside("dst_x", dst.right(), config.dst_full_width)?;
        check_inside("dst_y", dst.bottom(), config.dst_full_height)?;

        if let Some(block) = config.block {
            t.blk_w.check("blk_w", block.w, 1)?;
            t.blk_h.check("blk_h", block.h, 1)?;
            check_align("blk_x", block.x, t.blk_x_align)?;
            check_align("blk_y", block.y, t.blk_y_align)?;
            check_inside("blk_x", block.right(), dst.w)?;
            check_inside("blk_y", block.bottom(), dst.h)?;
        }
        Ok(())
    }

    fn check_compression(&self, compression: CompressionKind) -> DpuResult<()> {
        let required = match compression {
            CompressionKind::None => return Ok(()),
            CompressionKind::Afbc(_) => Capabilities::AFBC,
            CompressionKind::Sajc => Capabilities::SAJC,
            CompressionKind::Sbwc => Capabilities::SBWC,
            CompressionKind::SbwcLossy(_) => Capabilities::SBWC_LOSSY,
        };
        if self.capabilities().contains(required) {
            Ok(())
        } else {
            Err(DpuError::Unsupported {
                device: self.device(),
                feature: compression.name(),
            })
        }
    }

    fn check_capabilities(&self, desc: &LayerDescriptor, config: &HardwareConfig) -> DpuResult<()> {
        let caps = self.capabilities();
        let needed = [
            (config.rotation.is_rotated(), Capabilities::ROTATION, "rotation"),
            (!config.rotation.is_empty(), Capabilities::FLIP, "flip"),
            (desc.format.is_yuv(), Capabilities::YUV, "yuv"),
            (desc.color.is_hdr(), Capabilities::HDR, "hdr"),
            (desc.protected, Capabilities::PROTECTION, "protection"),
            (config.is_block, Capabilities::BLOCK, "block"),
        ];
        for (used, capability, feature) in needed {
            // Rotation implies flips on rotation-capable devices
            let satisfied = caps.contains(capability)
                || (capability == Capabilities::FLIP && caps.contains(Capabilities::ROTATION));
            if used && !satisfied {
                return Err(DpuError::Unsupported {
                    device: self.device(),
                    feature,
                });
            }
        }
        Ok(())
    }

    /// Write a validated configuration to the hardware
    pub fn program(&mut self, config: &HardwareConfig) -> DpuResult<()> {
        self.set_protected(config.protected);
        let result = self.ops.lock().program(config);
        match result {
            Ok(()) => {
                self.last_config = Some(config.clone());
                log::trace!("DPP{} programmed", self.id);
                Ok(())
            }
            Err(err @ DpuError::ProgramFailed { .. }) => Err(err),
            Err(err) => Err(DpuError::ProgramFailed {
                device: self.device(),
                reason: err.to_string(),
            }),
        }
    }

    /// Turn the device on; a no-op when already on
    pub fn enable(&mut self) {
        if self.is_on() {
            return;
        }
        let mut ops = self.ops.lock();
        ops.set_irq_enabled(DppIrqLine::DataMove, true);
        ops.set_irq_enabled(DppIrqLine::Processing, true);
        ops.enable();
        drop(ops);

        self.irq_arms += 1;
        self.state = LayerState::On;
        log::debug!("DPP{} enabled", self.id);
    }

    /// Turn the device off; a no-op when already off
    pub fn disable(&mut self) {
        if !self.is_on() {
            return;
        }
        let mut ops = self.ops.lock();
        ops.disable();
        ops.set_irq_enabled(DppIrqLine::DataMove, false);
        ops.set_irq_enabled(DppIrqLine::Processing, false);
        if self.protected {
            ops.set_protection(false);
        }
        drop(ops);

        self.protected = false;
        self.irq_disarms += 1;
        self.state = LayerState::Off;
        log::debug!("DPP{} disabled", self.id);
    }

    /// Switch the protected-content path
    pub fn set_protected(&mut self, protected: bool) {
        if self.protected == protected {
            return;
        }
        self.ops.lock().set_protection(protected);
        self.protected = protected;
    }

    pub fn dump_registers(&self) -> RegisterDump {
        self.ops.lock().dump_registers()
    }

    /// Handle for the interrupt dispatcher
    pub fn irq_handle(&self) -> DppIrqHandle {
        DppIrqHandle {
            id: self.id,
            counters: Arc::clone(&self.counters),
            ops: Arc::clone(&self.ops),
            output: Arc::clone(&self.output_irq),
            deferred: self.deferred.clone(),
        }
    }
}

fn check_align(field: &'static str, value: u32, align: u32) -> DpuResult<()> {
    if is_aligned(value, align) {
        Ok(())
    } else {
        Err(DpuError::BadAlignment { field, value, align })
    }
}

fn check_inside(field: &'static str, end: u32, limit: u32) -> DpuResult<()> {
    if end > limit {
        return Err(DpuError::BadRange {
            field,
            value: end,
            min: 0,
            max: limit,
        });
    }
    Ok(())
}
